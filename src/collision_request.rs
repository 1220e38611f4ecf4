//! Request, result, contact and distance types exchanged with the checker.

use crate::robot_model::RobotModel;
use nalgebra::{Point3, Vector3};
use std::collections::{HashMap, HashSet};

/// Tuning knobs of one collision query. Owned by the caller.
#[derive(Clone)]
pub struct CollisionRequest {
    /// Planning group the check is scoped to. Group membership is resolved
    /// by the caller; the checker only forwards it into distance requests.
    pub group_name: Option<String>,
    /// Also compute the minimum distance and fold it into the result.
    pub distance: bool,
    /// Overall cap on recorded contacts.
    pub max_contacts: usize,
    /// Cap on recorded contacts per body pair.
    pub max_contacts_per_pair: usize,
    pub verbose: bool,
}

impl Default for CollisionRequest {
    fn default() -> Self {
        CollisionRequest {
            group_name: None,
            distance: false,
            max_contacts: 1,
            max_contacts_per_pair: 1,
            verbose: false,
        }
    }
}

/// One contact between two bodies.
#[derive(Clone, Debug)]
pub struct Contact {
    pub body_a: String,
    pub body_b: String,
    /// Signed distance at the contact; negative when penetrating.
    pub depth: f32,
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
    pub nearest_points: [Point3<f32>; 2],
    /// Fraction of the motion at which a swept test found the hit.
    /// Zero for discrete contacts.
    pub percent_interpolation: f32,
}

/// Accumulates the contacts of one query. The checker only appends to this;
/// caller-supplied state that predates the call is preserved except for the
/// fields the checker explicitly owns.
#[derive(Default)]
pub struct CollisionResult {
    pub collision: bool,
    pub contact_count: usize,
    /// Contacts keyed by lexicographically ordered body name pair.
    pub contacts: HashMap<(String, String), Vec<Contact>>,
    /// Minimum distance, filled when the request asked for it.
    pub distance: Option<f32>,
}

impl CollisionResult {
    pub fn pair_key(body_a: &str, body_b: &str) -> (String, String) {
        if body_a <= body_b {
            (body_a.to_string(), body_b.to_string())
        } else {
            (body_b.to_string(), body_a.to_string())
        }
    }

    /// Records a contact, honoring the request's caps. Returns false once the
    /// overall cap is reached and the caller should stop producing contacts.
    pub fn add_contact(&mut self, req: &CollisionRequest, contact: Contact) -> bool {
        if self.contact_count >= req.max_contacts {
            return false;
        }
        let key = Self::pair_key(&contact.body_a, &contact.body_b);
        let pair_contacts = self.contacts.entry(key).or_default();
        if pair_contacts.len() < req.max_contacts_per_pair {
            pair_contacts.push(contact);
            self.contact_count += 1;
            self.collision = true;
        }
        self.contact_count < req.max_contacts
    }

    /// Clears only the fields this checker owns.
    pub fn clear(&mut self) {
        self.collision = false;
        self.contact_count = 0;
        self.contacts.clear();
        self.distance = None;
    }
}

/// Parameters of a standalone distance query. Constructed per call.
#[derive(Clone, Default)]
pub struct DistanceRequest {
    pub group_name: Option<String>,
    /// When present, only pairs with at least one body in this set count.
    pub enabled_links: Option<HashSet<String>>,
}

impl DistanceRequest {
    /// Enables every link of the model. The description carries no group
    /// registry, so group scoping beyond this is up to the caller.
    pub fn enable_group(&mut self, model: &RobotModel) {
        self.enabled_links = Some(model.link_names().into_iter().collect());
    }
}

/// The closest pair found by a distance query.
#[derive(Clone, Debug)]
pub struct MinimumDistance {
    pub distance: f32,
    pub body_a: String,
    pub body_b: String,
}

#[derive(Default)]
pub struct DistanceResult {
    pub minimum_distance: Option<MinimumDistance>,
}
