//! The robot self-collision checker: builds per-link collision objects once
//! at construction and dispatches discrete, swept and distance queries
//! through two persistent contact managers.
//!
//! Collision with another robot is an open extension point of this checker;
//! those entry points terminate with [`QueryError::Unsupported`].

use crate::allowed_collision::{AllowedCollisionMatrix, QueryFilter};
use crate::collision_request::{
    CollisionRequest, CollisionResult, DistanceRequest, DistanceResult, MinimumDistance,
};
use crate::contact_manager::{CollisionShape, ContactManager, ContactTestMode};
use crate::query_error::QueryError;
use crate::robot_model::{LinkModel, RobotModel};
use crate::robot_state::RobotState;
use crate::shapes;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

/// Self-collision checker for one robot.
///
/// Construction converts every link's collision geometry into engine shapes
/// twice, filling a discrete and a swept object set from the same source
/// geometry; afterwards the two sets are updated independently. Queries take
/// `&mut self` because they refresh object poses in place, so two queries
/// against the same checker cannot overlap; clone the checker for use from
/// several threads.
#[derive(Clone)]
pub struct CollisionRobot {
    model: Arc<RobotModel>,
    padding: f32,
    scale: f32,
    link_padding: HashMap<String, f32>,
    link_scale: HashMap<String, f32>,
    manager: ContactManager,
    manager_ccd: ContactManager,
}

impl CollisionRobot {
    /// Builds the checker from the robot description. `padding` inflates and
    /// `scale` resizes every collision geometry; both can later be overridden
    /// per link.
    pub fn new(model: Arc<RobotModel>, padding: f32, scale: f32) -> Self {
        let mut manager = ContactManager::new();
        let mut manager_ccd = ContactManager::new();

        for link in model.links() {
            let link_shapes = Self::link_collision_shapes(link, padding, scale);
            if link_shapes.is_empty() {
                continue;
            }
            manager_ccd.add_collision_object(&link.name, link_shapes.clone(), true);
            manager.add_collision_object(&link.name, link_shapes, true);
        }
        // Swept checks consider every link by default; discrete checks are
        // narrowed per query through the filter.
        manager_ccd.set_active(model.link_names());

        CollisionRobot {
            model,
            padding,
            scale,
            link_padding: HashMap::new(),
            link_scale: HashMap::new(),
            manager,
            manager_ccd,
        }
    }

    /// Converts all collision elements of one link. Elements with no
    /// convertible geometry are skipped; a link where every element is
    /// skipped yields no collision object.
    fn link_collision_shapes(link: &LinkModel, padding: f32, scale: f32) -> Vec<CollisionShape> {
        link.collision_elements()
            .iter()
            .filter_map(|element| {
                shapes::construct_shape(&element.geometry, scale, padding).map(|converted| {
                    CollisionShape {
                        shape: converted.shape,
                        local_transform: element.origin * converted.local_correction,
                        kind: converted.kind,
                    }
                })
            })
            .collect()
    }

    pub fn model(&self) -> &RobotModel {
        &self.model
    }

    /// The discrete object set. Exposed for inspection; poses are refreshed
    /// by the queries themselves.
    pub fn discrete_manager(&self) -> &ContactManager {
        &self.manager
    }

    /// The swept (two-time-sample) object set.
    pub fn swept_manager(&self) -> &ContactManager {
        &self.manager_ccd
    }

    fn effective_padding(&self, link: &str) -> f32 {
        *self.link_padding.get(link).unwrap_or(&self.padding)
    }

    fn effective_scale(&self, link: &str) -> f32 {
        *self.link_scale.get(link).unwrap_or(&self.scale)
    }

    /// Discrete self-collision check with no allowed-collision table: every
    /// pair is checked.
    pub fn check_self_collision(
        &mut self,
        req: &CollisionRequest,
        res: &mut CollisionResult,
        state: &RobotState,
    ) {
        self.check_self_collision_helper(req, res, state, None);
    }

    /// Discrete self-collision check honoring the allowed-collision table.
    pub fn check_self_collision_with_acm(
        &mut self,
        req: &CollisionRequest,
        res: &mut CollisionResult,
        state: &RobotState,
        acm: &AllowedCollisionMatrix,
    ) {
        self.check_self_collision_helper(req, res, state, Some(acm));
    }

    fn check_self_collision_helper(
        &mut self,
        req: &CollisionRequest,
        res: &mut CollisionResult,
        state: &RobotState,
        acm: Option<&AllowedCollisionMatrix>,
    ) {
        self.update_transforms_from_state(state);
        let attached_names = self.add_attached_objects(state);

        let mut filter = QueryFilter::new(acm);
        for body in state.attached_bodies() {
            filter = filter.with_touch_links(&body.name, &body.touch_links);
        }
        self.manager
            .contact_test(res, ContactTestMode::FirstContact, req, &filter);

        for name in attached_names {
            self.manager.remove_collision_object(&name);
        }

        if req.distance {
            let mut dreq = DistanceRequest {
                group_name: req.group_name.clone(),
                ..DistanceRequest::default()
            };
            dreq.enable_group(&self.model);
            let mut dres = DistanceResult::default();
            self.distance_self(&dreq, &mut dres, state, acm);
            res.distance = dres.minimum_distance.map(|minimum| minimum.distance);
        }
    }

    /// Swept self-collision check between two configurations, catching
    /// crossings that discrete sampling of the motion could miss. Every
    /// active link's motion segment is cast against the others.
    pub fn check_self_collision_continuous(
        &mut self,
        req: &CollisionRequest,
        res: &mut CollisionResult,
        state1: &RobotState,
        state2: &RobotState,
        acm: Option<&AllowedCollisionMatrix>,
    ) {
        self.update_transforms_from_states_ccd(state1, state2);
        let filter = QueryFilter::new(acm);
        self.manager_ccd
            .contact_test(res, ContactTestMode::Closest, req, &filter);
    }

    /// Minimum self-distance in the given state. The achieving pair and the
    /// distance are recorded in the result.
    pub fn distance_self(
        &mut self,
        dreq: &DistanceRequest,
        dres: &mut DistanceResult,
        state: &RobotState,
        acm: Option<&AllowedCollisionMatrix>,
    ) {
        self.update_transforms_from_state(state);
        let filter = QueryFilter::new(acm);
        if let Some((distance, body_a, body_b)) = self
            .manager
            .distance_test(&filter, dreq.enabled_links.as_ref())
        {
            dres.minimum_distance = Some(MinimumDistance {
                distance,
                body_a,
                body_b,
            });
        }
    }

    /// Discrete collision against another robot. Not implemented; the result
    /// is left untouched.
    pub fn check_other_collision(
        &mut self,
        _req: &CollisionRequest,
        _res: &mut CollisionResult,
        _state: &RobotState,
        _other_robot: &CollisionRobot,
        _other_state: &RobotState,
        _acm: Option<&AllowedCollisionMatrix>,
    ) -> Result<(), QueryError> {
        error!("collision checking against another robot is not implemented");
        Err(QueryError::Unsupported("other-robot collision"))
    }

    /// Swept collision against another robot. Not implemented; the result is
    /// left untouched.
    pub fn check_other_collision_continuous(
        &mut self,
        _req: &CollisionRequest,
        _res: &mut CollisionResult,
        _state1: &RobotState,
        _state2: &RobotState,
        _other_robot: &CollisionRobot,
        _other_state1: &RobotState,
        _other_state2: &RobotState,
        _acm: Option<&AllowedCollisionMatrix>,
    ) -> Result<(), QueryError> {
        error!("continuous collision checking against another robot is not implemented");
        Err(QueryError::Unsupported("other-robot continuous collision"))
    }

    /// Distance to another robot. Not implemented; the result is left
    /// untouched.
    pub fn distance_other(
        &mut self,
        _dreq: &DistanceRequest,
        _dres: &mut DistanceResult,
        _state: &RobotState,
        _other_robot: &CollisionRobot,
        _other_state: &RobotState,
    ) -> Result<(), QueryError> {
        error!("distance to another robot is not implemented");
        Err(QueryError::Unsupported("other-robot distance"))
    }

    /// Sets the global padding and rebuilds every link's objects.
    pub fn set_padding(&mut self, padding: f32) {
        self.padding = padding;
        let links = self.model.link_names();
        self.update_padding_or_scaling(&links);
    }

    /// Sets the global scale and rebuilds every link's objects.
    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale;
        let links = self.model.link_names();
        self.update_padding_or_scaling(&links);
    }

    /// Overrides the padding of one link and rebuilds its objects.
    pub fn set_link_padding(&mut self, link: &str, padding: f32) {
        self.link_padding.insert(link.to_string(), padding);
        self.update_padding_or_scaling(&[link.to_string()]);
    }

    /// Overrides the scale of one link and rebuilds its objects.
    pub fn set_link_scale(&mut self, link: &str, scale: f32) {
        self.link_scale.insert(link.to_string(), scale);
        self.update_padding_or_scaling(&[link.to_string()]);
    }

    /// Rebuilds the named links' collision objects from the robot model with
    /// the currently effective padding and scale, preserving each object's
    /// world transform. An unknown link name is reported and skipped;
    /// processing continues with the remaining links.
    pub fn update_padding_or_scaling(&mut self, links: &[String]) {
        for name in links {
            match self.model.link(name) {
                Some(link) => {
                    let link_shapes = Self::link_collision_shapes(
                        link,
                        self.effective_padding(name),
                        self.effective_scale(name),
                    );
                    self.manager.replace_shapes(name, link_shapes.clone());
                    self.manager_ccd.replace_shapes(name, link_shapes);
                }
                None => {
                    error!("updating padding or scaling for unknown link: '{}'", name);
                }
            }
        }
    }

    /// Overwrites every discrete object's world transform from the state.
    /// The first collision body transform of the link is used for the whole
    /// aggregated object, even when a link has several shapes. Known
    /// limitation: the object moves rigidly as one composite.
    fn update_transforms_from_state(&mut self, state: &RobotState) {
        self.manager
            .sync_transforms(|link| state.collision_body_transform(link, 0).copied());
    }

    /// Sets start and end transforms of every active swept object from the
    /// two states.
    fn update_transforms_from_states_ccd(&mut self, state1: &RobotState, state2: &RobotState) {
        self.manager_ccd.sync_swept_transforms(
            |link| state1.collision_body_transform(link, 0).copied(),
            |link| state2.collision_body_transform(link, 0).copied(),
        );
    }

    /// Registers the state's attached bodies as transient collision objects
    /// in the discrete set, returning the names actually added so the caller
    /// can remove them after the test. Attached geometry is converted without
    /// padding or scaling.
    fn add_attached_objects(&mut self, state: &RobotState) -> Vec<String> {
        let mut added = Vec::new();
        for body in state.attached_bodies() {
            let body_shapes: Vec<CollisionShape> = body
                .geometries
                .iter()
                .filter_map(|(geometry, origin)| {
                    shapes::construct_shape(geometry, 1.0, 0.0).map(|converted| CollisionShape {
                        shape: converted.shape,
                        local_transform: origin * converted.local_correction,
                        kind: converted.kind,
                    })
                })
                .collect();
            if body_shapes.is_empty() {
                continue;
            }
            if !self.manager.add_collision_object(&body.name, body_shapes, true) {
                error!("attached body '{}' clashes with a registered object, ignored", body.name);
                continue;
            }
            self.manager.set_transform(&body.name, &body.global_pose);
            added.push(body.name.clone());
        }
        added
    }
}
