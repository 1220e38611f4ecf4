//! Persistent collision object collections and the contact tests over them.
//!
//! The manager owns one object per body, aggregating all converted shapes of
//! that body, and runs pairwise narrow-phase queries through parry3d. Pair
//! enumeration produces a task vector that is processed in parallel, stopping
//! at the first hit when the test mode asks for it.

use crate::allowed_collision::ContactFilter;
use crate::collision_request::{CollisionRequest, CollisionResult, Contact};
use crate::shapes::RepresentationKind;
use nalgebra::{Isometry3, Point3};
use parry3d::query::NonlinearRigidMotion;
use parry3d::shape::SharedShape;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::debug;

const SUPPORTED: &str = "Shape pair should be supported by Parry3d";

/// One converted shape of a collision object, posed in the object frame.
#[derive(Clone)]
pub struct CollisionShape {
    pub shape: SharedShape,
    pub local_transform: Isometry3<f32>,
    pub kind: RepresentationKind,
}

/// World placement of a collision object. Discrete objects carry one pose,
/// swept objects carry the poses at both ends of a motion segment. The closed
/// variant makes a discrete/swept mixup a visible state, not undefined
/// behavior on a cast.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ObjectPose {
    Discrete(Isometry3<f32>),
    Swept {
        start: Isometry3<f32>,
        end: Isometry3<f32>,
    },
}

impl ObjectPose {
    /// The pose single-instant tests use; the start pose for swept objects.
    pub fn current(&self) -> &Isometry3<f32> {
        match self {
            ObjectPose::Discrete(pose) => pose,
            ObjectPose::Swept { start, .. } => start,
        }
    }
}

/// The engine-native queryable handle for one body.
#[derive(Clone)]
pub struct CollisionObject {
    pub name: String,
    pub shapes: Vec<CollisionShape>,
    pub pose: ObjectPose,
    pub contact_processing_threshold: f32,
    pub enabled: bool,
}

/// Mode of a contact test.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ContactTestMode {
    /// Stop at the first contact found; used by boolean self-collision checks.
    FirstContact,
    /// Evaluate every pair, keeping the deepest (for discrete pairs) or
    /// earliest (for swept pairs) contact of each.
    Closest,
}

struct ContactTask<'a> {
    a: &'a CollisionObject,
    b: &'a CollisionObject,
}

/// Collection of collision objects with an active subset and a contact
/// distance threshold. Two instances back a checker: one holding discrete
/// poses, one holding swept poses.
#[derive(Clone, Default)]
pub struct ContactManager {
    objects: Vec<CollisionObject>,
    index: HashMap<String, usize>,
    active: Vec<String>,
    contact_distance: f32,
}

impl ContactManager {
    pub fn new() -> Self {
        ContactManager::default()
    }

    /// Registers a new object aggregating the given shapes, placed at
    /// identity. Returns false if the name is already taken.
    pub fn add_collision_object(
        &mut self,
        name: &str,
        shapes: Vec<CollisionShape>,
        enabled: bool,
    ) -> bool {
        if self.index.contains_key(name) {
            return false;
        }
        self.index.insert(name.to_string(), self.objects.len());
        self.objects.push(CollisionObject {
            name: name.to_string(),
            shapes,
            pose: ObjectPose::Discrete(Isometry3::identity()),
            contact_processing_threshold: self.contact_distance,
            enabled,
        });
        true
    }

    pub fn has_collision_object(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn remove_collision_object(&mut self, name: &str) -> bool {
        let Some(position) = self.index.remove(name) else {
            return false;
        };
        self.objects.remove(position);
        for (offset, object) in self.objects.iter().enumerate() {
            self.index.insert(object.name.clone(), offset);
        }
        true
    }

    pub fn object(&self, name: &str) -> Option<&CollisionObject> {
        self.index.get(name).map(|&position| &self.objects[position])
    }

    pub fn objects(&self) -> &[CollisionObject] {
        &self.objects
    }

    /// Replaces the shapes of an object, keeping its pose, threshold and
    /// enabled flag. Used when padding or scaling of a link changes.
    pub fn replace_shapes(&mut self, name: &str, shapes: Vec<CollisionShape>) -> bool {
        match self.index.get(name) {
            Some(&position) => {
                self.objects[position].shapes = shapes;
                true
            }
            None => false,
        }
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.index.get(name) {
            Some(&position) => {
                self.objects[position].enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Overwrites the world transform of one object with a single pose.
    pub fn set_transform(&mut self, name: &str, pose: &Isometry3<f32>) -> bool {
        match self.index.get(name) {
            Some(&position) => {
                self.objects[position].pose = ObjectPose::Discrete(*pose);
                true
            }
            None => false,
        }
    }

    /// Sets the start and end poses of one object for a swept test.
    pub fn set_swept_transform(
        &mut self,
        name: &str,
        start: &Isometry3<f32>,
        end: &Isometry3<f32>,
    ) -> bool {
        match self.index.get(name) {
            Some(&position) => {
                self.objects[position].pose = ObjectPose::Swept {
                    start: *start,
                    end: *end,
                };
                true
            }
            None => false,
        }
    }

    /// Refreshes every object's pose from the lookup. Objects the lookup
    /// knows nothing about keep their previous pose.
    pub fn sync_transforms(&mut self, lookup: impl Fn(&str) -> Option<Isometry3<f32>>) {
        for object in &mut self.objects {
            if let Some(pose) = lookup(&object.name) {
                object.pose = ObjectPose::Discrete(pose);
            }
        }
    }

    /// Refreshes the start and end poses of every *active* object from the
    /// two lookups, enabling a swept test between two configurations.
    pub fn sync_swept_transforms(
        &mut self,
        start_lookup: impl Fn(&str) -> Option<Isometry3<f32>>,
        end_lookup: impl Fn(&str) -> Option<Isometry3<f32>>,
    ) {
        let positions: Vec<usize> = self
            .active
            .iter()
            .filter_map(|name| self.index.get(name).copied())
            .collect();
        for position in positions {
            let object = &mut self.objects[position];
            if let (Some(start), Some(end)) =
                (start_lookup(&object.name), end_lookup(&object.name))
            {
                object.pose = ObjectPose::Swept { start, end };
            }
        }
    }

    /// Declares which objects move during swept tests. An empty list means
    /// every enabled pair is considered.
    pub fn set_active(&mut self, names: Vec<String>) {
        self.active = names;
    }

    pub fn active(&self) -> &[String] {
        &self.active
    }

    pub fn set_contact_distance_threshold(&mut self, contact_distance: f32) {
        self.contact_distance = contact_distance;
        for object in &mut self.objects {
            object.contact_processing_threshold = contact_distance;
        }
    }

    pub fn contact_distance_threshold(&self) -> f32 {
        self.contact_distance
    }

    /// Runs contact generation over all registered objects subject to the
    /// filter, appending found contacts to the result. The filter is asked
    /// once per unordered pair, before any narrow-phase work for that pair.
    pub fn contact_test(
        &self,
        res: &mut CollisionResult,
        mode: ContactTestMode,
        req: &CollisionRequest,
        filter: &dyn ContactFilter,
    ) {
        let tasks = self.pair_tasks(filter);
        if req.verbose {
            debug!("contact test over {} object pairs", tasks.len());
        }
        let contacts: Vec<Contact> = match mode {
            ContactTestMode::FirstContact => tasks
                .par_iter()
                .find_map_any(|task| self.pair_contact(task))
                .into_iter()
                .collect(),
            ContactTestMode::Closest => tasks
                .par_iter()
                .filter_map(|task| self.pair_contact(task))
                .collect(),
        };
        for contact in contacts {
            if !res.add_contact(req, contact) {
                break;
            }
        }
    }

    /// Minimum separating distance over all enabled pairs passing the filter.
    /// When an enabled-link set is given, only pairs with at least one member
    /// in it are considered.
    pub fn distance_test(
        &self,
        filter: &dyn ContactFilter,
        enabled_links: Option<&HashSet<String>>,
    ) -> Option<(f32, String, String)> {
        let tasks: Vec<ContactTask> = self
            .pair_tasks(filter)
            .into_iter()
            .filter(|task| match enabled_links {
                Some(links) => links.contains(&task.a.name) || links.contains(&task.b.name),
                None => true,
            })
            .collect();

        tasks
            .par_iter()
            .filter_map(|task| {
                let mut minimum: Option<f32> = None;
                for shape_a in &task.a.shapes {
                    let pose_a = task.a.pose.current() * shape_a.local_transform;
                    for shape_b in &task.b.shapes {
                        let pose_b = task.b.pose.current() * shape_b.local_transform;
                        let distance = parry3d::query::distance(
                            &pose_a,
                            shape_a.shape.as_ref(),
                            &pose_b,
                            shape_b.shape.as_ref(),
                        )
                        .expect(SUPPORTED);
                        minimum = Some(match minimum {
                            Some(current) => current.min(distance),
                            None => distance,
                        });
                    }
                }
                minimum.map(|distance| (distance, task.a.name.clone(), task.b.name.clone()))
            })
            .min_by(|x, y| x.0.total_cmp(&y.0))
    }

    /// Enumerates unordered pairs of enabled objects, restricted to pairs
    /// with at least one active member when an active list is set, and with
    /// filter-exempt pairs dropped.
    fn pair_tasks(&self, filter: &dyn ContactFilter) -> Vec<ContactTask> {
        let active: HashSet<&str> = self.active.iter().map(String::as_str).collect();
        let mut tasks = Vec::with_capacity(self.objects.len() * self.objects.len() / 2);
        for (i, a) in self.objects.iter().enumerate() {
            if !a.enabled {
                continue;
            }
            for b in self.objects.iter().skip(i + 1) {
                if !b.enabled {
                    continue;
                }
                if !active.is_empty()
                    && !active.contains(a.name.as_str())
                    && !active.contains(b.name.as_str())
                {
                    continue;
                }
                if filter.is_pair_allowed(&a.name, &b.name) {
                    continue;
                }
                tasks.push(ContactTask { a, b });
            }
        }
        tasks
    }

    /// Narrow phase for one pair: a swept cast when either object carries a
    /// motion segment, a single-instant contact query otherwise.
    fn pair_contact(&self, task: &ContactTask) -> Option<Contact> {
        let swept = matches!(task.a.pose, ObjectPose::Swept { .. })
            || matches!(task.b.pose, ObjectPose::Swept { .. });
        if swept {
            self.swept_pair_contact(task)
        } else {
            self.discrete_pair_contact(task)
        }
    }

    fn discrete_pair_contact(&self, task: &ContactTask) -> Option<Contact> {
        let prediction = self
            .contact_distance
            .max(task.a.contact_processing_threshold)
            .max(task.b.contact_processing_threshold);
        let mut deepest: Option<Contact> = None;
        for shape_a in &task.a.shapes {
            let pose_a = task.a.pose.current() * shape_a.local_transform;
            for shape_b in &task.b.shapes {
                let pose_b = task.b.pose.current() * shape_b.local_transform;
                let found = parry3d::query::contact(
                    &pose_a,
                    shape_a.shape.as_ref(),
                    &pose_b,
                    shape_b.shape.as_ref(),
                    prediction,
                )
                .expect(SUPPORTED);
                if let Some(contact) = found {
                    if deepest
                        .as_ref()
                        .map(|best| contact.dist < best.depth)
                        .unwrap_or(true)
                    {
                        deepest = Some(Contact {
                            body_a: task.a.name.clone(),
                            body_b: task.b.name.clone(),
                            depth: contact.dist,
                            position: contact.point1,
                            normal: contact.normal1.into_inner(),
                            nearest_points: [contact.point1, contact.point2],
                            percent_interpolation: 0.0,
                        });
                    }
                }
            }
        }
        deepest
    }

    fn swept_pair_contact(&self, task: &ContactTask) -> Option<Contact> {
        let mut earliest: Option<Contact> = None;
        for shape_a in &task.a.shapes {
            let motion_a = shape_motion(&task.a.pose, &shape_a.local_transform);
            for shape_b in &task.b.shapes {
                let motion_b = shape_motion(&task.b.pose, &shape_b.local_transform);
                let hit = parry3d::query::cast_shapes_nonlinear(
                    &motion_a,
                    shape_a.shape.as_ref(),
                    &motion_b,
                    shape_b.shape.as_ref(),
                    0.0,
                    1.0,
                    true,
                )
                .expect(SUPPORTED);
                if let Some(hit) = hit {
                    if earliest
                        .as_ref()
                        .map(|best| hit.time_of_impact < best.percent_interpolation)
                        .unwrap_or(true)
                    {
                        let pose_a_at_hit = motion_a.position_at_time(hit.time_of_impact);
                        let pose_b_at_hit = motion_b.position_at_time(hit.time_of_impact);
                        // Witness points and normals come in shape-local space.
                        let position = pose_a_at_hit * hit.witness1;
                        earliest = Some(Contact {
                            body_a: task.a.name.clone(),
                            body_b: task.b.name.clone(),
                            depth: 0.0,
                            position,
                            normal: pose_a_at_hit * hit.normal1.into_inner(),
                            nearest_points: [position, pose_b_at_hit * hit.witness2],
                            percent_interpolation: hit.time_of_impact,
                        });
                    }
                }
            }
        }
        earliest
    }
}

/// Rigid motion of one shape over the segment: the start pose of the shape
/// plus the linear and angular velocities that land it on its end pose at
/// t = 1. Discrete objects yield a constant position.
fn shape_motion(pose: &ObjectPose, local_transform: &Isometry3<f32>) -> NonlinearRigidMotion {
    match pose {
        ObjectPose::Discrete(world) => {
            NonlinearRigidMotion::constant_position(world * local_transform)
        }
        ObjectPose::Swept { start, end } => {
            let shape_start = start * local_transform;
            let shape_end = end * local_transform;
            let linvel = shape_end.translation.vector - shape_start.translation.vector;
            let angvel = shape_start
                .rotation
                .rotation_to(&shape_end.rotation)
                .scaled_axis();
            NonlinearRigidMotion::new(shape_start, Point3::origin(), linvel, angvel)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allowed_collision::{AllowedCollision, AllowedCollisionMatrix, QueryFilter};
    use crate::shapes::{construct_shape, Geometry};

    fn ball_shapes(radius: f32) -> Vec<CollisionShape> {
        let converted = construct_shape(&Geometry::Sphere { radius }, 1.0, 0.0).unwrap();
        vec![CollisionShape {
            shape: converted.shape,
            local_transform: converted.local_correction,
            kind: converted.kind,
        }]
    }

    fn manager_with_two_balls() -> ContactManager {
        let mut manager = ContactManager::new();
        assert!(manager.add_collision_object("a", ball_shapes(0.5), true));
        assert!(manager.add_collision_object("b", ball_shapes(0.5), true));
        manager
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut manager = manager_with_two_balls();
        assert!(!manager.add_collision_object("a", ball_shapes(0.1), true));
        assert_eq!(manager.objects().len(), 2);
    }

    #[test]
    fn overlapping_balls_collide() {
        let mut manager = manager_with_two_balls();
        manager.set_transform("b", &Isometry3::translation(0.5, 0.0, 0.0));

        let mut res = CollisionResult::default();
        let req = CollisionRequest::default();
        manager.contact_test(&mut res, ContactTestMode::FirstContact, &req, &QueryFilter::new(None));
        assert!(res.collision);
        assert_eq!(res.contact_count, 1);
        let contact = &res.contacts[&("a".to_string(), "b".to_string())][0];
        assert!(contact.depth < 0.0, "expected penetration, got {}", contact.depth);
    }

    #[test]
    fn separated_balls_do_not_collide() {
        let mut manager = manager_with_two_balls();
        manager.set_transform("b", &Isometry3::translation(3.0, 0.0, 0.0));

        let mut res = CollisionResult::default();
        let req = CollisionRequest::default();
        manager.contact_test(&mut res, ContactTestMode::FirstContact, &req, &QueryFilter::new(None));
        assert!(!res.collision);
        assert_eq!(res.contact_count, 0);
    }

    #[test]
    fn contact_distance_threshold_reports_near_contact() {
        let mut manager = manager_with_two_balls();
        // Gap of 0.5 between surfaces.
        manager.set_transform("b", &Isometry3::translation(1.5, 0.0, 0.0));
        manager.set_contact_distance_threshold(1.0);

        let mut res = CollisionResult::default();
        let req = CollisionRequest::default();
        manager.contact_test(&mut res, ContactTestMode::Closest, &req, &QueryFilter::new(None));
        assert!(res.collision);
        let contact = &res.contacts[&("a".to_string(), "b".to_string())][0];
        assert!((contact.depth - 0.5).abs() < 1e-3, "near-contact depth {}", contact.depth);
    }

    #[test]
    fn allowed_pair_is_skipped_entirely() {
        let mut manager = manager_with_two_balls();
        manager.set_transform("b", &Isometry3::translation(0.5, 0.0, 0.0));

        let mut acm = AllowedCollisionMatrix::new();
        acm.set_entry("a", "b", AllowedCollision::Always);

        let mut res = CollisionResult::default();
        let req = CollisionRequest::default();
        manager.contact_test(
            &mut res,
            ContactTestMode::FirstContact,
            &req,
            &QueryFilter::new(Some(&acm)),
        );
        assert!(!res.collision);
    }

    #[test]
    fn swept_cast_catches_tunneling() {
        let mut manager = ContactManager::new();
        manager.add_collision_object("mover", ball_shapes(0.1), true);
        manager.add_collision_object("wall", ball_shapes(0.1), true);
        manager.set_active(vec!["mover".to_string(), "wall".to_string()]);

        // Both endpoint configurations are far from the wall; only the
        // motion in between crosses it.
        manager.set_swept_transform(
            "mover",
            &Isometry3::translation(-5.0, 0.0, 0.0),
            &Isometry3::translation(5.0, 0.0, 0.0),
        );
        manager.set_swept_transform("wall", &Isometry3::identity(), &Isometry3::identity());

        let mut res = CollisionResult::default();
        let req = CollisionRequest::default();
        manager.contact_test(&mut res, ContactTestMode::Closest, &req, &QueryFilter::new(None));
        assert!(res.collision, "swept test must catch the crossing");
        let contact = &res.contacts[&("mover".to_string(), "wall".to_string())][0];
        assert!(
            contact.percent_interpolation > 0.0 && contact.percent_interpolation < 1.0,
            "hit should happen mid-motion, got t = {}",
            contact.percent_interpolation
        );
    }

    #[test]
    fn clone_is_independent() {
        let mut manager = manager_with_two_balls();
        manager.set_transform("b", &Isometry3::translation(1.0, 2.0, 3.0));
        manager.set_contact_distance_threshold(0.25);

        let copy = manager.clone();
        assert_eq!(copy.objects().len(), manager.objects().len());
        assert_eq!(copy.object("b").unwrap().pose, manager.object("b").unwrap().pose);
        assert_eq!(copy.contact_distance_threshold(), 0.25);

        manager.set_transform("b", &Isometry3::translation(9.0, 9.0, 9.0));
        assert_ne!(copy.object("b").unwrap().pose, manager.object("b").unwrap().pose);
    }

    #[test]
    fn distance_between_separated_balls() {
        let mut manager = manager_with_two_balls();
        manager.set_transform("b", &Isometry3::translation(3.0, 0.0, 0.0));

        let (distance, body_a, body_b) = manager
            .distance_test(&QueryFilter::new(None), None)
            .expect("two objects always yield a distance");
        assert!((distance - 2.0).abs() < 1e-3, "got {}", distance);
        assert_eq!(body_a, "a");
        assert_eq!(body_b, "b");
    }

    #[test]
    fn removal_keeps_lookup_consistent() {
        let mut manager = manager_with_two_balls();
        manager.add_collision_object("c", ball_shapes(0.2), true);
        assert!(manager.remove_collision_object("a"));
        assert!(!manager.has_collision_object("a"));
        assert!(manager.object("c").is_some());
        assert_eq!(manager.object("c").unwrap().name, "c");
        assert!(!manager.remove_collision_object("a"));
    }
}
