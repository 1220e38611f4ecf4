//! Snapshot of per-link world transforms, plus the bodies attached to links,
//! as produced by forward kinematics for one configuration of the robot.

use crate::shapes::Geometry;
use nalgebra::Isometry3;
use std::collections::{HashMap, HashSet};

/// A body rigidly attached to one link (a grasped workpiece, for example).
/// Its collisions against the links it is declared to touch are exempt.
#[derive(Clone)]
pub struct AttachedBody {
    /// Name of the body, must not clash with any link name.
    pub name: String,
    pub parent_link: String,
    /// Geometry of the body with local poses in the body frame.
    pub geometries: Vec<(Geometry, Isometry3<f32>)>,
    /// World pose of the body frame in this state.
    pub global_pose: Isometry3<f32>,
    /// Links this body is expected to touch; contacts with them are skipped.
    pub touch_links: HashSet<String>,
}

/// World transforms of every collision body of every link, keyed by link name.
#[derive(Clone, Default)]
pub struct RobotState {
    transforms: HashMap<String, Vec<Isometry3<f32>>>,
    attached: Vec<AttachedBody>,
}

impl RobotState {
    pub fn new() -> Self {
        RobotState::default()
    }

    /// Sets a single transform for the link, replacing whatever was there.
    pub fn set_link_transform(&mut self, link: impl Into<String>, pose: Isometry3<f32>) {
        self.transforms.insert(link.into(), vec![pose]);
    }

    /// Sets one transform per collision body of the link.
    pub fn set_link_transforms(&mut self, link: impl Into<String>, poses: Vec<Isometry3<f32>>) {
        self.transforms.insert(link.into(), poses);
    }

    /// World transform of the given collision body of a link.
    pub fn collision_body_transform(&self, link: &str, index: usize) -> Option<&Isometry3<f32>> {
        self.transforms.get(link).and_then(|poses| poses.get(index))
    }

    pub fn attach_body(&mut self, body: AttachedBody) {
        self.attached.push(body);
    }

    pub fn attached_bodies(&self) -> &[AttachedBody] {
        &self.attached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_lookup_by_link_and_index() {
        let mut state = RobotState::new();
        state.set_link_transform("arm", Isometry3::translation(1.0, 0.0, 0.0));
        state.set_link_transforms(
            "hand",
            vec![
                Isometry3::translation(0.0, 1.0, 0.0),
                Isometry3::translation(0.0, 2.0, 0.0),
            ],
        );

        assert!(state.collision_body_transform("arm", 0).is_some());
        assert!(state.collision_body_transform("arm", 1).is_none());
        assert_eq!(
            state.collision_body_transform("hand", 1).unwrap().translation.y,
            2.0
        );
        assert!(state.collision_body_transform("unknown", 0).is_none());
    }
}
