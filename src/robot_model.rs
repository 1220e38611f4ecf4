//! In-memory robot description the checker builds its collision objects from.
//!
//! Parsing a description file into this form is the job of the caller; the
//! checker only consumes the link collection.

use crate::shapes::Geometry;
use nalgebra::Isometry3;

/// One collision element of a link: a geometry plus its pose in link frame.
#[derive(Clone)]
pub struct LinkGeometry {
    pub geometry: Geometry,
    pub origin: Isometry3<f32>,
}

impl LinkGeometry {
    pub fn new(geometry: Geometry, origin: Isometry3<f32>) -> Self {
        LinkGeometry { geometry, origin }
    }

    /// Element placed at the link origin.
    pub fn at_origin(geometry: Geometry) -> Self {
        LinkGeometry {
            geometry,
            origin: Isometry3::identity(),
        }
    }
}

/// One link of the robot. Descriptions historically carried a single collision
/// element before growing the plural collection, so both fields exist and the
/// singleton is the fallback when the collection is empty.
#[derive(Clone)]
pub struct LinkModel {
    pub name: String,
    pub collisions: Vec<LinkGeometry>,
    pub collision: Option<LinkGeometry>,
}

impl LinkModel {
    pub fn new(name: impl Into<String>, collisions: Vec<LinkGeometry>) -> Self {
        LinkModel {
            name: name.into(),
            collisions,
            collision: None,
        }
    }

    /// The effective collision elements: the plural collection, falling back
    /// to the legacy single element when the collection is empty.
    pub fn collision_elements(&self) -> Vec<&LinkGeometry> {
        if !self.collisions.is_empty() {
            self.collisions.iter().collect()
        } else {
            self.collision.iter().collect()
        }
    }
}

/// The link collection of one robot.
pub struct RobotModel {
    links: Vec<LinkModel>,
}

impl RobotModel {
    pub fn new(links: Vec<LinkModel>) -> Self {
        RobotModel { links }
    }

    pub fn links(&self) -> &[LinkModel] {
        &self.links
    }

    pub fn link(&self, name: &str) -> Option<&LinkModel> {
        self.links.iter().find(|link| link.name == name)
    }

    pub fn link_names(&self) -> Vec<String> {
        self.links.iter().map(|link| link.name.clone()).collect()
    }
}
