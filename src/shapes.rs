//! Converts robot geometry descriptions into engine-native collision shapes.
//!
//! Meshes are always replaced by their convex hull; every other primitive kind
//! keeps its exact native representation. Scale and padding are applied here,
//! at conversion time, so a rebuild with new values goes through the same path.

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use parry3d::shape::SharedShape;
use std::f32::consts::FRAC_PI_2;

/// Geometry description of one collision element, as it comes from the robot
/// description. This is the closed set of primitives the checker accepts.
#[derive(Clone, Debug)]
pub enum Geometry {
    /// Full extents along x, y and z.
    Box { size: [f32; 3] },
    Sphere { radius: f32 },
    /// Radius and full length, axis along z.
    Cylinder { radius: f32, length: f32 },
    /// Base radius and full length, axis along z, apex towards +z.
    Cone { radius: f32, length: f32 },
    /// Triangle mesh. Always approximated by its convex hull in the engine.
    Mesh {
        vertices: Vec<Point3<f32>>,
        indices: Vec<[u32; 3]>,
    },
}

/// How the engine ends up representing a shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepresentationKind {
    /// The exact native primitive (box, sphere, cylinder, cone).
    UseExactShape,
    /// The convex envelope of the original geometry.
    ApproximateAsConvexHull,
}

/// Result of converting one geometry description.
pub struct ConvertedShape {
    pub shape: SharedShape,
    /// Correction to compose into the element origin. Parry cylinders and
    /// cones are y-axis aligned while robot descriptions use z.
    pub local_correction: Isometry3<f32>,
    pub kind: RepresentationKind,
}

/// Rotation bringing parry's y-aligned primitives onto the z-axis convention.
fn z_axis_correction() -> Isometry3<f32> {
    Isometry3::from_parts(
        Translation3::identity(),
        UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2),
    )
}

/// Scales the vertices about their centroid, then pushes each vertex outward
/// by the padding along its direction from the centroid. Vertices coinciding
/// with the centroid are only scaled, there is no outward direction for them.
pub fn scale_and_pad(vertices: &[Point3<f32>], scale: f32, padding: f32) -> Vec<Point3<f32>> {
    if vertices.is_empty() {
        return Vec::new();
    }
    let mut centroid = Vector3::zeros();
    for vertex in vertices {
        centroid += vertex.coords;
    }
    centroid /= vertices.len() as f32;
    let centroid = Point3::from(centroid);

    vertices
        .iter()
        .map(|vertex| {
            let offset = vertex - centroid;
            let norm = offset.norm();
            if norm > f32::EPSILON {
                centroid + offset * (scale + padding / norm)
            } else {
                centroid + offset * scale
            }
        })
        .collect()
}

/// Converts a single geometry description into its engine representation,
/// applying the uniform scale and the inflation padding.
///
/// Returns None when the geometry has no convertible representation (for
/// example a degenerate mesh whose convex hull cannot be built). Such
/// elements are skipped by the caller, this is not an error.
pub fn construct_shape(geometry: &Geometry, scale: f32, padding: f32) -> Option<ConvertedShape> {
    match geometry {
        Geometry::Box { size } => Some(ConvertedShape {
            shape: SharedShape::cuboid(
                size[0] * scale * 0.5 + padding,
                size[1] * scale * 0.5 + padding,
                size[2] * scale * 0.5 + padding,
            ),
            local_correction: Isometry3::identity(),
            kind: RepresentationKind::UseExactShape,
        }),
        Geometry::Sphere { radius } => Some(ConvertedShape {
            shape: SharedShape::ball(radius * scale + padding),
            local_correction: Isometry3::identity(),
            kind: RepresentationKind::UseExactShape,
        }),
        Geometry::Cylinder { radius, length } => Some(ConvertedShape {
            shape: SharedShape::cylinder(
                length * scale * 0.5 + padding,
                radius * scale + padding,
            ),
            local_correction: z_axis_correction(),
            kind: RepresentationKind::UseExactShape,
        }),
        Geometry::Cone { radius, length } => Some(ConvertedShape {
            shape: SharedShape::cone(length * scale * 0.5 + padding, radius * scale + padding),
            local_correction: z_axis_correction(),
            kind: RepresentationKind::UseExactShape,
        }),
        Geometry::Mesh { vertices, .. } => {
            let points = scale_and_pad(vertices, scale, padding);
            SharedShape::convex_hull(&points).map(|hull| ConvertedShape {
                shape: hull,
                local_correction: Isometry3::identity(),
                kind: RepresentationKind::ApproximateAsConvexHull,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetrahedron() -> Vec<Point3<f32>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ]
    }

    #[test]
    fn primitives_use_exact_representation() {
        let primitives = [
            Geometry::Box { size: [1.0, 2.0, 3.0] },
            Geometry::Sphere { radius: 0.5 },
            Geometry::Cylinder { radius: 0.2, length: 1.0 },
            Geometry::Cone { radius: 0.2, length: 1.0 },
        ];
        for geometry in &primitives {
            let converted = construct_shape(geometry, 1.0, 0.0)
                .expect("primitive must always convert");
            assert_eq!(converted.kind, RepresentationKind::UseExactShape);
        }
    }

    #[test]
    fn meshes_become_convex_hulls() {
        let geometry = Geometry::Mesh {
            vertices: tetrahedron(),
            indices: vec![[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]],
        };
        let converted = construct_shape(&geometry, 1.0, 0.0).expect("tetrahedron has a hull");
        assert_eq!(converted.kind, RepresentationKind::ApproximateAsConvexHull);
        assert!(converted.shape.as_convex_polyhedron().is_some());
    }

    #[test]
    fn empty_mesh_is_skipped() {
        let geometry = Geometry::Mesh {
            vertices: vec![],
            indices: vec![],
        };
        assert!(construct_shape(&geometry, 1.0, 0.0).is_none());
    }

    #[test]
    fn padding_inflates_the_sphere() {
        let geometry = Geometry::Sphere { radius: 0.5 };
        let converted = construct_shape(&geometry, 1.0, 0.1).unwrap();
        let ball = converted.shape.as_ball().expect("sphere converts to a ball");
        assert!((ball.radius - 0.6).abs() < 1e-6);

        let scaled = construct_shape(&geometry, 2.0, 0.0).unwrap();
        let ball = scaled.shape.as_ball().unwrap();
        assert!((ball.radius - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cylinder_axis_is_corrected_to_z() {
        let geometry = Geometry::Cylinder { radius: 0.1, length: 2.0 };
        let converted = construct_shape(&geometry, 1.0, 0.0).unwrap();
        // The correction must map parry's y axis onto the description's z axis.
        let mapped = converted.local_correction * Vector3::y();
        assert!((mapped - Vector3::z()).norm() < 1e-6);
    }

    #[test]
    fn scale_and_pad_moves_vertices_outward() {
        let padded = scale_and_pad(&tetrahedron(), 1.0, 0.1);
        let original = tetrahedron();
        // The extreme vertex along x must move further out along x.
        assert!(padded[1].x > original[1].x);
    }
}
