use std::collections::HashMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::geometry::TriMesh;

/// Location of one vertex inside the reference mesh list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointRef {
    pub mesh: usize,
    pub point: usize,
}

/// A unique position shared by one or more mesh vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecomposedPoint {
    pub real_point: Vec3,
    /// Position relative to the owning bone's bind coordinate.
    pub bone_rel_point: Vec3,
    pub which_bone: Option<usize>,
    pub refs: Vec<PointRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecomposedNormal {
    pub real_normal: Vec3,
    pub which_bone: Option<usize>,
    pub refs: Vec<PointRef>,
}

/// Reference model plus its de-duplicated points and normals.
///
/// Bone point and normal lists index into `points` and `normals`; deforming
/// writes each unique value back to every vertex listed in its `refs`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceGeometry {
    pub meshes: Vec<TriMesh>,
    pub points: Vec<DecomposedPoint>,
    pub normals: Vec<DecomposedNormal>,
}

fn bit_key(v: Vec3) -> [u32; 3] {
    // +0.0 folds -0.0 into the same key
    [
        (v.x + 0.0).to_bits(),
        (v.y + 0.0).to_bits(),
        (v.z + 0.0).to_bits(),
    ]
}

impl ReferenceGeometry {
    /// Merges exactly coincident vertex positions and normals across meshes.
    /// Unique values are numbered in first-seen order.
    pub fn decompose(meshes: Vec<TriMesh>) -> Self {
        let mut points: Vec<DecomposedPoint> = Vec::new();
        let mut normals: Vec<DecomposedNormal> = Vec::new();
        let mut point_lookup: HashMap<[u32; 3], usize> = HashMap::new();
        let mut normal_lookup: HashMap<[u32; 3], usize> = HashMap::new();

        for (m, mesh) in meshes.iter().enumerate() {
            for (p, &position) in mesh.points.iter().enumerate() {
                let at = PointRef { mesh: m, point: p };
                let index = *point_lookup.entry(bit_key(position)).or_insert_with(|| {
                    points.push(DecomposedPoint {
                        real_point: position,
                        bone_rel_point: position,
                        which_bone: None,
                        refs: Vec::new(),
                    });
                    points.len() - 1
                });
                points[index].refs.push(at);
            }

            for (p, &normal) in mesh.vertex_normals.iter().enumerate() {
                let at = PointRef { mesh: m, point: p };
                let index = *normal_lookup.entry(bit_key(normal)).or_insert_with(|| {
                    normals.push(DecomposedNormal {
                        real_normal: normal,
                        which_bone: None,
                        refs: Vec::new(),
                    });
                    normals.len() - 1
                });
                normals[index].refs.push(at);
            }
        }

        Self {
            meshes,
            points,
            normals,
        }
    }

    pub fn num_decomposed_points(&self) -> usize {
        self.points.len()
    }

    pub fn num_decomposed_normals(&self) -> usize {
        self.normals.len()
    }

    /// Fresh copies of the reference meshes for per-instance deformation.
    pub fn clone_meshes(&self) -> Vec<TriMesh> {
        self.meshes.clone()
    }
}
