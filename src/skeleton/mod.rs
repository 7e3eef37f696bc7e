//! Rigged character data: bone hierarchy, per-joint keyframe tables and
//! animation events.
//!
//! A [`SkeletonDefinition`] is built once per character type by
//! [`read_skeleton`] and then shared read-only between every live instance of
//! that character. Per-instance state (current animation, tick, deformed mesh
//! copies) lives with the caller; the definition only answers queries.

mod loader;
mod reference;
mod registry;

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::geometry::TriMesh;

pub use loader::{keyframe_record_id, read_skeleton, SKELETON_FILE_VERSION};
pub use reference::{DecomposedNormal, DecomposedPoint, PointRef, ReferenceGeometry};
pub use registry::{load_skeleton_file, SkeletonCache, SkeletonType};

pub const MAX_JOINTS: usize = 20;
pub const MAX_ANIMS: usize = 22;
pub const MAX_KEYFRAMES: usize = 15;
pub const MAX_ANIM_EVENTS: usize = 30;

/// Joints addressable per animation by the on-disk keyframe record ids.
pub const LEGACY_JOINTS_PER_ANIM: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    pub parent_bone: Option<usize>,
    /// Absolute bind-pose coordinate, not relative to the parent.
    pub coord: Vec3,
    /// Offset from the parent's bind coordinate, filled in after loading.
    pub relative_coord: Vec3,
    /// Indices into the decomposed reference points this bone moves.
    pub point_list: Vec<u16>,
    /// Indices into the decomposed reference normals this bone moves.
    pub normal_list: Vec<u16>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccelerationMode {
    #[default]
    Linear,
    EaseInOut,
    EaseIn,
    EaseOut,
}

impl AccelerationMode {
    /// Unknown modes fall back to linear interpolation.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            1 => AccelerationMode::EaseInOut,
            2 => AccelerationMode::EaseIn,
            3 => AccelerationMode::EaseOut,
            _ => AccelerationMode::Linear,
        }
    }

    /// Remaps a 0..1 interpolation fraction.
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            AccelerationMode::Linear => t,
            AccelerationMode::EaseInOut => t * t * (3.0 - 2.0 * t),
            AccelerationMode::EaseIn => t * t,
            AccelerationMode::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
        }
    }
}

/// One timed pose sample for a joint within an animation clip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointKeyframe {
    pub tick: i32,
    pub acceleration: AccelerationMode,
    pub coord: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

/// Keyframes of one joint, indexed `[animation][sample]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JointKeyframes {
    pub key_frames: Vec<Vec<JointKeyframe>>,
}

impl JointKeyframes {
    pub fn num_key_frames(&self, anim: usize) -> usize {
        self.key_frames.get(anim).map_or(0, Vec::len)
    }

    pub fn key_frames(&self, anim: usize) -> &[JointKeyframe] {
        self.key_frames.get(anim).map_or(&[], Vec::as_slice)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimEvent {
    pub time: i16,
    pub event_type: u8,
    pub value: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Animation {
    pub name: String,
    pub events: Vec<AnimEvent>,
}

/// Interpolated local transform of one joint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointPose {
    pub coord: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl JointPose {
    fn from_keyframe(kf: &JointKeyframe) -> Self {
        Self {
            coord: kf.coord,
            rotation: kf.rotation,
            scale: kf.scale,
        }
    }

    /// Parent-space matrix: scale, then rotate X, Y, Z, then translate.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.coord)
            * Mat4::from_rotation_z(self.rotation.z)
            * Mat4::from_rotation_y(self.rotation.y)
            * Mat4::from_rotation_x(self.rotation.x)
            * Mat4::from_scale(self.scale)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkeletonDefinition {
    pub bones: Vec<Bone>,
    /// One entry per joint, each holding that joint's keyframes per animation.
    pub joint_keyframes: Vec<JointKeyframes>,
    pub animations: Vec<Animation>,
    pub reference: ReferenceGeometry,
}

impl SkeletonDefinition {
    pub fn num_bones(&self) -> usize {
        self.bones.len()
    }

    pub fn num_anims(&self) -> usize {
        self.animations.len()
    }

    pub fn num_anim_events(&self, anim: usize) -> usize {
        self.animations.get(anim).map_or(0, |a| a.events.len())
    }

    /// Tick of the last keyframe of any joint in the animation.
    pub fn animation_length(&self, anim: usize) -> i32 {
        self.joint_keyframes
            .iter()
            .filter_map(|joint| joint.key_frames(anim).last())
            .map(|kf| kf.tick)
            .max()
            .unwrap_or(0)
    }

    /// Assigns owning bones to decomposed points/normals and derives each
    /// bone's parent-relative coordinate.
    pub(crate) fn prime_bone_data(&mut self) {
        for (b, bone) in self.bones.iter().enumerate() {
            for &p in &bone.point_list {
                self.reference.points[p as usize].which_bone = Some(b);
            }
            for &n in &bone.normal_list {
                self.reference.normals[n as usize].which_bone = Some(b);
            }
        }

        for b in 0..self.bones.len() {
            let parent_coord = self.bones[b]
                .parent_bone
                .map_or(Vec3::ZERO, |parent| self.bones[parent].coord);
            self.bones[b].relative_coord = self.bones[b].coord - parent_coord;
        }
    }

    /// Samples a joint's local pose at `tick`, or `None` for an unknown
    /// joint or animation. A joint with no keyframes rests at its bind offset.
    pub fn sample_joint(&self, joint: usize, anim: usize, tick: f32) -> Option<JointPose> {
        if anim >= self.num_anims() {
            return None;
        }
        let bone = self.bones.get(joint)?;
        let frames = self.joint_keyframes.get(joint)?.key_frames(anim);

        let (first, last) = match (frames.first(), frames.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Some(JointPose {
                    coord: bone.relative_coord,
                    rotation: Vec3::ZERO,
                    scale: Vec3::ONE,
                })
            }
        };

        if tick <= first.tick as f32 {
            return Some(JointPose::from_keyframe(first));
        }
        if tick >= last.tick as f32 {
            return Some(JointPose::from_keyframe(last));
        }

        let k = frames
            .windows(2)
            .position(|pair| tick < pair[1].tick as f32)
            .unwrap_or(frames.len() - 2);
        let from = &frames[k];
        let to = &frames[k + 1];
        let span = (to.tick - from.tick) as f32;
        let t = if span > 0.0 {
            from.acceleration.apply((tick - from.tick as f32) / span)
        } else {
            1.0
        };

        Some(JointPose {
            coord: from.coord.lerp(to.coord, t),
            rotation: from.rotation.lerp(to.rotation, t),
            scale: from.scale.lerp(to.scale, t),
        })
    }

    /// World matrices for every joint at `tick` of `anim`.
    pub fn pose_matrices(&self, anim: usize, tick: f32) -> Option<Vec<Mat4>> {
        let mut matrices: Vec<Mat4> = Vec::with_capacity(self.bones.len());
        for (j, bone) in self.bones.iter().enumerate() {
            let local = self.sample_joint(j, anim, tick)?.to_matrix();
            let world = match bone.parent_bone {
                Some(parent) => matrices[parent] * local,
                None => local,
            };
            matrices.push(world);
        }
        Some(matrices)
    }

    /// Joint matrices that reproduce the reference model unchanged.
    pub fn bind_pose_matrices(&self) -> Vec<Mat4> {
        self.bones
            .iter()
            .map(|bone| Mat4::from_translation(bone.coord))
            .collect()
    }

    /// Writes skinned points and normals into `meshes`, which must be copies
    /// of the reference meshes. Unattached points are left untouched.
    pub fn deform(&self, matrices: &[Mat4], meshes: &mut [TriMesh]) {
        for point in &self.reference.points {
            let Some(matrix) = point.which_bone.and_then(|b| matrices.get(b)) else {
                continue;
            };
            let world = matrix.transform_point3(point.bone_rel_point);
            for r in &point.refs {
                if let Some(slot) = meshes.get_mut(r.mesh).and_then(|m| m.points.get_mut(r.point)) {
                    *slot = world;
                }
            }
        }

        for normal in &self.reference.normals {
            let Some(matrix) = normal.which_bone.and_then(|b| matrices.get(b)) else {
                continue;
            };
            let world = matrix.transform_vector3(normal.real_normal).normalize_or_zero();
            for r in &normal.refs {
                if let Some(slot) = meshes
                    .get_mut(r.mesh)
                    .and_then(|m| m.vertex_normals.get_mut(r.point))
                {
                    *slot = world;
                }
            }
        }
    }
}
