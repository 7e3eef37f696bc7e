use glam::Vec3;
use log::{debug, info};

use super::{
    AccelerationMode, AnimEvent, Animation, Bone, JointKeyframe, JointKeyframes,
    ReferenceGeometry, SkeletonDefinition, LEGACY_JOINTS_PER_ANIM, MAX_ANIMS, MAX_ANIM_EVENTS,
    MAX_JOINTS, MAX_KEYFRAMES,
};
use crate::error::{FourCC, LoadError, LoadResult};
use crate::records::{
    c_string, checked_count, decode_all_records, decode_record, decode_records, pascal_string,
    Record, RecordReader, ShortRead,
};
use crate::resource_fork::ResourceFork;

pub const SKELETON_FILE_VERSION: u16 = 0x0110;

const HEDR: FourCC = FourCC::new(b"Hedr");
const BONE: FourCC = FourCC::new(b"Bone");
const BONP: FourCC = FourCC::new(b"BonP");
const BONN: FourCC = FourCC::new(b"BonN");
const RELP: FourCC = FourCC::new(b"RelP");
const ANHD: FourCC = FourCC::new(b"AnHd");
const EVNT: FourCC = FourCC::new(b"Evnt");
const NUMK: FourCC = FourCC::new(b"NumK");
const KEYF: FourCC = FourCC::new(b"KeyF");

const BASE_ID: i16 = 1000;

#[derive(Debug, Clone, Copy)]
struct FileSkeletonHeader {
    version: i16,
    num_anims: i16,
    num_joints: i16,
    _num_limbs: i16,
}

impl Record for FileSkeletonHeader {
    const SIZE: usize = 8;

    fn decode(reader: &mut RecordReader<'_>) -> Result<Self, ShortRead> {
        Ok(Self {
            version: reader.i16()?,
            num_anims: reader.i16()?,
            num_joints: reader.i16()?,
            _num_limbs: reader.i16()?,
        })
    }
}

#[derive(Debug, Clone)]
struct FileBone {
    parent_bone: i32,
    name: [u8; 32],
    coord: Vec3,
    num_points: u16,
    num_normals: u16,
}

impl Record for FileBone {
    const SIZE: usize = 84;

    fn decode(reader: &mut RecordReader<'_>) -> Result<Self, ShortRead> {
        let bone = Self {
            parent_bone: reader.i32()?,
            name: reader.bytes::<32>()?,
            coord: reader.vec3()?,
            num_points: reader.u16()?,
            num_normals: reader.u16()?,
        };
        reader.skip(32)?;
        Ok(bone)
    }
}

#[derive(Debug, Clone)]
struct FileAnimHeader {
    name_len: u8,
    name: [u8; 32],
    num_events: i16,
}

impl Record for FileAnimHeader {
    const SIZE: usize = 36;

    fn decode(reader: &mut RecordReader<'_>) -> Result<Self, ShortRead> {
        let name_len = reader.u8()?;
        let name = reader.bytes::<32>()?;
        reader.skip(1)?;
        Ok(Self {
            name_len,
            name,
            num_events: reader.i16()?,
        })
    }
}

impl Record for AnimEvent {
    const SIZE: usize = 4;

    fn decode(reader: &mut RecordReader<'_>) -> Result<Self, ShortRead> {
        Ok(Self {
            time: reader.i16()?,
            event_type: reader.u8()?,
            value: reader.u8()?,
        })
    }
}

impl Record for JointKeyframe {
    const SIZE: usize = 44;

    fn decode(reader: &mut RecordReader<'_>) -> Result<Self, ShortRead> {
        Ok(Self {
            tick: reader.i32()?,
            acceleration: AccelerationMode::from_raw(reader.i32()?),
            coord: reader.vec3()?,
            rotation: reader.vec3()?,
            scale: reader.vec3()?,
        })
    }
}

/// On-disk id of the keyframe record for one (animation, joint) pair.
///
/// The file format packs both indices into a single id, so joints past
/// [`LEGACY_JOINTS_PER_ANIM`] cannot be addressed.
pub fn keyframe_record_id(anim: usize, joint: usize) -> LoadResult<i16> {
    if joint >= LEGACY_JOINTS_PER_ANIM {
        return Err(LoadError::CapacityExceeded {
            what: "joints per keyframe record block",
            count: joint + 1,
            max: LEGACY_JOINTS_PER_ANIM,
        });
    }
    anim.checked_mul(LEGACY_JOINTS_PER_ANIM)
        .and_then(|offset| offset.checked_add(joint))
        .and_then(|offset| i16::try_from(offset).ok())
        .and_then(|offset| BASE_ID.checked_add(offset))
        .ok_or_else(|| {
            LoadError::Malformed(format!(
                "keyframe record id for animation {anim}, joint {joint} is out of range"
            ))
        })
}

fn record_id(index: usize) -> LoadResult<i16> {
    i16::try_from(index)
        .ok()
        .and_then(|offset| BASE_ID.checked_add(offset))
        .ok_or_else(|| LoadError::Malformed(format!("record index {index} is out of range")))
}

fn check_capacity(what: &'static str, count: usize, max: usize) -> LoadResult<()> {
    if count > max {
        return Err(LoadError::CapacityExceeded { what, count, max });
    }
    Ok(())
}

fn check_indices(what: &str, bone: usize, indices: &[u16], limit: usize) -> LoadResult<()> {
    match indices.iter().find(|&&i| i as usize >= limit) {
        Some(bad) => Err(LoadError::Malformed(format!(
            "bone {bone} references {what} {bad}, but the reference model has {limit}"
        ))),
        None => Ok(()),
    }
}

/// Reconstructs a skeleton definition from its resource file.
///
/// `reference` must already be decomposed: the relative point table in the
/// file is validated against its point count, and bone attachment lists index
/// into its points and normals. An animation with no events needs no `Evnt`
/// record; one is never read for it.
pub fn read_skeleton(
    fork: &ResourceFork,
    reference: ReferenceGeometry,
) -> LoadResult<SkeletonDefinition> {
    let header: FileSkeletonHeader = decode_record(HEDR, BASE_ID, fork.require(HEDR, BASE_ID)?)?;
    if header.version as u16 != SKELETON_FILE_VERSION {
        return Err(LoadError::VersionMismatch {
            kind: "skeleton",
            expected: SKELETON_FILE_VERSION as u32,
            found: header.version as u16 as u32,
        });
    }

    let num_anims = checked_count("animation count", header.num_anims as i64)?;
    let num_joints = checked_count("joint count", header.num_joints as i64)?;
    check_capacity("joints", num_joints, MAX_JOINTS)?;
    check_capacity("animations", num_anims, MAX_ANIMS)?;

    let num_points = reference.num_decomposed_points();
    let num_normals = reference.num_decomposed_normals();

    let mut bones = Vec::with_capacity(num_joints);
    for i in 0..num_joints {
        let id = record_id(i)?;
        let file_bone: FileBone = decode_record(BONE, id, fork.require(BONE, id)?)?;

        let parent_bone = match file_bone.parent_bone {
            -1 => None,
            p if p >= 0 && (p as usize) < i => Some(p as usize),
            p => {
                return Err(LoadError::Malformed(format!(
                    "bone {i} has invalid parent {p}"
                )))
            }
        };

        let point_list: Vec<u16> = decode_records(
            BONP,
            id,
            fork.require(BONP, id)?,
            file_bone.num_points as usize,
        )?;
        let normal_list: Vec<u16> = decode_records(
            BONN,
            id,
            fork.require(BONN, id)?,
            file_bone.num_normals as usize,
        )?;
        check_indices("point", i, &point_list, num_points)?;
        check_indices("normal", i, &normal_list, num_normals)?;

        bones.push(Bone {
            name: c_string(&file_bone.name),
            parent_bone,
            coord: file_bone.coord,
            relative_coord: Vec3::ZERO,
            point_list,
            normal_list,
        });
    }
    debug!("read {} bone(s) from {}", bones.len(), fork.label());

    let relative_points: Vec<Vec3> = decode_all_records(RELP, BASE_ID, fork.require(RELP, BASE_ID)?)?;
    if relative_points.len() != num_points {
        return Err(LoadError::PointCountMismatch {
            expected: num_points,
            found: relative_points.len(),
        });
    }
    let mut reference = reference;
    for (point, rel) in reference.points.iter_mut().zip(relative_points) {
        point.bone_rel_point = rel;
    }

    let mut animations = Vec::with_capacity(num_anims);
    let mut joint_keyframes = vec![
        JointKeyframes {
            key_frames: Vec::with_capacity(num_anims),
        };
        num_joints
    ];

    for a in 0..num_anims {
        let id = record_id(a)?;
        let anim_header: FileAnimHeader = decode_record(ANHD, id, fork.require(ANHD, id)?)?;
        let num_events = checked_count("event count", anim_header.num_events as i64)?;
        check_capacity("animation events", num_events, MAX_ANIM_EVENTS)?;

        let events: Vec<AnimEvent> = if num_events == 0 {
            Vec::new()
        } else {
            decode_records(EVNT, id, fork.require(EVNT, id)?, num_events)?
        };

        let key_counts: Vec<u8> = decode_records(NUMK, id, fork.require(NUMK, id)?, num_joints)?;
        for (j, &count) in key_counts.iter().enumerate() {
            let count = count as usize;
            check_capacity("keyframes", count, MAX_KEYFRAMES)?;
            let key_id = keyframe_record_id(a, j)?;
            let frames: Vec<JointKeyframe> =
                decode_records(KEYF, key_id, fork.require(KEYF, key_id)?, count)?;
            joint_keyframes[j].key_frames.push(frames);
        }

        animations.push(Animation {
            name: pascal_string(anim_header.name_len, &anim_header.name),
            events,
        });
    }
    debug!("read {} animation(s) from {}", animations.len(), fork.label());

    let mut skeleton = SkeletonDefinition {
        bones,
        joint_keyframes,
        animations,
        reference,
    };
    skeleton.prime_bone_data();

    info!(
        "loaded skeleton {} ({} bones, {} animations)",
        fork.label(),
        skeleton.num_bones(),
        skeleton.num_anims()
    );
    Ok(skeleton)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::geometry::{MeshFeatures, TriMesh};
    use crate::records::RecordWriter;
    use crate::resource_fork::ResourceForkWriter;

    pub(crate) fn reference_triangle() -> ReferenceGeometry {
        let mut mesh = TriMesh::new(1, 3, MeshFeatures {
            normals: true,
            ..MeshFeatures::NONE
        });
        mesh.points = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        mesh.vertex_normals = vec![Vec3::Z; 3];
        mesh.triangles[0] = [0, 1, 2];
        ReferenceGeometry::decompose(vec![mesh])
    }

    fn name_field(name: &str) -> [u8; 32] {
        let mut field = [0u8; 32];
        field[..name.len()].copy_from_slice(name.as_bytes());
        field
    }

    /// Two joints, one animation with two keyframes on the root.
    pub(crate) fn skeleton_fork() -> ResourceForkWriter {
        let mut fork = ResourceForkWriter::new();
        fork.add(
            HEDR,
            1000,
            None,
            RecordWriter::new().i16(0x0110).i16(1).i16(2).i16(0).finish(),
        );

        let bones: [(i32, &str, Vec3, &[u16]); 2] = [
            (-1, "Root", Vec3::ZERO, &[0, 1]),
            (0, "Tip", Vec3::Y, &[2]),
        ];
        for (i, (parent, name, coord, points)) in bones.iter().enumerate() {
            let id = 1000 + i as i16;
            fork.add(
                BONE,
                id,
                None,
                RecordWriter::new()
                    .i32(*parent)
                    .bytes(&name_field(name))
                    .vec3(*coord)
                    .u16(points.len() as u16)
                    .u16(1)
                    .zeros(32)
                    .finish(),
            );
            let mut bonp = RecordWriter::new();
            for p in points.iter() {
                bonp.u16(*p);
            }
            fork.add(BONP, id, None, bonp.finish());
            fork.add(BONN, id, None, RecordWriter::new().u16(0).finish());
        }

        fork.add(
            RELP,
            1000,
            None,
            RecordWriter::new()
                .vec3(Vec3::ZERO)
                .vec3(Vec3::X)
                .vec3(Vec3::ZERO)
                .finish(),
        );

        let mut anhd = RecordWriter::new();
        anhd.u8(4).bytes(&name_field("Walk")).u8(0).i16(1);
        fork.add(ANHD, 1000, None, anhd.finish());
        fork.add(EVNT, 1000, None, RecordWriter::new().i16(5).u8(2).u8(7).finish());
        fork.add(NUMK, 1000, None, vec![2, 0]);

        let mut root_keys = RecordWriter::new();
        for (tick, x) in [(0, 0.0), (10, 4.0)] {
            root_keys
                .i32(tick)
                .i32(0)
                .vec3(Vec3::new(x, 0.0, 0.0))
                .vec3(Vec3::ZERO)
                .vec3(Vec3::ONE);
        }
        fork.add(KEYF, 1000, None, root_keys.finish());
        fork.add(KEYF, 1001, None, Vec::new());
        fork
    }

    fn load(writer: &ResourceForkWriter) -> LoadResult<SkeletonDefinition> {
        let fork = ResourceFork::from_bytes("test.skeleton", writer.to_bytes())?;
        read_skeleton(&fork, reference_triangle())
    }

    #[test]
    fn reads_header_counts_and_tables() {
        let skeleton = load(&skeleton_fork()).unwrap();
        assert_eq!(skeleton.num_bones(), 2);
        assert_eq!(skeleton.num_anims(), 1);
        assert_eq!(skeleton.bones[1].name, "Tip");
        assert_eq!(skeleton.bones[1].parent_bone, Some(0));
        assert_eq!(skeleton.bones[0].point_list, vec![0, 1]);
        assert_eq!(skeleton.animations[0].name, "Walk");
        assert_eq!(
            skeleton.animations[0].events,
            vec![AnimEvent {
                time: 5,
                event_type: 2,
                value: 7
            }]
        );
        assert_eq!(skeleton.joint_keyframes[0].num_key_frames(0), 2);
        assert_eq!(skeleton.joint_keyframes[1].num_key_frames(0), 0);
        assert_eq!(skeleton.joint_keyframes[0].key_frames(0)[1].tick, 10);
    }

    #[test]
    fn priming_fills_relative_data() {
        let skeleton = load(&skeleton_fork()).unwrap();
        assert_eq!(skeleton.reference.points[1].bone_rel_point, Vec3::X);
        assert_eq!(skeleton.reference.points[2].which_bone, Some(1));
        assert_eq!(skeleton.bones[1].relative_coord, Vec3::Y);
    }

    #[test]
    fn wrong_version_is_fatal() {
        let mut writer = skeleton_fork();
        writer.add(
            HEDR,
            1000,
            None,
            RecordWriter::new().i16(0x0100).i16(1).i16(2).i16(0).finish(),
        );
        assert!(matches!(
            load(&writer),
            Err(LoadError::VersionMismatch { found: 0x0100, .. })
        ));
    }

    #[test]
    fn too_many_joints_is_fatal() {
        let mut writer = skeleton_fork();
        writer.add(
            HEDR,
            1000,
            None,
            RecordWriter::new().i16(0x0110).i16(1).i16(21).i16(0).finish(),
        );
        assert!(matches!(
            load(&writer),
            Err(LoadError::CapacityExceeded { what: "joints", count: 21, max: 20 })
        ));
    }

    #[test]
    fn too_many_animations_is_fatal() {
        let mut writer = skeleton_fork();
        writer.add(
            HEDR,
            1000,
            None,
            RecordWriter::new().i16(0x0110).i16(23).i16(2).i16(0).finish(),
        );
        assert!(matches!(
            load(&writer),
            Err(LoadError::CapacityExceeded { what: "animations", count: 23, max: 22 })
        ));
    }

    #[test]
    fn too_many_keyframes_is_fatal() {
        let mut writer = skeleton_fork();
        writer.add(NUMK, 1000, None, vec![16, 0]);
        assert!(matches!(
            load(&writer),
            Err(LoadError::CapacityExceeded { what: "keyframes", count: 16, max: 15 })
        ));
    }

    #[test]
    fn eventless_animation_needs_no_event_record() {
        let bytes = skeleton_fork().to_bytes();
        let full = ResourceFork::from_bytes("full", bytes).unwrap();
        let mut writer = ResourceForkWriter::new();
        for tag in full.tags() {
            for id in full.ids(tag) {
                if tag != EVNT {
                    writer.add(tag, id, None, full.get(tag, id).unwrap().to_vec());
                }
            }
        }
        let mut anhd = RecordWriter::new();
        anhd.u8(4).bytes(&name_field("Walk")).u8(0).i16(0);
        writer.add(ANHD, 1000, None, anhd.finish());

        let skeleton = load(&writer).unwrap();
        assert!(skeleton.animations[0].events.is_empty());
    }

    #[test]
    fn relative_point_count_must_match_reference() {
        let mut writer = skeleton_fork();
        writer.add(RELP, 1000, None, RecordWriter::new().vec3(Vec3::ZERO).finish());
        assert!(matches!(
            load(&writer),
            Err(LoadError::PointCountMismatch { expected: 3, found: 1 })
        ));
    }

    #[test]
    fn missing_keyframe_record_is_fatal() {
        let bytes = skeleton_fork().to_bytes();
        let full = ResourceFork::from_bytes("full", bytes).unwrap();
        let mut writer = ResourceForkWriter::new();
        for tag in full.tags() {
            for id in full.ids(tag) {
                if tag == KEYF && id == 1001 {
                    continue;
                }
                writer.add(tag, id, None, full.get(tag, id).unwrap().to_vec());
            }
        }
        assert!(matches!(
            load(&writer),
            Err(LoadError::MissingResource { id: 1001, .. })
        ));
    }

    #[test]
    fn bad_attachment_index_is_fatal() {
        let mut writer = skeleton_fork();
        writer.add(BONP, 1001, None, RecordWriter::new().u16(9).finish());
        assert!(matches!(load(&writer), Err(LoadError::Malformed(_))));
    }

    #[test]
    fn keyframe_ids_compose_animation_and_joint() {
        assert_eq!(keyframe_record_id(0, 0).unwrap(), 1000);
        assert_eq!(keyframe_record_id(3, 7).unwrap(), 1307);
        assert!(matches!(
            keyframe_record_id(0, 100),
            Err(LoadError::CapacityExceeded { .. })
        ));
        assert!(keyframe_record_id(400, 0).is_err());
    }
}
