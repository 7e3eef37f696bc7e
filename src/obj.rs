use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use glam::{Vec2, Vec3};

use crate::geometry::{MeshFeatures, TexturingMode, TriMesh};

/// Parses an OBJ reference model from memory.
///
/// Each `o` or `g` group becomes its own mesh; vertices shared by several
/// faces of one group are emitted once. Normals are computed when the file
/// does not supply them.
pub fn load_obj_from_str(data: &str) -> Result<Vec<TriMesh>> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();
    let mut groups: Vec<Vec<[FaceIndex; 3]>> = vec![Vec::new()];

    for (line_no, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        match tag {
            "v" => positions.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid vertex on line {}", line_no + 1))?,
            ),
            "vn" => normals.push(
                parse_vec3(parts)
                    .with_context(|| format!("invalid normal on line {}", line_no + 1))?,
            ),
            "vt" => uvs.push(
                parse_vec2(parts)
                    .with_context(|| format!("invalid texture coordinate on line {}", line_no + 1))?,
            ),
            "o" | "g" => {
                if groups.last().is_some_and(|faces| !faces.is_empty()) {
                    groups.push(Vec::new());
                }
            }
            "f" => {
                let polygon = parse_face(parts)
                    .with_context(|| format!("invalid face on line {}", line_no + 1))?;
                if let Some(faces) = groups.last_mut() {
                    triangulate_face(&polygon, faces);
                }
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("OBJ file does not define any vertices"));
    }

    groups
        .iter()
        .filter(|faces| !faces.is_empty())
        .map(|faces| build_mesh(&positions, &normals, &uvs, faces))
        .collect()
}

/// Reads and parses an OBJ reference model from disk.
pub fn load_obj_file<P: AsRef<Path>>(path: P) -> Result<Vec<TriMesh>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read reference model {}", path.display()))?;
    load_obj_from_str(&text)
        .with_context(|| format!("unable to parse reference model {}", path.display()))
}

fn parse_vec3<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let mut next = || -> Result<f32> {
        Ok(parts
            .next()
            .ok_or_else(|| anyhow!("missing vector component"))?
            .parse::<f32>()?)
    };
    let x = next()?;
    let y = next()?;
    let z = next()?;
    Ok(Vec3::new(x, y, z))
}

fn parse_vec2<'a>(mut parts: impl Iterator<Item = &'a str>) -> Result<Vec2> {
    let u = parts
        .next()
        .ok_or_else(|| anyhow!("missing texture component"))?
        .parse::<f32>()?;
    let v = parts.next().map(str::parse::<f32>).transpose()?.unwrap_or(0.0);
    Ok(Vec2::new(u, v))
}

fn parse_face<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Vec<FaceIndex>> {
    let mut indices = Vec::new();
    for part in parts {
        let mut segments = part.split('/');
        let v = segments
            .next()
            .ok_or_else(|| anyhow!("missing vertex index"))?
            .parse::<i32>()?;
        let mut optional = || -> Result<i32> {
            match segments.next() {
                Some(s) if !s.is_empty() => Ok(s.parse::<i32>()?),
                _ => Ok(0),
            }
        };
        let vt = optional()?;
        let vn = optional()?;
        indices.push(FaceIndex { v, vt, vn });
    }
    if indices.len() < 3 {
        return Err(anyhow!("faces must reference at least 3 vertices"));
    }
    Ok(indices)
}

fn triangulate_face(polygon: &[FaceIndex], faces: &mut Vec<[FaceIndex; 3]>) {
    for i in 1..(polygon.len() - 1) {
        faces.push([polygon[0], polygon[i], polygon[i + 1]]);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
    position: usize,
    uv: Option<usize>,
    normal: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct FaceIndex {
    v: i32,
    vt: i32,
    vn: i32,
}

fn build_mesh(
    positions: &[Vec3],
    normals: &[Vec3],
    uvs: &[Vec2],
    faces: &[[FaceIndex; 3]],
) -> Result<TriMesh> {
    let mut lookup: HashMap<Key, u16> = HashMap::new();
    let mut mesh = TriMesh::new(
        0,
        0,
        MeshFeatures {
            normals: true,
            uvs: !uvs.is_empty(),
            colors: false,
        },
    );
    let mut normal_given = Vec::new();

    for face in faces {
        let mut triangle = [0u16; 3];
        for (corner, idx) in face.iter().enumerate() {
            let position =
                fix_index(idx.v, positions.len()).ok_or_else(|| anyhow!("invalid vertex index"))?;
            let key = Key {
                position,
                uv: fix_index(idx.vt, uvs.len()),
                normal: fix_index(idx.vn, normals.len()),
            };
            let next_index = u16::try_from(mesh.points.len())
                .map_err(|_| anyhow!("mesh has more than 65535 vertices"))?;
            let index = *lookup.entry(key).or_insert_with(|| {
                mesh.points.push(positions[position]);
                mesh.vertex_normals
                    .push(key.normal.map(|i| normals[i]).unwrap_or(Vec3::ZERO));
                normal_given.push(key.normal.is_some());
                if !uvs.is_empty() {
                    mesh.vertex_uvs
                        .push(key.uv.map(|i| uvs[i]).unwrap_or(Vec2::ZERO));
                }
                next_index
            });
            triangle[corner] = index;
        }
        mesh.triangles.push(triangle);
    }

    if normal_given.iter().any(|given| !given) {
        compute_normals(&mut mesh);
    }
    if mesh.has_vertex_uvs() {
        mesh.texturing_mode = TexturingMode::Opaque;
    }
    mesh.recompute_bbox();
    Ok(mesh)
}

fn fix_index(index: i32, len: usize) -> Option<usize> {
    if index > 0 {
        let zero_based = index as usize - 1;
        (zero_based < len).then_some(zero_based)
    } else if index < 0 {
        let abs = index.unsigned_abs() as usize;
        (abs <= len).then_some(len - abs)
    } else {
        None
    }
}

fn compute_normals(mesh: &mut TriMesh) {
    let mut accum = vec![Vec3::ZERO; mesh.points.len()];

    for t in 0..mesh.triangles.len() {
        let normal = mesh.face_normal(t);
        if normal != Vec3::ZERO {
            for &i in &mesh.triangles[t] {
                accum[i as usize] += normal;
            }
        }
    }

    for (slot, normal) in mesh.vertex_normals.iter_mut().zip(accum) {
        *slot = normal.normalize_or_zero();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_triangle() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let meshes = load_obj_from_str(obj).unwrap();
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].triangles, vec![[0, 1, 2]]);
        assert_eq!(meshes[0].num_points(), 3);
    }

    #[test]
    fn computes_missing_normals() {
        let obj = "\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = &load_obj_from_str(obj).unwrap()[0];
        for normal in &mesh.vertex_normals {
            assert!((normal.length() - 1.0).abs() < 1e-5);
            assert_eq!(*normal, Vec3::Z);
        }
    }

    #[test]
    fn groups_become_separate_meshes() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nv 1 1 0\n\
                   o Body\nf 1 2 3\no Head\nf 2 4 3\n";
        let meshes = load_obj_from_str(obj).unwrap();
        assert_eq!(meshes.len(), 2);
        assert_eq!(meshes[1].points[0], Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn quads_are_triangulated_with_uvs() {
        let obj = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
                   vt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\n\
                   vn 0 0 1\n\
                   f 1/1/1 2/2/1 3/3/1 4/4/1\n";
        let mesh = &load_obj_from_str(obj).unwrap()[0];
        assert_eq!(mesh.num_triangles(), 2);
        assert_eq!(mesh.num_points(), 4);
        assert_eq!(mesh.vertex_uvs[2], Vec2::new(1.0, 1.0));
        assert_eq!(mesh.texturing_mode, TexturingMode::Opaque);
    }

    #[test]
    fn rejects_empty_and_bad_indices() {
        assert!(load_obj_from_str("# nothing").is_err());
        assert!(load_obj_from_str("v 0 0 0\nf 1 2 3\n").is_err());
    }
}
