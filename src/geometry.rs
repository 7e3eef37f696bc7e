use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::error::{LoadError, LoadResult};

/// Most quads one mesh can hold with 16-bit vertex indices.
pub const MAX_QUADS_PER_MESH: usize = (u16::MAX as usize + 1) / 4;

/// Which optional per-vertex channels a mesh carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeshFeatures {
    pub normals: bool,
    pub uvs: bool,
    pub colors: bool,
}

impl MeshFeatures {
    pub const NONE: Self = Self {
        normals: false,
        uvs: false,
        colors: false,
    };
    pub const ALL: Self = Self {
        normals: true,
        uvs: true,
        colors: true,
    };
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TexturingMode {
    #[default]
    Off,
    Opaque,
    AlphaTest,
    AlphaBlend,
}

/// Handle to a texture owned by the rendering collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureRef(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
    pub is_empty: bool,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min: Vec3::ZERO,
            max: Vec3::ZERO,
            is_empty: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    pub origin: Vec3,
    pub radius: f32,
    pub is_empty: bool,
}

/// Indexed triangle mesh with optional per-vertex channels.
///
/// Channel vectors are either empty or exactly `points.len()` long.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriMesh {
    pub points: Vec<Vec3>,
    pub triangles: Vec<[u16; 3]>,
    pub vertex_normals: Vec<Vec3>,
    pub vertex_uvs: Vec<Vec2>,
    pub vertex_colors: Vec<Vec4>,
    pub has_vertex_colors: bool,
    pub texturing_mode: TexturingMode,
    pub texture: Option<TextureRef>,
    pub diffuse_color: Vec4,
    pub bbox: BoundingBox,
}

impl Default for TriMesh {
    fn default() -> Self {
        Self::new(0, 0, MeshFeatures::NONE)
    }
}

impl TriMesh {
    /// Allocates a mesh with room for the given triangles and points.
    pub fn new(num_triangles: usize, num_points: usize, features: MeshFeatures) -> Self {
        let channel = |wanted: bool| if wanted { num_points } else { 0 };
        Self {
            points: vec![Vec3::ZERO; num_points],
            triangles: vec![[0; 3]; num_triangles],
            vertex_normals: vec![Vec3::ZERO; channel(features.normals)],
            vertex_uvs: vec![Vec2::ZERO; channel(features.uvs)],
            vertex_colors: vec![Vec4::ONE; channel(features.colors)],
            has_vertex_colors: features.colors,
            texturing_mode: TexturingMode::Off,
            texture: None,
            diffuse_color: Vec4::ONE,
            bbox: BoundingBox::default(),
        }
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    pub fn has_vertex_normals(&self) -> bool {
        !self.vertex_normals.is_empty()
    }

    pub fn has_vertex_uvs(&self) -> bool {
        !self.vertex_uvs.is_empty()
    }

    /// Flat normal of a triangle, or zero for a degenerate one.
    pub fn face_normal(&self, triangle: usize) -> Vec3 {
        let [a, b, c] = self.triangles[triangle];
        let p0 = self.points[a as usize];
        let p1 = self.points[b as usize];
        let p2 = self.points[c as usize];
        (p1 - p0).cross(p2 - p0).normalize_or_zero()
    }

    pub fn recompute_bbox(&mut self) {
        self.bbox = calc_bounding_box(std::slice::from_ref(self));
    }
}

/// Axis-aligned bounds over every point of every mesh.
pub fn calc_bounding_box(meshes: &[TriMesh]) -> BoundingBox {
    let mut bbox = BoundingBox::default();
    for p in meshes.iter().flat_map(|mesh| mesh.points.iter()) {
        if bbox.is_empty {
            bbox = BoundingBox {
                min: *p,
                max: *p,
                is_empty: false,
            };
        } else {
            bbox.min = bbox.min.min(*p);
            bbox.max = bbox.max.max(*p);
        }
    }
    bbox
}

/// Sphere centred on the mean point, enclosing every point.
pub fn calc_bounding_sphere(meshes: &[TriMesh]) -> BoundingSphere {
    let mut total = 0usize;
    let mut origin = Vec3::ZERO;
    for p in meshes.iter().flat_map(|mesh| mesh.points.iter()) {
        origin += *p;
        total += 1;
    }
    if total == 0 {
        return BoundingSphere {
            origin: Vec3::ZERO,
            radius: 0.0,
            is_empty: true,
        };
    }
    origin /= total as f32;

    let radius_squared = meshes
        .iter()
        .flat_map(|mesh| mesh.points.iter())
        .map(|p| origin.distance_squared(*p))
        .fold(0.0f32, f32::max);

    BoundingSphere {
        origin,
        radius: radius_squared.sqrt(),
        is_empty: false,
    }
}

/// Appends a Z-mirrored clone of every mesh, with winding inverted so the
/// clones still face outward.
pub fn mirror_meshes_z(meshes: &mut Vec<TriMesh>) {
    let originals = meshes.len();
    for i in 0..originals {
        let mut clone = meshes[i].clone();
        for p in &mut clone.points {
            p.z = -p.z;
        }
        for n in &mut clone.vertex_normals {
            n.z = -n.z;
        }
        for tri in &mut clone.triangles {
            tri.swap(0, 2);
        }
        clone.recompute_bbox();
        meshes.push(clone);
    }
}

/// Offsets every UV coordinate of a mesh.
pub fn scroll_uvs(mesh: &mut TriMesh, du: f32, dv: f32) {
    let delta = Vec2::new(du, dv);
    for uv in &mut mesh.vertex_uvs {
        *uv += delta;
    }
}

/// Builds `num_quads` stacked quads centred on the origin in the XY plane.
pub fn make_quad_mesh(num_quads: usize, width: f32, height: f32) -> LoadResult<TriMesh> {
    if num_quads > MAX_QUADS_PER_MESH {
        return Err(LoadError::CapacityExceeded {
            what: "quads per mesh",
            count: num_quads,
            max: MAX_QUADS_PER_MESH,
        });
    }
    let features = MeshFeatures {
        uvs: true,
        ..MeshFeatures::NONE
    };
    let mut mesh = TriMesh::new(2 * num_quads, 4 * num_quads, features);
    let x = width * 0.5;
    let y = height * 0.5;

    for q in 0..num_quads {
        let base = (4 * q) as u16;
        mesh.triangles[2 * q] = [base, base + 1, base + 2];
        mesh.triangles[2 * q + 1] = [base, base + 2, base + 3];

        let p = 4 * q;
        mesh.points[p] = Vec3::new(-x, -y, 0.0);
        mesh.points[p + 1] = Vec3::new(x, -y, 0.0);
        mesh.points[p + 2] = Vec3::new(x, y, 0.0);
        mesh.points[p + 3] = Vec3::new(-x, y, 0.0);

        mesh.vertex_uvs[p] = Vec2::new(0.0, 1.0);
        mesh.vertex_uvs[p + 1] = Vec2::new(1.0, 1.0);
        mesh.vertex_uvs[p + 2] = Vec2::new(1.0, 0.0);
        mesh.vertex_uvs[p + 3] = Vec2::new(0.0, 0.0);
    }
    mesh.recompute_bbox();
    Ok(mesh)
}

/// Screen-space rectangle in layout coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadRect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

/// Builds a single UI quad spanning `xy` and sampling `uv`.
pub fn make_quad_mesh_ui(xy: QuadRect, uv: QuadRect) -> TriMesh {
    let features = MeshFeatures {
        uvs: true,
        ..MeshFeatures::NONE
    };
    let mut mesh = TriMesh::new(2, 4, features);
    mesh.triangles[0] = [0, 1, 2];
    mesh.triangles[1] = [0, 2, 3];

    mesh.points[0] = Vec3::new(xy.left, xy.bottom, 0.0);
    mesh.points[1] = Vec3::new(xy.right, xy.bottom, 0.0);
    mesh.points[2] = Vec3::new(xy.right, xy.top, 0.0);
    mesh.points[3] = Vec3::new(xy.left, xy.top, 0.0);

    mesh.vertex_uvs[0] = Vec2::new(uv.left, uv.bottom);
    mesh.vertex_uvs[1] = Vec2::new(uv.right, uv.bottom);
    mesh.vertex_uvs[2] = Vec2::new(uv.right, uv.top);
    mesh.vertex_uvs[3] = Vec2::new(uv.left, uv.top);
    mesh.recompute_bbox();
    mesh
}
