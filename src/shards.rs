//! Fixed-capacity pool of single-triangle debris fragments.
//!
//! Fracturing a mesh turns a subsample of its triangles into shards, each
//! re-centred on its own centroid so it spins in place while its transform
//! carries it through the world. The pool never grows: once every slot is in
//! use, further fracture requests are silently truncated.

use std::ops::{BitOr, BitOrAssign};

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use log::{debug, warn};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::geometry::{MeshFeatures, TexturingMode, TriMesh};

pub const DEFAULT_MAX_SHARDS: usize = 600;

/// Behaviour bits chosen when a shard is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardMode(u8);

impl ShardMode {
    pub const NONE: ShardMode = ShardMode(0);
    pub const BOUNCE: ShardMode = ShardMode(1);
    pub const UPTHRUST: ShardMode = ShardMode(1 << 1);
    pub const HEAVY_GRAVITY: ShardMode = ShardMode(1 << 2);

    pub const fn from_bits(bits: u8) -> Self {
        ShardMode(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: ShardMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ShardMode {
    type Output = ShardMode;

    fn bitor(self, rhs: ShardMode) -> ShardMode {
        ShardMode(self.0 | rhs.0)
    }
}

impl BitOrAssign for ShardMode {
    fn bitor_assign(&mut self, rhs: ShardMode) {
        self.0 |= rhs.0;
    }
}

/// Pool capacity and physics tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardConfig {
    pub capacity: usize,
    pub gravity: f32,
    pub heavy_gravity: f32,
    /// Floor height used when no terrain is supplied or the query misses.
    pub floor_pin: f32,
    /// Extra vertical launch speed per unit of force in upthrust mode.
    pub upthrust: f32,
    pub bounce_damping: f32,
    pub bounce_friction: f32,
    /// Width of the uniform angular velocity range, centred on zero.
    pub spin: f32,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_MAX_SHARDS,
            gravity: 1700.0 / 3.0,
            heavy_gravity: 1700.0 / 2.0,
            floor_pin: -100.0,
            upthrust: 1.5,
            bounce_damping: 0.5,
            bounce_friction: 0.9,
            spin: 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FractureParams {
    pub force: f32,
    pub mode: ShardMode,
    /// Triangle stride; every `density`-th source triangle becomes a shard.
    pub density: usize,
    pub decay_speed: f32,
}

impl Default for FractureParams {
    fn default() -> Self {
        Self {
            force: 500.0,
            mode: ShardMode::NONE,
            density: 1,
            decay_speed: 1.0,
        }
    }
}

/// How the meshes handed to [`ShardPool::explode_geometry`] are placed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeometrySource {
    /// Skinned vertices are already in world space.
    Skinned,
    /// Static geometry placed by its base transform.
    Static(Mat4),
}

impl GeometrySource {
    fn transform(&self) -> Mat4 {
        match self {
            GeometrySource::Skinned => Mat4::IDENTITY,
            GeometrySource::Static(base) => *base,
        }
    }
}

/// Floor height lookup supplied by the level.
pub trait TerrainHeight {
    /// Height of the floor at world `(x, z)`, or `None` off the map.
    fn height_at(&self, x: f32, z: f32) -> Option<f32>;
}

/// Render submission collaborator.
pub trait RenderSink {
    fn submit_mesh(&mut self, mesh: &TriMesh, transform: &Mat4, sort_position: Vec3);
}

/// Per-shard data laid out for a GPU instance buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShardInstance {
    pub model: [[f32; 4]; 4],
    pub diffuse_color: [f32; 4],
}

/// Index of a slot in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShardHandle(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct Shard {
    pub used: bool,
    /// One triangle, points relative to `coord`.
    pub mesh: TriMesh,
    pub coord: Vec3,
    pub rotation: Vec3,
    pub scale: f32,
    pub coord_delta: Vec3,
    pub rot_delta: Vec3,
    pub decay_speed: f32,
    pub mode: ShardMode,
    pub matrix: Mat4,
}

impl Shard {
    fn empty() -> Self {
        let mut mesh = TriMesh::new(1, 3, MeshFeatures {
            normals: true,
            uvs: true,
            colors: false,
        });
        mesh.triangles[0] = [0, 1, 2];
        Self {
            used: false,
            mesh,
            coord: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: 1.0,
            coord_delta: Vec3::ZERO,
            rot_delta: Vec3::ZERO,
            decay_speed: 0.0,
            mode: ShardMode::NONE,
            matrix: Mat4::IDENTITY,
        }
    }

    /// Scale, then rotate X, Y, Z, then translate.
    fn update_matrix(&mut self) {
        self.matrix = Mat4::from_translation(self.coord)
            * Mat4::from_rotation_z(self.rotation.z)
            * Mat4::from_rotation_y(self.rotation.y)
            * Mat4::from_rotation_x(self.rotation.x)
            * Mat4::from_scale(Vec3::splat(self.scale));
    }
}

#[derive(Debug, Clone)]
pub struct ShardPool {
    config: ShardConfig,
    shards: Vec<Shard>,
    num_active: usize,
    rng: Pcg32,
}

impl ShardPool {
    pub fn new(config: ShardConfig) -> Self {
        Self::with_rng(config, Pcg32::from_rng(&mut rand::rng()))
    }

    /// Pool whose launch velocities are reproducible.
    pub fn with_seed(config: ShardConfig, seed: u64) -> Self {
        Self::with_rng(config, Pcg32::seed_from_u64(seed))
    }

    fn with_rng(config: ShardConfig, rng: Pcg32) -> Self {
        let shards = (0..config.capacity).map(|_| Shard::empty()).collect();
        Self {
            config,
            shards,
            num_active: 0,
            rng,
        }
    }

    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.shards.len()
    }

    pub fn active_count(&self) -> usize {
        self.num_active
    }

    pub fn shard(&self, handle: ShardHandle) -> Option<&Shard> {
        self.shards.get(handle.0).filter(|shard| shard.used)
    }

    /// First unused slot, or `None` when the pool is full.
    pub fn find_free_slot(&self) -> Option<ShardHandle> {
        if self.num_active >= self.shards.len() {
            return None;
        }
        self.shards
            .iter()
            .position(|shard| !shard.used)
            .map(ShardHandle)
    }

    /// Breaks every `density`-th triangle of `mesh` into a shard.
    ///
    /// Returns the number of shards created, which falls short of
    /// `ceil(triangles / density)` when the pool fills up or a sampled
    /// triangle indexes past the mesh's points. Normal and UV channels that
    /// do not cover every point are ignored.
    pub fn fracture(&mut self, mesh: &TriMesh, transform: &Mat4, params: &FractureParams) -> usize {
        let density = params.density.max(1);
        let num_points = mesh.points.len();
        let normals = mesh.vertex_normals.len() == num_points;
        let textured = mesh.texturing_mode != TexturingMode::Off
            && mesh.has_vertex_uvs()
            && mesh.vertex_uvs.len() == num_points;
        let colored = mesh.has_vertex_colors && mesh.vertex_colors.len() == num_points;
        let mut created = 0;

        for triangle in mesh.triangles.iter().step_by(density) {
            let ind = triangle.map(usize::from);
            if ind.iter().any(|&i| i >= num_points) {
                warn!("skipping triangle {triangle:?} of a {num_points}-point mesh");
                continue;
            }
            let Some(ShardHandle(index)) = self.find_free_slot() else {
                break;
            };

            let shard = &mut self.shards[index];
            let s_mesh = &mut shard.mesh;

            let points = ind.map(|i| transform.transform_point3(mesh.points[i]));
            let face_normal = (points[1] - points[0]).cross(points[2] - points[0]);
            let center = (points[0] + points[1] + points[2]) / 3.0;
            s_mesh.points.clear();
            s_mesh.points.extend(points.iter().map(|p| *p - center));

            s_mesh.vertex_normals.clear();
            if normals {
                s_mesh.vertex_normals.extend(
                    ind.iter()
                        .map(|&i| transform.transform_vector3(mesh.vertex_normals[i]).normalize_or_zero()),
                );
            } else {
                s_mesh
                    .vertex_normals
                    .extend(std::iter::repeat(face_normal.normalize_or_zero()).take(3));
            }

            s_mesh.vertex_uvs.clear();
            if textured {
                s_mesh.texturing_mode = mesh.texturing_mode;
                s_mesh.texture = mesh.texture;
                s_mesh.vertex_uvs.extend(ind.iter().map(|&i| mesh.vertex_uvs[i]));
            } else {
                s_mesh.texturing_mode = TexturingMode::Off;
                s_mesh.texture = None;
            }

            s_mesh.diffuse_color = mesh.diffuse_color;
            s_mesh.has_vertex_colors = colored;
            s_mesh.vertex_colors.clear();
            if colored {
                s_mesh.vertex_colors.extend(ind.iter().map(|&i| mesh.vertex_colors[i]));
            }
            s_mesh.bbox.min = center;
            s_mesh.bbox.max = center;
            s_mesh.bbox.is_empty = false;

            shard.coord = center;
            shard.rotation = Vec3::ZERO;
            shard.scale = 1.0;

            let rng = &mut self.rng;
            let mut velocity = Vec3::new(
                (rng.random::<f32>() - 0.5) * params.force,
                (rng.random::<f32>() - 0.5) * params.force,
                (rng.random::<f32>() - 0.5) * params.force,
            );
            if params.mode.contains(ShardMode::UPTHRUST) {
                velocity.y += self.config.upthrust * params.force;
            }
            shard.coord_delta = velocity;

            let spin = self.config.spin;
            shard.rot_delta = Vec3::new(
                (rng.random::<f32>() - 0.5) * spin,
                (rng.random::<f32>() - 0.5) * spin,
                (rng.random::<f32>() - 0.5) * spin,
            );

            shard.decay_speed = params.decay_speed;
            shard.mode = params.mode;
            shard.update_matrix();
            shard.used = true;
            self.num_active += 1;
            created += 1;
        }

        created
    }

    /// Fractures every mesh of an object.
    pub fn explode_geometry(
        &mut self,
        meshes: &[TriMesh],
        source: GeometrySource,
        params: &FractureParams,
    ) -> usize {
        let transform = source.transform();
        let created = meshes
            .iter()
            .map(|mesh| self.fracture(mesh, &transform, params))
            .sum();
        debug!(
            "exploded {} mesh(es) into {created} shard(s), {} active",
            meshes.len(),
            self.num_active
        );
        created
    }

    /// Advances every active shard by `dt` seconds.
    pub fn tick(&mut self, dt: f32, terrain: Option<&dyn TerrainHeight>) {
        if self.num_active == 0 {
            return;
        }

        for shard in self.shards.iter_mut().filter(|shard| shard.used) {
            shard.rotation += shard.rot_delta * dt;

            let gravity = if shard.mode.contains(ShardMode::HEAVY_GRAVITY) {
                self.config.heavy_gravity
            } else {
                self.config.gravity
            };
            shard.coord_delta.y -= gravity * dt;
            shard.coord += shard.coord_delta * dt;

            let ty = terrain
                .and_then(|t| t.height_at(shard.coord.x, shard.coord.z))
                .unwrap_or(self.config.floor_pin);

            let mut alive = true;
            if shard.coord.y <= ty {
                if shard.mode.contains(ShardMode::BOUNCE) {
                    shard.coord.y = ty;
                    shard.coord_delta.y *= -self.config.bounce_damping;
                    shard.coord_delta.x *= self.config.bounce_friction;
                    shard.coord_delta.z *= self.config.bounce_friction;
                } else {
                    alive = false;
                }
            }

            if alive {
                shard.scale -= shard.decay_speed * dt;
                alive = shard.scale > 0.0;
            }

            if alive {
                shard.update_matrix();
            } else {
                shard.used = false;
                self.num_active -= 1;
            }
        }
    }

    /// Submits every active shard with its centre as the sort position.
    pub fn draw(&self, sink: &mut dyn RenderSink) {
        if self.num_active == 0 {
            return;
        }
        for shard in self.shards.iter().filter(|shard| shard.used) {
            sink.submit_mesh(&shard.mesh, &shard.matrix, shard.coord);
        }
    }

    pub fn instances(&self) -> Vec<ShardInstance> {
        self.shards
            .iter()
            .filter(|shard| shard.used)
            .map(|shard| ShardInstance {
                model: shard.matrix.to_cols_array_2d(),
                diffuse_color: shard.mesh.diffuse_color.to_array(),
            })
            .collect()
    }

    /// Frees every slot while keeping the allocated meshes.
    pub fn reset(&mut self) {
        for shard in &mut self.shards {
            shard.used = false;
        }
        self.num_active = 0;
    }

    /// Releases the pool's storage; the pool has zero capacity afterwards.
    pub fn dispose(&mut self) {
        self.shards.clear();
        self.shards.shrink_to_fit();
        self.num_active = 0;
    }
}

impl Default for ShardPool {
    fn default() -> Self {
        Self::new(ShardConfig::default())
    }
}
