//! Engine layer of a retained-mode 3D action game, rewritten in Rust.
//!
//! The crate reconstructs skeletons and playfields from big-endian resource
//! files, poses and skins characters, and simulates mesh fracture debris.
//! Rendering and platform integration stay outside of the crate: shards and
//! skinned meshes are handed to a [`shards::RenderSink`] so the code remains
//! testable and easy to embed in headless tools.

pub mod config;
pub mod error;
pub mod geometry;
pub mod obj;
pub mod prefs;
pub mod records;
pub mod resource_fork;
pub mod save;
pub mod shards;
pub mod skeleton;
pub mod terrain;

pub use config::EngineConfig;
pub use error::{FourCC, LoadError, LoadResult};
pub use geometry::{MeshFeatures, TexturingMode, TriMesh};
pub use obj::{load_obj_file, load_obj_from_str};
pub use prefs::{load_prefs, load_prefs_or_default, save_prefs, Prefs, PrefsError};
pub use resource_fork::{ResourceFork, ResourceForkWriter};
pub use save::{GameProgress, SaveError, SaveGame, SaveSlots};
pub use shards::{
    FractureParams, GeometrySource, RenderSink, ShardConfig, ShardHandle, ShardMode, ShardPool,
    TerrainHeight,
};
pub use skeleton::{
    load_skeleton_file, read_skeleton, ReferenceGeometry, SkeletonCache, SkeletonDefinition,
    SkeletonType,
};
pub use terrain::{read_playfield, Playfield, PlayfieldOptions};
