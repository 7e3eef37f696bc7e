use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{read_skeleton, ReferenceGeometry, SkeletonDefinition};
use crate::obj::load_obj_file;
use crate::resource_fork::ResourceFork;

/// Character types with a skeleton file under `Skeletons/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkeletonType {
    BoxerFly,
    DoodleBug,
    Slug,
    Ant,
    WingedFireAnt,
    WaterBug,
    DragonFly,
    PondFish,
    Mosquito,
    Foot,
    Spider,
    Caterpillar,
    FireFly,
    Bat,
    LadyBug,
    RootSwing,
    Larva,
    FlyingBee,
    WorkerBee,
    QueenBee,
    Roach,
    Buddy,
    Skippy,
    AntKing,
}

impl SkeletonType {
    pub const ALL: [SkeletonType; 24] = [
        SkeletonType::BoxerFly,
        SkeletonType::DoodleBug,
        SkeletonType::Slug,
        SkeletonType::Ant,
        SkeletonType::WingedFireAnt,
        SkeletonType::WaterBug,
        SkeletonType::DragonFly,
        SkeletonType::PondFish,
        SkeletonType::Mosquito,
        SkeletonType::Foot,
        SkeletonType::Spider,
        SkeletonType::Caterpillar,
        SkeletonType::FireFly,
        SkeletonType::Bat,
        SkeletonType::LadyBug,
        SkeletonType::RootSwing,
        SkeletonType::Larva,
        SkeletonType::FlyingBee,
        SkeletonType::WorkerBee,
        SkeletonType::QueenBee,
        SkeletonType::Roach,
        SkeletonType::Buddy,
        SkeletonType::Skippy,
        SkeletonType::AntKing,
    ];

    /// Base file name shared by the skeleton and its reference model.
    pub fn model_name(self) -> &'static str {
        match self {
            SkeletonType::BoxerFly => "BoxerFly",
            SkeletonType::DoodleBug => "DoodleBug",
            SkeletonType::Slug => "Slug",
            SkeletonType::Ant => "Ant",
            SkeletonType::WingedFireAnt => "WingedFireAnt",
            SkeletonType::WaterBug => "WaterBug",
            SkeletonType::DragonFly => "DragonFly",
            SkeletonType::PondFish => "PondFish",
            SkeletonType::Mosquito => "Mosquito",
            SkeletonType::Foot => "Foot",
            SkeletonType::Spider => "Spider",
            SkeletonType::Caterpillar => "Caterpillar",
            SkeletonType::FireFly => "FireFly",
            SkeletonType::Bat => "Bat",
            SkeletonType::LadyBug => "LadyBug",
            SkeletonType::RootSwing => "RootSwing",
            SkeletonType::Larva => "Larva",
            SkeletonType::FlyingBee => "FlyingBee",
            SkeletonType::WorkerBee => "WorkerBee",
            SkeletonType::QueenBee => "QueenBee",
            SkeletonType::Roach => "Roach",
            SkeletonType::Buddy => "Buddy",
            SkeletonType::Skippy => "Skippy",
            SkeletonType::AntKing => "AntKing",
        }
    }

    pub fn from_model_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.model_name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for SkeletonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_name())
    }
}

/// Loads a skeleton resource file together with its OBJ reference model.
pub fn load_skeleton_file(skeleton_path: &Path, reference_path: &Path) -> Result<SkeletonDefinition> {
    let meshes = load_obj_file(reference_path)?;
    let reference = ReferenceGeometry::decompose(meshes);
    let fork = ResourceFork::open(skeleton_path)
        .with_context(|| format!("failed to open skeleton {}", skeleton_path.display()))?;
    read_skeleton(&fork, reference)
        .with_context(|| format!("failed to read skeleton {}", skeleton_path.display()))
}

/// Shares one loaded definition per character type between all instances.
#[derive(Debug)]
pub struct SkeletonCache {
    data_dir: PathBuf,
    skeletons: RwLock<HashMap<SkeletonType, Arc<SkeletonDefinition>>>,
}

impl SkeletonCache {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            skeletons: RwLock::new(HashMap::new()),
        }
    }

    pub fn skeleton_path(&self, ty: SkeletonType) -> PathBuf {
        self.data_dir
            .join("Skeletons")
            .join(format!("{}.skeleton", ty.model_name()))
    }

    pub fn reference_path(&self, ty: SkeletonType) -> PathBuf {
        self.data_dir
            .join("Skeletons")
            .join(format!("{}.obj", ty.model_name()))
    }

    /// Returns the cached definition, loading it from disk on first use.
    pub fn load(&self, ty: SkeletonType) -> Result<Arc<SkeletonDefinition>> {
        if let Some(existing) = self.get(ty) {
            return Ok(existing);
        }

        let skeleton = load_skeleton_file(&self.skeleton_path(ty), &self.reference_path(ty))
            .with_context(|| format!("failed to load skeleton type {ty}"))?;

        let mut skeletons = self.skeletons.write();
        let shared = skeletons.entry(ty).or_insert_with(|| Arc::new(skeleton));
        debug!("cached skeleton {ty}");
        Ok(Arc::clone(shared))
    }

    pub fn get(&self, ty: SkeletonType) -> Option<Arc<SkeletonDefinition>> {
        self.skeletons.read().get(&ty).cloned()
    }

    pub fn len(&self) -> usize {
        self.skeletons.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops the cache's references; instances still holding an `Arc` keep
    /// their definition alive until they are dropped.
    pub fn release_all(&self) {
        self.skeletons.write().clear();
    }
}
