use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::shards::ShardConfig;
use crate::terrain::PlayfieldOptions;

pub const DATA_DIR_VAR: &str = "RETRO3D_DATA_DIR";
pub const PREFS_DIR_VAR: &str = "RETRO3D_PREFS_DIR";

/// Runtime settings shared by the loaders and the shard simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root holding `Skeletons/` and level files.
    pub data_dir: PathBuf,
    /// Where preferences and save slots live.
    pub prefs_dir: PathBuf,
    pub playfield: PlayfieldOptions,
    pub shards: ShardConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("Data"),
            prefs_dir: PathBuf::from("Preferences"),
            playfield: PlayfieldOptions::default(),
            shards: ShardConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `RETRO3D_DATA_DIR` and `RETRO3D_PREFS_DIR`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(dir) = lookup(DATA_DIR_VAR).filter(|value| !value.is_empty()) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(PREFS_DIR_VAR).filter(|value| !value.is_empty()) {
            config.prefs_dir = PathBuf::from(dir);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_overrides_directories() {
        let config = EngineConfig::from_lookup(|key| match key {
            DATA_DIR_VAR => Some("/games/retro".to_string()),
            PREFS_DIR_VAR => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.data_dir, PathBuf::from("/games/retro"));
        assert_eq!(config.prefs_dir, PathBuf::from("Preferences"));
        assert_eq!(config.shards.capacity, 600);
        assert!(!config.playfield.load_ceiling);
    }
}
