use std::fs;
use std::io;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PREFS_HEADER: &[u8; 16] = b"Retro3DPrefs0002";
pub const PREFS_SIZE: usize = 16;
pub const PREFS_FILE_NAME: &str = "Prefs";
pub const NUM_MOUSE_SENSITIVITY_LEVELS: u8 = 5;
pub const DEFAULT_MOUSE_SENSITIVITY_LEVEL: u8 = NUM_MOUSE_SENSITIVITY_LEVELS / 2;

#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("preferences header does not match")]
    BadHeader,

    #[error("preferences file has {actual} bytes, expected {expected}")]
    BadSize { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefs {
    pub fullscreen: bool,
    pub vsync: bool,
    pub anti_aliasing_level: u8,
    pub mouse_sensitivity_level: u8,
    pub show_bottom_bar: bool,
    pub force_4x3_aspect: bool,
    pub easy_mode: bool,
    pub music_volume: u8,
}

impl Default for Prefs {
    fn default() -> Self {
        Self {
            fullscreen: true,
            vsync: true,
            anti_aliasing_level: 0,
            mouse_sensitivity_level: DEFAULT_MOUSE_SENSITIVITY_LEVEL,
            show_bottom_bar: true,
            force_4x3_aspect: false,
            easy_mode: false,
            music_volume: 255,
        }
    }
}

impl Prefs {
    fn to_bytes(self) -> [u8; PREFS_SIZE] {
        let mut bytes = [0u8; PREFS_SIZE];
        bytes[..8].copy_from_slice(&[
            self.fullscreen as u8,
            self.vsync as u8,
            self.anti_aliasing_level,
            self.mouse_sensitivity_level,
            self.show_bottom_bar as u8,
            self.force_4x3_aspect as u8,
            self.easy_mode as u8,
            self.music_volume,
        ]);
        bytes
    }

    fn from_bytes(bytes: &[u8; PREFS_SIZE]) -> Self {
        Self {
            fullscreen: bytes[0] != 0,
            vsync: bytes[1] != 0,
            anti_aliasing_level: bytes[2],
            mouse_sensitivity_level: bytes[3],
            show_bottom_bar: bytes[4] != 0,
            force_4x3_aspect: bytes[5] != 0,
            easy_mode: bytes[6] != 0,
            music_volume: bytes[7],
        }
    }
}

/// Reads the preferences file in `dir`.
pub fn load_prefs(dir: &Path) -> Result<Prefs, PrefsError> {
    let data = fs::read(dir.join(PREFS_FILE_NAME))?;
    let expected = PREFS_HEADER.len() + PREFS_SIZE;
    if data.len() < PREFS_HEADER.len() || &data[..PREFS_HEADER.len()] != PREFS_HEADER {
        return Err(PrefsError::BadHeader);
    }
    if data.len() != expected {
        return Err(PrefsError::BadSize {
            expected,
            actual: data.len(),
        });
    }

    let mut body = [0u8; PREFS_SIZE];
    body.copy_from_slice(&data[PREFS_HEADER.len()..]);
    let mut prefs = Prefs::from_bytes(&body);

    if prefs.mouse_sensitivity_level >= NUM_MOUSE_SENSITIVITY_LEVELS {
        warn!(
            "illegal mouse sensitivity level {} in prefs, using {}",
            prefs.mouse_sensitivity_level, DEFAULT_MOUSE_SENSITIVITY_LEVEL
        );
        prefs.mouse_sensitivity_level = DEFAULT_MOUSE_SENSITIVITY_LEVEL;
    }
    Ok(prefs)
}

/// Treats an absent or invalid preferences file as defaults.
pub fn load_prefs_or_default(dir: &Path) -> Prefs {
    match load_prefs(dir) {
        Ok(prefs) => prefs,
        Err(err) => {
            info!("using default preferences: {err}");
            Prefs::default()
        }
    }
}

/// Replaces the preferences file in `dir`.
pub fn save_prefs(dir: &Path, prefs: &Prefs) -> Result<(), PrefsError> {
    fs::create_dir_all(dir)?;
    let mut data = Vec::with_capacity(PREFS_HEADER.len() + PREFS_SIZE);
    data.extend_from_slice(PREFS_HEADER);
    data.extend_from_slice(&prefs.to_bytes());
    fs::write(dir.join(PREFS_FILE_NAME), data)?;
    Ok(())
}
