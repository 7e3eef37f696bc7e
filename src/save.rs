//! Save-game slots stored as fixed-size big-endian records.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::records::{RecordReader, RecordWriter};

pub const SAVE_GAME_VERSION: u32 = 0x0120;
pub const NUM_SAVE_FILES: usize = 3;
pub const SAVE_GAME_SIZE: usize = 32;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("save slot {0} does not exist")]
    InvalidSlot(usize),

    #[error("save file is too short: need {expected} bytes, found {actual}")]
    Short { expected: usize, actual: usize },

    #[error("save file has wrong version: expected {expected:#06x}, found {found:#06x}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// On-disk save record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SaveGame {
    pub version: u32,
    pub score: u32,
    /// Level the game resumes at.
    pub real_level: i16,
    pub num_lives: i16,
    pub health: f32,
    pub ball_timer: f32,
    pub num_gold_clovers: i16,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
}

impl SaveGame {
    pub fn to_bytes(&self) -> Vec<u8> {
        RecordWriter::new()
            .u32(self.version)
            .u32(self.score)
            .i16(self.real_level)
            .i16(self.num_lives)
            .f32(self.health)
            .f32(self.ball_timer)
            .i16(self.num_gold_clovers)
            .zeros(2)
            .i64(self.timestamp)
            .finish()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SaveError> {
        if bytes.len() < SAVE_GAME_SIZE {
            return Err(SaveError::Short {
                expected: SAVE_GAME_SIZE,
                actual: bytes.len(),
            });
        }
        let mut reader = RecordReader::big_endian(&bytes[..SAVE_GAME_SIZE]);
        let short = |_| SaveError::Short {
            expected: SAVE_GAME_SIZE,
            actual: bytes.len(),
        };
        let version = reader.u32().map_err(short)?;
        if version != SAVE_GAME_VERSION {
            return Err(SaveError::VersionMismatch {
                expected: SAVE_GAME_VERSION,
                found: version,
            });
        }
        let score = reader.u32().map_err(short)?;
        let real_level = reader.i16().map_err(short)?;
        let num_lives = reader.i16().map_err(short)?;
        let health = reader.f32().map_err(short)?;
        let ball_timer = reader.f32().map_err(short)?;
        let num_gold_clovers = reader.i16().map_err(short)?;
        reader.skip(2).map_err(short)?;
        let timestamp = reader.i64().map_err(short)?;
        Ok(Self {
            version,
            score,
            real_level,
            num_lives,
            health,
            ball_timer,
            num_gold_clovers,
            timestamp,
        })
    }
}

/// Player state carried between levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameProgress {
    pub score: u32,
    pub real_level: i16,
    pub num_lives: i16,
    pub health: f32,
    pub ball_timer: f32,
    pub num_gold_clovers: i16,
    /// Set when the state came from a save file.
    pub restoring_saved_game: bool,
}

impl GameProgress {
    pub fn new_game() -> Self {
        Self {
            score: 0,
            real_level: 0,
            num_lives: 3,
            health: 1.0,
            ball_timer: 1.0,
            num_gold_clovers: 0,
            restoring_saved_game: false,
        }
    }

    /// Restores a slot, falling back to a fresh game when it cannot be read.
    pub fn restore_or_new(slots: &SaveSlots, slot: usize) -> Self {
        let mut progress = Self::new_game();
        if let Err(err) = slots.load_into(slot, &mut progress) {
            warn!("starting new game, save slot {slot} unusable: {err}");
        }
        progress
    }

    fn apply(&mut self, save: &SaveGame) {
        self.score = save.score;
        self.real_level = save.real_level;
        self.num_lives = save.num_lives;
        self.health = save.health;
        self.ball_timer = save.ball_timer;
        self.num_gold_clovers = save.num_gold_clovers;
        self.restoring_saved_game = true;
    }
}

impl Default for GameProgress {
    fn default() -> Self {
        Self::new_game()
    }
}

/// Save files `SaveA` .. `SaveC` inside one directory.
#[derive(Debug, Clone)]
pub struct SaveSlots {
    dir: PathBuf,
}

impl SaveSlots {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, slot: usize) -> Result<PathBuf, SaveError> {
        if slot >= NUM_SAVE_FILES {
            return Err(SaveError::InvalidSlot(slot));
        }
        let letter = char::from(b'A' + slot as u8);
        Ok(self.dir.join(format!("Save{letter}")))
    }

    /// Writes the progress so that loading resumes at the next level.
    pub fn save(&self, slot: usize, progress: &GameProgress) -> Result<(), SaveError> {
        let path = self.path(slot)?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as i64)
            .unwrap_or(0);
        let record = SaveGame {
            version: SAVE_GAME_VERSION,
            score: progress.score,
            real_level: progress.real_level.saturating_add(1),
            num_lives: progress.num_lives,
            health: progress.health,
            ball_timer: progress.ball_timer,
            num_gold_clovers: progress.num_gold_clovers,
            timestamp,
        };
        fs::create_dir_all(&self.dir)?;
        fs::write(&path, record.to_bytes())?;
        info!("saved game to {}", path.display());
        Ok(())
    }

    pub fn read(&self, slot: usize) -> Result<SaveGame, SaveError> {
        let bytes = fs::read(self.path(slot)?)?;
        SaveGame::from_bytes(&bytes)
    }

    /// Copies a slot into `progress`; on any error `progress` is untouched.
    pub fn load_into(&self, slot: usize, progress: &mut GameProgress) -> Result<(), SaveError> {
        let save = self.read(slot)?;
        progress.apply(&save);
        Ok(())
    }

    pub fn delete(&self, slot: usize) -> Result<(), SaveError> {
        fs::remove_file(self.path(slot)?)?;
        Ok(())
    }
}
