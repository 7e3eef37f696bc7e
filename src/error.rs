use std::fmt;

use thiserror::Error;

/// Four character resource type code, e.g. `Hedr` or `KeyF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in &self.0 {
            let ch = if byte.is_ascii_graphic() || byte == b' ' {
                byte as char
            } else {
                '?'
            };
            write!(f, "{ch}")?;
        }
        Ok(())
    }
}

/// Fatal conditions raised while reconstructing data from resource files.
///
/// None of these are recoverable: downstream code assumes fully populated
/// tables, so loading stops at the first one.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid resource container: {0}")]
    InvalidContainer(String),

    #[error("missing resource '{tag}' #{id}")]
    MissingResource { tag: FourCC, id: i16 },

    #[error("resource '{tag}' #{id} is truncated: need {expected} bytes, found {actual}")]
    Truncated {
        tag: FourCC,
        id: i16,
        expected: usize,
        actual: usize,
    },

    #[error("{kind} file has wrong version: expected {expected:#06x}, found {found:#06x}")]
    VersionMismatch {
        kind: &'static str,
        expected: u32,
        found: u32,
    },

    #[error("too many {what}: {count} exceeds maximum of {max}")]
    CapacityExceeded {
        what: &'static str,
        count: usize,
        max: usize,
    },

    #[error("# of points in reference model has changed: skeleton has {found}, model has {expected}")]
    PointCountMismatch { expected: usize, found: usize },

    #[error("malformed data: {0}")]
    Malformed(String),
}

pub type LoadResult<T> = Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_display_replaces_unprintable_bytes() {
        assert_eq!(FourCC::new(b"KeyF").to_string(), "KeyF");
        assert_eq!(FourCC([b'A', 0, b'B', 0xff]).to_string(), "A?B?");
    }

    #[test]
    fn version_mismatch_message_is_hex() {
        let err = LoadError::VersionMismatch {
            kind: "skeleton",
            expected: 0x0110,
            found: 0x0100,
        };
        assert_eq!(
            err.to_string(),
            "skeleton file has wrong version: expected 0x0110, found 0x0100"
        );
    }
}
