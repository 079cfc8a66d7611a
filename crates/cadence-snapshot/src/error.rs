//! Snapshot decoding errors.

use std::fmt;
use std::io;

/// Errors from decoding a snapshot blob.
#[derive(Debug)]
pub enum SnapshotError {
    /// An I/O error other than running out of input.
    Io(io::Error),
    /// The blob does not start with `b"CDNC"`.
    InvalidMagic,
    /// The format version is not supported by this build.
    UnsupportedVersion {
        /// The version found in the blob.
        found: u8,
    },
    /// The blob ended before a complete image was read.
    Truncated,
    /// The trailing checksum does not match the content.
    ChecksumMismatch {
        /// Checksum stored in the blob.
        stored: u64,
        /// Checksum computed over the content.
        computed: u64,
    },
    /// The content decoded but is not a valid image.
    Malformed {
        /// Human-readable description of what went wrong.
        detail: String,
    },
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidMagic => write!(f, "invalid magic bytes (expected b\"CDNC\")"),
            Self::UnsupportedVersion { found } => {
                write!(f, "unsupported snapshot version {found}")
            }
            Self::Truncated => write!(f, "snapshot truncated"),
            Self::ChecksumMismatch { stored, computed } => write!(
                f,
                "snapshot checksum mismatch: stored={stored:#018x}, computed={computed:#018x}"
            ),
            Self::Malformed { detail } => write!(f, "malformed snapshot: {detail}"),
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SnapshotError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Self::Truncated
        } else {
            Self::Io(e)
        }
    }
}
