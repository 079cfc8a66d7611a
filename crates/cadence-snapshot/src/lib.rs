//! Snapshot blobs for capture and restore of a Cadence executive.
//!
//! A snapshot is a flat image of everything the executive needs to
//! resume a run exactly: job scheduling metadata, loop integrator
//! memory, event reference values and the state vectors themselves.
//! This crate owns the image types, the binary codec and the hashing
//! used for fast trajectory comparison. It knows nothing about the
//! engine; the engine fills and applies images.
//!
//! # Format
//!
//! ```text
//! [MAGIC "CDNC"] [VERSION u8] [fingerprint u64]
//! [header] [jobs] [loops] [events] [states]
//! [checksum u64]   FNV-1a over every preceding byte
//! ```
//!
//! All integers are little-endian; strings and arrays carry a `u32`
//! length prefix.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod compare;
pub mod error;
pub mod hash;
pub mod types;

pub use codec::{decode_image, encode_image};
pub use compare::{compare_images, Divergence, DivergenceKind, DivergenceReport};
pub use error::SnapshotError;
pub use hash::{checksum, state_hash, Fnv1a};
pub use types::{Blob, EventRecord, JobRecord, LoopRecord, SnapshotImage, StateRecord};

/// Magic bytes at the start of every snapshot blob.
pub const MAGIC: [u8; 4] = *b"CDNC";

/// Current binary format version.
pub const FORMAT_VERSION: u8 = 1;
