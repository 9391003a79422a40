//! `patch` creates and applies binary patches in the three formats ROM
//! hacks ship in:
//!
//! * IPS: `PATCH`, a list of (u24 offset, u16 size, data) or RLE records,
//!   `EOF` and an optional u24 truncation length. All big endian.
//! * UPS: `UPS1`, variable length sizes, XOR runs between relative
//!   offsets and a trailer of three little endian CRC32s.
//! * BPS: `BPS1`, variable length sizes and metadata, a stream of
//!   read/copy actions and the same CRC32 trailer.
//!
//! The IPS and UPS generators are built on `diff`, which lists the differing byte
//! ranges of two payloads.

use bitio::{BitError, DEFAULT_MAX_OUTPUT};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;

mod bps;
mod diff;
mod ips;
mod ups;

pub use bps::{Bps, BpsAction, BpsPatch};
pub use diff::{diff, diff_coalesced, Hunk};
pub use ips::{Ips, IpsPatch, IpsRecord, MAX_RECORD, MERGE_GAP, RLE_THRESHOLD};
pub use ups::{Ups, UpsPatch};

#[cfg(test)]
mod tests;

/// `PatchError` defines the failures from creating or applying a patch.
#[derive(Error, Debug, Clone, PartialEq, Eq, IntoStaticStr)]
pub enum PatchError {
    /// The patch doesn't start with the expected magic.
    #[error("Bad magic, expected {expected:?}")]
    BadMagic {
        /// The magic that was expected.
        expected: &'static str,
    },

    /// Magic matches neither format.
    #[error("Not an IPS, UPS or BPS patch")]
    UnknownFormat,

    /// The patch ends partway through a record.
    #[error("Patch truncated at {offset:#X}")]
    TruncatedRecord {
        /// Where the incomplete record starts.
        offset: usize,
    },

    /// An offset doesn't fit in a 24 bit IPS record.
    #[error("Offset {offset:#X} doesn't fit in 24 bits")]
    OffsetTooLarge {
        /// The offset.
        offset: usize,
    },

    /// A UPS or BPS run writes past the end of the output.
    #[error("Run at {offset:#X} is past the {len} byte output")]
    RunOutOfBounds {
        /// Output offset.
        offset: usize,
        /// Output length.
        len: usize,
    },

    /// A BPS copy reads outside its buffer.
    #[error("Copy in action {action} reads out of bounds")]
    CopyOutOfBounds {
        /// Index of the action.
        action: usize,
    },

    /// The actions produced the wrong amount of output.
    #[error("Output is {actual} bytes, patch expects {expected}")]
    TargetSizeMismatch {
        /// Size recorded in the patch.
        expected: usize,
        /// Size produced.
        actual: usize,
    },

    /// A variable length value doesn't fit in 64 bits.
    #[error("Variable length value at {offset:#X} overflows")]
    VlvOverflow {
        /// Patch offset of the value.
        offset: usize,
    },

    /// Source isn't the size the patch was made for.
    #[error("Source is {actual} bytes, patch expects {expected}")]
    SourceSizeMismatch {
        /// Size recorded in the patch.
        expected: usize,
        /// Size supplied.
        actual: usize,
    },

    /// Source isn't the file the patch was made for.
    #[error("Source CRC {actual:08X} doesn't match {expected:08X}")]
    SourceCrcMismatch {
        /// CRC recorded in the patch.
        expected: u32,
        /// CRC of the supplied source.
        actual: u32,
    },

    /// Patching produced something other than the intended target.
    #[error("Target CRC {actual:08X} doesn't match {expected:08X}")]
    TargetCrcMismatch {
        /// CRC recorded in the patch.
        expected: u32,
        /// CRC of the output.
        actual: u32,
    },

    /// The patch itself is corrupt.
    #[error("Patch CRC {actual:08X} doesn't match {expected:08X}")]
    PatchCrcMismatch {
        /// CRC recorded in the trailer.
        expected: u32,
        /// CRC of the patch body.
        actual: u32,
    },

    /// Output would grow past the ceiling.
    #[error("Patched output would exceed {limit} bytes")]
    OutputLimitExceeded {
        /// The configured ceiling.
        limit: usize,
    },
}

impl From<BitError> for PatchError {
    fn from(e: BitError) -> Self {
        match e {
            BitError::UnexpectedEof { offset, .. } => PatchError::TruncatedRecord { offset },
            // Patches only read whole bytes.
            BitError::TooManyBits { .. } => PatchError::TruncatedRecord { offset: 0 },
        }
    }
}

/// `PatchFormat` is one patch encoding.
pub trait PatchFormat {
    /// Short lowercase name.
    fn name(&self) -> &'static str;

    /// Build a patch turning `source` into `target`.
    ///
    /// # Errors
    /// Format specific; IPS can't address past 16MB.
    fn create(&self, source: &[u8], target: &[u8]) -> Result<Vec<u8>, PatchError>;

    /// Apply `patch` to `source` producing at most `max_output` bytes.
    ///
    /// # Errors
    /// Any framing, validation or resource error for the format.
    fn apply_with_limit(
        &self,
        source: &[u8],
        patch: &[u8],
        max_output: usize,
    ) -> Result<Vec<u8>, PatchError>;

    /// Apply with the default output ceiling.
    ///
    /// # Errors
    /// See `apply_with_limit`.
    fn apply(&self, source: &[u8], patch: &[u8]) -> Result<Vec<u8>, PatchError> {
        self.apply_with_limit(source, patch, DEFAULT_MAX_OUTPUT)
    }
}

/// `PatchKind` names the supported formats.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum PatchKind {
    /// International Patching System.
    Ips,
    /// Universal Patching System.
    Ups,
    /// Beat Patching System.
    Bps,
}

impl PatchKind {
    /// Identify a patch by its magic.
    #[must_use]
    pub fn detect(patch: &[u8]) -> Option<Self> {
        if patch.starts_with(ips::MAGIC) {
            Some(PatchKind::Ips)
        } else if patch.starts_with(ups::MAGIC) {
            Some(PatchKind::Ups)
        } else if patch.starts_with(bps::MAGIC) {
            Some(PatchKind::Bps)
        } else {
            None
        }
    }

    /// The codec for this kind.
    #[must_use]
    pub fn format(self) -> &'static dyn PatchFormat {
        match self {
            PatchKind::Ips => &Ips,
            PatchKind::Ups => &Ups,
            PatchKind::Bps => &Bps,
        }
    }
}

/// Apply a patch of any kind, chosen by magic.
///
/// # Errors
/// `UnknownFormat` or anything the format's `apply` returns.
pub fn apply(source: &[u8], patch: &[u8]) -> Result<Vec<u8>, PatchError> {
    let kind = PatchKind::detect(patch).ok_or(PatchError::UnknownFormat)?;
    kind.format().apply(source, patch)
}
