//! `extract` drives the codecs over a whole ROM. A JSON manifest names
//! the assets; `extract` decodes them in parallel into PNG, JSON, WAV or
//! raw outputs and tallies failures per component instead of stopping.
//! The `import` functions go the other way and write edited assets back
//! through a `Rom::edit` session.

use snescodec::CoreError;
use strum_macros::IntoStaticStr;
use thiserror::Error;

mod import;
mod manifest;
mod pipeline;
mod report;

pub use import::{import_palettes, import_png, import_text, import_tiles};
pub use manifest::{
    open_rom, Asset, AssetKind, Compression, Location, Manifest, Source, TextConfig, Transform,
};
pub use pipeline::{extract, extract_asset, Batch, Output, OutputKind, Summary, Tally};
pub use report::HeaderReport;

#[cfg(test)]
mod tests;

/// `ExtractError` is anything that can fail while pulling out or writing
/// back one asset.
#[derive(Error, Debug, IntoStaticStr)]
pub enum ExtractError {
    /// A codec failed.
    #[error(transparent)]
    Codec(#[from] CoreError),

    /// A text asset was requested but the manifest has no table.
    #[error("Asset {name} needs a text table and the manifest has none")]
    NoTable {
        /// Asset name.
        name: String,
    },

    /// The source produced fewer bytes than the asset needs.
    #[error("Source gave {have} bytes, asset needs {want}")]
    ShortData {
        /// Bytes available.
        have: usize,
        /// Bytes wanted.
        want: usize,
    },

    /// The manifest's item count overflows the asset size.
    #[error("{count} items of {size} bytes don't fit in memory")]
    TooLarge {
        /// Item count from the manifest.
        count: usize,
        /// Bytes per item.
        size: usize,
    },

    /// The rendered sheet can't be encoded.
    #[error("Image {width}x{height} is too large")]
    ImageSize {
        /// Width in pixels.
        width: usize,
        /// Height in pixels.
        height: usize,
    },

    /// PNG encode or decode.
    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// Manifest or report serialization.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// File I/O.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    /// Variant name for the batch summary. Codec errors report the
    /// innermost variant.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractError::Codec(e) => e.kind(),
            other => other.into(),
        }
    }
}

// Each codec error converts through `CoreError` so `?` works directly.
macro_rules! via_core {
    ($($t:ty),+ $(,)?) => {
        $(
            impl From<$t> for ExtractError {
                fn from(e: $t) -> Self {
                    ExtractError::Codec(e.into())
                }
            }
        )+
    };
}

via_core!(
    addr_map::AddrError,
    bitio::BitError,
    brr::BrrError,
    lzblock::LzError,
    pointer_table::PtrError,
    snes_chr::ChrError,
    snes_pal::PalError,
    snes_rom::RomError,
    snes_text::TextError,
);
