//! `snescodec` ties the codec crates together. It owns `CoreError`, the one
//! error every component error converts into, and a prelude re-exporting
//! the common types.

use thiserror::Error;

pub use addr_map::AddrError;
pub use bitio::BitError;
pub use brr::BrrError;
pub use lzblock::LzError;
pub use patch::PatchError;
pub use pointer_table::PtrError;
pub use snes_chr::ChrError;
pub use snes_pal::PalError;
pub use snes_rom::RomError;
pub use snes_text::TextError;


/// `CoreError` is any failure from any codec.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Bit or byte cursor.
    #[error(transparent)]
    Bits(#[from] BitError),

    /// Address mapping.
    #[error(transparent)]
    Addr(#[from] AddrError),

    /// Colors and palettes.
    #[error(transparent)]
    Pal(#[from] PalError),

    /// Tiles.
    #[error(transparent)]
    Chr(#[from] ChrError),

    /// BRR audio.
    #[error(transparent)]
    Brr(#[from] BrrError),

    /// Text tables.
    #[error(transparent)]
    Text(#[from] TextError),

    /// Pointer tables.
    #[error(transparent)]
    Ptr(#[from] PtrError),

    /// LZ decompression.
    #[error(transparent)]
    Lz(#[from] LzError),

    /// IPS/UPS/BPS patches.
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// ROM container.
    #[error(transparent)]
    Rom(#[from] RomError),
}

impl CoreError {
    /// Name of the component that failed.
    #[must_use]
    pub fn component(&self) -> &'static str {
        match self {
            CoreError::Bits(_) => "bitio",
            CoreError::Addr(_) => "addr_map",
            CoreError::Pal(_) => "palette",
            CoreError::Chr(_) => "tiles",
            CoreError::Brr(_) => "brr",
            CoreError::Text(_) => "text",
            CoreError::Ptr(_) => "pointer_table",
            CoreError::Lz(_) => "lz",
            CoreError::Patch(_) => "patch",
            CoreError::Rom(_) => "rom",
        }
    }

    /// Variant name of the innermost error, e.g. `DanglingPointer` or
    /// `UnexpectedEof`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Bits(e) => e.into(),
            CoreError::Addr(e) => e.into(),
            CoreError::Pal(e) => e.into(),
            CoreError::Chr(e) => e.kind(),
            CoreError::Brr(e) => e.into(),
            CoreError::Text(e) => e.into(),
            CoreError::Ptr(e) => e.kind(),
            CoreError::Lz(e) => e.kind(),
            CoreError::Patch(e) => e.into(),
            CoreError::Rom(e) => e.kind(),
        }
    }
}

/// prelude exports the types most callers need.
pub mod prelude {
    pub use crate::CoreError;
    pub use addr_map::{AddrMap, Mapping};
    pub use brr::Sample;
    pub use lzblock::Grammar;
    pub use patch::{PatchFormat, PatchKind};
    pub use pointer_table::{Payload, PointerTable, Width};
    pub use snes_chr::{Depth, Flip, Image, RenderMode, Tile};
    pub use snes_pal::{Color, Palette};
    pub use snes_rom::{Rom, RomHeader, RomMut, Vectors};
    pub use snes_text::Table;
}
