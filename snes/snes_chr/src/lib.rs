//! `snes_chr` provides functions and structures for manipulating planar
//! SNES tile (CHR) data at 2, 4 and 8 bits per pixel.
//!
//! Each 8x8 tile stores its bitplanes in pairs. For row y the bytes at
//! `2y` and `2y+1` hold planes 0 and 1, the next pair of planes starts 16
//! bytes later and so on. Bit 7 of each plane byte is the leftmost pixel.

use bitio::{BitError, BitReader, BitWriter};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;

mod image;
mod tilemap;

pub use image::{assemble, Image, RenderMode};
pub use tilemap::{parse_tilemap, render_tilemap, TilemapEntry, TILEMAP_ENTRY_SIZE};


/// Pixels along each edge of a tile.
pub const TILE_DIM: usize = 8;

/// `ChrError` defines the errors from tile decode/encode and assembly.
#[derive(Error, Debug, Clone, PartialEq, Eq, IntoStaticStr)]
pub enum ChrError {
    /// Input length doesn't fit the requested tile layout.
    #[error("Tile data of {len} bytes doesn't fit {depth} (need {want})")]
    BadLength {
        /// Length supplied.
        len: usize,
        /// The depth being decoded.
        depth: Depth,
        /// Length that was required.
        want: usize,
    },

    /// A pixel value can't be represented at the target depth.
    #[error("Pixel ({x},{y}) value {value} doesn't fit in {depth}")]
    IndexOutOfRange {
        /// Column of the pixel.
        x: usize,
        /// Row of the pixel.
        y: usize,
        /// The offending value.
        value: u8,
        /// Target depth.
        depth: Depth,
    },

    /// An arrangement referenced a tile that doesn't exist.
    #[error("Tile {index} requested but only {available} supplied")]
    MissingTile {
        /// Requested index.
        index: usize,
        /// Tiles available.
        available: usize,
    },

    /// Per-tile flip flags didn't match the arrangement.
    #[error("Got {got} flip entries for {want} tiles")]
    FlipCount {
        /// Entries supplied.
        got: usize,
        /// Entries needed.
        want: usize,
    },

    /// Image dimensions aren't usable (zero or not tile aligned).
    #[error("Image of {width}x{height} isn't a whole number of tiles")]
    BadDimensions {
        /// Width in pixels.
        width: usize,
        /// Height in pixels.
        height: usize,
    },

    /// Raw pixel data doesn't match the stated dimensions.
    #[error("Pixel buffer of {len} bytes doesn't match {width}x{height}")]
    PixelCount {
        /// Buffer length.
        len: usize,
        /// Width in pixels.
        width: usize,
        /// Height in pixels.
        height: usize,
    },

    /// A tilemap must be a whole number of 16 bit entries.
    #[error("Tilemap data of {len} bytes isn't a whole number of entries")]
    TilemapLength {
        /// Length supplied.
        len: usize,
    },

    /// Rendering needs at least one palette.
    #[error("No palettes supplied for rendering")]
    NoPalette,

    /// Underlying bit stream problem.
    #[error(transparent)]
    Bits(#[from] BitError),
}

impl ChrError {
    /// Variant name for reporting. Bit stream errors report their own kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ChrError::Bits(e) => e.into(),
            other => other.into(),
        }
    }
}

/// `Depth` is the number of bitplanes per tile.
#[derive(
    Debug,
    Default,
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
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    /// 4 colors, 16 bytes per tile.
    Bpp2,

    /// 16 colors, 32 bytes per tile.
    #[default]
    Bpp4,

    /// 256 colors, 64 bytes per tile.
    Bpp8,
}

impl Depth {
    /// Bits (planes) per pixel.
    #[must_use]
    pub fn bits(self) -> usize {
        match self {
            Depth::Bpp2 => 2,
            Depth::Bpp4 => 4,
            Depth::Bpp8 => 8,
        }
    }

    /// Bytes one encoded tile occupies.
    #[must_use]
    pub fn tile_size(self) -> usize {
        self.bits() * TILE_DIM
    }

    /// True if `value` is a legal pixel at this depth.
    #[must_use]
    pub fn holds(self, value: u8) -> bool {
        usize::from(value) < (1 << self.bits())
    }
}

/// `Tile` represents a decoded 8x8 tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    /// Row major color indices. Only the low `depth` bits are
    /// meaningful when encoding.
    pub data: [u8; TILE_DIM * TILE_DIM],
}

impl Default for Tile {
    fn default() -> Self {
        // Have to implement this ourselves as arrays don't go to 64 for defaults.
        Self {
            data: [0; TILE_DIM * TILE_DIM],
        }
    }
}

/// `Flip` holds the mirroring applied to a tile when it's placed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Flip {
    /// Mirror left/right.
    pub h: bool,
    /// Mirror top/bottom.
    pub v: bool,
}

impl Tile {
    /// Color index at (x, y).
    #[must_use]
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.data[y * TILE_DIM + x]
    }

    /// Set the color index at (x, y).
    pub fn set_pixel(&mut self, x: usize, y: usize, value: u8) {
        self.data[y * TILE_DIM + x] = value;
    }

    /// Mirror left/right.
    #[must_use]
    pub fn hflip(&self) -> Tile {
        let mut out = *self;
        for row in out.data.chunks_exact_mut(TILE_DIM) {
            row.reverse();
        }
        out
    }

    /// Mirror top/bottom.
    #[must_use]
    pub fn vflip(&self) -> Tile {
        let mut out = Tile::default();
        for (dst, src) in out
            .data
            .chunks_exact_mut(TILE_DIM)
            .zip(self.data.chunks_exact(TILE_DIM).rev())
        {
            dst.copy_from_slice(src);
        }
        out
    }

    /// Apply the given flips.
    #[must_use]
    pub fn flipped(&self, flip: Flip) -> Tile {
        let t = if flip.h { self.hflip() } else { *self };
        if flip.v {
            t.vflip()
        } else {
            t
        }
    }
}

// Bitplanes are visited in storage order: plane pair, then row, then the two
// planes of the pair. Both decode and encode walk this same sequence so the
// bit streams line up exactly with the byte layout.
fn plane_order(depth: Depth) -> impl Iterator<Item = (usize, usize)> {
    (0..depth.bits() / 2).flat_map(|pair| {
        (0..TILE_DIM).flat_map(move |y| [(y, pair * 2), (y, pair * 2 + 1)])
    })
}

/// Decode one tile. `bytes` must be exactly one tile's worth for `depth`.
///
/// # Errors
/// `BadLength` if the input isn't exactly `depth.tile_size()` bytes.
pub fn decode(bytes: &[u8], depth: Depth) -> Result<Tile, ChrError> {
    if bytes.len() != depth.tile_size() {
        return Err(ChrError::BadLength {
            len: bytes.len(),
            depth,
            want: depth.tile_size(),
        });
    }
    let mut tile = Tile::default();
    let mut r = BitReader::new(bytes);
    for (y, plane) in plane_order(depth) {
        for x in 0..TILE_DIM {
            if r.read_bit()? {
                tile.data[y * TILE_DIM + x] |= 1 << plane;
            }
        }
    }
    Ok(tile)
}

/// Encode one tile at the given depth.
///
/// # Errors
/// `IndexOutOfRange` if any pixel needs more than `depth` bits.
pub fn encode(tile: &Tile, depth: Depth) -> Result<Vec<u8>, ChrError> {
    for (i, &value) in tile.data.iter().enumerate() {
        if !depth.holds(value) {
            return Err(ChrError::IndexOutOfRange {
                x: i % TILE_DIM,
                y: i / TILE_DIM,
                value,
                depth,
            });
        }
    }
    let mut w = BitWriter::new();
    for (y, plane) in plane_order(depth) {
        for x in 0..TILE_DIM {
            w.write_bit(tile.data[y * TILE_DIM + x] & (1 << plane) != 0);
        }
    }
    Ok(w.finish())
}

/// Decode `tile_count` consecutive tiles from a sheet.
///
/// # Errors
/// `BadLength` if the sheet isn't a whole number of tiles or holds fewer
/// than `tile_count`.
pub fn decode_sheet(bytes: &[u8], depth: Depth, tile_count: usize) -> Result<Vec<Tile>, ChrError> {
    let size = depth.tile_size();
    if bytes.len() % size != 0 || bytes.len() / size < tile_count {
        return Err(ChrError::BadLength {
            len: bytes.len(),
            depth,
            want: tile_count * size,
        });
    }
    bytes
        .chunks_exact(size)
        .take(tile_count)
        .map(|chunk| decode(chunk, depth))
        .collect()
}

/// Encode tiles back to back.
///
/// # Errors
/// `IndexOutOfRange` from any tile that doesn't fit `depth`.
pub fn encode_sheet(tiles: &[Tile], depth: Depth) -> Result<Vec<u8>, ChrError> {
    let mut out = Vec::with_capacity(tiles.len() * depth.tile_size());
    for t in tiles {
        out.extend(encode(t, depth)?);
    }
    Ok(out)
}

/// Given a tile return a set of strings describing it where . == 0 and
/// other indices print as hex digits (values over 15 print as #).
#[must_use]
pub fn tile_print(tile: &Tile) -> Vec<String> {
    tile.data
        .chunks_exact(TILE_DIM)
        .map(|row| {
            row.iter()
                .map(|&e| match e {
                    0x00 => '.',
                    _ => char::from_digit(u32::from(e), 16).map_or('#', |c| c.to_ascii_uppercase()),
                })
                .collect()
        })
        .collect()
}
