use bitio::{ByteReader, LittleEndian};
use serde::{Deserialize, Serialize};
use snes_pal::Palette;

use crate::{ChrError, Flip, Image, RenderMode, Tile, TILE_DIM};

/// Bytes per tilemap entry.
pub const TILEMAP_ENTRY_SIZE: usize = 2;

const TILE_MASK: u16 = 0x03FF;
const PALETTE_SHIFT: u16 = 10;
const PALETTE_MASK: u16 = 0x07;
const PRIORITY: u16 = 0x2000;
const HFLIP: u16 = 0x4000;
const VFLIP: u16 = 0x8000;

/// `TilemapEntry` is one BG tilemap word: `vhopppcc cccccccc`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TilemapEntry {
    /// Character number (0-1023).
    pub tile: u16,
    /// Sub-palette (0-7).
    pub palette: u8,
    /// BG priority bit.
    pub priority: bool,
    /// Mirroring.
    pub flip: Flip,
}

impl TilemapEntry {
    /// Unpack a tilemap word.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_word(word: u16) -> Self {
        Self {
            tile: word & TILE_MASK,
            palette: ((word >> PALETTE_SHIFT) & PALETTE_MASK) as u8,
            priority: word & PRIORITY != 0,
            flip: Flip {
                h: word & HFLIP != 0,
                v: word & VFLIP != 0,
            },
        }
    }

    /// Pack into a tilemap word. Out of range fields are masked.
    #[must_use]
    pub fn to_word(self) -> u16 {
        let mut w = (self.tile & TILE_MASK) | ((u16::from(self.palette) & PALETTE_MASK) << PALETTE_SHIFT);
        if self.priority {
            w |= PRIORITY;
        }
        if self.flip.h {
            w |= HFLIP;
        }
        if self.flip.v {
            w |= VFLIP;
        }
        w
    }
}

/// Parse little endian tilemap words.
///
/// # Errors
/// `TilemapLength` if the input has an odd length.
pub fn parse_tilemap(bytes: &[u8]) -> Result<Vec<TilemapEntry>, ChrError> {
    if bytes.len() % TILEMAP_ENTRY_SIZE != 0 {
        return Err(ChrError::TilemapLength { len: bytes.len() });
    }
    let mut r = ByteReader::new(bytes);
    let mut out = Vec::with_capacity(bytes.len() / TILEMAP_ENTRY_SIZE);
    while !r.is_empty() {
        out.push(TilemapEntry::from_word(r.read_u16::<LittleEndian>()?));
    }
    Ok(out)
}

/// Render a tilemap `width_tiles` entries wide into RGBA8. Each entry
/// picks its tile from `tiles` and its sub-palette from `palettes`
/// (wrapping if the map names more palettes than supplied).
///
/// Returns the image size in pixels along with the RGBA bytes.
///
/// # Errors
/// `BadDimensions` if the entries don't fill whole rows, `MissingTile`
/// for a character number past the end of `tiles` and `NoPalette` if
/// `palettes` is empty.
pub fn render_tilemap(
    entries: &[TilemapEntry],
    width_tiles: usize,
    tiles: &[Tile],
    palettes: &[Palette],
    mode: RenderMode,
) -> Result<(usize, usize, Vec<u8>), ChrError> {
    if width_tiles == 0 || entries.is_empty() || entries.len() % width_tiles != 0 {
        return Err(ChrError::BadDimensions {
            width: width_tiles * TILE_DIM,
            height: entries.len().checked_div(width_tiles).unwrap_or(0) * TILE_DIM,
        });
    }
    if palettes.is_empty() {
        return Err(ChrError::NoPalette);
    }
    let width = width_tiles * TILE_DIM;
    let height = entries.len() / width_tiles * TILE_DIM;

    // Render indices and the palette each pixel came from, then resolve.
    let mut img = Image::new(width, height);
    let mut pal_of = Image::new(width, height);
    for (i, e) in entries.iter().enumerate() {
        let t = tiles.get(usize::from(e.tile)).ok_or(ChrError::MissingTile {
            index: usize::from(e.tile),
            available: tiles.len(),
        })?;
        let (px, py) = ((i % width_tiles) * TILE_DIM, (i / width_tiles) * TILE_DIM);
        img.blit(&t.flipped(e.flip), px, py);
        let fill = Tile {
            data: [e.palette; TILE_DIM * TILE_DIM],
        };
        pal_of.blit(&fill, px, py);
    }
    let rgba = img
        .pixels
        .iter()
        .zip(pal_of.pixels.iter())
        .flat_map(|(&p, &pal)| {
            palettes[usize::from(pal) % palettes.len()].rgba(p, mode == RenderMode::Sprite)
        })
        .collect();
    Ok((width, height, rgba))
}
