use serde::{Deserialize, Serialize};
use snes_pal::Palette;
use strum_macros::{Display, EnumString};

use crate::{ChrError, Flip, Tile, TILE_DIM};

/// `RenderMode` selects how color index 0 is drawn.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Index 0 is transparent.
    #[default]
    Sprite,

    /// Index 0 is drawn with palette entry 0.
    Background,
}

impl RenderMode {
    fn transparent_zero(self) -> bool {
        self == RenderMode::Sprite
    }
}

/// `Image` is a row major matrix of color indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// `width * height` indices.
    pub pixels: Vec<u8>,
}

impl Image {
    /// A zero filled image.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height],
        }
    }

    /// Wrap an existing index buffer.
    ///
    /// # Errors
    /// `PixelCount` if the buffer doesn't match the dimensions.
    pub fn from_pixels(width: usize, height: usize, pixels: Vec<u8>) -> Result<Self, ChrError> {
        if pixels.len() != width * height {
            return Err(ChrError::PixelCount {
                len: pixels.len(),
                width,
                height,
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Copy a tile into the image with its top left at pixel (px, py).
    /// Anything falling outside the image is clipped.
    pub fn blit(&mut self, tile: &Tile, px: usize, py: usize) {
        for y in 0..TILE_DIM {
            if py + y >= self.height {
                break;
            }
            for x in 0..TILE_DIM {
                if px + x >= self.width {
                    break;
                }
                self.pixels[(py + y) * self.width + px + x] = tile.pixel(x, y);
            }
        }
    }

    /// Convert to RGBA8 using a palette.
    #[must_use]
    pub fn to_rgba(&self, palette: &Palette, mode: RenderMode) -> Vec<u8> {
        self.pixels
            .iter()
            .flat_map(|&p| palette.rgba(p, mode.transparent_zero()))
            .collect()
    }

    /// Cut the image back into tiles, left to right then top to bottom.
    ///
    /// # Errors
    /// `BadDimensions` unless both dimensions are non-zero multiples of 8.
    pub fn to_tiles(&self) -> Result<Vec<Tile>, ChrError> {
        check_dimensions(self.width, self.height)?;
        let mut out = Vec::new();
        for ty in 0..self.height / TILE_DIM {
            for tx in 0..self.width / TILE_DIM {
                let mut t = Tile::default();
                for y in 0..TILE_DIM {
                    let row = (ty * TILE_DIM + y) * self.width + tx * TILE_DIM;
                    t.data[y * TILE_DIM..(y + 1) * TILE_DIM]
                        .copy_from_slice(&self.pixels[row..row + TILE_DIM]);
                }
                out.push(t);
            }
        }
        Ok(out)
    }

    /// Quantise RGBA8 pixels against a palette. In sprite mode pixels
    /// with alpha below 128 become index 0 and opaque pixels never map to
    /// entry 0.
    ///
    /// # Errors
    /// `PixelCount` if the buffer isn't `width * height * 4` bytes.
    pub fn from_rgba(
        width: usize,
        height: usize,
        rgba: &[u8],
        palette: &Palette,
        mode: RenderMode,
    ) -> Result<Self, ChrError> {
        if rgba.len() != width * height * 4 {
            return Err(ChrError::PixelCount {
                len: rgba.len(),
                width,
                height,
            });
        }
        let transparent = mode.transparent_zero();
        let pixels = rgba
            .chunks_exact(4)
            .map(|px| {
                if transparent && px[3] < 0x80 {
                    0
                } else {
                    palette.nearest([px[0], px[1], px[2]], transparent)
                }
            })
            .collect();
        Self::from_pixels(width, height, pixels)
    }
}

fn check_dimensions(width: usize, height: usize) -> Result<(), ChrError> {
    if width == 0 || height == 0 || width % TILE_DIM != 0 || height % TILE_DIM != 0 {
        return Err(ChrError::BadDimensions { width, height });
    }
    Ok(())
}

/// Assemble a `w` x `h` tile arrangement into one image. Tile `(tx, ty)`
/// is `tiles[ty * w + tx]` and lands at pixels `8tx..8tx+8, 8ty..8ty+8`
/// after its flips are applied. `flips` is either empty (no flips) or one
/// entry per placed tile.
///
/// # Errors
/// `BadDimensions` for a zero sized arrangement, `MissingTile` if there
/// are fewer than `w * h` tiles and `FlipCount` if `flips` is the wrong
/// length.
pub fn assemble(tiles: &[Tile], w: usize, h: usize, flips: &[Flip]) -> Result<Image, ChrError> {
    check_dimensions(w * TILE_DIM, h * TILE_DIM)?;
    let want = w * h;
    if tiles.len() < want {
        // Slots fill in order, so the first empty one is `tiles.len()`.
        return Err(ChrError::MissingTile {
            index: tiles.len(),
            available: tiles.len(),
        });
    }
    if !flips.is_empty() && flips.len() != want {
        return Err(ChrError::FlipCount {
            got: flips.len(),
            want,
        });
    }
    let mut img = Image::new(w * TILE_DIM, h * TILE_DIM);
    for (i, t) in tiles.iter().take(want).enumerate() {
        let flip = flips.get(i).copied().unwrap_or_default();
        img.blit(&t.flipped(flip), (i % w) * TILE_DIM, (i / w) * TILE_DIM);
    }
    Ok(img)
}
