//! `snes_pal` implements the SNES 15 bit BGR color format and 16 color
//! palette blocks as they're stored in ROM (and CGRAM).
//!
//! A color is packed into a little endian word as `0bbbbbgggggrrrrr`.
//! Widening to 8 bits per channel uses bit replication so 31 maps to 255
//! and the original 5 bits can always be recovered.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use strum_macros::IntoStaticStr;
use thiserror::Error;


/// Colors in one palette block.
pub const ENTRIES: usize = 16;

/// Bytes per packed color.
pub const BYTES_PER_ENTRY: usize = 2;

/// Bytes in one packed palette block.
pub const PALETTE_SIZE: usize = ENTRIES * BYTES_PER_ENTRY;

/// Bytes in the expanded RGB view of a palette.
pub const EXPANDED_SIZE: usize = ENTRIES * 3;

const CHANNEL_MAX: u8 = 0x1F;

/// `PalError` defines the errors from the color and palette codecs.
#[derive(Error, Debug, Clone, PartialEq, Eq, IntoStaticStr)]
pub enum PalError {
    /// Input isn't a whole number of palette blocks.
    #[error("Palette data must be a multiple of {want} bytes, got {len}")]
    BadLength {
        /// Length supplied.
        len: usize,
        /// Required block size.
        want: usize,
    },

    /// A 5 bit channel was given a value above 31.
    #[error("Channel {channel} value {value} doesn't fit in 5 bits")]
    ChannelOutOfRange {
        /// Which channel (r, g or b).
        channel: char,
        /// The value supplied.
        value: u8,
    },
}

/// `Color` is a single SNES color with 5 bits per channel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    /// Red (0-31)
    pub r: u8,
    /// Green (0-31)
    pub g: u8,
    /// Blue (0-31)
    pub b: u8,
}

/// Widen a 5 bit channel to 8 bits by replicating the top bits.
#[must_use]
pub fn expand5(c: u8) -> u8 {
    let c = c & CHANNEL_MAX;
    (c << 3) | (c >> 2)
}

impl Color {
    /// Create a color from 5 bit channels.
    ///
    /// # Errors
    /// `ChannelOutOfRange` if any channel is above 31.
    pub fn new(r: u8, g: u8, b: u8) -> Result<Self, PalError> {
        for (channel, value) in [('r', r), ('g', g), ('b', b)] {
            if value > CHANNEL_MAX {
                return Err(PalError::ChannelOutOfRange { channel, value });
            }
        }
        Ok(Self { r, g, b })
    }

    /// Unpack a BGR555 word. Bit 15 is unused and ignored.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_word(word: u16) -> Self {
        // Each channel is masked to 5 bits so the casts are lossless.
        Self {
            r: (word & 0x1F) as u8,
            g: ((word >> 5) & 0x1F) as u8,
            b: ((word >> 10) & 0x1F) as u8,
        }
    }

    /// Pack into a BGR555 word.
    #[must_use]
    pub fn to_word(self) -> u16 {
        u16::from(self.r & CHANNEL_MAX)
            | (u16::from(self.g & CHANNEL_MAX) << 5)
            | (u16::from(self.b & CHANNEL_MAX) << 10)
    }

    /// Widen to 8 bits per channel.
    #[must_use]
    pub fn to_rgb8(self) -> [u8; 3] {
        [expand5(self.r), expand5(self.g), expand5(self.b)]
    }

    /// Narrow 8 bit channels by dropping the low 3 bits.
    #[must_use]
    pub fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r >> 3,
            g: g >> 3,
            b: b >> 3,
        }
    }
}

/// Pack 8 bit RGB straight into a BGR555 word.
#[must_use]
pub fn pack_rgb(r: u8, g: u8, b: u8) -> u16 {
    Color::from_rgb8(r, g, b).to_word()
}

/// Unpack a BGR555 word straight to 8 bit RGB.
#[must_use]
pub fn unpack_rgb(word: u16) -> [u8; 3] {
    Color::from_word(word).to_rgb8()
}

/// `Palette` is one 16 color block. Entry 0 is transparent when used for
/// sprites.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    /// The colors in CGRAM order.
    pub colors: [Color; ENTRIES],
}

impl Palette {
    /// Pack back into the 32 byte on-disk form.
    #[must_use]
    pub fn encode(&self) -> [u8; PALETTE_SIZE] {
        let mut out = [0u8; PALETTE_SIZE];
        for (chunk, c) in out.chunks_exact_mut(BYTES_PER_ENTRY).zip(self.colors.iter()) {
            LittleEndian::write_u16(chunk, c.to_word());
        }
        out
    }

    /// The 96 byte view of 16 (R, G, B) 8 bit triples.
    #[must_use]
    pub fn expanded(&self) -> [u8; EXPANDED_SIZE] {
        let mut out = [0u8; EXPANDED_SIZE];
        for (chunk, c) in out.chunks_exact_mut(3).zip(self.colors.iter()) {
            chunk.copy_from_slice(&c.to_rgb8());
        }
        out
    }

    /// RGBA for a palette index. With `transparent_zero` set index 0 comes
    /// back fully transparent (sprite rendering), otherwise it's opaque
    /// like every other entry (backgrounds). Indices wrap at 16.
    #[must_use]
    pub fn rgba(&self, index: u8, transparent_zero: bool) -> [u8; 4] {
        if transparent_zero && index == 0 {
            return [0, 0, 0, 0];
        }
        let [r, g, b] = self.colors[usize::from(index) % ENTRIES].to_rgb8();
        [r, g, b, 0xFF]
    }

    /// Index of the entry closest to the given 8 bit RGB value by squared
    /// Euclidean distance. Ties go to the lowest index. With
    /// `skip_transparent` set entry 0 is never chosen.
    #[must_use]
    pub fn nearest(&self, rgb: [u8; 3], skip_transparent: bool) -> u8 {
        let start = usize::from(skip_transparent);
        let mut best = start;
        let mut best_dist = u32::MAX;
        for (i, c) in self.colors.iter().enumerate().skip(start) {
            let dist: u32 = c
                .to_rgb8()
                .iter()
                .zip(rgb.iter())
                .map(|(a, b)| {
                    let d = i32::from(*a) - i32::from(*b);
                    d.unsigned_abs() * d.unsigned_abs()
                })
                .sum();
            if dist < best_dist {
                best = i;
                best_dist = dist;
            }
        }
        // ENTRIES is 16 so this always fits.
        u8::try_from(best).unwrap_or_default()
    }
}

/// Parse exactly one 32 byte palette block.
///
/// # Errors
/// `BadLength` if the input isn't exactly 32 bytes.
pub fn parse_palette(input: &[u8]) -> Result<Palette, PalError> {
    if input.len() != PALETTE_SIZE {
        return Err(PalError::BadLength {
            len: input.len(),
            want: PALETTE_SIZE,
        });
    }
    let mut pal = Palette::default();
    for (c, chunk) in pal.colors.iter_mut().zip(input.chunks_exact(BYTES_PER_ENTRY)) {
        *c = Color::from_word(LittleEndian::read_u16(chunk));
    }
    Ok(pal)
}

/// Parse consecutive palette blocks (e.g. the 8 sub-palettes of a CGRAM
/// dump).
///
/// # Errors
/// `BadLength` unless the input is a non-empty multiple of 32 bytes.
pub fn parse_palettes(input: &[u8]) -> Result<Vec<Palette>, PalError> {
    if input.is_empty() || input.len() % PALETTE_SIZE != 0 {
        return Err(PalError::BadLength {
            len: input.len(),
            want: PALETTE_SIZE,
        });
    }
    input.chunks_exact(PALETTE_SIZE).map(parse_palette).collect()
}
