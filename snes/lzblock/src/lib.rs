//! `lzblock` decompresses the LZ style token streams graphics and tilemap
//! blocks are stored in, plus the small expansion transforms the game's
//! loaders apply afterwards.
//!
//! The main stream is a run of control bytes. Each control byte's bits,
//! MSB first, say what the next 8 tokens are:
//!
//! * 0: one literal byte copied from input.
//! * 1: a 2 byte pair split into (length, distance). `length` bytes are
//!   copied from `distance` bytes back in the output (overlap allowed).
//!
//! The split, biases and how the stream ends differ between games so a
//! `Grammar` value drives the decoder. There's no compressor; imports
//! write uncompressed data instead.

use bitio::{BitError, BitReader, ByteReader, LittleEndian};
use log::debug;
use serde::{Deserialize, Serialize};
use strum_macros::IntoStaticStr;
use thiserror::Error;

mod expand;
mod tail;

pub use expand::{compact_nibbles, compact_second_half, expand_nibbles, expand_second_half};
pub use tail::decompress_tail_window;

#[cfg(test)]
mod tests;

/// `LzError` defines the failures from any of the decoders here.
#[derive(Error, Debug, Clone, PartialEq, Eq, IntoStaticStr)]
pub enum LzError {
    /// The grammar can't split a 16 bit pair this way.
    #[error("Length must take 1-15 bits of the pair, got {length_bits}")]
    BadGrammar {
        /// Requested length bits.
        length_bits: u32,
    },

    /// A back reference with length 0.
    #[error("Zero length back reference at input {offset:#X}")]
    LengthZero {
        /// Input offset of the pair.
        offset: usize,
    },

    /// A back reference reaching before the start of output.
    #[error("Back reference distance {distance} at input {offset:#X} but only {available} bytes decoded")]
    DistanceOutOfBounds {
        /// Requested distance.
        distance: usize,
        /// Output produced so far.
        available: usize,
        /// Input offset of the reference.
        offset: usize,
    },

    /// Output would grow past the ceiling.
    #[error("Decompressed output would exceed {limit} bytes")]
    OutputLimitExceeded {
        /// The configured ceiling.
        limit: usize,
    },

    /// Input length isn't a whole number of chunks.
    #[error("Input of {len} bytes isn't a multiple of {chunk}")]
    BadChunk {
        /// Input length.
        len: usize,
        /// Required chunk size.
        chunk: usize,
    },

    /// A byte that must be zero padding isn't.
    #[error("Padding byte at {offset:#X} is {value:#04X}, not 0")]
    NonZeroPad {
        /// Offset in the input.
        offset: usize,
        /// What was there.
        value: u8,
    },

    /// An index too large for a 3 bit field.
    #[error("Value {value} at {offset} doesn't fit in 3 bits")]
    ValueOutOfRange {
        /// Offset in the input.
        offset: usize,
        /// The value.
        value: u8,
    },

    /// Input ran out.
    #[error(transparent)]
    Bits(#[from] BitError),
}

impl LzError {
    /// Variant name for reporting.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            LzError::Bits(e) => e.into(),
            other => other.into(),
        }
    }
}

/// `PairOrder` is the byte order of a (length, distance) pair.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairOrder {
    /// Length bits are in the first byte.
    #[default]
    Big,
    /// Length bits are in the second byte.
    Little,
}

/// `Termination` is how a stream says it's done.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// A little endian u16 in front of the stream gives the output length.
    #[default]
    HeaderLength,
    /// A control byte with this value ends the stream.
    ControlValue(u8),
    /// The caller knows the output length.
    OutputLength(usize),
}

/// `Grammar` describes one stream variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Grammar {
    /// High bits of the pair holding the length. The rest are distance.
    pub length_bits: u32,
    /// Added to the raw length.
    pub length_bias: usize,
    /// Added to the raw distance.
    pub distance_bias: usize,
    /// Pair byte order.
    pub pair_order: PairOrder,
    /// End of stream rule.
    pub termination: Termination,
}

impl Default for Grammar {
    // 4 bit length + 3, 12 bit distance, big endian pair, length header.
    fn default() -> Self {
        Self {
            length_bits: 4,
            length_bias: 3,
            distance_bias: 0,
            pair_order: PairOrder::Big,
            termination: Termination::HeaderLength,
        }
    }
}

impl Grammar {
    /// Decompress `input` producing at most `max_output` bytes.
    ///
    /// With a length based termination a back reference running past the
    /// stated length is cut short so output is exactly that length.
    ///
    /// # Errors
    /// `BadGrammar` for an impossible split, `LengthZero` and
    /// `DistanceOutOfBounds` for bad references, `OutputLimitExceeded` and
    /// `Bits` if input runs out first.
    pub fn decompress(&self, input: &[u8], max_output: usize) -> Result<Vec<u8>, LzError> {
        if self.length_bits == 0 || self.length_bits >= 16 {
            return Err(LzError::BadGrammar {
                length_bits: self.length_bits,
            });
        }
        let limit = LzError::OutputLimitExceeded { limit: max_output };
        let mut r = ByteReader::new(input);
        let target = match self.termination {
            Termination::HeaderLength => Some(usize::from(r.read_u16::<LittleEndian>()?)),
            Termination::OutputLength(n) => Some(n),
            Termination::ControlValue(_) => None,
        };
        if target.is_some_and(|t| t > max_output) {
            return Err(limit);
        }
        let done = |out: &Vec<u8>| target.is_some_and(|t| out.len() >= t);

        let mut out = Vec::with_capacity(target.unwrap_or_default());
        'stream: while !done(&out) {
            let control = r.read_u8()?;
            if self.termination == Termination::ControlValue(control) {
                break;
            }
            for bit in (0..8).rev() {
                if done(&out) {
                    break 'stream;
                }
                if control & (1 << bit) == 0 {
                    out.push(r.read_u8()?);
                } else {
                    let (distance, mut length) = self.read_pair(&mut r, out.len())?;
                    if let Some(t) = target {
                        length = length.min(t - out.len());
                    }
                    if out.len() + length > max_output {
                        return Err(limit);
                    }
                    let start = out.len() - distance;
                    for i in 0..length {
                        out.push(out[start + i]);
                    }
                }
                if out.len() > max_output {
                    return Err(limit);
                }
            }
        }
        debug!("Decompressed {} bytes into {}", r.position(), out.len());
        Ok(out)
    }

    // Read one (length, distance) pair and check it against `available`
    // bytes of output. Returns (distance, length).
    fn read_pair(&self, r: &mut ByteReader, available: usize) -> Result<(usize, usize), LzError> {
        let offset = r.position();
        let pair = r.take(2)?;
        let bytes = match self.pair_order {
            PairOrder::Big => [pair[0], pair[1]],
            PairOrder::Little => [pair[1], pair[0]],
        };
        let mut bits = BitReader::new(&bytes);
        let raw_len = bits.read_bits(self.length_bits)?;
        let raw_dist = bits.read_bits(16 - self.length_bits)?;
        // Both fields came from 16 bits.
        let length = raw_len as usize + self.length_bias;
        let distance = raw_dist as usize + self.distance_bias;

        if length == 0 {
            return Err(LzError::LengthZero { offset });
        }
        if distance == 0 || distance > available {
            return Err(LzError::DistanceOutOfBounds {
                distance,
                available,
                offset,
            });
        }
        Ok((distance, length))
    }
}

/// Decompress with the default grammar.
///
/// # Errors
/// See `Grammar::decompress`.
pub fn decompress(input: &[u8], max_output: usize) -> Result<Vec<u8>, LzError> {
    Grammar::default().decompress(input, max_output)
}

