//! `brr` decodes the S-DSP's BRR (bit rate reduction) sample format into
//! 16 bit PCM and writes it out as WAV.
//!
//! A sample is a run of 9 byte blocks. Each starts with a header byte
//! (`ssssffle`: shift, filter, loop, end) followed by 8 bytes holding 16
//! signed 4 bit nibbles, high nibble first. Decoding is integer only so
//! output is bit exact.

use bitio::DEFAULT_MAX_OUTPUT;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, IntoStaticStr};
use thiserror::Error;

mod wav;

pub use wav::{save_wav, wav_bytes, write_wav, DEFAULT_SAMPLE_RATE};


/// Bytes in one BRR block.
pub const BLOCK_SIZE: usize = 9;

/// PCM samples produced by one block.
pub const SAMPLES_PER_BLOCK: usize = 16;

// Largest shift the hardware applies normally. Anything above collapses.
const MAX_SHIFT: u8 = 12;

/// `BrrError` defines the ways decoding a BRR stream can fail.
#[derive(Error, Debug, IntoStaticStr)]
pub enum BrrError {
    /// The stream stopped part way into a block (or had no blocks at all).
    #[error("BRR data ends at byte {len} before a complete block")]
    EndBeforeBlocks {
        /// Bytes available.
        len: usize,
    },

    /// Every block was consumed and none had the end flag set.
    #[error("Ran out of BRR data after {blocks} blocks without an end flag")]
    NoEnd {
        /// Blocks decoded.
        blocks: usize,
    },

    /// Decoding would produce more output than allowed.
    #[error("Decoded output would exceed {limit} bytes")]
    OutputLimitExceeded {
        /// The configured ceiling.
        limit: usize,
    },

    /// A scan walked more blocks than allowed without finding the end.
    #[error("No end flag within {limit} blocks")]
    TooManyBlocks {
        /// Blocks walked.
        limit: usize,
    },

    /// Writing the WAV container failed.
    #[error(transparent)]
    Wav(#[from] hound::Error),
}

/// `Filter` selects the prediction applied on top of each scaled nibble.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Filter {
    /// No prediction.
    #[default]
    Zero,

    /// 15/16 * p1
    One,

    /// 61/32 * p1 - 15/16 * p2
    Two,

    /// 115/64 * p1 - 13/16 * p2
    Three,
}

impl Filter {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Filter::Zero,
            1 => Filter::One,
            2 => Filter::Two,
            _ => Filter::Three,
        }
    }

    fn bits(self) -> u8 {
        match self {
            Filter::Zero => 0,
            Filter::One => 1,
            Filter::Two => 2,
            Filter::Three => 3,
        }
    }

    // Fixed point forms of the coefficient pairs. Each product is shifted
    // arithmetically so negative history rounds toward -inf like the DSP.
    fn predict(self, p1: i32, p2: i32) -> i32 {
        match self {
            Filter::Zero => 0,
            Filter::One => (p1 * 15) >> 4,
            Filter::Two => ((p1 * 61) >> 5) + ((p2 * -15) >> 4),
            Filter::Three => ((p1 * 115) >> 6) + ((p2 * -13) >> 4),
        }
    }
}

/// `BlockHeader` is the decoded first byte of a block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHeader {
    /// Left shift applied to each nibble (0-15).
    pub shift: u8,
    /// Prediction filter.
    pub filter: Filter,
    /// Loop flag.
    pub loop_flag: bool,
    /// End flag.
    pub end: bool,
}

impl BlockHeader {
    /// Parse a header byte.
    #[must_use]
    pub fn from_byte(b: u8) -> Self {
        Self {
            shift: b >> 4,
            filter: Filter::from_bits(b >> 2),
            loop_flag: b & 0x02 != 0,
            end: b & 0x01 != 0,
        }
    }

    /// Pack back into a header byte.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        ((self.shift & 0x0F) << 4)
            | (self.filter.bits() << 2)
            | (u8::from(self.loop_flag) << 1)
            | u8::from(self.end)
    }
}

/// `History` is the two sample predictor state carried between blocks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct History {
    /// Most recent sample.
    pub p1: i32,
    /// Sample before that.
    pub p2: i32,
}

/// `Sample` is a fully decoded BRR stream.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// 16 bit PCM.
    pub pcm: Vec<i16>,
    /// Index into `pcm` where playback restarts when looping.
    pub loop_point: Option<usize>,
    /// Blocks consumed, including the one with the end flag.
    pub blocks: usize,
}

impl Sample {
    /// Bytes of BRR data the sample occupied.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.blocks * BLOCK_SIZE
    }
}

fn scale(nibble: u8, shift: u8) -> i32 {
    let n = i32::from(nibble & 0x0F);
    let n = if n >= 8 { n - 16 } else { n };
    if shift <= MAX_SHIFT {
        n << shift
    } else if n < 0 {
        -1 << 11
    } else {
        0x7FF
    }
}

/// Decode one 9 byte block, appending 16 samples to `out` and updating
/// the predictor history.
pub fn decode_block(block: &[u8; BLOCK_SIZE], hist: &mut History, out: &mut Vec<i16>) -> BlockHeader {
    let header = BlockHeader::from_byte(block[0]);
    for &b in &block[1..] {
        for nibble in [b >> 4, b & 0x0F] {
            let s = scale(nibble, header.shift) + header.filter.predict(hist.p1, hist.p2);
            let s = s.clamp(i32::from(i16::MIN), i32::from(i16::MAX));
            // Clamped above so this always fits.
            #[allow(clippy::cast_possible_truncation)]
            let pcm = s as i16;
            out.push(pcm);
            hist.p2 = hist.p1;
            hist.p1 = s;
        }
    }
    header
}

/// Decode a BRR stream with the default output ceiling.
///
/// # Errors
/// See `decode_with_limit`.
pub fn decode(stream: &[u8]) -> Result<Sample, BrrError> {
    decode_with_limit(stream, DEFAULT_MAX_OUTPUT)
}

/// Decode a BRR stream until a block with the end flag. The loop point is
/// taken from the first block carrying the loop flag. Bytes after the end
/// block are ignored.
///
/// # Errors
/// `EndBeforeBlocks` if a block is cut short, `NoEnd` if the data runs out
/// cleanly without an end flag and `OutputLimitExceeded` if the PCM would
/// be larger than `max_output_bytes`.
pub fn decode_with_limit(stream: &[u8], max_output_bytes: usize) -> Result<Sample, BrrError> {
    let mut sample = Sample::default();
    let mut hist = History::default();
    let mut pos = 0;
    loop {
        let Some(block) = stream
            .get(pos..pos + BLOCK_SIZE)
            .and_then(|b| <&[u8; BLOCK_SIZE]>::try_from(b).ok())
        else {
            if pos < stream.len() || pos == 0 {
                return Err(BrrError::EndBeforeBlocks { len: stream.len() });
            }
            return Err(BrrError::NoEnd {
                blocks: sample.blocks,
            });
        };
        if (sample.pcm.len() + SAMPLES_PER_BLOCK) * 2 > max_output_bytes {
            return Err(BrrError::OutputLimitExceeded {
                limit: max_output_bytes,
            });
        }
        let start = sample.pcm.len();
        let header = decode_block(block, &mut hist, &mut sample.pcm);
        trace!("block {}: {header:?}", sample.blocks);
        if header.loop_flag && sample.loop_point.is_none() {
            sample.loop_point = Some(start);
        }
        sample.blocks += 1;
        pos += BLOCK_SIZE;
        if header.end {
            debug!(
                "BRR sample: {} blocks, {} samples, loop {:?}",
                sample.blocks,
                sample.pcm.len(),
                sample.loop_point
            );
            return Ok(sample);
        }
    }
}

/// Find how many bytes the sample starting at `offset` occupies by
/// walking block headers up to and including the one with the end flag.
///
/// # Errors
/// `EndBeforeBlocks` if the data ends mid block or `offset` is past the
/// end, `NoEnd` if it ends cleanly without an end flag and
/// `TooManyBlocks` if data remains after `max_blocks` blocks without one.
/// A sample of exactly `max_blocks` blocks is accepted.
pub fn scan(data: &[u8], offset: usize, max_blocks: usize) -> Result<usize, BrrError> {
    let data = data
        .get(offset..)
        .ok_or(BrrError::EndBeforeBlocks { len: data.len() })?;
    for (i, block) in data.chunks(BLOCK_SIZE).take(max_blocks).enumerate() {
        if block.len() < BLOCK_SIZE {
            return Err(BrrError::EndBeforeBlocks { len: data.len() });
        }
        if BlockHeader::from_byte(block[0]).end {
            return Ok((i + 1) * BLOCK_SIZE);
        }
    }
    if data.is_empty() {
        return Err(BrrError::EndBeforeBlocks { len: 0 });
    }
    // Inclusive limit: only data left past `max_blocks` blocks is an overrun.
    if data.len() > max_blocks.saturating_mul(BLOCK_SIZE) {
        return Err(BrrError::TooManyBlocks { limit: max_blocks });
    }
    Err(BrrError::NoEnd {
        blocks: data.len() / BLOCK_SIZE,
    })
}
