use std::io::{Cursor, Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::BrrError;

/// Sample rate used when writing BRR output unless told otherwise.
pub const DEFAULT_SAMPLE_RATE: u32 = 32_000;

fn spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Write mono 16 bit PCM as a canonical RIFF/WAVE stream.
///
/// # Errors
/// Any I/O problem from the underlying writer.
pub fn write_wav<W: Write + Seek>(w: W, pcm: &[i16], sample_rate: u32) -> Result<(), BrrError> {
    let mut writer = WavWriter::new(w, spec(sample_rate))?;
    for &s in pcm {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Same as `write_wav` but returns the bytes.
///
/// # Errors
/// Only if encoding fails, which in memory it shouldn't.
pub fn wav_bytes(pcm: &[i16], sample_rate: u32) -> Result<Vec<u8>, BrrError> {
    let mut c = Cursor::new(Vec::new());
    write_wav(&mut c, pcm, sample_rate)?;
    Ok(c.into_inner())
}

/// Write a WAV file to disk.
///
/// # Errors
/// File creation or write failures.
pub fn save_wav(path: &Path, pcm: &[i16], sample_rate: u32) -> Result<(), BrrError> {
    let mut writer = WavWriter::create(path, spec(sample_rate))?;
    for &s in pcm {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}
