use bitio::{ByteReader, ByteWriter, LittleEndian};
use log::debug;

use crate::{PatchError, PatchFormat};

pub(crate) const MAGIC: &[u8] = b"UPS1";
const TRAILER: usize = 12;

pub(crate) fn write_vlv(w: &mut ByteWriter, mut value: u64) {
    loop {
        // Low 7 bits.
        #[allow(clippy::cast_possible_truncation)]
        let x = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            w.write_u8(0x80 | x);
            return;
        }
        w.write_u8(x);
    }
}

pub(crate) fn read_vlv(r: &mut ByteReader, base: usize) -> Result<usize, PatchError> {
    let offset = base + r.position();
    let mut value: u64 = 0;
    let mut shift = 0;
    loop {
        let b = r.read_u8().map_err(|_| PatchError::TruncatedRecord { offset })?;
        if shift > 56 {
            return Err(PatchError::VlvOverflow { offset });
        }
        value += u64::from(b & 0x7F) << shift;
        if b & 0x80 != 0 {
            break;
        }
        shift += 7;
    }
    usize::try_from(value).map_err(|_| PatchError::VlvOverflow { offset })
}

pub(crate) fn crc_at(patch: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([patch[at], patch[at + 1], patch[at + 2], patch[at + 3]])
}

/// `UpsPatch` is the header and trailer of a UPS file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsPatch {
    /// Expected source length.
    pub source_size: usize,
    /// Output length.
    pub target_size: usize,
    /// CRC32 of the source.
    pub source_crc: u32,
    /// CRC32 of the output.
    pub target_crc: u32,
    /// CRC32 of everything before the trailer.
    pub patch_crc: u32,
}

impl UpsPatch {
    /// Read the sizes and CRCs and verify the patch's own CRC.
    ///
    /// # Errors
    /// `BadMagic`, `TruncatedRecord`, `VlvOverflow` or `PatchCrcMismatch`.
    pub fn parse(patch: &[u8]) -> Result<Self, PatchError> {
        Ok(Self::parse_body(patch)?.0)
    }

    // Returns the header plus the reader positioned at the first run.
    fn parse_body(patch: &[u8]) -> Result<(Self, ByteReader<'_>), PatchError> {
        if !patch.starts_with(MAGIC) {
            return Err(PatchError::BadMagic { expected: "UPS1" });
        }
        if patch.len() < MAGIC.len() + TRAILER {
            return Err(PatchError::TruncatedRecord { offset: MAGIC.len() });
        }
        let body_end = patch.len() - TRAILER;
        let patch_crc = crc_at(patch, body_end + 8);
        let actual = crc32fast::hash(&patch[..body_end]);
        if actual != patch_crc {
            return Err(PatchError::PatchCrcMismatch {
                expected: patch_crc,
                actual,
            });
        }
        let mut r = ByteReader::new(&patch[MAGIC.len()..body_end]);
        let source_size = read_vlv(&mut r, MAGIC.len())?;
        let target_size = read_vlv(&mut r, MAGIC.len())?;
        let hdr = Self {
            source_size,
            target_size,
            source_crc: crc_at(patch, body_end),
            target_crc: crc_at(patch, body_end + 4),
            patch_crc,
        };
        Ok((hdr, r))
    }
}

/// `Ups` is the UPS codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ups;

impl PatchFormat for Ups {
    fn name(&self) -> &'static str {
        "ups"
    }

    fn create(&self, source: &[u8], target: &[u8]) -> Result<Vec<u8>, PatchError> {
        let len = source.len().max(target.len());
        let xor = |i: usize| source.get(i).copied().unwrap_or(0) ^ target.get(i).copied().unwrap_or(0);

        let mut w = ByteWriter::new();
        w.write_all(MAGIC);
        write_vlv(&mut w, source.len() as u64);
        write_vlv(&mut w, target.len() as u64);

        let mut cursor = 0;
        let mut i = 0;
        while i < len {
            if xor(i) == 0 {
                i += 1;
                continue;
            }
            write_vlv(&mut w, (i - cursor) as u64);
            while i < len && xor(i) != 0 {
                w.write_u8(xor(i));
                i += 1;
            }
            w.write_u8(0);
            // The terminator stands for the equal byte after the run.
            i += 1;
            cursor = i;
        }

        w.write_u32::<LittleEndian>(crc32fast::hash(source));
        w.write_u32::<LittleEndian>(crc32fast::hash(target));
        let body_crc = crc32fast::hash(w.as_slice());
        w.write_u32::<LittleEndian>(body_crc);
        debug!("Created UPS patch of {} bytes", w.len());
        Ok(w.into_inner())
    }

    fn apply_with_limit(
        &self,
        source: &[u8],
        patch: &[u8],
        max_output: usize,
    ) -> Result<Vec<u8>, PatchError> {
        let (hdr, mut r) = UpsPatch::parse_body(patch)?;
        if source.len() != hdr.source_size {
            return Err(PatchError::SourceSizeMismatch {
                expected: hdr.source_size,
                actual: source.len(),
            });
        }
        let actual = crc32fast::hash(source);
        if actual != hdr.source_crc {
            return Err(PatchError::SourceCrcMismatch {
                expected: hdr.source_crc,
                actual,
            });
        }
        if hdr.target_size > max_output {
            return Err(PatchError::OutputLimitExceeded { limit: max_output });
        }

        let mut out = source.to_vec();
        out.resize(hdr.source_size.max(hdr.target_size), 0);
        let mut cursor: usize = 0;
        while !r.is_empty() {
            let skip = read_vlv(&mut r, MAGIC.len())?;
            let len = out.len();
            // A run may only start inside the output or right at its end.
            cursor = cursor
                .checked_add(skip)
                .filter(|&c| c <= len)
                .ok_or(PatchError::RunOutOfBounds {
                    offset: cursor.saturating_add(skip),
                    len,
                })?;
            loop {
                let at = MAGIC.len() + r.position();
                let b = r.read_u8().map_err(|_| PatchError::TruncatedRecord { offset: at })?;
                if b != 0 {
                    let dst = out
                        .get_mut(cursor)
                        .ok_or(PatchError::RunOutOfBounds { offset: cursor, len })?;
                    *dst ^= b;
                }
                cursor = cursor
                    .checked_add(1)
                    .ok_or(PatchError::RunOutOfBounds { offset: cursor, len })?;
                if b == 0 {
                    break;
                }
            }
        }
        out.truncate(hdr.target_size);

        let actual = crc32fast::hash(&out);
        if actual != hdr.target_crc {
            return Err(PatchError::TargetCrcMismatch {
                expected: hdr.target_crc,
                actual,
            });
        }
        Ok(out)
    }
}
