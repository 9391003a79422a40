use bitio::{ByteReader, ByteWriter, LittleEndian};
use log::{debug, trace};

use crate::ups::{crc_at, read_vlv, write_vlv};
use crate::{PatchError, PatchFormat, RLE_THRESHOLD};

pub(crate) const MAGIC: &[u8] = b"BPS1";
const TRAILER: usize = 12;

const SOURCE_READ: usize = 0;
const TARGET_READ: usize = 1;
const SOURCE_COPY: usize = 2;
const TARGET_COPY: usize = 3;

/// `BpsAction` is one command from a BPS body. Copies move a cursor by a
/// signed `delta` before reading `len` bytes; each cursor is separate and
/// advances past whatever it copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BpsAction {
    /// Copy `len` source bytes from the current output position.
    SourceRead {
        /// Byte count.
        len: usize,
    },
    /// Literal bytes from the patch.
    TargetRead {
        /// Bytes to append.
        data: Vec<u8>,
    },
    /// Copy from anywhere in the source.
    SourceCopy {
        /// Cursor move.
        delta: i64,
        /// Byte count.
        len: usize,
    },
    /// Copy from earlier output. The range may overlap what it writes.
    TargetCopy {
        /// Cursor move.
        delta: i64,
        /// Byte count.
        len: usize,
    },
}

impl BpsAction {
    /// Bytes this action appends.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            BpsAction::TargetRead { data } => data.len(),
            BpsAction::SourceRead { len }
            | BpsAction::SourceCopy { len, .. }
            | BpsAction::TargetCopy { len, .. } => *len,
        }
    }

    /// Whether the action appends nothing. Parsed actions never are.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `BpsPatch` is a parsed BPS file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BpsPatch {
    /// Expected source length.
    pub source_size: usize,
    /// Output length.
    pub target_size: usize,
    /// Free form metadata, usually empty or XML.
    pub metadata: Vec<u8>,
    /// Commands in stream order.
    pub actions: Vec<BpsAction>,
    /// CRC32 of the source.
    pub source_crc: u32,
    /// CRC32 of the output.
    pub target_crc: u32,
    /// CRC32 of every byte before this one.
    pub patch_crc: u32,
}

fn read_delta(r: &mut ByteReader, base: usize) -> Result<i64, PatchError> {
    let offset = base + r.position();
    let v = read_vlv(r, base)?;
    let mag = i64::try_from(v >> 1).map_err(|_| PatchError::VlvOverflow { offset })?;
    Ok(if v & 1 == 0 { mag } else { -mag })
}

fn write_delta(w: &mut ByteWriter, from: usize, to: usize) {
    let v = if to >= from {
        ((to - from) as u64) << 1
    } else {
        (((from - to) as u64) << 1) | 1
    };
    write_vlv(w, v);
}

fn write_action(w: &mut ByteWriter, code: usize, len: usize) {
    write_vlv(w, (((len - 1) << 2) | code) as u64);
}

fn shift(cursor: usize, delta: i64) -> Option<usize> {
    let mag = usize::try_from(delta.unsigned_abs()).ok()?;
    if delta < 0 {
        cursor.checked_sub(mag)
    } else {
        cursor.checked_add(mag)
    }
}

impl BpsPatch {
    /// Parse the header, every action and the trailer, verifying the
    /// patch's own CRC.
    ///
    /// # Errors
    /// `BadMagic`, `TruncatedRecord`, `VlvOverflow` or `PatchCrcMismatch`.
    pub fn parse(patch: &[u8]) -> Result<Self, PatchError> {
        if !patch.starts_with(MAGIC) {
            return Err(PatchError::BadMagic { expected: "BPS1" });
        }
        if patch.len() < MAGIC.len() + TRAILER {
            return Err(PatchError::TruncatedRecord { offset: MAGIC.len() });
        }
        let body_end = patch.len() - TRAILER;
        let patch_crc = crc_at(patch, body_end + 8);
        let actual = crc32fast::hash(&patch[..body_end + 8]);
        if actual != patch_crc {
            return Err(PatchError::PatchCrcMismatch {
                expected: patch_crc,
                actual,
            });
        }

        let base = MAGIC.len();
        let mut r = ByteReader::new(&patch[base..body_end]);
        let source_size = read_vlv(&mut r, base)?;
        let target_size = read_vlv(&mut r, base)?;
        let meta_len = read_vlv(&mut r, base)?;
        let at = base + r.position();
        let metadata = r
            .take(meta_len)
            .map_err(|_| PatchError::TruncatedRecord { offset: at })?
            .to_vec();

        let mut actions = Vec::new();
        while !r.is_empty() {
            let at = base + r.position();
            let word = read_vlv(&mut r, base)?;
            let len = (word >> 2) + 1;
            let action = match word & 3 {
                SOURCE_READ => BpsAction::SourceRead { len },
                TARGET_READ => BpsAction::TargetRead {
                    data: r
                        .take(len)
                        .map_err(|_| PatchError::TruncatedRecord { offset: at })?
                        .to_vec(),
                },
                SOURCE_COPY => BpsAction::SourceCopy {
                    delta: read_delta(&mut r, base)?,
                    len,
                },
                _ => BpsAction::TargetCopy {
                    delta: read_delta(&mut r, base)?,
                    len,
                },
            };
            trace!("Action at {at:#X}: {action:?}");
            actions.push(action);
        }

        Ok(Self {
            source_size,
            target_size,
            metadata,
            actions,
            source_crc: crc_at(patch, body_end),
            target_crc: crc_at(patch, body_end + 4),
            patch_crc,
        })
    }
}

/// `Bps` is the BPS codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bps;

impl PatchFormat for Bps {
    fn name(&self) -> &'static str {
        "bps"
    }

    // Bytes equal at the same offset are source reads, runs of
    // `RLE_THRESHOLD` or more repeats are one literal plus a target copy,
    // everything else is literal.
    fn create(&self, source: &[u8], target: &[u8]) -> Result<Vec<u8>, PatchError> {
        let mut w = ByteWriter::new();
        w.write_all(MAGIC);
        write_vlv(&mut w, source.len() as u64);
        write_vlv(&mut w, target.len() as u64);
        write_vlv(&mut w, 0);

        let flush = |w: &mut ByteWriter, lit: &[u8]| {
            if !lit.is_empty() {
                write_action(w, TARGET_READ, lit.len());
                w.write_all(lit);
            }
        };

        let mut target_cursor = 0;
        let mut lit_start = 0;
        let mut i = 0;
        while i < target.len() {
            let same = target[i..]
                .iter()
                .zip(source.get(i..).unwrap_or_default())
                .take_while(|(t, s)| t == s)
                .count();
            if same > 0 {
                flush(&mut w, &target[lit_start..i]);
                write_action(&mut w, SOURCE_READ, same);
                i += same;
                lit_start = i;
                continue;
            }

            let repeat = target[i..].iter().take_while(|&&b| b == target[i]).count();
            if repeat >= RLE_THRESHOLD {
                flush(&mut w, &target[lit_start..=i]);
                write_action(&mut w, TARGET_COPY, repeat - 1);
                write_delta(&mut w, target_cursor, i);
                target_cursor = i + repeat - 1;
                i += repeat;
                lit_start = i;
                continue;
            }
            i += 1;
        }
        flush(&mut w, &target[lit_start..]);

        w.write_u32::<LittleEndian>(crc32fast::hash(source));
        w.write_u32::<LittleEndian>(crc32fast::hash(target));
        let crc = crc32fast::hash(w.as_slice());
        w.write_u32::<LittleEndian>(crc);
        debug!("Created BPS patch of {} bytes", w.len());
        Ok(w.into_inner())
    }

    fn apply_with_limit(
        &self,
        source: &[u8],
        patch: &[u8],
        max_output: usize,
    ) -> Result<Vec<u8>, PatchError> {
        let p = BpsPatch::parse(patch)?;
        if source.len() != p.source_size {
            return Err(PatchError::SourceSizeMismatch {
                expected: p.source_size,
                actual: source.len(),
            });
        }
        let actual = crc32fast::hash(source);
        if actual != p.source_crc {
            return Err(PatchError::SourceCrcMismatch {
                expected: p.source_crc,
                actual,
            });
        }
        if p.target_size > max_output {
            return Err(PatchError::OutputLimitExceeded { limit: max_output });
        }

        let mut out: Vec<u8> = Vec::with_capacity(p.target_size);
        let mut source_cursor = 0;
        let mut target_cursor = 0;
        for (index, action) in p.actions.iter().enumerate() {
            let pos = out.len();
            let len = action.len();
            if len > p.target_size - pos {
                return Err(PatchError::RunOutOfBounds {
                    offset: pos,
                    len: p.target_size,
                });
            }
            let bad_copy = PatchError::CopyOutOfBounds { action: index };
            match action {
                BpsAction::SourceRead { .. } => {
                    out.extend_from_slice(source.get(pos..pos + len).ok_or(bad_copy)?);
                }
                BpsAction::TargetRead { data } => out.extend_from_slice(data),
                BpsAction::SourceCopy { delta, .. } => {
                    let from = shift(source_cursor, *delta).ok_or(bad_copy.clone())?;
                    let run = from
                        .checked_add(len)
                        .and_then(|end| source.get(from..end))
                        .ok_or(bad_copy)?;
                    out.extend_from_slice(run);
                    source_cursor = from + len;
                }
                BpsAction::TargetCopy { delta, .. } => {
                    target_cursor = shift(target_cursor, *delta).ok_or(bad_copy.clone())?;
                    if target_cursor >= pos {
                        return Err(bad_copy);
                    }
                    // Byte at a time so an overlapping copy repeats itself.
                    for _ in 0..len {
                        let b = out[target_cursor];
                        out.push(b);
                        target_cursor += 1;
                    }
                }
            }
        }
        if out.len() != p.target_size {
            return Err(PatchError::TargetSizeMismatch {
                expected: p.target_size,
                actual: out.len(),
            });
        }

        let actual = crc32fast::hash(&out);
        if actual != p.target_crc {
            return Err(PatchError::TargetCrcMismatch {
                expected: p.target_crc,
                actual,
            });
        }
        Ok(out)
    }
}
