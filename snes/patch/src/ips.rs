use bitio::{BigEndian, ByteReader, ByteWriter};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::{diff_coalesced, PatchError, PatchFormat};

pub(crate) const MAGIC: &[u8] = b"PATCH";
const FOOTER: &[u8] = b"EOF";

// A record at this offset would read back as the footer.
const EOF_OFFSET: usize = 0x45_4F46;
const MAX_OFFSET: usize = 0xFF_FFFF;

/// Largest payload one record can carry.
pub const MAX_RECORD: usize = 0xFFFF;

/// Runs of at least this many identical bytes are written as RLE records.
pub const RLE_THRESHOLD: usize = 10;

/// Differences closer than this are merged into one record.
pub const MERGE_GAP: usize = 8;

/// `IpsRecord` is one parsed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IpsRecord {
    /// Literal bytes.
    Data {
        /// Target offset.
        offset: usize,
        /// Bytes to write.
        data: Vec<u8>,
    },
    /// `len` copies of `value`.
    Rle {
        /// Target offset.
        offset: usize,
        /// Repeat count.
        len: usize,
        /// Fill byte.
        value: u8,
    },
}

impl IpsRecord {
    /// Target offset.
    #[must_use]
    pub fn offset(&self) -> usize {
        match self {
            IpsRecord::Data { offset, .. } | IpsRecord::Rle { offset, .. } => *offset,
        }
    }

    /// Bytes written.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            IpsRecord::Data { data, .. } => data.len(),
            IpsRecord::Rle { len, .. } => *len,
        }
    }

    /// True for a record that writes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `IpsPatch` is a parsed IPS file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpsPatch {
    /// Records in stream order.
    pub records: Vec<IpsRecord>,
    /// Output length set by the truncation extension.
    pub truncate: Option<usize>,
}

impl IpsPatch {
    /// Parse a patch without applying it.
    ///
    /// # Errors
    /// `BadMagic` or `TruncatedRecord`.
    pub fn parse(patch: &[u8]) -> Result<Self, PatchError> {
        if !patch.starts_with(MAGIC) {
            return Err(PatchError::BadMagic { expected: "PATCH" });
        }
        let mut r = ByteReader::new(&patch[MAGIC.len()..]);
        let at = |r: &ByteReader| MAGIC.len() + r.position();
        let mut records = Vec::new();
        loop {
            let start = at(&r);
            let truncated = PatchError::TruncatedRecord { offset: start };
            if r.peek(FOOTER.len()) == Some(FOOTER) {
                r.take(FOOTER.len())?;
                break;
            }
            let offset = r.read_u24::<BigEndian>().map_err(|_| truncated.clone())? as usize;
            let size = usize::from(r.read_u16::<BigEndian>().map_err(|_| truncated.clone())?);
            let rec = if size == 0 {
                let len = usize::from(r.read_u16::<BigEndian>().map_err(|_| truncated.clone())?);
                let value = r.read_u8().map_err(|_| truncated)?;
                IpsRecord::Rle { offset, len, value }
            } else {
                let data = r.take(size).map_err(|_| truncated)?.to_vec();
                IpsRecord::Data { offset, data }
            };
            trace!("IPS record at {offset:#X}, {} bytes", rec.len());
            records.push(rec);
        }
        let truncate = match r.remaining() {
            0 => None,
            3 => Some(r.read_u24::<BigEndian>()? as usize),
            _ => return Err(PatchError::TruncatedRecord { offset: at(&r) }),
        };
        debug!("IPS patch: {} records, truncate {truncate:?}", records.len());
        Ok(Self { records, truncate })
    }

    /// Apply every record in order to a copy of `source`, padding with
    /// zeros when a record lands past the end.
    ///
    /// # Errors
    /// `OutputLimitExceeded` if a record would grow output past `max_output`.
    pub fn apply_to(&self, source: &[u8], max_output: usize) -> Result<Vec<u8>, PatchError> {
        let mut out = source.to_vec();
        for rec in &self.records {
            let start = rec.offset();
            let end = start + rec.len();
            if end > max_output {
                return Err(PatchError::OutputLimitExceeded { limit: max_output });
            }
            if out.len() < end {
                out.resize(end, 0);
            }
            match rec {
                IpsRecord::Data { data, .. } => out[start..end].copy_from_slice(data),
                IpsRecord::Rle { value, .. } => out[start..end].fill(*value),
            }
        }
        if let Some(len) = self.truncate {
            out.truncate(len);
        }
        Ok(out)
    }
}

/// `Ips` is the IPS codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ips;

impl PatchFormat for Ips {
    fn name(&self) -> &'static str {
        "ips"
    }

    fn create(&self, source: &[u8], target: &[u8]) -> Result<Vec<u8>, PatchError> {
        // Past the end of target is handled by the truncation length.
        let old = &source[..source.len().min(target.len())];
        let mut w = ByteWriter::new();
        w.write_all(MAGIC);
        for hunk in diff_coalesced(old, target, MERGE_GAP) {
            let start = hunk.offset;
            let data = &hunk.new;
            let mut lit = 0;
            let mut i = 0;
            while i < data.len() {
                let run = data[i..].iter().take_while(|&&b| b == data[i]).count();
                if run >= RLE_THRESHOLD {
                    push_data(&mut w, target, start + lit, start + i)?;
                    push_run(&mut w, target, start + i, start + i + run, data[i])?;
                    lit = i + run;
                }
                i += run;
            }
            push_data(&mut w, target, start + lit, start + data.len())?;
        }
        w.write_all(FOOTER);
        if target.len() < source.len() {
            if target.len() > MAX_OFFSET {
                return Err(PatchError::OffsetTooLarge {
                    offset: target.len(),
                });
            }
            #[allow(clippy::cast_possible_truncation)]
            let len = target.len() as u32;
            w.write_u24::<BigEndian>(len);
        }
        debug!("Created IPS patch of {} bytes", w.len());
        Ok(w.into_inner())
    }

    fn apply_with_limit(
        &self,
        source: &[u8],
        patch: &[u8],
        max_output: usize,
    ) -> Result<Vec<u8>, PatchError> {
        IpsPatch::parse(patch)?.apply_to(source, max_output)
    }
}

fn record_header(w: &mut ByteWriter, offset: usize, size: usize) -> Result<(), PatchError> {
    if offset > MAX_OFFSET {
        return Err(PatchError::OffsetTooLarge { offset });
    }
    // Bounded by MAX_OFFSET and MAX_RECORD.
    #[allow(clippy::cast_possible_truncation)]
    let (offset, size) = (offset as u32, size as u16);
    w.write_u24::<BigEndian>(offset);
    w.write_u16::<BigEndian>(size);
    Ok(())
}

// Literal records for target[start..end].
fn push_data(w: &mut ByteWriter, target: &[u8], mut start: usize, end: usize) -> Result<(), PatchError> {
    while start < end {
        if start == EOF_OFFSET {
            start -= 1;
        }
        let len = (end - start).min(MAX_RECORD);
        record_header(w, start, len)?;
        w.write_all(&target[start..start + len]);
        start += len;
    }
    Ok(())
}

// RLE records filling start..end with value.
fn push_run(w: &mut ByteWriter, target: &[u8], mut start: usize, end: usize, value: u8) -> Result<(), PatchError> {
    while start < end {
        if start == EOF_OFFSET {
            push_data(w, target, start, start + 1)?;
            start += 1;
            continue;
        }
        let len = (end - start).min(MAX_RECORD);
        record_header(w, start, 0)?;
        #[allow(clippy::cast_possible_truncation)]
        let count = len as u16;
        w.write_u16::<BigEndian>(count);
        w.write_u8(value);
        start += len;
    }
    Ok(())
}
