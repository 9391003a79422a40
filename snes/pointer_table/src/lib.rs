//! `pointer_table` reads indexed tables of little endian pointers out of a
//! ROM image and follows them to the records they point at.
//!
//! A table is `count` contiguous slots starting at a flat `base`. Each slot
//! is either a 16 bit pointer within an ambient bank (`Width::Near`) or a
//! full 24 bit address (`Width::Far`). Every resolved offset is checked
//! against the image so a bad pointer is an error and never a stray read.

use addr_map::{AddrError, AddrMap};
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use strum_macros::IntoStaticStr;
use thiserror::Error;


/// `PtrError` defines the failures from reading or rewriting a table.
#[derive(Error, Debug, Clone, PartialEq, Eq, IntoStaticStr)]
pub enum PtrError {
    /// Only 2 and 3 byte pointers exist.
    #[error("Pointer stride must be 2 or 3, got {stride}")]
    BadStride {
        /// The requested stride.
        stride: u8,
    },

    /// Asked for an entry the table doesn't have.
    #[error("Index {index} is past the end of a {count} entry table")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Entries in the table.
        count: usize,
    },

    /// The table itself extends past the image.
    #[error("Slot {index} at {slot:#X} runs past the end of the {len} byte image")]
    TableOutOfBounds {
        /// Entry index.
        index: usize,
        /// Flat offset of the slot.
        slot: usize,
        /// Image length.
        len: usize,
    },

    /// A pointer resolves outside the image.
    #[error("Entry {index} pointer {pointer:#08X} resolves to {target:#X}, outside the {len} byte image")]
    DanglingPointer {
        /// Entry index.
        index: usize,
        /// Raw pointer value.
        pointer: u32,
        /// Resolved flat offset.
        target: usize,
        /// Image length.
        len: usize,
    },

    /// A fixed length record runs off the end of the image.
    #[error("Entry {index} at {offset:#X} needs {want} bytes, image is {len}")]
    PayloadOutOfBounds {
        /// Entry index.
        index: usize,
        /// Start of the record.
        offset: usize,
        /// Requested record length.
        want: usize,
        /// Image length.
        len: usize,
    },

    /// No terminator before the scan limit or the end of the image.
    #[error("Entry {index} at {offset:#X} has no terminator within {limit} bytes")]
    Unterminated {
        /// Entry index.
        index: usize,
        /// Start of the record.
        offset: usize,
        /// Bytes scanned.
        limit: usize,
    },

    /// A near pointer can't reach this offset from the table's bank.
    #[error("Offset {offset:#X} isn't reachable from bank ${bank:02X} with a 16 bit pointer")]
    CrossBank {
        /// Flat offset that was to be pointed at.
        offset: usize,
        /// The table's ambient bank.
        bank: u8,
    },

    /// Relocated records don't fit the free region.
    #[error("Relocation needs {needed} bytes but the region holds {available}")]
    NoRoom {
        /// Total payload size.
        needed: usize,
        /// Region size.
        available: usize,
    },

    /// Relocation was handed the wrong number of records.
    #[error("{count} records supplied for a {entries} entry table")]
    CountMismatch {
        /// Records supplied.
        count: usize,
        /// Table entries.
        entries: usize,
    },

    /// Address translation failed.
    #[error(transparent)]
    Addr(#[from] AddrError),
}

impl PtrError {
    /// Variant name for reporting. Address errors report their own kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            PtrError::Addr(e) => e.into(),
            other => other.into(),
        }
    }
}

/// `Width` is the size of one pointer slot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Width {
    /// 16 bit pointer combined with the table's bank.
    #[default]
    Near,

    /// 24 bit absolute address.
    Far,
}

impl Width {
    /// Bytes per slot.
    #[must_use]
    pub fn bytes(self) -> usize {
        match self {
            Width::Near => 2,
            Width::Far => 3,
        }
    }
}

impl TryFrom<u8> for Width {
    type Error = PtrError;

    fn try_from(stride: u8) -> Result<Self, Self::Error> {
        match stride {
            2 => Ok(Width::Near),
            3 => Ok(Width::Far),
            _ => Err(PtrError::BadStride { stride }),
        }
    }
}

impl From<Width> for u8 {
    fn from(w: Width) -> Self {
        match w {
            Width::Near => 2,
            Width::Far => 3,
        }
    }
}

/// `Payload` says how long the record behind each pointer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Payload {
    /// Walk forward to `terminator`, scanning at most `limit` bytes. The
    /// returned record includes the terminator.
    Terminated {
        /// Byte that ends a record.
        terminator: u8,
        /// Scan ceiling.
        limit: usize,
    },

    /// Every record is exactly `len` bytes.
    Fixed {
        /// Record length.
        len: usize,
    },
}

/// `Relocation` is the set of writes that moves a table's records into a
/// new region and repoints the table at them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relocation {
    /// `(flat offset, bytes)` pairs to write, records first then slots.
    pub writes: Vec<(usize, Vec<u8>)>,
    /// Where each record now lives.
    pub offsets: Vec<usize>,
    /// Bytes of the region consumed.
    pub used: usize,
}

/// `PointerTable` describes one table in an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerTable {
    map: AddrMap,
    base: usize,
    width: Width,
    count: usize,
    bank: u8,
}

impl PointerTable {
    /// A table of `count` slots at flat offset `base`. Near pointers
    /// resolve in bank 0 until `with_bank` says otherwise.
    #[must_use]
    pub fn new(map: AddrMap, base: usize, width: Width, count: usize) -> Self {
        Self {
            map,
            base,
            width,
            count,
            bank: 0,
        }
    }

    /// Set the ambient bank used for near pointers.
    #[must_use]
    pub fn with_bank(mut self, bank: u8) -> Self {
        self.bank = bank;
        self
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// True for a zero entry table.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Pointer width.
    #[must_use]
    pub fn width(&self) -> Width {
        self.width
    }

    /// Ambient bank for near pointers.
    #[must_use]
    pub fn bank(&self) -> u8 {
        self.bank
    }

    /// Flat offset of slot `index`.
    ///
    /// # Errors
    /// `IndexOutOfRange` for `index >= len()`.
    pub fn slot(&self, index: usize) -> Result<usize, PtrError> {
        if index >= self.count {
            return Err(PtrError::IndexOutOfRange {
                index,
                count: self.count,
            });
        }
        Ok(self.base.saturating_add(index.saturating_mul(self.width.bytes())))
    }

    /// The raw pointer stored in slot `index`.
    ///
    /// # Errors
    /// `IndexOutOfRange` or `TableOutOfBounds`.
    pub fn pointer(&self, rom: &[u8], index: usize) -> Result<u32, PtrError> {
        let slot = self.slot(index)?;
        let bytes = slot
            .checked_add(self.width.bytes())
            .and_then(|end| rom.get(slot..end))
            .ok_or(PtrError::TableOutOfBounds {
                index,
                slot,
                len: rom.len(),
            })?;
        Ok(match self.width {
            Width::Near => u32::from(LittleEndian::read_u16(bytes)),
            Width::Far => LittleEndian::read_u24(bytes),
        })
    }

    /// Resolve a raw pointer value to a flat offset without bounds
    /// checking it against an image.
    ///
    /// # Errors
    /// Any `AddrError` from the mapping.
    pub fn resolve(&self, pointer: u32) -> Result<usize, AddrError> {
        match self.width {
            // Near slots are read from two bytes so this can't truncate.
            #[allow(clippy::cast_possible_truncation)]
            Width::Near => self.map.follow16(self.bank, pointer as u16),
            Width::Far => self.map.follow24(pointer),
        }
    }

    /// Flat offset entry `index` points at.
    ///
    /// # Errors
    /// `IndexOutOfRange`, `TableOutOfBounds`, `Addr` for an unmapped
    /// pointer and `DanglingPointer` if it lands outside `rom`.
    pub fn entry(&self, rom: &[u8], index: usize) -> Result<usize, PtrError> {
        let pointer = self.pointer(rom, index)?;
        let target = self.resolve(pointer)?;
        if target >= rom.len() {
            return Err(PtrError::DanglingPointer {
                index,
                pointer,
                target,
                len: rom.len(),
            });
        }
        trace!("Entry {index}: {pointer:06X} -> {target:#X}");
        Ok(target)
    }

    /// Every entry's flat offset.
    ///
    /// # Errors
    /// The first error `entry` returns.
    pub fn entries(&self, rom: &[u8]) -> Result<Vec<usize>, PtrError> {
        (0..self.count).map(|i| self.entry(rom, i)).collect()
    }

    /// The record behind entry `index`.
    ///
    /// # Errors
    /// Anything from `entry`, then `Unterminated` or `PayloadOutOfBounds`
    /// depending on `payload`.
    pub fn payload<'a>(
        &self,
        rom: &'a [u8],
        index: usize,
        payload: Payload,
    ) -> Result<&'a [u8], PtrError> {
        let offset = self.entry(rom, index)?;
        match payload {
            Payload::Terminated { terminator, limit } => {
                let end = rom.len().min(offset.saturating_add(limit));
                let pos = rom[offset..end]
                    .iter()
                    .position(|&b| b == terminator)
                    .ok_or(PtrError::Unterminated {
                        index,
                        offset,
                        limit: end - offset,
                    })?;
                Ok(&rom[offset..=offset + pos])
            }
            Payload::Fixed { len } => {
                offset
                    .checked_add(len)
                    .and_then(|end| rom.get(offset..end))
                    .ok_or(PtrError::PayloadOutOfBounds {
                        index,
                        offset,
                        want: len,
                        len: rom.len(),
                    })
            }
        }
    }

    /// Every entry's record.
    ///
    /// # Errors
    /// The first error `payload` returns.
    pub fn payloads<'a>(&self, rom: &'a [u8], payload: Payload) -> Result<Vec<&'a [u8]>, PtrError> {
        (0..self.count)
            .map(|i| self.payload(rom, i, payload))
            .collect()
    }

    /// The pointer value that resolves to `flat` in this table.
    ///
    /// # Errors
    /// `Addr` if the offset has no logical address and `CrossBank` if a
    /// near pointer can't reach it from the table's bank.
    pub fn encode_pointer(&self, flat: usize) -> Result<u32, PtrError> {
        let (bank, addr) = self.map.flat_to_logical(flat)?;
        match self.width {
            Width::Far => Ok((u32::from(bank) << 16) | u32::from(addr)),
            Width::Near => {
                if self.map.logical_to_flat(self.bank, addr).ok() != Some(flat) {
                    return Err(PtrError::CrossBank {
                        offset: flat,
                        bank: self.bank,
                    });
                }
                Ok(u32::from(addr))
            }
        }
    }

    /// Slot bytes for a pointer to `flat`.
    ///
    /// # Errors
    /// See `encode_pointer`.
    pub fn pointer_bytes(&self, flat: usize) -> Result<Vec<u8>, PtrError> {
        let ptr = self.encode_pointer(flat)?;
        let mut buf = [0u8; 3];
        LittleEndian::write_u24(&mut buf, ptr);
        Ok(buf[..self.width.bytes()].to_vec())
    }

    /// Point slot `index` at `flat` in place.
    ///
    /// # Errors
    /// `IndexOutOfRange`, `TableOutOfBounds` or anything from
    /// `encode_pointer`. `rom` is untouched on error.
    pub fn write_pointer(&self, rom: &mut [u8], index: usize, flat: usize) -> Result<(), PtrError> {
        let slot = self.slot(index)?;
        let bytes = self.pointer_bytes(flat)?;
        let len = rom.len();
        let dst = rom
            .get_mut(slot..slot + bytes.len())
            .ok_or(PtrError::TableOutOfBounds { index, slot, len })?;
        dst.copy_from_slice(&bytes);
        Ok(())
    }

    /// Plan moving `records` (one per entry, in order) into `region` and
    /// repointing every slot. Nothing is written; the caller applies
    /// `writes` through whatever owns the image.
    ///
    /// # Errors
    /// `CountMismatch`, `NoRoom` or any pointer encoding failure.
    pub fn relocate(&self, region: Range<usize>, records: &[Vec<u8>]) -> Result<Relocation, PtrError> {
        if records.len() != self.count {
            return Err(PtrError::CountMismatch {
                count: records.len(),
                entries: self.count,
            });
        }
        let needed: usize = records.iter().map(Vec::len).sum();
        let available = region.len();
        if needed > available {
            return Err(PtrError::NoRoom { needed, available });
        }

        let mut data = Vec::with_capacity(needed);
        let mut offsets = Vec::with_capacity(records.len());
        let mut slots = Vec::with_capacity(records.len());
        for (i, r) in records.iter().enumerate() {
            let at = region.start + data.len();
            slots.push((self.slot(i)?, self.pointer_bytes(at)?));
            offsets.push(at);
            data.extend_from_slice(r);
        }

        let mut writes = vec![(region.start, data)];
        writes.extend(slots);
        debug!(
            "Relocated {} records into {:#X}..{:#X}, {needed} of {available} bytes",
            records.len(),
            region.start,
            region.end
        );
        Ok(Relocation {
            writes,
            offsets,
            used: needed,
        })
    }
}
