//! `snes_rom` owns a ROM image: it finds and parses the cartridge header,
//! reads and writes the interrupt vectors and keeps the checksum right.
//!
//! The header block lives at the end of the first bank's ROM window:
//!
//! * $7FB0 (flat 0x7FB0) for LoROM
//! * $FFB0 (flat 0xFFB0) for HiROM
//!
//! The first 16 bytes are the extended header, then the 32 byte header
//! proper at +0x10 and the vector table at +0x30. All of these shift by 512
//! bytes when the image has a copier header.
//!
//! A `Rom` is only changed inside `Rom::edit`. Writes go through a `RomMut`
//! which journals them so a failed edit leaves the image as it was.

use addr_map::{AddrError, AddrMap, Mapping};
use log::{debug, trace};
use strum_macros::IntoStaticStr;
use thiserror::Error;

mod checksum;
mod header;
mod vectors;

pub use checksum::{compute as compute_checksum, mirrored_sum};
pub use header::{
    ExtendedHeader, Region, RomHeader, Speed, Video, EXTENDED_DEVELOPER, HEADER_SIZE, TITLE_LEN,
};
pub use vectors::{Vector, Vectors, UNUSED_VECTOR, VECTORS_SIZE};


/// Flat offset (without any copier header) of the LoROM header block.
pub const LOROM_HEADER_BLOCK: usize = 0x7FB0;

/// Flat offset (without any copier header) of the HiROM header block.
pub const HIROM_HEADER_BLOCK: usize = 0xFFB0;

const VECTORS_AT: usize = HEADER_SIZE;
const BLOCK_SIZE: usize = HEADER_SIZE + VECTORS_SIZE;

/// `RomError` defines the failures from reading or editing an image.
#[derive(Error, Debug, Clone, PartialEq, Eq, IntoStaticStr)]
pub enum RomError {
    /// Not enough bytes for what was asked.
    #[error("Have {len} bytes, need at least {need}")]
    TooSmall {
        /// Bytes available.
        len: usize,
        /// Bytes required.
        need: usize,
    },

    /// Header contents can't be represented.
    #[error("Invalid header: {reason}")]
    InvalidHeader {
        /// What's wrong.
        reason: String,
    },

    /// A header text field is longer than its slot.
    #[error("{field} is {len} characters, limit is {limit}")]
    TooLong {
        /// Field name.
        field: &'static str,
        /// Supplied length.
        len: usize,
        /// Slot length.
        limit: usize,
    },

    /// Checksum and complement don't agree.
    #[error("Checksum {checksum:#06X} and complement {complement:#06X} don't add up to 0xFFFF")]
    ChecksumMismatch {
        /// Stored checksum.
        checksum: u16,
        /// Stored complement.
        complement: u16,
    },

    /// A read or write runs past the end of the image.
    #[error("{len} bytes at {offset:#X} runs past the end of the {size} byte image")]
    OutOfBounds {
        /// Start offset.
        offset: usize,
        /// Length of the access.
        len: usize,
        /// Image length.
        size: usize,
    },

    /// Address conversion failed.
    #[error(transparent)]
    Addr(#[from] AddrError),
}

impl RomError {
    /// Variant name for reporting. Wrapped errors report the inner variant.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            RomError::Addr(e) => e.into(),
            other => other.into(),
        }
    }
}

// Flat offset of the header block for a mapping, copier header included.
fn block_offset(map: &AddrMap) -> usize {
    map.header_offset()
        + match map.mapping() {
            Mapping::LoRom => LOROM_HEADER_BLOCK,
            Mapping::HiRom => HIROM_HEADER_BLOCK,
        }
}

// How much a candidate header block looks like the real one.
fn score(data: &[u8], map: &AddrMap) -> Option<u32> {
    let at = block_offset(map);
    let block = data.get(at..at + BLOCK_SIZE)?;
    let hdr = RomHeader::parse(block).ok()?;
    let vectors = Vectors::parse(&block[VECTORS_AT..]).ok()?;
    let mut score = 0;
    if hdr.checksum_pair_ok() {
        score += 4;
    }
    if hdr.mapping() == Some(map.mapping()) {
        score += 2;
    }
    if hdr.title.bytes().all(|b| (0x20..0x7F).contains(&b)) {
        score += 1;
    }
    if vectors.reset >= 0x8000 && vectors.reset != UNUSED_VECTOR {
        score += 1;
    }
    if (0x07..=0x0D).contains(&hdr.rom_size) {
        score += 1;
    }
    Some(score)
}

/// Guess the mapping of an image by scoring both header locations. Ties
/// go to LoROM.
///
/// # Errors
/// `TooSmall` if neither header block fits in the image.
pub fn detect_mapping(data: &[u8]) -> Result<Mapping, RomError> {
    let lo = score(data, &AddrMap::for_image(Mapping::LoRom, data.len()));
    let hi = score(data, &AddrMap::for_image(Mapping::HiRom, data.len()));
    debug!("Mapping scores: LoROM {lo:?}, HiROM {hi:?}");
    match (lo, hi) {
        (None, None) => Err(RomError::TooSmall {
            len: data.len(),
            need: LOROM_HEADER_BLOCK + BLOCK_SIZE,
        }),
        (Some(l), Some(h)) if h > l => Ok(Mapping::HiRom),
        (None, Some(_)) => Ok(Mapping::HiRom),
        _ => Ok(Mapping::LoRom),
    }
}

/// `Rom` is one image and the mapping used to address it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rom {
    data: Vec<u8>,
    map: AddrMap,
}

impl Rom {
    /// Load an image, detecting its mapping.
    ///
    /// # Errors
    /// `TooSmall` if the image can't hold a header.
    pub fn new(data: Vec<u8>) -> Result<Self, RomError> {
        let mapping = detect_mapping(&data)?;
        Self::with_mapping(data, mapping)
    }

    /// Load an image with a known mapping.
    ///
    /// # Errors
    /// `TooSmall` if the image can't hold the header block for `mapping`.
    pub fn with_mapping(data: Vec<u8>, mapping: Mapping) -> Result<Self, RomError> {
        let map = AddrMap::for_image(mapping, data.len());
        let need = block_offset(&map) + BLOCK_SIZE;
        if data.len() < need {
            return Err(RomError::TooSmall {
                len: data.len(),
                need,
            });
        }
        debug!("Loaded {} byte {mapping} image", data.len());
        Ok(Self { data, map })
    }

    /// The whole image, copier header included.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Give back the image.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Image length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for an empty image.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The address map for this image.
    #[must_use]
    pub fn map(&self) -> &AddrMap {
        &self.map
    }

    /// The mapping in use.
    #[must_use]
    pub fn mapping(&self) -> Mapping {
        self.map.mapping()
    }

    /// ROM data without any copier header.
    #[must_use]
    pub fn rom_data(&self) -> &[u8] {
        &self.data[self.map.header_offset()..]
    }

    /// Flat offset of the header block.
    #[must_use]
    pub fn header_block_offset(&self) -> usize {
        block_offset(&self.map)
    }

    fn block(&self) -> &[u8] {
        let at = self.header_block_offset();
        &self.data[at..at + BLOCK_SIZE]
    }

    /// Parse the header.
    ///
    /// # Errors
    /// Only if the header can't be read at all.
    pub fn header(&self) -> Result<RomHeader, RomError> {
        RomHeader::parse(self.block())
    }

    /// Parse the vector table.
    ///
    /// # Errors
    /// Only if the table can't be read at all.
    pub fn vectors(&self) -> Result<Vectors, RomError> {
        Vectors::parse(&self.block()[VECTORS_AT..])
    }

    /// Borrow `len` bytes at a flat offset.
    ///
    /// # Errors
    /// `OutOfBounds` if the range isn't inside the image.
    pub fn read(&self, offset: usize, len: usize) -> Result<&[u8], RomError> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or(RomError::OutOfBounds {
                offset,
                len,
                size: self.data.len(),
            })
    }

    /// Borrow `len` bytes at a logical address.
    ///
    /// # Errors
    /// `Addr` if the address is unmapped, otherwise see `read`.
    pub fn read_logical(&self, bank: u8, addr: u16, len: usize) -> Result<&[u8], RomError> {
        let flat = self.map.logical_to_flat(bank, addr)?;
        self.read(flat, len)
    }

    /// The checksum the current contents should carry.
    #[must_use]
    pub fn computed_checksum(&self) -> u16 {
        let block = self.header_block_offset() - self.map.header_offset();
        checksum::compute(self.rom_data(), block)
    }

    /// True if the stored checksum matches the contents and its
    /// complement.
    ///
    /// # Errors
    /// See `header`.
    pub fn checksum_ok(&self) -> Result<bool, RomError> {
        let hdr = self.header()?;
        Ok(hdr.checksum_pair_ok() && hdr.checksum == self.computed_checksum())
    }

    // Unjournaled. Only used once an edit has committed.
    fn store_checksum(&mut self) -> u16 {
        let checksum = self.computed_checksum();
        let at = self.header_block_offset();
        let complement = checksum ^ 0xFFFF;
        self.data[at + header::COMPLEMENT_BYTE..at + header::COMPLEMENT_BYTE + 2]
            .copy_from_slice(&complement.to_le_bytes());
        self.data[at + header::CHECKSUM_BYTE..at + header::CHECKSUM_BYTE + 2]
            .copy_from_slice(&checksum.to_le_bytes());
        checksum
    }

    /// Rewrite the checksum and complement for the current contents.
    pub fn recompute_checksum(&mut self) -> u16 {
        let checksum = self.store_checksum();
        debug!("Checksum now {checksum:#06X}");
        checksum
    }

    /// Run `f` over a `RomMut`. If it fails every write it made is undone
    /// and the error returned. If it succeeds the checksum is recomputed.
    ///
    /// # Errors
    /// Whatever `f` returns.
    pub fn edit<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut RomMut<'_>) -> Result<T, E>,
    {
        let mut m = RomMut {
            rom: self,
            journal: Vec::new(),
        };
        match f(&mut m) {
            Ok(v) => {
                let writes = m.journal.len();
                let checksum = m.rom.store_checksum();
                debug!("Edit committed {writes} writes, checksum {checksum:#06X}");
                Ok(v)
            }
            Err(e) => {
                m.rollback();
                Err(e)
            }
        }
    }
}

/// `RomMut` is the write handle inside `Rom::edit`. Writes never change
/// the image length.
#[derive(Debug)]
pub struct RomMut<'a> {
    rom: &'a mut Rom,
    journal: Vec<(usize, Vec<u8>)>,
}

impl RomMut<'_> {
    /// The image as it stands mid-edit.
    #[must_use]
    pub fn rom(&self) -> &Rom {
        self.rom
    }

    /// Number of writes made so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.journal.len()
    }

    /// Overwrite bytes at a flat offset.
    ///
    /// # Errors
    /// `OutOfBounds` if the write doesn't fit in the image.
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), RomError> {
        let size = self.rom.data.len();
        let dst = offset
            .checked_add(bytes.len())
            .and_then(|end| self.rom.data.get_mut(offset..end))
            .ok_or(RomError::OutOfBounds {
                offset,
                len: bytes.len(),
                size,
            })?;
        self.journal.push((offset, dst.to_vec()));
        dst.copy_from_slice(bytes);
        trace!("Wrote {} bytes at {offset:#X}", bytes.len());
        Ok(())
    }

    /// Overwrite bytes at a logical address.
    ///
    /// # Errors
    /// `Addr` if the address is unmapped, otherwise see `write`.
    pub fn write_logical(&mut self, bank: u8, addr: u16, bytes: &[u8]) -> Result<(), RomError> {
        let flat = self.rom.map.logical_to_flat(bank, addr)?;
        self.write(flat, bytes)
    }

    /// Apply a list of planned writes in order. Stops at the first that
    /// doesn't fit; the enclosing edit then rolls all of them back.
    ///
    /// # Errors
    /// See `write`.
    pub fn apply(&mut self, writes: &[(usize, Vec<u8>)]) -> Result<(), RomError> {
        for (offset, bytes) in writes {
            self.write(*offset, bytes)?;
        }
        Ok(())
    }

    /// Fill `len` bytes with `value`.
    ///
    /// # Errors
    /// See `write`.
    pub fn fill(&mut self, offset: usize, len: usize, value: u8) -> Result<(), RomError> {
        self.write(offset, &vec![value; len])
    }

    /// Write a header into the header block. The checksum fields are
    /// overwritten again when the edit commits.
    ///
    /// # Errors
    /// Anything `RomHeader::write_block` returns.
    pub fn write_header(&mut self, hdr: &RomHeader) -> Result<(), RomError> {
        let at = self.rom.header_block_offset();
        let mut block = self.rom.data[at..at + HEADER_SIZE].to_vec();
        hdr.write_block(&mut block)?;
        self.write(at, &block)
    }

    /// Write the vector table.
    ///
    /// # Errors
    /// See `write`.
    pub fn write_vectors(&mut self, vectors: &Vectors) -> Result<(), RomError> {
        let at = self.rom.header_block_offset() + VECTORS_AT;
        let mut table = self.rom.data[at..at + VECTORS_SIZE].to_vec();
        vectors.write_table(&mut table)?;
        self.write(at, &table)
    }

    fn rollback(self) {
        let n = self.journal.len();
        for (offset, old) in self.journal.into_iter().rev() {
            self.rom.data[offset..offset + old.len()].copy_from_slice(&old);
        }
        debug!("Rolled back {n} writes");
    }
}
