//! `addr_map` converts between 24 bit logical SNES addresses (bank:addr)
//! and flat offsets into a ROM image under the two common cartridge
//! layouts.
//!
//! LoROM maps a 32KB window at $8000-$FFFF of each bank:
//!
//! flat = (bank & 0x7F) * 0x8000 + (addr - 0x8000)
//!
//! HiROM maps each bank linearly as 64KB:
//!
//! flat = (bank & 0x3F) * 0x10000 + addr
//!
//! If the image carries a 512 byte copier (SMC) header every flat offset is
//! shifted by 512 to account for it.

use log::debug;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;


/// Size of the copier header some dumps carry in front of the ROM data.
pub const COPIER_HEADER_SIZE: usize = 512;

const LOROM_BANK_SIZE: usize = 0x8000;
const HIROM_BANK_SIZE: usize = 0x1_0000;
const LOROM_WINDOW: u16 = 0x8000;

// Work RAM banks which never map ROM in either layout.
const WRAM_BANK_LO: u8 = 0x7E;
const WRAM_BANK_HI: u8 = 0x7F;

// Largest image either mapping can address (4MB without extensions).
const MAX_MAPPED: usize = 0x40_0000;

/// `AddrError` defines the ways an address conversion can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq, IntoStaticStr)]
pub enum AddrError {
    /// The logical address has no ROM behind it in this mapping.
    #[error("${bank:02X}:{addr:04X} is not mapped to ROM under {mapping}")]
    Unmapped {
        /// Bank byte.
        bank: u8,
        /// Address within the bank.
        addr: u16,
        /// The active mapping.
        mapping: Mapping,
    },

    /// A flat offset points into the copier header.
    #[error("Flat offset {offset:#X} lies inside the 512 byte copier header")]
    HeaderOverlap {
        /// The offending offset.
        offset: usize,
    },

    /// A flat offset is beyond what the mapping can address.
    #[error("Flat offset {offset:#X} is beyond the addressable range for {mapping}")]
    OutOfRange {
        /// The offending offset.
        offset: usize,
        /// The active mapping.
        mapping: Mapping,
    },
}

/// `Mapping` names the cartridge memory layout.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Mapping {
    /// 32KB banks mapped at $8000-$FFFF.
    #[default]
    LoRom,

    /// 64KB linear banks.
    HiRom,
}

impl Mapping {
    /// The size of one bank's worth of ROM under this mapping.
    #[must_use]
    pub fn bank_size(self) -> usize {
        match self {
            Mapping::LoRom => LOROM_BANK_SIZE,
            Mapping::HiRom => HIROM_BANK_SIZE,
        }
    }
}

/// Returns true if an image of this length carries a copier header.
#[must_use]
pub fn has_copier_header(image_len: usize) -> bool {
    image_len % 1024 == COPIER_HEADER_SIZE
}

/// `AddrMap` resolves logical addresses for one image. Whether the image
/// has a copier header is fixed when it's constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrMap {
    mapping: Mapping,
    copier_header: bool,
}

impl AddrMap {
    /// Create a map with an explicit copier header setting.
    #[must_use]
    pub fn new(mapping: Mapping, copier_header: bool) -> Self {
        Self {
            mapping,
            copier_header,
        }
    }

    /// Create a map for an image of the given length, detecting a copier
    /// header from the size.
    #[must_use]
    pub fn for_image(mapping: Mapping, image_len: usize) -> Self {
        let copier_header = has_copier_header(image_len);
        debug!("{mapping} image of {image_len} bytes, copier header: {copier_header}");
        Self::new(mapping, copier_header)
    }

    /// The active mapping.
    #[must_use]
    pub fn mapping(&self) -> Mapping {
        self.mapping
    }

    /// Whether flat offsets include a copier header.
    #[must_use]
    pub fn has_copier_header(&self) -> bool {
        self.copier_header
    }

    /// Bytes in front of the ROM data proper (0 or 512).
    #[must_use]
    pub fn header_offset(&self) -> usize {
        if self.copier_header {
            COPIER_HEADER_SIZE
        } else {
            0
        }
    }

    /// Convert bank:addr to a flat image offset.
    ///
    /// # Errors
    /// `Unmapped` if the address has no ROM behind it (LoROM below $8000,
    /// HiROM system area in banks $00-$3F/$80-$BF, or the WRAM banks).
    pub fn logical_to_flat(&self, bank: u8, addr: u16) -> Result<usize, AddrError> {
        let unmapped = AddrError::Unmapped {
            bank,
            addr,
            mapping: self.mapping,
        };
        if bank == WRAM_BANK_LO || bank == WRAM_BANK_HI {
            return Err(unmapped);
        }
        let rom = match self.mapping {
            Mapping::LoRom => {
                if addr < LOROM_WINDOW {
                    return Err(unmapped);
                }
                usize::from(bank & 0x7F) * LOROM_BANK_SIZE + usize::from(addr - LOROM_WINDOW)
            }
            Mapping::HiRom => {
                // Banks $00-$3F and $80-$BF only mirror ROM in the upper half.
                if bank & 0x40 == 0 && addr < LOROM_WINDOW {
                    return Err(unmapped);
                }
                usize::from(bank & 0x3F) * HIROM_BANK_SIZE + usize::from(addr)
            }
        };
        Ok(rom + self.header_offset())
    }

    /// Convert a packed 24 bit address ($BBAAAA) to a flat offset.
    ///
    /// # Errors
    /// See `logical_to_flat`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn follow24(&self, ptr: u32) -> Result<usize, AddrError> {
        // Bank is bits 16-23, address the low word.
        self.logical_to_flat((ptr >> 16) as u8, (ptr & 0xFFFF) as u16)
    }

    /// Resolve a 16 bit in-bank pointer using an ambient bank.
    ///
    /// # Errors
    /// See `logical_to_flat`.
    pub fn follow16(&self, bank_hint: u8, ptr: u16) -> Result<usize, AddrError> {
        self.logical_to_flat(bank_hint, ptr)
    }

    /// Convert a flat offset back to its canonical bank:addr.
    ///
    /// LoROM offsets resolve to banks $00-$7D and then $FE/$FF (the WRAM
    /// banks can't hold ROM). HiROM offsets resolve into the $C0-$FF
    /// linear region.
    ///
    /// # Errors
    /// `HeaderOverlap` if the offset is inside a copier header and
    /// `OutOfRange` past the 4MB either mapping reaches.
    pub fn flat_to_logical(&self, flat: usize) -> Result<(u8, u16), AddrError> {
        let off = flat
            .checked_sub(self.header_offset())
            .ok_or(AddrError::HeaderOverlap { offset: flat })?;
        if off >= MAX_MAPPED {
            return Err(AddrError::OutOfRange {
                offset: flat,
                mapping: self.mapping,
            });
        }
        // Both ranges are bounded by MAX_MAPPED above so these casts can't truncate.
        #[allow(clippy::cast_possible_truncation)]
        let res = match self.mapping {
            Mapping::LoRom => {
                let mut bank = (off / LOROM_BANK_SIZE) as u8;
                if bank >= WRAM_BANK_LO {
                    bank |= 0x80;
                }
                (bank, LOROM_WINDOW | (off % LOROM_BANK_SIZE) as u16)
            }
            Mapping::HiRom => (0xC0 | (off >> 16) as u8, (off & 0xFFFF) as u16),
        };
        Ok(res)
    }
}
