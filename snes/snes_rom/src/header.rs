use addr_map::Mapping;
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::RomError;

/// Bytes in the header block from the extended header through the checksum.
pub const HEADER_SIZE: usize = 0x30;

/// Longest title the header can hold.
pub const TITLE_LEN: usize = 21;

/// Developer byte which says an extended header is present.
pub const EXTENDED_DEVELOPER: u8 = 0x33;

// Extended header, relative to the block start ($7FB0/$FFB0).
const MAKER_BYTE: usize = 0x00;
const MAKER_LEN: usize = 2;
const GAME_BYTE: usize = 0x02;
const GAME_LEN: usize = 4;
const FLASH_BYTE: usize = 0x0C;
const EXP_RAM_BYTE: usize = 0x0D;
const SPECIAL_BYTE: usize = 0x0E;
const SUBTYPE_BYTE: usize = 0x0F;

// Core header.
const TITLE_BYTE: usize = 0x10;
const MAP_BYTE: usize = 0x25;
const CHIPSET_BYTE: usize = 0x26;
const ROM_SIZE_BYTE: usize = 0x27;
const SRAM_SIZE_BYTE: usize = 0x28;
const COUNTRY_BYTE: usize = 0x29;
const DEVELOPER_BYTE: usize = 0x2A;
const VERSION_BYTE: usize = 0x2B;
pub(crate) const COMPLEMENT_BYTE: usize = 0x2C;
pub(crate) const CHECKSUM_BYTE: usize = 0x2E;

const SPEED_MASK: u8 = 0x10;
const MAP_MASK: u8 = 0x0F;

// Sizes are 1KB << n. Anything past 2^24 bytes isn't a real cart.
const SIZE_UNIT: usize = 1024;
const MAX_SIZE_EXPONENT: u8 = 14;

/// `Speed` is the ROM access speed from the map mode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum Speed {
    /// 200ns (2.68MHz) access.
    Slow,
    /// 120ns (3.58MHz) access.
    Fast,
}

/// `Video` is the TV standard a region implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum Video {
    /// 60Hz.
    Ntsc,
    /// 50Hz.
    Pal,
}

/// `Region` decodes the country byte.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum Region {
    /// 0x00
    Japan,
    /// 0x01
    NorthAmerica,
    /// 0x02
    Europe,
    /// 0x03
    Scandinavia,
    /// 0x04
    Finland,
    /// 0x05
    Denmark,
    /// 0x06
    France,
    /// 0x07
    Netherlands,
    /// 0x08
    Spain,
    /// 0x09
    Germany,
    /// 0x0A
    Italy,
    /// 0x0B
    China,
    /// 0x0C
    Indonesia,
    /// 0x0D
    Korea,
    /// 0x0E
    International,
    /// 0x0F
    Canada,
    /// 0x10
    Brazil,
    /// 0x11
    Australia,
}

impl Region {
    /// Decode a country byte.
    #[must_use]
    pub fn from_country(country: u8) -> Option<Self> {
        Some(match country {
            0x00 => Region::Japan,
            0x01 => Region::NorthAmerica,
            0x02 => Region::Europe,
            0x03 => Region::Scandinavia,
            0x04 => Region::Finland,
            0x05 => Region::Denmark,
            0x06 => Region::France,
            0x07 => Region::Netherlands,
            0x08 => Region::Spain,
            0x09 => Region::Germany,
            0x0A => Region::Italy,
            0x0B => Region::China,
            0x0C => Region::Indonesia,
            0x0D => Region::Korea,
            0x0E => Region::International,
            0x0F => Region::Canada,
            0x10 => Region::Brazil,
            0x11 => Region::Australia,
            _ => return None,
        })
    }

    /// The video standard carts for this region run at.
    #[must_use]
    pub fn video(self) -> Video {
        match self {
            Region::Japan
            | Region::NorthAmerica
            | Region::Korea
            | Region::International
            | Region::Canada
            | Region::Brazil => Video::Ntsc,
            _ => Video::Pal,
        }
    }
}

/// `ExtendedHeader` is the 16 bytes in front of the core header, only
/// meaningful when the developer byte is 0x33.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedHeader {
    /// 2 character maker code.
    pub maker_code: String,
    /// 4 character game code.
    pub game_code: String,
    /// Expansion flash size exponent.
    pub expansion_flash: u8,
    /// Expansion RAM size exponent.
    pub expansion_ram: u8,
    /// Special version.
    pub special_version: u8,
    /// Cartridge sub-type.
    pub sub_type: u8,
}

/// `RomHeader` is the cartridge header. The fields hold the raw bytes;
/// the helper methods decode them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RomHeader {
    /// Title with trailing padding removed.
    pub title: String,
    /// Map mode and speed.
    pub map_mode: u8,
    /// Cartridge chipset (ROM/RAM/battery/coprocessor).
    pub chipset: u8,
    /// log2(ROM bytes / 1024).
    pub rom_size: u8,
    /// log2(SRAM bytes / 1024), 0 for none.
    pub sram_size: u8,
    /// Country code.
    pub country: u8,
    /// Developer (licensee) code.
    pub developer: u8,
    /// Mask ROM version.
    pub version: u8,
    /// Checksum complement as stored.
    pub complement: u16,
    /// Checksum as stored.
    pub checksum: u16,
    /// Present when `developer` is 0x33.
    pub extended: Option<ExtendedHeader>,
}

// Header bytes are read as Latin-1 so any title re-emits unchanged.
fn text(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| char::from(b))
        .collect::<String>()
        .trim_end_matches(|c: char| c == ' ' || c == '\0')
        .to_string()
}

fn put_text(dst: &mut [u8], s: &str, field: &'static str) -> Result<(), RomError> {
    let len = s.chars().count();
    if len > dst.len() {
        return Err(RomError::TooLong {
            field,
            len,
            limit: dst.len(),
        });
    }
    dst.fill(b' ');
    for (d, c) in dst.iter_mut().zip(s.chars()) {
        *d = u8::try_from(u32::from(c)).map_err(|_| RomError::InvalidHeader {
            reason: format!("{field} character {c:?} doesn't fit in a byte"),
        })?;
    }
    Ok(())
}

impl RomHeader {
    /// Parse a header block. `block` starts at $7FB0/$FFB0 and must hold at
    /// least `HEADER_SIZE` bytes.
    ///
    /// # Errors
    /// `TooSmall` if the block is short.
    pub fn parse(block: &[u8]) -> Result<Self, RomError> {
        if block.len() < HEADER_SIZE {
            return Err(RomError::TooSmall {
                len: block.len(),
                need: HEADER_SIZE,
            });
        }
        let developer = block[DEVELOPER_BYTE];
        let extended = (developer == EXTENDED_DEVELOPER).then(|| ExtendedHeader {
            maker_code: text(&block[MAKER_BYTE..MAKER_BYTE + MAKER_LEN]),
            game_code: text(&block[GAME_BYTE..GAME_BYTE + GAME_LEN]),
            expansion_flash: block[FLASH_BYTE],
            expansion_ram: block[EXP_RAM_BYTE],
            special_version: block[SPECIAL_BYTE],
            sub_type: block[SUBTYPE_BYTE],
        });
        Ok(Self {
            title: text(&block[TITLE_BYTE..TITLE_BYTE + TITLE_LEN]),
            map_mode: block[MAP_BYTE],
            chipset: block[CHIPSET_BYTE],
            rom_size: block[ROM_SIZE_BYTE],
            sram_size: block[SRAM_SIZE_BYTE],
            country: block[COUNTRY_BYTE],
            developer,
            version: block[VERSION_BYTE],
            complement: LittleEndian::read_u16(&block[COMPLEMENT_BYTE..]),
            checksum: LittleEndian::read_u16(&block[CHECKSUM_BYTE..]),
            extended,
        })
    }

    /// Pack the header into its block form. Without an extended header the
    /// first 16 bytes are zero.
    ///
    /// # Errors
    /// `TooLong` for an oversized title or code and `InvalidHeader` for a
    /// character that isn't a single byte.
    pub fn to_bytes(&self) -> Result<[u8; HEADER_SIZE], RomError> {
        let mut b = [0u8; HEADER_SIZE];
        self.write_block(&mut b)?;
        Ok(b)
    }

    /// Like `to_bytes` but writes into an existing block so an absent
    /// extended header leaves what's there alone.
    ///
    /// # Errors
    /// See `to_bytes`. `TooSmall` if `block` is short.
    pub fn write_block(&self, block: &mut [u8]) -> Result<(), RomError> {
        if block.len() < HEADER_SIZE {
            return Err(RomError::TooSmall {
                len: block.len(),
                need: HEADER_SIZE,
            });
        }
        if let Some(ext) = &self.extended {
            put_text(&mut block[MAKER_BYTE..MAKER_BYTE + MAKER_LEN], &ext.maker_code, "maker code")?;
            put_text(&mut block[GAME_BYTE..GAME_BYTE + GAME_LEN], &ext.game_code, "game code")?;
            block[FLASH_BYTE] = ext.expansion_flash;
            block[EXP_RAM_BYTE] = ext.expansion_ram;
            block[SPECIAL_BYTE] = ext.special_version;
            block[SUBTYPE_BYTE] = ext.sub_type;
        }
        put_text(&mut block[TITLE_BYTE..TITLE_BYTE + TITLE_LEN], &self.title, "title")?;
        block[MAP_BYTE] = self.map_mode;
        block[CHIPSET_BYTE] = self.chipset;
        block[ROM_SIZE_BYTE] = self.rom_size;
        block[SRAM_SIZE_BYTE] = self.sram_size;
        block[COUNTRY_BYTE] = self.country;
        block[DEVELOPER_BYTE] = self.developer;
        block[VERSION_BYTE] = self.version;
        LittleEndian::write_u16(&mut block[COMPLEMENT_BYTE..], self.complement);
        LittleEndian::write_u16(&mut block[CHECKSUM_BYTE..], self.checksum);
        Ok(())
    }

    /// True when checksum and complement agree with each other. This says
    /// nothing about whether the checksum matches the image.
    #[must_use]
    pub fn checksum_pair_ok(&self) -> bool {
        self.checksum ^ self.complement == 0xFFFF
    }

    /// Returns an error unless the checksum pair agrees.
    ///
    /// # Errors
    /// `ChecksumMismatch`.
    pub fn validate(&self) -> Result<(), RomError> {
        if self.checksum_pair_ok() {
            Ok(())
        } else {
            Err(RomError::ChecksumMismatch {
                checksum: self.checksum,
                complement: self.complement,
            })
        }
    }

    /// Access speed from the map mode byte.
    #[must_use]
    pub fn speed(&self) -> Speed {
        if self.map_mode & SPEED_MASK == 0 {
            Speed::Slow
        } else {
            Speed::Fast
        }
    }

    /// The mapping the map mode byte declares, if it's one we know.
    #[must_use]
    pub fn mapping(&self) -> Option<Mapping> {
        match self.map_mode & MAP_MASK {
            // Plain, SDD-1 and SA-1 are all LoROM shaped.
            0x0 | 0x2 | 0x3 => Some(Mapping::LoRom),
            0x1 | 0x5 | 0xA => Some(Mapping::HiRom),
            _ => None,
        }
    }

    /// Decoded country byte.
    #[must_use]
    pub fn region(&self) -> Option<Region> {
        Region::from_country(self.country)
    }

    /// Video standard for the region.
    #[must_use]
    pub fn video(&self) -> Option<Video> {
        self.region().map(Region::video)
    }

    /// ROM size in bytes.
    #[must_use]
    pub fn rom_bytes(&self) -> Option<usize> {
        (self.rom_size <= MAX_SIZE_EXPONENT).then(|| SIZE_UNIT << self.rom_size)
    }

    /// SRAM size in bytes, 0 without SRAM.
    #[must_use]
    pub fn sram_bytes(&self) -> Option<usize> {
        match self.sram_size {
            0 => Some(0),
            n if n <= MAX_SIZE_EXPONENT => Some(SIZE_UNIT << n),
            _ => None,
        }
    }
}
