use std::fmt;

use addr_map::Mapping;
use serde::Serialize;
use snes_rom::{Region, Rom, RomError, RomHeader, Speed, Vector, Vectors, Video};
use strum::IntoEnumIterator;

/// `HeaderReport` is everything worth knowing about a ROM's header in one
/// serializable value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderReport {
    /// Detected or forced mapping.
    pub mapping: Mapping,
    /// Whether a 512 byte copier header precedes the image.
    pub copier_header: bool,
    /// Flat offset of the header block.
    pub header_offset: usize,
    /// Parsed header.
    pub header: RomHeader,
    /// Interrupt vectors.
    pub vectors: Vectors,
    /// ROM access speed from the map mode byte.
    pub speed: Speed,
    /// Region for the country code, if known.
    pub region: Option<Region>,
    /// NTSC or PAL, if the country is known.
    pub video: Option<Video>,
    /// ROM size the header declares.
    pub rom_bytes: Option<usize>,
    /// SRAM size the header declares.
    pub sram_bytes: Option<usize>,
    /// Image size in bytes.
    pub image_bytes: usize,
    /// Checksum of the image as it is.
    pub computed_checksum: u16,
    /// Stored checksum and complement both match.
    pub checksum_ok: bool,
}

impl HeaderReport {
    /// Build the report for `rom`.
    ///
    /// # Errors
    /// `TooSmall` if the header block doesn't fit.
    pub fn new(rom: &Rom) -> Result<Self, RomError> {
        let header = rom.header()?;
        Ok(Self {
            mapping: rom.mapping(),
            copier_header: rom.map().has_copier_header(),
            header_offset: rom.header_block_offset(),
            vectors: rom.vectors()?,
            speed: header.speed(),
            region: header.region(),
            video: header.video(),
            rom_bytes: header.rom_bytes(),
            sram_bytes: header.sram_bytes(),
            image_bytes: rom.len(),
            computed_checksum: rom.computed_checksum(),
            checksum_ok: rom.checksum_ok()?,
            header,
        })
    }
}

fn size(bytes: Option<usize>) -> String {
    match bytes {
        Some(b) if b >= 1024 => format!("{}KB", b / 1024),
        Some(b) => format!("{b}B"),
        None => "invalid".into(),
    }
}

impl fmt::Display for HeaderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = &self.header;
        writeln!(f, "Title: {:?}", h.title)?;
        writeln!(
            f,
            "Mapping: {} ({} speed), map mode {:02X}",
            self.mapping, self.speed, h.map_mode
        )?;
        writeln!(
            f,
            "Header block: {:#07X}{}",
            self.header_offset,
            if self.copier_header {
                " (copier header)"
            } else {
                ""
            }
        )?;
        writeln!(f, "Chipset: {:02X}", h.chipset)?;
        writeln!(
            f,
            "ROM size: {} (image is {} bytes)",
            size(self.rom_bytes),
            self.image_bytes
        )?;
        writeln!(f, "SRAM size: {}", size(self.sram_bytes))?;
        match (self.region, self.video) {
            (Some(r), Some(v)) => writeln!(f, "Region: {r} ({v})")?,
            _ => writeln!(f, "Region: unknown ({:02X})", h.country)?,
        }
        writeln!(f, "Developer: {:02X} version {}", h.developer, h.version)?;
        if let Some(ext) = &h.extended {
            writeln!(
                f,
                "Maker: {:?} game: {:?}",
                ext.maker_code, ext.game_code
            )?;
        }
        writeln!(
            f,
            "Checksum: {:04X} complement: {:04X} computed: {:04X} {}",
            h.checksum,
            h.complement,
            self.computed_checksum,
            if self.checksum_ok { "OK" } else { "BAD" }
        )?;
        for v in Vector::iter() {
            writeln!(f, "{v}: {:04X}", self.vectors.get(v))?;
        }
        Ok(())
    }
}
