use std::fs;
use std::path::{Path, PathBuf};

use addr_map::Mapping;
use bitio::DEFAULT_MAX_OUTPUT;
use log::debug;
use lzblock::Grammar;
use pointer_table::Width;
use serde::{Deserialize, Serialize};
use snes_chr::{Depth, RenderMode};
use snes_rom::Rom;
use snes_text::Table;
use strum_macros::IntoStaticStr;

use crate::ExtractError;

/// `Manifest` lists what to pull out of one ROM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Force a mapping instead of detecting one.
    #[serde(default)]
    pub mapping: Option<Mapping>,

    /// Character table for text assets.
    #[serde(default)]
    pub text: Option<TextConfig>,

    /// The assets, extracted in parallel.
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// `TextConfig` says where the table file lives and how strings are
/// framed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextConfig {
    /// Table file, relative to the manifest.
    pub table: PathBuf,

    /// String terminator byte.
    #[serde(default)]
    pub terminator: u8,

    /// Inclusive byte range holding DTE pairs.
    #[serde(default)]
    pub dte: Option<(u8, u8)>,

    /// Per string encoded size limit.
    #[serde(default)]
    pub budget: Option<usize>,
}

/// `Location` is either a flat image offset or a bank:addr pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Location {
    /// Offset into the image file, copier header included.
    Flat(usize),

    /// CPU address, converted through the ROM's mapping.
    Logical {
        /// Bank byte.
        bank: u8,
        /// Address within the bank.
        addr: u16,
    },
}

impl Location {
    /// Flat offset in `rom`.
    ///
    /// # Errors
    /// `Unmapped` for a logical address with no ROM behind it.
    pub fn resolve(self, rom: &Rom) -> Result<usize, ExtractError> {
        match self {
            Location::Flat(offset) => Ok(offset),
            Location::Logical { bank, addr } => Ok(rom.map().logical_to_flat(bank, addr)?),
        }
    }
}

/// `Compression` is how the bytes at a location are stored.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    /// Stored as is.
    #[default]
    None,
    /// LZ stream described by the source's grammar.
    Lz,
    /// Tail-window stream.
    TailWindow,
}

/// `Transform` is a fixed expansion applied after decompression.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    /// Leave the bytes alone.
    #[default]
    None,
    /// 3bpp 24 byte chunks widened to 4bpp 32 byte chunks.
    SecondHalf,
    /// Each byte split into two 3 bit indices.
    Nibbles,
}

impl Transform {
    // Bytes the transform consumes to produce `want` bytes.
    fn input_len(self, want: usize) -> usize {
        match self {
            Transform::None => want,
            Transform::SecondHalf => want.div_ceil(0x20) * 0x18,
            Transform::Nibbles => want.div_ceil(2),
        }
    }
}

/// `Source` describes how to turn ROM bytes into asset bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Source {
    /// Storage format.
    pub compression: Compression,
    /// LZ variant when `compression` is `lz`.
    pub grammar: Grammar,
    /// Post decompression expansion.
    pub transform: Transform,
}

impl Source {
    /// Produce exactly `want` bytes starting at `offset`.
    ///
    /// # Errors
    /// `ShortData` if the source yields fewer bytes, otherwise whatever the
    /// decompressor or transform returns.
    pub fn bytes(&self, rom: &[u8], offset: usize, want: usize) -> Result<Vec<u8>, ExtractError> {
        let input = rom.get(offset..).ok_or(ExtractError::ShortData {
            have: 0,
            want,
        })?;
        let need = self.transform.input_len(want);
        let mut raw = match self.compression {
            Compression::None => input[..need.min(input.len())].to_vec(),
            Compression::Lz => self.grammar.decompress(input, DEFAULT_MAX_OUTPUT)?,
            Compression::TailWindow => lzblock::decompress_tail_window(input, DEFAULT_MAX_OUTPUT)?,
        };
        if raw.len() < need {
            return Err(ExtractError::ShortData {
                have: raw.len(),
                want: need,
            });
        }
        raw.truncate(need);
        let mut out = match self.transform {
            Transform::None => raw,
            Transform::SecondHalf => lzblock::expand_second_half(&raw)?,
            Transform::Nibbles => lzblock::expand_nibbles(&raw),
        };
        out.truncate(want);
        Ok(out)
    }
}

fn default_columns() -> usize {
    16
}

fn default_count() -> usize {
    1
}

fn default_max_blocks() -> usize {
    0x1000
}

fn default_sample_rate() -> u32 {
    brr::DEFAULT_SAMPLE_RATE
}

fn default_limit() -> usize {
    0x400
}

/// `AssetKind` is what an asset decodes as, with its kind specific
/// settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, IntoStaticStr)]
#[serde(tag = "kind", rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AssetKind {
    /// A tile sheet rendered to PNG.
    Tiles {
        /// Bits per pixel.
        #[serde(default)]
        depth: Depth,
        /// Number of tiles.
        count: usize,
        /// Tiles per row in the sheet.
        #[serde(default = "default_columns")]
        columns: usize,
        /// Where the palette is. A gray ramp is used without one.
        #[serde(default)]
        palette: Option<Location>,
        /// How index 0 renders.
        #[serde(default)]
        mode: RenderMode,
        /// Storage.
        #[serde(default)]
        source: Source,
    },

    /// Consecutive 32 byte palettes written as JSON.
    Palette {
        /// How many palettes.
        #[serde(default = "default_count")]
        count: usize,
    },

    /// A BRR sample converted to WAV.
    Brr {
        /// Scan ceiling.
        #[serde(default = "default_max_blocks")]
        max_blocks: usize,
        /// WAV sample rate.
        #[serde(default = "default_sample_rate")]
        sample_rate: u32,
    },

    /// A pointer table of strings decoded to JSON.
    Text {
        /// Entries in the table.
        count: usize,
        /// Pointer width, 2 or 3.
        #[serde(default)]
        width: Width,
        /// Bank for 2 byte pointers. Defaults to the table's own bank.
        #[serde(default)]
        bank: Option<u8>,
        /// Longest string scanned for a terminator.
        #[serde(default = "default_limit")]
        limit: usize,
    },

    /// Bytes copied out unchanged (after decompression).
    Raw {
        /// Length of the output.
        len: usize,
        /// Storage.
        #[serde(default)]
        source: Source,
    },

    /// The cartridge header, vectors and checksum state as JSON.
    Header,
}

impl AssetKind {
    /// Component name used in the summary.
    #[must_use]
    pub fn component(&self) -> &'static str {
        self.into()
    }
}

/// `Asset` is one manifest entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Output file stem. Must be unique in the manifest.
    pub name: String,

    /// Where the asset starts. Ignored for `header`.
    #[serde(default = "Asset::origin")]
    pub at: Location,

    /// What it is.
    #[serde(flatten)]
    pub kind: AssetKind,
}

impl Asset {
    fn origin() -> Location {
        Location::Flat(0)
    }
}

impl Manifest {
    /// Parse a manifest from JSON.
    ///
    /// # Errors
    /// `Json` for malformed input.
    pub fn from_json(json: &str) -> Result<Self, ExtractError> {
        let m: Manifest = serde_json::from_str(json)?;
        debug!("Manifest has {} assets", m.assets.len());
        Ok(m)
    }

    /// Load a manifest file.
    ///
    /// # Errors
    /// `Io` or `Json`.
    pub fn load(path: &Path) -> Result<Self, ExtractError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Load the text table, resolving its path against `base`.
    ///
    /// # Errors
    /// `Io` reading the file or a `TableSyntax` codec error.
    pub fn table(&self, base: &Path) -> Result<Option<Table>, ExtractError> {
        let Some(cfg) = &self.text else {
            return Ok(None);
        };
        let text = fs::read_to_string(base.join(&cfg.table))?;
        Ok(Some(cfg.build(&text)?))
    }
}

impl TextConfig {
    /// Build a table from the contents of the table file.
    ///
    /// # Errors
    /// `TableSyntax` for a bad line.
    pub fn build(&self, table_text: &str) -> Result<Table, ExtractError> {
        let mut table = Table::new(self.terminator);
        if let Some((lo, hi)) = self.dte {
            table = table.with_dte_range(lo..=hi);
        }
        if let Some(budget) = self.budget {
            table = table.with_budget(budget);
        }
        Ok(snes_text::parse_table(table_text, table)?)
    }
}

/// Wrap an image in a `Rom`, forcing the manifest's mapping if it names
/// one.
///
/// # Errors
/// `TooSmall` if the image can't hold a header.
pub fn open_rom(data: Vec<u8>, manifest: &Manifest) -> Result<Rom, ExtractError> {
    let rom = match manifest.mapping {
        Some(m) => Rom::with_mapping(data, m)?,
        None => Rom::new(data)?,
    };
    debug!("Opened {} byte image as {}", rom.len(), rom.mapping());
    Ok(rom)
}
