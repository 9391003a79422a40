use std::collections::BTreeMap;
use std::fs;
use std::io::Cursor;
use std::path::Path;

use log::{debug, info, warn};
use pointer_table::{Payload, PointerTable};
use rayon::prelude::*;
use serde::Serialize;
use snes_chr::{Depth, RenderMode, Tile};
use snes_pal::{Color, Palette, PALETTE_SIZE};
use snes_rom::Rom;
use snes_text::Table;

use crate::manifest::{Asset, AssetKind, Location, Manifest, Source};
use crate::report::HeaderReport;
use crate::ExtractError;

/// `OutputKind` is the file format of one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Rendered tile sheet.
    Png,
    /// Palettes, strings or the header report.
    Json,
    /// Decoded BRR sample.
    Wav,
    /// Bytes as stored, after decompression.
    Raw,
}

impl OutputKind {
    /// File extension.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            OutputKind::Png => "png",
            OutputKind::Json => "json",
            OutputKind::Wav => "wav",
            OutputKind::Raw => "bin",
        }
    }
}

/// `Output` is one extracted file, not yet written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    /// Asset name.
    pub name: String,
    /// Format.
    pub kind: OutputKind,
    /// File contents.
    pub data: Vec<u8>,
}

impl Output {
    /// `name.ext`
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, self.kind.extension())
    }
}

/// `Tally` counts one component's results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    /// Assets that extracted.
    pub ok: usize,
    /// Failures keyed by error kind.
    pub errors: BTreeMap<&'static str, usize>,
}

/// `Summary` is the per component tally for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Summary {
    /// Tallies keyed by asset kind.
    pub components: BTreeMap<&'static str, Tally>,
}

impl Summary {
    /// Assets that extracted cleanly.
    #[must_use]
    pub fn ok(&self) -> usize {
        self.components.values().map(|t| t.ok).sum()
    }

    /// Assets that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.components
            .values()
            .flat_map(|t| t.errors.values())
            .sum()
    }
}

/// `Batch` is the result of extracting a whole manifest.
#[derive(Debug, Default)]
pub struct Batch {
    /// Successful outputs in manifest order.
    pub outputs: Vec<Output>,
    /// Failed asset names with the error.
    pub failures: Vec<(String, ExtractError)>,
    /// Counts.
    pub summary: Summary,
}

impl Batch {
    /// Write every output plus `summary.json` into `dir`, creating it if
    /// needed.
    ///
    /// # Errors
    /// `Io` or `Json`.
    pub fn write(&self, dir: &Path) -> Result<(), ExtractError> {
        fs::create_dir_all(dir)?;
        for o in &self.outputs {
            fs::write(dir.join(o.file_name()), &o.data)?;
        }
        fs::write(
            dir.join("summary.json"),
            serde_json::to_vec_pretty(&self.summary)?,
        )?;
        debug!("Wrote {} outputs to {}", self.outputs.len(), dir.display());
        Ok(())
    }
}

#[derive(Serialize)]
struct PaletteJson {
    index: usize,
    words: Vec<u16>,
    rgb: Vec<[u8; 3]>,
}

#[derive(Serialize)]
struct TextJson {
    index: usize,
    offset: usize,
    text: String,
}

// 16 evenly spaced grays for sheets with no palette.
fn gray_ramp() -> Palette {
    Palette {
        colors: std::array::from_fn(|i| {
            #[allow(clippy::cast_possible_truncation)]
            let v = (i * 17) as u8;
            Color::from_rgb8(v, v, v)
        }),
    }
}

// Bytes for `count` items from the manifest.
fn total(count: usize, size: usize) -> Result<usize, ExtractError> {
    count
        .checked_mul(size)
        .ok_or(ExtractError::TooLarge { count, size })
}

fn png(width: usize, height: usize, rgba: Vec<u8>) -> Result<Vec<u8>, ExtractError> {
    let too_big = ExtractError::ImageSize { width, height };
    let (Ok(w), Ok(h)) = (u32::try_from(width), u32::try_from(height)) else {
        return Err(too_big);
    };
    let img = image::RgbaImage::from_raw(w, h, rgba).ok_or(too_big)?;
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)?;
    Ok(out.into_inner())
}

#[allow(clippy::too_many_arguments)]
fn tiles(
    rom: &Rom,
    offset: usize,
    depth: Depth,
    count: usize,
    columns: usize,
    palette: Option<Location>,
    mode: RenderMode,
    source: &Source,
) -> Result<Vec<u8>, ExtractError> {
    let bytes = source.bytes(rom.bytes(), offset, total(count, depth.tile_size())?)?;
    let mut sheet = snes_chr::decode_sheet(&bytes, depth, count)?;
    let columns = columns.clamp(1, count.max(1));
    let rows = count.div_ceil(columns);
    sheet.resize(columns * rows, Tile::default());
    let img = snes_chr::assemble(&sheet, columns, rows, &[])?;
    let pal = match palette {
        Some(loc) => snes_pal::parse_palette(rom.read(loc.resolve(rom)?, PALETTE_SIZE)?)?,
        None => gray_ramp(),
    };
    png(img.width, img.height, img.to_rgba(&pal, mode))
}

fn palettes(rom: &Rom, offset: usize, count: usize) -> Result<Vec<u8>, ExtractError> {
    let pals = snes_pal::parse_palettes(rom.read(offset, total(count, PALETTE_SIZE)?)?)?;
    let out: Vec<PaletteJson> = pals
        .iter()
        .enumerate()
        .map(|(index, p)| PaletteJson {
            index,
            words: p.colors.iter().map(|c| c.to_word()).collect(),
            rgb: p.colors.iter().map(|c| c.to_rgb8()).collect(),
        })
        .collect();
    Ok(serde_json::to_vec_pretty(&out)?)
}

fn strings(
    rom: &Rom,
    table: &Table,
    ptrs: &PointerTable,
    limit: usize,
) -> Result<Vec<u8>, ExtractError> {
    let payload = Payload::Terminated {
        terminator: table.terminator(),
        limit,
    };
    let mut out = Vec::new();
    for index in 0..ptrs.len() {
        let offset = ptrs.entry(rom.bytes(), index)?;
        let (text, _) = table.decode(ptrs.payload(rom.bytes(), index, payload)?)?;
        out.push(TextJson {
            index,
            offset,
            text,
        });
    }
    Ok(serde_json::to_vec_pretty(&out)?)
}

/// Extract one asset.
///
/// # Errors
/// Whatever the asset's codec returns, plus `NoTable` for text without a
/// table.
pub fn extract_asset(
    rom: &Rom,
    asset: &Asset,
    table: Option<&Table>,
) -> Result<Output, ExtractError> {
    let offset = asset.at.resolve(rom)?;
    debug!(
        "Extracting {} ({}) at {offset:#X}",
        asset.name,
        asset.kind.component()
    );
    let (kind, data) = match &asset.kind {
        AssetKind::Tiles {
            depth,
            count,
            columns,
            palette,
            mode,
            source,
        } => (
            OutputKind::Png,
            tiles(
                rom, offset, *depth, *count, *columns, *palette, *mode, source,
            )?,
        ),
        AssetKind::Palette { count } => (OutputKind::Json, palettes(rom, offset, *count)?),
        AssetKind::Brr {
            max_blocks,
            sample_rate,
        } => {
            let len = brr::scan(rom.bytes(), offset, *max_blocks)?;
            let sample = brr::decode(rom.read(offset, len)?)?;
            (OutputKind::Wav, brr::wav_bytes(&sample.pcm, *sample_rate)?)
        }
        AssetKind::Text {
            count,
            width,
            bank,
            limit,
        } => {
            let table = table.ok_or_else(|| ExtractError::NoTable {
                name: asset.name.clone(),
            })?;
            let bank = match bank {
                Some(b) => *b,
                None => rom.map().flat_to_logical(offset)?.0,
            };
            let ptrs = PointerTable::new(*rom.map(), offset, *width, *count).with_bank(bank);
            (OutputKind::Json, strings(rom, table, &ptrs, *limit)?)
        }
        AssetKind::Raw { len, source } => (OutputKind::Raw, source.bytes(rom.bytes(), offset, *len)?),
        AssetKind::Header => (
            OutputKind::Json,
            serde_json::to_vec_pretty(&HeaderReport::new(rom)?)?,
        ),
    };
    Ok(Output {
        name: asset.name.clone(),
        kind,
        data,
    })
}

/// Extract every asset in `manifest` in parallel. A failing asset is
/// logged and counted; it never stops the batch.
#[must_use]
pub fn extract(rom: &Rom, manifest: &Manifest, table: Option<&Table>) -> Batch {
    let results: Vec<(&Asset, Result<Output, ExtractError>)> = manifest
        .assets
        .par_iter()
        .map(|a| (a, extract_asset(rom, a, table)))
        .collect();

    let mut batch = Batch::default();
    for (asset, result) in results {
        let tally = batch
            .summary
            .components
            .entry(asset.kind.component())
            .or_default();
        match result {
            Ok(out) => {
                tally.ok += 1;
                batch.outputs.push(out);
            }
            Err(e) => {
                warn!("{} failed: {e}", asset.name);
                *tally.errors.entry(e.kind()).or_default() += 1;
                batch.failures.push((asset.name.clone(), e));
            }
        }
    }
    info!(
        "Extracted {} assets, {} failed",
        batch.summary.ok(),
        batch.summary.failed()
    );
    batch
}
