use std::ops::Range;

use log::debug;
use pointer_table::{PointerTable, Relocation};
use snes_chr::{Depth, Image, RenderMode, Tile};
use snes_pal::Palette;
use snes_rom::Rom;
use snes_text::Table;

use crate::ExtractError;

/// Encode `strings` with `table`, place them in `region` and repoint
/// `ptrs` at them. Nothing changes unless every string encodes and fits.
///
/// # Errors
/// Any text encoding error, `CountMismatch` or `NoRoom` from the
/// relocation, or a bounds error writing.
pub fn import_text(
    rom: &mut Rom,
    table: &Table,
    ptrs: &PointerTable,
    region: Range<usize>,
    strings: &[String],
) -> Result<Relocation, ExtractError> {
    let records = strings
        .iter()
        .map(|s| table.encode(s))
        .collect::<Result<Vec<_>, _>>()?;
    let reloc = ptrs.relocate(region, &records)?;
    rom.edit(|m| m.apply(&reloc.writes))?;
    debug!("Imported {} strings, {} bytes", strings.len(), reloc.used);
    Ok(reloc)
}

/// Write tiles uncompressed at `offset`. Returns the bytes written.
///
/// # Errors
/// `IndexOutOfRange` if a pixel doesn't fit `depth`, or a bounds error.
pub fn import_tiles(
    rom: &mut Rom,
    offset: usize,
    tiles: &[Tile],
    depth: Depth,
) -> Result<usize, ExtractError> {
    let bytes = snes_chr::encode_sheet(tiles, depth)?;
    rom.edit(|m| m.write(offset, &bytes))?;
    Ok(bytes.len())
}

/// Write palettes back to back at `offset`.
///
/// # Errors
/// A bounds error.
pub fn import_palettes(
    rom: &mut Rom,
    offset: usize,
    palettes: &[Palette],
) -> Result<usize, ExtractError> {
    let bytes: Vec<u8> = palettes.iter().flat_map(Palette::encode).collect();
    rom.edit(|m| m.write(offset, &bytes))?;
    Ok(bytes.len())
}

/// Quantise a PNG against `palette`, cut it into tiles and write them at
/// `offset`. Returns the bytes written.
///
/// # Errors
/// `Image` if the PNG won't decode, `BadDimensions` unless both sides are
/// multiples of 8, then anything `import_tiles` returns.
pub fn import_png(
    rom: &mut Rom,
    offset: usize,
    png: &[u8],
    palette: &Palette,
    depth: Depth,
    mode: RenderMode,
) -> Result<usize, ExtractError> {
    let rgba = image::load_from_memory(png)?.to_rgba8();
    let (w, h) = rgba.dimensions();
    let (width, height) = (w as usize, h as usize);
    let img = Image::from_rgba(width, height, rgba.as_raw(), palette, mode)?;
    let tiles = img.to_tiles()?;
    debug!("PNG {width}x{height} is {} tiles", tiles.len());
    import_tiles(rom, offset, &tiles, depth)
}
