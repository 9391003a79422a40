//! romtool works on SNES images from the command line: create and apply
//! IPS/UPS/BPS patches, extract assets from a manifest, convert BRR samples to
//! WAV, write text and graphics back and fix checksums.

use std::fs::{read, read_to_string, write};
use std::path::{Path, PathBuf};

use addr_map::Mapping;
use clap::{Args, Parser, Subcommand};
use clap_num::maybe_hex;
use color_eyre::eyre::{eyre, Result};
use extract::{Manifest, Summary};
use log::info;
use patch::PatchKind;
use pointer_table::{PointerTable, Width};
use serde::Deserialize;
use snes_chr::{Depth, RenderMode};
use snes_rom::Rom;
use snes_text::Table;

/// romtool works on SNES images from the command line.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create or apply an IPS, UPS or BPS patch.
    #[command(subcommand)]
    Patch(PatchCommand),

    /// Extract every asset a JSON manifest names.
    Extract(ExtractArgs),

    /// Convert the BRR sample at an offset to WAV.
    Brr(BrrArgs),

    /// Encode strings and relocate them behind a pointer table.
    ImportText(ImportTextArgs),

    /// Quantise a PNG into tiles and write them into the image.
    ImportPng(ImportPngArgs),

    /// Check or fix the header checksum.
    Checksum(ChecksumArgs),
}

#[derive(Subcommand)]
enum PatchCommand {
    /// Build a patch turning --source into --target.
    Create {
        #[arg(long, help = "Original image")]
        source: PathBuf,
        #[arg(long, help = "Modified image")]
        target: PathBuf,
        #[arg(long, help = "Patch file to write")]
        output: PathBuf,
        #[arg(long, default_value_t = PatchKind::Ips, help = "ips, ups or bps")]
        format: PatchKind,
    },

    /// Apply a patch, detecting its format.
    Apply {
        #[arg(long, help = "Original image")]
        source: PathBuf,
        #[arg(long, help = "IPS, UPS or BPS patch")]
        patch: PathBuf,
        #[arg(long, help = "Patched image to write")]
        output: PathBuf,
    },
}

#[derive(Args)]
struct RomArgs {
    #[arg(long, help = "SNES image")]
    rom: PathBuf,

    #[arg(long, help = "Force LoROM or HiROM instead of detecting the mapping")]
    mapping: Option<Mapping>,
}

impl RomArgs {
    fn open(&self) -> Result<Rom> {
        let bytes = read(&self.rom)?;
        Ok(match self.mapping {
            Some(m) => Rom::with_mapping(bytes, m)?,
            None => Rom::new(bytes)?,
        })
    }
}

#[derive(Args)]
struct ExtractArgs {
    #[arg(long, help = "SNES image")]
    rom: PathBuf,

    #[arg(long, help = "JSON extraction manifest")]
    manifest: PathBuf,

    #[arg(long, help = "Directory for the outputs and summary.json")]
    out: PathBuf,
}

#[derive(Args)]
struct BrrArgs {
    #[arg(long, help = "Image or raw BRR data")]
    input: PathBuf,

    #[arg(long, default_value_t = 0, value_parser=maybe_hex::<usize>, help = "Where the sample starts")]
    offset: usize,

    #[arg(long, help = "WAV file to write")]
    output: PathBuf,

    #[arg(long, default_value_t = brr::DEFAULT_SAMPLE_RATE, help = "WAV sample rate")]
    rate: u32,

    #[arg(long, default_value_t = 0x1000, value_parser=maybe_hex::<usize>, help = "Most blocks to scan for the end flag")]
    max_blocks: usize,
}

#[derive(Args)]
struct ImportTextArgs {
    #[command(flatten)]
    rom: RomArgs,

    #[arg(long, help = "Character table file")]
    table: PathBuf,

    #[arg(long, default_value_t = 0, value_parser=maybe_hex::<u8>, help = "String terminator byte")]
    terminator: u8,

    #[arg(long, value_parser=maybe_hex::<u8>, help = "First DTE byte")]
    dte_start: Option<u8>,

    #[arg(long, value_parser=maybe_hex::<u8>, help = "Last DTE byte")]
    dte_end: Option<u8>,

    #[arg(long, help = "JSON list of {\"text\": ...} objects, as extract writes them")]
    strings: PathBuf,

    #[arg(long, value_parser=maybe_hex::<usize>, help = "Flat offset of the pointer table")]
    pointers: usize,

    #[arg(long, default_value_t = 2, help = "Pointer width in bytes, 2 or 3")]
    width: u8,

    #[arg(long, value_parser=maybe_hex::<u8>, help = "Bank for 2 byte pointers (default: the table's bank)")]
    bank: Option<u8>,

    #[arg(long, value_parser=maybe_hex::<usize>, help = "Start of the free region")]
    region_start: usize,

    #[arg(long, value_parser=maybe_hex::<usize>, help = "End of the free region (exclusive)")]
    region_end: usize,

    #[arg(long, help = "Image to write")]
    output: PathBuf,
}

#[derive(Args)]
struct ImportPngArgs {
    #[command(flatten)]
    rom: RomArgs,

    #[arg(long, help = "PNG with sides that are multiples of 8")]
    png: PathBuf,

    #[arg(long, value_parser=maybe_hex::<usize>, help = "Where the tiles go")]
    offset: usize,

    #[arg(long, value_parser=maybe_hex::<usize>, help = "Palette to quantise against")]
    palette: usize,

    #[arg(long, default_value_t = Depth::Bpp4, help = "bpp2, bpp4 or bpp8")]
    depth: Depth,

    #[arg(long, default_value_t = RenderMode::Sprite, help = "sprite or background")]
    mode: RenderMode,

    #[arg(long, help = "Image to write")]
    output: PathBuf,
}

#[derive(Args)]
struct ChecksumArgs {
    #[command(flatten)]
    rom: RomArgs,

    #[arg(long, help = "Write a copy with the checksum fixed")]
    fix: Option<PathBuf>,
}

#[derive(Deserialize)]
struct Line {
    text: String,
}

fn patch_cmd(cmd: PatchCommand) -> Result<()> {
    match cmd {
        PatchCommand::Create {
            source,
            target,
            output,
            format,
        } => {
            let p = format.format().create(&read(source)?, &read(target)?)?;
            write(&output, &p)?;
            println!("Wrote {} byte {format} patch to {}", p.len(), output.display());
        }
        PatchCommand::Apply {
            source,
            patch: patch_file,
            output,
        } => {
            let p = read(patch_file)?;
            let kind = PatchKind::detect(&p).ok_or(patch::PatchError::UnknownFormat)?;
            let out = patch::apply(&read(source)?, &p)?;
            write(&output, &out)?;
            println!("Applied {kind} patch, wrote {} bytes to {}", out.len(), output.display());
        }
    }
    Ok(())
}

fn print_summary(summary: &Summary) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

fn extract_cmd(args: &ExtractArgs) -> Result<()> {
    let manifest = Manifest::load(&args.manifest)?;
    let base = args.manifest.parent().unwrap_or(Path::new("."));
    let table = manifest.table(base)?;
    let rom = extract::open_rom(read(&args.rom)?, &manifest)?;
    let batch = extract::extract(&rom, &manifest, table.as_ref());
    batch.write(&args.out)?;
    for (name, e) in &batch.failures {
        eprintln!("{name}: {e}");
    }
    print_summary(&batch.summary)
}

fn brr_cmd(args: &BrrArgs) -> Result<()> {
    let data = read(&args.input)?;
    let len = brr::scan(&data, args.offset, args.max_blocks)?;
    let stream = data
        .get(args.offset..args.offset + len)
        .ok_or_else(|| eyre!("sample at {:#X} runs past the end", args.offset))?;
    let sample = brr::decode(stream)?;
    brr::save_wav(&args.output, &sample.pcm, args.rate)?;
    match sample.loop_point {
        Some(p) => println!(
            "{} blocks, {} samples, loops at {p}",
            sample.blocks,
            sample.pcm.len()
        ),
        None => println!("{} blocks, {} samples", sample.blocks, sample.pcm.len()),
    }
    Ok(())
}

fn import_text_cmd(args: &ImportTextArgs) -> Result<()> {
    let mut rom = args.rom.open()?;
    let mut table = Table::new(args.terminator);
    if let (Some(lo), Some(hi)) = (args.dte_start, args.dte_end) {
        table = table.with_dte_range(lo..=hi);
    }
    let table = snes_text::parse_table(&read_to_string(&args.table)?, table)?;
    let lines: Vec<Line> = serde_json::from_str(&read_to_string(&args.strings)?)?;
    let strings: Vec<String> = lines.into_iter().map(|l| l.text).collect();

    let bank = match args.bank {
        Some(b) => b,
        None => rom.map().flat_to_logical(args.pointers)?.0,
    };
    let ptrs = PointerTable::new(
        *rom.map(),
        args.pointers,
        Width::try_from(args.width)?,
        strings.len(),
    )
    .with_bank(bank);
    let reloc = extract::import_text(
        &mut rom,
        &table,
        &ptrs,
        args.region_start..args.region_end,
        &strings,
    )?;
    write(&args.output, rom.bytes())?;
    println!(
        "Placed {} strings in {} of {} bytes",
        strings.len(),
        reloc.used,
        args.region_end.saturating_sub(args.region_start)
    );
    Ok(())
}

fn import_png_cmd(args: &ImportPngArgs) -> Result<()> {
    let mut rom = args.rom.open()?;
    let palette = snes_pal::parse_palette(rom.read(args.palette, snes_pal::PALETTE_SIZE)?)?;
    let n = extract::import_png(
        &mut rom,
        args.offset,
        &read(&args.png)?,
        &palette,
        args.depth,
        args.mode,
    )?;
    write(&args.output, rom.bytes())?;
    println!("Wrote {n} bytes of tiles at {:#X}", args.offset);
    Ok(())
}

fn checksum_cmd(args: &ChecksumArgs) -> Result<()> {
    let mut rom = args.rom.open()?;
    let hdr = rom.header()?;
    println!(
        "{} stored {:04X}/{:04X} computed {:04X}: {}",
        rom.mapping(),
        hdr.checksum,
        hdr.complement,
        rom.computed_checksum(),
        if rom.checksum_ok()? { "OK" } else { "BAD" }
    );
    if let Some(out) = &args.fix {
        let c = rom.recompute_checksum();
        write(out, rom.bytes())?;
        info!("Checksum set to {c:04X}");
        println!("Wrote {}", out.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init(); // Log to stderr (if you run with `RUST_LOG=debug`).
    color_eyre::install()?;
    let cli = Cli::parse();

    match cli.command {
        Command::Patch(cmd) => patch_cmd(cmd),
        Command::Extract(args) => extract_cmd(&args),
        Command::Brr(args) => brr_cmd(&args),
        Command::ImportText(args) => import_text_cmd(&args),
        Command::ImportPng(args) => import_png_cmd(&args),
        Command::Checksum(args) => checksum_cmd(&args),
    }
}
