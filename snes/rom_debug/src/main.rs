//! `rom_debug` takes the path to a SNES image, finds and parses its header
//! and prints the header, vectors and checksum state.
use std::fs::read;

use addr_map::Mapping;
use clap::Parser;
use color_eyre::eyre::Result;
use extract::HeaderReport;
use snes_rom::Rom;

/// `rom_debug` will load the given image and dump its cartridge header.
#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    #[arg(help = "Filename containing a SNES image", long)]
    filename: String,

    #[arg(
        long,
        help = "Force LoROM or HiROM instead of detecting the mapping"
    )]
    mapping: Option<Mapping>,

    #[arg(long, default_value_t = false, help = "Print JSON instead of text")]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::init(); // Log to stderr (if you run with `RUST_LOG=debug`).
    color_eyre::install()?;
    let args: Args = Args::parse();

    let bytes: Vec<u8> = read(&args.filename)?;
    let rom = match args.mapping {
        Some(m) => Rom::with_mapping(bytes, m)?,
        None => Rom::new(bytes)?,
    };
    let report = HeaderReport::new(&rom)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("SNES header for {}\n{report}", args.filename);
    }
    Ok(())
}
