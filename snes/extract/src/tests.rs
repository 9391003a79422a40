use std::fs;
use std::io::Cursor;

use addr_map::Mapping;
use color_eyre::eyre::Result;
use ntest::timeout;
use pointer_table::{PointerTable, Width};
use snes_chr::{Depth, RenderMode, Tile};
use snes_pal::Palette;
use snes_rom::{Rom, RomError, RomHeader, Vectors};
use snes_text::Table;

use crate::{
    extract, extract_asset, import_palettes, import_png, import_text, import_tiles, open_rom,
    Asset, AssetKind, Compression, ExtractError, Location, Manifest, OutputKind, Source,
    Transform,
};

const TILES: usize = 0x1000;
const PALETTE: usize = 0x2000;
const SAMPLE: usize = 0x3000;
const POINTERS: usize = 0x4000;
const LZ: usize = 0x7000;

const TABLE: &str = "00=[END]\n41=A\n42=B\n";

const MANIFEST: &str = r#"{
  "mapping": "lorom",
  "text": { "table": "script.tbl", "terminator": 0 },
  "assets": [
    { "name": "sheet", "kind": "tiles", "at": 4096, "count": 2, "columns": 2, "palette": 8192 },
    { "name": "pal", "kind": "palette", "at": 8192 },
    { "name": "sfx", "kind": "brr", "at": 12288 },
    { "name": "script", "kind": "text", "at": 16384, "count": 2 },
    { "name": "blob", "kind": "raw", "at": { "bank": 0, "addr": 36864 }, "len": 16 },
    { "name": "packed", "kind": "raw", "at": 28672, "len": 6, "source": { "compression": "lz" } },
    { "name": "info", "kind": "header" },
    { "name": "noise", "kind": "brr", "at": 20480, "max_blocks": 4 },
    { "name": "huge", "kind": "tiles", "at": 65000, "count": 100 }
  ]
}"#;

fn solid(index: u8) -> Tile {
    Tile { data: [index; 64] }
}

fn table() -> Result<Table> {
    Ok(snes_text::parse_table(TABLE, Table::new(0))?)
}

fn palette() -> Result<Palette> {
    let mut bytes = [0u8; 32];
    bytes[2..6].copy_from_slice(&[0x1F, 0x00, 0xE0, 0x03]);
    Ok(snes_pal::parse_palette(&bytes)?)
}

// 64KB LoROM with one of everything the manifest asks for.
fn rom() -> Result<Rom> {
    let mut rom = Rom::with_mapping(vec![0; 0x10000], Mapping::LoRom)?;
    let hdr = RomHeader {
        title: "EXTRACT TEST".into(),
        map_mode: 0x20,
        rom_size: 6,
        country: 1,
        developer: 1,
        ..RomHeader::default()
    };
    let sheet = snes_chr::encode_sheet(&[solid(1), solid(2)], Depth::Bpp4)?;
    let pal = palette()?.encode();
    rom.edit(|m| {
        m.write_header(&hdr)?;
        m.write_vectors(&Vectors::new(0x8000))?;
        m.write(TILES, &sheet)?;
        m.write(PALETTE, &pal)?;
        m.write(SAMPLE, &[0x01, 0, 0, 0, 0, 0, 0, 0, 0])?;
        m.write(POINTERS, &[0x00, 0xC1, 0x10, 0xC1])?;
        m.write(0x4100, &[0x41, 0x42, 0x00])?;
        m.write(0x4110, &[0x42, 0x41, 0x00])?;
        m.write(LZ, &[0x06, 0x00, 0x10, 0xAA, 0xBB, 0xCC, 0x00, 0x03])?;
        Ok::<_, RomError>(())
    })?;
    Ok(rom)
}

fn json(data: &[u8]) -> Result<serde_json::Value> {
    Ok(serde_json::from_slice(data)?)
}

#[test]
fn manifest_defaults() -> Result<()> {
    let m = Manifest::from_json(MANIFEST)?;
    assert_eq!(m.mapping, Some(Mapping::LoRom), "forced mapping");
    assert_eq!(m.assets.len(), 9, "assets");
    assert_eq!(
        m.assets[0].kind,
        AssetKind::Tiles {
            depth: Depth::Bpp4,
            count: 2,
            columns: 2,
            palette: Some(Location::Flat(PALETTE)),
            mode: RenderMode::Sprite,
            source: Source::default(),
        },
        "tiles"
    );
    assert_eq!(
        m.assets[2].kind,
        AssetKind::Brr {
            max_blocks: 0x1000,
            sample_rate: 32000
        },
        "brr defaults"
    );
    assert_eq!(
        m.assets[4].at,
        Location::Logical {
            bank: 0,
            addr: 0x9000
        },
        "logical location"
    );
    assert_eq!(m.assets[6].at, Location::Flat(0), "header needs no location");
    assert_eq!(m.assets[6].kind.component(), "header", "component name");

    let Err(e) = Manifest::from_json(r#"{"assets": [{"name": "x", "kind": "sprites"}]}"#) else {
        panic!("unknown kind parsed");
    };
    assert_eq!(e.kind(), "Json", "bad kind");
    Ok(())
}

#[test]
fn batch() -> Result<()> {
    let m = Manifest::from_json(MANIFEST)?;
    let rom = rom()?;
    let t = table()?;
    let b = extract(&rom, &m, Some(&t));

    let names: Vec<&str> = b.outputs.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["sheet", "pal", "sfx", "script", "blob", "packed", "info"],
        "outputs keep manifest order"
    );
    assert_eq!(b.summary.ok(), 7, "ok");
    assert_eq!(b.summary.failed(), 2, "failed");
    let tiles = &b.summary.components["tiles"];
    assert_eq!(tiles.ok, 1, "tiles ok");
    assert_eq!(tiles.errors.get("ShortData"), Some(&1), "tiles error");
    let brr = &b.summary.components["brr"];
    assert_eq!(brr.errors.get("TooManyBlocks"), Some(&1), "brr error");
    assert_eq!(b.summary.components["raw"].ok, 2, "raw ok");
    let failed: Vec<&str> = b.failures.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(failed, vec!["noise", "huge"], "failures");
    Ok(())
}

#[test]
fn outputs() -> Result<()> {
    let m = Manifest::from_json(MANIFEST)?;
    let rom = rom()?;
    let t = table()?;
    let get = |i: usize| extract_asset(&rom, &m.assets[i], Some(&t));

    let sheet = get(0)?;
    assert_eq!(sheet.kind, OutputKind::Png, "png");
    assert_eq!(sheet.file_name(), "sheet.png", "file name");
    let img = image::load_from_memory(&sheet.data)?.to_rgba8();
    assert_eq!(img.dimensions(), (16, 8), "two tiles side by side");
    assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0, 255], "tile 0 is red");
    assert_eq!(img.get_pixel(8, 7).0, [0, 255, 0, 255], "tile 1 is green");

    let pal = json(&get(1)?.data)?;
    assert_eq!(pal[0]["words"][1], 0x1F, "red word");
    assert_eq!(pal[0]["rgb"][2], serde_json::json!([0, 255, 0]), "green rgb");

    let wav = get(2)?;
    assert_eq!(wav.file_name(), "sfx.wav", "wav name");
    assert!(wav.data.starts_with(b"RIFF"), "riff");
    assert_eq!(&wav.data[8..12], b"WAVE", "wave");

    let script = json(&get(3)?.data)?;
    assert_eq!(
        script,
        serde_json::json!([
            { "index": 0, "offset": 0x4100, "text": "AB" },
            { "index": 1, "offset": 0x4110, "text": "BA" },
        ]),
        "strings"
    );

    let blob = get(4)?;
    assert_eq!(blob.file_name(), "blob.bin", "raw name");
    assert_eq!(blob.data, rom.bytes()[TILES..TILES + 16], "logical raw");

    assert_eq!(
        get(5)?.data,
        vec![0xAA, 0xBB, 0xCC, 0xAA, 0xBB, 0xCC],
        "lz raw"
    );

    let info = json(&get(6)?.data)?;
    assert_eq!(info["header"]["title"], "EXTRACT TEST", "title");
    assert_eq!(info["checksum_ok"], true, "checksum");
    assert_eq!(info["mapping"], "lorom", "mapping");
    assert_eq!(info["vectors"]["reset"], 0x8000, "reset");
    Ok(())
}

#[test]
fn text_needs_table() -> Result<()> {
    let m = Manifest::from_json(MANIFEST)?;
    let rom = rom()?;
    let b = extract(&rom, &m, None);
    assert_eq!(
        b.summary.components["text"].errors.get("NoTable"),
        Some(&1),
        "no table"
    );
    Ok(())
}

#[test]
fn sources() -> Result<()> {
    let data = [0x21u8; 0x30];
    let nibbles = Source {
        transform: Transform::Nibbles,
        ..Source::default()
    };
    assert_eq!(nibbles.bytes(&data, 0, 3)?, vec![1, 2, 1], "nibbles");

    let half = Source {
        transform: Transform::SecondHalf,
        ..Source::default()
    };
    let out = half.bytes(&data, 0, 0x20)?;
    assert_eq!(out.len(), 0x20, "widened");
    assert_eq!(&out[0x10..0x14], &[0x21, 0, 0x21, 0], "zero planes");

    let short = Source::default().bytes(&data, 0x28, 0x10);
    assert!(
        matches!(short, Err(ExtractError::ShortData { have: 8, want: 0x10 })),
        "short {short:?}"
    );
    let past = Source::default().bytes(&data, 0x100, 1);
    assert!(matches!(past, Err(ExtractError::ShortData { .. })), "past end");

    let tail = Source {
        compression: Compression::TailWindow,
        ..Source::default()
    };
    // One command copying two literals, then the end.
    let stream = [0x02, 0x00, 0x02, 0x00, 0x11, 0x22];
    assert_eq!(tail.bytes(&stream, 0, 2)?, vec![0x11, 0x22], "tail window");
    Ok(())
}

#[test]
fn write_batch() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("script.tbl"), TABLE)?;
    let m = Manifest::from_json(MANIFEST)?;
    let t = m.table(dir.path())?;
    assert!(t.is_some(), "table loaded");

    let rom = open_rom(rom()?.into_bytes(), &m)?;
    let b = extract(&rom, &m, t.as_ref());
    let out = dir.path().join("out");
    b.write(&out)?;
    for f in ["sheet.png", "pal.json", "sfx.wav", "script.json", "blob.bin", "info.json"] {
        assert!(out.join(f).exists(), "{f} written");
    }
    assert!(!out.join("huge.png").exists(), "failed asset skipped");
    let summary = json(&fs::read(out.join("summary.json"))?)?;
    assert_eq!(summary["tiles"]["ok"], 1, "summary ok");
    assert_eq!(summary["brr"]["errors"]["TooManyBlocks"], 1, "summary error");
    Ok(())
}

#[test]
fn import_strings() -> Result<()> {
    let mut rom = rom()?;
    let t = table()?;
    let ptrs = PointerTable::new(*rom.map(), POINTERS, Width::Near, 2);
    let strings = vec!["BA".to_string(), "ABAB".to_string()];

    let before = rom.bytes().to_vec();
    let res = import_text(&mut rom, &t, &ptrs, 0x6000..0x6004, &strings);
    assert_eq!(res.map(|_| ()).map_err(|e| e.kind()), Err("NoRoom"), "too small");
    assert_eq!(rom.bytes(), &before[..], "nothing written");
    let res = import_text(&mut rom, &t, &ptrs, 0x6000..0x6100, &["C".to_string(), "C".to_string()]);
    assert_eq!(res.map(|_| ()).map_err(|e| e.kind()), Err("Unencodable"), "unknown glyph");

    let reloc = import_text(&mut rom, &t, &ptrs, 0x6000..0x6100, &strings)?;
    assert_eq!(reloc.offsets, vec![0x6000, 0x6003], "packed");
    assert_eq!(reloc.used, 8, "bytes used");
    assert!(rom.checksum_ok()?, "checksum follows the edit");

    let m = Manifest::from_json(MANIFEST)?;
    let script = json(&extract_asset(&rom, &m.assets[3], Some(&t))?.data)?;
    assert_eq!(script[0]["text"], "BA", "first");
    assert_eq!(script[1]["text"], "ABAB", "second");
    assert_eq!(script[1]["offset"], 0x6003, "repointed");
    Ok(())
}

#[test]
fn import_graphics() -> Result<()> {
    let mut rom = rom()?;
    let tiles = [solid(3), solid(15)];
    assert_eq!(import_tiles(&mut rom, 0x5000, &tiles, Depth::Bpp4)?, 64, "two tiles");
    let back = snes_chr::decode_sheet(rom.read(0x5000, 64)?, Depth::Bpp4, 2)?;
    assert_eq!(back, tiles.to_vec(), "tiles written");

    let res = import_tiles(&mut rom, 0x5000, &[solid(4)], Depth::Bpp2);
    assert_eq!(res.map_err(|e| e.kind()), Err("IndexOutOfRange"), "depth check");

    let pal = palette()?;
    assert_eq!(import_palettes(&mut rom, 0x5800, &[pal, pal])?, 64, "two palettes");
    assert_eq!(snes_pal::parse_palettes(rom.read(0x5800, 64)?)?, vec![pal, pal], "palettes");

    let img = image::RgbaImage::from_pixel(8, 8, image::Rgba([0, 250, 0, 255]));
    let mut png = Cursor::new(Vec::new());
    img.write_to(&mut png, image::ImageFormat::Png)?;
    let n = import_png(
        &mut rom,
        0x5100,
        png.get_ref(),
        &pal,
        Depth::Bpp4,
        RenderMode::Sprite,
    )?;
    assert_eq!(n, 32, "one tile");
    assert_eq!(
        snes_chr::decode(rom.read(0x5100, 32)?, Depth::Bpp4)?,
        solid(2),
        "quantised to green"
    );
    assert!(rom.checksum_ok()?, "checksum");

    let res = import_png(&mut rom, 0x5100, b"not a png", &pal, Depth::Bpp4, RenderMode::Sprite);
    assert_eq!(res.map_err(|e| e.kind()), Err("Image"), "bad png");
    Ok(())
}

#[test]
#[timeout(5000)]
fn overflowing_counts() -> Result<()> {
    let m = Manifest::from_json(
        r#"{"assets": [
            { "name": "pal", "kind": "palette", "at": 8192 },
            { "name": "pals", "kind": "palette", "at": 8192, "count": 18446744073709551615 },
            { "name": "sheet", "kind": "tiles", "at": 4096, "count": 18446744073709551615 },
            { "name": "script", "kind": "text", "at": 16384, "count": 18446744073709551615 }
        ]}"#,
    )?;
    let rom = rom()?;
    let t = table()?;
    let b = extract(&rom, &m, Some(&t));

    assert_eq!(b.summary.ok(), 1, "the small palette still extracts");
    let pal = &b.summary.components["palette"];
    assert_eq!(pal.ok, 1, "palette ok");
    assert_eq!(pal.errors.get("TooLarge"), Some(&1), "palette count");
    let tiles = &b.summary.components["tiles"];
    assert_eq!(tiles.errors.get("TooLarge"), Some(&1), "tile count");
    let failed: Vec<&str> = b.failures.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(failed, vec!["pals", "sheet", "script"], "failures");
    Ok(())
}

#[test]
#[timeout(5000)]
fn hostile_manifest() -> Result<()> {
    let rom = rom()?;
    let assets = [
        AssetKind::Raw {
            len: usize::MAX / 2,
            source: Source {
                compression: Compression::Lz,
                ..Source::default()
            },
        },
        AssetKind::Palette { count: 1 << 40 },
        AssetKind::Tiles {
            depth: Depth::Bpp8,
            count: 0,
            columns: 0,
            palette: None,
            mode: RenderMode::Background,
            source: Source::default(),
        },
    ];
    for kind in assets {
        let a = Asset {
            name: "bad".into(),
            at: Location::Flat(0),
            kind,
        };
        assert!(extract_asset(&rom, &a, None).is_err(), "{a:?} fails");
    }
    let unmapped = Asset {
        name: "bad".into(),
        at: Location::Logical { bank: 0, addr: 0 },
        kind: AssetKind::Header,
    };
    let e = extract_asset(&rom, &unmapped, None).map(|_| ());
    assert_eq!(e.map_err(|e| e.kind()), Err("Unmapped"), "unmapped");
    Ok(())
}
