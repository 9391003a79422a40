use color_eyre::eyre::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::str::FromStr;

use crate::{
    apply, diff, diff_coalesced, Bps, BpsAction, BpsPatch, Hunk, Ips, IpsPatch, IpsRecord,
    PatchError, PatchFormat, PatchKind, Ups, UpsPatch,
};

// Append the source, target and self CRCs to a hand built body. UPS
// checksums the body alone, BPS the body and the first two CRCs.
fn with_trailer(mut body: Vec<u8>, source: &[u8], target: &[u8], bps: bool) -> Vec<u8> {
    let body_len = body.len();
    body.extend(crc32fast::hash(source).to_le_bytes());
    body.extend(crc32fast::hash(target).to_le_bytes());
    let covered = if bps { body.len() } else { body_len };
    let crc = crc32fast::hash(&body[..covered]);
    body.extend(crc.to_le_bytes());
    body
}

#[test]
fn ips_scenario() -> Result<()> {
    let src = [0u8; 5];
    let tgt = [0u8, 1, 1, 1, 0];
    let p = Ips.create(&src, &tgt)?;
    assert_eq!(p, b"PATCH\x00\x00\x01\x00\x03\x01\x01\x01EOF", "patch bytes");
    assert_eq!(Ips.apply(&src, &p)?, tgt, "applied");
    Ok(())
}

#[test]
fn ips_rle() -> Result<()> {
    let src = [0u8; 32];
    let mut tgt = src;
    tgt[4..24].fill(0x55);
    let p = Ips.create(&src, &tgt)?;
    let parsed = IpsPatch::parse(&p)?;
    assert_eq!(
        parsed.records,
        vec![IpsRecord::Rle {
            offset: 4,
            len: 20,
            value: 0x55
        }],
        "one run"
    );
    assert_eq!(Ips.apply(&src, &p)?, tgt, "applied");

    // A short run stays literal.
    let mut tgt = src;
    tgt[4..8].fill(0x55);
    let parsed = IpsPatch::parse(&Ips.create(&src, &tgt)?)?;
    assert_eq!(
        parsed.records,
        vec![IpsRecord::Data {
            offset: 4,
            data: vec![0x55; 4]
        }],
        "literal"
    );
    Ok(())
}

#[test]
fn ips_merge_gap() -> Result<()> {
    let src = [0u8; 40];
    let mut tgt = src;
    tgt[2] = 1;
    tgt[6] = 2;
    tgt[20] = 3;
    let parsed = IpsPatch::parse(&Ips.create(&src, &tgt)?)?;
    assert_eq!(
        parsed.records,
        vec![
            IpsRecord::Data {
                offset: 2,
                data: vec![1, 0, 0, 0, 2]
            },
            IpsRecord::Data {
                offset: 20,
                data: vec![3]
            },
        ],
        "close runs merged"
    );
    Ok(())
}

#[test]
fn ips_truncate_and_grow() -> Result<()> {
    let src: Vec<u8> = (0..10).collect();
    let p = Ips.create(&src, &src[..6])?;
    assert_eq!(p, b"PATCHEOF\x00\x00\x06", "truncation only");
    assert_eq!(Ips.apply(&src, &p)?, &src[..6], "truncated");

    let mut tgt = src.clone();
    tgt.extend([0, 0, 7]);
    let p = Ips.create(&src, &tgt)?;
    assert_eq!(Ips.apply(&src, &p)?, tgt, "grown");
    Ok(())
}

#[test]
fn ips_eof_offset() -> Result<()> {
    let src = vec![0u8; 0x45_4F50];
    let mut tgt = src.clone();
    tgt[0x45_4F46] = 1;
    let p = Ips.create(&src, &tgt)?;
    let parsed = IpsPatch::parse(&p)?;
    assert_eq!(
        parsed.records,
        vec![IpsRecord::Data {
            offset: 0x45_4F45,
            data: vec![0, 1]
        }],
        "moved back a byte"
    );
    assert_eq!(Ips.apply(&src, &p)?, tgt, "applied");
    Ok(())
}

#[test]
fn ips_later_records_win() -> Result<()> {
    let mut p = b"PATCH".to_vec();
    p.extend([0x00, 0x00, 0x01, 0x00, 0x03, 0xAA, 0xAA, 0xAA]);
    p.extend([0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x04, 0xBB]);
    p.extend(b"EOF");
    assert_eq!(Ips.apply(&[0u8; 4], &p)?, vec![0, 0xAA, 0xBB, 0xBB, 0xBB, 0xBB], "overlap");
    Ok(())
}

#[test]
fn ips_errors() -> Result<()> {
    assert_eq!(
        Ips.apply(&[], b"PATCX"),
        Err(PatchError::BadMagic { expected: "PATCH" }),
        "magic"
    );
    assert_eq!(
        Ips.apply(&[], b"PATCH\x00\x00\x01\x00\x03\x01"),
        Err(PatchError::TruncatedRecord { offset: 5 }),
        "cut record"
    );
    assert_eq!(
        Ips.apply(&[], b"PATCH"),
        Err(PatchError::TruncatedRecord { offset: 5 }),
        "no footer"
    );
    assert_eq!(
        Ips.apply(&[], b"PATCHEOF\x00"),
        Err(PatchError::TruncatedRecord { offset: 8 }),
        "junk after footer"
    );
    let p = b"PATCH\x00\x01\x00\x00\x10AAAAAAAAAAAAAAAAEOF";
    assert_eq!(
        Ips.apply_with_limit(&[], p, 0x80),
        Err(PatchError::OutputLimitExceeded { limit: 0x80 }),
        "limit"
    );
    Ok(())
}

#[test]
fn ips_offset_too_large() {
    let src = vec![0u8; 0x100_0001];
    let mut tgt = src.clone();
    tgt[0x100_0000] = 1;
    assert_eq!(
        Ips.create(&src, &tgt),
        Err(PatchError::OffsetTooLarge { offset: 0x100_0000 }),
        "24 bit limit"
    );
}

#[test]
fn ups_scenario() -> Result<()> {
    let src = [0xAA, 0xBB];
    let tgt = [0xAA, 0xCC];
    let p = Ups.create(&src, &tgt)?;
    assert_eq!(&p[..9], b"UPS1\x82\x82\x81\x77\x00", "body");
    assert_eq!(p.len(), 21, "body plus trailer");
    let hdr = UpsPatch::parse(&p)?;
    assert_eq!(hdr.source_crc, crc32fast::hash(&src), "source crc");
    assert_eq!(hdr.target_crc, crc32fast::hash(&tgt), "target crc");
    assert_eq!(hdr.patch_crc, crc32fast::hash(&p[..9]), "self crc");
    assert_eq!(Ups.apply(&src, &p)?, tgt, "applied");

    let res = Ups.apply(&[0xAA, 0xBD], &p);
    assert!(matches!(res, Err(PatchError::SourceCrcMismatch { .. })), "wrong source {res:?}");
    assert_eq!(
        Ups.apply(&[0xAA], &p),
        Err(PatchError::SourceSizeMismatch {
            expected: 2,
            actual: 1
        }),
        "wrong size"
    );
    Ok(())
}

#[test]
fn ups_vlv_and_sizes() -> Result<()> {
    let src = vec![0u8; 300];
    let mut tgt = src.clone();
    tgt[200] = 9;
    let p = Ups.create(&src, &tgt)?;
    assert_eq!(&p[4..12], &[0x2C, 0x82, 0x2C, 0x82, 0x48, 0x81, 0x09, 0x00], "multi byte values");

    let short: Vec<u8> = (1..=10).collect();
    let p = Ups.create(&short, &short[..4])?;
    assert_eq!(Ups.apply(&short, &p)?, &short[..4], "shrunk");
    let p = Ups.create(&short[..4], &short)?;
    assert_eq!(Ups.apply(&short[..4], &p)?, short, "grown");
    Ok(())
}

#[test]
fn ups_corruption() -> Result<()> {
    let src = [1u8, 2, 3, 4];
    let tgt = [1u8, 2, 9, 4];
    let p = Ups.create(&src, &tgt)?;

    let mut bad = p.clone();
    bad[7] ^= 0x01;
    assert!(
        matches!(Ups.apply(&src, &bad), Err(PatchError::PatchCrcMismatch { .. })),
        "body changed"
    );

    let mut bad = p.clone();
    let at = bad.len() - 8;
    bad[at] ^= 0xFF;
    assert!(
        matches!(Ups.apply(&src, &bad), Err(PatchError::TargetCrcMismatch { .. })),
        "target crc changed"
    );

    assert_eq!(
        Ups.apply(&src, b"UPS0"),
        Err(PatchError::BadMagic { expected: "UPS1" }),
        "magic"
    );
    assert_eq!(
        Ups.apply(&src, b"UPS1\x84"),
        Err(PatchError::TruncatedRecord { offset: 4 }),
        "no trailer"
    );
    Ok(())
}

#[test]
fn ups_runs_stay_in_bounds() {
    // Two runs that each skip 2^63-1 bytes: the second would wrap the
    // cursor. The CRCs are valid so only the bounds check can stop it.
    let mut skip = vec![0x7Fu8; 8];
    skip.push(0xFF);
    let mut body = b"UPS1\x82\x82".to_vec();
    for _ in 0..2 {
        body.extend(&skip);
        body.push(0);
    }
    let p = with_trailer(body, &[0, 0], &[0, 0], false);
    assert_eq!(
        Ups.apply(&[0, 0], &p),
        Err(PatchError::RunOutOfBounds {
            offset: (1 << 63) - 1,
            len: 2
        }),
        "huge skip"
    );

    // A short skip past the end is caught before any byte is read.
    let p = with_trailer(b"UPS1\x82\x82\x85\x00".to_vec(), &[0, 0], &[0, 0], false);
    assert_eq!(
        Ups.apply(&[0, 0], &p),
        Err(PatchError::RunOutOfBounds { offset: 5, len: 2 }),
        "skip past end"
    );

    // Ending a run exactly at the end is what the generator produces.
    let p = with_trailer(b"UPS1\x82\x82\x81\x01\x00".to_vec(), &[0, 0], &[0, 1], false);
    assert_eq!(Ups.apply(&[0, 0], &p), Ok(vec![0, 1]), "last byte");
}

#[test]
fn bps_scenario() -> Result<()> {
    let src = [1u8, 2, 3, 4];
    let tgt = [1u8, 2, 9, 4, 7];
    let p = Bps.create(&src, &tgt)?;
    let parsed = BpsPatch::parse(&p)?;
    assert_eq!(
        parsed.actions,
        vec![
            BpsAction::SourceRead { len: 2 },
            BpsAction::TargetRead { data: vec![9] },
            BpsAction::SourceRead { len: 1 },
            BpsAction::TargetRead { data: vec![7] },
        ],
        "actions"
    );
    assert_eq!(&p[..7], b"BPS1\x84\x85\x80", "header");
    assert_eq!((parsed.source_size, parsed.target_size), (4, 5), "sizes");
    assert!(parsed.metadata.is_empty(), "no metadata");
    assert_eq!(parsed.source_crc, crc32fast::hash(&src), "source crc");
    assert_eq!(parsed.target_crc, crc32fast::hash(&tgt), "target crc");
    assert_eq!(parsed.patch_crc, crc32fast::hash(&p[..p.len() - 4]), "self crc");
    assert_eq!(Bps.apply(&src, &p)?, tgt, "applied");
    Ok(())
}

#[test]
fn bps_repeats_use_target_copy() -> Result<()> {
    let src = [0u8; 4];
    let mut tgt = vec![0u8, 0];
    tgt.extend([0x55; 20]);
    let p = Bps.create(&src, &tgt)?;
    let parsed = BpsPatch::parse(&p)?;
    assert_eq!(
        parsed.actions,
        vec![
            BpsAction::SourceRead { len: 2 },
            BpsAction::TargetRead { data: vec![0x55] },
            BpsAction::TargetCopy { delta: 2, len: 19 },
        ],
        "one literal then an overlapping copy"
    );
    assert_eq!(Bps.apply(&src, &p)?, tgt, "applied");
    Ok(())
}

#[test]
fn bps_source_copy() -> Result<()> {
    // Target is the source reversed in halves: copy 2..4 then 0..2.
    let src = [1u8, 2, 3, 4];
    let mut body = b"BPS1\x84\x84\x80".to_vec();
    body.extend([0x86, 0x84]); // SourceCopy len 2, +2
    body.extend([0x86, 0x89]); // SourceCopy len 2, -4
    let p = with_trailer(body, &src, &[3, 4, 1, 2], true);
    assert_eq!(Bps.apply(&src, &p)?, vec![3, 4, 1, 2], "copied");

    let mut body = b"BPS1\x84\x84\x80".to_vec();
    body.extend([0x86, 0x83]); // SourceCopy len 2, -1
    body.extend([0x86, 0x80]);
    let p = with_trailer(body, &src, &src, true);
    assert_eq!(
        Bps.apply(&src, &p),
        Err(PatchError::CopyOutOfBounds { action: 0 }),
        "before the source"
    );
    Ok(())
}

#[test]
fn bps_corruption() -> Result<()> {
    let src = [1u8, 2, 3, 4];
    let tgt = [1u8, 2, 9, 4];
    let p = Bps.create(&src, &tgt)?;

    let mut bad = p.clone();
    bad[8] ^= 0x01;
    assert!(
        matches!(Bps.apply(&src, &bad), Err(PatchError::PatchCrcMismatch { .. })),
        "body changed"
    );

    let res = Bps.apply(&[1, 2, 3, 5], &p);
    assert!(matches!(res, Err(PatchError::SourceCrcMismatch { .. })), "wrong source {res:?}");
    assert_eq!(
        Bps.apply(&[1, 2, 3], &p),
        Err(PatchError::SourceSizeMismatch {
            expected: 4,
            actual: 3
        }),
        "wrong size"
    );

    // Correct self CRC but the recorded target CRC is wrong.
    let mut body = p[..p.len() - 12].to_vec();
    body.extend(crc32fast::hash(&src).to_le_bytes());
    body.extend(0u32.to_le_bytes());
    let crc = crc32fast::hash(&body);
    body.extend(crc.to_le_bytes());
    assert!(
        matches!(Bps.apply(&src, &body), Err(PatchError::TargetCrcMismatch { .. })),
        "target crc"
    );

    // Actions that stop short of the target size.
    let p = with_trailer(b"BPS1\x84\x85\x80\x8C".to_vec(), &src, &src, true);
    assert_eq!(
        Bps.apply(&src, &p),
        Err(PatchError::TargetSizeMismatch {
            expected: 5,
            actual: 4
        }),
        "short output"
    );

    // Actions that run past it.
    let p = with_trailer(b"BPS1\x84\x82\x80\x8C".to_vec(), &src, &src, true);
    assert_eq!(
        Bps.apply(&src, &p),
        Err(PatchError::RunOutOfBounds { offset: 0, len: 2 }),
        "long output"
    );

    assert_eq!(
        Bps.apply(&src, b"BPS0"),
        Err(PatchError::BadMagic { expected: "BPS1" }),
        "magic"
    );
    let p = with_trailer(b"BPS1\x84\x84\x80\x8D\x01".to_vec(), &src, &src, true);
    assert_eq!(
        Bps.apply(&src, &p),
        Err(PatchError::TruncatedRecord { offset: 7 }),
        "literal cut short"
    );
    Ok(())
}

#[test]
fn round_trips() -> Result<()> {
    let mut rng = StdRng::seed_from_u64(0x1B5);
    for _ in 0..100 {
        let src: Vec<u8> = (0..rng.gen_range(0..2000)).map(|_| rng.gen()).collect();
        let mut tgt = src.clone();
        tgt.resize(rng.gen_range(0..2000), 0);
        for _ in 0..rng.gen_range(0..20) {
            if tgt.is_empty() {
                break;
            }
            let at = rng.gen_range(0..tgt.len());
            let len = rng.gen_range(1..40).min(tgt.len() - at);
            let fill: u8 = rng.gen();
            let run = rng.gen::<bool>();
            for b in &mut tgt[at..at + len] {
                *b = if run { fill } else { rng.gen() };
            }
        }
        for kind in [PatchKind::Ips, PatchKind::Ups, PatchKind::Bps] {
            let f = kind.format();
            let p = f.create(&src, &tgt)?;
            assert_eq!(f.apply(&src, &p)?, tgt, "{} round trip", f.name());
        }
    }
    Ok(())
}

#[test]
fn detection() -> Result<()> {
    let src = [1u8, 2, 3];
    let tgt = [1u8, 5, 3];
    let ips = Ips.create(&src, &tgt)?;
    let ups = Ups.create(&src, &tgt)?;
    let bps = Bps.create(&src, &tgt)?;
    assert_eq!(PatchKind::detect(&ips), Some(PatchKind::Ips), "ips");
    assert_eq!(PatchKind::detect(&ups), Some(PatchKind::Ups), "ups");
    assert_eq!(PatchKind::detect(&bps), Some(PatchKind::Bps), "bps");
    assert_eq!(PatchKind::detect(b"XDELTA"), None, "other");
    assert_eq!(apply(&src, &ips)?, tgt, "dispatch ips");
    assert_eq!(apply(&src, &ups)?, tgt, "dispatch ups");
    assert_eq!(apply(&src, &bps)?, tgt, "dispatch bps");
    assert_eq!(apply(&src, b"XDELTA"), Err(PatchError::UnknownFormat), "unknown");
    assert_eq!(PatchKind::from_str("bps")?, PatchKind::Bps, "parse bps");
    assert_eq!(PatchKind::from_str("UPS")?, PatchKind::Ups, "parse");
    assert_eq!(PatchKind::Ips.to_string(), "ips", "display");
    Ok(())
}

#[test]
fn hunks() {
    let h = diff(&[1, 2, 3], &[1, 9, 3, 4, 5]);
    assert_eq!(
        h,
        vec![
            Hunk {
                offset: 1,
                old: vec![2],
                new: vec![9]
            },
            Hunk {
                offset: 3,
                old: vec![],
                new: vec![4, 5]
            },
        ],
        "grown"
    );
    assert_eq!(h[1].end(), 5, "end");

    let h = diff(&[1, 2, 3, 4], &[1, 2]);
    assert_eq!(
        h,
        vec![Hunk {
            offset: 2,
            old: vec![3, 4],
            new: vec![]
        }],
        "shrunk"
    );
    assert!(diff(&[1, 2], &[1, 2]).is_empty(), "same");

    let old = [0u8; 12];
    let mut new = old;
    new[1] = 1;
    new[4] = 1;
    new[10] = 1;
    let h = diff_coalesced(&old, &new, 3);
    let spans: Vec<(usize, usize)> = h.iter().map(|h| (h.offset, h.end())).collect();
    assert_eq!(spans, vec![(1, 5), (10, 11)], "gap of 2 merged, gap of 5 not");
}

#[test]
fn hunks_cover_every_difference() {
    let mut rng = StdRng::seed_from_u64(0xD1F);
    for _ in 0..100 {
        let a: Vec<u8> = (0..rng.gen_range(0..100)).map(|_| rng.gen_range(0..3)).collect();
        let b: Vec<u8> = (0..rng.gen_range(0..100)).map(|_| rng.gen_range(0..3)).collect();
        let h = diff(&a, &b);
        let mut covered = vec![false; a.len().max(b.len())];
        let mut last = 0;
        for hunk in &h {
            assert!(hunk.offset >= last, "ordered and disjoint");
            for c in &mut covered[hunk.offset..hunk.end()] {
                *c = true;
            }
            last = hunk.end();
        }
        for (i, c) in covered.iter().enumerate() {
            assert_eq!(*c, a.get(i) != b.get(i), "position {i}");
        }
    }
}

#[test]
fn error_kinds() {
    let k: &'static str = PatchError::UnknownFormat.into();
    assert_eq!(k, "UnknownFormat", "kind");
}
