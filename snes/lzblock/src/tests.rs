use bitio::BitError;
use color_eyre::eyre::Result;
use ntest::timeout;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    compact_nibbles, compact_second_half, decompress, decompress_tail_window, expand_nibbles,
    expand_second_half, Grammar, LzError, PairOrder, Termination,
};

const MAX: usize = 0x1000;

#[test]
fn header_length() -> Result<()> {
    // 3 literals then (length 6, distance 3) overlapping its own output.
    let input = [0x09, 0x00, 0x10, b'a', b'b', b'c', 0x30, 0x03];
    assert_eq!(decompress(&input, MAX)?, b"abcabcabc", "decoded");
    Ok(())
}

#[test]
fn little_endian_pair() -> Result<()> {
    let g = Grammar {
        pair_order: PairOrder::Little,
        ..Grammar::default()
    };
    let input = [0x09, 0x00, 0x10, b'a', b'b', b'c', 0x03, 0x30];
    assert_eq!(g.decompress(&input, MAX)?, b"abcabcabc", "decoded");
    Ok(())
}

#[test]
fn terminations() -> Result<()> {
    let g = Grammar {
        termination: Termination::OutputLength(3),
        ..Grammar::default()
    };
    assert_eq!(g.decompress(&[0x00, b'x', b'y', b'z'], MAX)?, b"xyz", "known length");

    let g = Grammar {
        termination: Termination::ControlValue(0xFF),
        ..Grammar::default()
    };
    let input = [0x00, 1, 2, 3, 4, 5, 6, 7, 8, 0xFF, 9];
    assert_eq!(g.decompress(&input, MAX)?, vec![1, 2, 3, 4, 5, 6, 7, 8], "control value");
    Ok(())
}

#[test]
fn reference_cut_at_length() -> Result<()> {
    // Length 18 reference but only 4 more bytes wanted.
    let input = [0x05, 0x00, 0x40, b'a', 0xF0, 0x01];
    assert_eq!(decompress(&input, MAX)?, b"aaaaa", "cut");
    Ok(())
}

#[test]
fn biased_split() -> Result<()> {
    let g = Grammar {
        length_bits: 3,
        length_bias: 2,
        distance_bias: 1,
        pair_order: PairOrder::Big,
        termination: Termination::OutputLength(6),
    };
    // raw length 2 -> 4, raw distance 1 -> 2.
    let input = [0x20, b'x', b'y', 0x40, 0x01];
    assert_eq!(g.decompress(&input, MAX)?, b"xyxyxy", "biased");
    Ok(())
}

macro_rules! lz_error_test {
    ($suite:ident, $($name:ident: $grammar:expr, $input:expr, $want:expr,)*) => {
        mod $suite {
            use super::*;

            $(
                #[test]
                fn $name() {
                    let res = $grammar.decompress(&$input, MAX);
                    assert_eq!(res, Err($want), "{res:?}");
                }
            )*
        }
    }
}

lz_error_test!(
    errors,
    length_zero: Grammar {
        length_bias: 0,
        termination: Termination::OutputLength(4),
        ..Grammar::default()
    }, [0x40, b'a', 0x00, 0x01], LzError::LengthZero { offset: 2 },
    distance_past_start: Grammar::default(),
        [0x04, 0x00, 0x40, b'a', 0x30, 0x05],
        LzError::DistanceOutOfBounds { distance: 5, available: 1, offset: 4 },
    distance_zero: Grammar::default(),
        [0x04, 0x00, 0x40, b'a', 0x30, 0x00],
        LzError::DistanceOutOfBounds { distance: 0, available: 1, offset: 4 },
    truncated: Grammar::default(),
        [0x09, 0x00, 0x00, b'a'],
        LzError::Bits(BitError::UnexpectedEof { offset: 4, wanted: 1 }),
    no_header: Grammar::default(),
        [0x09],
        LzError::Bits(BitError::UnexpectedEof { offset: 0, wanted: 2 }),
    header_too_big: Grammar::default(),
        [0xFF, 0xFF, 0x00],
        LzError::OutputLimitExceeded { limit: MAX },
    bad_split: Grammar {
        length_bits: 16,
        ..Grammar::default()
    }, [0x00], LzError::BadGrammar { length_bits: 16 },
);

#[test]
fn kinds() {
    let e = LzError::Bits(BitError::UnexpectedEof { offset: 0, wanted: 1 });
    assert_eq!(e.kind(), "UnexpectedEof", "delegated");
    assert_eq!(LzError::LengthZero { offset: 0 }.kind(), "LengthZero", "own");
}

#[test]
#[timeout(5000)]
fn runaway_references() {
    // Every token after the first literal is a maximum length reference
    // to the previous byte and nothing ends the stream.
    let g = Grammar {
        termination: Termination::ControlValue(0x00),
        ..Grammar::default()
    };
    let mut input = vec![0x7F, b'a'];
    for _ in 0..7 {
        input.extend([0xF0, 0x01]);
    }
    for _ in 0..100_000 {
        input.push(0xFF);
        for _ in 0..8 {
            input.extend([0xF0, 0x01]);
        }
    }
    let res = g.decompress(&input, 4096);
    assert_eq!(res, Err(LzError::OutputLimitExceeded { limit: 4096 }), "bounded");
}

#[test]
fn random_streams_bounded() {
    let mut rng = StdRng::seed_from_u64(0x12B);
    for _ in 0..500 {
        let mut input = vec![0u8; rng.gen_range(0..256)];
        rng.fill(&mut input[..]);
        if let Ok(out) = decompress(&input, 0x1000) {
            let want = usize::from(u16::from_le_bytes([input[0], input[1]]));
            assert_eq!(out.len(), want, "header length honoured");
        }
    }
}

#[test]
fn tail_window() -> Result<()> {
    // 0x13: 3 literals then 3 bytes from 3 back.
    let input = [0x03, 0x00, 0x13, 0x02, 0x00, b'a', b'b', b'c'];
    assert_eq!(decompress_tail_window(&input, MAX)?, b"abcabc", "decoded");

    let input = [0x04, 0x00, 0x02, 0x30, 0x00, 0x00, b'x', b'y'];
    assert_eq!(decompress_tail_window(&input, MAX)?, b"xyyyyyy", "run of last byte");
    Ok(())
}

#[test]
fn tail_window_errors() {
    let res = decompress_tail_window(&[0x02, 0x00, 0x10, 0x00], MAX);
    assert_eq!(
        res,
        Err(LzError::DistanceOutOfBounds {
            distance: 1,
            available: 0,
            offset: 2
        }),
        "before start"
    );
    let res = decompress_tail_window(&[0x02, 0x00, 0x05, 0x00, b'a'], MAX);
    assert_eq!(
        res,
        Err(LzError::Bits(BitError::UnexpectedEof { offset: 0, wanted: 5 })),
        "literals run out"
    );
    let res = decompress_tail_window(&[0x01, 0x00, 0x01, b'a'], MAX);
    assert_eq!(
        res,
        Err(LzError::Bits(BitError::UnexpectedEof { offset: 3, wanted: 1 })),
        "no end command"
    );
    let res = decompress_tail_window(&[0x10, 0x00, 0x01], MAX);
    assert_eq!(
        res,
        Err(LzError::Bits(BitError::UnexpectedEof { offset: 2, wanted: 16 })),
        "command area past end"
    );
    let input = [0x03, 0x00, 0x13, 0x02, 0x00, b'a', b'b', b'c'];
    assert_eq!(
        decompress_tail_window(&input, 4),
        Err(LzError::OutputLimitExceeded { limit: 4 }),
        "limit"
    );
}

#[test]
fn second_half_zero() -> Result<()> {
    let input: Vec<u8> = (0x50..0x68).collect();
    let out = expand_second_half(&input)?;
    let mut want: Vec<u8> = (0x50..0x60).collect();
    for b in 0x60..0x68 {
        want.extend([b, 0]);
    }
    assert_eq!(out, want, "expanded");
    assert_eq!(compact_second_half(&out)?, input, "compacted");

    assert_eq!(
        expand_second_half(&input[..0x17]),
        Err(LzError::BadChunk { len: 0x17, chunk: 0x18 }),
        "short"
    );
    let mut bad = out.clone();
    bad[0x13] = 0x44;
    assert_eq!(
        compact_second_half(&bad),
        Err(LzError::NonZeroPad { offset: 0x13, value: 0x44 }),
        "padding"
    );
    Ok(())
}

#[test]
fn masked_nibbles() -> Result<()> {
    assert_eq!(expand_nibbles(&[0x21, 0xF8]), vec![1, 2, 0, 7], "expanded");
    assert_eq!(compact_nibbles(&[1, 2, 0, 7])?, vec![0x21, 0x70], "compacted");
    assert_eq!(
        compact_nibbles(&[1, 8]),
        Err(LzError::ValueOutOfRange { offset: 1, value: 8 }),
        "too big"
    );
    assert_eq!(compact_nibbles(&[1]), Err(LzError::BadChunk { len: 1, chunk: 2 }), "odd");

    let mut rng = StdRng::seed_from_u64(7);
    let vals: Vec<u8> = (0..64).map(|_| rng.gen_range(0..8)).collect();
    assert_eq!(expand_nibbles(&compact_nibbles(&vals)?), vals, "inverse");
    Ok(())
}
