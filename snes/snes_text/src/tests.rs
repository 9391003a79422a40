use color_eyre::eyre::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{parse_table, Entry, Table, TextError};

const TABLE: &str = "# test table
00=[END]
01=[NEWLINE]
05=[COLOR:1]
06=[MOVE:2]
20=\x20
2E=.
41=A
42=B
48=e
49=s
4A=th
45=s\x20
46=he
";

fn table() -> Result<Table> {
    Ok(parse_table(TABLE, Table::new(0x00).with_dte_range(0x40..=0x47))?)
}

#[test]
fn dte_decode() -> Result<()> {
    let mut t = Table::new(0x00).with_dte_range(0x40..=0x4F);
    t.insert(0x48, Entry::Glyph("e".into()));
    t.insert(0x45, Entry::Dte("s ".into()));
    let (s, used) = t.decode(&[0x48, 0x45, 0x00])?;
    assert_eq!(s, "es ", "decoded");
    assert_eq!(used, 3, "consumed");
    Ok(())
}

#[test]
fn table_parse() -> Result<()> {
    let t = table()?;
    // 00 is a control in the file but is also the terminator.
    assert_eq!(t.len(), 13, "entries");
    assert_eq!(t.entry(0x20), Some(&Entry::Glyph(" ".into())), "space");
    assert_eq!(t.entry(0x45), Some(&Entry::Dte("s ".into())), "pair in range");
    assert_eq!(t.entry(0x4A), Some(&Entry::Glyph("th".into())), "out of range two chars");
    assert_eq!(
        t.entry(0x06),
        Some(&Entry::Control {
            name: "MOVE".into(),
            params: 2
        }),
        "control"
    );
    assert_eq!(t.entry(0x99), None, "unmapped");
    Ok(())
}

#[test]
fn table_syntax_errors() {
    for (text, line) in [("4=A", 1), ("# ok\nZZ=A", 2), ("41=", 1), ("05=[COLOR:x]", 1), ("05=[]", 1)] {
        let res = parse_table(text, Table::new(0));
        assert!(
            matches!(&res, Err(TextError::TableSyntax { line: l, .. }) if *l == line),
            "{text:?} gave {res:?}"
        );
    }
}

#[test]
fn controls_and_unmapped() -> Result<()> {
    let t = table()?;
    let (s, used) = t.decode(&[0x41, 0x01, 0x05, 0x03, 0x06, 0xAB, 0xCD, 0x99, 0x00, 0x41])?;
    assert_eq!(s, "A[NEWLINE][COLOR:03][MOVE:ABCD][99]", "decoded");
    assert_eq!(used, 9, "consumed through terminator");
    Ok(())
}

#[test]
fn decode_errors() -> Result<()> {
    let t = table()?;
    let res = t.decode(&[0x41, 0x42]);
    assert_eq!(res, Err(TextError::MissingTerminator { len: 2 }), "no terminator");
    let res = t.decode(&[0x41, 0x06, 0x01]);
    assert!(
        matches!(&res, Err(TextError::TruncatedControl { offset: 1, .. })),
        "cut control {res:?}"
    );
    let res = t.decode_with_limit(&[0x4A, 0x4A, 0x4A, 0x00], 4);
    assert_eq!(res, Err(TextError::OutputLimitExceeded { limit: 4 }), "limit");
    Ok(())
}

#[test]
fn encode_basic() -> Result<()> {
    let t = table()?;
    assert_eq!(t.encode("AB.")?, vec![0x41, 0x42, 0x2E, 0x00], "plain");
    assert_eq!(
        t.encode("A[NEWLINE][COLOR:03][MOVE:abcd][99]")?,
        vec![0x41, 0x01, 0x05, 0x03, 0x06, 0xAB, 0xCD, 0x99, 0x00],
        "escapes"
    );
    Ok(())
}

#[test]
fn encode_dte_greedy() -> Result<()> {
    let t = table()?;
    // "es " -> e then the "s " pair.
    assert_eq!(t.encode("es ")?, vec![0x48, 0x45, 0x00], "pair used");
    // "he" is a pair, "th" is a multi char glyph.
    assert_eq!(t.encode("the")?, vec![0x4A, 0x48, 0x00], "glyph th");
    let plain = t.clone().with_compression(false);
    assert_eq!(plain.encode("es ")?, vec![0x48, 0x49, 0x20, 0x00], "no compression");
    Ok(())
}

#[test]
fn encode_pair_never_strands_a_char() -> Result<()> {
    let mut t = Table::new(0x00).with_dte_range(0x40..=0x4F);
    t.insert(0x40, Entry::Dte("ab".into()));
    t.insert(0x41, Entry::Glyph("a".into()));
    t.insert(0x60, Entry::Glyph("bc".into()));
    assert_eq!(t.encode("abc")?, vec![0x41, 0x60, 0x00], "a then bc");
    assert_eq!(t.encode("ab")?, vec![0x40, 0x00], "pair when it fits");
    assert_eq!(t.encode("abab")?, vec![0x40, 0x40, 0x00], "pairs twice");
    let (s, _) = t.decode(&t.encode("abcab")?)?;
    assert_eq!(s, "abcab", "round trip");
    assert_eq!(
        t.encode("abd"),
        Err(TextError::Unencodable { ch: 'd', pos: 2 }),
        "furthest reachable char"
    );
    Ok(())
}

#[test]
fn encode_errors() -> Result<()> {
    let t = table()?;
    for (s, pos) in [("A[NEWLINE", 1), ("A]", 1), ("[A[B]", 0), ("[NOPE]", 0), ("[COLOR]", 0), ("[COLOR:1]", 0), ("[COLOR:ZZ]", 0)] {
        let res = t.encode(s);
        assert!(
            matches!(&res, Err(TextError::MalformedEscape { pos: p, .. }) if *p == pos),
            "{s:?} gave {res:?}"
        );
    }
    let res = t.encode("AZ");
    assert_eq!(res, Err(TextError::Unencodable { ch: 'Z', pos: 1 }), "no glyph");
    let short = t.clone().with_budget(3);
    assert!(short.encode("AB").is_ok(), "fits exactly");
    let res = short.encode("ABA");
    assert_eq!(res, Err(TextError::TooLong { actual: 4, limit: 3 }), "budget");
    Ok(())
}

#[test]
fn decode_then_encode() -> Result<()> {
    let t = table()?.with_compression(false);
    let mut rng = StdRng::seed_from_u64(0x7E47);
    let usable: Vec<u8> = (1..=255u8).filter(|b| ![0x05, 0x06].contains(b)).collect();
    for _ in 0..200 {
        let len = rng.gen_range(0..20);
        let mut bytes: Vec<u8> = (0..len).map(|_| usable[rng.gen_range(0..usable.len())]).collect();
        bytes.push(0x00);
        let (s, used) = t.decode(&bytes)?;
        assert_eq!(used, bytes.len(), "consumed all");
        let (again, _) = t.decode(&t.encode(&s)?)?;
        assert_eq!(again, s, "string survives re-encoding");
    }
    Ok(())
}
