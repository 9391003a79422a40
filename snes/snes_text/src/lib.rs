//! `snes_text` converts between game script bytes and editable strings
//! using a per-game character table.
//!
//! A table maps each byte to one of:
//!
//! * a glyph (one or more characters)
//! * a DTE pair (one byte standing in for two characters)
//! * a control code with a fixed number of parameter bytes
//!
//! Control codes decode to `[NAME]` or `[NAME:HHHH]` (parameters as hex),
//! unmapped bytes decode to `[XX]` and a terminator byte ends each string.
//! `[` and `]` are reserved for these escapes.

use ahash::AHashMap;
use bitio::DEFAULT_MAX_OUTPUT;
use std::fmt::Write;
use std::ops::RangeInclusive;
use strum_macros::IntoStaticStr;
use thiserror::Error;

mod table;

pub use table::parse_table;

#[cfg(test)]
mod tests;

/// `TextError` defines the failures from the text codec and table loader.
#[derive(Error, Debug, Clone, PartialEq, Eq, IntoStaticStr)]
pub enum TextError {
    /// An escape was unterminated, unbalanced or didn't name anything.
    #[error("Malformed escape at char {pos}: {text}")]
    MalformedEscape {
        /// Char index where the escape starts.
        pos: usize,
        /// The offending text.
        text: String,
    },

    /// Encoded output is over the configured budget.
    #[error("Encoded string is {actual} bytes, limit is {limit}")]
    TooLong {
        /// Encoded length including the terminator.
        actual: usize,
        /// Configured budget.
        limit: usize,
    },

    /// A character has no glyph or DTE mapping.
    #[error("Can't encode {ch:?} at char {pos}")]
    Unencodable {
        /// The character.
        ch: char,
        /// Char index in the input.
        pos: usize,
    },

    /// Input ran out before the terminator.
    #[error("No terminator found in {len} bytes")]
    MissingTerminator {
        /// Bytes examined.
        len: usize,
    },

    /// A control code's parameters ran past the end of input.
    #[error("Control code {name} at {offset:#X} is missing parameter bytes")]
    TruncatedControl {
        /// Control name.
        name: String,
        /// Offset of the opcode.
        offset: usize,
    },

    /// Decoded text would be larger than allowed.
    #[error("Decoded text would exceed {limit} bytes")]
    OutputLimitExceeded {
        /// The configured ceiling.
        limit: usize,
    },

    /// A table file line couldn't be parsed.
    #[error("Table line {line}: can't parse {text:?}")]
    TableSyntax {
        /// 1 based line number.
        line: usize,
        /// The line contents.
        text: String,
    },
}

/// `Entry` is what a single byte means in a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Entry {
    /// Plain glyph text.
    Glyph(String),

    /// Dual tile encoding: exactly two characters.
    Dte(String),

    /// Control code followed by `params` argument bytes.
    Control {
        /// Name used in `[NAME]` escapes.
        name: String,
        /// Parameter byte count.
        params: u8,
    },
}

/// `Table` is a loaded character table plus the string framing rules.
#[derive(Debug, Clone)]
pub struct Table {
    entries: Vec<Option<Entry>>,
    terminator: u8,
    dte_range: Option<RangeInclusive<u8>>,
    budget: Option<usize>,
    compress: bool,
    glyphs: AHashMap<String, u8>,
    pairs: AHashMap<String, u8>,
    controls: AHashMap<String, (u8, u8)>,
    longest_glyph: usize,
}

impl Table {
    /// Create an empty table with the given string terminator.
    #[must_use]
    pub fn new(terminator: u8) -> Self {
        Self {
            entries: vec![None; 256],
            terminator,
            dte_range: None,
            budget: None,
            compress: true,
            glyphs: AHashMap::new(),
            pairs: AHashMap::new(),
            controls: AHashMap::new(),
            longest_glyph: 0,
        }
    }

    /// The terminator byte.
    #[must_use]
    pub fn terminator(&self) -> u8 {
        self.terminator
    }

    /// Bytes in this range whose table value is exactly two characters are
    /// loaded as DTE pairs.
    #[must_use]
    pub fn with_dte_range(mut self, range: RangeInclusive<u8>) -> Self {
        self.dte_range = Some(range);
        self
    }

    /// The configured DTE range, if any.
    #[must_use]
    pub fn dte_range(&self) -> Option<&RangeInclusive<u8>> {
        self.dte_range.as_ref()
    }

    /// Maximum encoded length (terminator included) per string.
    #[must_use]
    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Turn greedy DTE substitution on or off when encoding. With it off
    /// pairs are only used for characters no glyph covers.
    #[must_use]
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// What `byte` means, if anything.
    #[must_use]
    pub fn entry(&self, byte: u8) -> Option<&Entry> {
        self.entries[usize::from(byte)].as_ref()
    }

    /// Number of mapped bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    /// True if nothing is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Map `byte`. If several bytes map to the same text, encoding uses the
    /// first one inserted.
    pub fn insert(&mut self, byte: u8, entry: Entry) {
        match &entry {
            Entry::Glyph(g) => {
                self.longest_glyph = self.longest_glyph.max(g.chars().count());
                self.glyphs.entry(g.clone()).or_insert(byte);
            }
            Entry::Dte(p) => {
                self.pairs.entry(p.clone()).or_insert(byte);
            }
            Entry::Control { name, params } => {
                self.controls.entry(name.clone()).or_insert((byte, *params));
            }
        }
        self.entries[usize::from(byte)] = Some(entry);
    }

    /// Decode one string starting at `bytes[0]` with the default output
    /// ceiling.
    ///
    /// # Errors
    /// See `decode_with_limit`.
    pub fn decode(&self, bytes: &[u8]) -> Result<(String, usize), TextError> {
        self.decode_with_limit(bytes, DEFAULT_MAX_OUTPUT)
    }

    /// Decode one string. Returns the text and the number of bytes
    /// consumed including the terminator.
    ///
    /// # Errors
    /// `MissingTerminator` if the input ends first, `TruncatedControl` if a
    /// control code's parameters are cut off and `OutputLimitExceeded`
    /// if the text grows past `max_output` bytes.
    pub fn decode_with_limit(
        &self,
        bytes: &[u8],
        max_output: usize,
    ) -> Result<(String, usize), TextError> {
        let mut out = String::new();
        let mut i = 0;
        loop {
            let b = *bytes
                .get(i)
                .ok_or(TextError::MissingTerminator { len: bytes.len() })?;
            if b == self.terminator {
                return Ok((out, i + 1));
            }
            match self.entry(b) {
                Some(Entry::Glyph(g) | Entry::Dte(g)) => out.push_str(g),
                Some(Entry::Control { name, params }) => {
                    let args = bytes
                        .get(i + 1..i + 1 + usize::from(*params))
                        .ok_or_else(|| TextError::TruncatedControl {
                            name: name.clone(),
                            offset: i,
                        })?;
                    out.push('[');
                    out.push_str(name);
                    if !args.is_empty() {
                        out.push(':');
                        for a in args {
                            // Writing to a String can't fail.
                            let _ = write!(out, "{a:02X}");
                        }
                    }
                    out.push(']');
                    i += args.len();
                }
                None => {
                    let _ = write!(out, "[{b:02X}]");
                }
            }
            if out.len() > max_output {
                return Err(TextError::OutputLimitExceeded { limit: max_output });
            }
            i += 1;
        }
    }

    /// Encode a string, appending the terminator.
    ///
    /// # Errors
    /// `MalformedEscape` for unbalanced or unknown `[...]` escapes,
    /// `Unencodable` for characters with no mapping and `TooLong` if the
    /// result exceeds the table's budget.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, TextError> {
        let chars: Vec<char> = text.chars().collect();
        let mut out = Vec::new();
        let mut pos = 0;
        while pos < chars.len() {
            match chars[pos] {
                '[' => {
                    let close = chars[pos + 1..]
                        .iter()
                        .position(|&c| c == ']' || c == '[')
                        .map(|p| p + pos + 1)
                        .filter(|&p| chars[p] == ']')
                        .ok_or_else(|| malformed(&chars, pos, chars.len()))?;
                    let inner: String = chars[pos + 1..close].iter().collect();
                    self.encode_escape(&inner, pos, &chars[pos..=close], &mut out)?;
                    pos = close + 1;
                }
                ']' => return Err(malformed(&chars, pos, pos + 1)),
                _ => pos = self.encode_run(&chars, pos, &mut out)?,
            }
        }
        out.push(self.terminator);
        if let Some(limit) = self.budget {
            if out.len() > limit {
                return Err(TextError::TooLong {
                    actual: out.len(),
                    limit,
                });
            }
        }
        Ok(out)
    }

    fn encode_escape(
        &self,
        inner: &str,
        pos: usize,
        whole: &[char],
        out: &mut Vec<u8>,
    ) -> Result<(), TextError> {
        let bad = || TextError::MalformedEscape {
            pos,
            text: whole.iter().collect(),
        };
        let (name, args) = match inner.split_once(':') {
            Some((n, a)) => (n, Some(a)),
            None => (inner, None),
        };
        if let Some(&(byte, params)) = self.controls.get(name) {
            let args = args.unwrap_or("");
            if args.len() != usize::from(params) * 2 {
                return Err(bad());
            }
            out.push(byte);
            for i in (0..args.len()).step_by(2) {
                let a = args
                    .get(i..i + 2)
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(bad)?;
                out.push(a);
            }
            return Ok(());
        }
        if args.is_none() && name.len() == 2 && name.chars().all(|c| c.is_ascii_hexdigit()) {
            if let Ok(b) = u8::from_str_radix(name, 16) {
                out.push(b);
                return Ok(());
            }
        }
        Err(bad())
    }

    // Encode plain text starting at `start` up to the next escape bracket.
    // Returns the position after the last character consumed.
    //
    // Picks the cheapest split of the run into glyphs and pairs so a pair
    // never strands a character a glyph could have covered. With
    // compression off pairs are a last resort, so the cost counts pairs
    // first and bytes second.
    fn encode_run(&self, chars: &[char], start: usize, out: &mut Vec<u8>) -> Result<usize, TextError> {
        let end = chars[start..]
            .iter()
            .position(|&c| c == '[' || c == ']')
            .map_or(chars.len(), |p| start + p);

        // best[i - start]: ((pairs, bytes), byte, width) for chars[i..end].
        let mut best: Vec<Option<((usize, usize), u8, usize)>> = vec![None; end - start + 1];
        best[end - start] = Some(((0, 0), 0, 0));
        for i in (start..end).rev() {
            let mut pick: Option<((usize, usize), u8, usize)> = None;
            for (b, n, pair) in self.tokens_at(chars, i, end) {
                let Some(((pairs, bytes), ..)) = best[i + n - start] else {
                    continue;
                };
                let cost = if pair && !self.compress {
                    (pairs + 1, bytes + 1)
                } else {
                    (pairs, bytes + 1)
                };
                if pick.map_or(true, |(c, ..)| cost < c) {
                    pick = Some((cost, b, n));
                }
            }
            best[i - start] = pick;
        }

        if best[0].is_none() {
            // Report the furthest character any split reaches.
            let mut reach = vec![false; end - start + 1];
            reach[0] = true;
            let mut far = start;
            for i in start..end {
                if reach[i - start] {
                    far = i;
                    for (_, n, _) in self.tokens_at(chars, i, end) {
                        reach[i + n - start] = true;
                    }
                }
            }
            return Err(TextError::Unencodable {
                ch: chars[far],
                pos: far,
            });
        }

        let mut pos = start;
        while let Some((_, b, n)) = best[pos - start].filter(|_| pos < end) {
            out.push(b);
            pos += n;
        }
        Ok(pos)
    }

    // Every (byte, width, is_pair) that can encode chars at `pos`, the pair
    // first then glyphs longest first.
    fn tokens_at(&self, chars: &[char], pos: usize, end: usize) -> Vec<(u8, usize, bool)> {
        let mut tokens = Vec::new();
        if pos + 2 <= end {
            let pair: String = chars[pos..pos + 2].iter().collect();
            if let Some(&b) = self.pairs.get(&pair) {
                tokens.push((b, 2, true));
            }
        }
        for n in (1..=self.longest_glyph.min(end - pos)).rev() {
            let s: String = chars[pos..pos + n].iter().collect();
            if let Some(&b) = self.glyphs.get(&s) {
                tokens.push((b, n, false));
            }
        }
        tokens
    }
}

fn malformed(chars: &[char], start: usize, end: usize) -> TextError {
    TextError::MalformedEscape {
        pos: start,
        text: chars[start..end].iter().collect(),
    }
}
