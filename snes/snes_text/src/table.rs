use log::debug;
use regex::Regex;
use std::sync::OnceLock;

use crate::{Entry, Table, TextError};

const LINE: &str = r"^([0-9A-Fa-f]{2})=(.*)$";
const CONTROL: &str = r"^\[([A-Za-z_][A-Za-z0-9_]*)(?::(\d+))?\]$";

fn line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| match Regex::new(LINE) {
        Ok(re) => re,
        Err(err) => {
            panic!("Error parsing regex {LINE} - {err}");
        }
    })
}

fn control_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| match Regex::new(CONTROL) {
        Ok(re) => re,
        Err(err) => {
            panic!("Error parsing regex {CONTROL} - {err}");
        }
    })
}

/// Load table file text into `table` (which carries the terminator, DTE
/// range and budget) and return it.
///
/// Each non-comment line is `HH=value`:
///
/// * `HH=[NAME]` or `HH=[NAME:n]` defines a control code taking `n`
///   parameter bytes.
/// * a two character value for a byte inside the DTE range is a pair.
/// * anything else is a glyph. The value runs to the end of the line so
///   `20= ` maps a space.
///
/// Blank lines and lines starting with `#` are ignored.
///
/// # Errors
/// `TableSyntax` for a line that isn't `HH=value`, has an empty value or a
/// bad control definition.
pub fn parse_table(text: &str, mut table: Table) -> Result<Table, TextError> {
    for (n, raw) in text.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let bad = || TextError::TableSyntax {
            line: n + 1,
            text: line.to_string(),
        };
        let caps = line_re().captures(line).ok_or_else(bad)?;
        let byte = u8::from_str_radix(&caps[1], 16).map_err(|_| bad())?;
        let value = &caps[2];
        if value.is_empty() {
            return Err(bad());
        }

        let entry = if value.starts_with('[') {
            let c = control_re().captures(value).ok_or_else(bad)?;
            let params = match c.get(2) {
                Some(p) => p.as_str().parse::<u8>().map_err(|_| bad())?,
                None => 0,
            };
            Entry::Control {
                name: c[1].to_string(),
                params,
            }
        } else if value.chars().count() == 2
            && table.dte_range().is_some_and(|r| r.contains(&byte))
        {
            Entry::Dte(value.to_string())
        } else {
            Entry::Glyph(value.to_string())
        };
        table.insert(byte, entry);
    }
    debug!("Loaded text table with {} entries", table.len());
    Ok(table)
}
