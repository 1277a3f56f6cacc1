//! MSDP (MUD Server Data Protocol) payload parsing.
//!
//! MSDP frames a tree of name/value pairs inside a Telnet subnegotiation
//! using four single-byte markers instead of JSON punctuation:
//!
//! - `VAR` (1) precedes a name, `VAL` (2) precedes its value
//! - `VAL` repeated without an intervening `VAR` builds an array
//! - `ARRAY_OPEN`/`ARRAY_CLOSE` (5/6) and `TABLE_OPEN`/`TABLE_CLOSE` (3/4)
//!   nest a list or a nested name/value map as the current value
//!
//! Parsed with a hand written recursive-descent byte-cursor walk rather than
//! a parser-combinator crate, since the grammar is tiny and the byte markers
//! aren't UTF-8 safe.

use std::collections::BTreeMap;

pub const VAR: u8 = 1;
pub const VAL: u8 = 2;
pub const TABLE_OPEN: u8 = 3;
pub const TABLE_CLOSE: u8 = 4;
pub const ARRAY_OPEN: u8 = 5;
pub const ARRAY_CLOSE: u8 = 6;

/// A decoded MSDP value: either a leaf string, a nested table, or an array
/// of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MsdpValue {
    String(String),
    Array(Vec<MsdpValue>),
    Table(BTreeMap<String, MsdpValue>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsdpError(pub String);

impl std::fmt::Display for MsdpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn take(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// Read a run of bytes up to (not including) the next marker byte.
    fn take_text(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_marker(b) {
                break;
            }
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned()
    }
}

fn is_marker(b: u8) -> bool {
    matches!(b, VAR | VAL | TABLE_OPEN | TABLE_CLOSE | ARRAY_OPEN | ARRAY_CLOSE)
}

/// Parse a full MSDP subnegotiation payload (the bytes between `IAC SB MSDP`
/// and `IAC SE`) into a flat map of top-level variables.
pub fn parse(payload: &[u8]) -> Result<BTreeMap<String, MsdpValue>, MsdpError> {
    let mut cur = Cursor { bytes: payload, pos: 0 };
    parse_table_body(&mut cur, None)
}

/// Parse name/value pairs until either end of input or (if `closer` is set)
/// the matching close marker is consumed.
fn parse_table_body(
    cur: &mut Cursor<'_>,
    closer: Option<u8>,
) -> Result<BTreeMap<String, MsdpValue>, MsdpError> {
    let mut map = BTreeMap::new();
    loop {
        match cur.peek() {
            None => {
                if closer.is_some() {
                    return Err(MsdpError("unterminated MSDP table".into()));
                }
                return Ok(map);
            }
            Some(b) if Some(b) == closer => {
                cur.take();
                return Ok(map);
            }
            Some(VAR) => {
                cur.take();
                let name = cur.take_text();
                if cur.take() != Some(VAL) {
                    return Err(MsdpError(format!("VAR {name:?} not followed by VAL")));
                }
                let value = parse_value_run(cur)?;
                map.insert(name, value);
            }
            Some(other) => {
                return Err(MsdpError(format!("unexpected marker byte {other} at top level")));
            }
        }
    }
}

/// Parse one or more VAL-delimited values into a single value (a scalar if
/// there's exactly one, an array if VAL repeats).
fn parse_value_run(cur: &mut Cursor<'_>) -> Result<MsdpValue, MsdpError> {
    let mut values = vec![parse_one_value(cur)?];
    while cur.peek() == Some(VAL) {
        cur.take();
        values.push(parse_one_value(cur)?);
    }
    if values.len() == 1 {
        Ok(values.pop().unwrap())
    } else {
        Ok(MsdpValue::Array(values))
    }
}

fn parse_one_value(cur: &mut Cursor<'_>) -> Result<MsdpValue, MsdpError> {
    match cur.peek() {
        Some(ARRAY_OPEN) => {
            cur.take();
            let mut items = Vec::new();
            loop {
                match cur.peek() {
                    Some(ARRAY_CLOSE) => {
                        cur.take();
                        break;
                    }
                    Some(VAL) => {
                        cur.take();
                        items.push(parse_one_value(cur)?);
                    }
                    None => return Err(MsdpError("unterminated MSDP array".into())),
                    Some(other) => {
                        return Err(MsdpError(format!("unexpected byte {other} inside array")))
                    }
                }
            }
            Ok(MsdpValue::Array(items))
        }
        Some(TABLE_OPEN) => {
            cur.take();
            let table = parse_table_body(cur, Some(TABLE_CLOSE))?;
            Ok(MsdpValue::Table(table))
        }
        _ => Ok(MsdpValue::String(cur.take_text())),
    }
}
