//! ANSI SGR stripping and line styling.
//!
//! Produces the clean (colorless) form of a line used for trigger/tab-filter
//! matching, alongside the raw form and a summary [`Attr`] for display. A
//! small CSI state machine tracks SGR codes 0/1/30-37/40-47/90-97/100-107 and
//! folds them onto this crate's [`Attr`] bitset as each line is stripped.

use crate::attr::{color, Attr};

/// A line paired with its display styling: the original bytes (colored), the
/// ANSI-stripped form used for pattern matching, and the attributes in
/// effect at the end of the line.
#[derive(Debug, Clone, PartialEq)]
pub struct Styled {
    pub raw: String,
    pub clean: String,
    pub attr: Attr,
}

const ESC: u8 = 0x1B;

/// Strip SGR (`ESC [ ... m`) escape sequences from `line`, returning the
/// clean text and the final accumulated [`Attr`].
pub fn strip_ansi(line: &str) -> (String, Attr) {
    let bytes = line.as_bytes();
    let mut clean = String::with_capacity(bytes.len());
    let mut attr = Attr::EMPTY;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == ESC && bytes.get(i + 1) == Some(&b'[') {
            let mut j = i + 2;
            while j < bytes.len() && !bytes[j].is_ascii_alphabetic() {
                j += 1;
            }
            if j < bytes.len() {
                if bytes[j] == b'm' {
                    let params = std::str::from_utf8(&bytes[i + 2..j]).unwrap_or("");
                    attr = apply_sgr(attr, params);
                }
                i = j + 1;
                continue;
            } else {
                // Unterminated escape at end of line -- drop it.
                break;
            }
        }
        let ch_len = line[i..].chars().next().map(char::len_utf8).unwrap_or(1);
        clean.push_str(&line[i..i + ch_len]);
        i += ch_len;
    }
    (clean, attr)
}

fn apply_sgr(mut attr: Attr, params: &str) -> Attr {
    let codes: Vec<u32> = params
        .split(';')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    if codes.is_empty() {
        return attr.without_fg().without_bg();
    }
    for code in codes {
        match code {
            0 => attr = Attr::EMPTY,
            1 => attr |= Attr::BOLD,
            4 => attr |= Attr::UNDERLINE,
            3 => attr |= Attr::ITALIC,
            7 => attr |= Attr::REVERSE,
            30..=37 => attr = attr.with_fg((code - 30) as u8),
            90..=97 => attr = attr.with_fg((code - 90) as u8 + 8),
            40..=47 => attr = attr.with_bg((code - 40) as u8),
            100..=107 => attr = attr.with_bg((code - 100) as u8 + 8),
            39 => attr = attr.without_fg(),
            49 => attr = attr.without_bg(),
            _ => {}
        }
    }
    attr
}

/// Build a [`Styled`] line from raw server bytes (already decoded to text).
pub fn styled_line(raw: &str) -> Styled {
    let (clean, attr) = strip_ansi(raw);
    Styled {
        raw: raw.to_string(),
        clean,
        attr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_unaffected() {
        let (clean, attr) = strip_ansi("hello world");
        assert_eq!(clean, "hello world");
        assert_eq!(attr, Attr::EMPTY);
    }

    #[test]
    fn strips_color_code() {
        let (clean, attr) = strip_ansi("\x1b[31mred text\x1b[0m");
        assert_eq!(clean, "red text");
        assert_eq!(attr.fg_color(), Some(color::RED));
    }

    #[test]
    fn reset_clears_all_attributes() {
        let (_, attr) = strip_ansi("\x1b[1;31mbold red\x1b[0m");
        assert_eq!(attr, Attr::EMPTY);
    }

    #[test]
    fn bright_fg_uses_extended_index() {
        let (_, attr) = strip_ansi("\x1b[91mbright red");
        assert_eq!(attr.fg_color(), Some(color::BRIGHT_RED));
    }

    #[test]
    fn bold_and_color_combine() {
        let (_, attr) = strip_ansi("\x1b[1;32mgreen bold");
        assert!(attr.contains(Attr::BOLD));
        assert_eq!(attr.fg_color(), Some(color::GREEN));
    }

    #[test]
    fn background_color_applies() {
        let (_, attr) = strip_ansi("\x1b[44mtext");
        assert_eq!(attr.bg_color(), Some(color::BLUE));
    }

    #[test]
    fn non_color_csi_sequences_are_dropped_from_clean_text() {
        // Cursor movement (K, H, J) should not appear in clean text nor affect attr.
        let (clean, attr) = strip_ansi("\x1b[2Khello\x1b[1;1H");
        assert_eq!(clean, "hello");
        assert_eq!(attr, Attr::EMPTY);
    }

    #[test]
    fn styled_line_keeps_raw_form() {
        let s = styled_line("\x1b[31mred\x1b[0m");
        assert_eq!(s.raw, "\x1b[31mred\x1b[0m");
        assert_eq!(s.clean, "red");
    }

    #[test]
    fn escaped_255_style_bytes_not_confused_with_escape() {
        let (clean, _) = strip_ansi("plain \u{FFFD} text");
        assert_eq!(clean, "plain \u{FFFD} text");
    }
}
