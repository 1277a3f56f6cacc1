//! Regex pattern compilation and capture access.
//!
//! A single regex-only `Pattern` type, since every pattern this crate
//! compiles -- trigger patterns, alias patterns, tab filters, context-rule
//! matchers -- is typed as a regex. The `Captures` API (`left`/`whole`/
//! `right`/`group`/`group_count`) is exactly what the `$0..$n` substitution
//! in triggers and aliases needs.

use std::sync::Arc;

use regex::Regex;

/// Error returned when a pattern cannot be compiled.
#[derive(Debug)]
pub struct PatternError(pub regex::Error);

impl std::fmt::Display for PatternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "regex error: {}", self.0)
    }
}

impl std::error::Error for PatternError {}

/// A compiled regex pattern ready for matching.
///
/// `Arc` makes `Clone` a cheap reference-count bump instead of a recompile,
/// so the same pattern can be shared across a priority-sorted trigger/alias
/// list without re-parsing on every fire.
#[derive(Clone)]
pub struct Pattern {
    src: String,
    compiled: Arc<Regex>,
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pattern").field("src", &self.src).finish()
    }
}

impl Pattern {
    /// Compile `src` as a regex. Case-sensitive, `.` matches newlines (a MUD
    /// line is already newline-free by the time it reaches a pattern, but a
    /// multi-line trigger body shouldn't break matching mid-pattern).
    pub fn new(src: &str) -> Result<Self, PatternError> {
        let compiled = regex::RegexBuilder::new(src)
            .dot_matches_new_line(true)
            .build()
            .map_err(PatternError)?;
        Ok(Self {
            src: src.to_owned(),
            compiled: Arc::new(compiled),
        })
    }

    /// Compile `src`, matching case-insensitively.
    pub fn new_case_insensitive(src: &str) -> Result<Self, PatternError> {
        let compiled = regex::RegexBuilder::new(src)
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
            .map_err(PatternError)?;
        Ok(Self {
            src: src.to_owned(),
            compiled: Arc::new(compiled),
        })
    }

    /// The original source string.
    pub fn src(&self) -> &str {
        &self.src
    }

    /// Returns `true` if this pattern matches anywhere in `text`.
    pub fn matches(&self, text: &str) -> bool {
        self.compiled.is_match(text)
    }

    /// Attempt a match and return [`Captures`] on success.
    pub fn find<'t>(&self, text: &'t str) -> Option<Captures<'t>> {
        let caps = self.compiled.captures(text)?;
        let whole = caps.get(0).unwrap();
        let groups = (1..caps.len())
            .map(|i| caps.get(i).map(|m| (m.start(), m.end())))
            .collect();
        Some(Captures {
            text,
            start: whole.start(),
            end: whole.end(),
            groups,
        })
    }
}

/// The result of a successful pattern match with access to capture groups.
pub struct Captures<'t> {
    text: &'t str,
    start: usize,
    end: usize,
    /// (start, end) byte offsets per capture group; `None` = group didn't participate.
    groups: Vec<Option<(usize, usize)>>,
}

impl<'t> Captures<'t> {
    /// Text before the match.
    pub fn left(&self) -> &'t str {
        &self.text[..self.start]
    }

    /// The entire matched substring (group 0).
    pub fn whole(&self) -> &'t str {
        &self.text[self.start..self.end]
    }

    /// Text after the match.
    pub fn right(&self) -> &'t str {
        &self.text[self.end..]
    }

    /// The nth capture group, 1-based.
    pub fn group(&self, n: usize) -> Option<&'t str> {
        self.groups
            .get(n.checked_sub(1)?)?
            .as_ref()
            .map(|&(s, e)| &self.text[s..e])
    }

    /// Number of capture groups (excluding the overall match).
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Substitute `$0`..`$n` in `template` with the corresponding group
    /// (`$0` is the whole match). An out-of-range index is left literal.
    pub fn substitute(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let bytes = template.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'$' {
                let rest = &template[i + 1..];
                let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
                if !digits.is_empty() {
                    let n: usize = digits.parse().unwrap();
                    let replacement = if n == 0 { Some(self.whole()) } else { self.group(n) };
                    match replacement {
                        Some(s) => out.push_str(s),
                        None => {
                            out.push('$');
                            out.push_str(&digits);
                        }
                    }
                    i += 1 + digits.len();
                    continue;
                }
            }
            let ch_len = template[i..].chars().next().map(char::len_utf8).unwrap_or(1);
            out.push_str(&template[i..i + ch_len]);
            i += ch_len;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_match() {
        let p = Pattern::new("hello").unwrap();
        assert!(p.matches("say hello world"));
        assert!(!p.matches("goodbye"));
    }

    #[test]
    fn case_sensitive_by_default() {
        let p = Pattern::new("Hello").unwrap();
        assert!(p.matches("Hello"));
        assert!(!p.matches("hello"));
    }

    #[test]
    fn case_insensitive_variant() {
        let p = Pattern::new_case_insensitive("hello").unwrap();
        assert!(p.matches("HELLO"));
    }

    #[test]
    fn capture_groups() {
        let p = Pattern::new(r"(\w+)\s+(\w+)").unwrap();
        let caps = p.find("foo bar baz").unwrap();
        assert_eq!(caps.whole(), "foo bar");
        assert_eq!(caps.group(1), Some("foo"));
        assert_eq!(caps.group(2), Some("bar"));
        assert_eq!(caps.left(), "");
        assert_eq!(caps.right(), " baz");
    }

    #[test]
    fn dot_matches_newline() {
        let p = Pattern::new("a.b").unwrap();
        assert!(p.matches("a\nb"));
    }

    #[test]
    fn invalid_regex_errors() {
        assert!(Pattern::new("(unclosed").is_err());
    }

    #[test]
    fn substitute_whole_and_groups() {
        let p = Pattern::new(r"(\w+) hit (\w+)").unwrap();
        let caps = p.find("orc hit you").unwrap();
        assert_eq!(caps.substitute("$1 attacks $2"), "orc attacks you");
        assert_eq!(caps.substitute("whole: $0"), "whole: orc hit you");
    }

    #[test]
    fn substitute_out_of_range_left_literal() {
        let p = Pattern::new(r"(\w+)").unwrap();
        let caps = p.find("hi").unwrap();
        assert_eq!(caps.substitute("$5 missing"), "$5 missing");
    }
}
