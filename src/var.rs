//! Priority-sourced variable store.
//!
//! Generalizes the flat `HashMap<String, String>` this module used to be
//! into a recursively-typed, priority-ranked store: each name can hold at
//! most one value per [`Source`], reads return the entry whose source has
//! the lowest numeric rank, and a write is rejected if a higher-priority
//! (lower-rank) source already holds the name.

use std::collections::BTreeMap;

/// Where a variable's current value came from. Lower rank wins reads and
/// blocks writes from higher-rank (numerically larger) sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Source {
    System,
    Msdp,
    Status,
    User,
}

impl Source {
    fn rank(self) -> u8 {
        match self {
            Source::System => 0,
            Source::Msdp => 1,
            Source::Status => 2,
            Source::User => 3,
        }
    }
}

/// A variable's value: a scalar string, or a recursive map/list of the same.
#[derive(Debug, Clone, PartialEq)]
pub enum VarValue {
    String(String),
    Map(BTreeMap<String, VarValue>),
    List(Vec<VarValue>),
}

impl VarValue {
    /// Render for substitution: scalars print verbatim, containers print a
    /// short debug-ish form (full structural formatting is out of scope here --
    /// substitution targets are almost always scalars).
    pub fn format(&self) -> String {
        match self {
            VarValue::String(s) => s.clone(),
            VarValue::Map(m) => format!(
                "{{{}}}",
                m.iter()
                    .map(|(k, v)| format!("{k}={}", v.format()))
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            VarValue::List(l) => format!(
                "[{}]",
                l.iter().map(VarValue::format).collect::<Vec<_>>().join(",")
            ),
        }
    }

    fn get_path(&self, segment: &str) -> Option<&VarValue> {
        match self {
            VarValue::Map(m) => m
                .get(segment)
                .or_else(|| m.get(&segment.to_lowercase()))
                .or_else(|| m.get(&segment.to_uppercase())),
            VarValue::List(l) => segment.parse::<usize>().ok().and_then(|i| l.get(i)),
            VarValue::String(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    source: Source,
    value: VarValue,
}

/// A resolved variable read: the value and the source it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub value: VarValue,
    pub source: Source,
}

/// Global variable store.
///
/// Each name maps to at most one entry per source; [`VarStore::get`] exposes
/// only the lowest-rank (highest-priority) entry present.
#[derive(Debug, Default)]
pub struct VarStore {
    vars: BTreeMap<String, Vec<Entry>>,
}

impl VarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every name's highest-priority (lowest-rank) entry, for observers
    /// (the observable variable-map stream) rather than for substitution or lookup.
    pub fn entries(&self) -> Vec<(String, Variable)> {
        self.vars
            .iter()
            .filter_map(|(name, entries)| {
                entries
                    .iter()
                    .min_by_key(|e| e.source.rank())
                    .map(|e| (name.clone(), Variable { value: e.value.clone(), source: e.source }))
            })
            .collect()
    }

    /// Set a variable from `source`. Fails (returns `false`, no-op) if an
    /// entry from a strictly higher-priority (lower-rank) source already
    /// exists for `name`.
    pub fn set(&mut self, name: impl Into<String>, value: VarValue, source: Source) -> bool {
        let name = name.into();
        let entries = self.vars.entry(name).or_default();
        if entries.iter().any(|e| e.source.rank() < source.rank()) {
            return false;
        }
        if let Some(existing) = entries.iter_mut().find(|e| e.source == source) {
            existing.value = value;
        } else {
            entries.push(Entry { source, value });
        }
        true
    }

    /// Convenience wrapper for setting a plain string value.
    pub fn set_str(&mut self, name: impl Into<String>, value: impl Into<String>, source: Source) -> bool {
        self.set(name, VarValue::String(value.into()), source)
    }

    /// Get the highest-priority (lowest-rank) entry for `name`.
    pub fn get(&self, name: &str) -> Option<Variable> {
        let entries = self.vars.get(name)?;
        entries
            .iter()
            .min_by_key(|e| e.source.rank())
            .map(|e| Variable {
                value: e.value.clone(),
                source: e.source,
            })
    }

    /// Get the string form of a variable's value, for direct lookups.
    pub fn get_str(&self, name: &str) -> Option<String> {
        self.get(name).map(|v| v.value.format())
    }

    /// Resolve a dotted path (`room.exits.0`) against the top-level name's
    /// highest-priority value.
    pub fn get_by_path(&self, path: &str) -> Option<VarValue> {
        let mut parts = path.split('.');
        let head = parts.next()?;
        let mut current = self.get(head)?.value;
        for segment in parts {
            current = current.get_path(segment)?.clone();
        }
        Some(current)
    }

    /// Delete the entry owned by `source` for `name`. Returns `true` if an
    /// entry was removed. A caller may only delete the entry belonging to
    /// its own source.
    pub fn delete(&mut self, name: &str, source: Source) -> bool {
        let Some(entries) = self.vars.get_mut(name) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.source != source);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.vars.remove(name);
        }
        removed
    }

    /// Remove every entry belonging to `source`, across all names.
    pub fn clear_by_source(&mut self, source: Source) {
        self.vars.retain(|_, entries| {
            entries.retain(|e| e.source != source);
            !entries.is_empty()
        });
    }

    /// Single left-to-right substitution pass over `${name.path}` and
    /// `@name` tokens. Substituted text is never re-scanned; unresolved
    /// tokens are left literal.
    pub fn substitute(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let bytes = text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
                if let Some(end) = text[i + 2..].find('}') {
                    let path = &text[i + 2..i + 2 + end];
                    match self.get_by_path(path) {
                        Some(v) => out.push_str(&v.format()),
                        None => out.push_str(&text[i..i + 2 + end + 1]),
                    }
                    i += 2 + end + 1;
                    continue;
                }
                out.push(bytes[i] as char);
                i += 1;
            } else if bytes[i] == b'@' {
                let rest = &text[i + 1..];
                let ident_len = rest
                    .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                    .unwrap_or(rest.len());
                if ident_len == 0 {
                    out.push('@');
                    i += 1;
                    continue;
                }
                let name = &rest[..ident_len];
                match self.get(name) {
                    Some(v) => out.push_str(&v.value.format()),
                    None => {
                        out.push('@');
                        out.push_str(name);
                    }
                }
                i += 1 + ident_len;
            } else {
                // Advance by one UTF-8 char, not one byte.
                let ch_len = text[i..].chars().next().map(char::len_utf8).unwrap_or(1);
                out.push_str(&text[i..i + ch_len]);
                i += ch_len;
            }
        }
        out
    }
}
