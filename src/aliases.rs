//! Alias engine.
//!
//! Structurally a sibling of the trigger store (priority-sorted `Pattern`
//! list, same insertion-order tiebreak), but matches with full-string
//! anchoring and recursively expands through [`AliasStore::expand`] up to a
//! depth limit. The depth-counter technique -- not stack introspection --
//! guards against an alias that (directly or transitively) expands into
//! itself, bounded by a default limit of 8.

use crate::pattern::Pattern;

pub type AliasId = u64;

pub const DEFAULT_MAX_DEPTH: usize = 8;

#[derive(Debug, Clone)]
pub struct Alias {
    pub id: AliasId,
    pub pattern: Pattern,
    pub priority: i32,
    pub enabled: bool,
    pub commands: Vec<String>,
    seq: u64,
}

impl Alias {
    pub fn new(id: AliasId, pattern: Pattern, priority: i32) -> Self {
        Self {
            id,
            pattern,
            priority,
            enabled: true,
            commands: Vec::new(),
            seq: 0,
        }
    }
}

#[derive(Debug, Default)]
pub struct AliasStore {
    aliases: Vec<Alias>,
    next_seq: u64,
    max_depth: usize,
}

impl AliasStore {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            ..Self::default()
        }
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth,
            ..Self::default()
        }
    }

    pub fn add(&mut self, mut alias: Alias) {
        alias.seq = self.next_seq;
        self.next_seq += 1;
        let pos = self
            .aliases
            .iter()
            .position(|a| {
                a.priority < alias.priority || (a.priority == alias.priority && a.seq > alias.seq)
            })
            .unwrap_or(self.aliases.len());
        self.aliases.insert(pos, alias);
    }

    pub fn remove(&mut self, id: AliasId) -> bool {
        let before = self.aliases.len();
        self.aliases.retain(|a| a.id != id);
        self.aliases.len() != before
    }

    pub fn list(&self) -> &[Alias] {
        &self.aliases
    }

    /// Find the first (highest-priority) enabled alias whose pattern matches
    /// `cmd` in full.
    fn first_match(&self, cmd: &str) -> Option<(&Alias, crate::pattern::Captures<'_>)> {
        self.aliases.iter().filter(|a| a.enabled).find_map(|a| {
            let caps = a.pattern.find(cmd)?;
            if caps.left().is_empty() && caps.right().is_empty() {
                Some((a, caps))
            } else {
                None
            }
        })
    }

    /// Recursively expand `cmd` through matching aliases, up to the depth
    /// limit. Returns the final list of commands to send. Once depth is
    /// exceeded, the last unexpanded form is passed through unchanged.
    pub fn expand(&self, cmd: &str) -> Vec<String> {
        self.expand_at_depth(cmd, 0)
    }

    fn expand_at_depth(&self, cmd: &str, depth: usize) -> Vec<String> {
        if depth >= self.max_depth {
            tracing::debug!(max_depth = self.max_depth, cmd, "alias expansion depth limit reached, passing through unexpanded");
            return vec![cmd.to_string()];
        }
        let Some((alias, caps)) = self.first_match(cmd) else {
            return vec![cmd.to_string()];
        };
        let mut out = Vec::new();
        for template in &alias.commands {
            let expanded = caps.substitute(template);
            out.extend(self.expand_at_depth(&expanded, depth + 1));
        }
        out
    }
}
