//! Trigger engine.
//!
//! A priority-sorted trigger list: stable sort by descending priority, ties
//! broken by insertion order. Every enabled, non-exhausted match fires, in
//! priority order, with no fallthrough flag and no randomness -- a
//! deliberately simpler dispatch than a fallthrough/random-pick scheme.

use crate::attr::Attr;
use crate::pattern::Pattern;

pub type TriggerId = u64;

/// One compiled trigger rule.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub id: TriggerId,
    pub pattern: Pattern,
    pub priority: i32,
    pub enabled: bool,
    pub once: bool,
    pub gag: bool,
    pub colorize: Option<Attr>,
    pub commands: Vec<String>,
    /// Monotonic insertion sequence, used to break priority ties.
    seq: u64,
}

/// The accumulated effect of evaluating all triggers against one line.
#[derive(Debug, Default, Clone)]
pub struct TriggerOutcome {
    pub gagged: bool,
    pub colorize: Option<Attr>,
    pub fired: Vec<TriggerId>,
    /// Raw command strings emitted by matching triggers, in firing order.
    pub commands: Vec<String>,
}

/// Holds the priority-ordered trigger list and per-trigger "already fired"
/// state for `once` triggers.
#[derive(Debug, Default)]
pub struct TriggerStore {
    triggers: Vec<Trigger>,
    next_seq: u64,
    fired_once: std::collections::HashSet<TriggerId>,
}

impl TriggerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a trigger, keeping the list sorted by descending priority with
    /// ties broken by insertion order.
    pub fn add(&mut self, mut trigger: Trigger) {
        trigger.seq = self.next_seq;
        self.next_seq += 1;
        let pos = self
            .triggers
            .iter()
            .position(|t| {
                t.priority < trigger.priority
                    || (t.priority == trigger.priority && t.seq > trigger.seq)
            })
            .unwrap_or(self.triggers.len());
        self.triggers.insert(pos, trigger);
    }

    pub fn remove(&mut self, id: TriggerId) -> bool {
        let before = self.triggers.len();
        self.triggers.retain(|t| t.id != id);
        self.triggers.len() != before
    }

    pub fn set_enabled(&mut self, id: TriggerId, enabled: bool) {
        if let Some(t) = self.triggers.iter_mut().find(|t| t.id == id) {
            t.enabled = enabled;
        }
    }

    pub fn list(&self) -> &[Trigger] {
        &self.triggers
    }

    /// Evaluate every enabled, non-exhausted trigger against `clean_line` (the
    /// ANSI-stripped form) in priority order. Matching triggers accumulate
    /// gag (OR), colorize (last writer among matches wins), and their
    /// expanded commands.
    pub fn evaluate(&mut self, clean_line: &str) -> TriggerOutcome {
        let mut outcome = TriggerOutcome::default();
        for trigger in &self.triggers {
            if !trigger.enabled {
                continue;
            }
            if trigger.once && self.fired_once.contains(&trigger.id) {
                continue;
            }
            let Some(caps) = trigger.pattern.find(clean_line) else {
                continue;
            };
            if trigger.once {
                self.fired_once.insert(trigger.id);
            }
            outcome.fired.push(trigger.id);
            outcome.gagged |= trigger.gag;
            if let Some(c) = trigger.colorize {
                outcome.colorize = Some(c);
            }
            for template in &trigger.commands {
                outcome.commands.push(caps.substitute(template));
            }
        }
        outcome
    }
}

impl Trigger {
    pub fn new(id: TriggerId, pattern: Pattern, priority: i32) -> Self {
        Self {
            id,
            pattern,
            priority,
            enabled: true,
            once: false,
            gag: false,
            colorize: None,
            commands: Vec::new(),
            seq: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trig(id: TriggerId, pat: &str, priority: i32) -> Trigger {
        Trigger::new(id, Pattern::new(pat).unwrap(), priority)
    }

    #[test]
    fn higher_priority_fires_first_in_fired_order() {
        let mut store = TriggerStore::new();
        store.add(trig(1, "hp", 5));
        store.add(trig(2, "^hp:", 10));
        let outcome = store.evaluate("hp: 10/100");
        assert_eq!(outcome.fired, vec![2, 1]);
    }

    #[test]
    fn equal_priority_ties_broken_by_insertion_order() {
        let mut store = TriggerStore::new();
        store.add(trig(1, "hp", 5));
        store.add(trig(2, "hp", 5));
        let outcome = store.evaluate("hp: 10/100");
        assert_eq!(outcome.fired, vec![1, 2]);
    }

    #[test]
    fn all_matches_fire_unconditionally() {
        // Every enabled non-exhausted match fires unconditionally, no
        // fallthrough flag and no random top-priority selection.
        let mut store = TriggerStore::new();
        store.add(trig(1, "a", 10));
        store.add(trig(2, "a", 10));
        store.add(trig(3, "a", 10));
        let outcome = store.evaluate("aaa");
        assert_eq!(outcome.fired, vec![1, 2, 3]);
    }

    #[test]
    fn disabled_trigger_never_fires() {
        let mut store = TriggerStore::new();
        let mut t = trig(1, "hp", 5);
        t.enabled = false;
        store.add(t);
        let outcome = store.evaluate("hp: 10/100");
        assert!(outcome.fired.is_empty());
    }

    #[test]
    fn once_trigger_fires_only_once() {
        let mut store = TriggerStore::new();
        let mut t = trig(1, "hp", 5);
        t.once = true;
        store.add(t);
        let first = store.evaluate("hp: 10/100");
        let second = store.evaluate("hp: 10/100");
        assert_eq!(first.fired, vec![1]);
        assert!(second.fired.is_empty());
    }

    #[test]
    fn gag_accumulates_across_matches() {
        // A higher-priority colorize trigger and a lower-priority gag trigger
        // both match -- the line ends up both colorized (by the
        // higher-priority rule) and gagged.
        let mut store = TriggerStore::new();
        let mut hi = trig(1, "^hp:", 10);
        hi.colorize = Some(Attr::BOLD);
        let mut lo = trig(2, "hp", 5);
        lo.gag = true;
        store.add(hi);
        store.add(lo);

        let outcome = store.evaluate("hp: 10/100");
        assert!(outcome.gagged);
        assert_eq!(outcome.colorize, Some(Attr::BOLD));
        assert_eq!(outcome.fired, vec![1, 2]);
    }

    #[test]
    fn colorize_last_writer_wins_among_matches_in_fire_order() {
        let mut store = TriggerStore::new();
        let mut first = trig(1, "a", 10);
        first.colorize = Some(Attr::BOLD);
        let mut second = trig(2, "a", 5);
        second.colorize = Some(Attr::ITALIC);
        store.add(first);
        store.add(second);
        let outcome = store.evaluate("aaa");
        assert_eq!(outcome.colorize, Some(Attr::ITALIC));
    }

    #[test]
    fn command_expansion_substitutes_groups() {
        let mut store = TriggerStore::new();
        let mut t = trig(1, r"^(\w+) hits you", 10);
        t.commands.push("retaliate $1".to_string());
        store.add(t);
        let outcome = store.evaluate("orc hits you");
        assert_eq!(outcome.commands, vec!["retaliate orc".to_string()]);
    }

    #[test]
    fn non_matching_trigger_contributes_nothing() {
        let mut store = TriggerStore::new();
        store.add(trig(1, "nomatch", 10));
        let outcome = store.evaluate("hello world");
        assert!(outcome.fired.is_empty());
        assert!(!outcome.gagged);
    }
}
