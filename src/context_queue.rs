//! Contextual command queue.
//!
//! A freshest-first, deduplicated, TTL-governed queue of room/zone-scoped
//! one-key commands: re-adding a command string removes its prior occurrence
//! before pushing the fresh one to the front, and the priority-sorted rule
//! list reuses the same stable-sort convention as the trigger and alias
//! stores.

use crate::pattern::Pattern;

pub type RuleId = u64;
pub type CommandId = u64;

/// Where a pattern rule is allowed to fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    World,
    Room { ids: Vec<String>, tags: Vec<String> },
    Zone { names: Vec<String> },
}

/// What triggers a rule: a regex against the incoming line, or unconditional
/// firing on room-enter.
#[derive(Debug, Clone)]
pub enum RuleTrigger {
    Pattern(Pattern),
    Permanent,
}

#[derive(Debug, Clone)]
pub struct ContextCommandRule {
    pub id: RuleId,
    pub enabled: bool,
    pub trigger: RuleTrigger,
    pub scope: Scope,
    pub command: String,
    pub priority: i32,
    seq: u64,
}

impl ContextCommandRule {
    pub fn new(id: RuleId, trigger: RuleTrigger, scope: Scope, command: impl Into<String>, priority: i32) -> Self {
        Self {
            id,
            enabled: true,
            trigger,
            scope,
            command: command.into(),
            priority,
            seq: 0,
        }
    }
}

/// How long a queued command remains valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    UntilRoomChange,
    UntilZoneChange,
    /// Minutes until expiry, checked on the periodic sweep.
    FixedTime(u32),
    Permanent,
    OneTime,
}

#[derive(Debug, Clone)]
pub struct ContextCommand {
    pub id: CommandId,
    pub command: String,
    pub source: RuleId,
    pub ttl: Ttl,
    pub room_id_when_added: Option<String>,
    pub zone_when_added: Option<String>,
    /// Minutes elapsed since being added, advanced by the periodic sweep.
    age_minutes: u32,
}

/// Caller-supplied "where are we now" context, used for scope matching and
/// TTL expiry.
#[derive(Debug, Clone, Default)]
pub struct RoomContext {
    pub room_id: Option<String>,
    pub room_tags: Vec<String>,
    pub zone: Option<String>,
}

fn scope_matches(scope: &Scope, ctx: &RoomContext) -> bool {
    match scope {
        Scope::World => true,
        Scope::Room { ids, tags } => {
            let id_match = ctx.room_id.as_ref().is_some_and(|id| ids.iter().any(|s| s == id));
            let tag_match = tags.iter().any(|t| ctx.room_tags.contains(t));
            id_match || tag_match
        }
        Scope::Zone { names } => ctx.zone.as_ref().is_some_and(|z| names.iter().any(|n| n == z)),
    }
}

/// The bounded, TTL-governed queue plus the rule set that populates it.
#[derive(Debug)]
pub struct ContextQueue {
    rules: Vec<ContextCommandRule>,
    /// Newest entry at index 0.
    queue: Vec<ContextCommand>,
    max_queue_size: usize,
    next_seq: u64,
    next_command_id: CommandId,
}

impl ContextQueue {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            rules: Vec::new(),
            queue: Vec::new(),
            max_queue_size: max_queue_size.max(1),
            next_seq: 0,
            next_command_id: 0,
        }
    }

    pub fn add_rule(&mut self, mut rule: ContextCommandRule) {
        rule.seq = self.next_seq;
        self.next_seq += 1;
        let pos = self
            .rules
            .iter()
            .position(|r| r.priority < rule.priority || (r.priority == rule.priority && r.seq > rule.seq))
            .unwrap_or(self.rules.len());
        self.rules.insert(pos, rule);
    }

    pub fn queue(&self) -> &[ContextCommand] {
        &self.queue
    }

    /// Push `command` to the front (position 0), removing any prior
    /// occurrence of the same command string first, then evict from the
    /// tail if over capacity.
    fn enqueue(&mut self, command: String, source: RuleId, ttl: Ttl, ctx: &RoomContext) {
        self.queue.retain(|c| c.command != command);
        let id = self.next_command_id;
        self.next_command_id += 1;
        self.queue.insert(
            0,
            ContextCommand {
                id,
                command,
                source,
                ttl,
                room_id_when_added: ctx.room_id.clone(),
                zone_when_added: ctx.zone.clone(),
                age_minutes: 0,
            },
        );
        while self.queue.len() > self.max_queue_size {
            self.queue.pop();
        }
    }

    /// Evaluate pattern rules against one incoming line.
    pub fn on_line(&mut self, clean_line: &str, ctx: &RoomContext) {
        let matches: Vec<(RuleId, String, Ttl)> = self
            .rules
            .iter()
            .filter(|r| r.enabled && scope_matches(&r.scope, ctx))
            .filter_map(|r| {
                let RuleTrigger::Pattern(pattern) = &r.trigger else {
                    return None;
                };
                let caps = pattern.find(clean_line)?;
                Some((r.id, caps.substitute(&r.command), ttl_for_scope(&r.scope)))
            })
            .collect();
        for (source, command, ttl) in matches {
            self.enqueue(command, source, ttl, ctx);
        }
    }

    /// Fire permanent rules on a room-enter event.
    pub fn on_room_enter(&mut self, ctx: &RoomContext) {
        let matches: Vec<(RuleId, String, Ttl)> = self
            .rules
            .iter()
            .filter(|r| r.enabled && matches!(r.trigger, RuleTrigger::Permanent) && scope_matches(&r.scope, ctx))
            .map(|r| (r.id, r.command.clone(), ttl_for_scope(&r.scope)))
            .collect();
        for (source, command, ttl) in matches {
            self.enqueue(command, source, ttl, ctx);
        }
    }

    /// Drop entries invalidated by a room change.
    pub fn on_room_changed(&mut self, new_room_id: Option<&str>) {
        self.queue.retain(|c| {
            !(c.ttl == Ttl::UntilRoomChange && c.room_id_when_added.as_deref() != new_room_id)
        });
    }

    /// Drop entries invalidated by a zone change.
    pub fn on_zone_changed(&mut self, new_zone: Option<&str>) {
        self.queue.retain(|c| {
            !(c.ttl == Ttl::UntilZoneChange && c.zone_when_added.as_deref() != new_zone)
        });
    }

    /// Periodic sweep (run at least once a second); advances `FixedTime` ages and expires
    /// entries whose minutes have elapsed.
    pub fn tick_minute(&mut self) {
        for c in &mut self.queue {
            if let Ttl::FixedTime(_) = c.ttl {
                c.age_minutes += 1;
            }
        }
        self.queue.retain(|c| match c.ttl {
            Ttl::FixedTime(limit) => c.age_minutes < limit,
            _ => true,
        });
    }

    /// Execute the command at newest-first index `i`. Returns the command
    /// string to send. `OneTime` entries are removed after execution.
    pub fn execute(&mut self, index: usize) -> Option<String> {
        let command = self.queue.get(index)?.command.clone();
        if self.queue[index].ttl == Ttl::OneTime {
            self.queue.remove(index);
        }
        Some(command)
    }
}

fn ttl_for_scope(scope: &Scope) -> Ttl {
    match scope {
        Scope::Room { .. } => Ttl::UntilRoomChange,
        Scope::Zone { .. } => Ttl::UntilZoneChange,
        Scope::World => Ttl::Permanent,
    }
}
