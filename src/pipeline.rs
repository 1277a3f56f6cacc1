//! Pipeline orchestrator.
//!
//! Sequences telnet decoding, trigger evaluation, and tab routing for inbound
//! data, and alias expansion, variable substitution, and socket writes for
//! outbound commands, owning every collaborator for the process lifetime.
//! Follows a `handle_net_message`/per-line-event shape: accumulate per-line
//! trigger actions, merge gag/attr, push to the observable tabs unless
//! gagged, then continue downstream to triggers, the contextual command
//! queue, and tab routing inbound, and aliases, variables, and the
//! connection outbound.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::ansi::{strip_ansi, Styled};
use crate::config::Config;
use crate::connection::{ConnEvent, Connection, ConnectionState};
use crate::context_queue::{ContextQueue, RoomContext};
use crate::error::CoreError;
use crate::msdp::MsdpValue;
use crate::status::{StatusHub, TabSnapshot};
use crate::tabs::TabRouter;
use crate::triggers::TriggerStore;
use crate::var::{Source, VarStore, VarValue};

const ALIAS_HISTORY_CAP: usize = 200;

fn msdp_to_var(value: &MsdpValue) -> VarValue {
    match value {
        MsdpValue::String(s) => VarValue::String(s.clone()),
        MsdpValue::Array(items) => VarValue::List(items.iter().map(msdp_to_var).collect()),
        MsdpValue::Table(map) => {
            VarValue::Map(map.iter().map(|(k, v)| (k.clone(), msdp_to_var(v))).collect())
        }
    }
}

/// Owns the connection and every automation collaborator (variables,
/// triggers, aliases, tabs, context queue) for one MUD session.
pub struct Pipeline {
    connection: Connection,
    vars: VarStore,
    triggers: TriggerStore,
    aliases: crate::aliases::AliasStore,
    tabs: TabRouter,
    context: ContextQueue,
    status: Arc<StatusHub>,
    line_buf: String,
    alias_history: VecDeque<String>,
    room_ctx: RoomContext,
    msdp_snapshot: BTreeMap<String, MsdpValue>,
    gmcp_snapshot: BTreeMap<String, JsonValue>,
}

impl Pipeline {
    pub fn new(encoding_label: &str, status: Arc<StatusHub>) -> Self {
        Self {
            connection: Connection::new(encoding_label),
            vars: VarStore::new(),
            triggers: TriggerStore::new(),
            aliases: crate::aliases::AliasStore::new(),
            tabs: TabRouter::default(),
            context: ContextQueue::new(50),
            status,
            line_buf: String::new(),
            alias_history: VecDeque::new(),
            room_ctx: RoomContext::default(),
            msdp_snapshot: BTreeMap::new(),
            gmcp_snapshot: BTreeMap::new(),
        }
    }

    /// Build a pipeline pre-loaded from a parsed configuration document:
    /// triggers, aliases, tabs, context rules, and USER variables all come
    /// from `config`; the connection itself is dialed separately.
    pub fn from_config(config: Config, encoding_label: &str, status: Arc<StatusHub>) -> Self {
        Self {
            connection: Connection::new(encoding_label),
            vars: config.vars,
            triggers: config.triggers,
            aliases: config.aliases,
            tabs: config.tabs,
            context: config.context_rules,
            status,
            line_buf: String::new(),
            alias_history: VecDeque::new(),
            room_ctx: RoomContext::default(),
            msdp_snapshot: BTreeMap::new(),
            gmcp_snapshot: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Connect, run initial Telnet negotiation, and publish the resulting
    /// connection-state transition and sentinel banner line.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<(), CoreError> {
        self.status.set_connection_state(ConnectionState::Connecting);
        match self.connection.connect(host, port).await {
            Ok(()) => {
                self.status.set_connection_state(ConnectionState::Connected);
                self.deliver_system_line(&format!("[connected to {host}:{port}]"));
                Ok(())
            }
            Err(source) => {
                self.status.set_connection_state(ConnectionState::Disconnected);
                Err(CoreError::ConnectFailed { host: host.to_string(), port, source })
            }
        }
    }

    /// Idempotent disconnect; publishes the sentinel banner line and the
    /// resulting `Disconnected` state transition.
    pub fn disconnect(&mut self) {
        if self.connection.state() == ConnectionState::Disconnected {
            return;
        }
        self.connection.disconnect();
        self.status.set_connection_state(ConnectionState::Disconnected);
        self.deliver_system_line("[disconnected]");
    }

    /// Read and process exactly one chunk from the socket. Returns `false`
    /// on EOF (caller should treat the connection as closed).
    pub async fn pump(&mut self) -> Result<bool, CoreError> {
        match self.connection.recv().await {
            Ok(Some(events)) => {
                let mut commands = Vec::new();
                for event in events {
                    commands.extend(self.handle_conn_event(event));
                }
                self.status.set_text_buffer(self.connection.output_buffer().to_string());
                self.dispatch_trigger_commands(commands).await?;
                Ok(true)
            }
            Ok(None) => {
                self.disconnect();
                Ok(false)
            }
            Err(e) => {
                self.disconnect();
                Err(CoreError::Io(e))
            }
        }
    }

    /// Handle one decoded connection event, returning any commands the
    /// triggers fired while processing it (empty for non-text events) so
    /// the caller can dispatch them through the outbound path.
    fn handle_conn_event(&mut self, event: ConnEvent) -> Vec<String> {
        match event {
            ConnEvent::Text(text) => self.feed_text(&text),
            ConnEvent::Msdp(delta) => {
                self.apply_msdp_delta(delta);
                Vec::new()
            }
            ConnEvent::Gmcp(msg) => {
                self.apply_gmcp(msg);
                Vec::new()
            }
            ConnEvent::OptionChanged(_) => Vec::new(),
        }
    }

    /// Line assembly: accumulate characters until `\n` closes a line,
    /// stripping any trailing `\r`. Returns every command fired by a
    /// trigger across the lines completed by this call, in line order.
    fn feed_text(&mut self, text: &str) -> Vec<String> {
        let mut commands = Vec::new();
        for ch in text.chars() {
            if ch == '\n' {
                let mut line = std::mem::take(&mut self.line_buf);
                if line.ends_with('\r') {
                    line.pop();
                }
                commands.extend(self.process_line(&line));
            } else {
                self.line_buf.push(ch);
            }
        }
        commands
    }

    /// One complete server line through triggers, context rules, and tabs.
    /// Trigger-issued commands are dispatched
    /// through the same outbound path a user command would take, including
    /// alias expansion -- but those expanded commands never re-enter trigger
    /// evaluation, which would otherwise create a feedback loop.
    fn process_line(&mut self, raw_line: &str) -> Vec<String> {
        let (clean, ansi_attr) = strip_ansi(raw_line);
        let mut styled = Styled { raw: raw_line.to_string(), clean: clean.clone(), attr: ansi_attr };

        let outcome = self.triggers.evaluate(&clean);
        if let Some(colorize) = outcome.colorize {
            styled.attr |= colorize;
        }

        if !outcome.gagged {
            self.context.on_line(&clean, &self.room_ctx);
            self.tabs.route(&styled);
        }

        self.publish_automation_state();
        outcome.commands
    }

    fn apply_msdp_delta(&mut self, delta: BTreeMap<String, MsdpValue>) {
        for (name, value) in &delta {
            // MSDP names are conventionally upper case (ROOM, HEALTH);
            // store lower case so `${room.vnum}` substitution path lookups
            // (which only case-fold nested segments, not the head) resolve.
            self.vars.set(name.to_lowercase(), msdp_to_var(value), Source::Msdp);
        }
        self.msdp_snapshot.extend(delta);
        self.status.set_msdp_snapshot(self.msdp_snapshot.clone());
        self.publish_variables();
    }

    fn apply_gmcp(&mut self, msg: crate::gmcp::GmcpMessage) {
        self.gmcp_snapshot.insert(msg.package, msg.data);
        self.status.set_gmcp_snapshot(self.gmcp_snapshot.clone());
    }

    /// Write a locally-generated banner line (connect/disconnect sentinels)
    /// directly into the main tab, bypassing triggers -- these are not
    /// server-originated text.
    fn deliver_system_line(&mut self, text: &str) {
        let styled = Styled { raw: text.to_string(), clean: text.to_string(), attr: crate::attr::Attr::EMPTY };
        self.tabs.route(&styled);
        self.publish_automation_state();
    }

    fn publish_automation_state(&self) {
        self.publish_tabs();
        let triggers = self.triggers.list().iter().map(|t| (t.id, t.enabled, t.priority)).collect();
        self.status.set_triggers(triggers);
        let aliases = self.aliases.list().iter().map(|a| (a.id, a.enabled, a.priority)).collect();
        self.status.set_aliases(aliases);
        self.status.set_context_queue(self.context.queue().to_vec());
    }

    fn publish_tabs(&self) {
        let snapshots = self
            .tabs
            .tabs()
            .iter()
            .map(|t| TabSnapshot {
                id: t.id.clone(),
                unread: t.unread,
                lines: t.content().iter().cloned().collect(),
            })
            .collect();
        self.status.set_tabs(snapshots);
    }

    fn publish_variables(&self) {
        let vars = self.vars.entries().into_iter().map(|(name, v)| (name, v.value.format())).collect();
        self.status.set_variables(vars);
    }

    /// Outbound path: intercept internal directives, record alias history,
    /// expand through aliases, substitute through variables, and hand the
    /// result to the connection.
    pub async fn send_command(&mut self, cmd: &str) -> Result<(), CoreError> {
        if self.intercept_directive(cmd) {
            return Ok(());
        }

        self.alias_history.push_back(cmd.to_string());
        if self.alias_history.len() > ALIAS_HISTORY_CAP {
            self.alias_history.pop_front();
        }

        for expanded in self.aliases.expand(cmd) {
            let substituted = self.vars.substitute(&expanded);
            self.connection.send(&substituted).await?;
        }
        Ok(())
    }

    /// Dispatch every command a trigger just fired through the same outbound
    /// path a user-typed command would take.
    pub async fn dispatch_trigger_commands(&mut self, commands: Vec<String>) -> Result<(), CoreError> {
        for cmd in commands {
            self.send_command(&cmd).await?;
        }
        Ok(())
    }

    /// Process one complete server line, then dispatch any commands its
    /// triggers fired. Split from [`Self::process_line`] so tests can
    /// observe the synchronous automation effects independently of the
    /// async outbound dispatch.
    pub async fn handle_line(&mut self, raw_line: &str) -> Result<(), CoreError> {
        let commands = self.process_line(raw_line);
        self.dispatch_trigger_commands(commands).await
    }

    fn intercept_directive(&mut self, cmd: &str) -> bool {
        let trimmed = cmd.trim();
        if let Some(rest) = trimmed.strip_prefix("#var ") {
            let rest = rest.trim();
            match rest.split_once(char::is_whitespace) {
                Some((name, value)) => {
                    self.vars.set_str(name, value.trim(), Source::User);
                }
                None if !rest.is_empty() => {
                    self.vars.set_str(rest, "", Source::User);
                }
                None => {}
            }
            self.publish_variables();
            return true;
        }
        if let Some(name) = trimmed.strip_prefix("#unvar ") {
            self.vars.delete(name.trim(), Source::User);
            self.publish_variables();
            return true;
        }
        if trimmed == "#vars" || trimmed.starts_with("#vars ") {
            self.publish_variables();
            return true;
        }
        if let Some(id) = trimmed.strip_prefix("#sound ") {
            self.status.raise_sound(id.trim().to_string());
            return true;
        }
        false
    }

    /// Update the room/zone context used by the contextual command queue's
    /// scope matching, firing `Permanent` rules and expiring `UntilRoomChange`/
    /// `UntilZoneChange` entries as appropriate. Called by the mapper
    /// collaborator on a room-enter event.
    pub fn on_room_enter(&mut self, ctx: RoomContext) {
        let room_changed = self.room_ctx.room_id != ctx.room_id;
        let zone_changed = self.room_ctx.zone != ctx.zone;
        self.room_ctx = ctx;
        if room_changed {
            self.context.on_room_changed(self.room_ctx.room_id.as_deref());
        }
        if zone_changed {
            self.context.on_zone_changed(self.room_ctx.zone.as_deref());
        }
        self.context.on_room_enter(&self.room_ctx);
        self.status.set_context_queue(self.context.queue().to_vec());
    }

    /// Periodic sweep (run at least once a second) advancing `FixedTime` context
    /// entries toward expiry.
    pub fn tick_minute(&mut self) {
        self.context.tick_minute();
        self.status.set_context_queue(self.context.queue().to_vec());
    }

    pub fn vars(&self) -> &VarStore {
        &self.vars
    }

    pub fn vars_mut(&mut self) -> &mut VarStore {
        &mut self.vars
    }

    pub fn triggers_mut(&mut self) -> &mut TriggerStore {
        &mut self.triggers
    }

    pub fn aliases_mut(&mut self) -> &mut crate::aliases::AliasStore {
        &mut self.aliases
    }

    pub fn tabs(&self) -> &TabRouter {
        &self.tabs
    }

    pub fn tabs_mut(&mut self) -> &mut TabRouter {
        &mut self.tabs
    }

    pub fn context_queue_mut(&mut self) -> &mut ContextQueue {
        &mut self.context
    }

    pub fn status(&self) -> &Arc<StatusHub> {
        &self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::Pattern;
    use crate::triggers::Trigger;

    fn pipeline() -> Pipeline {
        Pipeline::new("utf-8", Arc::new(StatusHub::new()))
    }

    #[tokio::test]
    async fn trigger_match_routes_to_main_tab_and_fires_command() {
        let mut p = pipeline();
        let mut t = Trigger::new(1, Pattern::new(r"^(\w+) hits you").unwrap(), 10);
        t.commands.push("#var last_hit $1".to_string());
        p.triggers_mut().add(t);

        p.handle_line("orc hits you").await.unwrap();

        assert_eq!(p.vars().get_str("last_hit"), Some("orc".to_string()));
        let main = p.tabs().tab("main").unwrap();
        assert_eq!(main.content().back().unwrap().clean, "orc hits you");
    }

    #[tokio::test]
    async fn gagged_line_is_withheld_from_tabs_and_skips_context_rules() {
        let mut p = pipeline();
        let mut t = Trigger::new(1, Pattern::new("spam").unwrap(), 10);
        t.gag = true;
        p.triggers_mut().add(t);
        p.context_queue_mut().add_rule(crate::context_queue::ContextCommandRule::new(
            1,
            crate::context_queue::RuleTrigger::Pattern(Pattern::new("spam").unwrap()),
            crate::context_queue::Scope::World,
            "react",
            0,
        ));

        p.handle_line("this is spam").await.unwrap();

        assert_eq!(p.tabs().tab("main").unwrap().content().len(), 0);
        assert!(p.status().subscribe_context_queue().borrow().is_empty());
    }

    #[tokio::test]
    async fn var_directive_short_circuits_without_reaching_connection() {
        let mut p = pipeline();
        p.send_command("#var hp 100").await.unwrap();
        assert_eq!(p.vars().get_str("hp"), Some("100".to_string()));
    }

    #[tokio::test]
    async fn unvar_directive_deletes_user_variable() {
        let mut p = pipeline();
        p.vars_mut().set_str("hp", "100", Source::User);
        p.send_command("#unvar hp").await.unwrap();
        assert_eq!(p.vars().get_str("hp"), None);
    }

    #[tokio::test]
    async fn sound_directive_raises_observable_event() {
        let mut p = pipeline();
        let mut rx = p.status().subscribe_sound();
        p.send_command("#sound hit.wav").await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Some("hit.wav".to_string()));
    }

    #[test]
    fn msdp_delta_feeds_variable_store_and_snapshot() {
        let mut p = pipeline();
        let mut table = BTreeMap::new();
        table.insert("VNUM".to_string(), MsdpValue::String("5000".to_string()));
        let mut delta = BTreeMap::new();
        delta.insert("ROOM".to_string(), MsdpValue::Table(table));
        p.apply_msdp_delta(delta);

        assert_eq!(p.vars().get_by_path("room.vnum"), Some(VarValue::String("5000".to_string())));
    }

    #[test]
    fn gmcp_message_replaces_prior_snapshot_for_package() {
        let mut p = pipeline();
        p.apply_gmcp(crate::gmcp::GmcpMessage {
            package: "Char.Vitals".to_string(),
            data: serde_json::json!({"hp": 100}),
        });
        p.apply_gmcp(crate::gmcp::GmcpMessage {
            package: "Char.Vitals".to_string(),
            data: serde_json::json!({"hp": 90}),
        });
        let mut rx = p.status().subscribe_gmcp();
        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.get("Char.Vitals"), Some(&serde_json::json!({"hp": 90})));
    }

    #[tokio::test]
    async fn disconnect_without_connect_is_a_noop() {
        let mut p = pipeline();
        p.disconnect();
        assert_eq!(p.state(), ConnectionState::Disconnected);
    }
}
