//! Status & observable state.
//!
//! Exposes every piece of mutable core state as a `tokio::sync::watch`
//! channel: "latest value, many non-blocking subscribers" is exactly what
//! a UI observer needs (immutable snapshots, producers that never block on a
//! slow or absent reader), and `watch` is already part of the `sync`
//! feature this crate pulls in for the connection manager's write
//! serialization.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;
use tokio::sync::watch;

use crate::connection::ConnectionState;
use crate::context_queue::ContextCommand;
use crate::msdp::MsdpValue;

/// A read-only view of one tab's observable state, decoupled from the live
/// [`crate::tabs::Tab`] so subscribers get an owned snapshot rather than a
/// borrow into the pipeline's state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TabSnapshot {
    pub id: String,
    pub unread: bool,
    pub lines: Vec<crate::ansi::Styled>,
}

/// One named watch facet: holds the sender and hands out receivers.
struct Facet<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> Facet<T> {
    fn new(initial: T) -> Self {
        Self { tx: watch::Sender::new(initial) }
    }

    fn set(&self, value: T) {
        // `watch::Sender::send` only errors when every receiver has been
        // dropped; producers must never block or fail on that, so the
        // result is deliberately ignored.
        let _ = self.tx.send(value);
    }

    fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

/// The full set of observable state streams the pipeline orchestrator
/// publishes to. One [`StatusHub`] is shared for the lifetime of the
/// process; each connection attempt updates the same facets in place.
pub struct StatusHub {
    connection_state: Facet<ConnectionState>,
    text_buffer: Facet<String>,
    msdp_snapshot: Facet<BTreeMap<String, MsdpValue>>,
    gmcp_snapshot: Facet<BTreeMap<String, JsonValue>>,
    tabs: Facet<Vec<TabSnapshot>>,
    variables: Facet<Vec<(String, String)>>,
    triggers: Facet<Vec<(u64, bool, i32)>>,
    aliases: Facet<Vec<(u64, bool, i32)>>,
    context_queue: Facet<Vec<ContextCommand>>,
    /// Last `#sound` directive raised for the audio collaborator.
    /// Every `set` bumps the watch version even on a repeated sound id, so a
    /// replayed sound still notifies subscribers.
    sound: Facet<Option<String>>,
}

impl Default for StatusHub {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusHub {
    pub fn new() -> Self {
        Self {
            connection_state: Facet::new(ConnectionState::Disconnected),
            text_buffer: Facet::new(String::new()),
            msdp_snapshot: Facet::new(BTreeMap::new()),
            gmcp_snapshot: Facet::new(BTreeMap::new()),
            tabs: Facet::new(Vec::new()),
            variables: Facet::new(Vec::new()),
            triggers: Facet::new(Vec::new()),
            aliases: Facet::new(Vec::new()),
            context_queue: Facet::new(Vec::new()),
            sound: Facet::new(None),
        }
    }

    pub fn set_connection_state(&self, s: ConnectionState) {
        self.connection_state.set(s);
    }
    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection_state.subscribe()
    }

    /// Raw connection-level transcript, updated from [`crate::connection::Protocol`]'s
    /// `OutputBuffer` on every read: unlike the "main" tab in
    /// [`Self::subscribe_tabs`], this stream is not gag-filtered and is not
    /// assembled into discrete lines.
    pub fn set_text_buffer(&self, text: String) {
        self.text_buffer.set(text);
    }
    pub fn subscribe_text_buffer(&self) -> watch::Receiver<String> {
        self.text_buffer.subscribe()
    }

    pub fn set_msdp_snapshot(&self, snapshot: BTreeMap<String, MsdpValue>) {
        self.msdp_snapshot.set(snapshot);
    }
    pub fn subscribe_msdp(&self) -> watch::Receiver<BTreeMap<String, MsdpValue>> {
        self.msdp_snapshot.subscribe()
    }

    pub fn set_gmcp_snapshot(&self, snapshot: BTreeMap<String, JsonValue>) {
        self.gmcp_snapshot.set(snapshot);
    }
    pub fn subscribe_gmcp(&self) -> watch::Receiver<BTreeMap<String, JsonValue>> {
        self.gmcp_snapshot.subscribe()
    }

    pub fn set_tabs(&self, tabs: Vec<TabSnapshot>) {
        self.tabs.set(tabs);
    }
    pub fn subscribe_tabs(&self) -> watch::Receiver<Vec<TabSnapshot>> {
        self.tabs.subscribe()
    }

    pub fn set_variables(&self, vars: Vec<(String, String)>) {
        self.variables.set(vars);
    }
    pub fn subscribe_variables(&self) -> watch::Receiver<Vec<(String, String)>> {
        self.variables.subscribe()
    }

    /// `(id, enabled, priority)` per trigger, in evaluation order.
    pub fn set_triggers(&self, triggers: Vec<(u64, bool, i32)>) {
        self.triggers.set(triggers);
    }
    pub fn subscribe_triggers(&self) -> watch::Receiver<Vec<(u64, bool, i32)>> {
        self.triggers.subscribe()
    }

    pub fn set_aliases(&self, aliases: Vec<(u64, bool, i32)>) {
        self.aliases.set(aliases);
    }
    pub fn subscribe_aliases(&self) -> watch::Receiver<Vec<(u64, bool, i32)>> {
        self.aliases.subscribe()
    }

    pub fn set_context_queue(&self, queue: Vec<ContextCommand>) {
        self.context_queue.set(queue);
    }
    pub fn subscribe_context_queue(&self) -> watch::Receiver<Vec<ContextCommand>> {
        self.context_queue.subscribe()
    }

    pub fn raise_sound(&self, sound_id: String) {
        self.sound.set(Some(sound_id));
    }
    pub fn subscribe_sound(&self) -> watch::Receiver<Option<String>> {
        self.sound.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_sees_initial_value_before_any_set() {
        let hub = StatusHub::new();
        let rx = hub.subscribe_connection_state();
        assert_eq!(*rx.borrow(), ConnectionState::Disconnected);
    }

    #[test]
    fn set_is_observable_without_blocking() {
        let hub = StatusHub::new();
        let mut rx = hub.subscribe_text_buffer();
        hub.set_text_buffer("hello".to_string());
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), "hello");
    }

    #[test]
    fn multiple_subscribers_independently_track_changes() {
        let hub = StatusHub::new();
        let mut a = hub.subscribe_connection_state();
        let mut b = hub.subscribe_connection_state();
        hub.set_connection_state(ConnectionState::Connected);
        assert!(a.has_changed().unwrap());
        assert!(b.has_changed().unwrap());
        a.borrow_and_update();
        hub.set_connection_state(ConnectionState::Closing);
        assert!(a.has_changed().unwrap());
        assert!(b.has_changed().unwrap());
    }

    #[test]
    fn repeated_sound_id_still_notifies() {
        let hub = StatusHub::new();
        let mut rx = hub.subscribe_sound();
        hub.raise_sound("hit.wav".to_string());
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();
        hub.raise_sound("hit.wav".to_string());
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn send_after_all_receivers_dropped_does_not_panic() {
        let hub = StatusHub::new();
        {
            let _rx = hub.subscribe_connection_state();
        }
        hub.set_connection_state(ConnectionState::Connecting);
    }
}
