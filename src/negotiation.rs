//! Telnet option negotiation.
//!
//! Tracks our/their announced state per option across two small tables
//! rather than a `[bool; 256]`, scoped to the four options this crate cares
//! about: TERMINAL_TYPE, NAWS, MSDP, GMCP. Every other option is answered
//! with a blanket refusal (`WONT`/`DONT`) so the server stops re-asking.

use crate::telnet::{opt, CommandKind, DO, DONT, IAC, WILL, WONT};

/// Per-option local policy: do we want it enabled, and in which
/// direction(s) do we answer an incoming negotiation command?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Policy {
    /// We never originate, but we accept the server asking us to enable it
    /// (`DO` -> `WILL`): TERMINAL_TYPE, NAWS, client-side options.
    AcceptDo,
    /// We never originate, but we accept the server offering to send it
    /// (`WILL` -> `DO`): GMCP, a server-side option we only consume.
    AcceptWill,
    /// We advertise the option ourselves (`WILL`) *and* consume it from the
    /// server (`WILL` -> `DO`), so we must also answer an incoming `DO` with
    /// `WILL` instead of retracting our own advertisement: MSDP, which we
    /// both offer and accept in either direction.
    AcceptBoth,
}

fn policy_for(option: u8) -> Option<Policy> {
    match option {
        opt::TERMINAL_TYPE | opt::NAWS => Some(Policy::AcceptDo),
        opt::MSDP => Some(Policy::AcceptBoth),
        opt::GMCP => Some(Policy::AcceptWill),
        _ => None,
    }
}

/// Tracks which of the four known options are currently active in each
/// direction, and produces the reply bytes for an incoming negotiation
/// command.
#[derive(Debug, Default)]
pub struct Negotiator {
    /// Options the server has turned on for itself (it sent `WILL`, we `DO`).
    server_will: [bool; 256],
    /// Options we have turned on for ourselves (server sent `DO`, we `WILL`).
    self_will: [bool; 256],
}

/// A side effect the negotiator wants performed in addition to sending the
/// reply bytes: an option changed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionEvent {
    ServerEnabled(u8),
    ServerDisabled(u8),
    SelfEnabled(u8),
    SelfDisabled(u8),
}

impl Negotiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_server_option_active(&self, option: u8) -> bool {
        self.server_will[option as usize]
    }

    pub fn is_self_option_active(&self, option: u8) -> bool {
        self.self_will[option as usize]
    }

    /// Process one `IAC <cmd> <option>` and return the reply bytes to send
    /// (may be empty) plus any state-change event.
    pub fn receive(&mut self, kind: CommandKind, option: u8) -> (Vec<u8>, Option<OptionEvent>) {
        match kind {
            CommandKind::Will => self.receive_will(option),
            CommandKind::Wont => self.receive_wont(option),
            CommandKind::Do => self.receive_do(option),
            CommandKind::Dont => self.receive_dont(option),
        }
    }

    fn receive_will(&mut self, option: u8) -> (Vec<u8>, Option<OptionEvent>) {
        if self.server_will[option as usize] {
            return (Vec::new(), None);
        }
        match policy_for(option) {
            Some(Policy::AcceptWill) | Some(Policy::AcceptBoth) => {
                self.server_will[option as usize] = true;
                (
                    vec![IAC, DO, option],
                    Some(OptionEvent::ServerEnabled(option)),
                )
            }
            _ => (vec![IAC, DONT, option], None),
        }
    }

    fn receive_wont(&mut self, option: u8) -> (Vec<u8>, Option<OptionEvent>) {
        let was_active = self.server_will[option as usize];
        self.server_will[option as usize] = false;
        let event = was_active.then_some(OptionEvent::ServerDisabled(option));
        (Vec::new(), event)
    }

    fn receive_do(&mut self, option: u8) -> (Vec<u8>, Option<OptionEvent>) {
        if self.self_will[option as usize] {
            return (Vec::new(), None);
        }
        match policy_for(option) {
            Some(Policy::AcceptDo) | Some(Policy::AcceptBoth) => {
                self.self_will[option as usize] = true;
                (
                    vec![IAC, WILL, option],
                    Some(OptionEvent::SelfEnabled(option)),
                )
            }
            _ => (vec![IAC, WONT, option], None),
        }
    }

    fn receive_dont(&mut self, option: u8) -> (Vec<u8>, Option<OptionEvent>) {
        let was_active = self.self_will[option as usize];
        self.self_will[option as usize] = false;
        let event = was_active.then_some(OptionEvent::SelfDisabled(option));
        (Vec::new(), event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_msdp_will() {
        let mut n = Negotiator::new();
        let (reply, ev) = n.receive(CommandKind::Will, opt::MSDP);
        assert_eq!(reply, vec![IAC, DO, opt::MSDP]);
        assert_eq!(ev, Some(OptionEvent::ServerEnabled(opt::MSDP)));
        assert!(n.is_server_option_active(opt::MSDP));
    }

    #[test]
    fn accepts_gmcp_will() {
        let mut n = Negotiator::new();
        let (reply, _) = n.receive(CommandKind::Will, opt::GMCP);
        assert_eq!(reply, vec![IAC, DO, opt::GMCP]);
    }

    #[test]
    fn refuses_unknown_will() {
        let mut n = Negotiator::new();
        let (reply, ev) = n.receive(CommandKind::Will, 99);
        assert_eq!(reply, vec![IAC, DONT, 99]);
        assert_eq!(ev, None);
    }

    #[test]
    fn accepts_naws_do() {
        let mut n = Negotiator::new();
        let (reply, ev) = n.receive(CommandKind::Do, opt::NAWS);
        assert_eq!(reply, vec![IAC, WILL, opt::NAWS]);
        assert_eq!(ev, Some(OptionEvent::SelfEnabled(opt::NAWS)));
    }

    #[test]
    fn accepts_msdp_do_without_retracting_our_will() {
        let mut n = Negotiator::new();
        let (reply, ev) = n.receive(CommandKind::Do, opt::MSDP);
        assert_eq!(reply, vec![IAC, WILL, opt::MSDP]);
        assert_eq!(ev, Some(OptionEvent::SelfEnabled(opt::MSDP)));
        assert!(n.is_self_option_active(opt::MSDP));
    }

    #[test]
    fn refuses_unknown_do() {
        let mut n = Negotiator::new();
        let (reply, _) = n.receive(CommandKind::Do, 200);
        assert_eq!(reply, vec![IAC, WONT, 200]);
    }

    #[test]
    fn wont_after_will_fires_disabled_event() {
        let mut n = Negotiator::new();
        n.receive(CommandKind::Will, opt::MSDP);
        let (reply, ev) = n.receive(CommandKind::Wont, opt::MSDP);
        assert!(reply.is_empty());
        assert_eq!(ev, Some(OptionEvent::ServerDisabled(opt::MSDP)));
        assert!(!n.is_server_option_active(opt::MSDP));
    }

    #[test]
    fn repeated_will_is_idempotent_no_reply() {
        let mut n = Negotiator::new();
        n.receive(CommandKind::Will, opt::MSDP);
        let (reply, ev) = n.receive(CommandKind::Will, opt::MSDP);
        assert!(reply.is_empty());
        assert_eq!(ev, None);
    }
}
