//! Telnet byte state machine.
//!
//! Splits a raw byte stream into inline text and Telnet command/subnegotiation
//! frames, collapsed onto the three `RawFrame` variants this crate needs:
//! text bytes, a 2-byte command, and a subnegotiation. GA/EOR prompt framing
//! is out of scope here -- those bytes fall through the "any other byte" arm
//! after IAC and are silently dropped, so the connection stays live on
//! unrecognized commands.

pub const IAC: u8 = 255;
pub const SB: u8 = 250;
pub const SE: u8 = 240;
pub const WILL: u8 = 251;
pub const WONT: u8 = 252;
pub const DO: u8 = 253;
pub const DONT: u8 = 254;

/// Well-known Telnet option numbers this crate negotiates.
pub mod opt {
    pub const TERMINAL_TYPE: u8 = 24;
    pub const NAWS: u8 = 31;
    pub const MSDP: u8 = 69;
    pub const GMCP: u8 = 201;
}

/// A Telnet command kind (the byte following IAC that isn't SB/SE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Do,
    Dont,
    Will,
    Wont,
}

/// One decoded frame emitted by [`TelnetParser::feed`].
///
/// Ephemeral -- consumed immediately by the pipeline orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFrame {
    /// Inline (non-IAC) text bytes.
    TextBytes(Vec<u8>),
    /// `IAC <WILL|WONT|DO|DONT> <option>`.
    Command(CommandKind, u8),
    /// `IAC SB <option> <payload> IAC SE`.
    Subnegotiation(u8, Vec<u8>),
}

#[derive(Debug)]
enum State {
    Normal,
    IacSeen,
    Command(CommandKind),
    Subneg,
    SubnegIac,
}

/// Byte-stream Telnet parser.
///
/// Holds no I/O handles; state (including partial text/subneg accumulators)
/// persists across calls to [`Self::feed`] so frames split across TCP reads
/// are reassembled correctly.
#[derive(Debug)]
pub struct TelnetParser {
    state: State,
    text_buf: Vec<u8>,
    sb_opt: u8,
    sb_buf: Vec<u8>,
    sb_opt_set: bool,
}

impl Default for TelnetParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TelnetParser {
    pub fn new() -> Self {
        Self {
            state: State::Normal,
            text_buf: Vec::new(),
            sb_opt: 0,
            sb_buf: Vec::new(),
            sb_opt_set: false,
        }
    }

    /// Feed raw bytes; returns every frame decoded from them, including a
    /// trailing `TextBytes` flush of any text accumulated during this call.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<RawFrame> {
        let mut frames = Vec::new();
        for &b in bytes {
            self.step(b, &mut frames);
        }
        self.flush_text(&mut frames);
        frames
    }

    fn flush_text(&mut self, frames: &mut Vec<RawFrame>) {
        if !self.text_buf.is_empty() {
            frames.push(RawFrame::TextBytes(std::mem::take(&mut self.text_buf)));
        }
    }

    fn step(&mut self, b: u8, frames: &mut Vec<RawFrame>) {
        match self.state {
            State::Normal => {
                if b == IAC {
                    self.flush_text(frames);
                    self.state = State::IacSeen;
                } else {
                    self.text_buf.push(b);
                }
            }
            State::IacSeen => match b {
                WILL => self.state = State::Command(CommandKind::Will),
                WONT => self.state = State::Command(CommandKind::Wont),
                DO => self.state = State::Command(CommandKind::Do),
                DONT => self.state = State::Command(CommandKind::Dont),
                SB => {
                    self.sb_buf.clear();
                    self.sb_opt_set = false;
                    self.state = State::Subneg;
                }
                IAC => {
                    // Escaped literal 0xFF in the text stream.
                    self.text_buf.push(0xFF);
                    self.state = State::Normal;
                }
                _ => {
                    // Unknown single-byte command (NOP, GA, EOR, ...) -- dropped.
                    self.state = State::Normal;
                }
            },
            State::Command(kind) => {
                frames.push(RawFrame::Command(kind, b));
                self.state = State::Normal;
            }
            State::Subneg => {
                if b == IAC {
                    self.state = State::SubnegIac;
                } else if !self.sb_opt_set {
                    self.sb_opt = b;
                    self.sb_opt_set = true;
                } else {
                    self.sb_buf.push(b);
                }
            }
            State::SubnegIac => match b {
                SE => {
                    let payload = std::mem::take(&mut self.sb_buf);
                    frames.push(RawFrame::Subnegotiation(self.sb_opt, payload));
                    self.state = State::Normal;
                }
                IAC => {
                    self.sb_buf.push(0xFF);
                    self.state = State::Subneg;
                }
                _ => {
                    // Malformed subnegotiation -- discard and recover.
                    self.sb_buf.clear();
                    self.sb_opt_set = false;
                    self.state = State::Normal;
                }
            },
        }
    }
}

/// Build `IAC SB TERMINAL_TYPE IS <value> IAC SE`.
pub fn build_ttype_is(value: &str) -> Vec<u8> {
    const IS: u8 = 0;
    let mut out = vec![IAC, SB, opt::TERMINAL_TYPE, IS];
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(&[IAC, SE]);
    out
}

/// Build `IAC SB NAWS <w hi> <w lo> <h hi> <h lo> IAC SE`, escaping any byte
/// that happens to equal 0xFF inside the payload per RFC 1073.
pub fn build_naws(width: u16, height: u16) -> Vec<u8> {
    let mut out = vec![IAC, SB, opt::NAWS];
    for b in width.to_be_bytes().into_iter().chain(height.to_be_bytes()) {
        out.push(b);
        if b == 0xFF {
            out.push(0xFF);
        }
    }
    out.extend_from_slice(&[IAC, SE]);
    out
}
