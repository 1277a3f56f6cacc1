//! Connection manager.
//!
//! Splits the connection into a `Protocol`/`Connection` pair: `Protocol`
//! holds pure, I/O-free state (telnet parser, negotiator, decoder, output
//! buffer) and is fully unit-testable; `Connection` owns the socket and is
//! async. No TLS, MCCP, or ATCP support -- plain TCP only. Adds the 1 MiB
//! output-buffer truncation policy, the `[buffer trimmed]` sentinel, and
//! routing of MSDP/GMCP subnegotiations into typed snapshots rather than
//! raw strings.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::decoder::TextDecoder;
use crate::gmcp::{self, GmcpMessage};
use crate::msdp::{self, MsdpValue};
use crate::negotiation::{Negotiator, OptionEvent};
use crate::telnet::{build_naws, build_ttype_is, opt, CommandKind, RawFrame, TelnetParser};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// High-level events produced by one [`Protocol::process`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnEvent {
    /// Decoded text appended to the line-assembly buffer (see the pipeline
    /// orchestrator for line splitting).
    Text(String),
    /// A delta to apply onto the MSDP snapshot.
    Msdp(std::collections::BTreeMap<String, MsdpValue>),
    Gmcp(GmcpMessage),
    OptionChanged(OptionEvent),
}

const OUTPUT_BUFFER_LIMIT_CHARS: usize = 1024 * 1024;
const TRUNCATE_SENTINEL: &str = "[buffer trimmed]";

/// The bounded, observable accumulated-text buffer.
///
/// This is the raw connection-level transcript: every decoded text chunk is
/// appended here as it arrives, before trigger evaluation, so gagged lines
/// are still present in it. It is a distinct stream from the "main" tab's
/// content (see the tab router and the pipeline orchestrator), which is the
/// gag-filtered, line-assembled view meant for display.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    text: String,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn append(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        if self.text.chars().count() > OUTPUT_BUFFER_LIMIT_CHARS {
            self.truncate();
        }
    }

    fn truncate(&mut self) {
        let total = self.text.chars().count();
        let target = (OUTPUT_BUFFER_LIMIT_CHARS * 80) / 100;
        let drop_count = total - target;
        // Find the byte boundary at `drop_count` chars in, then advance to
        // the next newline so we don't split a line.
        let mut boundary = self
            .text
            .char_indices()
            .nth(drop_count)
            .map(|(byte_idx, _)| byte_idx)
            .unwrap_or(self.text.len());
        if let Some(rel_newline) = self.text[boundary..].find('\n') {
            boundary += rel_newline + 1;
        }
        let remainder = self.text[boundary..].to_string();
        self.text = format!("{TRUNCATE_SENTINEL}\n{remainder}");
    }
}

/// Pure protocol state: telnet parsing, option negotiation, incremental
/// decoding, MSDP/GMCP dispatch, and the observable output buffer. Contains
/// no I/O handles and has no async methods.
pub struct Protocol {
    parser: TelnetParser,
    negotiator: Negotiator,
    decoder: TextDecoder,
    pub output: OutputBuffer,
}

impl Protocol {
    pub fn new(encoding_label: &str) -> Self {
        Self {
            parser: TelnetParser::new(),
            negotiator: Negotiator::new(),
            decoder: TextDecoder::new(encoding_label),
            output: OutputBuffer::new(),
        }
    }

    /// Switch the active charset; resets the decoder's partial-sequence
    /// state.
    pub fn set_encoding(&mut self, label: &str) {
        self.decoder = TextDecoder::new(label);
    }

    /// Bytes to send proactively at connect time: WILL TERMINAL_TYPE, DO
    /// NAWS, WILL MSDP, DO GMCP.
    pub fn initial_negotiation(&self) -> Vec<u8> {
        use crate::telnet::{DO, IAC, WILL};
        vec![
            IAC, WILL, opt::TERMINAL_TYPE,
            IAC, DO, opt::NAWS,
            IAC, WILL, opt::MSDP,
            IAC, DO, opt::GMCP,
        ]
    }

    /// Process a raw byte slice from the socket. Returns decoded events plus
    /// any bytes that must be written back (negotiation replies, TERMINAL_TYPE
    /// IS response).
    pub fn process(&mut self, raw: &[u8]) -> (Vec<ConnEvent>, Vec<u8>) {
        let frames = self.parser.feed(raw);
        let mut events = Vec::new();
        let mut send_buf = Vec::new();
        for frame in frames {
            self.dispatch(frame, &mut events, &mut send_buf);
        }
        (events, send_buf)
    }

    fn dispatch(&mut self, frame: RawFrame, events: &mut Vec<ConnEvent>, send_buf: &mut Vec<u8>) {
        match frame {
            RawFrame::TextBytes(bytes) => {
                let mut text = String::new();
                self.decoder.decode_to_string(&bytes, &mut text);
                self.output.append(&text);
                events.push(ConnEvent::Text(text));
            }
            RawFrame::Command(kind, option) => {
                let (reply, event) = self.negotiator.receive(kind, option);
                send_buf.extend(reply);
                if let Some(ev) = event {
                    events.push(ConnEvent::OptionChanged(ev));
                }
            }
            RawFrame::Subnegotiation(option, payload) => {
                self.handle_subneg(option, &payload, events, send_buf);
            }
        }
    }

    fn handle_subneg(
        &mut self,
        option: u8,
        payload: &[u8],
        events: &mut Vec<ConnEvent>,
        send_buf: &mut Vec<u8>,
    ) {
        match option {
            opt::TERMINAL_TYPE => {
                const SEND: u8 = 1;
                if payload.first() == Some(&SEND) {
                    send_buf.extend(build_ttype_is("xterm-256color"));
                }
            }
            opt::MSDP => match msdp::parse(payload) {
                Ok(delta) => events.push(ConnEvent::Msdp(delta)),
                Err(e) => tracing::warn!(error = %e, "malformed MSDP payload, discarding"),
            },
            opt::GMCP => match gmcp::parse(payload) {
                Ok(msg) => events.push(ConnEvent::Gmcp(msg)),
                Err(e) => tracing::warn!(error = %e, "malformed GMCP payload, discarding"),
            },
            _ => {}
        }
    }

    /// Whether we are currently advertising a self-originated option (e.g.
    /// send NAWS reports only if the option is active).
    pub fn is_self_option_active(&self, option: u8) -> bool {
        self.negotiator.is_self_option_active(option)
    }
}

const READ_BUF: usize = 4096;

/// A single async connection to a MUD server.
pub struct Connection {
    state: ConnectionState,
    writer: Option<Arc<Mutex<OwnedWriteHalf>>>,
    reader: Option<tokio::net::tcp::OwnedReadHalf>,
    proto: Protocol,
}

impl Connection {
    pub fn new(encoding_label: &str) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            writer: None,
            reader: None,
            proto: Protocol::new(encoding_label),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Open a TCP connection, run initial negotiation, and transition to
    /// `Connected`. Returns to `Disconnected` on failure.
    pub async fn connect(&mut self, host: &str, port: u16) -> io::Result<()> {
        self.state = ConnectionState::Connecting;
        match TcpStream::connect((host, port)).await {
            Ok(stream) => {
                let (read_half, write_half) = stream.into_split();
                self.reader = Some(read_half);
                self.writer = Some(Arc::new(Mutex::new(write_half)));
                self.state = ConnectionState::Connected;
                let initial = self.proto.initial_negotiation();
                self.write_raw(&initial).await?;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Idempotent disconnect.
    pub fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            return;
        }
        self.state = ConnectionState::Disconnected;
        self.reader = None;
        self.writer = None;
    }

    /// Send `command`, appending CRLF, escaping any literal 0xFF byte.
    pub async fn send(&mut self, command: &str) -> io::Result<()> {
        let mut buf = Vec::with_capacity(command.len() + 2);
        for &b in command.as_bytes() {
            if b == 0xFF {
                buf.push(0xFF);
            }
            buf.push(b);
        }
        buf.extend_from_slice(b"\r\n");
        if let Err(e) = self.write_raw(&buf).await {
            self.disconnect();
            return Err(e);
        }
        Ok(())
    }

    async fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        let Some(writer) = &self.writer else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "not connected"));
        };
        let mut guard = writer.lock().await;
        guard.write_all(bytes).await
    }

    /// Report the current window size to the server, if NAWS is active.
    pub async fn report_window_size(&mut self, width: u16, height: u16) -> io::Result<()> {
        if self.proto.is_self_option_active(opt::NAWS) {
            let bytes = build_naws(width, height);
            self.write_raw(&bytes).await?;
        }
        Ok(())
    }

    /// Read one chunk from the server and process it. Returns `Ok(None)` on
    /// EOF (caller should disconnect).
    pub async fn recv(&mut self) -> io::Result<Option<Vec<ConnEvent>>> {
        let Some(reader) = &mut self.reader else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "not connected"));
        };
        let mut raw = [0u8; READ_BUF];
        let n = reader.read(&mut raw).await?;
        if n == 0 {
            return Ok(None);
        }
        let (events, send_buf) = self.proto.process(&raw[..n]);
        if !send_buf.is_empty() {
            self.write_raw(&send_buf).await?;
        }
        Ok(Some(events))
    }

    pub fn output_buffer(&self) -> &str {
        self.proto.output.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telnet::{opt::GMCP, DO, IAC, SB, SE};

    #[test]
    fn text_bytes_decode_and_accumulate_in_output_buffer() {
        let mut proto = Protocol::new("utf-8");
        let (events, _) = proto.process(b"hello\r\n");
        assert_eq!(events, vec![ConnEvent::Text("hello\r\n".to_string())]);
        assert_eq!(proto.output.as_str(), "hello\r\n");
    }

    #[test]
    fn negotiation_do_unknown_option_replies_wont() {
        let mut proto = Protocol::new("utf-8");
        let (_, send_buf) = proto.process(&[IAC, DO, 99]);
        assert_eq!(send_buf, vec![IAC, crate::telnet::WONT, 99]);
    }

    #[test]
    fn msdp_subneg_produces_snapshot_delta() {
        let mut proto = Protocol::new("utf-8");
        let mut input = vec![IAC, SB, opt::MSDP];
        input.extend_from_slice(&[crate::msdp::VAR]);
        input.extend_from_slice(b"HP");
        input.push(crate::msdp::VAL);
        input.extend_from_slice(b"100");
        input.extend_from_slice(&[IAC, SE]);
        let (events, _) = proto.process(&input);
        assert!(matches!(&events[0], ConnEvent::Msdp(m) if m.get("HP").is_some()));
    }

    #[test]
    fn gmcp_subneg_produces_message() {
        let mut proto = Protocol::new("utf-8");
        let mut input = vec![IAC, SB, GMCP];
        input.extend_from_slice(b"Core.Ping");
        input.extend_from_slice(&[IAC, SE]);
        let (events, _) = proto.process(&input);
        assert!(matches!(&events[0], ConnEvent::Gmcp(m) if m.package == "Core.Ping"));
    }

    #[test]
    fn malformed_msdp_is_discarded_not_fatal() {
        let mut proto = Protocol::new("utf-8");
        let mut input = vec![IAC, SB, opt::MSDP, crate::msdp::VAR, b'X'];
        input.extend_from_slice(&[IAC, SE]);
        let (events, _) = proto.process(&input);
        assert!(events.is_empty());
    }

    #[test]
    fn output_buffer_truncates_past_limit() {
        let mut buf = OutputBuffer::new();
        // Build a buffer of many short lines exceeding the limit.
        let line = "x".repeat(100);
        for _ in 0..(OUTPUT_BUFFER_LIMIT_CHARS / 100 + 10) {
            buf.append(&line);
            buf.append("\n");
        }
        assert!(buf.as_str().starts_with(TRUNCATE_SENTINEL));
        assert!(buf.as_str().chars().count() < OUTPUT_BUFFER_LIMIT_CHARS);
    }

    #[tokio::test]
    async fn connect_and_recv_line_over_loopback() {
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            // Drain the client's initial negotiation bytes.
            let mut buf = [0u8; 64];
            let _ = sock.read(&mut buf).await;
            sock.write_all(b"Welcome!\r\n").await.unwrap();
        });

        let mut conn = Connection::new("utf-8");
        conn.connect("127.0.0.1", addr.port()).await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Connected);
        let events = conn.recv().await.unwrap().unwrap();
        server.await.unwrap();
        assert!(matches!(&events[0], ConnEvent::Text(t) if t == "Welcome!\r\n"));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let mut conn = Connection::new("utf-8");
        conn.disconnect();
        conn.disconnect();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }
}
