//! Incremental text decoding.
//!
//! Wraps `encoding_rs::Decoder` so partial multi-byte sequences that straddle
//! a TCP read boundary are carried internally rather than producing garbage
//! or losing bytes. Uses a persistent `new_decoder_without_bom_handling()`
//! decoder, the same pattern an IMAP client uses to decode text across
//! multiple reads of the same connection.

use encoding_rs::{CoderResult, Encoding, UTF_8};

/// Stateful decoder for one connection's inbound byte stream.
pub struct TextDecoder {
    decoder: encoding_rs::Decoder,
    label: String,
}

impl std::fmt::Debug for TextDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextDecoder").field("label", &self.label).finish()
    }
}

impl TextDecoder {
    /// Build a decoder for the named encoding (e.g. `"utf-8"`, `"iso-8859-1"`,
    /// `"gbk"`). Unknown labels fall back to UTF-8.
    pub fn new(label: &str) -> Self {
        let encoding = Encoding::for_label(label.as_bytes()).unwrap_or(UTF_8);
        Self {
            decoder: encoding.new_decoder_without_bom_handling(),
            label: label.to_string(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Decode a chunk of bytes, appending the resulting text to `out`.
    /// Malformed sequences become U+FFFD; any trailing incomplete
    /// multi-byte sequence is retained inside the decoder for the next call.
    pub fn decode_to_string(&mut self, bytes: &[u8], out: &mut String) {
        let mut src = bytes;
        loop {
            let (result, read, had_errors) = self.decoder.decode_to_string(src, out, false);
            if had_errors {
                tracing::warn!(label = %self.label, "malformed byte sequence replaced with U+FFFD");
            }
            src = &src[read..];
            match result {
                CoderResult::InputEmpty => break,
                // Only possible if `out`'s capacity can't be grown further;
                // retry with the remainder on the next loop iteration.
                CoderResult::OutputFull => {
                    out.reserve(src.len().max(64));
                    if src.is_empty() {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_round_trip() {
        let mut d = TextDecoder::new("utf-8");
        let mut out = String::new();
        d.decode_to_string(b"hello", &mut out);
        assert_eq!(out, "hello");
    }

    #[test]
    fn unknown_label_falls_back_to_utf8() {
        let d = TextDecoder::new("not-a-real-encoding");
        assert_eq!(d.label(), "not-a-real-encoding");
    }

    #[test]
    fn utf8_multibyte_split_across_calls() {
        // "é" = 0xC3 0xA9 in UTF-8, split across two feeds.
        let mut d = TextDecoder::new("utf-8");
        let mut out = String::new();
        d.decode_to_string(&[0xC3], &mut out);
        d.decode_to_string(&[0xA9], &mut out);
        assert_eq!(out, "é");
    }

    #[test]
    fn latin1_label_decodes_high_bytes() {
        let mut d = TextDecoder::new("iso-8859-1");
        let mut out = String::new();
        d.decode_to_string(&[0xE9], &mut out); // é in Latin-1
        assert_eq!(out, "é");
    }

    #[test]
    fn ascii_bytes_identical_regardless_of_label() {
        let mut utf8 = TextDecoder::new("utf-8");
        let mut latin1 = TextDecoder::new("iso-8859-1");
        let mut a = String::new();
        let mut b = String::new();
        utf8.decode_to_string(b"plain ascii text", &mut a);
        latin1.decode_to_string(b"plain ascii text", &mut b);
        assert_eq!(a, b);
    }
}
