//! GMCP (Generic MUD Communication Protocol) payload parsing.
//!
//! A GMCP subnegotiation payload is `<Dotted.Package.Name> <JSON>`, the JSON
//! half optional. Splitting on the first space (`split_once(' ')`) separates
//! package from payload; the payload is parsed into a typed
//! `serde_json::Value` rather than kept as a raw string, since downstream
//! consumers (variables, triggers) need structured access to nested fields.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct GmcpMessage {
    pub package: String,
    pub data: Value,
}

/// Only raised when the payload has no package name at all -- nothing
/// downstream can be logged against. An empty or ill-formed JSON body is not
/// an error case; it degrades to an empty object (see [`parse`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GmcpError(pub String);

impl std::fmt::Display for GmcpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Parse a raw GMCP subnegotiation payload. A missing or ill-formed JSON body
/// degrades to an empty object rather than failing the connection; ill-formed
/// JSON is logged via `tracing::warn!`.
pub fn parse(payload: &[u8]) -> Result<GmcpMessage, GmcpError> {
    let text = String::from_utf8_lossy(payload);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GmcpError("empty GMCP payload".to_string()));
    }
    match trimmed.split_once(' ') {
        Some((package, json_text)) => {
            let json_text = json_text.trim();
            let data = if json_text.is_empty() {
                empty_object()
            } else {
                serde_json::from_str(json_text).unwrap_or_else(|e| {
                    tracing::warn!(package, error = %e, "ill-formed GMCP JSON body, defaulting to empty object");
                    empty_object()
                })
            };
            Ok(GmcpMessage {
                package: package.to_string(),
                data,
            })
        }
        None => Ok(GmcpMessage {
            package: trimmed.to_string(),
            data: empty_object(),
        }),
    }
}

/// Encode a package name and JSON value back into a GMCP payload, for
/// sending client-originated messages (e.g. `Core.Hello`).
pub fn encode(package: &str, data: &Value) -> Vec<u8> {
    if data.is_null() {
        package.as_bytes().to_vec()
    } else {
        format!("{package} {data}").into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_package_with_object_body() {
        let msg = parse(br#"Room.Info {"num":1,"name":"Temple"}"#).unwrap();
        assert_eq!(msg.package, "Room.Info");
        assert_eq!(msg.data, json!({"num": 1, "name": "Temple"}));
    }

    #[test]
    fn parses_package_with_no_body_as_empty_object() {
        let msg = parse(b"Core.Ping").unwrap();
        assert_eq!(msg.package, "Core.Ping");
        assert_eq!(msg.data, json!({}));
    }

    #[test]
    fn parses_array_body() {
        let msg = parse(br#"Char.Vitals [1,2,3]"#).unwrap();
        assert_eq!(msg.data, json!([1, 2, 3]));
    }

    #[test]
    fn ill_formed_json_body_defaults_to_empty_object() {
        let msg = parse(br#"Room.Info {not json}"#).unwrap();
        assert_eq!(msg.package, "Room.Info");
        assert_eq!(msg.data, json!({}));
    }

    #[test]
    fn trailing_whitespace_body_defaults_to_empty_object() {
        let msg = parse(b"Room.Info   ").unwrap();
        assert_eq!(msg.data, json!({}));
    }

    #[test]
    fn completely_empty_payload_errors() {
        assert!(parse(b"").is_err());
        assert!(parse(b"   ").is_err());
    }

    #[test]
    fn encode_round_trips_object() {
        let data = json!({"num": 1});
        let bytes = encode("Room.Info", &data);
        let reparsed = parse(&bytes).unwrap();
        assert_eq!(reparsed.package, "Room.Info");
        assert_eq!(reparsed.data, data);
    }

    #[test]
    fn encode_null_omits_body() {
        let bytes = encode("Core.Ping", &Value::Null);
        assert_eq!(bytes, b"Core.Ping");
    }
}
