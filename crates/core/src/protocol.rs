//! Wire types for the query protocol. One JSON object per WebSocket text
//! frame in each direction; responses echo the request's `type` and carry a
//! stable `error` string.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// A request as it arrives from a client. Unknown `type` values are kept
/// verbatim so the response can echo them back.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub file: Option<PathBuf>,
    pub location: Option<MessageLocation>,
    pub symbol_name: Option<String>,
    pub prefix: Option<String>,
    #[serde(default)]
    pub verbose: bool,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Option<ClientMessage> {
        serde_json::from_str(text).ok()
    }
}

/// Cursor position in a request. Both fields must be present for the
/// location to be usable.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageLocation {
    pub file: Option<PathBuf>,
    pub offset: Option<usize>,
}

impl MessageLocation {
    pub fn validate(&self) -> Option<(&PathBuf, usize)> {
        match (&self.file, self.offset) {
            (Some(file), Some(offset)) => Some((file, offset)),
            _ => None,
        }
    }
}

/// A `{file, offset}` pair in a response. Ordering is by file, then offset,
/// which is also the order deduplication relies on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct WireLocation {
    pub file: PathBuf,
    pub offset: usize,
}

/// Outcome strings sent on the wire. `Ok` marks success, `MoreData` marks a
/// chunk of a streamed response with more frames to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Ok,
    MoreData,
    ProtocolError,
    UnknownCommand,
    MissingFile,
    MissingSymbolName,
    InvalidLocation,
    FileNotIndexed,
    FileAlreadyIndexed,
    SymbolNotFound,
    ReadFailure,
    ParseFailure,
    StatFailure,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Ok => "ok",
            ErrorCode::MoreData => "more data",
            ErrorCode::ProtocolError => "protocol error",
            ErrorCode::UnknownCommand => "unknown command",
            ErrorCode::MissingFile => "missing file",
            ErrorCode::MissingSymbolName => "missing symbolname",
            ErrorCode::InvalidLocation => "invalid location",
            ErrorCode::FileNotIndexed => "file not indexed",
            ErrorCode::FileAlreadyIndexed => "file already indexed",
            ErrorCode::SymbolNotFound => "symbol not found",
            ErrorCode::ReadFailure => "read failure",
            ErrorCode::ParseFailure => "parse failure",
            ErrorCode::StatFailure => "stat failure",
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One response frame. Payload fields are flattened alongside `error` and
/// the echoed `type`; a frame answering an unparseable request has no type.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub error: ErrorCode,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Envelope {
    pub fn ok(kind: Option<String>, payload: Map<String, Value>) -> Envelope {
        Envelope {
            error: ErrorCode::Ok,
            kind,
            payload,
        }
    }

    pub fn error(kind: Option<String>, error: ErrorCode) -> Envelope {
        Envelope {
            error,
            kind,
            payload: Map::new(),
        }
    }

    pub fn chunk(kind: Option<String>, payload: Map<String, Value>) -> Envelope {
        Envelope {
            error: ErrorCode::MoreData,
            kind,
            payload,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{\"error\":\"protocol error\"}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn requests_parse_with_camel_case_fields() {
        let msg = ClientMessage::parse(
            r#"{"type":"find-symbol","symbolName":"area","file":"/tmp/box.js"}"#,
        )
        .unwrap();
        assert_eq!(msg.kind, "find-symbol");
        assert_eq!(msg.symbol_name.as_deref(), Some("area"));
        assert_eq!(msg.file.as_deref(), Some(std::path::Path::new("/tmp/box.js")));
        assert!(!msg.verbose);
    }

    #[test]
    fn malformed_text_and_missing_type_are_rejected() {
        assert!(ClientMessage::parse("not json").is_none());
        assert!(ClientMessage::parse(r#"{"file":"/tmp/a.js"}"#).is_none());
    }

    #[test]
    fn partial_locations_do_not_validate() {
        let msg = ClientMessage::parse(r#"{"type":"cursor-info","location":{"file":"/tmp/a.js"}}"#)
            .unwrap();
        assert!(msg.location.unwrap().validate().is_none());

        let msg = ClientMessage::parse(
            r#"{"type":"cursor-info","location":{"file":"/tmp/a.js","offset":12}}"#,
        )
        .unwrap();
        let location = msg.location.unwrap();
        let (file, offset) = location.validate().unwrap();
        assert_eq!(file, &PathBuf::from("/tmp/a.js"));
        assert_eq!(offset, 12);
    }

    #[test]
    fn envelopes_flatten_payload_next_to_error_and_type() {
        let mut payload = Map::new();
        payload.insert("references".into(), json!([{"file": "a.js", "offset": 4}]));
        let frame: Value =
            serde_json::from_str(&Envelope::ok(Some("find-references".into()), payload).to_json())
                .unwrap();
        assert_eq!(frame["error"], "ok");
        assert_eq!(frame["type"], "find-references");
        assert_eq!(frame["references"][0]["offset"], 4);

        let frame: Value =
            serde_json::from_str(&Envelope::error(None, ErrorCode::ProtocolError).to_json())
                .unwrap();
        assert_eq!(frame["error"], "protocol error");
        assert!(frame.get("type").is_none());
    }

    #[test]
    fn wire_locations_order_by_file_then_offset() {
        let mut locations = vec![
            WireLocation { file: "b.js".into(), offset: 1 },
            WireLocation { file: "a.js".into(), offset: 9 },
            WireLocation { file: "a.js".into(), offset: 2 },
            WireLocation { file: "a.js".into(), offset: 9 },
        ];
        locations.sort();
        locations.dedup();
        assert_eq!(locations.len(), 3);
        assert_eq!(locations[0].offset, 2);
        assert_eq!(locations[2].file, PathBuf::from("b.js"));
    }
}
