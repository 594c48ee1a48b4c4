//! WebSocket message types: client requests and server pushes.
//!
//! Both directions are JSON objects discriminated by a `"type"` field.

use axum::extract::ws::Utf8Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::StateRecord;

/// Name announced in the `hello` frame.
pub const ADAPTER_NAME: &str = "state-bridge";

/// Messages the server sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// First frame on every accepted connection.
    Hello {
        /// Announcing adapter.
        adapter: String,
        /// Server time at connect.
        time: DateTime<Utc>,
    },
    /// Initial whitelisted state.
    Snapshot {
        /// Records in resolution order.
        items: Vec<StateRecord>,
    },
    /// Live change of a single state.
    State(StateRecord),
    /// Reply to `get`.
    GetResult {
        /// One record per requested id, in request order.
        items: Vec<StateRecord>,
    },
    /// Reply to `subscribe`.
    Subscribed {
        /// Echo of the requested ids/patterns.
        ids: Vec<String>,
    },
    /// Reply to `setState`.
    SetResult {
        /// Whether the write succeeded.
        ok: bool,
        /// Target id.
        id: String,
        /// Failure description when `ok` is false.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Structure document.
    Structure {
        /// The document as loaded.
        data: Value,
    },
    /// Request-level error.
    Error {
        /// Human-readable description.
        message: String,
    },
}

impl ServerMessage {
    /// Builds the `hello` frame stamped with the current time.
    #[must_use]
    pub fn hello() -> Self {
        Self::Hello {
            adapter: ADAPTER_NAME.to_string(),
            time: Utc::now(),
        }
    }

    /// Builds the reply for an unrecognized request.
    #[must_use]
    pub fn unknown_request() -> Self {
        Self::Error {
            message: "unknown request".to_string(),
        }
    }

    /// Serializes into a text frame payload. Cloning the result is cheap,
    /// so one serialization can be fanned out to many sessions.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if a value cannot be encoded.
    pub fn to_frame(&self) -> Result<Utf8Bytes, serde_json::Error> {
        serde_json::to_string(self).map(Utf8Bytes::from)
    }
}

/// Requests a client may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Read the current records for `ids`.
    Get {
        /// Ids to read.
        ids: Vec<String>,
    },
    /// Register interest in ids or patterns.
    Subscribe {
        /// Ids or wildcard patterns.
        ids: Vec<String>,
    },
    /// Write a value.
    SetState {
        /// Target id.
        id: String,
        /// Value to write.
        #[serde(default)]
        value: Value,
        /// Acknowledgement flag.
        #[serde(default)]
        ack: bool,
    },
    /// Fetch the structure document.
    GetStructure,
    /// Valid JSON that matches none of the shapes above.
    #[serde(skip)]
    Unrecognized,
}

/// Outcome of decoding an inbound text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A well-formed request (possibly [`ClientMessage::Unrecognized`]).
    Request(ClientMessage),
    /// Not JSON at all. Dropped without a reply.
    Malformed,
}

impl ClientMessage {
    /// Decodes a text frame.
    ///
    /// Text that is not JSON yields [`Inbound::Malformed`]. JSON that does
    /// not fit a known request shape yields [`ClientMessage::Unrecognized`].
    #[must_use]
    pub fn decode(text: &str) -> Inbound {
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            return Inbound::Malformed;
        };
        Inbound::Request(Self::deserialize(value).unwrap_or(Self::Unrecognized))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_value(msg: &ServerMessage) -> Value {
        let Ok(v) = serde_json::to_value(msg) else {
            panic!("message serializes");
        };
        v
    }

    #[test]
    fn hello_carries_adapter_and_iso_time() {
        let v = to_value(&ServerMessage::hello());
        assert_eq!(v["type"], "hello");
        assert_eq!(v["adapter"], ADAPTER_NAME);
        let Some(time) = v["time"].as_str() else {
            panic!("time is a string");
        };
        assert!(DateTime::parse_from_rfc3339(time).is_ok());
    }

    #[test]
    fn state_is_flattened() {
        let rec = StateRecord::new("light.kitchen", json!(1), 10, 5, true);
        let v = to_value(&ServerMessage::State(rec));
        assert_eq!(
            v,
            json!({"type": "state", "id": "light.kitchen", "val": 1, "ts": 10, "lc": 5, "ack": true})
        );
    }

    #[test]
    fn reply_type_tags_are_camel_case() {
        let v = to_value(&ServerMessage::GetResult { items: vec![] });
        assert_eq!(v["type"], "getResult");
        let v = to_value(&ServerMessage::SetResult {
            ok: true,
            id: "a".into(),
            error: None,
        });
        assert_eq!(v, json!({"type": "setResult", "ok": true, "id": "a"}));
        let v = to_value(&ServerMessage::unknown_request());
        assert_eq!(v, json!({"type": "error", "message": "unknown request"}));
    }

    #[test]
    fn frame_is_json_text() {
        let Ok(frame) = ServerMessage::Subscribed { ids: vec!["x".into()] }.to_frame() else {
            panic!("frame encodes");
        };
        assert_eq!(frame.as_str(), r#"{"type":"subscribed","ids":["x"]}"#);
    }

    #[test]
    fn decode_known_requests() {
        assert_eq!(
            ClientMessage::decode(r#"{"type":"get","ids":["a","b"]}"#),
            Inbound::Request(ClientMessage::Get {
                ids: vec!["a".into(), "b".into()]
            })
        );
        assert_eq!(
            ClientMessage::decode(r#"{"type":"setState","id":"a","value":3}"#),
            Inbound::Request(ClientMessage::SetState {
                id: "a".into(),
                value: json!(3),
                ack: false
            })
        );
        assert_eq!(
            ClientMessage::decode(r#"{"type":"getStructure"}"#),
            Inbound::Request(ClientMessage::GetStructure)
        );
    }

    #[test]
    fn decode_non_json_is_malformed() {
        assert_eq!(ClientMessage::decode("not json"), Inbound::Malformed);
        assert_eq!(ClientMessage::decode(""), Inbound::Malformed);
    }

    #[test]
    fn decode_wrong_shape_is_unrecognized() {
        for text in [
            r#"{"type":"reboot"}"#,
            r#"{"type":"get","ids":"a"}"#,
            r#"{"type":"setState","id":7}"#,
            r#"{"type":"setState","id":"a","ack":"yes"}"#,
            r#"{"type":"Unrecognized"}"#,
            r#"[1,2,3]"#,
            r#"42"#,
        ] {
            assert_eq!(
                ClientMessage::decode(text),
                Inbound::Request(ClientMessage::Unrecognized),
                "{text}"
            );
        }
    }
}
