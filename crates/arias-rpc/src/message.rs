//! JSON-RPC 2.0 envelopes exchanged over a frame transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const JSONRPC_VERSION: &str = "2.0";

/// Outbound request envelope.
#[derive(Debug, Serialize)]
pub(crate) struct Request<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

impl<'a> Request<'a> {
    pub(crate) const fn new(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

/// Error object returned by the remote side in place of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFault {
    /// Remote error code.
    pub code: i64,
    /// Remote error message.
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RemoteFault>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFrame {
    Batch(Vec<RawMessage>),
    Single(RawMessage),
}

/// Classified inbound message.
#[derive(Debug, PartialEq)]
pub(crate) enum Incoming {
    /// Reply to an outstanding call.
    Response {
        id: u64,
        outcome: Result<Value, RemoteFault>,
    },
    /// Unsolicited push from the remote side.
    Notification { method: String, params: Value },
    /// Anything else: remote-initiated calls or replies with foreign ids.
    Unroutable,
}

impl From<RawMessage> for Incoming {
    fn from(raw: RawMessage) -> Self {
        let id = raw.id.filter(|id| !id.is_null());
        match (id, raw.method) {
            (None, Some(method)) => Self::Notification {
                method,
                params: raw.params.unwrap_or(Value::Null),
            },
            (Some(id), None) => match parse_id(&id) {
                Some(id) => Self::Response {
                    id,
                    outcome: raw
                        .error
                        .map_or_else(|| Ok(raw.result.unwrap_or(Value::Null)), Err),
                },
                None => Self::Unroutable,
            },
            _ => Self::Unroutable,
        }
    }
}

fn parse_id(id: &Value) -> Option<u64> {
    match id {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

/// Decode one frame into zero or more messages. Batch frames keep wire order.
pub(crate) fn decode(frame: &str) -> Result<Vec<Incoming>, serde_json::Error> {
    let raw: RawFrame = serde_json::from_str(frame)?;
    Ok(match raw {
        RawFrame::Batch(items) => items.into_iter().map(Incoming::from).collect(),
        RawFrame::Single(item) => vec![Incoming::from(item)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_jsonrpc_envelope() -> Result<(), serde_json::Error> {
        let request = Request::new(7, "aria2.addUri", json!([["https://example.com/a.bin"]]));
        let encoded: Value = serde_json::to_value(&request)?;
        assert_eq!(
            encoded,
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "aria2.addUri",
                "params": [["https://example.com/a.bin"]],
            })
        );
        Ok(())
    }

    #[test]
    fn decode_classifies_responses_and_notifications() -> Result<(), serde_json::Error> {
        let response = decode(r#"{"jsonrpc":"2.0","id":3,"result":"2089b05ecca3d829"}"#)?;
        assert_eq!(
            response,
            vec![Incoming::Response {
                id: 3,
                outcome: Ok(json!("2089b05ecca3d829")),
            }]
        );

        let notification = decode(
            r#"{"jsonrpc":"2.0","method":"aria2.onDownloadStart","params":[{"gid":"abc"}]}"#,
        )?;
        assert_eq!(
            notification,
            vec![Incoming::Notification {
                method: "aria2.onDownloadStart".to_string(),
                params: json!([{"gid": "abc"}]),
            }]
        );
        Ok(())
    }

    #[test]
    fn decode_handles_faults_string_ids_and_batches() -> Result<(), serde_json::Error> {
        let fault = decode(
            r#"{"jsonrpc":"2.0","id":"9","error":{"code":1,"message":"GID abc is not found"}}"#,
        )?;
        assert_eq!(
            fault,
            vec![Incoming::Response {
                id: 9,
                outcome: Err(RemoteFault {
                    code: 1,
                    message: "GID abc is not found".to_string(),
                }),
            }]
        );

        let batch = decode(
            r#"[{"jsonrpc":"2.0","id":1,"result":"OK"},{"jsonrpc":"2.0","method":"aria2.onDownloadComplete","params":[]}]"#,
        )?;
        assert_eq!(batch.len(), 2);
        assert!(matches!(batch[0], Incoming::Response { id: 1, .. }));
        assert!(matches!(batch[1], Incoming::Notification { .. }));
        Ok(())
    }

    #[test]
    fn decode_marks_foreign_messages_unroutable() -> Result<(), serde_json::Error> {
        let call = decode(r#"{"jsonrpc":"2.0","id":1,"method":"system.listMethods"}"#)?;
        assert_eq!(call, vec![Incoming::Unroutable]);
        let foreign = decode(r#"{"jsonrpc":"2.0","id":"client-x","result":1}"#)?;
        assert_eq!(foreign, vec![Incoming::Unroutable]);
        assert!(decode("not json").is_err());
        Ok(())
    }
}
