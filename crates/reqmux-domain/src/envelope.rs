//! Wire envelopes exchanged with the batch endpoint.
//!
//! Outbound: `{"rank": n, "requests": [{"route": .., "data": ..}, ..]}`
//! Inbound: `{"rank": n, "responses": [{"type": "success"|"error", "payload": ..}, ..]}`
//!
//! Responses are matched to requests strictly by index.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FetchError;

/// One distinct request inside an outbound envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    pub route: String,
    pub data: Value,
}

/// A batch as sent over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    pub rank: u64,
    pub requests: Vec<WireRequest>,
}

/// One response entry, index-aligned with `OutboundEnvelope::requests`.
///
/// `response_type` accepts any JSON value, or none at all, so a malformed
/// entry fails only its own requests rather than the whole envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResponse {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<Value>,
    #[serde(default)]
    pub payload: Value,
}

impl WireResponse {
    pub fn success(payload: Value) -> Self {
        Self {
            response_type: Some(Value::from("success")),
            payload,
        }
    }

    pub fn error(payload: Value) -> Self {
        Self {
            response_type: Some(Value::from("error")),
            payload,
        }
    }

    /// Interprets the entry as a success payload or a per-request failure.
    pub fn outcome(&self) -> Result<&Value, FetchError> {
        match self.response_type.as_ref() {
            Some(Value::String(kind)) if kind == "success" => Ok(&self.payload),
            Some(Value::String(kind)) if kind == "error" => {
                Err(FetchError::Remote(self.payload.clone()))
            }
            Some(Value::String(other)) => Err(FetchError::UnknownResponseType {
                response_type: other.clone(),
            }),
            Some(other) => Err(FetchError::UnknownResponseType {
                response_type: other.to_string(),
            }),
            None => Err(FetchError::UnknownResponseType {
                response_type: "<missing>".to_string(),
            }),
        }
    }
}

/// A batch reply. A missing or zero rank disables staleness checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u64>,
    pub responses: Vec<WireResponse>,
}

impl InboundEnvelope {
    pub fn new(rank: u64, responses: Vec<WireResponse>) -> Self {
        Self {
            rank: Some(rank),
            responses,
        }
    }

    /// The rank to compare against, or `None` when staleness is not checked.
    pub fn effective_rank(&self) -> Option<u64> {
        self.rank.filter(|rank| *rank != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outbound_wire_shape() {
        let envelope = OutboundEnvelope {
            rank: 3,
            requests: vec![WireRequest {
                route: "getUsers".to_string(),
                data: json!({"whatever": 2}),
            }],
        };

        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"rank": 3, "requests": [{"route": "getUsers", "data": {"whatever": 2}}]})
        );
    }

    #[test]
    fn test_inbound_parses_batch_reply() {
        let inbound: InboundEnvelope = serde_json::from_value(json!({
            "rank": 1,
            "responses": [
                {"type": "success", "payload": [{"id": 4, "name": "Tweety"}, {"id": 95, "name": "Sylvester"}]}
            ]
        }))
        .unwrap();

        assert_eq!(inbound.effective_rank(), Some(1));
        let payload = inbound.responses[0].outcome().unwrap();
        assert_eq!(payload.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_absent_or_zero_rank_disables_staleness() {
        let absent: InboundEnvelope = serde_json::from_value(json!({"responses": []})).unwrap();
        assert_eq!(absent.effective_rank(), None);

        let zero = InboundEnvelope::new(0, vec![]);
        assert_eq!(zero.effective_rank(), None);
    }

    #[test]
    fn test_response_outcomes() {
        assert_eq!(
            WireResponse::success(json!(1)).outcome(),
            Ok(&json!(1))
        );
        assert_eq!(
            WireResponse::error(json!({"msg": "nope"})).outcome(),
            Err(FetchError::Remote(json!({"msg": "nope"})))
        );

        let unknown: WireResponse =
            serde_json::from_value(json!({"type": "partial", "payload": null})).unwrap();
        assert_eq!(
            unknown.outcome(),
            Err(FetchError::UnknownResponseType {
                response_type: "partial".to_string()
            })
        );
    }

    #[test]
    fn test_malformed_type_fails_only_its_entry() {
        let inbound: InboundEnvelope = serde_json::from_value(json!({
            "rank": 1,
            "responses": [
                {"payload": 1},
                {"type": 7, "payload": 2},
                {"type": "success", "payload": 3}
            ]
        }))
        .unwrap();

        assert_eq!(
            inbound.responses[0].outcome(),
            Err(FetchError::UnknownResponseType {
                response_type: "<missing>".to_string()
            })
        );
        assert_eq!(
            inbound.responses[1].outcome(),
            Err(FetchError::UnknownResponseType {
                response_type: "7".to_string()
            })
        );
        assert_eq!(inbound.responses[2].outcome(), Ok(&json!(3)));
    }

    #[test]
    fn test_helpers_serialize_type_tag() {
        assert_eq!(
            serde_json::to_value(WireResponse::success(json!(1))).unwrap(),
            json!({"type": "success", "payload": 1})
        );
    }
}
