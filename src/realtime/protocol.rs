//! JSON wire protocol for the real-time broadcast server.
//!
//! Frames are `{type, ...}` objects; the `type` tag selects the variant.

use crate::core::{RealTimeAlert, RealTimeMetrics};
use serde::{Deserialize, Serialize};

/// Distinguished room that receives periodic metrics pushes.
pub const REALTIME_METRICS_ROOM: &str = "realtime-metrics";

/// Room that receives alert lifecycle frames.
pub const ALERTS_ROOM: &str = "alerts";

/// Frames sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Supply credentials after connecting. Either field may be set.
    #[serde(rename = "authenticate")]
    Authenticate {
        #[serde(default)]
        token: Option<String>,
        #[serde(rename = "apiKey", default)]
        api_key: Option<String>,
    },
    #[serde(rename = "subscribe")]
    Subscribe { room: String },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { room: String },
    /// Negotiate the per-client push frequency, in milliseconds.
    #[serde(rename = "setMetricsFrequency")]
    SetMetricsFrequency { frequency: u64 },
    #[serde(rename = "ping")]
    Ping,
}

/// Frames sent by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "connected")]
    Connected {
        #[serde(rename = "clientId")]
        client_id: String,
    },
    #[serde(rename = "connected_unauthenticated")]
    ConnectedUnauthenticated {
        #[serde(rename = "clientId")]
        client_id: String,
    },
    #[serde(rename = "authenticated")]
    Authenticated {
        method: String,
        #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    #[serde(rename = "subscribed")]
    Subscribed { room: String },
    #[serde(rename = "unsubscribed")]
    Unsubscribed { room: String },
    #[serde(rename = "frequencyUpdated")]
    FrequencyUpdated { frequency: u64 },
    #[serde(rename = "realtime-metrics")]
    RealtimeMetrics { data: RealTimeMetrics },
    #[serde(rename = "new_alert")]
    NewAlert { data: RealTimeAlert },
    #[serde(rename = "alert_acknowledged")]
    AlertAcknowledged { data: RealTimeAlert },
    #[serde(rename = "pong")]
    Pong { timestamp: i64 },
    #[serde(rename = "ping")]
    Ping { timestamp: i64 },
    #[serde(rename = "error")]
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        timestamp: i64,
    },
}

impl ServerMessage {
    /// Error frame with the current timestamp.
    pub fn error(message: impl Into<String>, code: Option<&str>) -> Self {
        ServerMessage::Error {
            error: message.into(),
            code: code.map(str::to_string),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_parsing() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","room":"realtime-metrics"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Subscribe {
                room: "realtime-metrics".to_string()
            }
        );

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"setMetricsFrequency","frequency":5000}"#).unwrap();
        assert_eq!(msg, ClientMessage::SetMetricsFrequency { frequency: 5000 });

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"authenticate","apiKey":"k1"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Authenticate {
                token: None,
                api_key: Some("k1".to_string())
            }
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"shout"}"#).is_err());
    }

    #[test]
    fn test_server_message_wire_names() {
        let json = serde_json::to_string(&ServerMessage::Subscribed {
            room: "alerts".to_string(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"subscribed""#));

        let json = serde_json::to_string(&ServerMessage::Authenticated {
            method: "token".to_string(),
            user_id: Some("u1".to_string()),
        })
        .unwrap();
        assert!(json.contains(r#""userId":"u1""#));

        // Absent optional fields are omitted, not null.
        let json = serde_json::to_string(&ServerMessage::error("bad frame", None)).unwrap();
        assert!(!json.contains("code"));
    }
}
