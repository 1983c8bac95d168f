//! Push-channel protocol: tagged envelopes out, action frames in.

use crate::domain::{MarketStatus, RealtimeQuote};
use serde::{Deserialize, Serialize};

/// Server-to-client envelope. The `type` tag discriminates the payload so
/// clients never have to sniff `data` shapes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEnvelope {
    Quote { data: RealtimeQuote },
    Status { data: MarketStatus },
    Error { message: String },
    Subscribed { data: Vec<String>, message: String },
    Unsubscribed { data: Vec<String>, message: String },
}

/// Client-to-server frame.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientRequest {
    pub action: ClientAction,
    #[serde(default)]
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientAction {
    Subscribe,
    Unsubscribe,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_tagging() {
        let env = PushEnvelope::Error {
            message: "bad frame".to_string(),
        };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "bad frame");

        let env = PushEnvelope::Subscribed {
            data: vec!["2330".to_string()],
            message: "subscribed".to_string(),
        };
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "subscribed");
        assert_eq!(json["data"][0], "2330");
    }

    #[test]
    fn test_client_request_parsing() {
        let req: ClientRequest =
            serde_json::from_str(r#"{"action":"subscribe","symbols":["2330","2317"]}"#).unwrap();
        assert_eq!(req.action, ClientAction::Subscribe);
        assert_eq!(req.symbols, vec!["2330", "2317"]);

        let req: ClientRequest = serde_json::from_str(r#"{"action":"unsubscribe"}"#).unwrap();
        assert_eq!(req.action, ClientAction::Unsubscribe);
        assert!(req.symbols.is_empty());

        assert!(serde_json::from_str::<ClientRequest>(r#"{"action":"noop"}"#).is_err());
    }
}
