//! Wire envelopes for the venue WebSocket API

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::VenueError;

/// Outbound request payloads.
///
/// The session stamps every payload with the next `req_id` before sending.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundRequest {
    /// Authenticate the session
    Authorize { token: String },
    /// Request the brief asset list
    ActiveSymbols,
    /// Purchase a contract at `stake`
    Buy {
        symbol: String,
        contract_type: String,
        stake: f64,
        currency: String,
        duration: u32,
    },
    /// Subscribe to a contract's settlement stream
    SubscribeContract { contract_id: u64 },
    /// Subscribe to balance changes
    SubscribeBalance,
}

impl OutboundRequest {
    /// JSON payload without the `req_id` field.
    pub fn payload(&self) -> Value {
        match self {
            OutboundRequest::Authorize { token } => json!({ "authorize": token }),
            OutboundRequest::ActiveSymbols => json!({
                "active_symbols": "brief",
                "product_type": "basic",
            }),
            OutboundRequest::Buy {
                symbol,
                contract_type,
                stake,
                currency,
                duration,
            } => json!({
                "buy": 1,
                "price": stake,
                "parameters": {
                    "amount": stake,
                    "basis": "stake",
                    "contract_type": contract_type,
                    "currency": currency,
                    "duration": duration,
                    "duration_unit": "t",
                    "symbol": symbol,
                },
            }),
            OutboundRequest::SubscribeContract { contract_id } => json!({
                "proposal_open_contract": 1,
                "contract_id": contract_id,
                "subscribe": 1,
            }),
            OutboundRequest::SubscribeBalance => json!({ "balance": 1, "subscribe": 1 }),
        }
    }
}

/// `authorize` response payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizePayload {
    #[serde(default)]
    pub loginid: String,
    pub balance: f64,
    pub currency: String,
}

/// One entry of an `active_symbols` response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub market_display_name: String,
    #[serde(default)]
    pub exchange_is_open: i64,
}

/// `proposal` response payload (informational only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalPayload {
    #[serde(default)]
    pub display_value: String,
    #[serde(default)]
    pub payout: f64,
}

/// `buy` order acknowledgment payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyPayload {
    pub contract_id: u64,
    #[serde(default)]
    pub buy_price: f64,
}

/// `proposal_open_contract` settlement-stream payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenContractPayload {
    pub contract_id: u64,
    #[serde(default)]
    pub is_sold: i64,
    #[serde(default)]
    pub is_expired: i64,
    #[serde(default)]
    pub profit: f64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub status: String,
}

impl OpenContractPayload {
    /// Whether this update is a terminal settlement rather than an in-flight
    /// tick.
    pub fn is_settled(&self) -> bool {
        self.is_sold == 1 || self.is_expired == 1
    }
}

/// `balance` stream payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalancePayload {
    pub balance: f64,
    pub currency: String,
}

/// Parsed inbound envelope, discriminated by `msg_type`
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Frame carried an `error` field; handling short-circuits.
    /// `origin` is the request type echoed back in `echo_req`, when present.
    Error {
        code: String,
        message: String,
        origin: Option<String>,
    },
    Authorize(AuthorizePayload),
    ActiveSymbols(Vec<ActiveSymbolInfo>),
    Proposal(ProposalPayload),
    BuyAck(BuyPayload),
    OpenContract(OpenContractPayload),
    Balance(BalancePayload),
    /// Unknown message type; a no-op by design
    Ignored,
}

/// Parse one inbound frame.
///
/// An `error` field short-circuits handling regardless of message type.
/// Unknown `msg_type` values map to [`InboundMessage::Ignored`].
pub fn parse_frame(text: &str) -> Result<InboundMessage, VenueError> {
    let value: Value = serde_json::from_str(text)?;

    if let Some(error) = value.get("error") {
        let code = error
            .get("code")
            .and_then(|v| v.as_str())
            .unwrap_or("UnknownError")
            .to_string();
        let message = error
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("venue reported an error")
            .to_string();
        let origin = value
            .get("echo_req")
            .and_then(|v| v.as_object())
            .and_then(|map| {
                [
                    "buy",
                    "authorize",
                    "active_symbols",
                    "proposal",
                    "proposal_open_contract",
                    "balance",
                ]
                .into_iter()
                .find(|key| map.contains_key(*key))
            })
            .map(str::to_string);
        return Ok(InboundMessage::Error {
            code,
            message,
            origin,
        });
    }

    let Some(msg_type) = value.get("msg_type").and_then(|v| v.as_str()) else {
        return Ok(InboundMessage::Ignored);
    };

    let payload = |key: &str| value.get(key).cloned().unwrap_or(Value::Null);

    let message = match msg_type {
        "authorize" => InboundMessage::Authorize(serde_json::from_value(payload("authorize"))?),
        "active_symbols" => {
            InboundMessage::ActiveSymbols(serde_json::from_value(payload("active_symbols"))?)
        }
        "proposal" => InboundMessage::Proposal(serde_json::from_value(payload("proposal"))?),
        "buy" => InboundMessage::BuyAck(serde_json::from_value(payload("buy"))?),
        "proposal_open_contract" => InboundMessage::OpenContract(serde_json::from_value(payload(
            "proposal_open_contract",
        ))?),
        "balance" => InboundMessage::Balance(serde_json::from_value(payload("balance"))?),
        _ => InboundMessage::Ignored,
    };
    Ok(message)
}
