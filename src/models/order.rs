//! Trade placement and result models.
//!
//! A trade is placed with `openOrder`, acknowledged with
//! `successopenOrder` (carrying the server-assigned id) or refused with
//! `failopenOrder`, and eventually settled by `successcloseOrder` or
//! reported in an `updateClosedDeals` snapshot.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, server-assigned trade identifier.
pub type TradeId = Uuid;

/// Option direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Price expected to rise.
    Call,
    /// Price expected to fall.
    Put,
}

/// A caller's request to open a trade.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRequest {
    pub symbol: String,
    pub amount: Decimal,
    /// Expiry in seconds.
    pub duration: u32,
    pub action: Action,
    pub is_demo: bool,
}

impl TradeRequest {
    #[must_use]
    pub fn new(
        symbol: impl Into<String>,
        action: Action,
        amount: Decimal,
        duration: u32,
        is_demo: bool,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            amount,
            duration,
            action,
            is_demo,
        }
    }

    /// Time until the trade expires.
    pub fn window(&self) -> Duration {
        Duration::from_secs(u64::from(self.duration))
    }

    /// Builds the wire body, tagged with `request_id`.
    #[must_use]
    pub fn to_open_order(&self, request_id: u64) -> OpenOrder {
        OpenOrder {
            asset: self.symbol.clone(),
            action: self.action,
            amount: self.amount,
            is_demo: u8::from(self.is_demo),
            option_type: OPTION_TYPE_DIGITAL,
            request_id,
            time: self.duration,
        }
    }
}

/// Fixed-expiry option type used by quick trading.
const OPTION_TYPE_DIGITAL: u32 = 100;

/// Body of an outbound `openOrder` event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
    pub asset: String,
    pub action: Action,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub is_demo: u8,
    pub option_type: u32,
    pub request_id: u64,
    pub time: u32,
}

/// Body of `successopenOrder`: the placement acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    pub id: TradeId,
    pub asset: String,
    pub amount: Decimal,
    pub command: i32,
    pub request_id: u64,
    #[serde(default)]
    pub open_price: Option<Decimal>,
    #[serde(default)]
    pub percent_profit: Option<i32>,
    #[serde(default)]
    pub open_timestamp: Option<f64>,
    #[serde(default)]
    pub close_timestamp: Option<f64>,
    #[serde(default)]
    pub is_demo: Option<u8>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Body of `failopenOrder`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderFailure {
    pub error: String,
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
}

/// A settled (or settling) trade as reported by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub id: TradeId,
    pub asset: String,
    /// Zero while the trade is still running.
    #[serde(default)]
    pub profit: Decimal,
    pub command: i32,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub open_price: Option<Decimal>,
    #[serde(default)]
    pub close_price: Option<Decimal>,
    #[serde(default)]
    pub close_timestamp: Option<f64>,
}

/// Body of `successcloseOrder`.
#[derive(Debug, Clone, Deserialize)]
pub struct CloseOrder {
    pub profit: Decimal,
    pub deals: Vec<Deal>,
}

/// Win or loss of a settled trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
    /// Neither gain nor loss, e.g. a refunded or drawn trade.
    Unknown,
}

/// Final result handed to the caller that placed a trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeResult {
    pub id: TradeId,
    pub outcome: Outcome,
    pub profit: Decimal,
    /// 0 for call, 1 for put.
    pub command: i32,
}

impl From<&Deal> for TradeResult {
    fn from(deal: &Deal) -> Self {
        let outcome = if deal.profit > Decimal::ZERO {
            Outcome::Win
        } else if deal.profit < Decimal::ZERO {
            Outcome::Loss
        } else {
            Outcome::Unknown
        };
        Self {
            id: deal.id,
            outcome,
            profit: deal.profit,
            command: deal.command,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn serialize_open_order() {
        let request = TradeRequest::new("EURUSD_otc", Action::Put, dec!(1.5), 60, true);
        let json = serde_json::to_string(&request.to_open_order(42)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["asset"], "EURUSD_otc");
        assert_eq!(value["action"], "put");
        assert_eq!(value["amount"], 1.5);
        assert_eq!(value["isDemo"], 1);
        assert_eq!(value["optionType"], 100);
        assert_eq!(value["requestId"], 42);
        assert_eq!(value["time"], 60);
    }

    #[test]
    fn deal_outcomes_follow_profit_sign() {
        let id = Uuid::new_v4();
        let deal = |profit| Deal {
            id,
            asset: "EURUSD_otc".to_string(),
            profit,
            command: 0,
            amount: None,
            open_price: None,
            close_price: None,
            close_timestamp: None,
        };

        assert_eq!(TradeResult::from(&deal(dec!(0.92))).outcome, Outcome::Win);
        assert_eq!(TradeResult::from(&deal(dec!(-1))).outcome, Outcome::Loss);
        assert_eq!(TradeResult::from(&deal(dec!(0))).outcome, Outcome::Unknown);
    }
}
