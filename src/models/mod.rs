//! Wire models for the platform's Socket.IO events.
//!
//! Contains the event names the core routes on, the request counter used
//! to correlate acknowledgements, and typed bodies for orders, deals,
//! account state and market data.

pub mod account;
pub mod candle;
pub mod frame;
pub mod order;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Tracks the last request id issued so every call returns a strictly
/// increasing value even when the wall-clock hasn't advanced.
static LAST_REQUEST_ID: AtomicU64 = AtomicU64::new(0);

/// Socket.IO events the core sends or routes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Place a trade.
    OpenOrder,
    /// Placement accepted (wire name: `"successopenOrder"`).
    SuccessOpenOrder,
    /// Placement refused (wire name: `"failopenOrder"`).
    FailOpenOrder,
    /// One or more trades expired with a result (wire name: `"successcloseOrder"`).
    SuccessCloseOrder,
    /// Snapshot of recently closed trades.
    UpdateClosedDeals,
    /// Snapshot of trades still running.
    UpdateOpenedDeals,
    /// Account balance (wire name: `"successupdateBalance"`).
    SuccessUpdateBalance,
    /// Tradable assets and their payouts.
    UpdateAssets,
    /// Live quote ticks.
    UpdateStream,
    /// Switch the streamed asset.
    ChangeSymbol,
    /// Historical candle request and its response.
    LoadHistoryPeriod,
    /// Authentication accepted (wire name: `"successauth"`).
    SuccessAuth,
}

impl Event {
    /// Returns the wire-format event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::OpenOrder => "openOrder",
            Event::SuccessOpenOrder => "successopenOrder",
            Event::FailOpenOrder => "failopenOrder",
            Event::SuccessCloseOrder => "successcloseOrder",
            Event::UpdateClosedDeals => "updateClosedDeals",
            Event::UpdateOpenedDeals => "updateOpenedDeals",
            Event::SuccessUpdateBalance => "successupdateBalance",
            Event::UpdateAssets => "updateAssets",
            Event::UpdateStream => "updateStream",
            Event::ChangeSymbol => "changeSymbol",
            Event::LoadHistoryPeriod => "loadHistoryPeriod",
            Event::SuccessAuth => "successauth",
        }
    }

    /// Looks up an event by its wire name.
    pub fn from_tag(tag: &str) -> Option<Self> {
        [
            Event::OpenOrder,
            Event::SuccessOpenOrder,
            Event::FailOpenOrder,
            Event::SuccessCloseOrder,
            Event::UpdateClosedDeals,
            Event::UpdateOpenedDeals,
            Event::SuccessUpdateBalance,
            Event::UpdateAssets,
            Event::UpdateStream,
            Event::ChangeSymbol,
            Event::LoadHistoryPeriod,
            Event::SuccessAuth,
        ]
        .into_iter()
        .find(|event| event.as_str() == tag)
    }
}

/// Returns a fresh request id, strictly greater than any issued before.
///
/// Ids are seeded from the wall clock in milliseconds so they stay unique
/// across client restarts within a session.
pub fn next_request_id() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default();

    let mut prev = LAST_REQUEST_ID.load(Ordering::Relaxed);
    loop {
        let id = now.max(prev + 1);
        match LAST_REQUEST_ID.compare_exchange_weak(prev, id, Ordering::Relaxed, Ordering::Relaxed)
        {
            Ok(_) => return id,
            Err(actual) => prev = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_event_names() {
        for tag in [
            "successopenOrder",
            "updateStream",
            "loadHistoryPeriod",
            "successupdateBalance",
            "updateOpenedDeals",
        ] {
            assert_eq!(Event::from_tag(tag).map(|e| e.as_str()), Some(tag));
        }
        assert_eq!(Event::from_tag("signals/load"), None);
    }

    #[test]
    fn request_ids_are_strictly_monotonic() {
        let mut prev = next_request_id();
        for _ in 0..1_000 {
            let current = next_request_id();
            assert!(current > prev, "request id did not increase: {prev} -> {current}");
            prev = current;
        }
    }
}
