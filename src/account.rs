//! Session account state.
//!
//! The server pushes the balance, the payout table and snapshots of open
//! and closed deals without being asked. The session loop records them in
//! an [`AccountState`] shared with every [`Client`](crate::websocket::Client)
//! handle, which reads it without a round trip. Closed deals are kept up
//! to [`MAX_CLOSED_DEALS`], newest last.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::models::account::{Asset, Balance};
use crate::models::order::{Deal, TradeId};

/// Closed deals retained for lookups.
pub const MAX_CLOSED_DEALS: usize = 1_000;

#[derive(Debug, Default)]
struct Inner {
    balance: Option<Balance>,
    payouts: HashMap<String, u32>,
    opened: Vec<Deal>,
    closed: VecDeque<Deal>,
}

/// Account snapshot shared between the session loop and its clients.
#[derive(Debug, Clone, Default)]
pub struct AccountState {
    inner: Arc<Mutex<Inner>>,
}

impl AccountState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_balance(&self, balance: Balance) {
        debug!(balance = %balance.balance, "Balance updated");
        self.lock().balance = Some(balance);
    }

    /// Latest balance, once the server has sent one.
    pub fn balance(&self) -> Option<Balance> {
        self.lock().balance.clone()
    }

    /// Replaces the payout table.
    pub fn set_assets(&self, assets: Vec<Asset>) {
        let payouts: HashMap<String, u32> = assets
            .into_iter()
            .map(|asset| (asset.symbol, asset.payout))
            .collect();
        debug!(assets = payouts.len(), "Payouts updated");
        self.lock().payouts = payouts;
    }

    /// Payout percentage for `symbol`.
    pub fn payout(&self, symbol: &str) -> Option<u32> {
        self.lock().payouts.get(symbol).copied()
    }

    pub fn payouts(&self) -> HashMap<String, u32> {
        self.lock().payouts.clone()
    }

    /// Replaces the open deals with the server's snapshot.
    pub fn set_opened_deals(&self, deals: Vec<Deal>) {
        self.lock().opened = deals;
    }

    pub fn opened_deals(&self) -> Vec<Deal> {
        self.lock().opened.clone()
    }

    /// Merges settled deals, replacing earlier copies of the same id and
    /// dropping them from the open deals.
    pub fn record_closed_deals(&self, deals: &[Deal]) {
        let mut inner = self.lock();
        for deal in deals {
            inner.opened.retain(|open| open.id != deal.id);
            inner.closed.retain(|closed| closed.id != deal.id);
            inner.closed.push_back(deal.clone());
        }
        while inner.closed.len() > MAX_CLOSED_DEALS {
            inner.closed.pop_front();
        }
    }

    /// Closed deals, oldest first.
    pub fn closed_deals(&self) -> Vec<Deal> {
        self.lock().closed.iter().cloned().collect()
    }

    pub fn closed_deal(&self, id: TradeId) -> Option<Deal> {
        self.lock().closed.iter().find(|deal| deal.id == id).cloned()
    }

    pub fn clear_closed_deals(&self) {
        self.lock().closed.clear();
    }

    /// Expiry of trade `id` in unix seconds, from the open or closed deals.
    pub fn deal_end_time(&self, id: TradeId) -> Option<f64> {
        let inner = self.lock();
        inner
            .opened
            .iter()
            .chain(inner.closed.iter())
            .find(|deal| deal.id == id)
            .and_then(|deal| deal.close_timestamp)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;

    fn deal(id: TradeId, profit: rust_decimal::Decimal) -> Deal {
        Deal {
            id,
            asset: "EURUSD_otc".to_string(),
            profit,
            command: 0,
            amount: None,
            open_price: None,
            close_price: None,
            close_timestamp: Some(1_732_830_210.0),
        }
    }

    #[test]
    fn closing_a_deal_moves_it_out_of_opened() {
        let account = AccountState::new();
        let id = Uuid::new_v4();
        account.set_opened_deals(vec![deal(id, dec!(0))]);
        assert_eq!(account.deal_end_time(id), Some(1_732_830_210.0));

        account.record_closed_deals(&[deal(id, dec!(0.92))]);
        account.record_closed_deals(&[deal(id, dec!(0.92))]);
        assert!(account.opened_deals().is_empty());
        assert_eq!(account.closed_deals().len(), 1);
        assert_eq!(account.closed_deal(id).map(|d| d.profit), Some(dec!(0.92)));

        account.clear_closed_deals();
        assert_eq!(account.closed_deal(id), None);
    }

    #[test]
    fn closed_deals_are_bounded() {
        let account = AccountState::new();
        let first = Uuid::new_v4();
        account.record_closed_deals(&[deal(first, dec!(1))]);
        let rest: Vec<Deal> = (0..MAX_CLOSED_DEALS)
            .map(|_| deal(Uuid::new_v4(), dec!(1)))
            .collect();
        account.record_closed_deals(&rest);

        assert_eq!(account.closed_deals().len(), MAX_CLOSED_DEALS);
        assert_eq!(account.closed_deal(first), None);
    }

    #[test]
    fn payouts_by_symbol() {
        let account = AccountState::new();
        account.set_assets(vec![Asset {
            id: 66,
            symbol: "EURUSD_otc".to_string(),
            name: "EUR/USD OTC".to_string(),
            payout: 92,
        }]);
        assert_eq!(account.payout("EURUSD_otc"), Some(92));
        assert_eq!(account.payout("GBPUSD_otc"), None);
        assert!(account.balance().is_none());
    }
}
