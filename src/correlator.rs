//! Matches placed trades to their eventual results.
//!
//! Each trade id owns one [`PendingTrade`] entry with its own oneshot
//! slot, so waits on different ids never contend beyond a short lock of
//! the table. A caller that sees no result within its window gets one
//! more attempt: the retry budget lives on the entry as `attempts_used`,
//! and only the second expiry fails the trade and removes it.
//!
//! Results can arrive before anyone waits (the server settles short
//! trades quickly); they are kept on the entry and handed to the next
//! [`TradeCorrelator::await_result`].
//!
//! Entries nobody waits on are dropped by [`TradeCorrelator::evict_stale`]
//! once both wait windows have passed since the trade was registered or
//! last waited on. The settled deal itself stays available in the
//! session's [`AccountState`](crate::account::AccountState).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::models::order::{TradeId, TradeResult};
use crate::{OptioError, Result};

/// Attempts a caller gets before a trade is failed.
const MAX_ATTEMPTS: u8 = 2;

/// Where a trade is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeState {
    AwaitingResult,
    /// A result arrived and is waiting to be collected.
    Resolved,
    /// Both attempts expired. The entry is removed right after.
    Failed,
}

#[derive(Debug)]
struct PendingTrade {
    state: TradeState,
    attempts_used: u8,
    waiter: Option<oneshot::Sender<TradeResult>>,
    result: Option<TradeResult>,
    window: Duration,
    /// Registration, or the end of the last expired wait.
    touched: Instant,
}

impl PendingTrade {
    fn is_awaited(&self) -> bool {
        self.waiter.as_ref().is_some_and(|w| !w.is_closed())
    }

    fn is_stale(&self, now: Instant) -> bool {
        let budget = self.window.saturating_mul(u32::from(MAX_ATTEMPTS));
        !self.is_awaited()
            && self
                .touched
                .checked_add(budget)
                .is_some_and(|deadline| now >= deadline)
    }
}

/// Shared table of trades awaiting a result.
#[derive(Debug, Clone, Default)]
pub struct TradeCorrelator {
    trades: Arc<Mutex<HashMap<TradeId, PendingTrade>>>,
}

impl TradeCorrelator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<TradeId, PendingTrade>> {
        self.trades.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts tracking a placed trade. `window` is the default wait used by
    /// [`check_win`](crate::websocket::Client::check_win).
    pub fn register(&self, id: TradeId, window: Duration) {
        self.table().insert(
            id,
            PendingTrade {
                state: TradeState::AwaitingResult,
                attempts_used: 0,
                waiter: None,
                result: None,
                window,
                touched: Instant::now(),
            },
        );
        debug!(%id, window_secs = window.as_secs(), "Registered trade");
    }

    /// Waits up to `timeout` for the result of trade `id`.
    ///
    /// # Errors
    ///
    /// - [`OptioError::UnknownTradeId`] if the trade is not tracked.
    /// - [`OptioError::AlreadyAwaiting`] if another caller is waiting on it.
    /// - [`OptioError::ResultWaitExpired`] on the first expiry. The entry is
    ///   kept and the caller may wait once more.
    /// - [`OptioError::TradeResultTimeout`] on the second expiry. The entry
    ///   is removed.
    pub async fn await_result(&self, id: TradeId, timeout: Duration) -> Result<TradeResult> {
        let rx = {
            let mut table = self.table();
            let entry = table.get_mut(&id).ok_or(OptioError::UnknownTradeId(id))?;
            if let Some(result) = entry.result.take() {
                table.remove(&id);
                return Ok(result);
            }
            if entry.is_awaited() {
                return Err(OptioError::AlreadyAwaiting(id));
            }
            let (tx, rx) = oneshot::channel();
            entry.waiter = Some(tx);
            rx
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => Ok(result),
            // Sender dropped without a result: same as an expiry.
            Ok(Err(_)) | Err(_) => self.expire(id),
        }
    }

    /// Spends one attempt for `id`, failing the trade when none remain.
    fn expire(&self, id: TradeId) -> Result<TradeResult> {
        let mut table = self.table();
        let entry = table.get_mut(&id).ok_or(OptioError::UnknownTradeId(id))?;

        // Delivered between the timer firing and this lock.
        if let Some(result) = entry.result.take() {
            table.remove(&id);
            return Ok(result);
        }

        entry.waiter = None;
        entry.touched = Instant::now();
        entry.attempts_used += 1;
        if entry.attempts_used < MAX_ATTEMPTS {
            info!(%id, attempts_used = entry.attempts_used, "Trade result wait expired, one attempt left");
            return Err(OptioError::ResultWaitExpired { id });
        }

        entry.state = TradeState::Failed;
        warn!(%id, state = ?entry.state, attempts = MAX_ATTEMPTS, "Trade result never arrived");
        table.remove(&id);
        Err(OptioError::TradeResultTimeout {
            id,
            attempts: MAX_ATTEMPTS,
        })
    }

    /// Delivers a result. Returns `false` if the trade is not tracked.
    pub fn resolve(&self, result: TradeResult) -> bool {
        let id = result.id;
        let mut table = self.table();
        let Some(entry) = table.get_mut(&id) else {
            return false;
        };

        let undelivered = match entry.waiter.take() {
            Some(tx) => tx.send(result).err(),
            None => Some(result),
        };
        match undelivered {
            Some(result) => {
                entry.state = TradeState::Resolved;
                entry.result = Some(result);
                debug!(%id, "Stored trade result for a later wait");
            }
            None => {
                table.remove(&id);
                debug!(%id, "Delivered trade result");
            }
        }
        true
    }

    /// Takes a result that arrived with nobody waiting, removing the trade.
    pub fn take_result(&self, id: TradeId) -> Option<TradeResult> {
        let mut table = self.table();
        let result = table.get_mut(&id)?.result.take()?;
        table.remove(&id);
        Some(result)
    }

    /// Drops trades that nobody waits on and whose wait budget has run
    /// out. Returns how many were dropped.
    pub fn evict_stale(&self) -> usize {
        let now = Instant::now();
        let mut table = self.table();
        let before = table.len();
        table.retain(|id, entry| {
            let stale = entry.is_stale(now);
            if stale {
                debug!(%id, state = ?entry.state, "Evicting stale trade");
            }
            !stale
        });
        before - table.len()
    }

    pub fn state(&self, id: TradeId) -> Option<TradeState> {
        self.table().get(&id).map(|entry| entry.state)
    }

    pub fn attempts_used(&self, id: TradeId) -> Option<u8> {
        self.table().get(&id).map(|entry| entry.attempts_used)
    }

    /// Default wait window recorded at registration.
    pub fn window(&self, id: TradeId) -> Option<Duration> {
        self.table().get(&id).map(|entry| entry.window)
    }

    /// Number of tracked trades.
    pub fn pending(&self) -> usize {
        self.table().len()
    }

    /// Wakes every waiter. Each wakes as if its wait had expired.
    pub fn release_waiters(&self) {
        for entry in self.table().values_mut() {
            entry.waiter = None;
        }
    }
}
