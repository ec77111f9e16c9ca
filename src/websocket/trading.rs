//! Order placement and trade results.
//!
//! Placing an order sends `openOrder` tagged with a fresh request id and
//! waits for the matching `successopenOrder`. The session registers the
//! server-assigned id with the [`TradeCorrelator`](crate::correlator::TradeCorrelator)
//! before the acknowledgement reaches the caller, so a result can never
//! arrive for a trade the correlator does not know yet. Trades it no
//! longer tracks are looked up in the session's closed deals.

use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::oneshot;
use tracing::info;

use super::Client;
use super::handler::SessionCommand;
use crate::models::frame::Frame;
use crate::models::order::{Action, OrderAck, TradeId, TradeRequest, TradeResult};
use crate::models::{Event, next_request_id};
use crate::{OptioError, Result};

impl Client {
    /// Opens a call option on `symbol` expiring after `duration` seconds.
    ///
    /// # Errors
    ///
    /// See [`trade`](Self::trade).
    pub async fn buy(
        &self,
        symbol: &str,
        amount: Decimal,
        duration: u32,
    ) -> Result<(TradeId, OrderAck)> {
        self.trade(TradeRequest::new(symbol, Action::Call, amount, duration, self.demo))
            .await
    }

    /// Opens a put option on `symbol` expiring after `duration` seconds.
    ///
    /// # Errors
    ///
    /// See [`trade`](Self::trade).
    pub async fn sell(
        &self,
        symbol: &str,
        amount: Decimal,
        duration: u32,
    ) -> Result<(TradeId, OrderAck)> {
        self.trade(TradeRequest::new(symbol, Action::Put, amount, duration, self.demo))
            .await
    }

    /// Places a trade and waits for the server to acknowledge it.
    ///
    /// # Errors
    ///
    /// - [`OptioError::OrderRejected`] if the server refuses the order.
    /// - [`OptioError::RequestTimeout`] if no acknowledgement arrives
    ///   within the request timeout.
    /// - [`OptioError::SessionClosed`] if the session has ended.
    pub async fn trade(&self, request: TradeRequest) -> Result<(TradeId, OrderAck)> {
        let request_id = next_request_id();
        let frame = Frame::outbound_event(
            Event::OpenOrder.as_str(),
            &request.to_open_order(request_id),
        )?;

        let (tx, rx) = oneshot::channel();
        self.command(SessionCommand::PlaceOrder {
            request_id,
            asset: request.symbol.clone(),
            window: request.window() + self.result_grace,
            frame,
            reply: tx,
        })?;
        let ack = self
            .reply(rx, Some(self.request_timeout), OptioError::RequestTimeout)
            .await??;

        info!(
            id = %ack.id,
            request_id,
            symbol = %request.symbol,
            action = ?request.action,
            amount = %request.amount,
            duration = request.duration,
            "Trade opened"
        );
        Ok((ack.id, ack))
    }

    /// Waits once for the result of trade `id`.
    ///
    /// # Errors
    ///
    /// See [`TradeCorrelator::await_result`](crate::correlator::TradeCorrelator::await_result).
    pub async fn await_result(&self, id: TradeId, timeout: Duration) -> Result<TradeResult> {
        self.correlator.await_result(id, timeout).await
    }

    /// Returns the result of trade `id`, waiting up to twice for its
    /// duration plus the configured grace.
    ///
    /// A trade that is no longer tracked, for instance one settled before
    /// this call and since evicted, is answered from the closed deals.
    ///
    /// # Errors
    ///
    /// - [`OptioError::UnknownTradeId`] if the trade is neither tracked nor
    ///   among the closed deals.
    /// - [`OptioError::TradeResultTimeout`] if both waits expire.
    /// - [`OptioError::SessionClosed`] if the session ends before a result
    ///   arrives.
    pub async fn check_win(&self, id: TradeId) -> Result<TradeResult> {
        let Some(window) = self.correlator.window(id) else {
            return self.settled(id);
        };
        if self.commands.is_closed() {
            return self
                .correlator
                .take_result(id)
                .or_else(|| self.account.closed_deal(id).map(|deal| TradeResult::from(&deal)))
                .ok_or(OptioError::SessionClosed);
        }

        match self.correlator.await_result(id, window).await {
            Err(OptioError::ResultWaitExpired { .. }) if self.commands.is_closed() => {
                Err(OptioError::SessionClosed)
            }
            Err(OptioError::ResultWaitExpired { .. }) => {
                info!(%id, "Retrying trade result wait");
                match self.correlator.await_result(id, window).await {
                    Err(OptioError::UnknownTradeId(_)) => self.settled(id),
                    other => other,
                }
            }
            Err(OptioError::UnknownTradeId(_)) => self.settled(id),
            other => other,
        }
    }

    /// Result of `id` from the closed deals.
    fn settled(&self, id: TradeId) -> Result<TradeResult> {
        self.account
            .closed_deal(id)
            .map(|deal| TradeResult::from(&deal))
            .ok_or(OptioError::UnknownTradeId(id))
    }
}
