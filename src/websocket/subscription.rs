//! Live candle subscriptions.
//!
//! A [`Subscription`] receives candles from one aggregation running in the
//! session loop. The hand-off is a single-slot `watch` channel: the loop
//! never waits on a slow consumer, and a newly closed candle replaces one
//! that was not consumed yet. Candles still arrive in increasing
//! `open_time` order.

use futures_util::Stream;
use futures_util::stream;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::handler::SessionCommand;
use crate::models::candle::Candle;
use crate::{OptioError, Result};

/// A cancellable, unbounded sequence of closed candles.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    symbol: String,
    duration: Option<u64>,
    candles: watch::Receiver<Option<Candle>>,
    commands: mpsc::UnboundedSender<SessionCommand>,
    cancelled: bool,
}

impl Subscription {
    pub(crate) fn new(
        id: u64,
        symbol: String,
        duration: Option<u64>,
        candles: watch::Receiver<Option<Candle>>,
        commands: mpsc::UnboundedSender<SessionCommand>,
    ) -> Self {
        Self {
            id,
            symbol,
            duration,
            candles,
            commands,
            cancelled: false,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Candle duration in seconds, `None` for candles of a fixed quote
    /// count.
    pub fn duration(&self) -> Option<u64> {
        self.duration
    }

    /// Waits for the next closed candle.
    ///
    /// # Errors
    ///
    /// Returns [`OptioError::StreamCancelled`] once the subscription was
    /// cancelled or its session ended.
    pub async fn next_candle(&mut self) -> Result<Candle> {
        loop {
            if self.cancelled {
                return Err(OptioError::StreamCancelled);
            }
            self.candles
                .changed()
                .await
                .map_err(|_| OptioError::StreamCancelled)?;
            if let Some(candle) = self.candles.borrow_and_update().clone() {
                return Ok(candle);
            }
        }
    }

    /// Stops the aggregation. Safe to call more than once.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        debug!(id = self.id, symbol = %self.symbol, "Cancelling subscription");
        // A closed loop has already dropped the aggregation.
        let _ = self.commands.send(SessionCommand::Unsubscribe(self.id));
    }

    /// Converts the subscription into a stream that ends on cancellation.
    pub fn into_stream(self) -> impl Stream<Item = Candle> + Send {
        stream::unfold(self, |mut sub| async move {
            let candle = sub.next_candle().await.ok()?;
            Some((candle, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use rust_decimal_macros::dec;

    use super::*;

    fn candle(open_time: i64) -> Candle {
        Candle {
            symbol: "EURUSD_otc".to_string(),
            open: dec!(1),
            high: dec!(1),
            low: dec!(1),
            close: dec!(1),
            volume: None,
            open_time,
            duration: 60,
        }
    }

    fn subscription() -> (
        Subscription,
        watch::Sender<Option<Candle>>,
        mpsc::UnboundedReceiver<SessionCommand>,
    ) {
        let (sink, candles) = watch::channel(None);
        let (tx, rx) = mpsc::unbounded_channel();
        let sub = Subscription::new(7, "EURUSD_otc".to_string(), Some(60), candles, tx);
        (sub, sink, rx)
    }

    #[test]
    fn waits_for_a_closed_candle() {
        let (mut sub, sink, _rx) = subscription();
        let mut next = tokio_test::task::spawn(sub.next_candle());
        tokio_test::assert_pending!(next.poll());

        sink.send_replace(Some(candle(60)));
        assert!(next.is_woken());
        let candle = tokio_test::assert_ready_ok!(next.poll());
        assert_eq!(candle.open_time, 60);
    }

    #[tokio::test]
    async fn latest_candle_wins() {
        let (mut sub, sink, _rx) = subscription();
        sink.send_replace(Some(candle(0)));
        sink.send_replace(Some(candle(60)));

        assert_eq!(sub.next_candle().await.unwrap().open_time, 60);
    }

    #[tokio::test]
    async fn cancel_unsubscribes_once() {
        let (mut sub, _sink, mut rx) = subscription();
        sub.cancel();
        sub.cancel();
        drop(sub);

        assert!(matches!(rx.recv().await, Some(SessionCommand::Unsubscribe(7))));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn cancelled_subscription_yields_nothing() {
        let (mut sub, sink, _rx) = subscription();
        sink.send_replace(Some(candle(0)));
        sub.cancel();
        assert!(matches!(sub.next_candle().await, Err(OptioError::StreamCancelled)));
    }

    #[tokio::test]
    async fn stream_ends_when_session_drops_the_aggregation() {
        let (sub, sink, _rx) = subscription();
        let mut stream = Box::pin(sub.into_stream());
        sink.send_replace(Some(candle(0)));
        assert_eq!(stream.next().await.map(|c| c.open_time), Some(0));

        drop(sink);
        assert!(stream.next().await.is_none());
    }
}
