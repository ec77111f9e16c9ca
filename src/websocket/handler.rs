//! Inbound frame routing.
//!
//! [`Dispatcher`] is the dispatch table of a session: one-shot validator
//! waiters, order acknowledgement waiters, history waiters and live
//! aggregations. It is owned by the session loop and only ever mutated
//! there, through [`SessionCommand`]s and inbound frames. It performs no
//! I/O itself; frames it wants sent are returned to the loop. Pushed
//! account state is written through to the shared [`AccountState`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

use crate::account::AccountState;
use crate::aggregator::Aggregation;
use crate::correlator::TradeCorrelator;
use crate::models::Event;
use crate::models::account::{Asset, Balance};
use crate::models::candle::{Candle, HistoryResponse, MAX_UNIX_SECS, Sample, Tick};
use crate::models::frame::Frame;
use crate::models::order::{CloseOrder, Deal, OrderAck, OrderFailure, TradeResult};
use crate::validator::Validator;
use crate::{OptioError, Result};

/// Requests from a [`Client`](super::Client) to its session loop.
#[derive(Debug)]
pub enum SessionCommand {
    /// Send a frame without waiting for anything.
    Send(Frame),
    /// Send `frame` (if any) and reply with the first inbound frame the
    /// validator accepts.
    Match {
        frame: Option<Frame>,
        validator: Validator,
        reply: oneshot::Sender<Frame>,
    },
    /// Send an `openOrder` and reply with its acknowledgement.
    PlaceOrder {
        request_id: u64,
        asset: String,
        /// Result wait window registered with the correlator on success.
        window: Duration,
        frame: Frame,
        reply: oneshot::Sender<Result<OrderAck>>,
    },
    /// Send a `loadHistoryPeriod` and reply with the candles of `index`.
    LoadHistory {
        index: u64,
        period: u64,
        frame: Frame,
        reply: oneshot::Sender<Vec<Candle>>,
    },
    /// Start feeding an aggregation and switch the quote stream to it.
    Subscribe {
        id: u64,
        aggregation: Aggregation,
        frame: Frame,
        sink: watch::Sender<Option<Candle>>,
    },
    Unsubscribe(u64),
    /// End the session.
    Close,
}

/// Estimate of the server's clock, learned from quote timestamps.
#[derive(Debug, Clone, Default)]
pub struct ServerClock {
    offset_ms: Arc<AtomicI64>,
}

impl ServerClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a server timestamp observed just now. Times that are not
    /// plausible unix timestamps are ignored.
    pub fn observe(&self, server_time: f64) {
        if !server_time.is_finite() || server_time.abs() > MAX_UNIX_SECS {
            debug!(server_time, "Ignoring unusable server time");
            return;
        }
        let offset = ((server_time - local_now()) * 1_000.0).round() as i64;
        self.offset_ms.store(offset, Ordering::Relaxed);
    }

    /// Estimated server time in unix seconds.
    pub fn now(&self) -> f64 {
        local_now() + self.offset_ms.load(Ordering::Relaxed) as f64 / 1_000.0
    }
}

fn local_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

struct PendingOrder {
    request_id: u64,
    asset: String,
    window: Duration,
    reply: oneshot::Sender<Result<OrderAck>>,
}

struct PendingHistory {
    period: u64,
    reply: oneshot::Sender<Vec<Candle>>,
}

struct LiveAggregation {
    aggregation: Aggregation,
    sink: watch::Sender<Option<Candle>>,
}

impl LiveAggregation {
    fn emit(&self, candle: Candle) {
        debug!(
            symbol = %candle.symbol,
            duration = candle.duration,
            open_time = candle.open_time,
            "Closed candle"
        );
        self.sink.send_replace(Some(candle));
    }
}

/// The dispatch table of one session.
pub struct Dispatcher {
    matchers: Vec<(Validator, oneshot::Sender<Frame>)>,
    orders: VecDeque<PendingOrder>,
    history: HashMap<u64, PendingHistory>,
    streams: HashMap<u64, LiveAggregation>,
    correlator: TradeCorrelator,
    clock: ServerClock,
    account: AccountState,
}

impl Dispatcher {
    #[must_use]
    pub fn new(correlator: TradeCorrelator, clock: ServerClock, account: AccountState) -> Self {
        Self {
            matchers: Vec::new(),
            orders: VecDeque::new(),
            history: HashMap::new(),
            streams: HashMap::new(),
            correlator,
            clock,
            account,
        }
    }

    /// Applies a command, returning the frame to send for it, if any.
    ///
    /// Waiters are registered before their frame is returned, so a reply
    /// can never race past its waiter.
    pub fn handle_command(&mut self, command: SessionCommand) -> Option<Frame> {
        match command {
            SessionCommand::Send(frame) => Some(frame),
            SessionCommand::Match {
                frame,
                validator,
                reply,
            } => {
                self.matchers.push((validator, reply));
                frame
            }
            SessionCommand::PlaceOrder {
                request_id,
                asset,
                window,
                frame,
                reply,
            } => {
                self.orders.push_back(PendingOrder {
                    request_id,
                    asset,
                    window,
                    reply,
                });
                Some(frame)
            }
            SessionCommand::LoadHistory {
                index,
                period,
                frame,
                reply,
            } => {
                self.history.insert(index, PendingHistory { period, reply });
                Some(frame)
            }
            SessionCommand::Subscribe {
                id,
                aggregation,
                frame,
                sink,
            } => {
                debug!(id, symbol = aggregation.symbol(), "Subscribed aggregation");
                self.streams
                    .insert(id, LiveAggregation { aggregation, sink });
                Some(frame)
            }
            SessionCommand::Unsubscribe(id) => {
                if self.streams.remove(&id).is_some() {
                    debug!(id, "Unsubscribed aggregation");
                }
                None
            }
            SessionCommand::Close => None,
        }
    }

    /// Drops every waiter and aggregation whose receiving side is gone.
    pub fn prune(&mut self) {
        self.matchers.retain(|(_, reply)| !reply.is_closed());
        self.orders.retain(|order| !order.reply.is_closed());
        self.history.retain(|_, pending| !pending.reply.is_closed());
        self.streams.retain(|_, live| !live.sink.is_closed());
    }

    /// Routes one inbound frame.
    pub fn dispatch(&mut self, frame: &Frame) {
        self.prune();
        self.match_validators(frame);

        // The body of a binary event arrives with the next frame.
        if frame.is_placeholder() {
            return;
        }
        let Some(event) = Event::from_tag(frame.tag()) else {
            return;
        };

        let routed = match event {
            Event::SuccessOpenOrder => body::<OrderAck>(frame).map(|ack| self.on_order_ack(ack)),
            Event::FailOpenOrder => {
                body::<OrderFailure>(frame).map(|failure| self.on_order_failure(failure))
            }
            Event::SuccessCloseOrder => body::<CloseOrder>(frame).map(|close| self.on_deals(&close.deals)),
            Event::UpdateClosedDeals => body::<Vec<Deal>>(frame).map(|deals| self.on_deals(&deals)),
            Event::UpdateOpenedDeals => {
                body::<Vec<Deal>>(frame).map(|deals| self.account.set_opened_deals(deals))
            }
            Event::SuccessUpdateBalance => {
                body::<Balance>(frame).map(|balance| self.account.set_balance(balance))
            }
            Event::UpdateAssets => body::<Vec<Asset>>(frame).map(|assets| self.account.set_assets(assets)),
            Event::UpdateStream => body::<Vec<Tick>>(frame).map(|ticks| self.on_ticks(ticks)),
            Event::LoadHistoryPeriod => {
                body::<HistoryResponse>(frame).map(|history| self.on_history(history))
            }
            _ => Ok(()),
        };

        if let Err(e) = routed {
            warn!(tag = frame.tag(), error = %e, "Dropping frame");
        }
    }

    /// Closes aggregations whose window has elapsed on the server clock
    /// and drops trades nobody waits on any more.
    pub fn flush(&mut self) {
        let now = self.clock.now();
        for live in self.streams.values_mut() {
            if let Some(candle) = live.aggregation.flush(now) {
                live.emit(candle);
            }
        }
        let evicted = self.correlator.evict_stale();
        if evicted > 0 {
            debug!(evicted, "Evicted stale trades");
        }
    }

    /// Releases everything on session end. Waiters observe a closed
    /// channel and subscriptions end.
    pub fn shutdown(&mut self) {
        self.matchers.clear();
        self.orders.clear();
        self.history.clear();
        self.streams.clear();
        self.correlator.release_waiters();
    }

    /// Number of registered waiters and aggregations.
    pub fn registered(&self) -> usize {
        self.matchers.len() + self.orders.len() + self.history.len() + self.streams.len()
    }

    fn match_validators(&mut self, frame: &Frame) {
        if self.matchers.is_empty() {
            return;
        }
        let mut waiting = Vec::with_capacity(self.matchers.len());
        for (validator, reply) in self.matchers.drain(..) {
            if validator.evaluate(frame) {
                debug!(tag = frame.tag(), "Validator matched frame");
                let _ = reply.send(frame.clone());
            } else {
                waiting.push((validator, reply));
            }
        }
        self.matchers = waiting;
    }

    fn on_order_ack(&mut self, ack: OrderAck) {
        let Some(pos) = self
            .orders
            .iter()
            .position(|order| order.request_id == ack.request_id)
        else {
            debug!(id = %ack.id, request_id = ack.request_id, "Acknowledgement for an order placed elsewhere");
            return;
        };
        let Some(order) = self.orders.remove(pos) else {
            return;
        };
        self.correlator.register(ack.id, order.window);
        debug!(id = %ack.id, request_id = ack.request_id, "Order acknowledged");
        let _ = order.reply.send(Ok(ack));
    }

    /// Failures carry no request id; the oldest pending order for the
    /// asset takes it.
    fn on_order_failure(&mut self, failure: OrderFailure) {
        let pos = self.orders.iter().position(|order| {
            failure
                .asset
                .as_deref()
                .is_none_or(|asset| asset == order.asset)
        });
        match pos.and_then(|pos| self.orders.remove(pos)) {
            Some(order) => {
                debug!(request_id = order.request_id, error = %failure.error, "Order rejected");
                let _ = order.reply.send(Err(OptioError::OrderRejected(failure.error)));
            }
            None => warn!(error = %failure.error, "Order rejection with no pending order"),
        }
    }

    fn on_deals(&mut self, deals: &[Deal]) {
        self.account.record_closed_deals(deals);
        for deal in deals {
            if !self.correlator.resolve(TradeResult::from(deal)) {
                debug!(id = %deal.id, "Discarding result for untracked trade");
            }
        }
    }

    fn on_ticks(&mut self, ticks: Vec<Tick>) {
        if let Some(latest) = ticks
            .iter()
            .map(|t| t.time)
            .filter(|time| time.is_finite() && time.abs() <= MAX_UNIX_SECS)
            .reduce(f64::max)
        {
            self.clock.observe(latest);
        }
        for tick in ticks {
            let sample = Sample::from(tick);
            for live in self.streams.values_mut() {
                if let Some(candle) = live.aggregation.push(sample.clone()) {
                    live.emit(candle);
                }
            }
        }
    }

    fn on_history(&mut self, history: HistoryResponse) {
        match self.history.remove(&history.index) {
            Some(pending) => {
                let candles = history.into_candles(pending.period);
                debug!(count = candles.len(), "History loaded");
                let _ = pending.reply.send(candles);
            }
            None => debug!(index = history.index, "History response nobody asked for"),
        }
    }
}

/// Parses a frame body into `T`.
fn body<T: DeserializeOwned>(frame: &Frame) -> Result<T> {
    let value = frame
        .body()?
        .ok_or_else(|| OptioError::MalformedFrame(format!("{}: missing body", frame.tag())))?;
    serde_json::from_value(value)
        .map_err(|e| OptioError::MalformedFrame(format!("{}: {e}", frame.tag())))
}
