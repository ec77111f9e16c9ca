//! Async Socket.IO client for the trading platform.
//!
//! This module is organized by concern:
//! - [`connection`] - The session loop owning the socket
//! - [`handler`] - Inbound frame routing and the session command protocol
//! - [`subscription`] - Live candle streams
//! - `trading` - Order placement and trade results on [`Client`]
//!
//! [`Client`] is a cheap, cloneable handle. Every operation is a
//! [`SessionCommand`] sent to the loop, which owns all dispatch state.
//! Account state pushed by the server is read straight from the shared
//! [`AccountState`].

pub mod connection;
pub mod handler;
pub mod subscription;
mod trading;

use std::collections::HashMap;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};
use tungstenite::Message;
use tungstenite::client::IntoClientRequest;
use tungstenite::http::HeaderValue;
use zeroize::Zeroizing;

use crate::account::AccountState;
use crate::aggregator::{Aggregation, Aggregator, ChunkAggregator, resample};
use crate::config::PocketConfig;
use crate::correlator::TradeCorrelator;
use crate::models::account::Balance;
use crate::models::candle::{Candle, ChangeSymbol, HistoryRequest, Sample};
use crate::models::order::{Deal, TradeId};
use crate::models::frame::Frame;
use crate::models::{Event, next_request_id};
use crate::ssid::Ssid;
use crate::validator::Validator;
use crate::{OptioError, Result};

pub use connection::Session;
pub use handler::{Dispatcher, ServerClock, SessionCommand};
pub use subscription::Subscription;

/// Write half of a platform WebSocket connection.
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Read half of a platform WebSocket connection.
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Origin the platform expects on the upgrade request.
const ORIGIN: &str = "https://pocketoption.com";

/// Establishes a WebSocket connection to the given URL.
///
/// # Errors
///
/// Returns an [`OptioError`] if the URL is invalid or the connection or
/// TLS handshake fails.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    let mut request = url.into_client_request()?;
    request
        .headers_mut()
        .insert("Origin", HeaderValue::from_static(ORIGIN));

    let (ws_stream, _) = connect_async(request).await?;
    info!("WebSocket handshake completed");

    Ok(ws_stream.split())
}

/// Handle to a running session.
#[derive(Debug, Clone)]
pub struct Client {
    commands: mpsc::UnboundedSender<SessionCommand>,
    correlator: TradeCorrelator,
    clock: ServerClock,
    account: AccountState,
    demo: bool,
    request_timeout: Duration,
    result_grace: Duration,
}

impl Client {
    /// Connects, spawns the session loop and returns a handle to it.
    ///
    /// The credential is sent once the server opens the namespace.
    ///
    /// # Errors
    ///
    /// Returns [`OptioError::Config`] if no credential is configured,
    /// [`OptioError::Ssid`] if it cannot be parsed, and
    /// [`OptioError::WebSocket`] if the connection fails.
    pub async fn connect(config: &PocketConfig) -> Result<Self> {
        let raw = config
            .ssid
            .as_ref()
            .ok_or_else(|| OptioError::Config("POCKET_SSID is not set".to_string()))?;
        let ssid = Ssid::parse(raw)?;

        let url = config.websocket_url_for(ssid.is_demo());
        info!(url, demo = ssid.is_demo(), "Connecting to WebSocket");
        let (writer, reader) = connect(url).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let correlator = TradeCorrelator::new();
        let clock = ServerClock::new();
        let account = AccountState::new();
        let dispatcher = Dispatcher::new(correlator.clone(), clock.clone(), account.clone());
        let session = Session::new(
            writer,
            reader,
            rx,
            dispatcher,
            Zeroizing::new(ssid.auth_frame().to_string()),
        );
        tokio::spawn(session.run());

        Ok(Self {
            commands: tx,
            correlator,
            clock,
            account,
            demo: ssid.is_demo(),
            request_timeout: config.request_timeout,
            result_grace: config.result_grace,
        })
    }

    /// Returns `true` when connected to a demo account.
    pub fn is_demo(&self) -> bool {
        self.demo
    }

    /// Estimated server time in unix seconds.
    pub fn server_time(&self) -> f64 {
        self.clock.now()
    }

    /// The trade table shared with the session loop.
    pub fn correlator(&self) -> &TradeCorrelator {
        &self.correlator
    }

    /// Latest account balance pushed by the server.
    pub fn balance(&self) -> Option<Balance> {
        self.account.balance()
    }

    /// Payout percentage for `symbol`, once the asset table has arrived.
    pub fn payout(&self, symbol: &str) -> Option<u32> {
        self.account.payout(symbol)
    }

    /// Payout percentages of every known asset.
    pub fn payouts(&self) -> HashMap<String, u32> {
        self.account.payouts()
    }

    pub fn opened_deals(&self) -> Vec<Deal> {
        self.account.opened_deals()
    }

    /// Deals settled during this session, oldest first.
    pub fn closed_deals(&self) -> Vec<Deal> {
        self.account.closed_deals()
    }

    pub fn clear_closed_deals(&self) {
        self.account.clear_closed_deals();
    }

    /// Expiry of trade `id` in unix seconds, if the server reported it.
    pub fn deal_end_time(&self, id: TradeId) -> Option<f64> {
        self.account.deal_end_time(id)
    }

    /// Ends the session. Pending waits fail and subscriptions end.
    pub fn close(&self) {
        let _ = self.commands.send(SessionCommand::Close);
    }

    fn command(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| OptioError::SessionClosed)
    }

    /// Waits for a reply from the loop, bounded by `timeout` if given.
    /// Expiry is reported through `expired`.
    async fn reply<T>(
        &self,
        rx: oneshot::Receiver<T>,
        timeout: Option<Duration>,
        expired: fn(Duration) -> OptioError,
    ) -> Result<T> {
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, rx)
                .await
                .map_err(|_| expired(timeout))?
                .map_err(|_| OptioError::SessionClosed),
            None => rx.await.map_err(|_| OptioError::SessionClosed),
        }
    }

    /// Fetches `offset` seconds of `period`-second candles for `symbol`,
    /// ending at the current server time.
    ///
    /// # Errors
    ///
    /// Returns [`OptioError::InvalidDuration`] for a zero period,
    /// [`OptioError::InvalidTimestamp`] if the server clock is unusable and
    /// [`OptioError::RequestTimeout`] if the server does not answer in
    /// time.
    pub async fn get_candles(&self, symbol: &str, period: u64, offset: u64) -> Result<Vec<Candle>> {
        let now = self.clock.now();
        let time = Aggregator::new(symbol, period)?
            .window_start(now)
            .ok_or(OptioError::InvalidTimestamp(now))?;
        let index = next_request_id();
        let request = HistoryRequest {
            asset: symbol.to_string(),
            index,
            time,
            offset,
            period,
        };
        let frame = Frame::outbound_event(Event::LoadHistoryPeriod.as_str(), &request)?;

        let (tx, rx) = oneshot::channel();
        self.command(SessionCommand::LoadHistory {
            index,
            period,
            frame,
            reply: tx,
        })?;
        let candles = self
            .reply(rx, Some(self.request_timeout), OptioError::RequestTimeout)
            .await?;
        debug!(symbol, period, count = candles.len(), "Fetched candles");
        Ok(candles)
    }

    /// Fetches `base_period` history and resamples it into candles of
    /// `duration` seconds.
    ///
    /// # Errors
    ///
    /// As [`get_candles`](Self::get_candles), plus
    /// [`OptioError::InvalidDuration`] for a zero `duration`.
    pub async fn get_candles_timed(
        &self,
        symbol: &str,
        base_period: u64,
        offset: u64,
        duration: u64,
    ) -> Result<Vec<Candle>> {
        Aggregator::new(symbol, duration)?;
        let candles = self.get_candles(symbol, base_period, offset).await?;
        resample(candles.iter().map(Sample::from), duration)
    }

    /// Streams one-second candles for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`OptioError::SessionClosed`] if the session has ended.
    pub fn subscribe_symbol(&self, symbol: &str) -> Result<Subscription> {
        self.subscribe_symbol_timed(symbol, 1)
    }

    /// Streams candles of `duration` seconds for `symbol`, built from the
    /// live quote feed.
    ///
    /// # Errors
    ///
    /// Returns [`OptioError::InvalidDuration`] for a zero duration and
    /// [`OptioError::SessionClosed`] if the session has ended.
    pub fn subscribe_symbol_timed(&self, symbol: &str, duration: u64) -> Result<Subscription> {
        let aggregator = Aggregator::new(symbol, duration)?;
        info!(symbol, duration, "Subscribing to candles");
        self.subscribe(symbol, aggregator.into(), Some(duration))
    }

    /// Streams candles of `size` quotes each for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`OptioError::InvalidDuration`] for a zero size and
    /// [`OptioError::SessionClosed`] if the session has ended.
    pub fn subscribe_symbol_chunked(&self, symbol: &str, size: usize) -> Result<Subscription> {
        let aggregator = ChunkAggregator::new(symbol, size)?;
        info!(symbol, size, "Subscribing to chunked candles");
        self.subscribe(symbol, aggregator.into(), None)
    }

    fn subscribe(
        &self,
        symbol: &str,
        aggregation: Aggregation,
        duration: Option<u64>,
    ) -> Result<Subscription> {
        let frame = Frame::outbound_event(Event::ChangeSymbol.as_str(), &ChangeSymbol::new(symbol, 1))?;
        let (sink, candles) = watch::channel(None);
        let id = next_request_id();

        self.command(SessionCommand::Subscribe {
            id,
            aggregation,
            frame,
            sink,
        })?;
        Ok(Subscription::new(
            id,
            symbol.to_string(),
            duration,
            candles,
            self.commands.clone(),
        ))
    }

    /// Sends `message` verbatim and returns the first inbound frame the
    /// validator accepts, waiting as long as the session lives.
    ///
    /// # Errors
    ///
    /// Returns [`OptioError::SessionClosed`] if the session ends first.
    pub async fn create_raw_order(&self, message: &str, validator: Validator) -> Result<Frame> {
        self.raw_order(message, validator, None).await
    }

    /// Like [`create_raw_order`](Self::create_raw_order), bounded by
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`OptioError::ValidationTimeout`] if nothing matched in time.
    pub async fn create_raw_order_with_timeout(
        &self,
        message: &str,
        validator: Validator,
        timeout: Duration,
    ) -> Result<Frame> {
        self.raw_order(message, validator, Some(timeout)).await
    }

    async fn raw_order(
        &self,
        message: &str,
        validator: Validator,
        timeout: Option<Duration>,
    ) -> Result<Frame> {
        let (tx, rx) = oneshot::channel();
        self.command(SessionCommand::Match {
            frame: Some(Frame::outbound_raw(message)),
            validator,
            reply: tx,
        })?;
        self.reply(rx, timeout, OptioError::ValidationTimeout).await
    }

    /// Sends `message` verbatim without waiting for a reply.
    ///
    /// # Errors
    ///
    /// Returns [`OptioError::SessionClosed`] if the session has ended.
    pub fn send_raw_message(&self, message: &str) -> Result<()> {
        self.command(SessionCommand::Send(Frame::outbound_raw(message)))
    }
}
