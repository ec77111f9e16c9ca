//! The session loop.
//!
//! [`Session`] owns the socket and the [`Dispatcher`]. A single task runs
//! [`Session::run`], which multiplexes inbound frames, caller commands and a
//! one-second clock used to close candles when no quote arrives. Engine.IO
//! keep-alive and the credential handshake are answered here, before the
//! frame is routed.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tungstenite::Message as WsMessage;
use zeroize::Zeroizing;

use super::handler::{Dispatcher, SessionCommand};
use super::{WsReader, WsWriter};
use crate::models::frame::{Frame, FrameDecoder};

/// How often open aggregations are checked against the clock.
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Why the loop exited.
#[derive(Debug)]
enum ExitReason {
    /// The server closed the socket or the stream ended.
    ConnectionClosed,
    /// Reading or writing failed.
    ConnectionError,
    /// A caller asked to close, or every client handle was dropped.
    Shutdown,
}

/// One authenticated connection and its dispatch table.
pub struct Session {
    writer: WsWriter,
    reader: WsReader,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    dispatcher: Dispatcher,
    decoder: FrameDecoder,
    auth_frame: Zeroizing<String>,
}

impl Session {
    #[must_use]
    pub fn new(
        writer: WsWriter,
        reader: WsReader,
        commands: mpsc::UnboundedReceiver<SessionCommand>,
        dispatcher: Dispatcher,
        auth_frame: Zeroizing<String>,
    ) -> Self {
        Self {
            writer,
            reader,
            commands,
            dispatcher,
            decoder: FrameDecoder::new(),
            auth_frame,
        }
    }

    /// Runs until the socket closes or the session is shut down.
    pub async fn run(mut self) {
        let reason = self.read_loop().await;
        match reason {
            ExitReason::ConnectionError => error!("Session ended on a connection error"),
            _ => info!(?reason, "Session ended"),
        }

        // Closed first so callers woken by the shutdown see a dead session.
        self.commands.close();
        self.dispatcher.shutdown();
        if let Err(e) = self.writer.close().await {
            debug!("Error closing socket: {e}");
        }
    }

    async fn read_loop(&mut self) -> ExitReason {
        let mut flush = tokio::time::interval(FLUSH_INTERVAL);
        flush.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                msg = self.reader.next() => {
                    match msg {
                        Some(Ok(WsMessage::Close(frame))) => {
                            info!(?frame, "Server closed the connection");
                            return ExitReason::ConnectionClosed;
                        }
                        Some(Ok(message)) => {
                            let Some(frame) = self.decoder.decode(message) else {
                                continue;
                            };
                            if let Some(reply) = self.control_reply(&frame)
                                && !self.send(reply).await
                            {
                                return ExitReason::ConnectionError;
                            }
                            self.dispatcher.dispatch(&frame);
                        }
                        Some(Err(e)) => {
                            warn!("WebSocket error: {e}");
                            return ExitReason::ConnectionError;
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            return ExitReason::ConnectionClosed;
                        }
                    }
                }

                cmd = self.commands.recv() => {
                    match cmd {
                        None | Some(SessionCommand::Close) => return ExitReason::Shutdown,
                        Some(cmd) => {
                            if let Some(frame) = self.dispatcher.handle_command(cmd)
                                && !self.send(frame).await
                            {
                                return ExitReason::ConnectionError;
                            }
                        }
                    }
                }

                _ = flush.tick() => self.dispatcher.flush(),
            }
        }
    }

    /// Engine.IO handshake and keep-alive replies.
    fn control_reply(&self, frame: &Frame) -> Option<Frame> {
        match frame.tag() {
            "open" => Some(Frame::outbound_raw("40")),
            "connect" => {
                info!("Namespace connected, authenticating");
                Some(Frame::outbound_raw(self.auth_frame.as_str()))
            }
            "ping" => Some(Frame::outbound_raw("3")),
            "successauth" => {
                info!("Authenticated");
                None
            }
            _ => None,
        }
    }

    /// Writes a frame, returning `false` if the socket is unusable.
    async fn send(&mut self, frame: Frame) -> bool {
        debug!(tag = frame.tag(), "Sending frame");
        match self.writer.send(frame.into_message()).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to send frame: {e}");
                false
            }
        }
    }
}
