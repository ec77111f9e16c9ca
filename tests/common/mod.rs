//! Shared test utilities: a scripted local Socket.IO server.

#![allow(dead_code)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use optio::config::PocketConfig;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tungstenite::Message;
use zeroize::Zeroizing;

/// Demo credential accepted by [`MockServer`].
pub const DEMO_SSID: &str =
    r#"42["auth",{"session":"test-session","isDemo":1,"uid":87742848,"platform":2}]"#;

/// How long a test waits for the client to send something.
const EXPECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A one-connection WebSocket server speaking just enough Engine.IO.
///
/// It opens the session as soon as the client connects, answers the
/// namespace connect with a `40{...}` and forwards every text frame it
/// receives to [`MockServer::expect`].
pub struct MockServer {
    pub url: String,
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl MockServer {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("Listener has no address");
        let (in_tx, inbound) = mpsc::unbounded_channel();
        let (outbound, mut out_rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("Failed to accept");
            let ws = tokio_tungstenite::accept_async(stream)
                .await
                .expect("WebSocket handshake failed");
            let (mut write, mut read) = ws.split();

            let open = r#"0{"sid":"s1","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;
            if write.send(Message::Text(open.into())).await.is_err() {
                return;
            }

            loop {
                tokio::select! {
                    msg = read.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            if text.as_str() == "40"
                                && write.send(Message::Text(r#"40{"sid":"n1"}"#.into())).await.is_err()
                            {
                                break;
                            }
                            let _ = in_tx.send(text.as_str().to_string());
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    },
                    out = out_rx.recv() => match out {
                        Some(message) => {
                            if write.send(message).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        Self {
            url: format!("ws://{addr}/socket.io/?EIO=4&transport=websocket"),
            inbound,
            outbound,
        }
    }

    /// Client configuration pointing at this server.
    pub fn config(&self) -> PocketConfig {
        PocketConfig {
            websocket_url: Some(self.url.clone()),
            ssid: Some(Zeroizing::new(DEMO_SSID.to_string())),
            request_timeout: Duration::from_secs(2),
            result_grace: Duration::from_secs(1),
        }
    }

    /// Waits for the first client frame satisfying `pred`, skipping others.
    pub async fn expect(&mut self, pred: impl Fn(&str) -> bool) -> String {
        tokio::time::timeout(EXPECT_TIMEOUT, async {
            loop {
                let text = self.inbound.recv().await.expect("Server task ended");
                if pred(&text) {
                    return text;
                }
            }
        })
        .await
        .expect("Client never sent the expected frame")
    }

    /// Completes the Engine.IO handshake and authentication.
    pub async fn handshake(&mut self) {
        self.expect(|t| t == "40").await;
        self.expect(|t| t.starts_with(r#"42["auth","#)).await;
        self.send_text(r#"42["successauth",{"id":"n1"}]"#);
    }

    pub fn send_text(&self, text: &str) {
        self.outbound
            .send(Message::Text(text.into()))
            .expect("Server task ended");
    }

    /// Sends `body` the way the platform does: a placeholder header followed
    /// by a binary attachment.
    pub fn send_event(&self, event: &str, body: &serde_json::Value) {
        self.send_text(&format!(
            r#"451-["{event}",{{"_placeholder":true,"num":0}}]"#
        ));
        self.outbound
            .send(Message::Binary(body.to_string().into_bytes().into()))
            .expect("Server task ended");
    }
}

/// Extracts the JSON body of an outbound `42["event",body]` frame.
pub fn event_body(text: &str) -> serde_json::Value {
    let envelope: serde_json::Value =
        serde_json::from_str(text.trim_start_matches("42")).expect("Invalid event frame");
    envelope[1].clone()
}
