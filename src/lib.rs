//! Streaming and correlation core for a Socket.IO binary-options platform.
//!
//! Provides a composable frame [`validator`], fixed-duration candle
//! [`aggregator`]s fed from the live quote stream, and a trade
//! [`correlator`] that matches placed trades to their eventual results,
//! all driven by a single session loop behind [`websocket::Client`]. The
//! loop also keeps the pushed [`account`] state.

pub mod account;
pub mod aggregator;
pub mod config;
pub mod correlator;
pub mod credentials;
pub mod error;
pub mod models;
pub mod ssid;
pub mod validator;
pub mod websocket;

pub use error::{OptioError, Result};
