//! Application configuration loaded from environment variables.
//!
//! - `POCKET_SSID` - the session credential frame (`42["auth",{...}]`)
//! - `POCKET_WEBSOCKET_URL` - overrides the endpoint picked from the
//!   credential's demo flag
//! - `POCKET_REQUEST_TIMEOUT_SECS` - wait window for acknowledgements and
//!   history responses (default 10)
//! - `POCKET_RESULT_GRACE_SECS` - extra time granted after a trade's
//!   duration before its result is considered late (default 5)

use std::time::Duration;

use zeroize::Zeroizing;

/// Demo account endpoint.
pub const DEMO_WEBSOCKET_URL: &str =
    "wss://demo-api-eu.po.market/socket.io/?EIO=4&transport=websocket";

/// Live account endpoint (Europe).
pub const LIVE_WEBSOCKET_URL: &str = "wss://api-eu.po.market/socket.io/?EIO=4&transport=websocket";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RESULT_GRACE: Duration = Duration::from_secs(5);

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub pocket: PocketConfig,
}

/// Platform connection settings.
pub struct PocketConfig {
    /// Explicit endpoint; `None` selects demo or live from the credential.
    pub websocket_url: Option<String>,
    pub ssid: Option<Zeroizing<String>>,
    pub request_timeout: Duration,
    pub result_grace: Duration,
}

impl Default for PocketConfig {
    fn default() -> Self {
        Self {
            websocket_url: None,
            ssid: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            result_grace: DEFAULT_RESULT_GRACE,
        }
    }
}

impl std::fmt::Debug for PocketConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PocketConfig")
            .field("websocket_url", &self.websocket_url)
            .field("ssid", &self.ssid.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .field("result_grace", &self.result_grace)
            .finish()
    }
}

impl PocketConfig {
    /// Returns the endpoint to connect to for an account of the given mode.
    pub fn websocket_url_for(&self, demo: bool) -> &str {
        match &self.websocket_url {
            Some(url) => url,
            None if demo => DEMO_WEBSOCKET_URL,
            None => LIVE_WEBSOCKET_URL,
        }
    }
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`OptioError::Config`](crate::OptioError::Config) if a timeout
/// variable is set but is not a whole number of seconds.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let websocket_url = non_empty_var("POCKET_WEBSOCKET_URL");
    let ssid = non_empty_var("POCKET_SSID").map(Zeroizing::new);
    let request_timeout =
        seconds_var("POCKET_REQUEST_TIMEOUT_SECS")?.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
    let result_grace = seconds_var("POCKET_RESULT_GRACE_SECS")?.unwrap_or(DEFAULT_RESULT_GRACE);

    Ok(AppConfig {
        pocket: PocketConfig {
            websocket_url,
            ssid,
            request_timeout,
            result_grace,
        },
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Parses an optional whole-seconds duration variable.
fn seconds_var(name: &str) -> crate::Result<Option<Duration>> {
    non_empty_var(name)
        .map(|raw| {
            raw.trim().parse::<u64>().map(Duration::from_secs).map_err(|e| {
                crate::OptioError::Config(format!("{name} must be a whole number of seconds: {e}"))
            })
        })
        .transpose()
}
