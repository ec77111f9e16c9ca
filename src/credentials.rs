//! Secure credential storage via the system keychain.
//!
//! The session credential is long-lived and grants trading access, so it
//! can be kept in the keychain instead of a shell profile. At startup,
//! [`populate_env_from_keychain`] copies a stored credential into
//! `POCKET_SSID` so the regular config flow picks it up transparently.

use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Keychain service name used for all stored credentials.
const SERVICE: &str = "optio";

/// Keychain entry holding the session credential.
const SSID_ENTRY: &str = "pocket_ssid";

/// Environment variable read by [`crate::config::fetch_config`].
const SSID_ENV: &str = "POCKET_SSID";

/// Loads the session credential from the keychain, returning `None` if not set.
pub fn load_ssid() -> Option<Zeroizing<String>> {
    let entry = keyring::Entry::new(SERVICE, SSID_ENTRY).ok()?;
    match entry.get_password() {
        Ok(password) => Some(Zeroizing::new(password)),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(entry = SSID_ENTRY, error = %e, "failed to read keychain entry");
            None
        }
    }
}

/// Saves the session credential to the keychain.
///
/// The value is validated first so a mistyped credential is never stored.
///
/// # Errors
///
/// Returns [`OptioError::Ssid`](crate::OptioError::Ssid) for an unparsable
/// credential and [`OptioError::Config`](crate::OptioError::Config) if the
/// keychain rejects the write.
pub fn save_ssid(value: &str) -> crate::Result<()> {
    crate::ssid::Ssid::parse(value)?;
    let entry = keyring::Entry::new(SERVICE, SSID_ENTRY)
        .map_err(|e| crate::OptioError::Config(format!("keyring entry error: {e}")))?;
    entry
        .set_password(value.trim())
        .map_err(|e| crate::OptioError::Config(format!("failed to save to keychain: {e}")))
}

/// Populates `POCKET_SSID` from the keychain when it is not already set.
///
/// Call this at startup before [`crate::config::fetch_config`].
pub fn populate_env_from_keychain() {
    if std::env::var(SSID_ENV).is_err()
        && let Some(value) = load_ssid()
    {
        debug!(var = SSID_ENV, "loaded credential from keychain");
        // SAFETY: single-threaded at this point (before tokio runtime starts tasks)
        unsafe {
            std::env::set_var(SSID_ENV, value.as_str());
        }
    }
}
