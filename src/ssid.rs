//! Session credential parsing.
//!
//! The platform authenticates a socket with a single Socket.IO event,
//! `42["auth",{"session":...,"isDemo":1,"uid":...,"platform":2}]`, copied
//! from a logged-in browser session. The core treats it as opaque except
//! for the demo flag, which selects the endpoint and is echoed in orders.

use std::fmt;

use serde::Deserialize;
use zeroize::Zeroizing;

use crate::{OptioError, Result};

const AUTH_PREFIX: &str = r#"42["auth","#;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthPayload {
    session: String,
    is_demo: u8,
    uid: u64,
    platform: u32,
}

/// A parsed session credential.
pub struct Ssid {
    raw: Zeroizing<String>,
    session: Zeroizing<String>,
    demo: bool,
    uid: u64,
    platform: u32,
}

impl Ssid {
    /// Parses the credential frame.
    ///
    /// # Errors
    ///
    /// Returns [`OptioError::Ssid`] if the text is not an `auth` event or
    /// its body lacks the expected fields.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix(AUTH_PREFIX)
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(|| OptioError::Ssid("expected a 42[\"auth\",{...}] frame".to_string()))?;

        let payload: AuthPayload =
            serde_json::from_str(body).map_err(|e| OptioError::Ssid(e.to_string()))?;

        Ok(Self {
            raw: Zeroizing::new(trimmed.to_string()),
            session: Zeroizing::new(payload.session),
            demo: payload.is_demo == 1,
            uid: payload.uid,
            platform: payload.platform,
        })
    }

    /// Returns `true` for demo (practice) accounts.
    pub fn is_demo(&self) -> bool {
        self.demo
    }

    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn platform(&self) -> u32 {
        self.platform
    }

    /// The session token inside the credential.
    pub fn session(&self) -> &str {
        &self.session
    }

    /// The frame text sent to authenticate the socket.
    pub fn auth_frame(&self) -> &str {
        &self.raw
    }
}

impl fmt::Debug for Ssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ssid")
            .field("demo", &self.demo)
            .field("uid", &self.uid)
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEMO: &str =
        r#"42["auth",{"session":"looc69ct294h546o368s0lct7d","isDemo":1,"uid":87742848,"platform":2}]	"#;

    #[test]
    fn parses_demo_credential() {
        let ssid = Ssid::parse(DEMO).unwrap();
        assert!(ssid.is_demo());
        assert_eq!(ssid.uid(), 87742848);
        assert_eq!(ssid.platform(), 2);
        assert_eq!(ssid.session(), "looc69ct294h546o368s0lct7d");
        assert!(ssid.auth_frame().ends_with("}]"));
    }

    #[test]
    fn parses_live_credential() {
        let raw = r#"42["auth",{"session":"a:4:{s:10:\"session_id\";}","isDemo":0,"uid":1,"platform":1}]"#;
        let ssid = Ssid::parse(raw).unwrap();
        assert!(!ssid.is_demo());
        assert_eq!(ssid.auth_frame(), raw);
    }

    #[test]
    fn rejects_other_events() {
        let err = Ssid::parse(r#"42["user_init",{"id":1}]"#).unwrap_err();
        assert!(matches!(err, OptioError::Ssid(_)));
    }

    #[test]
    fn debug_hides_session() {
        let ssid = Ssid::parse(DEMO).unwrap();
        assert!(!format!("{ssid:?}").contains("looc69"));
    }
}
