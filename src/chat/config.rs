//! Session configuration — the validated connection identity.

use std::fmt;

/// Connection identity for one chat session: login name, OAuth token, and
/// the channels to join right after authenticating.
///
/// Immutable once built; validation happens in [`ChatConfig::new`] so a
/// constructed config is always usable.
#[derive(Clone)]
pub struct ChatConfig {
    login: String,
    token: String,
    channels: Vec<String>,
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("login name must not be empty")]
    EmptyLogin,
    #[error("auth token must not be empty")]
    EmptyToken,
}

impl ChatConfig {
    /// Build a config. The login name and token must be non-empty; the
    /// channel list may be empty and its order is preserved.
    pub fn new(
        login: impl Into<String>,
        token: impl Into<String>,
        channels: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let login = login.into();
        let token = token.into();

        if login.is_empty() {
            return Err(ConfigError::EmptyLogin);
        }
        if token.is_empty() {
            return Err(ConfigError::EmptyToken);
        }

        Ok(Self {
            login,
            token,
            channels,
        })
    }

    /// The account login name (used for `NICK`).
    pub fn login(&self) -> &str {
        &self.login
    }

    /// The OAuth token (sent as `PASS oauth:<token>`).
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Channels joined on connect, in order.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }
}

impl fmt::Debug for ChatConfig {
    // The token is a credential; keep it out of logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("login", &self.login)
            .field("token", &"<redacted>")
            .field("channels", &self.channels)
            .finish()
    }
}

impl PartialEq for ChatConfig {
    fn eq(&self, other: &Self) -> bool {
        self.login == other.login && self.token == other.token && self.channels == other.channels
    }
}

impl Eq for ChatConfig {}
