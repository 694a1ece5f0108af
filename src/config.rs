//! Per-session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::validate::{validate_header_json, validate_ws_url};

/// Fixed delay before each reconnect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Configuration for one logical WebSocket session. Immutable once passed to
/// [`connect`](crate::ConnectionManager::connect); reconnects reuse it as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Endpoint to dial. Must use the `ws` or `wss` scheme.
    pub url: String,
    /// Payload transmitted verbatim as soon as the socket opens, typically a
    /// subscribe or auth message.
    pub initial_message: Option<String>,
    /// Advisory request headers as raw JSON text. A browser-style WebSocket
    /// handshake cannot carry custom headers, so these are display-only
    /// metadata: validated as a JSON string map, never transmitted.
    pub headers: Option<String>,
    /// Opaque auth token passthrough. Display-only, never interpreted.
    pub auth_token: Option<String>,
    /// Reconnect automatically after any non-1000 close.
    pub auto_reconnect: bool,
    /// Fixed delay between a close and the next connection attempt.
    pub reconnect_delay: Duration,
}

impl ConnectionConfig {
    #[must_use]
    pub fn new<U: Into<String>>(url: U) -> Self {
        Self {
            url: url.into(),
            initial_message: None,
            headers: None,
            auth_token: None,
            auto_reconnect: true,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    #[must_use]
    pub fn with_initial_message<M: Into<String>>(mut self, message: M) -> Self {
        self.initial_message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_headers<H: Into<String>>(mut self, headers: H) -> Self {
        self.headers = Some(headers.into());
        self
    }

    #[must_use]
    pub fn with_auth_token<T: Into<String>>(mut self, token: T) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Check everything that must hold before any network attempt is made.
    pub(crate) fn validate(&self) -> Result<()> {
        validate_ws_url(&self.url)?;
        if let Some(headers) = self.headers.as_deref()
            && !headers.trim().is_empty()
        {
            validate_header_json(headers)?;
        }
        Ok(())
    }
}
