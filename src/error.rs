use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use crate::connection::Status;

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Config URL missing, unparsable, or not `ws`/`wss`
    InvalidUrl,
    /// A payload declared as JSON failed to parse
    InvalidPayload,
    /// Operation requires an open connection
    NotConnected,
    /// Error related to invalid session state within wstool
    Validation,
    /// Error related to the underlying WebSocket transport
    WebSocket,
    /// Internal error from dependencies
    Internal,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    pub fn invalid_url<U: Into<String>, R: Into<String>>(url: U, reason: R) -> Self {
        InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
        .into()
    }

    pub fn invalid_payload<R: Into<String>>(reason: R) -> Self {
        InvalidPayload {
            reason: reason.into(),
        }
        .into()
    }

    #[must_use]
    pub fn not_connected(status: Status) -> Self {
        NotConnected { status }.into()
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Validation {
            reason: message.into(),
        }
        .into()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// The configured endpoint is not a usable WebSocket URL.
#[non_exhaustive]
#[derive(Debug)]
pub struct InvalidUrl {
    pub url: String,
    pub reason: String,
}

impl fmt::Display for InvalidUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid WebSocket URL `{}`: {}", self.url, self.reason)
    }
}

impl StdError for InvalidUrl {}

/// A payload that must be JSON (e.g. the headers field) failed to parse.
#[non_exhaustive]
#[derive(Debug)]
pub struct InvalidPayload {
    pub reason: String,
}

impl fmt::Display for InvalidPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid payload: {}", self.reason)
    }
}

impl StdError for InvalidPayload {}

/// An operation required an open session.
#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct NotConnected {
    pub status: Status,
}

impl fmt::Display for NotConnected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not connected (session is {})", self.status)
    }
}

impl StdError for NotConnected {}

#[non_exhaustive]
#[derive(Debug)]
pub struct Validation {
    pub reason: String,
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid: {}", self.reason)
    }
}

impl StdError for Validation {}

impl From<InvalidUrl> for Error {
    fn from(err: InvalidUrl) -> Self {
        Error::with_source(Kind::InvalidUrl, err)
    }
}

impl From<InvalidPayload> for Error {
    fn from(err: InvalidPayload) -> Self {
        Error::with_source(Kind::InvalidPayload, err)
    }
}

impl From<NotConnected> for Error {
    fn from(err: NotConnected) -> Self {
        Error::with_source(Kind::NotConnected, err)
    }
}

impl From<Validation> for Error {
    fn from(err: Validation) -> Self {
        Error::with_source(Kind::Validation, err)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::with_source(Kind::WebSocket, e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::with_source(Kind::InvalidUrl, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_url_display_should_name_the_url() {
        let error = Error::invalid_url("http://example.test", "unsupported scheme `http`");

        assert_eq!(error.kind(), Kind::InvalidUrl);
        assert!(error.to_string().contains("http://example.test"));
    }

    #[test]
    fn not_connected_carries_status() {
        let error = Error::not_connected(Status::Closed);

        assert_eq!(error.kind(), Kind::NotConnected);
        let inner = error.downcast_ref::<NotConnected>().expect("source type");
        assert_eq!(inner.status, Status::Closed);
        assert!(error.to_string().contains("closed"));
    }

    #[test]
    fn invalid_payload_into_error() {
        let error: Error = InvalidPayload {
            reason: "headers must be valid JSON".to_owned(),
        }
        .into();

        assert_eq!(error.kind(), Kind::InvalidPayload);
    }
}
