//! Client error types.

use thiserror::Error;

/// Errors surfaced by the distribution client and its relay links.
///
/// Only the usage and configuration variants ever reach a caller; transport
/// variants are logged by the link that hit them and turn into a reconnect.
#[derive(Error, Debug)]
pub enum ClientError {
    /// `start` was called on a client that was already started.
    #[error("client already started")]
    AlreadyStarted,

    #[error("no relays configured")]
    NoRelays,

    /// Relay URL could not be parsed or is not `ws://`/`wss://`.
    #[error("invalid relay URL: {0}")]
    InvalidRelayUrl(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SOCKS proxy error: {0}")]
    Socks(#[from] tokio_socks::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
