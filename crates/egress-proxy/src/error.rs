//! Error types for the interception proxy.
//!
//! Everything except [`ProxyError::Enforcement`] is scoped to a single
//! connection: it is logged and the connection dropped. An enforcement
//! failure ends the whole run.

use std::net::SocketAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// Could not bind the listening socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// I/O error on a client connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Hyper HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// The ClientHello could not be read or parsed.
    #[error("TLS ClientHello error: {0}")]
    ClientHello(String),

    /// The ClientHello carried no server name, so there is nowhere to route.
    #[error("TLS ClientHello has no SNI")]
    MissingSni,

    /// Timed out waiting on the client or the upstream.
    #[error("timed out during {0}")]
    Timeout(&'static str),

    /// Failed to connect to the upstream server.
    #[error("failed to connect to upstream '{addr}': {source}")]
    UpstreamConnect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A blocked connection could not be terminated in active mode.
    #[error("failed to terminate blocked connection to '{destination}': {source}")]
    Enforcement {
        destination: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProxyError {
    pub fn is_enforcement_failure(&self) -> bool {
        matches!(self, ProxyError::Enforcement { .. })
    }

    /// Peer hung up; not worth more than a debug line.
    pub fn is_disconnect(&self) -> bool {
        use std::io::ErrorKind;
        match self {
            ProxyError::Io(err) => matches!(
                err.kind(),
                ErrorKind::ConnectionReset | ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof
            ),
            ProxyError::Http(err) => err.is_incomplete_message() || err.is_canceled(),
            _ => false,
        }
    }
}

impl From<rustls::Error> for ProxyError {
    fn from(err: rustls::Error) -> Self {
        ProxyError::ClientHello(err.to_string())
    }
}
