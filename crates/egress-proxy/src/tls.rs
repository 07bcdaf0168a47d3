//! TLS interception: decide on the ClientHello, before any byte reaches the
//! destination.
//!
//! The proxy never terminates TLS. It buffers the client's first flight,
//! reads the SNI with a `rustls` [`Acceptor`], and then either replays the
//! buffer to the real server or answers with a fatal `handshake_failure`
//! alert so the client sees a failed handshake rather than a reset.

use std::io::ErrorKind;

use policy_engine::{Decision, Scheme, TlsVerdict};
use rustls::server::Acceptor;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::error::ProxyError;
use crate::listener::Shared;
use crate::relay;

/// Content type of a TLS handshake record.
pub const HANDSHAKE_RECORD_TYPE: u8 = 0x16;

/// TLS 1.2 record carrying a fatal `handshake_failure` alert.
pub const HANDSHAKE_FAILURE_ALERT: [u8; 7] = [0x15, 0x03, 0x03, 0x00, 0x02, 0x02, 0x28];

const MAX_CLIENT_HELLO_BYTES: usize = 64 * 1024;

/// A fully buffered ClientHello.
#[derive(Debug, Clone)]
pub struct ClientHello {
    /// Every byte read from the client so far, to be replayed upstream.
    pub raw: Vec<u8>,
    pub server_name: Option<String>,
}

/// Incremental ClientHello parser.
pub struct ClientHelloParser {
    acceptor: Acceptor,
    raw: Vec<u8>,
}

impl Default for ClientHelloParser {
    fn default() -> Self {
        Self {
            acceptor: Acceptor::default(),
            raw: Vec::new(),
        }
    }
}

impl ClientHelloParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk from the client.
    ///
    /// Returns `Ok(None)` while more bytes are needed, and the parsed hello
    /// once it is complete.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Option<ClientHello>, ProxyError> {
        self.raw.extend_from_slice(chunk);
        if self.raw.len() > MAX_CLIENT_HELLO_BYTES {
            return Err(ProxyError::ClientHello("ClientHello too large".into()));
        }

        let mut rd = chunk;
        while !rd.is_empty() {
            let n = self
                .acceptor
                .read_tls(&mut rd)
                .map_err(|err| ProxyError::ClientHello(err.to_string()))?;
            if n == 0 {
                break;
            }
        }

        match self.acceptor.accept() {
            Ok(Some(accepted)) => {
                let server_name = accepted.client_hello().server_name().map(str::to_owned);
                Ok(Some(ClientHello {
                    raw: std::mem::take(&mut self.raw),
                    server_name,
                }))
            }
            Ok(None) => Ok(None),
            Err((err, _alert)) => Err(err.into()),
        }
    }
}

/// Read from `reader` until a complete ClientHello has been buffered.
pub async fn read_client_hello<R>(reader: &mut R) -> Result<ClientHello, ProxyError>
where
    R: AsyncRead + Unpin,
{
    let mut parser = ClientHelloParser::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(ProxyError::ClientHello(
                "connection closed before ClientHello completed".into(),
            ));
        }
        if let Some(hello) = parser.feed(&chunk[..n])? {
            return Ok(hello);
        }
    }
}

/// Handle one intercepted TLS connection.
pub(crate) async fn handle(mut client: TcpStream, shared: &Shared) -> Result<(), ProxyError> {
    let hello = tokio::time::timeout(shared.config.connect_timeout, read_client_hello(&mut client))
        .await
        .map_err(|_| ProxyError::Timeout("ClientHello"))??;

    let Some(server_name) = hello.server_name else {
        return Err(ProxyError::MissingSni);
    };

    match shared.config.engine.evaluate_tls(&server_name) {
        TlsVerdict::Deferred { rule } => {
            info!(destination = %server_name, %rule, "path-scoped rule; tunnelling TLS without a connection-level decision");
            let decision = Decision::deferred(rule, server_name.to_lowercase(), Scheme::Https);
            shared.config.log.record(&decision).await;
        }
        TlsVerdict::Decided(verdict) => {
            shared.config.log.record(&verdict.decision).await;

            if verdict.terminates() {
                info!(
                    destination = %server_name,
                    rule = %verdict.decision.rule_name,
                    "blocking TLS connection"
                );
                return reject_handshake(&mut client, &server_name).await;
            }
            if verdict.decision.is_block() {
                info!(
                    destination = %server_name,
                    rule = %verdict.decision.rule_name,
                    "would block TLS connection (audit mode)"
                );
            }
        }
    }

    let mut upstream = relay::connect_upstream(
        &server_name,
        shared.config.tls_upstream_port,
        shared.config.connect_timeout,
    )
    .await?;
    relay::splice(&mut client, &mut upstream, &hello.raw).await
}

/// Fail the handshake and close the client side.
///
/// A peer that is already gone counts as terminated; any other failure is an
/// [`ProxyError::Enforcement`].
async fn reject_handshake(client: &mut TcpStream, destination: &str) -> Result<(), ProxyError> {
    let result = async {
        client.write_all(&HANDSHAKE_FAILURE_ALERT).await?;
        client.shutdown().await
    }
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(err)
            if matches!(
                err.kind(),
                ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::NotConnected
            ) =>
        {
            warn!(destination, %err, "client gone before handshake alert was sent");
            Ok(())
        }
        Err(source) => Err(ProxyError::Enforcement {
            destination: destination.to_string(),
            source,
        }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn push_ext(out: &mut Vec<u8>, kind: u16, body: &[u8]) {
        out.extend_from_slice(&kind.to_be_bytes());
        out.extend_from_slice(&(body.len() as u16).to_be_bytes());
        out.extend_from_slice(body);
    }

    /// A minimal TLS 1.3 ClientHello record.
    pub(crate) fn client_hello(sni: Option<&str>) -> Vec<u8> {
        let mut ext = Vec::new();
        if let Some(name) = sni {
            let name = name.as_bytes();
            let mut list = vec![0u8];
            list.extend_from_slice(&(name.len() as u16).to_be_bytes());
            list.extend_from_slice(name);
            let mut body = (list.len() as u16).to_be_bytes().to_vec();
            body.extend(list);
            push_ext(&mut ext, 0x0000, &body);
        }
        // supported_groups: x25519
        push_ext(&mut ext, 0x000a, &[0x00, 0x02, 0x00, 0x1d]);
        // signature_algorithms: ecdsa_secp256r1_sha256, rsa_pss_rsae_sha256
        push_ext(&mut ext, 0x000d, &[0x00, 0x04, 0x04, 0x03, 0x08, 0x04]);
        // supported_versions: TLS 1.3
        push_ext(&mut ext, 0x002b, &[0x02, 0x03, 0x04]);
        // key_share: one x25519 share
        let mut key_share = vec![0x00, 0x24, 0x00, 0x1d, 0x00, 0x20];
        key_share.extend_from_slice(&[0x11; 32]);
        push_ext(&mut ext, 0x0033, &key_share);

        let mut hello = vec![0x03, 0x03];
        hello.extend_from_slice(&[0x42; 32]);
        hello.push(0);
        hello.extend_from_slice(&[0x00, 0x02, 0x13, 0x01]);
        hello.extend_from_slice(&[0x01, 0x00]);
        hello.extend_from_slice(&(ext.len() as u16).to_be_bytes());
        hello.extend(ext);

        let mut handshake = vec![0x01];
        handshake.extend_from_slice(&(hello.len() as u32).to_be_bytes()[1..]);
        handshake.extend(hello);

        let mut record = vec![HANDSHAKE_RECORD_TYPE, 0x03, 0x01];
        record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
        record.extend(handshake);
        record
    }

    #[test]
    fn extracts_sni_across_chunks() {
        let bytes = client_hello(Some("api.example.com"));
        let (first, rest) = bytes.split_at(20);

        let mut parser = ClientHelloParser::new();
        assert!(parser.feed(first).unwrap().is_none());
        let hello = parser.feed(rest).unwrap().unwrap();

        assert_eq!(hello.server_name.as_deref(), Some("api.example.com"));
        assert_eq!(hello.raw, bytes);
    }

    #[test]
    fn hello_without_sni() {
        let mut parser = ClientHelloParser::new();
        let hello = parser.feed(&client_hello(None)).unwrap().unwrap();
        assert_eq!(hello.server_name, None);
    }

    #[test]
    fn garbage_is_rejected() {
        let mut parser = ClientHelloParser::new();
        let result = parser.feed(&[0x16, 0x03, 0x01, 0x00, 0x04, 0x02, 0x00, 0x00, 0x00]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn read_from_stream() {
        let bytes = client_hello(Some("example.org"));
        let mut reader = bytes.as_slice();
        let hello = read_client_hello(&mut reader).await.unwrap();
        assert_eq!(hello.server_name.as_deref(), Some("example.org"));
    }

    #[tokio::test]
    async fn truncated_stream_is_an_error() {
        let bytes = client_hello(Some("example.org"));
        let mut reader = &bytes[..bytes.len() / 2];
        assert!(read_client_hello(&mut reader).await.is_err());
    }
}
