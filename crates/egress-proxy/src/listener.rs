use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use audit_log::EventLog;
use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use policy_engine::EgressEngine;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::error::ProxyError;
use crate::{http, tls};

/// Configuration for the interception proxy.
pub struct ProxyConfig {
    /// Address the redirected traffic arrives on.
    pub listen_addr: SocketAddr,
    /// Bound on reading a ClientHello and on connecting upstream.
    pub connect_timeout: Duration,
    /// Port dialled on the SNI host for TLS connections.
    pub tls_upstream_port: u16,
    /// Compiled rules and settings; read-only for the lifetime of the proxy.
    pub engine: Arc<EgressEngine>,
    /// Shared decision log.
    pub log: EventLog,
}

pub(crate) type HttpClient = Client<HttpConnector, Incoming>;

/// State shared by every connection task.
pub(crate) struct Shared {
    pub(crate) config: ProxyConfig,
    pub(crate) client: HttpClient,
}

/// The transparent egress proxy.
///
/// Each accepted connection is sniffed: a TLS handshake record is decided on
/// its SNI, anything else is served as HTTP/1.x and decided per request.
pub struct Proxy {
    shared: Arc<Shared>,
}

impl Proxy {
    pub fn new(config: ProxyConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.connect_timeout));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            shared: Arc::new(Shared { config, client }),
        }
    }

    /// Bind `listen_addr` and serve until an enforcement failure.
    pub async fn run(&self) -> Result<(), ProxyError> {
        let addr = self.shared.config.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ProxyError::Bind { addr, source })?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    ///
    /// Connection errors are logged and isolated to their connection. The
    /// only way this returns is a [`ProxyError::Enforcement`]: a blocked
    /// connection that could not be terminated fails the whole run.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ProxyError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(
                %addr,
                mode = %self.shared.config.engine.settings().mode,
                rules = self.shared.config.engine.rules().len(),
                "egress proxy listening"
            );
        }

        let (failures_tx, mut failures_rx) = mpsc::unbounded_channel::<ProxyError>();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(err) => {
                            tracing::warn!(%err, "failed to accept connection");
                            continue;
                        }
                    };
                    self.spawn_connection(stream, remote_addr, failures_tx.clone());
                }
                Some(failure) = failures_rx.recv() => {
                    tracing::error!(err = %failure, "enforcement failure; stopping proxy");
                    return Err(failure);
                }
            }
        }
    }

    fn spawn_connection(
        &self,
        stream: TcpStream,
        remote_addr: SocketAddr,
        failures: mpsc::UnboundedSender<ProxyError>,
    ) {
        let shared = Arc::clone(&self.shared);
        let connection_id = uuid::Uuid::new_v4();
        let span = tracing::debug_span!("connection", %connection_id, %remote_addr);

        tokio::spawn(
            async move {
                match handle_connection(stream, shared).await {
                    Ok(()) => tracing::debug!("connection closed"),
                    Err(err) if err.is_enforcement_failure() => {
                        let _ = failures.send(err);
                    }
                    Err(err) if err.is_disconnect() => {
                        tracing::debug!(%err, "connection ended");
                    }
                    Err(err) => tracing::warn!(%err, "connection error"),
                }
            }
            .instrument(span),
        );
    }
}

async fn handle_connection(stream: TcpStream, shared: Arc<Shared>) -> Result<(), ProxyError> {
    let mut first = [0u8; 1];
    if stream.peek(&mut first).await? == 0 {
        return Ok(());
    }

    if first[0] == tls::HANDSHAKE_RECORD_TYPE {
        tls::handle(stream, &shared).await
    } else {
        http::serve(stream, shared).await
    }
}
