use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::ProxyError;

/// Open a TCP connection to `host:port`, bounded by `connect_timeout`.
pub async fn connect_upstream(
    host: &str,
    port: u16,
    connect_timeout: Duration,
) -> Result<TcpStream, ProxyError> {
    let addr = format!("{host}:{port}");
    match tokio::time::timeout(connect_timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            if let Err(err) = stream.set_nodelay(true) {
                debug!(upstream = %addr, %err, "failed to set TCP_NODELAY on upstream socket");
            }
            debug!(upstream = %addr, "upstream connected");
            Ok(stream)
        }
        Ok(Err(source)) => Err(ProxyError::UpstreamConnect { addr, source }),
        Err(_) => Err(ProxyError::Timeout("upstream connect")),
    }
}

/// Replay `preface` to `upstream`, then copy bytes both ways until either
/// side closes.
pub async fn splice<C, U>(client: &mut C, upstream: &mut U, preface: &[u8]) -> Result<(), ProxyError>
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    upstream.write_all(preface).await?;
    let (to_upstream, to_client) = tokio::io::copy_bidirectional(client, upstream).await?;
    debug!(
        bytes_to_upstream = to_upstream + preface.len() as u64,
        bytes_to_client = to_client,
        "tunnel closed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn preface_is_replayed_before_client_bytes() {
        let (mut client, mut client_peer) = tokio::io::duplex(1024);
        let (mut upstream, mut upstream_peer) = tokio::io::duplex(1024);

        let relay = tokio::spawn(async move { splice(&mut client_peer, &mut upstream_peer, b"hello ").await });

        client.write_all(b"world").await.unwrap();
        client.shutdown().await.unwrap();

        let mut received = Vec::new();
        let mut buf = [0u8; 64];
        while received.len() < 11 {
            let n = upstream.read(&mut buf).await.unwrap();
            assert!(n > 0);
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, b"hello world");

        upstream.write_all(b"reply").await.unwrap();
        upstream.shutdown().await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"reply");

        relay.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn connected_upstream_has_nodelay() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = connect_upstream("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap();
        assert!(stream.nodelay().unwrap());
    }

    #[tokio::test]
    async fn refused_upstream_is_reported() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = connect_upstream("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamConnect { .. }));
    }
}
