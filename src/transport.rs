//! One request line out, one response back, then the connection is closed.
//!
//! The same exchange is used for client → replica and replica → replica traffic.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::{KvStoreError, ReplicaAddr, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Requests longer than this are drained and answered with `Invalid command`.
pub const MAX_REQUEST_BYTES: usize = 1 << 20;

/// How long a partial request may sit idle before it is taken as complete. Senders that
/// neither terminate the line nor close their write half are answered after this pause.
pub const REQUEST_QUIET_PERIOD: Duration = Duration::from_millis(100);

/// Send `request` to `addr` and wait for the response, bounded by `timeout` as a whole.
pub async fn send(addr: &ReplicaAddr, request: &str, timeout: Duration) -> Result<String> {
    let exchange = async {
        let mut stream = TcpStream::connect((addr.host.as_str(), addr.port)).await?;
        write_request(&mut stream, request).await?;
        let mut response = String::new();
        stream.read_to_string(&mut response).await?;
        Ok::<_, std::io::Error>(response)
    };

    let result = match tokio::time::timeout(timeout, exchange).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(source)) => Err(KvStoreError::Connection {
            addr: addr.to_string(),
            source,
        }),
        Err(_) => Err(KvStoreError::Timeout {
            addr: addr.to_string(),
        }),
    };

    match &result {
        Ok(response) => debug!(peer = %addr, request, response, "Exchange complete"),
        Err(e) => warn!(peer = %addr, request, "{e}"),
    }
    result
}

/// Like [`send`], but failures come back as their descriptive text instead of an error.
pub async fn send_text(addr: &ReplicaAddr, request: &str, timeout: Duration) -> String {
    match send(addr, request, timeout).await {
        Ok(response) => response,
        Err(e) => e.to_string(),
    }
}

/// Write a request line and close the write half so the receiver sees the end of it.
pub async fn write_request<W>(stream: &mut W, request: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(request.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.shutdown().await
}

/// Read one request.
///
/// The request ends at the first newline, when the peer closes its write half, or once
/// some bytes have arrived and the peer then stays quiet for [`REQUEST_QUIET_PERIOD`].
/// Waiting for the first byte is unbounded, callers put their own timeout around it.
///
/// Oversized or non UTF-8 requests come back as [`KvStoreError::InvalidCommand`]. An
/// oversized request is still drained so the peer can read the reply.
pub async fn read_request<R>(stream: &mut R) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut request = Vec::new();
    let mut oversized = false;
    let mut chunk = [0u8; 8192];
    loop {
        let read = stream.read(&mut chunk);
        let n = if request.is_empty() && !oversized {
            read.await?
        } else {
            match tokio::time::timeout(REQUEST_QUIET_PERIOD, read).await {
                Ok(n) => n?,
                Err(_) => break,
            }
        };
        if n == 0 {
            break;
        }

        let end = chunk[..n].iter().position(|b| *b == b'\n');
        if !oversized {
            request.extend_from_slice(&chunk[..end.unwrap_or(n)]);
            if request.len() > MAX_REQUEST_BYTES {
                oversized = true;
                request.clear();
            }
        }
        if end.is_some() {
            break;
        }
    }

    if oversized {
        return Err(KvStoreError::InvalidCommand(format!(
            "request longer than {MAX_REQUEST_BYTES} bytes"
        )));
    }
    let line = String::from_utf8(request)
        .map_err(|_| KvStoreError::InvalidCommand("request is not valid UTF-8".to_string()))?;
    Ok(line.trim_end().to_string())
}

pub async fn write_response<W>(stream: &mut W, response: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn exchange_one_line() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = ReplicaAddr::from(listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await.unwrap();
            write_response(&mut stream, &format!("echo {request}"))
                .await
                .unwrap();
        });

        let response = send(&addr, "get a", DEFAULT_TIMEOUT).await.unwrap();
        assert_eq!(response, "echo get a");
    }

    #[tokio::test]
    async fn refused_connection_is_described() {
        // Bind and drop to find a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = ReplicaAddr::from(listener.local_addr().unwrap());
        drop(listener);

        let response = send_text(&addr, "get a", DEFAULT_TIMEOUT).await;
        assert!(
            response.starts_with(&format!("Error connecting to {addr}")),
            "{response}"
        );
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = ReplicaAddr::from(listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let err = send(&addr, "get a", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, KvStoreError::Timeout { .. }));
        assert_eq!(err.to_string(), format!("Connection to {addr} timed out"));
    }

    #[tokio::test]
    async fn request_without_newline_ends_when_peer_goes_quiet() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(b"set a 1").await.unwrap();

        // `client` stays open, nothing closes the write half.
        let request = tokio::time::timeout(Duration::from_secs(2), read_request(&mut server))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(request, "set a 1");
    }

    #[tokio::test]
    async fn request_stops_at_first_newline() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(b"get a\r\nget b\n").await.unwrap();
        assert_eq!(read_request(&mut server).await.unwrap(), "get a");
    }

    #[tokio::test]
    async fn oversized_request_is_drained_and_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);
        let writer = tokio::spawn(async move {
            let mut request = String::from("update");
            while request.len() <= MAX_REQUEST_BYTES {
                request.push_str(" key value");
            }
            request.push_str(" last LONGVALUE123456789\n");
            client.write_all(request.as_bytes()).await.unwrap();
            client
        });

        let err = read_request(&mut server).await.unwrap_err();
        assert!(matches!(err, KvStoreError::InvalidCommand(_)), "{err}");
        // Every byte was consumed, so the writer finished.
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn non_utf8_request_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(b"get \xff\xfe\n").await.unwrap();
        assert!(matches!(
            read_request(&mut server).await,
            Err(KvStoreError::InvalidCommand(_))
        ));
    }
}
