//! Dialing with bounded retry.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::NodeConfig;
use crate::core::ConnectionError;
use crate::transport::{Connection, ConnectionEvent};

/// Dial a peer, retrying transient TCP failures per the retry policy, then
/// perform the key-exchange handshake.
///
/// Retries cover connect refusals and timeouts with a fixed delay between
/// attempts; a handshake failure on an established socket is not retried.
/// Exhausting the budget surfaces [`ConnectionError::ConnectFailed`] with
/// the final attempt's error.
pub async fn dial(
    addr: SocketAddr,
    config: &NodeConfig,
    cancel: &CancellationToken,
) -> Result<(Arc<Connection>, mpsc::Receiver<ConnectionEvent>), ConnectionError> {
    let attempts = config.retry.max_attempts.max(1);
    let mut last_error: Option<std::io::Error> = None;

    for attempt in 1..=attempts {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                debug!(%addr, attempt, "dialed peer");
                return Connection::establish(stream, config, cancel).await;
            }
            Err(err) => {
                debug!(%addr, attempt, error = %err, "dial attempt failed");
                last_error = Some(err);
                if attempt < attempts {
                    sleep(config.retry.delay).await;
                }
            }
        }
    }

    Err(ConnectionError::ConnectFailed {
        attempts,
        last: last_error.unwrap_or_else(|| std::io::Error::other("no dial attempts made")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dial_nobody_listening_exhausts_retries() {
        // Bind then drop a listener to get a port nobody answers on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = NodeConfig::builder()
            .retry(RetryPolicy {
                max_attempts: 2,
                delay: Duration::from_millis(10),
            })
            .build();

        let cancel = CancellationToken::new();
        match dial(addr, &config, &cancel).await {
            Err(ConnectionError::ConnectFailed { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected ConnectFailed, got {other:?}"),
        }
    }
}
