//! TCP dialing for the aggregator connection.

use std::io;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{ClientError, Result};

/// Dial `addr` within `deadline`.
///
/// Nagle is disabled since every exchange is a single small request
/// followed by a blocking read.
pub async fn connect(addr: &str, deadline: Duration) -> Result<TcpStream> {
    let connect_error = |source: io::Error| ClientError::Connect {
        addr: addr.to_string(),
        source,
    };

    let stream = match timeout(deadline, TcpStream::connect(addr)).await {
        Ok(result) => result.map_err(connect_error)?,
        Err(_) => {
            return Err(connect_error(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect timed out after {:?}", deadline),
            )))
        }
    };

    stream.set_nodelay(true).map_err(connect_error)?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let (stream, accepted) = tokio::join!(
            connect(&addr, Duration::from_secs(1)),
            listener.accept()
        );

        let stream = stream.unwrap();
        assert!(stream.nodelay().unwrap());
        assert!(accepted.is_ok());
    }

    #[tokio::test]
    async fn test_connect_refused_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = connect(&addr, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ClientError::Connect { .. }));
        assert!(err.to_string().contains(&addr));
    }

    #[tokio::test]
    async fn test_unresolvable_address() {
        let err = connect("not an address", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_connection_error());
    }
}
