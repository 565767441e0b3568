//! Request/response exchanges with the aggregator over one connection.
//!
//! A [`Session`] owns the stream for its whole lifetime. A batch exchange
//! (frame write plus ack read) always runs to completion under its own
//! deadlines, so a batch the aggregator stored is never left uncounted. Only
//! the long winners wait can be interrupted by the cancellation token, which
//! surfaces as [`ClientError::ClosedLocally`].

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::batch::Batch;
use crate::error::{ClientError, Result};
use crate::protocol::{decode_winners, encode_batch_payload, Frame, Response};
use crate::transport::{receive_data, send_frame};

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default per-batch write timeout.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default per-batch ack read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Default winners read timeout; the aggregator may be waiting on other agencies.
pub const DEFAULT_WINNERS_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadlines applied to each blocking call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub write: Duration,
    pub read: Duration,
    pub winners: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            write: DEFAULT_WRITE_TIMEOUT,
            read: DEFAULT_READ_TIMEOUT,
            winners: DEFAULT_WINNERS_TIMEOUT,
        }
    }
}

/// Race a read against cancellation. A ready read wins ties.
async fn closable<F, T>(cancel: &CancellationToken, read: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        outcome = read => outcome,
        _ = cancel.cancelled() => Err(ClientError::ClosedLocally),
    }
}

/// One agency's exchange with the aggregator.
pub struct Session<S> {
    conn: S,
    agency_id: String,
    timeouts: Timeouts,
    cancel: CancellationToken,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a connected stream.
    pub fn new(
        conn: S,
        agency_id: impl Into<String>,
        timeouts: Timeouts,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            conn,
            agency_id: agency_id.into(),
            timeouts,
            cancel,
        }
    }

    pub fn agency_id(&self) -> &str {
        &self.agency_id
    }

    /// Send one batch and wait for its ack.
    ///
    /// Not interruptible by cancellation; the read deadline bounds the wait.
    /// A failure status comes back as [`ClientError::Rejected`].
    pub async fn send_batch(&mut self, batch: &Batch) -> Result<Response> {
        let payload = encode_batch_payload(&self.agency_id, batch.bets());
        let payload_len = payload.len();

        send_frame(&mut self.conn, &Frame::Data(payload), self.timeouts.write).await?;

        let reply = receive_data(&mut self.conn, self.timeouts.read).await?;
        let response = Response::decode(&reply)?;

        debug!(
            action = "receive_ack",
            bets = batch.len(),
            payload_bytes = payload_len,
            status = %response.status,
            "Batch acknowledged"
        );

        response.into_result()
    }

    /// Tell the aggregator this agency has no more bets. No reply is read.
    pub async fn send_end_signal(&mut self) -> Result<()> {
        send_frame(&mut self.conn, &Frame::End, self.timeouts.write).await?;
        info!(action = "send_end_signal", result = "success", "End signal sent");
        Ok(())
    }

    /// Wait for the winners list under the long deadline.
    pub async fn receive_winners(&mut self) -> Result<Vec<String>> {
        let payload = closable(
            &self.cancel,
            receive_data(&mut self.conn, self.timeouts.winners),
        )
        .await?;
        decode_winners(&payload)
    }

    /// Shut down the write side and release the stream.
    pub async fn close(mut self) -> std::io::Result<()> {
        self.conn.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{Bet, BatchLimits};
    use crate::protocol::{decode_batch_payload, encode_winners};
    use crate::transport::receive_frame;
    use tokio::io::duplex;

    const DEADLINE: Duration = Duration::from_secs(5);

    fn batch_of(bets: &[Bet]) -> Batch {
        let mut batch = Batch::new(BatchLimits::new(10_000, 100));
        for bet in bets {
            batch.try_add(bet.clone()).unwrap();
        }
        batch
    }

    fn bets() -> Vec<Bet> {
        vec![
            Bet::new("a", "b", "1", "2000-01-01", "10"),
            Bet::new("c", "d", "2", "2000-01-02", "20"),
        ]
    }

    #[tokio::test]
    async fn test_send_batch_ok() {
        let (client, mut server) = duplex(1024);
        let mut session = Session::new(client, "A1", Timeouts::default(), CancellationToken::new());

        let aggregator = tokio::spawn(async move {
            let payload = receive_data(&mut server, DEADLINE).await.unwrap();
            send_frame(&mut server, &Frame::data(&b"ok;stored"[..]), DEADLINE)
                .await
                .unwrap();
            payload
        });

        let response = session.send_batch(&batch_of(&bets())).await.unwrap();
        assert_eq!(response, Response::new("ok", "stored"));

        let payload = aggregator.await.unwrap();
        let (agency, received) = decode_batch_payload(&payload).unwrap();
        assert_eq!(agency, "A1");
        assert_eq!(received, bets());
    }

    #[tokio::test]
    async fn test_send_batch_empty_ack() {
        let (client, mut server) = duplex(1024);
        let mut session = Session::new(client, "A1", Timeouts::default(), CancellationToken::new());

        tokio::spawn(async move {
            receive_data(&mut server, DEADLINE).await.unwrap();
            send_frame(&mut server, &Frame::data(bytes::Bytes::new()), DEADLINE)
                .await
                .unwrap();
        });

        let response = session.send_batch(&batch_of(&bets())).await.unwrap();
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn test_send_batch_rejected() {
        let (client, mut server) = duplex(1024);
        let mut session = Session::new(client, "A1", Timeouts::default(), CancellationToken::new());

        tokio::spawn(async move {
            receive_data(&mut server, DEADLINE).await.unwrap();
            send_frame(&mut server, &Frame::data(&b"error;bad batch"[..]), DEADLINE)
                .await
                .unwrap();
        });

        let err = session.send_batch(&batch_of(&bets())).await.unwrap_err();
        assert!(err.is_rejection());
        assert!(err.to_string().contains("bad batch"));
    }

    #[tokio::test]
    async fn test_end_signal_is_eight_bytes() {
        let (client, mut server) = duplex(64);
        let mut session = Session::new(client, "A1", Timeouts::default(), CancellationToken::new());

        session.send_end_signal().await.unwrap();
        drop(session);

        let mut raw = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut server, &mut raw)
            .await
            .unwrap();
        assert_eq!(raw, b"END     ");
    }

    #[tokio::test]
    async fn test_receive_winners() {
        let (client, mut server) = duplex(64);
        let mut session = Session::new(client, "A1", Timeouts::default(), CancellationToken::new());

        send_frame(&mut server, &Frame::Data(encode_winners(&["7", "9"])), DEADLINE)
            .await
            .unwrap();
        assert_eq!(session.receive_winners().await.unwrap(), vec!["7", "9"]);

        send_frame(&mut server, &Frame::Data(encode_winners::<&str>(&[])), DEADLINE)
            .await
            .unwrap();
        assert!(session.receive_winners().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_winners_wait() {
        let (client, _server) = duplex(64);
        let cancel = CancellationToken::new();
        let mut session = Session::new(client, "A1", Timeouts::default(), cancel.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let err = session.receive_winners().await.unwrap_err();
        assert!(matches!(err, ClientError::ClosedLocally));
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_token_lets_batch_exchange_finish() {
        let (client, mut server) = duplex(16);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut session = Session::new(client, "A1", Timeouts::default(), cancel);

        // Frame is larger than the duplex buffer, so the write must wait for
        // the reader; the already-cancelled token must cut neither the write
        // nor the ack read.
        let aggregator = tokio::spawn(async move {
            let frame = receive_frame(&mut server, DEADLINE).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            send_frame(&mut server, &Frame::data(&b"ok"[..]), DEADLINE)
                .await
                .unwrap();
            frame
        });

        let response = session.send_batch(&batch_of(&bets())).await.unwrap();
        assert_eq!(response.status, "ok");

        let frame = aggregator.await.unwrap();
        let (_, received) = decode_batch_payload(frame.payload()).unwrap();
        assert_eq!(received, bets());
    }

    #[tokio::test(start_paused = true)]
    async fn test_winners_use_long_deadline() {
        let (client, mut server) = duplex(64);
        let timeouts = Timeouts {
            read: Duration::from_secs(1),
            ..Timeouts::default()
        };
        let mut session = Session::new(client, "A1", timeouts, CancellationToken::new());

        tokio::spawn(async move {
            // Later than the ack deadline, well within the winners deadline.
            tokio::time::sleep(Duration::from_secs(10)).await;
            send_frame(&mut server, &Frame::data(&b"42"[..]), DEADLINE)
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        assert_eq!(session.receive_winners().await.unwrap(), vec!["42"]);
    }
}
