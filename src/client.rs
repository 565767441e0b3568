//! Client builder and session loop.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring the agency
//! client. The [`Client`] drives one session:
//! 1. Connect to the aggregator
//! 2. Build and send batches until the record source is exhausted
//! 3. Send the END signal
//! 4. Wait for the winners list and close the connection
//!
//! # Example
//!
//! ```ignore
//! use agency_client::{Client, CsvRecordSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .agency_id("1")
//!         .server_address("server:12345")
//!         .max_batch_bets(100)
//!         .build()?;
//!
//!     let mut source = CsvRecordSource::open("/.data/agency-1.csv")?;
//!     let report = client.run(&mut source).await?;
//!     println!("{} winners", report.winner_count());
//!     Ok(())
//! }
//! ```

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::batch::{build_batch, BatchLimits, Bet};
use crate::config::Config;
use crate::error::{ClientError, Result};
use crate::session::{Session, Timeouts};
use crate::source::RecordSource;
use crate::transport::connect;

/// Default maximum bets per batch.
pub const DEFAULT_MAX_BATCH_BETS: usize = 100;

/// Default maximum serialized bytes per batch.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 8000;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Sending,
    AwaitingWinners,
    Done,
    Aborted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connected => "connected",
            SessionState::Sending => "sending",
            SessionState::AwaitingWinners => "awaiting_winners",
            SessionState::Done => "done",
            SessionState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Why a session stopped before receiving winners without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Shutdown was requested.
    Cancelled,
    /// The aggregator refused a batch.
    Rejected { status: String, message: String },
}

/// Outcome of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub state: SessionState,
    pub batches_sent: usize,
    pub bets_sent: usize,
    /// `None` unless the session reached `Done`.
    pub winners: Option<Vec<String>>,
    pub abort_reason: Option<AbortReason>,
}

impl SessionReport {
    fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            batches_sent: 0,
            bets_sent: 0,
            winners: None,
            abort_reason: None,
        }
    }

    /// Session completed the END handshake and received winners.
    pub fn is_done(&self) -> bool {
        self.state == SessionState::Done
    }

    /// Number of winners (0 if none were received).
    pub fn winner_count(&self) -> usize {
        self.winners.as_ref().map_or(0, Vec::len)
    }
}

/// Builder for configuring and creating an agency client.
pub struct ClientBuilder {
    agency_id: Option<String>,
    server_address: Option<String>,
    limits: BatchLimits,
    timeouts: Timeouts,
    cancel: CancellationToken,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            agency_id: None,
            server_address: None,
            limits: BatchLimits::new(DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_BATCH_BETS),
            timeouts: Timeouts::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Agency id prefixed onto every batch.
    pub fn agency_id(mut self, id: impl Into<String>) -> Self {
        self.agency_id = Some(id.into());
        self
    }

    /// Aggregator address (`host:port`).
    pub fn server_address(mut self, addr: impl Into<String>) -> Self {
        self.server_address = Some(addr.into());
        self
    }

    /// Maximum bets per batch.
    ///
    /// Default: 100
    pub fn max_batch_bets(mut self, max_bets: usize) -> Self {
        self.limits.max_bets = max_bets;
        self
    }

    /// Maximum serialized bet bytes per batch.
    ///
    /// Default: 8000
    pub fn max_batch_size(mut self, max_size: usize) -> Self {
        self.limits.max_size = max_size;
        self
    }

    /// Deadlines for connect, batch write/read and the winners wait.
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Token used to request shutdown of the session.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<Client> {
        let agency_id = self
            .agency_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ClientError::Config("agency id is required".to_string()))?;
        let server_address = self
            .server_address
            .filter(|addr| !addr.is_empty())
            .ok_or_else(|| ClientError::Config("server address is required".to_string()))?;

        let span = info_span!("agency_client", agency_id = %agency_id);

        Ok(Client {
            agency_id,
            server_address,
            limits: self.limits,
            timeouts: self.timeouts,
            cancel: self.cancel,
            span,
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An agency client ready to run a session.
pub struct Client {
    agency_id: String,
    server_address: String,
    limits: BatchLimits,
    timeouts: Timeouts,
    cancel: CancellationToken,
    /// Every event of this client is emitted inside this span.
    span: Span,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Build a client from loaded configuration.
    pub fn from_config(config: &Config, cancel: CancellationToken) -> Result<Self> {
        config.validate()?;
        Client::builder()
            .agency_id(&config.agency_id)
            .server_address(&config.server_address)
            .max_batch_bets(config.batch_max_amount)
            .max_batch_size(config.batch_max_size)
            .timeouts(config.timeouts())
            .cancellation(cancel)
            .build()
    }

    pub fn agency_id(&self) -> &str {
        &self.agency_id
    }

    pub fn limits(&self) -> BatchLimits {
        self.limits
    }

    /// Token that cancels this client's session.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Connect to the aggregator and run a full session.
    pub async fn run<R>(&self, source: &mut R) -> Result<SessionReport>
    where
        R: RecordSource + ?Sized,
    {
        let stream = async {
            match connect(&self.server_address, self.timeouts.connect).await {
                Ok(stream) => {
                    info!(
                        action = "connect",
                        result = "success",
                        server_address = %self.server_address,
                        "Connected to aggregator"
                    );
                    Ok(stream)
                }
                Err(e) => {
                    error!(
                        action = "connect",
                        result = "fail",
                        server_address = %self.server_address,
                        error = %e,
                        "Could not connect to aggregator"
                    );
                    Err(e)
                }
            }
        }
        .instrument(self.span.clone())
        .await?;

        self.run_on(stream, source).await
    }

    /// Run a session over an already connected stream.
    ///
    /// The stream is closed on every exit path.
    pub async fn run_on<S, R>(&self, stream: S, source: &mut R) -> Result<SessionReport>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        R: RecordSource + ?Sized,
    {
        async {
            let mut session = Session::new(
                stream,
                self.agency_id.clone(),
                self.timeouts,
                self.cancel.clone(),
            );
            let mut report = SessionReport::new();
            transition(&mut report, SessionState::Connected);

            let outcome = self.drive(&mut session, source, &mut report).await;

            if let Err(e) = session.close().await {
                debug!(action = "close_connection", result = "fail", error = %e);
            } else {
                info!(action = "close_connection", result = "success", "Connection closed");
            }

            match outcome {
                Ok(()) => Ok(report),
                Err(ClientError::ClosedLocally) => {
                    abort(&mut report, AbortReason::Cancelled);
                    Ok(report)
                }
                Err(ClientError::Rejected { status, message }) => {
                    warn!(
                        action = "send_batch",
                        result = "fail",
                        status = %status,
                        message = %message,
                        batches_sent = report.batches_sent,
                        "Aggregator rejected batch"
                    );
                    abort(&mut report, AbortReason::Rejected { status, message });
                    Ok(report)
                }
                Err(e) => {
                    error!(
                        state = %report.state,
                        batches_sent = report.batches_sent,
                        bets_sent = report.bets_sent,
                        error = %e,
                        "Session aborted"
                    );
                    transition(&mut report, SessionState::Aborted);
                    Err(e)
                }
            }
        }
        .instrument(self.span.clone())
        .await
    }

    /// Connected -> Sending -> AwaitingWinners -> Done.
    async fn drive<S, R>(
        &self,
        session: &mut Session<S>,
        source: &mut R,
        report: &mut SessionReport,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        R: RecordSource + ?Sized,
    {
        transition(report, SessionState::Sending);
        let mut overflow: Option<Bet> = None;

        loop {
            self.stop_if_cancelled(StopPoint::BetweenBatches, report)?;

            let built = build_batch(source, self.limits, overflow.take())?.check_progress()?;
            if built.is_done() {
                break;
            }

            let response = session.send_batch(&built.batch).await?;
            report.batches_sent += 1;
            report.bets_sent += built.batch.len();
            debug!(
                action = "send_batch",
                result = "success",
                server_status = %response.status,
                bets_sent = built.batch.len(),
                "Batch sent"
            );

            overflow = built.overflow;
        }

        info!(
            action = "end_of_file",
            result = "success",
            batches_sent = report.batches_sent,
            bets_sent = report.bets_sent,
            "Record source exhausted"
        );

        self.stop_if_cancelled(StopPoint::BeforeEnd, report)?;

        session.send_end_signal().await?;
        transition(report, SessionState::AwaitingWinners);

        let winners = match session.receive_winners().await {
            Err(ClientError::ClosedLocally) => {
                log_stop(StopPoint::AwaitingWinners, report);
                return Err(ClientError::ClosedLocally);
            }
            other => other?,
        };
        info!(
            action = "winners_query",
            result = "success",
            winner_count = winners.len(),
            "Winners received"
        );
        report.winners = Some(winners);
        transition(report, SessionState::Done);
        Ok(())
    }

    fn stop_if_cancelled(&self, point: StopPoint, report: &SessionReport) -> Result<()> {
        if self.cancel.is_cancelled() {
            log_stop(point, report);
            return Err(ClientError::ClosedLocally);
        }
        Ok(())
    }
}

/// Where a session noticed cancellation.
#[derive(Debug, Clone, Copy)]
enum StopPoint {
    BetweenBatches,
    BeforeEnd,
    AwaitingWinners,
}

fn log_stop(point: StopPoint, report: &SessionReport) {
    let description = match point {
        StopPoint::BetweenBatches => "Cancelled between batches, no END sent",
        StopPoint::BeforeEnd => "Cancelled after the last batch, no END sent",
        StopPoint::AwaitingWinners => "Cancelled while waiting for winners",
    };
    info!(
        action = "stop_sending",
        result = "success",
        stop_point = ?point,
        batches_sent = report.batches_sent,
        "{}",
        description
    );
}

fn transition(report: &mut SessionReport, next: SessionState) {
    debug!(from = %report.state, to = %next, "Session state change");
    report.state = next;
}

fn abort(report: &mut SessionReport, reason: AbortReason) {
    transition(report, SessionState::Aborted);
    report.abort_reason = Some(reason);
}
