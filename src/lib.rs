//! # agency-client
//!
//! Lottery agency client that streams bets to a central aggregator.
//!
//! Records are read from an agency data file, packed into size- and
//! count-bounded batches, and sent over TCP with a length-prefixed framing
//! protocol. After the last batch the client sends an END signal and waits
//! for the list of winners.
//!
//! ## Wire format
//!
//! ```text
//! +----------------+---------------------+
//! | length (8 B)   | payload (length B)  |
//! | ASCII, "%08d"  |                     |
//! +----------------+---------------------+
//! END signal: the 8 bytes "END     " with no payload
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use agency_client::{Client, Config, CsvRecordSource};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let client = Client::from_config(&config, CancellationToken::new())?;
//!     let mut source = CsvRecordSource::open(config.data_path())?;
//!
//!     let report = client.run(&mut source).await?;
//!     println!("{:?}", report.winners);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod source;
pub mod transport;

mod client;

pub use batch::{build_batch, Batch, BatchLimits, Bet, BuiltBatch};
pub use client::{AbortReason, Client, ClientBuilder, SessionReport, SessionState};
pub use config::Config;
pub use error::{ClientError, FramePhase, Result};
pub use session::{Session, Timeouts};
pub use source::{CsvRecordSource, RecordSource};
