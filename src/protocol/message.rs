//! Payload codecs for the batch, ack and winners exchanges.
//!
//! ```text
//! batch:   "<agency>;<count>\n" + count * "<name>;<surname>;<id>;<dob>;<number>\n"
//! ack:     "<status>;<message>"      (message optional, whitespace trimmed)
//! winners: "<id>;<id>;..."           ("" or "NO_WINNERS" for none)
//! ```

use bytes::Bytes;

use crate::batch::{Bet, WIRE_SEPARATOR};
use crate::error::{ClientError, Result};

/// Sentinel payload meaning the draw produced no winners.
pub const NO_WINNERS: &str = "NO_WINNERS";

/// Statuses the aggregator uses for an accepted request.
pub const SUCCESS_STATUSES: [&str; 2] = ["ok", "success"];

/// Encode a batch payload for the given agency.
///
/// # Example
///
/// ```
/// use agency_client::batch::Bet;
/// use agency_client::protocol::encode_batch_payload;
///
/// let bets = [Bet::new("a", "b", "1", "2000-01-01", "10")];
/// let payload = encode_batch_payload("A1", &bets);
/// assert_eq!(&payload[..], b"A1;1\na;b;1;2000-01-01;10\n");
/// ```
pub fn encode_batch_payload(agency_id: &str, bets: &[Bet]) -> Bytes {
    let body: usize = bets.iter().map(Bet::wire_size).sum();
    let mut out = String::with_capacity(agency_id.len() + 16 + body);

    out.push_str(agency_id);
    out.push(WIRE_SEPARATOR);
    out.push_str(&bets.len().to_string());
    out.push('\n');
    for bet in bets {
        bet.write_line(&mut out);
    }

    Bytes::from(out)
}

/// Decode a batch payload into its agency id and bets.
///
/// This is the aggregator's view of [`encode_batch_payload`]: the announced
/// count must match the number of bet lines and every line needs 5 fields.
pub fn decode_batch_payload(payload: &[u8]) -> Result<(String, Vec<Bet>)> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| ClientError::Protocol("batch payload is not valid UTF-8".to_string()))?;

    let mut lines = text.lines().filter(|line| !line.is_empty());
    let header = lines
        .next()
        .ok_or_else(|| ClientError::Protocol("empty batch payload".to_string()))?;

    let (agency_id, count) = header
        .split_once(WIRE_SEPARATOR)
        .ok_or_else(|| ClientError::Protocol(format!("invalid batch header '{}'", header)))?;
    let count: usize = count
        .trim()
        .parse()
        .map_err(|_| ClientError::Protocol(format!("invalid batch header '{}'", header)))?;

    let bets = lines
        .map(|line| {
            Bet::parse_line(line)
                .ok_or_else(|| ClientError::Protocol(format!("invalid bet line '{}'", line)))
        })
        .collect::<Result<Vec<_>>>()?;

    if bets.len() != count {
        return Err(ClientError::Protocol(format!(
            "batch size mismatch: header says {}, got {}",
            count,
            bets.len()
        )));
    }

    Ok((agency_id.trim().to_string(), bets))
}

/// Acknowledgment returned for each batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub status: String,
    pub message: String,
}

impl Response {
    pub fn new(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            message: message.into(),
        }
    }

    /// Decode an ack payload.
    ///
    /// An empty payload is a no-op response; a lone status leaves the message
    /// empty; more than two fields is a protocol error.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| ClientError::Protocol("response is not valid UTF-8".to_string()))?
            .trim();

        if text.is_empty() {
            return Ok(Self::default());
        }

        let fields: Vec<&str> = text.split(WIRE_SEPARATOR).collect();
        match fields.as_slice() {
            [status] => Ok(Self::new(status.trim(), "")),
            [status, message] => Ok(Self::new(status.trim(), message.trim())),
            _ => Err(ClientError::Protocol(format!(
                "expected 'status;message' response, got {} fields",
                fields.len()
            ))),
        }
    }

    /// Encode as `status;message`.
    pub fn encode(&self) -> Bytes {
        if self.message.is_empty() {
            return Bytes::from(self.status.clone());
        }
        Bytes::from(format!("{}{}{}", self.status, WIRE_SEPARATOR, self.message))
    }

    /// The server had nothing to report.
    pub fn is_empty(&self) -> bool {
        self.status.is_empty() && self.message.is_empty()
    }

    /// Accepted: empty, or one of [`SUCCESS_STATUSES`].
    pub fn is_success(&self) -> bool {
        self.is_empty()
            || SUCCESS_STATUSES
                .iter()
                .any(|ok| self.status.eq_ignore_ascii_case(ok))
    }

    /// Convert a failure status into [`ClientError::Rejected`].
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ClientError::Rejected {
                status: self.status,
                message: self.message,
            })
        }
    }
}

/// Decode the winners payload into winner ids.
///
/// Empty segments (e.g. a trailing `;`) are dropped.
pub fn decode_winners(payload: &[u8]) -> Result<Vec<String>> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| ClientError::Protocol("winners payload is not valid UTF-8".to_string()))?
        .trim();

    if text.is_empty() || text == NO_WINNERS {
        return Ok(Vec::new());
    }

    Ok(text
        .split(WIRE_SEPARATOR)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect())
}

/// Encode winner ids, using the sentinel when there are none.
pub fn encode_winners<S: AsRef<str>>(winners: &[S]) -> Bytes {
    if winners.is_empty() {
        return Bytes::from_static(NO_WINNERS.as_bytes());
    }
    let sep = WIRE_SEPARATOR.to_string();
    Bytes::from(
        winners
            .iter()
            .map(|id| id.as_ref())
            .collect::<Vec<&str>>()
            .join(&sep),
    )
}
