//! Bets and size/count-bounded batches.
//!
//! A [`Batch`] enforces two limits: serialized bytes and number of bets.
//! The first bet offered to an empty batch is always admitted, even when it
//! alone exceeds the byte limit, so an oversized record can never stall the
//! session. A bet that does not fit is handed back to the caller as overflow
//! and seeds the next batch.

use tracing::debug;

use crate::error::{ClientError, Result};
use crate::source::RecordSource;

/// Number of fields in a bet record.
pub const BET_FIELDS: usize = 5;

/// Separator between bet fields on the wire.
pub const WIRE_SEPARATOR: char = ';';

/// A single bet placed at the agency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bet {
    pub name: String,
    pub surname: String,
    pub client_id: String,
    pub date_of_birth: String,
    pub bet_number: String,
}

impl Bet {
    pub fn new(
        name: impl Into<String>,
        surname: impl Into<String>,
        client_id: impl Into<String>,
        date_of_birth: impl Into<String>,
        bet_number: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            surname: surname.into(),
            client_id: client_id.into(),
            date_of_birth: date_of_birth.into(),
            bet_number: bet_number.into(),
        }
    }

    /// Build a bet from a raw record tuple; `None` on wrong arity.
    pub fn from_fields(fields: Vec<String>) -> Option<Self> {
        let [name, surname, client_id, date_of_birth, bet_number]: [String; BET_FIELDS] =
            fields.try_into().ok()?;
        Some(Self {
            name,
            surname,
            client_id,
            date_of_birth,
            bet_number,
        })
    }

    /// Parse a wire line (`name;surname;id;dob;number`, newline optional).
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        Self::from_fields(line.split(WIRE_SEPARATOR).map(str::to_string).collect())
    }

    /// Append the wire line for this bet, including its trailing newline.
    pub fn write_line(&self, out: &mut String) {
        for (i, field) in self.fields().iter().enumerate() {
            if i > 0 {
                out.push(WIRE_SEPARATOR);
            }
            out.push_str(field);
        }
        out.push('\n');
    }

    /// The wire line for this bet.
    pub fn to_line(&self) -> String {
        let mut line = String::with_capacity(self.wire_size());
        self.write_line(&mut line);
        line
    }

    /// Serialized size in bytes, separators and newline included.
    pub fn wire_size(&self) -> usize {
        self.fields().iter().map(|f| f.len()).sum::<usize>() + BET_FIELDS
    }

    fn fields(&self) -> [&str; BET_FIELDS] {
        [
            &self.name,
            &self.surname,
            &self.client_id,
            &self.date_of_birth,
            &self.bet_number,
        ]
    }
}

/// Byte and count limits applied to every batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    /// Maximum serialized bytes of bet lines.
    pub max_size: usize,
    /// Maximum number of bets.
    pub max_bets: usize,
}

impl BatchLimits {
    pub fn new(max_size: usize, max_bets: usize) -> Self {
        Self { max_size, max_bets }
    }

    /// Whether any bet can ever be admitted under these limits.
    pub fn can_seat_any(&self) -> bool {
        self.max_size > 0 && self.max_bets > 0
    }
}

/// An ordered group of bets sent as one frame.
#[derive(Debug, Clone)]
pub struct Batch {
    bets: Vec<Bet>,
    current_size: usize,
    limits: BatchLimits,
}

impl Batch {
    /// Create an empty batch.
    pub fn new(limits: BatchLimits) -> Self {
        Self {
            bets: Vec::new(),
            current_size: 0,
            limits,
        }
    }

    /// Try to add a bet, handing it back if it does not fit.
    pub fn try_add(&mut self, bet: Bet) -> std::result::Result<(), Bet> {
        let size = bet.wire_size();
        if !self.admits(size) {
            return Err(bet);
        }
        self.current_size += size;
        self.bets.push(bet);
        Ok(())
    }

    fn admits(&self, size: usize) -> bool {
        if self.bets.is_empty() {
            // Oversized first record: accepted regardless of max_size so the
            // session always makes progress, unless the limits are degenerate.
            return self.limits.can_seat_any();
        }
        self.current_size + size <= self.limits.max_size
            && self.bets.len() < self.limits.max_bets
    }

    /// Bets in insertion order.
    pub fn bets(&self) -> &[Bet] {
        &self.bets
    }

    /// Number of bets.
    pub fn len(&self) -> usize {
        self.bets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bets.is_empty()
    }

    /// Serialized bytes of all bet lines.
    pub fn current_size(&self) -> usize {
        self.current_size
    }

    pub fn limits(&self) -> BatchLimits {
        self.limits
    }
}

/// Result of one batch construction call.
#[derive(Debug)]
pub struct BuiltBatch {
    pub batch: Batch,
    /// Bet that did not fit, to seed the next call.
    pub overflow: Option<Bet>,
}

impl BuiltBatch {
    /// Source and overflow are both exhausted.
    pub fn is_done(&self) -> bool {
        self.batch.is_empty() && self.overflow.is_none()
    }

    /// Nothing could be seated although a bet is pending.
    pub fn is_stuck(&self) -> bool {
        self.batch.is_empty() && self.overflow.is_some()
    }

    /// Turn a stuck result into a configuration error.
    pub fn check_progress(self) -> Result<Self> {
        if !self.is_stuck() {
            return Ok(self);
        }
        let size = self.overflow.as_ref().map_or(0, Bet::wire_size);
        Err(ClientError::Config(format!(
            "bet of {} bytes can never fit a batch (max_size {}, max_bets {})",
            size, self.batch.limits.max_size, self.batch.limits.max_bets
        )))
    }
}

/// Fill a batch from `source`, seating `pending` first.
///
/// Malformed tuples are skipped and do not count toward either limit.
/// Source read failures are returned as errors; no partial batch escapes.
pub fn build_batch<S>(source: &mut S, limits: BatchLimits, pending: Option<Bet>) -> Result<BuiltBatch>
where
    S: RecordSource + ?Sized,
{
    let mut batch = Batch::new(limits);

    if let Some(bet) = pending {
        if let Err(bet) = batch.try_add(bet) {
            return Ok(BuiltBatch {
                batch,
                overflow: Some(bet),
            });
        }
    }

    while let Some(fields) = source.next_record()? {
        let arity = fields.len();
        let Some(bet) = Bet::from_fields(fields) else {
            debug!(action = "skip_record", fields = arity, "Skipping malformed record");
            continue;
        };

        if let Err(bet) = batch.try_add(bet) {
            return Ok(BuiltBatch {
                batch,
                overflow: Some(bet),
            });
        }
    }

    Ok(BuiltBatch {
        batch,
        overflow: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    fn bet_record(n: usize) -> Vec<String> {
        record(&["name", "surname", &n.to_string(), "2000-01-01", &(n * 10).to_string()])
    }

    fn source(records: Vec<Vec<String>>) -> std::vec::IntoIter<Vec<String>> {
        records.into_iter()
    }

    /// Drain the builder until done, returning every batch.
    fn partition(records: Vec<Vec<String>>, limits: BatchLimits) -> Vec<Batch> {
        let mut src = source(records);
        let mut pending = None;
        let mut batches = Vec::new();
        loop {
            let built = build_batch(&mut src, limits, pending.take())
                .unwrap()
                .check_progress()
                .unwrap();
            if built.is_done() {
                return batches;
            }
            pending = built.overflow;
            batches.push(built.batch);
        }
    }

    #[test]
    fn test_bet_line_format() {
        let bet = Bet::new("Santiago", "Lorca", "30904465", "1999-03-17", "2201");
        assert_eq!(bet.to_line(), "Santiago;Lorca;30904465;1999-03-17;2201\n");
        assert_eq!(bet.wire_size(), bet.to_line().len());
    }

    #[test]
    fn test_bet_line_parses_back() {
        let bet = Bet::new("a", "b", "1", "2000-01-01", "10");
        assert_eq!(Bet::parse_line(&bet.to_line()), Some(bet));
    }

    #[test]
    fn test_from_fields_checks_arity() {
        assert!(Bet::from_fields(record(&["a", "b", "c", "d"])).is_none());
        assert!(Bet::from_fields(record(&["a", "b", "c", "d", "e", "f"])).is_none());
        assert!(Bet::from_fields(record(&["a", "b", "c", "d", "e"])).is_some());
    }

    #[test]
    fn test_count_limit_splits_batches() {
        let batches = partition((1..=5).map(bet_record).collect(), BatchLimits::new(10_000, 2));
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_size_limit_splits_batches() {
        let one = Bet::from_fields(bet_record(1)).unwrap().wire_size();
        let limits = BatchLimits::new(one * 2, 100);
        let batches = partition((1..=3).map(bet_record).collect(), limits);

        assert_eq!(batches.len(), 2);
        for batch in &batches {
            assert!(batch.current_size() <= limits.max_size);
        }
    }

    #[test]
    fn test_oversized_first_record_is_accepted() {
        let limits = BatchLimits::new(10, 5);
        let batches = partition(vec![bet_record(1), bet_record(2)], limits);

        // Each record alone exceeds max_size, so each ships on its own.
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == 1));
        assert!(batches[0].current_size() > limits.max_size);
    }

    #[test]
    fn test_overflow_becomes_first_of_next_batch() {
        let mut src = source((1..=3).map(bet_record).collect());
        let limits = BatchLimits::new(10_000, 2);

        let first = build_batch(&mut src, limits, None).unwrap();
        let overflow = first.overflow.clone().expect("third bet overflows");
        assert_eq!(overflow.client_id, "3");

        let second = build_batch(&mut src, limits, first.overflow).unwrap();
        assert_eq!(second.batch.bets()[0], overflow);
        assert!(second.overflow.is_none());
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let records = vec![
            record(&["only", "three", "fields"]),
            bet_record(1),
            Vec::new(),
            bet_record(2),
        ];
        let batches = partition(records, BatchLimits::new(10_000, 10));

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(
            batches[0].current_size(),
            batches[0].bets().iter().map(Bet::wire_size).sum::<usize>()
        );
    }

    #[test]
    fn test_empty_source_is_done() {
        let built = build_batch(&mut source(Vec::new()), BatchLimits::new(100, 10), None).unwrap();
        assert!(built.is_done());
        assert!(!built.is_stuck());
    }

    #[test]
    fn test_zero_max_bets_is_config_error() {
        let limits = BatchLimits::new(1000, 0);
        let built = build_batch(&mut source(vec![bet_record(1)]), limits, None).unwrap();
        assert!(built.is_stuck());

        let err = built.check_progress().unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn test_pending_overflow_returned_unchanged_when_unseatable() {
        let pending = Bet::from_fields(bet_record(7)).unwrap();
        let mut src = source(vec![bet_record(8)]);

        let built = build_batch(&mut src, BatchLimits::new(0, 3), Some(pending.clone())).unwrap();

        assert!(built.batch.is_empty());
        assert_eq!(built.overflow, Some(pending));
        // The source was not touched.
        assert_eq!(src.len(), 1);
    }

    #[test]
    fn test_source_error_propagates() {
        struct Failing;
        impl RecordSource for Failing {
            fn next_record(&mut self) -> Result<Option<Vec<String>>> {
                Err(ClientError::Source(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "read failed",
                )))
            }
        }

        let result = build_batch(&mut Failing, BatchLimits::new(100, 10), None);
        assert!(matches!(result, Err(ClientError::Source(_))));
    }

    #[test]
    fn test_partition_preserves_order_and_limits() {
        let records: Vec<_> = (1..=23).map(bet_record).collect();
        for (max_size, max_bets) in [(1, 1), (40, 3), (100, 4), (10_000, 7)] {
            let limits = BatchLimits::new(max_size, max_bets);
            let batches = partition(records.clone(), limits);

            let ids: Vec<String> = batches
                .iter()
                .flat_map(|b| b.bets().iter().map(|bet| bet.client_id.clone()))
                .collect();
            let expected: Vec<String> = (1..=23).map(|n| n.to_string()).collect();
            assert_eq!(ids, expected);

            for batch in &batches {
                assert!(batch.len() <= max_bets);
                assert!(batch.len() == 1 || batch.current_size() <= max_size);
            }
        }
    }
}
