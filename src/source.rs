//! Record sources feeding the batch builder.
//!
//! A source hands out raw field tuples one at a time. It does not validate
//! them; the batch builder skips tuples with the wrong field count.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{ClientError, Result};

/// Field separator used by agency data files.
pub const FIELD_SEPARATOR: char = ',';

/// Anything that can produce raw record tuples.
pub trait RecordSource {
    /// Next raw field tuple, `Ok(None)` once exhausted.
    fn next_record(&mut self) -> Result<Option<Vec<String>>>;
}

impl<S: RecordSource + ?Sized> RecordSource for &mut S {
    fn next_record(&mut self) -> Result<Option<Vec<String>>> {
        (**self).next_record()
    }
}

impl RecordSource for std::vec::IntoIter<Vec<String>> {
    fn next_record(&mut self) -> Result<Option<Vec<String>>> {
        Ok(self.next())
    }
}

/// Comma separated records, one per line.
///
/// Bytes that are not valid UTF-8 are replaced with U+FFFD; only I/O
/// failures end the source.
pub struct CsvRecordSource<R> {
    reader: R,
    line: Vec<u8>,
}

impl CsvRecordSource<BufReader<File>> {
    /// Open an agency data file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(ClientError::Source)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> CsvRecordSource<R> {
    /// Wrap any buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
        }
    }
}

impl<R: BufRead> RecordSource for CsvRecordSource<R> {
    fn next_record(&mut self) -> Result<Option<Vec<String>>> {
        self.line.clear();
        let n = self
            .reader
            .read_until(b'\n', &mut self.line)
            .map_err(ClientError::Source)?;
        if n == 0 {
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&self.line);
        let line = text.trim_end_matches(&['\n', '\r'][..]);
        if line.is_empty() {
            return Ok(Some(Vec::new()));
        }

        Ok(Some(
            line.split(FIELD_SEPARATOR).map(str::to_string).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor, Read};

    fn drain<S: RecordSource>(mut source: S) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        while let Some(record) = source.next_record().unwrap() {
            out.push(record);
        }
        out
    }

    #[test]
    fn test_csv_splits_on_commas() {
        let source = CsvRecordSource::new(Cursor::new(
            "Santiago,Lorca,30904465,1999-03-17,2201\nAna,Paz,1,2000-01-01,7\n",
        ));
        let records = drain(source);

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            vec!["Santiago", "Lorca", "30904465", "1999-03-17", "2201"]
        );
        assert_eq!(records[1][0], "Ana");
    }

    #[test]
    fn test_csv_strips_crlf_and_handles_missing_final_newline() {
        let records = drain(CsvRecordSource::new(Cursor::new("a,b\r\nc,d")));
        assert_eq!(records, vec![vec!["a", "b"], vec!["c", "d"]]);
    }

    #[test]
    fn test_blank_line_yields_empty_tuple() {
        let records = drain(CsvRecordSource::new(Cursor::new("\na,b\n")));
        assert!(records[0].is_empty());
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_non_utf8_line_does_not_end_the_source() {
        let input: &[u8] = b"Ana,P\xE9rez,1,2000-01-01,7\nLuis,Paz,2,2000-01-02,8\n";
        let records = drain(CsvRecordSource::new(Cursor::new(input)));

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].len(), 5);
        assert_eq!(records[0][1], "P\u{FFFD}rez");
        assert_eq!(records[1], vec!["Luis", "Paz", "2", "2000-01-02", "8"]);
    }

    #[test]
    fn test_read_failure_is_source_error() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "disk gone"))
            }
        }

        let mut source = CsvRecordSource::new(io::BufReader::new(Broken));
        let err = source.next_record().unwrap_err();
        assert!(matches!(err, ClientError::Source(_)));
    }

    #[test]
    fn test_open_missing_file() {
        let result = CsvRecordSource::open("/definitely/not/here.csv");
        assert!(matches!(result, Err(ClientError::Source(_))));
    }

    #[test]
    fn test_vec_source() {
        let source = vec![vec!["x".to_string()]].into_iter();
        assert_eq!(drain(source), vec![vec!["x"]]);
    }
}
