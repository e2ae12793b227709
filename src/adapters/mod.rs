//! Pipeline stage adapters.
//!
//! Each adapter is the body of one pipeline stage: it receives explicit
//! configuration and service handles, performs one unit of work, and
//! returns a structured [`Outcome`](crate::outcome::Outcome). Adapters
//! convert their own errors into `failed` outcomes at the boundary so the
//! invoker always gets a record to report; the notification adapter
//! deliberately propagates instead, so a lost notification surfaces as an
//! invocation error.

pub mod check;
pub mod etl;
pub mod ingest;
pub mod load;
pub mod notify;
pub mod provision;
pub mod query;
pub mod train;

use snafu::prelude::*;
use tracing::error;

use crate::error::{AdapterError, CsvError, CsvParseSnafu, NoHeaderSnafu};
use crate::outcome::Outcome;

/// Fold an adapter error into a `failed` outcome, logging the chain.
pub(crate) fn outcome_or_failure(stage: &str, result: Result<Outcome, AdapterError>) -> Outcome {
    match result {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("[{}] {}", stage, err.chain());
            Outcome::from_error(&err)
        }
    }
}

/// A parsed delimited-text object: header row plus data rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CsvObject {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Parse raw object bytes as CSV.
///
/// Decoding is lossy so a stray non-UTF-8 byte degrades one cell instead
/// of failing the whole load. Ragged rows are accepted as-is.
pub(crate) fn parse_csv(data: &[u8]) -> Result<CsvObject, CsvError> {
    let text = String::from_utf8_lossy(data);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record
            .context(CsvParseSnafu)?
            .iter()
            .map(str::to_string)
            .collect(),
        None => return NoHeaderSnafu.fail(),
    };

    let mut rows = Vec::new();
    for record in records {
        let record = record.context(CsvParseSnafu)?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(CsvObject { header, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv_splits_header_and_rows() {
        let csv = parse_csv(b"property_type,number_of_listings\nApartment,120\nHouse,45\n").unwrap();
        assert_eq!(csv.header, vec!["property_type", "number_of_listings"]);
        assert_eq!(csv.rows.len(), 2);
        assert_eq!(csv.rows[0], vec!["Apartment", "120"]);
    }

    #[test]
    fn test_parse_csv_header_only_has_no_rows() {
        let csv = parse_csv(b"a,b,c\n").unwrap();
        assert_eq!(csv.header.len(), 3);
        assert!(csv.rows.is_empty());
    }

    #[test]
    fn test_parse_csv_empty_object_is_rejected() {
        let err = parse_csv(b"").unwrap_err();
        assert!(matches!(err, CsvError::NoHeader));
    }

    #[test]
    fn test_parse_csv_tolerates_non_utf8_bytes() {
        // 0xE9 is 'é' in Latin-1; lossy decoding turns it into U+FFFD
        // instead of failing the parse.
        let csv = parse_csv(b"city,price\nMontr\xe9al,80\n").unwrap();
        assert_eq!(csv.rows[0][1], "80");
    }

    #[test]
    fn test_outcome_or_failure_wraps_errors() {
        let outcome = outcome_or_failure("test", Err(AdapterError::Cancelled));
        assert!(!outcome.is_success());
        assert!(outcome.message.contains("Cancelled"));
    }
}
