//! Record decoder for `-COMMAdelimited` dsmadmc output

use tracing::debug;

use crate::error_handling::DecodeError;

/// One row of query output
pub type Record = Vec<String>;

/// Decode delimited text into rows of exactly `arity` fields.
///
/// Rows with any other field count (banners, informational messages) are
/// skipped. Quoted fields may contain commas; a line with an unterminated
/// quote fails the whole decode.
pub fn decode(output: &str, arity: usize) -> Result<Vec<Record>, DecodeError> {
    if let Some(line) = output
        .lines()
        .position(|line| line.matches('"').count() % 2 != 0)
    {
        return Err(DecodeError::MalformedQuote { line: line + 1 });
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(output.as_bytes());

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.len() != arity {
            debug!(
                "Skipping row with {} fields, expected {}: {:?}",
                record.len(),
                arity,
                record
            );
            continue;
        }
        records.push(record.iter().map(str::to_string).collect());
    }

    Ok(records)
}
