//! Candle history from CSV files with a
//! `timestamp,open,high,low,close,volume` header.
//!
//! `timestamp` may be Unix milliseconds or an RFC 3339 string.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use common::{Candle, Error, Result};

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ms) = raw.parse::<i64>() {
        return Utc
            .timestamp_millis_opt(ms)
            .single()
            .ok_or_else(|| Error::DataUnavailable(format!("timestamp out of range: {ms}")));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::DataUnavailable(format!("bad timestamp '{raw}': {e}")))
}

/// Parse candles from any reader, oldest first.
pub fn read_candles<R: Read>(reader: R) -> Result<Vec<Candle>> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut candles = Vec::new();

    for (line, row) in csv.deserialize::<CsvRow>().enumerate() {
        let row = row.map_err(|e| Error::DataUnavailable(format!("CSV row {}: {e}", line + 1)))?;
        candles.push(Candle {
            timestamp: parse_timestamp(&row.timestamp)?,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }

    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}

pub fn load_candles(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        Error::DataUnavailable(format!("Failed to open {}: {e}", path.display()))
    })?;
    let candles = read_candles(file)?;
    tracing::info!(path = %path.display(), count = candles.len(), "Loaded candles from CSV");
    Ok(candles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_millis_and_rfc3339_rows() {
        let raw = "\
timestamp,open,high,low,close,volume
1704070800000,101,102,100,101.5,12
2024-01-01T00:00:00Z,100,101,99,100.5,10
";
        let candles = read_candles(raw.as_bytes()).unwrap();
        assert_eq!(candles.len(), 2);
        // Sorted oldest first.
        assert_eq!(candles[0].close, 100.5);
        assert_eq!(candles[1].close, 101.5);
        assert_eq!(candles[1].timestamp.timestamp_millis(), 1_704_070_800_000);
    }

    #[test]
    fn missing_volume_defaults_to_zero() {
        let raw = "timestamp,open,high,low,close\n0,1,1,1,1\n";
        let candles = read_candles(raw.as_bytes()).unwrap();
        assert_eq!(candles[0].volume, 0.0);
    }

    #[test]
    fn malformed_row_is_data_unavailable() {
        let raw = "timestamp,open,high,low,close,volume\n0,1,1,1,not-a-number,1\n";
        assert!(matches!(read_candles(raw.as_bytes()), Err(Error::DataUnavailable(_))));

        let raw = "timestamp,open,high,low,close,volume\nyesterday,1,1,1,1,1\n";
        assert!(matches!(read_candles(raw.as_bytes()), Err(Error::DataUnavailable(_))));
    }

    #[test]
    fn missing_file_is_data_unavailable() {
        assert!(matches!(
            load_candles("/nonexistent/candles.csv"),
            Err(Error::DataUnavailable(_))
        ));
    }
}
