//! Alpha Vantage data provider.
//!
//! Fetches the full daily adjusted history as CSV from the
//! `TIME_SERIES_DAILY_ADJUSTED` endpoint. One request per fetch: no retry,
//! no backoff. Alpha Vantage reports quota and key problems as a JSON body
//! with HTTP 200, so the body is inspected before CSV parsing.

use super::provider::{DataError, PriceProvider, PriceRow};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";

/// One CSV record as Alpha Vantage names its columns.
#[derive(Debug, Deserialize)]
struct CsvRecord {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    adjusted_close: f64,
    volume: u64,
    dividend_amount: f64,
    split_coefficient: f64,
}

/// Alpha Vantage daily adjusted provider.
pub struct AlphaVantageProvider {
    client: reqwest::blocking::Client,
    api_key: String,
    base_url: String,
}

impl AlphaVantageProvider {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| DataError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
        })
    }

    /// Parse a CSV body into rows, surfacing provider JSON notices as fetch errors.
    pub fn parse_body(ticker: &str, body: &str) -> Result<Vec<PriceRow>, DataError> {
        let trimmed = body.trim_start();
        if trimmed.starts_with('{') {
            return Err(DataError::RemoteFetch {
                ticker: ticker.to_string(),
                reason: provider_notice(trimmed),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(trimmed.as_bytes());

        let mut rows = Vec::new();
        for (i, record) in reader.deserialize::<CsvRecord>().enumerate() {
            let record = record.map_err(|e| DataError::ResponseFormat {
                ticker: ticker.to_string(),
                reason: format!("row {}: {e}", i + 1),
            })?;
            let timestamp =
                parse_timestamp(&record.timestamp).ok_or_else(|| DataError::ResponseFormat {
                    ticker: ticker.to_string(),
                    reason: format!("invalid timestamp '{}'", record.timestamp),
                })?;

            rows.push(PriceRow {
                timestamp,
                open: record.open,
                high: record.high,
                low: record.low,
                close: record.close,
                adjusted_close: record.adjusted_close,
                volume: record.volume,
                dividend_amount: record.dividend_amount,
                split_coefficient: record.split_coefficient,
            });
        }

        if rows.is_empty() {
            return Err(DataError::ResponseFormat {
                ticker: ticker.to_string(),
                reason: "response contained no rows".into(),
            });
        }

        Ok(rows)
    }
}

impl PriceProvider for AlphaVantageProvider {
    fn name(&self) -> &str {
        "alpha_vantage"
    }

    fn fetch_daily(&self, ticker: &str) -> Result<Vec<PriceRow>, DataError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("function", "TIME_SERIES_DAILY_ADJUSTED"),
                ("symbol", ticker),
                ("outputsize", "full"),
                ("apikey", self.api_key.as_str()),
                ("datatype", "csv"),
            ])
            .send()
            .map_err(|e| DataError::RemoteFetch {
                ticker: ticker.to_string(),
                reason: e.without_url().to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DataError::RemoteFetch {
                ticker: ticker.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        let body = resp.text().map_err(|e| DataError::RemoteFetch {
            ticker: ticker.to_string(),
            reason: format!("failed to read body: {}", e.without_url()),
        })?;

        let rows = Self::parse_body(ticker, &body)?;
        tracing::info!(ticker, rows = rows.len(), "fetched daily history");
        Ok(rows)
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

/// Pull the human-readable notice out of an Alpha Vantage JSON error body.
fn provider_notice(body: &str) -> String {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return "provider returned a non-CSV body".into(),
    };
    for key in ["Error Message", "Information", "Note"] {
        if let Some(msg) = value.get(key).and_then(|v| v.as_str()) {
            return msg.to_string();
        }
    }
    "provider returned a non-CSV body".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::store::{MemoryStore, PriceStore};
    use crate::data::PriceRepository;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::thread;

    const SAMPLE: &str = "\
timestamp,open,high,low,close,adjusted_close,volume,dividend_amount,split_coefficient
2024-01-03,101.0,103.0,100.0,102.0,102.0,1100,0.0000,1.0
2024-01-02,100.0,102.0,99.0,101.0,101.0,1000,0.0000,1.0
";

    #[test]
    fn parses_csv_in_provider_order() {
        let rows = AlphaVantageProvider::parse_body("SPY", SAMPLE).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert_eq!(rows[0].close, 102.0);
        assert_eq!(rows[1].volume, 1000);
        assert_eq!(rows[1].split_coefficient, 1.0);
    }

    #[test]
    fn accepts_datetime_timestamps() {
        assert_eq!(
            parse_timestamp("2024-01-02 00:00:00"),
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
        assert_eq!(parse_timestamp("not a date"), None);
    }

    #[test]
    fn json_notice_becomes_remote_fetch_error() {
        let body = r#"{"Information": "Thank you for using Alpha Vantage! Rate limit reached."}"#;
        let err = AlphaVantageProvider::parse_body("SPY", body).unwrap_err();
        assert!(err.is_remote());
        assert!(err.to_string().contains("Rate limit reached"));
    }

    #[test]
    fn invalid_api_key_message_is_surfaced() {
        let body = r#"{"Error Message": "Invalid API call."}"#;
        let err = AlphaVantageProvider::parse_body("NOPE", body).unwrap_err();
        assert!(matches!(err, DataError::RemoteFetch { .. }));
        assert!(err.to_string().contains("Invalid API call"));
    }

    #[test]
    fn wrong_shape_is_format_error() {
        let body = "date,price\n2024-01-02,100\n";
        let err = AlphaVantageProvider::parse_body("SPY", body).unwrap_err();
        assert!(matches!(err, DataError::ResponseFormat { .. }));
    }

    // ── Over a local socket ─────────────────────────────────────────

    /// Answer exactly one request with `response`, returning the base URL.
    fn serve_once(response: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            stream.write_all(response.as_bytes()).unwrap();
        });
        format!("http://{addr}/query")
    }

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: text/csv\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    /// A port nothing listens on.
    fn closed_port_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}/query")
    }

    #[test]
    fn fetches_csv_over_http() {
        let url = serve_once(http_response("200 OK", SAMPLE));
        let provider = AlphaVantageProvider::new("demo", url).unwrap();
        let rows = provider.fetch_daily("SPY").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].timestamp, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }

    #[test]
    fn non_success_status_is_remote_fetch_error() {
        let url = serve_once(http_response("503 Service Unavailable", ""));
        let provider = AlphaVantageProvider::new("demo", url).unwrap();
        let err = provider.fetch_daily("SPY").unwrap_err();
        assert!(matches!(err, DataError::RemoteFetch { .. }), "{err}");
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn connection_failure_is_remote_fetch_error() {
        let provider = AlphaVantageProvider::new("demo", closed_port_url()).unwrap();
        let err = provider.fetch_daily("SPY").unwrap_err();
        assert!(matches!(err, DataError::RemoteFetch { .. }), "{err}");
    }

    #[test]
    fn failed_fetch_leaves_no_table() {
        let store = Arc::new(MemoryStore::new());

        let url = serve_once(http_response("503 Service Unavailable", ""));
        let repo = PriceRepository::new(
            store.clone(),
            Arc::new(AlphaVantageProvider::new("demo", url).unwrap()),
        );
        assert!(repo.fetch_remote("SPY").unwrap_err().is_remote());
        assert!(!store.table_exists("SPY").unwrap());

        let repo = PriceRepository::new(
            store.clone(),
            Arc::new(AlphaVantageProvider::new("demo", closed_port_url()).unwrap()),
        );
        assert!(repo.fetch_remote("SPY").unwrap_err().is_remote());
        assert!(!store.table_exists("SPY").unwrap());
    }

    #[test]
    fn header_only_is_format_error() {
        let body = "timestamp,open,high,low,close,adjusted_close,volume,dividend_amount,split_coefficient\n";
        let err = AlphaVantageProvider::parse_body("SPY", body).unwrap_err();
        assert!(err.to_string().contains("no rows"));
    }
}
