//! EastMoney public-API feed implementation.
//!
//! Bars come from the push2his kline endpoint (daily, forward-adjusted,
//! volume in exchange lots, turnover in currency); snapshots come from the
//! F10 holder-disclosure endpoint, merged across the full-holders and
//! free-float-holders report types.

use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::NaiveDate;
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::{DailyBar, Decimal, HolderId, HoldingSnapshot, InstrumentId};

use super::{BarSource, SnapshotSource, SourceError};

const HOLDER_REPORT_TYPES: [&str; 2] = ["RPT_F10_EH_HOLDERS", "RPT_F10_EH_FREEHOLDERS"];

/// Feed adapter over the EastMoney kline and holder-disclosure endpoints.
#[derive(Debug, Clone)]
pub struct EastMoneyFeed {
    client: Client,
    kline_url: String,
    holders_url: String,
}

impl EastMoneyFeed {
    /// Create a feed targeting the given endpoint URLs.
    pub fn new(kline_url: String, holders_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            kline_url,
            holders_url,
        }
    }

    /// Market prefix for the quote API: Shanghai listings (6xx) are market 1,
    /// everything else market 0.
    fn secid(instrument: &InstrumentId) -> String {
        if instrument.as_str().starts_with('6') {
            format!("1.{}", instrument.as_str())
        } else {
            format!("0.{}", instrument.as_str())
        }
    }

    /// Exchange-suffixed code for the disclosure API.
    fn secucode(instrument: &InstrumentId) -> String {
        if instrument.as_str().starts_with('6') {
            format!("{}.SH", instrument.as_str())
        } else {
            format!("{}.SZ", instrument.as_str())
        }
    }

    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, SourceError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .client
                .get(url)
                .query(query)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(SourceError::NetworkError(e.to_string())))?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(SourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(SourceError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(SourceError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(SourceError::ParseError(e.to_string())))
        })
        .await
    }
}

#[async_trait]
impl BarSource for EastMoneyFeed {
    async fn fetch_bars(
        &self,
        instrument: &InstrumentId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, SourceError> {
        debug!(
            "Fetching bars for instrument={}, start={}, end={}",
            instrument, start, end
        );

        let query = [
            ("secid", Self::secid(instrument)),
            ("klt", "101".to_string()),
            ("fqt", "1".to_string()),
            ("lmt", "10000".to_string()),
            ("beg", start.format("%Y%m%d").to_string()),
            ("end", end.format("%Y%m%d").to_string()),
            ("fields1", "f1".to_string()),
            ("fields2", "f51,f52,f53,f54,f55,f56,f57".to_string()),
        ];

        let response = self.get_json(&self.kline_url, &query).await?;

        let klines = match response
            .get("data")
            .and_then(|d| d.get("klines"))
            .and_then(|k| k.as_array())
        {
            Some(klines) => klines,
            // The endpoint answers with a null data object for instruments
            // with no bars in range; that is a data gap, not a failure.
            None => return Ok(Vec::new()),
        };

        let mut bars = Vec::with_capacity(klines.len());
        for kline in klines {
            let line = kline
                .as_str()
                .ok_or_else(|| SourceError::ParseError("kline entry is not a string".to_string()))?;
            match parse_kline(instrument, line) {
                Ok(bar) => bars.push(bar),
                Err(e) => warn!("Failed to parse kline {:?}: {}", line, e),
            }
        }

        Ok(bars)
    }
}

#[async_trait]
impl SnapshotSource for EastMoneyFeed {
    async fn fetch_snapshots(
        &self,
        instrument: &InstrumentId,
    ) -> Result<Vec<HoldingSnapshot>, SourceError> {
        debug!("Fetching holder snapshots for instrument={}", instrument);

        let mut snapshots = Vec::new();
        let mut seen: HashSet<(NaiveDate, String)> = HashSet::new();

        for report_type in HOLDER_REPORT_TYPES {
            let query = [
                ("type", report_type.to_string()),
                ("sty", "END_DATE,HOLDER_NAME,HOLD_NUM".to_string()),
                ("filter", format!("(SECUCODE=\"{}\")", Self::secucode(instrument))),
                ("p", "1".to_string()),
                ("ps", "5000".to_string()),
                ("st", "END_DATE".to_string()),
                ("sr", "1".to_string()),
                ("source", "SELECT_SECU_DATA".to_string()),
                ("client", "WEB".to_string()),
            ];

            let response = self.get_json(&self.holders_url, &query).await?;

            let rows = match response
                .get("result")
                .and_then(|r| r.get("data"))
                .and_then(|d| d.as_array())
            {
                Some(rows) => rows,
                None => continue,
            };

            for row in rows {
                match parse_holder_row(instrument, row) {
                    Ok(snapshot) => {
                        let key = (snapshot.period_end, snapshot.holder_id.as_str().to_string());
                        // The two report types overlap heavily; keep the
                        // first occurrence per (period, holder).
                        if seen.insert(key) {
                            snapshots.push(snapshot);
                        }
                    }
                    Err(e) => warn!("Failed to parse holder row: {}", e),
                }
            }
        }

        Ok(snapshots)
    }
}

fn parse_kline(instrument: &InstrumentId, line: &str) -> Result<DailyBar, SourceError> {
    // fields2 order: date, open, close, high, low, volume (lots), turnover.
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 7 {
        return Err(SourceError::ParseError(format!(
            "kline has {} fields, expected 7",
            parts.len()
        )));
    }

    let trade_date = NaiveDate::parse_from_str(parts[0], "%Y-%m-%d")
        .map_err(|e| SourceError::ParseError(format!("bad trade date {:?}: {}", parts[0], e)))?;

    let field = |idx: usize, name: &str| {
        Decimal::from_str_canonical(parts[idx])
            .map_err(|e| SourceError::ParseError(format!("bad {} {:?}: {}", name, parts[idx], e)))
    };

    Ok(DailyBar::new(
        instrument.clone(),
        trade_date,
        field(1, "open")?,
        field(3, "high")?,
        field(4, "low")?,
        field(2, "close")?,
        field(5, "volume")?,
        field(6, "turnover")?,
    ))
}

fn parse_holder_row(
    instrument: &InstrumentId,
    row: &serde_json::Value,
) -> Result<HoldingSnapshot, SourceError> {
    let end_date_raw = row
        .get("END_DATE")
        .and_then(|v| v.as_str())
        .ok_or_else(|| SourceError::ParseError("Missing END_DATE field".to_string()))?;
    // Dates arrive as "2024-03-31 00:00:00"; only the date part matters.
    let date_part = end_date_raw.get(..10).unwrap_or(end_date_raw);
    let period_end = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|e| {
        SourceError::ParseError(format!("bad END_DATE {:?}: {}", end_date_raw, e))
    })?;

    let holder_name = row
        .get("HOLDER_NAME")
        .and_then(|v| v.as_str())
        .ok_or_else(|| SourceError::ParseError("Missing HOLDER_NAME field".to_string()))?;

    // HOLD_NUM is reported as a JSON number, occasionally fractional due to
    // upstream unit quirks; disclosed share counts are whole shares.
    let held_quantity = row
        .get("HOLD_NUM")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| SourceError::ParseError("Missing HOLD_NUM field".to_string()))?
        .round() as i64;

    Ok(HoldingSnapshot::new(
        instrument.clone(),
        HolderId::new(holder_name),
        period_end,
        held_quantity,
    ))
}
