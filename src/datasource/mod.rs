//! Collaborator interfaces: snapshot, bar, and quote sources.
//!
//! The engine never talks to these directly; the orchestration layer fetches
//! through them and hands plain data to the engine. Implementations own
//! pagination, retry/backoff, and rate limiting.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;

use crate::domain::{DailyBar, Decimal, HoldingSnapshot, InstrumentId};

pub mod eastmoney;
pub mod mock;
pub mod store;

pub use eastmoney::EastMoneyFeed;
pub use mock::MockFeed;
pub use store::StoreQuoteSource;

/// Source of disclosed holding snapshots for an instrument.
///
/// Implementations must return non-negative share counts keyed by calendar
/// period-end dates. Holder names must already be normalized to stable ids;
/// fuzzy matching is not this system's job.
#[async_trait]
pub trait SnapshotSource: Send + Sync + fmt::Debug {
    async fn fetch_snapshots(
        &self,
        instrument: &InstrumentId,
    ) -> Result<Vec<HoldingSnapshot>, SourceError>;
}

/// Source of daily bars for an instrument over an inclusive date range.
///
/// Implementations must document whether `volume` is in shares or lots; the
/// engine's lot-size parameter depends on it.
#[async_trait]
pub trait BarSource: Send + Sync + fmt::Debug {
    async fn fetch_bars(
        &self,
        instrument: &InstrumentId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, SourceError>;
}

/// Source of the latest trade price, used only by valuation and narrative,
/// never by the lifecycle tracker.
#[async_trait]
pub trait QuoteSource: Send + Sync + fmt::Debug {
    async fn latest_price(
        &self,
        instrument: &InstrumentId,
    ) -> Result<Option<Decimal>, SourceError>;
}

/// Error type for source operations.
#[derive(Debug, Clone)]
pub enum SourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    HttpError { status: u16, message: String },
    /// Parsing error (invalid JSON or malformed payload)
    ParseError(String),
    /// Rate limit exceeded (caller should implement backoff)
    RateLimited,
    /// Other error
    Other(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            SourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            SourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            SourceError::RateLimited => write!(f, "Rate limited"),
            SourceError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for SourceError {}
