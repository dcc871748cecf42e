//! Mock feed for testing without network calls.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;

use crate::domain::{DailyBar, Decimal, HoldingSnapshot, InstrumentId};

use super::{BarSource, QuoteSource, SnapshotSource, SourceError};

/// Mock feed that serves predefined snapshots, bars, and quotes.
#[derive(Debug, Clone, Default)]
pub struct MockFeed {
    snapshots: Vec<HoldingSnapshot>,
    bars: Vec<DailyBar>,
    quotes: HashMap<InstrumentId, Decimal>,
    fail_instruments: Vec<InstrumentId>,
}

impl MockFeed {
    /// Create a new mock feed with no data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a snapshot to the feed.
    pub fn with_snapshot(mut self, snapshot: HoldingSnapshot) -> Self {
        self.snapshots.push(snapshot);
        self
    }

    /// Add multiple snapshots to the feed.
    pub fn with_snapshots(mut self, snapshots: Vec<HoldingSnapshot>) -> Self {
        self.snapshots.extend(snapshots);
        self
    }

    /// Add a bar to the feed.
    pub fn with_bar(mut self, bar: DailyBar) -> Self {
        self.bars.push(bar);
        self
    }

    /// Add multiple bars to the feed.
    pub fn with_bars(mut self, bars: Vec<DailyBar>) -> Self {
        self.bars.extend(bars);
        self
    }

    /// Set the latest quote for an instrument.
    pub fn with_quote(mut self, instrument: InstrumentId, price: Decimal) -> Self {
        self.quotes.insert(instrument, price);
        self
    }

    /// Make every call for the given instrument fail with a network error.
    pub fn with_failing_instrument(mut self, instrument: InstrumentId) -> Self {
        self.fail_instruments.push(instrument);
        self
    }

    fn check_failure(&self, instrument: &InstrumentId) -> Result<(), SourceError> {
        if self.fail_instruments.contains(instrument) {
            return Err(SourceError::NetworkError(format!(
                "mock failure for {}",
                instrument
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotSource for MockFeed {
    async fn fetch_snapshots(
        &self,
        instrument: &InstrumentId,
    ) -> Result<Vec<HoldingSnapshot>, SourceError> {
        self.check_failure(instrument)?;
        Ok(self
            .snapshots
            .iter()
            .filter(|s| &s.instrument_id == instrument)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BarSource for MockFeed {
    async fn fetch_bars(
        &self,
        instrument: &InstrumentId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyBar>, SourceError> {
        self.check_failure(instrument)?;
        Ok(self
            .bars
            .iter()
            .filter(|b| {
                &b.instrument_id == instrument && b.trade_date >= start && b.trade_date <= end
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl QuoteSource for MockFeed {
    async fn latest_price(
        &self,
        instrument: &InstrumentId,
    ) -> Result<Option<Decimal>, SourceError> {
        self.check_failure(instrument)?;
        Ok(self.quotes.get(instrument).copied())
    }
}
