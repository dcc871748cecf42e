//! Snapshot and bar ingestion from the feed into the store.

use chrono::{Duration, NaiveDate};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::datasource::{BarSource, SnapshotSource};
use crate::db::Repository;
use crate::domain::InstrumentId;

/// Pulls disclosure snapshots and daily bars for each configured instrument
/// and upserts them into the store.
///
/// A failing instrument is logged and skipped; ingestion of the others
/// continues. Retries live inside the feed adapter, not here.
#[derive(Clone)]
pub struct Ingestor {
    snapshots: Arc<dyn SnapshotSource>,
    bars: Arc<dyn BarSource>,
    repo: Arc<Repository>,
    config: Config,
}

/// Counters from one ingestion pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub instruments_ok: usize,
    pub instruments_failed: usize,
    pub snapshots_fetched: usize,
    pub snapshots_new: usize,
    pub bars_fetched: usize,
    pub bars_new: usize,
}

impl Ingestor {
    pub fn new(
        snapshots: Arc<dyn SnapshotSource>,
        bars: Arc<dyn BarSource>,
        repo: Arc<Repository>,
        config: Config,
    ) -> Self {
        Self {
            snapshots,
            bars,
            repo,
            config,
        }
    }

    /// Ingest all configured instruments up to `as_of`.
    ///
    /// # Errors
    /// Returns an error only on store failures; feed failures degrade to
    /// per-instrument skips.
    pub async fn ingest_all(&self, as_of: NaiveDate) -> Result<IngestReport, sqlx::Error> {
        let mut report = IngestReport::default();

        for code in &self.config.instruments {
            let instrument = InstrumentId::new(code.clone());
            match self.ingest_instrument(&instrument, as_of).await {
                Ok((snaps_fetched, snaps_new, bars_fetched, bars_new)) => {
                    report.instruments_ok += 1;
                    report.snapshots_fetched += snaps_fetched;
                    report.snapshots_new += snaps_new;
                    report.bars_fetched += bars_fetched;
                    report.bars_new += bars_new;
                }
                Err(IngestSkip::Feed(e)) => {
                    report.instruments_failed += 1;
                    warn!(instrument = %instrument, "skipping instrument, feed failed: {}", e);
                }
                Err(IngestSkip::Store(e)) => return Err(e),
            }
        }

        info!(
            "Ingestion finished: {} ok, {} failed, {} new snapshots, {} new bars",
            report.instruments_ok, report.instruments_failed, report.snapshots_new, report.bars_new
        );
        Ok(report)
    }

    async fn ingest_instrument(
        &self,
        instrument: &InstrumentId,
        as_of: NaiveDate,
    ) -> Result<(usize, usize, usize, usize), IngestSkip> {
        let mut snapshots = self
            .snapshots
            .fetch_snapshots(instrument)
            .await
            .map_err(IngestSkip::Feed)?;

        if !self.config.holder_keywords.is_empty() {
            snapshots.retain(|s| {
                self.config
                    .holder_keywords
                    .iter()
                    .any(|kw| s.holder_id.as_str().contains(kw))
            });
        }

        let snaps_fetched = snapshots.len();
        let snaps_new = self
            .repo
            .insert_snapshots_batch(&snapshots)
            .await
            .map_err(IngestSkip::Store)?;

        // Resume bar fetches from the day after the last stored bar; first
        // ingestion reaches back over the configured lookback.
        let fetch_from = match self
            .repo
            .latest_trade_date(instrument)
            .await
            .map_err(IngestSkip::Store)?
        {
            Some(latest) => latest + Duration::days(1),
            None => as_of - Duration::days(self.config.bar_lookback_days),
        };

        let (bars_fetched, bars_new) = if fetch_from <= as_of {
            let bars = self
                .bars
                .fetch_bars(instrument, fetch_from, as_of)
                .await
                .map_err(IngestSkip::Feed)?;
            let new = self
                .repo
                .insert_bars_batch(&bars)
                .await
                .map_err(IngestSkip::Store)?;
            (bars.len(), new)
        } else {
            (0, 0)
        };

        Ok((snaps_fetched, snaps_new, bars_fetched, bars_new))
    }
}

enum IngestSkip {
    Feed(crate::datasource::SourceError),
    Store(sqlx::Error),
}
