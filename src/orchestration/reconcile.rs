//! Reconciliation fan-out across (instrument, holder) groups.

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::Config;
use crate::datasource::QuoteSource;
use crate::db::Repository;
use crate::domain::{Decimal, HolderId, HoldingSnapshot, InstrumentId};
use crate::engine::{reconstruct_group, BarSeries};
use crate::error::AppError;

/// Cooperative cancellation handle: stops dispatch of new groups while
/// letting in-flight groups finish.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One group's failure, reported without aborting siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairFailure {
    pub instrument_id: InstrumentId,
    pub holder_id: HolderId,
    pub reason: String,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default, Clone)]
pub struct ReconcileSummary {
    pub pairs_total: usize,
    pub pairs_written: usize,
    pub pairs_skipped: usize,
    pub failures: Vec<PairFailure>,
}

/// Fans the reconstruction engine out across all stored (instrument, holder)
/// groups on a bounded worker pool.
///
/// Each group is an independent, stateless computation; the only shared
/// resource is the output store, and per-pair upserts touch disjoint keys, so
/// no cross-pair locking exists anywhere.
#[derive(Clone)]
pub struct Reconciler {
    repo: Arc<Repository>,
    quotes: Arc<dyn QuoteSource>,
    config: Config,
    cancel: CancelFlag,
}

impl Reconciler {
    pub fn new(repo: Arc<Repository>, quotes: Arc<dyn QuoteSource>, config: Config) -> Self {
        Self {
            repo,
            quotes,
            config,
            cancel: CancelFlag::new(),
        }
    }

    /// Handle for operator-initiated aborts.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Recompute cost-basis and valuation records for every stored pair.
    ///
    /// `as_of` stamps all derived rows; passing the same value over the same
    /// inputs reproduces identical output sets. Group failures are collected
    /// in the summary, never propagated.
    ///
    /// # Errors
    /// Returns an error only when loading inputs from the store fails.
    pub async fn reconcile_all(&self, as_of: DateTime<Utc>) -> Result<ReconcileSummary, AppError> {
        let snapshots = self.repo.query_all_snapshots().await?;

        // BTreeMap keeps group iteration deterministic across runs.
        let mut groups: BTreeMap<(InstrumentId, HolderId), Vec<HoldingSnapshot>> = BTreeMap::new();
        for snapshot in snapshots {
            groups
                .entry((snapshot.instrument_id.clone(), snapshot.holder_id.clone()))
                .or_default()
                .push(snapshot);
        }

        let mut summary = ReconcileSummary {
            pairs_total: groups.len(),
            ..ReconcileSummary::default()
        };
        info!("Reconciling {} (instrument, holder) pairs", groups.len());

        // Bars and quotes are per-instrument; load each once up front so the
        // workers run pure computation plus output writes only.
        let mut instruments: Vec<InstrumentId> =
            groups.keys().map(|(instrument, _)| instrument.clone()).collect();
        instruments.dedup();

        let loaded = try_join_all(instruments.iter().map(|instrument| async move {
            let bars = Arc::new(BarSeries::new(self.repo.query_bars(instrument).await?));
            let quote = match self.quotes.latest_price(instrument).await {
                Ok(quote) => quote,
                Err(e) => {
                    // Quote failures are a data gap, not a batch failure: the
                    // pair still valuates, with status Unknown.
                    warn!(instrument = %instrument, "quote unavailable: {}", e);
                    None
                }
            };
            Ok::<_, sqlx::Error>((instrument.clone(), bars, quote))
        }))
        .await?;

        let mut bar_cache: HashMap<InstrumentId, Arc<BarSeries>> = HashMap::new();
        let mut quote_cache: HashMap<InstrumentId, Option<Decimal>> = HashMap::new();
        for (instrument, bars, quote) in loaded {
            bar_cache.insert(instrument.clone(), bars);
            quote_cache.insert(instrument, quote);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.worker_count));
        let mut join_set: JoinSet<(InstrumentId, HolderId, Result<(), String>)> = JoinSet::new();

        for ((instrument, holder), mut group) in groups {
            if self.cancel.is_cancelled() {
                summary.pairs_skipped += 1;
                continue;
            }

            // Acquiring before spawning bounds both concurrency and dispatch.
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            group.sort_by_key(|s| s.period_end);

            let repo = self.repo.clone();
            let params = self.config.engine.clone();
            let bars = bar_cache
                .get(&instrument)
                .cloned()
                .unwrap_or_else(|| Arc::new(BarSeries::new(Vec::new())));
            let quote = quote_cache.get(&instrument).copied().flatten();

            join_set.spawn(async move {
                let _permit = permit;
                let result =
                    run_pair(&repo, &params, &instrument, &holder, &group, &bars, quote, as_of)
                        .await;
                (instrument, holder, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((instrument, holder, Ok(()))) => {
                    summary.pairs_written += 1;
                    tracing::debug!(instrument = %instrument, holder = %holder, "pair reconciled");
                }
                Ok((instrument, holder, Err(reason))) => {
                    warn!(instrument = %instrument, holder = %holder, "pair failed: {}", reason);
                    summary.failures.push(PairFailure {
                        instrument_id: instrument,
                        holder_id: holder,
                        reason,
                    });
                }
                Err(e) => {
                    warn!("reconciliation worker did not complete: {}", e);
                }
            }
        }

        info!(
            "Reconciliation finished: {}/{} pairs written, {} failed, {} skipped",
            summary.pairs_written,
            summary.pairs_total,
            summary.failures.len(),
            summary.pairs_skipped
        );
        Ok(summary)
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_pair(
    repo: &Repository,
    params: &crate::config::EngineParams,
    instrument: &InstrumentId,
    holder: &HolderId,
    group: &[HoldingSnapshot],
    bars: &BarSeries,
    quote: Option<Decimal>,
    as_of: DateTime<Utc>,
) -> Result<(), String> {
    let output = reconstruct_group(params, instrument, holder, group, bars, quote, as_of)
        .map_err(|e| e.to_string())?;

    repo.upsert_cost_basis(&output.cost_basis)
        .await
        .map_err(|e| format!("cost basis write failed: {}", e))?;
    repo.replace_valuation_records(instrument, holder, &output.valuations)
        .await
        .map_err(|e| format!("valuation write failed: {}", e))?;

    Ok(())
}
