//! Pure computation engine for cost-basis reconstruction and valuation.
//!
//! Everything in this module is synchronous and free of I/O: the orchestrator
//! loads snapshots and bars up front and the engine reduces them to derived
//! records. Within one (instrument, holder) group processing is strictly
//! sequential by period_end; across groups the caller may parallelize freely.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineParams;
use crate::domain::{Decimal, HolderId, HoldingSnapshot, InstrumentId};

pub mod lifecycle;
pub mod narrative;
pub mod valuation;
pub mod vwap;

pub use lifecycle::{CostBasisTracker, ReconstructError};
pub use narrative::describe_change;
pub use valuation::{classify, resolve_cost};
pub use vwap::{BarSeries, PriceEstimate};

/// Reconstructed cost basis for one (instrument, holder) pair.
///
/// `average_cost` of 0 means "unknown"; `unpriced_windows` counts accumulation
/// windows that had no usable bar data, so a degraded estimate is detectable
/// instead of silently plausible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostBasisRecord {
    pub instrument_id: InstrumentId,
    pub holder_id: HolderId,
    pub average_cost: Decimal,
    pub total_invested: Decimal,
    pub total_shares: i64,
    pub first_acquisition: Option<NaiveDate>,
    pub priced_windows: u32,
    pub unpriced_windows: u32,
    pub computed_at: DateTime<Utc>,
}

/// Profitability classification of a position against its estimated cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    /// More than 10% under water.
    DeepLock,
    /// Between -10% and break-even, inclusive.
    Trapped,
    /// Up to +20%, inclusive.
    Profit,
    /// Above +20%.
    HighProfit,
    /// Cost or price unavailable; no rate can be computed.
    Unknown,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::DeepLock => "deep_lock",
            PositionStatus::Trapped => "trapped",
            PositionStatus::Profit => "profit",
            PositionStatus::HighProfit => "high_profit",
            PositionStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deep_lock" => Some(PositionStatus::DeepLock),
            "trapped" => Some(PositionStatus::Trapped),
            "profit" => Some(PositionStatus::Profit),
            "high_profit" => Some(PositionStatus::HighProfit),
            "unknown" => Some(PositionStatus::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a valuation's cost figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostMethod {
    /// Full-history reconstruction through the lifecycle tracker.
    HistoricalBacktrace,
    /// Single-window VWAP times the accumulation discount; used when no
    /// reconstructed basis exists.
    WindowEstimate,
}

impl CostMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostMethod::HistoricalBacktrace => "historical_backtrace",
            CostMethod::WindowEstimate => "window_estimate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "historical_backtrace" => Some(CostMethod::HistoricalBacktrace),
            "window_estimate" => Some(CostMethod::WindowEstimate),
            _ => None,
        }
    }
}

/// Direction of a holding change between consecutive snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    NewPosition,
    Unchanged,
    Increase,
    Decrease,
}

/// Structured description of one holding change.
///
/// Carries the quantitative deltas so downstream consumers can re-render or
/// test against them independently of the narrative phrasing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingChange {
    pub kind: ChangeKind,
    /// Signed share delta against the previous snapshot (or the full quantity
    /// for a new position).
    pub quantity_delta: i64,
    /// Relative quantity change against the previous snapshot; None when the
    /// previous quantity was zero or there is no previous snapshot.
    pub pct_change: Option<Decimal>,
    /// Estimated per-share price over the change's accumulation window; None
    /// when the window had no usable bar data.
    pub window_price: Option<Decimal>,
    /// Window price relative to the running average cost.
    pub vs_average_cost_pct: Option<Decimal>,
    /// Window price relative to the current quote.
    pub vs_current_price_pct: Option<Decimal>,
    pub previous_period_end: Option<NaiveDate>,
}

/// One valuation row per (instrument, holder, period_end).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuationRecord {
    pub instrument_id: InstrumentId,
    pub holder_id: HolderId,
    pub period_end: NaiveDate,
    /// Cost per share used for classification; 0 means unknown.
    pub average_cost: Decimal,
    pub cost_method: Option<CostMethod>,
    pub current_price: Option<Decimal>,
    pub profit_rate: Option<Decimal>,
    pub status: PositionStatus,
    pub change: HoldingChange,
    pub narrative: String,
    pub is_latest: bool,
    pub computed_at: DateTime<Utc>,
}

/// Output of reconstructing one (instrument, holder) group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupOutput {
    pub cost_basis: CostBasisRecord,
    pub valuations: Vec<ValuationRecord>,
}

/// Reduce one pair's snapshots to a cost-basis record plus per-period
/// valuations.
///
/// `snapshots` must be sorted by strictly increasing period_end — sorting is
/// the orchestrator's job; out-of-order input rejects the whole group.
/// `current_price` is the latest quote, None when no quote is available.
/// `as_of` stamps the derived records and is supplied by the caller so that
/// identical inputs reproduce identical outputs.
pub fn reconstruct_group(
    params: &EngineParams,
    instrument_id: &InstrumentId,
    holder_id: &HolderId,
    snapshots: &[HoldingSnapshot],
    bars: &BarSeries,
    current_price: Option<Decimal>,
    as_of: DateTime<Utc>,
) -> Result<GroupOutput, ReconstructError> {
    let mut tracker = CostBasisTracker::new(params, bars);
    let mut valuations = Vec::with_capacity(snapshots.len());
    let mut previous: Option<&HoldingSnapshot> = None;

    for snapshot in snapshots {
        tracker.apply(snapshot)?;

        let reconstructed = tracker.average_cost();
        let window_start = snapshot.period_end - chrono::Duration::days(params.window_days);
        let window_price = bars.window_vwap(window_start, snapshot.period_end, params.lot_size);

        let resolved = resolve_cost(reconstructed, window_price, params.cost_discount);
        let (average_cost, cost_method) = match resolved {
            Some((cost, method)) => (cost.round_dp(4), Some(method)),
            None => (Decimal::zero(), None),
        };

        let (profit_rate, status) =
            classify(average_cost, current_price.unwrap_or_else(Decimal::zero));

        let change = describe_change(
            params,
            snapshot,
            previous,
            average_cost,
            current_price,
            tracker.first_acquisition(),
            bars,
        );
        let narrative = change.render();

        valuations.push(ValuationRecord {
            instrument_id: instrument_id.clone(),
            holder_id: holder_id.clone(),
            period_end: snapshot.period_end,
            average_cost,
            cost_method,
            current_price,
            profit_rate: profit_rate.map(|r| r.round_dp(4)),
            status,
            change,
            narrative,
            is_latest: false,
            computed_at: as_of,
        });

        previous = Some(snapshot);
    }

    if let Some(last) = valuations.last_mut() {
        last.is_latest = true;
    }

    let cost_basis = tracker.into_record(instrument_id.clone(), holder_id.clone(), as_of);

    Ok(GroupOutput {
        cost_basis,
        valuations,
    })
}
