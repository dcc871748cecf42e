//! Position lifecycle tracking: reduces one pair's ordered snapshots to a
//! running average cost.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use thiserror::Error;
use tracing::warn;

use crate::config::EngineParams;
use crate::domain::{Decimal, HolderId, HoldingSnapshot, InstrumentId};

use super::vwap::BarSeries;
use super::CostBasisRecord;

/// Contract violations that reject a whole (instrument, holder) group.
///
/// These are caller errors, not data gaps: the tracker requires pre-sorted,
/// non-negative input and does not attempt partial recovery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconstructError {
    #[error("snapshots out of order: {next} does not follow {prev}")]
    OutOfOrder { prev: NaiveDate, next: NaiveDate },
    #[error("negative held quantity {quantity} at {period_end}")]
    NegativeQuantity { period_end: NaiveDate, quantity: i64 },
}

/// State machine reconstructing a holder's average acquisition cost from
/// periodic holding snapshots.
///
/// Each accumulation is priced at the window VWAP ending at the snapshot
/// date; each reduction removes invested capital proportionally at the
/// current average cost (average-cost-out, not FIFO/LIFO). A disclosure gap
/// longer than `EngineParams::gap_days` is read as a full exit and later
/// re-entry, discarding the stale basis.
pub struct CostBasisTracker<'a> {
    params: &'a EngineParams,
    bars: &'a BarSeries,
    running_shares: i64,
    running_cost: Decimal,
    first_acquisition: Option<NaiveDate>,
    last_period_end: Option<NaiveDate>,
    priced_windows: u32,
    unpriced_windows: u32,
}

impl<'a> CostBasisTracker<'a> {
    pub fn new(params: &'a EngineParams, bars: &'a BarSeries) -> Self {
        Self {
            params,
            bars,
            running_shares: 0,
            running_cost: Decimal::zero(),
            first_acquisition: None,
            last_period_end: None,
            priced_windows: 0,
            unpriced_windows: 0,
        }
    }

    /// Apply one snapshot. Snapshots must arrive in strictly increasing
    /// period_end order; sorting is the orchestrator's job.
    pub fn apply(&mut self, snapshot: &HoldingSnapshot) -> Result<(), ReconstructError> {
        if snapshot.held_quantity < 0 {
            return Err(ReconstructError::NegativeQuantity {
                period_end: snapshot.period_end,
                quantity: snapshot.held_quantity,
            });
        }

        if let Some(last) = self.last_period_end {
            if snapshot.period_end <= last {
                return Err(ReconstructError::OutOfOrder {
                    prev: last,
                    next: snapshot.period_end,
                });
            }
            // A gap past ~two reporting cycles means the old basis is stale:
            // treat it as a full exit and later re-entry.
            if (snapshot.period_end - last).num_days() > self.params.gap_days {
                self.running_shares = 0;
                self.running_cost = Decimal::zero();
                self.first_acquisition = None;
            }
        }

        let delta = snapshot.held_quantity - self.running_shares;

        if delta > 0 {
            if self.first_acquisition.is_none() {
                self.first_acquisition = Some(snapshot.period_end);
            }

            let window_start = snapshot.period_end - Duration::days(self.params.window_days);
            let estimate =
                self.bars
                    .window_vwap(window_start, snapshot.period_end, self.params.lot_size);
            if estimate.is_known() {
                self.priced_windows += 1;
            } else {
                self.unpriced_windows += 1;
                warn!(
                    instrument = %snapshot.instrument_id,
                    holder = %snapshot.holder_id,
                    period_end = %snapshot.period_end,
                    "no bars in accumulation window; pricing delta at 0"
                );
            }

            self.running_cost += Decimal::from_i64(delta) * estimate.value_or_zero();
            self.running_shares += delta;
        } else if delta < 0 && self.running_shares > 0 {
            // delta * avg is negative: invested capital shrinks in proportion
            // and the per-share average is left unchanged.
            let avg = self.running_cost / Decimal::from_i64(self.running_shares);
            self.running_cost += Decimal::from_i64(delta) * avg;
            self.running_shares += delta;
        }
        // delta < 0 with no shares on book is a no-op: malformed upstream
        // data must not drive the count negative. delta == 0 changes nothing.

        self.last_period_end = Some(snapshot.period_end);
        Ok(())
    }

    /// Average cost per currently-held share; 0 when nothing is held or no
    /// window could be priced.
    pub fn average_cost(&self) -> Decimal {
        if self.running_shares > 0 {
            self.running_cost / Decimal::from_i64(self.running_shares)
        } else {
            Decimal::zero()
        }
    }

    pub fn running_shares(&self) -> i64 {
        self.running_shares
    }

    pub fn first_acquisition(&self) -> Option<NaiveDate> {
        self.first_acquisition
    }

    pub fn unpriced_windows(&self) -> u32 {
        self.unpriced_windows
    }

    /// Materialize the final cost-basis record.
    pub fn into_record(
        self,
        instrument_id: InstrumentId,
        holder_id: HolderId,
        computed_at: DateTime<Utc>,
    ) -> CostBasisRecord {
        let average_cost = self.average_cost().round_dp(4);
        CostBasisRecord {
            instrument_id,
            holder_id,
            average_cost,
            total_invested: self.running_cost.round_dp(2),
            total_shares: self.running_shares,
            first_acquisition: self.first_acquisition,
            priced_windows: self.priced_windows,
            unpriced_windows: self.unpriced_windows,
            computed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DailyBar;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn instrument() -> InstrumentId {
        InstrumentId::new("000001")
    }

    fn holder() -> HolderId {
        HolderId::new("Fund A")
    }

    fn snap(period_end: NaiveDate, qty: i64) -> HoldingSnapshot {
        HoldingSnapshot::new(instrument(), holder(), period_end, qty)
    }

    /// Bars covering [from, from+days) at a flat per-share price: 1000
    /// lots/day, turnover sized so the window VWAP equals `price` exactly.
    fn flat_bars(from: NaiveDate, days: i64, price: &str) -> Vec<DailyBar> {
        let px = dec(price);
        (0..days)
            .map(|i| {
                DailyBar::new(
                    instrument(),
                    from + Duration::days(i),
                    px,
                    px,
                    px,
                    px,
                    dec("1000"),
                    px * dec("100000"),
                )
            })
            .collect()
    }

    fn as_of() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-30T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_conservation_total_shares_track_latest_snapshot() {
        let params = EngineParams::default();
        let bars = BarSeries::new(flat_bars(date(2023, 10, 1), 400, "10"));
        let mut tracker = CostBasisTracker::new(&params, &bars);

        let quantities = [1000, 1500, 800, 800, 2000];
        let mut period = date(2023, 12, 31);
        for qty in quantities {
            tracker.apply(&snap(period, qty)).unwrap();
            assert_eq!(tracker.running_shares(), qty);
            period += Duration::days(90);
        }
    }

    #[test]
    fn test_worked_scenario_q1_q2_q3() {
        // Q1: 0 -> 1000 at window VWAP 10, Q2: 1000 -> 1500 at VWAP 12,
        // Q3: 1500 -> 800 (no pricing needed).
        // invested = 1000*10 + 500*12 = 16000; avg = 16000/1500 = 10.6667;
        // after -700 at avg: shares 800, invested ~8533.33, avg unchanged.
        let params = EngineParams::default();
        let mut bars = flat_bars(date(2024, 1, 1), 91, "10");
        bars.extend(flat_bars(date(2024, 4, 1), 91, "12"));
        let series = BarSeries::new(bars);
        let mut tracker = CostBasisTracker::new(&params, &series);

        tracker.apply(&snap(date(2024, 3, 31), 1000)).unwrap();
        tracker.apply(&snap(date(2024, 6, 30), 1500)).unwrap();

        let avg_before = tracker.average_cost();
        assert_eq!(avg_before.round_dp(4).to_canonical_string(), "10.6667");

        tracker.apply(&snap(date(2024, 9, 30), 800)).unwrap();
        let avg_after = tracker.average_cost();
        assert_eq!(avg_before.round_dp(10), avg_after.round_dp(10));

        let record = tracker.into_record(instrument(), holder(), as_of());
        assert_eq!(record.total_shares, 800);
        assert_eq!(record.average_cost.to_canonical_string(), "10.6667");
        assert_eq!(record.total_invested.to_canonical_string(), "8533.33");
    }

    #[test]
    fn test_reduction_never_moves_average_cost() {
        let params = EngineParams::default();
        let series = BarSeries::new(flat_bars(date(2024, 1, 1), 91, "10"));
        let mut tracker = CostBasisTracker::new(&params, &series);

        tracker.apply(&snap(date(2024, 3, 31), 1000)).unwrap();
        let avg = tracker.average_cost();

        tracker.apply(&snap(date(2024, 6, 30), 600)).unwrap();
        assert_eq!(tracker.average_cost(), avg);

        tracker.apply(&snap(date(2024, 9, 30), 100)).unwrap();
        assert_eq!(tracker.average_cost(), avg);
    }

    #[test]
    fn test_gap_reset_discards_stale_basis() {
        // Snapshots at day 0 (qty 100) and day 400 (qty 50): the 400-day gap
        // exceeds the 180-day threshold, so the basis restarts at day 400.
        let params = EngineParams::default();
        let d0 = date(2023, 1, 31);
        let d400 = d0 + Duration::days(400);
        let mut bars = flat_bars(d0 - Duration::days(90), 91, "10");
        bars.extend(flat_bars(d400 - Duration::days(90), 91, "20"));
        let series = BarSeries::new(bars);
        let mut tracker = CostBasisTracker::new(&params, &series);

        tracker.apply(&snap(d0, 100)).unwrap();
        assert_eq!(tracker.first_acquisition(), Some(d0));

        tracker.apply(&snap(d400, 50)).unwrap();
        assert_eq!(tracker.first_acquisition(), Some(d400));
        assert_eq!(tracker.running_shares(), 50);
        // Cost comes solely from the day-400 accumulation at VWAP 20.
        assert_eq!(tracker.average_cost().to_canonical_string(), "20");
    }

    #[test]
    fn test_gap_exactly_at_threshold_does_not_reset() {
        let params = EngineParams::default();
        let d0 = date(2023, 3, 31);
        let d180 = d0 + Duration::days(180);
        let series = BarSeries::new(flat_bars(d0 - Duration::days(90), 400, "10"));
        let mut tracker = CostBasisTracker::new(&params, &series);

        tracker.apply(&snap(d0, 100)).unwrap();
        tracker.apply(&snap(d180, 100)).unwrap();
        assert_eq!(tracker.first_acquisition(), Some(d0));
        assert_eq!(tracker.running_shares(), 100);
    }

    #[test]
    fn test_unknown_window_prices_delta_at_zero_and_flags_it() {
        let params = EngineParams::default();
        let series = BarSeries::new(vec![]);
        let mut tracker = CostBasisTracker::new(&params, &series);

        tracker.apply(&snap(date(2024, 3, 31), 1000)).unwrap();
        assert_eq!(tracker.running_shares(), 1000);
        assert!(tracker.average_cost().is_zero());
        assert_eq!(tracker.unpriced_windows(), 1);

        let record = tracker.into_record(instrument(), holder(), as_of());
        assert!(record.average_cost.is_zero());
        assert_eq!(record.unpriced_windows, 1);
        assert_eq!(record.priced_windows, 0);
    }

    #[test]
    fn test_reduction_when_flat_is_noop() {
        // A reduction against an empty book (e.g. the first observed snapshot
        // after a reset already shows fewer shares than a never-seen prior
        // holding) must not drive the count negative.
        let params = EngineParams::default();
        let series = BarSeries::new(flat_bars(date(2024, 1, 1), 91, "10"));
        let mut tracker = CostBasisTracker::new(&params, &series);

        tracker.apply(&snap(date(2024, 3, 31), 0)).unwrap();
        assert_eq!(tracker.running_shares(), 0);
        assert!(tracker.average_cost().is_zero());
        assert!(tracker.first_acquisition().is_none());
    }

    #[test]
    fn test_unchanged_snapshot_only_advances_period() {
        let params = EngineParams::default();
        let series = BarSeries::new(flat_bars(date(2024, 1, 1), 200, "10"));
        let mut tracker = CostBasisTracker::new(&params, &series);

        tracker.apply(&snap(date(2024, 3, 31), 1000)).unwrap();
        let cost_before = tracker.average_cost();
        tracker.apply(&snap(date(2024, 6, 30), 1000)).unwrap();
        assert_eq!(tracker.average_cost(), cost_before);
        assert_eq!(tracker.running_shares(), 1000);
    }

    #[test]
    fn test_out_of_order_snapshot_rejected() {
        let params = EngineParams::default();
        let series = BarSeries::new(vec![]);
        let mut tracker = CostBasisTracker::new(&params, &series);

        tracker.apply(&snap(date(2024, 6, 30), 1000)).unwrap();
        let err = tracker.apply(&snap(date(2024, 3, 31), 1500)).unwrap_err();
        assert_eq!(
            err,
            ReconstructError::OutOfOrder {
                prev: date(2024, 6, 30),
                next: date(2024, 3, 31),
            }
        );

        // Same date is equally a violation: identity is unique per period.
        let err = tracker.apply(&snap(date(2024, 6, 30), 1500)).unwrap_err();
        assert!(matches!(err, ReconstructError::OutOfOrder { .. }));
    }

    #[test]
    fn test_negative_quantity_rejected() {
        let params = EngineParams::default();
        let series = BarSeries::new(vec![]);
        let mut tracker = CostBasisTracker::new(&params, &series);

        let err = tracker.apply(&snap(date(2024, 3, 31), -5)).unwrap_err();
        assert_eq!(
            err,
            ReconstructError::NegativeQuantity {
                period_end: date(2024, 3, 31),
                quantity: -5,
            }
        );
    }

    #[test]
    fn test_gap_days_is_tunable() {
        let params = EngineParams {
            gap_days: 400,
            ..EngineParams::default()
        };
        let d0 = date(2023, 1, 31);
        let d390 = d0 + Duration::days(390);
        let series = BarSeries::new(flat_bars(d0 - Duration::days(90), 500, "10"));
        let mut tracker = CostBasisTracker::new(&params, &series);

        tracker.apply(&snap(d0, 100)).unwrap();
        tracker.apply(&snap(d390, 150)).unwrap();
        // 390 < 400: no reset, the original acquisition date survives.
        assert_eq!(tracker.first_acquisition(), Some(d0));
        assert_eq!(tracker.running_shares(), 150);
    }
}
