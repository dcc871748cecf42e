//! Structured change descriptions between consecutive snapshots.

use chrono::Duration;

use crate::config::EngineParams;
use crate::domain::{Decimal, HoldingSnapshot};

use super::vwap::BarSeries;
use super::{ChangeKind, HoldingChange};

/// Describe how `current` differs from the previous snapshot of the same
/// pair.
///
/// With no previous snapshot the position is New when the reconstructed
/// first-acquisition date is unset or recent (within `gap_days` of the
/// period); otherwise it is a long-held position whose earlier history fell
/// outside the observed window and reads as Unchanged. Increases and
/// decreases carry the period's estimated trade price compared against the
/// running average cost and the current quote.
pub fn describe_change(
    params: &EngineParams,
    current: &HoldingSnapshot,
    previous: Option<&HoldingSnapshot>,
    average_cost: Decimal,
    current_price: Option<Decimal>,
    first_acquisition: Option<chrono::NaiveDate>,
    bars: &BarSeries,
) -> HoldingChange {
    let window_start = current.period_end - Duration::days(params.window_days);
    let window_estimate = bars.window_vwap(window_start, current.period_end, params.lot_size);
    let window_price = window_estimate.known().filter(|p| p.is_positive());

    let priced_comparisons = |window_price: Option<Decimal>| {
        let vs_cost = window_price.and_then(|p| p.pct_change_from(average_cost));
        let vs_price = match (window_price, current_price) {
            (Some(p), Some(quote)) => p.pct_change_from(quote),
            _ => None,
        };
        (vs_cost, vs_price)
    };

    match previous {
        None => {
            let recently_opened = match first_acquisition {
                None => true,
                Some(first) => (current.period_end - first).num_days() <= params.gap_days,
            };

            if recently_opened && current.held_quantity > 0 {
                let (vs_cost, vs_price) = priced_comparisons(window_price);
                HoldingChange {
                    kind: ChangeKind::NewPosition,
                    quantity_delta: current.held_quantity,
                    pct_change: None,
                    window_price,
                    vs_average_cost_pct: vs_cost,
                    vs_current_price_pct: vs_price,
                    previous_period_end: None,
                }
            } else {
                HoldingChange {
                    kind: ChangeKind::Unchanged,
                    quantity_delta: 0,
                    pct_change: None,
                    window_price: None,
                    vs_average_cost_pct: None,
                    vs_current_price_pct: None,
                    previous_period_end: None,
                }
            }
        }
        Some(prev) => {
            let delta = current.held_quantity - prev.held_quantity;
            if delta == 0 {
                return HoldingChange {
                    kind: ChangeKind::Unchanged,
                    quantity_delta: 0,
                    pct_change: None,
                    window_price: None,
                    vs_average_cost_pct: None,
                    vs_current_price_pct: None,
                    previous_period_end: Some(prev.period_end),
                };
            }

            let kind = if delta > 0 {
                ChangeKind::Increase
            } else {
                ChangeKind::Decrease
            };
            let pct_change = if prev.held_quantity > 0 {
                Some(
                    Decimal::from_i64(delta)
                        / Decimal::from_i64(prev.held_quantity),
                )
            } else {
                None
            };
            let (vs_cost, vs_price) = priced_comparisons(window_price);

            HoldingChange {
                kind,
                quantity_delta: delta,
                pct_change,
                window_price,
                vs_average_cost_pct: vs_cost,
                vs_current_price_pct: vs_price,
                previous_period_end: Some(prev.period_end),
            }
        }
    }
}

impl HoldingChange {
    /// Render the change as display text.
    ///
    /// Rendering is derived from the enum and the quantitative fields; the
    /// text is never parsed back anywhere.
    pub fn render(&self) -> String {
        match self.kind {
            ChangeKind::NewPosition => {
                let mut s = format!("new position of {} shares", self.quantity_delta);
                if let Some(price) = self.window_price {
                    s.push_str(&format!(
                        ", accumulated around {}",
                        price.round_dp(2)
                    ));
                }
                s
            }
            ChangeKind::Unchanged => match self.previous_period_end {
                Some(prev) => format!("unchanged since {}", prev),
                None => "unchanged".to_string(),
            },
            ChangeKind::Increase | ChangeKind::Decrease => {
                let verb = if self.kind == ChangeKind::Increase {
                    "increased"
                } else {
                    "reduced"
                };
                let mut s = format!("{} by {} shares", verb, self.quantity_delta.abs());
                if let Some(pct) = self.pct_change {
                    s.push_str(&format!(" ({})", render_pct(pct)));
                }
                if let Some(price) = self.window_price {
                    s.push_str(&format!(", period price around {}", price.round_dp(2)));
                }
                if let Some(vs_cost) = self.vs_average_cost_pct {
                    s.push_str(&format!(", {} vs average cost", render_pct(vs_cost)));
                }
                if let Some(vs_price) = self.vs_current_price_pct {
                    s.push_str(&format!(", {} vs current price", render_pct(vs_price)));
                }
                s
            }
        }
    }
}

fn render_pct(ratio: Decimal) -> String {
    let pct = (ratio * Decimal::from_i64(100)).round_dp(2);
    if pct.is_negative() {
        format!("{}%", pct)
    } else {
        format!("+{}%", pct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DailyBar, HolderId, InstrumentId};
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn snap(period_end: NaiveDate, qty: i64) -> HoldingSnapshot {
        HoldingSnapshot::new(
            InstrumentId::new("000001"),
            HolderId::new("Fund A"),
            period_end,
            qty,
        )
    }

    fn flat_bars(from: NaiveDate, days: i64, price: &str) -> BarSeries {
        let px = dec(price);
        BarSeries::new(
            (0..days)
                .map(|i| {
                    DailyBar::new(
                        InstrumentId::new("000001"),
                        from + Duration::days(i),
                        px,
                        px,
                        px,
                        px,
                        dec("1000"),
                        px * dec("100000"),
                    )
                })
                .collect(),
        )
    }

    #[test]
    fn test_new_position_when_first_acquisition_recent() {
        let params = EngineParams::default();
        let bars = flat_bars(date(2024, 1, 1), 91, "10");
        let current = snap(date(2024, 3, 31), 1000);

        let change = describe_change(
            &params,
            &current,
            None,
            dec("10"),
            Some(dec("12")),
            Some(date(2024, 3, 31)),
            &bars,
        );

        assert_eq!(change.kind, ChangeKind::NewPosition);
        assert_eq!(change.quantity_delta, 1000);
        assert_eq!(change.window_price.unwrap().to_canonical_string(), "10");
        assert!(change.render().starts_with("new position of 1000 shares"));
    }

    #[test]
    fn test_no_previous_but_old_first_acquisition_reads_unchanged() {
        // A long-held position whose earlier snapshots fell outside the
        // observed window is not a new position.
        let params = EngineParams::default();
        let bars = flat_bars(date(2024, 1, 1), 91, "10");
        let current = snap(date(2024, 3, 31), 1000);

        let change = describe_change(
            &params,
            &current,
            None,
            dec("10"),
            None,
            Some(date(2022, 6, 30)),
            &bars,
        );

        assert_eq!(change.kind, ChangeKind::Unchanged);
        assert_eq!(change.quantity_delta, 0);
        assert_eq!(change.render(), "unchanged");
    }

    #[test]
    fn test_unchanged_annotates_previous_period() {
        let params = EngineParams::default();
        let bars = flat_bars(date(2024, 1, 1), 182, "10");
        let prev = snap(date(2024, 3, 31), 1000);
        let current = snap(date(2024, 6, 30), 1000);

        let change = describe_change(
            &params,
            &current,
            Some(&prev),
            dec("10"),
            Some(dec("11")),
            Some(date(2024, 3, 31)),
            &bars,
        );

        assert_eq!(change.kind, ChangeKind::Unchanged);
        assert_eq!(change.previous_period_end, Some(date(2024, 3, 31)));
        assert_eq!(change.render(), "unchanged since 2024-03-31");
    }

    #[test]
    fn test_increase_carries_quantitative_deltas() {
        let params = EngineParams::default();
        let bars = flat_bars(date(2024, 4, 1), 91, "12");
        let prev = snap(date(2024, 3, 31), 1000);
        let current = snap(date(2024, 6, 30), 1500);

        let change = describe_change(
            &params,
            &current,
            Some(&prev),
            dec("10"),
            Some(dec("15")),
            Some(date(2024, 3, 31)),
            &bars,
        );

        assert_eq!(change.kind, ChangeKind::Increase);
        assert_eq!(change.quantity_delta, 500);
        assert_eq!(change.pct_change.unwrap().to_canonical_string(), "0.5");
        assert_eq!(change.window_price.unwrap().to_canonical_string(), "12");
        // 12 vs cost 10: +20%; 12 vs price 15: -20%.
        assert_eq!(
            change.vs_average_cost_pct.unwrap().to_canonical_string(),
            "0.2"
        );
        assert_eq!(
            change.vs_current_price_pct.unwrap().to_canonical_string(),
            "-0.2"
        );

        let text = change.render();
        assert!(text.contains("increased by 500 shares"));
        assert!(text.contains("+50%"));
        assert!(text.contains("period price around 12"));
    }

    #[test]
    fn test_decrease_is_symmetric() {
        let params = EngineParams::default();
        let bars = flat_bars(date(2024, 7, 1), 92, "14");
        let prev = snap(date(2024, 6, 30), 1500);
        let current = snap(date(2024, 9, 30), 800);

        let change = describe_change(
            &params,
            &current,
            Some(&prev),
            dec("10.6667"),
            Some(dec("14")),
            Some(date(2024, 3, 31)),
            &bars,
        );

        assert_eq!(change.kind, ChangeKind::Decrease);
        assert_eq!(change.quantity_delta, -700);
        assert!(change.pct_change.unwrap().is_negative());
        assert!(change.render().contains("reduced by 700 shares"));
    }

    #[test]
    fn test_increase_from_zero_has_no_pct() {
        let params = EngineParams::default();
        let bars = flat_bars(date(2024, 4, 1), 91, "12");
        let prev = snap(date(2024, 3, 31), 0);
        let current = snap(date(2024, 6, 30), 1500);

        let change = describe_change(
            &params,
            &current,
            Some(&prev),
            dec("12"),
            None,
            Some(date(2024, 6, 30)),
            &bars,
        );

        assert_eq!(change.kind, ChangeKind::Increase);
        assert!(change.pct_change.is_none());
        assert!(change.vs_current_price_pct.is_none());
    }
}
