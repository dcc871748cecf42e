//! Profitability classification against an estimated cost basis.

use crate::domain::Decimal;

use super::vwap::PriceEstimate;
use super::{CostMethod, PositionStatus};

/// Pick the cost figure a valuation should use.
///
/// A reconstructed full-history average wins whenever it is non-zero
/// (historical backtrace). Otherwise fall back to the current window's VWAP
/// scaled by the accumulation discount, which captures the tendency of large
/// buyers to accumulate below the period's volume-weighted price. Returns
/// None when neither source yields a usable cost.
pub fn resolve_cost(
    reconstructed: Decimal,
    window_price: PriceEstimate,
    cost_discount: Decimal,
) -> Option<(Decimal, CostMethod)> {
    if reconstructed.is_positive() {
        return Some((reconstructed, CostMethod::HistoricalBacktrace));
    }
    match window_price.known() {
        Some(vwap) if vwap.is_positive() => {
            Some((vwap * cost_discount, CostMethod::WindowEstimate))
        }
        _ => None,
    }
}

/// Classify a position's profitability.
///
/// The rate is only defined when both cost and price are strictly positive;
/// anything else is Unknown. Threshold boundaries are a business rule and are
/// exact: -10% inclusive is still Trapped, +20% inclusive is still Profit.
pub fn classify(average_cost: Decimal, current_price: Decimal) -> (Option<Decimal>, PositionStatus) {
    if !average_cost.is_positive() || !current_price.is_positive() {
        return (None, PositionStatus::Unknown);
    }

    let rate = (current_price - average_cost) / average_cost;

    let status = if rate < Decimal::from_scaled(-10, 2) {
        PositionStatus::DeepLock
    } else if rate <= Decimal::zero() {
        PositionStatus::Trapped
    } else if rate <= Decimal::from_scaled(20, 2) {
        PositionStatus::Profit
    } else {
        PositionStatus::HighProfit
    };

    (Some(rate), status)
}
