//! Volume-weighted price estimation over daily bars.

use chrono::NaiveDate;

use crate::domain::{DailyBar, Decimal};

/// Result of a price estimation: either a usable per-share price or an
/// explicit "no data" marker.
///
/// Unknown degrades to price 0 wherever the engine must keep accumulating,
/// but the flag travels with the result so callers never mistake a degraded
/// figure for a real one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceEstimate {
    Known(Decimal),
    Unknown,
}

impl PriceEstimate {
    /// The estimated price, if one exists.
    pub fn known(&self) -> Option<Decimal> {
        match self {
            PriceEstimate::Known(price) => Some(*price),
            PriceEstimate::Unknown => None,
        }
    }

    /// The estimated price, degrading Unknown to 0.
    pub fn value_or_zero(&self) -> Decimal {
        self.known().unwrap_or_else(Decimal::zero)
    }

    pub fn is_known(&self) -> bool {
        matches!(self, PriceEstimate::Known(_))
    }
}

/// All daily bars for one instrument, sorted by trade date.
///
/// Construction sorts; lookups binary-search, so repeated window estimates
/// over the same series stay cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarSeries {
    bars: Vec<DailyBar>,
}

impl BarSeries {
    pub fn new(mut bars: Vec<DailyBar>) -> Self {
        bars.sort_by_key(|b| b.trade_date);
        Self { bars }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Estimate the per-share volume-weighted average price over the
    /// inclusive date range `[start, end]`.
    ///
    /// price = sum(turnover) / (sum(volume) * lot_size), where `lot_size`
    /// converts lot-denominated volume into a per-share denominator. Returns
    /// Unknown when no bars fall in range or summed volume is zero. Days
    /// missing inside the window are not interpolated.
    pub fn window_vwap(&self, start: NaiveDate, end: NaiveDate, lot_size: Decimal) -> PriceEstimate {
        let lo = self.bars.partition_point(|b| b.trade_date < start);
        let hi = self.bars.partition_point(|b| b.trade_date <= end);
        if lo >= hi {
            return PriceEstimate::Unknown;
        }

        let mut turnover = Decimal::zero();
        let mut volume = Decimal::zero();
        for bar in &self.bars[lo..hi] {
            turnover += bar.turnover;
            volume += bar.volume;
        }

        if !volume.is_positive() {
            return PriceEstimate::Unknown;
        }

        PriceEstimate::Known(turnover / (volume * lot_size))
    }

    /// Close of the most recent bar, if any.
    pub fn latest_close(&self) -> Option<Decimal> {
        self.bars.last().map(|b| b.close)
    }
}
