//! Daily trade bars.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Decimal, InstrumentId};

/// One trading day's aggregate for an instrument.
///
/// `volume` is denominated in exchange lots (the upstream feed convention);
/// `turnover` is in currency units per whole share. The lot-to-share
/// conversion factor lives in `EngineParams::lot_size`, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyBar {
    pub instrument_id: InstrumentId,
    pub trade_date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub turnover: Decimal,
}

impl DailyBar {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instrument_id: InstrumentId,
        trade_date: NaiveDate,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
        turnover: Decimal,
    ) -> Self {
        Self {
            instrument_id,
            trade_date,
            open,
            high,
            low,
            close,
            volume,
            turnover,
        }
    }
}
