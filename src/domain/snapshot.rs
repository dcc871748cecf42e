//! Disclosed holding snapshots.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{HolderId, InstrumentId};

/// One disclosed point-in-time holding observation.
///
/// Unique per (instrument, holder, period_end); immutable once ingested.
/// `held_quantity` is a share count and must be non-negative — the tracker
/// rejects negative values as a contract violation rather than clamping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingSnapshot {
    pub instrument_id: InstrumentId,
    pub holder_id: HolderId,
    pub period_end: NaiveDate,
    pub held_quantity: i64,
}

impl HoldingSnapshot {
    pub fn new(
        instrument_id: InstrumentId,
        holder_id: HolderId,
        period_end: NaiveDate,
        held_quantity: i64,
    ) -> Self {
        Self {
            instrument_id,
            holder_id,
            period_end,
            held_quantity,
        }
    }
}
