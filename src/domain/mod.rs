//! Domain types for the cost-basis reconstruction engine.
//!
//! This module provides:
//! - Lossless numeric handling via a Decimal wrapper
//! - Identity primitives: InstrumentId, HolderId
//! - HoldingSnapshot and DailyBar input records

pub mod bar;
pub mod decimal;
pub mod primitives;
pub mod snapshot;

pub use bar::DailyBar;
pub use decimal::Decimal;
pub use primitives::{HolderId, InstrumentId};
pub use snapshot::HoldingSnapshot;
