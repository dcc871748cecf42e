pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::{Config, EngineParams};
pub use datasource::{
    BarSource, EastMoneyFeed, MockFeed, QuoteSource, SnapshotSource, SourceError, StoreQuoteSource,
};
pub use db::{init_db, Repository};
pub use domain::{DailyBar, Decimal, HolderId, HoldingSnapshot, InstrumentId};
pub use engine::{
    classify, describe_change, reconstruct_group, BarSeries, ChangeKind, CostBasisRecord,
    CostBasisTracker, CostMethod, GroupOutput, HoldingChange, PositionStatus, PriceEstimate,
    ReconstructError, ValuationRecord,
};
pub use error::AppError;
pub use orchestration::{IngestReport, Ingestor, PairFailure, ReconcileSummary, Reconciler};
