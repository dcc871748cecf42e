//! Batch orchestration: ingestion and the reconciliation fan-out.

pub mod ingest;
pub mod reconcile;

pub use ingest::{IngestReport, Ingestor};
pub use reconcile::{PairFailure, ReconcileSummary, Reconciler};
