//! Store-backed quote source.

use async_trait::async_trait;
use std::sync::Arc;

use crate::db::Repository;
use crate::domain::{Decimal, InstrumentId};

use super::{QuoteSource, SourceError};

/// Quote source answering from the most recent stored bar close.
///
/// The reconciliation batch runs right after ingestion, so the latest stored
/// close is the freshest price the system has; no extra network round-trip
/// is needed per pair.
#[derive(Debug, Clone)]
pub struct StoreQuoteSource {
    repo: Arc<Repository>,
}

impl StoreQuoteSource {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl QuoteSource for StoreQuoteSource {
    async fn latest_price(
        &self,
        instrument: &InstrumentId,
    ) -> Result<Option<Decimal>, SourceError> {
        self.repo
            .latest_close(instrument)
            .await
            .map_err(|e| SourceError::Other(e.to_string()))
    }
}
