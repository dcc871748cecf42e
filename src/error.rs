use thiserror::Error;

use crate::config::ConfigError;
use crate::datasource::SourceError;

/// Top-level error for the batch binary and orchestration layer.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("feed error: {0}")]
    Source(#[from] SourceError),
}
