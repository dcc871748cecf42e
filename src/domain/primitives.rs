//! Identity primitives: InstrumentId, HolderId.

use serde::{Deserialize, Serialize};

/// Exchange ticker of a tradable instrument (e.g. "600519", "000957").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstrumentId(pub String);

impl InstrumentId {
    /// Create an InstrumentId from a string.
    pub fn new(code: impl Into<String>) -> Self {
        InstrumentId(code.into())
    }

    /// Get the instrument code as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable, pre-normalized identity of a disclosed institutional holder.
///
/// Fuzzy matching of raw disclosed names to a HolderId happens upstream;
/// the engine only ever compares these for exact equality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HolderId(pub String);

impl HolderId {
    /// Create a HolderId from a string.
    pub fn new(name: impl Into<String>) -> Self {
        HolderId(name.into())
    }

    /// Get the holder identity as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HolderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
