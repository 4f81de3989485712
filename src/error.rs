//! Error types for `meshgraph-core`.
//!
//! Internal routines return `bool`/`Option` sentinels per the engine's error
//! model (duplicates are no-ops, absence is not an error); `MeshError` is
//! reserved for transaction-boundary and configuration failures.

use thiserror::Error;

/// Result type alias for `meshgraph-core` operations.
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors that can occur at the transaction/configuration boundary.
///
/// Each variant carries a stable `MESH-XXX` code for log correlation.
#[derive(Error, Debug)]
pub enum MeshError {
    /// A write transaction mixed a vertex removal with other operations
    /// (MESH-001). Removal must be the only operation in its transaction.
    #[error("[MESH-001] vertex removal cannot be combined with other operations in one transaction")]
    MixedRemoveTransaction,

    /// A write transaction was committed twice, or used after `abort()`
    /// (MESH-002).
    #[error("[MESH-002] transaction already finished")]
    TransactionFinished,

    /// Configuration failed validation (MESH-003).
    #[error("[MESH-003] invalid configuration: {0}")]
    Config(String),

    /// A vertex id does not fit in the configured address width (MESH-004).
    #[error("[MESH-004] vertex id {0} exceeds the configured address width")]
    VertexIdOutOfRange(u64),

    /// Internal invariant violation (MESH-005).
    ///
    /// Indicates a bug in the engine; the reimplementation keeps these as
    /// panics in debug builds per the structural-corruption error kind, but
    /// surfaces them as a typed error at API boundaries where a panic would
    /// be unacceptable (e.g. configuration-driven size checks).
    #[error("[MESH-005] internal invariant violation: {0}")]
    Internal(String),
}

impl MeshError {
    /// Returns the stable error code (e.g. `"MESH-001"`).
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MixedRemoveTransaction => "MESH-001",
            Self::TransactionFinished => "MESH-002",
            Self::Config(_) => "MESH-003",
            Self::VertexIdOutOfRange(_) => "MESH-004",
            Self::Internal(_) => "MESH-005",
        }
    }
}

impl From<crate::config::ConfigError> for MeshError {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
