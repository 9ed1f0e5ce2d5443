//! Error types for the runtime.
//!
//! Reconciliation and dependency tracking never fail: malformed component
//! definitions and invalid writes are logged and degrade gracefully. The
//! variants here cover the few operations that can genuinely fail.

use thiserror::Error;

use crate::host::HostNode;

/// Errors produced by the runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// The update queue kept refilling itself for more cycles than allowed.
    #[error("update queue did not settle after {0} flush cycles")]
    FlushLimitExceeded(usize),

    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// A container was asked to unmount but has nothing mounted in it.
    #[error("nothing is mounted in container {0:?}")]
    NotMounted(HostNode),
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
