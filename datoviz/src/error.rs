// Error types for the renderer.
//
// Internal, programmer-facing failures get a `thiserror` variant so callers
// can match on the specific kind (see the six error kinds below); call
// sites that only need to glue fallible steps together use `anyhow` instead,
// same as the rest of this crate.

use thiserror::Error;
use utils::log;

/// One variant per error kind.
#[derive(Error, Debug)]
pub enum DvzError {
    /// Protocol misuse: use-after-delete, record-outside-canvas, a request
    /// referencing an object the registry never created, etc.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Out-of-memory, unsupported format, or any other failure to create a
    /// GPU resource.
    #[error("resource creation failed: {0}")]
    ResourceCreation(String),

    /// Window minimized or not yet sized; the caller should retry.
    #[error("surface not ready")]
    WaitSurface,

    /// A fence or semaphore wait exceeded its deadline.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The device lacks a required extension or feature.
    #[error("unsupported capability: {0}")]
    UnsupportedCapability(String),

    /// A dump file was truncated, had a bad magic, or a mismatched version.
    #[error("serialization failure: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, DvzError>;

/// Process-global error callback slot, installed on a `Host` (see
/// `config::Host`). Fatal errors outside a batch invoke this and then
/// propagate a status to the caller; by default it just logs.
pub type ErrorCallback = std::sync::Arc<dyn Fn(&DvzError) + Send + Sync>;

pub fn default_error_callback() -> ErrorCallback {
    std::sync::Arc::new(|e: &DvzError| {
        log::error!("{}", e);
    })
}
