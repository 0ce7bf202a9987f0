//! Error types for the onscreen presentation layer.

/// Errors reported synchronously by onscreen and winsys operations.
///
/// Asynchronous completion has no error channel: a platform that never reports
/// completion is indistinguishable from one with nothing to report yet.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The window system could not produce a native surface.
    #[error("failed to allocate onscreen surface: {0}")]
    Allocation(String),

    /// The active window system does not implement the requested operation.
    ///
    /// Callers can avoid this by checking [`crate::Context::has_feature`] first.
    #[error("operation not supported by the window system: {0}")]
    Unsupported(&'static str),

    /// The caller broke an API contract (e.g. a missing mandatory callback).
    #[error("contract violation: {0}")]
    ContractViolation(&'static str),

    /// The GPU backend failed while servicing a winsys request.
    #[error("gpu backend error: {0}")]
    Gpu(String),
}

/// Convenience alias used across the engine.
pub type Result<T> = std::result::Result<T, Error>;
