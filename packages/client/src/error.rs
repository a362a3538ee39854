//! Connection-level and per-request error types.
//!
//! The split matters: [`ClientError`] ends the connection (or refuses to
//! start one), while [`InvokeError`] is scoped to a single request and is
//! answered with a failed result frame without disturbing the connection or
//! any other in-flight request.

use crate::executor::ExecutionError;
use crate::resolver::ResolveError;
use crate::transport::TransportError;

/// Failures of the engine itself.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// `run()` was called on an engine that is not idle. Engines are
    /// single-shot; build a new one to reconnect.
    #[error("client already started")]
    AlreadyStarted,

    /// The transport failed outside of a per-request context.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failures scoped to one invoke request.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}
