//! Seam to the execution backend.
//!
//! The connection layer resolves module bytes and hands them to an
//! [`Executor`] together with the call signature and arguments from the
//! invoke frame. What "executing" means is entirely the backend's business;
//! the engine only distinguishes success (a JSON value for the result
//! frame) from failure (an [`ExecutionError`] serialized into a failed
//! result). No timeout is imposed here - if one is wanted it belongs in the
//! backend or a wrapper around it.

use bytes::Bytes;
use serde_json::Value as JsValue;

use crate::proto::CallSignature;

/// Errors from the execution backend.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("could not load wasm module: {0}")]
    InvalidModule(String),

    #[error("function not found in module: {0}")]
    FunctionNotFound(String),

    #[error("expected {expected} arguments, got {got}")]
    MismatchedArgs { expected: usize, got: usize },

    #[error("unsupported type in signature: {0}")]
    UnsupportedType(String),

    #[error("argument {index} is not a valid {expected}: {value}")]
    BadArgument {
        index: usize,
        expected: String,
        value: String,
    },

    #[error("wasm trap: {0}")]
    Trap(String),
}

/// Runs a decoded module against a call signature and arguments.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    async fn execute(
        &self,
        module: Bytes,
        function: &str,
        signature: &CallSignature,
        args: &[JsValue],
    ) -> Result<JsValue, ExecutionError>;
}
