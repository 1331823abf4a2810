//! Failure taxonomy for invocations.

use thiserror::Error;

/// Errors surfaced by the dispatcher's `execute_*` entry points.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// The script source failed to compile or its top level threw.
    #[error("script failed to load: {0}")]
    ScriptCompile(String),

    /// No handler is registered for a kind that requires one.
    #[error("no {0} handler registered")]
    NoHandler(&'static str),

    /// The script threw during dispatch.
    ///
    /// `pass_through` records whether the script asked the host to proxy the
    /// original request on exception; it never suppresses the error.
    #[error("handler exception: {message}")]
    HandlerException {
        /// Stringified script exception.
        message: String,
        /// Whether `passThroughOnException` was requested before the failure.
        pass_through: bool,
    },

    /// The invocation deadline elapsed.
    #[error("invocation exceeded its deadline: {0}")]
    Timeout(String),

    /// The caller cancelled the invocation.
    #[error("invocation canceled")]
    Canceled,

    /// The script violated a dispatch contract (for example a second
    /// `respondWith`); surfaced when the violation escapes the script.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The engine itself failed outside script control.
    #[error("engine failure: {0}")]
    Engine(String),
}

impl ExecuteError {
    /// The `passThroughOnException` flag carried by a handler failure.
    pub fn pass_through(&self) -> bool {
        matches!(
            self,
            Self::HandlerException {
                pass_through: true,
                ..
            }
        )
    }
}
