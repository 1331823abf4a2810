//! Shared host-side state referenced by native callbacks.

use crate::config::{BindingTarget, RuntimeConfig};
use crate::events::HandlerRegistry;
use crate::invocation::InvocationState;
use crate::net::HttpClient;
use crate::timers::TimerQueue;
use boa_gc::{Finalize, Trace};
use outpost_platform::Platform;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

/// Log severity levels understood by the host logger.
#[derive(Copy, Clone, Debug)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Cross-runtime logger used by the script's `console.*`.
pub trait HostLogger: Send + Sync {
    /// Log a message with a given level.
    fn log(&self, level: LogLevel, message: &str);
}

/// A `HostLogger` that routes script output onto the `log` crate.
pub struct ScriptLogForwarder;

impl HostLogger for ScriptLogForwarder {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => log::debug!("[script]: {message}"),
            LogLevel::Info => log::info!("[script]: {message}"),
            LogLevel::Warn => log::warn!("[script]: {message}"),
            LogLevel::Error => log::error!("[script]: {message}"),
        }
    }
}

/// One configured binding, addressed from the prelude by its index.
pub(crate) struct BindingInstance {
    /// The global name the binding is installed under.
    pub name: String,
    /// What it is bound to.
    pub target: BindingTarget,
}

/// Host-side state shared between the runtime and every native callback.
///
/// Per-runtime, never process-global: two runtimes on one thread share
/// nothing but the platform facade.
pub(crate) struct HostState {
    /// The storage facade all bindings operate on.
    pub platform: Arc<dyn Platform>,
    /// Handler lists fed by `addEventListener`.
    pub registry: HandlerRegistry,
    /// Pending cooperative timers.
    pub timers: TimerQueue,
    /// State of the invocation currently being dispatched, if any.
    pub invocation: Option<InvocationState>,
    /// Sink for `console.*` output.
    pub logger: Arc<dyn HostLogger>,
    /// Outbound HTTP client when the configuration allows network access.
    pub http: Option<HttpClient>,
    /// Origin of `performance.now()`.
    pub started: Instant,
    /// Runtime tunables.
    pub config: RuntimeConfig,
    /// Configured bindings in declaration order.
    pub bindings: Vec<BindingInstance>,
}

/// Capture wrapper handed to native functions.
///
/// The interior is plain Rust state; GC handles stored inside (handler lists,
/// timer callbacks) stay rooted because they live outside the GC heap.
#[derive(Trace, Finalize)]
pub(crate) struct HostCaptures {
    #[unsafe_ignore_trace]
    pub state: Rc<RefCell<HostState>>,
}

impl Clone for HostCaptures {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}
