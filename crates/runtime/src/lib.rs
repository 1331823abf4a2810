//! Execution runtime for the Outpost edge-serverless emulator.
//!
//! This crate hosts user scripts in an embedded JavaScript engine, installs
//! a service-worker-style global environment (`addEventListener`, `Request`,
//! `Response`, `Headers`, `URL`, timers, `crypto`, `fetch`), wires the
//! configured platform bindings (KV, object store, SQL, durable objects,
//! queues, model runner) onto script globals, and exposes the dispatcher
//! surface the enclosing CLI or server drives:
//!
//! ```no_run
//! use outpost_runtime::{BindingSpec, FetchRequest, Runtime, RuntimeConfig};
//! use std::sync::Arc;
//!
//! let platform = Arc::new(outpost_platform::MemoryPlatform::new());
//! let bindings = BindingSpec::parse([("STORE", "kv:ns1")]).unwrap();
//! let mut runtime = Runtime::new(platform, bindings, RuntimeConfig::default()).unwrap();
//! runtime
//!     .load_script(
//!         "addEventListener('fetch', (event) => {\
//!            event.respondWith(new Response('hello'));\
//!          });",
//!         "worker.js",
//!     )
//!     .unwrap();
//! let outcome = runtime.execute_fetch(FetchRequest::get("https://example.test/")).unwrap();
//! assert_eq!(outcome.status, 200);
//! ```

mod bindings;
mod engine;
mod shim;
mod state;
mod timers;

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod hostval;
pub mod invocation;
pub mod net;
mod runtime;

pub use config::{BindingSpec, BindingTarget, RuntimeConfig};
pub use dispatch::{
    EmailMessage, EmailOutcome, FetchOutcome, FetchRequest, InvokeControl, QueueMessageOutcome,
    ScheduledEvent, ScheduledOutcome, TailEvent,
};
pub use error::ExecuteError;
pub use runtime::Runtime;
pub use state::{HostLogger, LogLevel, ScriptLogForwarder};

// Re-exported so embedders and tests can construct facade values without a
// separate dependency edge.
pub use outpost_platform as platform;
