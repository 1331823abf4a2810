//! Per-invocation execution context.

use boa_engine::JsValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::events::EventKind;

/// Disposition flags recorded for one queue message during dispatch.
#[derive(Clone, Copy, Debug, Default)]
pub struct MessageDisposition {
    /// Explicitly acked.
    pub acked: bool,
    /// Explicitly marked for retry.
    pub retry: bool,
}

/// Outcome recorded for an email invocation.
#[derive(Clone, Debug, Default)]
pub struct EmailDisposition {
    /// Address the script forwarded the message to.
    pub forward_to: Option<String>,
    /// Rejection reason when the script called `setReject`.
    pub rejected: Option<String>,
}

/// State owned by a single invocation: `waitUntil` continuations, the
/// pass-through flag, the deadline, and the cancellation flag.
///
/// Created when a dispatcher entry point starts, mutated only by the event
/// surface the handlers see, and destroyed when the entry point returns.
pub struct InvocationState {
    /// Which event kind is being dispatched.
    pub kind: EventKind,
    /// Hard wall-clock bound for the whole invocation.
    pub deadline: Instant,
    /// Caller-supplied cancellation flag, checked between turns.
    pub cancel: Arc<AtomicBool>,
    /// Whether the script requested origin pass-through on exception.
    pub pass_through: bool,
    /// Value captured by `respondWith` (always a promise; the prelude
    /// normalizes concrete responses through `Promise.resolve`).
    pub response: Option<JsValue>,
    /// Set once the captured response has settled; `passThroughOnException`
    /// is a protocol error afterwards.
    pub response_settled: bool,
    /// Pending `waitUntil` promises, drained after the primary harvest.
    pub continuations: Vec<JsValue>,
    /// Per-message dispositions for queue dispatch.
    pub messages: Vec<MessageDisposition>,
    /// `noRetry` flag for scheduled dispatch.
    pub no_retry: bool,
    /// Email outcome.
    pub email: EmailDisposition,
}

impl InvocationState {
    /// Start a fresh invocation context.
    pub fn new(kind: EventKind, deadline: Instant, cancel: Arc<AtomicBool>) -> Self {
        Self {
            kind,
            deadline,
            cancel,
            pass_through: false,
            response: None,
            response_settled: false,
            continuations: Vec::new(),
            messages: Vec::new(),
            no_retry: false,
            email: EmailDisposition::default(),
        }
    }

    /// Whether the caller has requested cancellation.
    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Whether the deadline has elapsed.
    pub fn past_deadline(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Record a `waitUntil` continuation without awaiting it inline.
    pub fn push_continuation(&mut self, promise: JsValue) {
        self.continuations.push(promise);
    }
}
