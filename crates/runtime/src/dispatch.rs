//! Dispatcher: the `execute_*` entry points consumed by the enclosing host.
//!
//! Each entry point follows the same shape: install a fresh invocation
//! context, build the event object through the prelude, invoke the
//! registered handlers in order, then drive the cooperative loop (microtask
//! jobs, then due timers, repeated) until the harvest is complete or the
//! deadline fires.

use crate::error::ExecuteError;
use crate::events::EventKind;
use crate::invocation::{InvocationState, MessageDisposition};
use crate::Runtime;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use boa_engine::builtins::promise::PromiseState;
use boa_engine::object::builtins::JsPromise;
use boa_engine::{JsObject, JsValue};
use bytes::Bytes;
use outpost_platform::QueueMessageRecord;
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Caller-side control over one invocation.
#[derive(Clone, Default)]
pub struct InvokeControl {
    /// Cooperative cancellation flag; checked between handler turns.
    pub cancel: Option<Arc<AtomicBool>>,
    /// Deadline override for this invocation.
    pub deadline: Option<Duration>,
}

/// An inbound request handed to [`Runtime::execute_fetch`].
#[derive(Clone, Debug)]
pub struct FetchRequest {
    /// HTTP method.
    pub method: String,
    /// Absolute URL.
    pub url: String,
    /// Header pairs.
    pub headers: Vec<(String, String)>,
    /// Optional body bytes.
    pub body: Option<Bytes>,
}

impl FetchRequest {
    /// Convenience constructor for a bare GET.
    pub fn get(url: &str) -> Self {
        Self {
            method: String::from("GET"),
            url: url.to_owned(),
            headers: Vec::new(),
            body: None,
        }
    }
}

/// The harvested response envelope of a fetch invocation.
#[derive(Clone, Debug)]
pub struct FetchOutcome {
    /// HTTP status.
    pub status: u16,
    /// Status text.
    pub status_text: String,
    /// Whether the status is in `[200, 300)`.
    pub ok: bool,
    /// Header pairs, names lowercased.
    pub headers: Vec<(String, String)>,
    /// Body bytes.
    pub body: Bytes,
    /// Whether the script asked for origin pass-through on exception.
    pub pass_through: bool,
}

impl FetchOutcome {
    /// Look up a response header by (case-insensitive) name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The body decoded as UTF-8.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A cron trigger handed to [`Runtime::execute_scheduled`].
#[derive(Clone, Debug)]
pub struct ScheduledEvent {
    /// Scheduled instant, epoch milliseconds.
    pub scheduled_time_ms: i64,
    /// The cron expression that fired.
    pub cron: String,
}

/// Harvest of a scheduled invocation.
#[derive(Clone, Debug)]
pub struct ScheduledOutcome {
    /// Whether the script asked the host not to retry on failure.
    pub no_retry: bool,
}

/// Per-message harvest of a queue invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueMessageOutcome {
    /// Message id.
    pub id: String,
    /// Whether the message ended acked.
    pub acked: bool,
    /// Whether the message ended marked for retry.
    pub retry: bool,
}

/// An inbound email handed to [`Runtime::execute_email`].
#[derive(Clone, Debug)]
pub struct EmailMessage {
    /// Envelope sender.
    pub from: String,
    /// Envelope recipient.
    pub to: String,
    /// Message headers.
    pub headers: Vec<(String, String)>,
    /// Raw RFC 5322 payload.
    pub raw: Bytes,
}

/// Harvest of an email invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmailOutcome {
    /// Forward target, when the script forwarded the message.
    pub forward_to: Option<String>,
    /// Rejection reason, when the script rejected it.
    pub rejected: Option<String>,
}

/// A trace batch handed to [`Runtime::execute_tail`].
#[derive(Clone, Debug)]
pub struct TailEvent {
    /// Ordered tail items as produced by the tracing producer.
    pub events: JsonValue,
    /// Delivery instant, epoch milliseconds.
    pub timestamp_ms: i64,
}

enum Settled {
    Fulfilled(JsValue),
    Rejected(JsValue),
    Pending,
}

impl Runtime {
    /// Dispatch an inbound request to the script's `fetch` handlers.
    pub fn execute_fetch(&mut self, request: FetchRequest) -> Result<FetchOutcome, ExecuteError> {
        self.execute_fetch_with(request, InvokeControl::default())
    }

    /// [`Runtime::execute_fetch`] with caller-side cancellation/deadline.
    pub fn execute_fetch_with(
        &mut self,
        request: FetchRequest,
        control: InvokeControl,
    ) -> Result<FetchOutcome, ExecuteError> {
        self.begin(EventKind::Fetch, &control);
        let result = self.fetch_inner(&request);
        let pass_through = self.finish();
        // Attach the pass-through flag harvested from the invocation to a
        // handler failure so the host can decide whether to proxy.
        match result {
            Err(ExecuteError::HandlerException { message, .. }) => {
                Err(ExecuteError::HandlerException {
                    message,
                    pass_through,
                })
            }
            other => other,
        }
    }

    fn fetch_inner(&mut self, request: &FetchRequest) -> Result<FetchOutcome, ExecuteError> {
        let handlers = self.handlers_or_fail(EventKind::Fetch)?;
        let cf = self.state.borrow().config.cf_metadata.clone();
        let tree = json!({
            "method": request.method,
            "url": request.url,
            "headers": request.headers,
            "bodyB64": request.body.as_deref().map(|bytes| BASE64_STANDARD.encode(bytes)),
            "cf": cf,
        });
        let event = self.build_event("__outpost_mk_fetch_event", &tree)?;
        self.invoke_handlers(&handlers, &event)?;

        let Some(response) = self.state.borrow_mut().invocation.as_mut().and_then(
            |invocation| invocation.response.clone(),
        ) else {
            return Err(ExecuteError::Protocol(String::from(
                "the fetch handler did not provide a response",
            )));
        };
        let value = match self.drain_value(&response)? {
            Ok(value) => value,
            Err(message) => {
                return Err(ExecuteError::HandlerException {
                    message,
                    pass_through: false,
                })
            }
        };
        if let Some(invocation) = self.state.borrow_mut().invocation.as_mut() {
            invocation.response_settled = true;
        }

        let extracted = self
            .engine
            .call_global("__outpost_extract_response", &[value])
            .and_then(|tree| self.engine.value_to_json(&tree))
            .map_err(|error| ExecuteError::Engine(error.to_string()))?;
        self.drain_continuations()?;

        let status = extracted["status"].as_u64().unwrap_or(200) as u16;
        let headers: Vec<(String, String)> = extracted["headers"]
            .as_array()
            .map(|pairs| {
                pairs
                    .iter()
                    .filter_map(|pair| {
                        let name = pair.get(0)?.as_str()?.to_lowercase();
                        let value = pair.get(1)?.as_str()?.to_owned();
                        Some((name, value))
                    })
                    .collect()
            })
            .unwrap_or_default();
        let body = extracted["bodyB64"]
            .as_str()
            .and_then(|encoded| BASE64_STANDARD.decode(encoded).ok())
            .map(Bytes::from)
            .unwrap_or_default();
        let pass_through = self
            .state
            .borrow()
            .invocation
            .as_ref()
            .is_some_and(|invocation| invocation.pass_through);
        Ok(FetchOutcome {
            status,
            status_text: extracted["statusText"].as_str().unwrap_or("").to_owned(),
            ok: (200..300).contains(&status),
            headers,
            body,
            pass_through,
        })
    }

    /// Dispatch a cron trigger. Handler absence is benign.
    pub fn execute_scheduled(
        &mut self,
        event: ScheduledEvent,
    ) -> Result<ScheduledOutcome, ExecuteError> {
        self.begin(EventKind::Scheduled, &InvokeControl::default());
        let result = self.scheduled_inner(&event);
        let no_retry = self
            .state
            .borrow()
            .invocation
            .as_ref()
            .is_some_and(|invocation| invocation.no_retry);
        self.finish();
        result.map(|()| ScheduledOutcome { no_retry })
    }

    fn scheduled_inner(&mut self, event: &ScheduledEvent) -> Result<(), ExecuteError> {
        if !self.state.borrow().registry.has_handlers(EventKind::Scheduled) {
            return Ok(());
        }
        let handlers = self.handlers_or_fail(EventKind::Scheduled)?;
        let tree = json!({
            "scheduledTime": event.scheduled_time_ms,
            "cron": event.cron,
        });
        let event = self.build_event("__outpost_mk_scheduled_event", &tree)?;
        self.invoke_handlers(&handlers, &event)?;
        self.drain_idle()?;
        self.drain_continuations()
    }

    /// Dispatch a message batch to the script's `queue` handlers.
    ///
    /// Messages neither acked nor retried by a successful handler default to
    /// acked; a throwing handler flips the unsettled ones to retry instead.
    pub fn execute_queue(
        &mut self,
        queue_name: &str,
        messages: Vec<QueueMessageRecord>,
    ) -> Result<Vec<QueueMessageOutcome>, ExecuteError> {
        self.begin(EventKind::Queue, &InvokeControl::default());
        if let Some(invocation) = self.state.borrow_mut().invocation.as_mut() {
            invocation.messages = vec![MessageDisposition::default(); messages.len()];
        }
        let result = self.queue_inner(queue_name, &messages);
        let dispositions = self
            .state
            .borrow()
            .invocation
            .as_ref()
            .map(|invocation| invocation.messages.clone())
            .unwrap_or_default();
        self.finish();

        let failed = match result {
            Ok(()) => false,
            Err(ExecuteError::HandlerException { message, .. }) => {
                log::warn!("queue handler failed, retrying unsettled messages: {message}");
                true
            }
            Err(other) => return Err(other),
        };
        Ok(messages
            .iter()
            .zip(dispositions)
            .map(|(message, disposition)| {
                let (acked, retry) = if disposition.acked {
                    (true, false)
                } else if disposition.retry {
                    (false, true)
                } else if failed {
                    (false, true)
                } else {
                    (true, false)
                };
                QueueMessageOutcome {
                    id: message.id.clone(),
                    acked,
                    retry,
                }
            })
            .collect())
    }

    fn queue_inner(
        &mut self,
        queue_name: &str,
        messages: &[QueueMessageRecord],
    ) -> Result<(), ExecuteError> {
        if !self.state.borrow().registry.has_handlers(EventKind::Queue) {
            // Benign: the whole batch defaults to acked.
            return Ok(());
        }
        let handlers = self.handlers_or_fail(EventKind::Queue)?;
        let message_trees: Vec<JsonValue> = messages
            .iter()
            .map(|message| {
                json!({
                    "id": message.id,
                    "timestamp": message.created_at_ms,
                    "attempts": message.attempts,
                    "body": crate::hostval::decode_queue_body(
                        &message.content_type,
                        &message.body,
                    ),
                })
            })
            .collect();
        let tree = json!({ "queue": queue_name, "messages": message_trees });
        let event = self.build_event("__outpost_mk_queue_event", &tree)?;
        self.invoke_handlers(&handlers, &event)?;
        self.drain_idle()?;
        self.drain_continuations()
    }

    /// Dispatch an inbound email. Handler absence is silent.
    pub fn execute_email(&mut self, message: EmailMessage) -> Result<EmailOutcome, ExecuteError> {
        self.begin(EventKind::Email, &InvokeControl::default());
        let result = self.email_inner(&message);
        let outcome = self
            .state
            .borrow()
            .invocation
            .as_ref()
            .map(|invocation| EmailOutcome {
                forward_to: invocation.email.forward_to.clone(),
                rejected: invocation.email.rejected.clone(),
            })
            .unwrap_or_default();
        self.finish();
        result.map(|()| outcome)
    }

    fn email_inner(&mut self, message: &EmailMessage) -> Result<(), ExecuteError> {
        if !self.state.borrow().registry.has_handlers(EventKind::Email) {
            return Ok(());
        }
        let handlers = self.handlers_or_fail(EventKind::Email)?;
        let tree = json!({
            "from": message.from,
            "to": message.to,
            "headers": message.headers,
            "rawB64": BASE64_STANDARD.encode(&message.raw),
        });
        let event = self.build_event("__outpost_mk_email_event", &tree)?;
        self.invoke_handlers(&handlers, &event)?;
        self.drain_idle()?;
        self.drain_continuations()
    }

    /// Deliver a trace batch. Handler absence is silent; completion is the
    /// only harvest.
    pub fn execute_tail(&mut self, event: TailEvent) -> Result<(), ExecuteError> {
        self.begin(EventKind::Tail, &InvokeControl::default());
        let result = self.tail_inner(&event);
        self.finish();
        result
    }

    fn tail_inner(&mut self, event: &TailEvent) -> Result<(), ExecuteError> {
        if !self.state.borrow().registry.has_handlers(EventKind::Tail) {
            return Ok(());
        }
        let handlers = self.handlers_or_fail(EventKind::Tail)?;
        let tree = json!({ "events": event.events, "timestamp": event.timestamp_ms });
        let event = self.build_event("__outpost_mk_tail_event", &tree)?;
        self.invoke_handlers(&handlers, &event)?;
        self.drain_idle()?;
        self.drain_continuations()
    }

    // --- shared machinery ---

    fn begin(&mut self, kind: EventKind, control: &InvokeControl) {
        let mut state = self.state.borrow_mut();
        let deadline =
            Instant::now() + control.deadline.unwrap_or(state.config.deadline);
        let cancel = control
            .cancel
            .clone()
            .unwrap_or_else(|| Arc::new(AtomicBool::new(false)));
        state.timers.clear_all();
        state.invocation = Some(InvocationState::new(kind, deadline, cancel));
    }

    /// Tear down the invocation, returning the harvested pass-through flag.
    fn finish(&mut self) -> bool {
        let mut state = self.state.borrow_mut();
        state.timers.clear_all();
        state
            .invocation
            .take()
            .map(|invocation| invocation.pass_through)
            .unwrap_or(false)
    }

    fn handlers_or_fail(&mut self, kind: EventKind) -> Result<Vec<JsObject>, ExecuteError> {
        let handlers = self.state.borrow().registry.handlers(kind);
        if handlers.is_empty() {
            return Err(ExecuteError::NoHandler(kind.as_str()));
        }
        Ok(handlers)
    }

    fn build_event(&mut self, builder: &str, tree: &JsonValue) -> Result<JsValue, ExecuteError> {
        let argument = self
            .engine
            .json_to_value(tree)
            .map_err(|error| ExecuteError::Engine(error.to_string()))?;
        self.engine
            .call_global(builder, &[argument])
            .map_err(|error| ExecuteError::Engine(error.to_string()))
    }

    /// Invoke handlers in registration order; one synchronous turn each.
    fn invoke_handlers(
        &mut self,
        handlers: &[JsObject],
        event: &JsValue,
    ) -> Result<(), ExecuteError> {
        for handler in handlers {
            self.check_interrupts()?;
            handler
                .call(&JsValue::undefined(), &[event.clone()], self.engine.context())
                .map_err(|error| ExecuteError::HandlerException {
                    message: error.to_string(),
                    pass_through: false,
                })?;
            self.engine.run_jobs();
        }
        Ok(())
    }

    fn check_interrupts(&mut self) -> Result<(), ExecuteError> {
        let state = self.state.borrow();
        let Some(invocation) = state.invocation.as_ref() else {
            return Ok(());
        };
        if invocation.cancelled() {
            return Err(ExecuteError::Canceled);
        }
        if invocation.past_deadline() {
            return Err(ExecuteError::Timeout(String::from(
                "wall-clock budget exhausted",
            )));
        }
        Ok(())
    }

    fn settled_state(&mut self, value: &JsValue) -> Settled {
        let Some(object) = value.as_object() else {
            return Settled::Fulfilled(value.clone());
        };
        match JsPromise::from_object(object.clone()) {
            Ok(promise) => match promise.state() {
                PromiseState::Pending => Settled::Pending,
                PromiseState::Fulfilled(inner) => Settled::Fulfilled(inner),
                PromiseState::Rejected(inner) => Settled::Rejected(inner),
            },
            // Not a native promise: treat the value itself as the result.
            Err(_) => Settled::Fulfilled(value.clone()),
        }
    }

    /// Run one pass of due timer callbacks. Returns how many fired.
    fn fire_due_timers(&mut self) -> Result<usize, ExecuteError> {
        let due = self.state.borrow_mut().timers.take_due(Instant::now());
        let fired = due.len();
        for callback in due {
            self.check_interrupts()?;
            callback
                .call(&JsValue::undefined(), &[], self.engine.context())
                .map_err(|error| ExecuteError::HandlerException {
                    message: error.to_string(),
                    pass_through: false,
                })?;
            self.engine.run_jobs();
        }
        Ok(fired)
    }

    /// Park until the next timer is due, bounded by the deadline.
    fn wait_for_timers(&mut self) -> Result<bool, ExecuteError> {
        let (next_due, deadline) = {
            let state = self.state.borrow();
            let Some(invocation) = state.invocation.as_ref() else {
                return Ok(false);
            };
            (state.timers.next_due(), invocation.deadline)
        };
        let Some(next_due) = next_due else {
            return Ok(false);
        };
        let wake = next_due.min(deadline);
        let now = Instant::now();
        if wake > now {
            std::thread::sleep(wake - now);
        }
        Ok(true)
    }

    /// Drive the loop until `value` settles; `Ok(Err(msg))` is a rejection.
    fn drain_value(
        &mut self,
        value: &JsValue,
    ) -> Result<Result<JsValue, String>, ExecuteError> {
        loop {
            self.engine.run_jobs();
            self.check_interrupts()?;
            match self.settled_state(value) {
                Settled::Fulfilled(inner) => return Ok(Ok(inner)),
                Settled::Rejected(inner) => {
                    let message = inner
                        .to_string(self.engine.context())
                        .map(|text| text.to_std_string_escaped())
                        .unwrap_or_else(|_| String::from("unknown script error"));
                    return Ok(Err(message));
                }
                Settled::Pending => {}
            }
            if self.fire_due_timers()? > 0 {
                continue;
            }
            if !self.wait_for_timers()? {
                // Jobs are drained, no timers are pending, and nothing else
                // can settle this promise.
                return Err(ExecuteError::Timeout(String::from(
                    "a pending promise can make no further progress",
                )));
            }
        }
    }

    /// Drive the loop until no jobs or timers remain.
    fn drain_idle(&mut self) -> Result<(), ExecuteError> {
        loop {
            self.engine.run_jobs();
            self.check_interrupts()?;
            if self.fire_due_timers()? > 0 {
                continue;
            }
            if !self.wait_for_timers()? {
                return Ok(());
            }
        }
    }

    /// Settle every `waitUntil` continuation; rejections are logged, not
    /// fatal.
    fn drain_continuations(&mut self) -> Result<(), ExecuteError> {
        let continuations = self
            .state
            .borrow_mut()
            .invocation
            .as_mut()
            .map(|invocation| std::mem::take(&mut invocation.continuations))
            .unwrap_or_default();
        for continuation in continuations {
            if let Err(message) = self.drain_value(&continuation)? {
                log::warn!("waitUntil continuation rejected: {message}");
            }
        }
        Ok(())
    }
}
