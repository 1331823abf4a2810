//! Binding multiplexer: translates prelude-issued operations into facade
//! calls.
//!
//! Each configured binding is addressed by a token (its index in the
//! declaration order); the prelude's call-surfaces funnel every operation
//! through `__outpost.bindingInvoke(token, op, payload)`. Payloads and
//! results are JSON trees using the host-value markers, which keeps the
//! per-binding handlers plain Rust and directly testable.

use crate::engine::runtime_error;
use crate::state::HostState;
use boa_engine::{Context, JsResult, JsValue};
use outpost_platform::Platform;
use serde_json::Value as JsonValue;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

mod ai;
mod durable;
mod kv;
mod object;
mod queue;
mod sql;

/// Outcome of one binding operation before it reaches the engine.
pub(crate) type OpResult = Result<JsonValue, String>;

/// Dispatch one operation against the binding addressed by `token`.
pub(crate) fn invoke(
    state: &Rc<RefCell<HostState>>,
    token: usize,
    op: &str,
    payload: JsonValue,
    context: &mut Context,
) -> JsResult<JsValue> {
    let (target, platform) = {
        let state = state.borrow();
        let Some(binding) = state.bindings.get(token) else {
            return Err(runtime_error(format!("unknown binding token {token}")));
        };
        (binding.target.clone(), Arc::clone(&state.platform))
    };
    let result = route(platform.as_ref(), &target, op, &payload);
    match result {
        Ok(tree) => JsValue::from_json(&tree, context),
        Err(message) => Err(runtime_error(message)),
    }
}

fn route(
    platform: &dyn Platform,
    target: &crate::config::BindingTarget,
    op: &str,
    payload: &JsonValue,
) -> OpResult {
    use crate::config::BindingTarget;
    match target {
        BindingTarget::Kv(namespace) => kv::handle(platform, namespace, op, payload),
        BindingTarget::Object(bucket) => object::handle(platform, bucket, op, payload),
        BindingTarget::Sql(database) => sql::handle(platform, database, op, payload),
        BindingTarget::Durable(namespace) => durable::handle(platform, namespace, op, payload),
        BindingTarget::Queue(queue) => queue::handle(platform, queue, op, payload),
        BindingTarget::Model => ai::handle(platform, op, payload),
    }
}

// --- payload helpers shared by the handlers ---

fn req_str<'p>(payload: &'p JsonValue, field: &str) -> Result<&'p str, String> {
    payload
        .get(field)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| format!("missing required field {field}"))
}

fn opt_str<'p>(payload: &'p JsonValue, field: &str) -> Option<&'p str> {
    payload.get(field).and_then(JsonValue::as_str)
}

fn opt_u64(payload: &JsonValue, field: &str) -> Option<u64> {
    payload.get(field).and_then(JsonValue::as_u64)
}

fn opt_i64(payload: &JsonValue, field: &str) -> Option<i64> {
    payload.get(field).and_then(JsonValue::as_i64)
}

fn opt_bool(payload: &JsonValue, field: &str) -> bool {
    payload
        .get(field)
        .and_then(JsonValue::as_bool)
        .unwrap_or(false)
}

fn string_map(
    payload: &JsonValue,
    field: &str,
) -> std::collections::BTreeMap<String, String> {
    payload
        .get(field)
        .and_then(JsonValue::as_object)
        .map(|object| {
            object
                .iter()
                .filter_map(|(key, value)| {
                    value.as_str().map(|text| (key.clone(), text.to_owned()))
                })
                .collect()
        })
        .unwrap_or_default()
}
