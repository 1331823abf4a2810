//! Boa engine plumbing: context construction, evaluation, job draining,
//! and the small set of conversion helpers the rest of the crate leans on.

use crate::error::ExecuteError;
use boa_engine::{Context, JsError, JsNativeError, JsResult, JsString, JsValue, Source};
use serde_json::Value as JsonValue;

/// JavaScript source for the runtime prelude.
///
/// Evaluated once per context before any script runs; it installs the
/// web-platform classes and binding call-surfaces over the host natives.
pub(crate) const RUNTIME_PRELUDE: &str = include_str!("prelude.js");

/// Thin wrapper around a Boa context.
pub(crate) struct ScriptEngine {
    context: Context,
}

impl ScriptEngine {
    /// Create a fresh context.
    pub fn new() -> Result<Self, ExecuteError> {
        Ok(Self {
            context: Context::default(),
        })
    }

    /// Mutable access for binding installation and dispatch.
    pub fn context(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Evaluate a script, mapping failures to the load-error taxonomy.
    pub fn eval(&mut self, source: &str, name: &str) -> Result<JsValue, ExecuteError> {
        log::debug!("evaluating {name} ({} bytes)", source.len());
        self.context
            .eval(Source::from_bytes(source))
            .map_err(|error| ExecuteError::ScriptCompile(format!("{name}: {error}")))
    }

    /// Run pending microtask jobs until the queue is idle.
    pub fn run_jobs(&mut self) {
        self.context.run_jobs();
    }

    /// Call a prelude-defined global function.
    pub fn call_global(&mut self, name: &str, args: &[JsValue]) -> JsResult<JsValue> {
        let global = self.context.global_object();
        let function = global.get(JsString::from(name), &mut self.context)?;
        let Some(callable) = function.as_callable() else {
            return Err(runtime_error(format!("global {name} is not callable")));
        };
        callable.call(&JsValue::undefined(), args, &mut self.context)
    }

    /// Convert a JSON tree into a live value.
    pub fn json_to_value(&mut self, tree: &JsonValue) -> JsResult<JsValue> {
        JsValue::from_json(tree, &mut self.context)
    }

    /// Convert a JSON-safe value back into a JSON tree.
    pub fn value_to_json(&mut self, value: &JsValue) -> JsResult<JsonValue> {
        value.to_json(&mut self.context)
    }
}

/// Build a `TypeError`.
pub(crate) fn type_error(message: impl Into<String>) -> JsError {
    JsNativeError::typ().with_message(message.into()).into()
}

/// Build a generic `Error`.
pub(crate) fn runtime_error(message: impl Into<String>) -> JsError {
    JsNativeError::error().with_message(message.into()).into()
}

/// Read a required string argument.
pub(crate) fn arg_string(
    args: &[JsValue],
    index: usize,
    what: &str,
    context: &mut Context,
) -> JsResult<String> {
    let value = args
        .get(index)
        .ok_or_else(|| type_error(format!("{what} is required")))?;
    Ok(value.to_string(context)?.to_std_string_escaped())
}

/// Read a required numeric argument.
pub(crate) fn arg_number(
    args: &[JsValue],
    index: usize,
    what: &str,
    context: &mut Context,
) -> JsResult<f64> {
    let value = args
        .get(index)
        .ok_or_else(|| type_error(format!("{what} is required")))?;
    value.to_number(context)
}

/// Read an argument as a JSON tree; absent and `undefined` become `null`.
pub(crate) fn arg_json(
    args: &[JsValue],
    index: usize,
    context: &mut Context,
) -> JsResult<JsonValue> {
    match args.get(index) {
        None => Ok(JsonValue::Null),
        Some(value) if value.is_undefined() || value.is_null() => Ok(JsonValue::Null),
        Some(value) => value.to_json(context),
    }
}
