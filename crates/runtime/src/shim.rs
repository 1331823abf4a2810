//! Host natives backing the web-platform shim.
//!
//! Everything the prelude cannot do in pure JavaScript crosses the boundary
//! here: byte codecs, hashing, randomness, URL parsing, timers, outbound
//! HTTP, event registration, and the per-invocation event surface. The
//! functions are installed on a single `__outpost` namespace object; the
//! prelude wraps them in the standard-shaped globals.

use crate::engine::{arg_json, arg_number, arg_string, type_error};
use crate::events::EventKind;
use crate::state::{HostCaptures, HostState, LogLevel};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use boa_engine::object::ObjectInitializer;
use boa_engine::{js_string, Context, JsResult, JsString, JsValue, NativeFunction};
use md5::Md5;
use serde_json::{json, Value as JsonValue};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

fn string_value(text: String) -> JsValue {
    JsValue::from(JsString::from(text))
}

fn hex_to_b64_digest<D: Digest>(bytes: &[u8]) -> String {
    let mut hasher = D::new();
    hasher.update(bytes);
    BASE64_STANDARD.encode(hasher.finalize())
}

/// `__outpost.log(level, message)`
fn host_log(
    _this: &JsValue,
    args: &[JsValue],
    captures: &HostCaptures,
    context: &mut Context,
) -> JsResult<JsValue> {
    let level = arg_string(args, 0, "level", context)?;
    let message = arg_string(args, 1, "message", context)?;
    let level = match level.as_str() {
        "debug" => LogLevel::Debug,
        "warn" => LogLevel::Warn,
        "error" => LogLevel::Error,
        _ => LogLevel::Info,
    };
    let logger = captures.state.borrow().logger.clone();
    logger.log(level, &message);
    Ok(JsValue::undefined())
}

/// `__outpost.now()` — monotonic milliseconds since runtime creation.
fn host_now(
    _this: &JsValue,
    _args: &[JsValue],
    captures: &HostCaptures,
    _context: &mut Context,
) -> JsResult<JsValue> {
    let elapsed = captures.state.borrow().started.elapsed();
    Ok(JsValue::from(elapsed.as_secs_f64() * 1_000.0))
}

/// `__outpost.randomUuid()`
fn host_random_uuid(
    _this: &JsValue,
    _args: &[JsValue],
    _captures: &HostCaptures,
    _context: &mut Context,
) -> JsResult<JsValue> {
    Ok(string_value(uuid::Uuid::new_v4().to_string()))
}

/// `__outpost.randomBytes(n)` — base64 of `n` random bytes.
fn host_random_bytes(
    _this: &JsValue,
    args: &[JsValue],
    _captures: &HostCaptures,
    context: &mut Context,
) -> JsResult<JsValue> {
    use rand::RngCore as _;
    let wanted = arg_number(args, 0, "byte count", context)? as usize;
    if wanted > 65_536 {
        return Err(type_error("getRandomValues supports at most 65536 bytes"));
    }
    let mut raw = vec![0u8; wanted];
    rand::thread_rng().fill_bytes(&mut raw);
    Ok(string_value(BASE64_STANDARD.encode(raw)))
}

/// `__outpost.digest(algorithm, b64)` — base64 digest of the bytes.
fn host_digest(
    _this: &JsValue,
    args: &[JsValue],
    _captures: &HostCaptures,
    context: &mut Context,
) -> JsResult<JsValue> {
    let algorithm = arg_string(args, 0, "algorithm", context)?;
    let encoded = arg_string(args, 1, "data", context)?;
    let bytes = BASE64_STANDARD
        .decode(encoded)
        .map_err(|_| type_error("digest: malformed data"))?;
    let normalized: String = algorithm
        .chars()
        .filter(|ch| *ch != '-')
        .collect::<String>()
        .to_uppercase();
    let digest = match normalized.as_str() {
        "MD5" => hex_to_b64_digest::<Md5>(&bytes),
        "SHA1" => hex_to_b64_digest::<Sha1>(&bytes),
        "SHA256" => hex_to_b64_digest::<Sha256>(&bytes),
        "SHA384" => hex_to_b64_digest::<Sha384>(&bytes),
        "SHA512" => hex_to_b64_digest::<Sha512>(&bytes),
        _ => return Err(type_error(format!("unsupported digest algorithm: {algorithm}"))),
    };
    Ok(string_value(digest))
}

/// `__outpost.b64Encode(binaryString)` — the `btoa` core.
fn host_b64_encode(
    _this: &JsValue,
    args: &[JsValue],
    _captures: &HostCaptures,
    context: &mut Context,
) -> JsResult<JsValue> {
    let binary = arg_string(args, 0, "data", context)?;
    let mut raw = Vec::with_capacity(binary.len());
    for ch in binary.chars() {
        let code = ch as u32;
        if code > 0xFF {
            return Err(type_error(
                "btoa: the string contains characters outside of the Latin1 range",
            ));
        }
        raw.push(code as u8);
    }
    Ok(string_value(BASE64_STANDARD.encode(raw)))
}

/// `__outpost.b64Decode(base64)` — the `atob` core.
fn host_b64_decode(
    _this: &JsValue,
    args: &[JsValue],
    _captures: &HostCaptures,
    context: &mut Context,
) -> JsResult<JsValue> {
    let encoded = arg_string(args, 0, "data", context)?;
    let raw = BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|_| type_error("atob: the string is not correctly encoded"))?;
    let binary: String = raw.into_iter().map(char::from).collect();
    Ok(string_value(binary))
}

/// `__outpost.utf8Encode(text)` — base64 of the UTF-8 bytes.
fn host_utf8_encode(
    _this: &JsValue,
    args: &[JsValue],
    _captures: &HostCaptures,
    context: &mut Context,
) -> JsResult<JsValue> {
    let text = arg_string(args, 0, "text", context)?;
    Ok(string_value(BASE64_STANDARD.encode(text.as_bytes())))
}

/// `__outpost.utf8Decode(b64)` — lossy UTF-8 decode of the bytes.
fn host_utf8_decode(
    _this: &JsValue,
    args: &[JsValue],
    _captures: &HostCaptures,
    context: &mut Context,
) -> JsResult<JsValue> {
    let encoded = arg_string(args, 0, "data", context)?;
    let raw = BASE64_STANDARD
        .decode(encoded)
        .map_err(|_| type_error("TextDecoder: malformed data"))?;
    Ok(string_value(String::from_utf8_lossy(&raw).into_owned()))
}

/// `__outpost.parseUrl(href, base?)` — components for the `URL` class.
fn host_parse_url(
    _this: &JsValue,
    args: &[JsValue],
    _captures: &HostCaptures,
    context: &mut Context,
) -> JsResult<JsValue> {
    let href = arg_string(args, 0, "url", context)?;
    let base = match args.get(1) {
        Some(value) if !value.is_undefined() && !value.is_null() => {
            Some(value.to_string(context)?.to_std_string_escaped())
        }
        _ => None,
    };
    let parsed = match base {
        Some(base) => url::Url::parse(&base)
            .and_then(|base| base.join(&href))
            .map_err(|_| type_error(format!("Invalid URL: {href}")))?,
        None => url::Url::parse(&href).map_err(|_| type_error(format!("Invalid URL: {href}")))?,
    };
    let components = json!({
        "href": parsed.as_str(),
        "protocol": format!("{}:", parsed.scheme()),
        "hostname": parsed.host_str().unwrap_or(""),
        "host": match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_owned(),
            (None, _) => String::new(),
        },
        "port": parsed.port().map(|port| port.to_string()).unwrap_or_default(),
        "pathname": parsed.path(),
        "search": parsed.query().map(|query| format!("?{query}")).unwrap_or_default(),
        "hash": parsed.fragment().map(|fragment| format!("#{fragment}")).unwrap_or_default(),
        "origin": parsed.origin().ascii_serialization(),
    });
    JsValue::from_json(&components, context)
}

/// `__outpost.httpFetch(params)` — blocking outbound request.
fn host_http_fetch(
    _this: &JsValue,
    args: &[JsValue],
    captures: &HostCaptures,
    context: &mut Context,
) -> JsResult<JsValue> {
    let tree = arg_json(args, 0, context)?;
    let params: crate::net::FetchParams =
        serde_json::from_value(tree).map_err(|error| type_error(format!("fetch: {error}")))?;
    let outcome = {
        let state = captures.state.borrow();
        let Some(http) = &state.http else {
            return Err(type_error("fetch: network access is disabled"));
        };
        http.fetch(&params)
    };
    let done = outcome.map_err(type_error)?;
    let tree = serde_json::to_value(&done)
        .map_err(|error| type_error(format!("fetch: {error}")))?;
    JsValue::from_json(&tree, context)
}

/// `__outpost.setTimer(callback, delayMs, repeat)`
fn host_set_timer(
    _this: &JsValue,
    args: &[JsValue],
    captures: &HostCaptures,
    context: &mut Context,
) -> JsResult<JsValue> {
    let Some(callback) = args.first().and_then(JsValue::as_callable) else {
        return Err(type_error("setTimeout requires a function"));
    };
    let delay_ms = match args.get(1) {
        Some(value) if !value.is_undefined() => value.to_number(context)?.max(0.0),
        _ => 0.0,
    };
    let repeat = args.get(2).is_some_and(JsValue::to_boolean);
    let id = captures.state.borrow_mut().timers.set(
        callback.clone(),
        Duration::from_millis(delay_ms as u64),
        repeat,
    );
    Ok(JsValue::from(id as f64))
}

/// `__outpost.clearTimer(id)`
fn host_clear_timer(
    _this: &JsValue,
    args: &[JsValue],
    captures: &HostCaptures,
    context: &mut Context,
) -> JsResult<JsValue> {
    let id = arg_number(args, 0, "timer id", context)? as u64;
    captures.state.borrow_mut().timers.clear(id);
    Ok(JsValue::undefined())
}

/// `__outpost.addEventListener(kind, handler)`
fn host_add_event_listener(
    _this: &JsValue,
    args: &[JsValue],
    captures: &HostCaptures,
    context: &mut Context,
) -> JsResult<JsValue> {
    let kind_name = arg_string(args, 0, "event type", context)?;
    let Some(handler) = args.get(1).and_then(JsValue::as_callable) else {
        return Err(type_error("addEventListener requires a function"));
    };
    match EventKind::parse(&kind_name) {
        Some(kind) => {
            captures
                .state
                .borrow_mut()
                .registry
                .register(kind, handler.clone());
        }
        None => log::warn!("ignoring listener for unknown event type {kind_name:?}"),
    }
    Ok(JsValue::undefined())
}

/// `__outpost.bindingInvoke(token, op, payload)`
fn host_binding_invoke(
    _this: &JsValue,
    args: &[JsValue],
    captures: &HostCaptures,
    context: &mut Context,
) -> JsResult<JsValue> {
    let token = arg_number(args, 0, "binding token", context)? as usize;
    let op = arg_string(args, 1, "operation", context)?;
    let payload = arg_json(args, 2, context)?;
    crate::bindings::invoke(&captures.state, token, &op, payload, context)
}

fn with_invocation<R>(
    captures: &HostCaptures,
    mutate: impl FnOnce(&mut crate::invocation::InvocationState) -> JsResult<R>,
) -> JsResult<R> {
    let mut state = captures.state.borrow_mut();
    let Some(invocation) = state.invocation.as_mut() else {
        return Err(type_error("no invocation is active"));
    };
    mutate(invocation)
}

/// `__outpost.respondWith(promise)` — at most once per fetch event.
fn host_respond_with(
    _this: &JsValue,
    args: &[JsValue],
    captures: &HostCaptures,
    _context: &mut Context,
) -> JsResult<JsValue> {
    let value = args.first().cloned().unwrap_or(JsValue::undefined());
    with_invocation(captures, |invocation| {
        if invocation.kind != EventKind::Fetch {
            return Err(type_error("respondWith is only available on fetch events"));
        }
        if invocation.response.is_some() {
            return Err(type_error("respondWith has already been called"));
        }
        invocation.response = Some(value);
        Ok(JsValue::undefined())
    })
}

/// `__outpost.waitUntil(promise)`
fn host_wait_until(
    _this: &JsValue,
    args: &[JsValue],
    captures: &HostCaptures,
    _context: &mut Context,
) -> JsResult<JsValue> {
    let value = args.first().cloned().unwrap_or(JsValue::undefined());
    with_invocation(captures, |invocation| {
        invocation.push_continuation(value);
        Ok(JsValue::undefined())
    })
}

/// `__outpost.passThroughOnException()` — only before the response settles.
fn host_pass_through(
    _this: &JsValue,
    _args: &[JsValue],
    captures: &HostCaptures,
    _context: &mut Context,
) -> JsResult<JsValue> {
    with_invocation(captures, |invocation| {
        if invocation.response_settled {
            return Err(type_error(
                "passThroughOnException must be called before the response settles",
            ));
        }
        invocation.pass_through = true;
        Ok(JsValue::undefined())
    })
}

/// `__outpost.queueMark(index, kind)` — per-message ack/retry bookkeeping.
fn host_queue_mark(
    _this: &JsValue,
    args: &[JsValue],
    captures: &HostCaptures,
    context: &mut Context,
) -> JsResult<JsValue> {
    let index = arg_number(args, 0, "message index", context)? as usize;
    let kind = arg_string(args, 1, "mark", context)?;
    with_invocation(captures, |invocation| {
        match kind.as_str() {
            "ackAll" => {
                for message in &mut invocation.messages {
                    message.acked = true;
                    message.retry = false;
                }
            }
            "retryAll" => {
                for message in &mut invocation.messages {
                    if !message.acked {
                        message.retry = true;
                    }
                }
            }
            "ack" | "retry" => {
                let Some(message) = invocation.messages.get_mut(index) else {
                    return Err(type_error("unknown queue message"));
                };
                if kind == "ack" {
                    message.acked = true;
                    message.retry = false;
                } else if !message.acked {
                    message.retry = true;
                }
            }
            _ => return Err(type_error("unknown queue mark")),
        }
        Ok(JsValue::undefined())
    })
}

/// `__outpost.scheduledNoRetry()`
fn host_scheduled_no_retry(
    _this: &JsValue,
    _args: &[JsValue],
    captures: &HostCaptures,
    _context: &mut Context,
) -> JsResult<JsValue> {
    with_invocation(captures, |invocation| {
        invocation.no_retry = true;
        Ok(JsValue::undefined())
    })
}

/// `__outpost.emailForward(to)`
fn host_email_forward(
    _this: &JsValue,
    args: &[JsValue],
    captures: &HostCaptures,
    context: &mut Context,
) -> JsResult<JsValue> {
    let to = arg_string(args, 0, "forward address", context)?;
    with_invocation(captures, |invocation| {
        invocation.email.forward_to = Some(to);
        Ok(JsValue::undefined())
    })
}

/// `__outpost.emailSetReject(reason)`
fn host_email_set_reject(
    _this: &JsValue,
    args: &[JsValue],
    captures: &HostCaptures,
    context: &mut Context,
) -> JsResult<JsValue> {
    let reason = arg_string(args, 0, "reject reason", context)?;
    with_invocation(captures, |invocation| {
        invocation.email.rejected = Some(reason);
        Ok(JsValue::undefined())
    })
}

macro_rules! native {
    ($function:ident, $captures:expr) => {
        NativeFunction::from_copy_closure_with_captures($function, $captures.clone())
    };
}

/// Install the `__outpost` namespace on the global object.
pub(crate) fn install_host_namespace(
    context: &mut Context,
    state: &Rc<RefCell<HostState>>,
) -> JsResult<()> {
    let captures = HostCaptures {
        state: Rc::clone(state),
    };
    let namespace = ObjectInitializer::new(context)
        .function(native!(host_log, captures), js_string!("log"), 2)
        .function(native!(host_now, captures), js_string!("now"), 0)
        .function(native!(host_random_uuid, captures), js_string!("randomUuid"), 0)
        .function(native!(host_random_bytes, captures), js_string!("randomBytes"), 1)
        .function(native!(host_digest, captures), js_string!("digest"), 2)
        .function(native!(host_b64_encode, captures), js_string!("b64Encode"), 1)
        .function(native!(host_b64_decode, captures), js_string!("b64Decode"), 1)
        .function(native!(host_utf8_encode, captures), js_string!("utf8Encode"), 1)
        .function(native!(host_utf8_decode, captures), js_string!("utf8Decode"), 1)
        .function(native!(host_parse_url, captures), js_string!("parseUrl"), 2)
        .function(native!(host_http_fetch, captures), js_string!("httpFetch"), 1)
        .function(native!(host_set_timer, captures), js_string!("setTimer"), 3)
        .function(native!(host_clear_timer, captures), js_string!("clearTimer"), 1)
        .function(
            native!(host_add_event_listener, captures),
            js_string!("addEventListener"),
            2,
        )
        .function(
            native!(host_binding_invoke, captures),
            js_string!("bindingInvoke"),
            3,
        )
        .function(native!(host_respond_with, captures), js_string!("respondWith"), 1)
        .function(native!(host_wait_until, captures), js_string!("waitUntil"), 1)
        .function(native!(host_pass_through, captures), js_string!("passThroughOnException"), 0)
        .function(native!(host_queue_mark, captures), js_string!("queueMark"), 2)
        .function(
            native!(host_scheduled_no_retry, captures),
            js_string!("scheduledNoRetry"),
            0,
        )
        .function(native!(host_email_forward, captures), js_string!("emailForward"), 1)
        .function(
            native!(host_email_set_reject, captures),
            js_string!("emailSetReject"),
            1,
        )
        .build();
    let global = context.global_object();
    global.set(js_string!("__outpost"), namespace, false, context)?;
    Ok(())
}

/// Serialize the JSON tree describing configured bindings for the prelude.
pub(crate) fn binding_manifest(state: &Rc<RefCell<HostState>>) -> JsonValue {
    let state = state.borrow();
    let entries: Vec<JsonValue> = state
        .bindings
        .iter()
        .enumerate()
        .map(|(token, binding)| {
            let kind = match binding.target {
                crate::config::BindingTarget::Kv(_) => "kv",
                crate::config::BindingTarget::Object(_) => "r2",
                crate::config::BindingTarget::Sql(_) => "d1",
                crate::config::BindingTarget::Durable(_) => "do",
                crate::config::BindingTarget::Queue(_) => "queue",
                crate::config::BindingTarget::Model => "ai",
            };
            json!({ "name": binding.name, "kind": kind, "token": token })
        })
        .collect();
    JsonValue::Array(entries)
}
