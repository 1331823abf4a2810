//! Durable-object binding operations.
//!
//! Stubs are lookup tokens: every operation re-resolves its instance through
//! the facade, so a stub never keeps an instance alive by itself. Storage
//! values are host-value trees persisted as bytes.

use super::{opt_bool, opt_i64, opt_str, opt_u64, req_str, OpResult};
use crate::hostval;
use outpost_platform::{DurableInstance, DurableListOptions, Platform};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

pub(super) fn handle(
    platform: &dyn Platform,
    namespace: &str,
    op: &str,
    payload: &JsonValue,
) -> OpResult {
    match op {
        "idFromName" => {
            let name = req_str(payload, "name")?;
            Ok(json!({
                "id": outpost_platform::named_durable_id(namespace, name),
                "name": name,
            }))
        }
        "newUniqueId" => Ok(json!({ "id": outpost_platform::unique_durable_id() })),
        "idFromString" => {
            let id = req_str(payload, "id")?;
            let valid = id.len() == 64 && id.chars().all(|ch| ch.is_ascii_hexdigit());
            if !valid {
                return Err(format!("invalid durable object id: {id}"));
            }
            Ok(json!({ "id": id.to_lowercase() }))
        }
        "storageGet" => {
            let instance = resolve(platform, namespace, payload)?;
            let key = req_str(payload, "key")?;
            match instance.get(key).map_err(|error| error.to_string())? {
                // Scalar get yields undefined for absent keys; the prelude
                // maps a missing "value" field accordingly.
                None => Ok(json!({ "present": false })),
                Some(bytes) => Ok(json!({
                    "present": true,
                    "value": hostval::bytes_to_tree(&bytes),
                })),
            }
        }
        "storageGetMany" => {
            let instance = resolve(platform, namespace, payload)?;
            let keys = string_list(payload, "keys")?;
            let mut entries = Vec::new();
            for key in keys {
                if let Some(bytes) = instance.get(&key).map_err(|error| error.to_string())? {
                    entries.push(json!([key, hostval::bytes_to_tree(&bytes)]));
                }
            }
            Ok(json!({ "entries": entries }))
        }
        "storagePut" => {
            let instance = resolve(platform, namespace, payload)?;
            let entries = payload
                .get("entries")
                .and_then(JsonValue::as_array)
                .ok_or_else(|| String::from("storage put requires entries"))?;
            for entry in entries {
                let key = entry
                    .get(0)
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| String::from("storage keys must be strings"))?;
                let tree = entry.get(1).cloned().unwrap_or(JsonValue::Null);
                instance
                    .put(key, hostval::tree_to_bytes(&tree))
                    .map_err(|error| error.to_string())?;
            }
            Ok(JsonValue::Null)
        }
        "storageDelete" => {
            let instance = resolve(platform, namespace, payload)?;
            match payload.get("keys") {
                Some(_) => {
                    let keys = string_list(payload, "keys")?;
                    let mut removed = 0u64;
                    for key in keys {
                        if instance.delete(&key).map_err(|error| error.to_string())? {
                            removed += 1;
                        }
                    }
                    Ok(json!({ "removed": removed }))
                }
                None => {
                    let key = req_str(payload, "key")?;
                    let was_present =
                        instance.delete(key).map_err(|error| error.to_string())?;
                    Ok(json!({ "present": was_present }))
                }
            }
        }
        "storageDeleteAll" => {
            let instance = resolve(platform, namespace, payload)?;
            instance.delete_all().map_err(|error| error.to_string())?;
            Ok(JsonValue::Null)
        }
        "storageList" => {
            let instance = resolve(platform, namespace, payload)?;
            let entries = instance
                .list(DurableListOptions {
                    prefix: opt_str(payload, "prefix").map(str::to_owned),
                    start: opt_str(payload, "start").map(str::to_owned),
                    end: opt_str(payload, "end").map(str::to_owned),
                    limit: opt_u64(payload, "limit").map(|limit| limit as usize),
                    reverse: opt_bool(payload, "reverse"),
                })
                .map_err(|error| error.to_string())?;
            let entries: Vec<JsonValue> = entries
                .into_iter()
                .map(|(key, bytes)| json!([key, hostval::bytes_to_tree(&bytes)]))
                .collect();
            Ok(json!({ "entries": entries }))
        }
        "getAlarm" => {
            let instance = resolve(platform, namespace, payload)?;
            Ok(json!({
                "alarm": instance.get_alarm().map_err(|error| error.to_string())?,
            }))
        }
        "setAlarm" => {
            let instance = resolve(platform, namespace, payload)?;
            let when = opt_i64(payload, "when")
                .ok_or_else(|| String::from("setAlarm requires an instant"))?;
            instance.set_alarm(when).map_err(|error| error.to_string())?;
            Ok(JsonValue::Null)
        }
        "deleteAlarm" => {
            let instance = resolve(platform, namespace, payload)?;
            instance.delete_alarm().map_err(|error| error.to_string())?;
            Ok(JsonValue::Null)
        }
        "fetch" => {
            let instance = resolve(platform, namespace, payload)?;
            let method = opt_str(payload, "method").unwrap_or("GET");
            let url = opt_str(payload, "url").unwrap_or("https://durable-object/");
            let sequence = instance
                .deliver_fetch(method, url)
                .map_err(|error| error.to_string())?;
            Ok(json!({
                "id": instance.id_hex(),
                "sequence": sequence,
            }))
        }
        _ => Err(format!("unknown durable object operation: {op}")),
    }
}

fn resolve(
    platform: &dyn Platform,
    namespace: &str,
    payload: &JsonValue,
) -> Result<Arc<dyn DurableInstance>, String> {
    let id = req_str(payload, "id")?;
    platform
        .durable_instance(namespace, id, opt_str(payload, "name"))
        .map_err(|error| error.to_string())
}

fn string_list(payload: &JsonValue, field: &str) -> Result<Vec<String>, String> {
    payload
        .get(field)
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::to_owned)
                .collect()
        })
        .ok_or_else(|| format!("{field} must be an array of strings"))
}
