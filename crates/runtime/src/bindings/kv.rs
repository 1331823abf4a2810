//! Key-value binding operations.

use super::{opt_str, opt_u64, req_str, string_map, OpResult};
use crate::hostval;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use outpost_platform::{KvRecord, Platform};
use serde_json::{json, Map, Value as JsonValue};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default page size for `list`.
const DEFAULT_LIST_LIMIT: usize = 1000;

pub(super) fn handle(
    platform: &dyn Platform,
    namespace: &str,
    op: &str,
    payload: &JsonValue,
) -> OpResult {
    match op {
        "get" => get(platform, namespace, payload),
        "put" => put(platform, namespace, payload),
        "delete" => {
            let key = req_str(payload, "key")?;
            platform
                .kv_delete(namespace, key)
                .map_err(|error| error.to_string())?;
            Ok(JsonValue::Null)
        }
        "list" => list(platform, namespace, payload),
        _ => Err(format!("unknown kv operation: {op}")),
    }
}

fn metadata_json(metadata: &Option<std::collections::BTreeMap<String, String>>) -> JsonValue {
    match metadata {
        None => JsonValue::Null,
        Some(map) => JsonValue::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), JsonValue::String(value.clone())))
                .collect(),
        ),
    }
}

fn get(platform: &dyn Platform, namespace: &str, payload: &JsonValue) -> OpResult {
    let key = req_str(payload, "key")?;
    match platform
        .kv_get(namespace, key)
        .map_err(|error| error.to_string())?
    {
        None => Ok(json!({ "value": null, "metadata": null })),
        Some(record) => Ok(json!({
            "value": hostval::bytes_marker(&record.value),
            "metadata": metadata_json(&record.metadata),
            "expiration": record.expiration,
        })),
    }
}

fn put(platform: &dyn Platform, namespace: &str, payload: &JsonValue) -> OpResult {
    let key = req_str(payload, "key")?;
    let value = payload
        .get("value")
        .and_then(hostval::marker_bytes)
        .ok_or_else(|| String::from("put requires a value"))?;
    // expirationTtl (relative seconds) wins over expiration (absolute).
    let expiration = match opt_u64(payload, "expirationTtl") {
        Some(ttl) => {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            Some(now + ttl)
        }
        None => opt_u64(payload, "expiration"),
    };
    let metadata = payload
        .get("metadata")
        .filter(|value| value.is_object())
        .map(|_| string_map(payload, "metadata"));
    platform
        .kv_put(
            namespace,
            key,
            KvRecord {
                value,
                metadata,
                expiration,
            },
        )
        .map_err(|error| error.to_string())?;
    Ok(JsonValue::Null)
}

fn list(platform: &dyn Platform, namespace: &str, payload: &JsonValue) -> OpResult {
    let prefix = opt_str(payload, "prefix");
    let limit = opt_u64(payload, "limit")
        .map(|limit| limit as usize)
        .filter(|limit| *limit > 0)
        .unwrap_or(DEFAULT_LIST_LIMIT);
    // The cursor is opaque to callers; internally it encodes the last
    // returned key.
    let after = match opt_str(payload, "cursor") {
        None => None,
        Some(cursor) => Some(
            BASE64_STANDARD
                .decode(cursor)
                .ok()
                .and_then(|raw| String::from_utf8(raw).ok())
                .ok_or_else(|| String::from("malformed list cursor"))?,
        ),
    };
    let entries = platform
        .kv_list(namespace, prefix, after.as_deref(), limit)
        .map_err(|error| error.to_string())?;
    let list_complete = entries.len() < limit;
    let cursor = if list_complete {
        None
    } else {
        entries
            .last()
            .map(|entry| BASE64_STANDARD.encode(&entry.key))
    };
    let keys: Vec<JsonValue> = entries
        .iter()
        .map(|entry| {
            let mut item = Map::new();
            item.insert(String::from("name"), json!(entry.key));
            if let Some(expiration) = entry.record.expiration {
                item.insert(String::from("expiration"), json!(expiration));
            }
            if entry.record.metadata.is_some() {
                item.insert(
                    String::from("metadata"),
                    metadata_json(&entry.record.metadata),
                );
            }
            JsonValue::Object(item)
        })
        .collect();
    Ok(json!({
        "keys": keys,
        "list_complete": list_complete,
        "cursor": cursor,
    }))
}
