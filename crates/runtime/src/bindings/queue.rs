//! Queue producer binding operations.

use super::{opt_str, opt_u64, OpResult};
use crate::hostval;
use outpost_platform::{Platform, QueueSendOptions};
use serde_json::{json, Value as JsonValue};

fn send_options(entry: &JsonValue) -> QueueSendOptions {
    QueueSendOptions {
        content_type: opt_str(entry, "contentType").map(str::to_owned),
        delay_seconds: opt_u64(entry, "delaySeconds"),
    }
}

fn encoded_body(entry: &JsonValue) -> Result<bytes::Bytes, String> {
    let content_type = opt_str(entry, "contentType").unwrap_or("json");
    let body = entry.get("body").cloned().unwrap_or(JsonValue::Null);
    hostval::encode_queue_body(content_type, &body)
}

pub(super) fn handle(
    platform: &dyn Platform,
    queue: &str,
    op: &str,
    payload: &JsonValue,
) -> OpResult {
    match op {
        "send" => {
            let record = platform
                .queue_send(queue, encoded_body(payload)?, send_options(payload))
                .map_err(|error| error.to_string())?;
            Ok(json!({ "id": record.id }))
        }
        "sendBatch" => {
            let entries = payload
                .get("entries")
                .and_then(JsonValue::as_array)
                .ok_or_else(|| String::from("sendBatch requires entries"))?;
            let mut batch = Vec::with_capacity(entries.len());
            for entry in entries {
                batch.push((encoded_body(entry)?, send_options(entry)));
            }
            let records = platform
                .queue_send_batch(queue, batch)
                .map_err(|error| error.to_string())?;
            let ids: Vec<JsonValue> = records
                .into_iter()
                .map(|record| json!(record.id))
                .collect();
            Ok(json!({ "ids": ids }))
        }
        _ => Err(format!("unknown queue operation: {op}")),
    }
}
