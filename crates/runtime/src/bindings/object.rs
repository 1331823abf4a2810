//! Object-store binding operations.

use super::{opt_str, opt_u64, req_str, string_map, OpResult};
use crate::hostval;
use chrono::DateTime;
use outpost_platform::{
    Conditional, GetObjectOptions, GetObjectOutcome, ListObjectsOptions, MultipartHandle,
    ObjectChecksums, ObjectRecord, Platform, PutObjectOptions, RangeRequest, StorageClass,
    UploadedPart,
};
use serde_json::{json, Value as JsonValue};

pub(super) fn handle(
    platform: &dyn Platform,
    bucket: &str,
    op: &str,
    payload: &JsonValue,
) -> OpResult {
    match op {
        "put" => put(platform, bucket, payload),
        "get" => get(platform, bucket, payload),
        "head" => head(platform, bucket, payload),
        "delete" => delete(platform, bucket, payload),
        "list" => list(platform, bucket, payload),
        "createMultipart" => create_multipart(platform, bucket, payload),
        "resumeMultipart" => {
            let key = req_str(payload, "key")?;
            let upload_id = req_str(payload, "uploadId")?;
            let handle = platform
                .resume_multipart(bucket, key, upload_id)
                .map_err(|error| error.to_string())?;
            Ok(json!({ "key": handle.key, "uploadId": handle.upload_id }))
        }
        "uploadPart" => upload_part(platform, bucket, payload),
        "abortMultipart" => {
            let handle = multipart_handle(payload)?;
            platform
                .abort_multipart(bucket, &handle)
                .map_err(|error| error.to_string())?;
            Ok(JsonValue::Null)
        }
        "completeMultipart" => complete_multipart(platform, bucket, payload),
        _ => Err(format!("unknown r2 operation: {op}")),
    }
}

/// Shape one object's metadata for the prelude; `uploaded` travels as epoch
/// milliseconds and is revived as a `Date` script-side.
fn record_json(record: &ObjectRecord) -> JsonValue {
    json!({
        "key": record.key,
        "size": record.size,
        "etag": record.etag,
        "httpEtag": record.http_etag(),
        "uploaded": record.uploaded.timestamp_millis(),
        "httpMetadata": serde_json::to_value(&record.http_metadata).unwrap_or(JsonValue::Null),
        "customMetadata": record.custom_metadata,
        "checksums": serde_json::to_value(&record.checksums).unwrap_or(JsonValue::Null),
        "storageClass": record.storage_class.as_str(),
    })
}

fn put_options(payload: &JsonValue) -> Result<PutObjectOptions, String> {
    let http_metadata = payload
        .get("httpMetadata")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|error| format!("invalid httpMetadata: {error}"))?
        .unwrap_or_default();
    let storage_class = match opt_str(payload, "storageClass") {
        None => StorageClass::default(),
        Some(name) => StorageClass::parse(name)
            .ok_or_else(|| format!("unknown storage class: {name}"))?,
    };
    Ok(PutObjectOptions {
        http_metadata,
        custom_metadata: string_map(payload, "customMetadata"),
        checksums: ObjectChecksums {
            md5: opt_str(payload, "md5").map(str::to_owned),
            sha1: opt_str(payload, "sha1").map(str::to_owned),
            sha256: opt_str(payload, "sha256").map(str::to_owned),
            sha384: opt_str(payload, "sha384").map(str::to_owned),
            sha512: opt_str(payload, "sha512").map(str::to_owned),
        },
        storage_class,
    })
}

fn put(platform: &dyn Platform, bucket: &str, payload: &JsonValue) -> OpResult {
    let key = req_str(payload, "key")?;
    let bytes = payload
        .get("value")
        .and_then(hostval::marker_bytes)
        .ok_or_else(|| String::from("put requires a value"))?;
    let record = platform
        .put_object(bucket, key, bytes, put_options(payload)?)
        .map_err(|error| error.to_string())?;
    Ok(record_json(&record))
}

fn conditional(payload: &JsonValue) -> Result<Option<Conditional>, String> {
    let Some(only_if) = payload.get("onlyIf").filter(|value| value.is_object()) else {
        return Ok(None);
    };
    let parse_instant = |field: &str| -> Result<Option<chrono::DateTime<chrono::Utc>>, String> {
        match only_if.get(field).and_then(JsonValue::as_i64) {
            None => Ok(None),
            Some(ms) => DateTime::from_timestamp_millis(ms)
                .map(Some)
                .ok_or_else(|| format!("invalid {field} instant")),
        }
    };
    Ok(Some(Conditional {
        etag_matches: opt_str(only_if, "etagMatches").map(str::to_owned),
        etag_does_not_match: opt_str(only_if, "etagDoesNotMatch").map(str::to_owned),
        uploaded_before: parse_instant("uploadedBefore")?,
        uploaded_after: parse_instant("uploadedAfter")?,
    }))
}

fn range(payload: &JsonValue) -> Result<Option<RangeRequest>, String> {
    let Some(range) = payload.get("range").filter(|value| value.is_object()) else {
        return Ok(None);
    };
    if let Some(suffix) = opt_u64(range, "suffix") {
        return Ok(Some(RangeRequest::Suffix { suffix }));
    }
    match opt_u64(range, "offset") {
        Some(offset) => Ok(Some(RangeRequest::Offset {
            offset,
            length: opt_u64(range, "length"),
        })),
        None => match opt_u64(range, "length") {
            Some(length) => Ok(Some(RangeRequest::Offset {
                offset: 0,
                length: Some(length),
            })),
            None => Err(String::from("range requires offset, length, or suffix")),
        },
    }
}

fn get(platform: &dyn Platform, bucket: &str, payload: &JsonValue) -> OpResult {
    let key = req_str(payload, "key")?;
    let outcome = platform
        .get_object(
            bucket,
            key,
            GetObjectOptions {
                only_if: conditional(payload)?,
                range: range(payload)?,
            },
        )
        .map_err(|error| error.to_string())?;
    match outcome {
        GetObjectOutcome::Missing => Ok(JsonValue::Null),
        GetObjectOutcome::Precondition(record) => {
            let mut tree = record_json(&record);
            tree["body"] = JsonValue::Null;
            Ok(tree)
        }
        GetObjectOutcome::Hit {
            record,
            bytes,
            range,
        } => {
            let mut tree = record_json(&record);
            tree["body"] = hostval::bytes_marker(&bytes);
            if let Some(resolved) = range {
                tree["range"] = json!({
                    "offset": resolved.offset,
                    "length": resolved.length,
                });
            }
            Ok(tree)
        }
    }
}

fn head(platform: &dyn Platform, bucket: &str, payload: &JsonValue) -> OpResult {
    let key = req_str(payload, "key")?;
    match platform
        .head_object(bucket, key)
        .map_err(|error| error.to_string())?
    {
        None => Ok(JsonValue::Null),
        Some(record) => Ok(record_json(&record)),
    }
}

fn delete(platform: &dyn Platform, bucket: &str, payload: &JsonValue) -> OpResult {
    let keys: Vec<String> = match payload.get("keys") {
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(JsonValue::as_str)
            .map(str::to_owned)
            .collect(),
        _ => vec![req_str(payload, "key")?.to_owned()],
    };
    let removed = platform
        .delete_objects(bucket, &keys)
        .map_err(|error| error.to_string())?;
    Ok(json!({ "removed": removed }))
}

fn list(platform: &dyn Platform, bucket: &str, payload: &JsonValue) -> OpResult {
    let include = payload
        .get("include")
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::to_owned)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let listing = platform
        .list_objects(
            bucket,
            ListObjectsOptions {
                prefix: opt_str(payload, "prefix").map(str::to_owned),
                delimiter: opt_str(payload, "delimiter").map(str::to_owned),
                cursor: opt_str(payload, "cursor").map(str::to_owned),
                start_after: opt_str(payload, "startAfter").map(str::to_owned),
                limit: opt_u64(payload, "limit").map(|limit| limit as usize),
                include_http_metadata: include.iter().any(|item| item == "httpMetadata"),
                include_custom_metadata: include.iter().any(|item| item == "customMetadata"),
            },
        )
        .map_err(|error| error.to_string())?;
    Ok(json!({
        "objects": listing.objects.iter().map(record_json).collect::<Vec<_>>(),
        "truncated": listing.truncated,
        "cursor": listing.cursor,
        "delimitedPrefixes": listing.delimited_prefixes,
    }))
}

fn create_multipart(platform: &dyn Platform, bucket: &str, payload: &JsonValue) -> OpResult {
    let key = req_str(payload, "key")?;
    let handle = platform
        .create_multipart(bucket, key, put_options(payload)?)
        .map_err(|error| error.to_string())?;
    Ok(json!({ "key": handle.key, "uploadId": handle.upload_id }))
}

fn multipart_handle(payload: &JsonValue) -> Result<MultipartHandle, String> {
    Ok(MultipartHandle {
        key: req_str(payload, "key")?.to_owned(),
        upload_id: req_str(payload, "uploadId")?.to_owned(),
    })
}

fn upload_part(platform: &dyn Platform, bucket: &str, payload: &JsonValue) -> OpResult {
    let handle = multipart_handle(payload)?;
    let part_number = opt_u64(payload, "partNumber")
        .filter(|number| (1..=10_000).contains(number))
        .ok_or_else(|| String::from("part numbers must be between 1 and 10000"))? as u16;
    let bytes = payload
        .get("value")
        .and_then(hostval::marker_bytes)
        .ok_or_else(|| String::from("uploadPart requires a value"))?;
    let part = platform
        .upload_part(bucket, &handle, part_number, bytes)
        .map_err(|error| error.to_string())?;
    Ok(json!({ "partNumber": part.part_number, "etag": part.etag }))
}

fn complete_multipart(platform: &dyn Platform, bucket: &str, payload: &JsonValue) -> OpResult {
    let handle = multipart_handle(payload)?;
    let parts: Vec<UploadedPart> = payload
        .get("parts")
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| UploadedPart {
                    part_number: opt_u64(item, "partNumber").unwrap_or(0) as u16,
                    etag: opt_str(item, "etag").unwrap_or_default().to_owned(),
                })
                .collect()
        })
        .unwrap_or_default();
    let record = platform
        .complete_multipart(bucket, &handle, &parts)
        .map_err(|error| error.to_string())?;
    Ok(record_json(&record))
}
