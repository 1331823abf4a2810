//! Host serialization for values crossing the script boundary.
//!
//! Values are carried as JSON trees with three extension markers:
//! `{"$bytes": <base64>}` for byte buffers, `{"$date": <epoch ms>}` for
//! dates, and `{"$undefined": true}` for `undefined`. The prelude encodes
//! script values into this form before handing them to the host and revives
//! marker trees back into live values; this module persists marker trees as
//! bytes for durable-object storage and queue bodies.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde_json::{json, Value as JsonValue};

/// Wrap raw bytes in a `$bytes` marker.
pub fn bytes_marker(bytes: &[u8]) -> JsonValue {
    json!({ "$bytes": BASE64_STANDARD.encode(bytes) })
}

/// Extract raw bytes when the tree is a `$bytes` marker.
pub fn marker_bytes(tree: &JsonValue) -> Option<Bytes> {
    let encoded = tree.get("$bytes")?.as_str()?;
    BASE64_STANDARD.decode(encoded).ok().map(Bytes::from)
}

/// Persist a marker tree as storage bytes.
pub fn tree_to_bytes(tree: &JsonValue) -> Bytes {
    Bytes::from(serde_json::to_vec(tree).unwrap_or_default())
}

/// Revive storage bytes into a marker tree.
///
/// Bytes that fail to parse (foreign writers) surface as a `$bytes` marker so
/// nothing is silently lost.
pub fn bytes_to_tree(bytes: &[u8]) -> JsonValue {
    serde_json::from_slice(bytes).unwrap_or_else(|_| bytes_marker(bytes))
}

/// Encode a queue body for a producer-declared content type.
pub fn encode_queue_body(content_type: &str, body: &JsonValue) -> Result<Bytes, String> {
    match content_type {
        "json" => Ok(tree_to_bytes(body)),
        "text" => match body.as_str() {
            Some(text) => Ok(Bytes::copy_from_slice(text.as_bytes())),
            None => Err(String::from("text queue messages require a string body")),
        },
        "bytes" => marker_bytes(body)
            .ok_or_else(|| String::from("bytes queue messages require a byte buffer body")),
        other => Err(format!("unsupported queue content type: {other}")),
    }
}

/// Decode a stored queue body back into the tree delivered to consumers.
pub fn decode_queue_body(content_type: &str, body: &[u8]) -> JsonValue {
    match content_type {
        "text" => JsonValue::String(String::from_utf8_lossy(body).into_owned()),
        "bytes" => bytes_marker(body),
        _ => bytes_to_tree(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_markers_round_trip() {
        let marker = bytes_marker(b"\x00\x01binary");
        assert_eq!(marker_bytes(&marker).unwrap().as_ref(), b"\x00\x01binary");
    }

    #[test]
    fn storage_trees_round_trip() {
        let tree = json!({ "n": 1, "nested": { "$date": 1700000000000i64 } });
        let revived = bytes_to_tree(&tree_to_bytes(&tree));
        assert_eq!(revived, tree);
    }

    #[test]
    fn foreign_storage_bytes_surface_as_byte_marker() {
        let revived = bytes_to_tree(b"\xff\xfenot json");
        assert!(revived.get("$bytes").is_some());
    }

    #[test]
    fn queue_bodies_follow_the_content_type() {
        let text = encode_queue_body("text", &json!("hello")).unwrap();
        assert_eq!(text.as_ref(), b"hello");
        assert_eq!(decode_queue_body("text", &text), json!("hello"));

        let tree = json!({ "op": "resize" });
        let encoded = encode_queue_body("json", &tree).unwrap();
        assert_eq!(decode_queue_body("json", &encoded), tree);

        let raw = encode_queue_body("bytes", &bytes_marker(b"\x01\x02")).unwrap();
        assert_eq!(raw.as_ref(), b"\x01\x02");
    }

    #[test]
    fn mistyped_queue_bodies_are_rejected() {
        assert!(encode_queue_body("text", &json!(5)).is_err());
        assert!(encode_queue_body("bytes", &json!("plain")).is_err());
        assert!(encode_queue_body("xml", &json!("x")).is_err());
    }
}
