//! Record types carried across the facade boundary.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A stored key-value pair: bytes plus optional metadata and expiration.
#[derive(Clone, Debug)]
pub struct KvRecord {
    /// Raw stored bytes.
    pub value: Bytes,
    /// Caller-attached string metadata.
    pub metadata: Option<BTreeMap<String, String>>,
    /// Absolute expiration in epoch seconds; pairs at or past it are invisible.
    pub expiration: Option<u64>,
}

/// One entry of a KV list result.
#[derive(Clone, Debug)]
pub struct KvEntry {
    /// The pair's key.
    pub key: String,
    /// The stored record.
    pub record: KvRecord,
}

/// HTTP-shaped metadata carried on stored objects.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpMetadata {
    /// `Content-Type` to replay on reads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// `Content-Language`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,
    /// `Content-Disposition`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    /// `Content-Encoding`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    /// `Cache-Control`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
}

/// Hex digests attached to a stored object.
///
/// On writes these are caller expectations and are verified; on reads they
/// report what the store recorded.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectChecksums {
    /// MD5 digest, lowercase hex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    /// SHA-1 digest, lowercase hex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    /// SHA-256 digest, lowercase hex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// SHA-384 digest, lowercase hex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha384: Option<String>,
    /// SHA-512 digest, lowercase hex.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha512: Option<String>,
}

/// Storage class of an object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageClass {
    /// The default class.
    #[default]
    Standard,
    /// Cold storage.
    InfrequentAccess,
}

impl StorageClass {
    /// Parse the script-facing spelling.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Standard" => Some(Self::Standard),
            "InfrequentAccess" => Some(Self::InfrequentAccess),
            _ => None,
        }
    }

    /// The script-facing spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "Standard",
            Self::InfrequentAccess => "InfrequentAccess",
        }
    }
}

/// Metadata snapshot of a stored object (never carries the body).
#[derive(Clone, Debug)]
pub struct ObjectRecord {
    /// Object key within its bucket.
    pub key: String,
    /// Body size in bytes.
    pub size: u64,
    /// Strong validator: lowercase hex SHA-256 of the body bytes.
    pub etag: String,
    /// Upload instant.
    pub uploaded: DateTime<Utc>,
    /// HTTP-shaped metadata recorded at write time.
    pub http_metadata: HttpMetadata,
    /// Caller-attached string metadata.
    pub custom_metadata: BTreeMap<String, String>,
    /// Digests recorded at write time.
    pub checksums: ObjectChecksums,
    /// Storage class recorded at write time.
    pub storage_class: StorageClass,
}

impl ObjectRecord {
    /// The quoted form of the etag, as surfaced in HTTP headers.
    pub fn http_etag(&self) -> String {
        format!("\"{}\"", self.etag)
    }
}

/// Options applied when writing an object (simple or multipart).
#[derive(Clone, Debug, Default)]
pub struct PutObjectOptions {
    /// HTTP-shaped metadata to record.
    pub http_metadata: HttpMetadata,
    /// Caller metadata to record.
    pub custom_metadata: BTreeMap<String, String>,
    /// Expected digests; a mismatch rejects the write.
    pub checksums: ObjectChecksums,
    /// Storage class to record.
    pub storage_class: StorageClass,
}

/// Preconditions applied to a conditional read.
#[derive(Clone, Debug, Default)]
pub struct Conditional {
    /// Succeed only when the stored etag equals this (unquoted) value.
    pub etag_matches: Option<String>,
    /// Succeed only when the stored etag differs from this value.
    pub etag_does_not_match: Option<String>,
    /// Succeed only when the object was uploaded strictly before this instant.
    pub uploaded_before: Option<DateTime<Utc>>,
    /// Succeed only when the object was uploaded strictly after this instant.
    pub uploaded_after: Option<DateTime<Utc>>,
}

impl Conditional {
    /// Evaluate the precondition against a stored record.
    pub fn holds_for(&self, record: &ObjectRecord) -> bool {
        if let Some(expected) = &self.etag_matches {
            if record.etag != *expected {
                return false;
            }
        }
        if let Some(unexpected) = &self.etag_does_not_match {
            if record.etag == *unexpected {
                return false;
            }
        }
        if let Some(instant) = self.uploaded_before {
            if record.uploaded >= instant {
                return false;
            }
        }
        if let Some(instant) = self.uploaded_after {
            if record.uploaded <= instant {
                return false;
            }
        }
        true
    }
}

/// A byte-range request against an object body.
#[derive(Clone, Copy, Debug)]
pub enum RangeRequest {
    /// From `offset`, for `length` bytes when given, otherwise to the end.
    Offset {
        /// Starting byte offset.
        offset: u64,
        /// Optional length.
        length: Option<u64>,
    },
    /// The trailing `suffix` bytes.
    Suffix {
        /// Number of trailing bytes.
        suffix: u64,
    },
}

impl RangeRequest {
    /// Resolve against a body of `size` bytes, clamping to the body's extent.
    pub fn resolve(self, size: u64) -> ResolvedRange {
        match self {
            Self::Offset { offset, length } => {
                let offset = offset.min(size);
                let available = size - offset;
                let length = length.map_or(available, |wanted| wanted.min(available));
                ResolvedRange { offset, length }
            }
            Self::Suffix { suffix } => {
                let length = suffix.min(size);
                ResolvedRange {
                    offset: size - length,
                    length,
                }
            }
        }
    }
}

/// The `{offset, length}` a range request resolved to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedRange {
    /// First byte returned.
    pub offset: u64,
    /// Number of bytes returned.
    pub length: u64,
}

/// Options applied to a conditional/range read.
#[derive(Clone, Debug, Default)]
pub struct GetObjectOptions {
    /// Preconditions; when they fail the body is withheld.
    pub only_if: Option<Conditional>,
    /// Byte range to return.
    pub range: Option<RangeRequest>,
}

/// Result of an object read.
#[derive(Clone, Debug)]
pub enum GetObjectOutcome {
    /// No object under the key.
    Missing,
    /// Preconditions failed: metadata only, body withheld.
    Precondition(ObjectRecord),
    /// Full hit: metadata plus (possibly ranged) body bytes.
    Hit {
        /// Metadata snapshot.
        record: ObjectRecord,
        /// Body bytes for the resolved range.
        bytes: Bytes,
        /// The resolved range when one was requested.
        range: Option<ResolvedRange>,
    },
}

/// Options applied to an object listing.
#[derive(Clone, Debug, Default)]
pub struct ListObjectsOptions {
    /// Restrict to keys with this prefix.
    pub prefix: Option<String>,
    /// Fold keys at this delimiter into `delimited_prefixes`.
    pub delimiter: Option<String>,
    /// Resume after an opaque cursor from a previous listing.
    pub cursor: Option<String>,
    /// Start strictly after this key.
    pub start_after: Option<String>,
    /// Page size.
    pub limit: Option<usize>,
    /// Include recorded HTTP metadata on results.
    pub include_http_metadata: bool,
    /// Include recorded custom metadata on results.
    pub include_custom_metadata: bool,
}

/// Result of an object listing.
#[derive(Clone, Debug)]
pub struct ObjectListing {
    /// Matching objects in key order.
    pub objects: Vec<ObjectRecord>,
    /// Whether more results remain past this page.
    pub truncated: bool,
    /// Opaque resume cursor when truncated.
    pub cursor: Option<String>,
    /// Folded prefixes when a delimiter was given.
    pub delimited_prefixes: Vec<String>,
}

/// Handle on an open multipart upload.
#[derive(Clone, Debug)]
pub struct MultipartHandle {
    /// Target object key.
    pub key: String,
    /// Opaque upload id.
    pub upload_id: String,
}

/// Receipt for one staged multipart part.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedPart {
    /// The part number the bytes were staged under.
    pub part_number: u16,
    /// MD5 hex of the staged bytes.
    pub etag: String,
}

/// Rows produced by a SQL query.
#[derive(Clone, Debug, Default)]
pub struct SqlResultSet {
    /// Column names in declared order.
    pub columns: Vec<String>,
    /// Row values, one vector per row, in column order.
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// A message stored in a queue.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMessageRecord {
    /// Message id.
    pub id: String,
    /// Owning queue.
    pub queue: String,
    /// Encoded body bytes.
    #[serde(with = "bytes_base64")]
    pub body: Bytes,
    /// Producer-declared content type (`json`, `text`, or `bytes`).
    pub content_type: String,
    /// Delivery attempts so far.
    pub attempts: u32,
    /// Creation instant, epoch milliseconds.
    pub created_at_ms: i64,
    /// Visibility instant, epoch milliseconds; delayed sends push it forward.
    pub visible_at_ms: i64,
    /// Expiry instant, epoch milliseconds.
    pub expires_at_ms: i64,
}

/// Options applied when producing a queue message.
#[derive(Clone, Debug, Default)]
pub struct QueueSendOptions {
    /// Content type; defaults to `json`.
    pub content_type: Option<String>,
    /// Delay before the message becomes visible.
    pub delay_seconds: Option<u64>,
}

/// Range options for a durable-object storage listing.
#[derive(Clone, Debug, Default)]
pub struct DurableListOptions {
    /// Restrict to keys with this prefix.
    pub prefix: Option<String>,
    /// Inclusive lower bound.
    pub start: Option<String>,
    /// Exclusive upper bound.
    pub end: Option<String>,
    /// Page size.
    pub limit: Option<usize>,
    /// Return keys in descending order.
    pub reverse: bool,
}

mod bytes_base64 {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        use base64::Engine as _;
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        use base64::Engine as _;
        let text = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(text)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
