//! Storage facade for the Outpost emulator.
//!
//! This crate centralizes the narrow service surface the binding layer
//! consumes: key-value namespaces, an object store with multipart uploads,
//! SQL databases, durable single-instance objects, message queues, and a
//! model runner. The surface is deliberately small so backing engines can be
//! swapped; [`MemoryPlatform`] is the in-process reference implementation
//! used by the emulator and its tests.

use bytes::Bytes;
use serde_json::Value as JsonValue;
use std::sync::Arc;

pub mod error;
pub use error::PlatformError;

pub mod types;
pub use types::{
    Conditional, DurableListOptions, GetObjectOptions, GetObjectOutcome, HttpMetadata, KvEntry,
    KvRecord, ListObjectsOptions, MultipartHandle, ObjectChecksums, ObjectListing, ObjectRecord,
    PutObjectOptions, QueueMessageRecord, QueueSendOptions, RangeRequest, ResolvedRange,
    SqlResultSet, StorageClass, UploadedPart,
};

mod memory;
pub use memory::MemoryPlatform;

/// Result alias used across the facade.
pub type PlatformResult<T> = Result<T, PlatformError>;

/// The service surface consumed by the emulator's binding layer.
///
/// One method per facade operation; implementations provide their own
/// internal concurrency control, since a single platform instance is shared
/// by every binding and every runtime.
pub trait Platform: Send + Sync {
    // --- Key-value namespaces ---

    /// Fetch a pair by key. Expired pairs are invisible.
    fn kv_get(&self, namespace: &str, key: &str) -> PlatformResult<Option<KvRecord>>;

    /// Store a pair, replacing any existing value under the key.
    fn kv_put(&self, namespace: &str, key: &str, record: KvRecord) -> PlatformResult<()>;

    /// Remove a pair. Deleting a missing key succeeds.
    fn kv_delete(&self, namespace: &str, key: &str) -> PlatformResult<()>;

    /// List up to `limit` live pairs in lexicographic key order, optionally
    /// restricted to a prefix and starting strictly after `after`.
    fn kv_list(
        &self,
        namespace: &str,
        prefix: Option<&str>,
        after: Option<&str>,
        limit: usize,
    ) -> PlatformResult<Vec<KvEntry>>;

    // --- Object store ---

    /// Store an object, verifying any caller-supplied checksums.
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        opts: PutObjectOptions,
    ) -> PlatformResult<ObjectRecord>;

    /// Read an object, applying conditional and range options.
    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        opts: GetObjectOptions,
    ) -> PlatformResult<GetObjectOutcome>;

    /// Read object metadata without the body.
    fn head_object(&self, bucket: &str, key: &str) -> PlatformResult<Option<ObjectRecord>>;

    /// Delete objects by key, returning how many actually existed.
    fn delete_objects(&self, bucket: &str, keys: &[String]) -> PlatformResult<usize>;

    /// List objects with prefix/delimiter folding and cursor pagination.
    fn list_objects(&self, bucket: &str, opts: ListObjectsOptions) -> PlatformResult<ObjectListing>;

    /// Open a multipart upload. The object stays invisible until completion.
    fn create_multipart(
        &self,
        bucket: &str,
        key: &str,
        opts: PutObjectOptions,
    ) -> PlatformResult<MultipartHandle>;

    /// Re-attach to an open multipart upload.
    fn resume_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> PlatformResult<MultipartHandle>;

    /// Stage one numbered part, replacing any previous bytes for the number.
    fn upload_part(
        &self,
        bucket: &str,
        upload: &MultipartHandle,
        part_number: u16,
        bytes: Bytes,
    ) -> PlatformResult<UploadedPart>;

    /// Discard an open upload and its staged parts.
    fn abort_multipart(&self, bucket: &str, upload: &MultipartHandle) -> PlatformResult<()>;

    /// Publish the concatenation of the referenced parts atomically.
    fn complete_multipart(
        &self,
        bucket: &str,
        upload: &MultipartHandle,
        parts: &[UploadedPart],
    ) -> PlatformResult<ObjectRecord>;

    // --- SQL databases ---

    /// Run a statement that yields rows.
    fn sql_query(
        &self,
        database: &str,
        sql: &str,
        params: &[JsonValue],
    ) -> PlatformResult<SqlResultSet>;

    /// Run a statement for its side effects, returning affected row count.
    fn sql_exec(&self, database: &str, sql: &str, params: &[JsonValue]) -> PlatformResult<u64>;

    // --- Durable objects ---

    /// Materialize (or look up) the instance for `(namespace, id)`.
    ///
    /// `name` is recorded on first materialization of a named id so stubs can
    /// surface it later; unique ids pass `None`.
    fn durable_instance(
        &self,
        namespace: &str,
        id_hex: &str,
        name: Option<&str>,
    ) -> PlatformResult<Arc<dyn DurableInstance>>;

    // --- Queues ---

    /// Enqueue one message.
    fn queue_send(
        &self,
        queue: &str,
        body: Bytes,
        opts: QueueSendOptions,
    ) -> PlatformResult<QueueMessageRecord>;

    /// Enqueue a batch, preserving entry order.
    fn queue_send_batch(
        &self,
        queue: &str,
        entries: Vec<(Bytes, QueueSendOptions)>,
    ) -> PlatformResult<Vec<QueueMessageRecord>>;

    /// Pop up to `max` currently-visible messages, bumping their attempts.
    fn queue_pull(&self, queue: &str, max: usize) -> PlatformResult<Vec<QueueMessageRecord>>;

    // --- Model runner ---

    /// Produce one embedding vector per input text.
    fn generate_embeddings(&self, model: &str, texts: &[String]) -> PlatformResult<Vec<Vec<f32>>>;

    /// Produce a text completion for a prompt.
    fn generate_text(
        &self,
        model: &str,
        prompt: &str,
        opts: &JsonValue,
    ) -> PlatformResult<String>;
}

/// Per-instance surface of a durable object.
///
/// An instance exclusively owns its storage view and its single alarm slot;
/// handles returned by [`Platform::durable_instance`] for the same id all
/// observe the same state.
pub trait DurableInstance: Send + Sync {
    /// The instance id in lowercase hex.
    fn id_hex(&self) -> String;

    /// The name the id was derived from, when the id is a named id.
    fn name(&self) -> Option<String>;

    /// Read one storage value.
    fn get(&self, key: &str) -> PlatformResult<Option<Bytes>>;

    /// Write one storage value.
    fn put(&self, key: &str, value: Bytes) -> PlatformResult<()>;

    /// Delete one key, reporting whether it was present.
    fn delete(&self, key: &str) -> PlatformResult<bool>;

    /// Clear this instance's storage only.
    fn delete_all(&self) -> PlatformResult<()>;

    /// List storage pairs in key order, honoring the range options.
    fn list(&self, opts: DurableListOptions) -> PlatformResult<Vec<(String, Bytes)>>;

    /// Read the alarm instant in epoch milliseconds.
    fn get_alarm(&self) -> PlatformResult<Option<i64>>;

    /// Set (or overwrite) the alarm instant.
    fn set_alarm(&self, when_ms: i64) -> PlatformResult<()>;

    /// Clear the alarm.
    fn delete_alarm(&self) -> PlatformResult<()>;

    /// Deliver one emulated `fetch` to the instance.
    ///
    /// Deliveries are serialized per instance behind an instance-local lock;
    /// the returned sequence number reflects FIFO delivery order.
    fn deliver_fetch(&self, method: &str, url: &str) -> PlatformResult<u64>;
}

/// Derive the deterministic id for a named durable object.
///
/// Stable across processes: two calls with the same `(namespace, name)`
/// always produce the same 64-character lowercase hex string.
pub fn named_durable_id(namespace: &str, name: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update([0u8]);
    hasher.update(name.as_bytes());
    hex::encode(hasher.finalize())
}

/// Draw a fresh unique durable object id.
pub fn unique_durable_id() -> String {
    use rand::RngCore;
    let mut raw = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut raw);
    hex::encode(raw)
}
