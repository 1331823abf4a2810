//! In-memory reference implementation of the platform facade.
//!
//! Backs every service with process-local state: ordered maps for KV and
//! object keys, SQLite in-memory databases for SQL, and per-instance state
//! for durable objects. All stores guard themselves with interior locks, so
//! one `MemoryPlatform` can be shared by any number of runtimes.

use crate::error::PlatformError;
use crate::types::*;
use crate::{DurableInstance, Platform, PlatformResult};
use bytes::Bytes;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

mod durable;
mod kv;
mod model;
mod object;
mod queue;
mod sql;

/// Current wall clock in epoch milliseconds.
pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Current wall clock in epoch seconds.
pub(crate) fn now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// The in-process facade implementation used by the emulator and its tests.
#[derive(Default)]
pub struct MemoryPlatform {
    kv: kv::KvStore,
    objects: object::ObjectStore,
    sql: sql::SqlEngine,
    durables: durable::DurableRegistry,
    queues: queue::QueueStore,
    model: model::ModelRunner,
}

impl MemoryPlatform {
    /// Create an empty platform.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Platform for MemoryPlatform {
    fn kv_get(&self, namespace: &str, key: &str) -> PlatformResult<Option<KvRecord>> {
        self.kv.get(namespace, key)
    }

    fn kv_put(&self, namespace: &str, key: &str, record: KvRecord) -> PlatformResult<()> {
        self.kv.put(namespace, key, record)
    }

    fn kv_delete(&self, namespace: &str, key: &str) -> PlatformResult<()> {
        self.kv.delete(namespace, key)
    }

    fn kv_list(
        &self,
        namespace: &str,
        prefix: Option<&str>,
        after: Option<&str>,
        limit: usize,
    ) -> PlatformResult<Vec<KvEntry>> {
        self.kv.list(namespace, prefix, after, limit)
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        opts: PutObjectOptions,
    ) -> PlatformResult<ObjectRecord> {
        self.objects.put(bucket, key, bytes, opts)
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
        opts: GetObjectOptions,
    ) -> PlatformResult<GetObjectOutcome> {
        self.objects.get(bucket, key, opts)
    }

    fn head_object(&self, bucket: &str, key: &str) -> PlatformResult<Option<ObjectRecord>> {
        self.objects.head(bucket, key)
    }

    fn delete_objects(&self, bucket: &str, keys: &[String]) -> PlatformResult<usize> {
        self.objects.delete(bucket, keys)
    }

    fn list_objects(&self, bucket: &str, opts: ListObjectsOptions) -> PlatformResult<ObjectListing> {
        self.objects.list(bucket, opts)
    }

    fn create_multipart(
        &self,
        bucket: &str,
        key: &str,
        opts: PutObjectOptions,
    ) -> PlatformResult<MultipartHandle> {
        self.objects.create_multipart(bucket, key, opts)
    }

    fn resume_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> PlatformResult<MultipartHandle> {
        self.objects.resume_multipart(bucket, key, upload_id)
    }

    fn upload_part(
        &self,
        bucket: &str,
        upload: &MultipartHandle,
        part_number: u16,
        bytes: Bytes,
    ) -> PlatformResult<UploadedPart> {
        self.objects.upload_part(bucket, upload, part_number, bytes)
    }

    fn abort_multipart(&self, bucket: &str, upload: &MultipartHandle) -> PlatformResult<()> {
        self.objects.abort_multipart(bucket, upload)
    }

    fn complete_multipart(
        &self,
        bucket: &str,
        upload: &MultipartHandle,
        parts: &[UploadedPart],
    ) -> PlatformResult<ObjectRecord> {
        self.objects.complete_multipart(bucket, upload, parts)
    }

    fn sql_query(
        &self,
        database: &str,
        sql: &str,
        params: &[JsonValue],
    ) -> PlatformResult<SqlResultSet> {
        self.sql.query(database, sql, params)
    }

    fn sql_exec(&self, database: &str, sql: &str, params: &[JsonValue]) -> PlatformResult<u64> {
        self.sql.exec(database, sql, params)
    }

    fn durable_instance(
        &self,
        namespace: &str,
        id_hex: &str,
        name: Option<&str>,
    ) -> PlatformResult<Arc<dyn DurableInstance>> {
        self.durables.get_or_create(namespace, id_hex, name)
    }

    fn queue_send(
        &self,
        queue: &str,
        body: Bytes,
        opts: QueueSendOptions,
    ) -> PlatformResult<QueueMessageRecord> {
        self.queues.send(queue, body, opts)
    }

    fn queue_send_batch(
        &self,
        queue: &str,
        entries: Vec<(Bytes, QueueSendOptions)>,
    ) -> PlatformResult<Vec<QueueMessageRecord>> {
        entries
            .into_iter()
            .map(|(body, opts)| self.queues.send(queue, body, opts))
            .collect()
    }

    fn queue_pull(&self, queue: &str, max: usize) -> PlatformResult<Vec<QueueMessageRecord>> {
        self.queues.pull(queue, max)
    }

    fn generate_embeddings(&self, model: &str, texts: &[String]) -> PlatformResult<Vec<Vec<f32>>> {
        self.model.embeddings(model, texts)
    }

    fn generate_text(
        &self,
        model: &str,
        prompt: &str,
        opts: &JsonValue,
    ) -> PlatformResult<String> {
        self.model.text(model, prompt, opts)
    }
}
