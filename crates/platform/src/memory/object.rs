//! Object buckets: conditional reads, ranges, listings, multipart uploads.

use crate::error::PlatformError;
use crate::types::{
    GetObjectOptions, GetObjectOutcome, ListObjectsOptions, MultipartHandle, ObjectChecksums,
    ObjectListing, ObjectRecord, PutObjectOptions, UploadedPart,
};
use crate::PlatformResult;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use chrono::Utc;
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

/// Default listing page size.
const DEFAULT_LIST_LIMIT: usize = 1000;

struct StoredObject {
    bytes: Bytes,
    record: ObjectRecord,
}

struct UploadState {
    key: String,
    parts: BTreeMap<u16, Bytes>,
    opts: PutObjectOptions,
}

#[derive(Default)]
struct BucketState {
    objects: BTreeMap<String, StoredObject>,
    uploads: HashMap<String, UploadState>,
}

#[derive(Default)]
pub(crate) struct ObjectStore {
    buckets: Mutex<HashMap<String, BucketState>>,
}

fn hex_digest<D: Digest>(bytes: &[u8]) -> String {
    let mut hasher = D::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Check one caller-supplied digest against the received bytes.
fn verify_checksum(
    algorithm: &'static str,
    expected: &Option<String>,
    computed: &str,
) -> PlatformResult<()> {
    if let Some(claimed) = expected {
        if !claimed.eq_ignore_ascii_case(computed) {
            return Err(PlatformError::ChecksumMismatch {
                algorithm,
                expected: claimed.clone(),
                computed: computed.to_owned(),
            });
        }
    }
    Ok(())
}

/// Verify every supplied checksum and return the set to record.
///
/// MD5 is always recorded for simple puts, mirroring the platform.
fn checked_checksums(bytes: &[u8], expected: &ObjectChecksums) -> PlatformResult<ObjectChecksums> {
    let md5_hex = hex_digest::<Md5>(bytes);
    verify_checksum("md5", &expected.md5, &md5_hex)?;
    let mut recorded = ObjectChecksums {
        md5: Some(md5_hex),
        ..ObjectChecksums::default()
    };
    if expected.sha1.is_some() {
        let computed = hex_digest::<Sha1>(bytes);
        verify_checksum("sha1", &expected.sha1, &computed)?;
        recorded.sha1 = Some(computed);
    }
    if expected.sha256.is_some() {
        let computed = hex_digest::<Sha256>(bytes);
        verify_checksum("sha256", &expected.sha256, &computed)?;
        recorded.sha256 = Some(computed);
    }
    if expected.sha384.is_some() {
        let computed = hex_digest::<Sha384>(bytes);
        verify_checksum("sha384", &expected.sha384, &computed)?;
        recorded.sha384 = Some(computed);
    }
    if expected.sha512.is_some() {
        let computed = hex_digest::<Sha512>(bytes);
        verify_checksum("sha512", &expected.sha512, &computed)?;
        recorded.sha512 = Some(computed);
    }
    Ok(recorded)
}

fn build_record(
    key: &str,
    bytes: &[u8],
    opts: &PutObjectOptions,
    checksums: ObjectChecksums,
) -> ObjectRecord {
    ObjectRecord {
        key: key.to_owned(),
        size: bytes.len() as u64,
        etag: hex_digest::<Sha256>(bytes),
        uploaded: Utc::now(),
        http_metadata: opts.http_metadata.clone(),
        custom_metadata: opts.custom_metadata.clone(),
        checksums,
        storage_class: opts.storage_class,
    }
}

fn encode_cursor(key: &str) -> String {
    BASE64_STANDARD.encode(key)
}

fn decode_cursor(cursor: &str) -> PlatformResult<String> {
    let raw = BASE64_STANDARD
        .decode(cursor)
        .map_err(|_| PlatformError::InvalidArgument(String::from("malformed list cursor")))?;
    String::from_utf8(raw)
        .map_err(|_| PlatformError::InvalidArgument(String::from("malformed list cursor")))
}

impl ObjectStore {
    pub(crate) fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        opts: PutObjectOptions,
    ) -> PlatformResult<ObjectRecord> {
        let checksums = checked_checksums(&bytes, &opts.checksums)?;
        let record = build_record(key, &bytes, &opts, checksums);
        let mut buckets = self.lock()?;
        buckets.entry(bucket.to_owned()).or_default().objects.insert(
            key.to_owned(),
            StoredObject {
                bytes,
                record: record.clone(),
            },
        );
        Ok(record)
    }

    pub(crate) fn get(
        &self,
        bucket: &str,
        key: &str,
        opts: GetObjectOptions,
    ) -> PlatformResult<GetObjectOutcome> {
        let buckets = self.lock()?;
        let Some(stored) = buckets.get(bucket).and_then(|state| state.objects.get(key)) else {
            return Ok(GetObjectOutcome::Missing);
        };
        if let Some(conditional) = &opts.only_if {
            if !conditional.holds_for(&stored.record) {
                return Ok(GetObjectOutcome::Precondition(stored.record.clone()));
            }
        }
        let (bytes, range) = match opts.range {
            None => (stored.bytes.clone(), None),
            Some(request) => {
                let resolved = request.resolve(stored.record.size);
                let start = resolved.offset as usize;
                let end = start + resolved.length as usize;
                (stored.bytes.slice(start..end), Some(resolved))
            }
        };
        Ok(GetObjectOutcome::Hit {
            record: stored.record.clone(),
            bytes,
            range,
        })
    }

    pub(crate) fn head(&self, bucket: &str, key: &str) -> PlatformResult<Option<ObjectRecord>> {
        let buckets = self.lock()?;
        Ok(buckets
            .get(bucket)
            .and_then(|state| state.objects.get(key))
            .map(|stored| stored.record.clone()))
    }

    pub(crate) fn delete(&self, bucket: &str, keys: &[String]) -> PlatformResult<usize> {
        let mut buckets = self.lock()?;
        let Some(state) = buckets.get_mut(bucket) else {
            return Ok(0);
        };
        let mut removed = 0;
        for key in keys {
            if state.objects.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub(crate) fn list(
        &self,
        bucket: &str,
        opts: ListObjectsOptions,
    ) -> PlatformResult<ObjectListing> {
        let limit = opts.limit.unwrap_or(DEFAULT_LIST_LIMIT).max(1);
        let prefix = opts.prefix.unwrap_or_default();
        let resume_after = match (&opts.cursor, &opts.start_after) {
            (Some(cursor), _) => Some(decode_cursor(cursor)?),
            (None, Some(key)) => Some(key.clone()),
            (None, None) => None,
        };
        let buckets = self.lock()?;
        let Some(state) = buckets.get(bucket) else {
            return Ok(ObjectListing {
                objects: Vec::new(),
                truncated: false,
                cursor: None,
                delimited_prefixes: Vec::new(),
            });
        };

        let mut objects = Vec::new();
        let mut folded: BTreeSet<String> = BTreeSet::new();
        let mut last_key: Option<String> = None;
        let mut truncated = false;
        for (key, stored) in &state.objects {
            if !key.starts_with(&prefix) {
                continue;
            }
            if resume_after
                .as_ref()
                .is_some_and(|after| key.as_str() <= after.as_str())
            {
                continue;
            }
            // Delimiter folding: a key with the delimiter past the prefix
            // collapses into a folder-like prefix instead of an object row.
            if let Some(delimiter) = &opts.delimiter {
                if let Some(position) = key[prefix.len()..].find(delimiter.as_str()) {
                    let folded_prefix =
                        key[..prefix.len() + position + delimiter.len()].to_owned();
                    if !folded.contains(&folded_prefix) {
                        if objects.len() + folded.len() >= limit {
                            truncated = true;
                            break;
                        }
                        folded.insert(folded_prefix);
                    }
                    last_key = Some(key.clone());
                    continue;
                }
            }
            if objects.len() + folded.len() >= limit {
                truncated = true;
                break;
            }
            let mut record = stored.record.clone();
            if !opts.include_http_metadata {
                record.http_metadata = Default::default();
            }
            if !opts.include_custom_metadata {
                record.custom_metadata = Default::default();
            }
            objects.push(record);
            last_key = Some(key.clone());
        }
        let cursor = if truncated {
            last_key.as_deref().map(encode_cursor)
        } else {
            None
        };
        Ok(ObjectListing {
            objects,
            truncated,
            cursor,
            delimited_prefixes: folded.into_iter().collect(),
        })
    }

    pub(crate) fn create_multipart(
        &self,
        bucket: &str,
        key: &str,
        opts: PutObjectOptions,
    ) -> PlatformResult<MultipartHandle> {
        let upload_id = crate::unique_durable_id();
        let mut buckets = self.lock()?;
        buckets.entry(bucket.to_owned()).or_default().uploads.insert(
            upload_id.clone(),
            UploadState {
                key: key.to_owned(),
                parts: BTreeMap::new(),
                opts,
            },
        );
        Ok(MultipartHandle {
            key: key.to_owned(),
            upload_id,
        })
    }

    pub(crate) fn resume_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> PlatformResult<MultipartHandle> {
        let buckets = self.lock()?;
        let known = buckets
            .get(bucket)
            .and_then(|state| state.uploads.get(upload_id))
            .is_some_and(|upload| upload.key == key);
        if !known {
            return Err(PlatformError::NoSuchUpload {
                key: key.to_owned(),
                upload_id: upload_id.to_owned(),
            });
        }
        Ok(MultipartHandle {
            key: key.to_owned(),
            upload_id: upload_id.to_owned(),
        })
    }

    pub(crate) fn upload_part(
        &self,
        bucket: &str,
        handle: &MultipartHandle,
        part_number: u16,
        bytes: Bytes,
    ) -> PlatformResult<UploadedPart> {
        let etag = hex_digest::<Md5>(&bytes);
        let mut buckets = self.lock()?;
        let upload = buckets
            .get_mut(bucket)
            .and_then(|state| state.uploads.get_mut(&handle.upload_id))
            .ok_or_else(|| PlatformError::NoSuchUpload {
                key: handle.key.clone(),
                upload_id: handle.upload_id.clone(),
            })?;
        upload.parts.insert(part_number, bytes);
        Ok(UploadedPart { part_number, etag })
    }

    pub(crate) fn abort_multipart(
        &self,
        bucket: &str,
        handle: &MultipartHandle,
    ) -> PlatformResult<()> {
        let mut buckets = self.lock()?;
        let removed = buckets
            .get_mut(bucket)
            .and_then(|state| state.uploads.remove(&handle.upload_id));
        if removed.is_none() {
            return Err(PlatformError::NoSuchUpload {
                key: handle.key.clone(),
                upload_id: handle.upload_id.clone(),
            });
        }
        Ok(())
    }

    pub(crate) fn complete_multipart(
        &self,
        bucket: &str,
        handle: &MultipartHandle,
        parts: &[UploadedPart],
    ) -> PlatformResult<ObjectRecord> {
        let mut buckets = self.lock()?;
        let state = buckets
            .get_mut(bucket)
            .ok_or_else(|| PlatformError::NoSuchUpload {
                key: handle.key.clone(),
                upload_id: handle.upload_id.clone(),
            })?;
        let upload = state.uploads.get(&handle.upload_id).ok_or_else(|| {
            PlatformError::NoSuchUpload {
                key: handle.key.clone(),
                upload_id: handle.upload_id.clone(),
            }
        })?;

        // Every referenced part must have been staged under this upload id.
        let mut ordered: Vec<&UploadedPart> = parts.iter().collect();
        ordered.sort_by_key(|part| part.part_number);
        let mut body = Vec::new();
        for part in ordered {
            let staged = upload.parts.get(&part.part_number).ok_or(
                PlatformError::UnknownPart {
                    part_number: part.part_number,
                },
            )?;
            if !part.etag.is_empty() && !part.etag.eq_ignore_ascii_case(&hex_digest::<Md5>(staged))
            {
                return Err(PlatformError::UnknownPart {
                    part_number: part.part_number,
                });
            }
            body.extend_from_slice(staged);
        }

        // Publish atomically: the object appears and the upload closes under
        // one lock acquisition.
        let upload = state
            .uploads
            .remove(&handle.upload_id)
            .ok_or_else(|| PlatformError::NoSuchUpload {
                key: handle.key.clone(),
                upload_id: handle.upload_id.clone(),
            })?;
        let bytes = Bytes::from(body);
        let record = build_record(&upload.key, &bytes, &upload.opts, ObjectChecksums::default());
        state.objects.insert(
            upload.key.clone(),
            StoredObject {
                bytes,
                record: record.clone(),
            },
        );
        Ok(record)
    }

    fn lock(&self) -> PlatformResult<std::sync::MutexGuard<'_, HashMap<String, BucketState>>> {
        self.buckets
            .lock()
            .map_err(|_| PlatformError::Storage(String::from("object lock poisoned")))
    }
}
