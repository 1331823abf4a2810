//! Key-value namespaces with read-time expiration.

use crate::error::PlatformError;
use crate::memory::now_seconds;
use crate::types::{KvEntry, KvRecord};
use crate::PlatformResult;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Largest accepted value payload (matches the platform's 25 MiB guard).
const MAX_VALUE_BYTES: usize = 25 * 1024 * 1024;

#[derive(Default)]
pub(crate) struct KvStore {
    namespaces: Mutex<HashMap<String, BTreeMap<String, KvRecord>>>,
}

impl KvRecord {
    fn is_expired(&self, now: u64) -> bool {
        self.expiration.is_some_and(|instant| instant <= now)
    }
}

impl KvStore {
    pub(crate) fn get(&self, namespace: &str, key: &str) -> PlatformResult<Option<KvRecord>> {
        let now = now_seconds();
        let mut namespaces = self.lock()?;
        let Some(pairs) = namespaces.get_mut(namespace) else {
            return Ok(None);
        };
        if pairs.get(key).is_some_and(|record| record.is_expired(now)) {
            pairs.remove(key);
            return Ok(None);
        }
        Ok(pairs.get(key).cloned())
    }

    pub(crate) fn put(&self, namespace: &str, key: &str, record: KvRecord) -> PlatformResult<()> {
        if record.value.len() > MAX_VALUE_BYTES {
            return Err(PlatformError::ValueTooLarge {
                size: record.value.len(),
                limit: MAX_VALUE_BYTES,
            });
        }
        let mut namespaces = self.lock()?;
        namespaces
            .entry(namespace.to_owned())
            .or_default()
            .insert(key.to_owned(), record);
        Ok(())
    }

    pub(crate) fn delete(&self, namespace: &str, key: &str) -> PlatformResult<()> {
        let mut namespaces = self.lock()?;
        if let Some(pairs) = namespaces.get_mut(namespace) {
            pairs.remove(key);
        }
        Ok(())
    }

    pub(crate) fn list(
        &self,
        namespace: &str,
        prefix: Option<&str>,
        after: Option<&str>,
        limit: usize,
    ) -> PlatformResult<Vec<KvEntry>> {
        let now = now_seconds();
        let mut namespaces = self.lock()?;
        let Some(pairs) = namespaces.get_mut(namespace) else {
            return Ok(Vec::new());
        };
        pairs.retain(|_, record| !record.is_expired(now));
        let entries = pairs
            .iter()
            .filter(|(key, _)| prefix.is_none_or(|wanted| key.starts_with(wanted)))
            .filter(|(key, _)| after.is_none_or(|cursor| key.as_str() > cursor))
            .take(limit)
            .map(|(key, record)| KvEntry {
                key: key.clone(),
                record: record.clone(),
            })
            .collect();
        Ok(entries)
    }

    fn lock(
        &self,
    ) -> PlatformResult<std::sync::MutexGuard<'_, HashMap<String, BTreeMap<String, KvRecord>>>>
    {
        self.namespaces
            .lock()
            .map_err(|_| PlatformError::Storage(String::from("kv lock poisoned")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn record(value: &str) -> KvRecord {
        KvRecord {
            value: Bytes::copy_from_slice(value.as_bytes()),
            metadata: None,
            expiration: None,
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let store = KvStore::default();
        store.put("ns", "k", record("v")).unwrap();
        let fetched = store.get("ns", "k").unwrap().unwrap();
        assert_eq!(fetched.value.as_ref(), b"v");
    }

    #[test]
    fn expired_pairs_are_invisible() {
        let store = KvStore::default();
        let mut expired = record("v");
        expired.expiration = Some(1);
        store.put("ns", "k", expired).unwrap();
        assert!(store.get("ns", "k").unwrap().is_none());
        assert!(store.list("ns", None, None, 10).unwrap().is_empty());
    }

    #[test]
    fn delete_is_idempotent() {
        let store = KvStore::default();
        store.delete("ns", "missing").unwrap();
        store.put("ns", "k", record("v")).unwrap();
        store.delete("ns", "k").unwrap();
        store.delete("ns", "k").unwrap();
        assert!(store.get("ns", "k").unwrap().is_none());
    }

    #[test]
    fn list_is_lexicographic_with_prefix_and_cursor() {
        let store = KvStore::default();
        for key in ["b", "a/1", "a/2", "a/3"] {
            store.put("ns", key, record("v")).unwrap();
        }
        let page = store.list("ns", Some("a/"), None, 2).unwrap();
        let keys: Vec<_> = page.iter().map(|entry| entry.key.as_str()).collect();
        assert_eq!(keys, ["a/1", "a/2"]);
        let rest = store.list("ns", Some("a/"), Some("a/2"), 2).unwrap();
        let keys: Vec<_> = rest.iter().map(|entry| entry.key.as_str()).collect();
        assert_eq!(keys, ["a/3"]);
    }

    #[test]
    fn oversized_values_are_rejected() {
        let store = KvStore::default();
        let huge = KvRecord {
            value: Bytes::from(vec![0u8; MAX_VALUE_BYTES + 1]),
            metadata: None,
            expiration: None,
        };
        assert!(matches!(
            store.put("ns", "k", huge),
            Err(PlatformError::ValueTooLarge { .. })
        ));
    }
}
