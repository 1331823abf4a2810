//! Durable object instances: per-instance ordered storage, one alarm slot,
//! and a FIFO delivery gate for emulated fetches.

use crate::error::PlatformError;
use crate::types::DurableListOptions;
use crate::{DurableInstance, PlatformResult};
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub(crate) struct DurableRegistry {
    instances: Mutex<HashMap<(String, String), Arc<MemoryDurableInstance>>>,
}

impl DurableRegistry {
    pub(crate) fn get_or_create(
        &self,
        namespace: &str,
        id_hex: &str,
        name: Option<&str>,
    ) -> PlatformResult<Arc<dyn DurableInstance>> {
        let mut instances = self
            .instances
            .lock()
            .map_err(|_| PlatformError::Storage(String::from("durable lock poisoned")))?;
        let key = (namespace.to_owned(), id_hex.to_owned());
        let instance = instances.entry(key).or_insert_with(|| {
            Arc::new(MemoryDurableInstance {
                id_hex: id_hex.to_owned(),
                name: Mutex::new(None),
                storage: Mutex::new(BTreeMap::new()),
                alarm: Mutex::new(None),
                fetch_gate: Mutex::new(0),
            })
        });
        if let Some(given) = name {
            let mut recorded = instance
                .name
                .lock()
                .map_err(|_| PlatformError::Storage(String::from("durable lock poisoned")))?;
            if recorded.is_none() {
                *recorded = Some(given.to_owned());
            }
        }
        Ok(Arc::clone(instance) as Arc<dyn DurableInstance>)
    }
}

struct MemoryDurableInstance {
    id_hex: String,
    name: Mutex<Option<String>>,
    storage: Mutex<BTreeMap<String, Bytes>>,
    alarm: Mutex<Option<i64>>,
    // Delivery sequence counter; the lock doubles as the per-instance gate.
    fetch_gate: Mutex<u64>,
}

impl MemoryDurableInstance {
    fn storage_guard(&self) -> PlatformResult<std::sync::MutexGuard<'_, BTreeMap<String, Bytes>>> {
        self.storage
            .lock()
            .map_err(|_| PlatformError::Storage(String::from("durable lock poisoned")))
    }
}

impl DurableInstance for MemoryDurableInstance {
    fn id_hex(&self) -> String {
        self.id_hex.clone()
    }

    fn name(&self) -> Option<String> {
        self.name.lock().ok().and_then(|guard| guard.clone())
    }

    fn get(&self, key: &str) -> PlatformResult<Option<Bytes>> {
        Ok(self.storage_guard()?.get(key).cloned())
    }

    fn put(&self, key: &str, value: Bytes) -> PlatformResult<()> {
        self.storage_guard()?.insert(key.to_owned(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> PlatformResult<bool> {
        Ok(self.storage_guard()?.remove(key).is_some())
    }

    fn delete_all(&self) -> PlatformResult<()> {
        self.storage_guard()?.clear();
        Ok(())
    }

    fn list(&self, opts: DurableListOptions) -> PlatformResult<Vec<(String, Bytes)>> {
        let storage = self.storage_guard()?;
        let mut entries: Vec<(String, Bytes)> = storage
            .iter()
            .filter(|(key, _)| {
                opts.prefix
                    .as_deref()
                    .is_none_or(|prefix| key.starts_with(prefix))
            })
            .filter(|(key, _)| opts.start.as_deref().is_none_or(|start| key.as_str() >= start))
            .filter(|(key, _)| opts.end.as_deref().is_none_or(|end| key.as_str() < end))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        if opts.reverse {
            entries.reverse();
        }
        if let Some(limit) = opts.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    fn get_alarm(&self) -> PlatformResult<Option<i64>> {
        Ok(*self
            .alarm
            .lock()
            .map_err(|_| PlatformError::Storage(String::from("durable lock poisoned")))?)
    }

    fn set_alarm(&self, when_ms: i64) -> PlatformResult<()> {
        *self
            .alarm
            .lock()
            .map_err(|_| PlatformError::Storage(String::from("durable lock poisoned")))? =
            Some(when_ms);
        Ok(())
    }

    fn delete_alarm(&self) -> PlatformResult<()> {
        *self
            .alarm
            .lock()
            .map_err(|_| PlatformError::Storage(String::from("durable lock poisoned")))? = None;
        Ok(())
    }

    fn deliver_fetch(&self, method: &str, url: &str) -> PlatformResult<u64> {
        let mut gate = self
            .fetch_gate
            .lock()
            .map_err(|_| PlatformError::Storage(String::from("durable lock poisoned")))?;
        *gate += 1;
        log::debug!(
            "durable {}: delivered {} {} (seq {})",
            self.id_hex,
            method,
            url,
            *gate
        );
        Ok(*gate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(registry: &DurableRegistry, id: &str) -> Arc<dyn DurableInstance> {
        registry.get_or_create("ns", id, None).unwrap()
    }

    #[test]
    fn same_id_shares_state_distinct_ids_share_nothing() {
        let registry = DurableRegistry::default();
        let first = instance(&registry, "aa");
        let second = instance(&registry, "aa");
        let other = instance(&registry, "bb");
        first.put("n", Bytes::from_static(b"1")).unwrap();
        assert_eq!(second.get("n").unwrap().unwrap().as_ref(), b"1");
        assert!(other.get("n").unwrap().is_none());
        first.delete_all().unwrap();
        assert!(second.get("n").unwrap().is_none());
    }

    #[test]
    fn alarm_overwrites_and_clears() {
        let registry = DurableRegistry::default();
        let it = instance(&registry, "aa");
        it.set_alarm(1000).unwrap();
        it.set_alarm(2000).unwrap();
        assert_eq!(it.get_alarm().unwrap(), Some(2000));
        it.delete_alarm().unwrap();
        assert_eq!(it.get_alarm().unwrap(), None);
    }

    #[test]
    fn list_honors_range_and_reverse() {
        let registry = DurableRegistry::default();
        let it = instance(&registry, "aa");
        for key in ["a", "b", "c", "d"] {
            it.put(key, Bytes::from_static(b"v")).unwrap();
        }
        let window = it
            .list(DurableListOptions {
                start: Some(String::from("b")),
                end: Some(String::from("d")),
                ..DurableListOptions::default()
            })
            .unwrap();
        let keys: Vec<_> = window.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, ["b", "c"]);
        let reversed = it
            .list(DurableListOptions {
                reverse: true,
                limit: Some(2),
                ..DurableListOptions::default()
            })
            .unwrap();
        let keys: Vec<_> = reversed.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, ["d", "c"]);
    }

    #[test]
    fn fetch_deliveries_are_sequenced() {
        let registry = DurableRegistry::default();
        let it = instance(&registry, "aa");
        assert_eq!(it.deliver_fetch("GET", "https://do/a").unwrap(), 1);
        assert_eq!(it.deliver_fetch("GET", "https://do/b").unwrap(), 2);
    }

    #[test]
    fn name_is_recorded_once() {
        let registry = DurableRegistry::default();
        registry.get_or_create("ns", "aa", Some("first")).unwrap();
        let again = registry.get_or_create("ns", "aa", Some("second")).unwrap();
        assert_eq!(again.name().as_deref(), Some("first"));
    }
}
