//! Message queues with visibility delays and a 4-day default TTL.

use crate::error::PlatformError;
use crate::memory::now_ms;
use crate::types::{QueueMessageRecord, QueueSendOptions};
use crate::PlatformResult;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Default message retention.
const DEFAULT_TTL_MS: i64 = 4 * 24 * 60 * 60 * 1000;

#[derive(Default)]
pub(crate) struct QueueStore {
    queues: Mutex<HashMap<String, VecDeque<QueueMessageRecord>>>,
}

impl QueueStore {
    pub(crate) fn send(
        &self,
        queue: &str,
        body: Bytes,
        opts: QueueSendOptions,
    ) -> PlatformResult<QueueMessageRecord> {
        let content_type = opts.content_type.unwrap_or_else(|| String::from("json"));
        if !matches!(content_type.as_str(), "json" | "text" | "bytes") {
            return Err(PlatformError::InvalidArgument(format!(
                "unsupported queue content type: {content_type}"
            )));
        }
        let now = now_ms();
        let delay_ms = opts.delay_seconds.unwrap_or(0) as i64 * 1000;
        let record = QueueMessageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            queue: queue.to_owned(),
            body,
            content_type,
            attempts: 0,
            created_at_ms: now,
            visible_at_ms: now + delay_ms,
            expires_at_ms: now + DEFAULT_TTL_MS,
        };
        let mut queues = self.lock()?;
        queues
            .entry(queue.to_owned())
            .or_default()
            .push_back(record.clone());
        Ok(record)
    }

    pub(crate) fn pull(&self, queue: &str, max: usize) -> PlatformResult<Vec<QueueMessageRecord>> {
        let now = now_ms();
        let mut queues = self.lock()?;
        let Some(pending) = queues.get_mut(queue) else {
            return Ok(Vec::new());
        };
        pending.retain(|message| message.expires_at_ms > now);
        let mut delivered = Vec::new();
        let mut remaining = VecDeque::with_capacity(pending.len());
        while let Some(message) = pending.pop_front() {
            if delivered.len() < max && message.visible_at_ms <= now {
                let mut message = message;
                message.attempts += 1;
                delivered.push(message);
            } else {
                remaining.push_back(message);
            }
        }
        *pending = remaining;
        Ok(delivered)
    }

    fn lock(
        &self,
    ) -> PlatformResult<std::sync::MutexGuard<'_, HashMap<String, VecDeque<QueueMessageRecord>>>>
    {
        self.queues
            .lock()
            .map_err(|_| PlatformError::Storage(String::from("queue lock poisoned")))
    }
}
