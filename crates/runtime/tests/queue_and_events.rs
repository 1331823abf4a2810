//! Queue, scheduled, email, and tail dispatch as observed end to end.

use bytes::Bytes;
use outpost_runtime::platform::{MemoryPlatform, Platform as _, QueueMessageRecord};
use outpost_runtime::{
    BindingSpec, EmailMessage, FetchRequest, Runtime, RuntimeConfig, ScheduledEvent, TailEvent,
};
use std::sync::Arc;

fn runtime_with(bindings: &[(&str, &str)], script: &str) -> (Arc<MemoryPlatform>, Runtime) {
    let _ = env_logger::builder().is_test(true).try_init();
    let platform = Arc::new(MemoryPlatform::new());
    let config = RuntimeConfig {
        allow_outbound: false,
        ..RuntimeConfig::default()
    };
    let spec = BindingSpec::parse(bindings.iter().copied()).unwrap();
    let mut runtime = Runtime::new(platform.clone(), spec, config).unwrap();
    runtime.load_script(script, "worker.js").unwrap();
    (platform, runtime)
}

fn text_message(id: &str, body: &str) -> QueueMessageRecord {
    QueueMessageRecord {
        id: String::from(id),
        queue: String::from("jobs"),
        body: Bytes::copy_from_slice(body.as_bytes()),
        content_type: String::from("text"),
        attempts: 1,
        created_at_ms: 1_700_000_000_000,
        visible_at_ms: 1_700_000_000_000,
        expires_at_ms: 1_700_400_000_000,
    }
}

#[test]
fn explicit_ack_and_retry_are_harvested_per_message() {
    let (_, mut runtime) = runtime_with(
        &[],
        "addEventListener('queue', (event) => {\
           event.batch.messages[0].ack();\
           event.batch.messages[1].retry();\
         });",
    );
    let outcomes = runtime
        .execute_queue("jobs", vec![text_message("a", "1"), text_message("b", "2")])
        .unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].id, "a");
    assert!(outcomes[0].acked && !outcomes[0].retry);
    assert_eq!(outcomes[1].id, "b");
    assert!(!outcomes[1].acked && outcomes[1].retry);
}

#[test]
fn unsettled_messages_default_to_acked_on_success() {
    let (_, mut runtime) = runtime_with(&[], "addEventListener('queue', () => {});");
    let outcomes = runtime
        .execute_queue("jobs", vec![text_message("a", "1")])
        .unwrap();
    assert!(outcomes[0].acked);
    assert!(!outcomes[0].retry);
}

#[test]
fn missing_queue_handler_acks_the_whole_batch() {
    let (_, mut runtime) = runtime_with(&[], "globalThis.untouched = true;");
    let outcomes = runtime
        .execute_queue("jobs", vec![text_message("a", "1"), text_message("b", "2")])
        .unwrap();
    assert!(outcomes.iter().all(|outcome| outcome.acked && !outcome.retry));
}

#[test]
fn handler_exception_retries_unsettled_messages_only() {
    let (_, mut runtime) = runtime_with(
        &[],
        "addEventListener('queue', (event) => {\
           event.batch.messages[0].ack();\
           throw new Error('later messages never settle');\
         });",
    );
    let outcomes = runtime
        .execute_queue("jobs", vec![text_message("a", "1"), text_message("b", "2")])
        .unwrap();
    assert!(outcomes[0].acked && !outcomes[0].retry);
    assert!(!outcomes[1].acked && outcomes[1].retry);
}

#[test]
fn ack_all_and_retry_all_cover_the_batch() {
    let (_, mut runtime) = runtime_with(
        &[],
        "addEventListener('queue', (event) => {\
           if (event.batch.messages[0].body === 'ack-them') {\
             event.batch.ackAll();\
           } else {\
             event.batch.retryAll();\
           }\
         });",
    );
    let acked = runtime
        .execute_queue("jobs", vec![text_message("a", "ack-them")])
        .unwrap();
    assert!(acked[0].acked);
    let retried = runtime
        .execute_queue("jobs", vec![text_message("b", "retry-them")])
        .unwrap();
    assert!(retried[0].retry);
}

#[test]
fn consumer_sees_decoded_bodies_and_metadata() {
    let (platform, mut runtime) = runtime_with(
        &[("RESULTS", "kv:out")],
        "addEventListener('queue', (event) => {\
           const message = event.batch.messages[0];\
           event.waitUntil(RESULTS.put('seen', JSON.stringify({\
             id: message.id,\
             attempts: message.attempts,\
             queue: event.batch.queue,\
             body: message.body,\
             timestampIsDate: message.timestamp instanceof Date,\
           })));\
           message.ack();\
         });",
    );
    let mut message = text_message("m1", "ignored");
    message.content_type = String::from("json");
    message.body = Bytes::from_static(b"{\"op\":\"resize\",\"size\":8}");
    message.attempts = 3;
    runtime.execute_queue("jobs", vec![message]).unwrap();
    let stored = platform.kv_get("out", "seen").unwrap().unwrap();
    let tree: serde_json::Value = serde_json::from_slice(&stored.value).unwrap();
    assert_eq!(tree["id"], "m1");
    assert_eq!(tree["attempts"], 3);
    assert_eq!(tree["queue"], "jobs");
    assert_eq!(tree["body"]["op"], "resize");
    assert_eq!(tree["timestampIsDate"], true);
}

#[test]
fn producer_sends_reach_the_facade_queue() {
    let (platform, mut runtime) = runtime_with(
        &[("JOBS", "queue:jobs")],
        "addEventListener('fetch', (event) => {\
           event.respondWith((async () => {\
             await JOBS.send({ op: 'one' });\
             await JOBS.sendBatch([\
               { body: 'two', contentType: 'text' },\
               { body: new Uint8Array([3]), contentType: 'bytes' },\
             ]);\
             await JOBS.send('delayed', { contentType: 'text', delaySeconds: 3600 });\
             return new Response('sent');\
           })());\
         });",
    );
    runtime
        .execute_fetch(FetchRequest::get("https://queue.test/"))
        .unwrap();
    let visible = platform.queue_pull("jobs", 10).unwrap();
    assert_eq!(visible.len(), 3);
    assert_eq!(visible[0].content_type, "json");
    assert_eq!(visible[1].body.as_ref(), b"two");
    assert_eq!(visible[2].content_type, "bytes");
    assert_eq!(visible[2].body.as_ref(), [3u8]);
}

#[test]
fn scheduled_handlers_observe_the_trigger_and_set_no_retry() {
    let (platform, mut runtime) = runtime_with(
        &[("LOG", "kv:cron")],
        "addEventListener('scheduled', (event) => {\
           event.noRetry();\
           event.waitUntil(LOG.put('tick', event.cron + '@' + event.scheduledTime));\
         });",
    );
    let outcome = runtime
        .execute_scheduled(ScheduledEvent {
            scheduled_time_ms: 1_700_000_000_000,
            cron: String::from("*/5 * * * *"),
        })
        .unwrap();
    assert!(outcome.no_retry);
    let stored = platform.kv_get("cron", "tick").unwrap().unwrap();
    assert_eq!(stored.value.as_ref(), b"*/5 * * * *@1700000000000");
}

#[test]
fn missing_scheduled_handler_is_silent() {
    let (_, mut runtime) = runtime_with(&[], "globalThis.nothing = 1;");
    let outcome = runtime
        .execute_scheduled(ScheduledEvent {
            scheduled_time_ms: 0,
            cron: String::new(),
        })
        .unwrap();
    assert!(!outcome.no_retry);
}

#[test]
fn email_forward_and_reject_are_harvested() {
    let (_, mut runtime) = runtime_with(
        &[],
        "addEventListener('email', (event) => {\
           const message = event.message;\
           if (message.headers.get('x-spam') === 'yes') {\
             message.setReject('unwanted');\
           } else {\
             event.waitUntil(message.forward('inbox@example.test'));\
           }\
         });",
    );
    let clean = runtime
        .execute_email(EmailMessage {
            from: String::from("sender@example.test"),
            to: String::from("worker@example.test"),
            headers: vec![(String::from("subject"), String::from("hi"))],
            raw: Bytes::from_static(b"Subject: hi\r\n\r\nbody"),
        })
        .unwrap();
    assert_eq!(clean.forward_to.as_deref(), Some("inbox@example.test"));
    assert!(clean.rejected.is_none());

    let spam = runtime
        .execute_email(EmailMessage {
            from: String::from("spammer@example.test"),
            to: String::from("worker@example.test"),
            headers: vec![(String::from("x-spam"), String::from("yes"))],
            raw: Bytes::from_static(b"raw"),
        })
        .unwrap();
    assert_eq!(spam.rejected.as_deref(), Some("unwanted"));
    assert!(spam.forward_to.is_none());
}

#[test]
fn email_message_exposes_raw_bytes_and_size() {
    let (platform, mut runtime) = runtime_with(
        &[("OUT", "kv:mail")],
        "addEventListener('email', (event) => {\
           const message = event.message;\
           event.waitUntil(OUT.put('raw', JSON.stringify({\
             size: message.rawSize,\
             head: Array.from(message.raw.slice(0, 4)),\
             from: message.from,\
           })));\
         });",
    );
    runtime
        .execute_email(EmailMessage {
            from: String::from("a@example.test"),
            to: String::from("b@example.test"),
            headers: Vec::new(),
            raw: Bytes::from_static(b"MIME-Version: 1.0"),
        })
        .unwrap();
    let stored = platform.kv_get("mail", "raw").unwrap().unwrap();
    let tree: serde_json::Value = serde_json::from_slice(&stored.value).unwrap();
    assert_eq!(tree["size"], 17);
    assert_eq!(tree["head"], serde_json::json!([77, 73, 77, 69]));
    assert_eq!(tree["from"], "a@example.test");
}

#[test]
fn tail_events_are_delivered_and_completion_is_the_harvest() {
    let (platform, mut runtime) = runtime_with(
        &[("OUT", "kv:tail")],
        "addEventListener('tail', (event) => {\
           event.waitUntil(OUT.put('seen', JSON.stringify({\
             count: event.events.length,\
             outcome: event.events[0].outcome,\
             isDate: event.timestamp instanceof Date,\
           })));\
         });",
    );
    runtime
        .execute_tail(TailEvent {
            events: serde_json::json!([
                { "scriptName": "worker", "outcome": "ok", "logs": [] },
                { "scriptName": "worker", "outcome": "exception", "logs": [] },
            ]),
            timestamp_ms: 1_700_000_000_000,
        })
        .unwrap();
    let stored = platform.kv_get("tail", "seen").unwrap().unwrap();
    let tree: serde_json::Value = serde_json::from_slice(&stored.value).unwrap();
    assert_eq!(tree["count"], 2);
    assert_eq!(tree["outcome"], "ok");
    assert_eq!(tree["isDate"], true);
}

#[test]
fn missing_email_and_tail_handlers_are_silent() {
    let (_, mut runtime) = runtime_with(&[], "globalThis.nothing = 1;");
    let email = runtime
        .execute_email(EmailMessage {
            from: String::new(),
            to: String::new(),
            headers: Vec::new(),
            raw: Bytes::new(),
        })
        .unwrap();
    assert_eq!(email, Default::default());
    runtime
        .execute_tail(TailEvent {
            events: serde_json::json!([]),
            timestamp_ms: 0,
        })
        .unwrap();
}
