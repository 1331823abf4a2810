//! Script-observed contract of the KV binding.

use outpost_runtime::platform::MemoryPlatform;
use outpost_runtime::{BindingSpec, FetchRequest, Runtime, RuntimeConfig};
use std::sync::Arc;

fn run_script(body: &str) -> serde_json::Value {
    let script = format!(
        "addEventListener('fetch', (event) => {{\
           event.respondWith((async () => {{\
             const result = await (async () => {{ {body} }})();\
             return Response.json(result);\
           }})());\
         }});"
    );
    let platform = Arc::new(MemoryPlatform::new());
    let config = RuntimeConfig {
        allow_outbound: false,
        ..RuntimeConfig::default()
    };
    let bindings = BindingSpec::parse([("STORE", "kv:ns1")]).unwrap();
    let mut runtime = Runtime::new(platform, bindings, config).unwrap();
    runtime.load_script(&script, "kv.js").unwrap();
    let outcome = runtime
        .execute_fetch(FetchRequest::get("https://kv.test/"))
        .unwrap();
    serde_json::from_slice(&outcome.body).unwrap_or(serde_json::Value::Null)
}

#[test]
fn put_get_round_trips_with_ttl_metadata_and_listing() {
    let result = run_script(
        "await STORE.put('k', 'v', { expirationTtl: 3600, metadata: { tag: 'one' } });\
         const listing = await STORE.list();\
         const fetched = await STORE.get('k');\
         const withMeta = await STORE.getWithMetadata('k');\
         return {\
           fetched: fetched,\
           meta: withMeta.metadata,\
           name: listing.keys[0].name,\
           expiration: listing.keys[0].expiration,\
           complete: listing.list_complete,\
         };",
    );
    assert_eq!(result["fetched"], "v");
    assert_eq!(result["meta"]["tag"], "one");
    assert_eq!(result["name"], "k");
    assert_eq!(result["complete"], true);
    let expiration = result["expiration"].as_u64().unwrap();
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    assert!(expiration > now + 3500 && expiration <= now + 3700);
}

#[test]
fn absent_and_expired_keys_read_as_null() {
    let result = run_script(
        "const missing = await STORE.get('missing');\
         await STORE.put('stale', 'v', { expiration: 10 });\
         const stale = await STORE.get('stale');\
         const withMeta = await STORE.getWithMetadata('missing');\
         return { missing, stale, value: withMeta.value, metadata: withMeta.metadata };",
    );
    assert_eq!(result["missing"], serde_json::Value::Null);
    assert_eq!(result["stale"], serde_json::Value::Null);
    assert_eq!(result["value"], serde_json::Value::Null);
    assert_eq!(result["metadata"], serde_json::Value::Null);
}

#[test]
fn empty_values_decode_as_empty_text_not_null() {
    let result = run_script(
        "await STORE.put('empty', '');\
         const text = await STORE.get('empty');\
         return { text: text, isNull: text === null };",
    );
    assert_eq!(result["text"], "");
    assert_eq!(result["isNull"], false);
}

#[test]
fn type_shorthand_and_options_object_agree() {
    let result = run_script(
        "await STORE.put('doc', { answer: 42 });\
         const short = await STORE.get('doc', 'json');\
         const long = await STORE.get('doc', { type: 'json' });\
         const buffer = await STORE.get('doc', 'arrayBuffer');\
         return {\
           short: short.answer,\
           long: long.answer,\
           bytes: buffer.byteLength,\
         };",
    );
    assert_eq!(result["short"], 42);
    assert_eq!(result["long"], 42);
    assert_eq!(result["bytes"], 13); // {"answer":42}
}

#[test]
fn binary_values_survive_the_array_buffer_path() {
    let result = run_script(
        "await STORE.put('raw', new Uint8Array([0, 255, 7]));\
         const buffer = await STORE.get('raw', 'arrayBuffer');\
         return Array.from(new Uint8Array(buffer));",
    );
    assert_eq!(result, serde_json::json!([0, 255, 7]));
}

#[test]
fn delete_is_idempotent_from_scripts() {
    let result = run_script(
        "await STORE.put('k', 'v');\
         await STORE.delete('k');\
         await STORE.delete('k');\
         return await STORE.get('k');",
    );
    assert_eq!(result, serde_json::Value::Null);
}

#[test]
fn list_paginates_with_prefix_and_cursor() {
    let result = run_script(
        "for (const key of ['a/1', 'a/2', 'a/3', 'b/1']) {\
           await STORE.put(key, 'v');\
         }\
         const first = await STORE.list({ prefix: 'a/', limit: 2 });\
         const second = await STORE.list({ prefix: 'a/', limit: 2, cursor: first.cursor });\
         return {\
           firstNames: first.keys.map((key) => key.name),\
           firstComplete: first.list_complete,\
           hasCursor: typeof first.cursor === 'string',\
           secondNames: second.keys.map((key) => key.name),\
           secondComplete: second.list_complete,\
         };",
    );
    assert_eq!(result["firstNames"], serde_json::json!(["a/1", "a/2"]));
    assert_eq!(result["firstComplete"], false);
    assert_eq!(result["hasCursor"], true);
    assert_eq!(result["secondNames"], serde_json::json!(["a/3"]));
    assert_eq!(result["secondComplete"], true);
}

#[test]
fn facade_errors_reject_the_returned_promise() {
    let result = run_script(
        "let message = null;\
         try {\
           await STORE.get(undefined, 'json');\
           await STORE.put('huge', 'x'.repeat(26 * 1024 * 1024));\
         } catch (error) {\
           message = String(error);\
         }\
         return message;",
    );
    let message = result.as_str().unwrap();
    assert!(message.contains("exceeds"), "unexpected: {message}");
}
