//! Tests for the web-platform shim as observed by scripts.

use outpost_runtime::platform::MemoryPlatform;
use outpost_runtime::{BindingSpec, FetchRequest, Runtime, RuntimeConfig};
use std::sync::Arc;

/// Dispatch a script whose fetch handler responds with `Response.json` of an
/// async probe expression and return the parsed body.
fn probe(body: &str) -> serde_json::Value {
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
    let mut runtime = Runtime::new(platform, BindingSpec::new(), config).unwrap();
    runtime.load_script(&script, "probe.js").unwrap();
    let outcome = runtime
        .execute_fetch(FetchRequest::get("https://probe.test/"))
        .unwrap();
    serde_json::from_slice(&outcome.body).unwrap_or(serde_json::Value::Null)
}

#[test]
fn headers_are_case_insensitive_and_append_joins() {
    let result = probe(
        "const headers = new Headers({ 'Content-Type': 'text/html' });\
         headers.append('Accept', 'text/plain');\
         headers.append('accept', 'application/json');\
         return {\
           type: headers.get('content-type'),\
           accept: headers.get('ACCEPT'),\
           has: headers.has('CoNtEnT-tYpE'),\
           gone: headers.get('x-missing'),\
         };",
    );
    assert_eq!(result["type"], "text/html");
    assert_eq!(result["accept"], "text/plain, application/json");
    assert_eq!(result["has"], true);
    assert_eq!(result["gone"], serde_json::Value::Null);
}

#[test]
fn headers_iterate_in_sorted_pairs() {
    let result = probe(
        "const headers = new Headers([['b', '2'], ['a', '1']]);\
         const seen = [];\
         headers.forEach((value, name) => seen.push(name + '=' + value));\
         return seen;",
    );
    assert_eq!(result, serde_json::json!(["a=1", "b=2"]));
}

#[test]
fn base64_round_trips_and_btoa_rejects_wide_chars() {
    let result = probe(
        "const encoded = btoa('hi there');\
         let wideThrew = false;\
         try { btoa('\\u{1F600}'); } catch (error) { wideThrew = true; }\
         return { encoded: encoded, decoded: atob(encoded), wideThrew: wideThrew };",
    );
    assert_eq!(result["encoded"], "aGkgdGhlcmU=");
    assert_eq!(result["decoded"], "hi there");
    assert_eq!(result["wideThrew"], true);
}

#[test]
fn text_encoder_and_decoder_round_trip_utf8() {
    let result = probe(
        "const bytes = new TextEncoder().encode('héllo ☂');\
         return { length: bytes.length, text: new TextDecoder().decode(bytes) };",
    );
    assert_eq!(result["text"], "héllo ☂");
    assert_eq!(result["length"], 10);
}

#[test]
fn crypto_uuid_and_digest_behave() {
    let result = probe(
        "const uuid = crypto.randomUUID();\
         const digest = await crypto.subtle.digest('SHA-256', new TextEncoder().encode('abc'));\
         const hex = Array.from(new Uint8Array(digest))\
           .map((byte) => byte.toString(16).padStart(2, '0'))\
           .join('');\
         const filled = crypto.getRandomValues(new Uint8Array(8));\
         return { uuid: uuid, hex: hex, filledLength: filled.length };",
    );
    let uuid = result["uuid"].as_str().unwrap();
    assert_eq!(uuid.len(), 36);
    assert_eq!(uuid.as_bytes()[14], b'4');
    // SHA-256("abc")
    assert_eq!(
        result["hex"],
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
    assert_eq!(result["filledLength"], 8);
}

#[test]
fn structured_clone_deep_copies_with_extensions() {
    let result = probe(
        "const original = {\
           when: new Date(1700000000000),\
           raw: new Uint8Array([1, 2, 3]),\
           nested: { list: [1, 'two'] },\
         };\
         const copy = structuredClone(original);\
         copy.nested.list.push('three');\
         let fnThrew = false;\
         try { structuredClone({ bad: () => 1 }); } catch (error) { fnThrew = true; }\
         return {\
           when: copy.when.getTime(),\
           isDate: copy.when instanceof Date,\
           raw: Array.from(copy.raw),\
           originalLen: original.nested.list.length,\
           copyLen: copy.nested.list.length,\
           fnThrew: fnThrew,\
         };",
    );
    assert_eq!(result["when"], 1_700_000_000_000i64);
    assert_eq!(result["isDate"], true);
    assert_eq!(result["raw"], serde_json::json!([1, 2, 3]));
    assert_eq!(result["originalLen"], 2);
    assert_eq!(result["copyLen"], 3);
    assert_eq!(result["fnThrew"], true);
}

#[test]
fn url_exposes_components_and_search_params() {
    let result = probe(
        "const url = new URL('https://user.example.com:8443/a/b?x=1&x=2&y=z#frag');\
         return {\
           protocol: url.protocol,\
           host: url.host,\
           hostname: url.hostname,\
           port: url.port,\
           pathname: url.pathname,\
           search: url.search,\
           hash: url.hash,\
           origin: url.origin,\
           x: url.searchParams.getAll('x'),\
           y: url.searchParams.get('y'),\
         };",
    );
    assert_eq!(result["protocol"], "https:");
    assert_eq!(result["host"], "user.example.com:8443");
    assert_eq!(result["hostname"], "user.example.com");
    assert_eq!(result["port"], "8443");
    assert_eq!(result["pathname"], "/a/b");
    assert_eq!(result["search"], "?x=1&x=2&y=z");
    assert_eq!(result["hash"], "#frag");
    assert_eq!(result["origin"], "https://user.example.com:8443");
    assert_eq!(result["x"], serde_json::json!(["1", "2"]));
    assert_eq!(result["y"], "z");
}

#[test]
fn invalid_urls_throw() {
    let result = probe(
        "let threw = false;\
         try { new URL('not a url'); } catch (error) { threw = true; }\
         return threw;",
    );
    assert_eq!(result, serde_json::json!(true));
}

#[test]
fn url_search_params_mutate_and_serialize() {
    let result = probe(
        "const params = new URLSearchParams('a=1&b=2');\
         params.append('a', '3');\
         params.set('b', 'replaced');\
         params.delete('missing');\
         return { text: params.toString(), a: params.getAll('a'), has: params.has('b') };",
    );
    assert_eq!(result["text"], "a=1&b=replaced&a=3");
    assert_eq!(result["a"], serde_json::json!(["1", "3"]));
    assert_eq!(result["has"], true);
}

#[test]
fn response_statics_set_the_contract_headers() {
    let result = probe(
        "const json = Response.json({ n: 1 });\
         const redirect = Response.redirect('https://elsewhere.test/', 307);\
         const defaulted = Response.redirect('https://elsewhere.test/');\
         return {\
           jsonType: json.headers.get('content-type'),\
           jsonBody: await json.text(),\
           redirectStatus: redirect.status,\
           location: redirect.headers.get('location'),\
           defaultStatus: defaulted.status,\
           okOn404: new Response('x', { status: 404 }).ok,\
         };",
    );
    assert_eq!(result["jsonType"], "application/json");
    assert_eq!(result["jsonBody"], "{\"n\":1}");
    assert_eq!(result["redirectStatus"], 307);
    assert_eq!(result["location"], "https://elsewhere.test/");
    assert_eq!(result["defaultStatus"], 302);
    assert_eq!(result["okOn404"], false);
}

#[test]
fn response_clone_yields_independent_body_views() {
    let result = probe(
        "const original = new Response('shared');\
         const copy = original.clone();\
         const first = await original.text();\
         return { first: first, second: await copy.text(), used: original.bodyUsed };",
    );
    assert_eq!(result["first"], "shared");
    assert_eq!(result["second"], "shared");
    assert_eq!(result["used"], true);
}

#[test]
fn zero_delay_timers_run_after_the_current_turn() {
    let result = probe(
        "const order = [];\
         order.push('sync-start');\
         const done = new Promise((resolve) => {\
           setTimeout(() => { order.push('timer'); resolve(); }, 0);\
           Promise.resolve().then(() => order.push('microtask'));\
         });\
         order.push('sync-end');\
         await done;\
         return order;",
    );
    assert_eq!(
        result,
        serde_json::json!(["sync-start", "sync-end", "microtask", "timer"])
    );
}

#[test]
fn intervals_repeat_until_cleared() {
    let result = probe(
        "let ticks = 0;\
         await new Promise((resolve) => {\
           const id = setInterval(() => {\
             ticks += 1;\
             if (ticks >= 3) { clearInterval(id); resolve(); }\
           }, 1);\
         });\
         return ticks;",
    );
    assert_eq!(result, serde_json::json!(3));
}

#[test]
fn performance_now_is_monotonic() {
    let result = probe(
        "const first = performance.now();\
         const second = performance.now();\
         return second >= first && first >= 0;",
    );
    assert_eq!(result, serde_json::json!(true));
}

#[test]
fn binding_results_compose_with_promise_combinators() {
    let platform = Arc::new(MemoryPlatform::new());
    let config = RuntimeConfig {
        allow_outbound: false,
        ..RuntimeConfig::default()
    };
    let bindings = BindingSpec::parse([("STORE", "kv:ns")]).unwrap();
    let mut runtime = Runtime::new(platform, bindings, config).unwrap();
    runtime
        .load_script(
            "addEventListener('fetch', (event) => {\
               event.respondWith((async () => {\
                 const put = STORE.put('a', '1');\
                 const shaped = typeof put.then === 'function'\
                   && typeof put.catch === 'function'\
                   && typeof put.finally === 'function';\
                 await put;\
                 const [a, missing] = await Promise.all([\
                   STORE.get('a'),\
                   STORE.get('missing'),\
                 ]);\
                 const raced = await Promise.race([STORE.get('a')]);\
                 return Response.json({ shaped, a, missing, raced });\
               })());\
             });",
            "worker.js",
        )
        .unwrap();
    let outcome = runtime
        .execute_fetch(FetchRequest::get("https://worker.test/"))
        .unwrap();
    let tree: serde_json::Value = serde_json::from_slice(&outcome.body).unwrap();
    assert_eq!(tree["shaped"], true);
    assert_eq!(tree["a"], "1");
    assert_eq!(tree["missing"], serde_json::Value::Null);
    assert_eq!(tree["raced"], "1");
}
