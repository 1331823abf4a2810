//! Script-observed contract of the SQL binding.

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
    let bindings = BindingSpec::parse([("DB", "d1:main")]).unwrap();
    let mut runtime = Runtime::new(platform, bindings, config).unwrap();
    runtime.load_script(&script, "d1.js").unwrap();
    let outcome = runtime
        .execute_fetch(FetchRequest::get("https://d1.test/"))
        .unwrap();
    serde_json::from_slice(&outcome.body).unwrap_or(serde_json::Value::Null)
}

#[test]
fn prepared_first_returns_a_column_or_a_row() {
    let result = run_script(
        "const column = await DB.prepare('SELECT ? AS x').bind(42).first('x');\
         const row = await DB.prepare('SELECT 1 AS a, 2 AS b').first();\
         const empty = await DB.prepare('SELECT 1 AS a WHERE 0').first();\
         return { column, row, empty };",
    );
    assert_eq!(result["column"], 42);
    assert_eq!(result["row"], serde_json::json!({ "a": 1, "b": 2 }));
    assert_eq!(result["empty"], serde_json::Value::Null);
}

#[test]
fn bind_is_chainable_and_accumulates() {
    let result = run_script(
        "return await DB.prepare('SELECT ? AS a, ? AS b').bind(1).bind('two').first();",
    );
    assert_eq!(result, serde_json::json!({ "a": 1, "b": "two" }));
}

#[test]
fn all_and_run_report_their_meta_shapes() {
    let result = run_script(
        "await DB.exec('CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)');\
         const inserted = await DB.prepare('INSERT INTO t (v) VALUES (?)').bind('a').run();\
         await DB.prepare('INSERT INTO t (v) VALUES (?)').bind('b').run();\
         const all = await DB.prepare('SELECT v FROM t ORDER BY id').all();\
         return { inserted, all };",
    );
    assert_eq!(result["inserted"]["success"], true);
    assert_eq!(result["inserted"]["meta"]["rows_written"], 1);
    assert_eq!(result["inserted"]["meta"]["changes"], 1);
    assert_eq!(result["inserted"]["meta"]["rows_read"], 0);
    assert_eq!(result["all"]["success"], true);
    assert_eq!(
        result["all"]["results"],
        serde_json::json!([{ "v": "a" }, { "v": "b" }])
    );
    assert_eq!(result["all"]["meta"]["rows_read"], 2);
    assert_eq!(result["all"]["meta"]["rows_written"], 0);
}

#[test]
fn raw_returns_column_ordered_arrays() {
    let result = run_script(
        "await DB.exec('CREATE TABLE t (a INTEGER, b TEXT)');\
         await DB.prepare('INSERT INTO t VALUES (?, ?)').bind(1, 'x').run();\
         return await DB.prepare('SELECT a, b FROM t').raw();",
    );
    assert_eq!(result, serde_json::json!([[1, "x"]]));
}

#[test]
fn exec_handles_multi_statement_scripts() {
    let result = run_script(
        "const outcome = await DB.exec(\
           'CREATE TABLE t (v TEXT); INSERT INTO t VALUES (1); INSERT INTO t VALUES (2);'\
         );\
         const count = await DB.prepare('SELECT COUNT(*) AS n FROM t').first('n');\
         return { success: outcome.success, count };",
    );
    assert_eq!(result["success"], true);
    assert_eq!(result["count"], 2);
}

#[test]
fn batch_runs_sequentially_and_aborts_on_failure() {
    let result = run_script(
        "await DB.exec('CREATE TABLE t (v TEXT)');\
         const results = await DB.batch([\
           { sql: 'INSERT INTO t VALUES (?)', params: ['a'] },\
           { sql: 'SELECT v FROM t' },\
         ]);\
         let failed = false;\
         try {\
           await DB.batch([\
             { sql: 'INSERT INTO t VALUES (?)', params: ['b'] },\
             { sql: 'NOT SQL AT ALL' },\
           ]);\
         } catch (error) {\
           failed = true;\
         }\
         const after = await DB.prepare('SELECT COUNT(*) AS n FROM t').first('n');\
         return { results, failed, after };",
    );
    assert_eq!(result["results"][0]["success"], true);
    assert_eq!(
        result["results"][1]["results"],
        serde_json::json!([{ "v": "a" }])
    );
    assert_eq!(result["failed"], true);
    // The failing batch aborted after its first statement had run.
    assert_eq!(result["after"], 2);
}

#[test]
fn sql_errors_reject_with_a_readable_message() {
    let result = run_script(
        "try {\
           await DB.prepare('SELEKT 1').all();\
           return null;\
         } catch (error) {\
           return String(error);\
         }",
    );
    let message = result.as_str().unwrap();
    assert!(message.contains("sql error"), "unexpected: {message}");
}
