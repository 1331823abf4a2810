//! SQL binding operations.

use super::{req_str, OpResult};
use outpost_platform::Platform;
use serde_json::{json, Value as JsonValue};

fn params_of(payload: &JsonValue) -> Vec<JsonValue> {
    payload
        .get("params")
        .and_then(JsonValue::as_array)
        .cloned()
        .unwrap_or_default()
}

pub(super) fn handle(
    platform: &dyn Platform,
    database: &str,
    op: &str,
    payload: &JsonValue,
) -> OpResult {
    match op {
        // Row-returning execution; backs first()/all()/raw() and batch().
        "query" => {
            let sql = req_str(payload, "sql")?;
            let result = platform
                .sql_query(database, sql, &params_of(payload))
                .map_err(|error| error.to_string())?;
            Ok(json!({ "columns": result.columns, "rows": result.rows }))
        }
        // Effect-only execution; backs run().
        "run" => {
            let sql = req_str(payload, "sql")?;
            let changes = platform
                .sql_exec(database, sql, &params_of(payload))
                .map_err(|error| error.to_string())?;
            Ok(json!({ "changes": changes }))
        }
        // Non-parameterized, possibly multi-statement execution.
        "exec" => {
            let sql = req_str(payload, "sql")?;
            let changes = platform
                .sql_exec(database, sql, &[])
                .map_err(|error| error.to_string())?;
            Ok(json!({ "changes": changes }))
        }
        _ => Err(format!("unknown d1 operation: {op}")),
    }
}
