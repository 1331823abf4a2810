//! SQLite-backed SQL databases, one in-memory connection per database id.

use crate::error::PlatformError;
use crate::types::SqlResultSet;
use crate::PlatformResult;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use rusqlite::types::Value as SqliteValue;
use rusqlite::Connection;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub(crate) struct SqlEngine {
    databases: Mutex<HashMap<String, Arc<Mutex<Connection>>>>,
}

/// Convert one bound parameter into a SQLite scalar.
fn param_to_sqlite(param: &JsonValue) -> PlatformResult<SqliteValue> {
    match param {
        JsonValue::Null => Ok(SqliteValue::Null),
        JsonValue::Bool(flag) => Ok(SqliteValue::Integer(i64::from(*flag))),
        JsonValue::Number(number) => {
            if let Some(integer) = number.as_i64() {
                Ok(SqliteValue::Integer(integer))
            } else {
                Ok(SqliteValue::Real(number.as_f64().unwrap_or(f64::NAN)))
            }
        }
        JsonValue::String(text) => Ok(SqliteValue::Text(text.clone())),
        JsonValue::Array(_) | JsonValue::Object(_) => Err(PlatformError::InvalidArgument(
            String::from("sql parameters must be scalars"),
        )),
    }
}

/// Convert one SQLite column value back to JSON; blobs become byte markers.
fn sqlite_to_json(value: SqliteValue) -> JsonValue {
    match value {
        SqliteValue::Null => JsonValue::Null,
        SqliteValue::Integer(integer) => json!(integer),
        SqliteValue::Real(real) => json!(real),
        SqliteValue::Text(text) => JsonValue::String(text),
        SqliteValue::Blob(raw) => json!({ "$bytes": BASE64_STANDARD.encode(raw) }),
    }
}

impl SqlEngine {
    fn connection(&self, database: &str) -> PlatformResult<Arc<Mutex<Connection>>> {
        let mut databases = self
            .databases
            .lock()
            .map_err(|_| PlatformError::Storage(String::from("sql lock poisoned")))?;
        if let Some(existing) = databases.get(database) {
            return Ok(Arc::clone(existing));
        }
        let connection = Connection::open_in_memory()?;
        let shared = Arc::new(Mutex::new(connection));
        databases.insert(database.to_owned(), Arc::clone(&shared));
        Ok(shared)
    }

    pub(crate) fn query(
        &self,
        database: &str,
        sql: &str,
        params: &[JsonValue],
    ) -> PlatformResult<SqlResultSet> {
        let bound: Vec<SqliteValue> = params.iter().map(param_to_sqlite).collect::<Result<_, _>>()?;
        let shared = self.connection(database)?;
        let guard = shared
            .lock()
            .map_err(|_| PlatformError::Storage(String::from("sql lock poisoned")))?;
        let mut statement = guard.prepare(sql)?;
        let columns: Vec<String> = statement
            .column_names()
            .into_iter()
            .map(str::to_owned)
            .collect();
        let mut rows = statement.query(rusqlite::params_from_iter(bound))?;
        let mut collected = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                let value: SqliteValue = row.get(index)?;
                values.push(sqlite_to_json(value));
            }
            collected.push(values);
        }
        Ok(SqlResultSet {
            columns,
            rows: collected,
        })
    }

    pub(crate) fn exec(
        &self,
        database: &str,
        sql: &str,
        params: &[JsonValue],
    ) -> PlatformResult<u64> {
        let shared = self.connection(database)?;
        let guard = shared
            .lock()
            .map_err(|_| PlatformError::Storage(String::from("sql lock poisoned")))?;
        // Non-parameterized statements may span multiple statements.
        if params.is_empty() {
            guard.execute_batch(sql)?;
            return Ok(guard.changes());
        }
        let bound: Vec<SqliteValue> = params.iter().map(param_to_sqlite).collect::<Result<_, _>>()?;
        let mut statement = guard.prepare(sql)?;
        if statement.column_count() > 0 {
            // A row-returning statement run for effects: drain and report
            // nothing written.
            let mut rows = statement.query(rusqlite::params_from_iter(bound))?;
            while rows.next()?.is_some() {}
            return Ok(0);
        }
        let affected = statement.execute(rusqlite::params_from_iter(bound))?;
        Ok(affected as u64)
    }
}
