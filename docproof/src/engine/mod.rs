// Bundled query engine: named in-memory SQLite databases behind the
// QueryConnection seam. Used by the CLI and the test suite; hosts with their
// own engine implement QueryConnection instead.

use crate::connection::{QueryConnection, QueryData, QueryOutcome, TransactionType};
use crate::error::{DocProofError, Result};
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// A set of named, independent in-memory SQLite databases.
#[derive(Default)]
pub struct SqliteEngine {
    databases: Mutex<HashMap<String, Connection>>,
}

impl SqliteEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Connection>>> {
        self.databases
            .lock()
            .map_err(|_| DocProofError::Other("engine lock poisoned".to_string()))
    }
}

impl QueryConnection for SqliteEngine {
    fn execute(
        &self,
        database: &str,
        query: &str,
        transaction: TransactionType,
    ) -> Result<QueryOutcome> {
        let started = Instant::now();
        let databases = self.lock()?;
        let conn = databases
            .get(database)
            .ok_or_else(|| DocProofError::DatabaseNotFound(database.to_string()))?;

        let data = match transaction {
            TransactionType::Schema => {
                conn.execute_batch(query)
                    .map_err(|e| DocProofError::Query(e.to_string()))?;
                QueryData::Done
            }
            TransactionType::Write => {
                conn.execute(query, [])
                    .map_err(|e| DocProofError::Query(e.to_string()))?;
                QueryData::Done
            }
            TransactionType::Read => QueryData::Rows {
                rows: query_rows(conn, query)?,
            },
        };

        Ok(QueryOutcome {
            data,
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn create_database(&self, name: &str) -> Result<()> {
        let mut databases = self.lock()?;
        if databases.contains_key(name) {
            return Err(DocProofError::Other(format!(
                "Database '{name}' already exists"
            )));
        }
        databases.insert(name.to_string(), Connection::open_in_memory()?);
        Ok(())
    }

    fn delete_database(&self, name: &str) -> Result<()> {
        let mut databases = self.lock()?;
        match databases.remove(name) {
            Some(_) => Ok(()),
            None => Err(DocProofError::DatabaseNotFound(name.to_string())),
        }
    }
}

/// Run a read query and collect every row as a JSON object keyed by column
/// name.
fn query_rows(conn: &Connection, query: &str) -> Result<Vec<serde_json::Value>> {
    let mut stmt = conn
        .prepare(query)
        .map_err(|e| DocProofError::Query(e.to_string()))?;

    let column_names: Vec<String> = (0..stmt.column_count())
        .map(|i| stmt.column_name(i).unwrap_or("?").to_string())
        .collect();

    let rows = stmt
        .query_map([], |row| {
            let mut obj = serde_json::Map::new();
            for (i, name) in column_names.iter().enumerate() {
                let value: rusqlite::types::Value = row.get(i)?;
                let json_value = match value {
                    rusqlite::types::Value::Null => serde_json::Value::Null,
                    rusqlite::types::Value::Integer(n) => serde_json::Value::Number(n.into()),
                    rusqlite::types::Value::Real(f) => serde_json::Number::from_f64(f)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null),
                    rusqlite::types::Value::Text(s) => serde_json::Value::String(s),
                    rusqlite::types::Value::Blob(b) => {
                        serde_json::Value::String(String::from_utf8_lossy(&b).into())
                    }
                };
                obj.insert(name.clone(), json_value);
            }
            Ok(serde_json::Value::Object(obj))
        })
        .map_err(|e| DocProofError::Query(e.to_string()))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(|e| DocProofError::Query(e.to_string()))?);
    }
    Ok(results)
}
