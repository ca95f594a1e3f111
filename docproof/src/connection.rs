// The seam between docproof and the query engine it validates against.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// How a statement should be executed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Read,
    Write,
    Schema,
}

/// The shape of data a query produced. Only `Rows` is row-shaped; every
/// other shape counts as zero rows for expectation checking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryData {
    /// One JSON object per returned row.
    Rows { rows: Vec<serde_json::Value> },
    /// A statement that completed without producing rows.
    Done,
}

impl QueryData {
    pub fn row_count(&self) -> usize {
        match self {
            QueryData::Rows { rows } => rows.len(),
            QueryData::Done => 0,
        }
    }
}

/// Result of executing one statement.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub data: QueryData,
    pub execution_time_ms: u64,
}

/// Connection contract the runner and context loader consume. Implemented by
/// the bundled sqlite engine; hosts may supply their own engine instead.
pub trait QueryConnection {
    /// Execute one statement against the named database.
    fn execute(
        &self,
        database: &str,
        query: &str,
        transaction: TransactionType,
    ) -> Result<QueryOutcome>;

    /// Create a fresh, empty database.
    fn create_database(&self, name: &str) -> Result<()>;

    /// Delete a database. Errors if it does not exist.
    fn delete_database(&self, name: &str) -> Result<()>;
}
