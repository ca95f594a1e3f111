// Named dataset contexts: schema + seed text a lesson's examples run against.

use crate::connection::{QueryConnection, TransactionType};
use crate::error::{DocProofError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named pair of schema-definition text and seed-data text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedContext {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub schema: String,
    pub seed: String,
}

/// In-memory name → context store. Constructed per run and passed by
/// reference to every consumer; test isolation comes from building a fresh
/// instance, with `clear()` available for hosts that reuse one.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    contexts: HashMap<String, LoadedContext>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a context. Re-registering the same name overwrites silently;
    /// refresh-on-change is a supported workflow.
    pub fn register(&mut self, context: LoadedContext) {
        self.contexts.insert(context.name.clone(), context);
    }

    /// Look up a context by name. A miss is a configuration mismatch the
    /// caller must fix, so the error lists what is registered.
    pub fn load(&self, name: &str) -> Result<&LoadedContext> {
        self.contexts
            .get(name)
            .ok_or_else(|| DocProofError::ContextNotFound {
                name: name.to_string(),
                available: self.names().join(", "),
            })
    }

    pub fn has(&self, name: &str) -> bool {
        self.contexts.contains_key(name)
    }

    /// Drop all entries. Used between independent runs for isolation.
    pub fn clear(&mut self) {
        self.contexts.clear();
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.contexts.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

/// Split multi-statement seed text into individually executable statements.
/// Quote-aware: `;` inside string literals does not split. A statement
/// opening with `match` absorbs following clauses until an `insert` or
/// `delete` clause completes the compound, so match-insert runs as one unit.
pub fn split_statements(text: &str) -> Vec<String> {
    let mut clauses: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in text.chars() {
        match quote {
            Some(q) => {
                current.push(ch);
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '"' | '\'' => {
                    quote = Some(ch);
                    current.push(ch);
                }
                ';' => {
                    current.push(';');
                    clauses.push(std::mem::take(&mut current));
                }
                _ => current.push(ch),
            },
        }
    }
    if !current.trim().is_empty() {
        clauses.push(current);
    }

    let mut statements: Vec<String> = Vec::new();
    let mut pending: Option<String> = None;

    for clause in clauses {
        let trimmed = clause.trim();
        if trimmed.is_empty() {
            continue;
        }
        let lowered = trimmed.to_lowercase();

        match pending.take() {
            Some(mut compound) => {
                compound.push('\n');
                compound.push_str(trimmed);
                if lowered.starts_with("insert") || lowered.starts_with("delete") {
                    statements.push(compound);
                } else {
                    pending = Some(compound);
                }
            }
            None => {
                if lowered.starts_with("match")
                    && !lowered.contains("insert")
                    && !lowered.contains("delete")
                {
                    pending = Some(trimmed.to_string());
                } else {
                    statements.push(trimmed.to_string());
                }
            }
        }
    }
    if let Some(compound) = pending {
        statements.push(compound);
    }

    statements
}

/// Apply a context to a database: schema first, then seed statements in
/// order. Seed data is best-effort scaffolding, not transactionally atomic;
/// a failed statement is logged and the rest still run. Schema failure is a
/// real error and propagates.
pub fn apply_context(
    conn: &dyn QueryConnection,
    database: &str,
    context: &LoadedContext,
) -> Result<()> {
    conn.execute(database, &context.schema, TransactionType::Schema)?;

    if !context.seed.trim().is_empty() {
        for statement in split_statements(&context.seed) {
            if let Err(e) = conn.execute(database, &statement, TransactionType::Write) {
                log::warn!(
                    "Seed statement failed for context '{}' on '{database}': {e}",
                    context.name
                );
            }
        }
    }

    Ok(())
}

/// Drop any stale database of this name, create it fresh, and apply the
/// named context from the registry. The pre-delete is best-effort; a
/// database that does not exist yet is the normal case.
pub fn create_database_with_context(
    conn: &dyn QueryConnection,
    database: &str,
    registry: &ContextRegistry,
    context_name: &str,
) -> Result<()> {
    if let Err(e) = conn.delete_database(database) {
        log::debug!("Pre-create delete of '{database}' skipped: {e}");
    }
    conn.create_database(database)?;
    let context = registry.load(context_name)?;
    apply_context(conn, database, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{QueryData, QueryOutcome};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn context(name: &str) -> LoadedContext {
        LoadedContext {
            name: name.to_string(),
            description: String::new(),
            schema: format!("CREATE TABLE {name} (id INTEGER);"),
            seed: String::new(),
        }
    }

    #[test]
    fn test_register_and_load() {
        let mut registry = ContextRegistry::new();
        registry.register(context("people"));

        assert!(registry.has("people"));
        assert_eq!(registry.load("people").unwrap().name, "people");
    }

    #[test]
    fn test_load_missing_lists_available() {
        let mut registry = ContextRegistry::new();
        registry.register(context("people"));
        registry.register(context("orders"));

        let err = registry.load("ghosts").unwrap_err().to_string();
        assert!(err.contains("ghosts"));
        assert!(err.contains("orders, people"));
    }

    #[test]
    fn test_reregister_overwrites() {
        let mut registry = ContextRegistry::new();
        registry.register(context("people"));

        let mut updated = context("people");
        updated.schema = "CREATE TABLE person (name TEXT);".to_string();
        registry.register(updated);

        assert_eq!(registry.names(), vec!["people"]);
        assert!(registry.load("people").unwrap().schema.contains("name TEXT"));
    }

    #[test]
    fn test_clear() {
        let mut registry = ContextRegistry::new();
        registry.register(context("people"));
        registry.clear();
        assert!(registry.is_empty());
        assert!(!registry.has("people"));
    }

    #[test]
    fn test_split_simple_statements() {
        let statements = split_statements("INSERT INTO a VALUES (1);\nINSERT INTO a VALUES (2);");
        assert_eq!(
            statements,
            vec!["INSERT INTO a VALUES (1);", "INSERT INTO a VALUES (2);"]
        );
    }

    #[test]
    fn test_split_respects_quotes() {
        let statements = split_statements("INSERT INTO a VALUES ('x;y');INSERT INTO a VALUES (2);");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "INSERT INTO a VALUES ('x;y');");
    }

    #[test]
    fn test_split_match_insert_compound_is_one_unit() {
        let seed = "match $p isa person, has name \"Alice\";\ninsert $p has age 30;\ninsert $q isa person;";
        let statements = split_statements(seed);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("match"));
        assert!(statements[0].contains("insert $p has age 30;"));
        assert_eq!(statements[1], "insert $q isa person;");
    }

    #[test]
    fn test_split_match_with_multiple_patterns() {
        let seed = "match $p isa person; $p has name \"Bob\"; insert $p has age 40;";
        let statements = split_statements(seed);
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn test_split_trailing_unterminated() {
        let statements = split_statements("INSERT INTO a VALUES (1)");
        assert_eq!(statements, vec!["INSERT INTO a VALUES (1)"]);
    }

    /// Connection that records every executed statement and fails on demand.
    struct RecordingConn {
        executed: Mutex<Vec<(String, TransactionType)>>,
        fail_on: Option<&'static str>,
    }

    impl RecordingConn {
        fn new(fail_on: Option<&'static str>) -> Self {
            Self {
                executed: Mutex::new(Vec::new()),
                fail_on,
            }
        }
    }

    impl QueryConnection for RecordingConn {
        fn execute(
            &self,
            _database: &str,
            query: &str,
            transaction: TransactionType,
        ) -> Result<QueryOutcome> {
            if let Some(marker) = self.fail_on {
                if query.contains(marker) {
                    return Err(DocProofError::Query(format!("bad statement: {marker}")));
                }
            }
            self.executed
                .lock()
                .unwrap()
                .push((query.to_string(), transaction));
            Ok(QueryOutcome {
                data: QueryData::Done,
                execution_time_ms: 0,
            })
        }

        fn create_database(&self, _name: &str) -> Result<()> {
            Ok(())
        }

        fn delete_database(&self, _name: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_apply_context_schema_then_seed() {
        let conn = RecordingConn::new(None);
        let ctx = LoadedContext {
            name: "people".to_string(),
            description: String::new(),
            schema: "CREATE TABLE person (name TEXT);".to_string(),
            seed: "INSERT INTO person VALUES ('Alice');\nINSERT INTO person VALUES ('Bob');"
                .to_string(),
        };

        apply_context(&conn, "db", &ctx).unwrap();

        let executed = conn.executed.lock().unwrap();
        assert_eq!(executed.len(), 3);
        assert_eq!(executed[0].1, TransactionType::Schema);
        assert_eq!(executed[1].1, TransactionType::Write);
        assert!(executed[1].0.contains("Alice"));
        assert!(executed[2].0.contains("Bob"));
    }

    #[test]
    fn test_seed_failure_does_not_stop_remaining_statements() {
        let conn = RecordingConn::new(Some("Broken"));
        let ctx = LoadedContext {
            name: "people".to_string(),
            description: String::new(),
            schema: "CREATE TABLE person (name TEXT);".to_string(),
            seed: "INSERT INTO person VALUES ('Broken');\nINSERT INTO person VALUES ('Fine');"
                .to_string(),
        };

        // Deliberate non-atomicity: the bad statement is skipped, the rest run.
        apply_context(&conn, "db", &ctx).unwrap();

        let executed = conn.executed.lock().unwrap();
        assert_eq!(executed.len(), 2);
        assert!(executed[1].0.contains("Fine"));
    }

    #[test]
    fn test_create_database_with_missing_context_fails() {
        let conn = RecordingConn::new(None);
        let registry = ContextRegistry::new();
        let result = create_database_with_context(&conn, "db", &registry, "nope");
        assert!(matches!(
            result,
            Err(DocProofError::ContextNotFound { .. })
        ));
    }
}
