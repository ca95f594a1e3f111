// Executes parsed examples against a query connection and judges pass/fail.

use crate::bundle::CurriculumBundle;
use crate::connection::{QueryConnection, QueryOutcome, TransactionType};
use crate::context::{apply_context, ContextRegistry};
use crate::error::Result;
use crate::section::{ExampleExpectation, ExampleKind, ParsedExample, ParsedSection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Instant;

/// Bucket for sections that declare no context of their own.
pub const DEFAULT_CONTEXT: &str = "default";

/// Structured verdict for one example.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExampleTestResult {
    pub example_id: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_results: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_results: Option<String>,
    pub execution_time_ms: u64,
    pub query: String,
    /// `file:line` of the fence opener.
    pub source: String,
}

/// Aggregate outcome of a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub results: Vec<ExampleTestResult>,
    pub passed: usize,
    pub failed: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl TestReport {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Human-readable rendering: one line per example, failures annotated
    /// with the mismatch and a truncated query preview.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            if result.passed {
                let _ = writeln!(
                    out,
                    "PASS {} ({}) [{}ms]",
                    result.example_id, result.source, result.execution_time_ms
                );
            } else {
                let _ = writeln!(out, "FAIL {} ({})", result.example_id, result.source);
                if let Some(error) = &result.error {
                    let _ = writeln!(out, "     {error}");
                }
                if let (Some(expected), Some(actual)) =
                    (&result.expected_results, result.actual_results)
                {
                    let _ = writeln!(out, "     expected {expected}, got {actual}");
                }
                let _ = writeln!(out, "     query: {}", query_preview(&result.query));
            }
        }
        let _ = writeln!(
            out,
            "{} passed, {} failed, {} total in {}ms",
            self.passed,
            self.failed,
            self.results.len(),
            self.duration_ms
        );
        out
    }
}

/// Collapse a query to one line and cap its length for report output.
fn query_preview(query: &str) -> String {
    let flat = query.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > 80 {
        let truncated: String = flat.chars().take(77).collect();
        format!("{truncated}...")
    } else {
        flat
    }
}

/// Execute one example and judge the outcome against its declared
/// expectation. Never returns an error: connection-level faults become a
/// failed verdict so a single bad example cannot abort a batch run.
pub fn test_example(
    conn: &dyn QueryConnection,
    database: &str,
    example: &ParsedExample,
) -> ExampleTestResult {
    let mut result = ExampleTestResult {
        example_id: example.id.clone(),
        passed: false,
        error: None,
        actual_results: None,
        expected_results: None,
        execution_time_ms: 0,
        query: example.query.clone(),
        source: format!("{}:{}", example.source_file, example.line_number),
    };

    if let Err(e) = run_example_kind(conn, database, example, &mut result) {
        result.passed = false;
        result.error = Some(e.to_string());
    }

    result
}

fn run_example_kind(
    conn: &dyn QueryConnection,
    database: &str,
    example: &ParsedExample,
    result: &mut ExampleTestResult,
) -> Result<()> {
    match example.kind {
        // Display-only: renders in the docs but never runs.
        ExampleKind::Readonly => {
            result.passed = true;
        }

        ExampleKind::Schema => {
            timed_execute(conn, database, &example.query, TransactionType::Schema, result)?;
            result.passed = true;
        }

        ExampleKind::Invalid => {
            let outcome =
                timed_execute(conn, database, &example.query, TransactionType::Read, result);
            match outcome {
                Ok(_) => {
                    result.error = Some("Expected query to fail but it succeeded".to_string());
                }
                Err(e) => {
                    let message = e.to_string();
                    let expected_error = example
                        .expect
                        .as_ref()
                        .and_then(|expect| expect.error.as_deref());
                    match expected_error {
                        Some(expected)
                            if !message.to_lowercase().contains(&expected.to_lowercase()) =>
                        {
                            result.error = Some(format!(
                                "Expected error containing '{expected}' but got: {message}"
                            ));
                        }
                        _ => {
                            result.passed = true;
                        }
                    }
                }
            }
        }

        ExampleKind::Example => {
            let outcome =
                timed_execute(conn, database, &example.query, TransactionType::Read, result)?;
            let count = outcome.data.row_count();
            result.actual_results = Some(count);

            let expect = example.expect.clone().unwrap_or_default();
            check_count(count, &expect, result);
        }
    }

    Ok(())
}

/// Validate a row count against an expectation. Precedence is fixed:
/// results, then min, then max; only the first violated rule is reported.
fn check_count(count: usize, expect: &ExampleExpectation, result: &mut ExampleTestResult) {
    if expect.results == Some(true) && count == 0 {
        result.error = Some("Expected results but got none".to_string());
        result.expected_results = Some("at least 1 result".to_string());
    } else if expect.min.is_some_and(|min| count < min) {
        let min = expect.min.unwrap_or_default();
        result.error = Some(format!("Expected at least {min} results but got {count}"));
        result.expected_results = Some(format!("at least {min} results"));
    } else if expect.max.is_some_and(|max| count > max) {
        let max = expect.max.unwrap_or_default();
        result.error = Some(format!("Expected at most {max} results but got {count}"));
        result.expected_results = Some(format!("at most {max} results"));
    } else {
        result.passed = true;
    }
}

/// Run one statement, recording wall-clock time on the result whether or not
/// execution succeeds.
fn timed_execute(
    conn: &dyn QueryConnection,
    database: &str,
    query: &str,
    transaction: TransactionType,
    result: &mut ExampleTestResult,
) -> Result<QueryOutcome> {
    let started = Instant::now();
    let outcome = conn.execute(database, query, transaction);
    result.execution_time_ms = started.elapsed().as_millis() as u64;
    outcome
}

/// Run every example in the bundle, one context group at a time.
///
/// Sections are grouped by their `context` field (sections without one share
/// the `"default"` bucket). Each group gets a fresh database with its context
/// applied, runs every example in source order, then tears the database down
/// best-effort regardless of outcome. Group setup failures surface as failed
/// verdicts for every example in the group rather than aborting the batch.
pub fn run_bundle(
    conn: &dyn QueryConnection,
    bundle: &CurriculumBundle,
    registry: &ContextRegistry,
) -> TestReport {
    let started_at = Utc::now();
    let started = Instant::now();
    let mut results = Vec::new();

    let mut groups: BTreeMap<String, Vec<&ParsedSection>> = BTreeMap::new();
    for section in &bundle.sections {
        let key = section
            .context
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTEXT.to_string());
        groups.entry(key).or_default().push(section);
    }

    for (context_name, sections) in groups {
        let database = format!("docproof_{context_name}");

        let setup = setup_group_database(conn, &database, registry, &context_name);
        match setup {
            Ok(()) => {
                for section in &sections {
                    for example in &section.examples {
                        results.push(test_example(conn, &database, example));
                    }
                }
                if let Err(e) = conn.delete_database(&database) {
                    log::debug!("Teardown of '{database}' skipped: {e}");
                }
            }
            Err(e) => {
                log::warn!("Setup for context '{context_name}' failed: {e}");
                for section in &sections {
                    for example in &section.examples {
                        results.push(ExampleTestResult {
                            example_id: example.id.clone(),
                            passed: false,
                            error: Some(format!("Context setup failed: {e}")),
                            actual_results: None,
                            expected_results: None,
                            execution_time_ms: 0,
                            query: example.query.clone(),
                            source: format!("{}:{}", example.source_file, example.line_number),
                        });
                    }
                }
            }
        }
    }

    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.len() - passed;
    TestReport {
        results,
        passed,
        failed,
        started_at,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

/// Create the group's database and apply its context. Sections in the
/// default bucket run against an empty database unless a context literally
/// named "default" is registered.
fn setup_group_database(
    conn: &dyn QueryConnection,
    database: &str,
    registry: &ContextRegistry,
    context_name: &str,
) -> Result<()> {
    if let Err(e) = conn.delete_database(database) {
        log::debug!("Pre-create delete of '{database}' skipped: {e}");
    }
    conn.create_database(database)?;

    if registry.has(context_name) {
        apply_context(conn, database, registry.load(context_name)?)?;
    } else if context_name != DEFAULT_CONTEXT {
        log::warn!("Context '{context_name}' is not registered; examples run against an empty database");
    }
    Ok(())
}
