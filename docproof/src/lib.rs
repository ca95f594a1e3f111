pub mod bundle;
pub mod connection;
pub mod context;
pub mod engine;
pub mod error;
pub mod runner;
pub mod section;
pub mod watcher;

pub use bundle::{build_bundle, CurriculumBundle};
pub use connection::{QueryConnection, QueryData, QueryOutcome, TransactionType};
pub use context::{apply_context, create_database_with_context, ContextRegistry, LoadedContext};
pub use engine::SqliteEngine;
pub use error::{DocProofError, Result};
pub use runner::{run_bundle, test_example, ExampleTestResult, TestReport};
pub use section::{parse_section, ParsedExample, ParsedSection, SectionParse};
