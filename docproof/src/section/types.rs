use serde::{Deserialize, Serialize};

/// One markdown heading with a stable slug id and its source position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedHeading {
    pub id: String,
    pub text: String,
    /// Number of leading `#` characters, 1-6.
    pub level: u8,
    /// 1-based source line.
    pub line: usize,
}

/// What a tagged fence block is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExampleKind {
    /// Runs as a read query; row count is checked against the expectation.
    Example,
    /// Must fail when executed; optionally matched against an error substring.
    Invalid,
    /// Runs as a schema mutation; passes unless execution errors.
    Schema,
    /// Display-only snippet, never executed.
    Readonly,
}

impl ExampleKind {
    /// Parse a fence type token. Returns None for unrecognized tokens.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "example" => Some(ExampleKind::Example),
            "invalid" => Some(ExampleKind::Invalid),
            "schema" => Some(ExampleKind::Schema),
            "readonly" => Some(ExampleKind::Readonly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExampleKind::Example => "example",
            ExampleKind::Invalid => "invalid",
            ExampleKind::Schema => "schema",
            ExampleKind::Readonly => "readonly",
        }
    }
}

/// Declarative pass/fail criteria attached to an example.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleExpectation {
    /// `expect=results` or `expect=success`: at least one row must come back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<usize>,
    /// Case-insensitive substring the raised error message must contain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExampleExpectation {
    pub fn is_empty(&self) -> bool {
        self.results.is_none() && self.min.is_none() && self.max.is_none() && self.error.is_none()
    }
}

/// One runnable (or display-only) code block extracted from a lesson.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedExample {
    pub id: String,
    pub kind: ExampleKind,
    /// Fence body with leading/trailing blank lines stripped; internal
    /// formatting preserved verbatim.
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expect: Option<ExampleExpectation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub source_file: String,
    /// 1-based line of the fence opener.
    pub line_number: usize,
}

/// One parsed lesson file: front-matter metadata, headings, and examples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedSection {
    pub id: String,
    pub title: String,
    /// Name of the dataset context this section's examples run against.
    pub context: Option<String>,
    /// Prerequisite section ids, advisory ordering only.
    #[serde(default)]
    pub requires: Vec<String>,
    pub headings: Vec<ParsedHeading>,
    pub examples: Vec<ParsedExample>,
    /// Body with only the front-matter block removed. Used by presentation
    /// layers, not by the test runner.
    pub raw_content: String,
    pub source_file: String,
}

/// A parsed section plus the authoring warnings collected along the way.
/// Parsing never fails; malformed input degrades to warnings here.
#[derive(Debug, Clone)]
pub struct SectionParse {
    pub section: ParsedSection,
    pub warnings: Vec<String>,
}

/// Where an example id occurs, for duplicate reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleLocation {
    pub source_file: String,
    pub line_number: usize,
}
