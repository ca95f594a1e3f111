mod parser;
mod types;

pub use parser::parse_section;
pub use types::{
    ExampleExpectation, ExampleKind, ExampleLocation, ParsedExample, ParsedHeading, ParsedSection,
    SectionParse,
};

use std::collections::HashMap;

/// Example ids in source (top-to-bottom) order, matching fence appearance.
pub fn example_ids(section: &ParsedSection) -> Vec<&str> {
    section.examples.iter().map(|e| e.id.as_str()).collect()
}

/// Find example ids declared in more than one place across a set of sections.
/// Only ids with two or more occurrences are returned, each mapped to every
/// location that declares it.
pub fn find_duplicate_example_ids(
    sections: &[ParsedSection],
) -> HashMap<String, Vec<ExampleLocation>> {
    let mut occurrences: HashMap<String, Vec<ExampleLocation>> = HashMap::new();
    for section in sections {
        for example in &section.examples {
            occurrences
                .entry(example.id.clone())
                .or_default()
                .push(ExampleLocation {
                    source_file: example.source_file.clone(),
                    line_number: example.line_number,
                });
        }
    }
    occurrences.retain(|_, locations| locations.len() >= 2);
    occurrences
}

/// Authoring warnings for a parsed section: defaulted metadata, examples
/// missing expectations, and sections with no structure.
pub fn validate_section(section: &ParsedSection) -> Vec<String> {
    let mut warnings = Vec::new();

    if section.id.is_empty() {
        warnings.push(format!("{}: section id is empty", section.source_file));
    }
    if section.title == "Untitled" {
        warnings.push(format!("{}: section has no title", section.source_file));
    }

    for example in &section.examples {
        match example.kind {
            ExampleKind::Example if example.expect.is_none() => {
                warnings.push(format!(
                    "{}:{}: example '{}' has no expectation",
                    example.source_file, example.line_number, example.id
                ));
            }
            ExampleKind::Invalid
                if example
                    .expect
                    .as_ref()
                    .and_then(|e| e.error.as_ref())
                    .is_none() =>
            {
                warnings.push(format!(
                    "{}:{}: invalid example '{}' has no expected error substring",
                    example.source_file, example.line_number, example.id
                ));
            }
            _ => {}
        }
    }

    if section.headings.is_empty() {
        warnings.push(format!("{}: section has no headings", section.source_file));
    }

    warnings
}
