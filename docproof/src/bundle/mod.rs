// Content aggregation: walk a content directory, parse every lesson, load
// every context folder, and assemble one immutable bundle.
//
// The bundle is rebuilt wholesale when a watched file changes; nothing here
// attempts partial invalidation.

use crate::context::{ContextRegistry, LoadedContext};
use crate::error::{DocProofError, Result};
use crate::runner::DEFAULT_CONTEXT;
use crate::section::{self, parse_section, ParsedExample, ParsedSection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Reserved subdirectory holding one folder per named context.
pub const CONTEXTS_DIR: &str = "_contexts";

/// Name and description of a discovered context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMeta {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub generated_at: DateTime<Utc>,
    pub total_examples: usize,
    pub total_sections: usize,
}

/// The aggregate root: every parsed section and loaded context from one
/// discovery pass, sorted deterministically. Replaced wholesale on rebuild,
/// never patched in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurriculumBundle {
    /// Sections ordered by source file path.
    pub sections: Vec<ParsedSection>,
    /// Discovered contexts, ordered by name.
    pub contexts: Vec<ContextMeta>,
    pub loaded_contexts: HashMap<String, LoadedContext>,
    pub metadata: BundleMetadata,
}

/// An example annotated with the section that owns it.
#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedExample<'a> {
    pub section_id: &'a str,
    pub section_title: &'a str,
    pub example: &'a ParsedExample,
}

impl CurriculumBundle {
    pub fn section_by_id(&self, id: &str) -> Option<&ParsedSection> {
        self.sections.iter().find(|s| s.id == id)
    }

    /// Sections declaring the named context. The literal `"default"` name
    /// also matches sections with no context of their own.
    pub fn sections_by_context(&self, name: &str) -> Vec<&ParsedSection> {
        self.sections
            .iter()
            .filter(|s| match &s.context {
                Some(context) => context == name,
                None => name == DEFAULT_CONTEXT,
            })
            .collect()
    }

    pub fn example_by_id(&self, id: &str) -> Option<(&ParsedSection, &ParsedExample)> {
        for section in &self.sections {
            if let Some(example) = section.examples.iter().find(|e| e.id == id) {
                return Some((section, example));
            }
        }
        None
    }

    /// Every example across the bundle in section order, annotated with its
    /// owning section.
    pub fn all_examples(&self) -> Vec<AnnotatedExample<'_>> {
        self.sections
            .iter()
            .flat_map(|section| {
                section.examples.iter().map(move |example| AnnotatedExample {
                    section_id: &section.id,
                    section_title: &section.title,
                    example,
                })
            })
            .collect()
    }

    /// Register every loaded context into a registry, ready for a test run.
    pub fn register_contexts(&self, registry: &mut ContextRegistry) {
        for context in self.loaded_contexts.values() {
            registry.register(context.clone());
        }
    }
}

/// Discover and parse all content under `root` into one bundle.
///
/// Only a totally unreadable root is fatal. Unreadable individual files and
/// missing schema/seed files are logged and degrade to skipped or empty
/// content, because a lesson author may still be drafting.
pub fn build_bundle(root: &Path) -> Result<CurriculumBundle> {
    if !root.is_dir() {
        return Err(DocProofError::Content(format!(
            "Content directory does not exist: {}",
            root.display()
        )));
    }

    let pattern = format!("{}/**/*.md", root.display());
    let paths: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| DocProofError::Content(format!("Glob error: {e}")))?
        .filter_map(|r| r.ok())
        .collect();

    let mut sections = Vec::new();
    for path in &paths {
        let rel = path.strip_prefix(root).unwrap_or(path);
        // Underscore-prefixed names are reserved for contexts and metadata.
        if rel
            .components()
            .any(|c| c.as_os_str().to_string_lossy().starts_with('_'))
        {
            continue;
        }
        let label = rel.to_string_lossy().replace('\\', "/");

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Failed to read lesson {label}: {e}");
                continue;
            }
        };

        let parsed = parse_section(&text, &label);
        for warning in &parsed.warnings {
            log::warn!("{warning}");
        }
        sections.push(parsed.section);
    }

    sections.sort_by(|a, b| a.source_file.cmp(&b.source_file));

    // Duplicate ids are a build-time defect; report every occurrence.
    for (id, locations) in section::find_duplicate_example_ids(&sections) {
        let places: Vec<String> = locations
            .iter()
            .map(|l| format!("{}:{}", l.source_file, l.line_number))
            .collect();
        log::warn!("Duplicate example id '{id}' declared at {}", places.join(", "));
    }

    let loaded_contexts = discover_contexts(&root.join(CONTEXTS_DIR));
    let mut contexts: Vec<ContextMeta> = loaded_contexts
        .values()
        .map(|c| ContextMeta {
            name: c.name.clone(),
            description: c.description.clone(),
        })
        .collect();
    contexts.sort_by(|a, b| a.name.cmp(&b.name));

    let total_examples = sections.iter().map(|s| s.examples.len()).sum();
    let total_sections = sections.len();

    Ok(CurriculumBundle {
        sections,
        contexts,
        loaded_contexts,
        metadata: BundleMetadata {
            generated_at: Utc::now(),
            total_examples,
            total_sections,
        },
    })
}

/// Description metadata file recognized in a context folder.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContextConfig {
    description: String,
}

fn discover_contexts(dir: &Path) -> HashMap<String, LoadedContext> {
    let mut contexts = HashMap::new();
    if !dir.is_dir() {
        log::debug!("No context directory at {}", dir.display());
        return contexts;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Unreadable context directory {}: {e}", dir.display());
            return contexts;
        }
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        contexts.insert(name.clone(), load_context_dir(&path, name));
    }
    contexts
}

fn load_context_dir(dir: &Path, name: String) -> LoadedContext {
    let description = match std::fs::read_to_string(dir.join("context.yaml")) {
        Ok(text) => match serde_yaml::from_str::<ContextConfig>(&text) {
            Ok(config) => config.description,
            Err(e) => {
                log::warn!("Context '{name}': unparseable context.yaml: {e}");
                String::new()
            }
        },
        Err(_) => String::new(),
    };

    let schema = read_stem_file(dir, "schema", &name);
    let seed = read_stem_file(dir, "seed", &name);

    LoadedContext {
        name,
        description,
        schema,
        seed,
    }
}

/// Read the file with the given stem (any extension) from a context folder.
/// Missing or unreadable files degrade to empty text with a warning.
fn read_stem_file(dir: &Path, stem: &str, context_name: &str) -> String {
    let found = std::fs::read_dir(dir).ok().and_then(|entries| {
        entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .find(|p| p.is_file() && p.file_stem().is_some_and(|s| s.to_string_lossy() == stem))
    });

    match found {
        Some(path) => match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Context '{context_name}': unreadable {stem} file: {e}");
                String::new()
            }
        },
        None => {
            log::warn!("Context '{context_name}' has no {stem} file, using empty text");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SqliteEngine;
    use crate::runner::run_bundle;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, text).unwrap();
    }

    fn setup_content() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();

        write(
            root,
            "01-intro.md",
            "---\nid: intro\ntitle: Introduction\ncontext: people\n---\n\
             # First queries\n\n\
             ```sql:example[id=intro-select, expect=results]\nSELECT name FROM person;\n```\n",
        );
        write(
            root,
            "02-counting.md",
            "---\nid: counting\ntitle: Counting\ncontext: people\nrequires: [intro]\n---\n\
             # Counting rows\n\n\
             ```sql:example[id=count-bounds, min=2, max=2]\nSELECT * FROM person;\n```\n\n\
             ```sql:invalid[id=count-typo, error=\"syntax\"]\nSELEC COUNT(*) FROM person;\n```\n",
        );
        write(
            root,
            "guides/03-display.md",
            "---\nid: display\ntitle: Display Only\n---\n\
             # Shown, never run\n\n\
             ```sql:readonly[id=display-snippet]\nDROP TABLE person;\n```\n",
        );
        write(root, "_drafts/ignored.md", "# Not a lesson\n");
        write(root, "_notes.md", "# Also not a lesson\n");

        write(root, "_contexts/people/context.yaml", "description: Two people\n");
        write(
            root,
            "_contexts/people/schema.sql",
            "CREATE TABLE person (name TEXT NOT NULL, age INTEGER);",
        );
        write(
            root,
            "_contexts/people/seed.sql",
            "INSERT INTO person VALUES ('Alice', 34);\nINSERT INTO person VALUES ('Bob', 28);",
        );
        write(root, "_contexts/drafting/schema.sql", "CREATE TABLE empty_ctx (x);");

        tmp
    }

    #[test]
    fn test_bundle_discovery_and_order() {
        let tmp = setup_content();
        let bundle = build_bundle(tmp.path()).unwrap();

        let sources: Vec<&str> = bundle.sections.iter().map(|s| s.source_file.as_str()).collect();
        assert_eq!(sources, vec!["01-intro.md", "02-counting.md", "guides/03-display.md"]);
        assert_eq!(bundle.metadata.total_sections, 3);
        assert_eq!(bundle.metadata.total_examples, 4);
    }

    #[test]
    fn test_underscore_entries_are_skipped() {
        let tmp = setup_content();
        let bundle = build_bundle(tmp.path()).unwrap();
        assert!(bundle.section_by_id("not-a-lesson").is_none());
        assert!(!bundle.sections.iter().any(|s| s.source_file.contains("_")));
    }

    #[test]
    fn test_context_discovery() {
        let tmp = setup_content();
        let bundle = build_bundle(tmp.path()).unwrap();

        let names: Vec<&str> = bundle.contexts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["drafting", "people"]);

        let people = &bundle.loaded_contexts["people"];
        assert_eq!(people.description, "Two people");
        assert!(people.schema.contains("CREATE TABLE person"));
        assert!(people.seed.contains("Alice"));

        // Seed file still being drafted: degrades to empty, not a failure.
        let drafting = &bundle.loaded_contexts["drafting"];
        assert_eq!(drafting.seed, "");
        assert_eq!(drafting.description, "");
    }

    #[test]
    fn test_bundle_lookups() {
        let tmp = setup_content();
        let bundle = build_bundle(tmp.path()).unwrap();

        assert_eq!(bundle.section_by_id("counting").unwrap().title, "Counting");
        assert_eq!(bundle.sections_by_context("people").len(), 2);
        assert_eq!(bundle.sections_by_context("default").len(), 1);

        let (section, example) = bundle.example_by_id("count-typo").unwrap();
        assert_eq!(section.id, "counting");
        assert_eq!(example.source_file, "02-counting.md");
        assert!(bundle.example_by_id("missing").is_none());

        let all = bundle.all_examples();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].section_id, "intro");
        assert_eq!(all[0].example.id, "intro-select");
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let result = build_bundle(&tmp.path().join("nope"));
        assert!(matches!(result, Err(DocProofError::Content(_))));
    }

    #[test]
    fn test_requires_is_carried_as_advisory() {
        let tmp = setup_content();
        let bundle = build_bundle(tmp.path()).unwrap();
        assert_eq!(bundle.section_by_id("counting").unwrap().requires, vec!["intro"]);
    }

    #[test]
    fn test_full_pipeline_run() {
        let tmp = setup_content();
        let bundle = build_bundle(tmp.path()).unwrap();

        let mut registry = ContextRegistry::new();
        bundle.register_contexts(&mut registry);
        assert!(registry.has("people"));

        let engine = SqliteEngine::new();
        let report = run_bundle(&engine, &bundle, &registry);

        assert_eq!(report.results.len(), 4);
        assert!(report.all_passed(), "report:\n{}", report.render());
    }

    #[test]
    fn test_unregistered_context_surfaces_failures() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "lone.md",
            "---\nid: lone\ntitle: Lone\ncontext: ghosts\n---\n# H\n\
             ```sql:example[id=lone-q, min=1]\nSELECT * FROM phantom;\n```\n",
        );

        let bundle = build_bundle(tmp.path()).unwrap();
        let registry = ContextRegistry::new();
        let engine = SqliteEngine::new();
        let report = run_bundle(&engine, &bundle, &registry);

        // The group still runs (against an empty database) and the example
        // fails loudly instead of disappearing from the report.
        assert_eq!(report.failed, 1);
    }
}
