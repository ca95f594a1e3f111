use clap::{Parser, Subcommand, ValueEnum};
use docproof::section::{find_duplicate_example_ids, validate_section};
use docproof::watcher::ContentWatcher;
use docproof::{build_bundle, run_bundle, ContextRegistry, CurriculumBundle, SqliteEngine};
use std::path::Path;
use std::process;

/// docproof CLI — validate documentation examples against a query engine
#[derive(Parser)]
#[command(name = "docproof", version, about)]
struct Cli {
    /// Path to the content directory
    #[arg(long, default_value = "docs")]
    content_dir: String,

    /// Output format for structured output
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Parse all content and report authoring warnings
    Check,

    /// Execute every example against the bundled sqlite engine
    Run,

    /// List sections, contexts, and example counts
    List {
        /// Also list each example id
        #[arg(long)]
        examples: bool,
    },

    /// Watch the content directory, re-validating on every change
    Watch {
        /// Execute examples on each change instead of only checking
        #[arg(long)]
        run: bool,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("ERROR:{e}");
            process::exit(2);
        }
    }
}

fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    let root = Path::new(&cli.content_dir);

    match cli.command {
        Command::Check => {
            let bundle = build_bundle(root)?;
            let findings = check_bundle(&bundle);
            Ok(if findings == 0 { 0 } else { 1 })
        }

        Command::Run => {
            let bundle = build_bundle(root)?;
            let report = execute_bundle(&bundle);
            print!("{}", report.render());
            Ok(if report.all_passed() { 0 } else { 1 })
        }

        Command::List { examples } => {
            let bundle = build_bundle(root)?;
            let listing = list_bundle(&bundle, examples);
            print_output(&listing, &cli.format);
            Ok(0)
        }

        Command::Watch { run } => {
            let watcher = ContentWatcher::start(root)?;
            println!("Watching {} for changes...", root.display());

            revalidate(root, run);
            while watcher.event_rx.recv().is_ok() {
                // Drain whatever else arrived in the same debounce window;
                // one rebuild covers the whole batch.
                while watcher.event_rx.try_recv().is_ok() {}
                println!("\nContent changed, re-validating...");
                revalidate(root, run);
            }
            Ok(0)
        }
    }
}

/// One check/run pass for watch mode. Errors are printed, not fatal; the
/// watch loop keeps going through broken intermediate states.
fn revalidate(root: &Path, run: bool) {
    match build_bundle(root) {
        Ok(bundle) => {
            check_bundle(&bundle);
            if run {
                let report = execute_bundle(&bundle);
                print!("{}", report.render());
            }
        }
        Err(e) => eprintln!("ERROR:{e}"),
    }
}

/// Print authoring warnings and duplicate ids. Returns the finding count.
fn check_bundle(bundle: &CurriculumBundle) -> usize {
    let mut findings = 0;

    for section in &bundle.sections {
        for warning in validate_section(section) {
            println!("WARN {warning}");
            findings += 1;
        }
    }

    for (id, locations) in find_duplicate_example_ids(&bundle.sections) {
        let places: Vec<String> = locations
            .iter()
            .map(|l| format!("{}:{}", l.source_file, l.line_number))
            .collect();
        println!("WARN duplicate example id '{id}' at {}", places.join(", "));
        findings += 1;
    }

    println!(
        "{} sections, {} examples, {} findings",
        bundle.metadata.total_sections, bundle.metadata.total_examples, findings
    );
    findings
}

fn execute_bundle(bundle: &CurriculumBundle) -> docproof::TestReport {
    let mut registry = ContextRegistry::new();
    bundle.register_contexts(&mut registry);
    let engine = SqliteEngine::new();
    run_bundle(&engine, bundle, &registry)
}

fn list_bundle(bundle: &CurriculumBundle, with_examples: bool) -> serde_json::Value {
    let sections: Vec<serde_json::Value> = bundle
        .sections
        .iter()
        .map(|section| {
            let mut entry = serde_json::json!({
                "id": section.id,
                "title": section.title,
                "source": section.source_file,
                "context": section.context,
                "requires": section.requires,
                "examples": section.examples.len(),
            });
            if with_examples {
                let ids: Vec<&str> = section.examples.iter().map(|e| e.id.as_str()).collect();
                entry["example_ids"] = serde_json::json!(ids);
            }
            entry
        })
        .collect();

    let contexts: Vec<serde_json::Value> = bundle
        .contexts
        .iter()
        .map(|c| serde_json::json!({ "name": c.name, "description": c.description }))
        .collect();

    serde_json::json!({
        "generated_at": bundle.metadata.generated_at.to_rfc3339(),
        "sections": sections,
        "contexts": contexts,
    })
}

fn print_output(value: &serde_json::Value, format: &OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(value).unwrap_or_default());
        }
    }
}
