// Lesson markdown parser: front matter, headings, tagged example fences.
//
// Parsing is total. Malformed input never fails the parse; it degrades to
// defaults plus collected warnings on the returned SectionParse.

use super::types::{
    ExampleExpectation, ExampleKind, ParsedExample, ParsedHeading, ParsedSection, SectionParse,
};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

/// Front-matter fields recognized in lesson files.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FrontMatter {
    id: Option<String>,
    title: Option<String>,
    context: Option<String>,
    requires: Option<Vec<String>>,
}

/// Matches a fence opener of the form ```` ```lang:type[attrs] ````.
/// Anything else that starts with three backticks is an unrelated code block.
fn fence_open_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^```\s*([A-Za-z0-9_+-]+):([a-z]+)\[(.*)\]\s*$").unwrap())
}

/// Parse one lesson file into a section.
///
/// `source_label` identifies the file (usually its path relative to the
/// content root); it becomes `source_file` on the section and its examples,
/// and the fallback `id` when front matter omits one.
pub fn parse_section(markdown: &str, source_label: &str) -> SectionParse {
    let mut warnings = Vec::new();

    let (front, body, body_start_line) = split_front_matter(markdown);

    let meta = match &front {
        Some(text) if !text.trim().is_empty() => match serde_yaml::from_str::<FrontMatter>(text) {
            Ok(m) => m,
            Err(e) => {
                warnings.push(format!(
                    "{source_label}: unparseable front matter ({e}), using defaults"
                ));
                FrontMatter::default()
            }
        },
        _ => FrontMatter::default(),
    };

    let id = match meta.id {
        Some(id) if !id.trim().is_empty() => id,
        _ => {
            warnings.push(format!(
                "{source_label}: front matter has no 'id', defaulting to file slug"
            ));
            slug::slugify(source_label)
        }
    };
    let title = match meta.title {
        Some(t) if !t.trim().is_empty() => t,
        _ => {
            warnings.push(format!(
                "{source_label}: front matter has no 'title', defaulting to \"Untitled\""
            ));
            "Untitled".to_string()
        }
    };

    let mut headings = Vec::new();
    let mut examples = Vec::new();

    let lines: Vec<&str> = body.lines().collect();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let line_number = body_start_line + i;

        if let Some(heading) = parse_heading(line, line_number) {
            headings.push(heading);
            i += 1;
            continue;
        }

        if line.trim_start().starts_with("```") {
            let opener = line.trim_start().to_string();

            // Collect the fence body up to the bare closing fence.
            let mut fence_lines: Vec<&str> = Vec::new();
            let mut j = i + 1;
            while j < lines.len() && lines[j].trim() != "```" {
                fence_lines.push(lines[j]);
                j += 1;
            }
            let terminated = j < lines.len();
            i = if terminated { j + 1 } else { j };

            let Some(caps) = fence_open_regex().captures(&opener) else {
                // Unrelated language; skipping its body also keeps `#` lines
                // inside code from being read as headings.
                continue;
            };

            if !terminated {
                warnings.push(format!("{source_label}:{line_number}: unterminated example fence"));
            }

            let type_token = &caps[2];
            let Some(kind) = ExampleKind::parse(type_token) else {
                warnings.push(format!(
                    "{source_label}:{line_number}: unknown example type '{type_token}', skipping block"
                ));
                continue;
            };

            let mut id = None;
            let mut notes = None;
            let mut expect = ExampleExpectation::default();
            for (key, value) in tokenize_attributes(&caps[3]) {
                match key.as_str() {
                    "id" => id = Some(value),
                    "notes" => notes = Some(value),
                    "expect" => match value.as_str() {
                        "results" | "success" => expect.results = Some(true),
                        other => warnings.push(format!(
                            "{source_label}:{line_number}: unrecognized expect value '{other}', dropped"
                        )),
                    },
                    "min" => match value.parse::<usize>() {
                        Ok(n) => expect.min = Some(n),
                        Err(_) => warnings.push(format!(
                            "{source_label}:{line_number}: non-numeric min '{value}', dropped"
                        )),
                    },
                    "max" => match value.parse::<usize>() {
                        Ok(n) => expect.max = Some(n),
                        Err(_) => warnings.push(format!(
                            "{source_label}:{line_number}: non-numeric max '{value}', dropped"
                        )),
                    },
                    "error" => expect.error = Some(value),
                    // Unknown attributes belong to presentation, not to us.
                    _ => {}
                }
            }

            let Some(example_id) = id.filter(|s| !s.is_empty()) else {
                warnings.push(format!(
                    "{source_label}:{line_number}: example block has no 'id' attribute, skipping"
                ));
                continue;
            };

            examples.push(ParsedExample {
                id: example_id,
                kind,
                query: trim_blank_lines(&fence_lines),
                expect: if expect.is_empty() { None } else { Some(expect) },
                notes,
                source_file: source_label.to_string(),
                line_number,
            });
            continue;
        }

        i += 1;
    }

    SectionParse {
        section: ParsedSection {
            id,
            title,
            context: meta.context,
            requires: meta.requires.unwrap_or_default(),
            headings,
            examples,
            raw_content: body,
            source_file: source_label.to_string(),
        },
        warnings,
    }
}

/// Split a leading `---`-delimited front-matter block from the body.
/// Returns (front matter text, body, 1-based line number of the body's
/// first line in the original text).
fn split_front_matter(text: &str) -> (Option<String>, String, usize) {
    let lines: Vec<&str> = text.lines().collect();
    if lines.first().map(|l| l.trim() == "---") != Some(true) {
        return (None, text.to_string(), 1);
    }
    for (i, line) in lines.iter().enumerate().skip(1) {
        if line.trim() == "---" {
            let front = lines[1..i].join("\n");
            let body = lines[i + 1..].join("\n");
            return (Some(front), body, i + 2);
        }
    }
    // An opening delimiter without a closer is not front matter.
    (None, text.to_string(), 1)
}

/// Recognize an ATX heading: 1-6 `#` characters at the start of the line,
/// whitespace, then non-empty text.
fn parse_heading(line: &str, line_number: usize) -> Option<ParsedHeading> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    let text = rest.trim();
    if text.is_empty() {
        return None;
    }
    Some(ParsedHeading {
        id: slug::slugify(text),
        text: text.to_string(),
        level: hashes as u8,
        line: line_number,
    })
}

/// Tokenize a fence attribute list: `key=value`, `key="quoted"`, or
/// `key='quoted'`, separated by commas and/or whitespace, in any order.
fn tokenize_attributes(input: &str) -> Vec<(String, String)> {
    let chars: Vec<char> = input.chars().collect();
    let mut attrs = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        while i < chars.len() && (chars[i].is_whitespace() || chars[i] == ',') {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }

        let key_start = i;
        while i < chars.len() && chars[i] != '=' && chars[i] != ',' && !chars[i].is_whitespace() {
            i += 1;
        }
        let key: String = chars[key_start..i].iter().collect();

        let mut value = String::new();
        if i < chars.len() && chars[i] == '=' {
            i += 1;
            if i < chars.len() && (chars[i] == '"' || chars[i] == '\'') {
                let quote = chars[i];
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    value.push(chars[i]);
                    i += 1;
                }
                if i < chars.len() {
                    i += 1; // closing quote
                }
            } else {
                while i < chars.len() && chars[i] != ',' && !chars[i].is_whitespace() {
                    value.push(chars[i]);
                    i += 1;
                }
            }
        }

        if !key.is_empty() {
            attrs.push((key, value));
        }
    }

    attrs
}

/// Strip leading and trailing blank lines only; internal formatting is
/// preserved byte-for-byte.
fn trim_blank_lines(lines: &[&str]) -> String {
    let Some(start) = lines.iter().position(|l| !l.trim().is_empty()) else {
        return String::new();
    };
    let end = lines.iter().rposition(|l| !l.trim().is_empty()).unwrap_or(start);
    lines[start..=end].join("\n")
}
