//! Sequential scan of a task document into task records.
//!
//! Headers establish phase and story context for the task lines that follow
//! them, so the scan is a fold over lines threading a `ScanContext`. Malformed
//! task lines are collected as `ParseError`s and never stop the scan; whether
//! they abort the run is the caller's policy.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::errors::{ParseError, ParseErrorKind};
use crate::core::lexer::{Marker, Token, tokenize};
use crate::core::types::TaskRecord;

static PHASE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^phase\s+\d+\s*[:\-–—]\s*(.+)$").unwrap());
static STORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\buser\s+story\s+(\d+)\b").unwrap());
static PRIORITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\(\s*priority\s*:\s*p(\d+)\s*\)").unwrap());

/// Records parsed from a document plus every malformed line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    pub records: Vec<TaskRecord>,
    pub errors: Vec<ParseError>,
}

/// Header context carried across the scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanContext {
    pub phase: Option<String>,
    pub phase_order: u32,
    phase_story: Option<String>,
    phase_priority: Option<u8>,
    section_story: Option<String>,
    section_priority: Option<u8>,
}

impl ScanContext {
    /// Apply a markdown header of the given level (number of `#`).
    fn enter_header(mut self, level: usize, text: &str) -> Self {
        let story = STORY_RE.captures(text).map(|caps| format!("US{}", &caps[1]));
        let priority = PRIORITY_RE
            .captures(text)
            .and_then(|caps| caps[1].parse::<u8>().ok());
        match level {
            0 | 1 => {}
            2 => {
                let name = PHASE_RE
                    .captures(text)
                    .map_or(text, |caps| caps.get(1).map_or(text, |m| m.as_str()));
                let name = PRIORITY_RE.replace(name, "").trim().to_string();
                self.phase = Some(name);
                self.phase_order += 1;
                self.phase_story = story;
                self.phase_priority = priority;
                self.section_story = None;
                self.section_priority = None;
            }
            _ => {
                self.section_story = story;
                self.section_priority = priority;
            }
        }
        self
    }

    pub fn story(&self) -> Option<&str> {
        self.section_story
            .as_deref()
            .or(self.phase_story.as_deref())
    }

    pub fn priority(&self) -> Option<u8> {
        self.section_priority.or(self.phase_priority)
    }
}

/// Parse a whole document.
pub fn parse_document(input: &str) -> ParseOutcome {
    let (_, outcome) = input.lines().enumerate().fold(
        (ScanContext::default(), ParseOutcome::default()),
        |(ctx, mut outcome), (idx, raw)| {
            let line = idx + 1;
            if let Some((level, text)) = header(raw) {
                return (ctx.enter_header(level, text), outcome);
            }
            match parse_task_line(raw, line, &ctx) {
                Ok(Some(record)) => outcome.records.push(record),
                Ok(None) => {}
                Err(kind) => outcome.errors.push(ParseError {
                    line,
                    raw: raw.to_string(),
                    kind,
                }),
            }
            (ctx, outcome)
        },
    );
    outcome
}

/// Parse one line under the given context.
///
/// Returns `Ok(None)` when the line is not a task line.
pub fn parse_task_line(
    raw: &str,
    line: usize,
    ctx: &ScanContext,
) -> Result<Option<TaskRecord>, ParseErrorKind> {
    let Some(tokens) = tokenize(raw)? else {
        return Ok(None);
    };

    let mut id = None;
    let mut title = None;
    let mut seen: Vec<&'static str> = Vec::new();
    let mut record = TaskRecord::new(String::new(), String::new(), line);

    for token in tokens {
        match token {
            Token::Checkbox { .. } => {}
            Token::Id(value) => id = Some(value),
            Token::Title(value) => title = Some(value),
            Token::Marker(marker) => {
                let accumulates = matches!(marker, Marker::DependsOn(_) | Marker::External(_));
                if !accumulates && seen.contains(&marker.name()) {
                    return Err(ParseErrorKind::DuplicateMarker(marker.name().to_string()));
                }
                seen.push(marker.name());
                match marker {
                    Marker::Parallel => record.parallel = true,
                    Marker::Priority(value) => record.priority = Some(value),
                    Marker::Story(value) => record.story = Some(value),
                    Marker::Cost(value) => record.cost = Some(value),
                    Marker::DependsOn(ids) => push_unique(&mut record.dependencies, ids),
                    Marker::External(ids) => push_unique(&mut record.external_dependencies, ids),
                }
            }
        }
    }

    record.id = id.ok_or(ParseErrorKind::MissingIdentifier)?;
    let title = title.ok_or(ParseErrorKind::MissingTitle)?;
    let (title, files) = split_file_annotation(&title);
    record.title = title;
    record.files = files;
    record.phase.clone_from(&ctx.phase);
    record.phase_order = ctx.phase_order;
    if record.story.is_none() {
        record.story = ctx.story().map(str::to_string);
    }
    if record.priority.is_none() {
        record.priority = ctx.priority();
    }
    Ok(Some(record))
}

/// Markdown header level and text, if `raw` is a header.
fn header(raw: &str) -> Option<(usize, &str)> {
    let trimmed = raw.trim_start();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some((level, rest.trim()))
}

fn push_unique(target: &mut Vec<String>, ids: Vec<String>) {
    for id in ids {
        if !target.contains(&id) {
            target.push(id);
        }
    }
}

/// Split a trailing ` in <path>[, <path>...]` annotation off a title.
///
/// The annotation is only taken when every listed item looks like a path;
/// otherwise the title is returned untouched.
fn split_file_annotation(title: &str) -> (String, Vec<String>) {
    let Some(idx) = title.rfind(" in ") else {
        return (title.to_string(), Vec::new());
    };
    let head = title[..idx].trim_end();
    let tail = title[idx + " in ".len()..].trim();
    let items: Vec<String> = tail
        .split(',')
        .flat_map(|part| part.split(" and "))
        .map(|item| {
            item.trim()
                .trim_matches('`')
                .trim_end_matches(['.', ';'])
                .to_string()
        })
        .filter(|item| !item.is_empty())
        .collect();
    if head.is_empty() || items.is_empty() || !items.iter().all(|item| is_path_like(item)) {
        return (title.to_string(), Vec::new());
    }
    (head.to_string(), items)
}

fn is_path_like(item: &str) -> bool {
    !item.contains(char::is_whitespace) && (item.contains('/') || item.contains('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "\
# Tasks: Login

Intro prose that is ignored.

- [ ] T001 Create project skeleton in Cargo.toml, src/lib.rs

## Phase 1: Setup

- [ ] T002 [P] Configure linting in clippy.toml

## Phase 2: User Story 1 - Sign in (Priority: P1)

- [ ] T003 [DEP:T002] Add login form in src/ui/login.rs
- [x] T004 [US:admin] [P3] Seed admin account

### Tests for User Story 2

- [ ] T005 Cover login errors in tests/login.rs
";

    #[test]
    fn headers_set_phase_and_story_context() {
        let outcome = parse_document(DOC);
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        let records = &outcome.records;
        assert_eq!(records.len(), 5);

        assert_eq!(records[0].phase, None);
        assert_eq!(records[0].phase_order, 0);
        assert_eq!(records[0].files, vec!["Cargo.toml", "src/lib.rs"]);

        assert_eq!(records[1].phase.as_deref(), Some("Setup"));
        assert_eq!(records[1].phase_order, 1);
        assert!(records[1].parallel);

        assert_eq!(records[2].phase.as_deref(), Some("User Story 1 - Sign in"));
        assert_eq!(records[2].story.as_deref(), Some("US1"));
        assert_eq!(records[2].priority, Some(1));
        assert_eq!(records[2].dependencies, vec!["T002"]);

        assert_eq!(records[3].story.as_deref(), Some("admin"));
        assert_eq!(records[3].priority, Some(3));

        assert_eq!(records[4].story.as_deref(), Some("US2"));
        assert_eq!(records[4].line, 18);
    }

    #[test]
    fn malformed_lines_are_collected_not_fatal() {
        let doc = "- [ ] T1 ok\n- [ ] T2 [NOPE] bad\n- [ ] T3\n- [ ] T4 fine\n";
        let outcome = parse_document(doc);
        let ids: Vec<&str> = outcome.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["T1", "T4"]);
        assert_eq!(outcome.errors.len(), 2);
        assert_eq!(outcome.errors[0].line, 2);
        assert_eq!(
            outcome.errors[0].kind,
            ParseErrorKind::UnknownMarker("NOPE".to_string())
        );
        assert_eq!(outcome.errors[1].line, 3);
        assert_eq!(outcome.errors[1].kind, ParseErrorKind::MissingTitle);
        assert_eq!(outcome.errors[1].raw, "- [ ] T3");
    }

    #[test]
    fn duplicate_markers_are_rejected_but_dependencies_accumulate() {
        let ctx = ScanContext::default();
        let err = parse_task_line("- [ ] T1 [P1] [P2] x", 1, &ctx).unwrap_err();
        assert_eq!(err, ParseErrorKind::DuplicateMarker("P<n>".to_string()));

        let record = parse_task_line("- [ ] T1 [DEP:A] [DEP:B,A] x", 1, &ctx)
            .expect("parse")
            .expect("task");
        assert_eq!(record.dependencies, vec!["A", "B"]);
    }

    #[test]
    fn file_annotation_requires_path_like_items() {
        assert_eq!(
            split_file_annotation("Let users log in with SSO"),
            ("Let users log in with SSO".to_string(), Vec::new())
        );
        assert_eq!(
            split_file_annotation("Write docs in `docs/guide.md` and README.md."),
            (
                "Write docs".to_string(),
                vec!["docs/guide.md".to_string(), "README.md".to_string()]
            )
        );
    }

    #[test]
    fn unicode_paths_and_titles() {
        let ctx = ScanContext::default();
        let record = parse_task_line("- [ ] T7 Übersetze Menü in src/i18n/de_ä.ftl", 1, &ctx)
            .expect("parse")
            .expect("task");
        assert_eq!(record.title, "Übersetze Menü");
        assert_eq!(record.files, vec!["src/i18n/de_ä.ftl"]);
    }

    #[test]
    fn explicit_markers_override_header_context() {
        let doc = "## Phase 3: User Story 4 (Priority: P2)\n- [ ] T1 [US9] [P5] t\n";
        let outcome = parse_document(doc);
        let record = &outcome.records[0];
        assert_eq!(record.phase.as_deref(), Some("User Story 4"));
        assert_eq!(record.story.as_deref(), Some("US9"));
        assert_eq!(record.priority, Some(5));
    }
}
