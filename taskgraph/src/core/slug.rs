//! Deterministic filenames for persisted task units.

/// Maximum length of the title part of a filename.
pub const TITLE_SLUG_MAX: usize = 48;

/// Lowercase, map non-alphanumerics to `-`, collapse runs, trim dashes.
///
/// Non-ASCII letters count as alphanumeric and are kept lowercased.
pub fn sanitize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_dash = false;
    for c in value.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Cap a slug at `max` chars without leaving a trailing dash.
fn cap(slug: &str, max: usize) -> &str {
    let end = slug
        .char_indices()
        .nth(max)
        .map_or(slug.len(), |(idx, _)| idx);
    slug[..end].trim_end_matches('-')
}

/// `<id>-<title>` base name (no extension, no collision suffix).
pub fn unit_stem(id: &str, title: &str) -> String {
    let id = sanitize(id);
    let title = sanitize(title);
    let title = cap(&title, TITLE_SLUG_MAX);
    match (id.is_empty(), title.is_empty()) {
        (false, false) => format!("{id}-{title}"),
        (false, true) => id,
        (true, false) => title.to_string(),
        (true, true) => "task".to_string(),
    }
}

/// Filename for the `attempt`-th candidate (1 = no suffix).
pub fn unit_filename(stem: &str, attempt: u32) -> String {
    if attempt <= 1 {
        format!("{stem}.md")
    } else {
        format!("{stem}-{attempt}.md")
    }
}
