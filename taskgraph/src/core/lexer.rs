//! Tokenizer for a single task line.
//!
//! A task line is a list item with a checkbox, an identifier, a run of
//! bracketed markers and a free-text title:
//!
//! ```text
//! - [ ] T012 [P] [US2] [DEP:T010,T011] Wire login form in src/ui/login.rs
//! ```
//!
//! The output is a tagged token stream so the parser can match exhaustively on
//! the closed set of markers.

use crate::core::errors::ParseErrorKind;

/// A recognized bracketed marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// `[P]`
    Parallel,
    /// `[P<n>]`
    Priority(u8),
    /// `[US<n>]` or `[US:<token>]`
    Story(String),
    /// `[DEP:<id>,...]`
    DependsOn(Vec<String>),
    /// `[EXT:<id>,...]`
    External(Vec<String>),
    /// `[COST:<n>]`
    Cost(u32),
}

impl Marker {
    /// Stable name used in duplicate-marker diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Marker::Parallel => "P",
            Marker::Priority(_) => "P<n>",
            Marker::Story(_) => "US",
            Marker::DependsOn(_) => "DEP",
            Marker::External(_) => "EXT",
            Marker::Cost(_) => "COST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Checkbox { checked: bool },
    Id(String),
    Marker(Marker),
    Title(String),
}

/// Tokenize `line` if it is a checkbox list item.
///
/// Returns `Ok(None)` for lines that are not task lines at all (prose, plain
/// bullets, links), so callers can skip them silently.
pub fn tokenize(line: &str) -> Result<Option<Vec<Token>>, ParseErrorKind> {
    let trimmed = line.trim_start();
    let Some(after_bullet) = trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
    else {
        return Ok(None);
    };
    let after_bullet = after_bullet.trim_start();
    let Some(inside) = after_bullet.strip_prefix('[') else {
        return Ok(None);
    };

    if let Some(close) = inside.find(']')
        && inside[close + 1..].starts_with('(')
    {
        // `[text](target)` is a Markdown link.
        return Ok(None);
    }

    let mut chars = inside.char_indices();
    let checked = match (chars.next(), chars.next()) {
        (Some((_, ' ')), Some((_, ']'))) => false,
        (Some((_, 'x' | 'X')), Some((_, ']'))) => true,
        (Some((_, ']')), _) | (Some(_), Some((_, ']'))) => {
            return Err(ParseErrorKind::MalformedCheckbox);
        }
        // Longer bracket content is a link or similar, not a checkbox.
        _ => return Ok(None),
    };
    let close = inside.find(']').map_or(inside.len(), |idx| idx + 1);
    let mut rest = inside[close..].trim_start();

    let mut tokens = vec![Token::Checkbox { checked }];

    let id_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let id = &rest[..id_end];
    if id.is_empty() || id.starts_with('[') {
        return Err(ParseErrorKind::MissingIdentifier);
    }
    if !is_valid_id(id) {
        return Err(ParseErrorKind::InvalidIdentifier(id.to_string()));
    }
    tokens.push(Token::Id(id.to_string()));
    rest = rest[id_end..].trim_start();

    while let Some(body) = rest.strip_prefix('[') {
        let Some(end) = body.find(']') else {
            return Err(ParseErrorKind::UnclosedMarker);
        };
        tokens.push(Token::Marker(parse_marker(&body[..end])?));
        rest = body[end + 1..].trim_start();
    }

    let title = rest.trim_end();
    if !title.is_empty() {
        tokens.push(Token::Title(title.to_string()));
    }
    Ok(Some(tokens))
}

/// Identifiers use `[A-Za-z0-9_.-]` and contain at least one alphanumeric.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        && id.chars().any(|c| c.is_ascii_alphanumeric())
}

fn parse_marker(inner: &str) -> Result<Marker, ParseErrorKind> {
    if inner.trim().is_empty() {
        return Err(ParseErrorKind::EmptyMarker);
    }
    let invalid = || ParseErrorKind::InvalidMarkerValue(inner.to_string());

    if inner.eq_ignore_ascii_case("p") {
        return Ok(Marker::Parallel);
    }
    if let Some(value) = strip_keyword(inner, "DEP:") {
        return parse_id_list(value).map(Marker::DependsOn).ok_or_else(invalid);
    }
    if let Some(value) = strip_keyword(inner, "EXT:") {
        return parse_id_list(value).map(Marker::External).ok_or_else(invalid);
    }
    if let Some(value) = strip_keyword(inner, "COST:") {
        return match value.trim().parse::<u32>() {
            Ok(cost) if cost > 0 => Ok(Marker::Cost(cost)),
            _ => Err(invalid()),
        };
    }
    if let Some(value) = strip_keyword(inner, "US:") {
        let value = value.trim();
        if value.is_empty() || value.contains(char::is_whitespace) {
            return Err(invalid());
        }
        return Ok(Marker::Story(value.to_string()));
    }
    if let Some(digits) = strip_keyword(inner, "US") {
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        return Ok(Marker::Story(format!("US{digits}")));
    }
    if let Some(digits) = strip_keyword(inner, "P")
        && !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
    {
        return digits.parse::<u8>().map(Marker::Priority).map_err(|_| invalid());
    }
    Err(ParseErrorKind::UnknownMarker(inner.to_string()))
}

/// Case-insensitive ASCII prefix strip that respects char boundaries.
fn strip_keyword<'a>(value: &'a str, keyword: &str) -> Option<&'a str> {
    let head = value.get(..keyword.len())?;
    if head.eq_ignore_ascii_case(keyword) {
        value.get(keyword.len()..)
    } else {
        None
    }
}

fn parse_id_list(value: &str) -> Option<Vec<String>> {
    let ids: Vec<String> = value
        .split(',')
        .map(str::trim)
        .map(str::to_string)
        .collect();
    if ids.iter().all(|id| is_valid_id(id)) {
        Some(ids)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(line: &str) -> Vec<Token> {
        tokenize(line).expect("tokenize").expect("task line")
    }

    #[test]
    fn tokenizes_markers_in_any_order() {
        let toks = tokens("- [ ] T3 [US2] [P] [P1] [DEP:T1, T2] Do the thing");
        assert_eq!(
            toks,
            vec![
                Token::Checkbox { checked: false },
                Token::Id("T3".to_string()),
                Token::Marker(Marker::Story("US2".to_string())),
                Token::Marker(Marker::Parallel),
                Token::Marker(Marker::Priority(1)),
                Token::Marker(Marker::DependsOn(vec![
                    "T1".to_string(),
                    "T2".to_string()
                ])),
                Token::Title("Do the thing".to_string()),
            ]
        );
    }

    #[test]
    fn brackets_after_title_stay_in_title() {
        let toks = tokens("* [x] T9 Handle [edge] cases");
        assert_eq!(toks[0], Token::Checkbox { checked: true });
        assert_eq!(toks[2], Token::Title("Handle [edge] cases".to_string()));
    }

    #[test]
    fn non_task_lines_are_skipped() {
        assert_eq!(tokenize("Some prose").expect("ok"), None);
        assert_eq!(tokenize("- plain bullet").expect("ok"), None);
        assert_eq!(tokenize("- [docs](https://example.com)").expect("ok"), None);
    }

    #[test]
    fn short_link_text_is_not_a_checkbox() {
        assert_eq!(tokenize("- [a](url)").expect("ok"), None);
        assert_eq!(tokenize("- [x](https://example.com) see notes").expect("ok"), None);
        assert_eq!(tokenize("* [ ](#anchor)").expect("ok"), None);
    }

    #[test]
    fn rejects_malformed_checkbox() {
        assert_eq!(
            tokenize("- [?] T1 Title"),
            Err(ParseErrorKind::MalformedCheckbox)
        );
        assert_eq!(tokenize("- [] T1 Title"), Err(ParseErrorKind::MalformedCheckbox));
    }

    #[test]
    fn rejects_unknown_and_unclosed_markers() {
        assert_eq!(
            tokenize("- [ ] T1 [WAT] Title"),
            Err(ParseErrorKind::UnknownMarker("WAT".to_string()))
        );
        assert_eq!(
            tokenize("- [ ] T1 [P Title"),
            Err(ParseErrorKind::UnclosedMarker)
        );
        assert_eq!(tokenize("- [ ] T1 [] Title"), Err(ParseErrorKind::EmptyMarker));
    }

    #[test]
    fn rejects_bad_marker_values() {
        assert_eq!(
            tokenize("- [ ] T1 [COST:0] Title"),
            Err(ParseErrorKind::InvalidMarkerValue("COST:0".to_string()))
        );
        assert_eq!(
            tokenize("- [ ] T1 [P999] Title"),
            Err(ParseErrorKind::InvalidMarkerValue("P999".to_string()))
        );
        assert_eq!(
            tokenize("- [ ] T1 [DEP:T2,,T3] Title"),
            Err(ParseErrorKind::InvalidMarkerValue("DEP:T2,,T3".to_string()))
        );
    }

    #[test]
    fn rejects_missing_or_invalid_identifier() {
        assert_eq!(
            tokenize("- [ ] [P] Title"),
            Err(ParseErrorKind::MissingIdentifier)
        );
        assert_eq!(
            tokenize("- [ ] T/1 Title"),
            Err(ParseErrorKind::InvalidIdentifier("T/1".to_string()))
        );
    }

    #[test]
    fn textual_story_reference() {
        let toks = tokens("- [ ] 42 [US:auth-flow] Add login");
        assert_eq!(toks[2], Token::Marker(Marker::Story("auth-flow".to_string())));
    }

    #[test]
    fn unicode_title_survives() {
        let toks = tokens("- [ ] T1 [P] Überprüfe «Eingabe» 🚀");
        assert_eq!(toks[3], Token::Title("Überprüfe «Eingabe» 🚀".to_string()));
    }
}
