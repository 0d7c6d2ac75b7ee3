//! Pure parsing rules for provider output.
//!
//! Three parsers cover everything the creators need: extracting the body of
//! an HTML tag, splitting `##field` marked output into name/value pairs, and
//! turning a numbered table of contents into a chapter list.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static MARK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"##[\w:-]+").expect("MARK_RE regex should compile")
});

static TOC_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,2}\.\s").expect("TOC_LINE_RE regex should compile")
});

/// Characters trimmed off a parsed field value.
const VALUE_TRIM: &[char] = &[' ', '\n', '\'', '"', ';', ':', '.', ','];

/// Return the text strictly between the first `<tag>` and the first
/// following `</tag>`, trimmed.
///
/// A missing opening tag starts the slice at the beginning of the text; a
/// missing closing tag runs it to the end.
pub fn extract_tagged(text: &str, tag: &str) -> String {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = text.find(&open).map(|i| i + open.len()).unwrap_or(0);
    let end = text.find(&close).unwrap_or(text.len());
    if start >= end {
        return String::new();
    }
    text[start..end].trim().to_string()
}

/// Parse `##name value` marked output into a field map.
///
/// A mark is a `##`-prefixed run of letters, digits, `:` and `-`. The value
/// is everything up to the next mark (or end of text), trimmed of
/// whitespace, quotes, colons, periods and commas. Duplicate keys overwrite.
pub fn parse_marked_fields(text: &str) -> HashMap<String, String> {
    let mut result = HashMap::new();
    let marks: Vec<_> = MARK_RE.find_iter(text).collect();
    for (i, mark) in marks.iter().enumerate() {
        let key = mark.as_str().trim_matches(['#', ':', '-']);
        let value_end = marks.get(i + 1).map(|m| m.start()).unwrap_or(text.len());
        let value = text[mark.end()..value_end].trim_matches(VALUE_TRIM);
        result.insert(key.to_string(), value.to_string());
    }
    result
}

/// Split a numbered table of contents into entries.
///
/// A line starting with one or two digits, a period and a space opens a new
/// entry; with `numbered = false` the numbering is stripped from the entry
/// text. Any other line is merged into the currently open entry; leading
/// continuation lines with no entry open are dropped. In debug mode the
/// result is truncated to 3 entries.
pub fn parse_toc(toc: &str, numbered: bool, debug: bool) -> Vec<String> {
    let mut entries: Vec<String> = Vec::new();
    for line in toc.lines() {
        if TOC_LINE_RE.is_match(line) {
            let entry = if numbered {
                line.to_string()
            } else {
                let dot = line.find('.').expect("matched line contains a period");
                line[dot + 1..].trim().to_string()
            };
            entries.push(entry);
        } else if let Some(last) = entries.last_mut() {
            last.push('\n');
            last.push_str(line);
        }
    }
    if debug {
        entries.truncate(3);
    }
    entries
}
