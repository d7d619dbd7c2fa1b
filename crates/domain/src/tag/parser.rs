//! Tag string grammar
//!
//! A tag string is a list of tag names separated by commas, and by ASCII
//! whitespace when the field allows it. Names containing a delimiter are
//! wrapped in double quotes, with `""` standing for a literal quote.

use std::borrow::Cow;
use std::iter::Peekable;
use std::str::Chars;

use crate::error::Result;
use crate::tag::options::TagOptions;

const QUOTE: char = '"';
const COMMA: char = ',';
const TREE_SEPARATOR: char = '/';

fn is_delimiter(c: char, space_delimiter: bool) -> bool {
    c == COMMA || (space_delimiter && c.is_ascii_whitespace())
}

/// Split a tag string into names without applying any field policy
///
/// Names are trimmed, empty names are dropped and exact duplicates are
/// removed, keeping the order in which names first appear.
pub fn tokenize(input: &str, space_delimiter: bool) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    let mut buffer = String::new();
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if is_delimiter(c, space_delimiter) {
            push_name(&mut names, &mut buffer);
        } else if c == QUOTE && buffer.trim().is_empty() {
            buffer.clear();
            read_quoted(&mut chars, &mut buffer);
        } else {
            buffer.push(c);
        }
    }
    push_name(&mut names, &mut buffer);
    names
}

/// Consume a quoted name up to its closing quote, or to the end of input
fn read_quoted(chars: &mut Peekable<Chars<'_>>, buffer: &mut String) {
    while let Some(c) = chars.next() {
        if c != QUOTE {
            buffer.push(c);
            continue;
        }
        if chars.peek() == Some(&QUOTE) {
            chars.next();
            buffer.push(QUOTE);
        } else {
            return;
        }
    }
}

fn push_name(names: &mut Vec<String>, buffer: &mut String) {
    let name = buffer.trim();
    if !name.is_empty() && !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
    buffer.clear();
}

/// Parse a tag string under the given field options
///
/// Fails with `MalformedTagString` if a name exceeds the field's maximum
/// length. Tree names are cleaned and `force_lowercase` is applied.
pub fn parse_tags(input: &str, options: &TagOptions) -> Result<Vec<String>> {
    let mut names: Vec<String> = Vec::new();
    for raw in tokenize(input, options.space_delimiter()) {
        if let Some(name) = options.normalize_name(&raw)? {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    Ok(names)
}

/// Quote a single name if it would otherwise be split or misread
pub fn quote_tag(name: &str, space_delimiter: bool) -> Cow<'_, str> {
    let needs_quotes = name
        .chars()
        .any(|c| c == QUOTE || is_delimiter(c, space_delimiter));
    if needs_quotes {
        Cow::Owned(format!("\"{}\"", name.replace(QUOTE, "\"\"")))
    } else {
        Cow::Borrowed(name)
    }
}

/// Render names as a canonical tag string
///
/// Names are sorted (case-sensitively, after `force_lowercase`), quoted where
/// needed and joined with `", "`.
pub fn render_tags<I, S>(names: I, options: &TagOptions) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut names: Vec<String> = names
        .into_iter()
        .map(|n| {
            if options.force_lowercase() {
                n.as_ref().to_lowercase()
            } else {
                n.as_ref().to_string()
            }
        })
        .collect();
    names.sort();
    names.dedup();

    let space_delimiter = options.space_delimiter();
    names
        .iter()
        .map(|n| quote_tag(n, space_delimiter))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split a tree name into its segments; `//` is a literal slash
pub fn split_tree_name(name: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = name.chars().peekable();

    while let Some(c) = chars.next() {
        if c != TREE_SEPARATOR {
            current.push(c);
            continue;
        }
        if chars.peek() == Some(&TREE_SEPARATOR) {
            chars.next();
            current.push(TREE_SEPARATOR);
        } else {
            parts.push(current.trim().to_string());
            current.clear();
        }
    }
    parts.push(current.trim().to_string());
    parts
}

/// Join tree segments, escaping slashes inside a segment
pub fn join_tree_name<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(|p| p.as_ref().replace(TREE_SEPARATOR, "//"))
        .collect::<Vec<_>>()
        .join("/")
}

/// Trim every segment of a tree name and drop empty ones
pub fn clean_tree_name(name: &str) -> String {
    let parts: Vec<String> = split_tree_name(name)
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();
    join_tree_name(&parts)
}
