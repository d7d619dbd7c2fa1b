use regex::Regex;

use crate::tag::parser::split_tree_name;

pub const SLUG_MAX_LENGTH: usize = 50;
/// Room kept free at the end of a truncated slug for a `_N` suffix
pub const SLUG_TRUNCATE_UNIQUE: usize = 5;
/// Slug used when nothing in a name survives slugification
pub const EMPTY_SLUG: &str = "_";

/// URL-safe form of a single name or tree label
///
/// Lowercases, transliterates to ASCII, collapses everything that is not
/// alphanumeric into `-` and trims dashes from the ends.
pub fn slugify(name: &str) -> String {
    let slug = ::slug::slugify(name);
    if slug.is_empty() {
        return EMPTY_SLUG.to_string();
    }
    slug.chars().take(SLUG_MAX_LENGTH).collect()
}

/// Slug of a full tree name: each segment slugged, then joined with `/`
pub fn tree_slug(name: &str) -> String {
    split_tree_name(name)
        .iter()
        .map(|part| slugify(part))
        .collect::<Vec<_>>()
        .join("/")
}

/// Prefix shared by a slug and every numbered variant of it
pub fn slug_stem(slug: &str) -> String {
    slug.chars()
        .take(SLUG_MAX_LENGTH - SLUG_TRUNCATE_UNIQUE)
        .collect()
}

/// Pick a slug that does not collide with any of `taken`
///
/// `taken` holds the slugs already used in the uniqueness scope that start
/// with the stem of `base`. On collision the slug becomes `<stem>_<N>`, with
/// N one more than the highest number already in use.
pub fn unique_slug(base: &str, taken: &[String]) -> String {
    if !taken.iter().any(|s| s == base) {
        return base.to_string();
    }

    let stem = slug_stem(base);
    let numbered = match Regex::new(&format!("^{}_([0-9]+)$", regex::escape(&stem))) {
        Ok(re) => re,
        Err(_) => return format!("{}_1", stem),
    };
    let highest = taken
        .iter()
        .filter_map(|s| numbered.captures(s))
        .filter_map(|caps| caps.get(1).and_then(|m| m.as_str().parse::<u64>().ok()))
        .max()
        .unwrap_or(0);

    format!("{}_{}", stem, highest + 1)
}
