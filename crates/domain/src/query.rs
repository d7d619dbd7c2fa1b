//! Filter lookups in `field__column__operator` form

use std::fmt;
use std::str::FromStr;

use crate::error::{DomainError, Result};

pub const LOOKUP_SEPARATOR: &str = "__";

/// Columns of an auxiliary tag table that lookups may reach through a tag field
pub const TAG_COLUMNS: &[&str] = &[
    "id",
    "name",
    "slug",
    "count",
    "protected",
    "parent_id",
    "label",
    "level",
    "path",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOp {
    Exact,
    IExact,
    Contains,
    IContains,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    IsNull,
}

impl FromStr for LookupOp {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        let op = match s {
            "exact" => LookupOp::Exact,
            "iexact" => LookupOp::IExact,
            "contains" => LookupOp::Contains,
            "icontains" => LookupOp::IContains,
            "startswith" => LookupOp::StartsWith,
            "istartswith" => LookupOp::IStartsWith,
            "endswith" => LookupOp::EndsWith,
            "iendswith" => LookupOp::IEndsWith,
            "gt" => LookupOp::Gt,
            "gte" => LookupOp::Gte,
            "lt" => LookupOp::Lt,
            "lte" => LookupOp::Lte,
            "isnull" => LookupOp::IsNull,
            _ => return Err(DomainError::UnknownField(s.to_string())),
        };
        Ok(op)
    }
}

/// A parsed lookup key
///
/// `tags` and `tags__exact` compare a tag string, `tags__name__icontains`
/// reaches a column of the tag table, and `title__gt` is a host column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub field: String,
    pub column: Option<String>,
    pub op: LookupOp,
}

impl Lookup {
    pub fn parse(key: &str) -> Result<Self> {
        let mut parts: Vec<&str> = key.split(LOOKUP_SEPARATOR).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(DomainError::UnknownField(key.to_string()));
        }

        let op = match parts.last().map(|p| p.parse::<LookupOp>()) {
            Some(Ok(op)) if parts.len() > 1 => {
                parts.pop();
                op
            }
            _ => LookupOp::Exact,
        };

        match parts.as_slice() {
            [field] => Ok(Self {
                field: field.to_string(),
                column: None,
                op,
            }),
            [field, column] => Ok(Self {
                field: field.to_string(),
                column: Some(column.to_string()),
                op,
            }),
            _ => Err(DomainError::UnknownField(key.to_string())),
        }
    }

    /// A plain tag-string comparison on the field itself
    pub fn is_tag_string(&self) -> bool {
        self.column.is_none() && self.op == LookupOp::Exact
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.field)?;
        if let Some(column) = &self.column {
            write!(f, "{}{}", LOOKUP_SEPARATOR, column)?;
        }
        write!(f, "{}{:?}", LOOKUP_SEPARATOR, self.op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_exact() {
        let plain = Lookup::parse("tags").unwrap();
        assert_eq!(plain.field, "tags");
        assert!(plain.is_tag_string());

        let exact = Lookup::parse("tags__exact").unwrap();
        assert!(exact.is_tag_string());
        assert_eq!(exact.field, "tags");
    }

    #[test]
    fn test_parse_column_and_op() {
        let lookup = Lookup::parse("tags__name__icontains").unwrap();
        assert_eq!(lookup.column.as_deref(), Some("name"));
        assert_eq!(lookup.op, LookupOp::IContains);
        assert!(!lookup.is_tag_string());

        let lookup = Lookup::parse("tags__count").unwrap();
        assert_eq!(lookup.column.as_deref(), Some("count"));
        assert_eq!(lookup.op, LookupOp::Exact);

        let lookup = Lookup::parse("title__startswith").unwrap();
        assert_eq!(lookup.column, None);
        assert_eq!(lookup.op, LookupOp::StartsWith);
    }

    #[test]
    fn test_parse_rejects_bad_keys() {
        assert!(Lookup::parse("a__b__c__d").is_err());
        assert!(Lookup::parse("tags____name").is_err());
        assert!(Lookup::parse("").is_err());
    }

    #[test]
    fn test_field_named_like_op() {
        let lookup = Lookup::parse("contains").unwrap();
        assert_eq!(lookup.field, "contains");
        assert_eq!(lookup.op, LookupOp::Exact);
    }
}
