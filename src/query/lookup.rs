//! Field Lookup Translation
//!
//! Converts `field__lookup` keys and their values into Solr query
//! strings. The output templates are part of the wire contract and are
//! reproduced exactly; in particular the `__in`-with-missing form keeps
//! its double-negation shape (`-(field:[* TO *] OR -field:(a OR b))`),
//! which relies on Solr's handling of purely negative clauses.

use std::fmt;

/// Matches any value for a field.
pub const ANY_VALUE: &str = "[* TO *]";
/// Separator between a field name and a lookup suffix. Field names must
/// not contain it.
pub const LOOKUP_SEP: &str = "__";

// ============================================================================
// Values
// ============================================================================

/// A scalar value in a filter or search lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum SolrValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl SolrValue {
    /// Null or the empty string: the sentinels an `in` list uses to
    /// request documents with no value for the field.
    pub fn is_missing_sentinel(&self) -> bool {
        matches!(self, SolrValue::Null) || matches!(self, SolrValue::Str(s) if s.is_empty())
    }

    /// Truthiness as used by `exists` lookups and range endpoints.
    pub fn is_truthy(&self) -> bool {
        match self {
            SolrValue::Null => false,
            SolrValue::Bool(b) => *b,
            SolrValue::Int(i) => *i != 0,
            SolrValue::Float(f) => *f != 0.0,
            SolrValue::Str(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for SolrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolrValue::Null => Ok(()),
            SolrValue::Bool(b) => write!(f, "{b}"),
            SolrValue::Int(i) => write!(f, "{i}"),
            SolrValue::Float(v) => write!(f, "{v}"),
            SolrValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for SolrValue {
    fn from(v: &str) -> Self {
        SolrValue::Str(v.to_string())
    }
}

impl From<String> for SolrValue {
    fn from(v: String) -> Self {
        SolrValue::Str(v)
    }
}

impl From<bool> for SolrValue {
    fn from(v: bool) -> Self {
        SolrValue::Bool(v)
    }
}

impl From<i64> for SolrValue {
    fn from(v: i64) -> Self {
        SolrValue::Int(v)
    }
}

impl From<i32> for SolrValue {
    fn from(v: i32) -> Self {
        SolrValue::Int(v as i64)
    }
}

impl From<u32> for SolrValue {
    fn from(v: u32) -> Self {
        SolrValue::Int(v as i64)
    }
}

impl From<f64> for SolrValue {
    fn from(v: f64) -> Self {
        SolrValue::Float(v)
    }
}

/// The value side of a lookup: a scalar, a list (`in`), or a start/end
/// span (`range`). Shapes coerce rather than fail, so a scalar handed to
/// an `in` lookup behaves as a one-element list.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupValue {
    Single(SolrValue),
    Many(Vec<SolrValue>),
    Span(Option<SolrValue>, Option<SolrValue>),
}

impl LookupValue {
    pub fn many<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<SolrValue>,
    {
        LookupValue::Many(values.into_iter().map(Into::into).collect())
    }

    pub fn span<A, B>(start: Option<A>, end: Option<B>) -> Self
    where
        A: Into<SolrValue>,
        B: Into<SolrValue>,
    {
        LookupValue::Span(start.map(Into::into), end.map(Into::into))
    }

    fn as_list(&self) -> Vec<SolrValue> {
        match self {
            LookupValue::Single(v) => vec![v.clone()],
            LookupValue::Many(values) => values.clone(),
            LookupValue::Span(start, end) => [start, end]
                .into_iter()
                .flatten()
                .cloned()
                .collect(),
        }
    }

    fn as_span(&self) -> (Option<SolrValue>, Option<SolrValue>) {
        match self {
            LookupValue::Span(start, end) => (start.clone(), end.clone()),
            LookupValue::Single(v) => (Some(v.clone()), None),
            LookupValue::Many(values) => (values.first().cloned(), values.get(1).cloned()),
        }
    }

    fn is_truthy(&self) -> bool {
        match self {
            LookupValue::Single(v) => v.is_truthy(),
            LookupValue::Many(values) => !values.is_empty(),
            LookupValue::Span(start, end) => start.is_some() || end.is_some(),
        }
    }
}

impl fmt::Display for LookupValue {
    /// The value portion of an equality lookup: `v`, `(a OR b)`, or
    /// `[start TO end]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupValue::Single(v) => write!(f, "{v}"),
            LookupValue::Many(values) => {
                let joined: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "({})", joined.join(" OR "))
            }
            LookupValue::Span(start, end) => {
                write!(f, "[{} TO {}]", endpoint(start), endpoint(end))
            }
        }
    }
}

impl From<SolrValue> for LookupValue {
    fn from(v: SolrValue) -> Self {
        LookupValue::Single(v)
    }
}

impl From<&str> for LookupValue {
    fn from(v: &str) -> Self {
        LookupValue::Single(v.into())
    }
}

impl From<String> for LookupValue {
    fn from(v: String) -> Self {
        LookupValue::Single(v.into())
    }
}

impl From<bool> for LookupValue {
    fn from(v: bool) -> Self {
        LookupValue::Single(v.into())
    }
}

impl From<i64> for LookupValue {
    fn from(v: i64) -> Self {
        LookupValue::Single(v.into())
    }
}

impl From<i32> for LookupValue {
    fn from(v: i32) -> Self {
        LookupValue::Single(v.into())
    }
}

impl From<f64> for LookupValue {
    fn from(v: f64) -> Self {
        LookupValue::Single(v.into())
    }
}

/// Open or falsy range endpoints match anything.
fn endpoint(value: &Option<SolrValue>) -> String {
    match value {
        Some(v) if v.is_truthy() => v.to_string(),
        _ => "*".to_string(),
    }
}

// ============================================================================
// Translation
// ============================================================================

/// Convert a `field` or `field__lookup` key and value into a Solr query
/// string. Supported lookups are `in`, `exists`, and `range`; an
/// unrecognized suffix is not validated and leaves the whole key as a
/// literal field name. A non-empty `tag` prefixes the result with
/// `{!tag=...}` for facet exclusion.
pub fn lookup_to_filter(key: &str, value: &LookupValue, tag: &str) -> String {
    let solr_query = match key.split_once(LOOKUP_SEP) {
        Some((field, "in")) => in_filter(field, value),
        Some((field, "exists")) => exists_filter(field, value.is_truthy()),
        Some((field, "range")) => {
            let (start, end) = value.as_span();
            format!("{field}:[{} TO {}]", endpoint(&start), endpoint(&end))
        }
        // no suffix, or a suffix with no lookup meaning
        _ => format!("{key}:{value}"),
    };

    if tag.is_empty() {
        solr_query
    } else {
        format!("{{!tag={tag}}}{solr_query}")
    }
}

fn exists_filter(field: &str, exists: bool) -> String {
    let negate = if exists { "" } else { "-" };
    format!("{negate}{field}:{ANY_VALUE}")
}

fn in_filter(field: &str, value: &LookupValue) -> String {
    // empty-string/null entries flag a "no value" match
    let mut values = value.as_list();
    let wants_missing = values.iter().any(SolrValue::is_missing_sentinel);
    values.retain(|v| !v.is_missing_sentinel());

    // a list of nothing but sentinels is a plain "no value" query
    if values.is_empty() {
        return exists_filter(field, false);
    }

    let joined: Vec<String> = values.iter().map(ToString::to_string).collect();
    let any_of = format!("{field}:({})", joined.join(" OR "));

    if wants_missing {
        // no value OR one of the requested values, expressed by negating
        // "any value" and double-negating the requested values
        format!("-({field}:{ANY_VALUE} OR -{any_of})")
    } else {
        any_of
    }
}
