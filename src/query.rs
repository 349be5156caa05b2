//! Read access to stored records: the `Store` seam both backends implement,
//! and `fetch`, which validates a `Filter` against the store and applies it.

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;

use crate::error::{Result, VitalisError};
use crate::model::{Record, TagSummary};

/// `field<op>value`, e.g. `value>=1000` or `sourceName~Watch`.
static CONDITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([^=!<>~\s]+)\s*(!=|<=|>=|=|<|>|~)\s*(.*?)\s*$").unwrap()
});

/// Timestamp layout used throughout Health exports: `2024-02-28 08:00:00 -0800`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Every backend (CSV directory, SQLite database) implements this trait.
pub trait Store {
    /// Tags held by the store, sorted by name.
    fn tag_names(&self) -> Result<Vec<String>>;

    /// Row counts per tag, sorted by tag name.
    fn tags(&self) -> Result<Vec<TagSummary>>;

    /// Known fields of `tag`, in column order. Unknown tags are a
    /// `Validation` error.
    fn columns(&self, tag: &str) -> Result<Vec<String>>;

    /// All records of `tag` in store order.
    fn records(&self, tag: &str) -> Result<Vec<Record>>;
}

pub(crate) fn unknown_tag(tag: &str) -> VitalisError {
    VitalisError::Validation(format!("unknown tag '{tag}'"))
}

/// Comparison operators accepted in a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Contains => "~",
        }
    }
}

impl FromStr for Op {
    type Err = VitalisError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "=" | "==" => Ok(Op::Eq),
            "!=" => Ok(Op::Ne),
            "<" => Ok(Op::Lt),
            "<=" => Ok(Op::Le),
            ">" => Ok(Op::Gt),
            ">=" => Ok(Op::Ge),
            "~" => Ok(Op::Contains),
            _ => Err(VitalisError::Validation(format!("unknown operator '{s}'"))),
        }
    }
}

/// One `field op value` predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: String,
    pub op: Op,
    pub value: String,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: Op, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// A record lacking the field fails every operator except `!=`.
    pub fn matches(&self, record: &Record) -> bool {
        let Some(actual) = record.get(&self.field) else {
            return self.op == Op::Ne;
        };
        match self.op {
            Op::Contains => actual.contains(self.value.as_str()),
            Op::Eq => compare_values(actual, &self.value) == Ordering::Equal,
            Op::Ne => compare_values(actual, &self.value) != Ordering::Equal,
            Op::Lt => compare_values(actual, &self.value) == Ordering::Less,
            Op::Le => compare_values(actual, &self.value) != Ordering::Greater,
            Op::Gt => compare_values(actual, &self.value) == Ordering::Greater,
            Op::Ge => compare_values(actual, &self.value) != Ordering::Less,
        }
    }
}

impl FromStr for Condition {
    type Err = VitalisError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let caps = CONDITION_RE.captures(s).ok_or_else(|| {
            VitalisError::Validation(format!(
                "malformed condition '{s}': expected <field><op><value> with op one of = != < <= > >= ~"
            ))
        })?;
        Ok(Condition {
            field: caps[1].to_string(),
            op: caps[2].parse()?,
            value: caps[3].to_string(),
        })
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.field, self.op.as_str(), self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

/// Selection criteria for [`fetch`].
#[derive(Debug, Clone, Default)]
pub struct Filter {
    /// `None` queries every tag in the store, ordered by tag name.
    pub tag: Option<String>,
    pub conditions: Vec<Condition>,
    /// Keep only these fields in the returned records.
    pub select: Option<Vec<String>>,
    pub sort: Option<SortKey>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Filter {
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn sort_by(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.sort = Some(SortKey {
            field: field.into(),
            descending,
        });
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Every field name the filter refers to, in the order they are checked.
    fn referenced_fields(&self) -> impl Iterator<Item = &str> {
        self.conditions
            .iter()
            .map(|c| c.field.as_str())
            .chain(self.select.iter().flatten().map(String::as_str))
            .chain(self.sort.iter().map(|s| s.field.as_str()))
    }
}

/// Return the records matching `filter`.
///
/// Fails with `Validation` when the filter names a tag or field the store
/// does not know about. Store-level errors (e.g. `NotFound`) pass through.
pub fn fetch(store: &dyn Store, filter: &Filter) -> Result<Vec<Record>> {
    let tags = selected_tags(store, filter.tag.as_deref())?;
    let known = known_columns(store, &tags)?;
    if let Some(field) = filter
        .referenced_fields()
        .find(|f| !known.iter().any(|k| k.as_str() == *f))
    {
        let scope = match &filter.tag {
            Some(tag) => format!("tag '{tag}'"),
            None => "any tag".to_string(),
        };
        return Err(VitalisError::Validation(format!(
            "unknown field '{field}' for {scope}"
        )));
    }

    let mut matched = Vec::new();
    for tag in &tags {
        matched.extend(
            store
                .records(tag)?
                .into_iter()
                .filter(|r| filter.conditions.iter().all(|c| c.matches(r))),
        );
    }
    tracing::debug!(tags = tags.len(), matched = matched.len(), "fetch");

    if let Some(key) = &filter.sort {
        matched.sort_by(|a, b| compare_records(a, b, key));
    }

    let limit = filter.limit.unwrap_or(usize::MAX);
    let mut records: Vec<Record> = matched.into_iter().skip(filter.offset).take(limit).collect();

    if let Some(select) = &filter.select {
        for record in &mut records {
            record.fields.retain(|name, _| select.contains(name));
        }
    }

    Ok(records)
}

/// `tag` alone, or every tag in the store when `None`.
pub fn selected_tags(store: &dyn Store, tag: Option<&str>) -> Result<Vec<String>> {
    match tag {
        Some(tag) => Ok(vec![tag.to_string()]),
        None => store.tag_names(),
    }
}

/// Union of the columns of `tags`, in tag order then column order.
pub fn known_columns(store: &dyn Store, tags: &[String]) -> Result<Vec<String>> {
    let mut known: Vec<String> = Vec::new();
    for tag in tags {
        for column in store.columns(tag)? {
            if !known.contains(&column) {
                known.push(column);
            }
        }
    }
    Ok(known)
}

/// Records lacking the sort field go last regardless of direction.
fn compare_records(a: &Record, b: &Record, key: &SortKey) -> Ordering {
    match (a.get(&key.field), b.get(&key.field)) {
        (Some(x), Some(y)) => {
            let ord = compare_values(x, y);
            if key.descending {
                ord.reverse()
            } else {
                ord
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// A field value as it takes part in comparisons.
enum Scalar {
    Number(f64),
    Timestamp(DateTime<FixedOffset>),
    Text,
}

impl Scalar {
    fn classify(s: &str) -> Self {
        if let Some(n) = parse_number(s) {
            Scalar::Number(n)
        } else if let Some(t) = parse_timestamp(s) {
            Scalar::Timestamp(t)
        } else {
            Scalar::Text
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Scalar::Number(_) => 0,
            Scalar::Timestamp(_) => 1,
            Scalar::Text => 2,
        }
    }
}

/// Numbers compare numerically, export timestamps as instants, anything else
/// as plain strings. Values of different kinds order numbers first, then
/// timestamps, then strings, so the ordering stays total across mixed columns.
pub fn compare_values(lhs: &str, rhs: &str) -> Ordering {
    match (Scalar::classify(lhs), Scalar::classify(rhs)) {
        (Scalar::Number(a), Scalar::Number(b)) => a.total_cmp(&b),
        (Scalar::Timestamp(a), Scalar::Timestamp(b)) => a.cmp(&b),
        (Scalar::Text, Scalar::Text) => lhs.cmp(rhs),
        (a, b) => a.rank().cmp(&b.rank()),
    }
}

pub fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT).ok()
}
