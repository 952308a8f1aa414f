//! Query predicates
//!
//! A [`Predicate`] is a structured filter over the properties of one record
//! type. It can be built directly or parsed from the textual form
//! (`"firstName BEGINSWITH[c] 'ma' AND id < %d"`), and is evaluated against
//! a record plus a [`LinkResolver`] for key paths that cross to-one links.

mod parser;

use crate::error::{Error, Result};
use crate::schema::{PropertyType, RecordType, SchemaRegistry};
use crate::{ObjectRef, Record, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Resolves link values to records while a predicate is evaluated
pub trait LinkResolver {
    /// Look up the record a link points at; `None` if it no longer exists
    fn resolve_ref(&self, object: &ObjectRef) -> Option<Arc<Record>>;
}

/// A resolver that never finds anything, for predicates without key paths
pub struct NoLinks;

impl LinkResolver for NoLinks {
    fn resolve_ref(&self, _object: &ObjectRef) -> Option<Arc<Record>> {
        None
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    BeginsWith,
    EndsWith,
    Contains,
}

impl CompareOp {
    /// Whether an ordered index can answer this operator
    pub fn is_range(self) -> bool {
        matches!(
            self,
            CompareOp::Eq | CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge
        )
    }

    /// Apply the operator to a stored value and an operand
    ///
    /// Nil only equals nil. Ordering operators never match nil or values of
    /// different kinds. String operators only match strings.
    pub fn matches(self, lhs: &Value, rhs: &Value, case_insensitive: bool) -> bool {
        match self {
            CompareOp::Eq => values_equal(lhs, rhs, case_insensitive),
            CompareOp::Ne => !values_equal(lhs, rhs, case_insensitive),
            CompareOp::Lt => ordering(lhs, rhs, case_insensitive) == Some(Ordering::Less),
            CompareOp::Le => matches!(
                ordering(lhs, rhs, case_insensitive),
                Some(Ordering::Less | Ordering::Equal)
            ),
            CompareOp::Gt => ordering(lhs, rhs, case_insensitive) == Some(Ordering::Greater),
            CompareOp::Ge => matches!(
                ordering(lhs, rhs, case_insensitive),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            CompareOp::BeginsWith => {
                string_op(lhs, rhs, case_insensitive, |a, b| a.starts_with(b))
            }
            CompareOp::EndsWith => string_op(lhs, rhs, case_insensitive, |a, b| a.ends_with(b)),
            CompareOp::Contains => string_op(lhs, rhs, case_insensitive, |a, b| a.contains(b)),
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::BeginsWith => "BEGINSWITH",
            CompareOp::EndsWith => "ENDSWITH",
            CompareOp::Contains => "CONTAINS",
        }
    }
}

fn values_equal(lhs: &Value, rhs: &Value, case_insensitive: bool) -> bool {
    if lhs.is_null() || rhs.is_null() {
        return lhs.is_null() && rhs.is_null();
    }
    ordering(lhs, rhs, case_insensitive) == Some(Ordering::Equal)
}

fn ordering(lhs: &Value, rhs: &Value, case_insensitive: bool) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::String(a), Value::String(b)) if case_insensitive => {
            Some(a.to_lowercase().cmp(&b.to_lowercase()))
        }
        _ => lhs.compare(rhs),
    }
}

fn string_op(
    lhs: &Value,
    rhs: &Value,
    case_insensitive: bool,
    op: impl Fn(&str, &str) -> bool,
) -> bool {
    match (lhs.as_str(), rhs.as_str()) {
        (Some(a), Some(b)) if case_insensitive => op(&a.to_lowercase(), &b.to_lowercase()),
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

/// A filter over records of one type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Matches everything
    True,
    /// Matches nothing
    False,
    /// Compare the value at a key path with a literal
    Compare {
        path: String,
        op: CompareOp,
        value: Value,
        #[serde(default)]
        case_insensitive: bool,
    },
    /// The value at a key path equals one of the listed values
    In { path: String, values: Vec<Value> },
    /// All must match
    And(Vec<Predicate>),
    /// At least one must match
    Or(Vec<Predicate>),
    /// Negation
    Not(Box<Predicate>),
}

impl Predicate {
    /// Parse the textual form, substituting `%@`, `%d`, `%f` and `%s`
    /// placeholders from `params` in order
    pub fn parse(text: &str, params: &[Value]) -> Result<Self> {
        parser::parse(text, params)
    }

    /// Build a comparison
    pub fn compare(path: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Predicate::Compare {
            path: path.into(),
            op,
            value: value.into(),
            case_insensitive: false,
        }
    }

    /// `path = value`
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(path, CompareOp::Eq, value)
    }

    /// `path != value`
    pub fn ne(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(path, CompareOp::Ne, value)
    }

    /// `path < value`
    pub fn lt(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(path, CompareOp::Lt, value)
    }

    /// `path <= value`
    pub fn le(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(path, CompareOp::Le, value)
    }

    /// `path > value`
    pub fn gt(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(path, CompareOp::Gt, value)
    }

    /// `path >= value`
    pub fn ge(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(path, CompareOp::Ge, value)
    }

    /// `path = nil`
    pub fn is_nil(path: impl Into<String>) -> Self {
        Self::compare(path, CompareOp::Eq, Value::Null)
    }

    /// `path IN {values}`
    pub fn in_list<I, V>(path: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::In {
            path: path.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Combine with another predicate using AND, flattening nested ANDs
    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::True, p) | (p, Predicate::True) => p,
            (Predicate::And(mut left), Predicate::And(right)) => {
                left.extend(right);
                Predicate::And(left)
            }
            (Predicate::And(mut left), p) => {
                left.push(p);
                Predicate::And(left)
            }
            (p, Predicate::And(right)) => {
                let mut all = Vec::with_capacity(right.len() + 1);
                all.push(p);
                all.extend(right);
                Predicate::And(all)
            }
            (a, b) => Predicate::And(vec![a, b]),
        }
    }

    /// Combine with another predicate using OR
    pub fn or(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::Or(mut left), p) => {
                left.push(p);
                Predicate::Or(left)
            }
            (a, b) => Predicate::Or(vec![a, b]),
        }
    }

    /// Negate this predicate
    pub fn negate(self) -> Self {
        match self {
            Predicate::Not(inner) => *inner,
            p => Predicate::Not(Box::new(p)),
        }
    }

    /// Make a comparison case-insensitive; other predicates are unchanged
    pub fn ignoring_case(self) -> Self {
        match self {
            Predicate::Compare {
                path, op, value, ..
            } => Predicate::Compare {
                path,
                op,
                value,
                case_insensitive: true,
            },
            p => p,
        }
    }

    /// Evaluate against one record
    ///
    /// Comparisons on a list property match when any element matches.
    pub fn evaluate(&self, record: &Record, links: &dyn LinkResolver) -> bool {
        match self {
            Predicate::True => true,
            Predicate::False => false,
            Predicate::Compare {
                path,
                op,
                value,
                case_insensitive,
            } => {
                let lhs = key_path_value(record, path, links);
                match &lhs {
                    Value::List(items) => items
                        .iter()
                        .any(|item| op.matches(item, value, *case_insensitive)),
                    _ => op.matches(&lhs, value, *case_insensitive),
                }
            }
            Predicate::In { path, values } => {
                let lhs = key_path_value(record, path, links);
                let member = |v: &Value| values.iter().any(|c| values_equal(v, c, false));
                match &lhs {
                    Value::List(items) => items.iter().any(member),
                    _ => member(&lhs),
                }
            }
            Predicate::And(preds) => preds.iter().all(|p| p.evaluate(record, links)),
            Predicate::Or(preds) => preds.iter().any(|p| p.evaluate(record, links)),
            Predicate::Not(inner) => !inner.evaluate(record, links),
        }
    }

    /// Check every key path against the record type
    ///
    /// The first segment must be a property of `record_type`; every segment
    /// before the last must be a to-one link whose target type is looked up
    /// in `registry`.
    pub fn validate(&self, record_type: &RecordType, registry: &SchemaRegistry) -> Result<()> {
        let mut result = Ok(());
        self.visit_paths(&mut |path| {
            if result.is_ok() {
                result = validate_path(path, record_type, registry);
            }
        });
        result
    }

    /// The comparison the planner may answer from an index
    ///
    /// This is the predicate itself when it is a comparison, or the first
    /// conjunct of a top-level AND.
    pub fn leading_comparison(&self) -> Option<&Predicate> {
        match self {
            Predicate::Compare { .. } | Predicate::In { .. } => Some(self),
            Predicate::And(preds) => preds.first().and_then(Predicate::leading_comparison),
            _ => None,
        }
    }

    /// Key path of a comparison
    pub fn path(&self) -> Option<&str> {
        match self {
            Predicate::Compare { path, .. } | Predicate::In { path, .. } => Some(path),
            _ => None,
        }
    }

    fn visit_paths(&self, f: &mut dyn FnMut(&str)) {
        match self {
            Predicate::True | Predicate::False => {}
            Predicate::Compare { path, .. } | Predicate::In { path, .. } => f(path),
            Predicate::And(preds) | Predicate::Or(preds) => {
                for p in preds {
                    p.visit_paths(f);
                }
            }
            Predicate::Not(inner) => inner.visit_paths(f),
        }
    }
}

fn validate_path(path: &str, record_type: &RecordType, registry: &SchemaRegistry) -> Result<()> {
    let segments: Vec<&str> = path.split('.').collect();
    validate_segments(path, &segments, record_type, registry)
}

fn validate_segments(
    path: &str,
    segments: &[&str],
    record_type: &RecordType,
    registry: &SchemaRegistry,
) -> Result<()> {
    let Some((first, rest)) = segments.split_first() else {
        return Ok(());
    };
    let prop = record_type.require_property(first)?;
    if rest.is_empty() {
        return Ok(());
    }
    match &prop.property_type {
        PropertyType::Link(target) => {
            let next = registry.resolve(target.as_str())?;
            validate_segments(path, rest, &next, registry)
        }
        _ => Err(Error::InvalidPredicate(format!(
            "'{}' in key path '{}' is not a to-one relationship",
            first, path
        ))),
    }
}

/// Read the value at a dotted key path, following to-one links
///
/// A nil or dangling link anywhere along the path yields nil.
pub fn key_path_value(record: &Record, path: &str, links: &dyn LinkResolver) -> Value {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return Value::Null;
    };
    let mut value = record.get_or_null(first).clone();
    for segment in segments {
        let next = match &value {
            Value::Link(target) => links
                .resolve_ref(target)
                .map(|r| r.get_or_null(segment).clone()),
            _ => None,
        };
        value = next.unwrap_or(Value::Null);
    }
    value
}

impl FromStr for Predicate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Predicate::parse(s, &[])
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::True => write!(f, "TRUEPREDICATE"),
            Predicate::False => write!(f, "FALSEPREDICATE"),
            Predicate::Compare {
                path,
                op,
                value,
                case_insensitive,
            } => {
                let modifier = if *case_insensitive { "[c]" } else { "" };
                write!(f, "{} {}{} {}", path, op.symbol(), modifier, value)
            }
            Predicate::In { path, values } => {
                write!(f, "{} IN {{", path)?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "}}")
            }
            Predicate::And(preds) => write_joined(f, preds, " AND "),
            Predicate::Or(preds) => write_joined(f, preds, " OR "),
            Predicate::Not(inner) => write!(f, "NOT ({})", inner),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, preds: &[Predicate], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, p) in preds.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", p)?;
    }
    write!(f, ")")
}
