//! Payload filters evaluated during search.
//!
//! A [`Filter`] is an ordered list of `{key, operator, value}` predicates that
//! must all hold. Workers evaluate it against a candidate's payload before
//! computing the distance, so rejected candidates never pay for the metric.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::payload::Payload;

/// Comparison operator of a single predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Field equals value.
    Eq,
    /// Field is missing or differs from value.
    Ne,
    /// Numeric field greater than value.
    Gt,
    /// Numeric field greater than or equal to value.
    Gte,
    /// Numeric field less than value.
    Lt,
    /// Numeric field less than or equal to value.
    Lte,
    /// Field equals one of the values of an array.
    In,
    /// String field contains the value as a substring.
    Contains,
    /// Field is present (value ignored).
    Exists,
}

/// A single `{key, operator, value}` condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub key: String,
    pub op: Operator,
    #[serde(default)]
    pub value: Value,
}

impl Predicate {
    pub fn new(key: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            op,
            value: value.into(),
        }
    }

    /// Evaluates this predicate against a payload.
    pub fn matches(&self, payload: &Payload) -> bool {
        let field = payload.get(&self.key);
        match self.op {
            Operator::Eq => field.map(|v| values_equal(v, &self.value)).unwrap_or(false),
            Operator::Ne => field.map(|v| !values_equal(v, &self.value)).unwrap_or(true),
            Operator::Gt => compare_numbers(field, &self.value, |a, b| a > b),
            Operator::Gte => compare_numbers(field, &self.value, |a, b| a >= b),
            Operator::Lt => compare_numbers(field, &self.value, |a, b| a < b),
            Operator::Lte => compare_numbers(field, &self.value, |a, b| a <= b),
            Operator::In => match (field, &self.value) {
                (Some(v), Value::Array(values)) => values.iter().any(|x| values_equal(v, x)),
                _ => false,
            },
            Operator::Contains => match (field.and_then(Value::as_str), self.value.as_str()) {
                (Some(s), Some(needle)) => s.contains(needle),
                _ => false,
            },
            Operator::Exists => field.is_some(),
        }
    }
}

/// Conjunction of predicates. The empty filter matches everything.
///
/// # Example
///
/// ```
/// use arcturus_core::{Filter, Payload};
///
/// let filter = Filter::field("type").eq("x").and(Filter::field("year").gte(2020));
/// let payload = Payload::new().with_field("type", "x").with_field("year", 2024);
/// assert!(filter.matches(&payload));
/// assert!(!filter.matches(&Payload::new().with_field("type", "y")));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter {
    predicates: Vec<Predicate>,
}

impl Filter {
    /// Creates a filter that matches every payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a predicate on a payload field.
    pub fn field(name: &str) -> FieldFilter {
        FieldFilter {
            field_name: name.to_string(),
        }
    }

    pub fn from_predicates(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    /// Appends the predicates of `other`; both must hold.
    pub fn and(mut self, other: Filter) -> Self {
        self.predicates.extend(other.predicates);
        self
    }

    /// Appends a single predicate. Chainable.
    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Returns true if every predicate holds, in order, short-circuiting on
    /// the first failure.
    pub fn matches(&self, payload: &Payload) -> bool {
        self.predicates.iter().all(|p| p.matches(payload))
    }
}

/// Builder for field-specific predicates.
#[derive(Debug)]
pub struct FieldFilter {
    field_name: String,
}

impl FieldFilter {
    fn build(self, op: Operator, value: Value) -> Filter {
        Filter::new().with(Predicate::new(self.field_name, op, value))
    }

    pub fn eq<V: Into<Value>>(self, value: V) -> Filter {
        self.build(Operator::Eq, value.into())
    }

    pub fn ne<V: Into<Value>>(self, value: V) -> Filter {
        self.build(Operator::Ne, value.into())
    }

    pub fn gt<V: Into<Value>>(self, value: V) -> Filter {
        self.build(Operator::Gt, value.into())
    }

    pub fn gte<V: Into<Value>>(self, value: V) -> Filter {
        self.build(Operator::Gte, value.into())
    }

    pub fn lt<V: Into<Value>>(self, value: V) -> Filter {
        self.build(Operator::Lt, value.into())
    }

    pub fn lte<V: Into<Value>>(self, value: V) -> Filter {
        self.build(Operator::Lte, value.into())
    }

    /// Field value is in the given list.
    pub fn contained_in<V: Into<Value>>(self, values: Vec<V>) -> Filter {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.build(Operator::In, Value::Array(values))
    }

    /// Field (as string) contains the given substring.
    pub fn contains(self, substring: &str) -> Filter {
        self.build(Operator::Contains, Value::from(substring))
    }

    pub fn exists(self) -> Filter {
        self.build(Operator::Exists, Value::Null)
    }
}

/// Numbers compare by value, so `2024` equals `2024.0`; other values by JSON
/// equality.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_numbers(Some(a), b, |x, y| x == y),
        _ => a == b,
    }
}

fn compare_numbers<F>(field_value: Option<&Value>, target: &Value, cmp: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (field_value.and_then(Value::as_f64), target.as_f64()) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}
