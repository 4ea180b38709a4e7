//! Restricted boolean condition expressions over event documents.
//!
//! A rule's condition gate is a tree of AND/OR/NOT combinators over
//! leaf predicates. Each leaf tests one dotted-path attribute of the
//! serialized object against a literal. Evaluation is pure and
//! deterministic; combinators short-circuit.
//!
//! A path that does not resolve (or resolves to `null`) is treated as
//! *absent*: every predicate on it is false except an explicit
//! `absent` test. Malformed regular expressions fail closed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::Document;

/// Comparison operator for a leaf condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOp {
    #[default]
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Attribute value is a member of the literal array.
    In,
    /// Attribute array contains the literal, or attribute string
    /// contains the literal substring.
    Contains,
    /// Attribute string matches the literal regular expression.
    Regex,
    /// Attribute resolves to a non-null value. The literal is ignored.
    Present,
    /// Attribute is missing or null. The literal is ignored.
    Absent,
}

/// One leaf predicate: `attribute <op> value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted path into the event document, e.g. `status.value`.
    pub attribute: String,

    #[serde(default)]
    pub op: ConditionOp,

    #[serde(default)]
    pub value: Value,

    /// Invert the leaf result.
    #[serde(default)]
    pub negate: bool,
}

impl Condition {
    pub fn new(attribute: impl Into<String>, op: ConditionOp, value: Value) -> Self {
        Self { attribute: attribute.into(), op, value, negate: false }
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }

    /// Evaluate this predicate against a document.
    pub fn evaluate(&self, document: &Document) -> bool {
        let field = lookup(document, &self.attribute);

        let result = match self.op {
            ConditionOp::Present => field.is_some(),
            ConditionOp::Absent => field.is_none(),
            _ => match field {
                // Absent fields fail every value predicate.
                None => false,
                Some(field) => match self.op {
                    ConditionOp::Eq => field == &self.value,
                    ConditionOp::Neq => field != &self.value,
                    ConditionOp::Gt => compare(field, &self.value).is_some_and(|o| o.is_gt()),
                    ConditionOp::Gte => compare(field, &self.value).is_some_and(|o| o.is_ge()),
                    ConditionOp::Lt => compare(field, &self.value).is_some_and(|o| o.is_lt()),
                    ConditionOp::Lte => compare(field, &self.value).is_some_and(|o| o.is_le()),
                    ConditionOp::In => {
                        self.value.as_array().is_some_and(|set| set.contains(field))
                    }
                    ConditionOp::Contains => contains(field, &self.value),
                    ConditionOp::Regex => regex_match(field, &self.value),
                    ConditionOp::Present | ConditionOp::Absent => unreachable!(),
                },
            },
        };

        if self.negate {
            !result
        } else {
            result
        }
    }
}

/// A boolean expression tree over leaf conditions.
///
/// Immutable once loaded from a rule. The JSON form mirrors the rule
/// storage format:
///
/// ```json
/// {"and": [
///     {"attribute": "status.value", "op": "eq", "value": "active"},
///     {"not": {"attribute": "tenant", "op": "absent"}}
/// ]}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionSet {
    And {
        and: Vec<ConditionSet>,
    },
    Or {
        or: Vec<ConditionSet>,
    },
    Not {
        not: Box<ConditionSet>,
    },
    Leaf(Condition),
}

impl ConditionSet {
    pub fn and(children: Vec<ConditionSet>) -> Self {
        Self::And { and: children }
    }

    pub fn or(children: Vec<ConditionSet>) -> Self {
        Self::Or { or: children }
    }

    pub fn not(child: ConditionSet) -> Self {
        Self::Not { not: Box::new(child) }
    }

    /// Evaluate the tree against a document. AND and OR short-circuit.
    pub fn evaluate(&self, document: &Document) -> bool {
        match self {
            ConditionSet::And { and } => and.iter().all(|c| c.evaluate(document)),
            ConditionSet::Or { or } => or.iter().any(|c| c.evaluate(document)),
            ConditionSet::Not { not } => !not.evaluate(document),
            ConditionSet::Leaf(condition) => condition.evaluate(document),
        }
    }
}

impl From<Condition> for ConditionSet {
    fn from(condition: Condition) -> Self {
        Self::Leaf(condition)
    }
}

/// Evaluate an optional condition gate. A rule without conditions
/// matches unconditionally.
pub fn evaluate(conditions: Option<&ConditionSet>, document: &Document) -> bool {
    conditions.map_or(true, |c| c.evaluate(document))
}

/// Resolve a dotted path inside a document. `null` counts as absent.
fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut current = document;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Ordering over values: numbers compare numerically, strings
/// lexicographically. Mixed or unordered types do not compare.
fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.as_str().cmp(r.as_str())),
        _ => None,
    }
}

fn contains(field: &Value, needle: &Value) -> bool {
    match (field, needle) {
        (Value::Array(items), _) => items.contains(needle),
        (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
        _ => false,
    }
}

fn regex_match(field: &Value, pattern: &Value) -> bool {
    let (Some(field), Some(pattern)) = (field.as_str(), pattern.as_str()) else {
        return false;
    };
    // Fail closed on malformed patterns.
    match regex::Regex::new(pattern) {
        Ok(re) => re.is_match(field),
        Err(_) => false,
    }
}
