//! Column predicates
//!
//! Predicates filter the content of emitted versions strictly:
//! no type coercion, no expressions. A missing or null field never matches.
//!
//! Each predicate can also be tested conservatively against page statistics
//! (`may_match`), which is how content predicates push down into page
//! pruning.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

use crate::errors::{ChronoError, ChronoResult};
use crate::segment::{Document, PageMeta};

#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// field = value
    Eq(Value),
    /// field >= value
    Gte(Value),
    /// field > value
    Gt(Value),
    /// field <= value
    Lte(Value),
    /// field < value
    Lt(Value),
}

impl FilterOp {
    pub fn bound(&self) -> &Value {
        match self {
            FilterOp::Eq(v) | FilterOp::Gte(v) | FilterOp::Gt(v) | FilterOp::Lte(v) | FilterOp::Lt(v) => v,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            FilterOp::Eq(_) => "=",
            FilterOp::Gte(_) => ">=",
            FilterOp::Gt(_) => ">",
            FilterOp::Lte(_) => "<=",
            FilterOp::Lt(_) => "<",
        }
    }
}

/// A filter on one content column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPredicate {
    pub column: String,
    pub op: FilterOp,
}

impl ColumnPredicate {
    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Eq(value),
        }
    }

    pub fn gte(column: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Gte(value),
        }
    }

    pub fn gt(column: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Gt(value),
        }
    }

    pub fn lte(column: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Lte(value),
        }
    }

    pub fn lt(column: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            op: FilterOp::Lt(value),
        }
    }

    /// Parses `column<op>value` with op one of `>=`, `<=`, `>`, `<`, `=`.
    ///
    /// The value is read as JSON when it parses as JSON, otherwise as a
    /// plain string, so `name=alice` and `name="alice"` are the same filter.
    pub fn parse(s: &str) -> ChronoResult<Self> {
        const OPS: [&str; 5] = [">=", "<=", ">", "<", "="];

        let (pos, op) = OPS
            .iter()
            .filter_map(|op| s.find(op).map(|pos| (pos, *op)))
            .min_by_key(|(pos, op)| (*pos, std::cmp::Reverse(op.len())))
            .ok_or_else(|| ChronoError::malformed(format!("no operator in filter '{}'", s)))?;

        let column = s[..pos].trim();
        let raw = s[pos + op.len()..].trim();
        if column.is_empty() {
            return Err(ChronoError::malformed(format!("no column in filter '{}'", s)));
        }

        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

        Ok(match op {
            ">=" => Self::gte(column, value),
            "<=" => Self::lte(column, value),
            ">" => Self::gt(column, value),
            "<" => Self::lt(column, value),
            _ => Self::eq(column, value),
        })
    }

    /// Whether a page with these statistics can hold a matching row.
    ///
    /// Only numeric bounds are tested; stats cover numeric values only, so a
    /// page without stats for the column holds no number that could match.
    pub fn may_match(&self, meta: &PageMeta) -> bool {
        let bound = match self.op.bound().as_f64() {
            Some(b) => b,
            None => return true,
        };

        let range = match meta.column_range(&self.column) {
            Some(range) => range,
            None => return false,
        };

        match self.op {
            FilterOp::Eq(_) => range.min <= bound && bound <= range.max,
            FilterOp::Gte(_) => range.max >= bound,
            FilterOp::Gt(_) => range.max > bound,
            FilterOp::Lte(_) => range.min <= bound,
            FilterOp::Lt(_) => range.min < bound,
        }
    }
}

impl fmt::Display for ColumnPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.column, self.op.symbol(), self.op.bound())
    }
}

/// Evaluates predicates against version content
pub struct PredicateFilter;

impl PredicateFilter {
    /// AND over all predicates; an empty list matches everything
    pub fn matches(doc: &Document, predicates: &[ColumnPredicate]) -> bool {
        predicates.iter().all(|pred| Self::matches_predicate(doc, pred))
    }

    /// Page-level counterpart of `matches`
    pub fn may_match(meta: &PageMeta, predicates: &[ColumnPredicate]) -> bool {
        predicates.iter().all(|pred| pred.may_match(meta))
    }

    fn matches_predicate(doc: &Document, predicate: &ColumnPredicate) -> bool {
        let actual = match doc.get(&predicate.column) {
            Some(v) if !v.is_null() => v,
            _ => return false,
        };

        match &predicate.op {
            FilterOp::Eq(expected) => actual == expected,
            FilterOp::Gte(bound) => Self::order(actual, bound).map_or(false, Ordering::is_ge),
            FilterOp::Gt(bound) => Self::order(actual, bound).map_or(false, Ordering::is_gt),
            FilterOp::Lte(bound) => Self::order(actual, bound).map_or(false, Ordering::is_le),
            FilterOp::Lt(bound) => Self::order(actual, bound).map_or(false, Ordering::is_lt),
        }
    }

    /// Numbers compare numerically, strings lexicographically; nothing else
    /// is ordered.
    fn order(actual: &Value, bound: &Value) -> Option<Ordering> {
        match (actual, bound) {
            (Value::Number(a), Value::Number(b)) => {
                if let (Some(ai), Some(bi)) = (a.as_i64(), b.as_i64()) {
                    return Some(ai.cmp(&bi));
                }
                a.as_f64()?.partial_cmp(&b.as_f64()?)
            }
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{FactVersion, Page};
    use crate::trie::Iid;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn meta_of(docs: &[Value]) -> PageMeta {
        let rows: Vec<FactVersion> = docs
            .iter()
            .enumerate()
            .map(|(i, d)| FactVersion::put(Iid::for_key(&i.to_string()), 1, 0, doc(d.clone())))
            .collect();
        Page::from_rows(&rows).meta(64)
    }

    #[test]
    fn test_equality_match() {
        let d = doc(json!({"name": "Alice", "age": 30}));
        assert!(PredicateFilter::matches(&d, &[ColumnPredicate::eq("name", json!("Alice"))]));
        assert!(!PredicateFilter::matches(&d, &[ColumnPredicate::eq("name", json!("Bob"))]));
    }

    #[test]
    fn test_no_type_coercion() {
        let d = doc(json!({"value": 123}));
        assert!(!PredicateFilter::matches(&d, &[ColumnPredicate::eq("value", json!("123"))]));
        assert!(PredicateFilter::matches(&d, &[ColumnPredicate::eq("value", json!(123))]));
        assert!(!PredicateFilter::matches(&d, &[ColumnPredicate::gt("value", json!("100"))]));
    }

    #[test]
    fn test_range_predicates() {
        let d = doc(json!({"age": 25, "city": "Oslo"}));
        assert!(PredicateFilter::matches(&d, &[ColumnPredicate::gte("age", json!(18))]));
        assert!(PredicateFilter::matches(&d, &[ColumnPredicate::lte("age", json!(30))]));
        assert!(!PredicateFilter::matches(&d, &[ColumnPredicate::gt("age", json!(25))]));
        assert!(!PredicateFilter::matches(&d, &[ColumnPredicate::lt("age", json!(25))]));
        assert!(PredicateFilter::matches(&d, &[ColumnPredicate::gt("age", json!(24.5))]));
        assert!(PredicateFilter::matches(&d, &[ColumnPredicate::lt("city", json!("Paris"))]));
    }

    #[test]
    fn test_missing_and_null_never_match() {
        let d = doc(json!({"name": null}));
        assert!(!PredicateFilter::matches(&d, &[ColumnPredicate::eq("name", Value::Null)]));
        assert!(!PredicateFilter::matches(&d, &[ColumnPredicate::eq("age", json!(30))]));
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            ColumnPredicate::parse("age>=18").unwrap(),
            ColumnPredicate::gte("age", json!(18))
        );
        assert_eq!(
            ColumnPredicate::parse("age<3").unwrap(),
            ColumnPredicate::lt("age", json!(3))
        );
        assert_eq!(
            ColumnPredicate::parse("name=alice").unwrap(),
            ColumnPredicate::eq("name", json!("alice"))
        );
        assert_eq!(
            ColumnPredicate::parse("name=\"alice\"").unwrap(),
            ColumnPredicate::eq("name", json!("alice"))
        );
        assert_eq!(
            ColumnPredicate::parse("active = true").unwrap(),
            ColumnPredicate::eq("active", json!(true))
        );
        assert!(ColumnPredicate::parse("age").is_err());
        assert!(ColumnPredicate::parse("=3").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(ColumnPredicate::gte("age", json!(18)).to_string(), "age>=18");
    }

    #[test]
    fn test_may_match_uses_numeric_stats() {
        let meta = meta_of(&[json!({"age": 10}), json!({"age": 20})]);

        assert!(ColumnPredicate::eq("age", json!(15)).may_match(&meta));
        assert!(!ColumnPredicate::eq("age", json!(25)).may_match(&meta));
        assert!(ColumnPredicate::gte("age", json!(20)).may_match(&meta));
        assert!(!ColumnPredicate::gt("age", json!(20)).may_match(&meta));
        assert!(ColumnPredicate::lte("age", json!(10)).may_match(&meta));
        assert!(!ColumnPredicate::lt("age", json!(10)).may_match(&meta));

        // no stats for the column, numeric bound
        assert!(!ColumnPredicate::eq("height", json!(1)).may_match(&meta));
        // non-numeric bounds are never pruned
        assert!(ColumnPredicate::eq("name", json!("x")).may_match(&meta));
    }
}
