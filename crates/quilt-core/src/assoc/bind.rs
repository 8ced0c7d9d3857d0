//! Placeholder binding.
//!
//! A [`Binder`] carries the concrete value for one placeholder; a
//! [`BindQuery`] applies a set of binders to a rewritten query, producing an
//! executable one. Binding is all-or-nothing: a placeholder without a
//! covering binder is an error, and so is overlapping coverage when binders
//! are combined.

use std::collections::HashMap;

use quilt_query::{Literal, Placeholder, QueryExpression, ValueList};
use serde_json::Value;

use super::rewrite::BoundField;
use crate::error::Error;

/// The concrete value supplied for one placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    /// A single value.
    Value(Value),
    /// A list of values, for placeholders standing in for value sets or for
    /// fields read through array wildcards.
    List(Vec<Value>),
}

/// One placeholder bound to one concrete value.
#[derive(Debug, Clone)]
pub struct Binder {
    placeholder: Placeholder,
    value: BoundValue,
}

impl Binder {
    /// Bind the placeholder of a rewrite-produced field to a value.
    pub fn new(bound: &BoundField, value: BoundValue) -> Self {
        Binder {
            placeholder: bound.placeholder.clone(),
            value,
        }
    }

    /// The placeholder this binder covers.
    pub fn placeholder(&self) -> &Placeholder {
        &self.placeholder
    }

    /// The bound value.
    pub fn value(&self) -> &BoundValue {
        &self.value
    }
}

/// A set of binders applicable to a query.
#[derive(Debug, Clone, Default)]
pub struct BindQuery {
    binders: HashMap<u32, Binder>,
}

impl BindQuery {
    /// A binder set with nothing in it.
    pub fn empty() -> Self {
        BindQuery::default()
    }

    /// Build a binder set, rejecting duplicate coverage of one placeholder.
    pub fn new(binders: Vec<Binder>) -> Result<Self, Error> {
        let mut map = HashMap::with_capacity(binders.len());
        for binder in binders {
            let id = binder.placeholder.id;
            if let Some(previous) = map.insert(id, binder) {
                return Err(Error::OverlappingBinders {
                    field: previous.placeholder.field,
                });
            }
        }
        Ok(BindQuery { binders: map })
    }

    /// Combine binder sets into one.
    ///
    /// The union must be disjoint: two sets covering the same placeholder
    /// fail fast rather than silently picking one.
    pub fn combine(list: impl IntoIterator<Item = BindQuery>) -> Result<Self, Error> {
        let mut map = HashMap::new();
        for set in list {
            for (id, binder) in set.binders {
                if let Some(previous) = map.insert(id, binder) {
                    return Err(Error::OverlappingBinders {
                        field: previous.placeholder.field,
                    });
                }
            }
        }
        Ok(BindQuery { binders: map })
    }

    /// Whether the set holds no binders.
    pub fn is_empty(&self) -> bool {
        self.binders.is_empty()
    }

    /// Number of binders in the set.
    pub fn len(&self) -> usize {
        self.binders.len()
    }

    /// Replace every placeholder in `query` with its bound value.
    ///
    /// A query with no placeholders binds to itself unchanged. A
    /// placeholder with no covering binder is an error.
    pub fn bind(&self, query: &QueryExpression) -> Result<QueryExpression, Error> {
        Ok(match query {
            QueryExpression::ValueComparison {
                field,
                op,
                rvalue: Literal::Placeholder(placeholder),
            } => QueryExpression::ValueComparison {
                field: field.clone(),
                op: *op,
                rvalue: Literal::Value(match self.lookup(placeholder)? {
                    BoundValue::Value(v) => v.clone(),
                    BoundValue::List(l) => Value::Array(l.clone()),
                }),
            },
            QueryExpression::NaryValueRelational {
                field,
                op,
                values: ValueList::Placeholder(placeholder),
            } => QueryExpression::NaryValueRelational {
                field: field.clone(),
                op: *op,
                values: ValueList::Values(match self.lookup(placeholder)? {
                    BoundValue::Value(v) => vec![v.clone()],
                    BoundValue::List(l) => l.clone(),
                }),
            },
            QueryExpression::ArrayMatch { array, elem_match } => QueryExpression::ArrayMatch {
                array: array.clone(),
                elem_match: Box::new(self.bind(elem_match)?),
            },
            QueryExpression::NaryLogical { op, queries } => QueryExpression::NaryLogical {
                op: *op,
                queries: queries
                    .iter()
                    .map(|q| self.bind(q))
                    .collect::<Result<_, _>>()?,
            },
            other => other.clone(),
        })
    }

    fn lookup(&self, placeholder: &Placeholder) -> Result<&BoundValue, Error> {
        self.binders
            .get(&placeholder.id)
            .map(Binder::value)
            .ok_or_else(|| Error::UnboundPlaceholder {
                field: placeholder.field.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assoc::analyze::AnalyzeQuery;
    use crate::assoc::rewrite::RewriteQuery;
    use crate::testutil::composite_ac;
    use quilt_query::{and, ComparisonOp, Path};
    use serde_json::json;

    fn p(s: &str) -> Path {
        s.parse().unwrap()
    }

    /// Rewrite a two-placeholder query for C.
    fn two_placeholder_result() -> crate::assoc::rewrite::RewriteResult {
        let composite = composite_ac(&["obj1.c"]);
        let edge = composite.child_reference(&p("obj1.c")).unwrap();
        let c = composite.reference(edge).target();

        let q = and(vec![
            Some(QueryExpression::field_cmp(
                p("_id"),
                ComparisonOp::Eq,
                p("$parent.c_ref"),
            )),
            Some(QueryExpression::field_cmp(
                p("name"),
                ComparisonOp::Neq,
                p("$parent.$parent._id"),
            )),
        ])
        .unwrap();
        let info = AnalyzeQuery::new(&composite, Some(edge)).analyze(&q).unwrap();
        RewriteQuery::new(&composite, c).rewrite(&q, &info).unwrap()
    }

    #[test]
    fn test_bind_requires_full_coverage() {
        let result = two_placeholder_result();
        let query = result.query.as_ref().unwrap();
        assert_eq!(query.placeholders().len(), 2);

        // One binder short: error.
        let partial = BindQuery::new(vec![Binder::new(
            &result.bindings[0],
            BoundValue::Value(json!("x")),
        )])
        .unwrap();
        assert!(matches!(
            partial.bind(query),
            Err(Error::UnboundPlaceholder { .. })
        ));

        // Full coverage: no placeholders remain.
        let full = BindQuery::new(vec![
            Binder::new(&result.bindings[0], BoundValue::Value(json!("x"))),
            Binder::new(&result.bindings[1], BoundValue::Value(json!("y"))),
        ])
        .unwrap();
        let bound = full.bind(query).unwrap();
        assert!(bound.placeholders().is_empty());
        assert_eq!(
            bound,
            and(vec![
                Some(QueryExpression::eq(p("_id"), json!("x"))),
                Some(QueryExpression::cmp(p("name"), ComparisonOp::Neq, json!("y"))),
            ])
            .unwrap()
        );
    }

    #[test]
    fn test_bind_without_placeholders_is_identity() {
        let q = QueryExpression::eq(p("a"), json!(1));
        assert_eq!(BindQuery::empty().bind(&q).unwrap(), q);
    }

    #[test]
    fn test_combine_is_disjoint_union() {
        let result = two_placeholder_result();
        let query = result.query.as_ref().unwrap();

        let first = BindQuery::new(vec![Binder::new(
            &result.bindings[0],
            BoundValue::Value(json!("x")),
        )])
        .unwrap();
        let second = BindQuery::new(vec![Binder::new(
            &result.bindings[1],
            BoundValue::Value(json!("y")),
        )])
        .unwrap();

        let combined = BindQuery::combine(vec![first, second]).unwrap();
        assert_eq!(combined.len(), 2);
        assert!(combined.bind(query).is_ok());
    }

    #[test]
    fn test_combine_rejects_overlap() {
        let result = two_placeholder_result();
        let a = BindQuery::new(vec![Binder::new(
            &result.bindings[0],
            BoundValue::Value(json!("x")),
        )])
        .unwrap();
        let b = BindQuery::new(vec![Binder::new(
            &result.bindings[0],
            BoundValue::Value(json!("z")),
        )])
        .unwrap();
        assert!(matches!(
            BindQuery::combine(vec![a, b]),
            Err(Error::OverlappingBinders { .. })
        ));
    }

    #[test]
    fn test_list_bound_into_a_scalar_slot_becomes_an_array() {
        let result = two_placeholder_result();
        let query = result.query.as_ref().unwrap();

        let binders = BindQuery::new(vec![
            Binder::new(&result.bindings[0], BoundValue::List(vec![json!(1), json!(2)])),
            Binder::new(&result.bindings[1], BoundValue::Value(json!("y"))),
        ])
        .unwrap();
        let bound = binders.bind(query).unwrap();
        assert_eq!(
            bound,
            and(vec![
                Some(QueryExpression::eq(p("_id"), json!([1, 2]))),
                Some(QueryExpression::cmp(p("name"), ComparisonOp::Neq, json!("y"))),
            ])
            .unwrap()
        );
    }
}
