//! Query evaluation over JSON documents.
//!
//! The association engine consumes evaluation as a capability
//! ([`QueryEvaluator`]); backends with native filtering plug in their own.
//! [`SimpleEvaluator`] is the in-process implementation used for bound
//! filter attachment and in tests.

use std::cmp::Ordering;

use quilt_query::{
    ComparisonOp, ContainsOp, Literal, NaryLogicalOp, NaryRelationalOp, QueryExpression,
    ValueList,
};
use serde_json::Value;

use super::document::get_values;
use crate::error::Error;

/// The query evaluation capability: does a document satisfy a concrete
/// query?
pub trait QueryEvaluator {
    /// Evaluate a fully bound query against a document.
    fn matches(&self, query: &QueryExpression, doc: &Value) -> Result<bool, Error>;
}

/// In-process evaluator over JSON documents.
///
/// Field paths are interpreted relative to the document root; a field that
/// resolves to several values through an array wildcard satisfies a
/// comparison when any one value does. Evaluating a query that still
/// contains placeholders is an error.
pub struct SimpleEvaluator;

impl QueryEvaluator for SimpleEvaluator {
    fn matches(&self, query: &QueryExpression, doc: &Value) -> Result<bool, Error> {
        evaluate(query, doc)
    }
}

fn evaluate(query: &QueryExpression, doc: &Value) -> Result<bool, Error> {
    match query {
        QueryExpression::ValueComparison { field, op, rvalue } => {
            let rvalue = concrete(rvalue)?;
            Ok(get_values(doc, field)
                .iter()
                .any(|v| compare(*op, v, rvalue)))
        }
        QueryExpression::FieldComparison { field, op, rfield } => {
            let left = get_values(doc, field);
            let right = get_values(doc, rfield);
            Ok(left
                .iter()
                .any(|l| right.iter().any(|r| compare(*op, l, r))))
        }
        QueryExpression::RegexMatch {
            field,
            regex,
            case_insensitive,
            multiline,
            extended,
            dot_all,
        } => {
            let mut flags = String::new();
            for (on, flag) in [
                (*case_insensitive, 'i'),
                (*multiline, 'm'),
                (*dot_all, 's'),
                (*extended, 'x'),
            ] {
                if on {
                    flags.push(flag);
                }
            }
            let pattern = if flags.is_empty() {
                regex.clone()
            } else {
                format!("(?{flags}){regex}")
            };
            let compiled = regex::Regex::new(&pattern).map_err(|e| Error::InvalidRegex {
                pattern: regex.clone(),
                reason: e.to_string(),
            })?;
            Ok(get_values(doc, field)
                .iter()
                .any(|v| matches!(v, Value::String(s) if compiled.is_match(s))))
        }
        QueryExpression::NaryValueRelational { field, op, values } => {
            let set = match values {
                ValueList::Values(values) => values,
                ValueList::Placeholder(ph) => {
                    return Err(Error::UnboundPlaceholder {
                        field: ph.field.clone(),
                    })
                }
            };
            let found = get_values(doc, field);
            Ok(match op {
                NaryRelationalOp::In => {
                    found.iter().any(|v| set.iter().any(|s| equal(v, s)))
                }
                // A missing field is not in any set.
                NaryRelationalOp::NotIn => {
                    !found.iter().any(|v| set.iter().any(|s| equal(v, s)))
                }
            })
        }
        QueryExpression::NaryFieldRelational { field, op, rfield } => {
            let set: Vec<&Value> = get_values(doc, rfield)
                .into_iter()
                .flat_map(|v| match v {
                    Value::Array(items) => items.iter().collect::<Vec<_>>(),
                    other => vec![other],
                })
                .collect();
            let found = get_values(doc, field);
            Ok(match op {
                NaryRelationalOp::In => {
                    found.iter().any(|v| set.iter().any(|s| equal(v, s)))
                }
                NaryRelationalOp::NotIn => {
                    !found.iter().any(|v| set.iter().any(|s| equal(v, s)))
                }
            })
        }
        QueryExpression::ArrayContains { array, op, values } => {
            let items: Vec<&Value> = get_values(doc, array)
                .into_iter()
                .flat_map(|v| match v {
                    Value::Array(items) => items.iter().collect::<Vec<_>>(),
                    _ => Vec::new(),
                })
                .collect();
            Ok(match op {
                ContainsOp::Any => values.iter().any(|v| items.iter().any(|i| equal(i, v))),
                ContainsOp::All => values.iter().all(|v| items.iter().any(|i| equal(i, v))),
                ContainsOp::None => !values.iter().any(|v| items.iter().any(|i| equal(i, v))),
            })
        }
        QueryExpression::ArrayMatch { array, elem_match } => {
            for value in get_values(doc, array) {
                if let Value::Array(items) = value {
                    for item in items {
                        if evaluate(elem_match, item)? {
                            return Ok(true);
                        }
                    }
                }
            }
            Ok(false)
        }
        QueryExpression::NaryLogical { op, queries } => match op {
            NaryLogicalOp::And => {
                for q in queries {
                    if !evaluate(q, doc)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            NaryLogicalOp::Or => {
                for q in queries {
                    if evaluate(q, doc)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        },
    }
}

fn concrete(literal: &Literal) -> Result<&Value, Error> {
    match literal {
        Literal::Value(v) => Ok(v),
        Literal::Placeholder(ph) => Err(Error::UnboundPlaceholder {
            field: ph.field.clone(),
        }),
    }
}

fn compare(op: ComparisonOp, left: &Value, right: &Value) -> bool {
    match op {
        ComparisonOp::Eq => equal(left, right),
        ComparisonOp::Neq => !equal(left, right),
        ComparisonOp::Lt => matches!(order(left, right), Some(Ordering::Less)),
        ComparisonOp::Lte => {
            matches!(order(left, right), Some(Ordering::Less | Ordering::Equal))
        }
        ComparisonOp::Gt => matches!(order(left, right), Some(Ordering::Greater)),
        ComparisonOp::Gte => {
            matches!(order(left, right), Some(Ordering::Greater | Ordering::Equal))
        }
    }
}

/// Value equality with cross-numeric comparison (an integer equals the
/// same float).
fn equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => order(left, right) == Some(Ordering::Equal),
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quilt_query::Path;
    use serde_json::json;

    fn p(s: &str) -> Path {
        s.parse().unwrap()
    }

    fn eval(q: &QueryExpression, doc: &Value) -> bool {
        SimpleEvaluator.matches(q, doc).unwrap()
    }

    #[test]
    fn test_value_comparisons() {
        let doc = json!({"age": 30, "name": "ada"});
        assert!(eval(&QueryExpression::eq(p("age"), json!(30)), &doc));
        assert!(eval(&QueryExpression::eq(p("age"), json!(30.0)), &doc));
        assert!(eval(&QueryExpression::cmp(p("age"), ComparisonOp::Gt, json!(20)), &doc));
        assert!(!eval(&QueryExpression::cmp(p("age"), ComparisonOp::Lt, json!(20)), &doc));
        assert!(eval(&QueryExpression::cmp(p("name"), ComparisonOp::Gte, json!("ada")), &doc));
        assert!(!eval(&QueryExpression::eq(p("missing"), json!(1)), &doc));
    }

    #[test]
    fn test_field_comparison() {
        let doc = json!({"a": 5, "b": 5, "c": 7});
        assert!(eval(&QueryExpression::field_cmp(p("a"), ComparisonOp::Eq, p("b")), &doc));
        assert!(eval(&QueryExpression::field_cmp(p("a"), ComparisonOp::Lt, p("c")), &doc));
        assert!(!eval(&QueryExpression::field_cmp(p("a"), ComparisonOp::Gt, p("c")), &doc));
    }

    #[test]
    fn test_membership_and_null_semantics() {
        let doc = json!({"color": "red"});
        assert!(eval(&QueryExpression::within(p("color"), vec![json!("red"), json!("blue")]), &doc));
        assert!(!eval(&QueryExpression::within(p("missing"), vec![json!(1)]), &doc));
        // A missing field is not in any set.
        assert!(eval(&QueryExpression::not_within(p("missing"), vec![json!(1)]), &doc));
        assert!(!eval(&QueryExpression::not_within(p("color"), vec![json!("red")]), &doc));
    }

    #[test]
    fn test_regex_flags() {
        let doc = json!({"name": "Ada Lovelace"});
        assert!(!eval(&QueryExpression::regex(p("name"), "^ada"), &doc));
        let q = QueryExpression::RegexMatch {
            field: p("name"),
            regex: "^ada".to_string(),
            case_insensitive: true,
            multiline: false,
            extended: false,
            dot_all: false,
        };
        assert!(eval(&q, &doc));
    }

    #[test]
    fn test_invalid_regex_is_an_error() {
        let doc = json!({"name": "x"});
        let q = QueryExpression::regex(p("name"), "(unclosed");
        assert!(matches!(
            SimpleEvaluator.matches(&q, &doc),
            Err(Error::InvalidRegex { .. })
        ));
    }

    #[test]
    fn test_array_contains() {
        let doc = json!({"tags": ["a", "b", "c"]});
        let contains = |op, values: Vec<Value>| QueryExpression::ArrayContains {
            array: p("tags"),
            op,
            values,
        };
        assert!(eval(&contains(ContainsOp::Any, vec![json!("b"), json!("z")]), &doc));
        assert!(eval(&contains(ContainsOp::All, vec![json!("a"), json!("c")]), &doc));
        assert!(!eval(&contains(ContainsOp::All, vec![json!("a"), json!("z")]), &doc));
        assert!(eval(&contains(ContainsOp::None, vec![json!("z")]), &doc));
    }

    #[test]
    fn test_elem_match() {
        let doc = json!({"auths": [
            {"provider": "p1", "principal": "x"},
            {"provider": "p2", "principal": "y"},
        ]});
        let q = QueryExpression::elem_match(
            p("auths"),
            quilt_query::and(vec![
                Some(QueryExpression::eq(p("provider"), json!("p2"))),
                Some(QueryExpression::eq(p("principal"), json!("y"))),
            ])
            .unwrap(),
        );
        assert!(eval(&q, &doc));

        let q = QueryExpression::elem_match(
            p("auths"),
            quilt_query::and(vec![
                Some(QueryExpression::eq(p("provider"), json!("p1"))),
                Some(QueryExpression::eq(p("principal"), json!("y"))),
            ])
            .unwrap(),
        );
        assert!(!eval(&q, &doc));
    }

    #[test]
    fn test_unbound_placeholder_is_an_error() {
        let doc = json!({"a": 1});
        let q = QueryExpression::ValueComparison {
            field: p("a"),
            op: ComparisonOp::Eq,
            rvalue: Literal::Placeholder(quilt_query::Placeholder {
                id: 0,
                field: p("b"),
            }),
        };
        assert!(matches!(
            SimpleEvaluator.matches(&q, &doc),
            Err(Error::UnboundPlaceholder { .. })
        ));
    }
}
