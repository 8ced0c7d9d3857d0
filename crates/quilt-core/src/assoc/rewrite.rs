//! Query rewriting.
//!
//! Given a clause, its field analysis, and a target entity, rewriting
//! produces the fragment of the clause expressible against the target:
//! fields owned by the target keep their paths, rebased relative to the
//! target's root; fields owned elsewhere become placeholders to be bound
//! later from fetched documents. A clause with no local content rewrites to
//! nothing and is dropped by the logical combinators.

use quilt_query::{
    combine, Literal, Path, Placeholder, QueryExpression, Segment, ValueList,
};
use tracing::debug;

use super::analyze::QueryFieldInfo;
use crate::error::Error;
use crate::schema::{CompositeMetadata, EntityId, NodeKind};

/// A placeholder created during rewriting, paired with the field analysis
/// record whose value will eventually fill it.
#[derive(Debug, Clone)]
pub struct BoundField {
    /// The placeholder as it appears in the rewritten query.
    pub placeholder: Placeholder,
    /// The field occurrence the value must come from.
    pub field_info: QueryFieldInfo,
}

/// Result of rewriting one clause for a target entity.
#[derive(Debug, Clone)]
pub struct RewriteResult {
    /// The rewritten clause, absent when nothing in the clause concerns the
    /// target entity.
    pub query: Option<QueryExpression>,
    /// Placeholders introduced, in first-occurrence order.
    pub bindings: Vec<BoundField>,
}

/// Rewrites clauses of a composite query for one target entity.
pub struct RewriteQuery<'a> {
    composite: &'a CompositeMetadata,
    target: EntityId,
}

impl<'a> RewriteQuery<'a> {
    /// Create a rewriter producing queries executable against `target`.
    pub fn new(composite: &'a CompositeMetadata, target: EntityId) -> Self {
        RewriteQuery { composite, target }
    }

    /// Rewrite one clause using its field analysis.
    ///
    /// The analysis must have been produced for exactly this clause; the
    /// records are consumed in the analyzer's emission order.
    pub fn rewrite(
        &self,
        clause: &QueryExpression,
        field_info: &[QueryFieldInfo],
    ) -> Result<RewriteResult, Error> {
        let mut infos = field_info.iter();
        let mut bindings = Vec::new();
        let query = self.walk(clause, &mut infos, None, &mut bindings)?;
        if infos.next().is_some() {
            return Err(Error::InconsistentAnalysis {
                reason: "unconsumed field info after rewrite".to_string(),
            });
        }
        debug!(
            entity = self.composite.entity(self.target).name(),
            bindings = bindings.len(),
            "rewrote clause"
        );
        Ok(RewriteResult { query, bindings })
    }

    fn walk(
        &self,
        query: &QueryExpression,
        infos: &mut std::slice::Iter<'_, QueryFieldInfo>,
        array_context: Option<&Path>,
        bindings: &mut Vec<BoundField>,
    ) -> Result<Option<QueryExpression>, Error> {
        Ok(match query {
            QueryExpression::ValueComparison { op, rvalue, .. } => {
                let info = next(infos)?;
                if self.is_local(info) {
                    Some(QueryExpression::ValueComparison {
                        field: self.localize(info, array_context)?,
                        op: *op,
                        rvalue: rvalue.clone(),
                    })
                } else {
                    None
                }
            }
            QueryExpression::RegexMatch {
                regex,
                case_insensitive,
                multiline,
                extended,
                dot_all,
                ..
            } => {
                let info = next(infos)?;
                if self.is_local(info) {
                    Some(QueryExpression::RegexMatch {
                        field: self.localize(info, array_context)?,
                        regex: regex.clone(),
                        case_insensitive: *case_insensitive,
                        multiline: *multiline,
                        extended: *extended,
                        dot_all: *dot_all,
                    })
                } else {
                    None
                }
            }
            QueryExpression::NaryValueRelational { op, values, .. } => {
                let info = next(infos)?;
                if self.is_local(info) {
                    Some(QueryExpression::NaryValueRelational {
                        field: self.localize(info, array_context)?,
                        op: *op,
                        values: values.clone(),
                    })
                } else {
                    None
                }
            }
            QueryExpression::ArrayContains { op, values, .. } => {
                let info = next(infos)?;
                if self.is_local(info) {
                    Some(QueryExpression::ArrayContains {
                        array: self.localize(info, array_context)?,
                        op: *op,
                        values: values.clone(),
                    })
                } else {
                    None
                }
            }
            QueryExpression::FieldComparison { op, .. } => {
                let left = next(infos)?;
                let right = next(infos)?;
                match (self.is_local(left), self.is_local(right)) {
                    (true, true) => Some(QueryExpression::FieldComparison {
                        field: self.localize(left, array_context)?,
                        op: *op,
                        rfield: self.localize(right, array_context)?,
                    }),
                    (true, false) => Some(QueryExpression::ValueComparison {
                        field: self.localize(left, array_context)?,
                        op: *op,
                        rvalue: Literal::Placeholder(self.placeholder(right, bindings)),
                    }),
                    // The local side becomes the field; swapping the
                    // operands flips the operator.
                    (false, true) => Some(QueryExpression::ValueComparison {
                        field: self.localize(right, array_context)?,
                        op: op.invert(),
                        rvalue: Literal::Placeholder(self.placeholder(left, bindings)),
                    }),
                    (false, false) => None,
                }
            }
            QueryExpression::NaryFieldRelational { op, .. } => {
                let left = next(infos)?;
                let right = next(infos)?;
                match (self.is_local(left), self.is_local(right)) {
                    (true, true) => Some(QueryExpression::NaryFieldRelational {
                        field: self.localize(left, array_context)?,
                        op: *op,
                        rfield: self.localize(right, array_context)?,
                    }),
                    (true, false) => Some(QueryExpression::NaryValueRelational {
                        field: self.localize(left, array_context)?,
                        op: *op,
                        values: ValueList::Placeholder(self.placeholder(right, bindings)),
                    }),
                    // A membership test cannot be flipped onto the value
                    // side; the clause is handled from the other entity.
                    (false, _) => None,
                }
            }
            QueryExpression::ArrayMatch { elem_match, .. } => {
                let info = next(infos)?;
                if self.is_local(info) && !self.is_target_edge(info) {
                    // A plain array of the target entity: the node survives,
                    // its sub-query stays relative to the array.
                    match self.walk(
                        elem_match,
                        infos,
                        Some(&info.full_field_path),
                        bindings,
                    )? {
                        Some(elem) => Some(QueryExpression::ArrayMatch {
                            array: self.localize(info, array_context)?,
                            elem_match: Box::new(elem),
                        }),
                        None => None,
                    }
                } else {
                    // The edge into the target itself, or a foreign array:
                    // the node dissolves into whatever of its sub-query
                    // concerns the target.
                    self.walk(elem_match, infos, None, bindings)?
                }
            }
            QueryExpression::NaryLogical { op, queries } => {
                let rewritten: Vec<Option<QueryExpression>> = queries
                    .iter()
                    .map(|q| self.walk(q, infos, array_context, bindings))
                    .collect::<Result<_, _>>()?;
                combine(*op, rewritten)
            }
        })
    }

    fn is_local(&self, info: &QueryFieldInfo) -> bool {
        info.field_entity == self.target
    }

    /// Whether the field is the resolved reference edge pointing at the
    /// target entity itself.
    fn is_target_edge(&self, info: &QueryFieldInfo) -> bool {
        match self.composite.tree().kind(info.field_node) {
            NodeKind::ResolvedReference { reference, .. } => {
                self.composite.reference(*reference).target() == self.target
            }
            _ => false,
        }
    }

    /// Rebase a local field relative to the target entity, or to the
    /// enclosing array inside a kept element match.
    fn localize(
        &self,
        info: &QueryFieldInfo,
        array_context: Option<&Path>,
    ) -> Result<Path, Error> {
        let base = match array_context {
            Some(array) => array.with(Segment::Any),
            None => self.composite.entity_base(self.target),
        };
        if base.is_empty() {
            return Ok(info.full_field_path.clone());
        }
        if base.matching_prefix(&info.full_field_path) {
            Ok(info.full_field_path.skip(base.len()))
        } else {
            Err(Error::NotRelative {
                field: info.full_field_path.clone(),
                relative_to: base,
            })
        }
    }

    fn placeholder(&self, info: &QueryFieldInfo, bindings: &mut Vec<BoundField>) -> Placeholder {
        let placeholder = Placeholder {
            id: info.id,
            field: info.full_field_path.clone(),
        };
        bindings.push(BoundField {
            placeholder: placeholder.clone(),
            field_info: info.clone(),
        });
        placeholder
    }
}

fn next<'b>(
    infos: &mut std::slice::Iter<'b, QueryFieldInfo>,
) -> Result<&'b QueryFieldInfo, Error> {
    infos.next().ok_or_else(|| Error::InconsistentAnalysis {
        reason: "field info exhausted before the clause was".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assoc::analyze::AnalyzeQuery;
    use crate::assoc::bind::{BindQuery, Binder, BoundValue};
    use crate::testutil::{composite_ac, composite_uc};
    use quilt_query::{and, ComparisonOp, NaryRelationalOp};
    use serde_json::json;

    fn p(s: &str) -> Path {
        s.parse().unwrap()
    }

    fn bind_one(result: &RewriteResult, values: &[serde_json::Value]) -> QueryExpression {
        let binders: Vec<Binder> = result
            .bindings
            .iter()
            .zip(values.iter())
            .map(|(b, v)| Binder::new(b, BoundValue::Value(v.clone())))
            .collect();
        BindQuery::new(binders)
            .unwrap()
            .bind(result.query.as_ref().unwrap())
            .unwrap()
    }

    #[test]
    fn test_simple_assoc_query_both_directions() {
        let composite = composite_ac(&["obj1.c"]);
        let edge = composite.child_reference(&p("obj1.c")).unwrap();
        let c = composite.reference(edge).target();

        let q = QueryExpression::field_cmp(p("_id"), ComparisonOp::Eq, p("$parent.c_ref"));
        let info = AnalyzeQuery::new(&composite, Some(edge)).analyze(&q).unwrap();

        // Rewrite for C: A docs are in hand, C docs will be retrieved.
        let result = RewriteQuery::new(&composite, c).rewrite(&q, &info).unwrap();
        assert_eq!(result.bindings.len(), 1);
        assert_eq!(result.bindings[0].field_info.full_field_path, p("obj1.c_ref"));
        assert_eq!(
            bind_one(&result, &[json!("x")]),
            QueryExpression::eq(p("_id"), json!("x"))
        );

        // Rewrite for A: the reverse relationship.
        let result = RewriteQuery::new(&composite, composite.root())
            .rewrite(&q, &info)
            .unwrap();
        assert_eq!(result.bindings.len(), 1);
        assert_eq!(result.bindings[0].field_info.full_field_path, p("obj1.c.*._id"));
        assert_eq!(
            bind_one(&result, &[json!("x")]),
            QueryExpression::eq(p("obj1.c_ref"), json!("x"))
        );
    }

    #[test]
    fn test_elem_match_over_the_reference_array() {
        let composite = composite_ac(&["obj1.c"]);
        let edge = composite.child_reference(&p("obj1.c")).unwrap();
        let c = composite.reference(edge).target();

        let q = QueryExpression::elem_match(
            p("obj1.c"),
            QueryExpression::field_cmp(p("_id"), ComparisonOp::Eq, p("$parent.c_ref")),
        );
        let info = AnalyzeQuery::new(&composite, None).analyze(&q).unwrap();

        // For C the element match dissolves: the sub-query is already
        // relative to C's root.
        let result = RewriteQuery::new(&composite, c).rewrite(&q, &info).unwrap();
        assert_eq!(
            bind_one(&result, &[json!("x")]),
            QueryExpression::eq(p("_id"), json!("x"))
        );

        // For A it dissolves as well, flipped onto A's side.
        let result = RewriteQuery::new(&composite, composite.root())
            .rewrite(&q, &info)
            .unwrap();
        assert_eq!(
            bind_one(&result, &[json!("x")]),
            QueryExpression::eq(p("obj1.c_ref"), json!("x"))
        );
    }

    #[test]
    fn test_nested_elem_match_with_two_level_parent() {
        let composite = composite_uc();
        let edge = composite.child_reference(&p("users")).unwrap();
        let u = composite.reference(edge).target();

        let q = and(vec![
            Some(QueryExpression::field_cmp(
                p("_id"),
                ComparisonOp::Eq,
                p("$parent.userId"),
            )),
            Some(QueryExpression::elem_match(
                p("authentications"),
                and(vec![
                    Some(QueryExpression::eq(p("providerName"), json!("p"))),
                    Some(QueryExpression::field_cmp(
                        p("principal"),
                        ComparisonOp::Eq,
                        p("$parent.$parent.userRedHatPrincipal"),
                    )),
                ])
                .unwrap(),
            )),
        ])
        .unwrap();
        let info = AnalyzeQuery::new(&composite, Some(edge)).analyze(&q).unwrap();

        // Rewrite for U: the trivial direction. The array node survives,
        // its local fields stay array-relative.
        let result = RewriteQuery::new(&composite, u).rewrite(&q, &info).unwrap();
        assert_eq!(result.bindings.len(), 2);
        assert_eq!(result.bindings[0].field_info.full_field_path, p("userId"));
        assert_eq!(
            result.bindings[1].field_info.full_field_path,
            p("userRedHatPrincipal")
        );
        let expected = and(vec![
            Some(QueryExpression::eq(p("_id"), json!("x"))),
            Some(QueryExpression::elem_match(
                p("authentications"),
                and(vec![
                    Some(QueryExpression::eq(p("providerName"), json!("p"))),
                    Some(QueryExpression::eq(p("principal"), json!("y"))),
                ])
                .unwrap(),
            )),
        ])
        .unwrap();
        assert_eq!(bind_one(&result, &[json!("x"), json!("y")]), expected);

        // Rewrite for UC: the reverse direction. Everything foreign melts
        // away; only UC's own fields remain, compared to bound values.
        let result = RewriteQuery::new(&composite, composite.root())
            .rewrite(&q, &info)
            .unwrap();
        assert_eq!(result.bindings.len(), 2);
        assert_eq!(result.bindings[0].field_info.full_field_path, p("users.*._id"));
        assert_eq!(
            result.bindings[1].field_info.full_field_path,
            p("users.*.authentications.*.principal")
        );
        let expected = and(vec![
            Some(QueryExpression::eq(p("userId"), json!("x"))),
            Some(QueryExpression::eq(p("userRedHatPrincipal"), json!("y"))),
        ])
        .unwrap();
        assert_eq!(bind_one(&result, &[json!("x"), json!("y")]), expected);
    }

    #[test]
    fn test_local_only_clause_keeps_structure() {
        let composite = composite_ac(&["obj1.c"]);
        let q = and(vec![
            Some(QueryExpression::eq(p("obj1.c_ref"), json!("x"))),
            Some(QueryExpression::within(p("_id"), vec![json!(1), json!(2)])),
        ])
        .unwrap();
        let info = AnalyzeQuery::new(&composite, None).analyze(&q).unwrap();

        let result = RewriteQuery::new(&composite, composite.root())
            .rewrite(&q, &info)
            .unwrap();
        // No placeholders, operator and child count preserved, paths
        // unchanged at the root.
        assert!(result.bindings.is_empty());
        assert_eq!(result.query, Some(q));
    }

    #[test]
    fn test_foreign_membership_direction_is_dropped() {
        let composite = composite_ac(&["obj1.c"]);
        let c = composite.child_metadata(&p("obj1.c")).unwrap();

        // The membership field belongs to A; for target C nothing remains.
        let q = QueryExpression::NaryFieldRelational {
            field: p("obj1.c_ref"),
            op: NaryRelationalOp::In,
            rfield: p("obj1.c.*.name"),
        };
        let info = AnalyzeQuery::new(&composite, None).analyze(&q).unwrap();
        let result = RewriteQuery::new(&composite, c).rewrite(&q, &info).unwrap();
        assert!(result.query.is_none());
        assert!(result.bindings.is_empty());
    }

    #[test]
    fn test_field_outside_the_target_prefix_is_an_error() {
        let composite = composite_ac(&["obj1.c"]);
        let c = composite.child_metadata(&p("obj1.c")).unwrap();

        // The edge field itself is owned by C but does not sit under C's
        // prefix; a clause that uses it as a plain array is inconsistent.
        let q = QueryExpression::ArrayContains {
            array: p("obj1.c"),
            op: quilt_query::ContainsOp::Any,
            values: vec![json!(1)],
        };
        let info = AnalyzeQuery::new(&composite, None).analyze(&q).unwrap();
        assert!(matches!(
            RewriteQuery::new(&composite, c).rewrite(&q, &info),
            Err(Error::NotRelative { .. })
        ));
    }
}
