//! Query field analysis.
//!
//! Analysis walks a query expression against a composite metadata tree and
//! records, for every field occurrence, where the field resolves to and
//! which entity owns it. The result drives the rewriter's local/foreign
//! partitioning; analysis itself never mutates the query.

use quilt_query::{NaryLogicalOp, Path, QueryExpression};

use crate::error::Error;
use crate::schema::{CompositeMetadata, EntityId, NodeId, NodeKind, ReferenceId};

/// One field occurrence found while analyzing a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFieldInfo {
    /// Analysis-assigned id, unique within one analyzer instance.
    pub id: u32,
    /// The field as written in the clause.
    pub field_name_in_clause: Path,
    /// The fully resolved absolute path.
    pub full_field_path: Path,
    /// The resolved schema node.
    pub field_node: NodeId,
    /// The entity owning the field.
    pub field_entity: EntityId,
    /// The resolved reference the field is reached through, if any.
    pub field_reference: Option<ReferenceId>,
}

/// One top-level AND-ed clause of a query, with the field analysis relevant
/// to it. Conjuncts are the unit the rewriter groups by target entity.
#[derive(Debug, Clone)]
pub struct Conjunct {
    /// The clause.
    pub clause: QueryExpression,
    /// Field occurrences within the clause, in document order.
    pub field_info: Vec<QueryFieldInfo>,
}

/// Walks queries against a composite metadata tree, collecting field
/// information.
///
/// Bare field names are interpreted against the analyzer's context: the
/// composite root, or, when the query arrived through a reference edge, the
/// referenced entity. Ids stay unique across every query analyzed by one
/// instance, so binders derived from one request's analysis never collide.
pub struct AnalyzeQuery<'a> {
    composite: &'a CompositeMetadata,
    source_reference: Option<ReferenceId>,
    next_id: u32,
}

impl<'a> AnalyzeQuery<'a> {
    /// Create an analyzer interpreting fields against the composite root,
    /// or against the entity a reference edge points at.
    pub fn new(composite: &'a CompositeMetadata, source_reference: Option<ReferenceId>) -> Self {
        AnalyzeQuery {
            composite,
            source_reference,
            next_id: 0,
        }
    }

    /// Analyze one query, returning one record per field occurrence in
    /// document order.
    pub fn analyze(&mut self, query: &QueryExpression) -> Result<Vec<QueryFieldInfo>, Error> {
        let context = match self.source_reference {
            Some(reference) => self.composite.reference(reference).field(),
            None => self.composite.tree().root(),
        };
        let mut out = Vec::new();
        self.walk(query, context, &mut out)?;
        Ok(out)
    }

    /// Split a query into its top-level AND-ed conjuncts and analyze each.
    /// A query that is not a top-level AND is a single conjunct.
    pub fn conjuncts(&mut self, query: &QueryExpression) -> Result<Vec<Conjunct>, Error> {
        let clauses: Vec<&QueryExpression> = match query {
            QueryExpression::NaryLogical { op: NaryLogicalOp::And, queries } => {
                queries.iter().collect()
            }
            other => vec![other],
        };
        clauses
            .into_iter()
            .map(|clause| {
                Ok(Conjunct {
                    clause: clause.clone(),
                    field_info: self.analyze(clause)?,
                })
            })
            .collect()
    }

    fn walk(
        &mut self,
        query: &QueryExpression,
        context: NodeId,
        out: &mut Vec<QueryFieldInfo>,
    ) -> Result<(), Error> {
        match query {
            QueryExpression::ValueComparison { field, .. }
            | QueryExpression::RegexMatch { field, .. }
            | QueryExpression::NaryValueRelational { field, .. } => {
                self.record(field, context, out)?;
            }
            QueryExpression::FieldComparison { field, rfield, .. }
            | QueryExpression::NaryFieldRelational { field, rfield, .. } => {
                self.record(field, context, out)?;
                self.record(rfield, context, out)?;
            }
            QueryExpression::ArrayContains { array, .. } => {
                self.record(array, context, out)?;
            }
            QueryExpression::ArrayMatch { array, elem_match } => {
                let node = self.record(array, context, out)?;
                match self.composite.tree().kind(node) {
                    NodeKind::Array { .. } | NodeKind::ResolvedReference { .. } => {}
                    _ => {
                        return Err(Error::ContextMismatch {
                            path: self.composite.full_path(node),
                        })
                    }
                }
                // Element sub-queries are interpreted relative to the array.
                self.walk(elem_match, node, out)?;
            }
            QueryExpression::NaryLogical { queries, .. } => {
                for q in queries {
                    self.walk(q, context, out)?;
                }
            }
        }
        Ok(())
    }

    fn record(
        &mut self,
        field: &Path,
        context: NodeId,
        out: &mut Vec<QueryFieldInfo>,
    ) -> Result<NodeId, Error> {
        let node = self
            .composite
            .tree()
            .resolve(context, field)?
            .ok_or_else(|| Error::UnknownField { field: field.clone() })?;
        let reference = self.composite.resolved_reference_of_node(node);
        let entity = self.composite.entity_of_node(node);
        let info = QueryFieldInfo {
            id: self.next_id,
            field_name_in_clause: field.clone(),
            full_field_path: self.composite.full_path(node),
            field_node: node,
            field_entity: entity,
            field_reference: reference,
        };
        self.next_id += 1;
        out.push(info);
        Ok(node)
    }
}
