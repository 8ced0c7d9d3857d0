//! Association queries.
//!
//! An association query is the rewritten, partially bound query governing
//! which child documents belong under one reference edge. It is built once
//! per edge per request, from the conjuncts the analyzer attributed to that
//! edge, and never mutated afterward.

use quilt_query::{and, simplify, QueryExpression};
use tracing::debug;

use super::analyze::Conjunct;
use super::rewrite::{BoundField, RewriteQuery};
use crate::error::Error;
use crate::schema::{CompositeMetadata, EntityId, ReferenceId};

/// An edge query along with its binding information.
#[derive(Debug, Clone)]
pub struct AssociationQuery {
    query: Option<QueryExpression>,
    bindings: Vec<BoundField>,
    reference: ReferenceId,
}

impl AssociationQuery {
    /// Build the association query for one reference edge.
    ///
    /// Each conjunct is rewritten for `current` (the entity whose documents
    /// the query will retrieve); the fragments are combined with AND and
    /// canonicalized, and the placeholders accumulate in first-occurrence
    /// order.
    pub fn new(
        composite: &CompositeMetadata,
        current: EntityId,
        reference: ReferenceId,
        conjuncts: &[Conjunct],
    ) -> Result<Self, Error> {
        let rewriter = RewriteQuery::new(composite, current);
        let mut queries = Vec::with_capacity(conjuncts.len());
        let mut bindings = Vec::new();
        for conjunct in conjuncts {
            let result = rewriter.rewrite(&conjunct.clause, &conjunct.field_info)?;
            queries.push(result.query);
            bindings.extend(result.bindings);
        }
        let query = and(queries).map(simplify::canonicalize);
        debug!(
            reference = %composite.reference(reference).path(),
            placeholders = bindings.len(),
            "built association query"
        );
        Ok(AssociationQuery {
            query,
            bindings,
            reference,
        })
    }

    /// The rewritten query, absent when the edge carries no predicate.
    pub fn query(&self) -> Option<&QueryExpression> {
        self.query.as_ref()
    }

    /// The placeholders the query still requires, in first-occurrence
    /// order.
    pub fn bindings(&self) -> &[BoundField] {
        &self.bindings
    }

    /// The reference edge this query was built for.
    pub fn reference(&self) -> ReferenceId {
        self.reference
    }
}
