//! Child query construction and document association.
//!
//! At retrieval time an association query is turned into concrete per-slot
//! child queries by binding placeholder values out of the parent document;
//! fetched child documents are then attached into the parent's slot arrays,
//! unconditionally when the edge carries no cross-entity predicate, filtered
//! through the bound query otherwise.
//!
//! When a query spans several contributing entities, the full cross product
//! of the candidate binders per source is enumerated - one concrete query
//! per join tuple. No partial-join short-circuiting is performed; candidate
//! reduction belongs to upstream filtering. For large candidate sets this
//! is a known scalability limit.

use std::collections::HashMap;

use quilt_query::{and, QueryExpression};
use tracing::debug;

use super::document::{ChildSlot, ResultDocument};
use super::eval::QueryEvaluator;
use super::tuples::cross_product;
use crate::assoc::{AssociationQuery, BindQuery};
use crate::error::Error;
use crate::schema::CompositeMetadata;

/// For a parent document already fetched, produce the concrete query for
/// each child slot the edge feeds.
///
/// A slot maps to `None` when the edge carries no predicate; every fetched
/// child is then attached to that slot unconditionally.
pub fn write_child_queries_from_parent_document(
    composite: &CompositeMetadata,
    aq: &AssociationQuery,
    parent: &ResultDocument,
) -> Result<HashMap<ChildSlot, Option<QueryExpression>>, Error> {
    let mut queries = HashMap::new();
    for (slot, binders) in parent.binders_for_child(composite, aq)? {
        let query = match aq.query() {
            Some(query) => Some(binders.bind(query)?),
            None => None,
        };
        queries.insert(slot, query);
    }
    debug!(slots = queries.len(), "wrote child queries from parent document");
    Ok(queries)
}

/// Associate child documents to every slot the edge feeds in the parent
/// document.
pub fn associate_documents(
    composite: &CompositeMetadata,
    parent: &mut ResultDocument,
    children: &[ResultDocument],
    aq: &AssociationQuery,
    evaluator: &dyn QueryEvaluator,
) -> Result<(), Error> {
    let slots: Vec<ChildSlot> = parent.slots(aq.reference()).to_vec();
    for slot in &slots {
        associate_documents_in_slot(composite, parent, slot, children, aq, evaluator)?;
    }
    Ok(())
}

/// Associate child documents to one slot of the parent document.
///
/// With no binders, every child is attached; otherwise the association
/// query is bound with the slot's values and used as a filter. The slot
/// array is created on first attachment and children keep their retrieval
/// order. An empty filter result is a legitimate outcome.
pub fn associate_documents_in_slot(
    composite: &CompositeMetadata,
    parent: &mut ResultDocument,
    slot: &ChildSlot,
    children: &[ResultDocument],
    aq: &AssociationQuery,
    evaluator: &dyn QueryEvaluator,
) -> Result<(), Error> {
    if children.is_empty() {
        return Ok(());
    }
    let binders = parent.binders_for_slot(composite, slot, aq)?;
    let filter = match aq.query() {
        Some(query) if !binders.is_empty() => Some(binders.bind(query)?),
        _ => None,
    };
    match filter {
        None => {
            for child in children {
                parent.attach(slot, child.doc().clone());
            }
        }
        Some(filter) => {
            debug!(slot = %slot.slot_path(), "associating documents through bound filter");
            for child in children {
                if evaluator.matches(&filter, child.doc())? {
                    parent.attach(slot, child.doc().clone());
                }
            }
        }
    }
    Ok(())
}

/// One source contributing binder candidates to a multi-entity join: the
/// association query for its edge and one candidate binder set per
/// document.
pub struct JoinSource<'a> {
    aq: &'a AssociationQuery,
    candidates: Vec<BindQuery>,
}

impl<'a> JoinSource<'a> {
    /// The parent side of a join: one candidate, read from the given slot.
    pub fn from_parent_slot(
        composite: &CompositeMetadata,
        aq: &'a AssociationQuery,
        parent: &ResultDocument,
        slot: &ChildSlot,
    ) -> Result<Self, Error> {
        Ok(JoinSource {
            aq,
            candidates: vec![parent.binders_for_slot(composite, slot, aq)?],
        })
    }

    /// A contributing child entity: one candidate per fetched document.
    pub fn from_documents(
        composite: &CompositeMetadata,
        aq: &'a AssociationQuery,
        documents: &[ResultDocument],
    ) -> Result<Self, Error> {
        Ok(JoinSource {
            aq,
            candidates: documents
                .iter()
                .map(|doc| doc.binders_for_doc(composite, aq))
                .collect::<Result<_, _>>()?,
        })
    }

    /// The association query for this source's edge.
    pub fn association_query(&self) -> &AssociationQuery {
        self.aq
    }

    /// The candidate binder sets.
    pub fn candidates(&self) -> &[BindQuery] {
        &self.candidates
    }
}

/// One concrete combination of contributing binders across sources.
#[derive(Debug, Clone)]
pub struct JoinTuple {
    /// One binder set per contributing source.
    pub binders: Vec<BindQuery>,
}

/// Enumerate the full cross product of the sources' candidate binder sets.
pub fn join_tuples(sources: &[JoinSource<'_>]) -> Vec<JoinTuple> {
    cross_product(sources.iter().map(|s| s.candidates.to_vec()).collect())
        .map(|binders| JoinTuple { binders })
        .collect()
}

/// Produce one fully concrete query per join tuple.
///
/// The edge queries of all sources are combined with AND (absent queries
/// drop out); each tuple's binders are combined - the union must be
/// disjoint - and bound into the combined query. A binding failure is
/// surfaced, not skipped: a binder set missing a cover fails identically
/// for every tuple sharing the placeholder.
pub fn write_queries_for_join_tuples(
    sources: &[JoinSource<'_>],
) -> Result<Vec<QueryExpression>, Error> {
    let query = and(sources.iter().map(|s| s.aq.query().cloned()));
    let Some(query) = query else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for tuple in join_tuples(sources) {
        let binders = BindQuery::combine(tuple.binders)?;
        out.push(binders.bind(&query)?);
    }
    debug!(queries = out.len(), "wrote queries for join tuples");
    Ok(out)
}
