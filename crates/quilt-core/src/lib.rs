//! Quilt core - composite metadata, query rewriting, and the association
//! engine.
//!
//! Quilt is the federation core of a document-oriented data-access layer: a
//! single logical entity is composed from physically separate entities
//! connected by reference fields. This crate builds the request-scoped
//! composite metadata tree, decomposes queries written against the
//! composite view into per-entity queries with deferred value bindings,
//! executes per-entity retrieval through narrow capability traits, and
//! stitches the partial results back into one composite document tree.
//!
//! The analysis/rewrite/bind pipeline is purely functional over immutable
//! inputs; once built, composite metadata and association queries can be
//! shared read-only across concurrent requests. The only mutation surface
//! is document attachment into parent slot arrays.

pub mod assoc;
pub mod error;
pub mod exec;
pub mod schema;

#[cfg(test)]
mod testutil;

pub use assoc::{
    AnalyzeQuery, AssociationQuery, BindQuery, Binder, BoundField, BoundValue, Conjunct,
    QueryFieldInfo, RewriteQuery, RewriteResult,
};
pub use error::Error;
pub use exec::{
    associate_documents, write_child_queries_from_parent_document,
    write_queries_for_join_tuples, ChildSlot, DocId, DocIdExtractor, DocumentSource,
    JoinSource, JoinTuple, QueryEvaluator, ResultDocument, Retrieve, SimpleEvaluator, Step,
    Unique,
};
pub use schema::{
    CompositeEntity, CompositeMetadata, ElementDef, EntityId, EntitySchema, FieldDef,
    FieldDefKind, FieldTree, MetadataLookup, NodeId, NodeKind, ReferenceEdge, ReferenceId,
    SimpleType,
};

/// Re-export the query IR.
pub use quilt_query as query;
