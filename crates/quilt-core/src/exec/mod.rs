//! The association/join engine and result stream pipeline.
//!
//! This module drives execution: per-slot child query construction from
//! fetched parent documents, cross-product join tuple enumeration, document
//! attachment, and the lazy pull-based result stream operators.

mod document;
mod eval;
mod join;
mod stream;
mod tuples;

pub use document::{get_value, get_values, ChildSlot, DocId, DocIdExtractor, ResultDocument};
pub use eval::{QueryEvaluator, SimpleEvaluator};
pub use join::{
    associate_documents, associate_documents_in_slot, join_tuples,
    write_child_queries_from_parent_document, write_queries_for_join_tuples, JoinSource,
    JoinTuple,
};
pub use stream::{DocumentSource, DocumentStream, Retrieve, Step, Unique};
pub use tuples::{cross_product, CrossProduct};
