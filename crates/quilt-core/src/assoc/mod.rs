//! Query analysis, rewriting, and binding.
//!
//! The association pipeline turns a query written against the composite
//! view into per-entity fragments: the analyzer attributes every field
//! occurrence to its owning entity, the rewriter produces a fragment per
//! target entity with placeholders for foreign values, and the binder fills
//! those placeholders from fetched documents.

mod analyze;
mod association;
mod bind;
mod rewrite;

pub use analyze::{AnalyzeQuery, Conjunct, QueryFieldInfo};
pub use association::AssociationQuery;
pub use bind::{BindQuery, Binder, BoundValue};
pub use rewrite::{BoundField, RewriteQuery, RewriteResult};
