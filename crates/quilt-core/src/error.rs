//! Core error types.
//!
//! Errors are grouped by where they arise: path resolution, query rewriting,
//! and binding. All of them are fatal to the current request; the core never
//! retries. Each variant carries the path or field and entity involved so
//! the error is actionable at the request boundary.

use quilt_query::Path;
use thiserror::Error;

/// Core federation errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A path segment is structurally invalid for the node it was applied to.
    #[error("invalid segment '{segment}' in path '{path}': {reason}")]
    InvalidSegment {
        /// The path being resolved.
        path: Path,
        /// The offending segment.
        segment: String,
        /// Why the segment cannot be applied.
        reason: String,
    },

    /// `$parent` was requested above the tree root.
    #[error("cannot step to $parent above the tree root while resolving '{path}'")]
    ParentOfRoot {
        /// The path being resolved.
        path: Path,
    },

    /// A query references a field the composite metadata does not contain.
    #[error("field '{field}' is not part of the composite metadata")]
    UnknownField {
        /// The field as written in the query.
        field: Path,
    },

    /// The metadata lookup could not locate a referenced entity at all.
    #[error("unknown entity '{entity}:{version}' referenced at '{path}'")]
    UnknownEntity {
        /// The referenced entity name.
        entity: String,
        /// The requested version.
        version: String,
        /// The reference field path.
        path: Path,
    },

    /// An absolute field cannot be expressed relative to a target entity.
    #[error("field '{field}' cannot be written relative to '{relative_to}'")]
    NotRelative {
        /// The absolute field path.
        field: Path,
        /// The prefix it was expected to fall under.
        relative_to: Path,
    },

    /// A query and its field analysis do not line up.
    #[error("query and field analysis are inconsistent: {reason}")]
    InconsistentAnalysis {
        /// What went out of step.
        reason: String,
    },

    /// An array-match sub-query was applied to something that is not an
    /// array.
    #[error("'{path}' is not an array; element match is not applicable")]
    ContextMismatch {
        /// The non-array path.
        path: Path,
    },

    /// A placeholder had no covering binder at bind time.
    #[error("no binder covers the placeholder for field '{field}'")]
    UnboundPlaceholder {
        /// The field the placeholder stands in for.
        field: Path,
    },

    /// Two binders claimed the same placeholder.
    #[error("overlapping binders for field '{field}'")]
    OverlappingBinders {
        /// The doubly-covered field.
        field: Path,
    },

    /// An entity declares no identity fields, so no identity extractor can
    /// be built for it.
    #[error("entity '{entity}' declares no identity fields")]
    MissingIdentity {
        /// The entity name.
        entity: String,
    },

    /// A regular expression in a query failed to compile.
    #[error("invalid regular expression '{pattern}': {reason}")]
    InvalidRegex {
        /// The pattern.
        pattern: String,
        /// The compile failure.
        reason: String,
    },

    /// An error surfaced by a document source.
    #[error("document source error: {0}")]
    Source(String),
}
