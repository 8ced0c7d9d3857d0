//! Quilt query IR - paths, query expressions, and placeholders.
//!
//! This crate defines the types shared by everything above it in the
//! federation core: the path type used to address schema and document trees,
//! the immutable query expression tree, and the placeholder machinery that
//! lets a rewritten query defer values to a later binding step.

pub mod expr;
pub mod path;
pub mod simplify;

pub use expr::{
    and, combine, or, ComparisonOp, ContainsOp, Literal, NaryLogicalOp, NaryRelationalOp,
    Placeholder, QueryExpression, ValueList,
};
pub use path::{MutablePath, Path, PathParseError, Segment};
