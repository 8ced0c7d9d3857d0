//! The query expression tree.
//!
//! Queries are immutable tagged-union trees. Field references carry a
//! [`Path`] whose interpretation is context-relative: absolute at the top of
//! a query, re-based to "relative to the array" inside an [`ArrayMatch`]
//! sub-query.
//!
//! Literal positions admit [`Placeholder`]s so that a rewritten, not yet
//! bound query is a first-class value of the same type as an executable one.
//!
//! [`ArrayMatch`]: QueryExpression::ArrayMatch

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::Path;

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    /// Equal.
    Eq,
    /// Not equal.
    Neq,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
}

impl ComparisonOp {
    /// The operator obtained by swapping the operands.
    pub fn invert(self) -> Self {
        match self {
            ComparisonOp::Eq => ComparisonOp::Eq,
            ComparisonOp::Neq => ComparisonOp::Neq,
            ComparisonOp::Lt => ComparisonOp::Gt,
            ComparisonOp::Lte => ComparisonOp::Gte,
            ComparisonOp::Gt => ComparisonOp::Lt,
            ComparisonOp::Gte => ComparisonOp::Lte,
        }
    }
}

/// N-ary relational operators over a value set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NaryRelationalOp {
    /// Membership in the value set.
    In,
    /// Absence from the value set.
    NotIn,
}

/// Array containment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainsOp {
    /// The array contains at least one of the values.
    Any,
    /// The array contains all of the values.
    All,
    /// The array contains none of the values.
    None,
}

/// N-ary logical connectives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NaryLogicalOp {
    /// Conjunction.
    And,
    /// Disjunction.
    Or,
}

/// A stand-in for a field value that must be supplied later from another
/// entity's fetched document.
///
/// The id ties the placeholder back to the field-analysis record it was
/// created for; ids are unique within one analysis pass. The field path is
/// carried along so that binding errors can name the field involved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placeholder {
    /// Analysis-assigned slot id.
    pub id: u32,
    /// Absolute path of the field the value will come from.
    pub field: Path,
}

/// A literal position in a query: a concrete value or a placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    /// A concrete value.
    Value(Value),
    /// A deferred value.
    Placeholder(Placeholder),
}

/// A value-list position in a query: concrete values or a placeholder for a
/// whole list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueList {
    /// Concrete values.
    Values(Vec<Value>),
    /// A deferred value list.
    Placeholder(Placeholder),
}

/// An immutable query expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryExpression {
    /// Compare a field against a value.
    ValueComparison {
        /// The field being compared.
        field: Path,
        /// The comparison operator.
        op: ComparisonOp,
        /// The right-hand value.
        rvalue: Literal,
    },
    /// Compare a field against another field.
    FieldComparison {
        /// The left field.
        field: Path,
        /// The comparison operator.
        op: ComparisonOp,
        /// The right field.
        rfield: Path,
    },
    /// Match a string field against a regular expression.
    RegexMatch {
        /// The field being matched.
        field: Path,
        /// The pattern.
        regex: String,
        /// Case-insensitive matching.
        case_insensitive: bool,
        /// Multiline matching.
        multiline: bool,
        /// Extended (whitespace-tolerant) syntax.
        extended: bool,
        /// `.` matches newlines.
        dot_all: bool,
    },
    /// Relate a field to a set of values (`in` / `not-in`).
    NaryValueRelational {
        /// The field being tested.
        field: Path,
        /// The relational operator.
        op: NaryRelationalOp,
        /// The value set.
        values: ValueList,
    },
    /// Relate a field to the values of an array field.
    NaryFieldRelational {
        /// The field being tested.
        field: Path,
        /// The relational operator.
        op: NaryRelationalOp,
        /// The array field supplying the value set.
        rfield: Path,
    },
    /// Test an array field for containment of values.
    ArrayContains {
        /// The array field.
        array: Path,
        /// The containment operator.
        op: ContainsOp,
        /// The values to look for.
        values: Vec<Value>,
    },
    /// Match array elements against a sub-query interpreted relative to the
    /// array.
    ArrayMatch {
        /// The array field.
        array: Path,
        /// The element sub-query.
        elem_match: Box<QueryExpression>,
    },
    /// Combine sub-expressions with a logical connective.
    NaryLogical {
        /// The connective.
        op: NaryLogicalOp,
        /// The sub-expressions.
        queries: Vec<QueryExpression>,
    },
}

impl QueryExpression {
    /// A field-to-value comparison.
    pub fn cmp(field: Path, op: ComparisonOp, rvalue: Value) -> Self {
        QueryExpression::ValueComparison {
            field,
            op,
            rvalue: Literal::Value(rvalue),
        }
    }

    /// A field-equals-value comparison.
    pub fn eq(field: Path, rvalue: Value) -> Self {
        QueryExpression::cmp(field, ComparisonOp::Eq, rvalue)
    }

    /// A field-to-field comparison.
    pub fn field_cmp(field: Path, op: ComparisonOp, rfield: Path) -> Self {
        QueryExpression::FieldComparison { field, op, rfield }
    }

    /// A membership test against concrete values.
    pub fn within(field: Path, values: Vec<Value>) -> Self {
        QueryExpression::NaryValueRelational {
            field,
            op: NaryRelationalOp::In,
            values: ValueList::Values(values),
        }
    }

    /// A non-membership test against concrete values.
    pub fn not_within(field: Path, values: Vec<Value>) -> Self {
        QueryExpression::NaryValueRelational {
            field,
            op: NaryRelationalOp::NotIn,
            values: ValueList::Values(values),
        }
    }

    /// An element-match over an array field.
    pub fn elem_match(array: Path, elem_match: QueryExpression) -> Self {
        QueryExpression::ArrayMatch {
            array,
            elem_match: Box::new(elem_match),
        }
    }

    /// A regex match with all flags off.
    pub fn regex(field: Path, regex: impl Into<String>) -> Self {
        QueryExpression::RegexMatch {
            field,
            regex: regex.into(),
            case_insensitive: false,
            multiline: false,
            extended: false,
            dot_all: false,
        }
    }

    /// Collect the placeholders remaining in this query, in document order.
    pub fn placeholders(&self) -> Vec<&Placeholder> {
        let mut out = Vec::new();
        self.collect_placeholders(&mut out);
        out
    }

    fn collect_placeholders<'a>(&'a self, out: &mut Vec<&'a Placeholder>) {
        match self {
            QueryExpression::ValueComparison {
                rvalue: Literal::Placeholder(ph),
                ..
            } => out.push(ph),
            QueryExpression::NaryValueRelational {
                values: ValueList::Placeholder(ph),
                ..
            } => out.push(ph),
            QueryExpression::ArrayMatch { elem_match, .. } => {
                elem_match.collect_placeholders(out)
            }
            QueryExpression::NaryLogical { queries, .. } => {
                for q in queries {
                    q.collect_placeholders(out);
                }
            }
            _ => {}
        }
    }
}

/// Combine queries with a logical connective, dropping absent sub-queries.
///
/// Zero surviving sub-queries yields no query at all; a single survivor is
/// returned unwrapped, never wrapped in a redundant single-child logical
/// node.
pub fn combine(
    op: NaryLogicalOp,
    queries: impl IntoIterator<Item = Option<QueryExpression>>,
) -> Option<QueryExpression> {
    let mut survivors: Vec<QueryExpression> = queries.into_iter().flatten().collect();
    match survivors.len() {
        0 => None,
        1 => Some(survivors.remove(0)),
        _ => Some(QueryExpression::NaryLogical {
            op,
            queries: survivors,
        }),
    }
}

/// Combine queries with AND, dropping absent sub-queries.
pub fn and(queries: impl IntoIterator<Item = Option<QueryExpression>>) -> Option<QueryExpression> {
    combine(NaryLogicalOp::And, queries)
}

/// Combine queries with OR, dropping absent sub-queries.
pub fn or(queries: impl IntoIterator<Item = Option<QueryExpression>>) -> Option<QueryExpression> {
    combine(NaryLogicalOp::Or, queries)
}
