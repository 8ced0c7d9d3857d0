//! Opportunistic query canonicalization.
//!
//! The only rewrite performed here merges sibling `in`/`not-in` clauses:
//!
//! ```text
//! {$or: [.., {$in: {field: x, values: [v]}}, .., {$in: {field: x, values: [w]}}, ..]}
//! ```
//!
//! becomes
//!
//! ```text
//! {$or: [.., {$in: {field: x, values: [v, w]}}, ..]}
//! ```
//!
//! The merge applies under either logical connective, groups clauses by
//! field and relational operator, and deduplicates the merged value set.
//! Groups with fewer than two members are left untouched. The pass is not
//! load-bearing for correctness; it improves the predicates the association
//! engine sends to backends.

use std::collections::HashMap;

use serde_json::Value;

use crate::expr::{NaryLogicalOp, NaryRelationalOp, QueryExpression, ValueList};
use crate::path::Path;

/// Canonicalize a query, merging mergeable `in`/`not-in` siblings at every
/// logical node.
pub fn canonicalize(query: QueryExpression) -> QueryExpression {
    match query {
        QueryExpression::NaryLogical { op, queries } => {
            let queries: Vec<QueryExpression> =
                queries.into_iter().map(canonicalize).collect();
            merge_relational_siblings(op, queries)
        }
        QueryExpression::ArrayMatch { array, elem_match } => QueryExpression::ArrayMatch {
            array,
            elem_match: Box::new(canonicalize(*elem_match)),
        },
        other => other,
    }
}

/// Merge `in`/`not-in` clauses with the same field and operator under one
/// logical node. Clauses keep their first-occurrence positions.
fn merge_relational_siblings(
    op: NaryLogicalOp,
    queries: Vec<QueryExpression>,
) -> QueryExpression {
    // Group mergeable clause indexes by (field, relational operator).
    let mut groups: HashMap<(Path, NaryRelationalOp), Vec<usize>> = HashMap::new();
    for (i, q) in queries.iter().enumerate() {
        if let QueryExpression::NaryValueRelational {
            field,
            op: rel_op,
            values: ValueList::Values(_),
        } = q
        {
            groups.entry((field.clone(), *rel_op)).or_default().push(i);
        }
    }

    if !groups.values().any(|members| members.len() > 1) {
        return QueryExpression::NaryLogical { op, queries };
    }

    // Rebuild the clause list: the first member of each mergeable group
    // becomes the merged clause, later members are dropped.
    let mut merged_into: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut dropped: Vec<bool> = vec![false; queries.len()];
    for members in groups.into_values() {
        if members.len() > 1 {
            for &m in &members[1..] {
                dropped[m] = true;
            }
            merged_into.insert(members[0], members);
        }
    }

    let mut out = Vec::with_capacity(queries.len());
    for (i, q) in queries.iter().enumerate() {
        if dropped[i] {
            continue;
        }
        match merged_into.get(&i) {
            Some(members) => {
                let mut merged: Vec<Value> = Vec::new();
                for &m in members {
                    if let QueryExpression::NaryValueRelational {
                        values: ValueList::Values(values),
                        ..
                    } = &queries[m]
                    {
                        for v in values {
                            if !merged.contains(v) {
                                merged.push(v.clone());
                            }
                        }
                    }
                }
                if let QueryExpression::NaryValueRelational { field, op: rel_op, .. } =
                    &queries[i]
                {
                    out.push(QueryExpression::NaryValueRelational {
                        field: field.clone(),
                        op: *rel_op,
                        values: ValueList::Values(merged),
                    });
                }
            }
            None => out.push(q.clone()),
        }
    }
    QueryExpression::NaryLogical { op, queries: out }
}
