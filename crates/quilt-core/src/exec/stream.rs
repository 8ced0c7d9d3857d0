//! The result stream pipeline.
//!
//! Steps are lazy, finite, single-pass pull iterators over result
//! documents; a step may wrap another step. [`Retrieve`] adapts a
//! [`DocumentSource`] stream into result documents; [`Unique`] filters an
//! upstream step by identity key. Early termination is the consumer simply
//! stopping iteration.

use std::collections::HashSet;

use quilt_query::QueryExpression;
use serde_json::Value;

use super::document::{DocId, ResultDocument};
use crate::error::Error;
use crate::schema::{CompositeMetadata, EntityId};

/// A lazy stream of raw documents produced by a backend driver.
pub type DocumentStream<'a> = Box<dyn Iterator<Item = Result<Value, Error>> + 'a>;

/// The per-entity document retrieval capability.
pub trait DocumentSource {
    /// Retrieve the documents of one entity matching an optional query.
    fn find(
        &self,
        entity: &str,
        query: Option<&QueryExpression>,
    ) -> Result<DocumentStream<'_>, Error>;
}

/// A pipeline step: a lazy, finite, non-restartable sequence of result
/// documents.
pub trait Step: Iterator<Item = Result<ResultDocument, Error>> {}

impl<T: Iterator<Item = Result<ResultDocument, Error>>> Step for T {}

/// The retrieval step: pulls raw documents for one entity and wraps them
/// as result documents.
pub struct Retrieve<'a> {
    composite: &'a CompositeMetadata,
    entity: EntityId,
    stream: DocumentStream<'a>,
}

impl<'a> Retrieve<'a> {
    /// Start retrieval for one entity of the composite tree.
    pub fn new(
        composite: &'a CompositeMetadata,
        entity: EntityId,
        source: &'a dyn DocumentSource,
        query: Option<&QueryExpression>,
    ) -> Result<Self, Error> {
        let stream = source.find(composite.entity(entity).name(), query)?;
        Ok(Retrieve {
            composite,
            entity,
            stream,
        })
    }
}

impl Iterator for Retrieve<'_> {
    type Item = Result<ResultDocument, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let doc = self.stream.next()?;
        Some(doc.and_then(|doc| ResultDocument::new(self.composite, self.entity, doc)))
    }
}

/// The deduplication step: keeps the first occurrence of each identity
/// key, in upstream order.
///
/// The identity set lives exactly as long as one traversal and is owned by
/// it alone.
pub struct Unique<S> {
    source: S,
    seen: HashSet<DocId>,
}

impl<S: Step> Unique<S> {
    /// Wrap an upstream step.
    pub fn new(source: S) -> Self {
        Unique {
            source,
            seen: HashSet::new(),
        }
    }
}

impl<S: Step> Iterator for Unique<S> {
    type Item = Result<ResultDocument, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.source.next()? {
                Ok(doc) => {
                    if self.seen.insert(doc.doc_id().clone()) {
                        return Some(Ok(doc));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::composite_ac;
    use serde_json::json;

    /// A source serving fixed documents, ignoring the query.
    struct FixedSource {
        docs: Vec<Value>,
    }

    impl DocumentSource for FixedSource {
        fn find(
            &self,
            _entity: &str,
            _query: Option<&QueryExpression>,
        ) -> Result<DocumentStream<'_>, Error> {
            Ok(Box::new(self.docs.clone().into_iter().map(Ok)))
        }
    }

    #[test]
    fn test_retrieve_wraps_documents() {
        let composite = composite_ac(&[]);
        let source = FixedSource {
            docs: vec![json!({"_id": "a1"}), json!({"_id": "a2"})],
        };

        let step = Retrieve::new(&composite, composite.root(), &source, None).unwrap();
        let docs: Vec<ResultDocument> = step.collect::<Result<_, _>>().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].entity(), composite.root());
        assert_eq!(docs[0].doc()["_id"], json!("a1"));
    }

    #[test]
    fn test_unique_keeps_first_occurrence_in_order() {
        let composite = composite_ac(&[]);
        // Identity keys a, b, a, c, b.
        let source = FixedSource {
            docs: vec![
                json!({"_id": "a", "n": 1}),
                json!({"_id": "b", "n": 2}),
                json!({"_id": "a", "n": 3}),
                json!({"_id": "c", "n": 4}),
                json!({"_id": "b", "n": 5}),
            ],
        };

        let step =
            Unique::new(Retrieve::new(&composite, composite.root(), &source, None).unwrap());
        let docs: Vec<ResultDocument> = step.collect::<Result<_, _>>().unwrap();
        let ids: Vec<&Value> = docs.iter().map(|d| &d.doc()["_id"]).collect();
        assert_eq!(ids, vec![&json!("a"), &json!("b"), &json!("c")]);
        // The first occurrence survives, not a later duplicate.
        assert_eq!(docs[0].doc()["n"], json!(1));
    }

    #[test]
    fn test_unique_passes_errors_through() {
        struct FailingSource;
        impl DocumentSource for FailingSource {
            fn find(
                &self,
                _entity: &str,
                _query: Option<&QueryExpression>,
            ) -> Result<DocumentStream<'_>, Error> {
                Ok(Box::new(
                    vec![
                        Ok(json!({"_id": "a"})),
                        Err(Error::Source("connection reset".to_string())),
                    ]
                    .into_iter(),
                ))
            }
        }

        let composite = composite_ac(&[]);
        let step = Unique::new(
            Retrieve::new(&composite, composite.root(), &FailingSource, None).unwrap(),
        );
        let results: Vec<Result<ResultDocument, Error>> = step.collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::Source(_))));
    }
}
