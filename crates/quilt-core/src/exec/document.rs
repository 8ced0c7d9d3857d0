//! Result documents and child slots.
//!
//! A [`ResultDocument`] wraps one fetched JSON document together with the
//! entity it came from, a precomputed identity key, and the concrete child
//! slots its resolved references feed. Slots are computed by expanding the
//! `*` wildcards of each reference's container path over the arrays that
//! actually exist in the document.

use std::collections::HashMap;

use quilt_query::{MutablePath, Path, Segment};
use serde_json::Value;

use crate::assoc::{AssociationQuery, BindQuery, Binder, BoundValue};
use crate::error::Error;
use crate::schema::{CompositeMetadata, EntityId, ReferenceId};

/// Read the single value at a concrete path in a document.
pub fn get_value<'a>(doc: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut values = get_values(doc, path);
    if values.is_empty() {
        None
    } else {
        Some(values.remove(0))
    }
}

/// Read every value under a path in a document, expanding `*` over arrays.
///
/// `$parent` segments are not addressable in documents and match nothing.
pub fn get_values<'a>(doc: &'a Value, path: &Path) -> Vec<&'a Value> {
    fn walk<'a>(value: &'a Value, segments: &[Segment], out: &mut Vec<&'a Value>) {
        match segments.split_first() {
            None => out.push(value),
            Some((Segment::Field(name), rest)) => {
                if let Some(child) = value.get(name) {
                    walk(child, rest, out);
                }
            }
            Some((Segment::Index(i), rest)) => {
                if let Some(child) = value.get(i) {
                    walk(child, rest, out);
                }
            }
            Some((Segment::Any, rest)) => {
                if let Value::Array(items) = value {
                    for item in items {
                        walk(item, rest, out);
                    }
                }
            }
            Some((Segment::Parent, _)) => {}
        }
    }
    let mut out = Vec::new();
    walk(doc, path.segments(), &mut out);
    out
}

/// An identity key: the canonical form of a document's identity field
/// values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocId(Vec<String>);

impl std::fmt::Display for DocId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join(":"))
    }
}

/// Computes identity keys from an entity's declared identity fields.
#[derive(Debug, Clone)]
pub struct DocIdExtractor {
    entity: String,
    identity_paths: Vec<Path>,
}

impl DocIdExtractor {
    /// Build the extractor for one entity of a composite tree.
    pub fn new(composite: &CompositeMetadata, entity: EntityId) -> Result<Self, Error> {
        let e = composite.entity(entity);
        Self::from_paths(e.name(), e.identity_paths().to_vec())
    }

    /// Build an extractor from explicit identity paths.
    pub fn from_paths(entity: &str, identity_paths: Vec<Path>) -> Result<Self, Error> {
        if identity_paths.is_empty() {
            return Err(Error::MissingIdentity {
                entity: entity.to_string(),
            });
        }
        Ok(DocIdExtractor {
            entity: entity.to_string(),
            identity_paths,
        })
    }

    /// The entity this extractor was built for.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The identity field paths.
    pub fn identity_paths(&self) -> &[Path] {
        &self.identity_paths
    }

    /// Compute the identity key of a document. Missing identity fields
    /// contribute null.
    pub fn extract(&self, doc: &Value) -> DocId {
        DocId(
            self.identity_paths
                .iter()
                .map(|path| {
                    get_value(doc, path)
                        .cloned()
                        .unwrap_or(Value::Null)
                        .to_string()
                })
                .collect(),
        )
    }
}

/// The concrete array position in a parent document where children of one
/// reference edge are attached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChildSlot {
    container: Path,
    field: String,
}

impl ChildSlot {
    /// Create a slot from its concrete container path and field name.
    pub fn new(container: Path, field: impl Into<String>) -> Self {
        ChildSlot {
            container,
            field: field.into(),
        }
    }

    /// The concrete path of the object holding the slot.
    pub fn container(&self) -> &Path {
        &self.container
    }

    /// The reference field name within the container.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// The concrete path of the slot's array.
    pub fn slot_path(&self) -> Path {
        self.container.with(Segment::field(&self.field))
    }
}

/// One fetched document, wrapped with its entity, identity key, and child
/// slots.
#[derive(Debug, Clone)]
pub struct ResultDocument {
    entity: EntityId,
    doc: Value,
    doc_id: DocId,
    slots: HashMap<ReferenceId, Vec<ChildSlot>>,
}

impl ResultDocument {
    /// Wrap a fetched document.
    ///
    /// Computes the identity key and the child slots of every resolved
    /// reference the owning entity has.
    pub fn new(
        composite: &CompositeMetadata,
        entity: EntityId,
        doc: Value,
    ) -> Result<Self, Error> {
        let doc_id = DocIdExtractor::new(composite, entity)?.extract(&doc);
        let mut slots: HashMap<ReferenceId, Vec<ChildSlot>> = HashMap::new();
        let e = composite.entity(entity);
        for (path, reference) in e.children.iter() {
            let rel = composite.entity_relative_path(entity, path)?;
            let field = match rel.last() {
                Some(Segment::Field(name)) => name.clone(),
                _ => {
                    return Err(Error::InconsistentAnalysis {
                        reason: format!("reference path '{path}' does not end in a field"),
                    })
                }
            };
            let container_rel = rel.prefix(rel.len() - 1);
            let containers = expand_containers(&doc, &container_rel);
            slots.insert(
                *reference,
                containers
                    .into_iter()
                    .map(|container| ChildSlot::new(container, &field))
                    .collect(),
            );
        }
        Ok(ResultDocument {
            entity,
            doc,
            doc_id,
            slots,
        })
    }

    /// The entity this document belongs to.
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// The wrapped document.
    pub fn doc(&self) -> &Value {
        &self.doc
    }

    /// The precomputed identity key.
    pub fn doc_id(&self) -> &DocId {
        &self.doc_id
    }

    /// Unwrap the document.
    pub fn into_doc(self) -> Value {
        self.doc
    }

    /// The concrete slots one reference edge feeds in this document.
    pub fn slots(&self, reference: ReferenceId) -> &[ChildSlot] {
        self.slots.get(&reference).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Binders for one slot: the values of this document's fields named by
    /// the association query's placeholders, read with the slot's concrete
    /// array indexes substituted in.
    pub fn binders_for_slot(
        &self,
        composite: &CompositeMetadata,
        slot: &ChildSlot,
        aq: &AssociationQuery,
    ) -> Result<BindQuery, Error> {
        let mut binders = Vec::new();
        for bound in aq.bindings() {
            if bound.field_info.field_entity != self.entity {
                continue;
            }
            let rel =
                composite.entity_relative_path(self.entity, &bound.field_info.full_field_path)?;
            let concrete = align_with_container(&rel, slot.container());
            binders.push(Binder::new(bound, self.read_bound_value(&concrete)));
        }
        BindQuery::new(binders)
    }

    /// Binders for every slot a reference edge feeds in this document.
    pub fn binders_for_child(
        &self,
        composite: &CompositeMetadata,
        aq: &AssociationQuery,
    ) -> Result<Vec<(ChildSlot, BindQuery)>, Error> {
        self.slots(aq.reference())
            .iter()
            .map(|slot| {
                Ok((
                    slot.clone(),
                    self.binders_for_slot(composite, slot, aq)?,
                ))
            })
            .collect()
    }

    /// Binders supplied by this document when it is on the contributing
    /// side of a join: the values of its own fields named by the
    /// association query's placeholders, without slot substitution.
    pub fn binders_for_doc(
        &self,
        composite: &CompositeMetadata,
        aq: &AssociationQuery,
    ) -> Result<BindQuery, Error> {
        let mut binders = Vec::new();
        for bound in aq.bindings() {
            if bound.field_info.field_entity != self.entity {
                continue;
            }
            let rel =
                composite.entity_relative_path(self.entity, &bound.field_info.full_field_path)?;
            binders.push(Binder::new(bound, self.read_bound_value(&rel)));
        }
        BindQuery::new(binders)
    }

    fn read_bound_value(&self, path: &Path) -> BoundValue {
        let wildcard = path.iter().any(|s| matches!(s, Segment::Any));
        let values = get_values(&self.doc, path);
        if wildcard {
            BoundValue::List(values.into_iter().cloned().collect())
        } else {
            BoundValue::Value(values.first().cloned().cloned().unwrap_or(Value::Null))
        }
    }

    /// Append a child document to a slot, creating the slot array on first
    /// attachment. Attachment never fails; retrieval order is preserved.
    pub(crate) fn attach(&mut self, slot: &ChildSlot, child: Value) {
        let mut target = &mut self.doc;
        for segment in slot.container().segments() {
            let next = match segment {
                Segment::Field(name) => target.get_mut(name),
                Segment::Index(i) => target.get_mut(i),
                _ => None,
            };
            match next {
                Some(value) => target = value,
                None => return,
            }
        }
        let Some(container) = target.as_object_mut() else {
            return;
        };
        let entry = container
            .entry(slot.field().to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = entry {
            items.push(child);
        }
    }
}

/// Expand the `*` wildcards of a container path over the arrays present in
/// a document, yielding every concrete container that exists.
fn expand_containers(doc: &Value, container: &Path) -> Vec<Path> {
    fn walk(value: &Value, segments: &[Segment], acc: &mut MutablePath, out: &mut Vec<Path>) {
        match segments.split_first() {
            None => out.push(acc.to_path()),
            Some((Segment::Field(name), rest)) => {
                if let Some(child) = value.get(name) {
                    acc.push(Segment::field(name));
                    walk(child, rest, acc, out);
                    acc.pop();
                }
            }
            Some((Segment::Any, rest)) => {
                if let Value::Array(items) = value {
                    for (i, item) in items.iter().enumerate() {
                        acc.push(Segment::Index(i));
                        walk(item, rest, acc, out);
                        acc.pop();
                    }
                }
            }
            Some((Segment::Index(i), rest)) => {
                if let Some(child) = value.get(i) {
                    acc.push(Segment::Index(*i));
                    walk(child, rest, acc, out);
                    acc.pop();
                }
            }
            Some((Segment::Parent, _)) => {}
        }
    }
    let mut out = Vec::new();
    let mut acc = MutablePath::new();
    walk(doc, container.segments(), &mut acc, &mut out);
    out
}

/// Substitute a slot's concrete indexes into an entity-relative field path
/// for as long as the two run along the same container.
fn align_with_container(rel: &Path, container: &Path) -> Path {
    let mut out = Vec::with_capacity(rel.len());
    let mut aligned = true;
    for (i, segment) in rel.segments().iter().enumerate() {
        if aligned {
            match (segment, container.segment(i)) {
                (Segment::Any, Some(Segment::Index(n))) => {
                    out.push(Segment::Index(*n));
                    continue;
                }
                (seg, Some(sub)) if seg.matches(sub) => {
                    out.push(seg.clone());
                    continue;
                }
                _ => aligned = false,
            }
        }
        out.push(segment.clone());
    }
    Path::new(out)
}
