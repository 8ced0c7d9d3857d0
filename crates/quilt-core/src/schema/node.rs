//! The path-addressable schema tree.
//!
//! Nodes live in an arena ([`FieldTree`]) and refer to each other through
//! stable [`NodeId`] indexes. Every node except the tree root keeps the
//! index of its parent; the parent link is a lookup relation used only for
//! `$parent` resolution and full-path reconstruction, never an ownership
//! edge, so the tree stays acyclic.
//!
//! Array fields (and resolved reference fields, which behave as arrays of
//! the referenced entity's documents) own a single `*`-named element node;
//! descending through them contributes an `Any` segment to full paths.

use quilt_query::{Path, Segment};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Name of the synthetic element node owned by array-like fields.
pub(crate) const ELEMENT_NAME: &str = "*";

/// Index of a node within a [`FieldTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u32);

/// Index of an entity within a composite metadata tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub(crate) u32);

/// Index of a resolved reference edge within a composite metadata tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceId(pub(crate) u32);

/// Scalar field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimpleType {
    /// UTF-8 string.
    String,
    /// 64-bit integer.
    Integer,
    /// Arbitrary-precision integer, carried as a string.
    BigInteger,
    /// 64-bit float.
    Double,
    /// Arbitrary-precision decimal, carried as a string.
    BigDecimal,
    /// Boolean.
    Boolean,
    /// Timestamp.
    Date,
    /// Opaque binary data, base64 in documents.
    Binary,
    /// Server-assigned unique id.
    Uid,
}

/// What a schema node is.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// A scalar field.
    Simple {
        /// The scalar type.
        simple_type: SimpleType,
        /// Whether the field is part of the entity identity.
        identity: bool,
    },
    /// An object field with named children.
    Object {
        /// Child nodes, in insertion order.
        children: Vec<NodeId>,
    },
    /// An array field with one element schema.
    Array {
        /// The `*`-named element node.
        element: NodeId,
    },
    /// A reference to another entity, not resolved.
    Reference {
        /// Referenced entity name.
        entity: String,
        /// Referenced entity version.
        version: String,
    },
    /// A reference resolved into the referenced entity's scoped schema.
    ///
    /// Behaves as an array whose element is the referenced entity's field
    /// tree.
    ResolvedReference {
        /// Referenced entity name.
        entity: String,
        /// Referenced entity version.
        version: String,
        /// The `*`-named element node holding the referenced fields.
        element: NodeId,
        /// The edge this resolution created.
        reference: ReferenceId,
    },
}

/// One node of a schema tree.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) kind: NodeKind,
}

/// An arena-backed schema tree.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTree {
    nodes: Vec<SchemaNode>,
    root: NodeId,
}

impl Default for FieldTree {
    fn default() -> Self {
        FieldTree::new()
    }
}

impl FieldTree {
    /// Create a tree holding only an empty root object.
    pub fn new() -> Self {
        FieldTree {
            nodes: vec![SchemaNode {
                name: String::new(),
                parent: None,
                kind: NodeKind::Object { children: Vec::new() },
            }],
            root: NodeId(0),
        }
    }

    /// The root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Access a node.
    pub fn node(&self, id: NodeId) -> &SchemaNode {
        &self.nodes[id.0 as usize]
    }

    /// A node's name.
    pub fn name(&self, id: NodeId) -> &str {
        &self.node(id).name
    }

    /// A node's kind.
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    /// A node's parent, if it has one.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Whether `id` is the synthetic element node of an array-like field.
    pub fn is_element(&self, id: NodeId) -> bool {
        self.node(id).name == ELEMENT_NAME
    }

    /// An object node's children, in insertion order. Empty for everything
    /// else.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match &self.node(id).kind {
            NodeKind::Object { children } => children,
            _ => &[],
        }
    }

    /// The element node of an array-like node.
    pub fn element(&self, id: NodeId) -> Option<NodeId> {
        match &self.node(id).kind {
            NodeKind::Array { element } => Some(*element),
            NodeKind::ResolvedReference { element, .. } => Some(*element),
            _ => None,
        }
    }

    /// The path segment a node contributes to full paths.
    pub fn segment(&self, id: NodeId) -> Segment {
        if self.is_element(id) {
            Segment::Any
        } else {
            Segment::Field(self.node(id).name.clone())
        }
    }

    /// Reconstruct the absolute path of a node from the parent links.
    pub fn full_path(&self, id: NodeId) -> Path {
        let mut segments = Vec::new();
        let mut cur = id;
        while let Some(parent) = self.parent(cur) {
            segments.push(self.segment(cur));
            cur = parent;
        }
        segments.reverse();
        Path::new(segments)
    }

    /// Resolve a path against a node.
    ///
    /// Returns `Ok(None)` when a named field simply does not exist; fails
    /// when a segment is structurally invalid for the node kind or `$parent`
    /// is requested above the tree root.
    pub fn resolve(&self, from: NodeId, path: &Path) -> Result<Option<NodeId>, Error> {
        self.resolve_from_level(from, path, 0)
    }

    /// Resolve a path starting at the given segment level.
    pub fn resolve_from_level(
        &self,
        from: NodeId,
        path: &Path,
        level: usize,
    ) -> Result<Option<NodeId>, Error> {
        let mut cur = from;
        for segment in &path.segments()[level.min(path.len())..] {
            match segment {
                Segment::Parent => {
                    // A `$parent` step from an element node ascends from the
                    // owning array-like field.
                    let owner = match self.parent(cur) {
                        Some(parent) if self.is_element(cur) => parent,
                        _ => cur,
                    };
                    cur = self
                        .parent(owner)
                        .ok_or_else(|| Error::ParentOfRoot { path: path.clone() })?;
                }
                Segment::Field(name) => match self.named_child(cur, name, path, segment)? {
                    Some(child) => cur = child,
                    None => return Ok(None),
                },
                Segment::Index(_) | Segment::Any => match self.element(cur) {
                    Some(element) => cur = element,
                    None => {
                        return Err(Error::InvalidSegment {
                            path: path.clone(),
                            segment: segment.to_string(),
                            reason: format!("'{}' is not an array", self.full_path(cur)),
                        })
                    }
                },
            }
        }
        Ok(Some(cur))
    }

    /// Resolve one name segment against a node.
    ///
    /// Objects resolve among their children; array-like nodes transparently
    /// continue into their element schema (and thus, for resolved
    /// references, into the referenced entity's root).
    fn named_child(
        &self,
        id: NodeId,
        name: &str,
        path: &Path,
        segment: &Segment,
    ) -> Result<Option<NodeId>, Error> {
        let target = match &self.node(id).kind {
            NodeKind::Object { .. } => id,
            NodeKind::Array { element } | NodeKind::ResolvedReference { element, .. } => {
                match self.node(*element).kind {
                    NodeKind::Object { .. } => *element,
                    _ => {
                        return Err(Error::InvalidSegment {
                            path: path.clone(),
                            segment: segment.to_string(),
                            reason: format!(
                                "'{}' has simple elements",
                                self.full_path(id)
                            ),
                        })
                    }
                }
            }
            _ => {
                return Err(Error::InvalidSegment {
                    path: path.clone(),
                    segment: segment.to_string(),
                    reason: format!("'{}' has no fields", self.full_path(id)),
                })
            }
        };
        Ok(self
            .children(target)
            .iter()
            .copied()
            .find(|&c| self.node(c).name == name))
    }

    /// Append a node to the arena.
    pub(crate) fn insert(
        &mut self,
        name: impl Into<String>,
        parent: Option<NodeId>,
        kind: NodeKind,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(SchemaNode {
            name: name.into(),
            parent,
            kind,
        });
        id
    }

    /// Register `child` under an object node.
    pub(crate) fn add_child(&mut self, object: NodeId, child: NodeId) {
        if let NodeKind::Object { children } = &mut self.nodes[object.0 as usize].kind {
            children.push(child);
        }
    }

    /// Point an array node at its element.
    pub(crate) fn set_element(&mut self, array: NodeId, element: NodeId) {
        match &mut self.nodes[array.0 as usize].kind {
            NodeKind::Array { element: slot } => *slot = element,
            NodeKind::ResolvedReference { element: slot, .. } => *slot = element,
            _ => {}
        }
    }
}
