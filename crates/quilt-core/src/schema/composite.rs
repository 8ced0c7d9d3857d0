//! Composite metadata.
//!
//! Composite metadata is a directed tree of entities. The requested entity
//! sits at the root; every entity reached by resolving a reference field is
//! another node, injected at the reference field's path. The tree is
//! computed per request: the lookup capability decides, from the request's
//! projection and query needs, which references are resolved and which
//! branches are pruned.
//!
//! All entities' fields are copied into one arena-backed [`FieldTree`], so
//! path resolution crosses reference boundaries transparently and the
//! owning entity of any node can be recovered by walking parent links.

use std::collections::BTreeMap;
use std::fmt;

use quilt_query::{MutablePath, Path, Segment};
use tracing::debug;

use super::entity::EntitySchema;
use super::node::{EntityId, FieldTree, NodeId, NodeKind, ReferenceId, ELEMENT_NAME};
use crate::error::Error;

/// The metadata lookup capability.
///
/// Given the path a reference field would be injected at, the referenced
/// entity name, and the requested version, returns the entity's schema, or
/// `None` when the active request does not need that branch (the reference
/// is then pruned from the composite tree). Failing to locate an entity at
/// all is an error and aborts the whole build.
pub trait MetadataLookup {
    /// Look up one referenced entity.
    fn metadata(
        &self,
        injection: &Path,
        entity: &str,
        version: &str,
    ) -> Result<Option<EntitySchema>, Error>;
}

/// One entity node of a composite metadata tree.
#[derive(Debug, Clone)]
pub struct CompositeEntity {
    pub(crate) name: String,
    pub(crate) version: String,
    pub(crate) entity_path: Path,
    pub(crate) parent: Option<EntityId>,
    pub(crate) node: NodeId,
    pub(crate) children: BTreeMap<Path, ReferenceId>,
    pub(crate) identity_paths: Vec<Path>,
}

impl CompositeEntity {
    /// Entity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entity version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Absolute path of the reference field this entity is injected at;
    /// empty at the tree root.
    pub fn entity_path(&self) -> &Path {
        &self.entity_path
    }

    /// The containing entity, if any.
    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    /// The node this entity's fields hang off: the tree root for the root
    /// entity, the reference field's element node otherwise.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Absolute paths of the directly resolved references of this entity.
    pub fn child_paths(&self) -> impl Iterator<Item = &Path> {
        self.children.keys()
    }

    /// Entity-relative paths of this entity's identity fields.
    pub fn identity_paths(&self) -> &[Path] {
        &self.identity_paths
    }
}

/// A resolved reference edge between two entities of a composite tree.
#[derive(Debug, Clone)]
pub struct ReferenceEdge {
    pub(crate) path: Path,
    pub(crate) field: NodeId,
    pub(crate) source: EntityId,
    pub(crate) target: EntityId,
}

impl ReferenceEdge {
    /// Absolute path of the reference field.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The resolved reference field node.
    pub fn field(&self) -> NodeId {
        self.field
    }

    /// The entity owning the reference field.
    pub fn source(&self) -> EntityId {
        self.source
    }

    /// The referenced entity.
    pub fn target(&self) -> EntityId {
        self.target
    }
}

/// An entity schema graph scoped to one request, rooted at the requested
/// entity.
#[derive(Debug, Clone)]
pub struct CompositeMetadata {
    tree: FieldTree,
    entities: Vec<CompositeEntity>,
    references: Vec<ReferenceEdge>,
}

impl CompositeMetadata {
    /// Build composite metadata rooted at the given entity schema.
    ///
    /// Fields are visited in schema order, exactly once each. Simple,
    /// object, and array fields are copied; reference fields are resolved
    /// through `lookup` and either expanded into a nested entity or, when
    /// the lookup declines, omitted entirely.
    pub fn build(root: &EntitySchema, lookup: &dyn MetadataLookup) -> Result<Self, Error> {
        debug!(entity = root.name(), "building composite metadata");
        let mut composite = CompositeMetadata {
            tree: FieldTree::new(),
            entities: Vec::new(),
            references: Vec::new(),
        };
        let root_node = composite.tree.root();
        composite.entities.push(CompositeEntity {
            name: root.name().to_string(),
            version: root.version().to_string(),
            entity_path: Path::empty(),
            parent: None,
            node: root_node,
            children: BTreeMap::new(),
            identity_paths: root.identity_paths(),
        });
        let mut path = MutablePath::new();
        composite.copy_fields(
            root.tree(),
            root.tree().root(),
            root_node,
            EntityId(0),
            &mut path,
            lookup,
        )?;
        Ok(composite)
    }

    fn copy_fields(
        &mut self,
        src: &FieldTree,
        src_node: NodeId,
        dst_node: NodeId,
        entity: EntityId,
        path: &mut MutablePath,
        lookup: &dyn MetadataLookup,
    ) -> Result<(), Error> {
        for &src_child in src.children(src_node) {
            let name = src.name(src_child).to_string();
            path.push(Segment::field(&name));
            match src.kind(src_child) {
                NodeKind::Simple { simple_type, identity } => {
                    let copy = self.tree.insert(
                        &name,
                        Some(dst_node),
                        NodeKind::Simple { simple_type: *simple_type, identity: *identity },
                    );
                    self.tree.add_child(dst_node, copy);
                }
                NodeKind::Object { .. } => {
                    let copy = self.tree.insert(
                        &name,
                        Some(dst_node),
                        NodeKind::Object { children: vec![] },
                    );
                    self.tree.add_child(dst_node, copy);
                    self.copy_fields(src, src_child, copy, entity, path, lookup)?;
                }
                NodeKind::Array { element } => {
                    let copy =
                        self.tree.insert(&name, Some(dst_node), NodeKind::Array { element: dst_node });
                    self.tree.add_child(dst_node, copy);
                    let elem = match src.kind(*element) {
                        NodeKind::Object { .. } => {
                            let elem = self.tree.insert(
                                ELEMENT_NAME,
                                Some(copy),
                                NodeKind::Object { children: vec![] },
                            );
                            path.push(Segment::Any);
                            self.copy_fields(src, *element, elem, entity, path, lookup)?;
                            path.pop();
                            elem
                        }
                        NodeKind::Simple { simple_type, identity } => self.tree.insert(
                            ELEMENT_NAME,
                            Some(copy),
                            NodeKind::Simple { simple_type: *simple_type, identity: *identity },
                        ),
                        _ => {
                            return Err(Error::InvalidSegment {
                                path: path.to_path(),
                                segment: ELEMENT_NAME.to_string(),
                                reason: "array element must be simple or object".to_string(),
                            });
                        }
                    };
                    self.tree.set_element(copy, elem);
                }
                NodeKind::Reference { entity: ref_entity, version }
                | NodeKind::ResolvedReference { entity: ref_entity, version, .. } => {
                    let ref_entity = ref_entity.clone();
                    let version = version.clone();
                    self.resolve_reference(
                        &name, &ref_entity, &version, dst_node, entity, path, lookup,
                    )?;
                }
            }
            path.pop();
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_reference(
        &mut self,
        name: &str,
        ref_entity: &str,
        version: &str,
        dst_node: NodeId,
        source: EntityId,
        path: &mut MutablePath,
        lookup: &dyn MetadataLookup,
    ) -> Result<(), Error> {
        let injection = path.to_path();
        debug!(reference = %injection, entity = ref_entity, "resolving reference");
        let schema = match lookup.metadata(&injection, ref_entity, version)? {
            Some(schema) => schema,
            None => {
                // Not projected: the branch is omitted entirely.
                debug!(reference = %injection, "reference not resolved");
                return Ok(());
            }
        };

        let reference = ReferenceId(self.references.len() as u32);
        let target = EntityId(self.entities.len() as u32);

        let field = self.tree.insert(
            name,
            Some(dst_node),
            NodeKind::ResolvedReference {
                entity: schema.name().to_string(),
                version: schema.version().to_string(),
                element: dst_node,
                reference,
            },
        );
        self.tree.add_child(dst_node, field);
        let element =
            self.tree.insert(ELEMENT_NAME, Some(field), NodeKind::Object { children: vec![] });
        self.tree.set_element(field, element);

        self.entities.push(CompositeEntity {
            name: schema.name().to_string(),
            version: schema.version().to_string(),
            entity_path: injection.clone(),
            parent: Some(source),
            node: element,
            children: BTreeMap::new(),
            identity_paths: schema.identity_paths(),
        });
        self.references.push(ReferenceEdge {
            path: injection.clone(),
            field,
            source,
            target,
        });
        self.entities[source.0 as usize].children.insert(injection, reference);

        path.push(Segment::Any);
        self.copy_fields(schema.tree(), schema.tree().root(), element, target, path, lookup)?;
        path.pop();
        Ok(())
    }

    /// The root entity.
    pub fn root(&self) -> EntityId {
        EntityId(0)
    }

    /// The unified schema tree.
    pub fn tree(&self) -> &FieldTree {
        &self.tree
    }

    /// Access an entity node.
    pub fn entity(&self, id: EntityId) -> &CompositeEntity {
        &self.entities[id.0 as usize]
    }

    /// Access a reference edge.
    pub fn reference(&self, id: ReferenceId) -> &ReferenceEdge {
        &self.references[id.0 as usize]
    }

    /// Iterate over all entities, root first.
    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &CompositeEntity)> {
        self.entities.iter().enumerate().map(|(i, e)| (EntityId(i as u32), e))
    }

    /// Iterate over all reference edges.
    pub fn references(&self) -> impl Iterator<Item = (ReferenceId, &ReferenceEdge)> {
        self.references.iter().enumerate().map(|(i, r)| (ReferenceId(i as u32), r))
    }

    /// Whether the tree is a single entity with no resolved references.
    pub fn is_simple(&self) -> bool {
        self.references.is_empty()
    }

    /// The direct child reference of an entity at the given absolute path.
    pub fn child_reference_of(&self, entity: EntityId, path: &Path) -> Option<ReferenceId> {
        self.entity(entity).children.get(path).copied()
    }

    /// The direct child reference of the root entity at the given path.
    pub fn child_reference(&self, path: &Path) -> Option<ReferenceId> {
        self.child_reference_of(self.root(), path)
    }

    /// The entity injected at a direct child reference of the root.
    pub fn child_metadata(&self, path: &Path) -> Option<EntityId> {
        self.child_reference(path).map(|r| self.reference(r).target)
    }

    /// A descendant reference at the given absolute path, anywhere in the
    /// tree.
    pub fn descendant_reference(&self, path: &Path) -> Option<ReferenceId> {
        self.references
            .iter()
            .position(|r| &r.path == path)
            .map(|i| ReferenceId(i as u32))
    }

    /// The entity injected at a descendant reference.
    pub fn descendant_metadata(&self, path: &Path) -> Option<EntityId> {
        self.descendant_reference(path).map(|r| self.reference(r).target)
    }

    /// Resolve an absolute path from the tree root.
    pub fn resolve(&self, path: &Path) -> Result<Option<NodeId>, Error> {
        self.tree.resolve(self.tree.root(), path)
    }

    /// Absolute path of a node.
    pub fn full_path(&self, node: NodeId) -> Path {
        self.tree.full_path(node)
    }

    /// The resolved reference containing a node, walking up from the node
    /// itself. A resolved reference field is contained by its own edge.
    pub fn resolved_reference_of_node(&self, node: NodeId) -> Option<ReferenceId> {
        let mut cur = Some(node);
        while let Some(id) = cur {
            if let NodeKind::ResolvedReference { reference, .. } = self.tree.kind(id) {
                return Some(*reference);
            }
            cur = self.tree.parent(id);
        }
        None
    }

    /// The entity owning a node.
    pub fn entity_of_node(&self, node: NodeId) -> EntityId {
        match self.resolved_reference_of_node(node) {
            Some(reference) => self.reference(reference).target,
            None => self.root(),
        }
    }

    /// The entity owning the field at an absolute path.
    pub fn entity_of_path(&self, path: &Path) -> Result<Option<EntityId>, Error> {
        Ok(self.resolve(path)?.map(|node| self.entity_of_node(node)))
    }

    /// The absolute prefix under which an entity's own fields live: empty
    /// for the root, the injection path plus `*` otherwise.
    pub fn entity_base(&self, entity: EntityId) -> Path {
        let e = self.entity(entity);
        if e.parent.is_none() {
            Path::empty()
        } else {
            e.entity_path.with(Segment::Any)
        }
    }

    /// Express an absolute field path relative to an entity.
    ///
    /// Fails when the field does not fall under the entity's prefix.
    pub fn entity_relative_path(&self, entity: EntityId, absolute: &Path) -> Result<Path, Error> {
        let base = self.entity_base(entity);
        if base.is_empty() {
            return Ok(absolute.clone());
        }
        if base.matching_prefix(absolute) {
            Ok(absolute.skip(base.len()))
        } else {
            Err(Error::NotRelative {
                field: absolute.clone(),
                relative_to: base,
            })
        }
    }

    fn fmt_entity(&self, f: &mut fmt::Formatter<'_>, id: EntityId, depth: usize) -> fmt::Result {
        let entity = self.entity(id);
        for _ in 0..depth {
            f.write_str("  ")?;
        }
        writeln!(f, "{}:{}", entity.name, entity.entity_path)?;
        for reference in entity.children.values() {
            self.fmt_entity(f, self.reference(*reference).target, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for CompositeMetadata {
    /// The entity tree, one `name:path` line per entity, indented by depth.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_entity(f, self.root(), 0)
    }
}
