//! Entity schema definitions.
//!
//! An [`EntitySchema`] is one entity's field tree plus identity metadata.
//! Schemas are assembled from [`FieldDef`] values with the builder API and
//! flattened into the arena-backed [`FieldTree`] as they are added.

use std::collections::BTreeMap;

use quilt_query::{MutablePath, Path, Segment};
use serde::{Deserialize, Serialize};

use super::node::{FieldTree, NodeId, NodeKind, SimpleType, ELEMENT_NAME};

/// Element schema of an array field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementDef {
    /// Scalar elements.
    Simple(SimpleType),
    /// Object elements with their own fields.
    Object(Vec<FieldDef>),
}

/// What a defined field is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDefKind {
    /// A scalar field.
    Simple {
        /// The scalar type.
        simple_type: SimpleType,
        /// Whether the field is part of the entity identity.
        identity: bool,
    },
    /// An object field.
    Object {
        /// The object's fields.
        fields: Vec<FieldDef>,
    },
    /// An array field.
    Array {
        /// The element schema.
        element: ElementDef,
    },
    /// A reference to another entity.
    Reference {
        /// Referenced entity name.
        entity: String,
        /// Referenced entity version.
        version: String,
    },
}

/// A field definition within an entity schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Field shape.
    pub kind: FieldDefKind,
}

impl FieldDef {
    /// A scalar field.
    pub fn simple(name: impl Into<String>, simple_type: SimpleType) -> Self {
        FieldDef {
            name: name.into(),
            kind: FieldDefKind::Simple { simple_type, identity: false },
        }
    }

    /// Mark a scalar field as part of the entity identity.
    pub fn identity(mut self) -> Self {
        if let FieldDefKind::Simple { identity, .. } = &mut self.kind {
            *identity = true;
        }
        self
    }

    /// An object field.
    pub fn object(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        FieldDef {
            name: name.into(),
            kind: FieldDefKind::Object { fields },
        }
    }

    /// An array of scalars.
    pub fn simple_array(name: impl Into<String>, simple_type: SimpleType) -> Self {
        FieldDef {
            name: name.into(),
            kind: FieldDefKind::Array { element: ElementDef::Simple(simple_type) },
        }
    }

    /// An array of objects.
    pub fn object_array(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        FieldDef {
            name: name.into(),
            kind: FieldDefKind::Array { element: ElementDef::Object(fields) },
        }
    }

    /// A reference to another entity.
    pub fn reference(
        name: impl Into<String>,
        entity: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        FieldDef {
            name: name.into(),
            kind: FieldDefKind::Reference {
                entity: entity.into(),
                version: version.into(),
            },
        }
    }
}

/// One entity's schema: name, version, and field tree.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    name: String,
    version: String,
    tree: FieldTree,
}

impl EntitySchema {
    /// Create an empty schema.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        EntitySchema {
            name: name.into(),
            version: version.into(),
            tree: FieldTree::new(),
        }
    }

    /// Add a top-level field.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        let root = self.tree.root();
        insert_def(&mut self.tree, root, &field);
        self
    }

    /// Add several top-level fields.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        for field in fields {
            self = self.with_field(field);
        }
        self
    }

    /// Entity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entity version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The underlying field tree.
    pub fn tree(&self) -> &FieldTree {
        &self.tree
    }

    /// Resolve a path from the schema root.
    pub fn resolve(&self, path: &Path) -> Result<Option<NodeId>, crate::error::Error> {
        self.tree.resolve(self.tree.root(), path)
    }

    /// Paths of the identity fields of this entity.
    ///
    /// Does not descend into arrays; array element identities are reported
    /// separately by [`array_identities`](Self::array_identities).
    pub fn identity_paths(&self) -> Vec<Path> {
        let mut out = Vec::new();
        let mut path = MutablePath::new();
        self.collect_identities(self.tree.root(), &mut path, &mut out);
        out
    }

    fn collect_identities(&self, node: NodeId, path: &mut MutablePath, out: &mut Vec<Path>) {
        for &child in self.tree.children(node) {
            path.push(Segment::field(self.tree.name(child)));
            match self.tree.kind(child) {
                NodeKind::Simple { identity: true, .. } => out.push(path.to_path()),
                NodeKind::Object { .. } => self.collect_identities(child, path, out),
                _ => {}
            }
            path.pop();
        }
    }

    /// Per-array identity metadata: for every array-of-object field whose
    /// elements declare identity fields, the element-relative paths of those
    /// fields, keyed by the array's path.
    pub fn array_identities(&self) -> BTreeMap<Path, Vec<Path>> {
        let mut out = BTreeMap::new();
        let mut path = MutablePath::new();
        self.collect_array_identities(self.tree.root(), &mut path, &mut out);
        out
    }

    fn collect_array_identities(
        &self,
        node: NodeId,
        path: &mut MutablePath,
        out: &mut BTreeMap<Path, Vec<Path>>,
    ) {
        for &child in self.tree.children(node) {
            path.push(Segment::field(self.tree.name(child)));
            match self.tree.kind(child) {
                NodeKind::Object { .. } => self.collect_array_identities(child, path, out),
                NodeKind::Array { element } => {
                    if let NodeKind::Object { .. } = self.tree.kind(*element) {
                        let mut rel = MutablePath::new();
                        let mut ids = Vec::new();
                        self.collect_element_identities(*element, &mut rel, &mut ids);
                        if !ids.is_empty() {
                            out.insert(path.to_path(), ids);
                        }
                        path.push(Segment::Any);
                        self.collect_array_identities(*element, path, out);
                        path.pop();
                    }
                }
                _ => {}
            }
            path.pop();
        }
    }

    fn collect_element_identities(
        &self,
        node: NodeId,
        path: &mut MutablePath,
        out: &mut Vec<Path>,
    ) {
        for &child in self.tree.children(node) {
            path.push(Segment::field(self.tree.name(child)));
            match self.tree.kind(child) {
                NodeKind::Simple { identity: true, .. } => out.push(path.to_path()),
                NodeKind::Object { .. } => self.collect_element_identities(child, path, out),
                _ => {}
            }
            path.pop();
        }
    }
}

/// Flatten one field definition into the tree under `parent`.
fn insert_def(tree: &mut FieldTree, parent: NodeId, def: &FieldDef) -> NodeId {
    let id = match &def.kind {
        FieldDefKind::Simple { simple_type, identity } => tree.insert(
            &def.name,
            Some(parent),
            NodeKind::Simple { simple_type: *simple_type, identity: *identity },
        ),
        FieldDefKind::Object { fields } => {
            let id = tree.insert(&def.name, Some(parent), NodeKind::Object { children: vec![] });
            for field in fields {
                insert_def(tree, id, field);
            }
            id
        }
        FieldDefKind::Array { element } => {
            let id = tree.insert(&def.name, Some(parent), NodeKind::Array { element: parent });
            let elem = match element {
                ElementDef::Simple(simple_type) => tree.insert(
                    ELEMENT_NAME,
                    Some(id),
                    NodeKind::Simple { simple_type: *simple_type, identity: false },
                ),
                ElementDef::Object(fields) => {
                    let elem =
                        tree.insert(ELEMENT_NAME, Some(id), NodeKind::Object { children: vec![] });
                    for field in fields {
                        insert_def(tree, elem, field);
                    }
                    elem
                }
            };
            tree.set_element(id, elem);
            id
        }
        FieldDefKind::Reference { entity, version } => tree.insert(
            &def.name,
            Some(parent),
            NodeKind::Reference { entity: entity.clone(), version: version.clone() },
        ),
    };
    tree.add_child(parent, id);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Path {
        s.parse().unwrap()
    }

    fn user_schema() -> EntitySchema {
        EntitySchema::new("user", "1.0.0")
            .with_field(FieldDef::simple("_id", SimpleType::Uid).identity())
            .with_field(FieldDef::simple("login", SimpleType::String))
            .with_field(FieldDef::object(
                "contact",
                vec![
                    FieldDef::simple("email", SimpleType::String),
                    FieldDef::simple("phone", SimpleType::String),
                ],
            ))
            .with_field(FieldDef::object_array(
                "sessions",
                vec![
                    FieldDef::simple("token", SimpleType::String).identity(),
                    FieldDef::simple("expires", SimpleType::Date),
                ],
            ))
            .with_field(FieldDef::reference("groups", "group", "1.0.0"))
    }

    #[test]
    fn test_builder_shapes_the_tree() {
        let schema = user_schema();

        assert_eq!(schema.name(), "user");
        assert_eq!(schema.version(), "1.0.0");
        assert!(schema.resolve(&p("login")).unwrap().is_some());
        assert!(schema.resolve(&p("contact.email")).unwrap().is_some());
        assert!(schema.resolve(&p("sessions.*.token")).unwrap().is_some());
        assert!(schema.resolve(&p("nope")).unwrap().is_none());
    }

    #[test]
    fn test_reference_is_a_leaf_until_resolved() {
        let schema = user_schema();
        let groups = schema.resolve(&p("groups")).unwrap().unwrap();
        assert!(matches!(
            schema.tree().kind(groups),
            NodeKind::Reference { entity, .. } if entity == "group"
        ));
        // Descending into an unresolved reference is structurally invalid.
        assert!(schema.resolve(&p("groups.*.name")).is_err());
    }

    #[test]
    fn test_identity_paths_skip_arrays() {
        let schema = user_schema();
        assert_eq!(schema.identity_paths(), vec![p("_id")]);
    }

    #[test]
    fn test_nested_object_identity() {
        let schema = EntitySchema::new("order", "2.1")
            .with_field(FieldDef::object(
                "key",
                vec![
                    FieldDef::simple("region", SimpleType::String).identity(),
                    FieldDef::simple("number", SimpleType::Integer).identity(),
                ],
            ))
            .with_field(FieldDef::simple("total", SimpleType::Double));

        assert_eq!(
            schema.identity_paths(),
            vec![p("key.region"), p("key.number")]
        );
    }

    #[test]
    fn test_array_identities() {
        let schema = user_schema();
        let ids = schema.array_identities();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids.get(&p("sessions")), Some(&vec![p("token")]));
    }
}
