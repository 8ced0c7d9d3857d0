//! Shared fixtures for association and execution tests.

use std::collections::HashMap;

use quilt_query::Path;

use crate::error::Error;
use crate::schema::{
    CompositeMetadata, EntitySchema, FieldDef, MetadataLookup, SimpleType,
};

/// A lookup over a fixed set of schemas that resolves only the references
/// whose injection paths were requested.
pub struct FixedLookup {
    schemas: HashMap<String, EntitySchema>,
    include: Vec<Path>,
}

impl FixedLookup {
    pub fn new(schemas: Vec<EntitySchema>, include: &[&str]) -> Self {
        FixedLookup {
            schemas: schemas
                .into_iter()
                .map(|s| (s.name().to_string(), s))
                .collect(),
            include: include.iter().map(|s| s.parse().unwrap()).collect(),
        }
    }
}

impl MetadataLookup for FixedLookup {
    fn metadata(
        &self,
        injection: &Path,
        entity: &str,
        version: &str,
    ) -> Result<Option<EntitySchema>, Error> {
        if !self.include.contains(injection) {
            return Ok(None);
        }
        match self.schemas.get(entity) {
            Some(schema) => Ok(Some(schema.clone())),
            None => Err(Error::UnknownEntity {
                entity: entity.to_string(),
                version: version.to_string(),
                path: injection.clone(),
            }),
        }
    }
}

pub fn schema_a() -> EntitySchema {
    EntitySchema::new("A", "1.0.0")
        .with_field(FieldDef::simple("_id", SimpleType::Uid).identity())
        .with_field(FieldDef::object(
            "obj1",
            vec![
                FieldDef::simple("c_ref", SimpleType::String),
                FieldDef::reference("c", "C", "1.0.0"),
            ],
        ))
        .with_field(FieldDef::reference("b", "B", "1.0.0"))
}

pub fn schema_b() -> EntitySchema {
    EntitySchema::new("B", "1.0.0")
        .with_field(FieldDef::simple("_id", SimpleType::Uid).identity())
        .with_field(FieldDef::simple("a_ref", SimpleType::String))
}

pub fn schema_c() -> EntitySchema {
    EntitySchema::new("C", "1.0.0")
        .with_field(FieldDef::simple("_id", SimpleType::Uid).identity())
        .with_field(FieldDef::simple("name", SimpleType::String))
        .with_field(FieldDef::reference("b", "B", "1.0.0"))
}

/// Composite rooted at A, with references resolved per `include`.
pub fn composite_ac(include: &[&str]) -> CompositeMetadata {
    let lookup = FixedLookup::new(vec![schema_a(), schema_b(), schema_c()], include);
    CompositeMetadata::build(&schema_a(), &lookup).unwrap()
}

pub fn schema_dept() -> EntitySchema {
    EntitySchema::new("Dept", "1.0.0")
        .with_field(FieldDef::simple("_id", SimpleType::Uid).identity())
        .with_field(FieldDef::object_array(
            "members",
            vec![
                FieldDef::simple("uid", SimpleType::String),
                FieldDef::reference("user", "User", "1.0.0"),
            ],
        ))
}

pub fn schema_user() -> EntitySchema {
    EntitySchema::new("User", "1.0.0")
        .with_field(FieldDef::simple("_id", SimpleType::Uid).identity())
        .with_field(FieldDef::simple("login", SimpleType::String))
}

/// Composite rooted at Dept with the per-member `user` reference resolved.
pub fn composite_dept() -> CompositeMetadata {
    let lookup = FixedLookup::new(vec![schema_dept(), schema_user()], &["members.*.user"]);
    CompositeMetadata::build(&schema_dept(), &lookup).unwrap()
}

pub fn schema_uc() -> EntitySchema {
    EntitySchema::new("UC", "1.0.0")
        .with_field(FieldDef::simple("_id", SimpleType::Uid).identity())
        .with_field(FieldDef::simple("userId", SimpleType::String))
        .with_field(FieldDef::simple("userRedHatPrincipal", SimpleType::String))
        .with_field(FieldDef::reference("users", "U", "1.0.0"))
}

pub fn schema_u() -> EntitySchema {
    EntitySchema::new("U", "1.0.0")
        .with_field(FieldDef::simple("_id", SimpleType::Uid).identity())
        .with_field(FieldDef::simple("login", SimpleType::String))
        .with_field(FieldDef::object_array(
            "authentications",
            vec![
                FieldDef::simple("providerName", SimpleType::String),
                FieldDef::simple("principal", SimpleType::String),
            ],
        ))
}

/// Composite rooted at UC with the `users` reference resolved.
pub fn composite_uc() -> CompositeMetadata {
    let lookup = FixedLookup::new(vec![schema_uc(), schema_u()], &["users"]);
    CompositeMetadata::build(&schema_uc(), &lookup).unwrap()
}
