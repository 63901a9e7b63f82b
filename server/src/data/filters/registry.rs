//! Entity metadata registry
//!
//! Describes the filterable entities: their table, primary key, typed fields
//! and the relations that can be traversed from them. The registry is built
//! once at startup and then shared read-only behind an `Arc`.

use std::collections::BTreeMap;

use super::condition::{ColumnRef, Condition};
use super::error::FilterError;
use super::operators::ValueKind;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldMetadata {
    pub field_name: String,
    /// Storage column, may differ from the API field name
    pub column: String,
    pub value_kind: ValueKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Equality template linking a source row to target rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPredicate {
    /// `(source column, target column)` pairs
    pub pairs: Vec<(String, String)>,
}

impl JoinPredicate {
    pub fn on(source_column: impl Into<String>, target_column: impl Into<String>) -> Self {
        Self {
            pairs: vec![(source_column.into(), target_column.into())],
        }
    }

    pub fn and(mut self, source_column: impl Into<String>, target_column: impl Into<String>) -> Self {
        self.pairs.push((source_column.into(), target_column.into()));
        self
    }

    /// Instantiate the template for concrete aliases
    pub fn bind(&self, source_alias: &str, target_alias: &str) -> Condition {
        Condition::all(
            self.pairs
                .iter()
                .map(|(source, target)| Condition::ColumnEq {
                    left: ColumnRef::new(source_alias, source),
                    right: ColumnRef::new(target_alias, target),
                })
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinDescriptor {
    pub relation_name: String,
    pub target_entity: String,
    pub cardinality: Cardinality,
    pub predicate: JoinPredicate,
}

impl JoinDescriptor {
    pub fn one(
        relation_name: impl Into<String>,
        target_entity: impl Into<String>,
        predicate: JoinPredicate,
    ) -> Self {
        Self {
            relation_name: relation_name.into(),
            target_entity: target_entity.into(),
            cardinality: Cardinality::One,
            predicate,
        }
    }

    pub fn many(
        relation_name: impl Into<String>,
        target_entity: impl Into<String>,
        predicate: JoinPredicate,
    ) -> Self {
        Self {
            relation_name: relation_name.into(),
            target_entity: target_entity.into(),
            cardinality: Cardinality::Many,
            predicate,
        }
    }

    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::Many
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityMetadata {
    pub entity_code: String,
    pub table: String,
    pub primary_key: Vec<String>,
    fields: BTreeMap<String, FieldMetadata>,
    joins: BTreeMap<String, JoinDescriptor>,
    /// Names declared more than once, reported on registration
    collisions: Vec<String>,
}

impl EntityMetadata {
    pub fn new(entity_code: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            entity_code: entity_code.into(),
            table: table.into(),
            primary_key: Vec::new(),
            fields: BTreeMap::new(),
            joins: BTreeMap::new(),
            collisions: Vec::new(),
        }
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Field stored in a column of the same name
    pub fn field(self, name: &str, kind: ValueKind) -> Self {
        self.mapped_field(name, name, kind)
    }

    pub fn mapped_field(mut self, name: &str, column: &str, kind: ValueKind) -> Self {
        if self.has_key(name) {
            self.collisions.push(name.to_string());
        }
        self.fields.insert(
            name.to_string(),
            FieldMetadata {
                field_name: name.to_string(),
                column: column.to_string(),
                value_kind: kind,
            },
        );
        self
    }

    pub fn join(mut self, descriptor: JoinDescriptor) -> Self {
        if self.has_key(&descriptor.relation_name) {
            self.collisions.push(descriptor.relation_name.clone());
        }
        self.joins
            .insert(descriptor.relation_name.clone(), descriptor);
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.get(name)
    }

    pub fn get_join(&self, name: &str) -> Option<&JoinDescriptor> {
        self.joins.get(name)
    }

    /// True when `name` is a field or a relation of this entity
    pub fn has_key(&self, name: &str) -> bool {
        self.fields.contains_key(name) || self.joins.contains_key(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldMetadata> {
        self.fields.values()
    }

    pub fn joins(&self) -> impl Iterator<Item = &JoinDescriptor> {
        self.joins.values()
    }

    /// Whether `column` is a declared field column or part of the primary key
    fn declares_column(&self, column: &str) -> bool {
        self.primary_key.iter().any(|c| c == column) || self.fields().any(|f| f.column == column)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    entities: BTreeMap<String, EntityMetadata>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, metadata: EntityMetadata) -> Result<(), FilterError> {
        if self.entities.contains_key(&metadata.entity_code) {
            return Err(FilterError::DuplicateEntity(metadata.entity_code));
        }
        if let Some(name) = metadata.collisions.first() {
            return Err(FilterError::invalid_metadata(
                &metadata.entity_code,
                format!("'{}' is declared more than once", name),
            ));
        }
        if metadata.primary_key.is_empty() {
            return Err(FilterError::invalid_metadata(
                &metadata.entity_code,
                "primary key is empty",
            ));
        }
        tracing::trace!(
            entity = %metadata.entity_code,
            fields = metadata.fields.len(),
            relations = metadata.joins.len(),
            "Registered entity"
        );
        self.entities.insert(metadata.entity_code.clone(), metadata);
        Ok(())
    }

    pub fn lookup(&self, entity: &str) -> Result<&EntityMetadata, FilterError> {
        self.entities
            .get(entity)
            .ok_or_else(|| FilterError::unknown_entity(entity))
    }

    pub fn lookup_field(&self, entity: &str, field: &str) -> Result<&FieldMetadata, FilterError> {
        self.lookup(entity)?
            .get_field(field)
            .ok_or_else(|| FilterError::unknown_field(entity, field))
    }

    pub fn lookup_join(&self, entity: &str, relation: &str) -> Option<&JoinDescriptor> {
        self.entities.get(entity)?.get_join(relation)
    }

    /// Like [`lookup_join`](Self::lookup_join) but fails with `UnknownRelation`
    pub fn lookup_relation(
        &self,
        entity: &str,
        relation: &str,
    ) -> Result<&JoinDescriptor, FilterError> {
        self.lookup(entity)?
            .get_join(relation)
            .ok_or_else(|| FilterError::unknown_relation(entity, relation))
    }

    /// Entities in entity-code order
    pub fn entities(&self) -> impl Iterator<Item = &EntityMetadata> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Check that every relation points at a registered entity through
    /// declared columns
    pub fn validate(&self) -> Result<(), FilterError> {
        for entity in self.entities() {
            for join in entity.joins() {
                let target = self.entities.get(&join.target_entity).ok_or_else(|| {
                    FilterError::invalid_metadata(
                        &entity.entity_code,
                        format!(
                            "relation '{}' targets unknown entity '{}'",
                            join.relation_name, join.target_entity
                        ),
                    )
                })?;
                if join.predicate.pairs.is_empty() {
                    return Err(FilterError::invalid_metadata(
                        &entity.entity_code,
                        format!("relation '{}' has no join columns", join.relation_name),
                    ));
                }
                for (source, target_column) in &join.predicate.pairs {
                    if !entity.declares_column(source) {
                        return Err(FilterError::invalid_metadata(
                            &entity.entity_code,
                            format!(
                                "relation '{}' uses undeclared column '{}'",
                                join.relation_name, source
                            ),
                        ));
                    }
                    if !target.declares_column(target_column) {
                        return Err(FilterError::invalid_metadata(
                            &entity.entity_code,
                            format!(
                                "relation '{}' uses undeclared column '{}' on '{}'",
                                join.relation_name, target_column, target.entity_code
                            ),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}
