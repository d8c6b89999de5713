//! Entity and relationship registry.
//!
//! Relationships are declared up front with [`EntityDef`] and checked when
//! the [`Schema`] is built: every relation must point at a registered
//! entity, and many-to-many relations must carry a pivot description.
//! Defaulted keys (primary keys of either side) are resolved during the
//! build, so lookups at query time never deal in options.

use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use std::collections::HashMap;

/// Relationship shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    HasOne,
    HasMany,
    BelongsTo,
    BelongsToMany,
}

/// Pivot table description for a many-to-many relation.
#[derive(Debug, Clone)]
pub struct Pivot {
    /// The pivot table.
    pub table: Ident,
    /// Pivot column pointing at the declaring entity.
    pub foreign_pivot_key: Ident,
    /// Pivot column pointing at the related entity.
    pub related_pivot_key: Ident,
}

/// A resolved relation. Key semantics by kind:
///
/// * `HasOne`/`HasMany`: `foreign_key` is on the related table,
///   `local_key` on the declaring table (defaults to its primary key).
/// * `BelongsTo`: `foreign_key` is on the declaring table, `local_key`
///   is the owner key on the related table (defaults to its primary key).
/// * `BelongsToMany`: `local_key` is the declaring side's primary key,
///   `foreign_key` the related side's; the pivot columns point at them.
#[derive(Debug, Clone)]
pub struct Relation {
    pub kind: RelationKind,
    pub related: String,
    pub foreign_key: Ident,
    pub local_key: Ident,
    pub pivot: Option<Pivot>,
}

#[derive(Debug, Clone)]
struct RelationDraft {
    kind: RelationKind,
    related: String,
    foreign_key: Option<Ident>,
    local_key: Option<Ident>,
    pivot: Option<Pivot>,
}

/// Declarative description of one entity, fed to [`Schema::build`].
#[derive(Debug, Clone)]
pub struct EntityDef {
    name: String,
    table: Ident,
    primary_key: Ident,
    soft_delete: Option<Ident>,
    relations: Vec<(String, RelationDraft)>,
}

impl EntityDef {
    /// Start a definition. The primary key defaults to `id`.
    pub fn new(name: &str, table: &str) -> OrmResult<Self> {
        if name.is_empty() {
            return Err(OrmError::configuration("entity name must not be empty"));
        }
        Ok(Self {
            name: name.to_string(),
            table: Ident::parse(table)?,
            primary_key: Ident::parse("id")?,
            soft_delete: None,
            relations: Vec::new(),
        })
    }

    /// Override the primary key column.
    pub fn primary_key(mut self, column: &str) -> OrmResult<Self> {
        self.primary_key = Ident::parse(column)?;
        Ok(self)
    }

    /// Declare a soft-delete marker column. Queries for this entity
    /// exclude rows where the marker is set unless asked otherwise.
    pub fn soft_deletes(mut self, column: &str) -> OrmResult<Self> {
        self.soft_delete = Some(Ident::parse(column)?);
        Ok(self)
    }

    fn add_relation(mut self, name: &str, draft: RelationDraft) -> OrmResult<Self> {
        if self.relations.iter().any(|(n, _)| n == name) {
            return Err(OrmError::configuration(format!(
                "duplicate relation '{}' on entity '{}'",
                name, self.name
            )));
        }
        self.relations.push((name.to_string(), draft));
        Ok(self)
    }

    /// Declare a one-to-one relation; `foreign_key` is on the related table.
    pub fn has_one(self, name: &str, related: &str, foreign_key: &str) -> OrmResult<Self> {
        let draft = RelationDraft {
            kind: RelationKind::HasOne,
            related: related.to_string(),
            foreign_key: Some(Ident::parse(foreign_key)?),
            local_key: None,
            pivot: None,
        };
        self.add_relation(name, draft)
    }

    /// Declare a one-to-many relation; `foreign_key` is on the related table.
    pub fn has_many(self, name: &str, related: &str, foreign_key: &str) -> OrmResult<Self> {
        let draft = RelationDraft {
            kind: RelationKind::HasMany,
            related: related.to_string(),
            foreign_key: Some(Ident::parse(foreign_key)?),
            local_key: None,
            pivot: None,
        };
        self.add_relation(name, draft)
    }

    /// Declare the inverse side; `foreign_key` is on this entity's table.
    pub fn belongs_to(self, name: &str, related: &str, foreign_key: &str) -> OrmResult<Self> {
        let draft = RelationDraft {
            kind: RelationKind::BelongsTo,
            related: related.to_string(),
            foreign_key: Some(Ident::parse(foreign_key)?),
            local_key: None,
            pivot: None,
        };
        self.add_relation(name, draft)
    }

    /// Declare a many-to-many relation through a pivot table.
    pub fn belongs_to_many(
        self,
        name: &str,
        related: &str,
        pivot_table: &str,
        foreign_pivot_key: &str,
        related_pivot_key: &str,
    ) -> OrmResult<Self> {
        let draft = RelationDraft {
            kind: RelationKind::BelongsToMany,
            related: related.to_string(),
            foreign_key: None,
            local_key: None,
            pivot: Some(Pivot {
                table: Ident::parse(pivot_table)?,
                foreign_pivot_key: Ident::parse(foreign_pivot_key)?,
                related_pivot_key: Ident::parse(related_pivot_key)?,
            }),
        };
        self.add_relation(name, draft)
    }
}

/// One registered entity with its resolved relations.
#[derive(Debug, Clone)]
pub struct Entity {
    pub name: String,
    pub table: Ident,
    pub primary_key: Ident,
    pub soft_delete: Option<Ident>,
    relations: HashMap<String, Relation>,
}

impl Entity {
    /// Look up a relation by name.
    pub fn relation(&self, name: &str) -> OrmResult<&Relation> {
        self.relations.get(name).ok_or_else(|| {
            OrmError::configuration(format!(
                "undefined relation '{}' on entity '{}'",
                name, self.name
            ))
        })
    }

    /// Declared relation names, for diagnostics.
    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(String::as_str)
    }
}

/// Immutable, validated registry of entities.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entities: HashMap<String, Entity>,
}

impl Schema {
    /// Validate a set of definitions and build the registry.
    ///
    /// Fails with a configuration error on duplicate entity names or
    /// relations pointing at unregistered entities.
    pub fn build(defs: impl IntoIterator<Item = EntityDef>) -> OrmResult<Self> {
        let defs: Vec<EntityDef> = defs.into_iter().collect();
        let mut keys = HashMap::new();
        for def in &defs {
            if keys
                .insert(def.name.clone(), def.primary_key.clone())
                .is_some()
            {
                return Err(OrmError::configuration(format!(
                    "duplicate entity '{}'",
                    def.name
                )));
            }
        }

        let mut entities = HashMap::new();
        for def in defs {
            let mut relations = HashMap::new();
            for (name, draft) in def.relations {
                let related_pk = keys.get(&draft.related).ok_or_else(|| {
                    OrmError::configuration(format!(
                        "relation '{}' on entity '{}' references unknown entity '{}'",
                        name, def.name, draft.related
                    ))
                })?;
                let relation = match draft.kind {
                    RelationKind::HasOne | RelationKind::HasMany => Relation {
                        kind: draft.kind,
                        related: draft.related,
                        foreign_key: draft
                            .foreign_key
                            .unwrap_or_else(|| related_pk.clone()),
                        local_key: draft
                            .local_key
                            .unwrap_or_else(|| def.primary_key.clone()),
                        pivot: None,
                    },
                    RelationKind::BelongsTo => Relation {
                        kind: draft.kind,
                        related: draft.related,
                        foreign_key: draft
                            .foreign_key
                            .unwrap_or_else(|| related_pk.clone()),
                        local_key: draft.local_key.unwrap_or_else(|| related_pk.clone()),
                        pivot: None,
                    },
                    RelationKind::BelongsToMany => Relation {
                        kind: draft.kind,
                        related: draft.related,
                        foreign_key: related_pk.clone(),
                        local_key: def.primary_key.clone(),
                        pivot: draft.pivot,
                    },
                };
                relations.insert(name, relation);
            }
            entities.insert(
                def.name.clone(),
                Entity {
                    name: def.name,
                    table: def.table,
                    primary_key: def.primary_key,
                    soft_delete: def.soft_delete,
                    relations,
                },
            );
        }
        Ok(Self { entities })
    }

    /// Look up an entity by name.
    pub fn entity(&self, name: &str) -> OrmResult<&Entity> {
        self.entities
            .get(name)
            .ok_or_else(|| OrmError::configuration(format!("unknown entity '{name}'")))
    }
}
