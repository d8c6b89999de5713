//! Per-session identity map.
//!
//! One shared instance per `(entity, primary key)` within a session.
//! Re-hydrating a key that is already tracked refreshes the existing
//! object in place, so every holder of the handle observes the newest
//! row while cached relations survive.
//!
//! Entries are bucketed by entity name, so clearing one entity is a
//! single removal; neither clear ever mutates instances already held
//! by callers.

use crate::entity::{self, Instance, SharedInstance};
use crate::row::Row;
use crate::schema::Entity;
use crate::value::Value;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct IdentityMap {
    buckets: HashMap<String, HashMap<Value, SharedInstance>>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tracked instance for a key, if any.
    pub fn get(&self, entity: &str, key: &Value) -> Option<SharedInstance> {
        self.buckets.get(entity)?.get(key).cloned()
    }

    /// Turn a fetched row into the canonical shared instance.
    ///
    /// Rows with a missing or null primary key hydrate to a fresh,
    /// untracked instance (still marked as persisted).
    pub fn hydrate(&mut self, entity: &Entity, row: Row) -> SharedInstance {
        let key = match row.get(entity.primary_key.name()) {
            Some(v) if !v.is_null() => v.clone(),
            _ => return Instance::from_row(&entity.name, row).into_shared(),
        };
        let bucket = self.buckets.entry(entity.name.clone()).or_default();
        if let Some(existing) = bucket.get(&key) {
            entity::write(existing).refresh_from(row);
            return existing.clone();
        }
        let shared = Instance::from_row(&entity.name, row).into_shared();
        bucket.insert(key, shared.clone());
        shared
    }

    /// Start tracking an instance under the given key. Used after an
    /// insert assigns the primary key.
    pub fn track(&mut self, entity: &str, key: Value, instance: SharedInstance) {
        self.buckets
            .entry(entity.to_string())
            .or_default()
            .insert(key, instance);
    }

    /// Stop tracking one key.
    pub fn remove(&mut self, entity: &str, key: &Value) {
        if let Some(bucket) = self.buckets.get_mut(entity) {
            bucket.remove(key);
        }
    }

    /// Drop every tracked instance of one entity.
    pub fn clear_entity(&mut self, entity: &str) {
        self.buckets.remove(entity);
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(HashMap::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity;
    use crate::schema::{EntityDef, Schema};
    use std::sync::Arc;

    fn users_entity() -> Entity {
        let schema = Schema::build([EntityDef::new("User", "users").unwrap()]).unwrap();
        schema.entity("User").unwrap().clone()
    }

    #[test]
    fn same_key_yields_same_object() {
        let users = users_entity();
        let mut map = IdentityMap::new();
        let a = map.hydrate(&users, Row::new().with("id", 1).with("name", "kim"));
        let b = map.hydrate(&users, Row::new().with("id", 1).with("name", "kim"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn rehydration_refreshes_in_place() {
        let users = users_entity();
        let mut map = IdentityMap::new();
        let first = map.hydrate(&users, Row::new().with("id", 1).with("name", "old"));
        map.hydrate(&users, Row::new().with("id", 1).with("name", "new"));
        assert_eq!(
            entity::read(&first).get("name"),
            Some(&Value::from("new"))
        );
    }

    #[test]
    fn null_key_rows_are_untracked() {
        let users = users_entity();
        let mut map = IdentityMap::new();
        let a = map.hydrate(&users, Row::new().with("name", "anon"));
        let b = map.hydrate(&users, Row::new().with("id", Value::Null).with("name", "anon"));
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(map.is_empty());
        assert!(entity::read(&a).exists);
    }

    #[test]
    fn clear_entity_is_scoped() {
        let schema = Schema::build([
            EntityDef::new("User", "users").unwrap(),
            EntityDef::new("Tag", "tags").unwrap(),
        ])
        .unwrap();
        let mut map = IdentityMap::new();
        map.hydrate(schema.entity("User").unwrap(), Row::new().with("id", 1));
        map.hydrate(schema.entity("Tag").unwrap(), Row::new().with("id", 1));
        map.clear_entity("User");
        assert_eq!(map.len(), 1);
        assert!(map.get("Tag", &Value::Int(1)).is_some());
    }

    #[test]
    fn cleared_entities_rehydrate_fresh() {
        let users = users_entity();
        let mut map = IdentityMap::new();
        let held = map.hydrate(&users, Row::new().with("id", 1).with("name", "kim"));
        map.clear_entity("User");

        // The held handle is untouched; the next hydration of the same
        // key is a new object, not a refresh of the old one.
        let fresh = map.hydrate(&users, Row::new().with("id", 1).with("name", "lee"));
        assert!(!Arc::ptr_eq(&held, &fresh));
        assert_eq!(entity::read(&held).get("name"), Some(&Value::from("kim")));
        assert_eq!(entity::read(&fresh).get("name"), Some(&Value::from("lee")));
    }
}
