//! Hydrated entity instances.
//!
//! An [`Instance`] is a bag of column attributes plus a snapshot of what
//! the database last reported, which drives dirty tracking for partial
//! updates. Instances are shared as [`SharedInstance`] handles so the
//! identity map can refresh one object in place and every holder observes
//! the new state.

use crate::ident::Ident;
use crate::row::Row;
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared handle to an instance.
pub type SharedInstance = Arc<RwLock<Instance>>;

/// Read-lock a shared instance, recovering from poisoning.
pub fn read(instance: &SharedInstance) -> RwLockReadGuard<'_, Instance> {
    instance.read().unwrap_or_else(PoisonError::into_inner)
}

/// Write-lock a shared instance, recovering from poisoning.
pub fn write(instance: &SharedInstance) -> RwLockWriteGuard<'_, Instance> {
    instance.write().unwrap_or_else(PoisonError::into_inner)
}

/// Cached result of resolving one relation on one instance.
#[derive(Debug, Clone)]
pub enum Loaded {
    /// A to-one relation; `None` records a resolved-but-absent target.
    One(Option<SharedInstance>),
    /// A to-many relation, possibly empty.
    Many(Vec<SharedInstance>),
}

/// One hydrated (or in-memory) entity row.
#[derive(Debug, Default)]
pub struct Instance {
    /// Registered entity name.
    pub entity: String,
    attributes: BTreeMap<String, Value>,
    original: BTreeMap<String, Value>,
    /// Whether the instance is backed by a database row.
    pub exists: bool,
    relations: HashMap<String, Loaded>,
}

impl Instance {
    /// A fresh in-memory instance with no attributes.
    pub fn new(entity: &str) -> Self {
        Self {
            entity: entity.to_string(),
            ..Default::default()
        }
    }

    /// Hydrate from a database row: attributes and original snapshot both
    /// take the row's values, and the instance is marked persistent.
    pub fn from_row(entity: &str, row: Row) -> Self {
        let attributes: BTreeMap<String, Value> = row.into_attributes();
        Self {
            entity: entity.to_string(),
            original: attributes.clone(),
            attributes,
            exists: true,
            relations: HashMap::new(),
        }
    }

    /// Get one attribute.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Set one attribute.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    /// All attributes in column order.
    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// The value of the given primary key column, when set and non-null.
    pub fn key(&self, primary_key: &Ident) -> Option<&Value> {
        self.attributes
            .get(primary_key.name())
            .filter(|v| !v.is_null())
    }

    /// Attributes that differ from the original snapshot, in column order.
    pub fn dirty(&self) -> Vec<(String, Value)> {
        self.attributes
            .iter()
            .filter(|(name, value)| self.original.get(*name) != Some(value))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Whether any attribute differs from the original snapshot.
    pub fn is_dirty(&self) -> bool {
        self.attributes
            .iter()
            .any(|(name, value)| self.original.get(name) != Some(value))
    }

    /// Accept the current attributes as the persisted state.
    pub fn sync_original(&mut self) {
        self.original = self.attributes.clone();
    }

    /// Replace attributes with a fresh row and resync, keeping
    /// already-loaded relations intact.
    pub fn refresh_from(&mut self, row: Row) {
        self.attributes = row.into_attributes();
        self.original = self.attributes.clone();
        self.exists = true;
    }

    /// Look up a cached relation result.
    pub fn relation(&self, name: &str) -> Option<&Loaded> {
        self.relations.get(name)
    }

    /// All cached relation results.
    pub fn relations(&self) -> &HashMap<String, Loaded> {
        &self.relations
    }

    /// Whether a relation has been resolved (even to an empty result).
    pub fn relation_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// Store a resolved relation result.
    pub fn set_relation(&mut self, name: &str, loaded: Loaded) {
        self.relations.insert(name.to_string(), loaded);
    }

    /// Drop one cached relation so the next access re-queries.
    pub fn unload_relation(&mut self, name: &str) {
        self.relations.remove(name);
    }

    /// Wrap into a shared handle.
    pub fn into_shared(self) -> SharedInstance {
        Arc::new(RwLock::new(self))
    }
}
