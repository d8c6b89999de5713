//! JSON projection of instances.
//!
//! Renders an instance's attributes plus whatever relations are loaded.
//! A visited set of `(entity, primary key)` truncates cycles: revisiting
//! an instance emits a minimal `{pk_column: pk}` reference instead of
//! recursing forever. Relations are emitted in name order so output is
//! deterministic.

use crate::entity::{self, Loaded, SharedInstance};
use crate::error::OrmResult;
use crate::schema::Schema;
use crate::value::Value;
use std::collections::HashSet;

/// Serialize an instance and its loaded relations to JSON.
pub fn serialize_instance(
    schema: &Schema,
    instance: &SharedInstance,
) -> OrmResult<serde_json::Value> {
    let mut visited = HashSet::new();
    serialize_inner(schema, instance, &mut visited)
}

fn serialize_inner(
    schema: &Schema,
    instance: &SharedInstance,
    visited: &mut HashSet<(String, Value)>,
) -> OrmResult<serde_json::Value> {
    // Snapshot under the lock, then release it before recursing so a
    // cyclic graph never re-enters a held RwLock.
    let (entity_name, attributes, relations, key) = {
        let inst = entity::read(instance);
        let def = schema.entity(&inst.entity)?;
        let key = inst.key(&def.primary_key).cloned();
        let mut relations: Vec<(String, Loaded)> = inst
            .relations()
            .iter()
            .map(|(name, loaded)| (name.clone(), loaded.clone()))
            .collect();
        relations.sort_by(|a, b| a.0.cmp(&b.0));
        (
            inst.entity.clone(),
            inst.attributes().clone(),
            relations,
            key,
        )
    };
    let pk_name = schema.entity(&entity_name)?.primary_key.name().to_string();

    if let Some(key) = &key {
        if !visited.insert((entity_name.clone(), key.clone())) {
            let mut reference = serde_json::Map::new();
            reference.insert(pk_name, key.to_json());
            return Ok(serde_json::Value::Object(reference));
        }
    }

    let mut map = serde_json::Map::new();
    for (name, value) in &attributes {
        map.insert(name.clone(), value.to_json());
    }
    for (name, loaded) in relations {
        let rendered = match loaded {
            Loaded::One(None) => serde_json::Value::Null,
            Loaded::One(Some(child)) => serialize_inner(schema, &child, visited)?,
            Loaded::Many(children) => serde_json::Value::Array(
                children
                    .iter()
                    .map(|child| serialize_inner(schema, child, visited))
                    .collect::<OrmResult<Vec<_>>>()?,
            ),
        };
        map.insert(name, rendered);
    }
    Ok(serde_json::Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Instance;
    use crate::testing::blog_schema;
    use serde_json::json;

    #[test]
    fn attributes_only() {
        let schema = blog_schema();
        let mut user = Instance::new("User");
        user.set("id", 1);
        user.set("name", "ada");
        user.set("deleted_at", Value::Null);
        let user = user.into_shared();
        assert_eq!(
            serialize_instance(&schema, &user).unwrap(),
            json!({"id": 1, "name": "ada", "deleted_at": null})
        );
    }

    #[test]
    fn loaded_relations_are_nested() {
        let schema = blog_schema();
        let mut post = Instance::new("Post");
        post.set("id", 10);
        post.set("user_id", 1);
        let post = post.into_shared();

        let mut user = Instance::new("User");
        user.set("id", 1);
        user.set_relation("posts", Loaded::Many(vec![post]));
        user.set_relation("profile", Loaded::One(None));
        let user = user.into_shared();

        assert_eq!(
            serialize_instance(&schema, &user).unwrap(),
            json!({
                "id": 1,
                "posts": [{"id": 10, "user_id": 1}],
                "profile": null,
            })
        );
    }

    #[test]
    fn cycles_truncate_to_key_reference() {
        let schema = blog_schema();
        let mut user = Instance::new("User");
        user.set("id", 1);
        let user = user.into_shared();

        let mut post = Instance::new("Post");
        post.set("id", 10);
        post.set_relation("author", Loaded::One(Some(user.clone())));
        let post = post.into_shared();

        entity::write(&user).set_relation("posts", Loaded::Many(vec![post]));

        assert_eq!(
            serialize_instance(&schema, &user).unwrap(),
            json!({
                "id": 1,
                "posts": [{"id": 10, "author": {"id": 1}}],
            })
        );
    }
}
