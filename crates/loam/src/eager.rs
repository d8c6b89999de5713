//! Batched relation loading.
//!
//! [`Session::load_related`] walks a dot-separated relation path over a
//! pool of parents. Each segment issues at most one batched query: the
//! distinct non-null join keys are collected in first-seen order, matched
//! against one `IN` query (a pivot join for many-to-many), and every
//! parent's cache entry is assigned, including the parents with no match.
//! The resolved children, deduplicated, become the pool for the next
//! segment. Query count therefore depends on path length, never on the
//! number of parents.

use crate::builder::QueryBuilder;
use crate::entity::{self, Loaded, SharedInstance};
use crate::error::{OrmError, OrmResult};
use crate::executor::Executor;
use crate::ident::Ident;
use crate::relation::PIVOT_ATTR_PREFIX;
use crate::schema::{Entity, Relation, RelationKind};
use crate::session::Session;
use crate::value::Value;
use std::collections::{HashMap, HashSet};

impl<E: Executor> Session<E> {
    /// Resolve a relation path (`"posts"` or `"posts.comments"`) for every
    /// instance in `parents`.
    pub async fn load_related(
        &mut self,
        parents: &[SharedInstance],
        path: &str,
    ) -> OrmResult<()> {
        let mut pool: Vec<SharedInstance> = parents.to_vec();
        for segment in path.split('.') {
            if segment.is_empty() {
                return Err(OrmError::validation(format!(
                    "malformed relation path '{path}'"
                )));
            }
            pool = self.load_segment(&pool, segment).await?;
        }
        Ok(())
    }

    async fn load_segment(
        &mut self,
        parents: &[SharedInstance],
        name: &str,
    ) -> OrmResult<Vec<SharedInstance>> {
        if parents.is_empty() {
            return Ok(Vec::new());
        }
        let entity_name = entity::read(&parents[0]).entity.clone();
        let schema = self.schema.clone();
        let def = schema.entity(&entity_name)?;
        let relation = def.relation(name)?.clone();
        let related = schema.entity(&relation.related)?;

        let children = match relation.kind {
            RelationKind::BelongsToMany => {
                self.load_via_pivot(related, name, &relation, parents).await?
            }
            _ => self.load_direct(related, name, &relation, parents).await?,
        };
        Ok(dedup(children))
    }

    /// HasOne / HasMany / BelongsTo: one `IN` query on the related table.
    async fn load_direct(
        &mut self,
        related: &Entity,
        name: &str,
        relation: &Relation,
        parents: &[SharedInstance],
    ) -> OrmResult<Vec<SharedInstance>> {
        // The key held by the parent, and the column it matches on the
        // related side, swap roles between the owning and inverse kinds.
        let (parent_col, child_col) = match relation.kind {
            RelationKind::BelongsTo => (&relation.foreign_key, &relation.local_key),
            _ => (&relation.local_key, &relation.foreign_key),
        };
        let keys = collect_keys(parents, parent_col.name());
        if keys.is_empty() {
            assign_empty(parents, name, relation.kind);
            return Ok(Vec::new());
        }

        let mut builder =
            QueryBuilder::table(&related.table.to_string()).in_list(&child_col.to_string(), keys);
        if let Some(marker) = &related.soft_delete {
            builder = builder.soft_deletes(&marker.to_string());
        }
        let (sql, bindings) = builder.compile(self.dialect)?;
        let rows = self.run_query(&sql, &bindings).await?;
        let children = self.hydrate_rows(related, rows);

        let mut dict: HashMap<Value, Vec<SharedInstance>> = HashMap::new();
        for child in &children {
            let key = entity::read(child)
                .get(child_col.name())
                .filter(|v| !v.is_null())
                .cloned();
            if let Some(key) = key {
                dict.entry(key).or_default().push(child.clone());
            }
        }
        assign(parents, name, relation.kind, |key| {
            dict.get(key).cloned().unwrap_or_default()
        }, parent_col.name());
        Ok(children)
    }

    /// BelongsToMany: one pivot-joined query projecting the pivot key
    /// columns under the `pivot_` prefix.
    async fn load_via_pivot(
        &mut self,
        related: &Entity,
        name: &str,
        relation: &Relation,
        parents: &[SharedInstance],
    ) -> OrmResult<Vec<SharedInstance>> {
        let pivot = relation.pivot.as_ref().ok_or_else(|| {
            OrmError::configuration(format!("relation '{name}' has no pivot table"))
        })?;
        let keys = collect_keys(parents, relation.local_key.name());
        if keys.is_empty() {
            assign_empty(parents, name, relation.kind);
            return Ok(Vec::new());
        }

        let dialect = self.dialect;
        let fk_alias = Ident::parse(&format!(
            "{PIVOT_ATTR_PREFIX}{}",
            pivot.foreign_pivot_key.name()
        ))?;
        let rk_alias = Ident::parse(&format!(
            "{PIVOT_ATTR_PREFIX}{}",
            pivot.related_pivot_key.name()
        ))?;
        let fk_qualified = Ident::parse(&format!("{}.{}", pivot.table, pivot.foreign_pivot_key))?;
        let rk_qualified = Ident::parse(&format!("{}.{}", pivot.table, pivot.related_pivot_key))?;

        let mut builder = QueryBuilder::table(&related.table.to_string())
            .select_raw(format!("{}.*", dialect.quote(&related.table)))
            .select_raw(format!(
                "{} AS {}",
                dialect.quote(&fk_qualified),
                dialect.quote(&fk_alias)
            ))
            .select_raw(format!(
                "{} AS {}",
                dialect.quote(&rk_qualified),
                dialect.quote(&rk_alias)
            ))
            .join(
                &pivot.table.to_string(),
                &rk_qualified.to_string(),
                "=",
                &format!("{}.{}", related.table, relation.foreign_key),
            )
            .in_list(&fk_qualified.to_string(), keys);
        if let Some(marker) = &related.soft_delete {
            builder = builder.soft_deletes(&format!("{}.{}", related.table, marker));
        }
        let (sql, bindings) = builder.compile(dialect)?;
        let rows = self.run_query(&sql, &bindings).await?;

        // Extract the parent key from the projected pivot column before
        // hydration consumes the row.
        let mut pairs = Vec::with_capacity(rows.len());
        for row in rows {
            let parent_key = row.get(fk_alias.name()).filter(|v| !v.is_null()).cloned();
            let shared = self.identity.hydrate(related, row);
            pairs.push((parent_key, shared));
        }
        let mut dict: HashMap<Value, Vec<SharedInstance>> = HashMap::new();
        let mut children = Vec::with_capacity(pairs.len());
        for (parent_key, child) in pairs {
            if let Some(key) = parent_key {
                dict.entry(key).or_default().push(child.clone());
            }
            children.push(child);
        }
        assign(parents, name, relation.kind, |key| {
            dict.get(key).cloned().unwrap_or_default()
        }, relation.local_key.name());
        Ok(children)
    }
}

/// Distinct non-null key values across the parents, first-seen order.
fn collect_keys(parents: &[SharedInstance], column: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for parent in parents {
        let value = entity::read(parent)
            .get(column)
            .filter(|v| !v.is_null())
            .cloned();
        if let Some(value) = value {
            if seen.insert(value.clone()) {
                keys.push(value);
            }
        }
    }
    keys
}

fn empty_loaded(kind: RelationKind) -> Loaded {
    match kind {
        RelationKind::HasMany | RelationKind::BelongsToMany => Loaded::Many(Vec::new()),
        RelationKind::HasOne | RelationKind::BelongsTo => Loaded::One(None),
    }
}

fn assign_empty(parents: &[SharedInstance], name: &str, kind: RelationKind) {
    for parent in parents {
        entity::write(parent).set_relation(name, empty_loaded(kind));
    }
}

fn assign(
    parents: &[SharedInstance],
    name: &str,
    kind: RelationKind,
    bucket: impl Fn(&Value) -> Vec<SharedInstance>,
    key_column: &str,
) {
    for parent in parents {
        let key = entity::read(parent)
            .get(key_column)
            .filter(|v| !v.is_null())
            .cloned();
        let matched = key.map(|k| bucket(&k)).unwrap_or_default();
        let loaded = match kind {
            RelationKind::HasMany | RelationKind::BelongsToMany => Loaded::Many(matched),
            RelationKind::HasOne | RelationKind::BelongsTo => {
                Loaded::One(matched.into_iter().next())
            }
        };
        entity::write(parent).set_relation(name, loaded);
    }
}

fn dedup(children: Vec<SharedInstance>) -> Vec<SharedInstance> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        if seen.insert(std::sync::Arc::as_ptr(&child)) {
            out.push(child);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::row::Row;
    use crate::testing::{blog_schema, FakeExecutor};
    use std::sync::Arc;

    fn session(executor: FakeExecutor) -> Session<FakeExecutor> {
        Session::new(executor, Arc::new(blog_schema()), Dialect::Ansi)
    }

    fn users_rows() -> Vec<Row> {
        vec![
            Row::new().with("id", 1).with("name", "ada"),
            Row::new().with("id", 2).with("name", "ben"),
            Row::new().with("id", 3).with("name", "cyd"),
        ]
    }

    #[tokio::test]
    async fn has_many_is_one_batched_query() {
        let executor = FakeExecutor::new();
        executor.push_rows(users_rows());
        executor.push_rows(vec![
            Row::new().with("id", 10).with("user_id", 1).with("title", "a"),
            Row::new().with("id", 11).with("user_id", 2).with("title", "b"),
        ]);
        let mut session = session(executor);

        let users = session.query("User").unwrap().get().await.unwrap();
        let before = session.executor.statements().len();
        session.load_related(&users, "posts").await.unwrap();
        assert_eq!(session.executor.statements().len(), before + 1);

        let (sql, bindings) = session.executor.statements().last().unwrap().clone();
        assert_eq!(sql, r#"SELECT * FROM "posts" WHERE "user_id" IN (?, ?, ?)"#);
        assert_eq!(bindings, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);

        let lens: Vec<usize> = users
            .iter()
            .map(|u| match entity::read(u).relation("posts") {
                Some(Loaded::Many(v)) => v.len(),
                _ => panic!("posts not loaded"),
            })
            .collect();
        assert_eq!(lens, vec![1, 1, 0]);
    }

    #[tokio::test]
    async fn two_segment_path_is_two_queries() {
        let executor = FakeExecutor::new();
        executor.push_rows(users_rows());
        executor.push_rows(vec![
            Row::new().with("id", 10).with("user_id", 1).with("title", "a"),
            Row::new().with("id", 11).with("user_id", 1).with("title", "b"),
            Row::new().with("id", 12).with("user_id", 2).with("title", "c"),
        ]);
        executor.push_rows(vec![
            Row::new().with("id", 1).with("name", "ada"),
            Row::new().with("id", 2).with("name", "ben"),
        ]);
        let mut session = session(executor);

        let users = session.query("User").unwrap().get().await.unwrap();
        let before = session.executor.statements().len();
        session.load_related(&users, "posts.author").await.unwrap();
        assert_eq!(session.executor.statements().len(), before + 2);

        // The second segment's keys are the posts' distinct author ids.
        let (sql, bindings) = session.executor.statements().last().unwrap().clone();
        assert_eq!(
            sql,
            r#"SELECT * FROM "users" WHERE "id" IN (?, ?) AND "deleted_at" IS NULL"#
        );
        assert_eq!(bindings, vec![Value::Int(1), Value::Int(2)]);

        let posts = match entity::read(&users[0]).relation("posts") {
            Some(Loaded::Many(v)) => v.clone(),
            _ => panic!("posts not loaded"),
        };
        let author = match entity::read(&posts[0]).relation("author") {
            Some(Loaded::One(Some(a))) => a.clone(),
            _ => panic!("author not loaded"),
        };
        // The author instance is the same shared object as the parent user.
        assert!(Arc::ptr_eq(&author, &users[0]));
    }

    #[tokio::test]
    async fn empty_parents_issue_no_query() {
        let executor = FakeExecutor::new();
        let mut session = session(executor);
        session.load_related(&[], "posts").await.unwrap();
        assert!(session.executor.statements().is_empty());
    }

    #[tokio::test]
    async fn pivot_relation_projects_pivot_keys() {
        let executor = FakeExecutor::new();
        executor.push_rows(vec![
            Row::new().with("id", 1).with("name", "ada"),
            Row::new().with("id", 2).with("name", "ben"),
        ]);
        executor.push_rows(vec![
            Row::new()
                .with("id", 100)
                .with("label", "rust")
                .with("pivot_user_id", 1)
                .with("pivot_tag_id", 100),
            Row::new()
                .with("id", 100)
                .with("label", "rust")
                .with("pivot_user_id", 2)
                .with("pivot_tag_id", 100),
            Row::new()
                .with("id", 101)
                .with("label", "sql")
                .with("pivot_user_id", 1)
                .with("pivot_tag_id", 101),
        ]);
        let mut session = session(executor);

        let users = session.query("User").unwrap().get().await.unwrap();
        session.load_related(&users, "tags").await.unwrap();

        let (sql, bindings) = session.executor.statements().last().unwrap().clone();
        assert_eq!(
            sql,
            r#"SELECT "tags".*, "tag_user"."user_id" AS "pivot_user_id", "tag_user"."tag_id" AS "pivot_tag_id" FROM "tags" INNER JOIN "tag_user" ON "tag_user"."tag_id" = "tags"."id" WHERE "tag_user"."user_id" IN (?, ?)"#
        );
        assert_eq!(bindings, vec![Value::Int(1), Value::Int(2)]);

        let ada_tags = match entity::read(&users[0]).relation("tags") {
            Some(Loaded::Many(v)) => v.clone(),
            _ => panic!("tags not loaded"),
        };
        let ben_tags = match entity::read(&users[1]).relation("tags") {
            Some(Loaded::Many(v)) => v.clone(),
            _ => panic!("tags not loaded"),
        };
        assert_eq!(ada_tags.len(), 2);
        assert_eq!(ben_tags.len(), 1);
        // The shared tag is one identity-mapped object on both parents.
        assert!(Arc::ptr_eq(&ada_tags[0], &ben_tags[0]));
        assert!(
            entity::read(&ada_tags[0])
                .get("pivot_user_id")
                .is_some()
        );
    }

    #[tokio::test]
    async fn malformed_path_is_rejected() {
        let executor = FakeExecutor::new();
        executor.push_rows(vec![Row::new().with("id", 1)]);
        let mut session = session(executor);
        let users = session.query("User").unwrap().get().await.unwrap();
        let err = session.load_related(&users, "posts..author").await.unwrap_err();
        assert!(err.is_validation());
    }
}
