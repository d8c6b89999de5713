//! Pivot table mutations for many-to-many relations.
//!
//! `attach`, `detach`, `sync` and `toggle` issue direct parameterized
//! INSERT/DELETE statements against the pivot table; they never go
//! through the SELECT compiler. Calling any of them on a relation that is
//! not many-to-many is a configuration error.

use crate::clause::ClauseGroup;
use crate::compiler;
use crate::entity::{self, SharedInstance};
use crate::error::{OrmError, OrmResult};
use crate::executor::Executor;
use crate::ident::Ident;
use crate::schema::{Pivot, RelationKind};
use crate::session::Session;
use crate::value::Value;
use std::collections::HashSet;

/// Outcome of a [`Session::sync`] or [`Session::toggle`] call.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SyncResult {
    pub attached: Vec<Value>,
    pub detached: Vec<Value>,
}

impl<E: Executor> Session<E> {
    fn pivot_context(
        &self,
        parent: &SharedInstance,
        relation: &str,
    ) -> OrmResult<(Pivot, Value)> {
        let entity_name = entity::read(parent).entity.clone();
        let def = self.schema.entity(&entity_name)?;
        let rel = def.relation(relation)?;
        if rel.kind != RelationKind::BelongsToMany {
            return Err(OrmError::configuration(format!(
                "relation '{relation}' on '{entity_name}' is not many-to-many"
            )));
        }
        let pivot = rel.pivot.clone().ok_or_else(|| {
            OrmError::configuration(format!("relation '{relation}' has no pivot table"))
        })?;
        let key = entity::read(parent)
            .get(rel.local_key.name())
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| {
                OrmError::validation(format!(
                    "{entity_name} instance has no '{}' value",
                    rel.local_key
                ))
            })?;
        Ok((pivot, key))
    }

    /// Insert one pivot row per id, merging `extra` columns into each.
    /// Duplicates are not filtered; attaching an already-attached id
    /// inserts another row.
    pub async fn attach(
        &mut self,
        parent: &SharedInstance,
        relation: &str,
        ids: &[Value],
        extra: &[(String, Value)],
    ) -> OrmResult<()> {
        let (pivot, key) = self.pivot_context(parent, relation)?;
        if ids.is_empty() {
            return Ok(());
        }
        let mut columns = vec![
            pivot.foreign_pivot_key.clone(),
            pivot.related_pivot_key.clone(),
        ];
        for (name, _) in extra {
            columns.push(Ident::parse(name)?);
        }
        let rows: Vec<Vec<Value>> = ids
            .iter()
            .map(|id| {
                let mut row = vec![key.clone(), id.clone()];
                row.extend(extra.iter().map(|(_, v)| v.clone()));
                row
            })
            .collect();
        let (sql, bindings) =
            compiler::compile_insert(self.dialect, &pivot.table, &columns, &rows)?;
        self.run_execute(&sql, &bindings).await?;
        Ok(())
    }

    /// Delete pivot rows for the given ids, or all of the parent's rows
    /// when `ids` is `None`. `Some(&[])` deletes nothing.
    pub async fn detach(
        &mut self,
        parent: &SharedInstance,
        relation: &str,
        ids: Option<&[Value]>,
    ) -> OrmResult<u64> {
        let (pivot, key) = self.pivot_context(parent, relation)?;
        let mut wheres = ClauseGroup::new();
        wheres.eq(&pivot.foreign_pivot_key.to_string(), key);
        match ids {
            Some([]) => return Ok(0),
            Some(ids) => {
                wheres.in_list(&pivot.related_pivot_key.to_string(), ids.to_vec());
            }
            None => {}
        }
        let (sql, bindings) = compiler::compile_delete(self.dialect, &pivot.table, &wheres)?;
        self.run_execute(&sql, &bindings).await
    }

    /// Make the pivot rows match `ids` exactly: ids not in the desired
    /// set are detached first, then missing ids are attached. Both lists
    /// come back in first-seen order.
    pub async fn sync(
        &mut self,
        parent: &SharedInstance,
        relation: &str,
        ids: &[Value],
    ) -> OrmResult<SyncResult> {
        let current = self.current_ids(parent, relation).await?;
        let desired: HashSet<Value> = ids.iter().cloned().collect();
        let current_set: HashSet<Value> = current.iter().cloned().collect();

        let detached: Vec<Value> = current
            .iter()
            .filter(|id| !desired.contains(id))
            .cloned()
            .collect();
        let attached: Vec<Value> = dedup_first_seen(ids)
            .into_iter()
            .filter(|id| !current_set.contains(id))
            .collect();

        if !detached.is_empty() {
            self.detach(parent, relation, Some(&detached)).await?;
        }
        if !attached.is_empty() {
            self.attach(parent, relation, &attached, &[]).await?;
        }
        Ok(SyncResult { attached, detached })
    }

    /// Flip membership for each id: attached ids are detached, missing
    /// ones are attached.
    pub async fn toggle(
        &mut self,
        parent: &SharedInstance,
        relation: &str,
        ids: &[Value],
    ) -> OrmResult<SyncResult> {
        let current: HashSet<Value> = self
            .current_ids(parent, relation)
            .await?
            .into_iter()
            .collect();
        let ids = dedup_first_seen(ids);
        let (detached, attached): (Vec<Value>, Vec<Value>) =
            ids.into_iter().partition(|id| current.contains(id));

        if !detached.is_empty() {
            self.detach(parent, relation, Some(&detached)).await?;
        }
        if !attached.is_empty() {
            self.attach(parent, relation, &attached, &[]).await?;
        }
        Ok(SyncResult { attached, detached })
    }

    /// The related ids currently present on the pivot table for a parent.
    pub async fn current_ids(
        &mut self,
        parent: &SharedInstance,
        relation: &str,
    ) -> OrmResult<Vec<Value>> {
        let (pivot, key) = self.pivot_context(parent, relation)?;
        let builder = crate::builder::QueryBuilder::table(&pivot.table.to_string())
            .select(&[&pivot.related_pivot_key.to_string()])
            .eq(&pivot.foreign_pivot_key.to_string(), key);
        let (sql, bindings) = builder.compile(self.dialect)?;
        let rows = self.run_query(&sql, &bindings).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                row.get(pivot.related_pivot_key.name())
                    .filter(|v| !v.is_null())
                    .cloned()
            })
            .collect())
    }
}

fn dedup_first_seen(ids: &[Value]) -> Vec<Value> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert((*id).clone()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::row::Row;
    use crate::testing::{blog_schema, FakeExecutor};
    use std::sync::Arc;

    async fn user_session() -> (Session<FakeExecutor>, SharedInstance) {
        let executor = FakeExecutor::new();
        executor.push_rows(vec![Row::new().with("id", 1).with("name", "ada")]);
        let mut session = Session::new(executor, Arc::new(blog_schema()), Dialect::Ansi);
        let user = session.find("User", 1).await.unwrap().unwrap();
        (session, user)
    }

    #[tokio::test]
    async fn attach_is_one_multi_row_insert() {
        let (mut session, user) = user_session().await;
        session
            .attach(&user, "tags", &[Value::Int(10), Value::Int(11)], &[])
            .await
            .unwrap();
        let (sql, bindings) = session.executor.statements().last().unwrap().clone();
        assert_eq!(
            sql,
            r#"INSERT INTO "tag_user" ("user_id", "tag_id") VALUES (?, ?), (?, ?)"#
        );
        assert_eq!(
            bindings,
            vec![Value::Int(1), Value::Int(10), Value::Int(1), Value::Int(11)]
        );
    }

    #[tokio::test]
    async fn attach_merges_extra_columns() {
        let (mut session, user) = user_session().await;
        session
            .attach(
                &user,
                "tags",
                &[Value::Int(10)],
                &[("granted_by".to_string(), Value::Int(9))],
            )
            .await
            .unwrap();
        let (sql, bindings) = session.executor.statements().last().unwrap().clone();
        assert_eq!(
            sql,
            r#"INSERT INTO "tag_user" ("user_id", "tag_id", "granted_by") VALUES (?, ?, ?)"#
        );
        assert_eq!(bindings, vec![Value::Int(1), Value::Int(10), Value::Int(9)]);
    }

    #[tokio::test]
    async fn detach_variants() {
        let (mut session, user) = user_session().await;
        let before = session.executor.statements().len();

        session.detach(&user, "tags", Some(&[])).await.unwrap();
        assert_eq!(session.executor.statements().len(), before);

        session
            .detach(&user, "tags", Some(&[Value::Int(10)]))
            .await
            .unwrap();
        let (sql, _) = session.executor.statements().last().unwrap().clone();
        assert_eq!(
            sql,
            r#"DELETE FROM "tag_user" WHERE "user_id" = ? AND "tag_id" IN (?)"#
        );

        session.detach(&user, "tags", None).await.unwrap();
        let (sql, bindings) = session.executor.statements().last().unwrap().clone();
        assert_eq!(sql, r#"DELETE FROM "tag_user" WHERE "user_id" = ?"#);
        assert_eq!(bindings, vec![Value::Int(1)]);
    }

    #[tokio::test]
    async fn sync_computes_set_difference() {
        let (mut session, user) = user_session().await;
        // Currently attached: {1, 2}.
        session.executor.push_rows(vec![
            Row::new().with("tag_id", 1),
            Row::new().with("tag_id", 2),
        ]);
        let result = session
            .sync(&user, "tags", &[Value::Int(2), Value::Int(3)])
            .await
            .unwrap();
        assert_eq!(result.attached, vec![Value::Int(3)]);
        assert_eq!(result.detached, vec![Value::Int(1)]);

        // One SELECT of current ids, then detach before attach.
        let statements = session.executor.statements();
        let tail: Vec<&str> = statements
            .iter()
            .rev()
            .take(3)
            .map(|(sql, _)| sql.as_str())
            .collect();
        assert!(tail[2].starts_with("SELECT"));
        assert!(tail[1].starts_with("DELETE"));
        assert!(tail[0].starts_with("INSERT"));
    }

    #[tokio::test]
    async fn sync_with_no_changes_issues_no_mutation() {
        let (mut session, user) = user_session().await;
        session.executor.push_rows(vec![Row::new().with("tag_id", 2)]);
        let before = session.executor.statements().len();
        let result = session.sync(&user, "tags", &[Value::Int(2)]).await.unwrap();
        assert_eq!(result, SyncResult { attached: vec![], detached: vec![] });
        // Only the current-ids SELECT ran.
        assert_eq!(session.executor.statements().len(), before + 1);
    }

    #[tokio::test]
    async fn toggle_flips_membership() {
        let (mut session, user) = user_session().await;
        session.executor.push_rows(vec![Row::new().with("tag_id", 1)]);
        let result = session
            .toggle(&user, "tags", &[Value::Int(1), Value::Int(2)])
            .await
            .unwrap();
        assert_eq!(result.detached, vec![Value::Int(1)]);
        assert_eq!(result.attached, vec![Value::Int(2)]);
    }

    #[tokio::test]
    async fn non_pivot_relation_is_rejected() {
        let (mut session, user) = user_session().await;
        let err = session
            .attach(&user, "posts", &[Value::Int(1)], &[])
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
