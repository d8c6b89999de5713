//! Unit-of-work session.
//!
//! A [`Session`] owns the executor, the entity registry, the dialect, the
//! per-session identity map and an optional query log. Every database
//! round trip funnels through [`Session::run_query`] /
//! [`Session::run_execute`], which emit `tracing` events and feed the log.
//!
//! Persistence follows the usual data-mapper rules: `save` INSERTs new
//! instances (picking the generated key up into the primary key attribute)
//! and UPDATEs only the dirty attributes of existing ones; `delete` is
//! soft when the entity declares a marker column and hard otherwise.

use crate::builder::{Direction, QueryBuilder};
use crate::clause::ClauseGroup;
use crate::compiler;
use crate::dialect::Dialect;
use crate::entity::{self, SharedInstance};
use crate::error::{OrmError, OrmResult};
use crate::executor::Executor;
use crate::ident::Ident;
use crate::identity::IdentityMap;
use crate::row::Row;
use crate::schema::{Entity, Schema};
use crate::value::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One recorded database round trip.
#[derive(Debug, Clone)]
pub struct LoggedQuery {
    pub sql: String,
    pub bindings: Vec<Value>,
    pub elapsed: Duration,
}

pub struct Session<E: Executor> {
    pub(crate) executor: E,
    pub(crate) schema: Arc<Schema>,
    pub(crate) dialect: Dialect,
    pub(crate) identity: IdentityMap,
    query_log: Vec<LoggedQuery>,
    logging: bool,
}

impl<E: Executor> Session<E> {
    pub fn new(executor: E, schema: Arc<Schema>, dialect: Dialect) -> Self {
        Self {
            executor,
            schema,
            dialect,
            identity: IdentityMap::new(),
            query_log: Vec::new(),
            logging: false,
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn identity_map(&mut self) -> &mut IdentityMap {
        &mut self.identity
    }

    // ==================== Query log ====================

    pub fn enable_query_log(&mut self) {
        self.logging = true;
    }

    pub fn disable_query_log(&mut self) {
        self.logging = false;
    }

    pub fn query_log(&self) -> &[LoggedQuery] {
        &self.query_log
    }

    /// Drain and return the recorded queries.
    pub fn flush_query_log(&mut self) -> Vec<LoggedQuery> {
        std::mem::take(&mut self.query_log)
    }

    // ==================== Round trips ====================

    pub(crate) async fn run_query(
        &mut self,
        sql: &str,
        bindings: &[Value],
    ) -> OrmResult<Vec<Row>> {
        let started = Instant::now();
        let result = self.executor.query(sql, bindings).await;
        let elapsed = started.elapsed();
        tracing::debug!(
            sql,
            bindings = bindings.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            rows = result.as_ref().map(Vec::len).unwrap_or(0),
            "query"
        );
        if self.logging {
            self.query_log.push(LoggedQuery {
                sql: sql.to_string(),
                bindings: bindings.to_vec(),
                elapsed,
            });
        }
        result
    }

    pub(crate) async fn run_execute(&mut self, sql: &str, bindings: &[Value]) -> OrmResult<u64> {
        let started = Instant::now();
        let result = self.executor.execute(sql, bindings).await;
        let elapsed = started.elapsed();
        tracing::debug!(
            sql,
            bindings = bindings.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            affected = result.as_ref().copied().unwrap_or(0),
            "execute"
        );
        if self.logging {
            self.query_log.push(LoggedQuery {
                sql: sql.to_string(),
                bindings: bindings.to_vec(),
                elapsed,
            });
        }
        result
    }

    // ==================== Reading ====================

    /// Start an entity-scoped query. The builder is seeded with the
    /// entity's table and soft-delete marker.
    pub fn query(&mut self, entity: &str) -> OrmResult<EntityQuery<'_, E>> {
        let (table, marker) = {
            let def = self.schema.entity(entity)?;
            (def.table.to_string(), def.soft_delete.clone())
        };
        let mut builder = QueryBuilder::table(&table);
        if let Some(marker) = marker {
            builder = builder.soft_deletes(&marker.to_string());
        }
        Ok(EntityQuery {
            session: self,
            entity: entity.to_string(),
            builder,
            eager: Vec::new(),
        })
    }

    /// Fetch one instance by primary key.
    pub async fn find(
        &mut self,
        entity: &str,
        key: impl Into<Value>,
    ) -> OrmResult<Option<SharedInstance>> {
        let pk = self.schema.entity(entity)?.primary_key.to_string();
        self.query(entity)?.eq(&pk, key).first().await
    }

    /// Fetch one instance by primary key, failing with `NotFound` when
    /// there is no matching row.
    pub async fn find_or_fail(
        &mut self,
        entity: &str,
        key: impl Into<Value>,
    ) -> OrmResult<SharedInstance> {
        let key = key.into();
        self.find(entity, key.clone()).await?.ok_or_else(|| {
            OrmError::not_found(format!("no {} with key {}", entity, key.literal()))
        })
    }

    pub(crate) fn hydrate_rows(
        &mut self,
        def: &Entity,
        rows: Vec<Row>,
    ) -> Vec<SharedInstance> {
        rows.into_iter()
            .map(|row| self.identity.hydrate(def, row))
            .collect()
    }

    // ==================== Writing ====================

    /// Persist an instance: INSERT when it is new, UPDATE of the dirty
    /// attributes when it already exists. A clean existing instance issues
    /// no statement.
    pub async fn save(&mut self, instance: &SharedInstance) -> OrmResult<()> {
        let (entity_name, exists) = {
            let inst = entity::read(instance);
            (inst.entity.clone(), inst.exists)
        };
        let schema = self.schema.clone();
        let def = schema.entity(&entity_name)?;
        if exists {
            self.update_existing(def, instance).await
        } else {
            self.insert_new(def, instance).await
        }
    }

    async fn insert_new(&mut self, def: &Entity, instance: &SharedInstance) -> OrmResult<()> {
        let (columns, values) = {
            let inst = entity::read(instance);
            let mut columns = Vec::new();
            let mut values = Vec::new();
            for (name, value) in inst.attributes() {
                columns.push(Ident::parse(name)?);
                values.push(value.clone());
            }
            (columns, values)
        };
        if columns.is_empty() {
            return Err(OrmError::validation("cannot insert an instance with no attributes"));
        }
        let (sql, bindings) =
            compiler::compile_insert(self.dialect, &def.table, &columns, &[values])?;
        self.run_execute(&sql, &bindings).await?;

        let mut key = entity::read(instance).key(&def.primary_key).cloned();
        if key.is_none() {
            if let Some(id) = self.executor.last_insert_id().await? {
                entity::write(instance).set(def.primary_key.name(), id.clone());
                key = Some(id);
            }
        }
        {
            let mut inst = entity::write(instance);
            inst.exists = true;
            inst.sync_original();
        }
        if let Some(key) = key {
            self.identity.track(&def.name, key, instance.clone());
        }
        Ok(())
    }

    async fn update_existing(&mut self, def: &Entity, instance: &SharedInstance) -> OrmResult<()> {
        let (sets, key) = {
            let inst = entity::read(instance);
            let key = require_key(def, &inst)?;
            let mut sets = Vec::new();
            for (name, value) in inst.dirty() {
                sets.push((Ident::parse(&name)?, value));
            }
            (sets, key)
        };
        if sets.is_empty() {
            return Ok(());
        }
        let mut wheres = ClauseGroup::new();
        wheres.eq(def.primary_key.name(), key);
        let (sql, bindings) = compiler::compile_update(self.dialect, &def.table, &sets, &wheres)?;
        self.run_execute(&sql, &bindings).await?;
        entity::write(instance).sync_original();
        Ok(())
    }

    /// Delete an instance: soft when the entity declares a marker column
    /// (the identity entry survives), hard otherwise.
    pub async fn delete(&mut self, instance: &SharedInstance) -> OrmResult<()> {
        let entity_name = entity::read(instance).entity.clone();
        let schema = self.schema.clone();
        let def = schema.entity(&entity_name)?;
        let Some(marker) = def.soft_delete.clone() else {
            return self.force_delete(instance).await;
        };

        let key = require_key(def, &entity::read(instance))?;
        let now = Value::from(chrono::Utc::now().to_rfc3339());
        let sets = vec![(marker.clone(), now.clone())];
        let mut wheres = ClauseGroup::new();
        wheres.eq(def.primary_key.name(), key);
        let (sql, bindings) = compiler::compile_update(self.dialect, &def.table, &sets, &wheres)?;
        self.run_execute(&sql, &bindings).await?;
        let mut inst = entity::write(instance);
        inst.set(marker.name(), now);
        inst.sync_original();
        Ok(())
    }

    /// Hard-delete an instance and drop it from the identity map.
    pub async fn force_delete(&mut self, instance: &SharedInstance) -> OrmResult<()> {
        let entity_name = entity::read(instance).entity.clone();
        let schema = self.schema.clone();
        let def = schema.entity(&entity_name)?;
        let key = require_key(def, &entity::read(instance))?;
        let mut wheres = ClauseGroup::new();
        wheres.eq(def.primary_key.name(), key.clone());
        let (sql, bindings) = compiler::compile_delete(self.dialect, &def.table, &wheres)?;
        self.run_execute(&sql, &bindings).await?;
        self.identity.remove(&def.name, &key);
        entity::write(instance).exists = false;
        Ok(())
    }

    /// Clear a soft-deleted instance's marker column.
    pub async fn restore(&mut self, instance: &SharedInstance) -> OrmResult<()> {
        let entity_name = entity::read(instance).entity.clone();
        let schema = self.schema.clone();
        let def = schema.entity(&entity_name)?;
        let marker = def.soft_delete.clone().ok_or_else(|| {
            OrmError::configuration(format!("entity '{}' has no soft-delete column", def.name))
        })?;
        let key = require_key(def, &entity::read(instance))?;
        let sets = vec![(marker.clone(), Value::Null)];
        let mut wheres = ClauseGroup::new();
        wheres.eq(def.primary_key.name(), key);
        let (sql, bindings) = compiler::compile_update(self.dialect, &def.table, &sets, &wheres)?;
        self.run_execute(&sql, &bindings).await?;
        let mut inst = entity::write(instance);
        inst.set(marker.name(), Value::Null);
        inst.sync_original();
        Ok(())
    }

    // ==================== Transactions ====================

    pub async fn begin(&mut self) -> OrmResult<()> {
        self.run_execute("BEGIN", &[]).await?;
        Ok(())
    }

    pub async fn commit(&mut self) -> OrmResult<()> {
        self.run_execute("COMMIT", &[]).await?;
        Ok(())
    }

    pub async fn rollback(&mut self) -> OrmResult<()> {
        self.run_execute("ROLLBACK", &[]).await?;
        Ok(())
    }
}

pub(crate) fn require_key(def: &Entity, inst: &crate::entity::Instance) -> OrmResult<Value> {
    inst.key(&def.primary_key).cloned().ok_or_else(|| {
        OrmError::validation(format!(
            "{} instance has no '{}' value",
            def.name, def.primary_key
        ))
    })
}

/// An entity-scoped query in progress.
///
/// Wraps a [`QueryBuilder`] seeded from the entity definition; terminal
/// methods execute it, hydrate through the identity map and resolve any
/// eager paths requested via [`EntityQuery::with`].
pub struct EntityQuery<'a, E: Executor> {
    session: &'a mut Session<E>,
    entity: String,
    builder: QueryBuilder,
    eager: Vec<String>,
}

impl<E: Executor> std::fmt::Debug for EntityQuery<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityQuery")
            .field("entity", &self.entity)
            .field("builder", &self.builder)
            .field("eager", &self.eager)
            .finish_non_exhaustive()
    }
}

impl<'a, E: Executor> EntityQuery<'a, E> {
    fn map(mut self, f: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        self.builder = f(self.builder);
        self
    }

    /// Apply any [`QueryBuilder`] method not mirrored here.
    pub fn tap(self, f: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        self.map(f)
    }

    pub fn select(self, columns: &[&str]) -> Self {
        self.map(|b| b.select(columns))
    }

    pub fn distinct(self) -> Self {
        self.map(QueryBuilder::distinct)
    }

    pub fn cmp(self, column: &str, op: &str, value: impl Into<Value>) -> Self {
        self.map(|b| b.cmp(column, op, value))
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.map(|b| b.eq(column, value))
    }

    pub fn or_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.map(|b| b.or_eq(column, value))
    }

    pub fn ne(self, column: &str, value: impl Into<Value>) -> Self {
        self.map(|b| b.ne(column, value))
    }

    pub fn gt(self, column: &str, value: impl Into<Value>) -> Self {
        self.map(|b| b.gt(column, value))
    }

    pub fn gte(self, column: &str, value: impl Into<Value>) -> Self {
        self.map(|b| b.gte(column, value))
    }

    pub fn lt(self, column: &str, value: impl Into<Value>) -> Self {
        self.map(|b| b.lt(column, value))
    }

    pub fn lte(self, column: &str, value: impl Into<Value>) -> Self {
        self.map(|b| b.lte(column, value))
    }

    pub fn like(self, column: &str, pattern: impl Into<Value>) -> Self {
        self.map(|b| b.like(column, pattern))
    }

    pub fn in_list<T: Into<Value>>(
        self,
        column: &str,
        values: impl IntoIterator<Item = T>,
    ) -> Self {
        self.map(|b| b.in_list(column, values))
    }

    pub fn not_in<T: Into<Value>>(
        self,
        column: &str,
        values: impl IntoIterator<Item = T>,
    ) -> Self {
        self.map(|b| b.not_in(column, values))
    }

    pub fn is_null(self, column: &str) -> Self {
        self.map(|b| b.is_null(column))
    }

    pub fn is_not_null(self, column: &str) -> Self {
        self.map(|b| b.is_not_null(column))
    }

    pub fn between(self, column: &str, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.map(|b| b.between(column, low, high))
    }

    pub fn where_raw(self, sql: impl Into<String>, bindings: Vec<Value>) -> Self {
        self.map(|b| b.where_raw(sql, bindings))
    }

    pub fn group(self, f: impl FnOnce(&mut ClauseGroup)) -> Self {
        self.map(|b| b.group(f))
    }

    pub fn or_group(self, f: impl FnOnce(&mut ClauseGroup)) -> Self {
        self.map(|b| b.or_group(f))
    }

    pub fn join(self, table: &str, left: &str, op: &str, right: &str) -> Self {
        self.map(|b| b.join(table, left, op, right))
    }

    pub fn left_join(self, table: &str, left: &str, op: &str, right: &str) -> Self {
        self.map(|b| b.left_join(table, left, op, right))
    }

    pub fn order_by(self, column: &str, direction: Direction) -> Self {
        self.map(|b| b.order_by(column, direction))
    }

    pub fn order_by_asc(self, column: &str) -> Self {
        self.map(|b| b.order_by_asc(column))
    }

    pub fn order_by_desc(self, column: &str) -> Self {
        self.map(|b| b.order_by_desc(column))
    }

    pub fn limit(self, n: u64) -> Self {
        self.map(|b| b.limit(n))
    }

    pub fn offset(self, n: u64) -> Self {
        self.map(|b| b.offset(n))
    }

    pub fn with_trashed(self) -> Self {
        self.map(QueryBuilder::with_trashed)
    }

    pub fn only_trashed(self) -> Self {
        self.map(QueryBuilder::only_trashed)
    }

    /// Request an eager-load path (`"posts"` or `"posts.comments"`),
    /// resolved after the main query with one batched query per segment.
    pub fn with(mut self, path: &str) -> Self {
        self.eager.push(path.to_string());
        self
    }

    /// The SQL this query would run, with bindings.
    pub fn compile(&self) -> OrmResult<(String, Vec<Value>)> {
        self.builder.compile(self.session.dialect)
    }

    /// Execute and hydrate every matching row.
    pub async fn get(self) -> OrmResult<Vec<SharedInstance>> {
        let (sql, bindings) = self.builder.compile(self.session.dialect)?;
        let rows = self.session.run_query(&sql, &bindings).await?;
        let schema = self.session.schema.clone();
        let def = schema.entity(&self.entity)?;
        let instances = self.session.hydrate_rows(def, rows);
        for path in &self.eager {
            self.session.load_related(&instances, path).await?;
        }
        Ok(instances)
    }

    /// Execute with `LIMIT 1` and hydrate the first row, if any.
    pub async fn first(self) -> OrmResult<Option<SharedInstance>> {
        let mut results = self.map(|b| b.limit(1)).get().await?;
        Ok(if results.is_empty() {
            None
        } else {
            Some(results.remove(0))
        })
    }
}
