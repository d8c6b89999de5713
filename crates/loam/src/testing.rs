//! Shared test fixtures: a scripted fake executor and a small blog schema.

use crate::error::OrmResult;
use crate::executor::Executor;
use crate::row::Row;
use crate::schema::{EntityDef, Schema};
use crate::value::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Executor that replays scripted row sets and records every statement.
///
/// `query` pops the next scripted response (empty when the script runs
/// dry); `execute` reports one affected row. Statements of both kinds are
/// recorded in order with their bindings.
pub(crate) struct FakeExecutor {
    responses: Mutex<VecDeque<Vec<Row>>>,
    statements: Mutex<Vec<(String, Vec<Value>)>>,
    last_id: Mutex<Option<Value>>,
}

impl FakeExecutor {
    pub(crate) fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            statements: Mutex::new(Vec::new()),
            last_id: Mutex::new(None),
        }
    }

    /// Queue the rows the next `query` call returns.
    pub(crate) fn push_rows(&self, rows: Vec<Row>) {
        self.responses.lock().unwrap().push_back(rows);
    }

    pub(crate) fn set_last_insert_id(&self, id: Value) {
        *self.last_id.lock().unwrap() = Some(id);
    }

    /// Every statement run so far, in order.
    pub(crate) fn statements(&self) -> Vec<(String, Vec<Value>)> {
        self.statements.lock().unwrap().clone()
    }
}

impl Executor for FakeExecutor {
    async fn query(&self, sql: &str, bindings: &[Value]) -> OrmResult<Vec<Row>> {
        self.statements
            .lock()
            .unwrap()
            .push((sql.to_string(), bindings.to_vec()));
        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    async fn execute(&self, sql: &str, bindings: &[Value]) -> OrmResult<u64> {
        self.statements
            .lock()
            .unwrap()
            .push((sql.to_string(), bindings.to_vec()));
        Ok(1)
    }

    async fn last_insert_id(&self) -> OrmResult<Option<Value>> {
        Ok(self.last_id.lock().unwrap().clone())
    }
}

/// Executor that fails every statement with an execution error carrying
/// the given message. Transaction control (`BEGIN` / `COMMIT` /
/// `ROLLBACK`) succeeds so rollback paths stay observable; every
/// statement is recorded either way.
pub(crate) struct FailingExecutor {
    message: String,
    statements: Mutex<Vec<String>>,
}

impl FailingExecutor {
    pub(crate) fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            statements: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

impl Executor for FailingExecutor {
    async fn query(&self, sql: &str, _bindings: &[Value]) -> OrmResult<Vec<Row>> {
        self.statements.lock().unwrap().push(sql.to_string());
        Err(crate::error::OrmError::execution(self.message.clone()))
    }

    async fn execute(&self, sql: &str, _bindings: &[Value]) -> OrmResult<u64> {
        self.statements.lock().unwrap().push(sql.to_string());
        if matches!(sql, "BEGIN" | "COMMIT" | "ROLLBACK") {
            return Ok(0);
        }
        Err(crate::error::OrmError::execution(self.message.clone()))
    }

    async fn last_insert_id(&self) -> OrmResult<Option<Value>> {
        Ok(None)
    }
}

/// Executor that fails the test on any database contact.
pub(crate) struct PanicExecutor;

impl Executor for PanicExecutor {
    async fn query(&self, sql: &str, _bindings: &[Value]) -> OrmResult<Vec<Row>> {
        panic!("unexpected query() call: {sql}")
    }

    async fn execute(&self, sql: &str, _bindings: &[Value]) -> OrmResult<u64> {
        panic!("unexpected execute() call: {sql}")
    }

    async fn last_insert_id(&self) -> OrmResult<Option<Value>> {
        panic!("unexpected last_insert_id() call")
    }
}

/// Users (soft-deletable) with posts, a profile, and tags through a pivot.
pub(crate) fn blog_schema() -> Schema {
    Schema::build([
        EntityDef::new("User", "users")
            .unwrap()
            .soft_deletes("deleted_at")
            .unwrap()
            .has_many("posts", "Post", "user_id")
            .unwrap()
            .has_one("profile", "Profile", "user_id")
            .unwrap()
            .belongs_to_many("tags", "Tag", "tag_user", "user_id", "tag_id")
            .unwrap(),
        EntityDef::new("Post", "posts")
            .unwrap()
            .belongs_to("author", "User", "user_id")
            .unwrap(),
        EntityDef::new("Profile", "profiles").unwrap(),
        EntityDef::new("Tag", "tags").unwrap(),
    ])
    .unwrap()
}
