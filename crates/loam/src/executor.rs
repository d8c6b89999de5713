//! Statement execution seam.
//!
//! [`Executor`] is the only place the crate touches a database. A session
//! is generic over it, so tests drive the full stack against scripted
//! fakes while production code plugs in a driver adapter.

use crate::error::OrmResult;
use crate::row::Row;
use crate::value::Value;
use std::future::Future;

/// Executes parameterized statements.
///
/// `sql` uses `?` placeholders; `bindings` lines up with them in textual
/// order.
pub trait Executor: Send + Sync {
    /// Run a statement that returns rows.
    fn query(
        &self,
        sql: &str,
        bindings: &[Value],
    ) -> impl Future<Output = OrmResult<Vec<Row>>> + Send;

    /// Run a statement that returns an affected-row count.
    fn execute(
        &self,
        sql: &str,
        bindings: &[Value],
    ) -> impl Future<Output = OrmResult<u64>> + Send;

    /// The key generated by the most recent INSERT on this connection,
    /// if the engine reports one.
    fn last_insert_id(&self) -> impl Future<Output = OrmResult<Option<Value>>> + Send;
}

impl<E: Executor> Executor for &E {
    fn query(
        &self,
        sql: &str,
        bindings: &[Value],
    ) -> impl Future<Output = OrmResult<Vec<Row>>> + Send {
        (**self).query(sql, bindings)
    }

    fn execute(
        &self,
        sql: &str,
        bindings: &[Value],
    ) -> impl Future<Output = OrmResult<u64>> + Send {
        (**self).execute(sql, bindings)
    }

    fn last_insert_id(&self) -> impl Future<Output = OrmResult<Option<Value>>> + Send {
        (**self).last_insert_id()
    }
}
