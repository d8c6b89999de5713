//! # loam
//!
//! A dialect-aware data-mapper core for Rust.
//!
//! ## Features
//!
//! - **Fluent queries**: a composable clause tree compiled to
//!   parameterized SQL with exact `?`/binding alignment
//! - **Dialect aware**: MySQL, ANSI and SQL Server identifier quoting and
//!   lock spellings from one descriptor
//! - **Identity mapped**: one shared instance per primary key within a
//!   session, refreshed in place on re-fetch
//! - **No N+1**: eager loading resolves a dot-path with one batched query
//!   per segment, regardless of parent count
//! - **Explicit registry**: relationships declared and validated up
//!   front, no runtime reflection
//! - **Safe defaults**: identifiers and operators validated before any
//!   SQL is rendered; soft-deleted rows excluded unless asked for
//!
//! ## Quick look
//!
//! ```ignore
//! use loam::{Dialect, EntityDef, Schema, Session};
//!
//! let schema = Schema::build([
//!     EntityDef::new("User", "users")?
//!         .soft_deletes("deleted_at")?
//!         .has_many("posts", "Post", "user_id")?,
//!     EntityDef::new("Post", "posts")?
//!         .belongs_to("author", "User", "user_id")?,
//! ])?;
//!
//! let mut session = Session::new(executor, schema.into(), Dialect::MySql);
//! let users = session
//!     .query("User")?
//!     .eq("active", true)
//!     .with("posts")
//!     .get()
//!     .await?;
//! ```

pub mod builder;
pub mod clause;
pub mod compiler;
pub mod dialect;
pub mod eager;
pub mod entity;
pub mod error;
pub mod executor;
pub mod ident;
pub mod identity;
pub mod pivot;
pub mod relation;
pub mod row;
pub mod schema;
pub mod serialize;
pub mod session;
pub mod transaction;
pub mod value;

pub use builder::{Direction, JoinKind, Lock, QueryBuilder, TrashedVisibility};
pub use clause::{BoolOp, Clause, ClauseGroup};
pub use dialect::{ColumnType, Dialect};
pub use entity::{Instance, Loaded, SharedInstance};
pub use error::{OrmError, OrmResult};
pub use executor::Executor;
pub use ident::Ident;
pub use identity::IdentityMap;
pub use pivot::SyncResult;
pub use relation::PIVOT_ATTR_PREFIX;
pub use row::Row;
pub use schema::{Entity, EntityDef, Pivot, Relation, RelationKind, Schema};
pub use serialize::serialize_instance;
pub use session::{EntityQuery, LoggedQuery, Session};
pub use value::Value;

#[cfg(test)]
pub(crate) mod testing;
