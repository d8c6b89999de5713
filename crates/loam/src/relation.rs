//! Lazy relation access.
//!
//! [`Session::load`] resolves one relation on one instance, serving from
//! the per-instance cache when the relation was already resolved. The
//! actual batched resolution lives in the eager loader; lazy access is the
//! single-parent case of the same machinery, so a `BelongsTo` with a null
//! foreign key caches `One(None)` without touching the database.

use crate::entity::{self, Loaded, SharedInstance};
use crate::error::{OrmError, OrmResult};
use crate::executor::Executor;
use crate::session::Session;

/// Prefix under which pivot key columns appear on instances loaded
/// through a many-to-many relation.
pub const PIVOT_ATTR_PREFIX: &str = "pivot_";

impl<E: Executor> Session<E> {
    /// Resolve one relation on one instance, returning the cached result
    /// when present.
    pub async fn load(
        &mut self,
        instance: &SharedInstance,
        relation: &str,
    ) -> OrmResult<Loaded> {
        if let Some(loaded) = entity::read(instance).relation(relation) {
            return Ok(loaded.clone());
        }
        self.load_related(std::slice::from_ref(instance), relation)
            .await?;
        entity::read(instance)
            .relation(relation)
            .cloned()
            .ok_or_else(|| {
                OrmError::other(format!("relation '{relation}' missing after load"))
            })
    }
}
