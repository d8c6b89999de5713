//! Transaction helper macro.
//!
//! Transactions delegate to the executor as plain `BEGIN` / `COMMIT` /
//! `ROLLBACK` statements; the [`transaction!`] macro wraps a block so the
//! commit-or-rollback decision cannot be forgotten.

/// Runs the given block inside a database transaction.
///
/// - Begins via [`Session::begin`](crate::Session::begin).
/// - Commits on `Ok(_)`.
/// - Rolls back on `Err(_)`; a rollback failure is folded into the error.
///
/// The block must evaluate to `loam::OrmResult<T>`.
///
/// # Example
///
/// ```ignore
/// loam::transaction!(session, {
///     let user = session.find_or_fail("User", 1).await?;
///     session.delete(&user).await?;
///     Ok(())
/// })?;
/// ```
#[macro_export]
macro_rules! transaction {
    ($session:expr, $body:block) => {{
        ($session).begin().await?;
        let __loam_tx_body_result = async { $body }.await;
        match __loam_tx_body_result {
            Ok(value) => {
                ($session).commit().await?;
                Ok(value)
            }
            Err(error) => match ($session).rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err($crate::OrmError::Other(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            },
        }
    }};
}

#[cfg(test)]
mod tests {
    use crate::dialect::Dialect;
    use crate::error::{OrmError, OrmResult};
    use crate::session::Session;
    use crate::testing::{blog_schema, FailingExecutor, FakeExecutor};
    use std::sync::Arc;

    fn session() -> Session<FakeExecutor> {
        Session::new(FakeExecutor::new(), Arc::new(blog_schema()), Dialect::Ansi)
    }

    async fn committing(session: &mut Session<FakeExecutor>) -> OrmResult<i64> {
        crate::transaction!(session, { Ok(41 + 1) })
    }

    async fn failing(session: &mut Session<FakeExecutor>) -> OrmResult<()> {
        crate::transaction!(session, {
            Err(OrmError::validation("boom"))
        })
    }

    #[tokio::test]
    async fn commits_on_ok() {
        let mut session = session();
        let value = committing(&mut session).await.unwrap();
        assert_eq!(value, 42);
        let sqls: Vec<String> = session
            .executor
            .statements()
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect();
        assert_eq!(sqls, vec!["BEGIN", "COMMIT"]);
    }

    async fn failing_statement(session: &mut Session<FailingExecutor>) -> OrmResult<()> {
        crate::transaction!(session, {
            session.query("Tag")?.eq("id", 1).get().await?;
            Ok(())
        })
    }

    #[tokio::test]
    async fn rolls_back_when_statement_fails() {
        let mut session = Session::new(
            FailingExecutor::new("connection reset"),
            Arc::new(blog_schema()),
            Dialect::Ansi,
        );
        let err = failing_statement(&mut session).await.unwrap_err();
        assert!(err.is_execution());
        assert!(err.to_string().contains("connection reset"));

        let sqls = session.executor.statements();
        assert_eq!(sqls.first().map(String::as_str), Some("BEGIN"));
        assert_eq!(sqls.last().map(String::as_str), Some("ROLLBACK"));
    }

    #[tokio::test]
    async fn rolls_back_on_err() {
        let mut session = session();
        let err = failing(&mut session).await.unwrap_err();
        assert!(err.is_validation());
        let sqls: Vec<String> = session
            .executor
            .statements()
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect();
        assert_eq!(sqls, vec!["BEGIN", "ROLLBACK"]);
    }
}
