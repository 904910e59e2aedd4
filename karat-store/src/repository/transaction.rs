//! Transaction handle
//!
//! A [`Transaction`] exclusively owns one pooled connection for its lifetime.
//! Every exit path returns that connection to the pool: [`Transaction::commit`]
//! and [`Transaction::rollback`] consume the handle, and dropping an
//! uncommitted handle rolls back.

use std::future::Future;
use std::time::Duration;

use sqlx::{Executor, Sqlite, SqlitePool};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::error::{AggregateStep, RepositoryError, RepositoryErrorKind, RepositoryOperation};
use super::query::Statement;
use super::record::Record;
use super::traits::RepositoryResult;

/// One database transaction on a single connection
pub struct Transaction {
    inner: sqlx::Transaction<'static, Sqlite>,
    deadline: Option<Instant>,
}

impl Transaction {
    /// Acquire a connection and issue `BEGIN`
    ///
    /// With a `timeout`, every statement issued through the handle must finish
    /// before `now + timeout`; a miss yields a `Timeout` error and the caller
    /// rolls back.
    pub async fn begin(pool: &SqlitePool, timeout: Option<Duration>) -> RepositoryResult<Self> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let inner = bounded(deadline, RepositoryOperation::Transaction, pool.begin()).await?;
        debug!("Transaction started");
        Ok(Self { inner, deadline })
    }

    /// Deadline for statements on this transaction, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Replace the statement deadline
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    /// Run a statement and map every returned row
    pub(crate) async fn fetch_all(
        &mut self,
        statement: &Statement,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Vec<Record>> {
        fetch_all_on(&mut *self.inner, self.deadline, statement, operation).await
    }

    /// Run a statement expected to return at most one row
    pub(crate) async fn fetch_optional(
        &mut self,
        statement: &Statement,
        operation: RepositoryOperation,
    ) -> RepositoryResult<Option<Record>> {
        fetch_optional_on(&mut *self.inner, self.deadline, statement, operation).await
    }

    /// Run a statement and report affected rows
    pub(crate) async fn execute(
        &mut self,
        statement: &Statement,
        operation: RepositoryOperation,
    ) -> RepositoryResult<u64> {
        execute_on(&mut *self.inner, self.deadline, statement, operation).await
    }

    /// Commit and release the connection
    ///
    /// Commit is not bounded by the deadline; once every statement has
    /// succeeded the outcome is left to the database.
    pub async fn commit(self) -> RepositoryResult<()> {
        self.inner.commit().await.map_err(|e| {
            let err = RepositoryError::from(e)
                .with_operation(RepositoryOperation::Transaction)
                .at_step(AggregateStep::Commit);
            error!(error = %err, "Transaction commit failed");
            err
        })?;
        debug!("Transaction committed");
        Ok(())
    }

    /// Roll back and release the connection
    pub async fn rollback(self) -> RepositoryResult<()> {
        self.inner.rollback().await.map_err(|e| {
            let err = RepositoryError::from(e)
                .with_operation(RepositoryOperation::Transaction)
                .at_step(AggregateStep::Rollback);
            error!(error = %err, "Transaction rollback failed");
            err
        })?;
        debug!("Transaction rolled back");
        Ok(())
    }

    /// Commit on `Ok`, roll back on `Err`
    ///
    /// The original error is returned even when the rollback itself fails;
    /// the connection goes back to the pool on every path.
    pub async fn finish<T>(self, result: RepositoryResult<T>) -> RepositoryResult<T> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                warn!(error = %err, "Rolling back transaction");
                if let Err(rollback_err) = self.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed, connection discarded");
                }
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Bound a driver future by an optional deadline
pub(crate) async fn bounded<T, F>(
    deadline: Option<Instant>,
    operation: RepositoryOperation,
    future: F,
) -> RepositoryResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    let outcome = match deadline {
        None => future.await,
        Some(deadline) if Instant::now() >= deadline => {
            return Err(RepositoryError::timeout(
                operation,
                "Operation deadline elapsed before the statement was sent",
            ));
        }
        Some(deadline) => match tokio::time::timeout_at(deadline, future).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(RepositoryError::timeout(
                    operation,
                    "Operation deadline elapsed",
                ))
            }
        },
    };

    outcome.map_err(|e| {
        let err = RepositoryError::from(e).with_operation(operation);
        if err.kind == RepositoryErrorKind::StorageUnavailable {
            error!(error = %err, "Database operation failed");
        }
        err
    })
}

/// Run a statement on a pool or connection and map every returned row
pub(crate) async fn fetch_all_on<'c, E>(
    executor: E,
    deadline: Option<Instant>,
    statement: &Statement,
    operation: RepositoryOperation,
) -> RepositoryResult<Vec<Record>>
where
    E: Executor<'c, Database = Sqlite>,
{
    log_statement(statement);
    let rows = bounded(deadline, operation, statement.query().fetch_all(executor)).await?;
    rows.iter()
        .map(Record::from_row)
        .collect::<Result<_, _>>()
        .map_err(|e| e.with_operation(operation))
}

/// Run a statement expected to return at most one row
pub(crate) async fn fetch_optional_on<'c, E>(
    executor: E,
    deadline: Option<Instant>,
    statement: &Statement,
    operation: RepositoryOperation,
) -> RepositoryResult<Option<Record>>
where
    E: Executor<'c, Database = Sqlite>,
{
    log_statement(statement);
    let row = bounded(deadline, operation, statement.query().fetch_optional(executor)).await?;
    row.as_ref()
        .map(Record::from_row)
        .transpose()
        .map_err(|e| e.with_operation(operation))
}

/// Run a statement and report affected rows
pub(crate) async fn execute_on<'c, E>(
    executor: E,
    deadline: Option<Instant>,
    statement: &Statement,
    operation: RepositoryOperation,
) -> RepositoryResult<u64>
where
    E: Executor<'c, Database = Sqlite>,
{
    log_statement(statement);
    let result = bounded(deadline, operation, statement.query().execute(executor)).await?;
    Ok(result.rows_affected())
}

fn log_statement(statement: &Statement) {
    debug!(sql = %statement.sql, args = statement.args.len(), "Executing statement");
}
