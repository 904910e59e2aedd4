//! Generic record store for one named table
//!
//! [`RecordStore`] implements [`Repository`] and [`SoftDeleteRepository`]
//! over schema-agnostic [`Record`]s, plus transaction-scoped variants of the
//! write primitives for callers composing several statements atomically.

use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::time::Instant;
use tracing::{debug, instrument};

use super::error::{RepositoryError, RepositoryOperation};
use super::filter::{Filter, Page, Projection, Sort};
use super::query::{self, Statement};
use super::record::{Record, Value};
use super::traits::{Repository, RepositoryResult, SoftDeleteRepository};
use super::transaction::{execute_on, fetch_all_on, fetch_optional_on, Transaction};

/// Per-table column conventions
///
/// ```rust
/// use karat_store::repository::TableSpec;
///
/// let stones = TableSpec::new("stones").without_soft_delete();
/// assert_eq!(stones.primary_key, "id");
/// assert_eq!(stones.updated_at.as_deref(), Some("updated_at"));
/// assert!(stones.active_flag.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    /// Table name
    pub name: String,
    /// Primary key column
    pub primary_key: String,
    /// Column stamped on every update, if the table has one
    pub updated_at: Option<String>,
    /// Boolean column cleared by soft delete, if the table has one
    pub active_flag: Option<String>,
}

impl TableSpec {
    /// Table with `id`, `updated_at` and `is_active` columns
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: "id".to_string(),
            updated_at: Some("updated_at".to_string()),
            active_flag: Some("is_active".to_string()),
        }
    }

    /// Use a different primary key column
    #[must_use]
    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    /// Table has no updated-at column
    #[must_use]
    pub fn without_timestamps(mut self) -> Self {
        self.updated_at = None;
        self
    }

    /// Table has no active flag
    #[must_use]
    pub fn without_soft_delete(mut self) -> Self {
        self.active_flag = None;
        self
    }
}

/// CRUD primitives for one table
#[derive(Debug, Clone)]
pub struct RecordStore {
    pool: SqlitePool,
    table: TableSpec,
    operation_timeout: Option<Duration>,
}

impl RecordStore {
    /// Create a store over `table`
    pub fn new(pool: SqlitePool, table: TableSpec) -> Self {
        Self {
            pool,
            table,
            operation_timeout: None,
        }
    }

    /// Bound every operation (and every transaction begun here) by `timeout`
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Table conventions
    pub fn table(&self) -> &TableSpec {
        &self.table
    }

    /// Underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Acquire one connection and start a transaction on it
    pub async fn begin_transaction(&self) -> RepositoryResult<Transaction> {
        Transaction::begin(&self.pool, self.operation_timeout)
            .await
            .map_err(|e| e.with_table(&self.table.name))
    }

    /// Commit and release the connection
    pub async fn commit_transaction(&self, tx: Transaction) -> RepositoryResult<()> {
        tx.commit().await.map_err(|e| e.with_table(&self.table.name))
    }

    /// Roll back and release the connection
    pub async fn rollback_transaction(&self, tx: Transaction) -> RepositoryResult<()> {
        tx.rollback().await.map_err(|e| e.with_table(&self.table.name))
    }

    /// Insert every row in one transaction
    ///
    /// Either all rows are persisted or none are; the first failure rolls the
    /// batch back and is returned.
    #[instrument(skip_all, fields(table = %self.table.name, rows = rows.len()))]
    pub async fn batch_create(&self, rows: Vec<Record>) -> RepositoryResult<Vec<Record>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.begin_transaction().await?;
        let result = self.create_many_in(&mut tx, rows).await;
        let created = tx
            .finish(result)
            .await
            .map_err(|e| e.with_operation(RepositoryOperation::BatchCreate))?;
        debug!(created = created.len(), "Batch inserted");
        Ok(created)
    }

    /// `find_all` on a transaction's connection
    pub async fn find_all_in(
        &self,
        tx: &mut Transaction,
        filter: &Filter,
        sort: &Sort,
        page: Page,
        projection: &Projection,
    ) -> RepositoryResult<Vec<Record>> {
        let op = RepositoryOperation::FindAll;
        let statement =
            query::select(&self.table.name, filter, sort, page, projection).map_err(self.context(op))?;
        tx.fetch_all(&statement, op).await.map_err(self.context(op))
    }

    /// `create` on a transaction's connection
    pub async fn create_in(&self, tx: &mut Transaction, fields: Record) -> RepositoryResult<Record> {
        let op = RepositoryOperation::Create;
        let statement = query::insert(&self.table.name, &fields).map_err(self.context(op))?;
        tx.fetch_optional(&statement, op)
            .await
            .map_err(self.context(op))?
            .ok_or_else(|| self.missing_returning(op))
    }

    /// Insert several rows on a transaction's connection, in order
    pub async fn create_many_in(
        &self,
        tx: &mut Transaction,
        rows: Vec<Record>,
    ) -> RepositoryResult<Vec<Record>> {
        let mut created = Vec::with_capacity(rows.len());
        for fields in rows {
            created.push(self.create_in(tx, fields).await?);
        }
        Ok(created)
    }

    /// `update` on a transaction's connection
    pub async fn update_in(
        &self,
        tx: &mut Transaction,
        id: &Value,
        fields: Record,
    ) -> RepositoryResult<Option<Record>> {
        let op = RepositoryOperation::Update;
        let statement = self.update_statement(id, fields).map_err(self.context(op))?;
        tx.fetch_optional(&statement, op).await.map_err(self.context(op))
    }

    /// `delete` on a transaction's connection
    pub async fn delete_in(&self, tx: &mut Transaction, id: &Value) -> RepositoryResult<bool> {
        let op = RepositoryOperation::Delete;
        let statement = query::delete_by_id(&self.table.name, &self.table.primary_key, id)
            .map_err(self.context(op))?;
        let affected = tx.execute(&statement, op).await.map_err(self.context(op))?;
        Ok(affected > 0)
    }

    /// Delete every row matching a non-empty filter; returns rows removed
    pub async fn delete_where_in(&self, tx: &mut Transaction, filter: &Filter) -> RepositoryResult<u64> {
        let op = RepositoryOperation::Delete;
        let statement = query::delete_where(&self.table.name, filter).map_err(self.context(op))?;
        tx.execute(&statement, op).await.map_err(self.context(op))
    }

    fn update_statement(&self, id: &Value, mut fields: Record) -> RepositoryResult<Statement> {
        if let Some(column) = &self.table.updated_at {
            if !fields.contains(column) {
                fields.set(column.as_str(), Utc::now());
            }
        }
        query::update_by_id(&self.table.name, &self.table.primary_key, id, &fields)
    }

    fn deadline(&self) -> Option<Instant> {
        self.operation_timeout.map(|timeout| Instant::now() + timeout)
    }

    fn context(&self, operation: RepositoryOperation) -> impl Fn(RepositoryError) -> RepositoryError + '_ {
        move |e| e.with_operation(operation).with_table(&self.table.name)
    }

    fn missing_returning(&self, operation: RepositoryOperation) -> RepositoryError {
        RepositoryError::storage_unavailable(operation, "Statement returned no row")
            .with_table(&self.table.name)
    }

    async fn fetch_all(&self, statement: &Statement, op: RepositoryOperation) -> RepositoryResult<Vec<Record>> {
        fetch_all_on(&self.pool, self.deadline(), statement, op)
            .await
            .map_err(self.context(op))
    }

    async fn fetch_optional(
        &self,
        statement: &Statement,
        op: RepositoryOperation,
    ) -> RepositoryResult<Option<Record>> {
        fetch_optional_on(&self.pool, self.deadline(), statement, op)
            .await
            .map_err(self.context(op))
    }

    async fn execute(&self, statement: &Statement, op: RepositoryOperation) -> RepositoryResult<u64> {
        execute_on(&self.pool, self.deadline(), statement, op)
            .await
            .map_err(self.context(op))
    }

    async fn fetch_scalar(
        &self,
        statement: &Statement,
        column: &str,
        op: RepositoryOperation,
    ) -> RepositoryResult<i64> {
        self.fetch_optional(statement, op)
            .await?
            .and_then(|row| row.get_i64(column))
            .ok_or_else(|| self.missing_returning(op))
    }
}

impl Repository<Value, Record, Record, Record> for RecordStore {
    #[instrument(skip_all, fields(table = %self.table.name))]
    async fn find_all(
        &self,
        filter: &Filter,
        sort: &Sort,
        page: Page,
        projection: &Projection,
    ) -> RepositoryResult<Vec<Record>> {
        let op = RepositoryOperation::FindAll;
        let statement =
            query::select(&self.table.name, filter, sort, page, projection).map_err(self.context(op))?;
        self.fetch_all(&statement, op).await
    }

    #[instrument(skip_all, fields(table = %self.table.name, id = %id))]
    async fn find_by_id(&self, id: &Value) -> RepositoryResult<Option<Record>> {
        let op = RepositoryOperation::FindById;
        let statement = query::select(
            &self.table.name,
            &Filter::by_id(&self.table.primary_key, id.clone()),
            &Sort::new(),
            Page::first(1),
            &Projection::All,
        )
        .map_err(self.context(op))?;
        self.fetch_optional(&statement, op).await
    }

    #[instrument(skip_all, fields(table = %self.table.name))]
    async fn find_one(&self, filter: &Filter) -> RepositoryResult<Option<Record>> {
        let op = RepositoryOperation::FindAll;
        let statement = query::select(
            &self.table.name,
            filter,
            &Sort::new(),
            Page::first(1),
            &Projection::All,
        )
        .map_err(self.context(op))?;
        self.fetch_optional(&statement, op).await
    }

    #[instrument(skip_all, fields(table = %self.table.name))]
    async fn count(&self, filter: &Filter) -> RepositoryResult<u64> {
        let op = RepositoryOperation::Count;
        let statement = query::count(&self.table.name, filter).map_err(self.context(op))?;
        let count = self.fetch_scalar(&statement, "count", op).await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    #[instrument(skip_all, fields(table = %self.table.name))]
    async fn exists(&self, filter: &Filter) -> RepositoryResult<bool> {
        let op = RepositoryOperation::Exists;
        let statement = query::exists(&self.table.name, filter).map_err(self.context(op))?;
        Ok(self.fetch_scalar(&statement, "present", op).await? != 0)
    }

    #[instrument(skip_all, fields(table = %self.table.name))]
    async fn create(&self, data: Record) -> RepositoryResult<Record> {
        let op = RepositoryOperation::Create;
        let statement = query::insert(&self.table.name, &data).map_err(self.context(op))?;
        let created = self
            .fetch_optional(&statement, op)
            .await?
            .ok_or_else(|| self.missing_returning(op))?;
        debug!(id = ?created.get(&self.table.primary_key), "Row created");
        Ok(created)
    }

    #[instrument(skip_all, fields(table = %self.table.name, id = %id))]
    async fn update(&self, id: &Value, data: Record) -> RepositoryResult<Option<Record>> {
        let op = RepositoryOperation::Update;
        let statement = self.update_statement(id, data).map_err(self.context(op))?;
        self.fetch_optional(&statement, op).await
    }

    #[instrument(skip_all, fields(table = %self.table.name, id = %id))]
    async fn delete(&self, id: &Value) -> RepositoryResult<bool> {
        let op = RepositoryOperation::Delete;
        let statement = query::delete_by_id(&self.table.name, &self.table.primary_key, id)
            .map_err(self.context(op))?;
        Ok(self.execute(&statement, op).await? > 0)
    }
}

impl SoftDeleteRepository<Value, Record, Record, Record> for RecordStore {
    #[instrument(skip_all, fields(table = %self.table.name, id = %id))]
    async fn soft_delete(&self, id: &Value) -> RepositoryResult<Option<Record>> {
        let Some(flag) = &self.table.active_flag else {
            return Err(RepositoryError::validation_failed("Table has no active flag")
                .with_operation(RepositoryOperation::SoftDelete)
                .with_table(&self.table.name));
        };
        self.update(id, Record::new().with(flag.as_str(), false))
            .await
            .map_err(|e| e.with_operation(RepositoryOperation::SoftDelete))
    }
}
