//! Jewelry + stones aggregate repository
//!
//! A piece and its stones form one consistency unit. Every write runs in a
//! single transaction with one commit point:
//!
//! ```text
//! BEGIN
//!   insert / patch / delete the parent row
//!   if a stone list was supplied: delete existing stones, insert the new ones
//! COMMIT   (any failure: ROLLBACK, release the connection, return the error)
//! ```
//!
//! `stones_cost` and `cost_price` are derived inside the same transaction
//! from the stored piece and the stones it ends up with, so concurrent
//! patches never leave stale totals behind.
//!
//! Errors keep their original kind and gain the [`AggregateStep`] that failed.

use std::collections::HashMap;
use std::time::Duration;

use sqlx::SqlitePool;
use tracing::{debug, info, instrument};

use super::model::{CostTotals, Jewelry, JewelryAggregate, NewStone, Stone, StoneUpdate};
use crate::repository::{
    AggregateStep, Filter, FilterOperator, Page, Projection, Record, RecordStore, RelationLoader,
    Repository, RepositoryError, RepositoryOperation, RepositoryResult, SoftDeleteRepository, Sort,
    TableSpec, Transaction, Value,
};

/// Parent table
pub const JEWELRY_TABLE: &str = "jewelry";
/// Child table
pub const STONES_TABLE: &str = "stones";
const FOREIGN_KEY: &str = "jewelry_id";
/// Parent ids per stone query; keeps every query under SQLite's bound-parameter limit
const IDS_PER_QUERY: usize = 900;

/// Transactional access to pieces and their stones
#[derive(Debug, Clone)]
pub struct JewelryRepository {
    pieces: RecordStore,
    stones: RecordStore,
}

impl JewelryRepository {
    /// Repository over the `jewelry` and `stones` tables
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pieces: RecordStore::new(pool.clone(), TableSpec::new(JEWELRY_TABLE)),
            stones: RecordStore::new(
                pool,
                TableSpec::new(STONES_TABLE)
                    .without_timestamps()
                    .without_soft_delete(),
            ),
        }
    }

    /// Bound every transaction and statement by `timeout`
    #[must_use]
    pub fn with_operation_timeout(self, timeout: Option<Duration>) -> Self {
        Self {
            pieces: self.pieces.with_operation_timeout(timeout),
            stones: self.stones.with_operation_timeout(timeout),
        }
    }

    /// Store for the parent table
    pub fn pieces(&self) -> &RecordStore {
        &self.pieces
    }

    /// Store for the child table
    pub fn stones(&self) -> &RecordStore {
        &self.stones
    }

    /// Insert a piece and all of its stones atomically
    ///
    /// `stones_cost` and `cost_price` are derived from the piece's component
    /// costs and `stones`. Code availability is the caller's concern; a
    /// concurrent insert of the same code surfaces here as
    /// `ConstraintViolation`.
    #[instrument(skip_all, fields(code = ?piece.get_str("code"), stones = stones.len()))]
    pub async fn create_with_stones(
        &self,
        piece: Record,
        stones: &[NewStone],
    ) -> RepositoryResult<JewelryAggregate> {
        let mut tx = self.pieces.begin_transaction().await?;
        let result = self.insert_aggregate(&mut tx, piece, stones).await;
        let aggregate = tx.finish(result).await?;
        info!(
            id = aggregate.piece.id,
            stones = aggregate.stones.len(),
            "Jewelry created"
        );
        Ok(aggregate)
    }

    /// Patch a piece and optionally replace its stones atomically
    ///
    /// `StoneUpdate::Unchanged` leaves the stone rows untouched;
    /// `StoneUpdate::Replace` (even with an empty list) replaces them. Cost
    /// totals are recomputed from the patched row and the resulting stones.
    /// A patch leaving `net_weight` above `gross_weight` fails with
    /// `ValidationFailed`. Returns `Ok(None)` and rolls back when the piece
    /// does not exist.
    #[instrument(skip_all, fields(id = id))]
    pub async fn update_with_stones(
        &self,
        id: i64,
        changes: Record,
        stones: StoneUpdate,
    ) -> RepositoryResult<Option<JewelryAggregate>> {
        let mut tx = self.pieces.begin_transaction().await?;
        match self.patch_aggregate(&mut tx, id, changes, stones).await {
            Ok(Some(aggregate)) => {
                tx.commit().await?;
                info!(stones = aggregate.stones.len(), "Jewelry updated");
                Ok(Some(aggregate))
            }
            Ok(None) => {
                tx.rollback().await?;
                debug!("Jewelry not found, nothing updated");
                Ok(None)
            }
            Err(err) => tx.finish(Err(err)).await,
        }
    }

    /// Delete a piece's stones, then the piece, atomically
    ///
    /// Returns whether the piece existed.
    #[instrument(skip_all, fields(id = id))]
    pub async fn delete_with_stones(&self, id: i64) -> RepositoryResult<bool> {
        let mut tx = self.pieces.begin_transaction().await?;
        let result = self.remove_aggregate(&mut tx, id).await;
        let existed = tx.finish(result).await?;
        if existed {
            info!("Jewelry deleted");
        }
        Ok(existed)
    }

    /// Read pieces with their stones
    ///
    /// The page window applies to pieces only. Stones for every returned
    /// piece come from one follow-up query keyed on the piece ids. Both reads
    /// share one transaction, so they observe the same committed state.
    #[instrument(skip_all)]
    pub async fn get_with_stones(
        &self,
        filter: &Filter,
        sort: &Sort,
        page: Page,
    ) -> RepositoryResult<Vec<JewelryAggregate>> {
        let mut tx = self.pieces.begin_transaction().await?;
        let result = self.read_aggregates(&mut tx, filter, sort, page).await;
        tx.finish(result).await
    }

    /// One piece with its stones
    pub async fn find_by_id(&self, id: i64) -> RepositoryResult<Option<JewelryAggregate>> {
        let mut found = self
            .get_with_stones(
                &Filter::by_id(&self.pieces.table().primary_key, id),
                &Sort::new(),
                Page::first(1),
            )
            .await?;
        Ok(found.pop())
    }

    /// Number of pieces matching the filter
    pub async fn count(&self, filter: &Filter) -> RepositoryResult<u64> {
        self.pieces.count(filter).await
    }

    /// Whether an active piece other than `exclude_id` uses `code`
    pub async fn code_in_use(&self, code: &str, exclude_id: Option<i64>) -> RepositoryResult<bool> {
        let mut filter = Filter::new().eq("code", code.trim()).eq("is_active", true);
        if let Some(id) = exclude_id {
            filter = filter.op("id", FilterOperator::NotEqual, id);
        }
        self.pieces.exists(&filter).await
    }

    /// Mark a piece inactive; its stones stay in place
    #[instrument(skip_all, fields(id = id))]
    pub async fn soft_delete(&self, id: i64) -> RepositoryResult<Option<Jewelry>> {
        self.pieces
            .soft_delete(&Value::Integer(id))
            .await?
            .map(|row| row.decode())
            .transpose()
    }

    async fn insert_aggregate(
        &self,
        tx: &mut Transaction,
        mut piece: Record,
        stones: &[NewStone],
    ) -> RepositoryResult<JewelryAggregate> {
        let amount = |column: &str| piece.get(column).and_then(Value::as_f64).unwrap_or(0.0);
        let totals = CostTotals::derive(
            amount("metal_cost"),
            amount("making_charges"),
            stones.iter().map(|stone| stone.cost_price),
        );
        for (column, value) in totals.to_record() {
            piece.set(column, value);
        }

        let piece: Jewelry = self
            .pieces
            .create_in(tx, piece)
            .await
            .and_then(|row| row.decode())
            .map_err(|e| e.at_step(AggregateStep::Parent))?;
        check_weights(&piece, RepositoryOperation::Create)?;
        let stones = self.insert_stones(tx, piece.id, stones).await?;
        Ok(JewelryAggregate { piece, stones })
    }

    async fn patch_aggregate(
        &self,
        tx: &mut Transaction,
        id: i64,
        changes: Record,
        stones: StoneUpdate,
    ) -> RepositoryResult<Option<JewelryAggregate>> {
        // The patch is the first statement, so the write lock is held before
        // anything is read back for the totals
        let updated = self
            .pieces
            .update_in(tx, &Value::Integer(id), changes)
            .await
            .map_err(|e| e.at_step(AggregateStep::Parent))?;
        let Some(row) = updated else {
            return Ok(None);
        };
        let patched: Jewelry = row.decode().map_err(|e| e.at_step(AggregateStep::Parent))?;
        check_weights(&patched, RepositoryOperation::Update)?;

        let stones = match stones {
            StoneUpdate::Unchanged => self
                .stones_in(tx, &[id])
                .await
                .map(|mut grouped| grouped.remove(&id).unwrap_or_default())
                .map_err(|e| e.at_step(AggregateStep::Read))?,
            StoneUpdate::Replace(replacement) => {
                let removed = self
                    .stones
                    .delete_where_in(tx, &Filter::new().eq(FOREIGN_KEY, id))
                    .await
                    .map_err(|e| e.at_step(AggregateStep::Children))?;
                debug!(removed, inserted = replacement.len(), "Replacing stones");
                self.insert_stones(tx, id, &replacement).await?
            }
        };

        let totals = CostTotals::derive(
            patched.metal_cost,
            patched.making_charges,
            stones.iter().map(|stone| stone.cost_price),
        );
        let piece: Jewelry = self
            .pieces
            .update_in(tx, &Value::Integer(id), totals.to_record())
            .await
            .and_then(|row| {
                row.ok_or_else(|| RepositoryError::not_found(JEWELRY_TABLE, id.to_string()))
            })
            .and_then(|row| row.decode())
            .map_err(|e| e.at_step(AggregateStep::Parent))?;

        Ok(Some(JewelryAggregate { piece, stones }))
    }

    async fn remove_aggregate(&self, tx: &mut Transaction, id: i64) -> RepositoryResult<bool> {
        let removed = self
            .stones
            .delete_where_in(tx, &Filter::new().eq(FOREIGN_KEY, id))
            .await
            .map_err(|e| e.at_step(AggregateStep::Children))?;
        debug!(removed, "Stones deleted");
        self.pieces
            .delete_in(tx, &Value::Integer(id))
            .await
            .map_err(|e| e.at_step(AggregateStep::Parent))
    }

    async fn read_aggregates(
        &self,
        tx: &mut Transaction,
        filter: &Filter,
        sort: &Sort,
        page: Page,
    ) -> RepositoryResult<Vec<JewelryAggregate>> {
        let rows = self
            .pieces
            .find_all_in(tx, filter, sort, page, &Projection::All)
            .await
            .map_err(|e| e.at_step(AggregateStep::Read))?;
        let pieces: Vec<Jewelry> = decode_all(&rows).map_err(|e| e.at_step(AggregateStep::Read))?;
        if pieces.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = pieces.iter().map(|piece| piece.id).collect();
        let mut stones = self
            .stones_in(tx, &ids)
            .await
            .map_err(|e| e.at_step(AggregateStep::Read))?;

        Ok(pieces
            .into_iter()
            .map(|piece| {
                let stones = stones.remove(&piece.id).unwrap_or_default();
                JewelryAggregate { piece, stones }
            })
            .collect())
    }

    async fn insert_stones(
        &self,
        tx: &mut Transaction,
        jewelry_id: i64,
        stones: &[NewStone],
    ) -> RepositoryResult<Vec<Stone>> {
        let rows = stones.iter().map(|stone| stone.to_record(jewelry_id)).collect();
        self.stones
            .create_many_in(tx, rows)
            .await
            .and_then(|rows| decode_all(&rows))
            .map_err(|e| e.at_step(AggregateStep::Children))
    }

    async fn stones_in(
        &self,
        tx: &mut Transaction,
        jewelry_ids: &[i64],
    ) -> RepositoryResult<HashMap<i64, Vec<Stone>>> {
        let mut grouped = HashMap::with_capacity(jewelry_ids.len());
        for chunk in jewelry_ids.chunks(IDS_PER_QUERY) {
            let rows = self
                .stones
                .find_all_in(
                    tx,
                    &stones_of(chunk),
                    &Sort::asc("id"),
                    Page::Unbounded,
                    &Projection::All,
                )
                .await?;
            grouped.extend(group_stones(chunk, &rows)?);
        }
        Ok(grouped)
    }
}

impl RelationLoader<i64, Stone> for JewelryRepository {
    async fn load_many(&self, parent_ids: &[i64]) -> RepositoryResult<HashMap<i64, Vec<Stone>>> {
        let mut grouped = HashMap::with_capacity(parent_ids.len());
        for chunk in parent_ids.chunks(IDS_PER_QUERY) {
            let rows = self
                .stones
                .find_all(
                    &stones_of(chunk),
                    &Sort::asc("id"),
                    Page::Unbounded,
                    &Projection::All,
                )
                .await
                .map_err(|e| e.with_operation(RepositoryOperation::BatchLoad))?;
            grouped.extend(group_stones(chunk, &rows)?);
        }
        Ok(grouped)
    }
}

fn stones_of(jewelry_ids: &[i64]) -> Filter {
    Filter::new().in_list(FOREIGN_KEY, jewelry_ids.iter().copied())
}

fn group_stones(jewelry_ids: &[i64], rows: &[Record]) -> RepositoryResult<HashMap<i64, Vec<Stone>>> {
    let mut grouped: HashMap<i64, Vec<Stone>> =
        jewelry_ids.iter().map(|id| (*id, Vec::new())).collect();
    for stone in decode_all::<Stone>(rows)? {
        grouped.entry(stone.jewelry_id).or_default().push(stone);
    }
    Ok(grouped)
}

fn check_weights(piece: &Jewelry, operation: RepositoryOperation) -> RepositoryResult<()> {
    if piece.weights_consistent() {
        Ok(())
    } else {
        Err(RepositoryError::validation_failed("net_weight cannot exceed gross_weight")
            .with_operation(operation)
            .with_entity(JEWELRY_TABLE, piece.id.to_string())
            .at_step(AggregateStep::Parent))
    }
}

fn decode_all<T: serde::de::DeserializeOwned>(rows: &[Record]) -> RepositoryResult<Vec<T>> {
    rows.iter().map(|row| row.decode()).collect()
}
