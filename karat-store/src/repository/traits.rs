//! Repository trait definitions
//!
//! Async methods use RPITIT (Return Position Impl Trait In Traits), so no
//! `async_trait` boxing is needed.
//!
//! - [`Repository`]: CRUD over filters, ordering and page windows
//! - [`SoftDeleteRepository`]: clearing an active flag instead of deleting
//! - [`RelationLoader`]: batched child loading (N+1 prevention)

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;

use super::error::RepositoryError;
use super::filter::{Filter, Page, Projection, Sort};

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Base repository trait for CRUD operations
///
/// # Type Parameters
///
/// - `Id`: The primary key type
/// - `Entity`: The row type returned from queries
/// - `Create`: Fields for a new row
/// - `Update`: Partial fields for a patch
///
/// # Example
///
/// ```rust,no_run
/// use karat_store::prelude::*;
///
/// # async fn demo(users: RecordStore) -> RepositoryResult<()> {
/// let admins = users
///     .find_all(
///         &Filter::new().eq("role", "admin"),
///         &Sort::asc("username"),
///         Page::first(20),
///         &Projection::All,
///     )
///     .await?;
/// println!("{} admins", admins.len());
/// # Ok(())
/// # }
/// ```
pub trait Repository<Id, Entity, Create, Update>: Send + Sync {
    /// Find rows matching the filter, ordered and windowed
    ///
    /// `Page::Unbounded` returns every matching row.
    fn find_all(
        &self,
        filter: &Filter,
        sort: &Sort,
        page: Page,
        projection: &Projection,
    ) -> impl Future<Output = RepositoryResult<Vec<Entity>>> + Send;

    /// Find a row by primary key
    ///
    /// Returns `Ok(None)` when absent; absence is not an error.
    fn find_by_id(&self, id: &Id) -> impl Future<Output = RepositoryResult<Option<Entity>>> + Send;

    /// First row matching the filter
    fn find_one(&self, filter: &Filter)
        -> impl Future<Output = RepositoryResult<Option<Entity>>> + Send;

    /// Count rows matching the filter
    fn count(&self, filter: &Filter) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Whether any row matches the filter
    fn exists(&self, filter: &Filter) -> impl Future<Output = RepositoryResult<bool>> + Send;

    /// Insert a row and return it with generated columns
    ///
    /// # Errors
    ///
    /// `ConstraintViolation` when a unique or foreign-key constraint fails.
    fn create(&self, data: Create) -> impl Future<Output = RepositoryResult<Entity>> + Send;

    /// Patch only the supplied columns
    ///
    /// Returns `Ok(None)` when no row has this id.
    fn update(
        &self,
        id: &Id,
        data: Update,
    ) -> impl Future<Output = RepositoryResult<Option<Entity>>> + Send;

    /// Hard delete; returns whether a row was removed
    fn delete(&self, id: &Id) -> impl Future<Output = RepositoryResult<bool>> + Send;
}

/// Soft delete support
///
/// Rows are marked inactive rather than removed.
pub trait SoftDeleteRepository<Id, Entity, Create, Update>:
    Repository<Id, Entity, Create, Update>
{
    /// Clear the active flag; returns the updated row or `None` if absent
    fn soft_delete(&self, id: &Id) -> impl Future<Output = RepositoryResult<Option<Entity>>> + Send;
}

/// Batched loading of child rows for a set of parents
///
/// Implementations issue one query for all parent ids and group the children
/// by their foreign key. Parents without children map to an empty list.
pub trait RelationLoader<ParentId, Related>: Send + Sync
where
    ParentId: Eq + Hash,
{
    /// Load children for every parent id in a single round-trip
    fn load_many(
        &self,
        parent_ids: &[ParentId],
    ) -> impl Future<Output = RepositoryResult<HashMap<ParentId, Vec<Related>>>> + Send;
}
