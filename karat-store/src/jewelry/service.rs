//! Jewelry application service
//!
//! Validates input and checks code availability, then delegates persistence
//! to [`JewelryRepository`], which derives the cost totals inside its write
//! transaction.

use tracing::{instrument, warn};

use super::model::{
    Jewelry, JewelryAggregate, JewelryChanges, JewelryStatus, NewJewelry, NewStone, StoneUpdate,
};
use super::repository::JewelryRepository;
use crate::repository::{
    Filter, Page, RepositoryError, RepositoryErrorKind, RepositoryOperation, RepositoryResult, Sort,
};

const CODE_TAKEN: &str = "code already exists";

/// Listing criteria; absent fields do not constrain the result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JewelryQuery {
    pub status: Option<JewelryStatus>,
    pub category_id: Option<i64>,
    pub vendor_id: Option<i64>,
    pub material_id: Option<i64>,
    /// Include soft-deleted pieces
    pub include_inactive: bool,
}

impl JewelryQuery {
    /// Filter for the parent table
    pub fn to_filter(&self) -> Filter {
        let filter = Filter::new()
            .eq_opt("status", self.status)
            .eq_opt("category_id", self.category_id)
            .eq_opt("vendor_id", self.vendor_id)
            .eq_opt("material_id", self.material_id);
        if self.include_inactive {
            filter
        } else {
            filter.eq("is_active", true)
        }
    }
}

/// Business rules around the jewelry aggregate
#[derive(Debug, Clone)]
pub struct JewelryService {
    repo: JewelryRepository,
}

impl JewelryService {
    /// Service over a repository
    pub fn new(repo: JewelryRepository) -> Self {
        Self { repo }
    }

    /// Underlying repository
    pub fn repository(&self) -> &JewelryRepository {
        &self.repo
    }

    /// Create a piece with its stones
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` for blank codes or names and negative amounts
    /// - `ConstraintViolation` ("code already exists") when an active piece
    ///   already uses the code, whether caught by the availability check or at insert time
    #[instrument(skip_all, fields(code = %piece.code))]
    pub async fn create(
        &self,
        piece: NewJewelry,
        stones: Vec<NewStone>,
    ) -> RepositoryResult<JewelryAggregate> {
        validate_new(&piece)?;
        validate_stones(&stones)?;

        if self.repo.code_in_use(&piece.code, None).await? {
            return Err(code_taken(RepositoryOperation::Create));
        }

        self.repo
            .create_with_stones(piece.to_record(), &stones)
            .await
            .map_err(map_code_conflict)
    }

    /// Patch a piece and optionally replace its stones
    ///
    /// Cost totals and the weight check use the row as patched inside the
    /// transaction, so concurrent updates compose. Returns `Ok(None)` when
    /// the piece does not exist.
    #[instrument(skip_all, fields(id = id))]
    pub async fn update(
        &self,
        id: i64,
        changes: JewelryChanges,
        stones: StoneUpdate,
    ) -> RepositoryResult<Option<JewelryAggregate>> {
        validate_changes(&changes)?;
        if let StoneUpdate::Replace(replacement) = &stones {
            validate_stones(replacement)?;
        }

        if let Some(code) = &changes.code {
            if self.repo.code_in_use(code, Some(id)).await? {
                return Err(code_taken(RepositoryOperation::Update));
            }
        }

        self.repo
            .update_with_stones(id, changes.to_record(), stones)
            .await
            .map_err(map_code_conflict)
    }

    /// One piece with its stones
    pub async fn get(&self, id: i64) -> RepositoryResult<Option<JewelryAggregate>> {
        self.repo.find_by_id(id).await
    }

    /// Pieces matching `query`, newest first unless `sort` says otherwise
    pub async fn list(
        &self,
        query: &JewelryQuery,
        sort: &Sort,
        page: Page,
    ) -> RepositoryResult<Vec<JewelryAggregate>> {
        let default_sort = Sort::desc("id");
        let sort = if sort.is_empty() { &default_sort } else { sort };
        self.repo.get_with_stones(&query.to_filter(), sort, page).await
    }

    /// Number of pieces matching `query`
    pub async fn count(&self, query: &JewelryQuery) -> RepositoryResult<u64> {
        self.repo.count(&query.to_filter()).await
    }

    /// Remove a piece and its stones for good
    pub async fn delete(&self, id: i64) -> RepositoryResult<bool> {
        self.repo.delete_with_stones(id).await
    }

    /// Retire a piece; its code becomes available again
    pub async fn soft_delete(&self, id: i64) -> RepositoryResult<Option<Jewelry>> {
        self.repo.soft_delete(id).await
    }
}

fn code_taken(operation: RepositoryOperation) -> RepositoryError {
    RepositoryError::constraint_violation(operation, CODE_TAKEN).with_table("jewelry")
}

/// Translate an insert-time unique violation on `jewelry.code`
fn map_code_conflict(err: RepositoryError) -> RepositoryError {
    let on_code = err
        .constraint
        .as_deref()
        .is_some_and(|constraint| constraint.contains("jewelry.code"));
    if err.kind == RepositoryErrorKind::ConstraintViolation && on_code {
        warn!("Code taken between availability check and insert");
        RepositoryError {
            message: CODE_TAKEN.to_string(),
            ..err
        }
    } else {
        err
    }
}

fn validate_new(piece: &NewJewelry) -> RepositoryResult<()> {
    require_text("code", &piece.code)?;
    require_text("name", &piece.name)?;
    for (field, amount) in [
        ("gross_weight", piece.gross_weight),
        ("net_weight", piece.net_weight),
        ("metal_cost", piece.metal_cost),
        ("making_charges", piece.making_charges),
        ("sale_price", piece.sale_price),
    ] {
        require_amount(field, amount)?;
    }
    if piece.net_weight > piece.gross_weight {
        return Err(invalid("net_weight cannot exceed gross_weight"));
    }
    Ok(())
}

fn validate_changes(changes: &JewelryChanges) -> RepositoryResult<()> {
    if let Some(code) = &changes.code {
        require_text("code", code)?;
    }
    if let Some(name) = &changes.name {
        require_text("name", name)?;
    }
    for (field, amount) in [
        ("gross_weight", changes.gross_weight),
        ("net_weight", changes.net_weight),
        ("metal_cost", changes.metal_cost),
        ("making_charges", changes.making_charges),
        ("sale_price", changes.sale_price),
    ] {
        if let Some(amount) = amount {
            require_amount(field, amount)?;
        }
    }
    if let (Some(net), Some(gross)) = (changes.net_weight, changes.gross_weight) {
        if net > gross {
            return Err(invalid("net_weight cannot exceed gross_weight"));
        }
    }
    Ok(())
}

fn validate_stones(stones: &[NewStone]) -> RepositoryResult<()> {
    for stone in stones {
        require_text("stone_code", &stone.stone_code)?;
        require_amount("weight", stone.weight)?;
        require_amount("cost_price", stone.cost_price)?;
        require_amount("sale_price", stone.sale_price)?;
    }
    Ok(())
}

fn require_text(field: &str, value: &str) -> RepositoryResult<()> {
    if value.trim().is_empty() {
        Err(invalid(&format!("{} is required", field)))
    } else {
        Ok(())
    }
}

fn require_amount(field: &str, value: f64) -> RepositoryResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(&format!("{} must be a non-negative number", field)))
    }
}

fn invalid(message: &str) -> RepositoryError {
    RepositoryError::validation_failed(message).with_table("jewelry")
}
