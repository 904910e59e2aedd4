//! Repository error types
//!
//! Every store failure is classified into one [`RepositoryErrorKind`], so
//! callers can tell absence, constraint violations, malformed input and
//! storage outages apart without inspecting driver error codes.
//!
//! # Example
//!
//! ```rust
//! use karat_store::repository::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
//!
//! let error = RepositoryError::not_found("jewelry", "42");
//! assert!(matches!(error.kind, RepositoryErrorKind::NotFound));
//! assert_eq!(error.operation, RepositoryOperation::FindById);
//! ```

use std::fmt;

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryOperation {
    /// Building a statement
    BuildQuery,
    /// Finding a single row by primary key
    FindById,
    /// Finding rows with filters
    FindAll,
    /// Counting rows matching filters
    Count,
    /// Checking whether a row exists
    Exists,
    /// Inserting a row
    Create,
    /// Inserting several rows atomically
    BatchCreate,
    /// Patching a row
    Update,
    /// Hard delete
    Delete,
    /// Clearing the active flag
    SoftDelete,
    /// Opening, committing or rolling back a transaction
    Transaction,
    /// Batch loading child rows
    BatchLoad,
    /// Mapping a record to a typed model
    Decode,
    /// Creating or migrating tables
    Schema,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuildQuery => write!(f, "build_query"),
            Self::FindById => write!(f, "find_by_id"),
            Self::FindAll => write!(f, "find_all"),
            Self::Count => write!(f, "count"),
            Self::Exists => write!(f, "exists"),
            Self::Create => write!(f, "create"),
            Self::BatchCreate => write!(f, "batch_create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::SoftDelete => write!(f, "soft_delete"),
            Self::Transaction => write!(f, "transaction"),
            Self::BatchLoad => write!(f, "batch_load"),
            Self::Decode => write!(f, "decode"),
            Self::Schema => write!(f, "schema"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepositoryErrorKind {
    /// Requested row does not exist
    NotFound,
    /// Unique, foreign-key, not-null or check constraint failed
    ConstraintViolation,
    /// Input rejected before any statement was sent
    ValidationFailed,
    /// Pool exhaustion, connectivity or driver failure
    StorageUnavailable,
    /// Operation deadline elapsed; the transaction was rolled back
    Timeout,
}

impl RepositoryErrorKind {
    /// HTTP status the API layer answers with for this kind
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::ConstraintViolation | Self::ValidationFailed => 400,
            Self::StorageUnavailable => 500,
            Self::Timeout => 504,
        }
    }
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::StorageUnavailable => write!(f, "storage_unavailable"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Logical step of an aggregate write, attached for observability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateStep {
    /// Writing or deleting the parent row
    Parent,
    /// Deleting or inserting child rows
    Children,
    /// Reading rows back
    Read,
    /// Committing the transaction
    Commit,
    /// Rolling the transaction back
    Rollback,
}

impl fmt::Display for AggregateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parent => write!(f, "parent"),
            Self::Children => write!(f, "children"),
            Self::Read => write!(f, "read"),
            Self::Commit => write!(f, "commit"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// Structured repository error with operation context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Table involved, when known
    pub table: Option<String>,
    /// Primary key involved, when known
    pub entity_id: Option<String>,
    /// Violated constraint as reported by the database, when available
    pub constraint: Option<String>,
    /// Aggregate step that failed
    pub step: Option<AggregateStep>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            table: None,
            entity_id: None,
            constraint: None,
            step: None,
        }
    }

    /// Create a "not found" error with entity context
    pub fn not_found(table: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::FindById,
            RepositoryErrorKind::NotFound,
            "Entity not found",
        )
        .with_entity(table, entity_id)
    }

    /// Create a validation failed error
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::BuildQuery,
            RepositoryErrorKind::ValidationFailed,
            message,
        )
    }

    /// Create a constraint violation error
    pub fn constraint_violation(
        operation: RepositoryOperation,
        message: impl Into<String>,
    ) -> Self {
        Self::new(operation, RepositoryErrorKind::ConstraintViolation, message)
    }

    /// Create a storage unavailable error
    pub fn storage_unavailable(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::StorageUnavailable, message)
    }

    /// Create a timeout error
    pub fn timeout(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Timeout, message)
    }

    /// Add table and primary key context
    #[must_use]
    pub fn with_entity(mut self, table: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Add table context
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Record which aggregate step failed; an already recorded step is kept
    #[must_use]
    pub fn at_step(mut self, step: AggregateStep) -> Self {
        self.step.get_or_insert(step);
        self
    }

    /// Check if this error is retriable (transient errors that may succeed on retry)
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            RepositoryErrorKind::StorageUnavailable | RepositoryErrorKind::Timeout
        )
    }

    /// Whether this is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        self.kind == RepositoryErrorKind::ConstraintViolation
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let Some(ref table) = self.table {
            match self.entity_id {
                Some(ref id) => write!(f, " [{}: {}]", table, id)?,
                None => write!(f, " [{}]", table)?,
            }
        }
        if let Some(ref constraint) = self.constraint {
            write!(f, " (constraint: {})", constraint)?;
        }
        if let Some(step) = self.step {
            write!(f, " at {} step", step)?;
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        // Operation is unknown here; call sites refine it with `with_operation`.
        let operation = RepositoryOperation::FindAll;
        match err {
            sqlx::Error::RowNotFound => {
                Self::new(operation, RepositoryErrorKind::NotFound, "Row not found")
            }
            sqlx::Error::Database(ref db_err) => {
                use sqlx::error::ErrorKind;
                match db_err.kind() {
                    ErrorKind::UniqueViolation
                    | ErrorKind::ForeignKeyViolation
                    | ErrorKind::NotNullViolation
                    | ErrorKind::CheckViolation => {
                        let mut error = Self::constraint_violation(operation, db_err.message());
                        error.constraint = db_err
                            .constraint()
                            .map(str::to_string)
                            .or_else(|| constraint_from_message(db_err.message()));
                        error
                    }
                    _ => Self::storage_unavailable(operation, db_err.message()),
                }
            }
            sqlx::Error::PoolTimedOut => Self::storage_unavailable(
                operation,
                "Connection pool timeout - database may be overloaded",
            ),
            sqlx::Error::PoolClosed => {
                Self::storage_unavailable(operation, "Connection pool closed")
            }
            other => Self::storage_unavailable(operation, other.to_string()),
        }
    }
}

/// SQLite reports constraints as "UNIQUE constraint failed: jewelry.code"
fn constraint_from_message(message: &str) -> Option<String> {
    let (kind, detail) = message.split_once(" constraint failed")?;
    let detail = detail.trim_start_matches(':').trim();
    if detail.is_empty() {
        Some(kind.trim().to_ascii_lowercase())
    } else {
        Some(format!("{} {}", kind.trim().to_ascii_lowercase(), detail))
    }
}
