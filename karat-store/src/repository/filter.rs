//! Filter, ordering, pagination and projection types for repository queries
//!
//! These are pure data: the query builder turns them into SQL with bound
//! arguments, so values never end up interpolated into statement text.
//!
//! # Example
//!
//! ```rust
//! use karat_store::repository::{Filter, FilterOperator, OrderDirection, Page, Sort};
//!
//! let filter = Filter::new()
//!     .eq("status", "In Stock")
//!     .op("sale_price", FilterOperator::GreaterThanOrEqual, 100.0)
//!     .eq_opt("vendor_id", Option::<i64>::None);
//!
//! // `None` values are dropped rather than compared against NULL
//! assert_eq!(filter.len(), 2);
//!
//! let sort = Sort::new().then("created_at", OrderDirection::Descending);
//! let page = Page::number(2, 20);
//! assert_eq!(page.offset(), 20);
//! # let _ = sort;
//! ```

use std::fmt;
use std::str::FromStr;

use super::error::RepositoryError;
use super::record::Value;

/// Direction for ordering results
///
/// # Example
///
/// ```rust
/// use karat_store::repository::OrderDirection;
///
/// let desc: OrderDirection = "DESC".parse().unwrap();
/// assert_eq!(desc, OrderDirection::Descending);
/// assert!("sideways".parse::<OrderDirection>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    /// Sort in ascending order (A-Z, 0-9)
    #[default]
    Ascending,
    /// Sort in descending order (Z-A, 9-0)
    Descending,
}

impl OrderDirection {
    /// SQL keyword for this direction
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

impl FromStr for OrderDirection {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(Self::Ascending)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(Self::Descending)
        } else {
            Err(RepositoryError::validation_failed(format!(
                "Invalid sort direction '{}', expected ASC or DESC",
                s
            )))
        }
    }
}

/// Comparison operators usable with [`Predicate::Op`]
///
/// Equality and membership have their own predicate variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    /// Not equal to (!=)
    NotEqual,
    /// Greater than (>)
    GreaterThan,
    /// Greater than or equal to (>=)
    GreaterThanOrEqual,
    /// Less than (<)
    LessThan,
    /// Less than or equal to (<=)
    LessThanOrEqual,
    /// Pattern matching (LIKE)
    Like,
}

impl FilterOperator {
    /// SQL operator text
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::NotEqual => "!=",
            Self::GreaterThan => ">",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThan => "<",
            Self::LessThanOrEqual => "<=",
            Self::Like => "LIKE",
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Constraint applied to one column
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Column equals the value; `Value::Null` means IS NULL
    Eq(Value),
    /// Column is one of the values; an empty set matches nothing
    In(Vec<Value>),
    /// Column compared with an operator
    Op(FilterOperator, Value),
}

/// A single WHERE clause term
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    /// Column name
    pub field: String,
    /// What the column must satisfy
    pub predicate: Predicate,
}

impl FilterCondition {
    /// Create a condition from a field and predicate
    pub fn new(field: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            field: field.into(),
            predicate,
        }
    }

    /// Equality condition
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Predicate::Eq(value.into()))
    }

    /// Membership condition
    pub fn in_list<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::new(
            field,
            Predicate::In(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Operator condition
    pub fn op(field: impl Into<String>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self::new(field, Predicate::Op(operator, value.into()))
    }

    /// IS NULL condition
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, Predicate::Eq(Value::Null))
    }
}

/// Ordered conjunction of filter conditions
///
/// Conditions are joined with AND in insertion order. An empty filter has no
/// WHERE clause.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<FilterCondition>,
}

impl Filter {
    /// Create an empty filter (matches every row)
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on a single primary key value
    pub fn by_id(primary_key: &str, id: impl Into<Value>) -> Self {
        Self::new().eq(primary_key, id)
    }

    /// Add an equality condition
    #[must_use]
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.and(FilterCondition::eq(field, value))
    }

    /// Add an equality condition when a value is present; `None` adds nothing
    #[must_use]
    pub fn eq_opt<V: Into<Value>>(self, field: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.eq(field, value),
            None => self,
        }
    }

    /// Add a membership condition
    #[must_use]
    pub fn in_list<V: Into<Value>>(
        self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.and(FilterCondition::in_list(field, values))
    }

    /// Add an operator condition
    #[must_use]
    pub fn op(
        self,
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<Value>,
    ) -> Self {
        self.and(FilterCondition::op(field, operator, value))
    }

    /// Append an arbitrary condition
    #[must_use]
    pub fn and(mut self, condition: FilterCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Conditions in clause order
    pub fn conditions(&self) -> &[FilterCondition] {
        &self.conditions
    }

    /// Number of conditions
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Whether the filter has no conditions
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl From<Vec<FilterCondition>> for Filter {
    fn from(conditions: Vec<FilterCondition>) -> Self {
        Self { conditions }
    }
}

impl FromIterator<FilterCondition> for Filter {
    fn from_iter<I: IntoIterator<Item = FilterCondition>>(iter: I) -> Self {
        Self {
            conditions: iter.into_iter().collect(),
        }
    }
}

/// Ordered multi-column sort
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sort {
    keys: Vec<(String, OrderDirection)>,
}

impl Sort {
    /// No ordering
    pub fn new() -> Self {
        Self::default()
    }

    /// Single ascending key
    pub fn asc(column: impl Into<String>) -> Self {
        Self::new().then(column, OrderDirection::Ascending)
    }

    /// Single descending key
    pub fn desc(column: impl Into<String>) -> Self {
        Self::new().then(column, OrderDirection::Descending)
    }

    /// Append a sort key
    #[must_use]
    pub fn then(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.keys.push((column.into(), direction));
        self
    }

    /// Append a sort key whose direction comes from caller text
    ///
    /// Fails with `ValidationFailed` unless the direction is ASC or DESC.
    pub fn then_parsed(self, column: impl Into<String>, direction: &str) -> Result<Self, RepositoryError> {
        let direction = direction.parse()?;
        Ok(self.then(column, direction))
    }

    /// Sort keys in ORDER BY order
    pub fn keys(&self) -> &[(String, OrderDirection)] {
        &self.keys
    }

    /// Whether no ordering is requested
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Page window over a result set
///
/// `Unbounded` reads every matching row; there is no implicit cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    /// All matching rows
    Unbounded,
    /// At most `limit` rows after skipping `offset`
    Window {
        /// Maximum number of rows to return
        limit: u64,
        /// Number of rows to skip
        offset: u64,
    },
}

impl Page {
    /// The first `limit` rows
    pub const fn first(limit: u64) -> Self {
        Self::Window { limit, offset: 0 }
    }

    /// Explicit limit and offset
    pub const fn window(limit: u64, offset: u64) -> Self {
        Self::Window { limit, offset }
    }

    /// Page number (1-indexed) of the given size
    ///
    /// ```rust
    /// use karat_store::repository::Page;
    ///
    /// assert_eq!(Page::number(3, 20), Page::window(20, 40));
    /// assert_eq!(Page::number(0, 20), Page::window(20, 0));
    /// ```
    pub const fn number(page_number: u64, page_size: u64) -> Self {
        Self::Window {
            limit: page_size,
            offset: page_number.saturating_sub(1).saturating_mul(page_size),
        }
    }

    /// Row limit, if bounded
    pub const fn limit(&self) -> Option<u64> {
        match self {
            Self::Unbounded => None,
            Self::Window { limit, .. } => Some(*limit),
        }
    }

    /// Rows skipped
    pub const fn offset(&self) -> u64 {
        match self {
            Self::Unbounded => 0,
            Self::Window { offset, .. } => *offset,
        }
    }
}

/// Columns to return from a select
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    /// `SELECT *`
    #[default]
    All,
    /// Only the listed columns
    Columns(Vec<String>),
}

impl Projection {
    /// Project the given columns
    pub fn columns<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self::Columns(columns.into_iter().map(Into::into).collect())
    }
}
