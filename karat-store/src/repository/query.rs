//! Parameterized statement construction
//!
//! Pure translation from a table name plus [`Filter`], [`Sort`], [`Page`] and
//! [`Projection`] into SQL text with positional `?` placeholders and a
//! same-order argument list. Values are always bound; only identifiers are
//! interpolated, and every identifier must pass [`validate_identifier`].

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};

use super::error::{RepositoryError, RepositoryOperation};
use super::filter::{Filter, FilterOperator, Page, Predicate, Projection, Sort};
use super::record::{format_timestamp, Record, Value};

/// Plain SQL identifier: table or column name
static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex is valid")
});

/// SQL text plus its bound arguments
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Statement text with `?` placeholders
    pub sql: String,
    /// Arguments in placeholder order
    pub args: Vec<Value>,
}

impl Statement {
    fn new(sql: String, args: Vec<Value>) -> Self {
        Self { sql, args }
    }

    /// Prepare an sqlx query with every argument bound
    pub(crate) fn query(&self) -> Query<'_, Sqlite, SqliteArguments<'_>> {
        self.args
            .iter()
            .fold(sqlx::query(&self.sql), |query, value| match value {
                Value::Null => query.bind(Option::<String>::None),
                Value::Bool(b) => query.bind(*b),
                Value::Integer(n) => query.bind(*n),
                Value::Real(n) => query.bind(*n),
                Value::Text(s) => query.bind(s.as_str()),
                Value::Timestamp(ts) => query.bind(format_timestamp(ts)),
            })
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Reject anything that is not a plain SQL identifier
///
/// ```rust
/// use karat_store::repository::query::validate_identifier;
///
/// assert!(validate_identifier("jewelry_id").is_ok());
/// assert!(validate_identifier("id; DROP TABLE users").is_err());
/// ```
pub fn validate_identifier(name: &str) -> Result<&str, RepositoryError> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(RepositoryError::validation_failed(format!(
            "Invalid identifier '{}'",
            name
        )))
    }
}

/// `SELECT` with filter, ordering, page window and projection
pub fn select(
    table: &str,
    filter: &Filter,
    sort: &Sort,
    page: Page,
    projection: &Projection,
) -> Result<Statement, RepositoryError> {
    let columns = match projection {
        Projection::All => "*".to_string(),
        Projection::Columns(columns) if columns.is_empty() => {
            return Err(RepositoryError::validation_failed(
                "Projection must name at least one column",
            ))
        }
        Projection::Columns(columns) => columns
            .iter()
            .map(|c| validate_identifier(c))
            .collect::<Result<Vec<_>, _>>()?
            .join(", "),
    };

    let mut sql = format!("SELECT {} FROM {}", columns, validate_identifier(table)?);
    let mut args = Vec::new();
    push_where(&mut sql, &mut args, filter)?;

    if !sort.is_empty() {
        let keys = sort
            .keys()
            .iter()
            .map(|(column, direction)| {
                validate_identifier(column).map(|c| format!("{} {}", c, direction.as_sql()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        sql.push_str(" ORDER BY ");
        sql.push_str(&keys.join(", "));
    }

    if let Page::Window { limit, offset } = page {
        sql.push_str(" LIMIT ? OFFSET ?");
        args.push(Value::Integer(clamp(limit)));
        args.push(Value::Integer(clamp(offset)));
    }

    Ok(Statement::new(sql, args))
}

/// `SELECT COUNT(*)` over the filter
pub fn count(table: &str, filter: &Filter) -> Result<Statement, RepositoryError> {
    let mut sql = format!(
        "SELECT COUNT(*) AS count FROM {}",
        validate_identifier(table)?
    );
    let mut args = Vec::new();
    push_where(&mut sql, &mut args, filter)?;
    Ok(Statement::new(sql, args))
}

/// `SELECT EXISTS(...)` over the filter
pub fn exists(table: &str, filter: &Filter) -> Result<Statement, RepositoryError> {
    let mut sql = format!("SELECT 1 FROM {}", validate_identifier(table)?);
    let mut args = Vec::new();
    push_where(&mut sql, &mut args, filter)?;
    Ok(Statement::new(
        format!("SELECT EXISTS({} LIMIT 1) AS present", sql),
        args,
    ))
}

/// `INSERT ... RETURNING *`; an empty record inserts defaults only
pub fn insert(table: &str, fields: &Record) -> Result<Statement, RepositoryError> {
    let table = validate_identifier(table)?;
    if fields.is_empty() {
        return Ok(Statement::new(
            format!("INSERT INTO {} DEFAULT VALUES RETURNING *", table),
            Vec::new(),
        ));
    }

    let mut columns = Vec::with_capacity(fields.len());
    let mut args = Vec::with_capacity(fields.len());
    for (column, value) in fields.iter() {
        columns.push(validate_identifier(column)?);
        args.push(value.clone());
    }
    let placeholders = vec!["?"; columns.len()].join(", ");

    Ok(Statement::new(
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            table,
            columns.join(", "),
            placeholders
        ),
        args,
    ))
}

/// `UPDATE ... SET` only the supplied columns, `RETURNING *`
pub fn update_by_id(
    table: &str,
    primary_key: &str,
    id: &Value,
    fields: &Record,
) -> Result<Statement, RepositoryError> {
    if fields.is_empty() {
        return Err(RepositoryError::validation_failed("Update requires at least one column")
            .with_operation(RepositoryOperation::Update)
            .with_table(table));
    }

    let mut assignments = Vec::with_capacity(fields.len());
    let mut args = Vec::with_capacity(fields.len() + 1);
    for (column, value) in fields.iter() {
        assignments.push(format!("{} = ?", validate_identifier(column)?));
        args.push(value.clone());
    }
    args.push(id.clone());

    Ok(Statement::new(
        format!(
            "UPDATE {} SET {} WHERE {} = ? RETURNING *",
            validate_identifier(table)?,
            assignments.join(", "),
            validate_identifier(primary_key)?
        ),
        args,
    ))
}

/// `DELETE` a single row by primary key
pub fn delete_by_id(table: &str, primary_key: &str, id: &Value) -> Result<Statement, RepositoryError> {
    Ok(Statement::new(
        format!(
            "DELETE FROM {} WHERE {} = ?",
            validate_identifier(table)?,
            validate_identifier(primary_key)?
        ),
        vec![id.clone()],
    ))
}

/// `DELETE` every row matching a non-empty filter
pub fn delete_where(table: &str, filter: &Filter) -> Result<Statement, RepositoryError> {
    if filter.is_empty() {
        return Err(
            RepositoryError::validation_failed("Refusing to delete without a filter")
                .with_operation(RepositoryOperation::Delete)
                .with_table(table),
        );
    }
    let mut sql = format!("DELETE FROM {}", validate_identifier(table)?);
    let mut args = Vec::new();
    push_where(&mut sql, &mut args, filter)?;
    Ok(Statement::new(sql, args))
}

fn push_where(sql: &mut String, args: &mut Vec<Value>, filter: &Filter) -> Result<(), RepositoryError> {
    if filter.is_empty() {
        return Ok(());
    }

    let mut clauses = Vec::with_capacity(filter.len());
    for condition in filter.conditions() {
        let field = validate_identifier(&condition.field)?;
        let clause = match &condition.predicate {
            Predicate::Eq(Value::Null) => format!("{} IS NULL", field),
            Predicate::Eq(value) => {
                args.push(value.clone());
                format!("{} = ?", field)
            }
            // IN () is not valid SQL
            Predicate::In(values) if values.is_empty() => "1 = 0".to_string(),
            Predicate::In(values) => {
                args.extend(values.iter().cloned());
                format!("{} IN ({})", field, vec!["?"; values.len()].join(", "))
            }
            Predicate::Op(FilterOperator::NotEqual, Value::Null) => {
                format!("{} IS NOT NULL", field)
            }
            Predicate::Op(operator, Value::Null) => {
                return Err(RepositoryError::validation_failed(format!(
                    "Operator {} cannot compare '{}' with NULL",
                    operator, field
                )))
            }
            Predicate::Op(operator, value) => {
                args.push(value.clone());
                format!("{} {} ?", field, operator.as_sql())
            }
        };
        clauses.push(clause);
    }

    sql.push_str(" WHERE ");
    sql.push_str(&clauses.join(" AND "));
    Ok(())
}

fn clamp(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{FilterCondition, OrderDirection, RepositoryErrorKind};

    #[test]
    fn test_select_without_filter_has_no_where() {
        let stmt = select("users", &Filter::new(), &Sort::new(), Page::Unbounded, &Projection::All)
            .unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM users");
        assert!(stmt.args.is_empty());
    }

    #[test]
    fn test_select_binds_filter_values_in_order() {
        let filter = Filter::new()
            .eq("status", "In Stock")
            .op("sale_price", FilterOperator::GreaterThan, 100.0)
            .op("name", FilterOperator::Like, "%ring%");
        let stmt = select("jewelry", &filter, &Sort::new(), Page::Unbounded, &Projection::All)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT * FROM jewelry WHERE status = ? AND sale_price > ? AND name LIKE ?"
        );
        assert_eq!(
            stmt.args,
            vec![
                Value::Text("In Stock".into()),
                Value::Real(100.0),
                Value::Text("%ring%".into())
            ]
        );
    }

    #[test]
    fn test_values_are_never_interpolated() {
        let hostile = "x' OR '1'='1";
        let stmt = select(
            "users",
            &Filter::new().eq("username", hostile),
            &Sort::new(),
            Page::Unbounded,
            &Projection::All,
        )
        .unwrap();
        assert!(!stmt.sql.contains(hostile));
        assert_eq!(stmt.args, vec![Value::Text(hostile.into())]);
    }

    #[test]
    fn test_in_clause_has_one_placeholder_per_element() {
        let stmt = select(
            "jewelry",
            &Filter::new().in_list("id", [3_i64, 1, 2]),
            &Sort::new(),
            Page::Unbounded,
            &Projection::All,
        )
        .unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM jewelry WHERE id IN (?, ?, ?)");
        assert_eq!(
            stmt.args,
            vec![Value::Integer(3), Value::Integer(1), Value::Integer(2)]
        );
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let filter = Filter::new()
            .in_list("id", Vec::<i64>::new())
            .eq("is_active", true);
        let stmt = select("jewelry", &filter, &Sort::new(), Page::Unbounded, &Projection::All)
            .unwrap();
        assert_eq!(stmt.sql, "SELECT * FROM jewelry WHERE 1 = 0 AND is_active = ?");
        assert_eq!(stmt.args, vec![Value::Bool(true)]);
    }

    #[test]
    fn test_null_comparisons() {
        let filter = Filter::new()
            .and(FilterCondition::is_null("vendor_id"))
            .op("category_id", FilterOperator::NotEqual, Value::Null);
        let stmt = count("jewelry", &filter).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT COUNT(*) AS count FROM jewelry WHERE vendor_id IS NULL AND category_id IS NOT NULL"
        );
        assert!(stmt.args.is_empty());

        let err = count(
            "jewelry",
            &Filter::new().op("weight", FilterOperator::GreaterThan, Value::Null),
        )
        .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
    }

    #[test]
    fn test_order_and_page_window() {
        let sort = Sort::new()
            .then("status", OrderDirection::Ascending)
            .then("id", OrderDirection::Descending);
        let stmt = select(
            "jewelry",
            &Filter::new(),
            &sort,
            Page::window(10, 20),
            &Projection::columns(["id", "code"]),
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT id, code FROM jewelry ORDER BY status ASC, id DESC LIMIT ? OFFSET ?"
        );
        assert_eq!(stmt.args, vec![Value::Integer(10), Value::Integer(20)]);
    }

    #[test]
    fn test_rejects_unsafe_identifiers() {
        let bad_column = select(
            "users",
            &Filter::new().eq("name = name OR 1", 1),
            &Sort::new(),
            Page::Unbounded,
            &Projection::All,
        );
        assert!(bad_column.is_err());

        let bad_sort = select(
            "users",
            &Filter::new(),
            &Sort::asc("id; DROP TABLE users"),
            Page::Unbounded,
            &Projection::All,
        );
        assert!(bad_sort.is_err());

        let bad_table = count("users u", &Filter::new()).unwrap_err();
        assert_eq!(bad_table.kind, RepositoryErrorKind::ValidationFailed);

        let empty_projection = select(
            "users",
            &Filter::new(),
            &Sort::new(),
            Page::Unbounded,
            &Projection::Columns(Vec::new()),
        );
        assert!(empty_projection.is_err());
    }

    #[test]
    fn test_exists_statement() {
        let stmt = exists("jewelry", &Filter::new().eq("code", "N-001")).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT EXISTS(SELECT 1 FROM jewelry WHERE code = ? LIMIT 1) AS present"
        );
    }

    #[test]
    fn test_insert_statement() {
        let fields = Record::new().with("name", "Ring").with("code", "R-1");
        let stmt = insert("jewelry", &fields).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO jewelry (code, name) VALUES (?, ?) RETURNING *"
        );
        assert_eq!(
            stmt.args,
            vec![Value::Text("R-1".into()), Value::Text("Ring".into())]
        );

        let defaults = insert("categories", &Record::new()).unwrap();
        assert_eq!(defaults.sql, "INSERT INTO categories DEFAULT VALUES RETURNING *");
    }

    #[test]
    fn test_update_statement() {
        let fields = Record::new().with("sale_price", 150.0);
        let stmt = update_by_id("jewelry", "id", &Value::Integer(7), &fields).unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE jewelry SET sale_price = ? WHERE id = ? RETURNING *"
        );
        assert_eq!(stmt.args, vec![Value::Real(150.0), Value::Integer(7)]);

        let err = update_by_id("jewelry", "id", &Value::Integer(7), &Record::new()).unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
    }

    #[test]
    fn test_delete_statements() {
        let stmt = delete_by_id("stones", "id", &Value::Integer(1)).unwrap();
        assert_eq!(stmt.sql, "DELETE FROM stones WHERE id = ?");

        let stmt = delete_where("stones", &Filter::new().eq("jewelry_id", 4)).unwrap();
        assert_eq!(stmt.sql, "DELETE FROM stones WHERE jewelry_id = ?");
        assert_eq!(stmt.args, vec![Value::Integer(4)]);

        let err = delete_where("stones", &Filter::new()).unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
    }
}
