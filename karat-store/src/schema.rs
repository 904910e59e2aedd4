//! Table definitions for the shop database
//!
//! `initialize` is idempotent and runs at startup. Timestamps are RFC 3339
//! UTC text with millisecond precision; booleans are 0/1 integers.

use sqlx::SqlitePool;
use tracing::info;

use crate::repository::{RepositoryError, RepositoryOperation, RepositoryResult};

const NOW: &str = "(strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))";

fn statements() -> Vec<String> {
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT,
                full_name TEXT,
                role TEXT NOT NULL DEFAULT 'staff' CHECK (role IN ('admin', 'staff')),
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT {NOW},
                updated_at TEXT NOT NULL DEFAULT {NOW}
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS vendors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                contact_person TEXT,
                phone TEXT,
                email TEXT,
                address TEXT,
                gst_number TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT {NOW},
                updated_at TEXT NOT NULL DEFAULT {NOW}
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                description TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT {NOW},
                updated_at TEXT NOT NULL DEFAULT {NOW}
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS materials (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                purity TEXT,
                rate_per_gram REAL NOT NULL DEFAULT 0 CHECK (rate_per_gram >= 0),
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT {NOW},
                updated_at TEXT NOT NULL DEFAULT {NOW}
            )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS jewelry (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                category_id INTEGER REFERENCES categories(id),
                vendor_id INTEGER REFERENCES vendors(id),
                material_id INTEGER REFERENCES materials(id),
                gross_weight REAL NOT NULL DEFAULT 0,
                net_weight REAL NOT NULL DEFAULT 0,
                metal_cost REAL NOT NULL DEFAULT 0,
                making_charges REAL NOT NULL DEFAULT 0,
                stones_cost REAL NOT NULL DEFAULT 0,
                cost_price REAL NOT NULL DEFAULT 0,
                sale_price REAL NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'In Stock'
                    CHECK (status IN ('In Stock', 'Sold', 'Reserved')),
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT {NOW},
                updated_at TEXT NOT NULL DEFAULT {NOW}
            )"
        ),
        // Codes are unique among active pieces only; retired codes can be reused
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_jewelry_active_code
            ON jewelry (code) WHERE is_active = 1"
            .to_string(),
        format!(
            "CREATE TABLE IF NOT EXISTS stones (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                jewelry_id INTEGER NOT NULL REFERENCES jewelry(id),
                stone_code TEXT NOT NULL,
                name TEXT,
                weight REAL NOT NULL DEFAULT 0 CHECK (weight >= 0),
                cost_price REAL NOT NULL DEFAULT 0 CHECK (cost_price >= 0),
                sale_price REAL NOT NULL DEFAULT 0 CHECK (sale_price >= 0),
                created_at TEXT NOT NULL DEFAULT {NOW}
            )"
        ),
        "CREATE INDEX IF NOT EXISTS idx_stones_jewelry_id ON stones (jewelry_id)".to_string(),
    ]
}

/// Create every table and index that does not exist yet
pub async fn initialize(pool: &SqlitePool) -> RepositoryResult<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::Schema))?;
    for statement in statements() {
        sqlx::query(&statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::Schema))?;
    }
    tx.commit()
        .await
        .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::Schema))?;
    info!("Database schema ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::Row;

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        initialize(&pool).await.unwrap();
        initialize(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap()
        .iter()
        .map(|row| row.get("name"))
        .collect();
        assert_eq!(
            tables,
            ["categories", "jewelry", "materials", "stones", "users", "vendors"]
        );
    }

    #[tokio::test]
    async fn test_retired_codes_can_be_reused() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        initialize(&pool).await.unwrap();

        sqlx::query("INSERT INTO jewelry (code, name, is_active) VALUES ('R-1', 'Old ring', 0)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO jewelry (code, name) VALUES ('R-1', 'New ring')")
            .execute(&pool)
            .await
            .unwrap();
        let duplicate = sqlx::query("INSERT INTO jewelry (code, name) VALUES ('R-1', 'Clash')")
            .execute(&pool)
            .await;
        assert!(duplicate.is_err());
    }
}
