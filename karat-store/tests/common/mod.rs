//! Shared harness: a fresh SQLite file per test

#![allow(dead_code)]

use std::time::Duration;

use karat_store::prelude::*;
use tempfile::TempDir;

pub struct TestDb {
    pub db: Database,
    pub config: DatabaseConfig,
    // Keeps the database file alive for the test's duration
    _dir: TempDir,
}

impl std::ops::Deref for TestDb {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.db
    }
}

pub async fn open() -> TestDb {
    open_with(4).await
}

pub async fn open_with(max_connections: u32) -> TestDb {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("shop.db").display()),
        max_connections,
        min_connections: 0,
        connection_timeout_secs: 2,
        max_retries: 0,
        ..DatabaseConfig::default()
    };
    let db = Database::connect(&config).await.expect("database opens");
    TestDb {
        db,
        config,
        _dir: dir,
    }
}

/// Wait until every connection is back in the pool
///
/// Released connections are returned asynchronously, so poll briefly.
pub async fn assert_all_connections_released(db: &Database) {
    for _ in 0..100 {
        if db.health().in_use == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("connections still checked out: {:?}", db.health());
}

pub fn piece(code: &str) -> NewJewelry {
    NewJewelry {
        code: code.to_string(),
        name: format!("Piece {}", code),
        sale_price: 100.0,
        ..Default::default()
    }
}

pub fn stone(code: &str, weight: f64, cost_price: f64, sale_price: f64) -> NewStone {
    NewStone {
        stone_code: code.to_string(),
        weight,
        cost_price,
        sale_price,
        ..Default::default()
    }
}
