//! Connection pool health monitoring
//!
//! Snapshots pool occupancy so callers (and tests) can check that every
//! transaction handed its connection back.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::config::DatabaseConfig;

/// Database connection pool health metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabasePoolHealth {
    /// Total number of open connections
    pub size: u32,

    /// Number of idle connections available
    pub idle: usize,

    /// Connections currently checked out
    pub in_use: usize,

    /// Maximum pool size configured
    pub max_size: u32,

    /// Minimum pool size configured
    pub min_size: u32,

    /// Whether the pool is open and has headroom
    pub healthy: bool,

    /// Checked-out connections as a percentage of the maximum (0-100)
    pub utilization_percent: f32,
}

impl DatabasePoolHealth {
    /// Create health metrics from a SQLite pool
    pub fn from_pool(pool: &SqlitePool, config: &DatabaseConfig) -> Self {
        let size = pool.size();
        let idle = pool.num_idle();
        let in_use = (size as usize).saturating_sub(idle);
        let max_size = config.max_connections;
        let min_size = config.min_connections;

        let utilization_percent = if max_size > 0 {
            ((in_use as f32 / max_size as f32) * 100.0).min(100.0)
        } else {
            0.0
        };

        let healthy = !pool.is_closed() && in_use < max_size as usize;

        Self {
            size,
            idle,
            in_use,
            max_size,
            min_size,
            healthy,
            utilization_percent,
        }
    }
}
