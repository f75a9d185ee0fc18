use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::time::{Duration, Instant};

/// Health status of a service or dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Health status of a single dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyHealth {
    pub name: String,
    pub status: HealthStatus,
    pub latency_ms: Option<f64>,
    pub message: Option<String>,
}

impl DependencyHealth {
    pub fn healthy(name: impl Into<String>, latency_ms: f64) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            latency_ms: Some(latency_ms),
            message: None,
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            message: Some(message.into()),
        }
    }
}

/// Aggregated health check result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedHealth {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: Vec<DependencyHealth>,
}

impl AggregatedHealth {
    pub fn new(version: String, uptime_seconds: u64, dependencies: Vec<DependencyHealth>) -> Self {
        let status = if dependencies.iter().all(|d| d.status.is_healthy()) {
            HealthStatus::Healthy
        } else if dependencies.iter().any(|d| d.status == HealthStatus::Unhealthy) {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Degraded
        };
        Self {
            status,
            version,
            uptime_seconds,
            dependencies,
        }
    }
}

/// Health checker for the store backing the service.
pub struct HealthChecker {
    pool: Option<PgPool>,
    start_time: Instant,
}

impl HealthChecker {
    /// `None` means the service runs on the in-memory store.
    pub fn new(pool: Option<PgPool>) -> Self {
        Self {
            pool,
            start_time: Instant::now(),
        }
    }

    pub async fn check_all(&self) -> AggregatedHealth {
        AggregatedHealth::new(
            env!("CARGO_PKG_VERSION").to_string(),
            self.start_time.elapsed().as_secs(),
            vec![self.check_database().await],
        )
    }

    pub async fn check_database(&self) -> DependencyHealth {
        let Some(pool) = &self.pool else {
            return DependencyHealth::healthy("memory_store", 0.0);
        };

        let start = Instant::now();
        match tokio::time::timeout(Duration::from_secs(5), sqlx::query("SELECT 1").fetch_one(pool)).await {
            Ok(Ok(_)) => DependencyHealth::healthy("database", start.elapsed().as_secs_f64() * 1000.0),
            Ok(Err(e)) => DependencyHealth::unhealthy("database", format!("Query failed: {}", e)),
            Err(_) => DependencyHealth::unhealthy("database", "Connection timeout"),
        }
    }
}
