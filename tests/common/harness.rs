//! Test harness for database lifecycle management.
//!
//! Provides isolated database instances per test using tempfile.

use std::sync::Arc;
use tempfile::TempDir;

use loregraph::db::connection::{init_db, DbConfig, LgDb};
use loregraph::db::schema::apply_schema;

/// Test harness that manages database lifecycle.
///
/// Each TestHarness creates an isolated database in a temporary directory.
/// The database is automatically cleaned up when the harness is dropped.
pub struct TestHarness {
    pub db: Arc<LgDb>,
    pub temp_dir: TempDir,
}

impl TestHarness {
    /// Create a new test harness with isolated database.
    ///
    /// Panics if database initialization fails (appropriate for tests).
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory for test database");

        let db_path = temp_dir.path().join("test.db");
        let config = DbConfig::Embedded {
            path: Some(db_path.to_string_lossy().into_owned()),
        };
        let db = init_db(&config, temp_dir.path())
            .await
            .expect("failed to initialize test database");

        apply_schema(&db).await.expect("failed to apply schema to test database");

        Self {
            db: Arc::new(db),
            temp_dir,
        }
    }

    pub fn temp_path(&self) -> &std::path::Path {
        self.temp_dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_harness_creates_database() {
        let harness = TestHarness::new().await;
        assert!(Arc::strong_count(&harness.db) == 1);
    }
}
