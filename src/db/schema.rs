use crate::db::connection::LgDb;
use crate::LoregraphError;

const SCHEMA_001: &str = include_str!("migrations/001_novels.surql");
const SCHEMA_002: &str = include_str!("migrations/002_chapter_facts.surql");
const SCHEMA_003: &str = include_str!("migrations/003_world_structure.surql");
const SCHEMA_004: &str = include_str!("migrations/004_entity_dictionary.surql");

/// Apply all schema migrations in order. Idempotent: `DEFINE ... SCHEMALESS`
/// and `DEFINE FIELD`/`DEFINE INDEX` are safe to re-run against an existing database.
pub async fn apply_schema(db: &LgDb) -> Result<(), LoregraphError> {
    for (name, migration) in [
        ("001_novels", SCHEMA_001),
        ("002_chapter_facts", SCHEMA_002),
        ("003_world_structure", SCHEMA_003),
        ("004_entity_dictionary", SCHEMA_004),
    ] {
        db.query(migration).await.map_err(|e| {
            tracing::error!("migration {name} failed: {e}");
            LoregraphError::Database(format!("migration {name} failed: {e}"))
        })?;
        tracing::debug!("applied migration {name}");
    }
    Ok(())
}
