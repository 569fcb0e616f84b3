use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::RecordId;

use crate::db::connection::LgDb;
use crate::LoregraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Location,
    Organization,
    Item,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// A candidate named entity surfaced by the pre-scan pass, pending review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDictEntry {
    pub id: Option<RecordId>,
    pub novel: RecordId,
    pub name: String,
    pub entity_type: EntityType,
    pub confidence: Confidence,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub frequency: i64,
    pub sample_context: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
    pub created_at: DateTime<Utc>,
}

fn default_status() -> String {
    "pending".to_string()
}

pub async fn insert_batch(
    db: &LgDb,
    novel: &RecordId,
    entries: Vec<EntityDictEntry>,
) -> Result<(), LoregraphError> {
    for entry in entries {
        let _: Option<EntityDictEntry> = db.create("entity_dictionary").content(entry).await?;
    }
    tracing::debug!(novel = %novel, "inserted entity dictionary batch");
    Ok(())
}

pub async fn delete_all(db: &LgDb, novel: &RecordId) -> Result<(), LoregraphError> {
    db.query("DELETE entity_dictionary WHERE novel = $novel")
        .bind(("novel", novel.clone()))
        .await?;
    Ok(())
}

pub async fn list_for_novel(
    db: &LgDb,
    novel: &RecordId,
) -> Result<Vec<EntityDictEntry>, LoregraphError> {
    let mut resp = db
        .query("SELECT * FROM entity_dictionary WHERE novel = $novel ORDER BY frequency DESC")
        .bind(("novel", novel.clone()))
        .await?;
    Ok(resp.take(0)?)
}
