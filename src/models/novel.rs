use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::RecordId;

use crate::db::connection::LgDb;
use crate::LoregraphError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Novel {
    pub id: Option<RecordId>,
    pub title: String,
    pub genre: Option<String>,
    #[serde(default)]
    pub chapter_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Novel {
    pub fn new(title: impl Into<String>, genre: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            title: title.into(),
            genre,
            chapter_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

pub async fn create(db: &LgDb, novel: Novel) -> Result<Novel, LoregraphError> {
    let created: Option<Novel> = db.create("novels").content(novel).await?;
    created.ok_or_else(|| LoregraphError::Database("insert returned no rows".into()))
}

pub async fn get(db: &LgDb, id: &str) -> Result<Novel, LoregraphError> {
    let novel: Option<Novel> = db.select(("novels", id)).await?;
    novel.ok_or_else(|| LoregraphError::NotFound {
        entity_type: "novel".into(),
        id: id.into(),
    })
}

pub async fn list(db: &LgDb) -> Result<Vec<Novel>, LoregraphError> {
    Ok(db.select("novels").await?)
}

pub async fn set_chapter_count(db: &LgDb, id: &RecordId, count: i64) -> Result<(), LoregraphError> {
    db.query("UPDATE $id SET chapter_count = $count, updated_at = time::now()")
        .bind(("id", id.clone()))
        .bind(("count", count))
        .await?;
    Ok(())
}
