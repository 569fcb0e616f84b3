use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::RecordId;

use crate::db::connection::LgDb;
use crate::LoregraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: Option<RecordId>,
    pub novel: RecordId,
    pub chapter_num: i64,
    pub title: Option<String>,
    pub full_text: String,
    #[serde(default)]
    pub excluded: bool,
    #[serde(default = "default_status")]
    pub analysis_status: AnalysisStatus,
    pub created_at: DateTime<Utc>,
}

fn default_status() -> AnalysisStatus {
    AnalysisStatus::Pending
}

impl Chapter {
    pub fn new(novel: RecordId, chapter_num: i64, title: Option<String>, full_text: String) -> Self {
        Self {
            id: None,
            novel,
            chapter_num,
            title,
            full_text,
            excluded: false,
            analysis_status: AnalysisStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

pub async fn create(db: &LgDb, chapter: Chapter) -> Result<Chapter, LoregraphError> {
    let created: Option<Chapter> = db.create("chapters").content(chapter).await?;
    created.ok_or_else(|| LoregraphError::Database("insert returned no rows".into()))
}

pub async fn get_by_num(
    db: &LgDb,
    novel: &RecordId,
    chapter_num: i64,
) -> Result<Option<Chapter>, LoregraphError> {
    let mut resp = db
        .query("SELECT * FROM chapters WHERE novel = $novel AND chapter_num = $num LIMIT 1")
        .bind(("novel", novel.clone()))
        .bind(("num", chapter_num))
        .await?;
    let chapters: Vec<Chapter> = resp.take(0)?;
    Ok(chapters.into_iter().next())
}

pub async fn list_range(
    db: &LgDb,
    novel: &RecordId,
    start: i64,
    end: i64,
) -> Result<Vec<Chapter>, LoregraphError> {
    let mut resp = db
        .query(
            "SELECT * FROM chapters WHERE novel = $novel AND chapter_num >= $start \
             AND chapter_num <= $end ORDER BY chapter_num ASC",
        )
        .bind(("novel", novel.clone()))
        .bind(("start", start))
        .bind(("end", end))
        .await?;
    Ok(resp.take(0)?)
}

pub async fn set_status(
    db: &LgDb,
    chapter_id: &RecordId,
    status: AnalysisStatus,
) -> Result<(), LoregraphError> {
    db.query("UPDATE $id SET analysis_status = $status")
        .bind(("id", chapter_id.clone()))
        .bind(("status", status))
        .await?;
    Ok(())
}
