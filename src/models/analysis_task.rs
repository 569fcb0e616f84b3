use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::RecordId;

use crate::db::connection::LgDb;
use crate::LoregraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisTask {
    pub id: Option<RecordId>,
    pub novel: RecordId,
    pub chapter_start: i64,
    pub chapter_end: i64,
    #[serde(default)]
    pub chapters_done: i64,
    pub status: TaskStatus,
    #[serde(default)]
    pub force: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisTask {
    pub fn new(novel: RecordId, chapter_start: i64, chapter_end: i64, force: bool) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            novel,
            chapter_start,
            chapter_end,
            chapters_done: 0,
            status: TaskStatus::Pending,
            force,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

pub async fn create(db: &LgDb, task: AnalysisTask) -> Result<AnalysisTask, LoregraphError> {
    let created: Option<AnalysisTask> = db.create("analysis_tasks").content(task).await?;
    created.ok_or_else(|| LoregraphError::Database("insert returned no rows".into()))
}

pub async fn get(db: &LgDb, id: &str) -> Result<AnalysisTask, LoregraphError> {
    let task: Option<AnalysisTask> = db.select(("analysis_tasks", id)).await?;
    task.ok_or_else(|| LoregraphError::TaskNotFound(id.to_string()))
}

pub async fn running_for_novel(
    db: &LgDb,
    novel: &RecordId,
) -> Result<Option<AnalysisTask>, LoregraphError> {
    let mut resp = db
        .query("SELECT * FROM analysis_tasks WHERE novel = $novel AND status = 'running' LIMIT 1")
        .bind(("novel", novel.clone()))
        .await?;
    let tasks: Vec<AnalysisTask> = resp.take(0)?;
    Ok(tasks.into_iter().next())
}

pub async fn set_status(
    db: &LgDb,
    id: &RecordId,
    status: TaskStatus,
    error: Option<String>,
) -> Result<(), LoregraphError> {
    db.query("UPDATE $id SET status = $status, error = $error, updated_at = time::now()")
        .bind(("id", id.clone()))
        .bind(("status", status))
        .bind(("error", error))
        .await?;
    Ok(())
}

pub async fn set_progress(db: &LgDb, id: &RecordId, chapters_done: i64) -> Result<(), LoregraphError> {
    db.query("UPDATE $id SET chapters_done = $n, updated_at = time::now()")
        .bind(("id", id.clone()))
        .bind(("n", chapters_done))
        .await?;
    Ok(())
}
