//! Per-novel state that survives across analysis runs: whether the entity
//! pre-scan has been run, and the hierarchy's last-resolved parents, kept
//! around so a later consolidator pass has somewhere to fall back to
//! instead of re-deriving an orphan's placement from scratch every time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::RecordId;

use crate::db::connection::LgDb;
use crate::LoregraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrescanStatus {
    Pending,
    Running,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserState {
    pub id: Option<RecordId>,
    pub novel: RecordId,
    #[serde(default = "default_prescan_status")]
    pub prescan_status: PrescanStatus,
    #[serde(default)]
    pub saved_parents: HashMap<String, String>,
    pub updated_at: DateTime<Utc>,
}

fn default_prescan_status() -> PrescanStatus {
    PrescanStatus::Pending
}

pub async fn get_or_create(db: &LgDb, novel: &RecordId) -> Result<UserState, LoregraphError> {
    let mut resp = db
        .query("SELECT * FROM user_state WHERE novel = $novel LIMIT 1")
        .bind(("novel", novel.clone()))
        .await?;
    let existing: Vec<UserState> = resp.take(0)?;
    if let Some(state) = existing.into_iter().next() {
        return Ok(state);
    }

    let fresh = UserState {
        id: None,
        novel: novel.clone(),
        prescan_status: PrescanStatus::Pending,
        saved_parents: HashMap::new(),
        updated_at: Utc::now(),
    };
    let created: Option<UserState> = db.create("user_state").content(fresh).await?;
    created.ok_or_else(|| LoregraphError::Database("insert returned no rows".into()))
}

pub async fn set_prescan_status(
    db: &LgDb,
    novel: &RecordId,
    status: PrescanStatus,
) -> Result<(), LoregraphError> {
    get_or_create(db, novel).await?;
    db.query("UPDATE user_state SET prescan_status = $status, updated_at = time::now() WHERE novel = $novel")
        .bind(("novel", novel.clone()))
        .bind(("status", status))
        .await?;
    Ok(())
}

pub async fn save_parents(
    db: &LgDb,
    novel: &RecordId,
    parents: &HashMap<String, String>,
) -> Result<(), LoregraphError> {
    get_or_create(db, novel).await?;
    db.query("UPDATE user_state SET saved_parents = $parents, updated_at = time::now() WHERE novel = $novel")
        .bind(("novel", novel.clone()))
        .bind(("parents", parents.clone()))
        .await?;
    Ok(())
}
