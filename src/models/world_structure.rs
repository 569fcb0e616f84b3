use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::RecordId;

use crate::db::connection::LgDb;
use crate::LoregraphError;

/// One vote toward a location's parent, cast by a pipeline stage with a
/// weight and a reason so later stages (and a human reviewer) can see why
/// an edge was proposed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParentVote {
    pub parent: String,
    pub weight: i64,
    pub reason: String,
}

/// A node in the resolved spatial hierarchy for a novel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldStructure {
    pub id: Option<RecordId>,
    pub novel: RecordId,
    pub name: String,
    pub parent: Option<String>,
    pub tier: String,
    pub layer: Option<String>,
    pub icon: Option<String>,
    #[serde(default)]
    pub votes: Vec<ParentVote>,
    pub updated_at: DateTime<Utc>,
}

impl WorldStructure {
    pub fn new(novel: RecordId, name: impl Into<String>, tier: impl Into<String>) -> Self {
        Self {
            id: None,
            novel,
            name: name.into(),
            parent: None,
            tier: tier.into(),
            layer: None,
            icon: None,
            votes: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

/// A user-authored correction that pins a location's parent/tier/layer/region,
/// taking precedence over anything the pipeline proposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldStructureOverride {
    pub id: Option<RecordId>,
    pub novel: RecordId,
    pub name: String,
    pub parent: Option<String>,
    pub tier: Option<String>,
    pub layer: Option<String>,
    pub region: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub async fn list_for_novel(db: &LgDb, novel: &RecordId) -> Result<Vec<WorldStructure>, LoregraphError> {
    let mut resp = db
        .query("SELECT * FROM world_structures WHERE novel = $novel")
        .bind(("novel", novel.clone()))
        .await?;
    Ok(resp.take(0)?)
}

pub async fn replace_all(
    db: &LgDb,
    novel: &RecordId,
    nodes: Vec<WorldStructure>,
) -> Result<(), LoregraphError> {
    db.query("DELETE world_structures WHERE novel = $novel")
        .bind(("novel", novel.clone()))
        .await?;
    for node in nodes {
        let _: Option<WorldStructure> = db.create("world_structures").content(node).await?;
    }
    Ok(())
}

pub async fn list_overrides(
    db: &LgDb,
    novel: &RecordId,
) -> Result<Vec<WorldStructureOverride>, LoregraphError> {
    let mut resp = db
        .query("SELECT * FROM world_structure_overrides WHERE novel = $novel")
        .bind(("novel", novel.clone()))
        .await?;
    Ok(resp.take(0)?)
}
