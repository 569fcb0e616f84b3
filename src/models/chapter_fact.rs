use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::RecordId;

/// A character mentioned or developed in a chapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CharacterFact {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub abilities: Vec<String>,
}

/// A relationship observed between two named people.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipFact {
    pub person_a: String,
    pub person_b: String,
    pub relation_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A location mentioned in a chapter, with an optional parent hint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationFact {
    pub name: String,
    #[serde(default)]
    pub loc_type: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
}

/// Valid item-event actions. Anything else is normalized to `Appeared` by the validator.
pub const VALID_ITEM_ACTIONS: &[&str] = &["出现", "获得", "使用", "赠予", "消耗", "丢失", "损毁"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemEventFact {
    pub name: String,
    pub action: String,
    #[serde(default)]
    pub holder: Option<String>,
}

/// Valid organization-event actions. Anything else is normalized to `Joined` by the validator.
pub const VALID_ORG_ACTIONS: &[&str] = &["加入", "离开", "晋升", "阵亡", "叛出", "逐出"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrgEventFact {
    pub name: String,
    pub action: String,
}

pub const VALID_EVENT_TYPES: &[&str] = &["战斗", "成长", "社交", "旅行", "其他"];
pub const VALID_IMPORTANCE: &[&str] = &["high", "medium", "low"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventFact {
    pub summary: String,
    pub event_type: String,
    pub importance: String,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConceptFact {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// The full set of facts extracted from a single chapter, after validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterFact {
    pub id: Option<RecordId>,
    pub novel: RecordId,
    pub chapter: RecordId,
    pub chapter_id: i64,
    #[serde(default)]
    pub characters: Vec<CharacterFact>,
    #[serde(default)]
    pub relationships: Vec<RelationshipFact>,
    #[serde(default)]
    pub locations: Vec<LocationFact>,
    #[serde(default)]
    pub items: Vec<ItemEventFact>,
    #[serde(default)]
    pub organizations: Vec<OrgEventFact>,
    #[serde(default)]
    pub events: Vec<EventFact>,
    #[serde(default)]
    pub concepts: Vec<ConceptFact>,
    /// Free-text sentences the extractor flagged as explicit world-building
    /// statements ("天下分九州" and the like), fed straight to the world
    /// structure agent's signal scanner without further validation.
    #[serde(default)]
    pub world_declarations: Vec<String>,
    pub elapsed_ms: Option<i64>,
    pub llm_model: Option<String>,
    pub created_at: DateTime<Utc>,
}

use crate::db::connection::LgDb;
use crate::LoregraphError;

impl ChapterFact {
    pub fn empty(novel: RecordId, chapter: RecordId, chapter_id: i64) -> Self {
        Self {
            id: None,
            novel,
            chapter,
            chapter_id,
            characters: Vec::new(),
            relationships: Vec::new(),
            locations: Vec::new(),
            items: Vec::new(),
            organizations: Vec::new(),
            events: Vec::new(),
            concepts: Vec::new(),
            world_declarations: Vec::new(),
            elapsed_ms: None,
            llm_model: None,
            created_at: Utc::now(),
        }
    }
}

pub async fn upsert(db: &LgDb, fact: ChapterFact) -> Result<ChapterFact, LoregraphError> {
    let mut resp = db
        .query(
            "UPSERT chapter_facts SET novel = $novel, chapter = $chapter, chapter_id = $chapter_id, \
             characters = $characters, relationships = $relationships, locations = $locations, \
             items = $items, organizations = $organizations, events = $events, concepts = $concepts, \
             world_declarations = $world_declarations, \
             elapsed_ms = $elapsed_ms, llm_model = $llm_model \
             WHERE novel = $novel AND chapter_id = $chapter_id",
        )
        .bind(("novel", fact.novel.clone()))
        .bind(("chapter", fact.chapter.clone()))
        .bind(("chapter_id", fact.chapter_id))
        .bind(("characters", fact.characters.clone()))
        .bind(("relationships", fact.relationships.clone()))
        .bind(("locations", fact.locations.clone()))
        .bind(("items", fact.items.clone()))
        .bind(("organizations", fact.organizations.clone()))
        .bind(("events", fact.events.clone()))
        .bind(("concepts", fact.concepts.clone()))
        .bind(("world_declarations", fact.world_declarations.clone()))
        .bind(("elapsed_ms", fact.elapsed_ms))
        .bind(("llm_model", fact.llm_model.clone()))
        .await?;
    let rows: Vec<ChapterFact> = resp.take(0)?;
    rows.into_iter()
        .next()
        .ok_or_else(|| LoregraphError::Database("upsert returned no rows".into()))
}

pub async fn list_for_novel(db: &LgDb, novel: &RecordId) -> Result<Vec<ChapterFact>, LoregraphError> {
    let mut resp = db
        .query("SELECT * FROM chapter_facts WHERE novel = $novel ORDER BY chapter_id ASC")
        .bind(("novel", novel.clone()))
        .await?;
    Ok(resp.take(0)?)
}
