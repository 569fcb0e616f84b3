//! Orchestrates one analysis loop per novel: walks a chapter range,
//! building context, extracting facts, validating them, feeding the world
//! structure agent, and persisting everything, while staying responsive to
//! pause/cancel signals and never running more than a handful of LLM calls
//! against cloud backends at once.

use std::sync::Arc;

use surrealdb::RecordId;
use tokio::sync::Semaphore;

use crate::db::connection::LgDb;
use crate::llm::LlmBackend;
use crate::models::analysis_task::{self, AnalysisTask, TaskStatus};
use crate::models::chapter::{self, AnalysisStatus};
use crate::models::chapter_fact::{self, ChapterFact};
use crate::models::entity_dict::{self, EntityDictEntry};
use crate::models::user_state;
use crate::models::world_structure::{self, ParentVote, WorldStructure as WorldStructureNode};
use crate::pipeline::context_builder::ContextBuilder;
use crate::pipeline::extractor::ChapterFactExtractor;
use crate::session::{ProgressEnvelope, TaskSignalManager};
use crate::world::{Genre, HierarchyConsolidator, HierarchyInput, WorldStructureAgent};
use crate::LoregraphError;

/// Maximum simultaneous in-flight completions against cloud LLM backends.
/// Local backends are not rate-limited since they're not shared infrastructure.
pub const CLOUD_CONCURRENCY: usize = 3;

/// Vote weight given to a user-pinned override, high enough that it always
/// wins over votes accumulated from fact extraction.
const OVERRIDE_VOTE_WEIGHT: i64 = 1000;

pub struct AnalysisService {
    db: Arc<LgDb>,
    llm: Arc<dyn LlmBackend>,
    llm_is_cloud: bool,
    signals: Arc<TaskSignalManager>,
    cloud_semaphore: Arc<Semaphore>,
}

impl AnalysisService {
    pub fn new(db: Arc<LgDb>, llm: Arc<dyn LlmBackend>, llm_is_cloud: bool, signals: Arc<TaskSignalManager>) -> Self {
        Self {
            db,
            llm,
            llm_is_cloud,
            signals,
            cloud_semaphore: Arc::new(Semaphore::new(CLOUD_CONCURRENCY)),
        }
    }

    /// Creates a task row and spawns its loop as an independent tokio task.
    /// Returns the task's record id immediately; the loop runs in the
    /// background and reports progress via [`TaskSignalManager::subscribe`].
    pub async fn start_task(
        &self,
        novel: RecordId,
        chapter_start: i64,
        chapter_end: i64,
        force: bool,
    ) -> Result<RecordId, LoregraphError> {
        if let Some(running) = analysis_task::running_for_novel(&self.db, &novel).await? {
            return Err(LoregraphError::TaskConflict(format!(
                "novel already has a running task: {:?}",
                running.id
            )));
        }

        let task = AnalysisTask::new(novel.clone(), chapter_start, chapter_end, force);
        let created = analysis_task::create(&self.db, task).await?;
        let task_id = created.id.clone().expect("created task always has an id");

        let db = self.db.clone();
        let llm = self.llm.clone();
        let signals = self.signals.clone();
        let semaphore = self.cloud_semaphore.clone();
        let llm_is_cloud = self.llm_is_cloud;
        let loop_task_id = task_id.clone();

        tokio::spawn(async move {
            let service = AnalysisService {
                db,
                llm,
                llm_is_cloud,
                signals,
                cloud_semaphore: semaphore,
            };
            service.run_loop(loop_task_id, novel, chapter_start, chapter_end, force).await;
        });

        Ok(task_id)
    }

    pub async fn pause(&self, task_id: &RecordId) {
        self.signals.signal(&task_id.to_string(), TaskStatus::Paused).await;
    }

    pub async fn cancel(&self, task_id: &RecordId) {
        self.signals.signal(&task_id.to_string(), TaskStatus::Cancelled).await;
    }

    async fn run_loop(
        &self,
        task_id: RecordId,
        novel: RecordId,
        chapter_start: i64,
        chapter_end: i64,
        force: bool,
    ) {
        let key = task_id.to_string();
        if !self.signals.try_start_loop(&key).await {
            tracing::warn!(task = %key, "loop already active for this task, refusing to start another");
            return;
        }

        if let Err(e) = analysis_task::set_status(&self.db, &task_id, TaskStatus::Running, None).await {
            tracing::error!(error = %e, "failed to mark task running");
        }

        let outcome = self.drive_chapters(&task_id, &novel, chapter_start, chapter_end, force).await;

        match outcome {
            Ok(LoopExit::Completed) => {
                let _ = analysis_task::set_status(&self.db, &task_id, TaskStatus::Completed, None).await;
            }
            Ok(LoopExit::Paused) => {
                let _ = analysis_task::set_status(&self.db, &task_id, TaskStatus::Paused, None).await;
            }
            Ok(LoopExit::Cancelled) => {
                let _ = analysis_task::set_status(&self.db, &task_id, TaskStatus::Cancelled, None).await;
            }
            Err(e) => {
                tracing::error!(error = %e, task = %key, "analysis loop failed");
                let _ = analysis_task::set_status(&self.db, &task_id, TaskStatus::Failed, Some(e.to_string())).await;
            }
        }

        self.signals.clear_signal(&key).await;
        self.signals.end_loop(&key).await;
    }

    async fn drive_chapters(
        &self,
        task_id: &RecordId,
        novel: &RecordId,
        chapter_start: i64,
        chapter_end: i64,
        force: bool,
    ) -> Result<LoopExit, LoregraphError> {
        let key = task_id.to_string();

        // Rebuilt fresh for each drive_chapters call, so genre detection
        // restarts from chapter 1 of the driven range rather than being
        // persisted across runs; see DESIGN.md.
        let mut world_agent = WorldStructureAgent::new();

        for chapter_num in chapter_start..=chapter_end {
            match self.signals.desired_status(&key).await {
                Some(TaskStatus::Paused) => return Ok(LoopExit::Paused),
                Some(TaskStatus::Cancelled) => return Ok(LoopExit::Cancelled),
                _ => {}
            }

            let Some(chapter) = chapter::get_by_num(&self.db, novel, chapter_num).await? else {
                tracing::debug!(chapter_num, "chapter not found, stopping at end of available range");
                return Ok(LoopExit::Completed);
            };

            if chapter.excluded || (!force && matches!(chapter.analysis_status, AnalysisStatus::Completed)) {
                self.report_progress(&key, chapter_num, TaskStatus::Running);
                continue;
            }

            self.process_one_chapter(novel, &chapter, &mut world_agent).await?;

            analysis_task::set_progress(&self.db, task_id, chapter_num - chapter_start + 1).await?;
            self.report_progress(&key, chapter_num, TaskStatus::Running);
        }

        Ok(LoopExit::Completed)
    }

    async fn process_one_chapter(
        &self,
        novel: &RecordId,
        chapter: &crate::models::chapter::Chapter,
        world_agent: &mut WorldStructureAgent,
    ) -> Result<(), LoregraphError> {
        chapter::set_status(&self.db, &chapter.id.clone().unwrap(), AnalysisStatus::Processing).await?;

        let prior_facts = chapter_fact::list_for_novel(&self.db, novel).await?;
        let known_entities: Vec<EntityDictEntry> = entity_dict::list_for_novel(&self.db, novel).await?;

        let context_summary = ContextBuilder::new().build(chapter.chapter_num, &prior_facts);

        let fact = self.extract_fact(novel, chapter, &context_summary, &known_entities).await?;
        let persisted = chapter_fact::upsert(&self.db, fact).await?;

        let signals = world_agent
            .process_chapter(chapter.chapter_num, &chapter.full_text, &persisted, self.llm.as_ref())
            .await;
        for signal in &signals {
            tracing::debug!(signal_type = %signal.signal_type, "world structure signal");
        }

        if let Err(e) = self.update_world_structure(novel, &persisted, world_agent.state()).await {
            tracing::warn!(error = %e, "world structure agent failed, chapter fact still persisted");
        }

        chapter::set_status(&self.db, &chapter.id.clone().unwrap(), AnalysisStatus::Completed).await?;
        Ok(())
    }

    async fn extract_fact(
        &self,
        novel: &RecordId,
        chapter: &crate::models::chapter::Chapter,
        context_summary: &str,
        known_entities: &[EntityDictEntry],
    ) -> Result<ChapterFact, LoregraphError> {
        let _permit = if self.llm_is_cloud {
            Some(self.cloud_semaphore.acquire().await.expect("semaphore never closed"))
        } else {
            None
        };

        let extractor = ChapterFactExtractor::new(self.llm.as_ref());
        extractor
            .extract(
                novel.clone(),
                chapter.id.clone().unwrap(),
                chapter.chapter_num,
                &chapter.full_text,
                context_summary,
                known_entities,
            )
            .await
    }

    /// Feeds the chapter's location facts into the hierarchy consolidator
    /// and persists the resulting tree, using the running world agent's
    /// genre hint and heuristic layer/icon assignments to fill in the
    /// fields the consolidator itself doesn't decide.
    async fn update_world_structure(
        &self,
        novel: &RecordId,
        fact: &ChapterFact,
        world_state: &crate::world::world_structure_agent::WorldStructure,
    ) -> Result<(), LoregraphError> {
        if fact.locations.is_empty() {
            return Ok(());
        }

        let genre = match world_state.novel_genre_hint {
            Genre::Fantasy => "fantasy",
            Genre::Urban => "urban",
            Genre::Wuxia | Genre::Historical | Genre::Unknown => "other",
        };

        let existing = world_structure::list_for_novel(&self.db, novel).await?;
        let mut locations: std::collections::HashSet<String> =
            existing.iter().map(|n| n.name.clone()).collect();
        let mut votes: std::collections::HashMap<String, Vec<ParentVote>> = existing
            .iter()
            .map(|n| (n.name.clone(), n.votes.clone()))
            .collect();

        for loc in &fact.locations {
            locations.insert(loc.name.clone());
            if let Some(parent) = &loc.parent {
                locations.insert(parent.clone());
                votes.entry(loc.name.clone()).or_default().push(ParentVote {
                    parent: parent.clone(),
                    weight: 1,
                    reason: "fact_extraction".into(),
                });
            }
        }

        let mut saved_parents: std::collections::HashMap<String, String> = existing
            .iter()
            .filter_map(|n| n.parent.clone().map(|p| (n.name.clone(), p)))
            .collect();

        let state = user_state::get_or_create(&self.db, novel).await?;
        for (name, parent) in &state.saved_parents {
            saved_parents.entry(name.clone()).or_insert_with(|| parent.clone());
        }

        for ov in world_structure::list_overrides(&self.db, novel).await? {
            if let Some(parent) = &ov.parent {
                locations.insert(ov.name.clone());
                locations.insert(parent.clone());
                votes.entry(ov.name.clone()).or_default().push(ParentVote {
                    parent: parent.clone(),
                    weight: OVERRIDE_VOTE_WEIGHT,
                    reason: "user_override".into(),
                });
                saved_parents.insert(ov.name.clone(), parent.clone());
            }
        }

        let input = HierarchyInput {
            locations,
            votes,
            genre: genre.into(),
            is_foreign: false,
            saved_parents,
        };

        let output = HierarchyConsolidator::new().consolidate(input);
        user_state::save_parents(&self.db, novel, &output.parents).await?;

        let nodes: Vec<WorldStructureNode> = output
            .parents
            .keys()
            .chain(output.tiers.keys())
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .map(|name| {
                let mut node = WorldStructureNode::new(
                    novel.clone(),
                    name.clone(),
                    output
                        .tiers
                        .get(name)
                        .map(|t| t.as_str().to_string())
                        .or_else(|| world_state.location_tier_map.get(name).cloned())
                        .unwrap_or_else(|| "site".to_string()),
                );
                node.parent = output.parents.get(name).cloned();
                node.layer = world_state.location_layer_map.get(name).cloned();
                node.icon = world_state.location_icon_map.get(name).cloned();
                node
            })
            .collect();

        world_structure::replace_all(&self.db, novel, nodes).await
    }

    fn report_progress(&self, task_id: &str, chapter_num: i64, status: TaskStatus) {
        self.signals.broadcast_progress(ProgressEnvelope {
            task_id: task_id.to_string(),
            chapter_num,
            status,
        });
    }
}

enum LoopExit {
    Completed,
    Paused,
    Cancelled,
}
