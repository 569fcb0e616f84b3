//! Drives a single chapter through the LLM to produce a validated
//! [`ChapterFact`]. This is the narrow seam between the pipeline and the
//! LLM backend: everything upstream (context, entity dictionary) is plain
//! data, everything downstream (validation) is pure functions.

use std::time::Instant;

use surrealdb::RecordId;

use crate::llm::{complete_json, CompletionOptions, LlmBackend};
use crate::models::chapter_fact::ChapterFact;
use crate::models::entity_dict::EntityDictEntry;
use crate::pipeline::validator::FactValidator;
use crate::LoregraphError;

const SYSTEM_PROMPT: &str = "\
你是一个小说知识图谱抽取助手。仔细阅读给定章节正文，抽取其中出现的人物、人物关系、\
地点、物品事件、组织事件、重要事件和概念，严格以 JSON 格式输出，不要添加任何解释文字。";

/// Chapters longer than this (in chars) are split into segments and
/// extracted independently, then merged, rather than sent in one call.
const MAX_CHAPTER_LEN: usize = 6000;
/// Truncation length for the one-shot retry after a transient timeout.
const RETRY_LEN: usize = 2000;

pub struct ChapterFactExtractor<'a> {
    backend: &'a dyn LlmBackend,
    validator: FactValidator,
}

impl<'a> ChapterFactExtractor<'a> {
    pub fn new(backend: &'a dyn LlmBackend) -> Self {
        Self {
            backend,
            validator: FactValidator::new(),
        }
    }

    pub async fn extract(
        &self,
        novel: RecordId,
        chapter: RecordId,
        chapter_id: i64,
        chapter_text: &str,
        context_summary: &str,
        known_entities: &[EntityDictEntry],
    ) -> Result<ChapterFact, LoregraphError> {
        let start = Instant::now();

        let mut fact = if chapter_text.chars().count() > MAX_CHAPTER_LEN {
            self.extract_segmented(
                novel,
                chapter,
                chapter_id,
                chapter_text,
                context_summary,
                known_entities,
            )
            .await?
        } else {
            self.call_once(
                novel,
                chapter,
                chapter_id,
                chapter_text,
                context_summary,
                known_entities,
            )
            .await?
        };

        self.validator.validate(&mut fact);

        fact.elapsed_ms = Some(start.elapsed().as_millis() as i64);
        Ok(fact)
    }

    /// One LLM call for a single (possibly already-segmented) span of
    /// chapter text. A transient timeout gets one retry with the text
    /// truncated to `RETRY_LEN`; a second failure propagates.
    async fn call_once(
        &self,
        novel: RecordId,
        chapter: RecordId,
        chapter_id: i64,
        text: &str,
        context_summary: &str,
        known_entities: &[EntityDictEntry],
    ) -> Result<ChapterFact, LoregraphError> {
        let options = CompletionOptions {
            temperature: Some(0.1),
            max_tokens: Some(4096),
            json_mode: true,
        };

        let prompt = build_prompt(text, context_summary, known_entities);
        let value = match complete_json(self.backend, SYSTEM_PROMPT, &prompt, &options).await {
            Ok(v) => v,
            Err(LoregraphError::LlmTimeout(_)) => {
                let truncated: String = text.chars().take(RETRY_LEN).collect();
                let retry_prompt = build_prompt(&truncated, context_summary, known_entities);
                complete_json(self.backend, SYSTEM_PROMPT, &retry_prompt, &options).await?
            }
            Err(e) => return Err(e),
        };

        Ok(parse_fact(novel, chapter, chapter_id, value))
    }

    /// Splits an over-long chapter into char-bounded segments, extracts each
    /// independently, and unions their lists into one fact. The validator's
    /// dedup pass (run by the caller, `extract`) cleans up cross-segment
    /// repeats. Fails only if every segment failed.
    async fn extract_segmented(
        &self,
        novel: RecordId,
        chapter: RecordId,
        chapter_id: i64,
        chapter_text: &str,
        context_summary: &str,
        known_entities: &[EntityDictEntry],
    ) -> Result<ChapterFact, LoregraphError> {
        let mut merged = ChapterFact::empty(novel.clone(), chapter.clone(), chapter_id);
        let mut any_ok = false;
        let mut last_err = None;

        for segment in segment_chapter(chapter_text, MAX_CHAPTER_LEN) {
            match self
                .call_once(novel.clone(), chapter.clone(), chapter_id, &segment, context_summary, known_entities)
                .await
            {
                Ok(part) => {
                    any_ok = true;
                    merged.characters.extend(part.characters);
                    merged.relationships.extend(part.relationships);
                    merged.locations.extend(part.locations);
                    merged.items.extend(part.items);
                    merged.organizations.extend(part.organizations);
                    merged.events.extend(part.events);
                    merged.concepts.extend(part.concepts);
                    merged.world_declarations.extend(part.world_declarations);
                }
                Err(e) => last_err = Some(e),
            }
        }

        if !any_ok {
            return Err(last_err.unwrap_or_else(|| LoregraphError::Extraction("all chapter segments failed".into())));
        }
        Ok(merged)
    }
}

fn parse_fact(novel: RecordId, chapter: RecordId, chapter_id: i64, value: serde_json::Value) -> ChapterFact {
    let mut fact = ChapterFact::empty(novel, chapter, chapter_id);
    fact.characters =
        serde_json::from_value(value.get("characters").cloned().unwrap_or_default()).unwrap_or_default();
    fact.relationships =
        serde_json::from_value(value.get("relationships").cloned().unwrap_or_default()).unwrap_or_default();
    fact.locations =
        serde_json::from_value(value.get("locations").cloned().unwrap_or_default()).unwrap_or_default();
    fact.items = serde_json::from_value(value.get("items").cloned().unwrap_or_default()).unwrap_or_default();
    fact.organizations =
        serde_json::from_value(value.get("organizations").cloned().unwrap_or_default()).unwrap_or_default();
    fact.events = serde_json::from_value(value.get("events").cloned().unwrap_or_default()).unwrap_or_default();
    fact.concepts = serde_json::from_value(value.get("concepts").cloned().unwrap_or_default()).unwrap_or_default();
    fact.world_declarations =
        serde_json::from_value(value.get("world_declarations").cloned().unwrap_or_default()).unwrap_or_default();
    fact
}

/// Splits `text` into char-bounded chunks of at most `max_len` chars each.
fn segment_chapter(text: &str, max_len: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_len {
        return vec![text.to_string()];
    }
    chars.chunks(max_len).map(|c| c.iter().collect()).collect()
}

fn build_prompt(chapter_text: &str, context_summary: &str, known_entities: &[EntityDictEntry]) -> String {
    let mut parts = Vec::new();
    if !context_summary.is_empty() {
        parts.push(format!("## 已知背景\n{context_summary}"));
    }
    if !known_entities.is_empty() {
        let names: Vec<&str> = known_entities.iter().map(|e| e.name.as_str()).take(200).collect();
        parts.push(format!("## 已知实体候选\n{}", names.join("、")));
    }
    parts.push(format!(
        "## 章节正文\n{chapter_text}\n\n\
         请输出 JSON，包含以下字段：characters, relationships, locations, items, \
         organizations, events, concepts, world_declarations。"
    ));
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Completion;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn segment_chapter_splits_over_long_text_into_bounded_chunks() {
        let text: String = "字".repeat(130);
        let segments = segment_chapter(&text, 50);
        assert_eq!(segments.len(), 3);
        assert!(segments.iter().all(|s| s.chars().count() <= 50));
    }

    #[test]
    fn segment_chapter_leaves_short_text_untouched() {
        let text = "短章节";
        let segments = segment_chapter(text, 50);
        assert_eq!(segments, vec![text.to_string()]);
    }

    /// Times out on its first call, then succeeds on the retry, recording
    /// how many times `complete` was invoked.
    struct TimeoutThenOkBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmBackend for TimeoutThenOkBackend {
        async fn complete(
            &self,
            _system: &str,
            _prompt: &str,
            _options: &CompletionOptions,
        ) -> Result<Completion, LoregraphError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                return Err(LoregraphError::LlmTimeout(std::time::Duration::from_secs(30)));
            }
            Ok(Completion {
                content: r#"{"characters":[{"name":"张三"}]}"#.to_string(),
                usage: Default::default(),
            })
        }
    }

    #[tokio::test]
    async fn call_once_retries_truncated_text_after_timeout() {
        let backend = TimeoutThenOkBackend { calls: AtomicUsize::new(0) };
        let extractor = ChapterFactExtractor::new(&backend);
        let fact = extractor
            .call_once(
                RecordId::from(("novels", "n1")),
                RecordId::from(("chapters", "c1")),
                1,
                "章节正文",
                "",
                &[],
            )
            .await
            .unwrap();
        assert_eq!(fact.characters[0].name, "张三");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    /// Always times out, so the retry also fails and the error propagates.
    struct AlwaysTimeoutBackend;

    #[async_trait]
    impl LlmBackend for AlwaysTimeoutBackend {
        async fn complete(
            &self,
            _system: &str,
            _prompt: &str,
            _options: &CompletionOptions,
        ) -> Result<Completion, LoregraphError> {
            Err(LoregraphError::LlmTimeout(std::time::Duration::from_secs(30)))
        }
    }

    #[tokio::test]
    async fn call_once_fails_when_retry_also_times_out() {
        let backend = AlwaysTimeoutBackend;
        let extractor = ChapterFactExtractor::new(&backend);
        let result = extractor
            .call_once(
                RecordId::from(("novels", "n1")),
                RecordId::from(("chapters", "c1")),
                1,
                "章节正文",
                "",
                &[],
            )
            .await;
        assert!(matches!(result, Err(LoregraphError::LlmTimeout(_))));
    }

    /// Returns a different location per call so segment merging is visible.
    struct PerCallLocationBackend {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl LlmBackend for PerCallLocationBackend {
        async fn complete(
            &self,
            _system: &str,
            _prompt: &str,
            _options: &CompletionOptions,
        ) -> Result<Completion, LoregraphError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            let name = format!("地点{calls}");
            Ok(Completion {
                content: format!(r#"{{"locations":[{{"name":"{name}"}}]}}"#),
                usage: Default::default(),
            })
        }
    }

    #[tokio::test]
    async fn extract_segments_over_long_chapter_and_merges_results() {
        let backend = PerCallLocationBackend { calls: Mutex::new(0) };
        let extractor = ChapterFactExtractor::new(&backend);
        let long_text: String = "字".repeat(MAX_CHAPTER_LEN + 1);
        let fact = extractor
            .extract(
                RecordId::from(("novels", "n1")),
                RecordId::from(("chapters", "c1")),
                1,
                &long_text,
                "",
                &[],
            )
            .await
            .unwrap();
        assert_eq!(fact.locations.len(), 2);
    }
}
