//! Asks the LLM for a one-shot "macro skeleton" — the handful of top-level
//! realms/kingdoms/continents a novel's geography sits under, plus synonym
//! groups for names that are really the same place — then filters the
//! answer against what the hierarchy consolidator actually knows about so
//! hallucinated places never make it into the tree.

use std::collections::HashMap;

use serde::Deserialize;

use crate::llm::{complete_json, CompletionOptions, LlmBackend};
use crate::world::tier::Tier;
use crate::LoregraphError;

const SYSTEM_PROMPT: &str = "\
你是一个小说世界观分析助手。给定按层级分组的地点名单，推断故事世界最顶层的\
地理/势力划分（大陆、国度、界域等），并找出名称不同但实际指向同一地点的同义词组。\
只能使用给出的地点名称，严格输出 JSON，不要编造列表之外的地名。";

const MAX_LINES_PER_TIER: usize = 40;

#[derive(Debug, Deserialize)]
struct RawSkeleton {
    #[serde(default)]
    top_level: Vec<String>,
    #[serde(default)]
    synonyms: Vec<Vec<String>>,
}

pub struct MacroSkeleton {
    /// Top-level realm/kingdom names the LLM proposed, filtered to ones
    /// that were actually present in the input (or are a reasonable new
    /// root like an uber-root label the genre calls for).
    pub top_level: Vec<String>,
    /// name -> canonical name, built from synonym groups where every member
    /// of the group was a known location.
    pub synonyms: HashMap<String, String>,
}

pub struct MacroSkeletonGenerator<'a> {
    backend: &'a dyn LlmBackend,
}

impl<'a> MacroSkeletonGenerator<'a> {
    pub fn new(backend: &'a dyn LlmBackend) -> Self {
        Self { backend }
    }

    pub async fn generate(
        &self,
        locations_by_tier: &HashMap<Tier, Vec<String>>,
        genre: &str,
    ) -> Result<MacroSkeleton, LoregraphError> {
        let known: std::collections::HashSet<&str> = locations_by_tier
            .values()
            .flatten()
            .map(|s| s.as_str())
            .collect();

        let prompt = build_prompt(locations_by_tier, genre);
        let options = CompletionOptions {
            temperature: Some(0.1),
            max_tokens: Some(4096),
            json_mode: true,
        };

        let value = complete_json(self.backend, SYSTEM_PROMPT, &prompt, &options).await?;
        let raw: RawSkeleton = serde_json::from_value(value).unwrap_or(RawSkeleton {
            top_level: Vec::new(),
            synonyms: Vec::new(),
        });

        let top_level = raw
            .top_level
            .into_iter()
            .filter(|name| known.contains(name.as_str()) || is_plausible_new_root(name, genre))
            .collect();

        let mut synonyms = HashMap::new();
        for group in raw.synonyms {
            if group.len() < 2 {
                continue;
            }
            if !group.iter().all(|n| known.contains(n.as_str())) {
                continue;
            }
            let canonical = group
                .iter()
                .max_by_key(|n| n.chars().count())
                .cloned()
                .unwrap();
            for name in group {
                if name != canonical {
                    synonyms.insert(name, canonical.clone());
                }
            }
        }

        Ok(MacroSkeleton { top_level, synonyms })
    }
}

fn build_prompt(locations_by_tier: &HashMap<Tier, Vec<String>>, genre: &str) -> String {
    let mut parts = vec![format!("## 小说类型\n{genre}")];
    for tier in crate::world::tier::TIER_ORDER {
        let Some(names) = locations_by_tier.get(tier) else {
            continue;
        };
        if names.is_empty() {
            continue;
        }
        let truncated: Vec<&str> = names.iter().take(MAX_LINES_PER_TIER).map(|s| s.as_str()).collect();
        let overflow = names.len().saturating_sub(truncated.len());
        let mut line = format!("## {} 层级地点\n{}", tier.as_str(), truncated.join("、"));
        if overflow > 0 {
            line.push_str(&format!("\n(还有 {overflow} 个未列出)"));
        }
        parts.push(line);
    }
    parts.push(
        "请输出 JSON，包含 top_level（顶层地理/势力名称数组，必须是上面列表中的名称或新的总\
         领地名）和 synonyms（同义词组数组，每组是指向同一地点的不同叫法数组）。"
            .to_string(),
    );
    parts.join("\n\n")
}

/// Fantasy/xianxia settings are allowed one brand-new top-level label (a
/// realm or plane name) that never appeared verbatim in the chapters, since
/// those are often implied rather than named outright. Historical/urban
/// settings must stick to known names.
fn is_plausible_new_root(name: &str, genre: &str) -> bool {
    matches!(genre, "fantasy" | "xianxia") && name.chars().count() <= 6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_root_only_allowed_for_fantasy_genres() {
        assert!(is_plausible_new_root("九霄界", "fantasy"));
        assert!(!is_plausible_new_root("九霄界", "historical"));
    }

    #[test]
    fn prompt_includes_each_nonempty_tier() {
        let mut map = HashMap::new();
        map.insert(Tier::Continent, vec!["山东".to_string()]);
        let prompt = build_prompt(&map, "historical");
        assert!(prompt.contains("continent"));
        assert!(prompt.contains("山东"));
    }
}
