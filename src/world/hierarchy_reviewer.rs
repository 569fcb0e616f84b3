//! LLM-assisted second pass over the consolidator's output: suggests
//! parents for orphan roots the algorithmic stages couldn't place, then
//! audits the finished tree for parents that look structurally wrong.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::llm::{complete_json, CompletionOptions, LlmBackend};
use crate::models::world_structure::ParentVote;
use crate::world::tier::Tier;
use crate::LoregraphError;

const REVIEW_SYSTEM_PROMPT: &str = "\
你是一个小说世界观分析助手。给定一批尚未归属上级的地点名称，以及已经确认的\
归属建议，为每个地点推断最合理的上级地点。只能从给出的已知地点列表中选择\
上级，禁止编造列表之外的名称。严格输出 JSON。";

const VALIDATE_SYSTEM_PROMPT: &str = "\
你是一个小说世界观分析助手。给定总览根节点下的直接子节点及其层级，判断哪些\
子节点的归属看起来不合理（例如一个建筑或地点直接挂在总览根节点下），并给出\
更合理的上级建议。严格输出 JSON。";

const BATCH_SIZE: usize = 70;
const MAX_BATCHES: usize = 3;

#[derive(Debug, Deserialize)]
struct RawSuggestion {
    child: String,
    parent: String,
    #[serde(default)]
    confidence: String,
}

#[derive(Debug, Deserialize)]
struct RawCorrection {
    child: String,
    wrong_parent: String,
    correct_parent: String,
    #[serde(default)]
    confidence: String,
}

/// A correction the structural audit proposes: only applied by the caller
/// when `parents.get(&child) == Some(&wrong_parent)` still holds.
pub struct Correction {
    pub child: String,
    pub wrong_parent: String,
    pub correct_parent: String,
}

pub struct HierarchyReviewer<'a> {
    backend: &'a dyn LlmBackend,
}

impl<'a> HierarchyReviewer<'a> {
    pub fn new(backend: &'a dyn LlmBackend) -> Self {
        Self { backend }
    }

    /// Batches every root whose tier is below continent (so world/continent
    /// roots are left alone) in chunks of up to [`BATCH_SIZE`], capped at
    /// [`MAX_BATCHES`]. Each batch sees the previous batches' confirmed
    /// suggestions so later batches don't re-derive the same placements.
    pub async fn review(
        &self,
        parents: &HashMap<String, String>,
        tiers: &HashMap<String, Tier>,
        genre: &str,
        known_locations: &HashSet<String>,
    ) -> Result<HashMap<String, Vec<ParentVote>>, LoregraphError> {
        let mut orphan_roots: Vec<String> = known_locations
            .iter()
            .filter(|loc| {
                !parents.contains_key(loc.as_str())
                    && !matches!(tiers.get(loc.as_str()), Some(Tier::World) | Some(Tier::Continent))
            })
            .cloned()
            .collect();
        orphan_roots.sort();

        let mut votes: HashMap<String, Vec<ParentVote>> = HashMap::new();
        let mut confirmed: Vec<(String, String)> = Vec::new();

        for batch in orphan_roots.chunks(BATCH_SIZE).take(MAX_BATCHES) {
            let prompt = build_review_prompt(batch, &confirmed, known_locations, genre);
            let options = CompletionOptions {
                temperature: Some(0.1),
                max_tokens: Some(4096),
                json_mode: true,
            };
            let value = complete_json(self.backend, REVIEW_SYSTEM_PROMPT, &prompt, &options).await?;
            let raw: Vec<RawSuggestion> = value
                .get("suggestions")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();

            for s in raw {
                if !known_locations.contains(&s.parent) || !known_locations.contains(&s.child) {
                    continue;
                }
                let weight = confidence_weight(&s.confidence);
                votes.entry(s.child.clone()).or_default().push(ParentVote {
                    parent: s.parent.clone(),
                    weight,
                    reason: "hierarchy reviewer".to_string(),
                });
                confirmed.push((s.child, s.parent));
            }
        }

        Ok(votes)
    }

    /// Structural audit after consolidation: flags site/building-tier
    /// children sitting directly under `uber_root` as suspicious and asks
    /// for a corrected parent. Returns only `high`/`medium` confidence
    /// corrections; the caller still needs to check the edge hasn't moved
    /// since this call was made before applying one.
    pub async fn validate_hierarchy(
        &self,
        parents: &HashMap<String, String>,
        tiers: &HashMap<String, Tier>,
        genre: &str,
        uber_root: &str,
    ) -> Result<Vec<Correction>, LoregraphError> {
        let suspicious: Vec<(&str, Tier)> = parents
            .iter()
            .filter(|(_, p)| p.as_str() == uber_root)
            .filter_map(|(c, _)| tiers.get(c).map(|t| (c.as_str(), *t)))
            .filter(|(_, t)| matches!(t, Tier::Site | Tier::Building))
            .collect();
        if suspicious.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = build_validate_prompt(parents, tiers, uber_root, genre);
        let options = CompletionOptions {
            temperature: Some(0.0),
            max_tokens: Some(2048),
            json_mode: true,
        };
        let value = complete_json(self.backend, VALIDATE_SYSTEM_PROMPT, &prompt, &options).await?;
        let raw: Vec<RawCorrection> = value
            .get("corrections")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        Ok(raw
            .into_iter()
            .filter(|c| matches!(c.confidence.as_str(), "high" | "medium"))
            .filter(|c| parents.get(&c.child) == Some(&c.wrong_parent))
            .map(|c| Correction {
                child: c.child,
                wrong_parent: c.wrong_parent,
                correct_parent: c.correct_parent,
            })
            .collect())
    }
}

fn confidence_weight(confidence: &str) -> i64 {
    match confidence {
        "high" => 5,
        "medium" => 3,
        _ => 1,
    }
}

fn build_review_prompt(
    batch: &[String],
    confirmed: &[(String, String)],
    known_locations: &HashSet<String>,
    genre: &str,
) -> String {
    let mut parts = vec![format!("## 小说类型\n{genre}")];
    parts.push(format!("## 待归属地点\n{}", batch.join("、")));
    if !confirmed.is_empty() {
        let lines: Vec<String> = confirmed.iter().map(|(c, p)| format!("{c} -> {p}")).collect();
        parts.push(format!("## 已确认的归属\n{}", lines.join("\n")));
    }
    let mut known: Vec<&str> = known_locations.iter().map(|s| s.as_str()).collect();
    known.sort();
    parts.push(format!("## 已知地点列表\n{}", known.join("、")));
    parts.push(
        "请输出 JSON，包含 suggestions（数组，每项为 {child, parent, confidence}，\
         confidence 取值 high/medium/low，parent 必须来自已知地点列表）。"
            .to_string(),
    );
    parts.join("\n\n")
}

fn build_validate_prompt(
    parents: &HashMap<String, String>,
    tiers: &HashMap<String, Tier>,
    uber_root: &str,
    genre: &str,
) -> String {
    let mut children: Vec<(String, usize, usize)> = parents
        .iter()
        .filter(|(_, p)| p.as_str() == uber_root)
        .map(|(c, _)| {
            let tier_rank = tiers.get(c).map(|t| t.rank()).unwrap_or(usize::MAX);
            let child_count = parents.values().filter(|p| *p == c).count();
            (c.clone(), tier_rank, child_count)
        })
        .collect();
    children.sort_by(|a, b| a.0.cmp(&b.0));

    let mut parts = vec![format!("## 小说类型\n{genre}"), format!("## 总览根节点\n{uber_root}")];
    let lines: Vec<String> = children
        .iter()
        .map(|(name, rank, count)| format!("{name} (层级排名 {rank}, 子节点数 {count})"))
        .collect();
    parts.push(format!("## 根节点下的直接子节点\n{}", lines.join("\n")));
    parts.push(
        "请输出 JSON，包含 corrections（数组，每项为 {child, wrong_parent, correct_parent, \
         confidence}，confidence 取值 high/medium，仅在确信某个子节点归属错误时输出）。"
            .to_string(),
    );
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_weight_matches_spec_scale() {
        assert_eq!(confidence_weight("high"), 5);
        assert_eq!(confidence_weight("medium"), 3);
        assert_eq!(confidence_weight("low"), 1);
        assert_eq!(confidence_weight("unknown"), 1);
    }

    #[test]
    fn validate_prompt_lists_root_children() {
        let mut parents = HashMap::new();
        parents.insert("茅屋".to_string(), "天下".to_string());
        let mut tiers = HashMap::new();
        tiers.insert("茅屋".to_string(), Tier::Building);
        let prompt = build_validate_prompt(&parents, &tiers, "天下", "historical");
        assert!(prompt.contains("茅屋"));
    }
}
