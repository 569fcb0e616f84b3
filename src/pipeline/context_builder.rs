//! Builds the compact "what's known so far" summary fed to the extractor
//! prompt ahead of each chapter: a recency-filtered rollup of characters,
//! relationships, locations and items drawn from all previously analyzed
//! chapters, capped so it never blows past the prompt budget.

use std::collections::HashMap;

use crate::models::chapter_fact::ChapterFact;

const ACTIVE_WINDOW: i64 = 20;
const MAX_CHARS: usize = 6000;

const MAX_CHARACTERS: usize = 30;
const MAX_RELATIONSHIPS: usize = 20;
const MAX_LOCATIONS: usize = 20;
const MAX_ITEMS: usize = 15;

pub struct ContextBuilder;

impl ContextBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Returns "" for the first chapter, or when there is no prior history.
    pub fn build(&self, chapter_num: i64, facts: &[ChapterFact]) -> String {
        if chapter_num <= 1 || facts.is_empty() {
            return String::new();
        }

        let preceding: Vec<&ChapterFact> =
            facts.iter().filter(|f| f.chapter_id < chapter_num).collect();
        if preceding.is_empty() {
            return String::new();
        }

        let recent_cutoff = chapter_num - ACTIVE_WINDOW;
        let mut recent: Vec<&ChapterFact> = preceding
            .iter()
            .copied()
            .filter(|f| f.chapter_id >= recent_cutoff)
            .collect();
        if recent.is_empty() {
            let mut sorted = preceding.clone();
            sorted.sort_by_key(|f| f.chapter_id);
            recent = sorted.into_iter().rev().take(5).collect();
        }
        let recent_active: std::collections::HashSet<&str> = recent
            .iter()
            .flat_map(|f| f.characters.iter().map(|c| c.name.as_str()))
            .collect();

        let mut sections = Vec::new();
        if let Some(s) = self.build_characters(&preceding, &recent_active) {
            sections.push(s);
        }
        if let Some(s) = self.build_relationships(&preceding, &recent_active) {
            sections.push(s);
        }
        if let Some(s) = self.build_locations(&preceding, &recent) {
            sections.push(s);
        }
        if let Some(s) = self.build_items(&preceding, &recent) {
            sections.push(s);
        }

        let mut text = sections.join("\n\n");
        if text.chars().count() > MAX_CHARS {
            text = text.chars().take(MAX_CHARS).collect();
            text.push_str("\n...(已截断)");
        }
        text
    }

    fn build_characters(
        &self,
        preceding: &[&ChapterFact],
        recent_active: &std::collections::HashSet<&str>,
    ) -> Option<String> {
        let mut labels: HashMap<String, (Vec<String>, Vec<String>)> = HashMap::new();
        for f in preceding {
            for c in &f.characters {
                let entry = labels.entry(c.name.clone()).or_default();
                for a in &c.aliases {
                    if !entry.0.contains(a) {
                        entry.0.push(a.clone());
                    }
                }
                for ab in &c.abilities {
                    if !entry.1.contains(ab) {
                        entry.1.push(ab.clone());
                    }
                }
            }
        }
        let mut lines: Vec<String> = labels
            .into_iter()
            .filter(|(name, _)| recent_active.contains(name.as_str()))
            .take(MAX_CHARACTERS)
            .map(|(name, (aliases, abilities))| {
                let mut line = name.clone();
                if !aliases.is_empty() {
                    line.push_str(&format!("(别名:{})", aliases.join("、")));
                }
                if !abilities.is_empty() {
                    line.push_str(&format!("[能力:{}]", abilities.join("、")));
                }
                line
            })
            .collect();
        if lines.is_empty() {
            return None;
        }
        lines.sort();
        Some(format!("### 已知人物\n{}", lines.join("\n")))
    }

    fn build_relationships(
        &self,
        preceding: &[&ChapterFact],
        recent_active: &std::collections::HashSet<&str>,
    ) -> Option<String> {
        let mut latest: HashMap<(String, String), String> = HashMap::new();
        for f in preceding {
            for r in &f.relationships {
                let mut pair = [r.person_a.clone(), r.person_b.clone()];
                pair.sort();
                let key = (pair[0].clone(), pair[1].clone());
                latest.insert(key, r.relation_type.clone());
            }
        }
        let mut lines: Vec<String> = latest
            .into_iter()
            .filter(|((a, b), _)| recent_active.contains(a.as_str()) || recent_active.contains(b.as_str()))
            .take(MAX_RELATIONSHIPS)
            .map(|((a, b), rel)| format!("{} - {} - {}", a, rel, b))
            .collect();
        if lines.is_empty() {
            return None;
        }
        lines.sort();
        Some(format!("### 已知关系\n{}", lines.join("\n")))
    }

    fn build_locations(
        &self,
        preceding: &[&ChapterFact],
        recent: &[&ChapterFact],
    ) -> Option<String> {
        let mut info: HashMap<String, (Option<String>, Option<String>)> = HashMap::new();
        for f in preceding {
            for l in &f.locations {
                let entry = info.entry(l.name.clone()).or_insert((None, None));
                if entry.0.is_none() {
                    entry.0 = l.loc_type.clone();
                }
                if entry.1.is_none() {
                    entry.1 = l.parent.clone();
                }
            }
        }
        let mentioned: std::collections::HashSet<&str> = recent
            .iter()
            .flat_map(|f| {
                f.locations
                    .iter()
                    .map(|l| l.name.as_str())
                    .chain(f.characters.iter().flat_map(|c| c.locations.iter().map(|s| s.as_str())))
            })
            .collect();
        let mut lines: Vec<String> = info
            .into_iter()
            .filter(|(name, _)| mentioned.contains(name.as_str()))
            .take(MAX_LOCATIONS)
            .map(|(name, (loc_type, parent))| {
                let mut line = name.clone();
                if let Some(t) = loc_type {
                    line.push_str(&format!("[{}]", t));
                }
                if let Some(p) = parent {
                    line.push_str(&format!(" (属于 {})", p));
                }
                line
            })
            .collect();
        if lines.is_empty() {
            return None;
        }
        lines.sort();
        Some(format!("### 已知地点\n{}", lines.join("\n")))
    }

    fn build_items(&self, preceding: &[&ChapterFact], recent: &[&ChapterFact]) -> Option<String> {
        let mut holders: HashMap<String, String> = HashMap::new();
        for f in preceding {
            for item in &f.items {
                let holder = match item.action.as_str() {
                    "获得" | "赠予" => item.holder.clone().unwrap_or_else(|| "未知".to_string()),
                    "丢失" | "损毁" | "消耗" => "无".to_string(),
                    _ => item.holder.clone().unwrap_or_else(|| "未知".to_string()),
                };
                holders.insert(item.name.clone(), holder);
            }
        }
        let mentioned: std::collections::HashSet<&str> =
            recent.iter().flat_map(|f| f.items.iter().map(|i| i.name.as_str())).collect();
        let mut lines: Vec<String> = holders
            .into_iter()
            .filter(|(name, _)| mentioned.contains(name.as_str()))
            .take(MAX_ITEMS)
            .map(|(name, holder)| format!("{} (持有者: {})", name, holder))
            .collect();
        if lines.is_empty() {
            return None;
        }
        lines.sort();
        Some(format!("### 已知物品\n{}", lines.join("\n")))
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chapter_fact::{CharacterFact, ItemEventFact};
    use surrealdb::RecordId;

    fn fact(chapter_id: i64) -> ChapterFact {
        ChapterFact::empty(
            RecordId::from(("novels", "n1")),
            RecordId::from(("chapters", chapter_id.to_string())),
            chapter_id,
        )
    }

    #[test]
    fn returns_empty_for_first_chapter() {
        let cb = ContextBuilder::new();
        assert_eq!(cb.build(1, &[]), "");
    }

    #[test]
    fn includes_recently_mentioned_character() {
        let mut f1 = fact(1);
        f1.characters.push(CharacterFact {
            name: "张三".into(),
            aliases: vec!["三儿".into()],
            ..Default::default()
        });
        let cb = ContextBuilder::new();
        let summary = cb.build(2, std::slice::from_ref(&f1));
        assert!(summary.contains("张三"));
        assert!(summary.contains("三儿"));
    }

    #[test]
    fn item_holder_cleared_on_loss() {
        let mut f1 = fact(1);
        f1.items.push(ItemEventFact {
            name: "青锋剑".into(),
            action: "获得".into(),
            holder: Some("张三".into()),
        });
        let mut f2 = fact(2);
        f2.items.push(ItemEventFact {
            name: "青锋剑".into(),
            action: "丢失".into(),
            holder: None,
        });
        let cb = ContextBuilder::new();
        let summary = cb.build(3, &[f1, f2]);
        assert!(summary.contains("持有者: 无"));
    }
}
