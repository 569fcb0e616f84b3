//! Incremental, signal-driven builder that merges each chapter's extracted
//! facts into one running [`WorldStructure`]: genre detection, spatial-scale
//! classification, heuristic layer/region/tier/icon assignment, and a
//! budgeted LLM trigger for the updates heuristics can't make on their own.
//!
//! The genre keyword tables and decision trees below are hand-authored
//! rather than ported from a single upstream dictionary file; see `DESIGN.md`.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::llm::{complete_json, CompletionOptions, LlmBackend};
use crate::models::chapter_fact::ChapterFact;
use crate::LoregraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Genre {
    Fantasy,
    Wuxia,
    Historical,
    Urban,
    Unknown,
}

impl Default for Genre {
    fn default() -> Self {
        Genre::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpatialScale {
    Urban,
    Cosmic,
    Continental,
    National,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerType {
    Overworld,
    Sky,
    Underground,
    Pocket,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub cardinal_direction: Option<char>,
    pub region_type: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub layer_id: String,
    pub name: String,
    pub layer_type: LayerType,
    pub regions: Vec<Region>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portal {
    pub name: String,
    pub source_layer: String,
    pub source_location: String,
    pub target_layer: String,
    pub target_location: String,
    pub is_bidirectional: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub signal_type: String,
    pub excerpt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorldStructure {
    pub layers: Vec<Layer>,
    pub portals: Vec<Portal>,
    pub location_layer_map: HashMap<String, String>,
    pub location_region_map: HashMap<String, String>,
    pub location_tier_map: HashMap<String, String>,
    pub location_icon_map: HashMap<String, String>,
    pub novel_genre_hint: Genre,
    pub spatial_scale: Option<SpatialScale>,
    genre_scores: HashMap<String, i64>,
    seen_signals: HashSet<String>,
}

impl WorldStructure {
    pub fn new() -> Self {
        let mut w = Self::default();
        w.layers.push(Layer {
            layer_id: "overworld".into(),
            name: "overworld".into(),
            layer_type: LayerType::Overworld,
            regions: Vec::new(),
        });
        w
    }
}

static GENRE_KEYWORDS: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
    HashMap::from([
        ("fantasy", vec!["修炼", "灵力", "仙", "丹田", "法宝", "宗门", "元婴", "筑基"]),
        ("wuxia", vec!["江湖", "内力", "武功", "门派", "轻功", "镖局", "侠"]),
        ("historical", vec!["朝廷", "皇帝", "府衙", "知府", "科举", "年号"]),
        ("urban", vec!["公司", "手机", "地铁", "汽车", "电脑", "写字楼"]),
    ])
});

static CELESTIAL_KEYWORDS: &[&str] = &["天宫", "仙界", "云端", "九天", "天庭"];
static UNDERWORLD_KEYWORDS: &[&str] = &["地府", "冥界", "幽冥", "黄泉", "阴曹"];
const MACRO_SUFFIXES: &[char] = &['洲', '域', '界', '国'];
const INSTANCE_TYPES: &[&str] = &["洞", "府"];

static REGION_DIVISION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("分为[一二三四五六七八九十0-9]+[个州域洲]").unwrap());
static LAYER_TRANSITION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("(飞升|坠入|前往地府|进入仙界|穿越)").unwrap());
static INSTANCE_ENTRY_RE: Lazy<Regex> = Lazy::new(|| Regex::new("(进入|踏入).{0,4}(洞|府)").unwrap());
static MACRO_GEO_RE: Lazy<Regex> = Lazy::new(|| Regex::new("[东西南北].{0,10}[洲域界国]").unwrap());

/// Chapters during which the LLM structure trigger fires unconditionally,
/// before enough heuristic signal has accumulated to be selective.
const TRIGGER_EARLY_CHAPTERS: i64 = 5;
/// Periodic sweep interval for the LLM trigger once past the early window.
const TRIGGER_SWEEP_INTERVAL: i64 = 20;
/// Minimum count of fresh macro-geography signals in one chapter to trigger.
const TRIGGER_MIN_NEW_MACRO: usize = 2;

const SYSTEM_PROMPT: &str = "\
你是一个小说世界结构维护助手。给定当前已知的层级（layers）、区域（regions）、\
传送门（portals）、地点归属映射，以及本章新出现的信号和地点，判断是否需要对世界\
结构做出调整。只能从以下操作中选择：ADD_REGION, ADD_LAYER, ADD_PORTAL, \
ASSIGN_LOCATION, UPDATE_REGION, SET_TIER, SET_ICON, NO_CHANGE。严格输出 JSON，\
格式为 {\"operations\": [...]}，不要编造列表之外的地点或层级。";

pub struct WorldStructureAgent {
    state: WorldStructure,
    chapters_seen: i64,
    overrides: HashMap<(String, String), String>,
}

impl WorldStructureAgent {
    pub fn new() -> Self {
        Self {
            state: WorldStructure::new(),
            chapters_seen: 0,
            overrides: HashMap::new(),
        }
    }

    pub fn with_overrides(overrides: HashMap<(String, String), String>) -> Self {
        let mut agent = Self::new();
        agent.overrides = overrides;
        agent
    }

    pub fn state(&self) -> &WorldStructure {
        &self.state
    }

    pub async fn process_chapter(
        &mut self,
        chapter_num: i64,
        text: &str,
        fact: &ChapterFact,
        backend: &dyn LlmBackend,
    ) -> Vec<Signal> {
        self.chapters_seen += 1;

        if self.chapters_seen <= 10 && matches!(self.state.novel_genre_hint, Genre::Unknown) {
            self.detect_genre(text, fact);
        }

        if chapter_num == 5 {
            self.compute_spatial_scale();
        }

        let signals = self.scan_signals(text, fact);

        for loc in &fact.locations {
            self.heuristic_update(&loc.name, loc.loc_type.as_deref(), loc.parent.as_deref());
        }

        if self.should_trigger_llm(chapter_num, &signals) {
            if let Err(e) = self.run_llm_trigger(backend, &signals, fact).await {
                tracing::warn!(error = %e, "world structure LLM trigger failed, keeping heuristic state");
            }
        }

        signals
    }

    fn should_trigger_llm(&self, chapter_num: i64, signals: &[Signal]) -> bool {
        if self.chapters_seen <= TRIGGER_EARLY_CHAPTERS {
            return true;
        }
        if chapter_num % TRIGGER_SWEEP_INTERVAL == 0 {
            return true;
        }
        if signals.iter().any(|s| s.signal_type == "region_division" || s.signal_type == "layer_transition") {
            return true;
        }
        signals.iter().filter(|s| s.signal_type == "macro_geography").count() >= TRIGGER_MIN_NEW_MACRO
    }

    async fn run_llm_trigger(
        &mut self,
        backend: &dyn LlmBackend,
        signals: &[Signal],
        fact: &ChapterFact,
    ) -> Result<(), LoregraphError> {
        let prompt = build_trigger_prompt(&self.state, signals, fact);
        let options = CompletionOptions {
            temperature: Some(0.1),
            max_tokens: Some(2048),
            json_mode: true,
        };

        let value = complete_json(backend, SYSTEM_PROMPT, &prompt, &options).await?;
        let raw: RawOperationList = serde_json::from_value(value).unwrap_or_default();
        self.apply_operations(raw.operations);
        Ok(())
    }

    /// Applies LLM-proposed operations in the closed vocabulary. Operations
    /// referencing layers that don't exist, or fields pinned by a user
    /// override, are silently dropped — each field's override is checked
    /// independently, mirroring the heuristic path.
    fn apply_operations(&mut self, ops: Vec<RawOperation>) {
        for raw in ops {
            match raw.op.as_str() {
                "ADD_LAYER" => {
                    let Some(layer_id) = raw.layer_id.clone().or_else(|| raw.name.clone()) else {
                        continue;
                    };
                    if self.state.layers.iter().any(|l| l.layer_id == layer_id) {
                        continue;
                    }
                    self.state.layers.push(Layer {
                        layer_id: layer_id.clone(),
                        name: raw.name.unwrap_or_else(|| layer_id.clone()),
                        layer_type: parse_layer_type(raw.layer_type.as_deref()),
                        regions: Vec::new(),
                    });
                }
                "ADD_REGION" => {
                    let (Some(layer_id), Some(name)) = (raw.layer_id, raw.name) else {
                        continue;
                    };
                    let Some(layer) = self.state.layers.iter_mut().find(|l| l.layer_id == layer_id) else {
                        continue; // references a missing layer
                    };
                    if layer.regions.iter().any(|r| r.name == name) {
                        continue;
                    }
                    layer.regions.push(Region {
                        name,
                        cardinal_direction: raw.cardinal_direction.and_then(|s| s.chars().next()),
                        region_type: raw.region_type,
                        description: raw.description,
                    });
                }
                "ADD_PORTAL" => {
                    let (Some(name), Some(source_layer), Some(source_location), Some(target_layer), Some(target_location)) = (
                        raw.name,
                        raw.source_layer,
                        raw.source_location,
                        raw.target_layer,
                        raw.target_location,
                    ) else {
                        continue;
                    };
                    let known_layer = |id: &str| self.state.layers.iter().any(|l| l.layer_id == id);
                    if !known_layer(&source_layer) || !known_layer(&target_layer) {
                        continue;
                    }
                    self.state.portals.push(Portal {
                        name,
                        source_layer,
                        source_location,
                        target_layer,
                        target_location,
                        is_bidirectional: raw.is_bidirectional.unwrap_or(false),
                    });
                }
                "ASSIGN_LOCATION" => {
                    let Some(name) = raw.name else { continue };
                    if let Some(layer_id) = raw.layer_id {
                        if self.state.layers.iter().any(|l| l.layer_id == layer_id)
                            && !self.is_overridden(&name, "location_layer")
                        {
                            self.state.location_layer_map.insert(name.clone(), layer_id);
                        }
                    }
                    if let Some(region) = raw.region {
                        if !self.is_overridden(&name, "location_region") {
                            self.state.location_region_map.insert(name.clone(), region);
                        }
                    }
                }
                "UPDATE_REGION" => {
                    let (Some(layer_id), Some(name)) = (raw.layer_id, raw.name) else {
                        continue;
                    };
                    if let Some(region) = self
                        .state
                        .layers
                        .iter_mut()
                        .find(|l| l.layer_id == layer_id)
                        .and_then(|l| l.regions.iter_mut().find(|r| r.name == name))
                    {
                        if let Some(desc) = raw.description {
                            region.description = Some(desc);
                        }
                        if raw.cardinal_direction.is_some() {
                            region.cardinal_direction = raw.cardinal_direction.and_then(|s| s.chars().next());
                        }
                    }
                }
                "SET_TIER" => {
                    let (Some(name), Some(tier)) = (raw.name, raw.tier) else { continue };
                    if !self.is_overridden(&name, "location_tier") {
                        self.state.location_tier_map.insert(name, tier);
                    }
                }
                "SET_ICON" => {
                    let (Some(name), Some(icon)) = (raw.name, raw.icon) else { continue };
                    if !self.is_overridden(&name, "location_icon") {
                        self.state.location_icon_map.insert(name, icon);
                    }
                }
                _ => {} // NO_CHANGE, and anything unrecognized
            }
        }
    }

    fn detect_genre(&mut self, text: &str, fact: &ChapterFact) {
        for (genre, keywords) in GENRE_KEYWORDS.iter() {
            let mut score = 0i64;
            for kw in keywords {
                score += text.matches(kw).count() as i64;
                for concept in &fact.concepts {
                    if concept.name.contains(kw) {
                        score += 2;
                    }
                }
            }
            *self.state.genre_scores.entry(genre.to_string()).or_insert(0) += score;
        }

        if let Some((best_genre, best_score)) = self
            .state
            .genre_scores
            .iter()
            .max_by_key(|(_, score)| **score)
        {
            if *best_score >= 5 {
                self.state.novel_genre_hint = match best_genre.as_str() {
                    "fantasy" => Genre::Fantasy,
                    "wuxia" => Genre::Wuxia,
                    "historical" => Genre::Historical,
                    "urban" => Genre::Urban,
                    _ => Genre::Unknown,
                };
            }
        }
    }

    fn compute_spatial_scale(&mut self) {
        if matches!(self.state.novel_genre_hint, Genre::Urban) {
            self.state.spatial_scale = Some(SpatialScale::Urban);
            return;
        }
        let has_celestial = self.state.layers.iter().any(|l| l.layer_id != "overworld");
        let tier_values: Vec<&str> = self.state.location_tier_map.values().map(|s| s.as_str()).collect();
        let scale = if has_celestial {
            SpatialScale::Cosmic
        } else if tier_values.iter().any(|t| *t == "continent") {
            SpatialScale::Continental
        } else if matches!(self.state.novel_genre_hint, Genre::Fantasy) {
            SpatialScale::Cosmic
        } else {
            SpatialScale::National
        };
        self.state.spatial_scale = Some(scale);
    }

    fn scan_signals(&mut self, text: &str, fact: &ChapterFact) -> Vec<Signal> {
        let mut out = Vec::new();
        let mut push = |signal_type: &str, excerpt: &str, state: &mut WorldStructure| {
            let clipped: String = excerpt.chars().take(60).collect();
            let key = format!("{signal_type}:{clipped}");
            if state.seen_signals.insert(key) {
                out.push(Signal {
                    signal_type: signal_type.to_string(),
                    excerpt: clipped,
                });
            }
        };

        if let Some(m) = REGION_DIVISION_RE.find(text) {
            push("region_division", m.as_str(), &mut self.state);
        }
        if let Some(m) = LAYER_TRANSITION_RE.find(text) {
            push("layer_transition", m.as_str(), &mut self.state);
        }
        if let Some(m) = INSTANCE_ENTRY_RE.find(text) {
            push("instance_entry", m.as_str(), &mut self.state);
        }
        if let Some(m) = MACRO_GEO_RE.find(text) {
            push("macro_geography", m.as_str(), &mut self.state);
        }
        for declaration in &fact.world_declarations {
            push("macro_geography", declaration, &mut self.state);
        }

        out
    }

    fn heuristic_update(&mut self, name: &str, loc_type: Option<&str>, parent: Option<&str>) {
        if !self.is_overridden(name, "location_layer") {
            let layer_id = self.assign_layer(name);
            self.ensure_layer(&layer_id);
            self.state.location_layer_map.insert(name.to_string(), layer_id);
        }

        if !self.is_overridden(name, "location_region") {
            if let Some(parent) = parent {
                if let Some(region) = self.state.location_region_map.get(parent).cloned() {
                    self.state.location_region_map.insert(name.to_string(), region);
                }
            } else if let Some(last) = name.chars().last() {
                if MACRO_SUFFIXES.contains(&last) {
                    let cardinal = name.chars().next().filter(|c| "东西南北".contains(*c));
                    self.ensure_region(name, cardinal);
                }
            }
        }

        if !self.is_overridden(name, "location_tier") {
            let tier = classify_tier(name, loc_type, parent);
            self.state.location_tier_map.insert(name.to_string(), tier);
        }

        let icon = classify_icon(name, loc_type);
        self.state.location_icon_map.insert(name.to_string(), icon);

        if let Some(t) = loc_type {
            if INSTANCE_TYPES.contains(&t) && parent.is_some() && !matches!(self.state.novel_genre_hint, Genre::Urban) {
                // instance creation is a layer-local concept; represented via the icon map tag
                self.state.location_icon_map.insert(name.to_string(), "cave".into());
            }
        }
    }

    fn assign_layer(&self, name: &str) -> String {
        if CELESTIAL_KEYWORDS.iter().any(|k| name.contains(k)) {
            return "celestial".into();
        }
        if UNDERWORLD_KEYWORDS.iter().any(|k| name.contains(k)) {
            return "underworld".into();
        }
        "overworld".into()
    }

    /// Every id assigned via `location_layer_map` must exist in `layers`;
    /// creates it on first use so "celestial"/"underworld" don't linger as
    /// dangling references.
    fn ensure_layer(&mut self, layer_id: &str) {
        if self.state.layers.iter().any(|l| l.layer_id == layer_id) {
            return;
        }
        let layer_type = match layer_id {
            "celestial" => LayerType::Sky,
            "underworld" => LayerType::Underground,
            _ => LayerType::Overworld,
        };
        self.state.layers.push(Layer {
            layer_id: layer_id.to_string(),
            name: layer_id.to_string(),
            layer_type,
            regions: Vec::new(),
        });
    }

    fn ensure_region(&mut self, name: &str, cardinal: Option<char>) {
        let layer_id = self.state.location_layer_map.get(name).cloned().unwrap_or_else(|| "overworld".into());
        if let Some(layer) = self.state.layers.iter_mut().find(|l| l.layer_id == layer_id) {
            if !layer.regions.iter().any(|r| r.name == name) {
                layer.regions.push(Region {
                    name: name.to_string(),
                    cardinal_direction: cardinal,
                    region_type: Some("macro".into()),
                    description: None,
                });
            }
        } else {
            self.state.layers.push(Layer {
                layer_id: layer_id.clone(),
                name: layer_id,
                layer_type: LayerType::Overworld,
                regions: vec![Region {
                    name: name.to_string(),
                    cardinal_direction: cardinal,
                    region_type: Some("macro".into()),
                    description: None,
                }],
            });
        }
        self.state.location_region_map.insert(name.to_string(), name.to_string());
    }

    fn is_overridden(&self, key: &str, override_type: &str) -> bool {
        self.overrides.contains_key(&(override_type.to_string(), key.to_string()))
    }
}

impl Default for WorldStructureAgent {
    fn default() -> Self {
        Self::new()
    }
}

/// One LLM-proposed structure edit. Fields are all optional since each `op`
/// only needs a subset; unrecognized or malformed entries fall through
/// `apply_operations`'s catch-all and are dropped rather than rejecting the
/// whole batch.
#[derive(Debug, Deserialize, Default)]
struct RawOperation {
    op: String,
    #[serde(default)]
    layer_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    layer_type: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    cardinal_direction: Option<String>,
    #[serde(default)]
    region_type: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    source_layer: Option<String>,
    #[serde(default)]
    source_location: Option<String>,
    #[serde(default)]
    target_layer: Option<String>,
    #[serde(default)]
    target_location: Option<String>,
    #[serde(default)]
    is_bidirectional: Option<bool>,
    #[serde(default)]
    tier: Option<String>,
    #[serde(default)]
    icon: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawOperationList {
    #[serde(default)]
    operations: Vec<RawOperation>,
}

fn parse_layer_type(raw: Option<&str>) -> LayerType {
    match raw {
        Some("sky") => LayerType::Sky,
        Some("underground") => LayerType::Underground,
        Some("pocket") => LayerType::Pocket,
        _ => LayerType::Overworld,
    }
}

/// Compressed structure summary for the LLM trigger prompt: layers with
/// their regions, the portal list, and a truncated view of the location
/// maps, followed by this chapter's signals and raw location mentions.
fn build_trigger_prompt(state: &WorldStructure, signals: &[Signal], fact: &ChapterFact) -> String {
    let mut parts = Vec::new();

    let layers: Vec<String> = state
        .layers
        .iter()
        .map(|l| {
            let regions: Vec<&str> = l.regions.iter().map(|r| r.name.as_str()).collect();
            format!("{} ({:?}): regions=[{}]", l.layer_id, l.layer_type, regions.join("、"))
        })
        .collect();
    parts.push(format!("## 已知层级\n{}", layers.join("\n")));

    if !state.portals.is_empty() {
        let portals: Vec<String> = state
            .portals
            .iter()
            .map(|p| format!("{}: {}/{} -> {}/{}", p.name, p.source_layer, p.source_location, p.target_layer, p.target_location))
            .collect();
        parts.push(format!("## 已知传送门\n{}", portals.join("\n")));
    }

    const MAP_PREVIEW: usize = 40;
    let layer_map_preview: Vec<String> = state
        .location_layer_map
        .iter()
        .take(MAP_PREVIEW)
        .map(|(k, v)| format!("{k}->{v}"))
        .collect();
    parts.push(format!("## 地点所属层级（节选）\n{}", layer_map_preview.join("、")));

    if !signals.is_empty() {
        let sig: Vec<String> = signals.iter().map(|s| format!("[{}] {}", s.signal_type, s.excerpt)).collect();
        parts.push(format!("## 本章信号\n{}", sig.join("\n")));
    }

    if !fact.locations.is_empty() {
        let locs: Vec<String> = fact
            .locations
            .iter()
            .map(|l| format!("{}({})", l.name, l.loc_type.as_deref().unwrap_or("?")))
            .collect();
        parts.push(format!("## 本章地点\n{}", locs.join("、")));
    }

    parts.push(
        "请判断是否需要新增区域/层级/传送门，或调整地点归属/层级/等级/图标，\
         输出 JSON：{\"operations\": [{\"op\": \"ADD_REGION\"|\"ADD_LAYER\"|\"ADD_PORTAL\"|\
         \"ASSIGN_LOCATION\"|\"UPDATE_REGION\"|\"SET_TIER\"|\"SET_ICON\"|\"NO_CHANGE\", ...}]}。\
         不确定时输出 NO_CHANGE。"
            .to_string(),
    );

    parts.join("\n\n")
}

const TIER_KEYWORDS: &[(&str, &[char])] = &[
    ("continent", &['洲', '域', '界']),
    ("kingdom", &['国']),
    ("region", &['省', '府', '路']),
    ("city", &['州', '京', '县', '城']),
    ("site", &['山', '寺', '观', '庙', '楼', '阁', '殿', '宫']),
];

fn classify_tier(name: &str, loc_type: Option<&str>, parent: Option<&str>) -> String {
    if let Some(t) = loc_type {
        if t == "洞" || t == "府" {
            return "site".into();
        }
    }
    if let Some(last) = name.chars().last() {
        for (tier, chars) in TIER_KEYWORDS {
            if chars.contains(&last) {
                return tier.to_string();
            }
        }
    }
    if parent.is_some() {
        "building".into()
    } else {
        "site".into()
    }
}

const ICON_KEYWORDS: &[(&str, &[&str])] = &[
    ("palace", &["宫", "殿"]),
    ("temple", &["寺", "庙", "观", "庵"]),
    ("tower", &["楼", "塔"]),
    ("gate", &["门", "关"]),
    ("mountain", &["山", "岭", "峰"]),
    ("water", &["江", "河", "湖", "海", "泊"]),
    ("forest", &["林", "森"]),
    ("desert", &["漠", "沙"]),
    ("cave", &["洞", "窟"]),
    ("village", &["村", "庄", "寨"]),
    ("city", &["州", "京", "县", "城", "府"]),
    ("ruins", &["废墟", "遗址"]),
    ("camp", &["营", "寨"]),
];

fn classify_icon(name: &str, loc_type: Option<&str>) -> String {
    if let Some(t) = loc_type {
        for (icon, keywords) in ICON_KEYWORDS {
            if keywords.contains(&t) {
                return icon.to_string();
            }
        }
    }
    for (icon, keywords) in ICON_KEYWORDS {
        if keywords.iter().any(|k| name.ends_with(k)) {
            return icon.to_string();
        }
    }
    "generic".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chapter_fact::ChapterFact;
    use surrealdb::RecordId;

    fn empty_fact() -> ChapterFact {
        ChapterFact::empty(
            RecordId::from(("novels", "n1")),
            RecordId::from(("chapters", "c1")),
            1,
        )
    }

    #[test]
    fn classifies_palace_as_celestial_layer_for_fantasy() {
        let mut agent = WorldStructureAgent::new();
        agent.state.novel_genre_hint = Genre::Fantasy;
        agent.heuristic_update("天宫", Some("宫"), None);
        assert_eq!(agent.state.location_layer_map.get("天宫"), Some(&"celestial".to_string()));
        assert!(
            agent.state.layers.iter().any(|l| l.layer_id == "celestial"),
            "celestial layer referenced by location_layer_map must exist in layers"
        );
    }

    #[test]
    fn tier_classification_prefers_suffix_over_parent() {
        assert_eq!(classify_tier("青州", None, Some("山东")), "city");
        assert_eq!(classify_tier("后院", None, Some("宅邸")), "building");
    }

    #[test]
    fn icon_classification_maps_mountain_suffix() {
        assert_eq!(classify_icon("泰山", None), "mountain");
    }

    #[test]
    fn signal_scan_dedupes_by_type_and_excerpt() {
        let mut agent = WorldStructureAgent::new();
        let fact = empty_fact();
        let first = agent.scan_signals("这片大陆分为九个州域各自为政", &fact);
        let second = agent.scan_signals("这片大陆分为九个州域各自为政", &fact);
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[test]
    fn should_trigger_llm_fires_in_first_five_chapters() {
        let mut agent = WorldStructureAgent::new();
        agent.chapters_seen = 3;
        assert!(agent.should_trigger_llm(3, &[]));
    }

    #[test]
    fn should_trigger_llm_fires_on_periodic_sweep() {
        let mut agent = WorldStructureAgent::new();
        agent.chapters_seen = 20;
        assert!(agent.should_trigger_llm(20, &[]));
        assert!(!agent.should_trigger_llm(21, &[]));
    }

    #[test]
    fn should_trigger_llm_fires_on_region_division_signal() {
        let mut agent = WorldStructureAgent::new();
        agent.chapters_seen = 50;
        let signals = vec![Signal { signal_type: "region_division".into(), excerpt: "分为九州".into() }];
        assert!(agent.should_trigger_llm(51, &signals));
    }

    #[test]
    fn should_trigger_llm_fires_on_two_new_macro_signals() {
        let mut agent = WorldStructureAgent::new();
        agent.chapters_seen = 50;
        let signals = vec![
            Signal { signal_type: "macro_geography".into(), excerpt: "东荒界".into() },
            Signal { signal_type: "macro_geography".into(), excerpt: "西漠域".into() },
        ];
        assert!(agent.should_trigger_llm(51, &signals));
        assert!(!agent.should_trigger_llm(51, &signals[..1]));
    }

    #[test]
    fn apply_operations_add_layer_then_add_region() {
        let mut agent = WorldStructureAgent::new();
        agent.apply_operations(vec![
            RawOperation {
                op: "ADD_LAYER".into(),
                layer_id: Some("underworld".into()),
                name: Some("underworld".into()),
                layer_type: Some("underground".into()),
                ..Default::default()
            },
            RawOperation {
                op: "ADD_REGION".into(),
                layer_id: Some("underworld".into()),
                name: Some("幽都".into()),
                ..Default::default()
            },
        ]);
        let layer = agent.state.layers.iter().find(|l| l.layer_id == "underworld").unwrap();
        assert!(layer.regions.iter().any(|r| r.name == "幽都"));
    }

    #[test]
    fn apply_operations_drops_add_region_referencing_unknown_layer() {
        let mut agent = WorldStructureAgent::new();
        agent.apply_operations(vec![RawOperation {
            op: "ADD_REGION".into(),
            layer_id: Some("nonexistent".into()),
            name: Some("幽都".into()),
            ..Default::default()
        }]);
        assert!(agent.state.layers.iter().all(|l| l.regions.iter().all(|r| r.name != "幽都")));
    }

    #[test]
    fn apply_operations_assign_location_respects_user_override() {
        let mut overrides = HashMap::new();
        overrides.insert(("location_region".to_string(), "天宫".to_string()), "user_region".to_string());
        let mut agent = WorldStructureAgent::with_overrides(overrides);
        agent.apply_operations(vec![RawOperation {
            op: "ASSIGN_LOCATION".into(),
            name: Some("天宫".into()),
            region: Some("llm_region".into()),
            ..Default::default()
        }]);
        assert_eq!(
            agent.state.location_region_map.get("天宫"),
            None,
            "user override on location_region must block the LLM's ASSIGN_LOCATION"
        );
    }
}
