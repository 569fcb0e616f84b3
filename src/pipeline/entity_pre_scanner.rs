//! Statistical first pass over a novel's full text: surfaces candidate named
//! entities (people, places, organizations, items) by frequency before any
//! LLM is involved, so the extractor's context can carry a known-entity
//! dictionary instead of hallucinating new ones every chapter.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use jieba_rs::Jieba;
use regex::Regex;

use crate::models::entity_dict::{Confidence, EntityDictEntry, EntityType};

const WORD_FREQ_CAP_CHARS: usize = 1_000_000;
const NGRAM_CAP_CHARS: usize = 500_000;
const MAX_CANDIDATES: usize = 500;
const SAMPLE_CONTEXT_RADIUS: usize = 25;

const SUFFIX_RULES: &[(EntityType, &[&str])] = &[
    (
        EntityType::Location,
        &[
            "山", "洞", "洲", "国", "城", "宫", "殿", "府", "寺", "庙", "观", "院", "阁", "楼",
            "塔", "谷", "崖", "峰", "岭", "河", "海", "湖", "泊", "关", "门", "桥", "镇", "村",
            "庄", "寨", "营", "港", "岛", "坊", "台", "池", "林", "园", "原", "坡", "涧",
        ],
    ),
    (
        EntityType::Organization,
        &["派", "宗", "帮", "会", "盟", "教", "族", "军", "营", "卫", "堂", "门派", "宗门"],
    ),
    (
        EntityType::Item,
        &[
            "丹", "药", "剑", "刀", "枪", "珠", "鼎", "炉", "符", "阵", "经", "诀", "功", "术",
            "法", "戟", "斧", "锤", "弓", "甲", "袍", "环", "镯", "钟", "琴", "笛", "扇", "杖",
            "棍", "鞭", "索", "旗", "印", "册", "图", "镜",
        ],
    ),
    (
        EntityType::Person,
        &[
            "真人", "道人", "仙人", "大师", "长老", "掌门", "圣人", "大王", "将军", "元帅", "太子",
            "公主", "娘娘", "老祖", "仙子", "童子", "居士", "道长", "法师", "尊者", "菩萨", "罗汉",
        ],
    ),
];

const STOPWORDS: &[&str] = &[
    "这个", "那个", "什么", "怎么", "为什么", "因为", "所以", "但是", "不过", "虽然", "而且",
    "一个", "一些", "一下", "一直", "一定", "一些人", "自己", "他们", "我们", "你们", "她们",
    "这样", "那样", "这里", "那里", "现在", "以后", "以前", "之后", "之前", "突然", "终于",
    "已经", "还是", "只是", "就是", "可以", "可能", "应该", "必须", "不能", "没有", "知道",
    "看到", "听到", "感觉", "觉得", "认为", "出来", "进去", "回来", "过去", "起来", "下去",
];

static DIALOGUE_VERB_SUFFIX: &str = r#"(道|说|曰|笑道|喝道|叫道|怒道|问道|答道|叹道)$"#;

fn regexes() -> &'static (Regex, Regex, Regex, Regex) {
    static RE: OnceLock<(Regex, Regex, Regex, Regex)> = OnceLock::new();
    RE.get_or_init(|| {
        let dialogue_verb_suffix = Regex::new(DIALOGUE_VERB_SUFFIX).unwrap();
        // "...", X道 — speaker named right after closing quote + verb.
        let dialogue_pattern =
            Regex::new(r#"[""][，,]?\s*([\p{Han}]{2,6})(道|说|曰|笑道|喝道|叫道)"#).unwrap();
        // X道："..." — speaker named right before an opening quote.
        let speaker_before_pattern =
            Regex::new(r#"([\p{Han}]{2,6})(道|说|曰|笑道|喝道|叫道)[：:]\s*[""]"#).unwrap();
        // Bare, punctuation-anchored "X道" with no adjacent quote.
        let bare_speaker_pattern =
            Regex::new(r#"(?m)(?:^|[。！？\n])([\p{Han}]{2,4})(道|说|笑道|喝道)"#).unwrap();
        (
            dialogue_verb_suffix,
            dialogue_pattern,
            speaker_before_pattern,
            bare_speaker_pattern,
        )
    })
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: String,
    pub entity_type: EntityType,
    pub confidence: Confidence,
    pub frequency: u32,
    pub sample_context: Option<String>,
}

pub struct EntityPreScanner {
    jieba: Jieba,
}

impl EntityPreScanner {
    pub fn new() -> Self {
        Self { jieba: Jieba::new() }
    }

    /// Phase 1: pure statistical scan, no LLM involved. Returns candidates
    /// sorted by descending frequency, capped at [`MAX_CANDIDATES`].
    pub fn scan(&self, full_text: &str) -> Vec<Candidate> {
        let word_freq = self.word_freq_scan(full_text);
        let ngram_freq = self.ngram_scan(full_text);
        let dialogue_names = self.dialogue_scan(full_text);

        self.merge_candidates(full_text, word_freq, ngram_freq, dialogue_names)
    }

    fn word_freq_scan(&self, text: &str) -> HashMap<String, u32> {
        let capped: &str = cap_chars(text, WORD_FREQ_CAP_CHARS);
        let ratio = text.chars().count() as f64 / capped.chars().count().max(1) as f64;

        let mut freq: HashMap<String, u32> = HashMap::new();
        for word in self.jieba.cut(capped, false) {
            let len = word.chars().count();
            if !(2..=8).contains(&len) {
                continue;
            }
            if STOPWORDS.contains(&word) {
                continue;
            }
            if !word.chars().all(is_cjk) {
                continue;
            }
            *freq.entry(word.to_string()).or_insert(0) += 1;
        }
        if ratio > 1.01 {
            for v in freq.values_mut() {
                *v = (*v as f64 * ratio).round() as u32;
            }
        }
        freq
    }

    fn ngram_scan(&self, text: &str) -> HashMap<String, u32> {
        let capped = cap_chars(text, NGRAM_CAP_CHARS);
        let min_freq = dynamic_min_freq(capped.chars().count());

        let mut freq: HashMap<String, u32> = HashMap::new();
        for segment in cjk_segments(capped) {
            let chars: Vec<char> = segment.chars().collect();
            for n in 2..=4usize {
                if chars.len() < n {
                    continue;
                }
                for window in chars.windows(n) {
                    let gram: String = window.iter().collect();
                    *freq.entry(gram).or_insert(0) += 1;
                }
            }
        }
        freq.retain(|_, v| *v >= min_freq);
        freq
    }

    fn dialogue_scan(&self, text: &str) -> HashSet<String> {
        let (verb_suffix, dialogue, speaker_before, bare_speaker) = regexes();
        let mut names = HashSet::new();
        for re in [dialogue, speaker_before, bare_speaker] {
            for cap in re.captures_iter(text) {
                if let Some(m) = cap.get(1) {
                    let name = verb_suffix.replace(m.as_str(), "").to_string();
                    if !name.is_empty() {
                        names.insert(name);
                    }
                }
            }
        }
        names
    }

    fn merge_candidates(
        &self,
        full_text: &str,
        word_freq: HashMap<String, u32>,
        ngram_freq: HashMap<String, u32>,
        dialogue_names: HashSet<String>,
    ) -> Vec<Candidate> {
        let min_freq = dynamic_min_freq(full_text.chars().count());
        let high_signal_min = (min_freq / 2).max(2);

        // Drop ngrams that are substrings of a longer jieba word with similar
        // frequency — those are almost always fragments, not entities.
        let long_words: Vec<&String> = word_freq.keys().filter(|w| w.chars().count() >= 3).collect();
        let mut ngram_freq = ngram_freq;
        for word in &long_words {
            let word_count = *word_freq.get(*word).unwrap_or(&0);
            let substrings = all_substrings(word);
            for sub in substrings {
                if let Some(count) = ngram_freq.get(&sub) {
                    if (*count as f64) <= word_count as f64 * 1.2 {
                        ngram_freq.remove(&sub);
                    }
                }
            }
        }

        let mut merged: HashMap<String, Candidate> = HashMap::new();

        for (name, freq) in word_freq {
            if name_is_noise(&name) {
                continue;
            }
            let threshold = if dialogue_names.contains(&name) { high_signal_min } else { min_freq };
            if freq < threshold {
                continue;
            }
            let entity_type = classify_by_suffix(&name).unwrap_or(EntityType::Unknown);
            let confidence = if freq >= 10 { Confidence::Medium } else { Confidence::Low };
            merged.insert(
                name.clone(),
                Candidate {
                    name: name.clone(),
                    entity_type,
                    confidence,
                    frequency: freq,
                    sample_context: sample_context(full_text, &name),
                },
            );
        }

        for (name, freq) in ngram_freq {
            if name_is_noise(&name) || merged.contains_key(&name) {
                continue;
            }
            if freq < min_freq {
                continue;
            }
            merged.insert(
                name.clone(),
                Candidate {
                    name: name.clone(),
                    entity_type: classify_by_suffix(&name).unwrap_or(EntityType::Unknown),
                    confidence: Confidence::Low,
                    frequency: freq,
                    sample_context: sample_context(full_text, &name),
                },
            );
        }

        for name in dialogue_names {
            if name_is_noise(&name) {
                continue;
            }
            let entity_type = classify_by_suffix(&name).unwrap_or(EntityType::Person);
            merged
                .entry(name.clone())
                .and_modify(|c| c.confidence = Confidence::High)
                .or_insert(Candidate {
                    name: name.clone(),
                    entity_type,
                    confidence: Confidence::High,
                    frequency: 1,
                    sample_context: sample_context(full_text, &name),
                });
        }

        let mut candidates: Vec<Candidate> = merged.into_values().collect();
        candidates.sort_by(|a, b| b.frequency.cmp(&a.frequency));
        candidates.truncate(MAX_CANDIDATES);
        candidates
    }

    pub fn to_entries(
        &self,
        novel: surrealdb::RecordId,
        candidates: Vec<Candidate>,
    ) -> Vec<EntityDictEntry> {
        candidates
            .into_iter()
            .map(|c| EntityDictEntry {
                id: None,
                novel: novel.clone(),
                name: c.name,
                entity_type: c.entity_type,
                confidence: c.confidence,
                aliases: Vec::new(),
                frequency: c.frequency as i64,
                sample_context: c.sample_context,
                status: "pending".to_string(),
                created_at: chrono::Utc::now(),
            })
            .collect()
    }
}

impl Default for EntityPreScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_by_suffix(name: &str) -> Option<EntityType> {
    let mut best: Option<(EntityType, usize)> = None;
    for (entity_type, suffixes) in SUFFIX_RULES {
        for suffix in *suffixes {
            if name.len() > suffix.len() && name.ends_with(suffix) {
                let prefix_len = name.chars().count() - suffix.chars().count();
                if prefix_len >= 2
                    && best.as_ref().map(|(_, l)| prefix_len > *l).unwrap_or(true)
                {
                    best = Some((*entity_type, prefix_len));
                }
            }
        }
    }
    best.map(|(t, _)| t)
}

fn name_is_noise(name: &str) -> bool {
    name.chars().count() < 2 || STOPWORDS.contains(&name)
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32, 0x4E00..=0x9FFF)
}

fn cap_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn cjk_segments(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start: Option<usize> = None;
    let mut last_end = 0;
    for (i, c) in text.char_indices() {
        if is_cjk(c) {
            if start.is_none() {
                start = Some(i);
            }
            last_end = i + c.len_utf8();
        } else if let Some(s) = start.take() {
            segments.push(&text[s..last_end]);
        }
    }
    if let Some(s) = start {
        segments.push(&text[s..last_end]);
    }
    segments
}

fn dynamic_min_freq(char_count: usize) -> u32 {
    if char_count < 200_000 {
        3
    } else if char_count < 1_000_000 {
        5
    } else {
        10
    }
}

fn all_substrings(word: &str) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    let mut out = Vec::new();
    for start in 0..chars.len() {
        for end in (start + 2)..=chars.len() {
            if end - start < chars.len() {
                out.push(chars[start..end].iter().collect());
            }
        }
    }
    out
}

fn sample_context(full_text: &str, name: &str) -> Option<String> {
    let idx = full_text.find(name)?;
    let start = full_text[..idx]
        .char_indices()
        .rev()
        .nth(SAMPLE_CONTEXT_RADIUS)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let end_search = idx + name.len();
    let end = full_text[end_search..]
        .char_indices()
        .nth(SAMPLE_CONTEXT_RADIUS)
        .map(|(i, _)| end_search + i)
        .unwrap_or(full_text.len());
    Some(full_text[start..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_location_suffix() {
        assert_eq!(classify_by_suffix("昆仑山"), Some(EntityType::Location));
    }

    #[test]
    fn classifies_sect_suffix() {
        assert_eq!(classify_by_suffix("青云宗"), Some(EntityType::Organization));
    }

    #[test]
    fn extracts_bare_speaker_name() {
        let scanner = EntityPreScanner::new();
        let text = "张三冷笑道：“你们都要死在这里。”李四也说道：“休得猖狂。”";
        let names = scanner.dialogue_scan(text);
        assert!(names.iter().any(|n| n.contains('张') || n.contains('李')));
    }

    #[test]
    fn drops_ngrams_already_found_by_word_segmentation() {
        let scanner = EntityPreScanner::new();
        let mut word_freq = HashMap::new();
        word_freq.insert("昆仑山脉".to_string(), 20);
        let mut ngram_freq = HashMap::new();
        ngram_freq.insert("昆仑山".to_string(), 18);
        let merged = scanner.merge_candidates("昆仑山脉很高", word_freq, ngram_freq, HashSet::new());
        assert!(merged.iter().any(|c| c.name == "昆仑山脉"));
        assert!(!merged.iter().any(|c| c.name == "昆仑山"));
    }
}
