//! Cleans up raw LLM extraction output before it is persisted: drops
//! hallucinated or malformed facts, normalizes enum-like fields to their
//! closest valid value, merges duplicate characters, and back-fills
//! participants/locations the model forgot to list explicitly.

use std::collections::HashSet;

use crate::models::chapter_fact::{
    CharacterFact, ChapterFact, EventFact, ItemEventFact, LocationFact, OrgEventFact,
    RelationshipFact, VALID_EVENT_TYPES, VALID_IMPORTANCE, VALID_ITEM_ACTIONS, VALID_ORG_ACTIONS,
};

const NAME_MIN_LEN: usize = 1;
const NAME_MAX_LEN: usize = 20;

const CHARACTER_LOCATION_SUFFIXES: &[&str] = &["府邸", "住所", "居所", "家中", "宅邸", "房间"];

pub struct FactValidator;

impl FactValidator {
    pub fn new() -> Self {
        Self
    }

    /// Run the full validation pipeline over a freshly extracted fact set,
    /// mutating it in place to the cleaned-up version.
    pub fn validate(&self, fact: &mut ChapterFact) {
        Self::validate_characters(&mut fact.characters);
        let char_names = character_names(&fact.characters);
        Self::validate_relationships(&mut fact.relationships, &char_names);
        Self::validate_locations(&mut fact.locations, &char_names);
        Self::validate_item_events(&mut fact.items);
        Self::validate_org_events(&mut fact.organizations);
        Self::validate_events(&mut fact.events);
        Self::validate_concepts(&mut fact.concepts);
        Self::remove_locations_from_characters(&mut fact.characters, &fact.locations);

        let loc_names = location_names(&fact.locations);
        Self::fill_event_participants(&mut fact.events, &char_names);
        Self::fill_event_locations(&mut fact.events, &loc_names);
        Self::ensure_participants_in_characters(&fact.events, &mut fact.characters);
        Self::ensure_relation_persons_in_characters(&fact.relationships, &mut fact.characters);
    }

    fn validate_characters(characters: &mut Vec<CharacterFact>) {
        let mut merged: Vec<CharacterFact> = Vec::new();
        for mut c in std::mem::take(characters) {
            c.name = clamp_name(&c.name);
            if c.name.is_empty() {
                continue;
            }
            if let Some(existing) = merged.iter_mut().find(|m| m.name == c.name) {
                for alias in c.aliases.drain(..) {
                    if !existing.aliases.contains(&alias) {
                        existing.aliases.push(alias);
                    }
                }
                for loc in c.locations.drain(..) {
                    if !existing.locations.contains(&loc) {
                        existing.locations.push(loc);
                    }
                }
                for ab in c.abilities.drain(..) {
                    if !existing.abilities.contains(&ab) {
                        existing.abilities.push(ab);
                    }
                }
            } else {
                merged.push(c);
            }
        }
        *characters = merged;
    }

    fn validate_relationships(relationships: &mut Vec<RelationshipFact>, char_names: &HashSet<String>) {
        relationships.retain(|r| char_names.contains(&r.person_a) && char_names.contains(&r.person_b));
    }

    fn validate_locations(locations: &mut Vec<LocationFact>, char_names: &HashSet<String>) {
        let mut seen: HashSet<String> = HashSet::new();
        locations.retain(|loc| {
            if !seen.insert(loc.name.clone()) {
                return false;
            }
            !is_character_residence_hallucination(&loc.name, char_names)
        });
    }

    fn validate_item_events(items: &mut [ItemEventFact]) {
        for item in items.iter_mut() {
            if !VALID_ITEM_ACTIONS.contains(&item.action.as_str()) {
                item.action = "出现".to_string();
            }
        }
    }

    fn validate_org_events(orgs: &mut [OrgEventFact]) {
        for org in orgs.iter_mut() {
            if !VALID_ORG_ACTIONS.contains(&org.action.as_str()) {
                org.action = "加入".to_string();
            }
        }
    }

    fn validate_events(events: &mut Vec<EventFact>) {
        let mut seen: HashSet<String> = HashSet::new();
        events.retain_mut(|e| {
            e.summary = e.summary.trim().to_string();
            if e.summary.is_empty() {
                return false;
            }
            if !seen.insert(e.summary.clone()) {
                return false;
            }
            if !VALID_EVENT_TYPES.contains(&e.event_type.as_str()) {
                e.event_type = "其他".to_string();
            }
            if !VALID_IMPORTANCE.contains(&e.importance.as_str()) {
                e.importance = "medium".to_string();
            }
            true
        });
    }

    fn validate_concepts(concepts: &mut [crate::models::chapter_fact::ConceptFact]) {
        for c in concepts.iter_mut() {
            c.name = clamp_name(&c.name);
        }
    }

    /// Exact-name-only removal: a character's `locations` entry that exactly
    /// matches a known location name is dropped (the location already has
    /// its own record; keeping it on the character is redundant/stale).
    /// Intentionally not alias-aware — see design notes.
    fn remove_locations_from_characters(characters: &mut [CharacterFact], locations: &[LocationFact]) {
        let loc_names: HashSet<&str> = locations.iter().map(|l| l.name.as_str()).collect();
        for c in characters.iter_mut() {
            c.locations.retain(|l| !loc_names.contains(l.as_str()));
        }
    }

    fn fill_event_participants(events: &mut [EventFact], char_names: &HashSet<String>) {
        let mut names: Vec<&String> = char_names.iter().collect();
        names.sort_by_key(|n| std::cmp::Reverse(n.chars().count()));
        for e in events.iter_mut() {
            for name in &names {
                if e.summary.contains(name.as_str()) && !e.participants.contains(name) {
                    e.participants.push((*name).clone());
                }
            }
        }
    }

    fn fill_event_locations(events: &mut [EventFact], loc_names: &HashSet<String>) {
        let mut names: Vec<&String> = loc_names.iter().collect();
        names.sort_by_key(|n| std::cmp::Reverse(n.chars().count()));
        for e in events.iter_mut() {
            for name in &names {
                if e.summary.contains(name.as_str()) && !e.locations.contains(name) {
                    e.locations.push((*name).clone());
                }
            }
        }
    }

    fn ensure_participants_in_characters(events: &[EventFact], characters: &mut Vec<CharacterFact>) {
        let known: HashSet<String> = characters.iter().map(|c| c.name.clone()).collect();
        let mut to_add: Vec<String> = Vec::new();
        for e in events {
            for p in &e.participants {
                if !known.contains(p) && !to_add.contains(p) {
                    to_add.push(p.clone());
                }
            }
        }
        for name in to_add {
            characters.push(CharacterFact {
                name,
                ..Default::default()
            });
        }
    }

    fn ensure_relation_persons_in_characters(
        relationships: &[RelationshipFact],
        characters: &mut Vec<CharacterFact>,
    ) {
        let known: HashSet<String> = characters.iter().map(|c| c.name.clone()).collect();
        let mut to_add: Vec<String> = Vec::new();
        for r in relationships {
            for p in [&r.person_a, &r.person_b] {
                if !known.contains(p) && !to_add.contains(p) {
                    to_add.push(p.clone());
                }
            }
        }
        for name in to_add {
            characters.push(CharacterFact {
                name,
                ..Default::default()
            });
        }
    }
}

impl Default for FactValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_name(raw: &str) -> String {
    raw.trim().chars().take(NAME_MAX_LEN).collect()
}

fn character_names(characters: &[CharacterFact]) -> HashSet<String> {
    let mut set: HashSet<String> = HashSet::new();
    for c in characters {
        set.insert(c.name.clone());
        for a in &c.aliases {
            set.insert(a.clone());
        }
    }
    set
}

fn location_names(locations: &[LocationFact]) -> HashSet<String> {
    locations.iter().map(|l| l.name.clone()).collect()
}

fn is_character_residence_hallucination(name: &str, char_names: &HashSet<String>) -> bool {
    for suffix in CHARACTER_LOCATION_SUFFIXES {
        if let Some(base) = name.strip_suffix(suffix) {
            if !base.is_empty() && char_names.contains(base) {
                return true;
            }
        }
    }
    false
}

#[allow(dead_code)]
fn name_len_ok(name: &str) -> bool {
    let len = name.chars().count();
    (NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chapter_fact::ConceptFact;
    use surrealdb::RecordId;

    fn empty_fact() -> ChapterFact {
        ChapterFact::empty(
            RecordId::from(("novels", "n1")),
            RecordId::from(("chapters", "c1")),
            1,
        )
    }

    #[test]
    fn merges_duplicate_characters_by_name() {
        let mut fact = empty_fact();
        fact.characters.push(CharacterFact {
            name: "张三".into(),
            aliases: vec!["阿三".into()],
            ..Default::default()
        });
        fact.characters.push(CharacterFact {
            name: "张三".into(),
            locations: vec!["京城".into()],
            ..Default::default()
        });
        let v = FactValidator::new();
        v.validate(&mut fact);
        assert_eq!(fact.characters.len(), 1);
        assert_eq!(fact.characters[0].aliases, vec!["阿三"]);
        assert_eq!(fact.characters[0].locations, vec!["京城"]);
    }

    #[test]
    fn drops_relationship_with_unknown_person() {
        let mut fact = empty_fact();
        fact.characters.push(CharacterFact {
            name: "张三".into(),
            ..Default::default()
        });
        fact.relationships.push(RelationshipFact {
            person_a: "张三".into(),
            person_b: "李四".into(),
            relation_type: "师徒".into(),
            description: None,
        });
        let v = FactValidator::new();
        v.validate(&mut fact);
        assert!(fact.relationships.is_empty());
    }

    #[test]
    fn drops_character_residence_hallucination() {
        let mut fact = empty_fact();
        fact.characters.push(CharacterFact {
            name: "张三".into(),
            ..Default::default()
        });
        fact.locations.push(LocationFact {
            name: "张三府邸".into(),
            loc_type: None,
            parent: None,
        });
        let v = FactValidator::new();
        v.validate(&mut fact);
        assert!(fact.locations.is_empty());
    }

    #[test]
    fn normalizes_invalid_item_action() {
        let mut fact = empty_fact();
        fact.items.push(ItemEventFact {
            name: "青锋剑".into(),
            action: "不明".into(),
            holder: None,
        });
        let v = FactValidator::new();
        v.validate(&mut fact);
        assert_eq!(fact.items[0].action, "出现");
    }

    #[test]
    fn fills_event_participants_from_summary() {
        let mut fact = empty_fact();
        fact.characters.push(CharacterFact {
            name: "张三".into(),
            ..Default::default()
        });
        fact.events.push(EventFact {
            summary: "张三大战妖王".into(),
            event_type: "战斗".into(),
            importance: "high".into(),
            participants: vec![],
            locations: vec![],
        });
        let v = FactValidator::new();
        v.validate(&mut fact);
        assert_eq!(fact.events[0].participants, vec!["张三"]);
    }

    #[test]
    fn clamps_concept_names() {
        assert_eq!(clamp_name("  灵气  "), "灵气");
    }
}
