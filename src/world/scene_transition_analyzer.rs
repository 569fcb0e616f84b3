//! Infers spatial relationships from how scenes flow between locations
//! across a chapter sequence: two places the story moves between
//! constantly are probably siblings under a shared parent, a place one
//! name contains another's is probably its parent, and a place reached
//! from many distinct others is probably a hub (a city, not a room).

use std::collections::{HashMap, HashSet};

use crate::models::world_structure::ParentVote;

#[derive(Debug, Clone)]
struct Edge {
    from: String,
    to: String,
    count: u32,
}

pub struct SceneTransitionAnalyzer {
    hub_in_degree_threshold: usize,
}

pub struct TransitionAnalysis {
    /// Parent votes derived from name containment and hub promotion,
    /// keyed by child location name.
    pub votes: HashMap<String, Vec<ParentVote>>,
    /// Groups of locations that transition into each other often enough to
    /// be treated as siblings (same likely parent, order-independent).
    pub sibling_groups: Vec<HashSet<String>>,
    /// Locations with enough distinct inbound neighbors to be treated as
    /// hubs rather than leaf sites.
    pub hubs: HashSet<String>,
}

impl SceneTransitionAnalyzer {
    pub fn new() -> Self {
        Self {
            hub_in_degree_threshold: 4,
        }
    }

    /// `scenes` is the chapter-ordered sequence of location names the story
    /// visits; consecutive duplicates are treated as one scene.
    pub fn analyze(&self, scenes: &[String]) -> TransitionAnalysis {
        let edges = build_edges(scenes);

        let mut votes: HashMap<String, Vec<ParentVote>> = HashMap::new();
        let mut in_neighbors: HashMap<String, HashSet<String>> = HashMap::new();
        for edge in &edges {
            in_neighbors
                .entry(edge.to.clone())
                .or_default()
                .insert(edge.from.clone());
        }

        let sibling_groups = self.bidirectional_siblings(&edges);
        let hubs = self.detect_hubs(&in_neighbors);

        for edge in &edges {
            if let Some(parent) = name_containment_parent(&edge.from, &edge.to) {
                let child = if parent == edge.from { &edge.to } else { &edge.from };
                votes.entry(child.clone()).or_default().push(ParentVote {
                    parent: parent.clone(),
                    weight: edge.count as i64,
                    reason: "name_containment".into(),
                });
            }
        }

        for hub in &hubs {
            if let Some(neighbors) = in_neighbors.get(hub) {
                for neighbor in neighbors {
                    if neighbor == hub || hubs.contains(neighbor) {
                        continue;
                    }
                    votes.entry(neighbor.clone()).or_default().push(ParentVote {
                        parent: hub.clone(),
                        weight: 2,
                        reason: "hub_transition".into(),
                    });
                }
            }
        }

        TransitionAnalysis {
            votes,
            sibling_groups,
            hubs,
        }
    }

    /// Union-find over edges where `from->to` and `to->from` both occur at
    /// least once: these pairs are visited back-and-forth, the hallmark of
    /// rooms in the same building or stops on the same street.
    fn bidirectional_siblings(&self, edges: &[Edge]) -> Vec<HashSet<String>> {
        let mut forward: HashSet<(String, String)> = HashSet::new();
        for edge in edges {
            forward.insert((edge.from.clone(), edge.to.clone()));
        }

        let mut parent: HashMap<String, String> = HashMap::new();
        let find = |parent: &mut HashMap<String, String>, x: &str| -> String {
            let mut root = x.to_string();
            while let Some(p) = parent.get(&root) {
                if p == &root {
                    break;
                }
                root = p.clone();
            }
            root
        };

        for edge in edges {
            parent.entry(edge.from.clone()).or_insert_with(|| edge.from.clone());
            parent.entry(edge.to.clone()).or_insert_with(|| edge.to.clone());
        }

        for edge in edges {
            if forward.contains(&(edge.to.clone(), edge.from.clone())) {
                let ra = find(&mut parent, &edge.from);
                let rb = find(&mut parent, &edge.to);
                if ra != rb {
                    parent.insert(ra, rb);
                }
            }
        }

        let mut groups: HashMap<String, HashSet<String>> = HashMap::new();
        let keys: Vec<String> = parent.keys().cloned().collect();
        for node in keys {
            let root = find(&mut parent, &node);
            groups.entry(root).or_default().insert(node);
        }
        groups.into_values().filter(|g| g.len() > 1).collect()
    }

    fn detect_hubs(&self, in_neighbors: &HashMap<String, HashSet<String>>) -> HashSet<String> {
        in_neighbors
            .iter()
            .filter(|(_, neighbors)| neighbors.len() >= self.hub_in_degree_threshold)
            .map(|(node, _)| node.clone())
            .collect()
    }
}

impl Default for SceneTransitionAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn build_edges(scenes: &[String]) -> Vec<Edge> {
    let mut tally: HashMap<(String, String), u32> = HashMap::new();
    let mut dedup: Vec<&String> = Vec::new();
    for scene in scenes {
        if dedup.last().map(|s| *s == scene).unwrap_or(false) {
            continue;
        }
        dedup.push(scene);
    }
    for pair in dedup.windows(2) {
        let from = pair[0].clone();
        let to = pair[1].clone();
        if from == to {
            continue;
        }
        *tally.entry((from, to)).or_insert(0) += 1;
    }
    tally
        .into_iter()
        .map(|((from, to), count)| Edge { from, to, count })
        .collect()
}

/// If one name is a strict substring of the other (by character, not byte,
/// to stay CJK-safe) the longer name is the parent: "大相国寺后院" contains
/// "大相国寺".
fn name_containment_parent(a: &str, b: &str) -> Option<String> {
    if a == b {
        return None;
    }
    if a.chars().count() > b.chars().count() && a.contains(b) {
        Some(a.to_string())
    } else if b.chars().count() > a.chars().count() && b.contains(a) {
        Some(b.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_bidirectional_sibling_pair() {
        let scenes = vec![
            "客厅".to_string(),
            "厨房".to_string(),
            "客厅".to_string(),
            "厨房".to_string(),
        ];
        let analysis = SceneTransitionAnalyzer::new().analyze(&scenes);
        assert!(analysis
            .sibling_groups
            .iter()
            .any(|g| g.contains("客厅") && g.contains("厨房")));
    }

    #[test]
    fn name_containment_picks_longer_name_as_parent() {
        assert_eq!(
            name_containment_parent("大相国寺", "大相国寺后院"),
            Some("大相国寺后院".to_string())
        );
    }

    #[test]
    fn hub_with_many_inbound_neighbors_is_detected() {
        let scenes = vec![
            "甲地".to_string(),
            "客栈".to_string(),
            "乙地".to_string(),
            "客栈".to_string(),
            "丙地".to_string(),
            "客栈".to_string(),
            "丁地".to_string(),
            "客栈".to_string(),
        ];
        let analysis = SceneTransitionAnalyzer::new().analyze(&scenes);
        assert!(analysis.hubs.contains("客栈"));
    }
}
