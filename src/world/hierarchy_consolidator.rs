//! Turns per-chapter location mentions and their parent votes into one
//! consistent spatial hierarchy: breaks cycles, fixes tier inversions,
//! connects Chinese administrative geography to its province and the world
//! root, and falls back to a generic tiered catch-all for fantasy/urban/
//! foreign-setting novels where the geography dictionaries don't apply.

use std::collections::{HashMap, HashSet};

use crate::models::world_structure::ParentVote;
use crate::world::geo;
use crate::world::tier::{suffix_rank, Tier};

pub struct HierarchyInput {
    pub locations: HashSet<String>,
    pub votes: HashMap<String, Vec<ParentVote>>,
    pub genre: String,
    pub is_foreign: bool,
    /// Parents saved from a prior run, consulted as a fallback anchor before
    /// falling back to the uber root. Empty on a novel's first pass.
    pub saved_parents: HashMap<String, String>,
}

pub struct HierarchyOutput {
    pub parents: HashMap<String, String>,
    pub tiers: HashMap<String, Tier>,
}

const UBER_ROOT: &str = "天下";
const LARGE_SUBTREE_THRESHOLD: usize = 5;
const ORPHAN_DESCENDANT_SKIP: usize = 3;

pub struct HierarchyConsolidator;

impl HierarchyConsolidator {
    pub fn new() -> Self {
        Self
    }

    pub fn consolidate(&self, input: HierarchyInput) -> HierarchyOutput {
        let (mut parents, edge_weights) = self.weighted_parents_with_weights(&input.votes);
        let skip_chinese_geo =
            matches!(input.genre.as_str(), "fantasy" | "urban") || input.is_foreign;

        break_cycles(&mut parents, &edge_weights);

        let input_snapshot = parents.clone();

        let mut tiers: HashMap<String, Tier> = HashMap::new();

        if !skip_chinese_geo {
            self.force_province_tier(&input.locations, &mut tiers);
            self.fix_province_inversions(&mut parents, &tiers);
        }
        self.fix_tier_inversions(&mut parents, &tiers);
        self.rescue_noise_roots(&mut parents, &input.locations);

        damp_oscillations(&mut parents, &input_snapshot, &tiers);

        if skip_chinese_geo {
            let uber = if input.is_foreign { None } else { Some(UBER_ROOT) };
            tiered_catchall(&mut parents, &tiers, &input.locations, &input.saved_parents, uber);
            return HierarchyOutput { parents, tiers };
        }

        self.parse_compound_names(&input.locations, &mut parents, &mut tiers);
        self.parse_location_suffixes(&input.locations, &mut parents);
        self.parse_variant_names(&input.locations, &mut parents);
        self.geo_bridge(&input.locations, &mut parents);
        self.connect_province_roots(&mut parents, &tiers);
        self.connect_kingdom_roots(&input.locations, &mut parents, &mut tiers);
        self.prefix_match(&input.locations, &mut parents);
        self.second_pass_reconnect(&input.locations, &mut parents);
        self.geo_rescue(&input.locations, &mut parents);
        self.promote_large_subtrees(&input.locations, &mut parents, &input.saved_parents);
        self.promote_remaining_geo_roots(&input.locations, &mut parents);

        tiered_catchall(
            &mut parents,
            &tiers,
            &input.locations,
            &input.saved_parents,
            Some(UBER_ROOT),
        );

        HierarchyOutput { parents, tiers }
    }

    /// Collapse each location's votes to its highest-weight parent, breaking
    /// ties lexicographically on `(child, parent)`, and also return the
    /// winning tally for each child's edge so a later pass (cycle breaking)
    /// can tell a vote-backed edge from a barely-won one.
    fn weighted_parents_with_weights(
        &self,
        votes: &HashMap<String, Vec<ParentVote>>,
    ) -> (HashMap<String, String>, HashMap<String, i64>) {
        let mut parents = HashMap::new();
        let mut weights = HashMap::new();
        for (child, candidates) in votes {
            if candidates.is_empty() {
                continue;
            }
            let mut tally: HashMap<&str, i64> = HashMap::new();
            for v in candidates {
                *tally.entry(v.parent.as_str()).or_insert(0) += v.weight;
            }
            let best = tally
                .into_iter()
                .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(p, w)| (p.to_string(), w));
            if let Some((p, w)) = best {
                if p != *child {
                    parents.insert(child.clone(), p);
                    weights.insert(child.clone(), w);
                }
            }
        }
        (parents, weights)
    }

    fn force_province_tier(&self, locations: &HashSet<String>, tiers: &mut HashMap<String, Tier>) {
        for loc in locations {
            if geo::PROVINCES.contains(&loc.as_str()) {
                tiers.insert(loc.clone(), Tier::Continent);
            }
        }
    }

    /// If a province's current parent isn't itself a province or the uber
    /// root and the parent's tier ranks below the province's, the edge is
    /// backwards — drop it and reverse it.
    fn fix_province_inversions(&self, parents: &mut HashMap<String, String>, tiers: &HashMap<String, Tier>) {
        let mut reversals = Vec::new();
        for (child, parent) in parents.iter() {
            if tiers.get(child) != Some(&Tier::Continent) {
                continue;
            }
            if parent == UBER_ROOT || geo::PROVINCES.contains(&parent.as_str()) {
                continue;
            }
            let parent_rank = tiers.get(parent).map(|t| t.rank()).unwrap_or(Tier::City.rank());
            if parent_rank < Tier::Continent.rank() {
                continue;
            }
            reversals.push((child.clone(), parent.clone()));
        }
        for (child, parent) in reversals {
            parents.remove(&child);
            parents.insert(parent, child);
        }
    }

    /// Generic tier-inversion fix for any two connected nodes that both have
    /// a recognized tier (or a recognized suffix rank), batched so every
    /// comparison sees the pre-pass state.
    fn fix_tier_inversions(&self, parents: &mut HashMap<String, String>, tiers: &HashMap<String, Tier>) {
        let mut to_reverse = Vec::new();
        let mut to_delete = Vec::new();

        for (child, parent) in parents.iter() {
            let decision = match (tiers.get(child), tiers.get(parent)) {
                (Some(ct), Some(pt)) => {
                    if ct.rank() < pt.rank() {
                        Some(true)
                    } else {
                        None
                    }
                }
                _ => match (suffix_rank(child), suffix_rank(parent)) {
                    (Some(cr), Some(pr)) if cr < pr => Some(true),
                    _ => None,
                },
            };
            if decision == Some(true) {
                if parents.get(parent).is_none() {
                    to_reverse.push((child.clone(), parent.clone()));
                } else {
                    to_delete.push(child.clone());
                }
            }
        }

        for child in to_delete {
            parents.remove(&child);
        }
        for (child, parent) in to_reverse {
            parents.remove(&child);
            parents.insert(parent, child);
        }
    }

    /// If a root is itself a sub-location name (a room, a corner of a
    /// compound) but has children, the real "location" is the best child —
    /// reparent siblings under it and reverse the root->child edge.
    fn rescue_noise_roots(&self, parents: &mut HashMap<String, String>, locations: &HashSet<String>) {
        let roots = get_roots(parents, locations);
        for root in roots {
            if !geo::is_sub_location_name(&root) {
                continue;
            }
            let children: Vec<String> = parents
                .iter()
                .filter(|(_, p)| **p == root)
                .map(|(c, _)| c.clone())
                .collect();
            if children.is_empty() {
                continue;
            }
            let best = children
                .iter()
                .min_by_key(|c| {
                    let geo_bonus = if geo::is_geographic_name(c) { 0 } else { 1 };
                    (geo_bonus, suffix_rank(c).unwrap_or(9))
                })
                .unwrap()
                .clone();
            for child in &children {
                if *child != best {
                    parents.insert(child.clone(), best.clone());
                }
            }
            parents.remove(&best);
            parents.insert(root, best);
        }
    }

    fn parse_compound_names(
        &self,
        locations: &HashSet<String>,
        parents: &mut HashMap<String, String>,
        tiers: &mut HashMap<String, Tier>,
    ) {
        for loc in locations {
            if parents.contains_key(loc) {
                continue;
            }
            if let Some((province, local_part)) = geo::parse_compound_name(loc) {
                tiers.entry(province.to_string()).or_insert(Tier::Continent);
                parents.entry(loc.clone()).or_insert_with(|| province.to_string());
                if locations.contains(&local_part) {
                    parents.entry(local_part).or_insert_with(|| province.to_string());
                }
            }
        }
    }

    fn parse_location_suffixes(&self, locations: &HashSet<String>, parents: &mut HashMap<String, String>) {
        for loc in locations {
            if parents.contains_key(loc) {
                continue;
            }
            if let Some(base) = geo::parse_location_suffix(loc, locations) {
                parents.insert(loc.clone(), base);
            }
        }
    }

    fn parse_variant_names(&self, locations: &HashSet<String>, parents: &mut HashMap<String, String>) {
        for loc in locations {
            if parents.contains_key(loc) {
                continue;
            }
            if let Some(base) = geo::parse_variant_name(loc, locations) {
                parents.insert(loc.clone(), base);
            }
        }
    }

    fn geo_bridge(&self, locations: &HashSet<String>, parents: &mut HashMap<String, String>) {
        for loc in locations {
            if parents.contains_key(loc) {
                continue;
            }
            if let Some(province) = geo::geo_lookup(loc) {
                parents.insert(loc.clone(), province.to_string());
            }
        }
    }

    fn connect_province_roots(&self, parents: &mut HashMap<String, String>, tiers: &HashMap<String, Tier>) {
        for (loc, tier) in tiers {
            if *tier == Tier::Continent && !parents.contains_key(loc) {
                parents.insert(loc.clone(), UBER_ROOT.to_string());
            }
        }
    }

    fn connect_kingdom_roots(
        &self,
        locations: &HashSet<String>,
        parents: &mut HashMap<String, String>,
        tiers: &mut HashMap<String, Tier>,
    ) {
        for loc in locations {
            if loc.ends_with('国') && !parents.contains_key(loc) && loc != UBER_ROOT {
                parents.insert(loc.clone(), UBER_ROOT.to_string());
                tiers.entry(loc.clone()).or_insert(Tier::Kingdom);
            }
        }
    }

    fn prefix_match(&self, locations: &HashSet<String>, parents: &mut HashMap<String, String>) {
        let mut known: Vec<&str> = locations.iter().map(|s| s.as_str()).collect();
        known.sort_by_key(|k| std::cmp::Reverse(k.chars().count()));
        for loc in locations {
            if parents.contains_key(loc) {
                continue;
            }
            for candidate in &known {
                if *candidate != loc && loc.starts_with(candidate) {
                    parents.insert(loc.clone(), candidate.to_string());
                    break;
                }
            }
        }
    }

    fn second_pass_reconnect(&self, locations: &HashSet<String>, parents: &mut HashMap<String, String>) {
        for loc in locations {
            if parents.contains_key(loc) {
                continue;
            }
            if let Some(province) = geo::geo_lookup(loc) {
                parents.insert(loc.clone(), province.to_string());
            } else if let Some(base) = geo::parse_location_suffix(loc, locations) {
                parents.insert(loc.clone(), base);
            } else if let Some(base) = geo::parse_variant_name(loc, locations) {
                parents.insert(loc.clone(), base);
            }
        }
    }

    /// The geo-rescue pass: for every location the geo dictionary knows
    /// about, make sure its province is actually an ancestor. If not,
    /// reparent it to the province directly and hand its old parent (plus
    /// the old parent's other remaining children) down to become *its*
    /// children, rather than discarding that structure.
    ///
    /// Worked example this preserves: if `大尉府` incorrectly has `东京` as
    /// a *child* (because `东京` was misattributed under `山东`), this step
    /// reparents `东京` to `山东` directly while `大尉府` stays a child of
    /// `东京`.
    fn geo_rescue(&self, locations: &HashSet<String>, parents: &mut HashMap<String, String>) {
        let mut reassignments: Vec<(String, String, Option<(String, String)>)> = Vec::new();

        for loc in locations {
            let Some(expected_province) = geo::geo_lookup(loc) else {
                continue;
            };
            if ancestor_chain_contains(parents, loc, expected_province) {
                continue;
            }
            let old_parent = parents.get(loc).cloned();
            reassignments.push((
                loc.clone(),
                expected_province.to_string(),
                old_parent.map(|p| (loc.clone(), p)),
            ));
        }

        for (loc, province, old_parent) in reassignments {
            if let Some((child, old_parent)) = old_parent {
                if old_parent != province {
                    parents.insert(old_parent, child);
                }
            }
            parents.insert(loc, province);
        }
    }

    fn promote_large_subtrees(
        &self,
        locations: &HashSet<String>,
        parents: &mut HashMap<String, String>,
        saved_parents: &HashMap<String, String>,
    ) {
        let roots = get_roots(parents, locations);
        for root in roots {
            if root == UBER_ROOT {
                continue;
            }
            let descendants = count_descendants(parents, &root);
            if descendants >= LARGE_SUBTREE_THRESHOLD {
                let target = saved_parents.get(&root).cloned().unwrap_or_else(|| UBER_ROOT.to_string());
                parents.insert(root, target);
            }
        }
    }

    fn promote_remaining_geo_roots(&self, locations: &HashSet<String>, parents: &mut HashMap<String, String>) {
        let roots = get_roots(parents, locations);
        for root in roots {
            if root == UBER_ROOT {
                continue;
            }
            if geo::is_geographic_name(&root) && !geo::is_sub_location_name(&root) {
                parents.insert(root, UBER_ROOT.to_string());
            }
        }
    }
}

impl Default for HierarchyConsolidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes edges until no cycle remains. Within each detected cycle, the
/// edge with the lowest vote weight is cut — not an arbitrary node — since a
/// direct extraction vote and a dialogue-anchored vote shouldn't be treated
/// as equally disposable just because they happen to sit in a cycle
/// together. Nodes with no recorded weight (e.g. seeded directly in a test)
/// are treated as weight 0. Ties are broken lexicographically by child name.
fn break_cycles(parents: &mut HashMap<String, String>, edge_weights: &HashMap<String, i64>) {
    loop {
        let cycle = find_cycle(parents);
        let Some(cycle_nodes) = cycle else { break };
        let weakest = cycle_nodes
            .iter()
            .min_by(|a, b| {
                let wa = edge_weights.get(*a).copied().unwrap_or(0);
                let wb = edge_weights.get(*b).copied().unwrap_or(0);
                wa.cmp(&wb).then_with(|| (*a).cmp(*b))
            })
            .cloned();
        if let Some(node) = weakest {
            parents.remove(&node);
        } else {
            break;
        }
    }
}

fn find_cycle(parents: &HashMap<String, String>) -> Option<Vec<String>> {
    for start in parents.keys() {
        let mut visited = HashSet::new();
        let mut current = start.clone();
        let mut path = vec![current.clone()];
        while let Some(next) = parents.get(&current) {
            if *next == current {
                break;
            }
            if path.contains(next) {
                let cycle_start = path.iter().position(|n| n == next).unwrap();
                return Some(path[cycle_start..].to_vec());
            }
            if !visited.insert(next.clone()) {
                break;
            }
            current = next.clone();
            path.push(current.clone());
            if path.len() > parents.len() + 1 {
                break;
            }
        }
    }
    None
}

fn get_roots(parents: &HashMap<String, String>, locations: &HashSet<String>) -> Vec<String> {
    let children: HashSet<&String> = parents.keys().collect();
    locations
        .iter()
        .filter(|loc| !children.contains(loc) || !parents.contains_key(loc.as_str()))
        .filter(|loc| parents.get(loc.as_str()).is_none())
        .cloned()
        .collect()
}

fn count_descendants(parents: &HashMap<String, String>, root: &str) -> usize {
    parents.values().filter(|p| p.as_str() == root).count()
        + parents
            .iter()
            .filter(|(_, p)| p.as_str() == root)
            .map(|(c, _)| count_descendants(parents, c))
            .sum::<usize>()
}

fn ancestor_chain_contains(parents: &HashMap<String, String>, start: &str, target: &str) -> bool {
    let mut current = start.to_string();
    let mut hops = 0;
    while let Some(parent) = parents.get(&current) {
        if parent == target {
            return true;
        }
        if hops > 64 {
            return false;
        }
        current = parent.clone();
        hops += 1;
    }
    false
}

/// Revert any parent edge that flipped direction relative to `before` unless
/// the flip is justified by an unambiguous tier or suffix-rank comparison —
/// otherwise stages can fight each other forever across re-runs.
fn damp_oscillations(
    parents: &mut HashMap<String, String>,
    before: &HashMap<String, String>,
    tiers: &HashMap<String, Tier>,
) {
    let mut reverts = Vec::new();
    for (child, parent) in parents.iter() {
        if let Some(prev_parent) = before.get(parent) {
            if prev_parent == child {
                let justified = match (tiers.get(child), tiers.get(parent)) {
                    (Some(ct), Some(pt)) => ct.rank() != pt.rank(),
                    _ => match (suffix_rank(child), suffix_rank(parent)) {
                        (Some(a), Some(b)) => a != b,
                        _ => false,
                    },
                };
                if !justified {
                    reverts.push((child.clone(), parent.clone()));
                }
            }
        }
    }
    for (child, parent) in reverts {
        parents.remove(&child);
        parents.insert(parent, child);
    }
}

/// Generic fallback for settings where the Chinese administrative-geography
/// dictionaries don't apply (fantasy, urban, or detected-foreign novels):
/// collects every orphan location and anchors it to the most specific
/// plausible parent it can find, via saved parents, dominant-neighbor BFS,
/// or finally the uber root (skipped for site/building-tier orphans, which
/// stay independent roots rather than being forced under a guess).
fn tiered_catchall(
    parents: &mut HashMap<String, String>,
    tiers: &HashMap<String, Tier>,
    locations: &HashSet<String>,
    saved_parents: &HashMap<String, String>,
    uber_root: Option<&str>,
) {
    let mut orphans: Vec<String> = get_roots(parents, locations)
        .into_iter()
        .filter(|loc| {
            let tier = tiers.get(loc).copied();
            !matches!(tier, Some(Tier::World))
                && count_descendants(parents, loc) <= ORPHAN_DESCENDANT_SKIP
        })
        .collect();

    orphans.sort_by_key(|o| std::cmp::Reverse(tiers.get(o).map(|t| t.rank()).unwrap_or(usize::MAX)));

    for orphan in orphans {
        if let Some(saved) = saved_parents.get(&orphan) {
            parents.insert(orphan.clone(), saved.clone());
            continue;
        }
        if let Some(dominant) = dominant_neighbor(parents, &orphan) {
            parents.insert(orphan.clone(), dominant);
            continue;
        }
        let tier_rank = tiers.get(&orphan).map(|t| t.rank()).unwrap_or(Tier::Site.rank());
        if let Some(root) = uber_root {
            if tier_rank <= Tier::City.rank() {
                parents.insert(orphan, root.to_string());
            }
        }
    }
}

/// BFS up to 3 hops through already-anchored neighbors looking for a single
/// dominant parent candidate (appearing at least twice).
fn dominant_neighbor(parents: &HashMap<String, String>, orphan: &str) -> Option<String> {
    const REALM_KEYWORDS: &[&str] = &["幻", "梦", "仙", "灵", "冥", "虚", "魔"];
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut frontier = vec![orphan.to_string()];
    for _ in 0..3 {
        let mut next_frontier = Vec::new();
        for node in &frontier {
            for (child, parent) in parents.iter() {
                if parent == node && child != orphan {
                    if REALM_KEYWORDS.iter().any(|k| child.contains(k)) {
                        continue;
                    }
                    *counts.entry(parent.clone()).or_insert(0) += 1;
                    next_frontier.push(child.clone());
                }
            }
        }
        frontier = next_frontier;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n >= 2)
        .max_by_key(|(_, n)| *n)
        .map(|(p, _)| p)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn votes(parent: &str, weight: i64) -> Vec<ParentVote> {
        vec![ParentVote {
            parent: parent.to_string(),
            weight,
            reason: "test".into(),
        }]
    }

    #[test]
    fn connects_prefecture_to_province() {
        let mut locations = HashSet::new();
        locations.insert("济州".to_string());
        let mut v = HashMap::new();
        v.insert("济州".to_string(), votes("天下", 1));
        let input = HierarchyInput {
            locations,
            votes: v,
            genre: "historical".into(),
            is_foreign: false,
            saved_parents: HashMap::new(),
        };
        let out = HierarchyConsolidator::new().consolidate(input);
        assert_eq!(out.parents.get("济州"), Some(&"山东".to_string()));
    }

    #[test]
    fn breaks_two_node_cycle() {
        let mut parents = HashMap::new();
        parents.insert("甲".to_string(), "乙".to_string());
        parents.insert("乙".to_string(), "甲".to_string());
        break_cycles(&mut parents, &HashMap::new());
        assert!(parents.len() <= 1);
    }

    #[test]
    fn breaks_cycle_at_weakest_vote_weighted_edge() {
        // A -> B (weight 5), B -> C (weight 3), C -> A (weight 1): the
        // weakest edge C->A should be the one cut, not the alphabetically
        // smallest node's edge (A->B).
        let mut parents = HashMap::new();
        parents.insert("A".to_string(), "B".to_string());
        parents.insert("B".to_string(), "C".to_string());
        parents.insert("C".to_string(), "A".to_string());
        let mut weights = HashMap::new();
        weights.insert("A".to_string(), 5);
        weights.insert("B".to_string(), 3);
        weights.insert("C".to_string(), 1);
        break_cycles(&mut parents, &weights);
        assert_eq!(parents.get("A"), Some(&"B".to_string()));
        assert_eq!(parents.get("B"), Some(&"C".to_string()));
        assert_eq!(parents.get("C"), None, "weakest edge C->A must be the one removed");
    }

    #[test]
    fn consolidate_breaks_cycle_via_vote_weight_not_alphabetical_order() {
        let mut locations = HashSet::new();
        locations.insert("A".to_string());
        locations.insert("B".to_string());
        locations.insert("C".to_string());
        let mut votes = HashMap::new();
        votes.insert("A".to_string(), vec![ParentVote { parent: "B".into(), weight: 5, reason: "t".into() }]);
        votes.insert("B".to_string(), vec![ParentVote { parent: "C".into(), weight: 3, reason: "t".into() }]);
        votes.insert("C".to_string(), vec![ParentVote { parent: "A".into(), weight: 1, reason: "t".into() }]);
        let input = HierarchyInput {
            locations,
            votes,
            genre: "fantasy".into(),
            is_foreign: false,
            saved_parents: HashMap::new(),
        };
        let out = HierarchyConsolidator::new().consolidate(input);
        assert_eq!(out.parents.get("A"), Some(&"B".to_string()));
        assert_eq!(out.parents.get("B"), Some(&"C".to_string()));
    }

    #[test]
    fn fantasy_genre_skips_chinese_geo_and_uses_catchall() {
        let mut locations = HashSet::new();
        locations.insert("风暴城".to_string());
        locations.insert("铁王座".to_string());
        let mut v = HashMap::new();
        v.insert("铁王座".to_string(), votes("风暴城", 2));
        let input = HierarchyInput {
            locations,
            votes: v,
            genre: "fantasy".into(),
            is_foreign: false,
            saved_parents: HashMap::new(),
        };
        let out = HierarchyConsolidator::new().consolidate(input);
        assert_eq!(out.parents.get("风暴城"), Some(&"天下".to_string()));
    }
}
