mod common;

use std::collections::{HashMap, HashSet};

use common::harness::TestHarness;
use loregraph::models::novel::{self, Novel};
use loregraph::models::world_structure::{self, ParentVote, WorldStructure};
use loregraph::world::{HierarchyConsolidator, HierarchyInput};

#[tokio::test]
async fn consolidated_hierarchy_persists_and_reloads() {
    let harness = TestHarness::new().await;
    let novel = novel::create(&harness.db, Novel::new("Hierarchy Novel", Some("wuxia".into())))
        .await
        .unwrap();
    let novel_id = novel.id.clone().unwrap();

    let mut locations = HashSet::new();
    for name in ["济州", "梁山", "梁山泊"] {
        locations.insert(name.to_string());
    }

    let mut votes: HashMap<String, Vec<ParentVote>> = HashMap::new();
    votes.insert(
        "梁山泊".to_string(),
        vec![ParentVote {
            parent: "梁山".to_string(),
            weight: 3,
            reason: "mentioned as part of".to_string(),
        }],
    );
    votes.insert(
        "梁山".to_string(),
        vec![ParentVote {
            parent: "济州".to_string(),
            weight: 2,
            reason: "fact extraction".to_string(),
        }],
    );

    let input = HierarchyInput {
        locations,
        votes,
        genre: "other".to_string(),
        is_foreign: false,
        saved_parents: HashMap::new(),
    };

    let output = HierarchyConsolidator::new().consolidate(input);

    assert_eq!(output.parents.get("梁山泊"), Some(&"梁山".to_string()));
    assert_eq!(output.parents.get("梁山"), Some(&"济州".to_string()));
    // 济州 should bridge to its province through the geography dictionary.
    assert_eq!(output.parents.get("济州"), Some(&"山东".to_string()));

    let mut nodes = Vec::new();
    for (name, tier) in &output.tiers {
        let mut node = WorldStructure::new(novel_id.clone(), name.clone(), tier.as_str());
        node.parent = output.parents.get(name).cloned();
        nodes.push(node);
    }
    world_structure::replace_all(&harness.db, &novel_id, nodes).await.unwrap();

    let reloaded = world_structure::list_for_novel(&harness.db, &novel_id).await.unwrap();
    let by_name: HashMap<String, WorldStructure> =
        reloaded.into_iter().map(|n| (n.name.clone(), n)).collect();

    assert_eq!(by_name.get("梁山泊").unwrap().parent, Some("梁山".to_string()));
    assert_eq!(by_name.get("梁山").unwrap().parent, Some("济州".to_string()));
}

#[tokio::test]
async fn user_override_outweighs_extracted_votes() {
    let mut locations = HashSet::new();
    locations.insert("小院".to_string());
    locations.insert("别苑".to_string());

    let mut votes: HashMap<String, Vec<ParentVote>> = HashMap::new();
    votes.insert(
        "小院".to_string(),
        vec![ParentVote {
            parent: "别苑".to_string(),
            weight: 2,
            reason: "fact extraction".to_string(),
        }],
    );
    // A pinned user override should always outrank the fact-extraction vote.
    votes
        .get_mut("小院")
        .unwrap()
        .push(ParentVote {
            parent: "王府".to_string(),
            weight: 1000,
            reason: "user override".to_string(),
        });

    let input = HierarchyInput {
        locations,
        votes,
        genre: "other".to_string(),
        is_foreign: false,
        saved_parents: HashMap::new(),
    };

    let output = HierarchyConsolidator::new().consolidate(input);
    assert_eq!(output.parents.get("小院"), Some(&"王府".to_string()));
}
