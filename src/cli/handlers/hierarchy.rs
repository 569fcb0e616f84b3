use std::collections::{HashMap, HashSet};

use surrealdb::RecordId;

use crate::cli::output::{output_json_list, print_success, print_table, OutputMode};
use crate::init::AppContext;
use crate::models::chapter_fact;
use crate::models::world_structure::{self, ParentVote, WorldStructure};
use crate::world::{HierarchyConsolidator, HierarchyInput, HierarchyReviewer};

fn novel_ref(novel_id: &str) -> RecordId {
    RecordId::from(("novels", novel_id))
}

pub async fn handle_show(ctx: &AppContext, novel_id: &str, mode: OutputMode) -> anyhow::Result<()> {
    let novel = novel_ref(novel_id);
    let nodes = world_structure::list_for_novel(&ctx.db, &novel).await?;

    match mode {
        OutputMode::Json => output_json_list(&nodes),
        _ => {
            let mut rows: Vec<Vec<String>> = nodes
                .iter()
                .map(|n| {
                    vec![
                        n.name.clone(),
                        n.parent.clone().unwrap_or_else(|| "-".to_string()),
                        n.tier.clone(),
                        n.layer.clone().unwrap_or_else(|| "-".to_string()),
                    ]
                })
                .collect();
            rows.sort();
            print_table(&["Location", "Parent", "Tier", "Layer"], rows);
        }
    }

    Ok(())
}

/// Re-derives the hierarchy from scratch from every chapter fact's location
/// mentions, ignoring whatever the incremental per-chapter passes had
/// already converged on. User-pinned overrides still win.
pub async fn handle_rebuild(ctx: &AppContext, novel_id: &str, mode: OutputMode) -> anyhow::Result<()> {
    let novel = novel_ref(novel_id);
    let facts = chapter_fact::list_for_novel(&ctx.db, &novel).await?;

    let mut locations: HashSet<String> = HashSet::new();
    let mut votes: HashMap<String, Vec<ParentVote>> = HashMap::new();

    for fact in &facts {
        for loc in &fact.locations {
            locations.insert(loc.name.clone());
            if let Some(parent) = &loc.parent {
                locations.insert(parent.clone());
                votes.entry(loc.name.clone()).or_default().push(ParentVote {
                    parent: parent.clone(),
                    weight: 1,
                    reason: "fact_extraction".into(),
                });
            }
        }
    }

    for ov in world_structure::list_overrides(&ctx.db, &novel).await? {
        if let Some(parent) = &ov.parent {
            locations.insert(ov.name.clone());
            locations.insert(parent.clone());
            votes.entry(ov.name.clone()).or_default().push(ParentVote {
                parent: parent.clone(),
                weight: 1000,
                reason: "user_override".into(),
            });
        }
    }

    let consolidator = HierarchyConsolidator::new();
    let reviewer = HierarchyReviewer::new(ctx.llm.as_ref());

    let mut output = consolidator.consolidate(HierarchyInput {
        locations: locations.clone(),
        votes: votes.clone(),
        genre: "unknown".into(),
        is_foreign: false,
        saved_parents: HashMap::new(),
    });

    match reviewer.review(&output.parents, &output.tiers, "unknown", &locations).await {
        Ok(review_votes) => {
            if !review_votes.is_empty() {
                for (child, child_votes) in review_votes {
                    votes.entry(child).or_default().extend(child_votes);
                }
                output = consolidator.consolidate(HierarchyInput {
                    locations: locations.clone(),
                    votes,
                    genre: "unknown".into(),
                    is_foreign: false,
                    saved_parents: HashMap::new(),
                });
            }
        }
        Err(err) => tracing::warn!(error = %err, "hierarchy reviewer pass failed, keeping algorithmic placement"),
    }

    match reviewer
        .validate_hierarchy(&output.parents, &output.tiers, "unknown", "天下")
        .await
    {
        Ok(corrections) => {
            for correction in corrections {
                if output.parents.get(&correction.child) == Some(&correction.wrong_parent) {
                    output.parents.insert(correction.child, correction.correct_parent);
                }
            }
        }
        Err(err) => tracing::warn!(error = %err, "hierarchy structural audit failed, keeping consolidated tree"),
    }

    let nodes: Vec<WorldStructure> = output
        .parents
        .keys()
        .chain(output.tiers.keys())
        .collect::<HashSet<_>>()
        .into_iter()
        .map(|name| {
            let mut node = WorldStructure::new(
                novel.clone(),
                name.clone(),
                output
                    .tiers
                    .get(name)
                    .map(|t| t.as_str().to_string())
                    .unwrap_or_else(|| "site".to_string()),
            );
            node.parent = output.parents.get(name).cloned();
            node
        })
        .collect();

    let node_count = nodes.len();
    world_structure::replace_all(&ctx.db, &novel, nodes).await?;

    match mode {
        OutputMode::Json => crate::cli::output::output_json(&serde_json::json!({"nodes": node_count})),
        _ => print_success(&format!("rebuilt hierarchy: {node_count} locations")),
    }

    Ok(())
}
