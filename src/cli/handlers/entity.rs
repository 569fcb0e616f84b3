use surrealdb::RecordId;

use crate::cli::output::{output_json_list, print_success, print_table, OutputMode};
use crate::init::AppContext;
use crate::models::chapter::list_range;
use crate::models::user_state::{self, PrescanStatus};
use crate::models::{entity_dict, novel};
use crate::pipeline::EntityPreScanner;

fn novel_ref(novel_id: &str) -> RecordId {
    RecordId::from(("novels", novel_id))
}

/// Re-runs the statistical entity pre-scan over every ingested chapter,
/// replacing the novel's entity dictionary. Unlike the extraction pipeline
/// this never touches the LLM, so it is safe to re-run as often as needed
/// after editing or excluding chapters.
pub async fn handle_rescan(ctx: &AppContext, novel_id: &str, mode: OutputMode) -> anyhow::Result<()> {
    let novel = novel::get(&ctx.db, novel_id).await?;
    let novel_record = novel_ref(novel_id);

    user_state::set_prescan_status(&ctx.db, &novel_record, PrescanStatus::Running).await?;

    let chapters = list_range(&ctx.db, &novel_record, 1, i64::MAX).await?;
    let mut full_text = String::new();
    for chapter in &chapters {
        full_text.push_str(&chapter.full_text);
        full_text.push('\n');
    }

    let scanner = EntityPreScanner::new();
    let candidates = scanner.scan(&full_text);
    let candidate_count = candidates.len();
    let entries = scanner.to_entries(novel_record.clone(), candidates);

    entity_dict::delete_all(&ctx.db, &novel_record).await?;
    entity_dict::insert_batch(&ctx.db, &novel_record, entries).await?;
    user_state::set_prescan_status(&ctx.db, &novel_record, PrescanStatus::Completed).await?;

    match mode {
        OutputMode::Json => crate::cli::output::output_json(&serde_json::json!({
            "novel": novel.title,
            "chapters_scanned": chapters.len(),
            "candidates": candidate_count,
        })),
        _ => print_success(&format!(
            "rescanned {} chapters, {} entity candidates found",
            chapters.len(),
            candidate_count
        )),
    }

    Ok(())
}

pub async fn handle_list(ctx: &AppContext, novel_id: &str, mode: OutputMode) -> anyhow::Result<()> {
    let novel_record = novel_ref(novel_id);
    let entries = entity_dict::list_for_novel(&ctx.db, &novel_record).await?;

    match mode {
        OutputMode::Json => output_json_list(&entries),
        _ => {
            let rows: Vec<Vec<String>> = entries
                .iter()
                .map(|e| {
                    vec![
                        e.name.clone(),
                        format!("{:?}", e.entity_type),
                        format!("{:?}", e.confidence),
                        e.frequency.to_string(),
                        e.status.clone(),
                    ]
                })
                .collect();
            print_table(&["Name", "Type", "Confidence", "Frequency", "Status"], rows);
        }
    }

    Ok(())
}
