use std::path::Path;

use surrealdb::RecordId;

use crate::cli::output::{output_json, print_success, OutputMode};
use crate::init::AppContext;
use crate::models::{chapter_fact, entity_dict, novel, world_structure};

fn novel_ref(novel_id: &str) -> RecordId {
    RecordId::from(("novels", novel_id))
}

/// Exports a novel's accumulated facts, entity dictionary and resolved
/// world structure as a single JSON document, either to a file or stdout.
pub async fn handle_export(
    ctx: &AppContext,
    novel_id: &str,
    output: Option<&Path>,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let novel = novel::get(&ctx.db, novel_id).await?;
    let novel_record = novel_ref(novel_id);

    let facts = chapter_fact::list_for_novel(&ctx.db, &novel_record).await?;
    let entities = entity_dict::list_for_novel(&ctx.db, &novel_record).await?;
    let world = world_structure::list_for_novel(&ctx.db, &novel_record).await?;

    let document = serde_json::json!({
        "novel": novel,
        "facts": facts,
        "entities": entities,
        "world_structure": world,
    });

    if let Some(path) = output {
        let content = serde_json::to_string_pretty(&document)?;
        std::fs::write(path, content)
            .map_err(|e| anyhow::anyhow!("failed to write '{}': {e}", path.display()))?;
        match mode {
            OutputMode::Json => output_json(&serde_json::json!({"written_to": path.to_string_lossy()})),
            _ => print_success(&format!("exported to {}", path.display())),
        }
    } else {
        output_json(&document);
    }

    Ok(())
}
