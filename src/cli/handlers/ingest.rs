use std::path::Path;

use crate::cli::output::{output_json, print_error, print_success, print_table, OutputMode};
use crate::init::AppContext;
use crate::models::chapter::{self, Chapter};
use crate::models::entity_dict;
use crate::models::novel::{self, Novel};
use crate::pipeline::EntityPreScanner;

/// Registers a novel and ingests every chapter text file found directly
/// under `chapters_dir`, sorted by filename so `001.txt`, `002.txt`, ...
/// land in reading order. Each file's stem becomes the chapter title and
/// its position in the sorted listing becomes the chapter number.
pub async fn handle_import(
    ctx: &AppContext,
    title: &str,
    genre: Option<&str>,
    chapters_dir: &Path,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let mut entries: Vec<std::path::PathBuf> = std::fs::read_dir(chapters_dir)
        .map_err(|e| anyhow::anyhow!("failed to read chapters directory '{}': {e}", chapters_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    entries.sort();

    if entries.is_empty() {
        print_error("no chapter files found in the given directory");
        return Ok(());
    }

    let novel = novel::create(&ctx.db, Novel::new(title, genre.map(str::to_string))).await?;
    let novel_id = novel.id.clone().expect("created novel always has an id");

    let mut chapter_count = 0i64;
    let mut full_text_all = String::new();
    for (idx, path) in entries.iter().enumerate() {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read '{}': {e}", path.display()))?;
        let chapter_title = path.file_stem().map(|s| s.to_string_lossy().into_owned());

        chapter::create(&ctx.db, Chapter::new(novel_id.clone(), idx as i64 + 1, chapter_title, text.clone())).await?;
        full_text_all.push_str(&text);
        full_text_all.push('\n');
        chapter_count += 1;
    }

    novel::set_chapter_count(&ctx.db, &novel_id, chapter_count).await?;

    let scanner = EntityPreScanner::new();
    let candidates = scanner.scan(&full_text_all);
    let entries = scanner.to_entries(novel_id.clone(), candidates);
    let entry_count = entries.len();
    entity_dict::insert_batch(&ctx.db, &novel_id, entries).await?;

    match mode {
        OutputMode::Json => output_json(&serde_json::json!({
            "novel_id": novel_id.to_string(),
            "title": title,
            "chapters_imported": chapter_count,
            "entity_candidates": entry_count,
        })),
        _ => {
            print_table(
                &["Field", "Value"],
                vec![
                    vec!["Novel ID".into(), novel_id.to_string()],
                    vec!["Title".into(), title.to_string()],
                    vec!["Chapters imported".into(), chapter_count.to_string()],
                    vec!["Entity candidates".into(), entry_count.to_string()],
                ],
            );
            print_success(&format!("imported {chapter_count} chapters for '{title}'"));
        }
    }

    Ok(())
}
