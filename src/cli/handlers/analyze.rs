use surrealdb::RecordId;

use crate::cli::output::{output_json, print_error, print_kv, print_success, OutputMode};
use crate::init::AppContext;
use crate::models::analysis_task;
use crate::models::novel;

fn novel_ref(novel_id: &str) -> RecordId {
    RecordId::from(("novels", novel_id))
}

fn task_ref(task_id: &str) -> RecordId {
    RecordId::from(("analysis_tasks", task_id))
}

pub async fn handle_start(
    ctx: &AppContext,
    novel_id: &str,
    from: i64,
    to: i64,
    force: bool,
    mode: OutputMode,
) -> anyhow::Result<()> {
    novel::get(&ctx.db, novel_id).await?;

    let task_id = ctx
        .analysis_service
        .start_task(novel_ref(novel_id), from, to, force)
        .await?;

    match mode {
        OutputMode::Json => output_json(&serde_json::json!({
            "task_id": task_id.to_string(),
            "from": from,
            "to": to,
            "force": force,
        })),
        _ => {
            print_success(&format!("started analysis task {task_id} (chapters {from}-{to})"));
        }
    }

    Ok(())
}

pub async fn handle_pause(ctx: &AppContext, task_id: &str, mode: OutputMode) -> anyhow::Result<()> {
    let id = task_ref(task_id);
    ctx.analysis_service.pause(&id).await;
    match mode {
        OutputMode::Json => output_json(&serde_json::json!({"task_id": task_id, "action": "pause"})),
        _ => print_success(&format!("pause requested for task {task_id}")),
    }
    Ok(())
}

pub async fn handle_resume(ctx: &AppContext, task_id: &str, mode: OutputMode) -> anyhow::Result<()> {
    let task = analysis_task::get(&ctx.db, task_id).await?;
    if task.status != analysis_task::TaskStatus::Paused {
        print_error(&format!("task {task_id} is not paused (status: {:?})", task.status));
        return Ok(());
    }

    let remaining_start = task.chapter_start + task.chapters_done;
    let resumed_id = ctx
        .analysis_service
        .start_task(task.novel.clone(), remaining_start, task.chapter_end, task.force)
        .await?;

    match mode {
        OutputMode::Json => output_json(&serde_json::json!({
            "resumed_as": resumed_id.to_string(),
            "from": remaining_start,
            "to": task.chapter_end,
        })),
        _ => {
            print_success(&format!(
                "resumed as task {resumed_id} (chapters {remaining_start}-{})",
                task.chapter_end
            ));
        }
    }

    Ok(())
}

pub async fn handle_cancel(ctx: &AppContext, task_id: &str, mode: OutputMode) -> anyhow::Result<()> {
    let id = task_ref(task_id);
    ctx.analysis_service.cancel(&id).await;
    match mode {
        OutputMode::Json => output_json(&serde_json::json!({"task_id": task_id, "action": "cancel"})),
        _ => print_success(&format!("cancel requested for task {task_id}")),
    }
    Ok(())
}

pub async fn handle_status(ctx: &AppContext, task_id: &str, mode: OutputMode) -> anyhow::Result<()> {
    let task = analysis_task::get(&ctx.db, task_id).await?;

    match mode {
        OutputMode::Json => output_json(&task),
        _ => {
            print_kv("Task", task_id);
            print_kv("Status", &format!("{:?}", task.status));
            print_kv("Novel", &task.novel.to_string());
            print_kv("Range", &format!("{}-{}", task.chapter_start, task.chapter_end));
            print_kv("Chapters done", &task.chapters_done.to_string());
            if let Some(err) = &task.error {
                print_kv("Error", err);
            }
        }
    }

    Ok(())
}
