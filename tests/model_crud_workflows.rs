mod common;

use common::harness::TestHarness;
use loregraph::models::analysis_task::{self, AnalysisTask, TaskStatus};
use loregraph::models::chapter::{self, AnalysisStatus, Chapter};
use loregraph::models::novel::{self, Novel};
use loregraph::models::user_state::{self, PrescanStatus};

#[tokio::test]
async fn novel_and_chapter_round_trip() {
    let harness = TestHarness::new().await;

    let novel = novel::create(&harness.db, Novel::new("Test Novel", Some("fantasy".to_string())))
        .await
        .expect("novel creation should succeed");
    let novel_id = novel.id.clone().unwrap();

    chapter::create(
        &harness.db,
        Chapter::new(novel_id.clone(), 1, Some("Chapter One".into()), "正文内容".into()),
    )
    .await
    .expect("chapter creation should succeed");

    let fetched = chapter::get_by_num(&harness.db, &novel_id, 1)
        .await
        .expect("query should succeed")
        .expect("chapter should exist");
    assert_eq!(fetched.chapter_num, 1);
    assert_eq!(fetched.analysis_status, AnalysisStatus::Pending);

    chapter::set_status(&harness.db, &fetched.id.clone().unwrap(), AnalysisStatus::Completed)
        .await
        .expect("status update should succeed");
    let refetched = chapter::get_by_num(&harness.db, &novel_id, 1).await.unwrap().unwrap();
    assert_eq!(refetched.analysis_status, AnalysisStatus::Completed);
}

#[tokio::test]
async fn analysis_task_tracks_running_state_per_novel() {
    let harness = TestHarness::new().await;
    let novel = novel::create(&harness.db, Novel::new("Tracked Novel", None)).await.unwrap();
    let novel_id = novel.id.clone().unwrap();

    assert!(analysis_task::running_for_novel(&harness.db, &novel_id).await.unwrap().is_none());

    let task = analysis_task::create(&harness.db, AnalysisTask::new(novel_id.clone(), 1, 10, false))
        .await
        .unwrap();
    let task_id = task.id.clone().unwrap();

    analysis_task::set_status(&harness.db, &task_id, TaskStatus::Running, None).await.unwrap();
    let running = analysis_task::running_for_novel(&harness.db, &novel_id).await.unwrap();
    assert!(running.is_some());

    analysis_task::set_progress(&harness.db, &task_id, 4).await.unwrap();
    let task_key = task_id.to_string().rsplit(':').next().unwrap().to_string();
    let reloaded = analysis_task::get(&harness.db, &task_key).await.unwrap();
    assert_eq!(reloaded.chapters_done, 4);

    analysis_task::set_status(&harness.db, &task_id, TaskStatus::Completed, None).await.unwrap();
    assert!(analysis_task::running_for_novel(&harness.db, &novel_id).await.unwrap().is_none());
}

#[tokio::test]
async fn user_state_saves_parents_and_prescan_status_across_calls() {
    let harness = TestHarness::new().await;
    let novel = novel::create(&harness.db, Novel::new("State Novel", None)).await.unwrap();
    let novel_id = novel.id.clone().unwrap();

    let initial = user_state::get_or_create(&harness.db, &novel_id).await.unwrap();
    assert_eq!(initial.prescan_status, PrescanStatus::Pending);
    assert!(initial.saved_parents.is_empty());

    user_state::set_prescan_status(&harness.db, &novel_id, PrescanStatus::Completed)
        .await
        .unwrap();

    let mut parents = std::collections::HashMap::new();
    parents.insert("大尉府".to_string(), "东京".to_string());
    user_state::save_parents(&harness.db, &novel_id, &parents).await.unwrap();

    let reloaded = user_state::get_or_create(&harness.db, &novel_id).await.unwrap();
    assert_eq!(reloaded.prescan_status, PrescanStatus::Completed);
    assert_eq!(reloaded.saved_parents.get("大尉府"), Some(&"东京".to_string()));
}
