mod common;

use common::harness::TestHarness;
use loregraph::models::chapter::{self, Chapter};
use loregraph::models::entity_dict;
use loregraph::models::novel::{self, Novel};
use loregraph::pipeline::EntityPreScanner;

const SAMPLE_CHAPTER_ONE: &str = "\
宋江在郓城县做押司,与晁盖交好。这一日宋江前往梁山泊,途中听闻晁盖在东京有一桩买卖。\
晁盖道:此事须得小心。宋江又道:我自有主张。";

const SAMPLE_CHAPTER_TWO: &str = "\
晁盖带着吴用、公孙胜一行人来到梁山泊,与宋江相见。宋江道:哥哥此来,必有要事。\
吴用笑道:我们正要与兄长商议大事。";

#[tokio::test]
async fn importing_chapters_populates_entity_dictionary() {
    let harness = TestHarness::new().await;

    let novel = novel::create(&harness.db, Novel::new("Ingest Novel", Some("historical".into())))
        .await
        .unwrap();
    let novel_id = novel.id.clone().unwrap();

    let chapters = [SAMPLE_CHAPTER_ONE, SAMPLE_CHAPTER_TWO];
    let mut full_text = String::new();
    for (idx, text) in chapters.iter().enumerate() {
        chapter::create(
            &harness.db,
            Chapter::new(novel_id.clone(), idx as i64 + 1, None, text.to_string()),
        )
        .await
        .unwrap();
        full_text.push_str(text);
    }
    novel::set_chapter_count(&harness.db, &novel_id, chapters.len() as i64)
        .await
        .unwrap();

    let scanner = EntityPreScanner::new();
    let candidates = scanner.scan(&full_text);
    assert!(!candidates.is_empty(), "pre-scan should surface at least one candidate");

    let entries = scanner.to_entries(novel_id.clone(), candidates);
    entity_dict::insert_batch(&harness.db, &novel_id, entries).await.unwrap();

    let stored = entity_dict::list_for_novel(&harness.db, &novel_id).await.unwrap();
    assert!(!stored.is_empty());
    assert!(stored.iter().all(|e| e.novel == novel_id));

    let names: Vec<&str> = stored.iter().map(|e| e.name.as_str()).collect();
    assert!(
        names.iter().any(|n| n.contains("宋江") || n.contains("梁山泊") || n.contains("晁盖")),
        "expected a recognizable name among candidates, got {:?}",
        names
    );
}

#[tokio::test]
async fn rescan_replaces_prior_entity_dictionary() {
    let harness = TestHarness::new().await;
    let novel = novel::create(&harness.db, Novel::new("Rescan Novel", None)).await.unwrap();
    let novel_id = novel.id.clone().unwrap();

    chapter::create(
        &harness.db,
        Chapter::new(novel_id.clone(), 1, None, SAMPLE_CHAPTER_ONE.to_string()),
    )
    .await
    .unwrap();

    let scanner = EntityPreScanner::new();
    let first_pass = scanner.to_entries(novel_id.clone(), scanner.scan(SAMPLE_CHAPTER_ONE));
    entity_dict::insert_batch(&harness.db, &novel_id, first_pass).await.unwrap();
    let after_first = entity_dict::list_for_novel(&harness.db, &novel_id).await.unwrap();
    assert!(!after_first.is_empty());

    entity_dict::delete_all(&harness.db, &novel_id).await.unwrap();
    let after_delete = entity_dict::list_for_novel(&harness.db, &novel_id).await.unwrap();
    assert!(after_delete.is_empty());

    let combined = format!("{SAMPLE_CHAPTER_ONE}{SAMPLE_CHAPTER_TWO}");
    let second_pass = scanner.to_entries(novel_id.clone(), scanner.scan(&combined));
    entity_dict::insert_batch(&harness.db, &novel_id, second_pass).await.unwrap();
    let after_second = entity_dict::list_for_novel(&harness.db, &novel_id).await.unwrap();
    assert!(!after_second.is_empty());
}
