use std::path::PathBuf;

use quarter_settle::core::engine::SettlementEngine;
use quarter_settle::core::{LineItem, Period, Project, ProjectType, Quarter};
use quarter_settle::stores::{FileStore, PeriodStore, Revision, StoreError, WriteMode};
use uuid::Uuid;

fn temp_base() -> PathBuf {
    std::env::temp_dir().join(format!("qsettle_{}", Uuid::new_v4()))
}

fn sample_period() -> Period {
    let mut row = LineItem::blank();
    row.project = "XD-01".to_string();
    row.description = "Thép".to_string();
    row.debt = 1000;
    row.direct_cost = 400;
    Period {
        items: vec![row],
        overall_revenue: 5000,
        ..Period::default()
    }
}

#[tokio::test]
async fn register_and_period_round_trip() {
    let base = temp_base();
    let store = FileStore::new(&base);

    store
        .put_project(&Project {
            id: "p1".to_string(),
            name: "Cầu A".to_string(),
            kind: ProjectType::Factory,
            total_amount: 123,
        })
        .unwrap();
    let project = store.project("p1").await.unwrap().unwrap();
    assert_eq!(project.name, "Cầu A");
    assert!(project.kind.is_factory());
    assert!(store.project("p2").await.unwrap().is_none());

    store
        .put_period("p1", 2024, Quarter::Q1, &sample_period(), WriteMode::Overwrite, None)
        .await
        .unwrap();
    let stored = store.period("p1", 2024, Quarter::Q1).await.unwrap().unwrap();
    assert_eq!(stored.revision, Revision(1));
    assert_eq!(stored.doc.overall_revenue, 5000);
    assert_eq!(stored.doc.items[0].debt, 1000);

    assert!(store.period("p1", 2024, Quarter::Q2).await.unwrap().is_none());

    let _ = std::fs::remove_dir_all(base);
}

#[tokio::test]
async fn revisions_bump_and_guard_writes() {
    let base = temp_base();
    let store = FileStore::new(&base);
    store
        .put_period("p1", 2024, Quarter::Q1, &sample_period(), WriteMode::Overwrite, None)
        .await
        .unwrap();
    store
        .put_period(
            "p1",
            2024,
            Quarter::Q1,
            &sample_period(),
            WriteMode::Overwrite,
            Some(Revision(1)),
        )
        .await
        .unwrap();

    let err = store
        .put_period(
            "p1",
            2024,
            Quarter::Q1,
            &sample_period(),
            WriteMode::Overwrite,
            Some(Revision(1)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::RevisionConflict { .. }));

    let stored = store.period("p1", 2024, Quarter::Q1).await.unwrap().unwrap();
    assert_eq!(stored.revision, Revision(2));

    let _ = std::fs::remove_dir_all(base);
}

#[tokio::test]
async fn merge_mode_keeps_created_at_and_finalize_state() {
    let base = temp_base();
    let store = FileStore::new(&base);

    let mut original = sample_period();
    original.created_at = Some(chrono::Utc::now());
    original.is_finalized = true;
    original.finalized_at = original.created_at;
    store
        .put_period("p1", 2024, Quarter::Q1, &original, WriteMode::Overwrite, None)
        .await
        .unwrap();

    let mut update = sample_period();
    update.overall_revenue = 9999;
    update.updated_at = Some(chrono::Utc::now());
    store
        .put_period("p1", 2024, Quarter::Q1, &update, WriteMode::Merge, Some(Revision(1)))
        .await
        .unwrap();

    let stored = store.period("p1", 2024, Quarter::Q1).await.unwrap().unwrap();
    assert_eq!(stored.doc.overall_revenue, 9999);
    assert_eq!(stored.doc.created_at, original.created_at);
    assert!(stored.doc.is_finalized);

    let _ = std::fs::remove_dir_all(base);
}

#[tokio::test]
async fn legacy_documents_with_string_amounts_are_coerced() {
    let base = temp_base();
    std::fs::create_dir_all(base.join("p1")).unwrap();
    std::fs::write(
        base.join("p1").join("2024-Q1.json"),
        r#"{
            "revision": 3,
            "items": [{
                "id": "legacy-1",
                "project": "XD-01",
                "description": "Thép",
                "debt": "1.200.000",
                "directCost": "250,000",
                "isFinalized": "true"
            }],
            "overallRevenue": "3.000.000",
            "isFinalized": "true"
        }"#,
    )
    .unwrap();

    let store = FileStore::new(&base);
    let stored = store.period("p1", 2024, Quarter::Q1).await.unwrap().unwrap();
    assert_eq!(stored.revision, Revision(3));
    assert_eq!(stored.doc.overall_revenue, 3_000_000);
    assert!(stored.doc.is_finalized);
    assert_eq!(stored.doc.items[0].debt, 1_200_000);
    assert_eq!(stored.doc.items[0].direct_cost, 250_000);
    assert!(stored.doc.is_closed());

    let _ = std::fs::remove_dir_all(base);
}

#[tokio::test]
async fn settlement_runs_end_to_end_over_files() {
    let base = temp_base();
    let store = FileStore::new(&base);
    store
        .put_project(&Project {
            id: "p1".to_string(),
            name: "Cầu A".to_string(),
            kind: ProjectType::Construction,
            total_amount: 0,
        })
        .unwrap();
    store
        .put_period("p1", 2024, Quarter::Q4, &sample_period(), WriteMode::Overwrite, None)
        .await
        .unwrap();

    let engine = SettlementEngine::new(store);
    let result = engine
        .settle(&["p1".to_string()], 2024, Quarter::Q4, |_| {})
        .await;
    assert_eq!(result.success.len(), 1);
    assert_eq!(result.success[0].next_year, 2025);

    let next = engine
        .store()
        .period("p1", 2025, Quarter::Q1)
        .await
        .unwrap()
        .unwrap()
        .doc;
    assert_eq!(next.items[0].debt, 600);
    assert!(base.join("p1").join("2025-Q1.json").exists());

    let _ = std::fs::remove_dir_all(base);
}
