mod common;

use tempfile::tempdir;

use slicelabel::{
    annotation::AnnotationPatch,
    core::store::AnnotationStore,
    persist::{
        AnnotationBackend, BackendError, SettingsStore,
        sqlite::{SqliteBackend, SqliteSettings},
    },
    transfer::TransferSettings,
    types::BrushOp,
};

use common::{approx, draft, init_logging, square};

#[tokio::test]
async fn annotations_survive_reopen() {
    init_logging();
    let dir = tempdir().unwrap();
    let path = dir.path().join("labels.db");

    let created = {
        let backend = SqliteBackend::open(&path).unwrap();
        let a = backend
            .create_annotation("img-1", draft(1, "cell", square(0.0, 0.0, 10.0)))
            .await
            .unwrap();
        backend
            .create_annotation("img-2", draft(2, "nucleus", square(5.0, 5.0, 4.0)))
            .await
            .unwrap();
        backend
            .update_annotation(&a.id, AnnotationPatch::relabel(3, "debris"))
            .await
            .unwrap()
    };

    let backend = SqliteBackend::open(&path).unwrap();
    let loaded = backend.load_annotations("img-1").await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].id, created.id);
    assert_eq!(loaded[0].class_name, "debris");
    assert!(loaded[0].same_content(&created));
    assert_eq!(loaded[0].created_at_ms, created.created_at_ms);
    assert!(approx(loaded[0].area, 100.0));

    assert_eq!(backend.load_annotations("img-2").await.unwrap().len(), 1);
    assert!(backend.load_annotations("img-3").await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    init_logging();
    let backend = SqliteBackend::open_in_memory().unwrap();
    for id in ["42", "not-a-number"] {
        assert!(matches!(
            backend.delete_annotation(id).await,
            Err(BackendError::NotFound(_))
        ));
        assert!(matches!(
            backend.update_annotation(id, AnnotationPatch::relabel(1, "x")).await,
            Err(BackendError::NotFound(_))
        ));
    }
}

#[tokio::test]
async fn merge_rejects_mixed_images() {
    init_logging();
    let backend = SqliteBackend::open_in_memory().unwrap();
    let a = backend
        .create_annotation("img-1", draft(1, "cell", square(0.0, 0.0, 10.0)))
        .await
        .unwrap();
    let b = backend
        .create_annotation("img-2", draft(1, "cell", square(20.0, 0.0, 10.0)))
        .await
        .unwrap();

    let merged = backend
        .merge_annotations(&[a.id.clone(), b.id.clone()], 1, "cell")
        .await
        .unwrap();
    assert!(merged.is_none());
    assert_eq!(backend.load_annotations("img-1").await.unwrap().len(), 1);
    assert_eq!(backend.load_annotations("img-2").await.unwrap().len(), 1);
}

#[tokio::test]
async fn store_merge_and_brush_over_sqlite() {
    init_logging();
    let dir = tempdir().unwrap();
    let backend = SqliteBackend::open(dir.path().join("store.db")).unwrap();
    let mut store = AnnotationStore::new(backend.clone());
    store.load("img-1").await.unwrap();

    let a = store.create(draft(1, "cell", square(0.0, 0.0, 10.0))).await.unwrap();
    let b = store.create(draft(1, "cell", square(10.0, 0.0, 10.0))).await.unwrap();
    let merged = store
        .merge(&[a.id.clone(), b.id.clone()], 1, "cell")
        .await
        .unwrap()
        .unwrap();
    assert!(approx(merged.area, 200.0));
    assert_eq!(backend.load_annotations("img-1").await.unwrap().len(), 1);

    let cut = store
        .apply_brush(&merged.id, &[(10.0, -5.0), (10.0, 15.0)], 1.0, BrushOp::Remove)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cut.segmentation.len(), 2);
    assert!((cut.area - 180.0).abs() < 1e-3);

    store.undo().await.unwrap();
    store.undo().await.unwrap();
    let rows = backend.load_annotations("img-1").await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| approx(r.area, 100.0)));

    store.redo().await.unwrap();
    let rows = backend.load_annotations("img-1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert!(approx(rows[0].area, 200.0));
}

#[test]
fn settings_round_trip_and_upsert() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("settings.db");

    {
        let mut settings = SqliteSettings::open(&path).unwrap();
        assert_eq!(
            TransferSettings::load(&settings).unwrap(),
            TransferSettings::default()
        );
        TransferSettings {
            positive_points: 2,
            negative_points: 0,
        }
        .save(&mut settings)
        .unwrap();
        settings.set("ui.theme", "dark").unwrap();
        settings.set("ui.theme", "light").unwrap();
    }

    let settings = SqliteSettings::open(&path).unwrap();
    let loaded = TransferSettings::load(&settings).unwrap();
    assert_eq!(loaded.positive_points, 2);
    assert_eq!(loaded.negative_points, 0);
    assert_eq!(settings.get("ui.theme").unwrap().as_deref(), Some("light"));
    assert_eq!(settings.get("missing").unwrap(), None);
}

#[test]
fn stored_settings_are_clamped() {
    let mut settings = SqliteSettings::open_in_memory().unwrap();
    settings
        .set(
            slicelabel::transfer::SETTINGS_KEY,
            r#"{"positive_points":0,"negative_points":7}"#,
        )
        .unwrap();
    let loaded = TransferSettings::load(&settings).unwrap();
    assert_eq!(loaded.positive_points, 1);
    assert_eq!(loaded.negative_points, 3);
}
