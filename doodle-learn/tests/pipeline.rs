//! End-to-end training, cascade, and backup behavior through the engine.

mod common;

use std::sync::Arc;

use common::{sample, stroke, StubClassifier};
use doodle_core::{Drawing, ModelInfo, StoreError};
use doodle_learn::{
    CentroidClassifier, DoodleEngine, EngineError, TrainingError, TrainingStage, RUN_INTERRUPTED,
};

fn engine(dir: &std::path::Path, classifier: Arc<StubClassifier>) -> DoodleEngine {
    DoodleEngine::open(dir, classifier).expect("open engine")
}

// ---- Training scenarios ----

#[tokio::test]
async fn test_two_labels_train_successfully() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine(dir.path(), StubClassifier::new("⭐", 0.9).into_arc());
    let model = engine.active_model().expect("default model").id;

    for (emoji, offset) in [("⭐", 0.0), ("⭐", 5.0), ("❤️", 0.0), ("❤️", 5.0)] {
        engine
            .store()
            .add_sample(sample(model, emoji, offset))
            .expect("add sample");
    }

    let mut status_rx = engine.training().subscribe();
    let report = engine.train_model(model).await.expect("train");
    assert_eq!(report.sample_count, 4);
    assert_eq!(report.label_count, 2);
    assert!(engine.training().has_artifact(model));

    let status = status_rx.borrow_and_update().clone();
    assert!(!status.is_training);
    assert!((status.progress - 1.0).abs() < f32::EPSILON);
    assert_eq!(status.last_success.as_ref(), Some(&report));

    let stored = engine.store().model(model).expect("model");
    assert_eq!(stored.last_trained_at, Some(report.finished_at));
}

#[tokio::test]
async fn test_single_label_fails_without_artifact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let classifier = StubClassifier::new("⭐", 0.9).into_arc();
    let engine = engine(dir.path(), Arc::clone(&classifier));
    let model = engine.active_model().expect("default model").id;

    for offset in [0.0, 5.0, 10.0] {
        engine
            .store()
            .add_sample(sample(model, "⭐", offset))
            .expect("add sample");
    }

    let err = engine.train_model(model).await.expect_err("must fail");
    assert!(matches!(
        err,
        EngineError::Training(TrainingError::InsufficientLabels { found: 1 })
    ));
    assert!(err
        .to_string()
        .contains("need at least 2 different emoji labels"));

    assert!(!engine.training().has_artifact(model));
    assert_eq!(classifier.fits.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(engine.training().featurization_count(), 0);

    let status = engine.training().status();
    assert!(status.progress < 1.0);
    assert!(status.last_success.is_none());
    assert!(status.last_error.is_some());
    assert!(engine.store().model(model).expect("model").last_trained_at.is_none());
}

#[tokio::test]
async fn test_too_few_samples() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine(dir.path(), StubClassifier::new("⭐", 0.9).into_arc());
    let model = engine.active_model().expect("default model").id;
    engine
        .store()
        .add_sample(sample(model, "⭐", 0.0))
        .expect("add sample");

    assert!(matches!(
        engine.train_model(model).await,
        Err(EngineError::Training(TrainingError::InsufficientSamples { found: 1 }))
    ));
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine(dir.path(), StubClassifier::new("⭐", 0.9).into_arc());
    let model = engine.active_model().expect("default model").id;
    for i in 0..6u8 {
        let emoji = if i % 2 == 0 { "⭐" } else { "❤️" };
        engine
            .store()
            .add_sample(sample(model, emoji, f32::from(i)))
            .expect("add sample");
    }

    let mut rx = engine.training().subscribe();
    let watcher = tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            let status = rx.borrow_and_update().clone();
            seen.push((status.progress, status.stage));
            if !status.is_training && status.progress >= 1.0 {
                break;
            }
        }
        seen
    });

    engine.train_model(model).await.expect("train");
    let seen = tokio::time::timeout(std::time::Duration::from_secs(5), watcher)
        .await
        .expect("watcher finished")
        .expect("watcher task");

    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0), "{seen:?}");
    assert_eq!(seen.last().map(|(_, stage)| *stage), Some(None::<TrainingStage>));
}

#[tokio::test]
async fn test_dropped_training_returns_to_idle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let classifier = StubClassifier::new("⭐", 0.9)
        .with_fit_delay(std::time::Duration::from_millis(300))
        .into_arc();
    let engine = engine(dir.path(), classifier);
    let model = engine.active_model().expect("default model").id;
    for (emoji, offset) in [("⭐", 0.0), ("❤️", 5.0)] {
        engine
            .store()
            .add_sample(sample(model, emoji, offset))
            .expect("add sample");
    }

    let timed_out = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        engine.train_model(model),
    )
    .await
    .is_err();
    assert!(timed_out);

    let status = engine.training().status();
    assert!(!status.is_training);
    assert!(!engine.training().is_training());
    assert!(status.stage.is_none());
    assert_eq!(status.last_error.as_deref(), Some(RUN_INTERRUPTED));
    assert!(engine.store().model(model).expect("model").last_trained_at.is_none());

    // The service accepts a new run once the old fit has drained.
    tokio::time::sleep(std::time::Duration::from_millis(400)).await;
    engine.train_model(model).await.expect("retrain");
    assert!(engine.training().status().last_error.is_none());
}

#[tokio::test]
async fn test_infer_without_artifact_is_a_miss() {
    let dir = tempfile::tempdir().expect("tempdir");
    let classifier = StubClassifier::new("⭐", 0.9).into_arc();
    let engine = engine(dir.path(), Arc::clone(&classifier));

    let drawing = Drawing::from_strokes(vec![stroke(0.0)]);
    assert!(engine.recognize(&drawing, None).await.is_none());
    assert_eq!(engine.training().featurization_count(), 0);
    assert_eq!(
        classifier
            .predictions
            .load(std::sync::atomic::Ordering::SeqCst),
        0
    );
}

#[tokio::test]
async fn test_centroid_classifier_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = DoodleEngine::open(
        dir.path(),
        Arc::new(CentroidClassifier::with_input_size(24, 24)),
    )
    .expect("open");
    let model = engine.active_model().expect("model").id;

    let line = |y: f32| {
        Drawing::from_strokes(vec![doodle_core::Stroke::from_xy(&[
            (0.0, y),
            (100.0, y + 2.0),
        ])])
    };
    let vee = |x: f32| {
        Drawing::from_strokes(vec![doodle_core::Stroke::from_xy(&[
            (x, 0.0),
            (x + 50.0, 100.0),
            (x + 100.0, 0.0),
        ])])
    };
    let canvas = doodle_core::CanvasSize::new(300.0, 300.0);
    for i in 0..3u8 {
        let shift = f32::from(i) * 7.0;
        for (emoji, drawing) in [("➖", line(shift)), ("✔️", vee(shift))] {
            let sample = doodle_core::TrainingSample::new(model, emoji, drawing, canvas)
                .expect("sample");
            engine.store().add_sample(sample).expect("add");
        }
    }

    engine.train_active().await.expect("train");
    let prediction = engine
        .recognize(&vee(200.0), Some(model))
        .await
        .expect("prediction");
    assert_eq!(prediction.emoji, "✔️");
    assert!(prediction.confidence > 0.7);
}

// ---- Cascades ----

#[tokio::test]
async fn test_remove_active_model_cascades() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine(dir.path(), StubClassifier::new("⭐", 0.9).into_arc());
    let store = engine.store();

    let first = engine.active_model().expect("default").id;
    let second = store.add_model(ModelInfo::new("Second")).expect("add");
    let third = store.add_model(ModelInfo::new("Third")).expect("add");
    store.set_active_model(second).expect("activate");

    for (emoji, offset) in [("⭐", 0.0), ("❤️", 1.0)] {
        store.add_sample(sample(second, emoji, offset)).expect("add");
    }
    store.add_sample(sample(third, "⭐", 0.0)).expect("add");
    engine.train_model(second).await.expect("train");
    assert!(engine.training().has_artifact(second));

    engine.remove_model(second).expect("remove");

    let models = store.models();
    assert_eq!(models.len(), 2);
    assert_eq!(models.iter().filter(|m| m.is_active).count(), 1);
    assert!(models.iter().any(|m| m.is_active && (m.id == first || m.id == third)));
    assert!(store.samples_for_model(second).is_empty());
    assert!(store.labels_for(second).is_empty());
    assert!(!engine.training().has_artifact(second));

    // The other model's data is untouched.
    assert_eq!(store.samples_for_model(third).len(), 1);
}

#[tokio::test]
async fn test_remove_unknown_model() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine(dir.path(), StubClassifier::new("⭐", 0.9).into_arc());
    assert!(matches!(
        engine.remove_model(doodle_core::ModelId::new()),
        Err(EngineError::Store(StoreError::ModelNotFound(_)))
    ));
}

// ---- Backup ----

#[tokio::test]
async fn test_backup_restores_artifacts() {
    let source_dir = tempfile::tempdir().expect("tempdir");
    let source = engine(source_dir.path(), StubClassifier::new("⭐", 0.9).into_arc());
    let model = source.active_model().expect("model").id;
    for (emoji, offset) in [("⭐", 0.0), ("❤️", 1.0)] {
        source.store().add_sample(sample(model, emoji, offset)).expect("add");
    }
    source.train_model(model).await.expect("train");
    let artifact = source
        .training()
        .read_artifact(model)
        .expect("read")
        .expect("artifact");

    let backup_path = source_dir.path().join("backup.json");
    source
        .export_backup()
        .expect("export")
        .write_to(&backup_path)
        .expect("write backup");

    let target_dir = tempfile::tempdir().expect("tempdir");
    let target = engine(target_dir.path(), StubClassifier::new("⭐", 0.9).into_arc());
    let orphan = target.active_model().expect("default").id;
    target
        .training()
        .write_artifact(orphan, b"orphan")
        .expect("seed orphan");

    let bundle = doodle_core::BackupBundle::read_from(&backup_path).expect("read backup");
    target.restore_backup(&bundle).expect("restore");

    assert_eq!(target.store().samples().len(), 2);
    assert_eq!(target.active_model().expect("active").id, model);
    assert_eq!(
        target.training().read_artifact(model).expect("read"),
        Some(artifact)
    );
    assert!(!target.training().has_artifact(orphan));
}

#[tokio::test]
async fn test_restore_refuses_newer_format() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine(dir.path(), StubClassifier::new("⭐", 0.9).into_arc());
    let before = engine.store().models();

    let mut bundle = engine.export_backup().expect("export");
    bundle.format_version = doodle_core::BACKUP_FORMAT_VERSION + 1;
    bundle.models.clear();

    assert!(matches!(
        engine.restore_backup(&bundle),
        Err(EngineError::Store(StoreError::UnsupportedBackupVersion { .. }))
    ));
    assert_eq!(engine.store().models(), before);
}
