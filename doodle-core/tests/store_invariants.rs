//! Sample Store Invariant Tests
//!
//! Exercises the store through random operation sequences and checks the
//! invariants that must hold after every call:
//! - label counts equal live sample counts per (emoji, model)
//! - a non-empty model collection has exactly one active model
//! - deleting a model removes its samples and labels

use doodle_core::store::count_samples;
use doodle_core::{
    CanvasSize, Drawing, ModelId, ModelInfo, SampleStore, Stroke, TrainingSample,
};
use proptest::prelude::*;

const EMOJI: [&str; 4] = ["⭐", "❤️", "🌙", "🔥"];

#[derive(Debug, Clone)]
enum Op {
    AddModel { activate: bool },
    AddSample { model: usize, emoji: usize },
    RemoveSample { index: usize },
    RemoveModel { model: usize },
    SetActive { model: usize },
    RemoveLabel { index: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<bool>().prop_map(|activate| Op::AddModel { activate }),
        (0..4_usize, 0..EMOJI.len()).prop_map(|(model, emoji)| Op::AddSample { model, emoji }),
        (0..16_usize).prop_map(|index| Op::RemoveSample { index }),
        (0..4_usize).prop_map(|model| Op::RemoveModel { model }),
        (0..4_usize).prop_map(|model| Op::SetActive { model }),
        (0..8_usize).prop_map(|index| Op::RemoveLabel { index }),
    ]
}

fn drawing() -> Drawing {
    Drawing::from_strokes(vec![Stroke::from_xy(&[(0.0, 0.0), (20.0, 20.0)])])
}

fn nth_model(store: &SampleStore, n: usize) -> Option<ModelId> {
    let models = store.models();
    if models.is_empty() {
        None
    } else {
        Some(models[n % models.len()].id)
    }
}

fn apply(store: &SampleStore, op: &Op) {
    match *op {
        Op::AddModel { activate } => {
            let model = ModelInfo::new("Model");
            let model = if activate { model.active() } else { model };
            store.add_model(model).expect("valid model");
        }
        Op::AddSample { model, emoji } => {
            if let Some(model_id) = nth_model(store, model) {
                let sample = TrainingSample::new(
                    model_id,
                    EMOJI[emoji],
                    drawing(),
                    CanvasSize::new(320.0, 480.0),
                )
                .expect("valid sample");
                store.add_sample(sample).expect("valid sample");
            }
        }
        Op::RemoveSample { index } => {
            let samples = store.samples();
            if !samples.is_empty() {
                store.remove_sample(samples[index % samples.len()].id);
            }
        }
        Op::RemoveModel { model } => {
            if let Some(model_id) = nth_model(store, model) {
                store.remove_model(model_id).expect("known model");
            }
        }
        Op::SetActive { model } => {
            if let Some(model_id) = nth_model(store, model) {
                store.set_active_model(model_id).expect("known model");
            }
        }
        Op::RemoveLabel { index } => {
            let labels = store.labels();
            if !labels.is_empty() {
                store
                    .remove_label(labels[index % labels.len()].id)
                    .expect("known label");
            }
        }
    }
}

fn assert_invariants(store: &SampleStore) {
    let counts = count_samples(&store.samples());
    let labels = store.labels();
    assert_eq!(labels.len(), counts.len(), "one label per live (model, emoji)");
    for label in &labels {
        let live = counts
            .get(&(label.model_id, label.emoji.clone()))
            .copied()
            .unwrap_or(0);
        assert_eq!(label.sample_count, live, "label count for {}", label.emoji);
    }

    let models = store.models();
    let active = models.iter().filter(|m| m.is_active).count();
    if models.is_empty() {
        assert_eq!(active, 0);
    } else {
        assert_eq!(active, 1, "exactly one active model");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn invariants_hold_after_every_operation(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let store = SampleStore::new();
        for op in &ops {
            apply(&store, op);
            assert_invariants(&store);
        }
    }
}

#[test]
fn test_remove_active_model_with_two_others_leaves_one_active() {
    let store = SampleStore::new();
    let m = store.add_model(ModelInfo::new("M")).expect("model");
    let a = store.add_model(ModelInfo::new("A")).expect("model");
    let b = store.add_model(ModelInfo::new("B")).expect("model");
    for emoji in ["⭐", "⭐", "❤️"] {
        let sample = TrainingSample::new(m, emoji, drawing(), CanvasSize::new(100.0, 100.0))
            .expect("valid sample");
        store.add_sample(sample).expect("add");
    }

    store.remove_model(m).expect("remove");

    let active: Vec<_> = store.models().into_iter().filter(|x| x.is_active).collect();
    assert_eq!(active.len(), 1);
    assert!(active[0].id == a || active[0].id == b);
    assert!(store.samples_for_model(m).is_empty());
    assert!(store.labels_for(m).is_empty());
}

#[test]
fn test_store_reopens_with_same_invariants() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SampleStore::open(dir.path()).expect("open");
    let default_model = store.active_model().expect("default model").id;
    let second = store
        .add_model(ModelInfo::new("Second").active())
        .expect("model");
    for emoji in ["⭐", "⭐", "❤️", "❤️"] {
        let sample = TrainingSample::new(second, emoji, drawing(), CanvasSize::new(100.0, 100.0))
            .expect("valid sample");
        store.add_sample(sample).expect("add");
    }

    let reopened = SampleStore::open(dir.path()).expect("reopen");
    assert_eq!(reopened.active_model().map(|m| m.id), Some(second));
    assert!(reopened.model(default_model).is_some());
    assert_invariants(&reopened);
    assert_eq!(reopened.samples_for("❤️", second).len(), 2);
}
