//! Command execution against a [`DoodleEngine`].
//!
//! Every command opens the engine on the configured data directory, does its
//! work, and writes a human-readable report to the given writer.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use doodle_core::{
    BackupBundle, CanvasSize, ClassificationResult, Drawing, LabelInfo, ModelId, ModelInfo,
    SampleId, TrainingSample,
};
use doodle_learn::{CentroidClassifier, DoodleEngine, RecognitionConfig};
use doodle_renderer::{RasterConfig, Rasterizer};

use crate::{CliConfig, Command, LabelCommand, ModelsCommand, SamplesCommand};

/// Open the engine for a configuration with the built-in classifier.
///
/// # Errors
///
/// Returns an error if the data directory cannot be created.
pub fn open_engine(config: &CliConfig) -> anyhow::Result<DoodleEngine> {
    let classifier = CentroidClassifier::with_input_size(config.input_size, config.input_size);
    DoodleEngine::open(&config.data_dir, Arc::new(classifier))
        .with_context(|| format!("opening data directory {}", config.data_dir.display()))
}

/// Run one command, writing its report to `out`.
///
/// # Errors
///
/// Returns an error if the command fails or the report cannot be written.
pub async fn run<W: Write>(
    config: &CliConfig,
    command: Command,
    out: &mut W,
) -> anyhow::Result<()> {
    let engine = open_engine(config)?;
    match command {
        Command::Models(cmd) => models(&engine, cmd, out)?,
        Command::Labels { model } => {
            let model = resolve_model(&engine, model.as_deref())?;
            list_labels(&engine, &model, out)?;
        }
        Command::Label(cmd) => label(&engine, cmd, out)?,
        Command::Samples(cmd) => samples(&engine, cmd, out)?,
        Command::Train { model } => {
            let model = resolve_model(&engine, model.as_deref())?;
            let report = engine.train_model(model.id).await?;
            writeln!(
                out,
                "Trained {} on {} samples across {} labels ({} bytes)",
                model.name, report.sample_count, report.label_count, report.artifact_bytes
            )?;
        }
        Command::Recognize {
            drawing,
            model,
            png,
        } => {
            let model = resolve_model(&engine, model.as_deref())?;
            let drawing = read_drawing(&drawing)?;
            if let Some(path) = png {
                write_input_png(config, &drawing, &path)?;
            }
            recognize(&engine, &model, &drawing, out).await?;
        }
        Command::History { clear } => history(&engine, clear, out)?,
        Command::Export { path } => {
            let bundle = engine.export_backup()?;
            bundle.write_to(&path)?;
            writeln!(
                out,
                "Exported {} models, {} samples, {} artifacts to {}",
                bundle.models.len(),
                bundle.samples.len(),
                bundle.artifacts.len(),
                path.display()
            )?;
        }
        Command::Import { path } => {
            let bundle = BackupBundle::read_from(&path)
                .with_context(|| format!("reading backup {}", path.display()))?;
            engine.restore_backup(&bundle)?;
            writeln!(
                out,
                "Restored {} models and {} samples",
                bundle.models.len(),
                bundle.samples.len()
            )?;
        }
    }

    if let Some(err) = engine.store().last_save_error() {
        tracing::warn!(error = %err, "Changes may not have been saved");
    }
    Ok(())
}

/// Find a model by id or exact name, or the active model when `key` is `None`.
///
/// # Errors
///
/// Returns an error if no model matches.
pub fn resolve_model(engine: &DoodleEngine, key: Option<&str>) -> anyhow::Result<ModelInfo> {
    let Some(key) = key else {
        return Ok(engine.active_model()?);
    };
    let models = engine.store().models();
    if let Ok(id) = key.parse::<ModelId>() {
        if let Some(model) = models.iter().find(|m| m.id == id) {
            return Ok(model.clone());
        }
    }
    let mut matches = models.into_iter().filter(|m| m.name == key);
    match (matches.next(), matches.next()) {
        (Some(model), None) => Ok(model),
        (Some(_), Some(_)) => bail!("model name {key:?} is ambiguous, use its id"),
        (None, _) => bail!("no model named {key:?}"),
    }
}

fn find_label(
    engine: &DoodleEngine,
    model: &ModelInfo,
    emoji: &str,
) -> anyhow::Result<LabelInfo> {
    engine
        .store()
        .labels_for(model.id)
        .into_iter()
        .find(|l| l.emoji == emoji)
        .with_context(|| format!("model {} has no label {emoji}", model.name))
}

fn read_drawing(path: &Path) -> anyhow::Result<Drawing> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading drawing {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("parsing drawing {}", path.display()))
}

fn write_input_png(config: &CliConfig, drawing: &Drawing, path: &Path) -> anyhow::Result<()> {
    let rasterizer = Rasterizer::new(RasterConfig::with_size(config.input_size, config.input_size));
    let png = rasterizer.featurize(drawing)?.to_png()?;
    std::fs::write(path, png).with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(path = %path.display(), "Wrote classifier input");
    Ok(())
}

fn models<W: Write>(
    engine: &DoodleEngine,
    cmd: ModelsCommand,
    out: &mut W,
) -> anyhow::Result<()> {
    let store = engine.store();
    match cmd {
        ModelsCommand::List => {
            for model in store.models() {
                let marker = if model.is_active { "*" } else { " " };
                let trained = if engine.training().has_artifact(model.id) {
                    "trained"
                } else {
                    "untrained"
                };
                writeln!(
                    out,
                    "{marker} {}  {}  {} samples, {trained}",
                    model.id,
                    model.name,
                    store.sample_count_for_model(model.id)
                )?;
            }
        }
        ModelsCommand::Add { name, activate } => {
            let mut model = ModelInfo::new(name);
            if activate {
                model = model.active();
            }
            let id = store.add_model(model)?;
            writeln!(out, "Added model {id}")?;
        }
        ModelsCommand::Activate { model } => {
            let model = resolve_model(engine, Some(model.as_str()))?;
            store.set_active_model(model.id)?;
            writeln!(out, "Active model is now {}", model.name)?;
        }
        ModelsCommand::Remove { model } => {
            let model = resolve_model(engine, Some(model.as_str()))?;
            let removed = engine.remove_model(model.id)?;
            writeln!(out, "Removed model {}", removed.name)?;
        }
    }
    Ok(())
}

fn list_labels<W: Write>(
    engine: &DoodleEngine,
    model: &ModelInfo,
    out: &mut W,
) -> anyhow::Result<()> {
    let labels = engine.store().labels_for(model.id);
    if labels.is_empty() {
        writeln!(out, "{} has no labels", model.name)?;
    }
    for label in labels {
        writeln!(out, "{}  {}  {} samples", label.emoji, label.title(), label.sample_count)?;
    }
    Ok(())
}

fn label<W: Write>(engine: &DoodleEngine, cmd: LabelCommand, out: &mut W) -> anyhow::Result<()> {
    match cmd {
        LabelCommand::Rename { emoji, name, model } => {
            let model = resolve_model(engine, model.as_deref())?;
            let label = find_label(engine, &model, &emoji)?;
            engine.store().rename_label(label.id, name)?;
            writeln!(out, "Renamed {emoji}")?;
        }
        LabelCommand::Remove { emoji, model } => {
            let model = resolve_model(engine, model.as_deref())?;
            let label = find_label(engine, &model, &emoji)?;
            let removed = engine.store().remove_label(label.id)?;
            writeln!(out, "Removed {emoji} and {removed} samples")?;
        }
    }
    Ok(())
}

fn samples<W: Write>(
    engine: &DoodleEngine,
    cmd: SamplesCommand,
    out: &mut W,
) -> anyhow::Result<()> {
    match cmd {
        SamplesCommand::Add {
            emoji,
            drawing,
            model,
            canvas_width,
            canvas_height,
        } => {
            let model = resolve_model(engine, model.as_deref())?;
            let drawing = read_drawing(&drawing)?;
            let sample = TrainingSample::new(
                model.id,
                emoji,
                drawing,
                CanvasSize::new(canvas_width, canvas_height),
            )?;
            let emoji = sample.emoji.clone();
            let id = engine.store().add_sample(sample)?;
            let count = engine.store().samples_for(&emoji, model.id).len();
            writeln!(out, "Added sample {id} ({emoji} now has {count})")?;
        }
        SamplesCommand::List { model } => {
            let model = resolve_model(engine, model.as_deref())?;
            for sample in engine.store().samples_for_model(model.id) {
                writeln!(
                    out,
                    "{}  {}  {} strokes",
                    sample.id,
                    sample.emoji,
                    sample.drawing.stroke_count()
                )?;
            }
        }
        SamplesCommand::Remove { id } => {
            let id: SampleId = id.parse().with_context(|| format!("invalid sample id {id:?}"))?;
            match engine.store().remove_sample(id) {
                Some(sample) => writeln!(out, "Removed {} sample {id}", sample.emoji)?,
                None => bail!("no sample {id}"),
            }
        }
    }
    Ok(())
}

async fn recognize<W: Write>(
    engine: &DoodleEngine,
    model: &ModelInfo,
    drawing: &Drawing,
    out: &mut W,
) -> anyhow::Result<()> {
    if !engine.training().has_artifact(model.id) {
        bail!("model {} has not been trained", model.name);
    }
    let threshold = RecognitionConfig::default().acceptance_threshold;
    match engine.recognize(drawing, Some(model.id)).await {
        Some(prediction) if prediction.confidence > threshold => {
            engine.store().record_classification(ClassificationResult::new(
                model.id,
                prediction.emoji.clone(),
                prediction.confidence,
            ));
            writeln!(out, "{} ({:.0}%)", prediction.emoji, prediction.confidence * 100.0)?;
        }
        Some(prediction) => writeln!(
            out,
            "Not sure: best guess {} ({:.0}%)",
            prediction.emoji,
            prediction.confidence * 100.0
        )?,
        None => writeln!(out, "No result")?,
    }
    Ok(())
}

fn history<W: Write>(engine: &DoodleEngine, clear: bool, out: &mut W) -> anyhow::Result<()> {
    let store = engine.store();
    if clear {
        store.clear_history();
        writeln!(out, "History cleared")?;
        return Ok(());
    }
    for entry in store.classification_history() {
        writeln!(out, "{}  {:.2}  {}", entry.emoji, entry.confidence, entry.model_id)?;
    }
    for stats in store.accuracy_summary(None) {
        writeln!(
            out,
            "{}: {} recognitions, mean confidence {:.2}",
            stats.emoji, stats.count, stats.mean_confidence
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use doodle_core::Stroke;

    fn config(dir: &Path) -> CliConfig {
        CliConfig {
            data_dir: dir.to_path_buf(),
            input_size: 24,
        }
    }

    async fn run_to_string(config: &CliConfig, command: Command) -> String {
        let mut out = Vec::new();
        run(config, command, &mut out).await.expect("command");
        String::from_utf8(out).expect("utf8")
    }

    fn write_drawing(dir: &Path, name: &str, points: &[(f32, f32)]) -> std::path::PathBuf {
        let path = dir.join(name);
        let drawing = Drawing::from_strokes(vec![Stroke::from_xy(points)]);
        std::fs::write(&path, serde_json::to_string(&drawing).expect("json")).expect("write");
        path
    }

    #[tokio::test]
    async fn test_models_add_and_resolve_by_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config(dir.path());
        run_to_string(
            &config,
            Command::Models(ModelsCommand::Add {
                name: "Faces".to_string(),
                activate: true,
            }),
        )
        .await;

        let engine = open_engine(&config).expect("engine");
        let model = resolve_model(&engine, Some("Faces")).expect("resolve");
        assert!(model.is_active);
        assert_eq!(resolve_model(&engine, None).expect("active").id, model.id);
        assert_eq!(
            resolve_model(&engine, Some(model.id.to_string().as_str()))
                .expect("by id")
                .name,
            "Faces"
        );
        assert!(resolve_model(&engine, Some("Nope")).is_err());
    }

    #[tokio::test]
    async fn test_train_and_recognize_from_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config(dir.path());

        for i in 0..3u8 {
            let shift = f32::from(i) * 5.0;
            let line = write_drawing(
                dir.path(),
                &format!("line{i}.json"),
                &[(0.0, shift), (100.0, shift + 2.0)],
            );
            let vee = write_drawing(
                dir.path(),
                &format!("vee{i}.json"),
                &[(shift, 0.0), (shift + 50.0, 100.0), (shift + 100.0, 0.0)],
            );
            for (emoji, drawing) in [("➖", line), ("✔️", vee)] {
                run_to_string(
                    &config,
                    Command::Samples(SamplesCommand::Add {
                        emoji: emoji.to_string(),
                        drawing,
                        model: None,
                        canvas_width: 390.0,
                        canvas_height: 390.0,
                    }),
                )
                .await;
            }
        }

        let report = run_to_string(&config, Command::Train { model: None }).await;
        assert!(report.contains("6 samples across 2 labels"), "{report}");

        let query = write_drawing(
            dir.path(),
            "query.json",
            &[(200.0, 0.0), (250.0, 100.0), (300.0, 0.0)],
        );
        let png = dir.path().join("input.png");
        let answer = run_to_string(
            &config,
            Command::Recognize {
                drawing: query,
                model: None,
                png: Some(png.clone()),
            },
        )
        .await;
        assert!(answer.starts_with("✔️"), "{answer}");
        assert!(png.exists());

        let engine = open_engine(&config).expect("engine");
        assert_eq!(engine.store().classification_history().len(), 1);
    }

    #[tokio::test]
    async fn test_recognize_untrained_model_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config(dir.path());
        let query = write_drawing(dir.path(), "q.json", &[(0.0, 0.0), (10.0, 10.0)]);

        let mut out = Vec::new();
        let err = run(
            &config,
            Command::Recognize {
                drawing: query,
                model: None,
                png: None,
            },
            &mut out,
        )
        .await
        .expect_err("untrained");
        assert!(err.to_string().contains("has not been trained"));
    }

    #[tokio::test]
    async fn test_label_remove_drops_its_samples() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config(dir.path());
        let drawing = write_drawing(dir.path(), "d.json", &[(0.0, 0.0), (10.0, 10.0)]);
        for emoji in ["⭐", "⭐", "❤️"] {
            run_to_string(
                &config,
                Command::Samples(SamplesCommand::Add {
                    emoji: emoji.to_string(),
                    drawing: drawing.clone(),
                    model: None,
                    canvas_width: 390.0,
                    canvas_height: 390.0,
                }),
            )
            .await;
        }

        let out = run_to_string(
            &config,
            Command::Label(LabelCommand::Remove {
                emoji: "⭐".to_string(),
                model: None,
            }),
        )
        .await;
        assert!(out.contains("2 samples"), "{out}");

        let engine = open_engine(&config).expect("engine");
        let model = engine.active_model().expect("active");
        let labels = engine.store().labels_for(model.id);
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].emoji, "❤️");
    }

    #[tokio::test]
    async fn test_export_then_import_into_fresh_directory() {
        let source = tempfile::tempdir().expect("tempdir");
        let config = config(source.path());
        let drawing = write_drawing(source.path(), "d.json", &[(0.0, 0.0), (10.0, 10.0)]);
        run_to_string(
            &config,
            Command::Samples(SamplesCommand::Add {
                emoji: "⭐".to_string(),
                drawing,
                model: None,
                canvas_width: 390.0,
                canvas_height: 390.0,
            }),
        )
        .await;
        let backup = source.path().join("backup.json");
        run_to_string(&config, Command::Export { path: backup.clone() }).await;

        let target = tempfile::tempdir().expect("tempdir");
        let target_config = CliConfig {
            data_dir: target.path().to_path_buf(),
            ..config
        };
        let out = run_to_string(&target_config, Command::Import { path: backup }).await;
        assert!(out.contains("1 samples"), "{out}");

        let engine = open_engine(&target_config).expect("engine");
        assert_eq!(engine.store().samples().len(), 1);
    }
}
