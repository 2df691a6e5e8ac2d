//! Live recognition session.
//!
//! Drives a [`RecognitionLoop`] from a tokio interval. The drawing surface
//! reports stroke counts through a [`RecognitionHandle`]; on each tick the
//! session asks the loop whether to attempt, snapshots the drawing, and runs
//! inference on a separate task. Results are marshaled back into the session
//! task before anything visible changes, so decisions for one canvas are
//! strictly sequential.
//!
//! Cancelling (or switching models, or clearing) discards the in-flight
//! result but does not abort the inference: classifier work already running
//! on the blocking pool cannot be interrupted. The session waits for it to
//! drain before starting the next attempt, so at most one inference per
//! session ever runs.
//!
//! Accepted recognitions remove the recognized strokes from the
//! [`DrawingSource`] and, when a store is attached, are recorded as a
//! playground item and a classification history entry.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use doodle_core::{ClassificationResult, Drawing, ModelId, SampleStore, Stroke};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::recognition::{
    AttemptOutcome, AttemptTicket, Decision, Placement, RecognitionConfig, RecognitionLoop,
    RejectReason,
};
use crate::training::TrainingService;

/// Capacity of the event channel returned by [`RecognitionSession::spawn`].
pub const EVENT_BUFFER: usize = 64;

/// The live canvas, as seen by a recognition session.
pub trait DrawingSource: Send + Sync + 'static {
    /// Current drawing.
    fn snapshot(&self) -> Drawing;

    /// Remove the first `stroke_count` strokes after they were recognized.
    fn remove_recognized(&self, stroke_count: usize);
}

/// A shared in-memory canvas.
#[derive(Debug, Clone, Default)]
pub struct SharedCanvas {
    drawing: Arc<RwLock<Drawing>>,
}

impl SharedCanvas {
    /// Create an empty canvas.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stroke and return the new stroke count.
    pub fn push_stroke(&self, stroke: Stroke) -> usize {
        let mut drawing = self.drawing.write().unwrap_or_else(PoisonError::into_inner);
        drawing.push(stroke);
        drawing.stroke_count()
    }

    /// Remove every stroke.
    pub fn clear(&self) {
        *self.drawing.write().unwrap_or_else(PoisonError::into_inner) = Drawing::new();
    }

    /// Current stroke count.
    #[must_use]
    pub fn stroke_count(&self) -> usize {
        self.drawing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .stroke_count()
    }
}

impl DrawingSource for SharedCanvas {
    fn snapshot(&self) -> Drawing {
        self.drawing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn remove_recognized(&self, stroke_count: usize) {
        self.drawing
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove_prefix(stroke_count);
    }
}

/// Something the session did, for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionEvent {
    /// An inference started over this many strokes.
    AttemptStarted {
        /// Strokes included in the attempt.
        stroke_count: usize,
    },
    /// An emoji was recognized; place it.
    Placed(Placement),
    /// The attempt was rejected; give feedback.
    Rejected(RejectReason),
}

#[derive(Debug)]
enum Command {
    StrokesChanged { count: usize, at: Instant },
    SetModel(ModelId),
    Cancel,
    Clear,
}

struct Completed {
    ticket: AttemptTicket,
    outcome: AttemptOutcome,
    drawing: Drawing,
}

/// Control handle for a running session.
///
/// Dropping the handle ends the session at its next wakeup.
#[derive(Debug)]
pub struct RecognitionHandle {
    commands: mpsc::UnboundedSender<Command>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RecognitionHandle {
    /// Report the canvas stroke count after a change. Returns false if the
    /// session has ended.
    pub fn strokes_changed(&self, stroke_count: usize) -> bool {
        self.send(Command::StrokesChanged {
            count: stroke_count,
            at: Instant::now(),
        })
    }

    /// Switch to another model, cancelling any pending attempt.
    pub fn set_model(&self, model_id: ModelId) -> bool {
        self.send(Command::SetModel(model_id))
    }

    /// Cancel any pending attempt. Its result will be discarded.
    pub fn cancel(&self) -> bool {
        self.send(Command::Cancel)
    }

    /// The canvas was cleared: cancel and forget all strokes.
    pub fn clear(&self) -> bool {
        self.send(Command::Clear)
    }

    /// True once the session task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the session and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            if !e.is_cancelled() {
                tracing::warn!(error = %e, "Recognition session ended abnormally");
            }
        }
    }

    /// Stop the session without waiting.
    pub fn abort(self) {
        self.task.abort();
    }

    fn send(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }
}

/// Builder for a recognition session over one canvas.
pub struct RecognitionSession<S: DrawingSource> {
    service: TrainingService,
    source: Arc<S>,
    model_id: ModelId,
    config: RecognitionConfig,
    store: Option<SampleStore>,
}

impl<S: DrawingSource> RecognitionSession<S> {
    /// Create a session recognizing `source` with `model_id`.
    #[must_use]
    pub fn new(service: TrainingService, source: Arc<S>, model_id: ModelId) -> Self {
        Self {
            service,
            source,
            model_id,
            config: RecognitionConfig::default(),
            store: None,
        }
    }

    /// Use custom timing and thresholds.
    #[must_use]
    pub fn with_config(mut self, config: RecognitionConfig) -> Self {
        self.config = config;
        self
    }

    /// Record accepted recognitions in a store.
    #[must_use]
    pub fn with_store(mut self, store: SampleStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Start the session on the current tokio runtime.
    #[must_use]
    pub fn spawn(self) -> (RecognitionHandle, mpsc::Receiver<RecognitionEvent>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

        let task = tokio::spawn(self.run(commands_rx, shutdown_rx, events_tx));

        (
            RecognitionHandle {
                commands: commands_tx,
                shutdown_tx: Some(shutdown_tx),
                task,
            },
            events_rx,
        )
    }

    async fn run(
        self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut shutdown_rx: oneshot::Receiver<()>,
        events: mpsc::Sender<RecognitionEvent>,
    ) {
        let Self {
            service,
            source,
            mut model_id,
            config,
            store,
        } = self;
        let mut machine = RecognitionLoop::new(config.clone());
        let (result_tx, mut results) = mpsc::channel::<Completed>(1);
        let mut inference: Option<JoinHandle<()>> = None;

        let mut ticker = tokio::time::interval(config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Don't fire immediately on start
        ticker.tick().await;

        tracing::info!(model_id = %model_id, "Recognition session started");

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    tracing::info!("Recognition session received shutdown signal");
                    break;
                }

                command = commands.recv() => {
                    let Some(command) = command else {
                        tracing::debug!("Recognition handle dropped");
                        break;
                    };
                    match command {
                        Command::StrokesChanged { count, at } => {
                            machine.on_strokes_changed(count, at);
                        }
                        Command::SetModel(id) => {
                            tracing::info!(model_id = %id, "Recognition model switched");
                            model_id = id;
                            machine.cancel();
                        }
                        Command::Cancel => machine.cancel(),
                        Command::Clear => machine.reset(),
                    }
                }

                Some(done) = results.recv() => {
                    let decision = machine.complete(
                        done.ticket,
                        done.outcome,
                        &done.drawing,
                        Instant::now(),
                    );
                    match decision {
                        Decision::Accept(placement) => {
                            source.remove_recognized(placement.recognized_strokes);
                            if let Some(store) = &store {
                                store.add_playground_item(placement.to_playground_item());
                                store.record_classification(ClassificationResult::new(
                                    model_id,
                                    placement.emoji.clone(),
                                    placement.confidence,
                                ));
                            }
                            tracing::info!(
                                emoji = %placement.emoji,
                                confidence = placement.confidence,
                                strokes = placement.recognized_strokes,
                                "Emoji placed"
                            );
                            emit(&events, RecognitionEvent::Placed(placement));
                        }
                        Decision::Reject(reason) => {
                            emit(&events, RecognitionEvent::Rejected(reason));
                        }
                        Decision::Stale => {}
                    }
                }

                _ = ticker.tick() => {
                    if inference.as_ref().is_some_and(|task| !task.is_finished()) {
                        tracing::trace!("Previous inference still running");
                        continue;
                    }
                    let snapshot = source.snapshot();
                    machine.clamp_stroke_count(snapshot.stroke_count());
                    let has_artifact = service.has_artifact(model_id);
                    let Some(ticket) = machine.evaluate(Instant::now(), has_artifact) else {
                        continue;
                    };
                    let drawing = snapshot.prefix(ticket.stroke_count);
                    emit(&events, RecognitionEvent::AttemptStarted {
                        stroke_count: drawing.stroke_count(),
                    });

                    let service = service.clone();
                    let result_tx = result_tx.clone();
                    inference = Some(tokio::spawn(async move {
                        let outcome = if service.has_artifact(model_id) {
                            AttemptOutcome::from(service.infer(&drawing, model_id).await)
                        } else {
                            AttemptOutcome::ModelNotTrained
                        };
                        let _ = result_tx.send(Completed { ticket, outcome, drawing }).await;
                    }));
                }
            }
        }

        abort_inference(&mut inference);
        tracing::info!("Recognition session stopped");
    }
}

fn abort_inference(inference: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = inference.take() {
        handle.abort();
    }
}

fn emit(events: &mpsc::Sender<RecognitionEvent>, event: RecognitionEvent) {
    if let Err(mpsc::error::TrySendError::Full(event)) = events.try_send(event) {
        tracing::warn!(?event, "Recognition event dropped, receiver is full");
    }
}
