//! Recognition scheduling and decisions.
//!
//! [`RecognitionLoop`] is a clock-free state machine: callers feed it stroke
//! change events and the current time, ask it on every tick whether an
//! attempt should start, and hand back the inference outcome. It owns no
//! timers and spawns nothing, which keeps every gate testable with plain
//! [`Instant`] arithmetic. The async driver lives in [`crate::session`].
//!
//! ```text
//!            stroke event               gates pass
//!   Idle ─────────────────► Accumulating ──────────► Recognizing
//!    ▲                                                   │
//!    └──────────── accept (place emoji) / reject ◄───────┘
//! ```

use std::time::{Duration, Instant};

use doodle_core::{Bounds, Drawing, PlaygroundItem};
use serde::{Deserialize, Serialize};

use crate::classifier::Prediction;

/// Timing and decision parameters for recognition.
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    /// How often the loop is evaluated.
    pub tick_interval: Duration,
    /// Minimum time between the end of one attempt and the start of the next.
    pub rate_limit: Duration,
    /// Minimum quiet time after the last stroke change.
    pub settle_delay: Duration,
    /// Confidence an inference must exceed to be accepted.
    pub acceptance_threshold: f32,
    /// Smallest padding around a placement, in canvas units.
    pub min_padding: f32,
    /// Largest padding around a placement, in canvas units.
    pub max_padding: f32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(500),
            rate_limit: Duration::from_secs(1),
            settle_delay: Duration::from_millis(500),
            acceptance_threshold: 0.7,
            min_padding: 12.0,
            max_padding: 80.0,
        }
    }
}

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    /// Nothing new to recognize.
    Idle,
    /// Strokes changed since the last decision.
    Accumulating,
    /// An inference is in flight.
    Recognizing,
}

/// Why the loop is not starting an attempt right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    /// An attempt is already in flight.
    InFlight,
    /// The model has no trained artifact.
    NoArtifact,
    /// No strokes left since the last accepted attempt.
    EmptyCanvas,
    /// Too soon after the last attempt.
    RateLimited,
    /// Too soon after the last stroke change.
    Settling,
}

/// Permission to run one inference over the first `stroke_count` strokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptTicket {
    /// Session generation the attempt belongs to.
    pub generation: u64,
    /// Strokes on the canvas when the attempt started.
    pub stroke_count: usize,
}

/// Result of an inference, as reported back to the loop.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// The classifier produced a prediction.
    Predicted(Prediction),
    /// The classifier produced nothing usable.
    NoResult,
    /// The model had no artifact when inference ran.
    ModelNotTrained,
}

impl From<Option<Prediction>> for AttemptOutcome {
    fn from(prediction: Option<Prediction>) -> Self {
        prediction.map_or(Self::NoResult, Self::Predicted)
    }
}

/// Why an attempt was rejected. Callers pick feedback per reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Confidence at or below the acceptance threshold.
    LowConfidence,
    /// No usable prediction.
    NoResult,
    /// No trained artifact.
    ModelNotTrained,
}

/// An accepted recognition: where to place the emoji.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// Recognized emoji.
    pub emoji: String,
    /// Classifier confidence.
    pub confidence: f32,
    /// Square placement box in canvas coordinates.
    pub bounds: Bounds,
    /// Leading strokes that were recognized and should be removed.
    pub recognized_strokes: usize,
}

impl Placement {
    /// Playground item for this placement.
    #[must_use]
    pub fn to_playground_item(&self) -> PlaygroundItem {
        PlaygroundItem::in_bounds(self.emoji.clone(), &self.bounds)
    }
}

/// What to do with a finished attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Place the emoji and remove the recognized strokes.
    Accept(Placement),
    /// Leave the canvas alone and give feedback.
    Reject(RejectReason),
    /// The attempt was cancelled; ignore it.
    Stale,
}

/// Recognition state for one canvas session.
#[derive(Debug, Clone)]
pub struct RecognitionLoop {
    config: RecognitionConfig,
    phase: LoopPhase,
    generation: u64,
    in_flight: bool,
    stroke_count: usize,
    last_change: Option<Instant>,
    last_attempt: Option<Instant>,
}

impl Default for RecognitionLoop {
    fn default() -> Self {
        Self::new(RecognitionConfig::default())
    }
}

impl RecognitionLoop {
    /// Create an idle loop.
    #[must_use]
    pub fn new(config: RecognitionConfig) -> Self {
        Self {
            config,
            phase: LoopPhase::Idle,
            generation: 0,
            in_flight: false,
            stroke_count: 0,
            last_change: None,
            last_attempt: None,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &RecognitionConfig {
        &self.config
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> LoopPhase {
        self.phase
    }

    /// Current session generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// True while an attempt is in flight.
    #[must_use]
    pub const fn is_recognizing(&self) -> bool {
        self.in_flight
    }

    /// Strokes drawn since the last accepted attempt.
    ///
    /// Accepted strokes leave the canvas, so any remaining stroke is new
    /// content that has not been recognized yet.
    #[must_use]
    pub const fn stroke_count(&self) -> usize {
        self.stroke_count
    }

    /// Record a stroke change on the canvas.
    ///
    /// Events during an in-flight attempt update the counters but never start
    /// another attempt.
    pub fn on_strokes_changed(&mut self, stroke_count: usize, at: Instant) {
        self.stroke_count = stroke_count;
        self.last_change = Some(at);
        if !self.in_flight {
            self.phase = if stroke_count > 0 {
                LoopPhase::Accumulating
            } else {
                LoopPhase::Idle
            };
        }
    }

    /// Cap the stroke count at what the canvas actually holds.
    ///
    /// Stroke events can be delivered after an accept already removed the
    /// strokes they counted. Counts only ever go down here; increases arrive
    /// through [`Self::on_strokes_changed`] with their timestamp.
    pub fn clamp_stroke_count(&mut self, actual: usize) {
        if actual >= self.stroke_count {
            return;
        }
        tracing::trace!(reported = self.stroke_count, actual, "Stroke count clamped");
        self.stroke_count = actual;
        if !self.in_flight && actual == 0 {
            self.phase = LoopPhase::Idle;
        }
    }

    /// The first gate that blocks an attempt at `now`, or `None` if every
    /// gate passes.
    #[must_use]
    pub fn hold_reason(&self, now: Instant, has_artifact: bool) -> Option<HoldReason> {
        if self.in_flight {
            return Some(HoldReason::InFlight);
        }
        if !has_artifact {
            return Some(HoldReason::NoArtifact);
        }
        if self.stroke_count == 0 {
            return Some(HoldReason::EmptyCanvas);
        }
        if self
            .last_attempt
            .is_some_and(|t| now.saturating_duration_since(t) < self.config.rate_limit)
        {
            return Some(HoldReason::RateLimited);
        }
        if self
            .last_change
            .is_some_and(|t| now.saturating_duration_since(t) < self.config.settle_delay)
        {
            return Some(HoldReason::Settling);
        }
        None
    }

    /// Start an attempt if every gate passes.
    pub fn evaluate(&mut self, now: Instant, has_artifact: bool) -> Option<AttemptTicket> {
        if let Some(reason) = self.hold_reason(now, has_artifact) {
            tracing::trace!(?reason, "Recognition held");
            return None;
        }
        self.in_flight = true;
        self.phase = LoopPhase::Recognizing;
        let ticket = AttemptTicket {
            generation: self.generation,
            stroke_count: self.stroke_count,
        };
        tracing::debug!(
            generation = ticket.generation,
            strokes = ticket.stroke_count,
            "Recognition attempt started"
        );
        Some(ticket)
    }

    /// Finish an attempt. `recognized` is the drawing the inference ran on.
    ///
    /// Returns [`Decision::Stale`] for a ticket from a cancelled generation
    /// and leaves the loop untouched.
    pub fn complete(
        &mut self,
        ticket: AttemptTicket,
        outcome: AttemptOutcome,
        recognized: &Drawing,
        now: Instant,
    ) -> Decision {
        if !self.in_flight || ticket.generation != self.generation {
            tracing::debug!(
                ticket = ticket.generation,
                current = self.generation,
                "Discarding stale recognition result"
            );
            return Decision::Stale;
        }
        self.in_flight = false;
        self.last_attempt = Some(now);
        self.phase = LoopPhase::Idle;

        let decision = match outcome {
            AttemptOutcome::Predicted(p) if p.confidence > self.config.acceptance_threshold => {
                match placement_bounds(recognized, &self.config) {
                    Some(bounds) => Decision::Accept(Placement {
                        emoji: p.emoji,
                        confidence: p.confidence,
                        bounds,
                        recognized_strokes: recognized.stroke_count(),
                    }),
                    None => Decision::Reject(RejectReason::NoResult),
                }
            }
            AttemptOutcome::Predicted(_) => Decision::Reject(RejectReason::LowConfidence),
            AttemptOutcome::NoResult => Decision::Reject(RejectReason::NoResult),
            AttemptOutcome::ModelNotTrained => Decision::Reject(RejectReason::ModelNotTrained),
        };

        match &decision {
            Decision::Accept(placement) => {
                self.stroke_count = self
                    .stroke_count
                    .saturating_sub(placement.recognized_strokes);
                tracing::debug!(
                    emoji = %placement.emoji,
                    confidence = placement.confidence,
                    "Recognition accepted"
                );
            }
            Decision::Reject(reason) => {
                // Retried once the rate limit has passed.
                tracing::debug!(?reason, "Recognition rejected");
            }
            Decision::Stale => {}
        }
        decision
    }

    /// Drop any in-flight attempt. Its result will come back as stale.
    pub fn cancel(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.in_flight = false;
        self.phase = if self.stroke_count > 0 {
            LoopPhase::Accumulating
        } else {
            LoopPhase::Idle
        };
    }

    /// Cancel and forget all strokes, for a cleared canvas.
    pub fn reset(&mut self) {
        self.cancel();
        self.stroke_count = 0;
        self.last_change = None;
        self.phase = LoopPhase::Idle;
    }
}

/// Square placement box around a drawing.
///
/// Padding grows with the drawing's size, its stroke count, and how densely
/// its points are packed, then is clamped to the configured range.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn placement_bounds(drawing: &Drawing, config: &RecognitionConfig) -> Option<Bounds> {
    let bounds = drawing.bounds()?;
    let side = bounds.max_side();

    let extra_strokes = drawing.stroke_count().clamp(1, 10) - 1;
    let complexity = 0.1f32.mul_add(extra_strokes as f32, 1.0);
    let density = drawing.point_count() as f32 / side.max(1.0);
    let density_factor = 1.0 + (density / 4.0).clamp(0.0, 0.5);

    let padding = (side * 0.15 * complexity * density_factor)
        .clamp(config.min_padding, config.max_padding.max(config.min_padding));
    let half = side / 2.0 + padding + drawing.max_ink_width() / 2.0;
    let (cx, cy) = bounds.center();
    Some(Bounds::new(cx - half, cy - half, half * 2.0, half * 2.0))
}
