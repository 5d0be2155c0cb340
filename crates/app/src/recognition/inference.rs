//! The per-frame recognition loop.
//!
//! Each iteration pulls one frame, mirrors it, detects landmarks, classifies
//! the first hand, commits the outcome to the [`PredictionCell`], then
//! annotates and encodes the frame for the stream. Only `NoHand` and
//! `Classified` outcomes are committed; a failed frame leaves the previous
//! prediction in place.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use anyhow::Result;
use ml_core::LandmarkSet;
use tracing::{error, info, warn};
use video_ingest::{CaptureError, Frame, FrameSource};

use crate::recognition::{
    annotation::{self, Overlay},
    encoding::FramePacket,
    engine::RecognitionEngine,
    prediction::{Prediction, PredictionCell},
};

/// Cooperative stop flag checked between frames.
#[derive(Clone, Debug, Default)]
pub(crate) struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub(crate) fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct LoopSettings {
    pub(crate) mirror: bool,
    pub(crate) jpeg_quality: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FailureStage {
    Landmarks,
    Classify,
    Encode,
}

impl FailureStage {
    pub(crate) fn label(self) -> &'static str {
        match self {
            FailureStage::Landmarks => "landmarks",
            FailureStage::Classify => "classify",
            FailureStage::Encode => "encode",
        }
    }
}

/// Result of running recognition on one frame.
#[derive(Debug)]
pub(crate) enum FrameOutcome {
    NoHand,
    Classified { hand: LandmarkSet, label: String },
    Failed {
        stage: FailureStage,
        hand: Option<LandmarkSet>,
    },
}

impl FrameOutcome {
    fn hand(&self) -> Option<&LandmarkSet> {
        match self {
            FrameOutcome::NoHand => None,
            FrameOutcome::Classified { hand, .. } => Some(hand),
            FrameOutcome::Failed { hand, .. } => hand.as_ref(),
        }
    }

    fn label(&self) -> Option<&str> {
        match self {
            FrameOutcome::Classified { label, .. } => Some(label),
            _ => None,
        }
    }
}

/// Why a loop instance ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum LoopExit {
    SourceEnded,
    SourceFailed,
    Stopped,
    ConsumerGone,
}

pub(crate) struct InferenceLoop<'a> {
    engine: &'a mut RecognitionEngine,
    prediction: &'a PredictionCell,
    settings: LoopSettings,
    frame_number: u64,
}

impl<'a> InferenceLoop<'a> {
    pub(crate) fn new(
        engine: &'a mut RecognitionEngine,
        prediction: &'a PredictionCell,
        settings: LoopSettings,
    ) -> Self {
        Self {
            engine,
            prediction,
            settings,
            frame_number: 0,
        }
    }

    /// Drive the loop until the source ends, `stop` is raised, or `emit`
    /// reports that nobody is consuming frames any more.
    pub(crate) fn run<F>(
        &mut self,
        source: &mut dyn FrameSource,
        stop: &StopSignal,
        mut emit: F,
    ) -> LoopExit
    where
        F: FnMut(FramePacket) -> bool,
    {
        loop {
            if stop.is_raised() {
                return LoopExit::Stopped;
            }

            let capture_start = Instant::now();
            let mut frame = match source.next_frame() {
                Ok(frame) => frame,
                Err(CaptureError::Exhausted) => {
                    info!("Frame source {} exhausted", source.describe());
                    return LoopExit::SourceEnded;
                }
                Err(err) => {
                    error!("Frame source {} failed: {err:#}", source.describe());
                    return LoopExit::SourceFailed;
                }
            };
            metrics::histogram!("gesture_stage_latency_seconds", "stage" => "capture")
                .record(capture_start.elapsed().as_secs_f64());

            self.frame_number += 1;
            metrics::counter!("gesture_frames_total").increment(1);
            let frame_span = tracing::info_span!("frame", frame = self.frame_number);
            let _frame_guard = frame_span.enter();

            if self.settings.mirror {
                frame.flip_horizontal();
            }

            let outcome = self.process_frame(&frame);
            if let FrameOutcome::Failed { stage, .. } = &outcome {
                record_failure(*stage);
            }
            let packet = match self.render(&frame, &outcome) {
                Ok(packet) => packet,
                Err(err) => {
                    warn!("Skipping frame {}: {err:#}", self.frame_number);
                    record_failure(FailureStage::Encode);
                    continue;
                }
            };

            if !emit(packet) {
                return if stop.is_raised() {
                    LoopExit::Stopped
                } else {
                    LoopExit::ConsumerGone
                };
            }
        }
    }

    /// Detection and classification for one (already mirrored) frame. Commits
    /// `NoHand` and `Classified` outcomes to the prediction cell.
    pub(crate) fn process_frame(&mut self, frame: &Frame) -> FrameOutcome {
        let detect_start = Instant::now();
        let hands = match self.engine.detect(frame) {
            Ok(hands) => hands,
            Err(err) => {
                warn!("Landmark detection failed: {err:#}");
                return FrameOutcome::Failed {
                    stage: FailureStage::Landmarks,
                    hand: None,
                };
            }
        };
        metrics::histogram!("gesture_stage_latency_seconds", "stage" => "landmarks")
            .record(detect_start.elapsed().as_secs_f64());

        let Some(hand) = hands.into_iter().next() else {
            metrics::counter!("gesture_no_hand_frames_total").increment(1);
            self.prediction.publish(Prediction::NoHand);
            return FrameOutcome::NoHand;
        };

        let classify_start = Instant::now();
        match self.engine.classify(&hand) {
            Ok(label) => {
                metrics::histogram!("gesture_stage_latency_seconds", "stage" => "classify")
                    .record(classify_start.elapsed().as_secs_f64());
                self.prediction.publish(Prediction::Gesture(label.clone()));
                FrameOutcome::Classified { hand, label }
            }
            Err(err) => {
                warn!("Classification failed: {err}");
                FrameOutcome::Failed {
                    stage: FailureStage::Classify,
                    hand: Some(hand),
                }
            }
        }
    }

    fn render(&self, frame: &Frame, outcome: &FrameOutcome) -> Result<FramePacket> {
        let encode_start = Instant::now();
        let image = annotation::render(
            frame,
            &Overlay {
                hand: outcome.hand(),
                label: outcome.label(),
                frame_number: self.frame_number,
            },
        )?;
        let jpeg = annotation::encode_jpeg(&image, self.settings.jpeg_quality)?;
        metrics::histogram!("gesture_stage_latency_seconds", "stage" => "encode")
            .record(encode_start.elapsed().as_secs_f64());
        Ok(FramePacket {
            jpeg,
            frame_number: self.frame_number,
        })
    }
}

fn record_failure(stage: FailureStage) {
    metrics::counter!("gesture_frame_failures_total", "stage" => stage.label()).increment(1);
}
