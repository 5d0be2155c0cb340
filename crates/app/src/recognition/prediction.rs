//! The single piece of state shared between the inference loop and the
//! prediction endpoint.

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

/// Wire value before any frame has been processed.
pub(crate) const PENDING_WIRE: &str = "Waiting...";
/// Wire value for a frame without a detected hand.
pub(crate) const NO_HAND_WIRE: &str = "...";

/// Current best-effort gesture label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Prediction {
    Pending,
    NoHand,
    Gesture(String),
}

impl Prediction {
    /// String form understood by the presentation layer.
    pub(crate) fn wire_value(&self) -> &str {
        match self {
            Prediction::Pending => PENDING_WIRE,
            Prediction::NoHand => NO_HAND_WIRE,
            Prediction::Gesture(label) => label,
        }
    }
}

#[derive(Serialize)]
pub(crate) struct PredictionResponse<'a> {
    pub(crate) prediction: &'a str,
}

/// Single-writer / multi-reader cell holding the latest [`Prediction`].
///
/// Writers swap a whole `Arc`, readers clone it, so a reader sees either the
/// previous or the new value and the lock is only held for a pointer copy.
pub(crate) struct PredictionCell {
    current: RwLock<Arc<Prediction>>,
}

impl Default for PredictionCell {
    fn default() -> Self {
        Self {
            current: RwLock::new(Arc::new(Prediction::Pending)),
        }
    }
}

impl PredictionCell {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn snapshot(&self) -> Arc<Prediction> {
        // the stored Arc is always complete, so a poisoned lock is still readable
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn publish(&self, prediction: Prediction) {
        let next = Arc::new(prediction);
        let previous = {
            let mut guard = self
                .current
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, next)
        };
        drop(previous);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        thread,
    };

    use super::*;

    #[test]
    fn starts_pending() {
        let cell = PredictionCell::new();
        assert_eq!(*cell.snapshot(), Prediction::Pending);
        assert_eq!(cell.snapshot().wire_value(), "Waiting...");
    }

    #[test]
    fn wire_values() {
        assert_eq!(Prediction::NoHand.wire_value(), "...");
        assert_eq!(Prediction::Gesture("Hello".into()).wire_value(), "Hello");
    }

    #[test]
    fn publish_replaces_value() {
        let cell = PredictionCell::new();
        cell.publish(Prediction::Gesture("A".into()));
        assert_eq!(*cell.snapshot(), Prediction::Gesture("A".into()));
        cell.publish(Prediction::NoHand);
        assert_eq!(*cell.snapshot(), Prediction::NoHand);
    }

    #[test]
    fn concurrent_readers_never_see_partial_values() {
        let cell = Arc::new(PredictionCell::new());
        let done = Arc::new(AtomicBool::new(false));
        let labels: Vec<String> = (0..8).map(|i| "G".repeat(i + 1)).collect();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cell = cell.clone();
                let done = done.clone();
                let labels = labels.clone();
                thread::spawn(move || {
                    let mut reads = 0_u64;
                    while !done.load(Ordering::Relaxed) {
                        match &*cell.snapshot() {
                            Prediction::Pending | Prediction::NoHand => {}
                            Prediction::Gesture(label) => {
                                assert!(labels.contains(label), "torn label {label:?}")
                            }
                        }
                        reads += 1;
                    }
                    reads
                })
            })
            .collect();

        for round in 0..5_000 {
            if round % 7 == 0 {
                cell.publish(Prediction::NoHand);
            } else {
                cell.publish(Prediction::Gesture(labels[round % labels.len()].clone()));
            }
        }
        done.store(true, Ordering::Relaxed);

        for reader in readers {
            reader.join().expect("reader panicked");
        }
    }
}
