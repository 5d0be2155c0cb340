//! Stream publisher: one inference loop per subscriber, one capture at a time.
//!
//! `subscribe` starts a loop on a dedicated thread and hands back a lazy
//! multipart stream. The hand-off holds a single frame, so a slow HTTP client
//! throttles capture instead of queueing frames. A newer subscriber pre-empts
//! the older one; the new loop only opens the frame source once the old loop
//! has released the engine (and with it the capture device).

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

use actix_web::web::Bytes;
use anyhow::{Context, Result, bail};
use async_stream::stream;
use futures_util::Stream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, info};
use video_ingest::FrameSource;

use crate::recognition::{
    encoding::FramePacket,
    engine::RecognitionEngine,
    inference::{InferenceLoop, LoopExit, LoopSettings, StopSignal},
    prediction::PredictionCell,
    telemetry,
};

/// How often a producer blocked on a full hand-off re-checks its stop signal.
const HANDOFF_POLL: Duration = Duration::from_millis(5);

/// Opens a fresh frame source for each loop instance.
pub(crate) type SourceFactory = Arc<dyn Fn() -> Result<Box<dyn FrameSource>> + Send + Sync>;

struct ActiveLoop {
    stop: StopSignal,
    handle: thread::JoinHandle<LoopExit>,
}

pub(crate) struct StreamPublisher {
    engine: Arc<Mutex<RecognitionEngine>>,
    prediction: Arc<PredictionCell>,
    open_source: SourceFactory,
    settings: LoopSettings,
    active: Mutex<Option<ActiveLoop>>,
    sessions: AtomicU64,
    closed: AtomicBool,
}

impl StreamPublisher {
    pub(crate) fn new(
        engine: RecognitionEngine,
        prediction: Arc<PredictionCell>,
        open_source: SourceFactory,
        settings: LoopSettings,
    ) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            prediction,
            open_source,
            settings,
            active: Mutex::new(None),
            sessions: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Start a loop instance and return its multipart chunk stream.
    pub(crate) fn subscribe(
        &self,
    ) -> Result<impl Stream<Item = Result<Bytes, actix_web::Error>> + 'static> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::SeqCst) {
            bail!("stream publisher is shut down");
        }
        if let Some(previous) = active.take() {
            info!("New subscriber pre-empts the running stream");
            previous.stop.raise();
        }

        let session = self.sessions.fetch_add(1, Ordering::Relaxed) + 1;
        let stop = StopSignal::default();
        let (tx, mut rx) = mpsc::channel::<FramePacket>(1);

        let engine = self.engine.clone();
        let prediction = self.prediction.clone();
        let open_source = self.open_source.clone();
        let settings = self.settings;
        let loop_stop = stop.clone();
        let handle = telemetry::spawn_thread(format!("gesture-stream-{session}"), move || {
            let loop_span = tracing::info_span!("stream.loop", session);
            let _loop_guard = loop_span.enter();

            let mut engine = engine.lock().unwrap_or_else(PoisonError::into_inner);
            if loop_stop.is_raised() {
                return LoopExit::Stopped;
            }

            let mut source = match open_source() {
                Ok(source) => source,
                Err(err) => {
                    error!("Failed to open frame source: {err:#}");
                    return LoopExit::SourceFailed;
                }
            };
            info!("Streaming from {}", source.describe());
            metrics::counter!("gesture_stream_sessions_total").increment(1);
            metrics::gauge!("gesture_stream_active").set(1.0);

            let exit = InferenceLoop::new(&mut engine, &prediction, settings).run(
                source.as_mut(),
                &loop_stop,
                |packet| hand_off(&tx, packet, &loop_stop),
            );

            drop(source);
            metrics::gauge!("gesture_stream_active").set(0.0);
            info!(?exit, "Stream loop finished");
            exit
        })
        .context("failed to spawn stream thread")?;

        *active = Some(ActiveLoop {
            stop: stop.clone(),
            handle,
        });

        Ok(stream! {
            while let Some(packet) = rx.recv().await {
                if stop.is_raised() {
                    break;
                }
                yield Ok::<Bytes, actix_web::Error>(packet.into_chunk());
            }
        })
    }

    pub(crate) fn is_streaming(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// Stop the running loop and wait until it has released the frame source.
    /// Later `subscribe` calls fail.
    pub(crate) fn shutdown(&self) {
        let previous = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            self.closed.store(true, Ordering::SeqCst);
            active.take()
        };
        if let Some(previous) = previous {
            previous.stop.raise();
            match previous.handle.join() {
                Ok(exit) => info!(?exit, "Stream loop joined"),
                Err(_) => error!("Stream loop panicked"),
            }
        }
    }
}

/// Capacity-one hand-off that gives up when the consumer is gone or the loop
/// has been asked to stop.
///
/// Polls instead of `blocking_send` so the stop signal is re-checked while a
/// stalled consumer holds the slot.
fn hand_off(tx: &mpsc::Sender<FramePacket>, mut packet: FramePacket, stop: &StopSignal) -> bool {
    loop {
        match tx.try_send(packet) {
            Ok(()) => return true,
            Err(TrySendError::Closed(_)) => return false,
            Err(TrySendError::Full(returned)) => {
                if stop.is_raised() {
                    return false;
                }
                packet = returned;
                thread::sleep(HANDOFF_POLL);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{pin::pin, time::Instant};

    use futures_util::StreamExt;

    use super::*;
    use crate::recognition::{
        inference::tests::{SyntheticSource, hand, scripted_engine},
        prediction::Prediction,
    };

    const SETTINGS: LoopSettings = LoopSettings {
        mirror: true,
        jpeg_quality: 70,
    };

    fn publisher(frames: usize, opened: Arc<AtomicU64>) -> StreamPublisher {
        let (engine, _) = scripted_engine(vec![Ok(vec![hand()])], vec![Ok(2)]);
        let factory: SourceFactory = Arc::new(move || {
            opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(SyntheticSource {
                remaining: frames,
                fail_at_end: false,
            }) as Box<dyn FrameSource>)
        });
        StreamPublisher::new(engine, Arc::new(PredictionCell::new()), factory, SETTINGS)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[actix_web::test]
    async fn finite_source_yields_every_frame_then_ends() {
        let opened = Arc::new(AtomicU64::new(0));
        let publisher = publisher(3, opened.clone());
        let chunks: Vec<_> = pin!(publisher.subscribe().unwrap()).collect().await;

        assert_eq!(chunks.len(), 3);
        for (index, chunk) in chunks.into_iter().enumerate() {
            let chunk = chunk.unwrap();
            let header = format!(
                "--frame\r\nContent-Type: image/jpeg\r\nX-Sequence: {}\r\n\r\n",
                index + 1
            );
            assert!(chunk.starts_with(header.as_bytes()));
            assert!(chunk.ends_with(b"\r\n"));
        }
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(publisher.prediction.snapshot().wire_value(), "...");
        publisher.shutdown();
        assert!(!publisher.is_streaming());
    }

    #[test]
    fn shutdown_unblocks_a_producer_waiting_on_a_slow_consumer() {
        let opened = Arc::new(AtomicU64::new(0));
        let publisher = publisher(1_000, opened);
        let stream = publisher.subscribe().unwrap();

        // nobody polls: one frame in the channel, one waiting in the producer
        thread::sleep(Duration::from_millis(200));
        assert!(publisher.is_streaming());
        let prediction = publisher.prediction.snapshot();
        assert!(matches!(*prediction, Prediction::Gesture(_)) || *prediction == Prediction::NoHand);

        publisher.shutdown();
        assert!(!publisher.is_streaming());
        drop(stream);
    }

    #[test]
    fn new_subscriber_preempts_the_previous_stream() {
        let opened = Arc::new(AtomicU64::new(0));
        let publisher = publisher(1_000, opened.clone());
        let first = publisher.subscribe().unwrap();
        wait_until(|| opened.load(Ordering::SeqCst) == 1);

        let second = publisher.subscribe().unwrap();
        wait_until(|| opened.load(Ordering::SeqCst) == 2);
        assert!(publisher.is_streaming());

        publisher.shutdown();
        assert!(!publisher.is_streaming());
        assert!(publisher.subscribe().is_err());
        drop((first, second));
    }

    #[test]
    fn dropping_the_stream_ends_the_loop() {
        let opened = Arc::new(AtomicU64::new(0));
        let publisher = publisher(1_000, opened.clone());
        let stream = publisher.subscribe().unwrap();
        wait_until(|| opened.load(Ordering::SeqCst) == 1);
        drop(stream);
        wait_until(|| !publisher.is_streaming());
    }
}
