//! Service supervisor: loads the models, starts the HTTP server, and tears
//! everything down on Ctrl+C.

use std::{
    net::SocketAddr,
    sync::{
        Arc, Once,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use anyhow::Result;
use tracing::{info, warn};

use crate::recognition::{
    config::{ModelArgs, ServeConfig, TelemetryOptions},
    engine::{self, RecognitionEngine},
    inference::LoopSettings,
    prediction::PredictionCell,
    server::spawn_server,
    stream::{SourceFactory, StreamPublisher},
    telemetry,
};

const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Run the recognition service until Ctrl+C or until the server thread dies.
pub fn run(config: ServeConfig) -> Result<()> {
    static CTRL_HANDLER: Once = Once::new();

    let _telemetry_guard = telemetry::init_tracing(&config.telemetry);
    let _ = telemetry::init_metrics_recorder();
    let service_span = tracing::info_span!(
        "gesture.service",
        source = ?config.source,
        mirror = config.mirror,
        jpeg_quality = config.jpeg_quality,
        video_mode = config.landmarks.video_mode
    );
    let _service_guard = service_span.enter();

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = shutdown.clone();
    CTRL_HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler(move || {
            handler_shutdown.store(true, Ordering::SeqCst);
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });

    let engine = RecognitionEngine::load(&config.models, &config.landmarks)?;

    let source = config.source.clone();
    let capture_size = config.capture_size;
    let frame_interval = config.frame_interval;
    let open_source: SourceFactory =
        Arc::new(move || engine::open_source(&source, capture_size, frame_interval));

    let prediction = Arc::new(PredictionCell::new());
    let publisher = Arc::new(StreamPublisher::new(
        engine,
        prediction.clone(),
        open_source,
        LoopSettings {
            mirror: config.mirror,
            jpeg_quality: config.jpeg_quality,
        },
    ));

    let server = spawn_server(
        SocketAddr::new(config.bind, config.port),
        prediction,
        publisher.clone(),
    )?;
    for addr in server.addrs() {
        info!("Video feed at http://{addr}/video_feed, prediction at http://{addr}/get_prediction");
    }

    while !shutdown.load(Ordering::SeqCst) {
        if !server.is_running() {
            warn!("HTTP server stopped unexpectedly");
            break;
        }
        thread::sleep(SHUTDOWN_POLL);
    }

    info!("Shutting down");
    // ending the loop first lets open streaming responses complete
    publisher.shutdown();
    server.stop();
    Ok(())
}

/// Load and cross-check the model artifacts without serving anything.
pub fn check_models(args: ModelArgs) -> Result<()> {
    let _telemetry_guard = telemetry::init_tracing(&TelemetryOptions::default());
    let models = args.model_paths()?;
    let landmarks = args.landmark_options()?;
    let engine = RecognitionEngine::load(&models, &landmarks)?;
    let labels = engine.labels();
    println!("classifier: {}", models.classifier.display());
    println!("landmarker: {}", models.landmarker.display());
    println!("{} classes: {}", labels.len(), labels.join(", "));
    Ok(())
}
