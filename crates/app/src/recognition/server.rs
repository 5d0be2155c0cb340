//! Actix Web server exposing the MJPEG stream, the current prediction, and
//! operational endpoints.
//!
//! The server runs on a dedicated thread with its own actix system so the
//! recognition loop never shares a runtime with request handling.

use std::{
    net::SocketAddr,
    sync::{Arc, mpsc as std_mpsc},
    time::Duration,
};

use actix_web::{
    App, HttpResponse, HttpServer,
    http::header,
    web::{self, ServiceConfig},
};
use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::recognition::{
    encoding::STREAM_CONTENT_TYPE,
    prediction::{PredictionCell, PredictionResponse},
    stream::StreamPublisher,
    telemetry,
};

/// Shared state backing HTTP handlers.
pub(crate) struct ServerState {
    pub(crate) prediction: Arc<PredictionCell>,
    pub(crate) publisher: Arc<StreamPublisher>,
}

/// Handle for the server thread.
pub(crate) struct GestureServer {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<std::thread::JoinHandle<()>>,
    addrs: Vec<SocketAddr>,
}

impl GestureServer {
    pub(crate) fn addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signal the server to stop and block until the thread exits.
    pub(crate) fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    streaming: bool,
}

/// Route table shared by the server and the handler tests.
pub(crate) fn routes(cfg: &mut ServiceConfig) {
    cfg.route("/video_feed", web::get().to(video_feed))
        .route("/get_prediction", web::get().to(get_prediction))
        .route("/metrics", web::get().to(metrics_handler))
        .route("/healthz", web::get().to(healthz));
}

/// Bind `addr` on a new thread and return once the listener is up (or failed).
pub(crate) fn spawn_server(
    addr: SocketAddr,
    prediction: Arc<PredictionCell>,
    publisher: Arc<StreamPublisher>,
) -> Result<GestureServer> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (ready_tx, ready_rx) = std_mpsc::channel::<std::io::Result<Vec<SocketAddr>>>();
    let handle = telemetry::spawn_thread("gesture-http", move || {
        let result = actix_web::rt::System::new().block_on(async move {
            let state = web::Data::new(ServerState {
                prediction,
                publisher,
            });
            let bound = HttpServer::new(move || App::new().app_data(state.clone()).configure(routes))
                .disable_signals()
                .shutdown_timeout(2)
                .bind(addr);
            let server = match bound {
                Ok(server) => {
                    let _ = ready_tx.send(Ok(server.addrs()));
                    server.run()
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return Ok(());
                }
            };

            let srv_handle = server.handle();
            actix_web::rt::spawn(async move {
                let _ = shutdown_rx.await;
                srv_handle.stop(true).await;
            });

            server.await
        });
        if let Err(err) = result {
            error!("HTTP server error: {err}");
        }
    })
    .context("Failed to spawn HTTP server thread")?;

    let addrs = match ready_rx.recv_timeout(Duration::from_secs(10)) {
        Ok(Ok(addrs)) => addrs,
        Ok(Err(err)) => {
            let _ = handle.join();
            return Err(err).with_context(|| format!("failed to bind HTTP server to {addr}"));
        }
        Err(_) => return Err(anyhow!("HTTP server thread exited before binding {addr}")),
    };
    info!("HTTP server listening on {:?}", addrs);

    Ok(GestureServer {
        shutdown: Some(shutdown_tx),
        handle: Some(handle),
        addrs,
    })
}

fn with_cors(builder: &mut actix_web::HttpResponseBuilder) -> &mut actix_web::HttpResponseBuilder {
    builder
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, "*"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, "GET"))
        .insert_header((header::ACCESS_CONTROL_EXPOSE_HEADERS, "Content-Type"))
}

/// Stream annotated frames as multipart JPEG parts.
async fn video_feed(state: web::Data<ServerState>) -> HttpResponse {
    match state.publisher.subscribe() {
        Ok(stream) => with_cors(&mut HttpResponse::Ok())
            .insert_header((header::CACHE_CONTROL, "no-cache"))
            .content_type(STREAM_CONTENT_TYPE)
            .streaming(stream),
        Err(err) => {
            error!("Cannot start stream: {err:#}");
            HttpResponse::ServiceUnavailable().body(err.to_string())
        }
    }
}

/// Return the latest committed prediction.
async fn get_prediction(state: web::Data<ServerState>) -> HttpResponse {
    let snapshot = state.prediction.snapshot();
    with_cors(&mut HttpResponse::Ok()).json(PredictionResponse {
        prediction: snapshot.wire_value(),
    })
}

/// Prometheus text exposition.
async fn metrics_handler() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::NoContent().finish(),
    }
}

async fn healthz(state: web::Data<ServerState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        streaming: state.publisher.is_streaming(),
    })
}
