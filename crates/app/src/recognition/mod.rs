//! Live hand-gesture recognition served over HTTP.
//!
//! The module is split into focused submodules:
//! - `config`: CLI configuration parsing.
//! - `service`: Startup, shutdown, and the `check-models` command.
//! - `engine`: Model loading and frame-source construction.
//! - `inference`: The per-frame detect → classify → commit → annotate loop.
//! - `prediction`: The shared latest-prediction cell.
//! - `stream`: One loop per subscriber, single-frame hand-off.
//! - `annotation`: Skeleton and label drawing plus JPEG encode.
//! - `encoding`: Multipart framing for the MJPEG stream.
//! - `server`: Actix Web endpoints.
//! - `telemetry`: Tracing subscriber, Prometheus recorder, named threads.

/// Re-export settings so callers can configure runs without reaching into
/// submodules.
pub use config::{ModelArgs, ServeCliArgs, ServeConfig};
/// Launch the service or validate its artifacts.
pub use service::{check_models, run};

mod annotation;
mod config;
mod encoding;
mod engine;
mod inference;
mod prediction;
mod server;
mod service;
mod stream;
mod telemetry;
