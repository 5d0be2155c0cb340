//! Frame source replaying a directory of still images in file-name order.

use std::{
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, anyhow};
use chrono::Utc;
use tracing::debug;

use crate::{
    source::FrameSource,
    types::{CaptureError, Frame},
};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Replays `png`/`jpg`/`bmp` files once, then reports exhaustion.
pub struct StillImageSource {
    dir: PathBuf,
    paths: Vec<PathBuf>,
    cursor: usize,
    interval: Option<Duration>,
    last_emit: Option<Instant>,
}

impl StillImageSource {
    pub fn open(dir: impl AsRef<Path>, interval: Option<Duration>) -> Result<Self, CaptureError> {
        let dir = dir.as_ref().to_path_buf();
        let entries = std::fs::read_dir(&dir).map_err(|_| CaptureError::Open {
            uri: dir.display().to_string(),
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry
                .with_context(|| format!("failed to list {}", dir.display()))?
                .path();
            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    IMAGE_EXTENSIONS
                        .iter()
                        .any(|known| ext.eq_ignore_ascii_case(known))
                });
            if matches {
                paths.push(path);
            }
        }
        paths.sort();
        debug!("{} still images queued from {}", paths.len(), dir.display());

        Ok(Self {
            dir,
            paths,
            cursor: 0,
            interval,
            last_emit: None,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn pace(&mut self) {
        if let (Some(interval), Some(last)) = (self.interval, self.last_emit) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        self.last_emit = Some(Instant::now());
    }
}

impl FrameSource for StillImageSource {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        let path = self.paths.get(self.cursor).ok_or(CaptureError::Exhausted)?;
        let rgb = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))?
            .to_rgb8();
        self.cursor += 1;

        let (width, height) = rgb.dimensions();
        let mut data = rgb.into_raw();
        for pixel in data.chunks_exact_mut(3) {
            pixel.swap(0, 2);
        }

        self.pace();
        let frame = Frame::from_bgr(
            data,
            i32::try_from(width).map_err(|_| anyhow!("image too wide: {width}"))?,
            i32::try_from(height).map_err(|_| anyhow!("image too tall: {height}"))?,
            Utc::now().timestamp_millis(),
        )?;
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!("still images in {}", self.dir.display())
    }
}
