//! Refresh orchestration
//!
//! One refresh at a time: photo selection, data polling, compositing, panel
//! output. Overlapping requests are rejected rather than queued.

use crate::config::{Config, ConfigStore};
use crate::datasource::{poll_observations, DataFetcher, PollPolicy};
use crate::display::{DisplayDriver, DisplayError};
use crate::image_processing::{self, Assets};
use crate::palette::Palette;
use crate::photo::{self, Selection};
use chrono::NaiveDateTime;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use utoipa::ToSchema;

const PREVIEW_QUALITY: u8 = 90;

/// Failure inside one refresh step
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error("Panel error: {0}")]
    Display(#[from] DisplayError),

    #[error("Preview encoding error: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Preview I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Non-blocking, process-wide mutual exclusion for refreshes
#[derive(Debug, Default)]
pub struct RefreshLock {
    busy: AtomicBool,
}

/// Held for the duration of a refresh; releases on drop, panics included
pub struct RefreshGuard<'a> {
    lock: &'a RefreshLock,
}

impl RefreshLock {
    pub const fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    /// Take the lock if free, otherwise return immediately
    pub fn try_acquire(&self) -> Option<RefreshGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshGuard { lock: self })
    }

    pub fn is_held(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.lock.busy.store(false, Ordering::Release);
    }
}

/// How a refresh request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// A new frame reached the panel
    Displayed,
    /// Another refresh was already running
    Skipped,
    /// The uploads directory has nothing to show
    NoPhoto,
    /// Compositing could not finish
    ComposeFailed,
    /// The panel rejected the frame
    DisplayFailed,
}

impl RefreshOutcome {
    pub fn is_success(self) -> bool {
        self == RefreshOutcome::Displayed
    }
}

pub type SharedDisplay = Arc<Mutex<Box<dyn DisplayDriver>>>;

pub struct RefreshScheduler {
    lock: RefreshLock,
    store: Arc<ConfigStore>,
    fetcher: Arc<dyn DataFetcher>,
    display: SharedDisplay,
    assets: Arc<Assets>,
    palette: Arc<Palette>,
    uploads_dir: PathBuf,
    preview_path: PathBuf,
    poll: PollPolicy,
    clock: fn() -> NaiveDateTime,
}

impl RefreshScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<ConfigStore>,
        fetcher: Arc<dyn DataFetcher>,
        display: Box<dyn DisplayDriver>,
        assets: Arc<Assets>,
        palette: Palette,
        uploads_dir: PathBuf,
        preview_path: PathBuf,
        clock: fn() -> NaiveDateTime,
    ) -> Self {
        Self {
            lock: RefreshLock::new(),
            store,
            fetcher,
            display: Arc::new(Mutex::new(display)),
            assets,
            palette: Arc::new(palette),
            uploads_dir,
            preview_path,
            poll: PollPolicy::default(),
            clock,
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock.is_held()
    }

    /// Run one refresh unless another is in flight
    pub async fn refresh_display(&self) -> RefreshOutcome {
        let Some(_guard) = self.lock.try_acquire() else {
            tracing::info!("Refresh already in progress, skipping");
            return RefreshOutcome::Skipped;
        };

        let config = self.store.load().await;

        let Some(selection) = self.select_photo(&config).await else {
            tracing::warn!("No photo to display in {}", self.uploads_dir.display());
            return RefreshOutcome::NoPhoto;
        };
        tracing::info!(
            "Selected {} ({:?})",
            selection.path.display(),
            selection.source
        );

        let observations = poll_observations(self.fetcher.as_ref(), &config, &self.poll).await;

        let assets = self.assets.clone();
        let rendered_at = (self.clock)();
        let composed = tokio::task::spawn_blocking(move || {
            image_processing::compose(
                Some(selection.path.as_path()),
                observations.weather.as_ref(),
                observations.dust.as_ref(),
                &config.layout,
                &config.location.name,
                rendered_at,
                &assets,
            )
        })
        .await;

        let composition = match composed {
            Ok(composition) => composition,
            Err(e) => {
                tracing::error!("Compositing task failed: {}", e);
                return RefreshOutcome::ComposeFailed;
            }
        };
        tracing::debug!("Widget placed at {:?}", composition.widget);

        let image = Arc::new(composition.image);
        self.write_preview(image.clone()).await;

        match self.push_to_display(image).await {
            Ok(()) => {
                tracing::info!("Display refresh complete");
                RefreshOutcome::Displayed
            }
            Err(e) => {
                tracing::error!("Display refresh failed: {}", e);
                RefreshOutcome::DisplayFailed
            }
        }
    }

    async fn select_photo(&self, config: &Config) -> Option<Selection> {
        let config = config.clone();
        let uploads = self.uploads_dir.clone();
        tokio::task::spawn_blocking(move || photo::select_photo(&config, &uploads, &mut rand::rng()))
            .await
            .unwrap_or_else(|e| {
                tracing::error!("Photo selection task failed: {}", e);
                None
            })
    }

    /// Best effort: a failed preview never fails the refresh
    async fn write_preview(&self, image: Arc<RgbImage>) {
        let path = self.preview_path.clone();
        let written = tokio::task::spawn_blocking(move || save_jpeg(&image, &path)).await;

        match written {
            Ok(Ok(())) => tracing::debug!("Preview written to {}", self.preview_path.display()),
            Ok(Err(e)) => tracing::warn!("Failed to write preview: {}", e),
            Err(e) => tracing::warn!("Preview task failed: {}", e),
        }
    }

    async fn push_to_display(&self, image: Arc<RgbImage>) -> Result<(), RefreshError> {
        let display = self.display.clone();
        let palette = self.palette.clone();

        tokio::task::spawn_blocking(move || -> Result<(), DisplayError> {
            let mut driver = display.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            driver.init()?;
            driver.display(&image, &palette)?;
            if let Err(e) = driver.sleep() {
                tracing::warn!("Panel did not enter sleep: {}", e);
            }
            Ok(())
        })
        .await??;
        Ok(())
    }
}

/// Write a JPEG via a temp file so readers never see a partial preview
fn save_jpeg(image: &RgbImage, path: &Path) -> Result<(), RefreshError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, PREVIEW_QUALITY).encode_image(image)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
