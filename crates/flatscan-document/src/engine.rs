// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image engine handle — the detector, rectifier, filter engine, and exporter
// bundled behind a one-time, memoised, timeout-bounded initialisation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use flatscan_core::ScanConfig;
use flatscan_core::error::{Result, ScanError};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::export::ExportEngine;
use crate::filter::engine::FilterEngine;
use crate::raster;
use crate::scan::detect::EdgeDetector;
use crate::scan::rectify::Rectifier;

/// Lifecycle of an [`EngineLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Loading,
    Ready,
    /// The last attempt failed; the next [`EngineLoader::get`] tries again.
    Failed,
}

/// Everything the pipeline needs to process pages, configured once.
#[derive(Debug, Clone)]
pub struct ImageEngine {
    config: ScanConfig,
    detector: EdgeDetector,
    rectifier: Rectifier,
    filters: FilterEngine,
    exporter: ExportEngine,
}

impl ImageEngine {
    /// Build an engine directly, without the loader's probe.
    pub fn new(config: ScanConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            detector: EdgeDetector::new(config.detection),
            rectifier: Rectifier::default(),
            filters: FilterEngine::new(config.filter, config.preview_max_dimension),
            exporter: ExportEngine::new(config.export)?,
            config,
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn detector(&self) -> &EdgeDetector {
        &self.detector
    }

    pub fn rectifier(&self) -> &Rectifier {
        &self.rectifier
    }

    pub fn filters(&self) -> &FilterEngine {
        &self.filters
    }

    pub fn exporter(&self) -> &ExportEngine {
        &self.exporter
    }
}

type Probe = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Hands out a shared [`ImageEngine`], initialising it at most once.
///
/// Concurrent callers during initialisation wait on the same attempt rather
/// than starting their own. The readiness probe runs on the blocking pool
/// under `engine_init_timeout_ms`; a timeout or probe error leaves the loader
/// in [`EngineState::Failed`].
pub struct EngineLoader {
    config: ScanConfig,
    probe: Probe,
    cell: OnceCell<Arc<ImageEngine>>,
    state: Mutex<EngineState>,
}

impl EngineLoader {
    /// Loader that checks the JPEG and PNG codecs before declaring ready.
    pub fn new(config: ScanConfig) -> Self {
        Self::with_probe(config, codec_probe)
    }

    /// Loader with a custom readiness probe.
    pub fn with_probe(
        config: ScanConfig,
        probe: impl Fn() -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            config,
            probe: Arc::new(probe),
            cell: OnceCell::new(),
            state: Mutex::new(EngineState::Uninitialized),
        }
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, state: EngineState) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    /// The shared engine, initialising it on first use.
    pub async fn get(&self) -> Result<Arc<ImageEngine>> {
        self.cell
            .get_or_try_init(|| self.initialise())
            .await
            .cloned()
    }

    #[instrument(skip(self), fields(timeout_ms = self.config.engine_init_timeout_ms))]
    async fn initialise(&self) -> Result<Arc<ImageEngine>> {
        self.set_state(EngineState::Loading);
        info!("Initialising image engine");

        let timeout_ms = self.config.engine_init_timeout_ms;
        let probe = Arc::clone(&self.probe);
        let outcome = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            tokio::task::spawn_blocking(move || probe()),
        )
        .await;

        let result = match outcome {
            Err(_) => Err(ScanError::EngineTimeout(timeout_ms)),
            Ok(Err(join_err)) => Err(ScanError::EngineUnavailable(format!(
                "readiness probe aborted: {}",
                join_err
            ))),
            Ok(Ok(probe_result)) => {
                probe_result.and_then(|()| ImageEngine::new(self.config).map(Arc::new))
            }
        };

        match &result {
            Ok(_) => {
                self.set_state(EngineState::Ready);
                info!("Image engine ready");
            }
            Err(err) => {
                self.set_state(EngineState::Failed);
                warn!(%err, "Image engine initialisation failed");
            }
        }
        result
    }
}

/// Encode and decode a tiny raster through each codec the pipeline uses.
pub fn codec_probe() -> Result<()> {
    let sample = RgbImage::from_pixel(2, 2, Rgb([255, 255, 255]));
    let jpeg = raster::to_jpeg_bytes(&sample, 90)?;
    image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
        .map_err(|err| ScanError::EngineUnavailable(format!("JPEG codec unusable: {}", err)))?;

    let png = raster::to_png_bytes(&DynamicImage::ImageRgb8(sample))?;
    image::load_from_memory_with_format(&png, ImageFormat::Png)
        .map_err(|err| ScanError::EngineUnavailable(format!("PNG codec unusable: {}", err)))?;

    debug!("Codec probe passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn initialises_once_and_memoises() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let loader = EngineLoader::with_probe(ScanConfig::default(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(loader.state(), EngineState::Uninitialized);

        let (a, b) = tokio::join!(loader.get(), loader.get());
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        let c = loader.get().await.unwrap();
        assert!(Arc::ptr_eq(&a, &c));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(loader.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn probe_failure_is_reported_and_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let loader = EngineLoader::with_probe(ScanConfig::default(), move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ScanError::EngineUnavailable("codec missing".into()))
            } else {
                Ok(())
            }
        });

        assert!(matches!(
            loader.get().await,
            Err(ScanError::EngineUnavailable(_))
        ));
        assert_eq!(loader.state(), EngineState::Failed);

        assert!(loader.get().await.is_ok());
        assert_eq!(loader.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn slow_probe_times_out() {
        let config = ScanConfig {
            engine_init_timeout_ms: 20,
            ..ScanConfig::default()
        };
        let loader = EngineLoader::with_probe(config, || {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        });

        assert!(matches!(
            loader.get().await,
            Err(ScanError::EngineTimeout(20))
        ));
        assert_eq!(loader.state(), EngineState::Failed);
    }

    #[tokio::test]
    async fn real_codecs_pass_the_probe() {
        let loader = EngineLoader::new(ScanConfig::default());
        let engine = loader.get().await.unwrap();
        assert_eq!(engine.config().preview_max_dimension, 1200);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = ScanConfig::default();
        config.export.quality = 2.0;
        assert!(ImageEngine::new(config).is_err());
    }
}
