//! Shared server state.
//!
//! One read-only classifier instance for the whole process. Local weight
//! files are loaded eagerly before the listener starts; remote sources are
//! loaded lazily on the first request through a one-time init cell. A failed
//! load leaves the cell empty, so every subsequent request re-attempts it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crack_detect::{device_name, CrackClassifier, Device, Error};
use log::info;
use tokio::sync::OnceCell;

pub enum WeightSource {
    Local(PathBuf),
    Remote(String),
}

pub struct AppState {
    source: WeightSource,
    device: Device,
    quantize: bool,
    infer_timeout: Duration,
    classifier: OnceCell<Arc<CrackClassifier>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        source: WeightSource,
        device: Device,
        quantize: bool,
        infer_timeout: Duration,
    ) -> Self {
        AppState {
            source,
            device,
            quantize,
            infer_timeout,
            classifier: OnceCell::new(),
        }
    }

    /// State with an already-built classifier, bypassing the weight source.
    pub fn preloaded(
        classifier: CrackClassifier,
        device: Device,
        infer_timeout: Duration,
    ) -> Self {
        let quantize = classifier.is_quantized();
        AppState {
            source: WeightSource::Local(PathBuf::new()),
            device,
            quantize,
            infer_timeout,
            classifier: OnceCell::new_with(Some(Arc::new(classifier))),
        }
    }

    pub fn infer_timeout(&self) -> Duration {
        self.infer_timeout
    }

    pub fn model_loaded(&self) -> bool {
        self.classifier.get().is_some()
    }

    pub fn device_name(&self) -> &'static str {
        device_name(&self.device)
    }

    /// Get the shared classifier, loading it on first use. Concurrent first
    /// requests block on the single in-flight load.
    pub async fn classifier(&self) -> Result<Arc<CrackClassifier>, Error> {
        self.classifier
            .get_or_try_init(|| self.load())
            .await
            .cloned()
    }

    async fn load(&self) -> Result<Arc<CrackClassifier>, Error> {
        let path = match &self.source {
            WeightSource::Local(path) => path.clone(),
            WeightSource::Remote(url) => fetch_weights(url).await?,
        };

        let device = self.device.clone();
        let quantize = self.quantize;

        // Deserializing the state dict is CPU-bound; keep it off the
        // request-serving threads.
        tokio::task::spawn_blocking(move || {
            CrackClassifier::load_with_device(&path, device, quantize)
        })
        .await
        .map_err(Error::model_load)?
        .map(Arc::new)
    }
}

/// Fetch a weight artifact into the temp dir and hand back its path.
///
/// The URL must be reachable as-is (public or presigned); request signing
/// belongs to the object-storage collaborator.
async fn fetch_weights(url: &str) -> Result<PathBuf, Error> {
    info!("fetching model weights from {url}");

    let response = reqwest::get(url)
        .await
        .and_then(|r| r.error_for_status())
        .map_err(Error::model_load)?;
    let bytes = response.bytes().await.map_err(Error::model_load)?;

    let path = std::env::temp_dir().join("resnet18_trained.pth");
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(Error::model_load)?;

    info!("stored {} weight bytes at {}", bytes.len(), path.display());
    Ok(path)
}
