use std::sync::Arc;

use crate::config::AppConfig;
use crate::encode::{FfmpegEncoder, VideoEncoder};
use crate::fetch::{HttpImageFetcher, ImageFetcher};
use crate::model::{ModelProvider, WanModelProvider};
use crate::upload::{CatboxUploader, Uploader};

/// Shared service state: configuration plus the four collaborators the job
/// handler calls out to.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub image_fetcher: Arc<dyn ImageFetcher>,
    pub model_provider: Arc<dyn ModelProvider>,
    pub encoder: Arc<dyn VideoEncoder>,
    pub uploader: Arc<dyn Uploader>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let model_provider = Arc::new(WanModelProvider::new(
            config.model_path.clone(),
            config.inference_url.clone(),
        ));

        AppState {
            config,
            image_fetcher: Arc::new(HttpImageFetcher::new()),
            model_provider,
            encoder: Arc::new(FfmpegEncoder),
            uploader: Arc::new(CatboxUploader::new()),
        }
    }
}
