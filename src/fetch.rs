use async_trait::async_trait;
use image::RgbImage;
use tracing::{error, info};

use crate::consts::DOWNLOAD_TIMEOUT;
use crate::error::WorkerError;

/// Fetches the conditioning image for a job.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Download the image at `url` and decode it as 3-channel RGB.
    async fn fetch(&self, url: &str) -> Result<RgbImage, WorkerError>;
}

pub struct HttpImageFetcher {
    client: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_inner(&self, url: &str) -> Result<RgbImage, String> {
        let response = self
            .client
            .get(url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;

        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        let decoded = image::load_from_memory(&bytes).map_err(|e| e.to_string())?;

        Ok(decoded.to_rgb8())
    }
}

impl Default for HttpImageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<RgbImage, WorkerError> {
        info!("Downloading image from: {url}");

        let image = self.fetch_inner(url).await.map_err(|reason| {
            error!("Failed to download image: {reason}");
            WorkerError::DownloadFailed {
                url: url.to_string(),
                reason,
            }
        })?;

        info!(
            "Successfully downloaded image: {}x{}",
            image.width(),
            image.height()
        );
        Ok(image)
    }
}
