use std::path::Path;

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use tracing::info;

use crate::consts::{UPLOAD_ENDPOINT, UPLOAD_TIMEOUT, UPLOAD_USER_AGENT};
use crate::error::WorkerError;

/// Pushes a local file to the public host and returns its URL.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<String, WorkerError>;
}

pub struct CatboxUploader {
    client: reqwest::Client,
    endpoint: Url,
}

impl CatboxUploader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: UPLOAD_ENDPOINT.clone(),
        }
    }

    async fn upload_inner(&self, path: &Path) -> Result<String, String> {
        let bytes = tokio::fs::read(path).await.map_err(|e| e.to_string())?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video.mp4".to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("video/mp4")
            .map_err(|e| e.to_string())?;
        let form = Form::new()
            .text("reqtype", "fileupload")
            .part("fileToUpload", part);

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(USER_AGENT, UPLOAD_USER_AGENT)
            .multipart(form)
            .timeout(UPLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;

        let body = response.text().await.map_err(|e| e.to_string())?;

        // The host answers with the bare public URL.
        Ok(body.trim().to_string())
    }
}

impl Default for CatboxUploader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Uploader for CatboxUploader {
    async fn upload(&self, path: &Path) -> Result<String, WorkerError> {
        let url = self
            .upload_inner(path)
            .await
            .map_err(|reason| WorkerError::UploadFailed(format!("Failed to upload video: {reason}")))?;

        info!("Video uploaded successfully: {url}");
        Ok(url)
    }
}
