use thiserror::Error;

/// Job-level failure, produced directly at the collaborator call site that
/// observed it. Each variant carries the user-visible message verbatim.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Failed to download image from {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("{0}")]
    ModelLoadFailed(String),

    #[error("{0}")]
    OutOfMemory(String),

    #[error("{0}")]
    UploadFailed(String),

    #[error("{0}")]
    GenerationFailed(String),
}

impl WorkerError {
    /// Stable code surfaced in the terminal failure event.
    pub fn code(&self) -> &'static str {
        match self {
            WorkerError::InvalidInput(_) => "INVALID_INPUT",
            WorkerError::DownloadFailed { .. } => "DOWNLOAD_ERROR",
            WorkerError::ModelLoadFailed(_) => "MODEL_ERROR",
            WorkerError::OutOfMemory(_) => "MEMORY_ERROR",
            WorkerError::UploadFailed(_) => "UPLOAD_ERROR",
            WorkerError::GenerationFailed(_) => "GENERATION_ERROR",
        }
    }
}
