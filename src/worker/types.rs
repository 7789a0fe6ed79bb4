use serde::{Deserialize, Serialize};

use crate::consts::MAX_AREA_CONFIGS;
use crate::error::WorkerError;

/// Job envelope as delivered by the host platform.
#[derive(Debug, Clone, Deserialize)]
pub struct JobEnvelope {
    #[serde(default = "default_job_id")]
    pub id: String,
    #[serde(default)]
    pub input: JobInput,
}

fn default_job_id() -> String {
    "unknown".to_string()
}

/// Request fields. Presence of `image_url` and `prompt` is checked by the
/// handler, not here, so a sparse payload still deserializes.
#[derive(Debug, Clone, Deserialize)]
pub struct JobInput {
    pub image_url: Option<String>,
    pub prompt: Option<String>,
    #[serde(default)]
    pub negative: String,
    #[serde(default = "default_seed")]
    pub seed: i64,
    #[serde(default = "default_resolution")]
    pub resolution: String,
}

fn default_seed() -> i64 {
    -1
}

fn default_resolution() -> String {
    "720p".to_string()
}

impl Default for JobInput {
    fn default() -> Self {
        JobInput {
            image_url: None,
            prompt: None,
            negative: String::new(),
            seed: default_seed(),
            resolution: default_resolution(),
        }
    }
}

/// Resolution-derived knobs for one generate call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_area: u32,
    pub shift: f32,
}

impl GenerationParams {
    pub fn resolve(resolution: &str) -> Result<Self, WorkerError> {
        let (size_key, shift) = match resolution {
            "720p" => ("1280*720", 5.0),
            "480p" => ("832*480", 3.0),
            _ => {
                return Err(WorkerError::InvalidInput(format!(
                    "Unsupported resolution: {resolution}. Use '720p' or '480p'"
                )))
            }
        };

        Ok(GenerationParams {
            max_area: MAX_AREA_CONFIGS[size_key],
            shift,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Downloading,
    Loading,
    Generating,
    Saving,
    Uploading,
    Completed,
    Failed,
}

/// One entry in the job's ordered event sequence.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JobEvent {
    Progress(ProgressUpdate),
    Completed(JobSuccess),
    Failed(JobFailure),
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSuccess {
    pub video_url: String,
    pub duration: f64,
    pub resolution: String,
    pub seed: i64,
    pub processing_time: f64,
    pub status: JobStatus,
    pub message: String,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobFailure {
    pub error: String,
    pub error_code: String,
    pub status: JobStatus,
    pub processing_time: f64,
    pub timestamp: f64,
}

impl JobEvent {
    pub fn progress(
        status: JobStatus,
        progress: u8,
        message: impl Into<String>,
        elapsed: f64,
    ) -> Self {
        JobEvent::Progress(ProgressUpdate {
            status,
            progress,
            message: message.into(),
            timestamp: elapsed,
        })
    }

    pub fn failure(error: &WorkerError, elapsed: f64) -> Self {
        JobEvent::Failed(JobFailure {
            error: error.to_string(),
            error_code: error.code().to_string(),
            status: JobStatus::Failed,
            processing_time: elapsed,
            timestamp: elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_envelope_gets_defaults() {
        let job: JobEnvelope = serde_json::from_str(r#"{"input": {"prompt": "a cat"}}"#).unwrap();

        assert_eq!(job.id, "unknown");
        assert_eq!(job.input.prompt.as_deref(), Some("a cat"));
        assert_eq!(job.input.image_url, None);
        assert_eq!(job.input.negative, "");
        assert_eq!(job.input.seed, -1);
        assert_eq!(job.input.resolution, "720p");
    }

    #[test]
    fn test_envelope_without_input_still_parses() {
        let job: JobEnvelope = serde_json::from_str(r#"{"prompt": "x"}"#).unwrap();

        assert_eq!(job.id, "unknown");
        assert_eq!(job.input.prompt, None);
        assert_eq!(job.input.image_url, None);
    }

    #[test]
    fn test_720p_params() {
        let params = GenerationParams::resolve("720p").unwrap();
        assert_eq!(params.max_area, MAX_AREA_CONFIGS["1280*720"]);
        assert_eq!(params.max_area, 1280 * 720);
        assert_eq!(params.shift, 5.0);
    }

    #[test]
    fn test_480p_params() {
        let params = GenerationParams::resolve("480p").unwrap();
        assert_eq!(params.max_area, MAX_AREA_CONFIGS["832*480"]);
        assert_eq!(params.max_area, 832 * 480);
        assert_eq!(params.shift, 3.0);
    }

    #[test]
    fn test_unknown_resolution_is_invalid_input() {
        let err = GenerationParams::resolve("1080p").unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        assert_eq!(
            err.to_string(),
            "Unsupported resolution: 1080p. Use '720p' or '480p'"
        );
    }

    #[test]
    fn test_progress_event_shape() {
        let event = JobEvent::progress(JobStatus::Downloading, 10, "Downloading input image...", 0.5);
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["status"], "downloading");
        assert_eq!(value["progress"], 10);
        assert_eq!(value["message"], "Downloading input image...");
        assert_eq!(value["timestamp"], 0.5);
    }

    #[test]
    fn test_failure_event_shape() {
        let err = WorkerError::UploadFailed("Failed to upload video: boom".into());
        let value = serde_json::to_value(JobEvent::failure(&err, 1.25)).unwrap();

        assert_eq!(value["error"], "Failed to upload video: boom");
        assert_eq!(value["error_code"], "UPLOAD_ERROR");
        assert_eq!(value["status"], "failed");
        assert_eq!(value["processing_time"], 1.25);
        assert_eq!(value["timestamp"], 1.25);
    }
}
