use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::info;

use super::{GenerationRequest, ModelProvider, ModelRuntime, RuntimeConfig, VideoTensor};
use crate::error::WorkerError;

/// Wan i2v-14B defaults, mirrored from the model's shipped configuration.
const SAMPLE_FPS: u32 = 16;

const SAMPLE_NEG_PROMPT: &str = "色调艳丽，过曝，静态，细节模糊不清，字幕，风格，作品，画作，画面，静止，整体发灰，最差质量，低质量，JPEG压缩残留，丑陋的，残缺的，多余的手指，画得不好的手部，画得不好的脸部，畸形的，毁容的，形态畸形的肢体，手指融合，静止不动的画面，杂乱的背景，三条腿，背景人很多，倒着走";

#[derive(Serialize)]
struct SidecarGenerateRequest<'a> {
    checkpoint_dir: &'a str,
    device_id: u32,
    rank: u32,
    t5_fsdp: bool,
    dit_fsdp: bool,
    use_usp: bool,
    t5_cpu: bool,
    prompt: &'a str,
    image_png_b64: String,
    max_area: u32,
    frame_num: u32,
    shift: f32,
    sample_solver: &'a str,
    sampling_steps: u32,
    guide_scale: f32,
    n_prompt: &'a str,
    seed: i64,
    offload_model: bool,
}

#[derive(Deserialize)]
struct SidecarGenerateResponse {
    status: String,
    tensor_path: Option<String>,
    frames: Option<usize>,
    height: Option<usize>,
    width: Option<usize>,
    error: Option<String>,
}

/// Client for the local inference sidecar hosting the Wan I2V model.
#[derive(Debug)]
pub struct WanRuntime {
    client: reqwest::Client,
    generate_url: String,
    checkpoint_dir: PathBuf,
    config: RuntimeConfig,
}

impl WanRuntime {
    /// Fails if the weights directory is missing. The sidecar itself is not
    /// contacted until the first generate call.
    pub fn load(checkpoint_dir: &Path, inference_url: &str) -> Result<Self, WorkerError> {
        if !checkpoint_dir.exists() {
            return Err(WorkerError::ModelLoadFailed(format!(
                "Model path not found: {}",
                checkpoint_dir.display()
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            generate_url: format!("{}/generate", inference_url.trim_end_matches('/')),
            checkpoint_dir: checkpoint_dir.to_path_buf(),
            config: RuntimeConfig {
                sample_neg_prompt: SAMPLE_NEG_PROMPT.to_string(),
                sample_fps: SAMPLE_FPS,
            },
        })
    }

    fn encode_image_png(image: &image::RgbImage) -> Result<String, WorkerError> {
        let mut png = Vec::new();
        image
            .write_to(
                &mut std::io::Cursor::new(&mut png),
                image::ImageOutputFormat::Png,
            )
            .map_err(|e| {
                WorkerError::GenerationFailed(format!("Failed to encode conditioning image: {e}"))
            })?;

        Ok(BASE64.encode(png))
    }
}

#[async_trait]
impl ModelRuntime for WanRuntime {
    fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    async fn generate(&self, request: GenerationRequest) -> Result<VideoTensor, WorkerError> {
        let image_png_b64 = Self::encode_image_png(&request.image)?;
        let checkpoint_dir = self.checkpoint_dir.display().to_string();

        let body = SidecarGenerateRequest {
            checkpoint_dir: &checkpoint_dir,
            device_id: 0,
            rank: 0,
            t5_fsdp: false,
            dit_fsdp: false,
            use_usp: false,
            t5_cpu: false,
            prompt: &request.prompt,
            image_png_b64,
            max_area: request.max_area,
            frame_num: request.frame_num,
            shift: request.shift,
            sample_solver: request.sample_solver,
            sampling_steps: request.sampling_steps,
            guide_scale: request.guide_scale,
            n_prompt: &request.n_prompt,
            seed: request.seed,
            offload_model: request.offload_model,
        };

        // No timeout here: inference legitimately runs for minutes.
        let response = self
            .client
            .post(&self.generate_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                WorkerError::GenerationFailed(format!("Failed to reach inference runtime: {e}"))
            })?
            .error_for_status()
            .map_err(|e| {
                WorkerError::GenerationFailed(format!("Inference runtime rejected request: {e}"))
            })?;

        let payload: SidecarGenerateResponse = response.json().await.map_err(|e| {
            WorkerError::GenerationFailed(format!("Failed to parse inference response: {e}"))
        })?;

        if payload.status != "success" {
            let message = payload
                .error
                .unwrap_or_else(|| format!("Unexpected status: {}", payload.status));
            return Err(classify_runtime_error(message));
        }

        let (tensor_path, frames, height, width) = match (
            payload.tensor_path,
            payload.frames,
            payload.height,
            payload.width,
        ) {
            (Some(path), Some(frames), Some(height), Some(width)) => {
                (path, frames, height, width)
            }
            _ => {
                return Err(WorkerError::GenerationFailed(
                    "Inference response missing tensor path or shape".to_string(),
                ))
            }
        };

        let tensor = read_tensor_file(Path::new(&tensor_path), frames, height, width).await?;

        // The sidecar's scratch file is ours to reclaim once read.
        let _ = tokio::fs::remove_file(&tensor_path).await;

        Ok(tensor)
    }
}

/// Memory exhaustion reported by the runtime gets its own bucket; everything
/// else it reports is a generation failure.
fn classify_runtime_error(message: String) -> WorkerError {
    let lowered = message.to_lowercase();
    if lowered.contains("memory") || lowered.contains("cuda") {
        WorkerError::OutOfMemory(message)
    } else {
        WorkerError::GenerationFailed(message)
    }
}

/// Raw little-endian f32 dump of frames*height*width*3 values.
async fn read_tensor_file(
    path: &Path,
    frames: usize,
    height: usize,
    width: usize,
) -> Result<VideoTensor, WorkerError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        WorkerError::GenerationFailed(format!(
            "Failed to read generated tensor {}: {e}",
            path.display()
        ))
    })?;

    let expected = VideoTensor::expected_len(frames, height, width) * 4;
    if bytes.len() != expected {
        return Err(WorkerError::GenerationFailed(format!(
            "Generated tensor has {} bytes, expected {expected}",
            bytes.len()
        )));
    }

    let data = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    Ok(VideoTensor {
        frames,
        height,
        width,
        data,
    })
}

/// Constructs the runtime on first acquire and hands out the cached handle
/// afterwards. The cell guards against concurrent first calls.
pub struct WanModelProvider {
    model_path: PathBuf,
    inference_url: String,
    runtime: OnceCell<Arc<WanRuntime>>,
}

impl WanModelProvider {
    pub fn new(model_path: PathBuf, inference_url: String) -> Self {
        Self {
            model_path,
            inference_url,
            runtime: OnceCell::new(),
        }
    }
}

#[async_trait]
impl ModelProvider for WanModelProvider {
    async fn acquire(&self) -> Result<Arc<dyn ModelRuntime>, WorkerError> {
        let runtime = self
            .runtime
            .get_or_try_init(|| async {
                log::info!("Loading Wan 2.1 I2V model from {}", self.model_path.display());
                let runtime = WanRuntime::load(&self.model_path, &self.inference_url)?;
                info!("Model loaded successfully");
                Ok(Arc::new(runtime))
            })
            .await?;

        let runtime: Arc<dyn ModelRuntime> = runtime.clone();
        Ok(runtime)
    }
}
