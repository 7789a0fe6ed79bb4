use std::sync::Arc;

use async_trait::async_trait;
use image::RgbImage;

use crate::error::WorkerError;

mod wan;

pub use wan::{WanModelProvider, WanRuntime};

/// Everything the model needs for one generate call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub image: RgbImage,
    pub max_area: u32,
    pub frame_num: u32,
    pub shift: f32,
    pub sample_solver: &'static str,
    pub sampling_steps: u32,
    pub guide_scale: f32,
    pub n_prompt: String,
    /// -1 lets the model pick its own seed.
    pub seed: i64,
    pub offload_model: bool,
}

/// Generated video: `frames` RGB frames of `height`x`width`, values in [-1, 1],
/// laid out frame-major and channel-last.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoTensor {
    pub frames: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

impl VideoTensor {
    pub fn expected_len(frames: usize, height: usize, width: usize) -> usize {
        frames * height * width * 3
    }

    pub fn frame(&self, index: usize) -> &[f32] {
        let stride = self.height * self.width * 3;
        &self.data[index * stride..(index + 1) * stride]
    }
}

/// Model configuration exposed alongside the loaded runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub sample_neg_prompt: String,
    pub sample_fps: u32,
}

#[async_trait]
pub trait ModelRuntime: Send + Sync + std::fmt::Debug {
    fn config(&self) -> &RuntimeConfig;

    async fn generate(&self, request: GenerationRequest) -> Result<VideoTensor, WorkerError>;
}

/// Hands out the process-wide model runtime, constructing it at most once.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn acquire(&self) -> Result<Arc<dyn ModelRuntime>, WorkerError>;
}
