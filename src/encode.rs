use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use async_trait::async_trait;
use tracing::error;

use crate::error::WorkerError;
use crate::model::VideoTensor;

/// Encode parameters, taken from the model config at call time.
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    pub fps: u32,
    /// Clips per grid row; this worker always produces a single clip.
    pub nrow: u32,
    /// Map values from `value_range` to the 0..255 pixel range.
    pub normalize: bool,
    pub value_range: (f32, f32),
}

#[async_trait]
pub trait VideoEncoder: Send + Sync {
    async fn encode(
        &self,
        tensor: VideoTensor,
        path: &Path,
        options: EncodeOptions,
    ) -> Result<(), WorkerError>;
}

/// Pipes raw RGB24 frames into an ffmpeg child process.
pub struct FfmpegEncoder;

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn encode(
        &self,
        tensor: VideoTensor,
        path: &Path,
        options: EncodeOptions,
    ) -> Result<(), WorkerError> {
        let path: PathBuf = path.to_path_buf();

        tokio::task::spawn_blocking(move || encode_blocking(&tensor, &path, &options))
            .await
            .map_err(|e| {
                WorkerError::GenerationFailed(format!("Video encoding task failed: {e}"))
            })?
    }
}

fn encode_blocking(
    tensor: &VideoTensor,
    path: &Path,
    options: &EncodeOptions,
) -> Result<(), WorkerError> {
    if tensor.data.len() != VideoTensor::expected_len(tensor.frames, tensor.height, tensor.width) {
        return Err(WorkerError::GenerationFailed(format!(
            "Video tensor shape mismatch: {} values for {}x{}x{}",
            tensor.data.len(),
            tensor.frames,
            tensor.height,
            tensor.width
        )));
    }

    // Grid layout only matters for multi-clip batches, which never reach here.
    if options.nrow != 1 {
        return Err(WorkerError::GenerationFailed(format!(
            "Unsupported grid layout nrow={}",
            options.nrow
        )));
    }

    let size = format!("{}x{}", tensor.width, tensor.height);
    let fps = options.fps.to_string();

    let mut child = Command::new("ffmpeg")
        .args([
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "-s",
            &size,
            "-r",
            &fps,
            "-i",
            "-",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
            "-y",
        ])
        .arg(path)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| WorkerError::GenerationFailed(format!("Failed to spawn ffmpeg: {e}")))?;

    let mut stdin = child.stdin.take().ok_or_else(|| {
        WorkerError::GenerationFailed("Failed to open ffmpeg stdin".to_string())
    })?;

    for index in 0..tensor.frames {
        let rgb = frame_to_rgb24(tensor.frame(index), options);
        if let Err(e) = stdin.write_all(&rgb) {
            // ffmpeg exited early; fall through and report its stderr
            error!("ffmpeg stdin write failed: {e}");
            break;
        }
    }
    drop(stdin);

    let output = child
        .wait_with_output()
        .map_err(|e| WorkerError::GenerationFailed(format!("Failed to wait for ffmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("ffmpeg failed: {stderr}");
        return Err(WorkerError::GenerationFailed(format!(
            "ffmpeg encoding failed: {stderr}"
        )));
    }

    Ok(())
}

/// Map one frame from the tensor's value range to RGB24 bytes.
fn frame_to_rgb24(frame: &[f32], options: &EncodeOptions) -> Vec<u8> {
    let (low, high) = if options.normalize {
        options.value_range
    } else {
        (0.0, 255.0)
    };
    let scale = 255.0 / (high - low);

    frame
        .iter()
        .map(|value| ((value.clamp(low, high) - low) * scale).round() as u8)
        .collect()
}
