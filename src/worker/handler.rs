use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_channel::Sender;
use tracing::{error, info};
use uuid::Uuid;

use super::types::{GenerationParams, JobEnvelope, JobEvent, JobInput, JobStatus, JobSuccess};
use crate::app_state::AppState;
use crate::consts::{FRAME_NUM, GUIDE_SCALE, OFFLOAD_MODEL, SAMPLE_SOLVER, SAMPLING_STEPS};
use crate::encode::EncodeOptions;
use crate::error::WorkerError;
use crate::model::GenerationRequest;

/// Run one job start to finish, emitting ordered progress events on the
/// channel. Never fails toward the caller: every error becomes the single
/// terminal failure event.
pub async fn run_job(state: Arc<AppState>, job: JobEnvelope, events: Sender<JobEvent>) {
    let started = Instant::now();
    let input = job.input;

    let (image_url, prompt) = match (&input.image_url, &input.prompt) {
        (Some(image_url), Some(prompt)) => (image_url.clone(), prompt.clone()),
        _ => {
            let err = WorkerError::InvalidInput(
                "Missing required parameters: image_url and prompt".to_string(),
            );
            let _ = events.send(JobEvent::failure(&err, elapsed(started))).await;
            return;
        }
    };

    let params = match GenerationParams::resolve(&input.resolution) {
        Ok(params) => params,
        Err(err) => {
            let _ = events.send(JobEvent::failure(&err, elapsed(started))).await;
            return;
        }
    };

    info!(
        "Starting video generation job {} with prompt: '{}'",
        job.id, prompt
    );

    match run_steps(&state, &input, &image_url, &prompt, params, started, &events).await {
        Ok(success) => {
            info!(
                "Job {} completed successfully in {:.2}s",
                job.id, success.processing_time
            );
            let _ = events.send(JobEvent::Completed(success)).await;
        }
        Err(err) => {
            error!("Error during video generation for job {}: {err}", job.id);
            let _ = events.send(JobEvent::failure(&err, elapsed(started))).await;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_steps(
    state: &AppState,
    input: &JobInput,
    image_url: &str,
    prompt: &str,
    params: GenerationParams,
    started: Instant,
    events: &Sender<JobEvent>,
) -> Result<JobSuccess, WorkerError> {
    let _ = events
        .send(JobEvent::progress(
            JobStatus::Downloading,
            10,
            "Downloading input image...",
            elapsed(started),
        ))
        .await;

    let image = state.image_fetcher.fetch(image_url).await?;

    let _ = events
        .send(JobEvent::progress(
            JobStatus::Loading,
            20,
            "Loading model...",
            elapsed(started),
        ))
        .await;

    let runtime = state.model_provider.acquire().await?;
    let config = runtime.config().clone();

    let _ = events
        .send(JobEvent::progress(
            JobStatus::Generating,
            30,
            "Starting video generation...",
            elapsed(started),
        ))
        .await;

    let n_prompt = if input.negative.is_empty() {
        config.sample_neg_prompt.clone()
    } else {
        input.negative.clone()
    };
    let seed = if input.seed >= 0 { input.seed } else { -1 };

    info!("Generating video...");
    let tensor = runtime
        .generate(GenerationRequest {
            prompt: prompt.to_string(),
            image,
            max_area: params.max_area,
            frame_num: FRAME_NUM,
            shift: params.shift,
            sample_solver: SAMPLE_SOLVER,
            sampling_steps: SAMPLING_STEPS,
            guide_scale: GUIDE_SCALE,
            n_prompt,
            seed,
            offload_model: OFFLOAD_MODEL,
        })
        .await?;

    let _ = events
        .send(JobEvent::progress(
            JobStatus::Saving,
            80,
            "Saving video...",
            elapsed(started),
        ))
        .await;

    tokio::fs::create_dir_all(&state.config.scratch_dir)
        .await
        .map_err(|e| {
            WorkerError::GenerationFailed(format!("Failed to prepare scratch directory: {e}"))
        })?;

    let output_path = scratch_output_path(state);
    info!("Saving video to: {}", output_path.display());

    state
        .encoder
        .encode(
            tensor,
            &output_path,
            EncodeOptions {
                fps: config.sample_fps,
                nrow: 1,
                normalize: true,
                value_range: (-1.0, 1.0),
            },
        )
        .await?;

    let _ = events
        .send(JobEvent::progress(
            JobStatus::Uploading,
            90,
            "Uploading video...",
            elapsed(started),
        ))
        .await;

    let video_url = state.uploader.upload(&output_path).await?;

    // Reclaim the scratch file only once the upload went through; an upload
    // failure leaves it in place.
    if output_path.exists() {
        let _ = tokio::fs::remove_file(&output_path).await;
    }

    let processing_time = round2(elapsed(started));

    Ok(JobSuccess {
        video_url,
        duration: 5.0,
        resolution: input.resolution.clone(),
        seed: input.seed,
        processing_time,
        status: JobStatus::Completed,
        message: format!("Video generation completed in {processing_time:.2}s"),
        timestamp: processing_time,
    })
}

fn scratch_output_path(state: &AppState) -> PathBuf {
    let suffix = Uuid::new_v4().simple().to_string();
    state
        .config
        .scratch_dir
        .join(format!("wan21_i2v_{}.mp4", &suffix[..8]))
}

fn elapsed(started: Instant) -> f64 {
    started.elapsed().as_secs_f64()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use image::RgbImage;

    use super::*;
    use crate::config::AppConfig;
    use crate::encode::VideoEncoder;
    use crate::fetch::ImageFetcher;
    use crate::model::{ModelProvider, ModelRuntime, RuntimeConfig, VideoTensor};
    use crate::upload::Uploader;

    #[derive(Default, Debug)]
    struct Calls {
        fetch: AtomicUsize,
        acquire: AtomicUsize,
        generate: AtomicUsize,
        encode: AtomicUsize,
        upload: AtomicUsize,
    }

    struct StubFetcher {
        calls: Arc<Calls>,
    }

    #[async_trait]
    impl ImageFetcher for StubFetcher {
        async fn fetch(&self, _url: &str) -> Result<RgbImage, WorkerError> {
            self.calls.fetch.fetch_add(1, Ordering::SeqCst);
            Ok(RgbImage::new(8, 8))
        }
    }

    #[derive(Debug)]
    struct StubRuntime {
        calls: Arc<Calls>,
        config: RuntimeConfig,
        last_request: Mutex<Option<GenerationRequest>>,
    }

    #[async_trait]
    impl ModelRuntime for StubRuntime {
        fn config(&self) -> &RuntimeConfig {
            &self.config
        }

        async fn generate(&self, request: GenerationRequest) -> Result<VideoTensor, WorkerError> {
            self.calls.generate.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request);
            Ok(VideoTensor {
                frames: 2,
                height: 4,
                width: 4,
                data: vec![0.0; VideoTensor::expected_len(2, 4, 4)],
            })
        }
    }

    struct StubProvider {
        calls: Arc<Calls>,
        runtime: Arc<StubRuntime>,
    }

    #[async_trait]
    impl ModelProvider for StubProvider {
        async fn acquire(&self) -> Result<Arc<dyn ModelRuntime>, WorkerError> {
            self.calls.acquire.fetch_add(1, Ordering::SeqCst);
            let runtime: Arc<dyn ModelRuntime> = self.runtime.clone();
            Ok(runtime)
        }
    }

    /// Writes a placeholder file so the upload and cleanup paths see one.
    struct FileEncoder {
        calls: Arc<Calls>,
    }

    #[async_trait]
    impl VideoEncoder for FileEncoder {
        async fn encode(
            &self,
            _tensor: VideoTensor,
            path: &Path,
            _options: EncodeOptions,
        ) -> Result<(), WorkerError> {
            self.calls.encode.fetch_add(1, Ordering::SeqCst);
            std::fs::write(path, b"mp4").unwrap();
            Ok(())
        }
    }

    struct StubUploader {
        calls: Arc<Calls>,
        fail: bool,
    }

    #[async_trait]
    impl Uploader for StubUploader {
        async fn upload(&self, _path: &Path) -> Result<String, WorkerError> {
            self.calls.upload.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(WorkerError::UploadFailed(
                    "Failed to upload video: connection reset".into(),
                ))
            } else {
                Ok("https://files.catbox.moe/abc123.mp4".to_string())
            }
        }
    }

    struct Harness {
        state: Arc<AppState>,
        calls: Arc<Calls>,
        runtime: Arc<StubRuntime>,
    }

    fn harness(scratch: &Path, upload_fails: bool) -> Harness {
        let calls = Arc::new(Calls::default());
        let runtime = Arc::new(StubRuntime {
            calls: calls.clone(),
            config: RuntimeConfig {
                sample_neg_prompt: "default negative".to_string(),
                sample_fps: 16,
            },
            last_request: Mutex::new(None),
        });

        let config = AppConfig {
            scratch_dir: scratch.to_path_buf(),
            ..AppConfig::default()
        };

        let state = Arc::new(AppState {
            config,
            image_fetcher: Arc::new(StubFetcher {
                calls: calls.clone(),
            }),
            model_provider: Arc::new(StubProvider {
                calls: calls.clone(),
                runtime: runtime.clone(),
            }),
            encoder: Arc::new(FileEncoder {
                calls: calls.clone(),
            }),
            uploader: Arc::new(StubUploader {
                calls: calls.clone(),
                fail: upload_fails,
            }),
        });

        Harness {
            state,
            calls,
            runtime,
        }
    }

    fn envelope(json: &str) -> JobEnvelope {
        serde_json::from_str(json).unwrap()
    }

    async fn run_collect(state: Arc<AppState>, job: JobEnvelope) -> Vec<JobEvent> {
        let (tx, rx) = async_channel::unbounded();
        run_job(state, job, tx).await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn scratch_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    #[tokio::test]
    async fn test_missing_inputs_fail_without_external_calls() {
        let scratch = tempfile::tempdir().unwrap();
        let h = harness(scratch.path(), false);

        let events = run_collect(
            h.state.clone(),
            envelope(r#"{"id": "j1", "input": {"prompt": "a cat"}}"#),
        )
        .await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            JobEvent::Failed(failure) => {
                assert_eq!(failure.error_code, "INVALID_INPUT");
                assert_eq!(failure.status, JobStatus::Failed);
                assert_eq!(
                    failure.error,
                    "Missing required parameters: image_url and prompt"
                );
            }
            other => panic!("expected failure, got {other:?}"),
        }

        assert_eq!(h.calls.fetch.load(Ordering::SeqCst), 0);
        assert_eq!(h.calls.acquire.load(Ordering::SeqCst), 0);
        assert_eq!(h.calls.generate.load(Ordering::SeqCst), 0);
        assert_eq!(h.calls.encode.load(Ordering::SeqCst), 0);
        assert_eq!(h.calls.upload.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_resolution_fails_without_external_calls() {
        let scratch = tempfile::tempdir().unwrap();
        let h = harness(scratch.path(), false);

        let events = run_collect(
            h.state.clone(),
            envelope(
                r#"{"input": {"image_url": "http://x/img.jpg", "prompt": "a cat", "resolution": "1080p"}}"#,
            ),
        )
        .await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            JobEvent::Failed(failure) => {
                assert_eq!(failure.error_code, "INVALID_INPUT");
                assert_eq!(
                    failure.error,
                    "Unsupported resolution: 1080p. Use '720p' or '480p'"
                );
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(h.calls.fetch.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_successful_job_emits_ordered_events() {
        let scratch = tempfile::tempdir().unwrap();
        let h = harness(scratch.path(), false);

        let events = run_collect(
            h.state.clone(),
            envelope(
                r#"{"input": {"image_url": "http://x/img.jpg", "prompt": "a cat", "resolution": "480p"}}"#,
            ),
        )
        .await;

        assert_eq!(events.len(), 6);

        let expected = [
            (JobStatus::Downloading, 10),
            (JobStatus::Loading, 20),
            (JobStatus::Generating, 30),
            (JobStatus::Saving, 80),
            (JobStatus::Uploading, 90),
        ];
        for (event, (status, progress)) in events.iter().zip(expected) {
            match event {
                JobEvent::Progress(update) => {
                    assert_eq!(update.status, status);
                    assert_eq!(update.progress, progress);
                }
                other => panic!("expected progress, got {other:?}"),
            }
        }

        match &events[5] {
            JobEvent::Completed(success) => {
                assert_eq!(success.video_url, "https://files.catbox.moe/abc123.mp4");
                assert_eq!(success.duration, 5.0);
                assert_eq!(success.resolution, "480p");
                assert_eq!(success.seed, -1);
                assert_eq!(success.status, JobStatus::Completed);
            }
            other => panic!("expected success, got {other:?}"),
        }

        // Generation saw the 480p parameters and the config's negative prompt.
        let request = h.runtime.last_request.lock().unwrap().take().unwrap();
        assert_eq!(request.max_area, 832 * 480);
        assert_eq!(request.shift, 3.0);
        assert_eq!(request.frame_num, 81);
        assert_eq!(request.sampling_steps, 40);
        assert_eq!(request.guide_scale, 5.0);
        assert_eq!(request.sample_solver, "unipc");
        assert_eq!(request.n_prompt, "default negative");
        assert_eq!(request.seed, -1);
        assert!(request.offload_model);

        // Scratch file reclaimed after the upload.
        assert!(scratch_files(scratch.path()).is_empty());
    }

    #[tokio::test]
    async fn test_explicit_seed_and_negative_are_passed_and_echoed() {
        let scratch = tempfile::tempdir().unwrap();
        let h = harness(scratch.path(), false);

        let events = run_collect(
            h.state.clone(),
            envelope(
                r#"{"input": {"image_url": "http://x/img.jpg", "prompt": "a cat", "seed": 42, "negative": "blurry"}}"#,
            ),
        )
        .await;

        let request = h.runtime.last_request.lock().unwrap().take().unwrap();
        assert_eq!(request.seed, 42);
        assert_eq!(request.n_prompt, "blurry");
        assert_eq!(request.max_area, 1280 * 720);
        assert_eq!(request.shift, 5.0);

        match events.last().unwrap() {
            JobEvent::Completed(success) => {
                assert_eq!(success.seed, 42);
                assert_eq!(success.resolution, "720p");
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upload_failure_is_terminal_and_leaves_the_scratch_file() {
        let scratch = tempfile::tempdir().unwrap();
        let h = harness(scratch.path(), true);

        let events = run_collect(
            h.state.clone(),
            envelope(r#"{"input": {"image_url": "http://x/img.jpg", "prompt": "a cat"}}"#),
        )
        .await;

        assert_eq!(events.len(), 6);
        match events.last().unwrap() {
            JobEvent::Failed(failure) => {
                assert_eq!(failure.error_code, "UPLOAD_ERROR");
                assert_eq!(failure.status, JobStatus::Failed);
            }
            other => panic!("expected failure, got {other:?}"),
        }

        // The encoded file stays behind when the upload fails.
        let leftover = scratch_files(scratch.path());
        assert_eq!(leftover.len(), 1);
        let name = leftover[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("wan21_i2v_"));
        assert!(name.ends_with(".mp4"));
    }

    #[test]
    fn test_scratch_names_are_unique() {
        let scratch = tempfile::tempdir().unwrap();
        let h = harness(scratch.path(), false);

        let first = scratch_output_path(&h.state);
        let second = scratch_output_path(&h.state);
        assert_ne!(first, second);

        let name = first.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name.len(), "wan21_i2v_".len() + 8 + ".mp4".len());
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.2345), 1.23);
        assert_eq!(round2(1.237), 1.24);
        assert_eq!(round2(0.0), 0.0);
    }
}
