use std::collections::HashMap;
use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::Url;

pub const DEFAULT_MODEL_PATH: &str = "/workspace/Wan2.1/models/Wan2.1-I2V-14B-720P";

pub const DEFAULT_INFERENCE_URL: &str = "http://127.0.0.1:5000";

pub static UPLOAD_ENDPOINT: Lazy<Url> =
    Lazy::new(|| Url::parse("https://catbox.moe/user/api.php").unwrap());

/// catbox rejects uploads without a browser user-agent
pub const UPLOAD_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Pixel-area bounds per target size, keyed the way the model configs key them.
pub static MAX_AREA_CONFIGS: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    HashMap::from([
        ("720*1280", 720 * 1280),
        ("1280*720", 1280 * 720),
        ("480*832", 480 * 832),
        ("832*480", 832 * 480),
    ])
});

/// 4n+1 frames, matching the model's temporal compression stride.
pub const FRAME_NUM: u32 = 81;

pub const SAMPLING_STEPS: u32 = 40;

pub const GUIDE_SCALE: f32 = 5.0;

pub const SAMPLE_SOLVER: &str = "unipc";

/// Shuttle weights between device and host to cap peak memory.
pub const OFFLOAD_MODEL: bool = true;
