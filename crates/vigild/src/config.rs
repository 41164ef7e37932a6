use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use vigil_core::{
    AssociationCap, LivenessConfig, PipelineConfig, QualityConfig, TimeoutPolicy, TrackerConfig,
};

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    pub camera_width: u32,
    pub camera_height: u32,
    pub camera_fps: u32,
    /// Frames to discard at startup (camera AGC/AE stabilization).
    pub warmup_frames: usize,
    /// Path to the SQLite identity database.
    pub db_path: PathBuf,
    /// Cosine distance strictly below this accepts a gallery entry.
    pub match_threshold: f32,
    /// Consecutive undetected frames before a track is dropped.
    pub max_disappeared: u32,
    /// Detection-to-track association radius in pixels.
    pub association_radius: f32,
    pub blur_threshold: f64,
    pub min_brightness: f64,
    pub max_brightness: f64,
    pub max_yaw: f32,
    pub max_pitch: f32,
    /// Minimum face width in pixels before recognition is attempted.
    pub min_face_width: i32,
    /// Seconds a liveness challenge stays open.
    pub challenge_timeout_secs: u64,
    /// Horizontal displacement required, as a fraction of the frame width.
    pub move_fraction: f32,
    /// Width-proxy change required, as a fraction of the baseline.
    pub scale_fraction: f32,
    /// What happens when a challenge times out: reissue a fresh one or
    /// leave the face blocked.
    pub timeout_policy: TimeoutPolicy,
}

impl Config {
    /// Load configuration from `VIGIL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("vigil");

        let db_path = std::env::var("VIGIL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("identities.db"));

        let timeout_policy = std::env::var("VIGIL_TIMEOUT_POLICY")
            .ok()
            .and_then(|v| parse_policy(&v))
            .unwrap_or(TimeoutPolicy::Reissue);

        Self {
            camera_device: std::env::var("VIGIL_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            camera_width: env_parse("VIGIL_CAMERA_WIDTH", 640),
            camera_height: env_parse("VIGIL_CAMERA_HEIGHT", 480),
            camera_fps: env_parse("VIGIL_CAMERA_FPS", 30),
            warmup_frames: env_parse("VIGIL_WARMUP_FRAMES", 4),
            db_path,
            match_threshold: env_parse("VIGIL_MATCH_THRESHOLD", 0.5),
            max_disappeared: env_parse("VIGIL_MAX_DISAPPEARED", 30),
            association_radius: env_parse("VIGIL_ASSOCIATION_RADIUS", 50.0),
            blur_threshold: env_parse("VIGIL_BLUR_THRESHOLD", 50.0),
            min_brightness: env_parse("VIGIL_MIN_BRIGHTNESS", 70.0),
            max_brightness: env_parse("VIGIL_MAX_BRIGHTNESS", 220.0),
            max_yaw: env_parse("VIGIL_MAX_YAW", 25.0),
            max_pitch: env_parse("VIGIL_MAX_PITCH", 25.0),
            min_face_width: env_parse("VIGIL_MIN_FACE_WIDTH", 80),
            challenge_timeout_secs: env_parse("VIGIL_CHALLENGE_TIMEOUT_SECS", 5),
            move_fraction: env_parse("VIGIL_MOVE_FRACTION", 0.05),
            scale_fraction: env_parse("VIGIL_SCALE_FRACTION", 0.20),
            timeout_policy,
        }
    }

    /// Assemble the per-stage tuning the pipeline takes at construction.
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            tracker: TrackerConfig {
                max_disappeared: self.max_disappeared,
                ..TrackerConfig::default()
            },
            association_cap: AssociationCap::Pixels(self.association_radius),
            quality: QualityConfig {
                blur_threshold: self.blur_threshold,
                min_brightness: self.min_brightness,
                max_brightness: self.max_brightness,
                max_yaw: self.max_yaw,
                max_pitch: self.max_pitch,
                min_face_width: self.min_face_width,
            },
            liveness: LivenessConfig {
                timeout: Duration::from_secs(self.challenge_timeout_secs),
                move_fraction: self.move_fraction,
                scale_fraction: self.scale_fraction,
                timeout_policy: self.timeout_policy,
            },
            match_threshold: self.match_threshold,
        }
    }
}

fn parse_policy(value: &str) -> Option<TimeoutPolicy> {
    match value.to_ascii_lowercase().as_str() {
        "reissue" => Some(TimeoutPolicy::Reissue),
        "expire" => Some(TimeoutPolicy::Expire),
        _ => None,
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
