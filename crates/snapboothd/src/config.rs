use serde::Deserialize;
use snapbooth_core::{BoothConfig, ConfigError, ProbeSettings};
use snapbooth_hw::PrintStyle;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Widest mat border accepted, in pixels.
pub const MAX_BORDER_PX: u32 = 1024;

/// Daemon configuration: built-in defaults, then an optional TOML file
/// named by `SNAPBOOTH_CONFIG`, then `SNAPBOOTH_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    pub frame_width: u32,
    pub frame_height: u32,
    pub countdown_secs: u32,
    pub result_secs: u32,
    /// Consecutive positive frames before presence is trusted.
    pub debounce_frames: u32,
    pub capture_timeout_ms: u64,
    /// Frames older than this are not used for a capture.
    pub frame_max_age_ms: u64,
    pub min_confidence: f32,
    pub min_face_width: f32,
    /// Upload endpoint accepting `{"image": "<base64>"}`.
    pub upload_url: Option<String>,
    pub upload_timeout_secs: u64,
    /// Additional attempts after the first failed one.
    pub upload_retries: u32,
    pub upload_backoff_ms: u64,
    pub max_image_bytes: usize,
    pub jpeg_quality: u8,
    pub border_px: u32,
    pub mirror: bool,
    pub dbus_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        let booth = BoothConfig::default();
        Self {
            camera_device: "/dev/video0".to_string(),
            frame_width: 1280,
            frame_height: 720,
            countdown_secs: booth.countdown_secs,
            result_secs: booth.result_secs,
            debounce_frames: booth.debounce_frames,
            capture_timeout_ms: booth.capture_timeout.as_millis() as u64,
            frame_max_age_ms: 1000,
            min_confidence: 0.5,
            min_face_width: 0.0,
            upload_url: None,
            upload_timeout_secs: 10,
            upload_retries: 3,
            upload_backoff_ms: 500,
            // 10 MB, same ceiling the upload endpoint enforces
            max_image_bytes: 10_485_760,
            jpeg_quality: 90,
            border_px: 48,
            mirror: true,
            dbus_enabled: true,
        }
    }
}

impl Config {
    /// Load from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using `env` as the variable lookup.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match env("SNAPBOOTH_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(&env)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file_error = |reason: String| ConfigError::File {
            path: path.display().to_string(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
        toml::from_str(&text).map_err(|e| file_error(e.to_string()))
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(device) = env("SNAPBOOTH_CAMERA_DEVICE") {
            self.camera_device = device;
        }
        if let Some(url) = env("SNAPBOOTH_UPLOAD_URL") {
            self.upload_url = Some(url);
        }
        env_parse(env, "SNAPBOOTH_FRAME_WIDTH", &mut self.frame_width)?;
        env_parse(env, "SNAPBOOTH_FRAME_HEIGHT", &mut self.frame_height)?;
        env_parse(env, "SNAPBOOTH_COUNTDOWN_SECS", &mut self.countdown_secs)?;
        env_parse(env, "SNAPBOOTH_RESULT_SECS", &mut self.result_secs)?;
        env_parse(env, "SNAPBOOTH_DEBOUNCE_FRAMES", &mut self.debounce_frames)?;
        env_parse(env, "SNAPBOOTH_CAPTURE_TIMEOUT_MS", &mut self.capture_timeout_ms)?;
        env_parse(env, "SNAPBOOTH_FRAME_MAX_AGE_MS", &mut self.frame_max_age_ms)?;
        env_parse(env, "SNAPBOOTH_MIN_CONFIDENCE", &mut self.min_confidence)?;
        env_parse(env, "SNAPBOOTH_MIN_FACE_WIDTH", &mut self.min_face_width)?;
        env_parse(env, "SNAPBOOTH_UPLOAD_TIMEOUT_SECS", &mut self.upload_timeout_secs)?;
        env_parse(env, "SNAPBOOTH_UPLOAD_RETRIES", &mut self.upload_retries)?;
        env_parse(env, "SNAPBOOTH_UPLOAD_BACKOFF_MS", &mut self.upload_backoff_ms)?;
        env_parse(env, "SNAPBOOTH_MAX_IMAGE_BYTES", &mut self.max_image_bytes)?;
        env_parse(env, "SNAPBOOTH_JPEG_QUALITY", &mut self.jpeg_quality)?;
        env_parse(env, "SNAPBOOTH_BORDER_PX", &mut self.border_px)?;
        env_bool(env, "SNAPBOOTH_MIRROR", &mut self.mirror)?;
        env_bool(env, "SNAPBOOTH_DBUS_ENABLED", &mut self.dbus_enabled)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.booth().validate()?;
        if self.frame_width == 0 {
            return Err(ConfigError::NotPositive("frame_width"));
        }
        if self.frame_height == 0 {
            return Err(ConfigError::NotPositive("frame_height"));
        }
        if self.frame_max_age_ms == 0 {
            return Err(ConfigError::NotPositive("frame_max_age_ms"));
        }
        if self.upload_timeout_secs == 0 {
            return Err(ConfigError::NotPositive("upload_timeout_secs"));
        }
        if self.max_image_bytes == 0 {
            return Err(ConfigError::NotPositive("max_image_bytes"));
        }
        if self.border_px > MAX_BORDER_PX {
            return Err(ConfigError::Invalid {
                key: "border_px".into(),
                expected: "at most 1024",
                value: self.border_px.to_string(),
            });
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::Invalid {
                key: "jpeg_quality".into(),
                expected: "between 1 and 100",
                value: self.jpeg_quality.to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::Invalid {
                key: "min_confidence".into(),
                expected: "between 0 and 1",
                value: self.min_confidence.to_string(),
            });
        }
        match self.upload_url.as_deref() {
            None | Some("") => Err(ConfigError::Missing("upload_url")),
            Some(_) => Ok(()),
        }
    }

    pub fn booth(&self) -> BoothConfig {
        BoothConfig {
            countdown_secs: self.countdown_secs,
            result_secs: self.result_secs,
            debounce_frames: self.debounce_frames,
            capture_timeout: Duration::from_millis(self.capture_timeout_ms),
        }
    }

    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            min_confidence: self.min_confidence,
            min_face_width: self.min_face_width,
        }
    }

    pub fn print_style(&self) -> PrintStyle {
        PrintStyle {
            mirror: self.mirror,
            border_px: self.border_px,
            jpeg_quality: self.jpeg_quality,
        }
    }

    pub fn frame_max_age(&self) -> Duration {
        Duration::from_millis(self.frame_max_age_ms)
    }
}

fn env_parse<T: FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) -> Result<(), ConfigError> {
    let Some(raw) = env(key) else {
        return Ok(());
    };
    *slot = raw.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        expected: "a number",
        value: raw.clone(),
    })?;
    Ok(())
}

fn env_bool(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut bool,
) -> Result<(), ConfigError> {
    let Some(raw) = env(key) else {
        return Ok(());
    };
    *slot = match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            return Err(ConfigError::Invalid {
                key: key.to_string(),
                expected: "a boolean",
                value: raw,
            })
        }
    };
    Ok(())
}
