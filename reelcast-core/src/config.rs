use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ReelcastConfig {
    pub paths: PathsSection,
    pub acquisition: AcquisitionSection,
    pub transcode: TranscodeSection,
}

impl ReelcastConfig {
    pub fn validate(&self) -> Result<()> {
        if self.acquisition.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "acquisition.poll_interval_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.acquisition.rpc_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "acquisition.rpc_timeout_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.acquisition.video_extensions.is_empty() {
            return Err(ConfigError::Invalid {
                field: "acquisition.video_extensions",
                reason: "at least one extension is required".into(),
            });
        }
        Url::parse(&self.acquisition.rpc_url).map_err(|err| ConfigError::Invalid {
            field: "acquisition.rpc_url",
            reason: err.to_string(),
        })?;
        if self.transcode.segment_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "transcode.segment_seconds",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub intake_dir: PathBuf,
    pub publication_dir: PathBuf,
    pub public_prefix: String,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            intake_dir: PathBuf::from("storage/downloads"),
            publication_dir: PathBuf::from("storage/hls"),
            public_prefix: "/hls".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AcquisitionSection {
    pub rpc_url: String,
    pub rpc_secret: Option<String>,
    pub poll_interval_ms: u64,
    /// Upper bound on a single engine RPC, including connection setup.
    pub rpc_timeout_ms: u64,
    pub video_extensions: Vec<String>,
}

impl AcquisitionSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

impl Default for AcquisitionSection {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:6800/jsonrpc".to_string(),
            rpc_secret: None,
            poll_interval_ms: 2000,
            rpc_timeout_ms: 10_000,
            video_extensions: [".mp4", ".mkv", ".avi", ".mov", ".wmv"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscodeSection {
    pub ffmpeg: PathBuf,
    pub segment_seconds: u32,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub default_renditions: Vec<String>,
    /// Treat a job that produced no rendition as failed instead of publishing
    /// an empty master playlist.
    pub fail_on_empty: bool,
}

impl Default for TranscodeSection {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            segment_seconds: 10,
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
            default_renditions: ["720p", "480p", "360p"]
                .iter()
                .map(|name| name.to_string())
                .collect(),
            fail_on_empty: false,
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ReelcastConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    let config: ReelcastConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })?;
    config.validate()?;
    Ok(config)
}
