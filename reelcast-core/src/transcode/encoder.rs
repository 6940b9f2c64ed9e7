use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

use super::error::{EncodeError, TranscodeError, TranscodeResult};
use crate::config::TranscodeSection;
use crate::rendition::Rendition;

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, program: &Path, args: &[String]) -> std::io::Result<Output>;
}

#[derive(Debug, Default)]
pub struct SystemCommandExecutor;

#[async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, program: &Path, args: &[String]) -> std::io::Result<Output> {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
    }
}

#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub rendition: Rendition,
    pub input: PathBuf,
    pub output: PathBuf,
    pub segment_pattern: PathBuf,
}

/// Runs ffmpeg once per rendition, producing an HLS media playlist and its
/// segments.
pub struct FfmpegEncoder {
    program: PathBuf,
    segment_seconds: u32,
    audio_codec: String,
    audio_bitrate: String,
    executor: Arc<dyn CommandExecutor>,
}

impl std::fmt::Debug for FfmpegEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegEncoder")
            .field("program", &self.program)
            .field("segment_seconds", &self.segment_seconds)
            .finish()
    }
}

impl FfmpegEncoder {
    pub fn new(section: &TranscodeSection, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            program: section.ffmpeg.clone(),
            segment_seconds: section.segment_seconds,
            audio_codec: section.audio_codec.clone(),
            audio_bitrate: section.audio_bitrate.clone(),
            executor,
        }
    }

    pub async fn ensure_available(&self) -> TranscodeResult<()> {
        let unavailable = |reason: String| TranscodeError::EncoderUnavailable {
            program: self.program.clone(),
            reason,
        };
        let output = self
            .executor
            .run(&self.program, &["-version".to_string()])
            .await
            .map_err(|err| unavailable(err.to_string()))?;
        if !output.status.success() {
            return Err(unavailable(format!(
                "version probe exited with {:?}",
                output.status.code()
            )));
        }
        Ok(())
    }

    pub fn encode_args(&self, job: &EncodeJob) -> Vec<String> {
        let profile = job.rendition.profile();
        vec![
            "-y".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            job.input.to_string_lossy().to_string(),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            profile.preset.into(),
            "-crf".into(),
            profile.crf.to_string(),
            "-maxrate".into(),
            profile.max_bitrate.into(),
            "-bufsize".into(),
            profile.max_bitrate.into(),
            "-c:a".into(),
            self.audio_codec.clone(),
            "-b:a".into(),
            self.audio_bitrate.clone(),
            "-vf".into(),
            format!("scale={}", profile.resolution()),
            "-hls_time".into(),
            self.segment_seconds.to_string(),
            "-hls_list_size".into(),
            "0".into(),
            "-hls_segment_filename".into(),
            job.segment_pattern.to_string_lossy().to_string(),
            "-f".into(),
            "hls".into(),
            job.output.to_string_lossy().to_string(),
        ]
    }

    /// Succeeds only if ffmpeg exits cleanly and the playlist exists afterwards.
    pub async fn encode(&self, job: &EncodeJob) -> Result<(), EncodeError> {
        let args = self.encode_args(job);
        debug!(rendition = %job.rendition, program = %self.program.display(), args = ?args, "running encoder");
        let output = self.executor.run(&self.program, &args).await?;
        if !output.status.success() {
            return Err(EncodeError::Exit {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        match fs::metadata(&job.output).await {
            Ok(meta) if meta.is_file() => Ok(()),
            _ => Err(EncodeError::MissingOutput(job.output.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_args_carry_profile_and_segmenting() {
        let encoder = FfmpegEncoder::new(
            &TranscodeSection::default(),
            Arc::new(SystemCommandExecutor),
        );
        let job = EncodeJob {
            rendition: Rendition::P480,
            input: PathBuf::from("/in/movie.mkv"),
            output: PathBuf::from("/out/480p.m3u8"),
            segment_pattern: PathBuf::from("/out/480p%03d.ts"),
        };
        let args = encoder.encode_args(&job);
        let joined = args.join(" ");
        assert!(joined.contains("-i /in/movie.mkv"));
        assert!(joined.contains("-preset medium -crf 26 -maxrate 1200k -bufsize 1200k"));
        assert!(joined.contains("-vf scale=854x480"));
        assert!(joined.contains("-hls_time 10 -hls_list_size 0"));
        assert!(joined.contains("-hls_segment_filename /out/480p%03d.ts"));
        assert_eq!(args.last().map(String::as_str), Some("/out/480p.m3u8"));
    }
}
