#![allow(dead_code)]

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reelcast_core::acquisition::{
    AcquisitionError, AcquisitionResult, EngineConnector, RetrievalEngine, RetrievalHandle,
    RetrievalMetadata, TransferStats,
};
use reelcast_core::config::ReelcastConfig;
use reelcast_core::CommandExecutor;
use tokio::sync::Notify;

pub fn test_config(root: &Path) -> ReelcastConfig {
    let mut config = ReelcastConfig::default();
    config.paths.intake_dir = root.join("downloads");
    config.paths.publication_dir = root.join("hls");
    config.paths.public_prefix = "/hls".to_string();
    config.acquisition.poll_interval_ms = 1;
    config
}

fn output(code: i32, stderr: &str) -> Output {
    Output {
        status: ExitStatus::from_raw(code << 8),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Stands in for ffmpeg: writes the requested media playlist unless the
/// rendition is listed in `failing`.
#[derive(Default)]
pub struct FakeEncoder {
    pub failing: Vec<&'static str>,
    pub unavailable: bool,
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl FakeEncoder {
    pub fn failing(renditions: &[&'static str]) -> Self {
        Self {
            failing: renditions.to_vec(),
            ..Self::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn encode_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|args| args.iter().any(|arg| arg == "-i"))
            .count()
    }
}

#[async_trait]
impl CommandExecutor for FakeEncoder {
    async fn run(&self, _program: &Path, args: &[String]) -> io::Result<Output> {
        self.calls.lock().unwrap().push(args.to_vec());
        if self.unavailable {
            return Err(io::Error::new(io::ErrorKind::NotFound, "ffmpeg not found"));
        }
        if args.iter().any(|arg| arg == "-version") {
            return Ok(output(0, ""));
        }
        let target = PathBuf::from(args.last().expect("output path"));
        let name = target
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default()
            .to_string();
        if self.failing.iter().any(|failing| *failing == name) {
            return Ok(output(1, "encoder exploded"));
        }
        std::fs::write(&target, "#EXTM3U\n#EXT-X-ENDLIST\n")?;
        Ok(output(0, ""))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// Metadata resolves and bytes arrive in fixed steps.
    Complete,
    /// Registration is refused.
    RejectRegistration,
    /// Metadata never resolves.
    Stall,
    /// Download completes without any video file.
    NoVideo,
    /// Progress polling panics inside the engine.
    PanicOnStats,
    /// Progress polling hangs until the transfer is dropped, then reports it
    /// as unknown.
    StatsUntilDropped,
}

type CompletionHook = Box<dyn Fn() + Send + Sync>;

/// In-memory retrieval engine that materialises its payload under the
/// intake directory once fetching starts.
pub struct FakeEngine {
    pub mode: EngineMode,
    pub intake_dir: PathBuf,
    pub payload: String,
    pub total: u64,
    pub step: u64,
    completed: AtomicU64,
    next_handle: AtomicU64,
    pub registered: Mutex<Vec<RetrievalHandle>>,
    pub dropped: Mutex<Vec<RetrievalHandle>>,
    pub forgotten: Mutex<Vec<RetrievalHandle>>,
    dropped_signal: Notify,
    on_complete: Mutex<Option<CompletionHook>>,
}

impl FakeEngine {
    pub fn new(mode: EngineMode, intake_dir: &Path) -> Arc<Self> {
        Arc::new(Self {
            mode,
            intake_dir: intake_dir.to_path_buf(),
            payload: "Big.Movie.2024".to_string(),
            total: 1000,
            step: 250,
            completed: AtomicU64::new(0),
            next_handle: AtomicU64::new(1),
            registered: Mutex::new(Vec::new()),
            dropped: Mutex::new(Vec::new()),
            forgotten: Mutex::new(Vec::new()),
            dropped_signal: Notify::new(),
            on_complete: Mutex::new(None),
        })
    }

    /// Runs `hook` when a progress poll first reports the transfer complete.
    pub fn on_complete(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_complete.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn forgotten(&self) -> Vec<RetrievalHandle> {
        self.forgotten.lock().unwrap().clone()
    }

    pub fn dropped(&self) -> Vec<RetrievalHandle> {
        self.dropped.lock().unwrap().clone()
    }

    pub fn registered(&self) -> Vec<RetrievalHandle> {
        self.registered.lock().unwrap().clone()
    }
}

#[async_trait]
impl RetrievalEngine for FakeEngine {
    async fn register(&self, locator: &str) -> AcquisitionResult<RetrievalHandle> {
        if self.mode == EngineMode::RejectRegistration {
            return Err(AcquisitionError::Rpc {
                method: "aria2.addUri".to_string(),
                code: 1,
                message: format!("cannot add {locator}"),
            });
        }
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let handle = RetrievalHandle::new(format!("gid-{id}"));
        self.registered.lock().unwrap().push(handle.clone());
        Ok(handle)
    }

    async fn await_metadata(
        &self,
        _handle: &RetrievalHandle,
    ) -> AcquisitionResult<RetrievalMetadata> {
        if self.mode == EngineMode::Stall {
            futures::future::pending::<()>().await;
        }
        Ok(RetrievalMetadata {
            name: self.payload.clone(),
            total_length: self.total,
        })
    }

    async fn fetch_all(&self, _handle: &RetrievalHandle) -> AcquisitionResult<()> {
        let dir = self.intake_dir.join(&self.payload);
        std::fs::create_dir_all(&dir).map_err(|err| AcquisitionError::Transfer(err.to_string()))?;
        std::fs::write(dir.join("sample.nfo"), "info")
            .map_err(|err| AcquisitionError::Transfer(err.to_string()))?;
        if self.mode != EngineMode::NoVideo {
            std::fs::write(dir.join("Big.Movie.2024.mkv"), "video")
                .map_err(|err| AcquisitionError::Transfer(err.to_string()))?;
        }
        Ok(())
    }

    async fn stats(&self, handle: &RetrievalHandle) -> AcquisitionResult<TransferStats> {
        match self.mode {
            EngineMode::PanicOnStats => panic!("engine exploded"),
            EngineMode::StatsUntilDropped => {
                self.dropped_signal.notified().await;
                return Err(AcquisitionError::Transfer(format!("unknown handle {handle}")));
            }
            _ => {}
        }
        let previous = self.completed.fetch_add(self.step, Ordering::SeqCst);
        let bytes_completed = (previous + self.step).min(self.total);
        if bytes_completed == self.total && previous < self.total {
            if let Some(hook) = self.on_complete.lock().unwrap().as_ref() {
                hook();
            }
        }
        Ok(TransferStats {
            bytes_completed,
            total_length: self.total,
        })
    }

    async fn drop_handle(&self, handle: &RetrievalHandle) -> AcquisitionResult<()> {
        self.dropped.lock().unwrap().push(handle.clone());
        self.dropped_signal.notify_one();
        Ok(())
    }

    fn forget(&self, handle: &RetrievalHandle) {
        self.forgotten.lock().unwrap().push(handle.clone());
    }
}

pub struct FakeConnector {
    pub engine: Arc<FakeEngine>,
    pub connects: AtomicU64,
}

impl FakeConnector {
    pub fn new(engine: Arc<FakeEngine>) -> Arc<Self> {
        Arc::new(Self {
            engine,
            connects: AtomicU64::new(0),
        })
    }

    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineConnector for FakeConnector {
    async fn connect(&self) -> AcquisitionResult<Arc<dyn RetrievalEngine>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let engine: Arc<dyn RetrievalEngine> = self.engine.clone();
        Ok(engine)
    }
}
