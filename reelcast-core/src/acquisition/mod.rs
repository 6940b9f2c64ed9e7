mod aria2;
mod engine;
mod error;

use std::collections::HashMap;
use std::panic::{resume_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::catalog::{apply_transition, Item, ItemId, ItemStatus, ReleaseHook};
use crate::config::ReelcastConfig;
use crate::jobs::{spawn_supervised, JobHandle, JobOutcome, JobPhase};
use crate::media::find_first_video;
use crate::transcode::TranscodeOrchestrator;

pub use aria2::{Aria2Connector, Aria2Engine};
pub use engine::{
    EngineConnector, RetrievalEngine, RetrievalHandle, RetrievalMetadata, TransferStats,
};
pub use error::{AcquisitionError, AcquisitionResult};

#[derive(Default)]
struct EngineState {
    engine: Option<Arc<dyn RetrievalEngine>>,
    active: HashMap<ItemId, RetrievalHandle>,
}

/// Drives items through the download phase on a single shared retrieval
/// engine, then hands them to the transcoder.
///
/// The engine slot and the active-handle map share one lock. It is held for
/// slot and map updates only, never across an engine call. Engine creation
/// is serialized by a separate gate so a slow daemon cannot block cleanup.
pub struct AcquisitionCoordinator {
    connector: Arc<dyn EngineConnector>,
    state: Mutex<EngineState>,
    connecting: Mutex<()>,
    transcoder: Arc<TranscodeOrchestrator>,
    intake_dir: PathBuf,
    video_extensions: Vec<String>,
    poll_interval: Duration,
}

impl std::fmt::Debug for AcquisitionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionCoordinator")
            .field("intake_dir", &self.intake_dir)
            .field("video_extensions", &self.video_extensions)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl AcquisitionCoordinator {
    pub fn new(
        config: &ReelcastConfig,
        connector: Arc<dyn EngineConnector>,
        transcoder: Arc<TranscodeOrchestrator>,
    ) -> Self {
        Self {
            connector,
            state: Mutex::new(EngineState::default()),
            connecting: Mutex::new(()),
            transcoder,
            intake_dir: config.paths.intake_dir.clone(),
            video_extensions: config.acquisition.video_extensions.clone(),
            poll_interval: config.acquisition.poll_interval(),
        }
    }

    pub async fn active_count(&self) -> usize {
        self.state.lock().await.active.len()
    }

    pub async fn is_active(&self, id: &ItemId) -> bool {
        self.state.lock().await.active.contains_key(id)
    }

    /// Starts the download phase for `item` as a background job.
    pub fn start_acquisition(self: &Arc<Self>, item: Arc<Item>) -> JobHandle {
        let coordinator = Arc::clone(self);
        let task_item = Arc::clone(&item);
        spawn_supervised(item, JobPhase::Acquisition, async move {
            coordinator.run(task_item).await
        })
    }

    /// Releases the active transfer for `id`, if any.
    pub async fn cleanup(&self, id: &ItemId) {
        let (handle, engine) = {
            let mut state = self.state.lock().await;
            let Some(handle) = state.active.remove(id) else {
                return;
            };
            (handle, state.engine.clone())
        };
        if let Some(engine) = engine {
            if let Err(err) = engine.drop_handle(&handle).await {
                warn!(item_id = %id, %handle, error = %err, "failed to drop transfer");
            }
        }
        info!(item_id = %id, %handle, "acquisition released");
    }

    async fn run(self: Arc<Self>, item: Arc<Item>) -> JobOutcome {
        let id = item.id().clone();
        let result = AssertUnwindSafe(self.acquire(&item)).catch_unwind().await;
        match result {
            Ok(Ok(media_path)) => {
                self.unregister(&id).await;
                self.hand_off(item, media_path)
            }
            Ok(Err(AcquisitionError::Cancelled)) => {
                info!(item_id = %id, "acquisition cancelled");
                JobOutcome::Cancelled
            }
            // Deletion releases the transfer underneath a running engine call.
            Ok(Err(err)) if item.is_cancelled() => {
                info!(item_id = %id, error = %err, "acquisition cancelled");
                JobOutcome::Cancelled
            }
            Ok(Err(err)) => {
                error!(item_id = %id, name = %item.name(), error = %err, "acquisition failed");
                item.fail();
                self.cleanup(&id).await;
                JobOutcome::Failed(err.to_string())
            }
            Err(payload) => {
                self.cleanup(&id).await;
                resume_unwind(payload);
            }
        }
    }

    async fn acquire(&self, item: &Item) -> AcquisitionResult<PathBuf> {
        let token = item.cancellation().clone();
        if token.is_cancelled() {
            return Err(AcquisitionError::Cancelled);
        }
        let engine = self.engine().await?;
        let locator = item.snapshot().source_locator;
        let handle = engine
            .register(&locator)
            .await
            .map_err(|err| AcquisitionError::Registration {
                locator: locator.clone(),
                reason: err.to_string(),
            })?;
        self.track(item.id(), &engine, handle.clone(), &token).await?;

        let metadata = tokio::select! {
            _ = token.cancelled() => return Err(AcquisitionError::Cancelled),
            metadata = engine.await_metadata(&handle) => metadata?,
        };
        info!(item_id = %item.id(), payload = %metadata.name, bytes = metadata.total_length, "starting download");
        engine.fetch_all(&handle).await?;

        loop {
            let stats = engine.stats(&handle).await?;
            if let Some(percent) = stats.percent() {
                item.advance_progress(percent);
                debug!(item_id = %item.id(), progress = percent, "download progress");
                if percent >= 100 {
                    break;
                }
            }
            tokio::select! {
                _ = token.cancelled() => return Err(AcquisitionError::Cancelled),
                _ = sleep(self.poll_interval) => {}
            }
        }

        let download_root = self.intake_dir.join(&metadata.name);
        find_first_video(&download_root, &self.video_extensions)
            .ok_or(AcquisitionError::MediaNotFound(download_root))
    }

    fn hand_off(&self, item: Arc<Item>, media_path: PathBuf) -> JobOutcome {
        if item.is_cancelled() {
            info!(item_id = %item.id(), "download finished for a deleted item");
            return JobOutcome::Cancelled;
        }
        let moved = item.update(|record| {
            record.source_media_path = Some(media_path.clone());
            apply_transition(record, ItemStatus::Converting)
        });
        if let Err(err) = moved {
            warn!(item_id = %item.id(), error = %err, "download finished for an item that left the pipeline");
            return JobOutcome::Failed(err.to_string());
        }
        info!(item_id = %item.id(), media = %media_path.display(), "download completed");
        JobOutcome::HandedOff(self.transcoder.start_convert(item))
    }

    async fn engine(&self) -> AcquisitionResult<Arc<dyn RetrievalEngine>> {
        if let Some(engine) = self.state.lock().await.engine.clone() {
            return Ok(engine);
        }
        let _gate = self.connecting.lock().await;
        if let Some(engine) = self.state.lock().await.engine.clone() {
            return Ok(engine);
        }
        let engine = self.connector.connect().await.map_err(|err| match err {
            AcquisitionError::EngineUnavailable(_) => err,
            other => AcquisitionError::EngineUnavailable(other.to_string()),
        })?;
        info!("created shared retrieval engine");
        self.state.lock().await.engine = Some(Arc::clone(&engine));
        Ok(engine)
    }

    async fn track(
        &self,
        id: &ItemId,
        engine: &Arc<dyn RetrievalEngine>,
        handle: RetrievalHandle,
        token: &CancellationToken,
    ) -> AcquisitionResult<()> {
        {
            let mut state = self.state.lock().await;
            // Deletion cancels the token before it takes this lock, so a
            // cancelled item must not leave a transfer behind.
            if !token.is_cancelled() {
                state.active.insert(id.clone(), handle);
                return Ok(());
            }
        }
        if let Err(err) = engine.drop_handle(&handle).await {
            warn!(item_id = %id, %handle, error = %err, "failed to drop transfer");
        }
        Err(AcquisitionError::Cancelled)
    }

    async fn unregister(&self, id: &ItemId) {
        let (handle, engine) = {
            let mut state = self.state.lock().await;
            (state.active.remove(id), state.engine.clone())
        };
        if let (Some(handle), Some(engine)) = (handle, engine) {
            engine.forget(&handle);
        }
    }
}

#[async_trait]
impl ReleaseHook for AcquisitionCoordinator {
    async fn release(&self, id: &ItemId) {
        self.cleanup(id).await;
    }
}
