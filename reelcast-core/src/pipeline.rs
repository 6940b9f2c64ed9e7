use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::acquisition::{AcquisitionCoordinator, AcquisitionResult, Aria2Connector, EngineConnector};
use crate::catalog::{apply_transition, Catalog, CatalogError, ItemId, ItemRecord, ItemStatus};
use crate::config::ReelcastConfig;
use crate::jobs::JobHandle;
use crate::rendition::Rendition;
use crate::restore::{RestoreReport, Restorer};
use crate::transcode::{CommandExecutor, SystemCommandExecutor, TranscodeOrchestrator};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("item {0} not found")]
    NotFound(ItemId),
    #[error("item {id} is {status}, conversion requires ready")]
    NotReady { id: ItemId, status: ItemStatus },
    #[error("item {0} has no source media to convert")]
    MissingSource(ItemId),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Clone, Default)]
pub struct CreateItemRequest {
    pub name: String,
    pub source_locator: String,
    /// Rendition names; empty selects the configured default set.
    pub renditions: Vec<String>,
}

/// Entry points used by the API layer: owns the catalog and wires it to the
/// acquisition and transcode phases.
#[derive(Debug)]
pub struct Pipeline {
    catalog: Arc<Catalog>,
    coordinator: Arc<AcquisitionCoordinator>,
    transcoder: Arc<TranscodeOrchestrator>,
    restorer: Restorer,
    default_renditions: Vec<Rendition>,
}

impl Pipeline {
    pub fn new(
        config: &ReelcastConfig,
        connector: Arc<dyn EngineConnector>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let transcoder = Arc::new(TranscodeOrchestrator::new(config, executor));
        let coordinator = Arc::new(AcquisitionCoordinator::new(
            config,
            connector,
            Arc::clone(&transcoder),
        ));
        let catalog = Arc::new(Catalog::new().with_release_hook(coordinator.clone()));
        Self {
            catalog,
            coordinator,
            transcoder,
            restorer: Restorer::new(config),
            default_renditions: Rendition::resolve_lenient(&config.transcode.default_renditions),
        }
    }

    /// Production wiring: aria2 for retrieval, the system ffmpeg for encoding.
    pub fn from_config(config: &ReelcastConfig) -> AcquisitionResult<Self> {
        let connector = Aria2Connector::from_config(config)?;
        Ok(Self::new(
            config,
            Arc::new(connector),
            Arc::new(SystemCommandExecutor),
        ))
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn coordinator(&self) -> &Arc<AcquisitionCoordinator> {
        &self.coordinator
    }

    pub fn transcoder(&self) -> &Arc<TranscodeOrchestrator> {
        &self.transcoder
    }

    /// Must run before any request is served.
    pub fn restore(&self) -> RestoreReport {
        self.restorer.restore_into(&self.catalog)
    }

    pub fn create_item(
        &self,
        request: CreateItemRequest,
    ) -> PipelineResult<(ItemRecord, JobHandle)> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(PipelineError::InvalidRequest("name is required".into()));
        }
        let locator = request.source_locator.trim();
        if locator.is_empty() {
            return Err(PipelineError::InvalidRequest(
                "source locator is required".into(),
            ));
        }
        Url::parse(locator).map_err(|err| {
            PipelineError::InvalidRequest(format!("invalid source locator: {err}"))
        })?;
        let renditions = if request.renditions.is_empty() {
            self.default_renditions.clone()
        } else {
            Rendition::resolve_lenient(&request.renditions)
        };

        let record =
            ItemRecord::downloading(self.catalog.next_id(), name, locator, renditions);
        let item = self.catalog.create(record)?;
        let snapshot = item.snapshot();
        info!(item_id = %snapshot.id, name = %snapshot.name, renditions = ?snapshot.requested_renditions, "item created");
        let job = self.coordinator.start_acquisition(item);
        Ok((snapshot, job))
    }

    pub fn get(&self, id: &ItemId) -> Option<ItemRecord> {
        self.catalog.get(id).map(|item| item.snapshot())
    }

    pub fn list(&self) -> Vec<ItemRecord> {
        self.catalog.list()
    }

    pub fn progress(&self, id: &ItemId) -> PipelineResult<(ItemStatus, u8)> {
        let item = self
            .catalog
            .get(id)
            .ok_or_else(|| PipelineError::NotFound(id.clone()))?;
        let record = item.snapshot();
        Ok((record.status, record.progress))
    }

    pub async fn delete_item(&self, id: &ItemId) -> PipelineResult<ItemRecord> {
        self.catalog
            .delete(id)
            .await
            .ok_or_else(|| PipelineError::NotFound(id.clone()))
    }

    /// Re-encodes a ready item from its source media.
    pub fn trigger_convert(&self, id: &ItemId) -> PipelineResult<JobHandle> {
        let item = self
            .catalog
            .get(id)
            .ok_or_else(|| PipelineError::NotFound(id.clone()))?;
        item.update(|record| {
            if record.status != ItemStatus::Ready {
                return Err(PipelineError::NotReady {
                    id: record.id.clone(),
                    status: record.status,
                });
            }
            if record.source_media_path.is_none() {
                return Err(PipelineError::MissingSource(record.id.clone()));
            }
            apply_transition(record, ItemStatus::Converting).map_err(|err| {
                PipelineError::NotReady {
                    id: err.id,
                    status: err.from,
                }
            })
        })?;
        info!(item_id = %id, "conversion requested");
        Ok(self.transcoder.start_convert(item))
    }
}
