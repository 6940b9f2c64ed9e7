pub mod acquisition;
pub mod catalog;
pub mod config;
pub mod error;
pub mod jobs;
pub mod layout;
pub mod media;
pub mod pipeline;
pub mod playlist;
pub mod rendition;
pub mod restore;
pub mod sidecar;
pub mod transcode;

pub use acquisition::{
    AcquisitionCoordinator, AcquisitionError, Aria2Connector, EngineConnector, RetrievalEngine,
    RetrievalHandle, RetrievalMetadata, TransferStats,
};
pub use catalog::{Catalog, Item, ItemId, ItemRecord, ItemStatus};
pub use config::{load_config, ReelcastConfig};
pub use error::{ConfigError, Result};
pub use jobs::{JobHandle, JobOutcome, JobPhase};
pub use layout::PublicationLayout;
pub use pipeline::{CreateItemRequest, Pipeline, PipelineError, PipelineResult};
pub use playlist::{render_master_playlist, render_master_playlist_for};
pub use rendition::Rendition;
pub use restore::{RestoreReport, Restorer};
pub use transcode::{
    CommandExecutor, SystemCommandExecutor, TranscodeError, TranscodeOrchestrator,
};
