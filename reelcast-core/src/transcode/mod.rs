mod encoder;
mod error;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs;
use tracing::{error, info, warn};

use crate::catalog::{apply_transition, Item, ItemId, ItemRecord, ItemStatus};
use crate::config::ReelcastConfig;
use crate::jobs::{spawn_supervised, JobHandle, JobOutcome, JobPhase};
use crate::layout::PublicationLayout;
use crate::playlist::write_master_playlist;
use crate::rendition::Rendition;
use crate::sidecar::ItemSidecar;

pub use encoder::{CommandExecutor, EncodeJob, FfmpegEncoder, SystemCommandExecutor};
pub use error::{EncodeError, TranscodeError, TranscodeResult};

#[derive(Debug, Clone)]
pub struct TranscodeReport {
    pub item_id: ItemId,
    pub produced: Vec<Rendition>,
    pub skipped: Vec<Rendition>,
    pub master_path: PathBuf,
}

#[derive(Debug)]
pub struct TranscodeOrchestrator {
    encoder: FfmpegEncoder,
    layout: PublicationLayout,
    fail_on_empty: bool,
}

impl TranscodeOrchestrator {
    pub fn new(config: &ReelcastConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            encoder: FfmpegEncoder::new(&config.transcode, executor),
            layout: PublicationLayout::from_paths(&config.paths),
            fail_on_empty: config.transcode.fail_on_empty,
        }
    }

    pub fn layout(&self) -> &PublicationLayout {
        &self.layout
    }

    /// Starts the transcode phase for `item` as a background job.
    pub fn start_convert(self: &Arc<Self>, item: Arc<Item>) -> JobHandle {
        let orchestrator = Arc::clone(self);
        let task_item = Arc::clone(&item);
        spawn_supervised(item, JobPhase::Transcode, async move {
            orchestrator.run(&task_item).await
        })
    }

    async fn run(&self, item: &Item) -> JobOutcome {
        match self.convert(item).await {
            Ok(report) => {
                info!(
                    item_id = %report.item_id,
                    produced = ?report.produced,
                    skipped = ?report.skipped,
                    "transcode completed"
                );
                JobOutcome::Completed
            }
            Err(TranscodeError::Cancelled) => {
                info!(item_id = %item.id(), "transcode abandoned after deletion");
                JobOutcome::Cancelled
            }
            Err(err) => {
                error!(item_id = %item.id(), name = %item.name(), error = %err, "transcode failed");
                item.fail();
                JobOutcome::Failed(err.to_string())
            }
        }
    }

    /// Encodes every requested rendition in order and publishes the result.
    ///
    /// A rendition whose encode fails is skipped. Progress counts renditions
    /// started and is forced to 100 once all of them were attempted.
    pub async fn convert(&self, item: &Item) -> TranscodeResult<TranscodeReport> {
        let id = item.id().clone();
        let token = item.cancellation().clone();
        self.encoder.ensure_available().await?;

        let record = item.snapshot();
        let source = record
            .source_media_path
            .clone()
            .ok_or_else(|| TranscodeError::MissingSource(id.clone()))?;
        match fs::metadata(&source).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(TranscodeError::SourceNotFound(source)),
        }
        if token.is_cancelled() {
            return Err(TranscodeError::Cancelled);
        }

        item.update(|record| {
            apply_transition(record, ItemStatus::Converting)?;
            record.progress = 0;
            Ok::<_, TranscodeError>(())
        })?;

        let output_dir = self.layout.item_dir(&id);
        fs::create_dir_all(&output_dir)
            .await
            .map_err(|source| TranscodeError::Io {
                source,
                path: output_dir.clone(),
            })?;
        info!(
            item_id = %id,
            input = %source.display(),
            output = %output_dir.display(),
            "starting transcode"
        );

        let renditions = record.requested_renditions.clone();
        let total = renditions.len();
        let mut produced = Vec::with_capacity(total);
        let mut skipped = Vec::new();
        for (index, rendition) in renditions.iter().copied().enumerate() {
            if token.is_cancelled() {
                return Err(TranscodeError::Cancelled);
            }
            let percent = (index * 100 / total) as u8;
            item.advance_progress(percent);
            info!(item_id = %id, %rendition, step = index + 1, total, progress = percent, "encoding rendition");

            let job = EncodeJob {
                rendition,
                input: source.clone(),
                output: self.layout.rendition_path(&id, rendition),
                segment_pattern: self.layout.segment_pattern(&id, rendition),
            };
            let result = tokio::select! {
                _ = token.cancelled() => return Err(TranscodeError::Cancelled),
                result = self.encoder.encode(&job) => result,
            };
            match result {
                Ok(()) => produced.push(rendition),
                Err(err) => {
                    warn!(item_id = %id, %rendition, error = %err, "skipping rendition");
                    skipped.push(rendition);
                }
            }
        }
        item.advance_progress(100);

        if token.is_cancelled() {
            return Err(TranscodeError::Cancelled);
        }
        if produced.is_empty() && self.fail_on_empty {
            return Err(TranscodeError::NoRenditions(id));
        }

        let master_path = write_master_playlist(&output_dir, &produced).await?;
        self.write_sidecar(&record).await;

        let urls: BTreeMap<Rendition, String> = produced
            .iter()
            .map(|rendition| (*rendition, self.layout.rendition_url(&id, *rendition)))
            .collect();
        let manifest_url = self.layout.master_url(&id);
        item.update(|record| {
            apply_transition(record, ItemStatus::Ready)?;
            record.produced_renditions = produced.clone();
            record.rendition_urls = urls;
            record.stream_manifest_path = Some(manifest_url);
            Ok::<_, TranscodeError>(())
        })?;

        Ok(TranscodeReport {
            item_id: id,
            produced,
            skipped,
            master_path,
        })
    }

    async fn write_sidecar(&self, record: &ItemRecord) {
        let sidecar = ItemSidecar {
            name: record.name.clone(),
            source_locator: record.source_locator.clone(),
            created_at: Some(record.created_at),
        };
        let path = self.layout.metadata_path(&record.id);
        if let Err(err) = fs::write(&path, sidecar.render()).await {
            warn!(item_id = %record.id, path = %path.display(), error = %err, "failed to save metadata sidecar");
        }
    }
}
