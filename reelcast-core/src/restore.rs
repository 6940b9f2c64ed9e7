use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::catalog::{Catalog, ItemId, ItemRecord, ItemStatus};
use crate::config::ReelcastConfig;
use crate::layout::PublicationLayout;
use crate::media::find_first_video;
use crate::rendition::Rendition;
use crate::sidecar::ItemSidecar;

/// Label used for published items whose sidecar is missing or empty.
pub const FALLBACK_NAME_PREFIX: &str = "Item_";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub published: usize,
    pub intake: usize,
    pub duplicates: usize,
}

impl RestoreReport {
    pub fn total(&self) -> usize {
        self.published + self.intake
    }
}

/// Rebuilds catalog entries from what a previous run left on disk.
#[derive(Debug, Clone)]
pub struct Restorer {
    layout: PublicationLayout,
    intake_dir: PathBuf,
    video_extensions: Vec<String>,
    default_renditions: Vec<Rendition>,
}

impl Restorer {
    pub fn new(config: &ReelcastConfig) -> Self {
        Self {
            layout: PublicationLayout::from_paths(&config.paths),
            intake_dir: config.paths.intake_dir.clone(),
            video_extensions: config.acquisition.video_extensions.clone(),
            default_renditions: Rendition::resolve_lenient(&config.transcode.default_renditions),
        }
    }

    /// Published output first, then raw downloads not already covered by it.
    /// Unreadable roots count as empty.
    pub fn restore_into(&self, catalog: &Catalog) -> RestoreReport {
        info!(
            publication = %self.layout.root().display(),
            intake = %self.intake_dir.display(),
            "scanning existing media"
        );
        let published = self.restore_published(catalog);
        let (intake, duplicates) = self.restore_intake(catalog);
        let report = RestoreReport {
            published,
            intake,
            duplicates,
        };
        info!(
            published = report.published,
            intake = report.intake,
            duplicates = report.duplicates,
            "restored {} existing items",
            report.total()
        );
        report
    }

    fn restore_published(&self, catalog: &Catalog) -> usize {
        let mut restored = 0;
        for (dir_name, path) in subdirectories(self.layout.root()) {
            if !path.join(crate::layout::MASTER_PLAYLIST_NAME).is_file() {
                continue;
            }
            let id = ItemId::from(dir_name);
            let produced: Vec<Rendition> = Rendition::ALL
                .into_iter()
                .filter(|rendition| self.layout.rendition_path(&id, *rendition).is_file())
                .collect();
            let rendition_urls: BTreeMap<Rendition, String> = produced
                .iter()
                .map(|rendition| (*rendition, self.layout.rendition_url(&id, *rendition)))
                .collect();
            let sidecar = ItemSidecar::read(&self.layout.metadata_path(&id));
            let name = sidecar
                .as_ref()
                .map(|sidecar| sidecar.name.clone())
                .unwrap_or_else(|| format!("{FALLBACK_NAME_PREFIX}{}", id.prefix(8)));
            let record = ItemRecord {
                id: id.clone(),
                name,
                source_locator: sidecar
                    .as_ref()
                    .map(|sidecar| sidecar.source_locator.clone())
                    .unwrap_or_default(),
                status: ItemStatus::Ready,
                progress: 100,
                requested_renditions: produced.clone(),
                produced_renditions: produced,
                source_media_path: None,
                stream_manifest_path: Some(self.layout.master_url(&id)),
                rendition_urls,
                created_at: sidecar
                    .and_then(|sidecar| sidecar.created_at)
                    .unwrap_or_else(Utc::now),
            };
            let name = record.name.clone();
            match catalog.create(record) {
                Ok(_) => {
                    restored += 1;
                    info!(item_id = %id, %name, "restored published item");
                }
                Err(err) => warn!(item_id = %id, error = %err, "skipping published item"),
            }
        }
        restored
    }

    fn restore_intake(&self, catalog: &Catalog) -> (usize, usize) {
        let mut restored = 0;
        let mut duplicates = 0;
        for (dir_name, path) in subdirectories(&self.intake_dir) {
            let already_published = catalog.any(|record| {
                record.status == ItemStatus::Ready
                    && (record.name == dir_name
                        || record
                            .source_media_path
                            .as_deref()
                            .is_some_and(|media| media.starts_with(&path)))
            });
            if already_published {
                duplicates += 1;
                continue;
            }
            let Some(video) = find_first_video(&path, &self.video_extensions) else {
                continue;
            };
            let id = catalog.next_id();
            let mut record = ItemRecord::downloading(
                id.clone(),
                dir_name.clone(),
                String::new(),
                self.default_renditions.clone(),
            );
            record.status = ItemStatus::Ready;
            record.progress = 100;
            record.source_media_path = Some(video.clone());
            match catalog.create(record) {
                Ok(_) => {
                    restored += 1;
                    info!(item_id = %id, name = %dir_name, media = %video.display(), "restored downloaded item");
                }
                Err(err) => warn!(item_id = %id, error = %err, "skipping downloaded item"),
            }
        }
        (restored, duplicates)
    }
}

fn subdirectories(root: &Path) -> Vec<(String, PathBuf)> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(path = %root.display(), error = %err, "could not read directory");
            return Vec::new();
        }
    };
    let mut dirs: Vec<(String, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false))
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            Some((name, entry.path()))
        })
        .collect();
    dirs.sort();
    dirs
}
