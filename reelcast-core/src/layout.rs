use std::path::{Path, PathBuf};

use crate::catalog::ItemId;
use crate::config::PathsSection;
use crate::rendition::Rendition;

pub const PLAYLIST_EXTENSION: &str = "m3u8";
pub const MASTER_PLAYLIST_NAME: &str = "master.m3u8";
pub const METADATA_FILE_NAME: &str = "metadata.txt";

/// On-disk and public addresses of everything published for an item.
#[derive(Debug, Clone)]
pub struct PublicationLayout {
    root: PathBuf,
    public_prefix: String,
}

impl PublicationLayout {
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        let public_prefix = public_prefix.into().trim_end_matches('/').to_string();
        Self {
            root: root.into(),
            public_prefix,
        }
    }

    pub fn from_paths(paths: &PathsSection) -> Self {
        Self::new(&paths.publication_dir, paths.public_prefix.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn item_dir(&self, id: &ItemId) -> PathBuf {
        self.root.join(id.as_str())
    }

    pub fn master_path(&self, id: &ItemId) -> PathBuf {
        self.item_dir(id).join(MASTER_PLAYLIST_NAME)
    }

    pub fn rendition_path(&self, id: &ItemId, rendition: Rendition) -> PathBuf {
        self.item_dir(id).join(rendition_playlist_name(rendition))
    }

    pub fn segment_pattern(&self, id: &ItemId, rendition: Rendition) -> PathBuf {
        self.item_dir(id).join(format!("{}%03d.ts", rendition.as_str()))
    }

    pub fn metadata_path(&self, id: &ItemId) -> PathBuf {
        self.item_dir(id).join(METADATA_FILE_NAME)
    }

    pub fn master_url(&self, id: &ItemId) -> String {
        format!("{}/{}/{}", self.public_prefix, id, MASTER_PLAYLIST_NAME)
    }

    pub fn rendition_url(&self, id: &ItemId, rendition: Rendition) -> String {
        format!(
            "{}/{}/{}",
            self.public_prefix,
            id,
            rendition_playlist_name(rendition)
        )
    }
}

pub fn rendition_playlist_name(rendition: Rendition) -> String {
    format!("{}.{}", rendition.as_str(), PLAYLIST_EXTENSION)
}
