use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::rendition::Rendition;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `len` characters, used for synthesized display names.
    pub fn prefix(&self, len: usize) -> &str {
        match self.0.char_indices().nth(len) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Downloading,
    Converting,
    Ready,
    Error,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Downloading => "downloading",
            ItemStatus::Converting => "converting",
            ItemStatus::Ready => "ready",
            ItemStatus::Error => "error",
        }
    }

    /// `error` is terminal; `ready -> converting` is the manual re-encode path.
    pub fn can_transition_to(&self, next: ItemStatus) -> bool {
        use ItemStatus::*;
        match (*self, next) {
            (Error, _) => false,
            (_, Error) => true,
            (current, next) if current == next => true,
            (Downloading, Converting) | (Converting, Ready) | (Ready, Converting) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid status value: {0}")]
pub struct InvalidStatus(pub String);

impl FromStr for ItemStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "downloading" => Ok(Self::Downloading),
            "converting" => Ok(Self::Converting),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            other => Err(InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("item {id} cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub id: ItemId,
    pub from: ItemStatus,
    pub to: ItemStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemRecord {
    pub id: ItemId,
    pub name: String,
    pub source_locator: String,
    pub status: ItemStatus,
    pub progress: u8,
    pub requested_renditions: Vec<Rendition>,
    pub produced_renditions: Vec<Rendition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_media_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_manifest_path: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub rendition_urls: BTreeMap<Rendition, String>,
    pub created_at: DateTime<Utc>,
}

impl ItemRecord {
    /// Fresh record entering acquisition.
    pub fn downloading(
        id: ItemId,
        name: impl Into<String>,
        source_locator: impl Into<String>,
        requested_renditions: Vec<Rendition>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            source_locator: source_locator.into(),
            status: ItemStatus::Downloading,
            progress: 0,
            requested_renditions,
            produced_renditions: Vec::new(),
            source_media_path: None,
            stream_manifest_path: None,
            rendition_urls: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }
}

/// Shared, lock-protected handle to one catalog entry.
#[derive(Debug)]
pub struct Item {
    id: ItemId,
    record: RwLock<ItemRecord>,
    cancel: CancellationToken,
}

impl Item {
    pub fn new(record: ItemRecord) -> Self {
        Self {
            id: record.id.clone(),
            record: RwLock::new(record),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &ItemId {
        &self.id
    }

    pub fn snapshot(&self) -> ItemRecord {
        self.read().clone()
    }

    pub fn status(&self) -> ItemStatus {
        self.read().status
    }

    pub fn progress(&self) -> u8 {
        self.read().progress
    }

    pub fn name(&self) -> String {
        self.read().name.clone()
    }

    pub fn transition(&self, next: ItemStatus) -> Result<(), InvalidTransition> {
        let mut record = self.write();
        apply_transition(&mut record, next)
    }

    /// Raises progress within the current phase; lower values are ignored.
    pub fn advance_progress(&self, value: u8) {
        let mut record = self.write();
        let value = value.min(100);
        if value > record.progress {
            record.progress = value;
        }
    }

    /// Moves the item to `error`. Returns `false` if it was already there.
    pub fn fail(&self) -> bool {
        let mut record = self.write();
        if record.status == ItemStatus::Error {
            return false;
        }
        apply_transition(&mut record, ItemStatus::Error).is_ok()
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut ItemRecord) -> R) -> R {
        let mut record = self.write();
        f(&mut record)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn read(&self) -> RwLockReadGuard<'_, ItemRecord> {
        self.record.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ItemRecord> {
        self.record.write().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) fn apply_transition(
    record: &mut ItemRecord,
    next: ItemStatus,
) -> Result<(), InvalidTransition> {
    let current = record.status;
    if !current.can_transition_to(next) {
        return Err(InvalidTransition {
            id: record.id.clone(),
            from: current,
            to: next,
        });
    }
    if current == next {
        return Ok(());
    }
    record.status = next;
    match next {
        ItemStatus::Converting => {
            record.progress = 0;
            record.stream_manifest_path = None;
            record.rendition_urls.clear();
        }
        ItemStatus::Error => {
            record.produced_renditions.clear();
            record.stream_manifest_path = None;
            record.rendition_urls.clear();
        }
        ItemStatus::Downloading | ItemStatus::Ready => {}
    }
    Ok(())
}
