use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::error::AcquisitionResult;

/// Engine-issued reference to one registered transfer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RetrievalHandle(String);

impl RetrievalHandle {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn key(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RetrievalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalMetadata {
    /// Payload name; the payload lands under `intake_dir/<name>`.
    pub name: String,
    pub total_length: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferStats {
    pub bytes_completed: u64,
    pub total_length: u64,
}

impl TransferStats {
    /// Whole-percent completion, or `None` while the total is still unknown.
    pub fn percent(&self) -> Option<u8> {
        if self.total_length == 0 {
            return None;
        }
        let completed = self.bytes_completed.min(self.total_length) as u128;
        Some((completed * 100 / self.total_length as u128) as u8)
    }
}

/// Content-retrieval backend shared by every acquisition.
#[async_trait]
pub trait RetrievalEngine: Send + Sync {
    async fn register(&self, locator: &str) -> AcquisitionResult<RetrievalHandle>;

    /// Resolves once the engine knows what the locator points at.
    async fn await_metadata(&self, handle: &RetrievalHandle)
        -> AcquisitionResult<RetrievalMetadata>;

    async fn fetch_all(&self, handle: &RetrievalHandle) -> AcquisitionResult<()>;

    async fn stats(&self, handle: &RetrievalHandle) -> AcquisitionResult<TransferStats>;

    async fn drop_handle(&self, handle: &RetrievalHandle) -> AcquisitionResult<()>;

    /// Stops tracking a finished transfer without touching its data.
    fn forget(&self, _handle: &RetrievalHandle) {}
}

/// Creates the shared engine on first use.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    async fn connect(&self) -> AcquisitionResult<Arc<dyn RetrievalEngine>>;
}
