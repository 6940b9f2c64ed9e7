use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::engine::{
    EngineConnector, RetrievalEngine, RetrievalHandle, RetrievalMetadata, TransferStats,
};
use super::error::{AcquisitionError, AcquisitionResult};
use crate::config::ReelcastConfig;

const STATUS_KEYS: &[&str] = &[
    "gid",
    "status",
    "completedLength",
    "totalLength",
    "followedBy",
    "errorMessage",
    "bittorrent",
];

/// Connects to an aria2 daemon over JSON-RPC.
#[derive(Debug, Clone)]
pub struct Aria2Connector {
    endpoint: Url,
    secret: Option<String>,
    download_dir: PathBuf,
    metadata_poll: Duration,
    rpc_timeout: Duration,
}

impl Aria2Connector {
    pub fn new(endpoint: Url, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            endpoint,
            secret: None,
            download_dir: download_dir.into(),
            metadata_poll: Duration::from_millis(500),
            rpc_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &ReelcastConfig) -> AcquisitionResult<Self> {
        let endpoint = Url::parse(&config.acquisition.rpc_url).map_err(|err| {
            AcquisitionError::EngineUnavailable(format!(
                "invalid rpc url {}: {err}",
                config.acquisition.rpc_url
            ))
        })?;
        let mut connector = Self::new(endpoint, &config.paths.intake_dir);
        connector.secret = config
            .acquisition
            .rpc_secret
            .clone()
            .filter(|secret| !secret.is_empty());
        connector.rpc_timeout = config.acquisition.rpc_timeout();
        Ok(connector)
    }
}

#[async_trait]
impl EngineConnector for Aria2Connector {
    async fn connect(&self) -> AcquisitionResult<Arc<dyn RetrievalEngine>> {
        let client = Client::builder()
            .user_agent("Reelcast/0.1")
            .connect_timeout(self.rpc_timeout)
            .build()
            .map_err(|err| AcquisitionError::EngineUnavailable(err.to_string()))?;
        let engine = Aria2Engine {
            client,
            endpoint: self.endpoint.clone(),
            secret: self.secret.clone(),
            download_dir: self.download_dir.clone(),
            metadata_poll: self.metadata_poll,
            rpc_timeout: self.rpc_timeout,
            transfers: Mutex::new(HashMap::new()),
        };
        let version: VersionInfo = engine
            .call("aria2.getVersion", Vec::new())
            .await
            .map_err(|err| AcquisitionError::EngineUnavailable(err.to_string()))?;
        info!(endpoint = %self.endpoint, version = %version.version, "connected to aria2");
        Ok(Arc::new(engine))
    }
}

/// Retrieval engine backed by aria2.
///
/// Magnet registrations first download torrent metadata; aria2 then spawns a
/// follow-up download for the payload, which stays paused until
/// [`RetrievalEngine::fetch_all`]. Each handle tracks every gid it owns, the
/// last one being the payload.
#[derive(Debug)]
pub struct Aria2Engine {
    client: Client,
    endpoint: Url,
    secret: Option<String>,
    download_dir: PathBuf,
    metadata_poll: Duration,
    rpc_timeout: Duration,
    transfers: Mutex<HashMap<RetrievalHandle, Vec<String>>>,
}

impl Aria2Engine {
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> AcquisitionResult<T> {
        let mut full_params = Vec::with_capacity(params.len() + 1);
        if let Some(secret) = &self.secret {
            full_params.push(Value::String(format!("token:{secret}")));
        }
        full_params.extend(params);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: Uuid::new_v4().to_string(),
            method,
            params: full_params,
        };
        // aria2 reports faults with a 400 status and a JSON body, so the body
        // is decoded regardless of the status code.
        let response = match timeout(self.rpc_timeout, self.exchange::<T>(&request)).await {
            Ok(response) => response?,
            Err(_) => {
                warn!(method, after = ?self.rpc_timeout, "aria2 rpc timed out");
                return Err(AcquisitionError::Timeout {
                    method: method.to_string(),
                    after: self.rpc_timeout,
                });
            }
        };
        match (response.result, response.error) {
            (_, Some(fault)) => Err(AcquisitionError::Rpc {
                method: method.to_string(),
                code: fault.code,
                message: fault.message,
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Err(AcquisitionError::Protocol(format!(
                "{method} returned neither result nor error"
            ))),
        }
    }

    async fn exchange<T: DeserializeOwned>(
        &self,
        request: &RpcRequest<'_>,
    ) -> Result<RpcResponse<T>, reqwest::Error> {
        self.client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await?
            .json()
            .await
    }

    async fn tell_status(&self, gid: &str) -> AcquisitionResult<DownloadStatus> {
        self.call("aria2.tellStatus", vec![json!(gid), json!(STATUS_KEYS)])
            .await
    }

    fn gids(&self, handle: &RetrievalHandle) -> AcquisitionResult<Vec<String>> {
        self.transfers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(handle)
            .cloned()
            .ok_or_else(|| AcquisitionError::Transfer(format!("unknown handle {handle}")))
    }

    fn payload_gid(&self, handle: &RetrievalHandle) -> AcquisitionResult<String> {
        self.gids(handle)?.pop().ok_or_else(|| {
            AcquisitionError::Transfer(format!("handle {handle} owns no download"))
        })
    }

    fn follow(&self, handle: &RetrievalHandle, gid: &str) {
        let mut transfers = self.transfers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(gids) = transfers.get_mut(handle) {
            if !gids.iter().any(|known| known == gid) {
                gids.push(gid.to_string());
            }
        }
    }
}

#[async_trait]
impl RetrievalEngine for Aria2Engine {
    async fn register(&self, locator: &str) -> AcquisitionResult<RetrievalHandle> {
        let options = json!({
            "dir": self.download_dir.to_string_lossy(),
            "pause-metadata": "true",
            "follow-torrent": "true",
        });
        let gid: String = self
            .call("aria2.addUri", vec![json!([locator]), options])
            .await?;
        let handle = RetrievalHandle::new(gid.clone());
        self.transfers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.clone(), vec![gid]);
        debug!(%handle, "registered transfer with aria2");
        Ok(handle)
    }

    async fn await_metadata(
        &self,
        handle: &RetrievalHandle,
    ) -> AcquisitionResult<RetrievalMetadata> {
        loop {
            let gid = self.payload_gid(handle)?;
            let status = self.tell_status(&gid).await?;
            if status.status == "error" || status.status == "removed" {
                return Err(AcquisitionError::Transfer(
                    status
                        .error_message
                        .unwrap_or_else(|| format!("download {gid} {}", status.status)),
                ));
            }
            if let Some(next) = status.followed_by.first() {
                self.follow(handle, next);
                continue;
            }
            if let Some(name) = status.payload_name() {
                return Ok(RetrievalMetadata {
                    name,
                    total_length: parse_length(&status.total_length)?,
                });
            }
            sleep(self.metadata_poll).await;
        }
    }

    async fn fetch_all(&self, handle: &RetrievalHandle) -> AcquisitionResult<()> {
        let gid = self.payload_gid(handle)?;
        match self.call::<String>("aria2.unpause", vec![json!(gid)]).await {
            Ok(_) => Ok(()),
            // Payloads that were never paused cannot be unpaused.
            Err(AcquisitionError::Rpc { message, .. }) => {
                debug!(%handle, %message, "payload already active");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn stats(&self, handle: &RetrievalHandle) -> AcquisitionResult<TransferStats> {
        let gid = self.payload_gid(handle)?;
        let status = self.tell_status(&gid).await?;
        if status.status == "error" || status.status == "removed" {
            return Err(AcquisitionError::Transfer(
                status
                    .error_message
                    .unwrap_or_else(|| format!("download {gid} {}", status.status)),
            ));
        }
        Ok(TransferStats {
            bytes_completed: parse_length(&status.completed_length)?,
            total_length: parse_length(&status.total_length)?,
        })
    }

    async fn drop_handle(&self, handle: &RetrievalHandle) -> AcquisitionResult<()> {
        let gids = self
            .transfers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(handle)
            .unwrap_or_default();
        for gid in gids.iter().rev() {
            if let Err(err) = self.call::<String>("aria2.forceRemove", vec![json!(gid)]).await {
                debug!(%handle, %gid, error = %err, "aria2 download already gone");
            }
        }
        Ok(())
    }

    fn forget(&self, handle: &RetrievalHandle) {
        self.transfers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(handle);
    }
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: String,
    method: &'a str,
    params: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcFault>,
}

#[derive(Debug, Deserialize)]
struct RpcFault {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    version: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DownloadStatus {
    status: String,
    completed_length: String,
    total_length: String,
    followed_by: Vec<String>,
    error_message: Option<String>,
    bittorrent: Option<BittorrentStatus>,
}

impl DownloadStatus {
    fn payload_name(&self) -> Option<String> {
        self.bittorrent
            .as_ref()
            .and_then(|bt| bt.info.as_ref())
            .map(|info| info.name.clone())
            .filter(|name| !name.is_empty() && !name.starts_with("[METADATA]"))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BittorrentStatus {
    info: Option<BittorrentInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BittorrentInfo {
    name: String,
}

fn parse_length(value: &str) -> AcquisitionResult<u64> {
    if value.is_empty() {
        return Ok(0);
    }
    value
        .parse()
        .map_err(|_| AcquisitionError::Protocol(format!("invalid length {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_metadata_download_status() {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": "1",
            "result": {
                "gid": "2089b05ecca3d829",
                "status": "complete",
                "completedLength": "31244",
                "totalLength": "31244",
                "followedBy": ["7f0c4d3e2a1b9c88"],
                "bittorrent": { "info": { "name": "[Group] Show - 01" } }
            }
        });
        let response: RpcResponse<DownloadStatus> = serde_json::from_value(payload).unwrap();
        let status = response.result.unwrap();
        assert_eq!(status.followed_by, vec!["7f0c4d3e2a1b9c88".to_string()]);
        assert_eq!(status.payload_name().as_deref(), Some("[Group] Show - 01"));
        assert_eq!(parse_length(&status.total_length).unwrap(), 31244);
    }

    #[test]
    fn decodes_fault() {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": "1",
            "error": { "code": 1, "message": "Unauthorized" }
        });
        let response: RpcResponse<String> = serde_json::from_value(payload).unwrap();
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().message, "Unauthorized");
    }

    fn engine(rpc_timeout: Duration) -> Aria2Engine {
        Aria2Engine {
            client: Client::new(),
            endpoint: Url::parse("http://127.0.0.1:1/jsonrpc").unwrap(),
            secret: None,
            download_dir: PathBuf::from("/tmp"),
            metadata_poll: Duration::from_millis(10),
            rpc_timeout,
            transfers: Mutex::new(HashMap::new()),
        }
    }

    #[test]
    fn forget_prunes_completed_transfer() {
        let engine = engine(Duration::from_secs(1));
        let handle = RetrievalHandle::new("2089b05ecca3d829");
        engine
            .transfers
            .lock()
            .unwrap()
            .insert(handle.clone(), vec!["2089b05ecca3d829".into(), "7f0c".into()]);
        assert_eq!(engine.payload_gid(&handle).unwrap(), "7f0c");

        engine.forget(&handle);

        assert!(engine.transfers.lock().unwrap().is_empty());
        assert!(matches!(
            engine.payload_gid(&handle),
            Err(AcquisitionError::Transfer(_))
        ));
    }

    #[tokio::test]
    async fn silent_daemon_times_out() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming() {
                held.push(stream);
            }
        });
        let mut engine = engine(Duration::from_millis(200));
        engine.endpoint = Url::parse(&format!("http://{addr}/jsonrpc")).unwrap();

        let started = std::time::Instant::now();
        let err = engine.stats(&RetrievalHandle::new("x")).await.unwrap_err();
        assert!(matches!(err, AcquisitionError::Transfer(_)));
        engine
            .transfers
            .lock()
            .unwrap()
            .insert(RetrievalHandle::new("x"), vec!["x".into()]);
        let err = engine.stats(&RetrievalHandle::new("x")).await.unwrap_err();
        assert!(matches!(err, AcquisitionError::Timeout { .. }), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn metadata_phase_has_no_payload_name() {
        let status: DownloadStatus = serde_json::from_value(json!({
            "status": "active",
            "completedLength": "0",
            "totalLength": "0",
            "bittorrent": {}
        }))
        .unwrap();
        assert!(status.payload_name().is_none());
        assert!(parse_length("12x").is_err());
    }
}
