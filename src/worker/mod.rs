use std::sync::Arc;

use futures::future::try_join_all;
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
    cache::{CacheEntry, CacheStorage},
    config::Settings,
    error::{Error, Result},
    fetch::{FetchRequest, FetchResponse, RequestKey},
    http::client::Network,
};

pub mod manifest;
pub mod registration;

#[cfg(test)]
pub(crate) mod mock;

pub use manifest::{Anomaly, Manifest};
pub use registration::Registration;

/// 一个脚本版本
///
/// 缓存名在同一版本内不变，修改清单时需要同时更换缓存名，
/// 否则旧条目会一直被使用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerVersion {
    pub cache_name: String,
    /// 清单中相对路径的解析基准
    pub script_url: Url,
    pub manifest: Manifest,
}

impl WorkerVersion {
    pub fn new(cache_name: impl Into<String>, script_url: Url, manifest: Manifest) -> Self {
        Self {
            cache_name: cache_name.into(),
            script_url,
            manifest,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            settings.cache.name.clone(),
            settings.script_url()?,
            Manifest::new(settings.cache.assets.iter().cloned()),
        ))
    }

    /// 脚本所在源站，只保留 scheme 和 authority
    pub fn origin(&self) -> Url {
        let mut origin = self.script_url.clone();
        origin.set_path("/");
        origin.set_query(None);
        origin.set_fragment(None);
        origin
    }
}

/// worker 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// 安装失败或已被新版本替换
    Redundant,
}

/// 安装结果
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub cache_name: String,
    pub keys: Vec<RequestKey>,
}

pub struct Worker {
    id: u64,
    version: WorkerVersion,
    state: RwLock<WorkerState>,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("state", &self.state())
            .finish()
    }
}

impl Worker {
    pub fn new(
        id: u64,
        version: WorkerVersion,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
    ) -> Self {
        match version.manifest.anomalies(&version.script_url) {
            Ok(anomalies) => anomalies.iter().for_each(|anomaly| match anomaly {
                Anomaly::Empty { index } => warn!(
                    "Manifest entry {} is empty and resolves to {}",
                    index, version.script_url
                ),
                Anomaly::Duplicate { index, url } => {
                    warn!("Manifest entry {} duplicates {}", index, url)
                }
            }),
            Err(err) => warn!("Failed to check manifest: {}", err),
        }
        Self {
            id,
            version,
            state: RwLock::new(WorkerState::Parsed),
            storage,
            network,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn version(&self) -> &WorkerVersion {
        &self.version
    }

    pub fn cache_name(&self) -> &str {
        &self.version.cache_name
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    pub(crate) fn set_state(&self, state: WorkerState) {
        debug!("Worker {} state {:?}", self.id, state);
        *self.state.write() = state;
    }

    /// 打开缓存并写入清单中的全部资源
    ///
    /// 所有资源并发请求，任何一个传输失败或返回非 2xx 都会让整批失败，
    /// 此时不写入任何条目。
    pub async fn populate(&self) -> Result<Vec<RequestKey>> {
        let name = self.cache_name();
        let urls = self.version.manifest.resolve(&self.version.script_url)?;
        self.storage.open(name).await?;

        let fetches = urls.into_iter().map(|url| async move {
            let request = FetchRequest::get(url);
            let response = self.network.fetch(&request).await?;
            if !response.is_ok() {
                return Err(Error::BadStatus {
                    url: request.url.to_string(),
                    status: response.status,
                });
            }
            Ok::<_, Error>(CacheEntry::new(request.key(), response))
        });
        let entries = try_join_all(fetches).await?;

        let keys = entries.iter().map(|e| e.key.clone()).collect::<Vec<_>>();
        self.storage.put_all(name, entries).await?;
        Ok(keys)
    }

    /// 只读查找，非 GET 请求直接视为未命中
    pub async fn lookup(&self, key: &RequestKey) -> Result<Option<FetchResponse>> {
        if !key.is_get() {
            return Ok(None);
        }
        self.storage.match_request(self.cache_name(), key).await
    }

    /// 命中缓存直接返回，否则原样返回网络请求的结果
    pub async fn lookup_or_fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let key = request.key();
        match self.lookup(&key).await {
            Ok(Some(hit)) => {
                debug!("cache hit {}", key);
                return Ok(hit);
            }
            Ok(None) => debug!("cache miss {}", key),
            Err(err) => warn!("Cache lookup failed for {}, fall back to network: {}", key, err),
        }
        self.network.fetch(request).await
    }

    /// install 事件
    pub async fn on_install(&self) -> Result<InstallReport> {
        self.set_state(WorkerState::Installing);
        match self.populate().await {
            Ok(keys) => {
                self.set_state(WorkerState::Installed);
                info!(
                    "Worker {} installed {} assets into {}",
                    self.id,
                    keys.len(),
                    self.cache_name()
                );
                Ok(InstallReport {
                    cache_name: self.cache_name().to_string(),
                    keys,
                })
            }
            Err(err) => {
                self.set_state(WorkerState::Redundant);
                error!("Worker {} install failed: {}", self.id, err);
                Err(err)
            }
        }
    }

    /// fetch 事件，从不写缓存
    pub async fn on_fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        self.lookup_or_fetch(request).await
    }
}
