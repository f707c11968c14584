use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::{Worker, WorkerState, WorkerVersion};
use crate::{
    cache::CacheStorage,
    error::{Error, Result},
    fetch::{FetchRequest, FetchResponse},
    http::client::Network,
};

/// 持有当前生效的 worker
///
/// 新版本安装成功后才会替换旧版本；安装失败时旧版本继续生效。
/// 在任何版本生效之前，请求直接走网络。
pub struct Registration {
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    active: RwLock<Option<Arc<Worker>>>,
    next_id: AtomicU64,
}

impl Registration {
    pub fn new(storage: Arc<dyn CacheStorage>, network: Arc<dyn Network>) -> Self {
        Self {
            storage,
            network,
            active: RwLock::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn active(&self) -> Option<Arc<Worker>> {
        self.active.read().clone()
    }

    /// 安装并激活一个新版本
    ///
    /// 安装期间如果有更晚注册的版本先生效，返回 [`Error::Superseded`]。
    pub async fn register(&self, version: WorkerVersion) -> Result<Arc<Worker>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.install(id, version).await
    }

    /// 安装失败时按固定间隔重试
    ///
    /// 所有尝试共用一个 id，重试不会越过之后注册的版本。
    pub async fn register_with_retry(
        &self,
        version: WorkerVersion,
        attempts: u32,
        delay: Duration,
    ) -> Result<Arc<Worker>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let attempts = attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.install(id, version.clone()).await {
                Ok(worker) => return Ok(worker),
                Err(err @ Error::Superseded { .. }) => return Err(err),
                Err(err) if attempt < attempts => {
                    warn!(
                        "Install attempt {}/{} failed: {}, retry in {:?}",
                        attempt, attempts, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn install(&self, id: u64, version: WorkerVersion) -> Result<Arc<Worker>> {
        let worker = Arc::new(Worker::new(
            id,
            version,
            self.storage.clone(),
            self.network.clone(),
        ));
        info!(
            "Registering worker {} with cache {}",
            id,
            worker.cache_name()
        );

        worker.on_install().await?;
        self.activate(&worker)?;
        Ok(worker)
    }

    /// 只有比当前生效版本更晚注册的 worker 才能激活
    fn activate(&self, worker: &Arc<Worker>) -> Result<()> {
        let mut active = self.active.write();
        if let Some(current) = active.as_ref()
            && current.id() > worker.id()
        {
            worker.set_state(WorkerState::Redundant);
            info!(
                "Worker {} installed after newer worker {}, discarded",
                worker.id(),
                current.id()
            );
            return Err(Error::Superseded {
                id: worker.id(),
                active: current.id(),
            });
        }

        worker.set_state(WorkerState::Activating);
        if let Some(previous) = active.replace(worker.clone()) {
            previous.set_state(WorkerState::Redundant);
            debug!("Worker {} replaced by {}", previous.id(), worker.id());
        }
        worker.set_state(WorkerState::Activated);
        info!(
            "Worker {} activated with cache {}",
            worker.id(),
            worker.cache_name()
        );
        Ok(())
    }

    /// 交给当前 worker 处理，没有生效的 worker 时直接请求网络
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        match self.active() {
            Some(worker) => worker.on_fetch(request).await,
            None => {
                debug!("No active worker, pass through {}", request.url);
                self.network.fetch(request).await
            }
        }
    }
}
