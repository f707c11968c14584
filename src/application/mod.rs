use std::{net::SocketAddr, sync::Arc, sync::mpsc, time::Duration};

use parking_lot::Mutex;
use tokio::{runtime, task::JoinHandle};
use tracing::{error, info, warn};

use crate::{
    cache::build_storage,
    config::Settings,
    error::{Error, Result},
    http::{AppState, client::HttpNetwork, shutdown_servers},
    worker::{Registration, WorkerVersion},
};

/// 根据配置创建缓存存储和网络，组装 Registration
pub fn build_registration(settings: &Settings) -> Result<Arc<Registration>> {
    let storage = build_storage(settings.cache.storage, &settings.cache.dir);
    let network = HttpNetwork::new(Duration::from_secs(settings.origin.timeout.into()))?;
    info!(
        "Cache storage {:?}, origin {}",
        settings.cache.storage, settings.origin.url
    );
    Ok(Arc::new(Registration::new(storage, Arc::new(network))))
}

/// 在后台安装并激活配置对应的 worker 版本
///
/// 安装完成之前请求直接转发到源站；多次重试仍失败时保留之前的版本。
pub fn spawn_install(
    registration: Arc<Registration>,
    settings: &Settings,
    runtime: &runtime::Handle,
) -> Result<JoinHandle<()>> {
    let version = WorkerVersion::from_settings(settings)?;
    let attempts = settings.cache.install_attempts;
    let delay = Duration::from_secs(settings.cache.install_retry_delay);

    Ok(runtime.spawn(async move {
        let cache_name = version.cache_name.clone();
        match registration
            .register_with_retry(version, attempts, delay)
            .await
        {
            Ok(worker) => info!("Worker {} is serving {}", worker.id(), cache_name),
            Err(err @ Error::Superseded { .. }) => info!("Skip {}: {}", cache_name, err),
            Err(err) => error!(
                "Failed to install {} after {} attempts: {}",
                cache_name, attempts, err
            ),
        }
    }))
}

/// 处理配置文件变更
///
/// 只有 `[cache]` 或源站地址变化时才注册新版本，监听地址的变化需要重启生效。
/// 新的源站地址立即用于直通请求，已有 worker 生效时要等新版本激活后才切换。
pub fn handle_config_change(
    result: Result<Settings>,
    current: &Mutex<Settings>,
    state: &AppState,
    runtime: &runtime::Handle,
) {
    let new_settings = match result {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to reload config file: {:?}", e);
            return;
        }
    };
    info!("Config file reloaded successfully");

    let mut current = current.lock();
    if current.host != new_settings.host {
        warn!("Host changes take effect after restart");
    }
    if !current.worker_changed(&new_settings) {
        *current = new_settings;
        return;
    }

    match new_settings.origin_url() {
        Ok(origin) => state.set_origin(origin),
        Err(e) => {
            error!("Invalid origin in reloaded config: {:?}", e);
            return;
        }
    }
    info!(
        "Worker config changed, registering cache {}",
        new_settings.cache.name
    );
    if let Err(e) = spawn_install(state.registration.clone(), &new_settings, runtime) {
        error!("Failed to register new worker version: {:?}", e);
    }
    *current = new_settings;
}

/// 优雅关闭服务器和配置监听器
pub async fn shutdown_application(
    mut handles: Vec<axum_server::Handle<SocketAddr>>,
    stop_tx: mpsc::Sender<()>,
) {
    info!("Received shutdown signal, closing servers...");

    shutdown_servers(&mut handles).await;

    // 停止配置监听
    if let Err(err) = stop_tx.send(()) {
        error!("Failed to send stop signal to config watcher: {:?}", err);
    }

    info!("Application shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cache::MemoryStorage, fetch::FetchRequest, worker::mock::MockNetwork};

    fn settings(cache_name: &str) -> Settings {
        toml::from_str(&format!(
            r#"
            [origin]
            url = "http://127.0.0.1:8000"

            [cache]
            name = "{cache_name}"
            assets = ["/", "/static/js/pcoded.js"]
            install_retry_delay = 0

            [[host]]
            ip = "127.0.0.1"
            port = 8080
            "#
        ))
        .unwrap()
    }

    fn state() -> AppState {
        state_with(MockNetwork::new())
    }

    fn state_with(network: MockNetwork) -> AppState {
        let registration = Registration::new(Arc::new(MemoryStorage::new()), Arc::new(network));
        AppState::new(
            Arc::new(registration),
            url::Url::parse("http://127.0.0.1:8000").unwrap(),
        )
    }

    async fn wait_for_cache(state: &AppState, name: &str) -> bool {
        for _ in 0..100 {
            if let Some(worker) = state.registration.active()
                && worker.cache_name() == name
            {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn spawn_install_activates_worker() {
        let state = state();
        let handle = spawn_install(
            state.registration.clone(),
            &settings("projectsite-cache-v1"),
            &runtime::Handle::current(),
        )
        .unwrap();
        handle.await.unwrap();

        let worker = state.registration.active().unwrap();
        assert_eq!(worker.cache_name(), "projectsite-cache-v1");
    }

    #[tokio::test]
    async fn config_change_registers_new_version() {
        let state = state();
        let runtime = runtime::Handle::current();
        let current = Mutex::new(settings("projectsite-cache-v1"));
        spawn_install(state.registration.clone(), &current.lock(), &runtime)
            .unwrap()
            .await
            .unwrap();

        let mut reloaded = settings("projectsite-cache-v2");
        reloaded.origin.url = "http://127.0.0.2:8000".to_string();
        handle_config_change(Ok(reloaded), &current, &state, &runtime);
        assert!(wait_for_cache(&state, "projectsite-cache-v2").await);
        assert_eq!(current.lock().cache.name, "projectsite-cache-v2");
        assert_eq!(state.origin().as_str(), "http://127.0.0.2:8000/");
    }

    #[tokio::test]
    async fn failed_origin_change_keeps_serving_old_cache() {
        let state = state_with(MockNetwork::new().with_failure("/static/js/new.js"));
        let runtime = runtime::Handle::current();
        let current = Mutex::new(settings("projectsite-cache-v1"));
        spawn_install(state.registration.clone(), &current.lock(), &runtime)
            .unwrap()
            .await
            .unwrap();

        let mut reloaded = settings("projectsite-cache-v2");
        reloaded.origin.url = "http://127.0.0.2:8000".to_string();
        reloaded.cache.assets.push("/static/js/new.js".to_string());
        handle_config_change(Ok(reloaded), &current, &state, &runtime);
        tokio::time::sleep(Duration::from_millis(50)).await;

        let active = state.registration.active().unwrap();
        assert_eq!(active.cache_name(), "projectsite-cache-v1");
        assert_eq!(state.origin().as_str(), "http://127.0.0.1:8000/");
        let request = FetchRequest::get(state.origin().join("/static/js/pcoded.js").unwrap());
        assert!(active.on_fetch(&request).await.unwrap().is_cached());
    }

    #[tokio::test]
    async fn unchanged_config_keeps_worker() {
        let state = state();
        let runtime = runtime::Handle::current();
        let current = Mutex::new(settings("projectsite-cache-v1"));
        spawn_install(state.registration.clone(), &current.lock(), &runtime)
            .unwrap()
            .await
            .unwrap();
        let first = state.registration.active().unwrap().id();

        let mut reloaded = settings("projectsite-cache-v1");
        reloaded.log_level = "debug".to_string();
        handle_config_change(Ok(reloaded), &current, &state, &runtime);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(state.registration.active().unwrap().id(), first);
        assert_eq!(current.lock().log_level, "debug");
    }
}
