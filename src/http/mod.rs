use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{Router, middleware};
use axum_server::Handle;
use http::StatusCode;
use parking_lot::RwLock;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, error, info};
use url::Url;

use crate::{
    config::SettingHost,
    middlewares::{add_version, logging_route},
    worker::Registration,
};

// 访问源站
pub mod client;
pub mod error;
// 拦截请求
pub mod intercept;

/// 所有监听共享的状态
#[derive(Clone)]
pub struct AppState {
    pub registration: Arc<Registration>,
    /// 没有生效的 worker 时使用的源站
    origin: Arc<RwLock<Url>>,
}

impl AppState {
    pub fn new(registration: Arc<Registration>, origin: Url) -> Self {
        Self {
            registration,
            origin: Arc::new(RwLock::new(origin)),
        }
    }

    /// 请求转发的源站
    ///
    /// 以当前生效 worker 的源站为准，缓存键和它保持一致；
    /// 新版本激活之前旧缓存仍然可以命中。
    pub fn origin(&self) -> Url {
        match self.registration.active() {
            Some(worker) => worker.version().origin(),
            None => self.origin.read().clone(),
        }
    }

    /// 配置重新加载后更新源站地址
    pub fn set_origin(&self, origin: Url) {
        *self.origin.write() = origin;
    }
}

/// 优雅关闭所有服务器
///
/// 对所有运行中的服务器发送优雅关闭信号，并清空服务器句柄列表。
/// 服务器将在 30 秒内完成正在处理的请求后停止。
pub async fn shutdown_servers(handles: &mut Vec<Handle<SocketAddr>>) {
    for handle in handles.iter() {
        handle.graceful_shutdown(Some(Duration::from_secs(30)));
    }
    handles.clear();
    info!("All servers have been signaled to shut down");
}

/// 启动所有服务器
///
/// 单个服务器启动失败会被记录为错误日志，不会影响其他服务器的启动
pub async fn start_servers(hosts: Vec<SettingHost>, state: AppState) -> Vec<Handle<SocketAddr>> {
    let mut handles = Vec::new();
    for host in hosts {
        let server_addr = format!("{}:{}", host.ip, host.port);
        match make_server(host, state.clone()).await {
            Ok(handle) => {
                handles.push(handle);
                info!("Server instance started on {}", server_addr);
            }
            Err(e) => {
                error!(
                    "Failed to start server instance on {}: {:?}",
                    server_addr, e
                );
            }
        }
    }
    handles
}

pub async fn make_server(host: SettingHost, state: AppState) -> anyhow::Result<Handle<SocketAddr>> {
    debug!("make_server start with host: {:?}", host);

    // 所有路径都交给 worker 处理
    let mut router = Router::new()
        .fallback(intercept::intercept)
        .with_state(state);

    router = router.layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(add_version))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::SERVICE_UNAVAILABLE,
                Duration::from_secs(host.timeout.into()),
            )),
    );

    router = logging_route(router);

    let addr = format!("{}:{}", host.ip, host.port);
    let addr: SocketAddr = addr.parse()?;

    let handle = Handle::new();
    let handle_clone = handle.clone();

    // 生成一个任务来运行服务器
    tokio::spawn(async move {
        info!("Listening on http://{}", addr);
        if let Err(err) = axum_server::bind(addr)
            .handle(handle_clone)
            .serve(router.into_make_service())
            .await
        {
            error!("Server on {} stopped: {:?}", addr, err);
        }
    });

    Ok(handle)
}
