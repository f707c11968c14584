//! 集成测试的公共辅助函数和工具

#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use axum::{
    Router,
    extract::{Request, State},
    http::{
        StatusCode,
        header::{CONTENT_TYPE, LOCATION, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::net::TcpListener;

use precache::{
    config::{SettingHost, Settings},
    http::{AppState, make_server},
    worker::Registration,
};

pub const CSS: &str = "body { color: #333; }";
/// 源站对这个地址返回 302 和会话 cookie
pub const LOGIN_PATH: &str = "/accounts/login/";
pub const SESSION_COOKIE: &str = "sessionid=abc123; Path=/; HttpOnly";

/// 假源站，记录每个路径的请求次数
#[derive(Clone, Default)]
pub struct Origin {
    pub hits: Arc<DashMap<String, usize>>,
    /// 返回 404 的路径
    pub missing: Arc<DashMap<String, ()>>,
}

impl Origin {
    pub fn hits(&self, path: &str) -> usize {
        self.hits.get(path).map(|v| *v).unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.hits.iter().map(|e| *e.value()).sum()
    }
}

async fn origin_handler(State(origin): State<Origin>, req: Request) -> Response {
    let path = req.uri().path().to_string();
    *origin.hits.entry(path.clone()).or_insert(0) += 1;

    if origin.missing.contains_key(&path) {
        return (StatusCode::NOT_FOUND, [(CONTENT_TYPE, "text/plain")], "not found").into_response();
    }
    if path == LOGIN_PATH {
        return (
            StatusCode::FOUND,
            [(LOCATION, "/dashboard/"), (SET_COOKIE, SESSION_COOKIE)],
            "",
        )
            .into_response();
    }
    let content_type = if path.ends_with(".css") {
        "text/css"
    } else if path.ends_with(".js") {
        "application/javascript"
    } else {
        "text/html"
    };
    let body = if path.ends_with(".css") {
        CSS.to_string()
    } else {
        format!("{} {}", req.method(), path)
    };
    (StatusCode::OK, [(CONTENT_TYPE, content_type)], body).into_response()
}

/// 启动假源站，返回监听地址
pub async fn start_origin(origin: Origin) -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let router = Router::new().fallback(origin_handler).with_state(origin);
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("origin stopped");
    });
    Ok(addr)
}

/// 一个没有任何服务监听的地址
pub async fn closed_addr() -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

pub fn test_settings(origin: SocketAddr, extra_cache: &str) -> Result<Settings> {
    let content = format!(
        r#"
        log_level = "debug"
        log_folder = ""

        [origin]
        url = "http://{origin}"
        timeout = 5

        [cache]
        install_attempts = 1
        install_retry_delay = 0
        {extra_cache}

        [[host]]
        ip = "127.0.0.1"
        port = 0
        timeout = 5
        "#
    );
    Ok(toml::from_str(&content)?)
}

/// 启动 precache 服务，返回实际监听地址
pub async fn start_precache(
    registration: Arc<Registration>,
    settings: &Settings,
) -> Result<(axum_server::Handle<SocketAddr>, SocketAddr)> {
    let state = AppState::new(registration, settings.origin_url()?);
    let host = SettingHost {
        ip: "127.0.0.1".to_string(),
        port: 0,
        timeout: 5,
    };
    let handle = make_server(host, state).await?;
    let addr = handle.listening().await.expect("Server not listening");
    Ok((handle, addr))
}

/// 不跟随跳转，直接看到服务返回的 3xx
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("Failed to build client")
}
