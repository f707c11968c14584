use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use futures::{FutureExt, future::BoxFuture};
use http::{HeaderMap, HeaderValue, Method, StatusCode, header::CONTENT_TYPE};
use parking_lot::Mutex;
use url::Url;

use crate::{
    error::{Error, Result},
    fetch::{FetchRequest, FetchResponse},
    http::client::Network,
};

/// 记录调用的假网络，body 为 `body of <path>`
#[derive(Debug, Default)]
pub struct MockNetwork {
    calls: Mutex<Vec<(Method, Url)>>,
    failures: HashSet<String>,
    statuses: HashMap<String, StatusCode>,
    delays: HashMap<String, Duration>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定路径传输失败
    pub fn with_failure(mut self, path: &str) -> Self {
        self.failures.insert(path.to_string());
        self
    }

    pub fn with_status(mut self, path: &str, status: StatusCode) -> Self {
        self.statuses.insert(path.to_string(), status);
        self
    }

    /// 指定路径延迟返回
    pub fn with_delay(mut self, path: &str, delay: Duration) -> Self {
        self.delays.insert(path.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<(Method, Url)> {
        self.calls.lock().clone()
    }
}

impl Network for MockNetwork {
    fn fetch<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, Result<FetchResponse>> {
        async move {
            self.calls
                .lock()
                .push((request.method.clone(), request.url.clone()));
            let path = request.url.path();
            if let Some(delay) = self.delays.get(path) {
                tokio::time::sleep(*delay).await;
            }
            if self.failures.contains(path) {
                return Err(Error::Any(anyhow::anyhow!(
                    "connection refused: {}",
                    request.url
                )));
            }
            let status = self.statuses.get(path).copied().unwrap_or(StatusCode::OK);
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
            Ok(FetchResponse::new(
                request.url.clone(),
                status,
                headers,
                format!("body of {path}"),
            ))
        }
        .boxed()
    }
}
