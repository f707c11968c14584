//! 拦截到的请求与响应
//!
//! worker 只按请求标识（方法 + URL）查找缓存，不解析或改写内容。

use std::fmt::Display;

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, Method, StatusCode};
use url::Url;

/// 缓存键：请求方法和去掉 fragment 的 URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub method: Method,
    pub url: Url,
}

impl RequestKey {
    pub fn new(method: Method, mut url: Url) -> Self {
        url.set_fragment(None);
        Self { method, url }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// 只有 GET 请求可以命中缓存
    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }

    /// 磁盘存储使用的文件名
    pub fn digest(&self) -> String {
        format!("{:x}", md5::compute(self.to_string()))
    }
}

impl Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// 遇到 3xx 时的处理方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RedirectMode {
    /// 跟随跳转，返回最终响应
    #[default]
    Follow,
    /// 3xx 原样返回，由客户端自己处理
    Manual,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub redirect: RedirectMode,
}

impl FetchRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            redirect: RedirectMode::default(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(self.method.clone(), self.url.clone())
    }
}

/// 网络或缓存返回的完整响应，body 已全部读入内存
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// 写入缓存的时间，网络响应为 None
    pub cached_at: Option<DateTime<Utc>>,
}

impl FetchResponse {
    pub fn new(url: Url, status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            url,
            status,
            headers,
            body: body.into(),
            cached_at: None,
        }
    }

    /// status 在 200-299 之间
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_cached(&self) -> bool {
        self.cached_at.is_some()
    }

    /// 标记为缓存条目
    pub fn into_stored(mut self) -> Self {
        self.cached_at = Some(Utc::now());
        self
    }
}
