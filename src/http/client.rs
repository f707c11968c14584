use std::time::Duration;

use futures::{FutureExt, future::BoxFuture};
use http::HeaderName;
use reqwest::{Client, redirect::Policy};
use tracing::debug;

use crate::{
    error::Result,
    fetch::{FetchRequest, FetchResponse, RedirectMode},
};

/// 网络访问，缓存未命中和安装时使用
pub trait Network: Send + Sync {
    /// 发送请求并读取完整响应
    ///
    /// 非 2xx 的响应也是正常结果，只有传输失败才返回错误
    fn fetch<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, Result<FetchResponse>>;
}

/// 基于 reqwest 的网络实现
///
/// 按 [`RedirectMode`] 分成两个客户端，各自复用连接池。
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: Client,
    manual_client: Client,
}

impl HttpNetwork {
    /// 源站直连，不走系统代理
    ///
    /// ## Arguments
    ///
    /// `timeout`: 单个请求的超时时间
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().no_proxy().timeout(timeout).build()?;
        let manual_client = Client::builder()
            .no_proxy()
            .redirect(Policy::none())
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            manual_client,
        })
    }

    fn client(&self, mode: RedirectMode) -> &Client {
        match mode {
            RedirectMode::Follow => &self.client,
            RedirectMode::Manual => &self.manual_client,
        }
    }
}

impl Network for HttpNetwork {
    fn fetch<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, Result<FetchResponse>> {
        async move {
            debug!("network fetch {} {}", request.method, request.url);
            let mut forward_req = self
                .client(request.redirect)
                .request(request.method.clone(), request.url.clone());
            for (name, value) in request.headers.iter() {
                if !is_exclude_header(name) {
                    forward_req = forward_req.header(name.clone(), value.clone());
                }
            }
            if !request.body.is_empty() {
                forward_req = forward_req.body(request.body.clone());
            }

            let res = forward_req.send().await?;
            let url = res.url().clone();
            let status = res.status();
            let headers = res.headers().clone();
            let body = res.bytes().await?;
            Ok(FetchResponse::new(url, status, headers, body))
        }
        .boxed()
    }
}

/// 逐跳头部，不转发
pub fn is_exclude_header(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "host"
            | "connection"
            | "proxy-authenticate"
            | "upgrade"
            | "proxy-authorization"
            | "keep-alive"
            | "transfer-encoding"
            | "te"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_exclude_header() {
        assert!(is_exclude_header(&http::header::HOST));
        assert!(is_exclude_header(&http::header::CONNECTION));
        assert!(is_exclude_header(&http::header::UPGRADE));
        assert!(is_exclude_header(&http::header::TRANSFER_ENCODING));
        assert!(is_exclude_header(&http::HeaderName::from_static(
            "keep-alive"
        )));

        assert!(!is_exclude_header(&http::header::USER_AGENT));
        assert!(!is_exclude_header(&http::header::ACCEPT));
        assert!(!is_exclude_header(&http::header::COOKIE));
    }
}
