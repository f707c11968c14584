use anyhow::Context;
use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::HeaderValue,
    response::{IntoResponse, Response},
};
use http::HeaderMap;
use tracing::{debug, error};
use url::Url;

use super::{
    AppState,
    client::is_exclude_header,
    error::{RouteError, RouteResult},
};
use crate::{
    consts::SOURCE_HEADER,
    fetch::{FetchRequest, FetchResponse, RedirectMode},
};

/// 转发请求体的上限
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// 拦截所有请求
///
/// 1. 按源站地址重建请求 URL；
/// 2. 交给当前 worker，命中缓存直接返回，否则请求源站；
/// 3. 源站请求失败时返回 502。
pub async fn intercept(
    State(state): State<AppState>,
    req: Request<Body>,
) -> RouteResult<impl IntoResponse> {
    let path_query = req
        .uri()
        .path_and_query()
        .map(|v| v.as_str())
        .unwrap_or("/");
    let url = origin_url(&state.origin(), path_query)
        .with_context(|| format!("invalid request path {path_query}"))?;
    debug!("intercept {} {}", req.method(), url);

    let (parts, body) = req.into_parts();
    let body = to_bytes(body, MAX_BODY_SIZE).await.map_err(|err| {
        error!("Failed to read request body: {}", err);
        RouteError::BadRequest()
    })?;
    let mut request = FetchRequest::new(parts.method, url);
    request.headers = parts.headers;
    request.body = body;
    request.redirect = RedirectMode::Manual;

    let res = state
        .registration
        .handle_fetch(&request)
        .await
        .map_err(|err| {
            error!("Failed to fetch {}: {}", request.url, err);
            RouteError::BadGateway()
        })?;
    into_response(res)
}

/// 拼接源站地址和请求路径
fn origin_url(origin: &Url, path_query: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!(
        "{}{}",
        origin.as_str().trim_end_matches('/'),
        path_query
    ))
}

fn into_response(res: FetchResponse) -> RouteResult<Response> {
    let source = if res.is_cached() { "cache" } else { "network" };
    let mut response_builder = Response::builder().status(res.status);
    let headers = response_builder
        .headers_mut()
        .ok_or(RouteError::InternalError())?;
    copy_headers(&res.headers, headers);
    headers.insert(SOURCE_HEADER, HeaderValue::from_static(source));
    let response = response_builder
        .body(Body::from(res.body))
        .with_context(|| "Failed to build HTTP response")?;
    Ok(response)
}

fn copy_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from.iter() {
        if !is_exclude_header(name) {
            to.append(name.clone(), value.clone());
        }
    }
}
