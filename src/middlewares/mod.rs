use std::{fmt::Display, time::Duration};

use axum::{
    Router,
    body::{Body, Bytes},
    extract::Request,
    http::{
        HeaderMap, HeaderValue,
        header::{SERVER, USER_AGENT},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::trace::TraceLayer;
use tracing::{Span, error, info, info_span};

use crate::consts::{NAME, SOURCE_HEADER, VERSION, VERSION_HEADER};

/// Middleware for adding version information to each response's headers.
///
/// It appends two headers:
/// - "Server": The name of the server extracted from the Cargo package name.
/// - "X-Precache-Version": The version of the server extracted from the Cargo package version.
pub async fn add_version(req: Request<Body>, next: Next) -> impl IntoResponse {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();
    headers.append(SERVER, HeaderValue::from_static(NAME));
    headers.append(VERSION_HEADER, HeaderValue::from_static(VERSION));
    res
}

/// Middleware for logging each request.
///
/// Each request gets an `HTTP` span with method, uri and user agent.
/// The response line carries status, where the response came from
/// (`cache` or `network`) and the latency.
pub fn logging_route(router: Router) -> Router {
    let make_span = |req: &Request<_>| {
        let ua = req
            .headers()
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("Unknown");
        info_span!("HTTP", method = ?req.method(), uri = ?req.uri(), ua)
    };

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(make_span)
        .on_request(|_req: &Request<_>, _span: &Span| {})
        .on_response(|res: &Response, latency: Duration, _span: &Span| {
            let source = res
                .headers()
                .get(SOURCE_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            info!("{} {}", source, format_latency(latency, res.status()));
        })
        .on_body_chunk(|_chunk: &Bytes, _latency: Duration, _span: &Span| {})
        .on_eos(|_trailers: Option<&HeaderMap>, _stream_duration: Duration, _span: &Span| {})
        .on_failure(
            |error: ServerErrorsFailureClass, latency: Duration, _span: &Span| {
                error!("{}", format_latency(latency, error));
            },
        );

    router.layer(trace_layer)
}

/// Format request latency and status message
/// return a string
fn format_latency(latency: Duration, status: impl Display) -> String {
    let micros = latency.as_micros();
    let millis = latency.as_millis();
    if micros >= 1000 {
        format!("{status} {millis}ms")
    } else {
        format!("{status} {micros}μs")
    }
}
