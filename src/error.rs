use std::io;

use http::{
    StatusCode,
    header::{InvalidHeaderName, InvalidHeaderValue},
    uri::InvalidUri,
};

#[allow(clippy::enum_variant_names)]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    // from
    #[error("failed io {0}")]
    Io(#[from] io::Error),
    #[error("failed to decode toml {0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("failed to handle json {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to handle http {0}")]
    Http(#[from] http::Error),
    #[error("failed to convert uri {0}")]
    InvalidUri(#[from] InvalidUri),
    #[error("failed to parse url {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid header name {0}")]
    HeaderName(#[from] InvalidHeaderName),
    #[error("invalid header value {0}")]
    HeaderValue(#[from] InvalidHeaderValue),
    #[error("failed to fetch {0}")]
    Request(#[from] reqwest::Error),

    // precache
    #[error("bad response status {status} for {url}")]
    BadStatus { url: String, status: StatusCode },
    /// 安装完成时已有更新的版本生效
    #[error("worker {id} superseded by active worker {active}")]
    Superseded { id: u64, active: u64 },
    #[error("invalid config {0}")]
    Config(String),
    #[error("internal error {0}")]
    Any(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = anyhow::Result<T, E>;
