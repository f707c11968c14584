use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use futures::{FutureExt, future::BoxFuture};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};
use url::Url;

use super::{CacheEntry, CacheStorage, sort_keys};
use crate::{
    error::{Error, Result},
    fetch::{FetchResponse, RequestKey},
};

const DESCRIPTOR: &str = "cache.json";

/// 缓存目录描述文件
#[derive(Serialize, Deserialize, Debug)]
struct CacheDescriptor {
    name: String,
    created_at: DateTime<Utc>,
}

/// 单条记录的元数据，body 单独存放在 `<digest>.body`
#[derive(Serialize, Deserialize, Debug)]
struct EntryMeta {
    method: String,
    url: String,
    response_url: String,
    status: u16,
    /// 头部值按原始字节保存
    headers: Vec<(String, Vec<u8>)>,
    cached_at: Option<DateTime<Utc>>,
}

impl EntryMeta {
    fn from_entry(entry: &CacheEntry) -> Self {
        let headers = entry
            .response
            .headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.as_bytes().to_vec()))
            .collect();
        Self {
            method: entry.key.method.to_string(),
            url: entry.key.url.to_string(),
            response_url: entry.response.url.to_string(),
            status: entry.response.status.as_u16(),
            headers,
            cached_at: entry.response.cached_at,
        }
    }

    fn key(&self) -> Result<RequestKey> {
        let method = Method::from_bytes(self.method.as_bytes())
            .map_err(|err| Error::Config(format!("invalid method {}: {err}", self.method)))?;
        Ok(RequestKey::new(method, Url::parse(&self.url)?))
    }

    fn into_response(self, body: Vec<u8>) -> Result<FetchResponse> {
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            headers.append(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_bytes(value)?,
            );
        }
        let status = StatusCode::from_u16(self.status)
            .map_err(|err| Error::Config(format!("invalid status {}: {err}", self.status)))?;
        let mut res = FetchResponse::new(Url::parse(&self.response_url)?, status, headers, body);
        res.cached_at = self.cached_at;
        Ok(res)
    }
}

/// 持久化缓存存储
///
/// 目录结构：
///
/// ```text
/// <root>/<md5(cache name)>/cache.json
/// <root>/<md5(cache name)>/<md5(request key)>.json
/// <root>/<md5(cache name)>/<md5(request key)>.body
/// ```
#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn cache_dir(&self, name: &str) -> PathBuf {
        self.root.join(format!("{:x}", md5::compute(name)))
    }

    /// 创建缓存目录和描述文件，已存在时直接返回
    async fn ensure(&self, name: &str) -> Result<PathBuf> {
        let dir = self.cache_dir(name);
        let descriptor = dir.join(DESCRIPTOR);
        if fs::try_exists(&descriptor).await? {
            return Ok(dir);
        }
        fs::create_dir_all(&dir).await?;
        let content = serde_json::to_vec(&CacheDescriptor {
            name: name.to_string(),
            created_at: Utc::now(),
        })?;
        fs::write(&descriptor, content).await?;
        debug!("Cache {} created at {:?}", name, dir);
        Ok(dir)
    }
}

/// 删除暂存的临时文件
async fn remove_staged<'a>(staged: impl IntoIterator<Item = &'a (PathBuf, PathBuf)>) {
    let tmps: Vec<&'a PathBuf> = staged.into_iter().map(|(tmp, _)| tmp).collect();
    for tmp in tmps {
        if let Err(err) = fs::remove_file(tmp).await
            && err.kind() != ErrorKind::NotFound
        {
            warn!("Failed to remove {:?}: {}", tmp, err);
        }
    }
}

/// 读取文件，不存在时返回 None
async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

impl CacheStorage for DiskStorage {
    fn open<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
        async move {
            self.ensure(name).await?;
            Ok(())
        }
        .boxed()
    }

    fn has<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool>> {
        async move { Ok(fs::try_exists(self.cache_dir(name).join(DESCRIPTOR)).await?) }.boxed()
    }

    fn put_all<'a>(
        &'a self,
        name: &'a str,
        entries: Vec<CacheEntry>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let dir = self.ensure(name).await?;

            // 先全部写入临时文件，全部成功后再重命名
            let mut bodies: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(entries.len());
            let mut metas: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(entries.len());
            let written: Result<()> = async {
                for entry in &entries {
                    let digest = entry.key.digest();
                    let body_tmp = dir.join(format!("{digest}.body.tmp"));
                    bodies.push((body_tmp.clone(), dir.join(format!("{digest}.body"))));
                    fs::write(&body_tmp, &entry.response.body).await?;

                    let meta_tmp = dir.join(format!("{digest}.json.tmp"));
                    metas.push((meta_tmp.clone(), dir.join(format!("{digest}.json"))));
                    let content = serde_json::to_vec(&EntryMeta::from_entry(entry))?;
                    fs::write(&meta_tmp, content).await?;
                }
                Ok(())
            }
            .await;
            if let Err(err) = written {
                remove_staged(bodies.iter().chain(metas.iter())).await;
                return Err(err);
            }

            // 条目以 .json 是否存在为准，body 先落盘
            let staged = bodies.into_iter().chain(metas).collect::<Vec<_>>();
            for (i, (tmp, target)) in staged.iter().enumerate() {
                if let Err(err) = fs::rename(tmp, target).await {
                    warn!("Cache {} commit stopped at {:?}: {}", name, target, err);
                    remove_staged(&staged[i..]).await;
                    return Err(err.into());
                }
            }
            debug!("Cache {} stored {} entries", name, entries.len());
            Ok(())
        }
        .boxed()
    }

    fn match_request<'a>(
        &'a self,
        name: &'a str,
        key: &'a RequestKey,
    ) -> BoxFuture<'a, Result<Option<FetchResponse>>> {
        async move {
            let dir = self.cache_dir(name);
            let digest = key.digest();
            let Some(meta) = read_optional(&dir.join(format!("{digest}.json"))).await? else {
                return Ok(None);
            };
            let meta: EntryMeta = serde_json::from_slice(&meta)?;
            let Some(body) = read_optional(&dir.join(format!("{digest}.body"))).await? else {
                warn!("Cache {} entry {} has no body", name, key);
                return Ok(None);
            };
            Ok(Some(meta.into_response(body)?))
        }
        .boxed()
    }

    fn keys<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<RequestKey>>> {
        async move {
            let dir = self.cache_dir(name);
            let mut read_dir = match fs::read_dir(&dir).await {
                Ok(read_dir) => read_dir,
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
                Err(err) => return Err(err.into()),
            };

            let mut keys = vec![];
            while let Some(item) = read_dir.next_entry().await? {
                let file_name = item.file_name();
                let file_name = file_name.to_string_lossy();
                if file_name == DESCRIPTOR || !file_name.ends_with(".json") {
                    continue;
                }
                let meta: EntryMeta = serde_json::from_slice(&fs::read(item.path()).await?)?;
                keys.push(meta.key()?);
            }
            sort_keys(&mut keys);
            Ok(keys)
        }
        .boxed()
    }

    fn cache_names(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        async move {
            let mut read_dir = match fs::read_dir(&self.root).await {
                Ok(read_dir) => read_dir,
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
                Err(err) => return Err(err.into()),
            };

            let mut names = vec![];
            while let Some(item) = read_dir.next_entry().await? {
                let Some(content) = read_optional(&item.path().join(DESCRIPTOR)).await? else {
                    continue;
                };
                let descriptor: CacheDescriptor = serde_json::from_slice(&content)?;
                names.push(descriptor.name);
            }
            names.sort();
            Ok(names)
        }
        .boxed()
    }
}
