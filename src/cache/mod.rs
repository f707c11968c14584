use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;

use crate::{
    error::Result,
    fetch::{FetchResponse, RequestKey},
};

// 进程内存储
pub mod memory;
// 持久化存储
pub mod disk;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

/// 一条缓存记录
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: RequestKey,
    pub response: FetchResponse,
}

impl CacheEntry {
    pub fn new(key: RequestKey, response: FetchResponse) -> Self {
        Self {
            key,
            response: response.into_stored(),
        }
    }
}

/// 按名称区分的缓存存储
///
/// 缓存在第一次 `open` 或 `put_all` 时创建，之后不会被删除，
/// 只能通过更换缓存名来废弃旧内容。
pub trait CacheStorage: Send + Sync {
    /// 打开缓存，不存在时创建
    fn open<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>>;

    fn has<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// 写入一批记录，相同的键会被覆盖
    ///
    /// 任意一条写入失败时整批都不生效
    fn put_all<'a>(&'a self, name: &'a str, entries: Vec<CacheEntry>)
    -> BoxFuture<'a, Result<()>>;

    /// 查找请求对应的响应，未命中返回 `Ok(None)`
    fn match_request<'a>(
        &'a self,
        name: &'a str,
        key: &'a RequestKey,
    ) -> BoxFuture<'a, Result<Option<FetchResponse>>>;

    /// 列出缓存中的所有请求键，按 URL 排序
    fn keys<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<RequestKey>>>;

    fn cache_names(&self) -> BoxFuture<'_, Result<Vec<String>>>;
}

#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Memory,
    Disk,
}

/// 根据配置创建缓存存储
pub fn build_storage(storage: StorageType, dir: &str) -> Arc<dyn CacheStorage> {
    match storage {
        StorageType::Memory => Arc::new(MemoryStorage::new()),
        StorageType::Disk => Arc::new(DiskStorage::new(dir)),
    }
}

fn sort_keys(keys: &mut [RequestKey]) {
    keys.sort_by(|a, b| {
        a.url
            .as_str()
            .cmp(b.url.as_str())
            .then_with(|| a.method.as_str().cmp(b.method.as_str()))
    });
}
