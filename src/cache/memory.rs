use dashmap::DashMap;
use futures::{FutureExt, future::BoxFuture};

use super::{CacheEntry, CacheStorage, sort_keys};
use crate::{
    error::Result,
    fetch::{FetchResponse, RequestKey},
};

/// 进程内缓存存储，重启后丢失
#[derive(Debug, Default)]
pub struct MemoryStorage {
    caches: DashMap<String, DashMap<RequestKey, FetchResponse>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryStorage {
    fn open<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
        async move {
            self.caches.entry(name.to_string()).or_default();
            Ok(())
        }
        .boxed()
    }

    fn has<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool>> {
        async move { Ok(self.caches.contains_key(name)) }.boxed()
    }

    fn put_all<'a>(
        &'a self,
        name: &'a str,
        entries: Vec<CacheEntry>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let cache = self.caches.entry(name.to_string()).or_default();
            for entry in entries {
                cache.insert(entry.key, entry.response);
            }
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
            let Some(cache) = self.caches.get(name) else {
                return Ok(None);
            };
            let found = cache.get(key).map(|res| res.value().clone());
            Ok(found)
        }
        .boxed()
    }

    fn keys<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<RequestKey>>> {
        async move {
            let Some(cache) = self.caches.get(name) else {
                return Ok(vec![]);
            };
            let mut keys = cache.iter().map(|e| e.key().clone()).collect::<Vec<_>>();
            sort_keys(&mut keys);
            Ok(keys)
        }
        .boxed()
    }

    fn cache_names(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        async move {
            let mut names = self
                .caches
                .iter()
                .map(|e| e.key().clone())
                .collect::<Vec<_>>();
            names.sort();
            Ok(names)
        }
        .boxed()
    }
}
