use std::collections::HashSet;

use url::Url;

use crate::{consts::ASSETS, error::Result};

/// 清单中需要提示的可疑条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    /// 空路径，会被解析为脚本地址本身
    Empty { index: usize },
    /// 与前面的条目解析到同一个 URL
    Duplicate { index: usize, url: Url },
}

/// 安装时预缓存的资源清单，顺序固定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    paths: Vec<String>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new(ASSETS.iter().map(|a| a.to_string()))
    }
}

impl Manifest {
    pub fn new(paths: impl IntoIterator<Item = String>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// 以脚本地址为基准解析所有条目
    ///
    /// 与浏览器的相对地址解析一致，空字符串得到脚本地址本身。
    pub fn resolve(&self, script_url: &Url) -> Result<Vec<Url>> {
        self.paths
            .iter()
            .map(|path| -> Result<Url> {
                let mut url = script_url.join(path)?;
                url.set_fragment(None);
                Ok(url)
            })
            .collect()
    }

    pub fn anomalies(&self, script_url: &Url) -> Result<Vec<Anomaly>> {
        let mut seen = HashSet::new();
        let mut found = vec![];
        for (index, (path, url)) in self
            .paths
            .iter()
            .zip(self.resolve(script_url)?)
            .enumerate()
        {
            if path.is_empty() {
                found.push(Anomaly::Empty { index });
            }
            if !seen.insert(url.clone()) {
                found.push(Anomaly::Duplicate { index, url });
            }
        }
        Ok(found)
    }
}
