use std::fs;

use serde::Deserialize;
use url::Url;

use crate::{
    cache::StorageType,
    consts::{
        assets, cache_dir, cache_name, install_attempts, install_retry_delay, log_folder,
        log_level, script_path, timeout_default,
    },
    error::{Error, Result},
};

/// 源站配置
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SettingOrigin {
    /// 源站地址，只使用 scheme 和 authority
    pub url: String,
    /// worker 脚本路径，清单中的相对路径以它为基准
    #[serde(default = "script_path")]
    pub script: String,
    /// 请求源站的超时时间（秒）
    #[serde(default = "timeout_default")]
    pub timeout: u16,
}

/// 缓存配置
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SettingCache {
    /// 缓存名，修改 assets 时需要一起修改
    #[serde(default = "cache_name")]
    pub name: String,
    #[serde(default)]
    pub storage: StorageType,
    /// 磁盘存储根目录
    #[serde(default = "cache_dir")]
    pub dir: String,
    /// 预缓存资源清单
    #[serde(default = "assets")]
    pub assets: Vec<String>,
    #[serde(default = "install_attempts")]
    pub install_attempts: u32,
    /// 安装重试间隔（秒）
    #[serde(default = "install_retry_delay")]
    pub install_retry_delay: u64,
}

impl Default for SettingCache {
    fn default() -> Self {
        Self {
            name: cache_name(),
            storage: StorageType::default(),
            dir: cache_dir(),
            assets: assets(),
            install_attempts: install_attempts(),
            install_retry_delay: install_retry_delay(),
        }
    }
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SettingHost {
    pub ip: String,
    pub port: u16,
    /// 请求处理超时时间（秒）
    #[serde(default = "timeout_default")]
    pub timeout: u16,
}

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    #[serde(default = "log_level")]
    pub log_level: String,
    #[serde(default = "log_folder")]
    pub log_folder: String,
    pub origin: SettingOrigin,
    #[serde(default)]
    pub cache: SettingCache,
    pub host: Vec<SettingHost>,
}

impl Settings {
    /// 读取并校验配置文件
    pub fn new(path: &str) -> Result<Self> {
        let file = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&file)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        let origin = self.origin_url()?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "origin must be http or https: {}",
                self.origin.url
            )));
        }
        if self.host.is_empty() {
            return Err(Error::Config("at least one host is required".to_string()));
        }
        if self.cache.name.trim().is_empty() {
            return Err(Error::Config("cache name can not be empty".to_string()));
        }
        self.script_url()?;
        Ok(())
    }

    pub fn origin_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.origin.url)?)
    }

    /// worker 脚本地址
    pub fn script_url(&self) -> Result<Url> {
        Ok(self.origin_url()?.join(&self.origin.script)?)
    }

    /// 重新加载后是否需要注册新的 worker 版本
    pub fn worker_changed(&self, other: &Settings) -> bool {
        self.cache != other.cache
            || self.origin.url != other.origin.url
            || self.origin.script != other.origin.script
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{ASSETS, CACHE_NAME};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn load(content: &str) -> Result<Settings> {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{content}").unwrap();
        Settings::new(file.path().to_str().unwrap())
    }

    #[test]
    fn test_default_cache_config() {
        let settings = load(
            r#"
            [origin]
            url = "http://127.0.0.1:8000"

            [[host]]
            ip = "127.0.0.1"
            port = 8080
            "#,
        )
        .unwrap();

        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.cache.name, CACHE_NAME);
        assert_eq!(settings.cache.storage, StorageType::Memory);
        assert_eq!(settings.cache.assets, ASSETS.map(String::from).to_vec());
        assert_eq!(settings.cache.install_attempts, 3);
        assert_eq!(settings.origin.timeout, 75);
        assert_eq!(settings.host[0].timeout, 75);
        assert_eq!(
            settings.script_url().unwrap().as_str(),
            "http://127.0.0.1:8000/static/js/serviceworker.js"
        );
    }

    #[test]
    fn test_custom_cache_config() {
        let settings = load(
            r#"
            log_level = "debug"

            [origin]
            url = "https://example.com"
            script = "/sw.js"
            timeout = 10

            [cache]
            name = "projectsite-cache-v2"
            storage = "disk"
            dir = "/tmp/precache"
            assets = ["/", "/app.css"]

            [[host]]
            ip = "0.0.0.0"
            port = 80
            "#,
        )
        .unwrap();

        assert_eq!(settings.cache.name, "projectsite-cache-v2");
        assert_eq!(settings.cache.storage, StorageType::Disk);
        assert_eq!(settings.cache.assets, vec!["/", "/app.css"]);
        assert_eq!(settings.origin.timeout, 10);
        assert_eq!(
            settings.script_url().unwrap().as_str(),
            "https://example.com/sw.js"
        );
    }

    #[test]
    fn test_invalid_origin() {
        let result = load(
            r#"
            [origin]
            url = "ftp://example.com"

            [[host]]
            ip = "127.0.0.1"
            port = 8080
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));

        let result = load(
            r#"
            [origin]
            url = "not a url"

            [[host]]
            ip = "127.0.0.1"
            port = 8080
            "#,
        );
        assert!(matches!(result, Err(Error::Url(_))));
    }

    #[test]
    fn test_missing_host() {
        let result = load(
            r#"
            host = []

            [origin]
            url = "http://127.0.0.1:8000"
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_worker_changed() {
        let content = r#"
            [origin]
            url = "http://127.0.0.1:8000"

            [[host]]
            ip = "127.0.0.1"
            port = 8080
            "#;
        let settings = load(content).unwrap();
        let mut other = settings.clone();
        other.log_level = "debug".to_string();
        assert!(!settings.worker_changed(&other));

        other.cache.name = "projectsite-cache-v2".to_string();
        assert!(settings.worker_changed(&other));
    }
}
