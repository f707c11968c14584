use std::env;

pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const COMPILER: &str = env!("PRECACHE_COMPILER");
pub const OS: &str = env::consts::OS;
pub const ARCH: &str = env::consts::ARCH;

// config defaults
pub const LOG_LEVEL: &str = "info";
pub fn log_level() -> String {
    LOG_LEVEL.to_string()
}

pub const LOG_FOLDER: &str = "./logs";
pub fn log_folder() -> String {
    LOG_FOLDER.to_string()
}

/// 默认缓存名，修改资源清单时需要手动升级版本后缀
pub const CACHE_NAME: &str = "projectsite-cache-v1";
pub fn cache_name() -> String {
    CACHE_NAME.to_string()
}

pub const CACHE_DIR: &str = "./cache";
pub fn cache_dir() -> String {
    CACHE_DIR.to_string()
}

/// 预缓存资源清单
///
/// 最后一项空字符串会被解析为脚本地址本身
pub const ASSETS: [&str; 6] = [
    "/",
    "/static/css/plugins/bootstrap.min.css",
    "/static/js/plugins/bootstrap.min.js",
    "/static/js/component.js",
    "/static/js/pcoded.js",
    "",
];
pub fn assets() -> Vec<String> {
    ASSETS.map(|a| a.to_string()).to_vec()
}

pub const SCRIPT_PATH: &str = "/static/js/serviceworker.js";
pub fn script_path() -> String {
    SCRIPT_PATH.to_string()
}

pub const INSTALL_ATTEMPTS: u32 = 3;
pub fn install_attempts() -> u32 {
    INSTALL_ATTEMPTS
}

pub const INSTALL_RETRY_DELAY: u64 = 5;
pub fn install_retry_delay() -> u64 {
    INSTALL_RETRY_DELAY
}

pub const TIMEOUT_DEFAULT: u16 = 75;
pub fn timeout_default() -> u16 {
    TIMEOUT_DEFAULT
}

/// 响应来源头
pub const SOURCE_HEADER: &str = "x-precache-source";
pub const VERSION_HEADER: &str = "x-precache-version";
