use std::{
    path::Path,
    sync::mpsc,
    time::{Duration, Instant},
};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher, event::ModifyKind};
use tracing::{error, info};

use crate::{config::Settings, error::Result};

/// 两次重新加载之间的最小间隔
const DEBOUNCE: Duration = Duration::from_millis(500);

/// 启动配置文件监听
///
/// 文件变化后重新读取配置并交给 `callback`，读取失败时同样回调，由调用方决定如何处理。
///
/// # 返回值
///
/// 返回一个发送器，发送 `()` 或 drop 后停止监听
pub fn start_config_watcher(
    config_path: impl AsRef<Path>,
    callback: impl Fn(Result<Settings>) + Send + 'static,
) -> Result<mpsc::Sender<()>, notify::Error> {
    let (stop_tx, stop_rx) = mpsc::channel();
    let (event_tx, event_rx) = mpsc::channel();
    let config_path = config_path.as_ref().to_owned();

    let mut watcher = notify::recommended_watcher(event_tx)?;
    watcher.watch(&config_path, RecursiveMode::NonRecursive)?;
    info!("Watching config file: {:?}", config_path);

    std::thread::spawn(move || {
        watch_loop(watcher, &config_path, event_rx, stop_rx, callback);
    });

    Ok(stop_tx)
}

fn watch_loop(
    mut watcher: RecommendedWatcher,
    config_path: &Path,
    event_rx: mpsc::Receiver<notify::Result<notify::Event>>,
    stop_rx: mpsc::Receiver<()>,
    callback: impl Fn(Result<Settings>),
) {
    let mut last_reload: Option<Instant> = None;

    loop {
        match stop_rx.try_recv() {
            Ok(()) | Err(mpsc::TryRecvError::Disconnected) => {
                info!("Stopping config watcher");
                break;
            }
            Err(mpsc::TryRecvError::Empty) => {}
        }

        let event = match event_rx.recv_timeout(Duration::from_secs(1)) {
            Ok(Ok(event)) => event,
            Ok(Err(e)) => {
                error!("Watch error: {:?}", e);
                continue;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                error!("Watcher channel disconnected");
                break;
            }
        };

        if matches!(event.kind, EventKind::Access(_)) {
            continue;
        }
        let now = Instant::now();
        if last_reload.is_some_and(|last| now.duration_since(last) < DEBOUNCE) {
            continue;
        }
        last_reload = Some(now);
        info!("Config file event: {:?}", event.kind);

        // 编辑器替换文件后原来的 watch 会失效
        if matches!(
            event.kind,
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
        ) {
            let _ = watcher.unwatch(config_path);
            if let Err(e) = watcher.watch(config_path, RecursiveMode::NonRecursive) {
                error!("Failed to re-watch config file: {:?}", e);
            }
        }

        match config_path.to_str() {
            Some(path) => callback(Settings::new(path)),
            None => error!("Config path is not valid utf-8: {:?}", config_path),
        }
    }

    if let Err(e) = watcher.unwatch(config_path) {
        error!("Failed to unwatch config file: {:?}", e);
    }
}
