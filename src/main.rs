use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use tracing::{debug, info};

use mimalloc::MiMalloc;

use precache::{
    application::{build_registration, handle_config_change, shutdown_application, spawn_install},
    cli::Cli,
    config::Settings,
    consts::{ARCH, COMPILER, NAME, OS, VERSION},
    http::{AppState, start_servers},
    utils::{init_logger, start_config_watcher},
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings = Settings::new(&args.config).with_context(|| "init config failed")?;

    let _guard = init_logger(settings.log_level.as_str(), settings.log_folder.as_str())
        .with_context(|| "init logger failed")?;

    debug!("settings {:?}", settings);
    info!("{}/{}", NAME, VERSION);
    info!("{}", COMPILER);
    info!("OS: {} {}", OS, ARCH);

    let runtime = tokio::runtime::Handle::current();
    let registration = build_registration(&settings).with_context(|| "init worker failed")?;
    spawn_install(registration.clone(), &settings, &runtime)
        .with_context(|| "register worker failed")?;

    let state = AppState::new(registration, settings.origin_url()?);
    let handles = start_servers(settings.host.clone(), state.clone()).await;

    // 启动配置文件监听
    let current = Mutex::new(settings);
    let stop_tx = start_config_watcher(&args.config, move |result| {
        handle_config_change(result, &current, &state, &runtime);
    })?;

    info!("Server started");

    tokio::signal::ctrl_c().await?;
    shutdown_application(handles, stop_tx).await;

    Ok(())
}
