use std::sync::Arc;

use lite_music::{api, config::MusicConfig, context::AppContext};
use music_db::db::{DatabaseConfig, MusicDatabase};
use tokio_util::sync::CancellationToken;

fn init_logging() {
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .default_filter_or("info,lite_music=debug,music_bus=debug,music_db=info"),
    )
    .init();
}

#[tokio::main]
async fn main() -> ! {
    init_logging();
    let config = MusicConfig::from_env();
    if let Err(e) = config.ensure_dirs() {
        log::error!("Error creating storage directories: {}", e);
        std::process::exit(1);
    }

    match music_bus::init(config.ffmpeg_path()).await {
        Ok(version) => log::info!("encoder: {}", version),
        Err(e) => log::warn!("encoder unavailable, uploads will fail: {:#}", e),
    }

    let db = MusicDatabase::open(&DatabaseConfig::new(config.db_url()))
        .await
        .unwrap_or_else(|e| {
            log::error!("Error opening database: {:#}", e);
            std::process::exit(1);
        });

    let ctx = AppContext::with_ffmpeg(config, Arc::new(db));
    let cancel = CancellationToken::new();

    let server = api::start_api_server(ctx, cancel.clone())
        .await
        .unwrap_or_else(|e| {
            log::error!("Error starting API server: {:#}", e);
            std::process::exit(1);
        });

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            },
        }
    }

    let _ = server.await;
    std::process::exit(0);
}
