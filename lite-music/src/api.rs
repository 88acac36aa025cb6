use axum::{Router, extract::DefaultBodyLimit};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

pub fn app_router(ctx: AppContext) -> Router {
    let body_limit = ctx.config.max_upload_bytes();
    Router::new()
        .nest("/music", crate::handler::music::music_router())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(ctx)
}

pub async fn serve(
    listener: TcpListener,
    ctx: AppContext,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let app = app_router(ctx);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;
    Ok(())
}

pub async fn start_api_server(
    ctx: AppContext,
    cancel: CancellationToken,
) -> anyhow::Result<JoinHandle<()>> {
    let bind = ctx.config.bind().to_string();
    let listener = TcpListener::bind(&bind)
        .await
        .map_err(|e| anyhow::anyhow!("bind {}: {}", bind, e))?;
    log::info!("API server started on {}", bind);

    Ok(tokio::spawn(async move {
        if let Err(e) = serve(listener, ctx, cancel).await {
            log::error!("Error running API server: {:#}", e);
        }
    }))
}

async fn shutdown_signal(cancel: CancellationToken) {
    cancel.cancelled().await;
    log::info!("Shutting down API server...");
}
