use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::Response,
    routing::get,
};
use music_db::asset::AudioAsset;
use serde::{Deserialize, Serialize};

use crate::{
    context::AppContext,
    delivery, intake,
    handler::{ApiError, ApiJsonResult, ApiResult},
};

pub fn music_router() -> Router<AppContext> {
    Router::new()
        .route("/", get(list_music).post(upload_music))
        .route("/stream/{name}", get(stream_music))
        .route("/{id}", get(get_music).delete(delete_music))
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    quality: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    deleted: bool,
}

async fn list_music(State(ctx): State<AppContext>) -> ApiJsonResult<Vec<AudioAsset>> {
    Ok(Json(ctx.store.list().await?))
}

async fn get_music(State(ctx): State<AppContext>, Path(id): Path<i64>) -> ApiJsonResult<AudioAsset> {
    ctx.store
        .find(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::AssetNotFound(id.to_string()))
}

async fn upload_music(
    State(ctx): State<AppContext>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<AudioAsset>)> {
    let form = intake::read_upload(&mut multipart, ctx.config.upload_dir()).await?;
    log::info!(
        "upload {}: '{}' by '{}' ({})",
        form.id,
        form.name,
        form.author,
        form.source_ext
    );
    let asset = intake::ingest(&ctx, form).await?;
    Ok((StatusCode::CREATED, Json(asset)))
}

async fn stream_music(
    State(ctx): State<AppContext>,
    Path(name): Path<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let resolved = delivery::resolve_variant(&ctx, &name, query.quality.as_deref()).await?;
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());
    delivery::stream_variant(&resolved, range).await
}

/// Drops the record first so the ladder stops being advertised, then the files.
async fn delete_music(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> ApiJsonResult<DeleteResponse> {
    let asset = ctx
        .store
        .find(id)
        .await?
        .ok_or_else(|| ApiError::AssetNotFound(id.to_string()))?;
    if !ctx.store.delete(id).await? {
        return Err(ApiError::AssetNotFound(id.to_string()));
    }
    let removed = ctx.transcoder.purge(&asset.filename, &asset.filetype).await;
    log::info!("asset {} '{}' deleted, {} files removed", id, asset.name, removed);
    Ok(Json(DeleteResponse { deleted: true }))
}
