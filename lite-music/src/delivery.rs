use std::{
    io::{self, ErrorKind, SeekFrom},
    path::PathBuf,
    pin::Pin,
    task::{Context, Poll, ready},
};

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use futures::Stream;
use music_bus::variant::{Variant, normalize_ext, spec_for};
use music_db::asset::AudioAsset;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, Take},
};
use tokio_util::io::ReaderStream;

use crate::{context::AppContext, handler::ApiError};

/// A variant file chosen for a stream request.
#[derive(Debug, Clone)]
pub struct ResolvedVariant {
    pub asset: AudioAsset,
    pub variant: Variant,
    pub path: PathBuf,
    pub content_type: &'static str,
}

/// `audio/mpeg` for re-encoded variants; lossless keeps the source container.
pub fn content_type(variant: Variant, source_ext: &str) -> &'static str {
    if variant != Variant::Lossless {
        return "audio/mpeg";
    }
    match normalize_ext(source_ext).as_str() {
        ".wav" => "audio/wav",
        ".flac" => "audio/flac",
        _ => "audio/mpeg",
    }
}

pub async fn resolve_variant(
    ctx: &AppContext,
    name: &str,
    quality: Option<&str>,
) -> Result<ResolvedVariant, ApiError> {
    let asset = ctx
        .store
        .find_by_name(name)
        .await?
        .ok_or_else(|| ApiError::AssetNotFound(name.to_string()))?;

    let variant = Variant::from_quality(quality);
    let not_found = || ApiError::VariantNotFound {
        name: name.to_string(),
        quality: variant.to_string(),
    };

    if !spec_for(variant).applies_to(&asset.filetype) {
        return Err(not_found());
    }
    let path = ctx
        .transcoder
        .variant_path(&asset.filename, variant, &asset.filetype);
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Err(not_found()),
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(ApiError::Internal(e.into())),
    }

    Ok(ResolvedVariant {
        content_type: content_type(variant, &asset.filetype),
        asset,
        variant,
        path,
    })
}

/// Byte span requested by a `Range` header, resolved against the file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    Full,
    /// Inclusive bounds.
    Partial { start: u64, end: u64 },
    Unsatisfiable,
}

/// Single-range `bytes=` specs only. Malformed or multi-range headers yield
/// `Full`, which HTTP allows.
pub fn parse_range(header: Option<&str>, size: u64) -> RangeRequest {
    let Some(ranges) = header.and_then(|h| h.trim().strip_prefix("bytes=")) else {
        return RangeRequest::Full;
    };
    if ranges.contains(',') {
        return RangeRequest::Full;
    }
    let Some((first, last)) = ranges.trim().split_once('-') else {
        return RangeRequest::Full;
    };
    let (first, last) = (first.trim(), last.trim());

    if first.is_empty() {
        // suffix: last n bytes
        let Ok(n) = last.parse::<u64>() else {
            return RangeRequest::Full;
        };
        if n == 0 || size == 0 {
            return RangeRequest::Unsatisfiable;
        }
        return RangeRequest::Partial {
            start: size.saturating_sub(n),
            end: size - 1,
        };
    }

    let Ok(start) = first.parse::<u64>() else {
        return RangeRequest::Full;
    };
    let end = if last.is_empty() {
        u64::MAX
    } else {
        match last.parse::<u64>() {
            Ok(end) if end >= start => end,
            _ => return RangeRequest::Full,
        }
    };
    if start >= size {
        return RangeRequest::Unsatisfiable;
    }
    RangeRequest::Partial {
        start,
        end: end.min(size - 1),
    }
}

/// Streams exactly `remaining` bytes. If the file yields fewer, the stream
/// ends with an error so the connection is aborted instead of left waiting.
pub struct SpanStream {
    inner: ReaderStream<Take<File>>,
    remaining: u64,
    done: bool,
}

impl SpanStream {
    pub fn new(file: File, len: u64) -> Self {
        Self {
            inner: ReaderStream::new(file.take(len)),
            remaining: len,
            done: false,
        }
    }
}

impl Stream for SpanStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
            Some(Ok(chunk)) => {
                this.remaining = this.remaining.saturating_sub(chunk.len() as u64);
                Poll::Ready(Some(Ok(chunk)))
            }
            Some(Err(e)) => {
                log::warn!("stream read failed: {}", e);
                this.done = true;
                Poll::Ready(Some(Err(e)))
            }
            None if this.remaining > 0 => {
                log::warn!("stream ended {} bytes short", this.remaining);
                this.done = true;
                Poll::Ready(Some(Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("file ended {} bytes early", this.remaining),
                ))))
            }
            None => {
                this.done = true;
                Poll::Ready(None)
            }
        }
    }
}

/// Builds the full (200) or partial (206) response for a resolved variant.
pub async fn stream_variant(
    resolved: &ResolvedVariant,
    range: Option<&str>,
) -> Result<Response, ApiError> {
    let not_found = || ApiError::VariantNotFound {
        name: resolved.asset.name.clone(),
        quality: resolved.variant.to_string(),
    };
    let mut file = match File::open(&resolved.path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found()),
        Err(e) => return Err(ApiError::Internal(e.into())),
    };
    let size = file
        .metadata()
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .len();

    let (status, start, len) = match parse_range(range, size) {
        RangeRequest::Full => (StatusCode::OK, 0, size),
        RangeRequest::Partial { start, end } => (StatusCode::PARTIAL_CONTENT, start, end - start + 1),
        RangeRequest::Unsatisfiable => return Err(ApiError::RangeNotSatisfiable { size }),
    };
    if start > 0 {
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
    }

    log::info!(
        "stream '{}' {} [{}..{}) of {}",
        resolved.asset.name,
        resolved.variant,
        start,
        start + len,
        size
    );

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, resolved.content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, len)
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0");
    if status == StatusCode::PARTIAL_CONTENT {
        let value = format!("bytes {}-{}/{}", start, start + len - 1, size);
        builder = builder.header(
            header::CONTENT_RANGE,
            HeaderValue::from_str(&value).map_err(|e| ApiError::Internal(e.into()))?,
        );
    }

    builder
        .body(Body::from_stream(SpanStream::new(file, len)))
        .map_err(|e| ApiError::Internal(e.into()))
}

#[cfg(test)]
#[path = "delivery_test.rs"]
mod delivery_test;
