use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use music_db::asset::{AudioAsset, NewAudioAsset};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::{context::AppContext, handler::ApiError};

/// Accepted declared media types and the source extension each maps to.
pub const ALLOWED_MEDIA_TYPES: [(&str, &str); 6] = [
    ("audio/mpeg", ".mp3"),
    ("audio/x-mpeg", ".mp3"),
    ("audio/wav", ".wav"),
    ("audio/x-wav", ".wav"),
    ("audio/flac", ".flac"),
    ("audio/x-flac", ".flac"),
];

/// Upload rejected before any transcode job started.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("unsupported media type '{0}', only MP3, WAVE and FLAC are allowed")]
    UnsupportedMediaType(String),
    #[error("no file uploaded")]
    MissingFile,
    #[error("exactly one file may be uploaded")]
    MultipleFiles,
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("field '{0}' must not be empty")]
    EmptyField(&'static str),
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("malformed multipart body: {0}")]
    Multipart(String),
    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Source extension for a declared media type, ignoring parameters and case.
pub fn source_ext_for(media_type: &str) -> Option<&'static str> {
    let essence = media_type.split(';').next().unwrap_or("").trim();
    ALLOWED_MEDIA_TYPES
        .iter()
        .find(|(mime, _)| mime.eq_ignore_ascii_case(essence))
        .map(|(_, ext)| *ext)
}

/// Temp file of an upload that has not been handed to a batch yet.
/// Intake failures call [`TempUpload::discard`]; dropping an armed guard
/// (cancelled request) schedules the removal on the runtime.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
    armed: bool,
}

impl TempUpload {
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Gives up ownership of the file; the caller must remove it.
    pub fn release(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }

    pub async fn discard(self) {
        remove_upload(self.release()).await;
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(remove_upload(path));
            }
            Err(_) => {
                if let Err(e) = std::fs::remove_file(&path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        log::warn!("remove upload {} failed: {}", path.display(), e);
                    }
                }
            }
        }
    }
}

async fn remove_upload(path: PathBuf) {
    if let Err(e) = tokio::fs::remove_file(&path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("remove upload {} failed: {}", path.display(), e);
        }
    }
}

/// A validated upload: well-typed metadata plus the stored source file.
#[derive(Debug)]
pub struct UploadForm {
    pub id: Uuid,
    pub name: String,
    pub author: String,
    pub source_ext: &'static str,
    pub source: TempUpload,
}

impl UploadForm {
    pub fn stem(&self) -> String {
        self.id.simple().to_string()
    }
}

/// Reads `file`, `name` and `author` from the multipart body. The file's
/// media type is checked before anything is written to disk.
pub async fn read_upload(
    multipart: &mut Multipart,
    upload_dir: &Path,
) -> Result<UploadForm, IntakeError> {
    let id = Uuid::new_v4();
    let mut source = None;
    let fields = read_fields(multipart, upload_dir, id, &mut source).await;

    match (fields, source) {
        (Ok((name, author)), Some((source, source_ext))) => Ok(UploadForm {
            id,
            name,
            author,
            source_ext,
            source,
        }),
        (Ok(_), None) => Err(IntakeError::MissingFile),
        (Err(e), Some((source, _))) => {
            source.discard().await;
            Err(e)
        }
        (Err(e), None) => Err(e),
    }
}

/// Stores the file part into `source` as soon as it is created, so the
/// caller can remove it whatever fails afterwards.
async fn read_fields(
    multipart: &mut Multipart,
    upload_dir: &Path,
    id: Uuid,
    source: &mut Option<(TempUpload, &'static str)>,
) -> Result<(String, String), IntakeError> {
    let mut name = None;
    let mut author = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| IntakeError::Multipart(e.body_text()))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                if source.is_some() {
                    return Err(IntakeError::MultipleFiles);
                }
                let media_type = field.content_type().unwrap_or_default().to_string();
                let ext = source_ext_for(&media_type)
                    .ok_or_else(|| IntakeError::UnsupportedMediaType(media_type.clone()))?;

                let upload = TempUpload::new(upload_dir.join(format!("{}.upload", id.simple())));
                let path = upload.path().to_path_buf();
                *source = Some((upload, ext));

                let mut file = tokio::fs::File::create(&path).await?;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| IntakeError::Multipart(e.body_text()))?
                {
                    file.write_all(&chunk).await?;
                }
                file.flush().await?;
                log::debug!(
                    "upload {}: stored {:?} ({}) at {}",
                    id,
                    field.file_name(),
                    media_type,
                    path.display()
                );
            }
            "name" => name = Some(text_field(field, "name").await?),
            "author" => author = Some(text_field(field, "author").await?),
            _ => return Err(IntakeError::UnknownField(field_name)),
        }
    }

    Ok((
        name.ok_or(IntakeError::MissingField("name"))?,
        author.ok_or(IntakeError::MissingField("author"))?,
    ))
}

async fn text_field(
    field: axum::extract::multipart::Field<'_>,
    key: &'static str,
) -> Result<String, IntakeError> {
    let value = field
        .text()
        .await
        .map_err(|e| IntakeError::Multipart(e.body_text()))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(IntakeError::EmptyField(key));
    }
    Ok(value.to_string())
}

/// Transcodes the upload and persists the asset once the whole ladder exists.
///
/// The work runs on its own task so it completes (commit or rollback) even if
/// the caller stops waiting.
pub async fn ingest(ctx: &AppContext, form: UploadForm) -> Result<AudioAsset, ApiError> {
    let stem = form.stem();
    let UploadForm {
        id,
        name,
        author,
        source_ext,
        source,
    } = form;
    let store = ctx.store.clone();
    let transcoder = ctx.transcoder.clone();
    let source = source.release();

    let task = tokio::spawn(async move {
        let report = transcoder.submit_batch(source, &stem, source_ext).wait().await;
        if !report.is_success() {
            return Err(ApiError::Transcode(report.failure_summary()));
        }

        let create = NewAudioAsset {
            name,
            author,
            filename: stem,
            filetype: source_ext.to_string(),
        };
        match store.insert(&create).await {
            Ok(asset) => {
                log::info!(
                    "upload {}: asset {} '{}' stored as {}",
                    id,
                    asset.id,
                    asset.name,
                    asset.filename
                );
                Ok(asset)
            }
            Err(e) => {
                let removed = report.discard().await;
                log::error!(
                    "upload {}: persist failed, removed {} variant files",
                    id,
                    removed
                );
                Err(ApiError::Internal(e.context("persist asset")))
            }
        }
    });

    task.await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("ingest task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list() {
        assert_eq!(source_ext_for("audio/mpeg"), Some(".mp3"));
        assert_eq!(source_ext_for("audio/x-mpeg"), Some(".mp3"));
        assert_eq!(source_ext_for("audio/wav"), Some(".wav"));
        assert_eq!(source_ext_for("audio/x-wav"), Some(".wav"));
        assert_eq!(source_ext_for("AUDIO/FLAC"), Some(".flac"));
        assert_eq!(source_ext_for("audio/x-flac; foo=bar"), Some(".flac"));
        assert_eq!(source_ext_for("audio/ogg"), None);
        assert_eq!(source_ext_for("video/mp4"), None);
        assert_eq!(source_ext_for(""), None);
    }

    #[test]
    fn test_temp_upload_guard() {
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("dropped.upload");
        std::fs::write(&path, b"x").unwrap();
        drop(TempUpload::new(path.clone()));
        assert!(!path.exists());

        let path = dir.path().join("released.upload");
        std::fs::write(&path, b"x").unwrap();
        let released = TempUpload::new(path.clone()).release();
        assert_eq!(released, path);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_temp_upload_discard() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("failed.upload");
        tokio::fs::write(&path, b"x").await?;

        TempUpload::new(path.clone()).discard().await;
        assert!(!path.exists());

        // already gone is not an error
        TempUpload::new(path.clone()).discard().await;
        Ok(())
    }
}
