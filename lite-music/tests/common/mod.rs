#![allow(dead_code)]

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicI64, Ordering},
    },
};

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use futures::future::BoxFuture;
use http_body_util::BodyExt;
use lite_music::{api::app_router, config::MusicConfig, context::AppContext};
use music_bus::encoder::Encoder;
use music_db::{
    asset::{AudioAsset, NewAudioAsset},
    store::AssetStore,
};
use serde_json::Value;
use tempfile::TempDir;

pub const BOUNDARY: &str = "lite-music-test-boundary";

/// In-memory asset store; ids grow like a rowid.
#[derive(Default)]
pub struct MemoryStore {
    assets: Mutex<Vec<AudioAsset>>,
    next_id: AtomicI64,
    fail_inserts: bool,
}

impl MemoryStore {
    pub fn failing() -> Self {
        Self {
            fail_inserts: true,
            ..Default::default()
        }
    }
}

impl AssetStore for MemoryStore {
    fn insert<'a>(&'a self, create: &'a NewAudioAsset) -> BoxFuture<'a, anyhow::Result<AudioAsset>> {
        Box::pin(async move {
            if self.fail_inserts {
                anyhow::bail!("database is locked");
            }
            let asset = AudioAsset {
                id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
                name: create.name.clone(),
                author: create.author.clone(),
                filename: create.filename.clone(),
                filetype: create.filetype.clone(),
                created_at: None,
            };
            self.assets.lock().unwrap().push(asset.clone());
            Ok(asset)
        })
    }

    fn find(&self, id: i64) -> BoxFuture<'_, anyhow::Result<Option<AudioAsset>>> {
        Box::pin(async move {
            Ok(self
                .assets
                .lock()
                .unwrap()
                .iter()
                .find(|a| a.id == id)
                .cloned())
        })
    }

    fn find_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Option<AudioAsset>>> {
        Box::pin(async move {
            Ok(self
                .assets
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|a| a.name == name)
                .cloned())
        })
    }

    fn delete(&self, id: i64) -> BoxFuture<'_, anyhow::Result<bool>> {
        Box::pin(async move {
            let mut assets = self.assets.lock().unwrap();
            let before = assets.len();
            assets.retain(|a| a.id != id);
            Ok(assets.len() != before)
        })
    }

    fn list(&self) -> BoxFuture<'_, anyhow::Result<Vec<AudioAsset>>> {
        Box::pin(async move {
            let mut assets = self.assets.lock().unwrap().clone();
            assets.reverse();
            Ok(assets)
        })
    }
}

/// Writes `"<kbps>k:" + source` instead of running ffmpeg.
#[derive(Default)]
pub struct FakeEncoder {
    fail_kbps: HashSet<u32>,
}

impl FakeEncoder {
    pub fn failing(kbps: u32) -> Self {
        Self {
            fail_kbps: HashSet::from([kbps]),
        }
    }
}

impl Encoder for FakeEncoder {
    fn encode<'a>(
        &'a self,
        source: &'a Path,
        dest: &'a Path,
        bitrate_kbps: u32,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            if self.fail_kbps.contains(&bitrate_kbps) {
                tokio::fs::write(dest, b"partial").await?;
                anyhow::bail!("encoder exited with status 1");
            }
            let mut out = format!("{}k:", bitrate_kbps).into_bytes();
            out.extend(tokio::fs::read(source).await?);
            tokio::fs::write(dest, out).await?;
            Ok(())
        })
    }
}

pub struct TestApp {
    pub dir: TempDir,
    pub ctx: AppContext,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(FakeEncoder::default(), MemoryStore::default())
    }

    pub fn build(encoder: FakeEncoder, store: MemoryStore) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = MusicConfig::default()
            .with_storage_dir(dir.path().join("music"))
            .with_upload_dir(dir.path().join("tmp"));
        config.ensure_dirs().unwrap();

        let store = Arc::new(store);
        let ctx = AppContext::new(config, store.clone(), Arc::new(encoder));
        Self { dir, ctx, store }
    }

    pub fn router(&self) -> Router {
        app_router(self.ctx.clone())
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.dir.path().join("music")
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.dir.path().join("tmp")
    }

    /// Sorted file names currently in the storage directory.
    pub fn stored_files(&self) -> Vec<String> {
        list_dir(&self.storage_dir())
    }

    pub fn upload_files(&self) -> Vec<String> {
        list_dir(&self.upload_dir())
    }
}

fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// One multipart part.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        file_name: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend(format!("--{}\r\n", BOUNDARY).into_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .into_bytes(),
                );
                body.extend(value.as_bytes());
            }
            Part::File {
                file_name,
                content_type,
                data,
            } => {
                body.extend(
                    format!(
                        "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
                         Content-Type: {}\r\n\r\n",
                        file_name, content_type
                    )
                    .into_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend(b"\r\n");
    }
    body.extend(format!("--{}--\r\n", BOUNDARY).into_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

/// Standard upload form: name, author and one file.
pub fn upload_form(name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    multipart_body(&[
        Part::Text("name", name),
        Part::Text("author", "tester"),
        Part::File {
            file_name: "track.bin",
            content_type,
            data,
        },
    ])
}

pub fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/music")
        .header(header::CONTENT_TYPE, multipart_content_type())
        .body(Body::from(body))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
