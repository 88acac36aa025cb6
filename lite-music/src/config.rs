use std::path::{Path, PathBuf};

const DEFAULT_BIND: &str = "0.0.0.0:3000";
const DEFAULT_DB_URL: &str = "music.db";
const DEFAULT_STORAGE_DIR: &str = "static/music";
const DEFAULT_UPLOAD_DIR: &str = "static/music/tmp";
const DEFAULT_FFMPEG: &str = "ffmpeg";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct MusicConfig {
    bind: String,
    db_url: String,
    storage_dir: PathBuf,
    upload_dir: PathBuf,
    ffmpeg_path: String,
    max_upload_bytes: usize,
    max_concurrent_encodes: usize,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            db_url: DEFAULT_DB_URL.to_string(),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            ffmpeg_path: DEFAULT_FFMPEG.to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_concurrent_encodes: default_encodes(),
        }
    }
}

impl MusicConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from a key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(v) = lookup("MUSIC_BIND") {
            config.bind = v;
        }
        if let Some(v) = lookup("MUSIC_DB_URL") {
            config.db_url = v;
        }
        if let Some(v) = lookup("MUSIC_STORAGE_DIR") {
            config.storage_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("MUSIC_UPLOAD_DIR") {
            config.upload_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FFMPEG_PATH") {
            config.ffmpeg_path = v;
        }
        if let Some(v) = lookup("MUSIC_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = parse_or("MUSIC_MAX_UPLOAD_BYTES", &v, config.max_upload_bytes);
        }
        if let Some(v) = lookup("MUSIC_MAX_CONCURRENT_ENCODES") {
            config.max_concurrent_encodes =
                parse_or("MUSIC_MAX_CONCURRENT_ENCODES", &v, config.max_concurrent_encodes).max(1);
        }
        config
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = dir.into();
        self
    }

    pub fn with_max_upload_bytes(mut self, max: usize) -> Self {
        self.max_upload_bytes = max;
        self
    }

    pub fn bind(&self) -> &str {
        &self.bind
    }

    pub fn db_url(&self) -> &str {
        &self.db_url
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn ffmpeg_path(&self) -> &str {
        &self.ffmpeg_path
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub fn max_concurrent_encodes(&self) -> usize {
        self.max_concurrent_encodes
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.storage_dir)?;
        std::fs::create_dir_all(&self.upload_dir)
    }
}

fn default_encodes() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}

fn parse_or(key: &str, value: &str, default: usize) -> usize {
    match value.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            log::warn!("{}={:?} is not a number, using {}", key, value, default);
            default
        }
    }
}
