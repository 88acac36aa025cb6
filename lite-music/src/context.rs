use std::sync::Arc;

use music_bus::{
    encoder::{Encoder, FfmpegEncoder},
    orchestrator::Transcoder,
};
use music_db::store::AssetStore;

use crate::config::MusicConfig;

/// Everything a request handler needs, built once at startup and shared by
/// every route.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<MusicConfig>,
    pub store: Arc<dyn AssetStore>,
    pub transcoder: Arc<Transcoder>,
}

impl AppContext {
    pub fn new(config: MusicConfig, store: Arc<dyn AssetStore>, encoder: Arc<dyn Encoder>) -> Self {
        let transcoder = Transcoder::new(
            encoder,
            config.storage_dir(),
            config.max_concurrent_encodes(),
        );
        Self {
            config: Arc::new(config),
            store,
            transcoder: Arc::new(transcoder),
        }
    }

    /// Context backed by the ffmpeg binary named in the config.
    pub fn with_ffmpeg(config: MusicConfig, store: Arc<dyn AssetStore>) -> Self {
        let encoder = Arc::new(FfmpegEncoder::new(config.ffmpeg_path()));
        Self::new(config, store, encoder)
    }
}
