//! Upload, transcode and stream service for a personal music library.

pub mod api;
pub mod config;
pub mod context;
pub mod delivery;
pub mod handler;
pub mod intake;
