pub mod asset;
pub mod db;
pub mod kv;
pub mod migrations;
pub mod store;
