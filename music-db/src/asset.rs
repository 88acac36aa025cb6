use serde::{Deserialize, Serialize};
use turso::Connection;

/// Persisted metadata of an uploaded track. Only written once every variant
/// of its ladder exists on disk.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioAsset {
    pub id: i64,
    pub name: String,
    pub author: String,
    /// Canonical filename stem shared by all variant files.
    pub filename: String,
    /// Source extension with leading dot, e.g. `.flac`.
    pub filetype: String,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAudioAsset {
    pub name: String,
    pub author: String,
    pub filename: String,
    pub filetype: String,
}

const MODULE_NAME: &str = "music";

pub async fn query_all(conn: &Connection) -> anyhow::Result<Vec<AudioAsset>> {
    let kvs = crate::kv::by_module(MODULE_NAME, conn).await?;
    let mut assets = Vec::with_capacity(kvs.len());
    for kv in kvs {
        let Some(json) = kv.value else { continue };
        match serde_json::from_str::<AudioAsset>(&json) {
            Ok(mut asset) => {
                asset.id = kv.id;
                assets.push(asset);
            }
            Err(e) => log::warn!("skip malformed asset row {}: {}", kv.id, e),
        }
    }
    Ok(assets)
}

pub async fn insert(create: &NewAudioAsset, conn: &Connection) -> anyhow::Result<AudioAsset> {
    let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let asset = AudioAsset {
        id: 0, // replaced by the row id
        name: create.name.clone(),
        author: create.author.clone(),
        filename: create.filename.clone(),
        filetype: create.filetype.clone(),
        created_at: Some(now),
    };
    let value = serde_json::to_string(&asset)?;

    let id = crate::kv::insert(
        MODULE_NAME,
        &create.name,
        &create.filename,
        &value,
        conn,
    )
    .await?;
    Ok(AudioAsset { id, ..asset })
}

pub async fn by_id(id: i64, conn: &Connection) -> anyhow::Result<Option<AudioAsset>> {
    match crate::kv::by_id(id, conn).await? {
        Some(kv) if kv.module == MODULE_NAME => decode(kv),
        _ => Ok(None),
    }
}

pub async fn by_name(name: &str, conn: &Connection) -> anyhow::Result<Option<AudioAsset>> {
    match crate::kv::by_module_and_key(MODULE_NAME, name, conn).await? {
        Some(kv) => decode(kv),
        None => Ok(None),
    }
}

pub async fn delete(id: i64, conn: &Connection) -> anyhow::Result<bool> {
    crate::kv::delete(id, MODULE_NAME, conn).await
}

fn decode(kv: crate::kv::Kv) -> anyhow::Result<Option<AudioAsset>> {
    let Some(json) = kv.value else {
        return Ok(None);
    };
    let mut asset: AudioAsset = serde_json::from_str(&json)?;
    asset.id = kv.id;
    Ok(Some(asset))
}
