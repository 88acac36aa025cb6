use futures::future::BoxFuture;

use crate::{
    asset::{self, AudioAsset, NewAudioAsset},
    db::MusicDatabase,
};

/// Keyed persistence of asset records.
pub trait AssetStore: Send + Sync {
    fn insert<'a>(&'a self, asset: &'a NewAudioAsset) -> BoxFuture<'a, anyhow::Result<AudioAsset>>;

    fn find(&self, id: i64) -> BoxFuture<'_, anyhow::Result<Option<AudioAsset>>>;

    fn find_by_name<'a>(&'a self, name: &'a str)
    -> BoxFuture<'a, anyhow::Result<Option<AudioAsset>>>;

    /// `Ok(false)` when no record had that id.
    fn delete(&self, id: i64) -> BoxFuture<'_, anyhow::Result<bool>>;

    fn list(&self) -> BoxFuture<'_, anyhow::Result<Vec<AudioAsset>>>;
}

impl AssetStore for MusicDatabase {
    fn insert<'a>(&'a self, create: &'a NewAudioAsset) -> BoxFuture<'a, anyhow::Result<AudioAsset>> {
        Box::pin(async move {
            let conn = self.writer().await?;
            asset::insert(create, &conn).await
        })
    }

    fn find(&self, id: i64) -> BoxFuture<'_, anyhow::Result<Option<AudioAsset>>> {
        Box::pin(async move {
            let conn = self.connect()?;
            asset::by_id(id, &conn).await
        })
    }

    fn find_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<Option<AudioAsset>>> {
        Box::pin(async move {
            let conn = self.connect()?;
            asset::by_name(name, &conn).await
        })
    }

    fn delete(&self, id: i64) -> BoxFuture<'_, anyhow::Result<bool>> {
        Box::pin(async move {
            let conn = self.writer().await?;
            asset::delete(id, &conn).await
        })
    }

    fn list(&self) -> BoxFuture<'_, anyhow::Result<Vec<AudioAsset>>> {
        Box::pin(async move {
            let conn = self.connect()?;
            asset::query_all(&conn).await
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::DatabaseConfig;

    #[tokio::test]
    async fn test_store_through_trait_object() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let url = dir.path().join("music.db");
        let url = url.to_string_lossy();
        let store: Arc<dyn AssetStore> =
            Arc::new(MusicDatabase::open(&DatabaseConfig::new(&url)).await?);

        let created = store
            .insert(&NewAudioAsset {
                name: "Night Drive".to_string(),
                author: "me".to_string(),
                filename: "0f3c".to_string(),
                filetype: ".wav".to_string(),
            })
            .await?;

        assert_eq!(store.find(created.id).await?, Some(created.clone()));
        assert_eq!(store.find_by_name("Night Drive").await?, Some(created.clone()));
        assert_eq!(store.list().await?.len(), 1);
        assert!(store.delete(created.id).await?);
        assert_eq!(store.find(created.id).await?, None);
        assert!(store.list().await?.is_empty());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_all_commit() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let url = dir.path().join("music.db");
        let url = url.to_string_lossy();
        let store: Arc<dyn AssetStore> =
            Arc::new(MusicDatabase::open(&DatabaseConfig::new(&url)).await?);

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .insert(&NewAudioAsset {
                            name: format!("Track {i}"),
                            author: "me".to_string(),
                            filename: format!("stem{i}"),
                            filetype: ".mp3".to_string(),
                        })
                        .await
                })
            })
            .collect();

        let mut ids = Vec::new();
        for task in futures::future::join_all(tasks).await {
            ids.push(task??.id);
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 16);
        assert_eq!(store.list().await?.len(), 16);
        Ok(())
    }
}
