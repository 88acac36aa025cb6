use std::ops::Deref;

use tokio::sync::{Mutex, MutexGuard};
use turso::{Builder, Connection, Database};

pub struct DatabaseConfig<'a> {
    url: &'a str,
}

impl<'a> DatabaseConfig<'a> {
    pub fn new(url: &'a str) -> Self {
        Self { url }
    }
}

/// Database handle shared by every request.
///
/// turso reports `database is locked` when two connections write at once, so
/// all writes go through [`MusicDatabase::writer`], which hands out one
/// writer at a time. Reads use plain connections and run alongside it (WAL).
pub struct MusicDatabase {
    db: Database,
    write_lock: Mutex<()>,
}

/// A connection that holds the write lock until dropped.
pub struct WriteConnection<'a> {
    conn: Connection,
    _guard: MutexGuard<'a, ()>,
}

impl Deref for WriteConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl WriteConnection<'_> {
    /// Mutable access, needed to open a transaction.
    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl MusicDatabase {
    pub async fn new(config: &DatabaseConfig<'_>) -> anyhow::Result<Self> {
        let db = Builder::new_local(config.url).build().await?;

        let conn = db.connect().map_err(anyhow::Error::from)?;
        conn.pragma_update("journal_mode", "wal").await?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    /// Opens the database and applies pending migrations.
    pub async fn open(config: &DatabaseConfig<'_>) -> anyhow::Result<Self> {
        let db = Self::new(config).await?;
        crate::migrations::migrate(&db).await?;
        Ok(db)
    }

    pub fn connect(&self) -> anyhow::Result<Connection> {
        self.db.connect().map_err(anyhow::Error::from)
    }

    /// Waits for the write lock, then connects.
    pub async fn writer(&self) -> anyhow::Result<WriteConnection<'_>> {
        let guard = self.write_lock.lock().await;
        Ok(WriteConnection {
            conn: self.connect()?,
            _guard: guard,
        })
    }
}
