use std::path::Path;

use crate::db::MusicDatabase;

const MIGRATIONS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER NOT NULL PRIMARY KEY,
    description TEXT NOT NULL,
    createtime TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

#[derive(Debug, rust_embed::RustEmbed)]
#[folder = "migrations/"]
struct Migrations;

pub async fn migrate(db: &MusicDatabase) -> anyhow::Result<()> {
    let mut conn = db.writer().await?;
    apply(conn.conn_mut(), load_migrations()?).await
}

/// Each migration and its `_migrations` row commit together or not at all.
async fn apply(conn: &mut turso::Connection, mut migrations: Vec<Migration>) -> anyhow::Result<()> {
    ensure_migrations_table(conn).await?;
    migrations.sort_by_key(|m| m.version);

    for migration in migrations {
        if is_migration_applied(conn, migration.version).await? {
            continue;
        }
        log::info!(
            "applying migration {} ({})",
            migration.version,
            migration.description
        );
        let tx = conn.transaction().await?;
        tx.execute_batch(&migration.sql).await?;
        tx.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            (migration.version, migration.description.as_str()),
        )
        .await?;
        tx.commit().await?;
    }

    Ok(())
}

async fn ensure_migrations_table(conn: &turso::Connection) -> anyhow::Result<()> {
    conn.execute_batch(MIGRATIONS_TABLE_SQL).await?;
    Ok(())
}

async fn is_migration_applied(conn: &turso::Connection, version: i64) -> anyhow::Result<bool> {
    let mut rows = conn
        .query("SELECT 1 FROM _migrations WHERE version = ?1", (version,))
        .await?;
    Ok(rows.next().await?.is_some())
}

struct Migration {
    version: i64,
    description: String,
    sql: String,
}

fn load_migrations() -> anyhow::Result<Vec<Migration>> {
    let mut migrations = Vec::new();
    for path in Migrations::iter() {
        let Some(emb_file) = Migrations::get(&path) else {
            continue;
        };
        let file_name = Path::new(path.as_ref())
            .file_name()
            .and_then(|x| x.to_str())
            .unwrap_or("");
        // <VERSION>_<DESCRIPTION>.sql
        let Some((version, rest)) = file_name.split_once('_') else {
            continue;
        };
        let Some(description) = rest.strip_suffix(".sql") else {
            continue;
        };
        let version: i64 = version.parse()?;
        let sql = std::str::from_utf8(emb_file.data.as_ref())?;

        migrations.push(Migration {
            version,
            description: description.replace('_', " "),
            sql: sql.to_owned(),
        });
    }
    Ok(migrations)
}
