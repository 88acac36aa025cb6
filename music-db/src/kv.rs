use turso::{Connection, Row};

#[derive(Debug, Default)]
pub struct Kv {
    pub id: i64,
    pub module: String,
    pub key: String,
    pub sub_key: Option<String>,
    pub value: Option<String>,
}

pub async fn by_id(id: i64, conn: &Connection) -> anyhow::Result<Option<Kv>> {
    let mut rows = conn
        .query(
            "SELECT id, module, key, sub_key, value FROM kvs WHERE id = ?1 LIMIT 1",
            (id,),
        )
        .await?;
    let row = rows.next().await?;
    row_to_kv(row)
}

/// Newest first.
pub async fn by_module(module: &str, conn: &Connection) -> anyhow::Result<Vec<Kv>> {
    let mut rows = conn
        .query(
            "SELECT id, module, key, sub_key, value FROM kvs WHERE module = ?1 ORDER BY id DESC",
            (module,),
        )
        .await?;
    let mut kvs = Vec::new();
    while let Some(row) = rows.next().await? {
        if let Some(kv) = row_to_kv(Some(row))? {
            kvs.push(kv);
        }
    }
    Ok(kvs)
}

/// Keys are not unique; the newest row wins.
pub async fn by_module_and_key(
    module: &str,
    key: &str,
    conn: &Connection,
) -> anyhow::Result<Option<Kv>> {
    let mut rows = conn
        .query(
            "SELECT id, module, key, sub_key, value FROM kvs WHERE module = ?1 AND key = ?2 ORDER BY id DESC LIMIT 1",
            (module, key),
        )
        .await?;
    row_to_kv(rows.next().await?)
}

/// Returns the new row id.
pub async fn insert(
    module: &str,
    key: &str,
    sub_key: &str,
    value: &str,
    conn: &Connection,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO kvs (module, key, sub_key, value) VALUES (?1, ?2, ?3, ?4)",
        (module, key, sub_key, value),
    )
    .await?;
    Ok(conn.last_insert_rowid())
}

pub async fn delete(id: i64, module: &str, conn: &Connection) -> anyhow::Result<bool> {
    let affected = conn
        .execute("DELETE FROM kvs WHERE id = ?1 AND module = ?2", (id, module))
        .await?;
    Ok(affected > 0)
}

fn row_to_kv(row: Option<Row>) -> anyhow::Result<Option<Kv>> {
    if let Some(row) = row {
        let id = row
            .get_value(0)
            .map_err(anyhow::Error::from)?
            .as_integer()
            .ok_or_else(|| anyhow::anyhow!("id is null"))?
            .to_owned();
        let module = row
            .get_value(1)?
            .as_text()
            .ok_or_else(|| anyhow::anyhow!("module is null"))?
            .to_owned();
        let key = row
            .get_value(2)?
            .as_text()
            .ok_or_else(|| anyhow::anyhow!("key is null"))?
            .to_owned();
        let sub_key = row.get_value(3)?.as_text().map(|s| s.to_owned());
        let value = row.get_value(4)?.as_text().map(|s| s.to_owned());
        return Ok(Some(Kv {
            id,
            module,
            key,
            sub_key,
            value,
        }));
    }

    Ok(None)
}
