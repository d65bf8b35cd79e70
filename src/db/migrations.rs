use std::collections::HashSet;
use std::path::Path;

use deadpool_postgres::Pool;

use super::error::DbError;

const MIGRATIONS_DIR: &str = "migrations";

/// Apply every `.sql` file under `migrations/` that has not run yet, in
/// file-name order, each in its own transaction. Applied names are tracked
/// in the `_migrations` table.
pub async fn run(pool: &Pool) -> Result<(), DbError> {
    let client = pool.get().await?;
    client
        .execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )",
            &[],
        )
        .await?;

    let applied: HashSet<String> = client
        .query("SELECT name FROM _migrations", &[])
        .await?
        .iter()
        .map(|row| row.get(0))
        .collect();
    drop(client);

    let dir = Path::new(MIGRATIONS_DIR);
    if !dir.exists() {
        tracing::info!("no migrations directory, skipping");
        return Ok(());
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|x| x == "sql").unwrap_or(false))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        if applied.contains(&name) {
            continue;
        }
        apply_one(pool, &name, &entry.path()).await?;
        tracing::info!("applied migration {name}");
    }

    tracing::info!("migrations up to date");
    Ok(())
}

async fn apply_one(pool: &Pool, name: &str, path: &Path) -> Result<(), DbError> {
    let sql = std::fs::read_to_string(path)?;

    let mut client = pool.get().await?;
    let tx = client.transaction().await?;
    tx.batch_execute(&sql).await.map_err(|e| DbError::Migration {
        name: name.to_string(),
        message: e.to_string(),
    })?;
    tx.execute("INSERT INTO _migrations (name) VALUES ($1)", &[&name])
        .await?;
    tx.commit().await?;
    Ok(())
}
