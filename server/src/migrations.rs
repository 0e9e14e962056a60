use anyhow::{bail, Context, Result};
use sqlx::postgres::PgPool;
use sqlx::Executor;
use std::fs;
use std::path::{Path, PathBuf};

/// `.sql` files in `dir`, sorted by file name.
pub fn pending_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        bail!("Migrations directory not found: {}", dir.display());
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().map_or(false, |ext| ext == "sql"))
        .collect();
    files.sort();
    Ok(files)
}

/// Applies every migration in `dir` that `schema_migrations` has not seen yet.
///
/// Each file runs in its own transaction together with its tracker row.
pub async fn run_migrations(pool: &PgPool, dir: &Path) -> Result<usize> {
    init_migrations_tracker(pool).await?;

    let mut applied = 0;
    for path in pending_files(dir)? {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if is_applied(pool, &name).await? {
            tracing::debug!("Skipping applied migration {}", name);
            continue;
        }

        tracing::info!("Running migration: {}", name);
        let sql = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;

        let mut tx = pool.begin().await?;
        (&mut *tx)
            .execute(sql.as_str())
            .await
            .with_context(|| format!("Migration {} failed", name))?;
        sqlx::query("INSERT INTO schema_migrations (name) VALUES ($1)")
            .bind(&name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        applied += 1;
    }

    tracing::info!("✓ Migrations up to date ({} applied)", applied);
    Ok(applied)
}

async fn init_migrations_tracker(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            id SERIAL PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE,
            applied_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn is_applied(pool: &PgPool, name: &str) -> Result<bool> {
    let found: Option<i32> = sqlx::query_scalar("SELECT id FROM schema_migrations WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_files_sorted_and_filtered() {
        let dir = std::env::temp_dir().join(format!("clinic-migrations-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("0002_more.sql"), "SELECT 1;").unwrap();
        fs::write(dir.join("0001_init.sql"), "SELECT 1;").unwrap();
        fs::write(dir.join("README.md"), "notes").unwrap();

        let files = pending_files(&dir).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["0001_init.sql", "0002_more.sql"]);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        assert!(pending_files(Path::new("/definitely/not/here")).is_err());
    }

    #[test]
    fn test_shipped_migrations_are_found() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        let files = pending_files(&dir).unwrap();
        assert!(files.iter().any(|p| p.ends_with("0001_init.sql")));
    }
}
