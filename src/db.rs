use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

const MEMORY_URI: &str = "sqlite::memory:";

/// Turn the configured store URI into a concrete SQLite connection string.
///
/// A bare `sqlite://` (or an empty URI) places the database file under the
/// data directory, named after the database.
pub fn resolve_target(uri: &str, db_name: &str, data_path: &Path) -> String {
    let uri = uri.trim();
    if uri == MEMORY_URI {
        return MEMORY_URI.to_string();
    }

    match uri.strip_prefix("sqlite://").or_else(|| uri.strip_prefix("sqlite:")) {
        Some(path) if !path.is_empty() => format!("sqlite:{}", path),
        _ if uri.is_empty() || uri.starts_with("sqlite:") => {
            let file = data_path.join(format!("{}.sqlite", db_name));
            format!("sqlite:{}", file.display())
        }
        _ => uri.to_string(),
    }
}

pub async fn connect(target: &str) -> Result<SqlitePool, sqlx::Error> {
    if target == MEMORY_URI {
        // Each in-memory connection is its own database; keep exactly one.
        return SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(target)
            .await;
    }

    if !target.starts_with("sqlite:") {
        return Err(sqlx::Error::Configuration(
            format!("unsupported store URI: {}", target).into(),
        ));
    }

    let options = SqliteConnectOptions::from_str(target)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    // Ensure parent directory exists
    if let Some(parent) = options.get_filename().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_scheme_uses_data_path() {
        let target = resolve_target("sqlite://", "studio", Path::new("/var/lib/studio"));
        assert_eq!(target, "sqlite:/var/lib/studio/studio.sqlite");
        let target = resolve_target("", "chat", Path::new("/data"));
        assert_eq!(target, "sqlite:/data/chat.sqlite");
    }

    #[test]
    fn test_explicit_path_is_kept() {
        let target = resolve_target("sqlite:///tmp/other.db", "studio", Path::new("/data"));
        assert_eq!(target, "sqlite:/tmp/other.db");
    }

    #[test]
    fn test_memory_target() {
        assert_eq!(
            resolve_target("sqlite::memory:", "studio", Path::new("/data")),
            "sqlite::memory:"
        );
    }

    #[tokio::test]
    async fn test_non_sqlite_uri_is_rejected() {
        let err = connect("mongodb://localhost:27017").await.unwrap_err();
        assert!(matches!(err, sqlx::Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_connect_creates_parent_directories() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("a").join("b").join("studio.sqlite");
        let pool = connect(&format!("sqlite:{}", file.display())).await.unwrap();
        assert!(file.exists());
        pool.close().await;
    }
}
