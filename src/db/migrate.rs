//! Schema migrations for the graph database.
//!
//! Each `NNN_name.sql` file in the migrations directory is applied once, in
//! version order, inside its own transaction and recorded in
//! `schema_migrations`.

use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{GraphReaderError, Result};

struct Migration {
    version: u32,
    name: String,
    sql: String,
}

fn ensure_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Names of applied migrations in version order.
pub fn get_applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM schema_migrations ORDER BY version")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names)
}

fn parse_version(filename: &str) -> Result<u32> {
    let (prefix, _) = filename.split_once('_').ok_or_else(|| {
        GraphReaderError::Config(format!(
            "Graph migration {} must be named like 001_graph_schema.sql",
            filename
        ))
    })?;
    prefix.parse().map_err(|_| {
        GraphReaderError::Config(format!(
            "Graph migration {} has a non-numeric version {:?}",
            filename, prefix
        ))
    })
}

fn load_migrations(migrations_dir: &Path) -> Result<Vec<Migration>> {
    if !migrations_dir.is_dir() {
        return Err(GraphReaderError::Config(format!(
            "Graph migrations directory {} not found (pass --migrations)",
            migrations_dir.display()
        )));
    }

    let mut migrations = Vec::new();
    let mut seen: HashMap<u32, String> = HashMap::new();

    for entry in fs::read_dir(migrations_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) != Some("sql") {
            continue;
        }
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| GraphReaderError::Config(format!("Unreadable migration path {}", path.display())))?;

        let version = parse_version(filename)?;
        let name = filename.trim_end_matches(".sql").to_string();
        if let Some(other) = seen.insert(version, name.clone()) {
            return Err(GraphReaderError::Config(format!(
                "Graph migrations {} and {} share version {}",
                other, name, version
            )));
        }

        let sql = fs::read_to_string(&path)?;
        migrations.push(Migration { version, name, sql });
    }

    migrations.sort_by_key(|m| m.version);
    Ok(migrations)
}

/// Apply every pending migration. Returns how many were applied.
pub fn run_migrations(conn: &mut Connection, migrations_dir: &Path) -> Result<usize> {
    ensure_migrations_table(conn)?;

    let applied = get_applied_migrations(conn)?;
    let mut count = 0;

    for migration in load_migrations(migrations_dir)? {
        if applied.contains(&migration.name) {
            log::debug!("Graph migration {} already applied", migration.name);
            continue;
        }

        log::info!("Applying graph migration {} (version {})", migration.name, migration.version);

        let tx = conn.transaction()?;
        tx.execute_batch(&migration.sql).map_err(|e| {
            GraphReaderError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("graph migration {} failed: {}", migration.name, e)),
            ))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![migration.version, migration.name],
        )?;
        tx.commit()?;
        count += 1;
    }

    if count > 0 {
        log::info!("Graph schema up to date ({} migration(s) applied)", count);
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use std::fs;

    fn table_names(conn: &Connection, kind: &str) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type = ?1 ORDER BY name")
            .unwrap()
            .query_map([kind], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
            .unwrap()
    }

    #[test]
    fn test_migration_tracking() {
        let temp_dir = TempDir::new().unwrap();
        let conn = Connection::open(temp_dir.path().join("test.db")).unwrap();

        ensure_migrations_table(&conn).unwrap();
        conn.execute("CREATE TABLE test (id INTEGER)", []).unwrap();
        conn.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![1, "001_test"],
        ).unwrap();

        let applied = get_applied_migrations(&conn).unwrap();
        assert!(applied.contains(&"001_test".to_string()));
    }

    #[test]
    fn test_load_migrations_sorted_by_version() {
        let temp_dir = TempDir::new().unwrap();
        let migrations_dir = temp_dir.path().join("migrations");
        fs::create_dir(&migrations_dir).unwrap();

        fs::write(migrations_dir.join("002_another.sql"), "CREATE TABLE another (id INTEGER);").unwrap();
        fs::write(migrations_dir.join("001_test.sql"), "CREATE TABLE test (id INTEGER);").unwrap();
        fs::write(migrations_dir.join("README.md"), "not a migration").unwrap();

        let migrations = load_migrations(&migrations_dir).unwrap();
        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].version, 1);
        assert_eq!(migrations[1].version, 2);
        assert_eq!(migrations[1].name, "002_another");
    }

    #[test]
    fn test_invalid_migration_version() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("abc_broken.sql"), "SELECT 1;").unwrap();
        let result = load_migrations(temp_dir.path());
        assert!(matches!(result, Err(GraphReaderError::Config(_))));
    }

    #[test]
    fn test_duplicate_version_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("001_graph_schema.sql"), "SELECT 1;").unwrap();
        fs::write(temp_dir.path().join("001_extra_index.sql"), "SELECT 1;").unwrap();
        match load_migrations(temp_dir.path()) {
            Err(GraphReaderError::Config(msg)) => assert!(msg.contains("share version 1"), "{}", msg),
            other => panic!("expected a config error, got {:?}", other.map(|m| m.len())),
        }
    }

    #[test]
    fn test_missing_migrations_dir() {
        let temp_dir = TempDir::new().unwrap();
        let result = load_migrations(&temp_dir.path().join("absent"));
        assert!(matches!(result, Err(GraphReaderError::Config(msg)) if msg.contains("--migrations")));
    }

    #[test]
    fn test_full_migration_schema() {
        let temp_dir = TempDir::new().unwrap();
        let mut conn = Connection::open(temp_dir.path().join("test.db")).unwrap();
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");

        assert_eq!(run_migrations(&mut conn, &migrations_dir).unwrap(), 2);
        // Second run is a no-op
        assert_eq!(run_migrations(&mut conn, &migrations_dir).unwrap(), 0);

        let tables = table_names(&conn, "table");
        assert!(tables.contains(&"nodes".to_string()));
        assert!(tables.contains(&"edges".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));

        let indexes = table_names(&conn, "index");
        assert!(indexes.contains(&"idx_edges_target_relationship".to_string()));
        assert!(indexes.contains(&"idx_edges_source_relationship".to_string()));

        let applied = get_applied_migrations(&conn).unwrap();
        assert_eq!(applied, vec!["001_graph_schema".to_string(), "002_traversal_indexes".to_string()]);
    }
}
