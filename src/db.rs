use crate::paths::AppPaths;
use crate::Result;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const SCHEMA_VERSION: i64 = 1;

pub const SETTING_LAST_SAVE_PATH: &str = "LastSavePath";
pub const SETTING_COOKIES_PATH: &str = "CookiesPath";
pub const SETTING_CLIENT_SPOOF: &str = "ClientSpoof";
pub const SETTING_LANGUAGE: &str = "Language";

pub const HISTORY_DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppSettings {
    pub last_save_path: String,
    pub cookies_path: String,
    pub client_spoof: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub path: String,
    pub created_at_ms: i64,
}

pub fn open(paths: &AppPaths) -> Result<Connection> {
    paths.ensure_dirs()?;

    let db_path = paths.db_dir().join("app.sqlite");
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
    )?;

    conn.busy_timeout(Duration::from_secs(10))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS meta (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS settings (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS history (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  title TEXT,
  url TEXT NOT NULL,
  path TEXT NOT NULL,
  created_at_ms INTEGER NOT NULL
);
"#,
    )?;

    let existing: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key='schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(v) if v == SCHEMA_VERSION.to_string() => {}
        _ => {
            conn.execute(
                "INSERT INTO meta(key, value) VALUES('schema_version', ?)
                 ON CONFLICT(key) DO UPDATE SET value=excluded.value",
                [SCHEMA_VERSION.to_string()],
            )?;
        }
    }

    Ok(())
}

pub fn ensure_schema(paths: &AppPaths) -> Result<()> {
    let conn = open(paths)?;
    migrate(&conn)?;
    Ok(())
}

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM settings WHERE key=?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

pub fn load_settings(conn: &Connection) -> Result<AppSettings> {
    Ok(AppSettings {
        last_save_path: get_setting(conn, SETTING_LAST_SAVE_PATH)?.unwrap_or_default(),
        cookies_path: get_setting(conn, SETTING_COOKIES_PATH)?.unwrap_or_default(),
        client_spoof: get_setting(conn, SETTING_CLIENT_SPOOF)?.unwrap_or_default(),
        language: get_setting(conn, SETTING_LANGUAGE)?.unwrap_or_default(),
    })
}

pub fn append_history(conn: &Connection, title: &str, url: &str, path: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO history(title, url, path, created_at_ms) VALUES(?1, ?2, ?3, ?4)",
        params![title, url, path, now_ms()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn recent_history(conn: &Connection, limit: usize) -> Result<Vec<HistoryEntry>> {
    // Rows written by older installs can carry NULL titles.
    let mut stmt = conn.prepare(
        r#"
SELECT id, COALESCE(title, 'Unknown Video'), url, path, created_at_ms
FROM history
ORDER BY id DESC
LIMIT ?1
"#,
    )?;

    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok(HistoryEntry {
                id: row.get(0)?,
                title: row.get(1)?,
                url: row.get(2)?,
                path: row.get(3)?,
                created_at_ms: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_conn() -> (TempDir, Connection) {
        let tmp = TempDir::new().expect("tempdir");
        let paths = AppPaths::new(tmp.path().to_path_buf());
        let conn = open(&paths).expect("open db");
        migrate(&conn).expect("migrate db");
        (tmp, conn)
    }

    #[test]
    fn migrate_is_idempotent_and_records_schema_version() {
        let (_tmp, conn) = test_conn();
        migrate(&conn).expect("second migrate");

        let version: String = conn
            .query_row(
                "SELECT value FROM meta WHERE key='schema_version'",
                [],
                |row| row.get(0),
            )
            .expect("schema version row");
        assert_eq!(version, SCHEMA_VERSION.to_string());
    }

    #[test]
    fn settings_roundtrip_and_overwrite() {
        let (_tmp, conn) = test_conn();
        assert_eq!(get_setting(&conn, SETTING_LANGUAGE).expect("get"), None);

        set_setting(&conn, SETTING_LANGUAGE, "en").expect("set");
        set_setting(&conn, SETTING_LANGUAGE, "de").expect("overwrite");
        assert_eq!(
            get_setting(&conn, SETTING_LANGUAGE).expect("get"),
            Some("de".to_string())
        );
    }

    #[test]
    fn load_settings_defaults_missing_keys_to_empty() {
        let (_tmp, conn) = test_conn();
        set_setting(&conn, SETTING_LAST_SAVE_PATH, "/tmp/out").expect("set");

        let settings = load_settings(&conn).expect("load");
        assert_eq!(settings.last_save_path, "/tmp/out");
        assert_eq!(settings.cookies_path, "");
        assert_eq!(settings.client_spoof, "");
        assert_eq!(settings.language, "");
    }

    #[test]
    fn recent_history_is_newest_first() {
        let (_tmp, conn) = test_conn();
        append_history(&conn, "First", "https://example.com/1", "/dl/1.mp4").expect("insert");
        append_history(&conn, "Second", "https://example.com/2", "/dl/2.mp4").expect("insert");
        append_history(&conn, "Third", "https://example.com/3", "/dl/3.mp4").expect("insert");

        let rows = recent_history(&conn, HISTORY_DEFAULT_LIMIT).expect("list");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].title, "Third");
        assert_eq!(rows[2].title, "First");
        assert!(rows[0].created_at_ms > 0);
    }

    #[test]
    fn recent_history_honors_limit() {
        let (_tmp, conn) = test_conn();
        for i in 0..5 {
            append_history(&conn, &format!("Video {i}"), "https://example.com", "/dl/v.mp4")
                .expect("insert");
        }

        let rows = recent_history(&conn, 2).expect("list");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title, "Video 4");
    }

    #[test]
    fn null_titles_read_back_as_placeholder() {
        let (_tmp, conn) = test_conn();
        conn.execute(
            "INSERT INTO history(title, url, path, created_at_ms) VALUES(NULL, ?1, ?2, ?3)",
            params!["https://example.com/old", "/dl/old.mp4", 0_i64],
        )
        .expect("insert legacy row");

        let rows = recent_history(&conn, 10).expect("list");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Unknown Video");
    }
}
