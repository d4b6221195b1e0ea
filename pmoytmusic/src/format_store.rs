//! Stockage des métadonnées de format par piste
//!
//! Le résolveur y enregistre, pour chaque piste résolue, le format choisi
//! (itag, débit, taille, loudness) ainsi que le texte de durée affiché dans
//! la file. La source de données y lit la taille totale d'une piste pour
//! savoir si elle est entièrement en cache.

use crate::models::FormatRecord;
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub trait FormatStore: Send + Sync {
    fn insert_format(&self, track_key: &str, record: &FormatRecord) -> Result<()>;

    fn update_duration_text(&self, track_key: &str, text: &str) -> Result<()>;

    fn lookup_format(&self, track_key: &str) -> Result<Option<FormatRecord>>;

    fn duration_text(&self, track_key: &str) -> Result<Option<String>>;
}

/// Implémentation SQLite de [`FormatStore`]
#[derive(Debug)]
pub struct SqliteFormatStore {
    conn: Mutex<Connection>,
}

impl SqliteFormatStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS format (
                id TEXT PRIMARY KEY,
                itag INTEGER NOT NULL,
                mime_type TEXT NOT NULL,
                bitrate INTEGER NOT NULL,
                content_length INTEGER,
                loudness_db REAL
            );
            CREATE TABLE IF NOT EXISTS song_duration (
                id TEXT PRIMARY KEY,
                duration_text TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FormatStore for SqliteFormatStore {
    fn insert_format(&self, track_key: &str, record: &FormatRecord) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO format (id, itag, mime_type, bitrate, content_length, loudness_db)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                track_key,
                record.itag,
                record.mime_type,
                record.bitrate as i64,
                record.content_length.map(|l| l as i64),
                record.loudness_db,
            ],
        )?;
        Ok(())
    }

    fn update_duration_text(&self, track_key: &str, text: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO song_duration (id, duration_text) VALUES (?1, ?2)",
            params![track_key, text],
        )?;
        Ok(())
    }

    fn lookup_format(&self, track_key: &str) -> Result<Option<FormatRecord>> {
        let conn = self.lock();
        let record = conn
            .query_row(
                "SELECT itag, mime_type, bitrate, content_length, loudness_db FROM format WHERE id = ?1",
                [track_key],
                |row| {
                    let bitrate: i64 = row.get(2)?;
                    let content_length: Option<i64> = row.get(3)?;
                    Ok(FormatRecord {
                        itag: row.get(0)?,
                        mime_type: row.get(1)?,
                        bitrate: bitrate as u64,
                        content_length: content_length.map(|l| l as u64),
                        loudness_db: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn duration_text(&self, track_key: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let text = conn
            .query_row(
                "SELECT duration_text FROM song_duration WHERE id = ?1",
                [track_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(text)
    }
}
