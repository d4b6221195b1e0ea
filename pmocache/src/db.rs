//! Module de gestion de la base de données SQLite pour le cache
//!
//! La base indexe les segments d'octets présents sur le disque : pour chaque
//! clé de piste, les couples (offset, longueur) déjà écrits, le fichier qui les
//! contient et la date de dernière utilisation (pour l'éviction LRU).

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Entrée d'index représentant un segment stocké sur le disque
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanEntry {
    /// Clé de la piste
    pub key: String,
    /// Position du premier octet du segment dans le flux
    pub offset: u64,
    /// Nombre d'octets du segment
    pub length: u64,
    /// Nom du fichier (relatif au répertoire du cache)
    pub file: String,
    /// Date/heure du dernier accès (RFC3339)
    pub last_used: Option<String>,
}

impl SpanEntry {
    /// Position qui suit le dernier octet du segment
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Base de données SQLite pour l'index des segments
#[derive(Debug)]
pub struct DB {
    conn: Mutex<Connection>,
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<SpanEntry> {
    let offset: i64 = row.get(1)?;
    let length: i64 = row.get(2)?;
    Ok(SpanEntry {
        key: row.get(0)?,
        offset: offset as u64,
        length: length as u64,
        file: row.get(3)?,
        last_used: row.get(4)?,
    })
}

impl DB {
    /// Initialise (ou ouvre) la base d'index
    ///
    /// ```rust,no_run
    /// use pmocache::db::DB;
    /// use std::path::Path;
    ///
    /// let db = DB::init(Path::new("cache.db")).unwrap();
    /// ```
    pub fn init(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        Self::create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Base en mémoire, utile pour les tests
    pub fn in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS spans (
                track_key TEXT NOT NULL,
                span_offset INTEGER NOT NULL,
                length INTEGER NOT NULL,
                file TEXT NOT NULL,
                last_used TEXT,
                PRIMARY KEY (track_key, span_offset)
            )",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // Une connexion SQLite reste utilisable après un panic d'un autre thread
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enregistre (ou remplace) un segment
    pub fn insert_span(&self, key: &str, offset: u64, length: u64, file: &str) -> rusqlite::Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO spans (track_key, span_offset, length, file, last_used)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key, offset as i64, length as i64, file, now()],
        )?;
        Ok(())
    }

    /// Récupère un segment par sa clé et son offset
    pub fn get_span(&self, key: &str, offset: u64) -> rusqlite::Result<Option<SpanEntry>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT track_key, span_offset, length, file, last_used FROM spans WHERE track_key = ?1 AND span_offset = ?2",
            params![key, offset as i64],
            row_to_entry,
        )
        .optional()
    }

    /// Tous les segments d'une piste, triés par offset croissant
    pub fn spans_for(&self, key: &str) -> rusqlite::Result<Vec<SpanEntry>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT track_key, span_offset, length, file, last_used FROM spans WHERE track_key = ?1 ORDER BY span_offset ASC",
        )?;
        let entries = stmt
            .query_map([key], row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Tous les segments indexés
    pub fn get_all(&self) -> rusqlite::Result<Vec<SpanEntry>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT track_key, span_offset, length, file, last_used FROM spans ORDER BY track_key, span_offset")?;
        let entries = stmt
            .query_map([], row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Met à jour la date de dernière utilisation d'un segment
    pub fn touch(&self, key: &str, offset: u64) -> rusqlite::Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE spans SET last_used = ?1 WHERE track_key = ?2 AND span_offset = ?3",
            params![now(), key, offset as i64],
        )?;
        Ok(())
    }

    /// Supprime un segment de l'index
    pub fn delete_span(&self, key: &str, offset: u64) -> rusqlite::Result<()> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM spans WHERE track_key = ?1 AND span_offset = ?2",
            params![key, offset as i64],
        )?;
        Ok(())
    }

    /// Purge toutes les entrées de la base de données
    pub fn purge(&self) -> rusqlite::Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM spans", [])?;
        Ok(())
    }

    /// Compte le nombre total de segments
    pub fn count(&self) -> rusqlite::Result<usize> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM spans", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Somme des longueurs de tous les segments indexés
    pub fn total_bytes(&self) -> rusqlite::Result<u64> {
        let conn = self.lock();
        let total: i64 =
            conn.query_row("SELECT COALESCE(SUM(length), 0) FROM spans", [], |row| row.get(0))?;
        Ok(total as u64)
    }

    /// Récupère les N segments les plus anciens (LRU)
    pub fn get_oldest(&self, limit: usize) -> rusqlite::Result<Vec<SpanEntry>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT track_key, span_offset, length, file, last_used
             FROM spans
             ORDER BY last_used ASC
             LIMIT ?1",
        )?;
        let entries = stmt
            .query_map([limit as i64], row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}
