//! Cache de segments d'octets sur disque
//!
//! Chaque piste (identifiée par une clé opaque) est stockée sous forme de
//! segments contigus `(clé, offset, longueur)`. Un segment est écrit dans un
//! fichier temporaire `.part`, puis renommé et indexé dans SQLite lors du
//! `commit`. Un écrivain abandonné (drop sans commit) supprime son fichier
//! temporaire : aucun segment partiel n'est jamais indexé.

use crate::db::{SpanEntry, DB};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use sha1::{Digest, Sha1};
use std::collections::HashSet;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, warn};

const DB_FILE: &str = "cache.db";
const SPAN_EXT: &str = "span";
const PART_EXT: &str = "part";
const EVICTION_BATCH: usize = 16;

/// Segment d'octets présent dans le cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSpan {
    pub key: String,
    pub offset: u64,
    pub length: u64,
}

impl CachedSpan {
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

impl From<SpanEntry> for CachedSpan {
    fn from(entry: SpanEntry) -> Self {
        Self {
            key: entry.key,
            offset: entry.offset,
            length: entry.length,
        }
    }
}

/// Nombre d'octets disponibles sans trou à partir de `position`
pub fn contiguous_from(spans: &[CachedSpan], position: u64) -> u64 {
    let mut bounds: Vec<(u64, u64)> = spans.iter().map(|s| (s.offset, s.end())).collect();
    bounds.sort_unstable();

    let mut reached = position;
    for (start, end) in bounds {
        if start > reached {
            break;
        }
        if end > reached {
            reached = end;
        }
    }
    reached - position
}

/// Interface commune des caches de segments
///
/// Les opérations `start_write`, `commit` et `release` sont les seules
/// mutations ; elles peuvent être refusées par une garde (voir
/// [`crate::ReadOnlyGate`]).
#[async_trait]
pub trait SpanCache: Send + Sync {
    /// Segments connus pour une clé, triés par offset
    async fn spans(&self, key: &str) -> Result<Vec<CachedSpan>>;

    /// Nombre d'octets contigus disponibles à partir de `position`
    async fn cached_bytes(&self, key: &str, position: u64) -> Result<u64> {
        let spans = self.spans(key).await?;
        Ok(contiguous_from(&spans, position))
    }

    /// Vrai si `[position, position + length)` est entièrement en cache
    async fn is_cached(&self, key: &str, position: u64, length: u64) -> Result<bool> {
        if length == 0 {
            return Ok(true);
        }
        Ok(self.cached_bytes(key, position).await? >= length)
    }

    /// Lit des octets en cache à partir de `position`
    ///
    /// Retourne [`CacheError::Vanished`] si aucun segment ne couvre la position
    /// ou si le fichier du segment a disparu.
    async fn read_at(&self, key: &str, position: u64, buf: &mut [u8]) -> Result<usize>;

    /// Réserve un segment commençant à `position` et ouvre son fichier temporaire
    async fn start_write(&self, key: &str, position: u64) -> Result<SpanWriter>;

    /// Rend durable le segment écrit. Un segment vide n'est pas indexé.
    async fn commit(&self, writer: SpanWriter) -> Result<Option<CachedSpan>>;

    /// Abandonne une réservation sans rien indexer
    async fn release(&self, writer: SpanWriter) -> Result<()>;
}

/// Réservation d'un couple (clé, offset) tant qu'un écrivain est vivant
#[derive(Debug)]
struct WriterSlot {
    active: Arc<Mutex<HashSet<String>>>,
    stem: String,
}

impl Drop for WriterSlot {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        active.remove(&self.stem);
    }
}

/// Écrivain d'un segment en cours
///
/// Les octets sont accumulés dans un fichier `.part`. Si l'écrivain est
/// détruit sans avoir été commité, le fichier est supprimé.
#[derive(Debug)]
pub struct SpanWriter {
    key: String,
    offset: u64,
    written: u64,
    file: Option<File>,
    part_path: Option<PathBuf>,
    _slot: WriterSlot,
}

impl SpanWriter {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Nombre d'octets écrits jusqu'ici
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Position qui suit le dernier octet écrit
    pub fn position(&self) -> u64 {
        self.offset + self.written
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| CacheError::vanished(self.key.clone(), self.offset + self.written))?;
        file.write_all(data).await?;
        self.written += data.len() as u64;
        Ok(())
    }
}

impl Drop for SpanWriter {
    fn drop(&mut self) {
        self.file.take();
        if let Some(path) = self.part_path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(
                    "Abandoned span {}@{} ({} bytes discarded)",
                    self.key, self.offset, self.written
                ),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Unable to remove partial span {}: {}", path.display(), e),
            }
        }
    }
}

/// Cache de segments stocké dans un répertoire, indexé par SQLite
///
/// La taille totale est bornée par `max_bytes` : après chaque commit, les
/// segments les moins récemment utilisés sont évincés.
#[derive(Debug)]
pub struct DiskSpanCache {
    dir: PathBuf,
    max_bytes: u64,
    db: Arc<DB>,
    writers: Arc<Mutex<HashSet<String>>>,
}

fn key_hash(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

fn span_stem(key: &str, offset: u64) -> String {
    format!("{}.{}", key_hash(key), offset)
}

impl DiskSpanCache {
    /// Ouvre (ou crée) un cache dans `dir`
    ///
    /// # Exemple
    ///
    /// ```rust,no_run
    /// use pmocache::DiskSpanCache;
    ///
    /// let cache = DiskSpanCache::new("./cache_stream", 2 * 1024 * 1024 * 1024).unwrap();
    /// ```
    pub fn new(dir: impl AsRef<Path>, max_bytes: u64) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let db = DB::init(&dir.join(DB_FILE))?;
        Ok(Self {
            dir,
            max_bytes,
            db: Arc::new(db),
            writers: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn database(&self) -> Arc<DB> {
        self.db.clone()
    }

    /// Chemin du fichier d'un segment commité
    pub fn span_path(&self, key: &str, offset: u64) -> PathBuf {
        self.dir.join(format!("{}.{}", span_stem(key, offset), SPAN_EXT))
    }

    fn part_path(&self, key: &str, offset: u64) -> PathBuf {
        self.dir.join(format!("{}.{}", span_stem(key, offset), PART_EXT))
    }

    pub fn total_bytes(&self) -> Result<u64> {
        Ok(self.db.total_bytes()?)
    }

    fn forget(&self, entry: &SpanEntry) -> Result<()> {
        match std::fs::remove_file(self.dir.join(&entry.file)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.db.delete_span(&entry.key, entry.offset)?;
        Ok(())
    }

    /// Applique la limite de taille en évinçant les segments les plus anciens
    ///
    /// # Returns
    ///
    /// Le nombre de segments supprimés
    pub async fn enforce_limit(&self) -> Result<usize> {
        // 0 = illimité
        if self.max_bytes == 0 {
            return Ok(0);
        }
        let before = self.db.total_bytes()?;
        let mut total = before;
        let mut removed = 0;

        while total > self.max_bytes {
            let oldest = self.db.get_oldest(EVICTION_BATCH)?;
            if oldest.is_empty() {
                break;
            }
            for entry in oldest {
                if total <= self.max_bytes {
                    break;
                }
                if let Err(e) = self.forget(&entry) {
                    warn!("Error evicting span {}@{}: {}", entry.key, entry.offset, e);
                    continue;
                }
                total = total.saturating_sub(entry.length);
                removed += 1;
            }
        }

        if removed > 0 {
            info!(
                "LRU eviction: removed {} spans (cache size: {} -> {} bytes)",
                removed, before, total
            );
        }
        Ok(removed)
    }

    /// Vide entièrement le cache
    pub async fn purge(&self) -> Result<()> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|e| e == SPAN_EXT) {
                tokio::fs::remove_file(path).await?;
            }
        }
        self.db.purge()?;
        Ok(())
    }

    /// Remet l'index et le répertoire en cohérence
    ///
    /// Supprime les entrées dont le fichier a disparu, les fichiers de segment
    /// non indexés, et les fichiers `.part` qui n'appartiennent à aucun
    /// écrivain actif (restes d'un arrêt brutal).
    ///
    /// # Returns
    ///
    /// Le nombre d'éléments nettoyés
    pub async fn consolidate(&self) -> Result<usize> {
        let mut cleaned = 0;

        let entries = self.db.get_all()?;
        let mut indexed = HashSet::new();
        for entry in entries {
            if self.dir.join(&entry.file).exists() {
                indexed.insert(entry.file);
            } else {
                self.db.delete_span(&entry.key, entry.offset)?;
                cleaned += 1;
            }
        }

        let active: HashSet<String> = self
            .writers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();

        let mut dir_entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = dir_entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let stale = match path.extension().and_then(|e| e.to_str()) {
                Some(SPAN_EXT) => !indexed.contains(name),
                Some(PART_EXT) => path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|stem| !active.contains(stem)),
                _ => false,
            };
            if stale {
                tokio::fs::remove_file(&path).await?;
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            info!("Cache consolidation: cleaned {} stale items", cleaned);
        }
        Ok(cleaned)
    }
}

#[async_trait]
impl SpanCache for DiskSpanCache {
    async fn spans(&self, key: &str) -> Result<Vec<CachedSpan>> {
        Ok(self
            .db
            .spans_for(key)?
            .into_iter()
            .map(CachedSpan::from)
            .collect())
    }

    async fn read_at(&self, key: &str, position: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let span = self
            .db
            .spans_for(key)?
            .into_iter()
            .filter(|s| s.offset <= position && s.end() > position)
            .max_by_key(|s| s.end())
            .ok_or_else(|| CacheError::vanished(key, position))?;

        let path = self.dir.join(&span.file);
        let mut file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Span file {} vanished, dropping index entry", path.display());
                self.db.delete_span(key, span.offset)?;
                return Err(CacheError::vanished(key, position));
            }
            Err(e) => return Err(e.into()),
        };

        file.seek(SeekFrom::Start(position - span.offset)).await?;
        let available = usize::try_from(span.end() - position).unwrap_or(usize::MAX);
        let max = available.min(buf.len());
        let n = file.read(&mut buf[..max]).await?;
        if n == 0 {
            warn!("Span file {} is truncated, dropping index entry", path.display());
            self.db.delete_span(key, span.offset)?;
            return Err(CacheError::vanished(key, position));
        }

        self.db.touch(key, span.offset)?;
        Ok(n)
    }

    async fn start_write(&self, key: &str, position: u64) -> Result<SpanWriter> {
        let stem = span_stem(key, position);
        {
            let mut active = self.writers.lock().unwrap_or_else(|p| p.into_inner());
            if !active.insert(stem.clone()) {
                return Err(CacheError::WriteInProgress {
                    key: key.to_string(),
                    offset: position,
                });
            }
        }
        let slot = WriterSlot {
            active: self.writers.clone(),
            stem,
        };

        let part_path = self.part_path(key, position);
        let file = File::create(&part_path).await?;
        debug!("Started span {}@{}", key, position);

        Ok(SpanWriter {
            key: key.to_string(),
            offset: position,
            written: 0,
            file: Some(file),
            part_path: Some(part_path),
            _slot: slot,
        })
    }

    async fn commit(&self, mut writer: SpanWriter) -> Result<Option<CachedSpan>> {
        if writer.written == 0 {
            return Ok(None);
        }

        if let Some(mut file) = writer.file.take() {
            file.flush().await?;
            file.sync_data().await?;
        }

        let Some(part_path) = writer.part_path.take() else {
            return Ok(None);
        };
        let final_path = self.span_path(&writer.key, writer.offset);
        if let Err(e) = tokio::fs::rename(&part_path, &final_path).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(e.into());
        }

        let file_name = final_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        self.db
            .insert_span(&writer.key, writer.offset, writer.written, &file_name)?;

        let span = CachedSpan {
            key: writer.key.clone(),
            offset: writer.offset,
            length: writer.written,
        };
        debug!("Committed span {}@{} ({} bytes)", span.key, span.offset, span.length);

        self.enforce_limit().await?;
        Ok(Some(span))
    }

    async fn release(&self, writer: SpanWriter) -> Result<()> {
        drop(writer);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(offset: u64, length: u64) -> CachedSpan {
        CachedSpan {
            key: "k".into(),
            offset,
            length,
        }
    }

    #[test]
    fn test_contiguous_from_chains_spans() {
        let spans = vec![span(100, 50), span(0, 100), span(200, 10)];
        assert_eq!(contiguous_from(&spans, 0), 150);
        assert_eq!(contiguous_from(&spans, 120), 30);
        assert_eq!(contiguous_from(&spans, 150), 0);
        assert_eq!(contiguous_from(&spans, 205), 5);
    }

    #[test]
    fn test_contiguous_from_overlapping_spans() {
        let spans = vec![span(0, 80), span(40, 20), span(60, 60)];
        assert_eq!(contiguous_from(&spans, 10), 110);
    }

    #[test]
    fn test_span_stem_is_stable() {
        assert_eq!(span_stem("abc", 42), span_stem("abc", 42));
        assert_ne!(span_stem("abc", 42), span_stem("abd", 42));
        assert!(span_stem("abc", 42).ends_with(".42"));
    }
}
