//! Garde lecture seule conditionnelle
//!
//! Enveloppe un [`SpanCache`] et consulte un prédicat avant chaque mutation.
//! Tant que le prédicat retourne `true`, `start_write`, `commit` et `release`
//! échouent avec [`CacheError::ReadOnly`] ; les lectures passent sans changement.
//! Un `commit` ou un `release` refusé rend l'écrivain dans l'erreur, sans
//! toucher à son fichier temporaire ni à sa réservation.
//! Le prédicat est réévalué à chaque appel, ce qui permet de basculer la
//! politique (restauration en cours, disque presque plein...) sans recréer le cache.

use crate::error::{CacheError, Result};
use crate::span_cache::{CachedSpan, SpanCache, SpanWriter};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

pub type ReadOnlyPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

pub struct ReadOnlyGate {
    inner: Arc<dyn SpanCache>,
    is_read_only: ReadOnlyPredicate,
}

impl ReadOnlyGate {
    pub fn new(inner: Arc<dyn SpanCache>, is_read_only: ReadOnlyPredicate) -> Self {
        Self {
            inner,
            is_read_only,
        }
    }

    /// Garde pilotée par un simple drapeau partagé
    ///
    /// ```rust,no_run
    /// use pmocache::{DiskSpanCache, ReadOnlyGate};
    /// use std::sync::atomic::{AtomicBool, Ordering};
    /// use std::sync::Arc;
    ///
    /// let flag = Arc::new(AtomicBool::new(false));
    /// let cache = Arc::new(DiskSpanCache::new("./cache", 1 << 30).unwrap());
    /// let gate = ReadOnlyGate::from_flag(cache, flag.clone());
    /// flag.store(true, Ordering::SeqCst); // plus aucune écriture
    /// ```
    pub fn from_flag(inner: Arc<dyn SpanCache>, flag: Arc<AtomicBool>) -> Self {
        Self::new(inner, Arc::new(move || flag.load(Ordering::SeqCst)))
    }

    pub fn is_read_only(&self) -> bool {
        (self.is_read_only)()
    }

    fn check_writable(&self, operation: &str) -> Result<()> {
        if self.is_read_only() {
            debug!("Cache is read-only, rejecting {}", operation);
            return Err(CacheError::read_only());
        }
        Ok(())
    }
}

fn rejected(writer: SpanWriter) -> CacheError {
    CacheError::ReadOnly {
        writer: Some(Box::new(writer)),
    }
}

#[async_trait]
impl SpanCache for ReadOnlyGate {
    async fn spans(&self, key: &str) -> Result<Vec<CachedSpan>> {
        self.inner.spans(key).await
    }

    async fn cached_bytes(&self, key: &str, position: u64) -> Result<u64> {
        self.inner.cached_bytes(key, position).await
    }

    async fn read_at(&self, key: &str, position: u64, buf: &mut [u8]) -> Result<usize> {
        self.inner.read_at(key, position, buf).await
    }

    async fn start_write(&self, key: &str, position: u64) -> Result<SpanWriter> {
        self.check_writable("start_write")?;
        self.inner.start_write(key, position).await
    }

    async fn commit(&self, writer: SpanWriter) -> Result<Option<CachedSpan>> {
        if self.check_writable("commit").is_err() {
            return Err(rejected(writer));
        }
        self.inner.commit(writer).await
    }

    async fn release(&self, writer: SpanWriter) -> Result<()> {
        if self.check_writable("release").is_err() {
            return Err(rejected(writer));
        }
        self.inner.release(writer).await
    }
}
