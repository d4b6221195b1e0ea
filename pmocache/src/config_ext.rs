//! Extension pour intégrer la gestion du cache de segments dans pmoconfig
//!
//! Ce module fournit le trait `CacheConfigExt` qui ajoute à
//! `pmoconfig::Config` les réglages de la section `stream.cache`.

use crate::{DiskSpanCache, ReadOnlyGate, SpanCache};
use anyhow::Result;
use pmoconfig::Config;
use serde_yaml::{Number, Value};
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_CACHE_DIR: &str = "cache_stream";
const DEFAULT_CACHE_MAX_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Trait d'extension pour ajouter la gestion du cache de segments à pmoconfig
///
/// # Exemple
///
/// ```rust,ignore
/// use pmoconfig::get_config;
/// use pmocache::CacheConfigExt;
///
/// let config = get_config();
/// let cache = config.create_span_cache()?;
/// ```
pub trait CacheConfigExt {
    /// Répertoire du cache (absolu, créé si besoin)
    fn get_span_cache_dir(&self) -> Result<PathBuf>;

    /// Taille maximale du cache en octets
    fn get_span_cache_max_bytes(&self) -> Result<u64>;

    fn set_span_cache_max_bytes(&self, max_bytes: u64) -> Result<()>;

    /// Vrai si les écritures dans le cache sont suspendues
    fn get_span_cache_read_only(&self) -> Result<bool>;

    fn set_span_cache_read_only(&self, read_only: bool) -> Result<()>;

    /// Crée le cache disque configuré, enveloppé dans une garde lecture seule
    /// pilotée par `stream.cache.read_only` (réévaluée à chaque écriture)
    fn create_span_cache(self: &Arc<Self>) -> Result<Arc<dyn SpanCache>>;
}

impl CacheConfigExt for Config {
    fn get_span_cache_dir(&self) -> Result<PathBuf> {
        self.get_managed_dir(&["stream", "cache", "directory"], DEFAULT_CACHE_DIR)
    }

    fn get_span_cache_max_bytes(&self) -> Result<u64> {
        match self.get_value(&["stream", "cache", "max_bytes"]) {
            Ok(Value::Number(n)) => Ok(n.as_u64().unwrap_or(DEFAULT_CACHE_MAX_BYTES)),
            _ => Ok(DEFAULT_CACHE_MAX_BYTES),
        }
    }

    fn set_span_cache_max_bytes(&self, max_bytes: u64) -> Result<()> {
        self.set_value(
            &["stream", "cache", "max_bytes"],
            Value::Number(Number::from(max_bytes)),
        )
    }

    fn get_span_cache_read_only(&self) -> Result<bool> {
        match self.get_value(&["stream", "cache", "read_only"]) {
            Ok(Value::Bool(b)) => Ok(b),
            _ => Ok(false),
        }
    }

    fn set_span_cache_read_only(&self, read_only: bool) -> Result<()> {
        self.set_value(&["stream", "cache", "read_only"], Value::Bool(read_only))
    }

    fn create_span_cache(self: &Arc<Self>) -> Result<Arc<dyn SpanCache>> {
        let dir = self.get_span_cache_dir()?;
        let max_bytes = self.get_span_cache_max_bytes()?;
        let disk: Arc<dyn SpanCache> = Arc::new(DiskSpanCache::new(&dir, max_bytes)?);

        let config = self.clone();
        let gate = ReadOnlyGate::new(
            disk,
            Arc::new(move || config.get_span_cache_read_only().unwrap_or(false)),
        );
        Ok(Arc::new(gate))
    }
}
