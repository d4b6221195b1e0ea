//! Extension pour intégrer la configuration du pipeline de lecture dans pmoconfig
//!
//! Ce module fournit le trait `StreamConfigExt` qui ajoute à
//! `pmoconfig::Config` les réglages des sections `stream`, `innertube` et
//! `radio`, ainsi que des fabriques qui assemblent le pipeline complet.

use crate::api::{InnerTubeClient, InnerTubeSettings};
use crate::datasource::{LayeredDataSource, DEFAULT_CHUNK_SIZE};
use crate::feeder::DEFAULT_RADIO_THRESHOLD;
use crate::format_store::{FormatStore, SqliteFormatStore};
use crate::opener::{HttpRangeOpener, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
use crate::resolver::{ResolverSettings, StreamResolver, DEFAULT_PREFERRED_ITAGS, DEFAULT_RING_TTL};
use crate::retry::{RetryController, DEFAULT_RETRY_SCHEDULE_MS};
use anyhow::Result;
use pmocache::CacheConfigExt;
use pmoconfig::Config;
use serde_yaml::{Number, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_FORMATS_DB: &str = "formats.db";

/// Trait d'extension pour la configuration du pipeline de lecture
///
/// # Exemple
///
/// ```rust,ignore
/// use pmoconfig::get_config;
/// use pmoytmusic::StreamConfigExt;
///
/// let config = get_config();
/// let client = Arc::new(config.create_innertube_client()?);
/// let source = config.create_data_source(client)?;
/// ```
pub trait StreamConfigExt {
    /// Taille des blocs demandés au réseau
    fn get_stream_chunk_size(&self) -> Result<u64>;

    fn set_stream_chunk_size(&self, chunk_size: u64) -> Result<()>;

    /// Durée de vie maximale d'une URL mémorisée
    fn get_stream_ring_ttl(&self) -> Result<Duration>;

    /// Échéancier des reprises
    fn get_stream_retry_schedule(&self) -> Result<Vec<Duration>>;

    fn set_stream_retry_schedule_ms(&self, schedule_ms: &[u64]) -> Result<()>;

    fn get_stream_connect_timeout(&self) -> Result<Duration>;

    fn get_stream_read_timeout(&self) -> Result<Duration>;

    /// Liste blanche des itags, par ordre de préférence
    fn get_stream_preferred_itags(&self) -> Result<Vec<u32>>;

    /// Chemin de la base des formats (relatif au répertoire de configuration)
    fn get_stream_formats_db(&self) -> Result<PathBuf>;

    fn get_innertube_settings(&self) -> Result<InnerTubeSettings>;

    /// Nombre de pistes restantes sous lequel la radio est relancée
    fn get_radio_threshold(&self) -> Result<usize>;

    fn set_radio_threshold(&self, threshold: usize) -> Result<()>;

    fn create_innertube_client(&self) -> Result<InnerTubeClient>;

    fn create_format_store(&self) -> Result<Arc<dyn FormatStore>>;

    fn create_retry_controller(&self) -> Result<RetryController>;

    fn create_resolver(&self, client: Arc<InnerTubeClient>) -> Result<Arc<StreamResolver>>;

    /// Assemble résolveur, cache (avec sa garde) et ouvreur HTTP
    fn create_data_source(self: &Arc<Self>, client: Arc<InnerTubeClient>) -> Result<LayeredDataSource>;
}

fn get_u64_or(config: &Config, path: &[&str], default: u64) -> u64 {
    match config.get_value(path) {
        Ok(Value::Number(n)) => n.as_u64().unwrap_or(default),
        _ => default,
    }
}

fn get_string_or(config: &Config, path: &[&str], default: &str) -> String {
    match config.get_value(path) {
        Ok(Value::String(s)) if !s.is_empty() => s,
        _ => default.to_string(),
    }
}

impl StreamConfigExt for Config {
    fn get_stream_chunk_size(&self) -> Result<u64> {
        Ok(get_u64_or(self, &["stream", "chunk_size"], DEFAULT_CHUNK_SIZE).max(1))
    }

    fn set_stream_chunk_size(&self, chunk_size: u64) -> Result<()> {
        self.set_value(&["stream", "chunk_size"], Value::Number(Number::from(chunk_size)))
    }

    fn get_stream_ring_ttl(&self) -> Result<Duration> {
        Ok(Duration::from_secs(get_u64_or(
            self,
            &["stream", "ring_ttl_secs"],
            DEFAULT_RING_TTL.as_secs(),
        )))
    }

    fn get_stream_retry_schedule(&self) -> Result<Vec<Duration>> {
        let schedule = self.get_u64_list(&["stream", "retry_schedule_ms"], &DEFAULT_RETRY_SCHEDULE_MS)?;
        Ok(schedule.into_iter().map(Duration::from_millis).collect())
    }

    fn set_stream_retry_schedule_ms(&self, schedule_ms: &[u64]) -> Result<()> {
        self.set_u64_list(&["stream", "retry_schedule_ms"], schedule_ms)
    }

    fn get_stream_connect_timeout(&self) -> Result<Duration> {
        Ok(Duration::from_secs(get_u64_or(
            self,
            &["stream", "connect_timeout_secs"],
            DEFAULT_CONNECT_TIMEOUT.as_secs(),
        )))
    }

    fn get_stream_read_timeout(&self) -> Result<Duration> {
        Ok(Duration::from_secs(get_u64_or(
            self,
            &["stream", "read_timeout_secs"],
            DEFAULT_READ_TIMEOUT.as_secs(),
        )))
    }

    fn get_stream_preferred_itags(&self) -> Result<Vec<u32>> {
        let defaults: Vec<u64> = DEFAULT_PREFERRED_ITAGS.iter().map(|i| u64::from(*i)).collect();
        let itags = self.get_u64_list(&["stream", "preferred_itags"], &defaults)?;
        Ok(itags
            .into_iter()
            .filter_map(|i| u32::try_from(i).ok())
            .collect())
    }

    fn get_stream_formats_db(&self) -> Result<PathBuf> {
        let name = get_string_or(self, &["stream", "formats_db"], DEFAULT_FORMATS_DB);
        let path = PathBuf::from(name);
        Ok(if path.is_absolute() {
            path
        } else {
            self.dir().join(path)
        })
    }

    fn get_innertube_settings(&self) -> Result<InnerTubeSettings> {
        let defaults = InnerTubeSettings::default();
        Ok(InnerTubeSettings {
            base_url: get_string_or(self, &["innertube", "base_url"], &defaults.base_url),
            client_name: get_string_or(self, &["innertube", "client_name"], &defaults.client_name),
            client_version: get_string_or(self, &["innertube", "client_version"], &defaults.client_version),
            hl: get_string_or(self, &["innertube", "hl"], &defaults.hl),
            gl: get_string_or(self, &["innertube", "gl"], &defaults.gl),
        })
    }

    fn get_radio_threshold(&self) -> Result<usize> {
        let threshold = get_u64_or(self, &["radio", "threshold"], DEFAULT_RADIO_THRESHOLD as u64);
        Ok(usize::try_from(threshold).unwrap_or(DEFAULT_RADIO_THRESHOLD))
    }

    fn set_radio_threshold(&self, threshold: usize) -> Result<()> {
        self.set_value(
            &["radio", "threshold"],
            Value::Number(Number::from(threshold as u64)),
        )
    }

    fn create_innertube_client(&self) -> Result<InnerTubeClient> {
        Ok(InnerTubeClient::new(self.get_innertube_settings()?)?)
    }

    fn create_format_store(&self) -> Result<Arc<dyn FormatStore>> {
        let path = self.get_stream_formats_db()?;
        Ok(Arc::new(SqliteFormatStore::open(&path)?))
    }

    fn create_retry_controller(&self) -> Result<RetryController> {
        Ok(RetryController::new(self.get_stream_retry_schedule()?))
    }

    fn create_resolver(&self, client: Arc<InnerTubeClient>) -> Result<Arc<StreamResolver>> {
        let settings = ResolverSettings {
            preferred_itags: self.get_stream_preferred_itags()?,
            ring_ttl: self.get_stream_ring_ttl()?,
        };
        Ok(Arc::new(StreamResolver::new(
            client,
            self.create_format_store()?,
            settings,
        )))
    }

    fn create_data_source(self: &Arc<Self>, client: Arc<InnerTubeClient>) -> Result<LayeredDataSource> {
        let resolver = self.create_resolver(client)?;
        let cache = self.create_span_cache()?;
        let opener = HttpRangeOpener::new(
            self.get_stream_connect_timeout()?,
            self.get_stream_read_timeout()?,
        )?;
        Ok(LayeredDataSource::new(resolver, cache, Arc::new(opener))
            .with_chunk_size(self.get_stream_chunk_size()?))
    }
}
