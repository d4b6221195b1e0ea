//! Résolveur de flux
//!
//! Transforme une clé de piste en URL servant des plages d'octets :
//! 1. consulte la mémoire des deux dernières résolutions ;
//! 2. sinon appelle `/player`, choisit le meilleur format audio et
//!    enregistre ses métadonnées en tâche de fond.
//!
//! Les résolutions d'une même clé sont sérialisées : deux lectures
//! concurrentes de la même piste ne déclenchent qu'un seul appel distant.

use crate::cipher::{SignatureDecipher, UnsignedOnly};
use crate::error::ResolutionError;
use crate::format_store::FormatStore;
use crate::models::{
    format_duration_text, FormatRecord, PlayabilityStatus, PlayableUrl, StreamDescriptor,
    StreamLocator,
};
use crate::remote::ResolutionClient;
use crate::ring::{RecentResolutions, RingEntry};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Formats audio connus pour être fiables
pub const DEFAULT_PREFERRED_ITAGS: [u32; 7] = [141, 251, 140, 250, 249, 171, 139];
pub const DEFAULT_RING_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub preferred_itags: Vec<u32>,
    /// Durée de vie maximale d'une URL mémorisée
    pub ring_ttl: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            preferred_itags: DEFAULT_PREFERRED_ITAGS.to_vec(),
            ring_ttl: DEFAULT_RING_TTL,
        }
    }
}

/// Classe les formats par ordre de préférence
///
/// Les formats de la liste blanche passent devant, triés par débit
/// décroissant ; l'ordre du fournisseur départage les égalités. Les autres
/// formats suivent, également par débit décroissant.
pub fn rank_formats<'a>(
    formats: &'a [StreamDescriptor],
    preferred_itags: &[u32],
) -> Vec<&'a StreamDescriptor> {
    let (mut preferred, mut others): (Vec<_>, Vec<_>) = formats
        .iter()
        .partition(|f| preferred_itags.contains(&f.itag));
    preferred.sort_by(|a, b| b.bitrate.cmp(&a.bitrate));
    others.sort_by(|a, b| b.bitrate.cmp(&a.bitrate));
    preferred.extend(others);
    preferred
}

/// Choisit le format à jouer
pub fn select_format<'a>(
    formats: &'a [StreamDescriptor],
    preferred_itags: &[u32],
) -> Option<&'a StreamDescriptor> {
    rank_formats(formats, preferred_itags).into_iter().next()
}

pub struct StreamResolver {
    client: Arc<dyn ResolutionClient>,
    store: Arc<dyn FormatStore>,
    decipher: Arc<dyn SignatureDecipher>,
    settings: ResolverSettings,
    ring: Mutex<RecentResolutions>,
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    tracker: TaskTracker,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl StreamResolver {
    pub fn new(
        client: Arc<dyn ResolutionClient>,
        store: Arc<dyn FormatStore>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            client,
            store,
            decipher: Arc::new(UnsignedOnly),
            settings,
            ring: Mutex::new(RecentResolutions::new()),
            in_flight: Mutex::new(HashMap::new()),
            tracker: TaskTracker::new(),
        }
    }

    /// Remplace le déchiffreur de `signatureCipher`
    pub fn with_decipher(mut self, decipher: Arc<dyn SignatureDecipher>) -> Self {
        self.decipher = decipher;
        self
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    pub fn format_store(&self) -> Arc<dyn FormatStore> {
        self.store.clone()
    }

    /// Résout une clé, en réutilisant une URL récente si possible
    pub async fn resolve(
        &self,
        track_key: &str,
        requested_range_start: u64,
    ) -> Result<PlayableUrl, ResolutionError> {
        let key_lock = self.key_lock(track_key);
        let result = {
            let _guard = key_lock.lock().await;
            match self.ring_lookup(track_key) {
                Some(hit) => {
                    debug!(
                        "Ring hit for {} (range start {})",
                        track_key, requested_range_start
                    );
                    Ok(hit)
                }
                None => self.resolve_remote(track_key, requested_range_start).await,
            }
        };
        self.release_key_lock(track_key, key_lock);
        result
    }

    /// Résout une clé en ignorant la mémoire des résolutions récentes
    pub async fn resolve_fresh(
        &self,
        track_key: &str,
        requested_range_start: u64,
    ) -> Result<PlayableUrl, ResolutionError> {
        let key_lock = self.key_lock(track_key);
        let result = {
            let _guard = key_lock.lock().await;
            if lock(&self.ring).remove(track_key) {
                debug!("Dropped memoized URL for {}", track_key);
            }
            self.resolve_remote(track_key, requested_range_start).await
        };
        self.release_key_lock(track_key, key_lock);
        result
    }

    /// Attend la fin des enregistrements de métadonnées en cours
    pub async fn flush(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn key_lock(&self, track_key: &str) -> Arc<tokio::sync::Mutex<()>> {
        lock(&self.in_flight)
            .entry(track_key.to_string())
            .or_default()
            .clone()
    }

    fn release_key_lock(&self, track_key: &str, key_lock: Arc<tokio::sync::Mutex<()>>) {
        let mut in_flight = lock(&self.in_flight);
        // Une référence pour la table, une pour nous : personne n'attend
        if Arc::strong_count(&key_lock) <= 2 {
            in_flight.remove(track_key);
        }
    }

    fn ring_lookup(&self, track_key: &str) -> Option<PlayableUrl> {
        lock(&self.ring)
            .get(track_key, Instant::now())
            .map(|entry| PlayableUrl {
                url: entry.url.clone(),
                itag: entry.itag,
                content_length: entry.content_length,
                from_ring: true,
            })
    }

    fn locator_url(&self, descriptor: &StreamDescriptor) -> Option<String> {
        match &descriptor.locator {
            StreamLocator::Url(url) => Some(url.clone()),
            StreamLocator::Cipher(cipher) => self.decipher.decipher(cipher),
        }
    }

    async fn resolve_remote(
        &self,
        track_key: &str,
        requested_range_start: u64,
    ) -> Result<PlayableUrl, ResolutionError> {
        debug!(
            "Resolving {} via remote (range start {})",
            track_key, requested_range_start
        );
        let response = self
            .client
            .player(track_key)
            .await
            .map_err(|e| e.into_resolution_error())?;

        match response.status {
            PlayabilityStatus::Ok => {}
            PlayabilityStatus::Unplayable(reason) => {
                return Err(ResolutionError::Unplayable(reason.unwrap_or_default()));
            }
            PlayabilityStatus::LoginRequired(reason) => {
                return Err(ResolutionError::LoginRequired(reason.unwrap_or_default()));
            }
            PlayabilityStatus::Other { status, .. } => {
                return Err(ResolutionError::Remote(status));
            }
        }

        let (descriptor, url) = rank_formats(&response.formats, &self.settings.preferred_itags)
            .into_iter()
            .find_map(|d| self.locator_url(d).map(|url| (d, url)))
            .ok_or(ResolutionError::NoPlayableFormat)?;

        info!(
            "Resolved {} to itag {} ({} bps, {})",
            track_key, descriptor.itag, descriptor.bitrate, descriptor.mime_type
        );

        let mut record = FormatRecord::from(descriptor);
        if record.loudness_db.is_none() {
            record.loudness_db = response.loudness_db;
        }
        let duration_ms = descriptor.approx_duration_ms.or(response.approx_duration_ms);
        self.persist(track_key, record, duration_ms);

        let ttl = response
            .expires_in_seconds
            .map(Duration::from_secs)
            .map_or(self.settings.ring_ttl, |d| d.min(self.settings.ring_ttl));
        lock(&self.ring).push(RingEntry {
            key: track_key.to_string(),
            url: url.clone(),
            itag: descriptor.itag,
            content_length: descriptor.content_length,
            expires_at: Instant::now() + ttl,
        });

        Ok(PlayableUrl {
            url,
            itag: descriptor.itag,
            content_length: descriptor.content_length,
            from_ring: false,
        })
    }

    fn persist(&self, track_key: &str, record: FormatRecord, duration_ms: Option<u64>) {
        let store = self.store.clone();
        let track_key = track_key.to_string();
        self.tracker.spawn(async move {
            if let Err(e) = store.insert_format(&track_key, &record) {
                warn!("Unable to persist format for {}: {}", track_key, e);
            }
            let Some(duration_ms) = duration_ms else {
                return;
            };
            match store.duration_text(&track_key) {
                Ok(Some(_)) => {}
                Ok(None) => {
                    let text = format_duration_text(duration_ms);
                    if let Err(e) = store.update_duration_text(&track_key, &text) {
                        warn!("Unable to persist duration for {}: {}", track_key, e);
                    }
                }
                Err(e) => warn!("Unable to read duration for {}: {}", track_key, e),
            }
        });
    }
}
