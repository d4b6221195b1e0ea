//! Source de données en couches : cache disque puis réseau
//!
//! Une [`DataSession`] sert une plage d'octets d'une piste :
//! - depuis le cache tant que des segments contigus sont disponibles ;
//! - sinon depuis le réseau, par blocs bornés (`chunk_size`), en écrivant les
//!   octets reçus dans le cache au passage (write-through).
//!
//! Replis (au plus un par classe de faute et par session) :
//! - fichier de cache disparu pendant une lecture : la session passe en mode
//!   réseau seul et relit la même position depuis le réseau ;
//! - cache en lecture seule ou introuvable à l'ouverture d'une écriture : la
//!   session continue sans écrire ;
//! - HTTP 416 ou fin de flux prématurée : réouverture sans borne de fin.
//!
//! Un flux qui se termine proprement avant la fin du bloc ou de la piste est
//! traité comme une fin prématurée. Quand la longueur de la piste est
//! inconnue, un 416 au-delà de l'octet 0 marque la fin de la piste.

use crate::error::{NetworkError, PlaybackFault};
use crate::opener::{ByteRangeOpener, RangeStream};
use crate::resolver::StreamResolver;
use pmocache::{CacheError, SpanCache, SpanWriter};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_CHUNK_SIZE: u64 = 512 * 1024;

#[derive(Clone)]
pub struct LayeredDataSource {
    resolver: Arc<StreamResolver>,
    cache: Arc<dyn SpanCache>,
    opener: Arc<dyn ByteRangeOpener>,
    chunk_size: u64,
}

impl LayeredDataSource {
    pub fn new(
        resolver: Arc<StreamResolver>,
        cache: Arc<dyn SpanCache>,
        opener: Arc<dyn ByteRangeOpener>,
    ) -> Self {
        Self {
            resolver,
            cache,
            opener,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn resolver(&self) -> &Arc<StreamResolver> {
        &self.resolver
    }

    pub fn cache(&self) -> &Arc<dyn SpanCache> {
        &self.cache
    }

    /// Ouvre une session sur `[position, position + length)` (jusqu'à la fin
    /// de la piste si `length` vaut `None`)
    pub async fn open(
        &self,
        track_key: &str,
        position: u64,
        length: Option<u64>,
        should_cache: &(dyn Fn(&str) -> bool + Send + Sync),
    ) -> Result<DataSession, PlaybackFault> {
        self.open_session(track_key, position, length, should_cache(track_key), false)
            .await
    }

    /// Comme [`open`](Self::open), mais la première résolution ignore la
    /// mémoire des URLs récentes
    pub async fn open_fresh(
        &self,
        track_key: &str,
        position: u64,
        length: Option<u64>,
        should_cache: &(dyn Fn(&str) -> bool + Send + Sync),
    ) -> Result<DataSession, PlaybackFault> {
        self.open_session(track_key, position, length, should_cache(track_key), true)
            .await
    }

    async fn open_session(
        &self,
        track_key: &str,
        position: u64,
        length: Option<u64>,
        cache_writes: bool,
        fresh: bool,
    ) -> Result<DataSession, PlaybackFault> {
        let end = match length {
            Some(length) => Some(position + length),
            None => match self.resolver.format_store().lookup_format(track_key) {
                Ok(record) => record.and_then(|r| r.content_length),
                Err(e) => {
                    warn!("Format lookup failed for {}: {}", track_key, e);
                    None
                }
            },
        };

        let mut session = DataSession {
            source: self.clone(),
            key: track_key.to_string(),
            position,
            end,
            cache_writes,
            fresh_pending: fresh,
            network_only: false,
            open_ended: false,
            fallbacks: Fallbacks::default(),
            active: Active::Idle,
        };
        session.select_source().await?;
        Ok(session)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Fallbacks {
    vanished: bool,
    cache_open: bool,
    range: bool,
}

enum Active {
    Idle,
    Cache {
        until: u64,
    },
    Network {
        stream: Box<dyn RangeStream>,
        chunk_end: Option<u64>,
        writer: Option<SpanWriter>,
    },
}

enum Step {
    Data(usize),
    Select,
    Reopen,
    Eof,
}

/// Session de lecture ouverte par [`LayeredDataSource::open`]
///
/// `close()` rend durables les segments reçus ; détruire la session sans
/// la fermer abandonne l'écriture en cours.
pub struct DataSession {
    source: LayeredDataSource,
    key: String,
    position: u64,
    end: Option<u64>,
    cache_writes: bool,
    fresh_pending: bool,
    network_only: bool,
    open_ended: bool,
    fallbacks: Fallbacks,
    active: Active,
}

impl DataSession {
    pub fn track_key(&self) -> &str {
        &self.key
    }

    /// Position du prochain octet lu
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Fin (exclue) de la plage servie, si connue
    pub fn end(&self) -> Option<u64> {
        self.end
    }

    pub fn is_network_only(&self) -> bool {
        self.network_only
    }

    pub fn is_serving_from_cache(&self) -> bool {
        matches!(self.active, Active::Cache { .. })
    }

    /// Lit les octets suivants ; `Ok(0)` signifie la fin de la plage
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, PlaybackFault> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let want = match self.end {
                Some(end) if self.position >= end => {
                    self.commit_active().await;
                    return Ok(0);
                }
                Some(end) => buf.len().min(usize::try_from(end - self.position).unwrap_or(usize::MAX)),
                None => buf.len(),
            };

            let step = match &mut self.active {
                Active::Idle => Step::Select,

                Active::Cache { until } if self.position >= *until => Step::Select,

                Active::Cache { until } => {
                    let limit = want.min(usize::try_from(*until - self.position).unwrap_or(usize::MAX));
                    match self
                        .source
                        .cache
                        .read_at(&self.key, self.position, &mut buf[..limit])
                        .await
                    {
                        Ok(n) => Step::Data(n),
                        Err(e) if e.is_vanished() => {
                            if self.fallbacks.vanished {
                                return Err(e.into());
                            }
                            self.fallbacks.vanished = true;
                            self.network_only = true;
                            warn!(
                                "Cached data for {} vanished at {}, switching to network",
                                self.key, self.position
                            );
                            Step::Select
                        }
                        Err(e) => return Err(e.into()),
                    }
                }

                Active::Network {
                    stream,
                    chunk_end,
                    writer,
                } => {
                    let limit = match chunk_end {
                        Some(chunk_end) => want.min(
                            usize::try_from(*chunk_end - self.position).unwrap_or(usize::MAX),
                        ),
                        None => want,
                    };
                    if limit == 0 {
                        Step::Reopen
                    } else {
                        // Un flux qui se tarit avant la fin attendue est tronqué
                        let expected_more = chunk_end.is_some_and(|c| self.position < c)
                            || self.end.is_some_and(|e| self.position < e);
                        let result = match stream.read(&mut buf[..limit]).await {
                            Ok(0) if expected_more => {
                                Err(NetworkError::UnexpectedEof(self.position))
                            }
                            other => other,
                        };
                        match result {
                            Ok(0) => Step::Eof,
                            Ok(n) => {
                                if let Some(w) = writer.as_mut() {
                                    if let Err(e) = w.write(&buf[..n]).await {
                                        warn!("Write-through to cache failed for {}: {}", self.key, e);
                                        *writer = None;
                                    }
                                }
                                Step::Data(n)
                            }
                            Err(e) if e.is_range_fault() => {
                                if self.fallbacks.range {
                                    return Err(e.into());
                                }
                                self.fallbacks.range = true;
                                self.open_ended = true;
                                warn!(
                                    "{} on {} at {}, reopening without end bound",
                                    e, self.key, self.position
                                );
                                Step::Reopen
                            }
                            Err(e) => {
                                *writer = None;
                                return Err(e.into());
                            }
                        }
                    }
                }
            };

            match step {
                Step::Data(n) => {
                    self.position += n as u64;
                    return Ok(n);
                }
                Step::Select => {
                    self.active = Active::Idle;
                    self.select_source().await?;
                }
                Step::Reopen => {
                    self.commit_active().await;
                    self.select_source().await?;
                }
                Step::Eof => {
                    self.commit_active().await;
                    self.end = Some(self.position);
                    return Ok(0);
                }
            }
        }
    }

    /// Rend durable le segment en cours d'écriture
    pub async fn close(mut self) {
        self.commit_active().await;
    }

    async fn commit_active(&mut self) {
        if let Active::Network {
            writer: Some(writer),
            ..
        } = std::mem::replace(&mut self.active, Active::Idle)
        {
            match self.source.cache.commit(writer).await {
                Ok(Some(span)) => debug!(
                    "Cached {}@{} ({} bytes)",
                    span.key, span.offset, span.length
                ),
                Ok(None) => {}
                Err(e) => warn!("Unable to commit cached span for {}: {}", self.key, e),
            }
        }
    }

    /// Choisit la couche qui sert la position courante
    async fn select_source(&mut self) -> Result<(), PlaybackFault> {
        if let Some(end) = self.end {
            if self.position >= end {
                self.active = Active::Idle;
                return Ok(());
            }
        }

        if !self.network_only {
            let cached = match self.source.cache.cached_bytes(&self.key, self.position).await {
                Ok(n) => n,
                Err(e) => {
                    warn!("Cache lookup failed for {}: {}", self.key, e);
                    0
                }
            };
            if cached > 0 {
                let until = match self.end {
                    Some(end) => end.min(self.position + cached),
                    None => self.position + cached,
                };
                debug!(
                    "Serving {} [{}..{}) from cache",
                    self.key, self.position, until
                );
                self.active = Active::Cache { until };
                return Ok(());
            }
        }

        self.open_network().await
    }

    async fn open_network(&mut self) -> Result<(), PlaybackFault> {
        let resolver = &self.source.resolver;
        let playable = if std::mem::take(&mut self.fresh_pending) {
            resolver.resolve_fresh(&self.key, self.position).await?
        } else {
            resolver.resolve(&self.key, self.position).await?
        };

        if self.end.is_none() {
            self.end = playable.content_length;
        }
        if let Some(end) = self.end {
            if self.position >= end {
                self.active = Active::Idle;
                return Ok(());
            }
        }

        let length = if self.open_ended {
            None
        } else {
            let chunk = self.source.chunk_size;
            Some(match self.end {
                Some(end) => chunk.min(end - self.position),
                None => chunk,
            })
        };

        let stream = match self
            .source
            .opener
            .open(&playable.url, self.position, length)
            .await
        {
            Ok(stream) => stream,
            // Longueur inconnue : une plage qui commence au-delà de la fin
            // signifie que la piste a été lue en entier
            Err(NetworkError::RangeNotSatisfiable) if self.end.is_none() && self.position > 0 => {
                debug!("{} ends at {}", self.key, self.position);
                self.end = Some(self.position);
                self.active = Active::Idle;
                return Ok(());
            }
            Err(e) if e.is_range_fault() && length.is_some() && !self.fallbacks.range => {
                self.fallbacks.range = true;
                self.open_ended = true;
                warn!(
                    "{} opening {} at {}, retrying without end bound",
                    e, self.key, self.position
                );
                self.source
                    .opener
                    .open(&playable.url, self.position, None)
                    .await?
            }
            Err(e) => return Err(e.into()),
        };
        let chunk_end = if self.open_ended {
            None
        } else {
            length.map(|l| self.position + l)
        };

        if self.end.is_none() {
            self.end = stream.total_length();
        }

        let writer = self.start_writer().await?;
        debug!(
            "Streaming {} from network at {} (chunk end {:?}, caching: {})",
            self.key,
            self.position,
            chunk_end,
            writer.is_some()
        );
        self.active = Active::Network {
            stream,
            chunk_end,
            writer,
        };
        Ok(())
    }

    async fn start_writer(&mut self) -> Result<Option<SpanWriter>, PlaybackFault> {
        if !self.cache_writes || self.network_only {
            return Ok(None);
        }

        match self.source.cache.start_write(&self.key, self.position).await {
            Ok(writer) => Ok(Some(writer)),
            Err(e) if e.is_read_only() || e.is_vanished() => {
                if self.fallbacks.cache_open {
                    return Err(e.into());
                }
                self.fallbacks.cache_open = true;
                self.network_only = true;
                info!(
                    "Cache unavailable for {} ({}), streaming from network only",
                    self.key, e
                );
                Ok(None)
            }
            Err(CacheError::WriteInProgress { .. }) => {
                debug!("Span {}@{} is already being written", self.key, self.position);
                Ok(None)
            }
            Err(e) => {
                warn!("Unable to start caching {}: {}", self.key, e);
                Ok(None)
            }
        }
    }
}
