//! PlaybackSession - Pilote la lecture d'une file vers un sink
//!
//! Pour chaque piste de la file, la session ouvre une [`DataSession`] à partir
//! de la position 0 et recopie les octets dans le sink. Une faute est soumise
//! au [`RetryController`] : la session attend le délai proposé puis rouvre la
//! piste à la position atteinte, ou passe à la piste suivante si aucun délai
//! n'est proposé.
//!
//! [`DataSession`]: crate::datasource::DataSession

use crate::datasource::LayeredDataSource;
use crate::feeder::RadioFeeder;
use crate::queue::MemoryQueue;
use crate::retry::RetryController;
use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

const PUMP_BUFFER_SIZE: usize = 64 * 1024;

/// Prédicat « faut-il mettre cette piste en cache »
pub type CachePolicy = Arc<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Played { key: String, bytes: u64 },
    Skipped { key: String, reason: String },
}

impl TrackOutcome {
    pub fn key(&self) -> &str {
        match self {
            Self::Played { key, .. } | Self::Skipped { key, .. } => key,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlaybackReport {
    pub outcomes: Vec<TrackOutcome>,
}

impl PlaybackReport {
    pub fn played(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, TrackOutcome::Played { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.played()
    }

    pub fn total_bytes(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| match o {
                TrackOutcome::Played { bytes, .. } => *bytes,
                TrackOutcome::Skipped { .. } => 0,
            })
            .sum()
    }
}

pub struct PlaybackSession {
    source: LayeredDataSource,
    controller: RetryController,
    feeder: Option<RadioFeeder>,
    queue: MemoryQueue,
    should_cache: CachePolicy,
    max_tracks: Option<usize>,
}

impl PlaybackSession {
    pub fn new(source: LayeredDataSource, queue: MemoryQueue, controller: RetryController) -> Self {
        Self {
            source,
            controller,
            feeder: None,
            queue,
            should_cache: Arc::new(|_: &str| true),
            max_tracks: None,
        }
    }

    /// Active le mode radio
    pub fn with_radio(mut self, feeder: RadioFeeder) -> Self {
        self.feeder = Some(feeder);
        self
    }

    pub fn with_cache_policy(mut self, should_cache: CachePolicy) -> Self {
        self.should_cache = should_cache;
        self
    }

    /// Arrête la lecture après `max_tracks` pistes (jouées ou sautées)
    pub fn with_max_tracks(mut self, max_tracks: usize) -> Self {
        self.max_tracks = Some(max_tracks);
        self
    }

    pub fn queue(&self) -> &MemoryQueue {
        &self.queue
    }

    pub fn controller(&self) -> &RetryController {
        &self.controller
    }

    /// Joue la file jusqu'à son terme
    ///
    /// Seules les erreurs d'écriture dans le sink interrompent la lecture ;
    /// les fautes de lecture se traduisent par des reprises ou des pistes
    /// sautées.
    pub async fn play<W>(&mut self, sink: &mut W) -> Result<PlaybackReport>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let mut report = PlaybackReport::default();

        loop {
            if self
                .max_tracks
                .is_some_and(|max| report.outcomes.len() >= max)
            {
                info!("PlaybackSession: Track limit reached");
                break;
            }

            let key = match self.queue.current() {
                Some(track) => {
                    info!("PlaybackSession: Playing {}", track.display_name());
                    track.video_id.clone()
                }
                None => {
                    // File vide (pistes sautées avant tout démarrage) : dernière
                    // chance pour la radio
                    let added = match self.feeder.as_mut() {
                        Some(feeder) => feeder.maybe_extend(&mut self.queue).await,
                        None => 0,
                    };
                    if added == 0 {
                        break;
                    }
                    continue;
                }
            };

            let outcome = self.play_track(&key, sink).await?;
            report.outcomes.push(outcome);
            self.queue.advance();
        }

        sink.flush().await?;
        self.source.resolver().flush().await;
        info!(
            "PlaybackSession: Finished ({} played, {} skipped, {} bytes)",
            report.played(),
            report.skipped(),
            report.total_bytes()
        );
        Ok(report)
    }

    async fn play_track<W>(&mut self, key: &str, sink: &mut W) -> Result<TrackOutcome>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let mut buf = vec![0u8; PUMP_BUFFER_SIZE];
        let mut position = 0u64;
        let mut started = false;

        loop {
            let fresh = self.controller.consume_force_fresh_resolve(key);
            let opened = if fresh {
                debug!("PlaybackSession: Forcing fresh resolution for {}", key);
                self.source
                    .open_fresh(key, position, None, self.should_cache.as_ref())
                    .await
            } else {
                self.source
                    .open(key, position, None, self.should_cache.as_ref())
                    .await
            };

            let fault = match opened {
                Err(fault) => fault,
                Ok(mut data) => loop {
                    match data.read(&mut buf).await {
                        Ok(0) => {
                            data.close().await;
                            info!("PlaybackSession: Finished {} ({} bytes)", key, position);
                            return Ok(TrackOutcome::Played {
                                key: key.to_string(),
                                bytes: position,
                            });
                        }
                        Ok(n) => {
                            sink.write_all(&buf[..n]).await?;
                            position += n as u64;
                            if !started {
                                started = true;
                                self.controller.reset(key);
                                if let Some(feeder) = self.feeder.as_mut() {
                                    feeder.maybe_extend(&mut self.queue).await;
                                }
                            }
                        }
                        Err(fault) => {
                            data.close().await;
                            break fault;
                        }
                    }
                },
            };

            match self.controller.next_retry_delay(key, &fault) {
                Some(delay) => {
                    warn!(
                        "PlaybackSession: {} failed at byte {} ({}), retrying in {:?}",
                        key, position, fault, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    warn!("PlaybackSession: Skipping {}: {}", key, fault);
                    self.controller.reset(key);
                    return Ok(TrackOutcome::Skipped {
                        key: key.to_string(),
                        reason: fault.to_string(),
                    });
                }
            }
        }
    }
}
