//! RadioFeeder - Alimente la file de lecture à partir d'une radio
//!
//! Quand il ne reste plus que `threshold` pistes (piste courante incluse), le
//! feeder demande une page au moteur de continuation et l'ajoute en fin de
//! file. La première page d'une radio commence en général par la piste de
//! départ, déjà présente dans la file : elle est écartée si elle correspond
//! à la piste en cours de lecture, ou à défaut à la piste de départ.

use crate::queue::LiveQueue;
use crate::radio::RadioContinuation;
use tracing::{debug, info};

pub const DEFAULT_RADIO_THRESHOLD: usize = 3;

pub struct RadioFeeder {
    engine: RadioContinuation,
    threshold: usize,
    seed_video_id: Option<String>,
    first: bool,
}

impl RadioFeeder {
    pub fn new(engine: RadioContinuation, threshold: usize) -> Self {
        let seed_video_id = engine.seed().video_id.clone();
        Self {
            engine,
            threshold,
            seed_video_id,
            first: true,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn engine(&self) -> &RadioContinuation {
        &self.engine
    }

    pub fn is_exhausted(&self) -> bool {
        self.engine.is_exhausted()
    }

    /// Complète la file si elle passe sous le seuil
    ///
    /// Retourne le nombre de pistes ajoutées.
    pub async fn maybe_extend<Q: LiveQueue + ?Sized>(&mut self, queue: &mut Q) -> usize {
        let remaining = queue.remaining_from_current();
        if remaining > self.threshold || self.engine.is_exhausted() {
            return 0;
        }

        debug!(
            "RadioFeeder: {} tracks remaining (threshold {}), fetching radio page",
            remaining, self.threshold
        );
        let mut tracks = self.engine.process().await;

        if std::mem::take(&mut self.first) {
            let duplicate = tracks.first().is_some_and(|first| {
                queue.current_video_id() == Some(first.video_id.as_str())
                    || self.seed_video_id.as_deref() == Some(first.video_id.as_str())
            });
            if duplicate {
                debug!("RadioFeeder: dropping {} already in the queue", tracks[0].video_id);
                tracks.remove(0);
            }
        }

        let added = tracks.len();
        if added > 0 {
            queue.append_tracks(tracks);
            info!("RadioFeeder: Added {} radio tracks to the queue", added);
        } else if self.engine.is_exhausted() {
            info!("RadioFeeder: Radio exhausted");
        }
        added
    }
}
