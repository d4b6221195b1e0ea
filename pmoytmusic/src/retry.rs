//! Contrôleur de reprise après faute de lecture
//!
//! Pour chaque piste, un compteur de tentatives parcourt un échéancier fixe de
//! délais. Une faute récupérable consomme le délai suivant ; au-delà de
//! l'échéancier, ou pour une faute fatale, aucun délai n'est proposé et
//! l'appelant passe à la piste suivante.
//!
//! Chaque délai accordé arme aussi un drapeau « résolution fraîche » : la
//! prochaine ouverture de la piste ignore la mémoire des résolutions récentes.

use crate::error::PlaybackFault;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_RETRY_SCHEDULE_MS: [u64; 4] = [1000, 2000, 4000, 8000];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    pub attempts: usize,
    pub force_fresh_resolve: bool,
}

#[derive(Debug, Clone)]
pub struct RetryController {
    schedule: Vec<Duration>,
    states: HashMap<String, RetryState>,
}

impl Default for RetryController {
    fn default() -> Self {
        Self::from_millis(&DEFAULT_RETRY_SCHEDULE_MS)
    }
}

impl RetryController {
    pub fn new(schedule: Vec<Duration>) -> Self {
        Self {
            schedule,
            states: HashMap::new(),
        }
    }

    pub fn from_millis(schedule_ms: &[u64]) -> Self {
        Self::new(schedule_ms.iter().map(|ms| Duration::from_millis(*ms)).collect())
    }

    pub fn schedule(&self) -> &[Duration] {
        &self.schedule
    }

    /// Délai avant la prochaine tentative, ou `None` s'il ne faut pas réessayer
    pub fn next_retry_delay(&mut self, track_key: &str, fault: &PlaybackFault) -> Option<Duration> {
        if !fault.is_recoverable() {
            debug!("Fatal fault for {}: {}", track_key, fault);
            return None;
        }

        let state = self.states.entry(track_key.to_string()).or_default();
        let Some(delay) = self.schedule.get(state.attempts).copied() else {
            warn!(
                "Retry schedule exhausted for {} after {} attempts: {}",
                track_key, state.attempts, fault
            );
            return None;
        };

        state.attempts += 1;
        state.force_fresh_resolve = true;
        debug!(
            "Retrying {} in {:?} (attempt {}/{}): {}",
            track_key,
            delay,
            state.attempts,
            self.schedule.len(),
            fault
        );
        Some(delay)
    }

    /// Remet à zéro le compteur et le drapeau d'une piste
    pub fn reset(&mut self, track_key: &str) {
        self.states.remove(track_key);
    }

    pub fn mark_force_fresh_resolve(&mut self, track_key: &str) {
        self.states
            .entry(track_key.to_string())
            .or_default()
            .force_fresh_resolve = true;
    }

    /// Lit et efface le drapeau « résolution fraîche »
    pub fn consume_force_fresh_resolve(&mut self, track_key: &str) -> bool {
        self.states
            .get_mut(track_key)
            .map(|s| std::mem::take(&mut s.force_fresh_resolve))
            .unwrap_or(false)
    }

    pub fn attempts(&self, track_key: &str) -> usize {
        self.states.get(track_key).map(|s| s.attempts).unwrap_or(0)
    }
}
