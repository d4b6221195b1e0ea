//! File de lecture

use crate::models::Track;

/// File de lecture alimentée au fil de l'écoute
pub trait LiveQueue: Send {
    /// Ajoute des pistes en fin de file
    fn append_tracks(&mut self, tracks: Vec<Track>);

    /// Nombre de pistes restant à partir de la piste courante (incluse)
    fn remaining_from_current(&self) -> usize;

    /// Identifiant de la piste en cours de lecture
    fn current_video_id(&self) -> Option<&str>;
}

/// File en mémoire avec une position courante
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    tracks: Vec<Track>,
    position: usize,
}

impl MemoryQueue {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self {
            tracks,
            position: 0,
        }
    }

    pub fn current(&self) -> Option<&Track> {
        self.tracks.get(self.position)
    }

    /// Passe à la piste suivante ; retourne la nouvelle piste courante
    pub fn advance(&mut self) -> Option<&Track> {
        if self.position < self.tracks.len() {
            self.position += 1;
        }
        self.current()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}

impl LiveQueue for MemoryQueue {
    fn append_tracks(&mut self, tracks: Vec<Track>) {
        self.tracks.extend(tracks);
    }

    fn remaining_from_current(&self) -> usize {
        self.tracks.len().saturating_sub(self.position)
    }

    fn current_video_id(&self) -> Option<&str> {
        self.current().map(|t| t.video_id.as_str())
    }
}
