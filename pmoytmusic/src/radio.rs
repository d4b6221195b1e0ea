//! Moteur de continuation radio
//!
//! Tient le curseur de pagination d'une radio : une première page obtenue à
//! partir des paramètres de départ, puis des pages successives obtenues en
//! échangeant un jeton de continuation. Le moteur s'arrête définitivement
//! quand le fournisseur ne renvoie plus de jeton, quand il renvoie un jeton
//! déjà consommé (boucle), ou en cas d'erreur.

use crate::models::{RadioSeed, Track};
use crate::remote::ContinuationClient;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorState {
    Seeded,
    Paging(String),
    Exhausted,
}

pub struct RadioContinuation {
    client: Arc<dyn ContinuationClient>,
    seed: RadioSeed,
    state: CursorState,
    consumed: HashSet<String>,
}

impl RadioContinuation {
    pub fn new(client: Arc<dyn ContinuationClient>, seed: RadioSeed) -> Self {
        Self {
            client,
            seed,
            state: CursorState::Seeded,
            consumed: HashSet::new(),
        }
    }

    pub fn seed(&self) -> &RadioSeed {
        &self.seed
    }

    pub fn state(&self) -> &CursorState {
        &self.state
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == CursorState::Exhausted
    }

    /// Récupère la page suivante
    ///
    /// Chaque appel fait avancer le curseur. Une liste vide signifie « plus de
    /// pistes radio pour le moment », jamais une erreur.
    ///
    /// L'état n'est modifié qu'une fois la réponse reçue : un appel annulé
    /// en cours de route laisse le curseur intact.
    pub async fn process(&mut self) -> Vec<Track> {
        match self.state.clone() {
            CursorState::Seeded => self.fetch_first_page().await,
            CursorState::Paging(token) => self.fetch_continuation(token).await,
            CursorState::Exhausted => Vec::new(),
        }
    }

    async fn fetch_first_page(&mut self) -> Vec<Track> {
        let page = match self.client.first_page(&self.seed).await {
            Ok(page) => page,
            Err(e) => {
                warn!("RadioContinuation: first page failed, radio stopped: {}", e);
                self.state = CursorState::Exhausted;
                return Vec::new();
            }
        };

        if page.playlist_id.is_some() {
            self.seed.playlist_id = page.playlist_id;
        }
        if page.params.is_some() {
            self.seed.params = page.params;
        }
        if page.playlist_set_video_id.is_some() {
            self.seed.playlist_set_video_id = page.playlist_set_video_id;
        }

        self.state = match page.continuation {
            Some(token) => CursorState::Paging(token),
            None => CursorState::Exhausted,
        };
        info!(
            "RadioContinuation: first page with {} tracks (playlist {:?})",
            page.tracks.len(),
            self.seed.playlist_id
        );
        page.tracks
    }

    async fn fetch_continuation(&mut self, token: String) -> Vec<Track> {
        let page = match self.client.continuation_page(&token).await {
            Ok(page) => page,
            Err(e) => {
                warn!("RadioContinuation: continuation failed, radio stopped: {}", e);
                self.state = CursorState::Exhausted;
                return Vec::new();
            }
        };
        self.consumed.insert(token);

        match page.continuation {
            Some(next) if self.consumed.contains(&next) => {
                info!(
                    "RadioContinuation: continuation loop detected, discarding {} replayed tracks",
                    page.tracks.len()
                );
                self.state = CursorState::Exhausted;
                Vec::new()
            }
            Some(next) => {
                debug!("RadioContinuation: next page with {} tracks", page.tracks.len());
                self.state = CursorState::Paging(next);
                page.tracks
            }
            None => {
                info!(
                    "RadioContinuation: last page with {} tracks",
                    page.tracks.len()
                );
                self.state = CursorState::Exhausted;
                page.tracks
            }
        }
    }
}
