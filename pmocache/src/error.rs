//! Erreurs du cache de segments

use crate::span_cache::SpanWriter;
use thiserror::Error;

/// Type Result personnalisé pour pmocache
pub type Result<T> = std::result::Result<T, CacheError>;

/// Erreurs possibles lors de l'utilisation du cache
#[derive(Error, Debug)]
pub enum CacheError {
    /// Une opération d'écriture a été refusée par la garde lecture seule
    ///
    /// Pour `commit` et `release`, l'écrivain refusé est rendu à l'appelant :
    /// son fichier temporaire et sa réservation restent intacts.
    #[error("Cache is read-only")]
    ReadOnly { writer: Option<Box<SpanWriter>> },

    /// Le segment indexé n'existe plus sur le disque (ou n'est plus indexé)
    #[error("Cached span for {key} at {position} vanished")]
    Vanished { key: String, position: u64 },

    /// Un écrivain est déjà actif pour ce segment
    #[error("A writer is already active for {key} at offset {offset}")]
    WriteInProgress { key: String, offset: u64 },

    /// Erreur d'entrée/sortie
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Erreur de la base SQLite
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),
}

impl CacheError {
    pub fn vanished(key: impl Into<String>, position: u64) -> Self {
        Self::Vanished {
            key: key.into(),
            position,
        }
    }

    /// Vrai si l'erreur signifie que les données ne sont plus disponibles
    /// dans le cache (fichier supprimé, segment évincé)
    pub fn is_vanished(&self) -> bool {
        match self {
            Self::Vanished { .. } => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    pub fn read_only() -> Self {
        Self::ReadOnly { writer: None }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnly { .. })
    }

    /// Récupère l'écrivain rendu par un refus de `commit` ou `release`
    pub fn into_writer(self) -> Option<SpanWriter> {
        match self {
            Self::ReadOnly { writer } => writer.map(|w| *w),
            _ => None,
        }
    }
}
