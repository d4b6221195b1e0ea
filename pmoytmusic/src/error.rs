//! Gestion des erreurs du pipeline de lecture
//!
//! Quatre familles d'erreurs coexistent :
//! - [`ApiError`] : échecs des appels InnerTube (transport, statut HTTP, JSON)
//! - [`ResolutionError`] : échec de la résolution d'une clé en URL jouable
//! - [`NetworkError`] : échec de l'ouverture ou de la lecture d'un flux
//! - [`PlaybackFault`] : agrégat présenté au contrôleur de reprise

use pmocache::CacheError;
use std::error::Error as StdError;
use thiserror::Error;

/// Erreurs des clients distants (InnerTube)
#[derive(Error, Debug)]
pub enum ApiError {
    /// Erreur HTTP (transport)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Erreur de parsing JSON
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Réponse HTTP non 2xx
    #[error("InnerTube API error (code {code}): {message}")]
    Status { code: u16, message: String },

    /// Réponse syntaxiquement valide mais inexploitable
    #[error("Malformed InnerTube response: {0}")]
    Malformed(String),
}

impl ApiError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Traduit l'échec d'un appel `/player` en erreur de résolution
    pub fn into_resolution_error(self) -> ResolutionError {
        match self {
            Self::Http(e) => ResolutionError::NetworkFailure(NetworkError::from_reqwest(&e)),
            Self::Status { code, .. } => ResolutionError::Remote(format!("HTTP {}", code)),
            Self::JsonParse(e) => ResolutionError::Remote(format!("malformed response: {}", e)),
            Self::Malformed(m) => ResolutionError::Remote(format!("malformed response: {}", m)),
        }
    }
}

/// Échec de la résolution d'une clé de piste
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Track is unplayable: {0}")]
    Unplayable(String),

    #[error("Login required: {0}")]
    LoginRequired(String),

    /// Statut de lecture inconnu renvoyé par le fournisseur
    #[error("Remote status: {0}")]
    Remote(String),

    #[error("No playable format")]
    NoPlayableFormat,

    #[error("Network failure: {0}")]
    NetworkFailure(NetworkError),
}

/// Échecs réseau lors de l'ouverture ou la lecture d'un flux
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("DNS resolution failed: {0}")]
    Dns(String),

    #[error("Host unreachable: {0}")]
    Unreachable(String),

    #[error("Network timeout: {0}")]
    Timeout(String),

    /// HTTP 416
    #[error("Range not satisfiable")]
    RangeNotSatisfiable,

    #[error("Unexpected end of stream at byte {0}")]
    UnexpectedEof(u64),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Transport error: {0}")]
    Transport(String),
}

fn error_chain(e: &dyn StdError) -> String {
    let mut text = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

fn looks_like_dns_failure(chain: &str) -> bool {
    let chain = chain.to_lowercase();
    chain.contains("dns error")
        || chain.contains("failed to lookup address")
        || chain.contains("name or service not known")
        || chain.contains("no such host")
        || chain.contains("temporary failure in name resolution")
}

impl NetworkError {
    /// Classe une erreur reqwest
    ///
    /// Un timeout à la connexion est assimilé à une adresse injoignable ; un
    /// timeout en cours de lecture reste un [`NetworkError::Timeout`].
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        let chain = error_chain(e);
        if e.is_connect() {
            if looks_like_dns_failure(&chain) {
                Self::Dns(chain)
            } else {
                Self::Unreachable(chain)
            }
        } else if e.is_timeout() {
            Self::Timeout(chain)
        } else if let Some(status) = e.status() {
            if status.as_u16() == 416 {
                Self::RangeNotSatisfiable
            } else {
                Self::Status(status.as_u16())
            }
        } else {
            Self::Transport(chain)
        }
    }

    /// Erreurs liées à la joignabilité de l'hôte
    pub fn is_reachability(&self) -> bool {
        matches!(self, Self::Dns(_) | Self::Unreachable(_) | Self::Timeout(_))
    }

    /// Erreurs traitées par une réouverture sans borne de fin
    pub fn is_range_fault(&self) -> bool {
        matches!(self, Self::RangeNotSatisfiable | Self::UnexpectedEof(_))
    }
}

const UNSPECIFIED_MESSAGE: &str = "unknown playback error";

/// Faute de lecture présentée au contrôleur de reprise
#[derive(Error, Debug)]
pub enum PlaybackFault {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Conteneur ou codec illisible
    #[error("Unsupported or corrupt media: {0}")]
    Format(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    /// Erreur générique sans code
    #[error("Unspecified playback error")]
    Unspecified,

    #[error("Playback error (code {code:?}): {message}")]
    Other { code: Option<i32>, message: String },
}

impl PlaybackFault {
    /// Construit une faute depuis un couple (code, message) brut
    ///
    /// Un message « unknown playback error » sans code est reconnu comme
    /// [`PlaybackFault::Unspecified`].
    pub fn from_message(code: Option<i32>, message: &str) -> Self {
        if code.is_none() && message.to_lowercase().contains(UNSPECIFIED_MESSAGE) {
            Self::Unspecified
        } else {
            Self::Other {
                code,
                message: message.to_string(),
            }
        }
    }

    /// Une faute est récupérable si elle relève de la joignabilité réseau
    /// (DNS, hôte injoignable, timeout) ou si elle est non spécifiée.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_reachability(),
            Self::Resolution(ResolutionError::NetworkFailure(e)) => e.is_reachability(),
            Self::Unspecified => true,
            _ => false,
        }
    }
}
