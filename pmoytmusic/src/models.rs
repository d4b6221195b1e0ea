//! Modèles de données partagés par le pipeline de lecture et la radio

use serde::{Deserialize, Serialize};

/// Où trouver les octets d'un format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLocator {
    /// URL directe, limitée dans le temps
    Url(String),
    /// Chaîne `signatureCipher` (paramètres `s`, `sp`, `url`) à déchiffrer
    Cipher(String),
}

/// Un encodage jouable proposé par le fournisseur pour une piste
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    /// Identifiant de format (itag)
    pub itag: u32,
    pub mime_type: String,
    /// Débit en bits par seconde
    pub bitrate: u64,
    pub approx_duration_ms: Option<u64>,
    /// Taille totale du flux en octets
    pub content_length: Option<u64>,
    pub loudness_db: Option<f64>,
    pub locator: StreamLocator,
}

impl StreamDescriptor {
    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/")
    }
}

/// Statut de lecture renvoyé par `/player`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayabilityStatus {
    Ok,
    Unplayable(Option<String>),
    LoginRequired(Option<String>),
    Other {
        status: String,
        reason: Option<String>,
    },
}

impl PlayabilityStatus {
    pub fn from_parts(status: &str, reason: Option<String>) -> Self {
        match status {
            "OK" => Self::Ok,
            "UNPLAYABLE" => Self::Unplayable(reason),
            "LOGIN_REQUIRED" => Self::LoginRequired(reason),
            other => Self::Other {
                status: other.to_string(),
                reason,
            },
        }
    }
}

/// Réponse décodée de `/player`
#[derive(Debug, Clone)]
pub struct PlayerResponse {
    pub status: PlayabilityStatus,
    /// Formats dans l'ordre du fournisseur
    pub formats: Vec<StreamDescriptor>,
    pub approx_duration_ms: Option<u64>,
    pub loudness_db: Option<f64>,
    /// Durée de validité des URLs (`streamingData.expiresInSeconds`)
    pub expires_in_seconds: Option<u64>,
    pub title: Option<String>,
}

/// Élément de file de lecture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub video_id: String,
    pub title: String,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub duration_text: Option<String>,
    #[serde(default)]
    pub playlist_set_video_id: Option<String>,
}

impl Track {
    pub fn new(video_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            title: title.into(),
            artists: Vec::new(),
            duration_text: None,
            playlist_set_video_id: None,
        }
    }

    /// "Titre - Artiste1, Artiste2"
    pub fn display_name(&self) -> String {
        if self.artists.is_empty() {
            self.title.clone()
        } else {
            format!("{} - {}", self.title, self.artists.join(", "))
        }
    }
}

/// Paramètres de départ d'une radio
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadioSeed {
    pub video_id: Option<String>,
    pub playlist_id: Option<String>,
    pub playlist_set_video_id: Option<String>,
    pub params: Option<String>,
}

impl RadioSeed {
    pub fn from_video(video_id: impl Into<String>) -> Self {
        Self {
            video_id: Some(video_id.into()),
            ..Default::default()
        }
    }
}

/// Première page d'une radio (`/next` avec les paramètres de départ)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NextPage {
    pub tracks: Vec<Track>,
    pub continuation: Option<String>,
    pub playlist_id: Option<String>,
    pub params: Option<String>,
    pub playlist_set_video_id: Option<String>,
}

/// Page suivante d'une radio (`/next` avec un jeton de continuation)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContinuationPage {
    pub tracks: Vec<Track>,
    pub continuation: Option<String>,
}

/// Métadonnées de format conservées par piste
#[derive(Debug, Clone, PartialEq)]
pub struct FormatRecord {
    pub itag: u32,
    pub mime_type: String,
    pub bitrate: u64,
    pub content_length: Option<u64>,
    pub loudness_db: Option<f64>,
}

impl From<&StreamDescriptor> for FormatRecord {
    fn from(descriptor: &StreamDescriptor) -> Self {
        Self {
            itag: descriptor.itag,
            mime_type: descriptor.mime_type.clone(),
            bitrate: descriptor.bitrate,
            content_length: descriptor.content_length,
            loudness_db: descriptor.loudness_db,
        }
    }
}

/// URL prête à servir des requêtes par plage d'octets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayableUrl {
    pub url: String,
    pub itag: u32,
    pub content_length: Option<u64>,
    /// Vrai si l'URL provient de la mémoire des résolutions récentes
    pub from_ring: bool,
}

/// Formate une durée en "m:ss" (ou "h:mm:ss")
pub fn format_duration_text(duration_ms: u64) -> String {
    let total = duration_ms / 1000;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
