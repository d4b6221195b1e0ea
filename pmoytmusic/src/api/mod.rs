//! Couche d'accès à l'API InnerTube de YouTube Music
//!
//! Ce module fournit un client bas-niveau pour les deux endpoints utilisés :
//! `/player` (résolution d'une piste en formats jouables) et `/next` (pages
//! de la radio).

pub mod next;
pub mod player;

use crate::error::ApiError;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// URL de base de l'API InnerTube de YouTube Music
pub const DEFAULT_BASE_URL: &str = "https://music.youtube.com/youtubei/v1";
pub const DEFAULT_CLIENT_NAME: &str = "WEB_REMIX";
pub const DEFAULT_CLIENT_VERSION: &str = "1.20260114.03.00";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const ORIGIN: &str = "https://music.youtube.com";

/// Identité du client présentée à InnerTube
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerTubeSettings {
    pub base_url: String,
    pub client_name: String,
    pub client_version: String,
    pub hl: String,
    pub gl: String,
}

impl Default for InnerTubeSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            client_version: DEFAULT_CLIENT_VERSION.to_string(),
            hl: "en".to_string(),
            gl: "US".to_string(),
        }
    }
}

/// Client InnerTube
///
/// Implémente [`crate::ResolutionClient`] (voir [`player`]) et
/// [`crate::ContinuationClient`] (voir [`next`]).
pub struct InnerTubeClient {
    client: Client,
    settings: InnerTubeSettings,
}

impl InnerTubeClient {
    pub fn new(settings: InnerTubeSettings) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &InnerTubeSettings {
        &self.settings
    }

    /// Objet `context` commun à toutes les requêtes
    pub(crate) fn context(&self) -> Value {
        json!({
            "client": {
                "clientName": self.settings.client_name,
                "clientVersion": self.settings.client_version,
                "hl": self.settings.hl,
                "gl": self.settings.gl,
            }
        })
    }

    /// Effectue une requête POST à l'API
    pub(crate) async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, ApiError> {
        let url = format!(
            "{}/{}?prettyPrint=false",
            self.settings.base_url.trim_end_matches('/'),
            endpoint
        );
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header("Origin", ORIGIN)
            .header("Referer", format!("{}/", ORIGIN))
            .json(body)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Traite la réponse HTTP
    async fn handle_response(&self, response: Response) -> Result<Value, ApiError> {
        let status = response.status();
        debug!("Response status: {}", status);

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!("InnerTube error ({}): {}", status.as_u16(), error_text);
            return Err(ApiError::Status {
                code: status.as_u16(),
                message: error_text,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            warn!("Failed to parse InnerTube response: {}", e);
            ApiError::JsonParse(e)
        })
    }
}

/// Concatène le texte des `runs` d'un objet texte InnerTube
pub(crate) fn runs_text(value: &Value) -> Option<String> {
    if let Some(simple) = value["simpleText"].as_str() {
        return Some(simple.to_string());
    }
    let runs = value["runs"].as_array()?;
    let text: String = runs.iter().filter_map(|r| r["text"].as_str()).collect();
    if text.is_empty() { None } else { Some(text) }
}
