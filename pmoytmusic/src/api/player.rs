//! Endpoint `/player` : formats jouables d'une piste

use super::InnerTubeClient;
use crate::error::ApiError;
use crate::models::{PlayabilityStatus, PlayerResponse, StreamDescriptor, StreamLocator};
use crate::remote::ResolutionClient;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

fn parse_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn parse_format(value: &Value) -> Option<StreamDescriptor> {
    let locator = if let Some(url) = value["url"].as_str() {
        StreamLocator::Url(url.to_string())
    } else if let Some(cipher) = value["signatureCipher"]
        .as_str()
        .or_else(|| value["cipher"].as_str())
    {
        StreamLocator::Cipher(cipher.to_string())
    } else {
        return None;
    };

    Some(StreamDescriptor {
        itag: u32::try_from(value["itag"].as_u64()?).ok()?,
        mime_type: value["mimeType"].as_str()?.to_string(),
        bitrate: parse_u64(&value["bitrate"])?,
        approx_duration_ms: parse_u64(&value["approxDurationMs"]),
        content_length: parse_u64(&value["contentLength"]),
        loudness_db: value["loudnessDb"].as_f64(),
        locator,
    })
}

/// Décode une réponse `/player`
///
/// Seuls les formats audio de `streamingData.adaptiveFormats` sont conservés,
/// dans l'ordre du fournisseur.
pub fn parse_player_response(json: &Value) -> Result<PlayerResponse, ApiError> {
    let playability = &json["playabilityStatus"];
    let status = playability["status"]
        .as_str()
        .ok_or_else(|| ApiError::malformed("missing playabilityStatus.status"))?;
    let reason = playability["reason"].as_str().map(str::to_string);

    let streaming = &json["streamingData"];
    let formats: Vec<StreamDescriptor> = streaming["adaptiveFormats"]
        .as_array()
        .map(|formats| {
            formats
                .iter()
                .filter_map(parse_format)
                .filter(StreamDescriptor::is_audio)
                .collect()
        })
        .unwrap_or_default();

    let approx_duration_ms = formats
        .iter()
        .find_map(|f| f.approx_duration_ms)
        .or_else(|| parse_u64(&json["videoDetails"]["lengthSeconds"]).map(|s| s * 1000));

    Ok(PlayerResponse {
        status: PlayabilityStatus::from_parts(status, reason),
        formats,
        approx_duration_ms,
        loudness_db: json["playerConfig"]["audioConfig"]["loudnessDb"].as_f64(),
        expires_in_seconds: parse_u64(&streaming["expiresInSeconds"]),
        title: json["videoDetails"]["title"].as_str().map(str::to_string),
    })
}

#[async_trait]
impl ResolutionClient for InnerTubeClient {
    async fn player(&self, track_key: &str) -> Result<PlayerResponse, ApiError> {
        let body = json!({
            "videoId": track_key,
            "context": self.context(),
            "contentCheckOk": true,
            "racyCheckOk": true,
        });
        let json = self.post("player", &body).await?;
        let response = parse_player_response(&json)?;
        debug!(
            "Player {}: {:?}, {} audio formats",
            track_key,
            response.status,
            response.formats.len()
        );
        Ok(response)
    }
}
