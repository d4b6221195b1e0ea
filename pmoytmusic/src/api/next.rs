//! Endpoint `/next` : pages de pistes d'une radio

use super::{runs_text, InnerTubeClient};
use crate::error::ApiError;
use crate::models::{ContinuationPage, NextPage, RadioSeed, Track};
use crate::remote::ContinuationClient;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

/// Préfixe des playlists radio construites à partir d'un titre
const RADIO_PLAYLIST_PREFIX: &str = "RDAMVM";
/// Paramètres d'une radio sans limite de longueur
const RADIO_PARAMS: &str = "wAEB";

const BYLINE_SEPARATOR: &str = "•";

fn video_renderer(item: &Value) -> Option<&Value> {
    let direct = &item["playlistPanelVideoRenderer"];
    if direct.is_object() {
        return Some(direct);
    }
    let wrapped = &item["playlistPanelVideoWrapperRenderer"]["primaryRenderer"]["playlistPanelVideoRenderer"];
    wrapped.is_object().then_some(wrapped)
}

fn parse_artists(byline: &Value) -> Vec<String> {
    let Some(runs) = byline["runs"].as_array() else {
        return Vec::new();
    };
    runs.iter()
        .filter_map(|r| r["text"].as_str())
        .take_while(|t| t.trim() != BYLINE_SEPARATOR)
        .map(str::trim)
        .filter(|t| !t.is_empty() && *t != "&" && *t != ",")
        .map(str::to_string)
        .collect()
}

fn parse_track(item: &Value) -> Option<Track> {
    let renderer = video_renderer(item)?;
    let video_id = renderer["videoId"].as_str()?;
    Some(Track {
        video_id: video_id.to_string(),
        title: runs_text(&renderer["title"]).unwrap_or_default(),
        artists: parse_artists(&renderer["longBylineText"]),
        duration_text: runs_text(&renderer["lengthText"]),
        playlist_set_video_id: renderer["playlistSetVideoId"].as_str().map(str::to_string),
    })
}

fn parse_tracks(panel: &Value) -> Vec<Track> {
    panel["contents"]
        .as_array()
        .map(|items| items.iter().filter_map(parse_track).collect())
        .unwrap_or_default()
}

fn parse_continuation(panel: &Value) -> Option<String> {
    let first = &panel["continuations"][0];
    first["nextRadioContinuationData"]["continuation"]
        .as_str()
        .or_else(|| first["nextContinuationData"]["continuation"].as_str())
        .map(str::to_string)
}

fn non_empty(value: &Value) -> Option<String> {
    value.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

/// Décode la première page d'une radio
pub fn parse_next_page(json: &Value) -> Result<NextPage, ApiError> {
    let panel = &json["contents"]["singleColumnMusicWatchNextResultsRenderer"]["tabbedRenderer"]
        ["watchNextTabbedResultsRenderer"]["tabs"][0]["tabRenderer"]["content"]["musicQueueRenderer"]
        ["content"]["playlistPanelRenderer"];
    if !panel.is_object() {
        return Err(ApiError::malformed("missing playlistPanelRenderer"));
    }

    let endpoint = &json["currentVideoEndpoint"]["watchEndpoint"];
    Ok(NextPage {
        tracks: parse_tracks(panel),
        continuation: parse_continuation(panel),
        playlist_id: non_empty(&endpoint["playlistId"]).or_else(|| non_empty(&panel["playlistId"])),
        params: non_empty(&endpoint["params"]),
        playlist_set_video_id: non_empty(&endpoint["playlistSetVideoId"]),
    })
}

/// Décode une page de continuation
pub fn parse_continuation_page(json: &Value) -> Result<ContinuationPage, ApiError> {
    let panel = &json["continuationContents"]["playlistPanelContinuation"];
    if !panel.is_object() {
        return Err(ApiError::malformed("missing playlistPanelContinuation"));
    }
    Ok(ContinuationPage {
        tracks: parse_tracks(panel),
        continuation: parse_continuation(panel),
    })
}

#[async_trait]
impl ContinuationClient for InnerTubeClient {
    async fn first_page(&self, seed: &RadioSeed) -> Result<NextPage, ApiError> {
        let mut body = json!({
            "context": self.context(),
            "enablePersistentPlaylistPanel": true,
            "isAudioOnly": true,
            "tunerSettingValue": "AUTOMIX_SETTING_NORMAL",
        });

        if let Some(video_id) = &seed.video_id {
            body["videoId"] = json!(video_id);
        }
        match (&seed.playlist_id, &seed.video_id) {
            (Some(playlist_id), _) => body["playlistId"] = json!(playlist_id),
            (None, Some(video_id)) => {
                body["playlistId"] = json!(format!("{}{}", RADIO_PLAYLIST_PREFIX, video_id));
                if seed.params.is_none() {
                    body["params"] = json!(RADIO_PARAMS);
                }
            }
            (None, None) => return Err(ApiError::malformed("radio seed has no video nor playlist")),
        }
        if let Some(params) = &seed.params {
            body["params"] = json!(params);
        }
        if let Some(set_id) = &seed.playlist_set_video_id {
            body["playlistSetVideoId"] = json!(set_id);
        }

        let json = self.post("next", &body).await?;
        let page = parse_next_page(&json)?;
        debug!(
            "Next (seed {:?}): {} tracks, continuation: {}",
            seed.video_id,
            page.tracks.len(),
            page.continuation.is_some()
        );
        Ok(page)
    }

    async fn continuation_page(&self, token: &str) -> Result<ContinuationPage, ApiError> {
        let body = json!({
            "context": self.context(),
            "enablePersistentPlaylistPanel": true,
            "isAudioOnly": true,
            "continuation": token,
        });
        let json = self.post("next", &body).await?;
        let page = parse_continuation_page(&json)?;
        debug!(
            "Next (continuation): {} tracks, continuation: {}",
            page.tracks.len(),
            page.continuation.is_some()
        );
        Ok(page)
    }
}
