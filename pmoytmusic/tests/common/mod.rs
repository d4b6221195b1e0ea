#![allow(dead_code)]

use async_trait::async_trait;
use pmoytmusic::{
    ApiError, ByteRangeOpener, ContinuationClient, ContinuationPage, NetworkError, NextPage,
    PlayabilityStatus, PlayerResponse, RadioSeed, RangeStream, ResolutionClient,
    StreamDescriptor, StreamLocator, Track,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TRACK_BYTES: &[u8] = b"0123456789";

pub fn audio_format(itag: u32, bitrate: u64, url: &str, content_length: Option<u64>) -> StreamDescriptor {
    StreamDescriptor {
        itag,
        mime_type: "audio/webm; codecs=\"opus\"".to_string(),
        bitrate,
        approx_duration_ms: Some(213_450),
        content_length,
        loudness_db: Some(-7.5),
        locator: StreamLocator::Url(url.to_string()),
    }
}

pub fn ok_response(formats: Vec<StreamDescriptor>) -> PlayerResponse {
    PlayerResponse {
        status: PlayabilityStatus::Ok,
        formats,
        approx_duration_ms: Some(213_450),
        loudness_db: None,
        expires_in_seconds: Some(21_540),
        title: None,
    }
}

type Responder = Box<dyn Fn(&str) -> Result<PlayerResponse, ApiError> + Send + Sync>;

/// Client `/player` scripté qui compte ses appels
pub struct MockPlayer {
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
    respond: Responder,
}

impl MockPlayer {
    pub fn new(respond: impl Fn(&str) -> Result<PlayerResponse, ApiError> + Send + Sync + 'static) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            delay: None,
            respond: Box::new(respond),
        }
    }

    /// Chaque clé se résout en `mem://<clé>` (itag 251, 10 octets)
    pub fn serving_memory() -> Self {
        Self::new(|key| {
            Ok(ok_response(vec![audio_format(
                251,
                160_000,
                &format!("mem://{}", key),
                Some(TRACK_BYTES.len() as u64),
            )]))
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, key: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|k| *k == key).count()
    }
}

#[async_trait]
impl ResolutionClient for MockPlayer {
    async fn player(&self, track_key: &str) -> Result<PlayerResponse, ApiError> {
        self.calls.lock().unwrap().push(track_key.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.respond)(track_key)
    }
}

/// Ouvreur servant des ressources en mémoire, avec injection de fautes
#[derive(Default)]
pub struct MemoryOpener {
    resources: Mutex<HashMap<String, Arc<Vec<u8>>>>,
    opens: Mutex<Vec<(String, u64, Option<u64>)>>,
    open_faults: Mutex<VecDeque<NetworkError>>,
    /// 416 pour toute requête bornée
    reject_bounded: AtomicBool,
    /// 416 pour toute requête
    reject_all: AtomicBool,
    /// Le prochain flux ouvert s'interrompt après ce nombre d'octets
    truncate_next_at: Mutex<Option<u64>>,
    /// Le prochain flux ouvert se termine proprement après ce nombre d'octets
    close_next_at: Mutex<Option<u64>>,
    /// Les flux n'annoncent pas la taille totale (`Content-Range: .../*`)
    hide_total_length: AtomicBool,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: &str, data: &[u8]) {
        self.resources
            .lock()
            .unwrap()
            .insert(url.to_string(), Arc::new(data.to_vec()));
    }

    pub fn fail_next_opens(&self, faults: Vec<NetworkError>) {
        self.open_faults.lock().unwrap().extend(faults);
    }

    pub fn reject_bounded(&self) {
        self.reject_bounded.store(true, Ordering::SeqCst);
    }

    pub fn reject_all(&self) {
        self.reject_all.store(true, Ordering::SeqCst);
    }

    pub fn truncate_next_at(&self, bytes: u64) {
        *self.truncate_next_at.lock().unwrap() = Some(bytes);
    }

    pub fn close_next_at(&self, bytes: u64) {
        *self.close_next_at.lock().unwrap() = Some(bytes);
    }

    pub fn hide_total_length(&self) {
        self.hide_total_length.store(true, Ordering::SeqCst);
    }

    pub fn opens(&self) -> Vec<(String, u64, Option<u64>)> {
        self.opens.lock().unwrap().clone()
    }
}

#[async_trait]
impl ByteRangeOpener for MemoryOpener {
    async fn open(
        &self,
        url: &str,
        position: u64,
        length: Option<u64>,
    ) -> Result<Box<dyn RangeStream>, NetworkError> {
        self.opens
            .lock()
            .unwrap()
            .push((url.to_string(), position, length));

        if let Some(fault) = self.open_faults.lock().unwrap().pop_front() {
            return Err(fault);
        }
        if self.reject_all.load(Ordering::SeqCst)
            || (length.is_some() && self.reject_bounded.load(Ordering::SeqCst))
        {
            return Err(NetworkError::RangeNotSatisfiable);
        }

        let data = self
            .resources
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(NetworkError::Status(404))?;
        let total = data.len() as u64;
        if position >= total {
            return Err(NetworkError::RangeNotSatisfiable);
        }
        let mut end = match length {
            Some(length) => total.min(position + length),
            None => total,
        };
        if let Some(n) = self.close_next_at.lock().unwrap().take() {
            end = end.min(position + n);
        }
        let fail_at = self
            .truncate_next_at
            .lock()
            .unwrap()
            .take()
            .map(|n| position + n);

        Ok(Box::new(MemoryStream {
            data,
            cursor: position,
            end,
            fail_at,
            report_total: !self.hide_total_length.load(Ordering::SeqCst),
        }))
    }
}

struct MemoryStream {
    data: Arc<Vec<u8>>,
    cursor: u64,
    end: u64,
    fail_at: Option<u64>,
    report_total: bool,
}

#[async_trait]
impl RangeStream for MemoryStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, NetworkError> {
        let limit = match self.fail_at {
            Some(fail_at) if self.cursor >= fail_at => {
                return Err(NetworkError::UnexpectedEof(self.cursor));
            }
            Some(fail_at) => fail_at.min(self.end),
            None => self.end,
        };
        let n = buf.len().min((limit - self.cursor) as usize);
        let start = self.cursor as usize;
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.cursor += n as u64;
        Ok(n)
    }

    fn total_length(&self) -> Option<u64> {
        self.report_total.then(|| self.data.len() as u64)
    }
}

pub enum ScriptedPage {
    First(NextPage),
    Continuation(ContinuationPage),
    Failure,
}

/// Client `/next` rejouant une suite de pages
pub struct ScriptedRadio {
    pages: Mutex<VecDeque<ScriptedPage>>,
    pub seeds: Mutex<Vec<RadioSeed>>,
    pub tokens: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedRadio {
    pub fn new(pages: Vec<ScriptedPage>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            seeds: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn tracks(ids: &[&str]) -> Vec<Track> {
    ids.iter().map(|id| Track::new(*id, format!("Title {}", id))).collect()
}

#[async_trait]
impl ContinuationClient for ScriptedRadio {
    async fn first_page(&self, seed: &RadioSeed) -> Result<NextPage, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seeds.lock().unwrap().push(seed.clone());
        match self.pages.lock().unwrap().pop_front() {
            Some(ScriptedPage::First(page)) => Ok(page),
            _ => Err(ApiError::malformed("unexpected first page request")),
        }
    }

    async fn continuation_page(&self, token: &str) -> Result<ContinuationPage, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(token.to_string());
        match self.pages.lock().unwrap().pop_front() {
            Some(ScriptedPage::Continuation(page)) => Ok(page),
            _ => Err(ApiError::malformed("unexpected continuation request")),
        }
    }
}
