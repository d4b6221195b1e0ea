mod common;

use common::{audio_format, ok_response, MemoryOpener, MockPlayer, TRACK_BYTES};
use pmocache::{DiskSpanCache, ReadOnlyGate, SpanCache};
use pmoytmusic::{
    DataSession, FormatRecord, FormatStore, LayeredDataSource, NetworkError, PlaybackFault,
    ResolverSettings, SqliteFormatStore, StreamResolver,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::TempDir;

const KEY: &str = "abc";
const URL: &str = "mem://abc";

struct Fixture {
    _dir: TempDir,
    player: Arc<MockPlayer>,
    opener: Arc<MemoryOpener>,
    disk: Arc<DiskSpanCache>,
    store: Arc<SqliteFormatStore>,
    resolver: Arc<StreamResolver>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_player(MockPlayer::serving_memory())
    }

    /// Le fournisseur n'annonce pas la taille de la piste
    fn without_length() -> Self {
        let fx = Self::with_player(MockPlayer::new(|_| {
            Ok(ok_response(vec![audio_format(251, 160_000, URL, None)]))
        }));
        fx.opener.hide_total_length();
        fx
    }

    fn with_player(player: MockPlayer) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let player = Arc::new(player);
        let opener = Arc::new(MemoryOpener::new());
        opener.insert(URL, TRACK_BYTES);
        let disk = Arc::new(DiskSpanCache::new(dir.path(), 1 << 20).unwrap());
        let store = Arc::new(SqliteFormatStore::in_memory().unwrap());
        let resolver = Arc::new(StreamResolver::new(
            player.clone(),
            store.clone(),
            ResolverSettings::default(),
        ));
        Self {
            _dir: dir,
            player,
            opener,
            disk,
            store,
            resolver,
        }
    }

    fn source(&self, chunk_size: u64) -> LayeredDataSource {
        self.source_over(self.disk.clone(), chunk_size)
    }

    fn source_over(&self, cache: Arc<dyn SpanCache>, chunk_size: u64) -> LayeredDataSource {
        LayeredDataSource::new(self.resolver.clone(), cache, self.opener.clone())
            .with_chunk_size(chunk_size)
    }

    async fn prefill_cache(&self) {
        let mut writer = self.disk.start_write(KEY, 0).await.unwrap();
        writer.write(TRACK_BYTES).await.unwrap();
        self.disk.commit(writer).await.unwrap();
        self.store
            .insert_format(
                KEY,
                &FormatRecord {
                    itag: 251,
                    mime_type: "audio/webm".into(),
                    bitrate: 160_000,
                    content_length: Some(TRACK_BYTES.len() as u64),
                    loudness_db: None,
                },
            )
            .unwrap();
    }
}

fn always(_: &str) -> bool {
    true
}

async fn open(source: &LayeredDataSource) -> Result<DataSession, PlaybackFault> {
    source.open(KEY, 0, None, &always).await
}

async fn read_all(session: &mut DataSession) -> Result<Vec<u8>, PlaybackFault> {
    let mut out = Vec::new();
    let mut buf = [0u8; 3];
    loop {
        let n = session.read(&mut buf).await?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&buf[..n]);
    }
}

#[tokio::test]
async fn test_fully_cached_track_needs_no_resolution() {
    let fx = Fixture::new();
    fx.prefill_cache().await;

    let mut session = open(&fx.source(4)).await.unwrap();
    assert!(session.is_serving_from_cache());
    assert_eq!(read_all(&mut session).await.unwrap(), TRACK_BYTES);
    session.close().await;

    assert_eq!(fx.player.calls(), 0);
    assert!(fx.opener.opens().is_empty());
}

#[tokio::test]
async fn test_explicit_cached_range_needs_no_resolution() {
    let fx = Fixture::new();
    let mut writer = fx.disk.start_write(KEY, 0).await.unwrap();
    writer.write(&TRACK_BYTES[..6]).await.unwrap();
    fx.disk.commit(writer).await.unwrap();

    let source = fx.source(4);
    let mut session = source.open(KEY, 2, Some(4), &always).await.unwrap();
    assert_eq!(read_all(&mut session).await.unwrap(), &TRACK_BYTES[2..6]);
    assert_eq!(fx.player.calls(), 0);
}

#[tokio::test]
async fn test_write_through_by_chunks_with_single_resolution() {
    let fx = Fixture::new();
    let source = fx.source(4);

    let mut session = open(&source).await.unwrap();
    assert_eq!(read_all(&mut session).await.unwrap(), TRACK_BYTES);
    session.close().await;

    assert_eq!(fx.player.calls(), 1);
    let opens: Vec<_> = fx.opener.opens().into_iter().map(|(_, p, l)| (p, l)).collect();
    assert_eq!(opens, vec![(0, Some(4)), (4, Some(4)), (8, Some(2))]);

    let spans = fx.disk.spans(KEY).await.unwrap();
    assert_eq!(spans.len(), 3);
    assert_eq!(fx.disk.cached_bytes(KEY, 0).await.unwrap(), TRACK_BYTES.len() as u64);

    // Une fois les métadonnées enregistrées, la piste est servie par le cache
    fx.resolver.flush().await;
    let mut again = open(&source).await.unwrap();
    assert_eq!(read_all(&mut again).await.unwrap(), TRACK_BYTES);
    assert_eq!(fx.player.calls(), 1);
    assert_eq!(fx.opener.opens().len(), 3);
}

#[tokio::test]
async fn test_partial_cache_then_network() {
    let fx = Fixture::new();
    let mut writer = fx.disk.start_write(KEY, 0).await.unwrap();
    writer.write(&TRACK_BYTES[..4]).await.unwrap();
    fx.disk.commit(writer).await.unwrap();

    let mut session = open(&fx.source(100)).await.unwrap();
    assert!(session.is_serving_from_cache());
    assert_eq!(fx.player.calls(), 0);

    assert_eq!(read_all(&mut session).await.unwrap(), TRACK_BYTES);
    assert_eq!(fx.player.calls(), 1);
    assert_eq!(fx.opener.opens()[0].1, 4);
}

#[tokio::test]
async fn test_should_cache_false_streams_without_writing() {
    let fx = Fixture::new();
    let source = fx.source(4);

    let mut session = source.open(KEY, 0, None, &|_: &str| false).await.unwrap();
    assert_eq!(read_all(&mut session).await.unwrap(), TRACK_BYTES);
    session.close().await;

    assert!(fx.disk.spans(KEY).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_vanished_cache_file_falls_back_to_network() {
    let fx = Fixture::new();
    fx.prefill_cache().await;
    std::fs::remove_file(fx.disk.span_path(KEY, 0)).unwrap();

    let mut session = open(&fx.source(4)).await.unwrap();
    assert_eq!(read_all(&mut session).await.unwrap(), TRACK_BYTES);
    assert!(session.is_network_only());
    session.close().await;

    assert_eq!(fx.player.calls(), 1);
    // Mode réseau seul : rien n'est réécrit
    assert!(fx.disk.spans(KEY).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_read_only_gate_streams_from_network_only() {
    let fx = Fixture::new();
    let gate: Arc<dyn SpanCache> = Arc::new(ReadOnlyGate::from_flag(
        fx.disk.clone(),
        Arc::new(AtomicBool::new(true)),
    ));

    let mut session = open(&fx.source_over(gate, 4)).await.unwrap();
    assert!(session.is_network_only());
    assert_eq!(read_all(&mut session).await.unwrap(), TRACK_BYTES);
    session.close().await;

    assert!(fx.disk.spans(KEY).await.unwrap().is_empty());
    assert_eq!(fx.disk.total_bytes().unwrap(), 0);
}

#[tokio::test]
async fn test_range_not_satisfiable_reopens_open_ended() {
    let fx = Fixture::new();
    fx.opener.reject_bounded();

    let mut session = open(&fx.source(4)).await.unwrap();
    assert_eq!(read_all(&mut session).await.unwrap(), TRACK_BYTES);
    session.close().await;

    let opens: Vec<_> = fx.opener.opens().into_iter().map(|(_, p, l)| (p, l)).collect();
    assert_eq!(opens, vec![(0, Some(4)), (0, None)]);
    assert_eq!(fx.disk.cached_bytes(KEY, 0).await.unwrap(), TRACK_BYTES.len() as u64);
}

#[tokio::test]
async fn test_second_range_fault_is_propagated() {
    let fx = Fixture::new();
    fx.opener.reject_all();

    let Err(fault) = open(&fx.source(4)).await else {
        panic!("open should fail");
    };
    assert!(matches!(
        fault,
        PlaybackFault::Network(NetworkError::RangeNotSatisfiable)
    ));
    assert!(!fault.is_recoverable());
    assert_eq!(fx.opener.opens().len(), 2);
}

#[tokio::test]
async fn test_unexpected_eof_keeps_prefix_and_reopens() {
    let fx = Fixture::new();
    fx.opener.truncate_next_at(6);

    let mut session = open(&fx.source(100)).await.unwrap();
    assert_eq!(read_all(&mut session).await.unwrap(), TRACK_BYTES);
    session.close().await;

    let opens: Vec<_> = fx.opener.opens().into_iter().map(|(_, p, l)| (p, l)).collect();
    assert_eq!(opens, vec![(0, Some(10)), (6, None)]);
    assert_eq!(fx.player.calls(), 1);

    let offsets: Vec<_> = fx
        .disk
        .spans(KEY)
        .await
        .unwrap()
        .iter()
        .map(|s| (s.offset, s.length))
        .collect();
    assert_eq!(offsets, vec![(0, 6), (6, 4)]);
}

#[tokio::test]
async fn test_clean_early_close_reopens_to_end() {
    let fx = Fixture::new();
    fx.opener.close_next_at(6);

    let mut session = open(&fx.source(100)).await.unwrap();
    assert_eq!(read_all(&mut session).await.unwrap(), TRACK_BYTES);
    assert_eq!(session.end(), Some(TRACK_BYTES.len() as u64));
    session.close().await;

    let opens: Vec<_> = fx.opener.opens().into_iter().map(|(_, p, l)| (p, l)).collect();
    assert_eq!(opens, vec![(0, Some(10)), (6, None)]);
    assert_eq!(fx.disk.cached_bytes(KEY, 0).await.unwrap(), TRACK_BYTES.len() as u64);
}

#[tokio::test]
async fn test_second_clean_early_close_is_propagated() {
    let fx = Fixture::new();
    fx.opener.close_next_at(6);

    let mut session = open(&fx.source(100)).await.unwrap();
    let mut buf = [0u8; 16];
    assert_eq!(session.read(&mut buf).await.unwrap(), 6);

    // La réouverture se tarit elle aussi avant la fin connue
    fx.opener.close_next_at(2);
    assert_eq!(session.read(&mut buf).await.unwrap(), 2);
    let fault = session.read(&mut buf).await.unwrap_err();
    assert!(matches!(
        fault,
        PlaybackFault::Network(NetworkError::UnexpectedEof(8))
    ));
}

#[tokio::test]
async fn test_unknown_length_multiple_of_chunk_ends_on_416() {
    let fx = Fixture::without_length();

    let mut session = open(&fx.source(5)).await.unwrap();
    assert_eq!(read_all(&mut session).await.unwrap(), TRACK_BYTES);
    assert_eq!(session.end(), Some(10));
    session.close().await;

    let opens: Vec<_> = fx.opener.opens().into_iter().map(|(_, p, l)| (p, l)).collect();
    assert_eq!(opens, vec![(0, Some(5)), (5, Some(5)), (10, Some(5))]);
    assert_eq!(fx.disk.cached_bytes(KEY, 0).await.unwrap(), 10);
}

#[tokio::test]
async fn test_unknown_length_short_last_chunk_ends_track() {
    let fx = Fixture::without_length();

    let mut session = open(&fx.source(100)).await.unwrap();
    assert_eq!(read_all(&mut session).await.unwrap(), TRACK_BYTES);
    session.close().await;

    // Bloc incomplet : réouverture sans borne, puis 416 en fin de piste
    let opens: Vec<_> = fx.opener.opens().into_iter().map(|(_, p, l)| (p, l)).collect();
    assert_eq!(opens, vec![(0, Some(100)), (10, None)]);
    assert_eq!(fx.disk.cached_bytes(KEY, 0).await.unwrap(), 10);
}

#[tokio::test]
async fn test_dropped_session_abandons_partial_write() {
    let fx = Fixture::new();

    let mut session = open(&fx.source(100)).await.unwrap();
    let mut buf = [0u8; 3];
    assert_eq!(session.read(&mut buf).await.unwrap(), 3);
    drop(session);

    assert!(fx.disk.spans(KEY).await.unwrap().is_empty());
    let leftovers = std::fs::read_dir(fx.disk.cache_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "part"))
        .count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_open_surfaces_network_failure() {
    let fx = Fixture::new();
    fx.opener.fail_next_opens(vec![NetworkError::Dns("no such host".into())]);

    let Err(fault) = open(&fx.source(4)).await else {
        panic!("open should fail");
    };
    assert!(fault.is_recoverable());
}
