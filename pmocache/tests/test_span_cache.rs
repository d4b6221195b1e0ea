use pmocache::{CacheError, DiskSpanCache, SpanCache};
use tempfile::TempDir;

fn create_test_cache(max_bytes: u64) -> (TempDir, DiskSpanCache) {
    let temp_dir = tempfile::tempdir().unwrap();
    let cache = DiskSpanCache::new(temp_dir.path(), max_bytes).unwrap();
    (temp_dir, cache)
}

async fn store(cache: &DiskSpanCache, key: &str, offset: u64, data: &[u8]) {
    let mut writer = cache.start_write(key, offset).await.unwrap();
    writer.write(data).await.unwrap();
    cache.commit(writer).await.unwrap();
}

#[tokio::test]
async fn test_cache_creation() {
    let (temp_dir, cache) = create_test_cache(1024);
    assert_eq!(cache.cache_dir(), temp_dir.path());
    assert!(temp_dir.path().join("cache.db").exists());
    assert_eq!(cache.total_bytes().unwrap(), 0);
}

#[tokio::test]
async fn test_write_commit_and_read_back() {
    let (_temp_dir, cache) = create_test_cache(1 << 20);

    let mut writer = cache.start_write("abc", 0).await.unwrap();
    writer.write(b"Hello, ").await.unwrap();
    writer.write(b"World!").await.unwrap();
    assert_eq!(writer.written(), 13);
    assert_eq!(writer.position(), 13);

    let span = cache.commit(writer).await.unwrap().unwrap();
    assert_eq!(span.key, "abc");
    assert_eq!(span.offset, 0);
    assert_eq!(span.length, 13);
    assert!(cache.span_path("abc", 0).exists());

    assert!(cache.is_cached("abc", 0, 13).await.unwrap());
    assert!(!cache.is_cached("abc", 0, 14).await.unwrap());
    assert_eq!(cache.cached_bytes("abc", 7).await.unwrap(), 6);

    let mut buf = [0u8; 32];
    let n = cache.read_at("abc", 7, &mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"World!");
}

#[tokio::test]
async fn test_adjacent_spans_are_contiguous() {
    let (_temp_dir, cache) = create_test_cache(1 << 20);

    store(&cache, "abc", 0, b"0123456789").await;
    store(&cache, "abc", 10, b"abcdefghij").await;

    assert!(cache.is_cached("abc", 0, 20).await.unwrap());
    assert_eq!(cache.spans("abc").await.unwrap().len(), 2);

    // Une lecture ne traverse pas la frontière d'un segment
    let mut buf = [0u8; 20];
    let n = cache.read_at("abc", 5, &mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"56789");
    let n = cache.read_at("abc", 10, &mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"abcdefghij");
}

#[tokio::test]
async fn test_dropped_writer_leaves_nothing() {
    let (temp_dir, cache) = create_test_cache(1 << 20);

    {
        let mut writer = cache.start_write("abc", 0).await.unwrap();
        writer.write(b"partial").await.unwrap();
    }

    assert!(cache.spans("abc").await.unwrap().is_empty());
    let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name() != "cache.db")
        .collect();
    assert!(leftovers.is_empty(), "unexpected files: {:?}", leftovers);

    // La réservation est libérée
    let writer = cache.start_write("abc", 0).await.unwrap();
    cache.release(writer).await.unwrap();
}

#[tokio::test]
async fn test_second_writer_is_rejected() {
    let (_temp_dir, cache) = create_test_cache(1 << 20);

    let first = cache.start_write("abc", 0).await.unwrap();
    let second = cache.start_write("abc", 0).await;
    assert!(matches!(
        second,
        Err(CacheError::WriteInProgress { offset: 0, .. })
    ));

    // Un autre offset reste libre
    let other = cache.start_write("abc", 512).await.unwrap();
    cache.release(other).await.unwrap();
    cache.release(first).await.unwrap();
}

#[tokio::test]
async fn test_empty_commit_is_not_indexed() {
    let (_temp_dir, cache) = create_test_cache(1 << 20);

    let writer = cache.start_write("abc", 0).await.unwrap();
    assert!(cache.commit(writer).await.unwrap().is_none());
    assert!(cache.spans("abc").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_vanished_file_is_reported() {
    let (_temp_dir, cache) = create_test_cache(1 << 20);
    store(&cache, "abc", 0, b"some bytes").await;

    std::fs::remove_file(cache.span_path("abc", 0)).unwrap();

    let mut buf = [0u8; 8];
    let err = cache.read_at("abc", 0, &mut buf).await.unwrap_err();
    assert!(err.is_vanished());

    // L'entrée orpheline est retirée de l'index
    assert!(!cache.is_cached("abc", 0, 1).await.unwrap());
}

#[tokio::test]
async fn test_read_outside_spans_is_vanished() {
    let (_temp_dir, cache) = create_test_cache(1 << 20);
    store(&cache, "abc", 0, b"0123").await;

    let mut buf = [0u8; 8];
    let err = cache.read_at("abc", 4, &mut buf).await.unwrap_err();
    assert!(matches!(err, CacheError::Vanished { position: 4, .. }));
}

#[tokio::test]
async fn test_enforce_limit_evicts_oldest() {
    let (_temp_dir, cache) = create_test_cache(25);

    store(&cache, "first", 0, &[1u8; 10]).await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    store(&cache, "second", 0, &[2u8; 10]).await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    store(&cache, "third", 0, &[3u8; 10]).await;

    // 30 octets > 25 : le segment le plus ancien est évincé au commit
    assert!(cache.total_bytes().unwrap() <= 25);
    assert!(cache.spans("first").await.unwrap().is_empty());
    assert!(!cache.span_path("first", 0).exists());
    assert!(cache.is_cached("second", 0, 10).await.unwrap());
    assert!(cache.is_cached("third", 0, 10).await.unwrap());
}

#[tokio::test]
async fn test_consolidate_removes_stale_items() {
    let (temp_dir, cache) = create_test_cache(1 << 20);
    store(&cache, "kept", 0, b"kept").await;
    store(&cache, "gone", 0, b"gone").await;

    std::fs::remove_file(cache.span_path("gone", 0)).unwrap();
    std::fs::write(temp_dir.path().join("deadbeef.0.part"), b"crash").unwrap();
    std::fs::write(temp_dir.path().join("deadbeef.0.span"), b"orphan").unwrap();

    let active = cache.start_write("active", 0).await.unwrap();

    let cleaned = cache.consolidate().await.unwrap();
    assert_eq!(cleaned, 3);
    assert!(cache.is_cached("kept", 0, 4).await.unwrap());
    assert!(cache.spans("gone").await.unwrap().is_empty());
    assert!(!temp_dir.path().join("deadbeef.0.part").exists());

    // Le fichier temporaire de l'écrivain actif est préservé
    let mut active = active;
    active.write(b"still writing").await.unwrap();
    assert!(cache.commit(active).await.unwrap().is_some());
}

#[tokio::test]
async fn test_purge() {
    let (_temp_dir, cache) = create_test_cache(1 << 20);
    store(&cache, "a", 0, b"aaaa").await;
    store(&cache, "b", 0, b"bbbb").await;

    cache.purge().await.unwrap();
    assert_eq!(cache.total_bytes().unwrap(), 0);
    assert!(!cache.span_path("a", 0).exists());
}
