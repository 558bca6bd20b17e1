//! End-to-end coverage of the public cache surface: round-trips,
//! expiry, eviction, warming, metrics and restart survival.

use babelcache::prelude::*;

fn entry(key: &str, translation: &str, ttl_ms: u64) -> CacheEntry {
    CacheEntry {
        key: key.to_string(),
        source_text: format!("source for {}", key),
        source_lang: "en".to_string(),
        target_lang: "fr".to_string(),
        translation: translation.to_string(),
        confidence: 0.9,
        timestamp_ms: 0,
        ttl_ms,
        flags: EntryFlags::empty(),
        metadata: EntryMetadata::new(0),
    }
}

async fn local_cache(dir: &std::path::Path, max_entries: usize) -> TranslationCache {
    TranslationCache::builder()
        .max_entries(max_entries)
        .remote_enabled(false)
        .storage_path(dir.to_str().unwrap())
        .auto_save_interval_ms(3_600_000)
        .cleanup_interval_ms(3_600_000)
        .auto_extend_ttl(false)
        .build()
        .await
        .expect("cache builds")
}

#[tokio::test]
async fn set_get_round_trip_preserves_observable_fields() {
    let dir = tempfile::tempdir().unwrap();
    let cache = local_cache(dir.path(), 64).await;

    let original = entry("en:fr:aa", "bonjour", 60_000);
    cache.set(original.clone()).await.unwrap();

    let got = cache.get("en:fr:aa").await.unwrap().entry().expect("hit");
    assert_eq!(got.source_text, original.source_text);
    assert_eq!(got.source_lang, original.source_lang);
    assert_eq!(got.target_lang, original.target_lang);
    assert_eq!(got.translation, original.translation);
    assert_eq!(got.ttl_ms, original.ttl_ms);
    assert_eq!(cache.metrics().memory.hits, 1);
    cache.shutdown_gracefully().await.unwrap();
}

#[tokio::test]
async fn typed_api_round_trips_via_fingerprint() {
    let dir = tempfile::tempdir().unwrap();
    let cache = local_cache(dir.path(), 64).await;

    let request = TranslationRequest::new("Good evening", "en", "de");
    cache
        .put_translation(&request, "Guten Abend", 0.95, 0)
        .await
        .unwrap();

    // Normalization makes a differently-spaced request the same key.
    let spaced = TranslationRequest::new("  good   EVENING ", "en", "de");
    let hit = cache.get_translation(&spaced).await.unwrap();
    assert_eq!(hit.entry().unwrap().translation, "Guten Abend");
    cache.shutdown_gracefully().await.unwrap();
}

#[tokio::test]
async fn expired_entries_become_misses() {
    let dir = tempfile::tempdir().unwrap();
    let cache = local_cache(dir.path(), 64).await;

    cache.set(entry("en:de:xx", "kurz", 100)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    assert!(matches!(
        cache.get("en:de:xx").await.unwrap(),
        Lookup::Miss
    ));
    assert!(cache.metrics().aggregate.misses >= 1);
    cache.shutdown_gracefully().await.unwrap();
}

#[tokio::test]
async fn lru_evicts_least_recently_used_first() {
    let cache = TranslationCache::builder()
        .max_entries(2)
        .eviction_batch_size(1)
        .eviction_policy(EvictionPolicy::Lru)
        .remote_enabled(false)
        .durable_enabled(false)
        .cleanup_interval_ms(3_600_000)
        .auto_extend_ttl(false)
        .build()
        .await
        .unwrap();

    cache.set(entry("k1", "a", 60_000)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    cache.set(entry("k2", "b", 60_000)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    cache.set(entry("k3", "c", 60_000)).await.unwrap();

    assert!(matches!(cache.get("k1").await.unwrap(), Lookup::Miss));
    assert!(cache.get("k2").await.unwrap().is_hit());
    assert!(cache.get("k3").await.unwrap().is_hit());
    assert_eq!(cache.metrics().memory.evictions, 1);
    assert!(cache.count() <= 2);
    cache.shutdown_gracefully().await.unwrap();
}

#[tokio::test]
async fn durable_tier_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let cache = local_cache(dir.path(), 64).await;
        cache
            .set(entry("en:fr:persist", "persiste", 3_600_000))
            .await
            .unwrap();
        cache.flush().await.unwrap();
        cache.shutdown_gracefully().await.unwrap();
    }

    let revived = local_cache(dir.path(), 64).await;
    let got = revived
        .get("en:fr:persist")
        .await
        .unwrap()
        .entry()
        .expect("entry survives restart");
    assert_eq!(got.translation, "persiste");
    revived.shutdown_gracefully().await.unwrap();
}

#[tokio::test]
async fn warming_respects_count_limit() {
    let dir = tempfile::tempdir().unwrap();
    let cache = local_cache(dir.path(), 64).await;

    let candidates: Vec<CacheEntry> = (0..20)
        .map(|i| entry(&format!("en:fr:w{:02}", i), "chaud", 60_000))
        .collect();
    let inserted = cache.warm(candidates, 5).await.unwrap();
    assert_eq!(inserted, 5);
    assert_eq!(cache.count(), 5);
    cache.shutdown_gracefully().await.unwrap();
}

#[tokio::test]
async fn delete_then_delete_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let cache = local_cache(dir.path(), 64).await;

    cache.set(entry("en:fr:gone", "x", 60_000)).await.unwrap();
    cache.delete("en:fr:gone").await.unwrap();
    let metrics_after_first = cache.metrics().memory.current_size;
    cache.delete("en:fr:gone").await.unwrap();
    assert_eq!(cache.metrics().memory.current_size, metrics_after_first);
    assert!(matches!(cache.get("en:fr:gone").await.unwrap(), Lookup::Miss));
    cache.shutdown_gracefully().await.unwrap();
}

#[tokio::test]
async fn detection_pipeline_matches_cache_usage() {
    let detector = LanguageDetector::builder().build();

    let english = detector
        .detect("This is a sample English text for testing purposes.")
        .unwrap();
    assert_eq!(english.language, "eng");
    assert!(english.confidence > 0.5);

    let japanese = detector.detect("これは日本語のテストです。").unwrap();
    assert_eq!(japanese.language, "jpn");
    assert!(japanese.confidence > 0.5);

    // The pair (text -> language) is what the translation path feeds
    // into request fingerprints.
    let request = TranslationRequest::new("This is a sample English text", "eng", "jpn");
    assert!(request.source_lang.len() == 3);
}
