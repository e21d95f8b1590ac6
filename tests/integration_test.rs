//! Integration tests for monkeyd
//!
//! These tests verify end-to-end behavior across restarts: stream
//! determinism, chunk rollover durability, word-index reconciliation,
//! and subscriber snapshot consistency.

use std::sync::Arc;
use std::time::Duration;

use monkeyd::backend::{Backend, DocumentBackend, FileBackend, MemoryBackend};
use monkeyd::engine::{EngineConfig, StreamEngine, StreamEvent};
use monkeyd::generator::{Monkey, STREAM_SEED, letter_at};
use monkeyd::store::{ChunkStore, ChunkStoreConfig};
use monkeyd::words::{Dictionary, WordDetector, WordHit, WordStore, scan_gap};
use tempfile::TempDir;

fn small_store_config(chunk_size: usize) -> ChunkStoreConfig {
    ChunkStoreConfig {
        chunk_size,
        lru_capacity: 4,
        flush_interval: Duration::from_secs(3600),
    }
}

/// A dictionary containing every trigram of the seeded stream's first
/// `n` characters, so detection fires on real generated text.
fn trigram_dictionary(n: u64) -> Arc<Dictionary> {
    let text: String = (0..n).map(|i| letter_at(STREAM_SEED, i)).collect();
    let trigrams: Vec<String> = (0..text.len() - 2).map(|i| text[i..i + 3].to_string()).collect();
    Arc::new(Dictionary::from_words(trigrams))
}

// =============================================================================
// Stream determinism (S1)
// =============================================================================

#[tokio::test]
async fn test_restart_produces_identical_prefix() {
    let backend = Arc::new(MemoryBackend::new()) as Backend;

    // First run: generate 5 characters through the store.
    {
        let store = ChunkStore::create(backend.clone(), small_store_config(4)).await.unwrap();
        let mut monkey = Monkey::new(STREAM_SEED, store.cursor().await);
        for _ in 0..5 {
            store.append(monkey.next()).await.unwrap();
        }
        store.close().await.unwrap();
    }

    // Second run: resume at the recovered cursor and generate 5 more.
    let store = ChunkStore::create(backend.clone(), small_store_config(4)).await.unwrap();
    assert_eq!(store.cursor().await, 5);
    let mut monkey = Monkey::new(STREAM_SEED, store.cursor().await);
    for _ in 0..5 {
        store.append(monkey.next()).await.unwrap();
    }

    // The two-run prefix equals the single-run sequence.
    let expected: String = (0..10).map(|i| letter_at(STREAM_SEED, i)).collect();
    assert_eq!(store.read_slice(0, 10).await.unwrap(), expected);
}

#[tokio::test]
async fn test_file_backend_survives_full_restart() {
    let temp = TempDir::new().unwrap();

    {
        let backend = Arc::new(FileBackend::open(temp.path()).unwrap()) as Backend;
        let store = ChunkStore::create(backend, small_store_config(8)).await.unwrap();
        let mut monkey = Monkey::new(STREAM_SEED, 0);
        for _ in 0..20 {
            store.append(monkey.next()).await.unwrap();
        }
        store.close().await.unwrap();
    }

    // Fresh process: new backend handle over the same directory.
    let backend = Arc::new(FileBackend::open(temp.path()).unwrap()) as Backend;
    let store = ChunkStore::create(backend, small_store_config(8)).await.unwrap();
    assert_eq!(store.cursor().await, 20);

    let expected: String = (0..20).map(|i| letter_at(STREAM_SEED, i)).collect();
    assert_eq!(store.read_slice(0, 20).await.unwrap(), expected);
}

// =============================================================================
// Word persistence round trip
// =============================================================================

#[tokio::test]
async fn test_persisted_hits_match_stream_content() {
    let backend = Arc::new(MemoryBackend::new());
    let store = ChunkStore::create(backend.clone() as Backend, small_store_config(8)).await.unwrap();
    let dict = trigram_dictionary(64);

    // Generate and detect in lockstep, the way the engine wires it.
    let word_store = WordStore::create(backend.clone() as Backend, Duration::from_secs(3600));
    let mut monkey = Monkey::new(STREAM_SEED, 0);
    let mut detector = WordDetector::new(dict.clone());
    for _ in 0..64 {
        let ch = monkey.next();
        let idx = store.append(ch).await.unwrap();
        if let Some(hit) = detector.push(ch, idx) {
            word_store.add(hit).await;
        }
    }
    word_store.close().await.unwrap();

    // Every persisted document's word equals the stream slice it names.
    let reloaded = WordStore::create(backend as Backend, Duration::from_secs(3600));
    let hits = reloaded.load_all().await.unwrap();
    assert!(!hits.is_empty());
    for hit in &hits {
        let slice = store.read_slice(hit.start, hit.len).await.unwrap();
        assert_eq!(slice, hit.word, "mismatch at {}", hit.start);
    }
}

// =============================================================================
// Restart reconciliation (S5)
// =============================================================================

#[tokio::test]
async fn test_crash_recovery_reconstructs_missing_hits() {
    let backend = Arc::new(MemoryBackend::new());
    let dict = trigram_dictionary(256);

    // Reference: one uninterrupted run's detections over 200 characters.
    let reference: Vec<WordHit> = {
        let mut detector = WordDetector::new(dict.clone());
        let mut monkey = Monkey::new(STREAM_SEED, 0);
        (0..200u64).filter_map(|i| detector.push(monkey.next(), i)).collect()
    };

    // Crashed run: all 200 characters reach the chunk store, but word
    // flushing stopped partway (only hits ending by position 120 made it).
    {
        let store = ChunkStore::create(backend.clone() as Backend, small_store_config(32)).await.unwrap();
        let word_store = WordStore::create(backend.clone() as Backend, Duration::from_secs(3600));
        let mut detector = WordDetector::new(dict.clone());
        let mut monkey = Monkey::new(STREAM_SEED, 0);
        for i in 0..200u64 {
            let ch = monkey.next();
            store.append(ch).await.unwrap();
            if let Some(hit) = detector.push(ch, i)
                && hit.end() <= 120
            {
                word_store.add(hit).await;
            }
        }
        word_store.close().await.unwrap();
        // Simulated crash: the store is closed (cursor persisted) but the
        // trailing hits never were.
        store.close().await.unwrap();
    }

    // Restart: bootstrap reconciles the gap before serving anyone.
    let store = ChunkStore::create(backend.clone() as Backend, small_store_config(32)).await.unwrap();
    let word_store = WordStore::create(backend.clone() as Backend, Duration::from_secs(3600));
    let engine = StreamEngine::bootstrap(
        store,
        word_store.clone(),
        dict,
        EngineConfig {
            test_mode: false,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let handle = engine.handle();
    tokio::spawn(engine.run());

    // The snapshot given to a new subscriber equals the uninterrupted run.
    let attached = handle.attach().await.unwrap();
    assert_eq!(attached.cursor, 200);
    assert_eq!(attached.words, reference);

    // And the store now holds every reference hit durably.
    word_store.flush().await.unwrap();
    let persisted = word_store.load_all().await.unwrap();
    assert_eq!(persisted, reference);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_scan_gap_only_reports_new_hits() {
    let backend = Arc::new(MemoryBackend::new()) as Backend;
    let store = ChunkStore::create(backend, small_store_config(32)).await.unwrap();
    let dict = trigram_dictionary(128);

    let mut monkey = Monkey::new(STREAM_SEED, 0);
    for _ in 0..128 {
        store.append(monkey.next()).await.unwrap();
    }

    let all = scan_gap(&store, dict.clone(), 0, 128, 32).await.unwrap();
    let tail = scan_gap(&store, dict, 60, 128, 32).await.unwrap();

    // The tail scan is exactly the suffix of the full scan that ends
    // after the mark.
    let expected: Vec<_> = all.iter().filter(|h| h.end() > 60).cloned().collect();
    assert_eq!(tail, expected);
}

// =============================================================================
// Live subscription
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_subscriber_sees_gapless_ordered_stream() {
    let backend = Arc::new(MemoryBackend::new());
    let store = ChunkStore::create(backend.clone() as Backend, small_store_config(64)).await.unwrap();
    let word_store = WordStore::create(backend as Backend, Duration::from_secs(3600));

    let engine = StreamEngine::bootstrap(
        store,
        word_store,
        trigram_dictionary(64),
        EngineConfig {
            test_mode: false,
            user_jitter: 120, // 10 cps
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let handle = engine.handle();
    tokio::spawn(engine.run());

    tokio::time::sleep(Duration::from_secs(1)).await;
    let mut attached = handle.attach().await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    // Characters arrive in order, gapless, starting at the snapshot
    // cursor, and each matches the deterministic stream.
    let mut expected_index = attached.cursor;
    let mut saw_chars = false;
    while let Ok(event) = attached.events.try_recv() {
        match event {
            StreamEvent::Char { index, ch } => {
                saw_chars = true;
                assert_eq!(index, expected_index);
                assert_eq!(ch, letter_at(STREAM_SEED, index));
                expected_index += 1;
            }
            StreamEvent::Word(hit) => {
                // Words refer to already-delivered characters.
                assert!(hit.end() <= expected_index);
            }
        }
    }
    assert!(saw_chars, "expected live characters after attach");

    handle.shutdown().await.unwrap();
}

// =============================================================================
// Shutdown durability
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_shutdown_persists_cursor_exactly() {
    let backend = Arc::new(MemoryBackend::new());
    let store = ChunkStore::create(backend.clone() as Backend, small_store_config(64)).await.unwrap();
    let word_store = WordStore::create(backend.clone() as Backend, Duration::from_secs(3600));

    let engine = StreamEngine::bootstrap(
        store,
        word_store,
        Arc::new(Dictionary::from_words(Vec::<String>::new())),
        EngineConfig {
            test_mode: false,
            user_jitter: 120,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let handle = engine.handle();
    let engine_task = tokio::spawn(engine.run());

    tokio::time::sleep(Duration::from_secs(2)).await;
    let cursor = handle.status().await.unwrap().cursor;
    assert!(cursor > 0);

    handle.shutdown().await.unwrap();
    engine_task.await.unwrap();

    // The persisted cursor equals the in-memory cursor at close.
    let doc = backend.get("meta", "cursor").await.unwrap().unwrap();
    let persisted = doc["index"].as_u64().unwrap();
    assert!(persisted >= cursor);

    // A fresh store resumes exactly there.
    let store = ChunkStore::create(backend as Backend, small_store_config(64)).await.unwrap();
    let recovered = store.cursor().await;
    assert_eq!(recovered, persisted);
    let expected: String = (0..recovered).map(|i| letter_at(STREAM_SEED, i)).collect();
    assert_eq!(store.read_slice(0, recovered as u32).await.unwrap(), expected);
}
