use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use kms_csr::{
    CsrBuilderFactory, DEFAULT_KEY_CACHE_TTL, KeyAlgorithm, KeyCache, KeyVersionName,
    KmsCsrError, KmsError, LocalKms,
};

const LATENCY: Duration = Duration::from_millis(300);

fn key_name(id: &str) -> KeyVersionName {
    KeyVersionName::new("acme", "global", "pki", id, "1").unwrap()
}

fn slow_kms(ids: &[&str]) -> Arc<LocalKms> {
    let kms = LocalKms::new().with_latency(LATENCY);
    for id in ids {
        kms.generate_key(key_name(id), KeyAlgorithm::EcSignP256Sha256, id)
            .unwrap();
    }
    Arc::new(kms)
}

/// Runs `f(i)` on `n` threads released at the same instant.
fn run_concurrently<T: Send + 'static>(
    n: usize,
    f: impl Fn(usize) -> T + Send + Sync + 'static,
) -> Vec<T> {
    let barrier = Arc::new(Barrier::new(n));
    let f = Arc::new(f);
    let handles: Vec<_> = (0..n)
        .map(|i| {
            let barrier = barrier.clone();
            let f = f.clone();
            thread::spawn(move || {
                barrier.wait();
                f(i)
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

// ── Call coalescing ──────────────────────────────────────────────────

#[test]
fn concurrent_misses_share_one_load() {
    let kms = slow_kms(&["shared"]);
    let cache = Arc::new(KeyCache::new(kms.clone(), DEFAULT_KEY_CACHE_TTL));

    let entries = run_concurrently(8, {
        let cache = cache.clone();
        move |_| cache.get(&key_name("shared")).unwrap()
    });

    assert!(entries.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(kms.calls().get_key_metadata, 1);
    assert_eq!(kms.calls().get_public_key_pem, 1);
}

#[test]
fn different_keys_load_in_parallel() {
    let ids = ["a", "b", "c", "d"];
    let kms = slow_kms(&ids);
    let cache = Arc::new(KeyCache::new(kms.clone(), DEFAULT_KEY_CACHE_TTL));

    let started = Instant::now();
    run_concurrently(ids.len(), {
        let cache = cache.clone();
        move |i| cache.get(&key_name(ids[i])).unwrap()
    });
    let elapsed = started.elapsed();

    assert_eq!(kms.calls().get_key_metadata, ids.len());
    assert!(
        elapsed < LATENCY * ids.len() as u32,
        "loads were serialized: {elapsed:?}"
    );
}

#[test]
fn waiters_receive_the_load_failure() {
    let kms = slow_kms(&[]);
    let cache = Arc::new(KeyCache::new(kms.clone(), DEFAULT_KEY_CACHE_TTL));

    let results = run_concurrently(6, {
        let cache = cache.clone();
        move |_| cache.get(&key_name("missing"))
    });

    let expected = KmsCsrError::Kms(KmsError::NotFound(key_name("missing").to_string()));
    for result in results {
        assert_eq!(result.unwrap_err(), expected);
    }
    assert_eq!(kms.calls().get_key_metadata, 1);
    assert_eq!(kms.calls().get_public_key_pem, 0);
}

#[test]
fn failed_load_is_retried() {
    let kms = Arc::new(LocalKms::new());
    let cache = KeyCache::new(kms.clone(), DEFAULT_KEY_CACHE_TTL);

    assert!(cache.get(&key_name("late")).is_err());
    assert!(cache.is_empty());

    kms.generate_key(key_name("late"), KeyAlgorithm::EcSignP384Sha384, "late")
        .unwrap();
    let entry = cache.get(&key_name("late")).unwrap();

    assert_eq!(entry.algorithm(), KeyAlgorithm::EcSignP384Sha384);
    assert_eq!(kms.calls().get_key_metadata, 2);
}

// ── Expiry ───────────────────────────────────────────────────────────

#[test]
fn short_ttl_reloads_idle_key() {
    let kms = Arc::new(LocalKms::new());
    kms.generate_key(key_name("k"), KeyAlgorithm::EcSignP256Sha256, "k")
        .unwrap();
    let cache = KeyCache::new(kms.clone(), Duration::from_millis(50));

    cache.get(&key_name("k")).unwrap();
    cache.get(&key_name("k")).unwrap();
    assert_eq!(kms.calls().get_key_metadata, 1);

    thread::sleep(Duration::from_millis(120));
    cache.get(&key_name("k")).unwrap();
    assert_eq!(kms.calls().get_key_metadata, 2);
}

#[test]
fn invalidate_drops_entry() {
    let kms = Arc::new(LocalKms::new());
    kms.generate_key(key_name("k"), KeyAlgorithm::EcSignP256Sha256, "k")
        .unwrap();
    let cache = KeyCache::new(kms.clone(), DEFAULT_KEY_CACHE_TTL);

    cache.get(&key_name("k")).unwrap();
    assert_eq!(cache.len(), 1);
    assert!(cache.invalidate(&key_name("k")));
    cache.get(&key_name("k")).unwrap();

    assert_eq!(kms.calls().get_key_metadata, 2);
}

// ── Async callers ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn builds_from_blocking_tasks() {
    let kms = slow_kms(&["async"]);
    let factory = Arc::new(CsrBuilderFactory::new(kms.clone()));

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            let factory = factory.clone();
            tokio::task::spawn_blocking(move || -> kms_csr::Result<_> {
                factory
                    .csr_builder()
                    .with_key(key_name("async"))
                    .for_subject(&format!("CN=worker-{i}"))?
                    .build()
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap().verify().unwrap();
    }

    let calls = kms.calls();
    assert_eq!(calls.get_key_metadata, 1);
    assert_eq!(calls.asymmetric_sign, 4);
}
