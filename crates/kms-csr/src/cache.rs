use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use spki::SubjectPublicKeyInfoOwned;
use tracing::debug;

use crate::algorithm::KeyAlgorithm;
use crate::error::{KmsCsrError, Result};
use crate::keys::{PublicKey, decode_spki_pem};
use crate::kms::{KeyVersionName, KmsClient, KmsError};

/// How long an unused key stays cached.
pub const DEFAULT_KEY_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// A resolved KMS key version: its algorithm and parsed public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    name: KeyVersionName,
    algorithm: KeyAlgorithm,
    public_key: PublicKey,
    spki: SubjectPublicKeyInfoOwned,
}

impl KeyEntry {
    pub fn name(&self) -> &KeyVersionName {
        &self.name
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn spki(&self) -> &SubjectPublicKeyInfoOwned {
        &self.spki
    }
}

type Clock = Arc<dyn Fn() -> Instant + Send + Sync>;

/// Caches [`KeyEntry`] values by key version name.
///
/// Entries expire once they have not been read for `ttl`; every hit pushes
/// the deadline out again. Concurrent misses on one name share a single
/// load: the first caller fetches from the KMS while the others block until
/// it finishes and then receive the same entry or the same error. Loads for
/// different names run in parallel. Failed loads are not remembered.
pub struct KeyCache<C> {
    client: C,
    ttl: Duration,
    slots: Mutex<HashMap<KeyVersionName, Slot>>,
    clock: Clock,
}

enum Slot {
    Ready {
        entry: Arc<KeyEntry>,
        last_access: Instant,
    },
    Loading(Arc<InFlight>),
}

#[derive(Default)]
struct InFlight {
    result: Mutex<Option<Result<Arc<KeyEntry>>>>,
    done: Condvar,
}

impl InFlight {
    fn wait(&self) -> Result<Arc<KeyEntry>> {
        let mut result = lock(&self.result);
        loop {
            if let Some(result) = result.as_ref() {
                return result.clone();
            }
            result = self
                .done
                .wait(result)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn complete(&self, result: Result<Arc<KeyEntry>>) {
        *lock(&self.result) = Some(result);
        self.done.notify_all();
    }
}

enum Lookup {
    Hit(Arc<KeyEntry>),
    Wait(Arc<InFlight>),
    Load(Arc<InFlight>),
}

impl<C: KmsClient> KeyCache<C> {
    pub fn new(client: C, ttl: Duration) -> Self {
        Self::with_clock(client, ttl, Instant::now)
    }

    pub(crate) fn with_clock(
        client: C,
        ttl: Duration,
        clock: impl Fn() -> Instant + Send + Sync + 'static,
    ) -> Self {
        Self {
            client,
            ttl,
            slots: Mutex::new(HashMap::new()),
            clock: Arc::new(clock),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the entry for `name`, loading it from the KMS on a miss.
    ///
    /// Blocks while another caller is loading the same name.
    pub fn get(&self, name: &KeyVersionName) -> Result<Arc<KeyEntry>> {
        match self.lookup(name) {
            Lookup::Hit(entry) => Ok(entry),
            Lookup::Wait(flight) => {
                debug!(key = %name, "waiting for in-flight key load");
                flight.wait()
            }
            Lookup::Load(flight) => {
                let guard = LoadGuard {
                    cache: self,
                    name,
                    flight: Some(flight),
                };
                let result = self.load(name);
                guard.settle(result.clone());
                result
            }
        }
    }

    /// Drops a cached entry so the next `get` reloads it. Loads already in
    /// flight are left alone.
    pub fn invalidate(&self, name: &KeyVersionName) -> bool {
        let mut slots = lock(&self.slots);
        if let Some(Slot::Ready { .. }) = slots.get(name) {
            slots.remove(name);
            debug!(key = %name, "key cache entry invalidated");
            true
        } else {
            false
        }
    }

    /// Number of entries that have not expired yet.
    pub fn len(&self) -> usize {
        let now = self.now();
        lock(&self.slots)
            .values()
            .filter(|slot| match slot {
                Slot::Ready { last_access, .. } => self.is_fresh(*last_access, now),
                Slot::Loading(_) => false,
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, name: &KeyVersionName) -> Lookup {
        let now = self.now();
        let mut slots = lock(&self.slots);
        match slots.get_mut(name) {
            Some(Slot::Ready { entry, last_access }) if self.is_fresh(*last_access, now) => {
                *last_access = now;
                debug!(key = %name, "key cache hit");
                return Lookup::Hit(entry.clone());
            }
            Some(Slot::Loading(flight)) => return Lookup::Wait(flight.clone()),
            _ => {}
        }

        debug!(key = %name, "key cache miss");
        self.purge_expired(&mut slots, now);
        let flight = Arc::new(InFlight::default());
        slots.insert(name.clone(), Slot::Loading(flight.clone()));
        Lookup::Load(flight)
    }

    fn load(&self, name: &KeyVersionName) -> Result<Arc<KeyEntry>> {
        debug!(key = %name, "loading key from KMS");
        let metadata = self.client.get_key_metadata(name)?;
        let pem = self.client.get_public_key_pem(name)?;
        let spki = decode_spki_pem(&pem)?;
        let public_key = PublicKey::for_algorithm(metadata.algorithm, &spki)?;
        debug!(key = %name, algorithm = %metadata.algorithm, kind = public_key.kind(), "key loaded");
        Ok(Arc::new(KeyEntry {
            name: name.clone(),
            algorithm: metadata.algorithm,
            public_key,
            spki,
        }))
    }

    /// Replaces the loading slot with the outcome, unless the slot was
    /// invalidated and taken over by a newer load meanwhile.
    fn finish(&self, name: &KeyVersionName, flight: &Arc<InFlight>, result: &Result<Arc<KeyEntry>>) {
        let mut slots = lock(&self.slots);
        let ours = matches!(slots.get(name), Some(Slot::Loading(current)) if Arc::ptr_eq(current, flight));
        if !ours {
            return;
        }
        match result {
            Ok(entry) => {
                let slot = Slot::Ready {
                    entry: entry.clone(),
                    last_access: self.now(),
                };
                slots.insert(name.clone(), slot);
            }
            Err(error) => {
                debug!(key = %name, %error, "key load failed");
                slots.remove(name);
            }
        }
    }

    fn purge_expired(&self, slots: &mut HashMap<KeyVersionName, Slot>, now: Instant) {
        slots.retain(|name, slot| match slot {
            Slot::Ready { last_access, .. } => {
                let fresh = self.is_fresh(*last_access, now);
                if !fresh {
                    debug!(key = %name, "key cache entry expired");
                }
                fresh
            }
            Slot::Loading(_) => true,
        });
    }

    fn is_fresh(&self, last_access: Instant, now: Instant) -> bool {
        now.saturating_duration_since(last_access) < self.ttl
    }

    fn now(&self) -> Instant {
        (self.clock)()
    }
}

/// Settles an in-flight load. If the loader unwinds before settling, the
/// slot is released and waiters get an error instead of blocking forever.
struct LoadGuard<'a, C: KmsClient> {
    cache: &'a KeyCache<C>,
    name: &'a KeyVersionName,
    flight: Option<Arc<InFlight>>,
}

impl<C: KmsClient> LoadGuard<'_, C> {
    fn settle(mut self, result: Result<Arc<KeyEntry>>) {
        self.resolve(result);
    }

    fn resolve(&mut self, result: Result<Arc<KeyEntry>>) {
        if let Some(flight) = self.flight.take() {
            self.cache.finish(self.name, &flight, &result);
            flight.complete(result);
        }
    }
}

impl<C: KmsClient> Drop for LoadGuard<'_, C> {
    fn drop(&mut self) {
        if self.flight.is_some() {
            self.resolve(Err(KmsCsrError::Kms(KmsError::Unavailable(
                "key load aborted".to_string(),
            ))));
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
