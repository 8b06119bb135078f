//! Single-slot cache around an asynchronous factory.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};

use super::clock::{Clock, MonotonicClock};
use crate::error_handling::panic_message;
use crate::utility::tracing_targets::LAZY as TRACING_TARGET;

type Factory<T, E> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync>;
type Attempt<T, E> = Shared<BoxFuture<'static, Settled<T, E>>>;

/// Outcome of one initialisation attempt, shared by every caller that
/// joined it.
enum Settled<T, E> {
    Ready(Arc<T>),
    Failed(E),
    Panicked(Arc<str>),
}

impl<T, E: Clone> Clone for Settled<T, E> {
    fn clone(&self) -> Self {
        match self {
            Self::Ready(value) => Self::Ready(Arc::clone(value)),
            Self::Failed(error) => Self::Failed(error.clone()),
            Self::Panicked(message) => Self::Panicked(Arc::clone(message)),
        }
    }
}

enum Slot<T, E> {
    Empty,
    Pending {
        generation: u64,
        attempt: Attempt<T, E>,
    },
    Ready {
        generation: u64,
        value: Arc<T>,
        completed_at: Instant,
    },
}

impl<T, E> Slot<T, E> {
    const fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Pending { .. } => "pending",
            Self::Ready { .. } => "ready",
        }
    }
}

struct State<T, E> {
    slot: Slot<T, E>,
    generations: u64,
}

/// Slot state plus the clock used to stamp completions. Shared with the
/// driver task so an attempt can settle without any caller polling it.
struct Cell<T, E, C> {
    state: Mutex<State<T, E>>,
    clock: C,
}

impl<T, E, C: Clock> Cell<T, E, C> {
    fn new(clock: C) -> Self {
        Self {
            state: Mutex::new(State {
                slot: Slot::Empty,
                generations: 0,
            }),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T, E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the outcome of `generation` if that attempt still owns the
    /// slot. Outcomes of invalidated generations are dropped.
    fn settle(&self, generation: u64, settled: &Settled<T, E>) {
        let mut state = self.lock();
        let owns_slot = matches!(
            &state.slot,
            Slot::Pending { generation: current, .. } if *current == generation
        );
        if !owns_slot {
            return;
        }

        state.slot = match settled {
            Settled::Ready(value) => {
                tracing::debug!(target: TRACING_TARGET, generation, "middleware initialised");
                Slot::Ready {
                    generation,
                    value: Arc::clone(value),
                    completed_at: self.clock.now(),
                }
            }
            Settled::Failed(_) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    generation,
                    "middleware initialisation failed, retrying on next request"
                );
                Slot::Empty
            }
            Settled::Panicked(message) => {
                tracing::error!(
                    target: TRACING_TARGET,
                    generation,
                    panic = %message,
                    "middleware initialisation panicked, retrying on next request"
                );
                Slot::Empty
            }
        };
    }
}

enum Lookup<T, E> {
    Hit(Arc<T>),
    Wait {
        generation: u64,
        attempt: Attempt<T, E>,
    },
}

/// Lazily initialised value with failure invalidation and optional TTL.
///
/// The factory runs on first access. Callers that arrive while an attempt is
/// in flight join that attempt instead of starting their own, so the factory
/// runs at most once per cache generation. A failed attempt clears the slot
/// and the *next* call starts over; the failing call itself is not retried.
/// With a TTL configured, a successfully initialised value is discarded on
/// the first access at or after `completed_at + ttl`.
///
/// Expiry is checked lazily, there is no background timer.
pub struct InitCache<T, E, C = MonotonicClock> {
    factory: Factory<T, E>,
    ttl: Option<Duration>,
    cell: Arc<Cell<T, E, C>>,
}

impl<T, E> InitCache<T, E, MonotonicClock>
where
    T: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates a cache around `init` that never expires by time.
    pub fn new<F, Fut>(init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self {
            factory: Arc::new(move || init().boxed()),
            ttl: None,
            cell: Arc::new(Cell::new(MonotonicClock)),
        }
    }
}

impl<T, E, C> InitCache<T, E, C>
where
    T: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    C: Clock,
{
    /// Sets how long a successfully initialised value stays cached.
    pub fn with_ttl(mut self, ttl: impl Into<Option<Duration>>) -> Self {
        self.ttl = ttl.into();
        self
    }

    /// Replaces the time source. Any cached state is discarded.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> InitCache<T, E, C2> {
        InitCache {
            factory: self.factory,
            ttl: self.ttl,
            cell: Arc::new(Cell::new(clock)),
        }
    }

    /// Returns the configured TTL.
    #[inline]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Returns whether a successfully initialised, unexpired value is cached.
    pub fn is_ready(&self) -> bool {
        match &self.cell.lock().slot {
            Slot::Ready { completed_at, .. } => !self.is_expired(*completed_at),
            Slot::Empty | Slot::Pending { .. } => false,
        }
    }

    /// Discards the cached value or in-flight attempt.
    ///
    /// Callers already awaiting an in-flight attempt still receive its
    /// outcome, but that outcome is no longer cached.
    pub fn invalidate(&self) {
        self.cell.lock().slot = Slot::Empty;
        tracing::debug!(target: TRACING_TARGET, "middleware cache invalidated");
    }

    /// Returns the cached value, initialising it first if needed.
    ///
    /// # Errors
    ///
    /// Returns the factory's error, unchanged, when the attempt this call
    /// started or joined fails. Every caller that joined the same attempt
    /// receives a clone of the same error.
    ///
    /// # Panics
    ///
    /// Resumes a panic raised by the factory after evicting the attempt.
    pub async fn get(&self) -> Result<Arc<T>, E> {
        let (generation, attempt) = match self.lookup() {
            Lookup::Hit(value) => return Ok(value),
            Lookup::Wait {
                generation,
                attempt,
            } => (generation, attempt),
        };

        let settled = attempt.await;
        self.cell.settle(generation, &settled);

        match settled {
            Settled::Ready(value) => Ok(value),
            Settled::Failed(error) => Err(error),
            Settled::Panicked(message) => panic!("middleware initialisation panicked: {message}"),
        }
    }

    /// Check, invalidate and assign in one critical section.
    fn lookup(&self) -> Lookup<T, E> {
        let mut state = self.cell.lock();

        match &state.slot {
            Slot::Ready {
                value,
                completed_at,
                generation,
            } => {
                if !self.is_expired(*completed_at) {
                    return Lookup::Hit(Arc::clone(value));
                }

                tracing::debug!(
                    target: TRACING_TARGET,
                    generation = *generation,
                    "cached middleware expired"
                );
            }
            Slot::Pending {
                generation,
                attempt,
            } => {
                return Lookup::Wait {
                    generation: *generation,
                    attempt: attempt.clone(),
                };
            }
            Slot::Empty => {}
        }

        state.generations += 1;
        let generation = state.generations;
        let attempt = self.start(generation);
        state.slot = Slot::Pending {
            generation,
            attempt: attempt.clone(),
        };

        Lookup::Wait {
            generation,
            attempt,
        }
    }

    /// Starts a new attempt. When a tokio runtime is available, a detached
    /// task drives it to completion so that it settles even if every caller
    /// goes away.
    ///
    /// Runs under the slot lock, so the factory itself is only called once
    /// the attempt is first polled.
    fn start(&self, generation: u64) -> Attempt<T, E> {
        tracing::debug!(target: TRACING_TARGET, generation, "initialising middleware");

        let factory = Arc::clone(&self.factory);
        let attempt = AssertUnwindSafe(async move { factory().await })
            .catch_unwind()
            .map(|outcome| match outcome {
                Ok(Ok(value)) => Settled::Ready(Arc::new(value)),
                Ok(Err(error)) => Settled::Failed(error),
                Err(payload) => Settled::Panicked(Arc::from(panic_message(&*payload))),
            })
            .boxed()
            .shared();

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let cell = Arc::clone(&self.cell);
            let driver = attempt.clone();
            runtime.spawn(async move {
                let settled = driver.await;
                cell.settle(generation, &settled);
            });
        }

        attempt
    }

    fn is_expired(&self, completed_at: Instant) -> bool {
        self.ttl.is_some_and(|ttl| {
            self.cell.clock.now().saturating_duration_since(completed_at) >= ttl
        })
    }
}

impl<T, E, C> fmt::Debug for InitCache<T, E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.cell.state.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("InitCache")
            .field("ttl", &self.ttl)
            .field("state", &state.slot.as_str())
            .field("generations", &state.generations)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{OnceLock, Weak};

    use tokio::sync::Semaphore;

    use super::*;
    use crate::lazy::ManualClock;

    fn counting_factory(
        calls: &Arc<AtomicUsize>,
    ) -> impl Fn() -> BoxFuture<'static, Result<usize, String>> + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move || {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok(call) }.boxed()
        }
    }

    #[tokio::test]
    async fn test_caches_successful_initialisation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = InitCache::new(counting_factory(&calls));

        assert!(!cache.is_ready());
        let first = cache.get().await.unwrap();
        let second = cache.get().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_ready());
    }

    #[tokio::test]
    async fn test_retries_after_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = InitCache::new(move || {
            let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if call == 1 {
                    Err("init failed".to_owned())
                } else {
                    Ok(call)
                }
            }
        });

        assert_eq!(cache.get().await.unwrap_err(), "init failed");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!cache.is_ready());

        assert_eq!(*cache.get().await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));

        let counter = Arc::clone(&calls);
        let factory_gate = Arc::clone(&gate);
        let cache = Arc::new(InitCache::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let gate = Arc::clone(&factory_gate);
            async move {
                let _permit = gate.acquire().await.expect("gate closed");
                Ok::<_, String>(42_usize)
            }
        }));

        let callers: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get().await })
            })
            .collect();

        tokio::task::yield_now().await;
        gate.add_permits(1);

        let mut values = Vec::new();
        for caller in callers {
            values.push(caller.await.unwrap().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|value| Arc::ptr_eq(value, &values[0])));
    }

    #[tokio::test]
    async fn test_concurrent_callers_observe_the_same_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));

        let counter = Arc::clone(&calls);
        let factory_gate = Arc::clone(&gate);
        let cache = Arc::new(InitCache::new(move || {
            let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let gate = Arc::clone(&factory_gate);
            async move {
                if call == 1 {
                    let _permit = gate.acquire().await.expect("gate closed");
                    Err(format!("attempt {call} failed"))
                } else {
                    Ok(call)
                }
            }
        }));

        let callers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get().await })
            })
            .collect();

        tokio::task::yield_now().await;
        gate.add_permits(1);

        for caller in callers {
            assert_eq!(caller.await.unwrap().unwrap_err(), "attempt 1 failed");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(*cache.get().await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ttl_expiry_forces_reinitialisation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(ManualClock::new());
        let cache = InitCache::new(counting_factory(&calls))
            .with_ttl(Duration::from_millis(60_000))
            .with_clock(Arc::clone(&clock));

        assert_eq!(*cache.get().await.unwrap(), 1);

        clock.advance(Duration::from_millis(1_000));
        assert_eq!(*cache.get().await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_millis(79_000));
        assert!(!cache.is_ready());
        assert_eq!(*cache.get().await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ttl_expiry_is_inclusive() {
        let calls = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(ManualClock::new());
        let cache = InitCache::new(counting_factory(&calls))
            .with_ttl(Duration::from_secs(10))
            .with_clock(Arc::clone(&clock));

        cache.get().await.unwrap();
        clock.advance(Duration::from_secs(10));
        cache.get().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_ttl_reinitialises_every_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = InitCache::new(counting_factory(&calls))
            .with_ttl(Duration::ZERO)
            .with_clock(ManualClock::new());

        for expected in 1..=3 {
            assert_eq!(*cache.get().await.unwrap(), expected);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_ttl_never_expires() {
        let calls = Arc::new(AtomicUsize::new(0));
        let clock = Arc::new(ManualClock::new());
        let cache = InitCache::new(counting_factory(&calls)).with_clock(Arc::clone(&clock));

        for _ in 0..5 {
            cache.get().await.unwrap();
            clock.advance(Duration::from_secs(365 * 24 * 60 * 60));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_ready());
    }

    #[tokio::test]
    async fn test_invalidate_forces_reinitialisation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = InitCache::new(counting_factory(&calls));

        cache.get().await.unwrap();
        cache.invalidate();
        assert!(!cache.is_ready());

        assert_eq!(*cache.get().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_invalidated_attempt_is_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));

        let counter = Arc::clone(&calls);
        let factory_gate = Arc::clone(&gate);
        let cache = Arc::new(InitCache::new(move || {
            let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let gate = Arc::clone(&factory_gate);
            async move {
                let _permit = gate.acquire().await.expect("gate closed");
                Ok::<_, String>(call)
            }
        }));

        let waiting = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get().await })
        };
        tokio::task::yield_now().await;

        cache.invalidate();
        gate.add_permits(2);

        assert_eq!(*waiting.await.unwrap().unwrap(), 1);
        assert!(!cache.is_ready());
        assert_eq!(*cache.get().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_factory_can_query_its_own_cache() {
        type Handle = Arc<OnceLock<Weak<InitCache<bool, String>>>>;

        let handle = Handle::default();
        let factory_handle = Arc::clone(&handle);
        let cache = Arc::new(InitCache::new(move || {
            let ready = factory_handle
                .get()
                .and_then(Weak::upgrade)
                .is_some_and(|cache| cache.is_ready());
            async move { Ok::<_, String>(ready) }
        }));
        handle.set(Arc::downgrade(&cache)).unwrap();

        assert!(!*cache.get().await.unwrap());
        assert!(cache.is_ready());
    }

    #[tokio::test]
    async fn test_factory_panicking_before_its_future_is_evicted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = InitCache::new(move || {
            let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
            assert!(call > 1, "factory exploded");
            async move { Ok::<_, String>(call) }
        });

        let outcome = AssertUnwindSafe(cache.get()).catch_unwind().await;
        assert!(outcome.is_err());
        assert!(!cache.is_ready());
        assert!(format!("{cache:?}").contains("\"empty\""));

        assert_eq!(*cache.get().await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panicking_factory_is_evicted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = InitCache::new(move || {
            let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if call == 1 {
                    panic!("factory exploded");
                }
                Ok::<_, String>(call)
            }
        });

        let outcome = AssertUnwindSafe(cache.get()).catch_unwind().await;
        assert!(outcome.is_err());
        assert!(!cache.is_ready());

        assert_eq!(*cache.get().await.unwrap(), 2);
    }

    #[test]
    fn test_debug_reports_state() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = InitCache::new(counting_factory(&calls)).with_ttl(Duration::from_secs(1));

        let debug = format!("{cache:?}");
        assert!(debug.contains("empty"));
        assert!(debug.contains("ttl"));
    }
}
