//! Keyed concurrency queue for async work.
//!
//! Tasks pushed under the same key run strictly one at a time, in
//! submission order, no matter how large the global budget is. Across
//! distinct keys at most `max_concurrency` tasks run simultaneously;
//! everything else waits in a global FIFO list.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::oneshot;

use crate::errors::{PaktError, PaktResult};

const STUCK_WARNING_DELAY: Duration = Duration::from_secs(5);

type TaskFactory<T> = Box<dyn FnOnce() -> BoxFuture<'static, PaktResult<T>> + Send>;

struct QueuedTask<T> {
    factory: TaskFactory<T>,
    tx: oneshot::Sender<PaktResult<T>>,
}

struct QueueState<T> {
    /// Per-key FIFO backlog. A key's next task is only promoted once its
    /// previous task has completed.
    queued: HashMap<String, VecDeque<QueuedTask<T>>>,
    /// Keys that currently have a task admitted or running. At most one
    /// task per key is ever past the backlog.
    active_keys: HashSet<String>,
    /// Global admission list, FIFO across keys.
    ready: VecDeque<(String, QueuedTask<T>)>,
    running: usize,
    /// Bumped on every task start and completion. The stuck watchdog
    /// compares epochs to detect zero throughput.
    epoch: u64,
    watchdog_armed: bool,
    warned_stuck: bool,
}

struct Inner<T> {
    name: String,
    max_concurrency: usize,
    state: Mutex<QueueState<T>>,
}

/// A queue that serializes tasks per key and bounds global concurrency.
///
/// Failures reject only the failed task's future; the queue keeps
/// admitting work afterwards.
pub struct ConcurrencyQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ConcurrencyQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> ConcurrencyQueue<T> {
    pub fn new(name: impl Into<String>, max_concurrency: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                max_concurrency: max_concurrency.max(1),
                state: Mutex::new(QueueState {
                    queued: HashMap::new(),
                    active_keys: HashSet::new(),
                    ready: VecDeque::new(),
                    running: 0,
                    epoch: 0,
                    watchdog_armed: false,
                    warned_stuck: false,
                }),
            }),
        }
    }

    /// Enqueue a task under `key` and return a future for its result.
    ///
    /// The factory is not invoked until the task is admitted, so queued
    /// work costs nothing until it actually runs.
    pub fn push<F, Fut>(&self, key: &str, factory: F) -> impl Future<Output = PaktResult<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = PaktResult<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let boxed = move || -> BoxFuture<'static, PaktResult<T>> { Box::pin(factory()) };
        let task = QueuedTask {
            factory: Box::new(boxed),
            tx,
        };

        {
            let mut state = Inner::lock_state(&self.inner);
            state
                .queued
                .entry(key.to_string())
                .or_default()
                .push_back(task);
            if !state.active_keys.contains(key) {
                Inner::promote(&mut state, key);
            }
            Inner::pump(&self.inner, &mut state);
        }

        async move {
            rx.await.unwrap_or_else(|_| {
                Err(PaktError::Invariant {
                    message: "queue task dropped without completing".to_string(),
                }
                .into())
            })
        }
    }
}

impl<T: Send + 'static> Inner<T> {
    fn lock_state(inner: &Arc<Self>) -> MutexGuard<'_, QueueState<T>> {
        inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move the key's next backlog task onto the global admission list.
    fn promote(state: &mut QueueState<T>, key: &str) {
        let Some(backlog) = state.queued.get_mut(key) else {
            return;
        };
        let Some(task) = backlog.pop_front() else {
            return;
        };
        if backlog.is_empty() {
            state.queued.remove(key);
        }
        state.active_keys.insert(key.to_string());
        state.ready.push_back((key.to_string(), task));
    }

    /// Admit tasks from the global list while capacity remains.
    fn pump(inner: &Arc<Self>, state: &mut QueueState<T>) {
        while state.running < inner.max_concurrency {
            let Some((key, task)) = state.ready.pop_front() else {
                break;
            };
            state.running += 1;
            state.epoch += 1;

            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                let result = (task.factory)().await;
                let _ = task.tx.send(result);

                let mut state = Inner::lock_state(&inner);
                state.running -= 1;
                state.epoch += 1;
                if state.queued.contains_key(&key) {
                    Inner::promote(&mut state, &key);
                } else {
                    state.active_keys.remove(&key);
                }
                Inner::pump(&inner, &mut state);
            });
        }
        Self::arm_watchdog(inner, state);
    }

    /// Watch for a lone task hogging the queue. Diagnostic only: fires a
    /// single warning per queue and never changes scheduling.
    fn arm_watchdog(inner: &Arc<Self>, state: &mut QueueState<T>) {
        if state.warned_stuck || state.watchdog_armed || state.running != 1 {
            return;
        }
        state.watchdog_armed = true;
        let observed_epoch = state.epoch;

        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            tokio::time::sleep(STUCK_WARNING_DELAY).await;
            let mut state = Inner::lock_state(&inner);
            state.watchdog_armed = false;
            if !state.warned_stuck && state.running == 1 && state.epoch == observed_epoch {
                state.warned_stuck = true;
                tracing::warn!(
                    "queue '{}' has made no progress for {}s; a task may be stuck",
                    inner.name,
                    STUCK_WARNING_DELAY.as_secs()
                );
            } else {
                Inner::arm_watchdog(&inner, &mut state);
            }
        });
    }
}
