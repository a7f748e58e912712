//! Shared retry backoff.
//!
//! During an outage every in-flight request fails at roughly the same
//! time. Rather than arming one backoff timer per failed request, all
//! waiters park on a single shared timer and are released together when
//! it fires.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;

#[derive(Default)]
struct RetryState {
    waiters: Vec<oneshot::Sender<()>>,
    timer_armed: bool,
}

pub struct RetryCoordinator {
    delay: Duration,
    state: Mutex<RetryState>,
}

impl RetryCoordinator {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            state: Mutex::new(RetryState::default()),
        })
    }

    /// Park until the shared backoff timer fires. The first waiter arms
    /// the timer; everyone who fails while it is pending rides along.
    pub async fn wait_for_retry(self: &Arc<Self>) {
        let rx = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);

            if !state.timer_armed {
                state.timer_armed = true;
                let coordinator = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::time::sleep(coordinator.delay).await;
                    let waiters = {
                        let mut state = coordinator
                            .state
                            .lock()
                            .unwrap_or_else(|e| e.into_inner());
                        state.timer_armed = false;
                        std::mem::take(&mut state.waiters)
                    };
                    for waiter in waiters {
                        let _ = waiter.send(());
                    }
                });
            }
            rx
        };
        let _ = rx.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn concurrent_waiters_share_one_timer() {
        let coordinator = RetryCoordinator::new(Duration::from_secs(2));
        let started = Instant::now();

        let waits: Vec<_> = (0..5)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                async move { coordinator.wait_for_retry().await }
            })
            .collect();
        join_all(waits).await;

        // all five were released by the same timer, not serially
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn timer_rearms_for_later_failures() {
        let coordinator = RetryCoordinator::new(Duration::from_secs(2));

        coordinator.wait_for_retry().await;
        let started = Instant::now();
        coordinator.wait_for_retry().await;
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }
}
