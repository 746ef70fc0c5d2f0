//! Jittered recurring timer driving one stream
//!
//! Each ticker owns a tokio task that sleeps a freshly drawn delay, then runs
//! the tick closure against the stream state under its mutex. The
//! cancellation check happens under the same mutex, and `cancel` takes that
//! mutex once after cancelling, so no tick mutates state after `cancel`
//! returns.

use crate::config::TickInterval;
use rand::RngCore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lock a stream mutex, recovering from poisoning (ticks never leave state half-written).
pub(crate) fn lock<S>(state: &Mutex<S>) -> MutexGuard<'_, S> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct Ticker<S> {
    name: String,
    token: CancellationToken,
    state: Arc<Mutex<S>>,
    ticks: Arc<AtomicU64>,
    join: Option<JoinHandle<()>>,
}

impl<S: Send + 'static> Ticker<S> {
    /// Spawn the timer task. Must be called inside a tokio runtime. The
    /// ticker stops when `parent` or its own token is cancelled.
    pub fn spawn<F>(
        name: impl Into<String>,
        interval: TickInterval,
        mut jitter: Box<dyn RngCore + Send>,
        state: Arc<Mutex<S>>,
        parent: &CancellationToken,
        mut tick: F,
    ) -> Self
    where
        F: FnMut(&mut S) + Send + 'static,
    {
        let name = name.into();
        let token = parent.child_token();
        let ticks = Arc::new(AtomicU64::new(0));

        let task_name = name.clone();
        let task_token = token.clone();
        let task_state = state.clone();
        let task_ticks = ticks.clone();
        let join = tokio::spawn(async move {
            debug!("Ticker {} started", task_name);
            loop {
                let delay = interval.sample(&mut *jitter);
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                if !run_tick(&task_state, &task_token, &task_ticks, &mut tick) {
                    break;
                }
            }
            debug!("Ticker {} stopped after {} ticks", task_name, task_ticks.load(Ordering::Relaxed));
        });

        Self {
            name,
            token,
            state,
            ticks,
            join: Some(join),
        }
    }
}

impl<S> Ticker<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stop ticking. Idempotent; once this returns no further tick runs.
    pub fn cancel(&self) {
        self.token.cancel();
        // Barrier: wait out a tick that passed its check before the cancel.
        drop(lock(&self.state));
    }

    /// Cancel and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                if e.is_panic() {
                    warn!("Ticker {} panicked", self.name);
                }
            }
        }
    }
}

impl<S> Drop for Ticker<S> {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

fn run_tick<S, F: FnMut(&mut S)>(
    state: &Mutex<S>,
    token: &CancellationToken,
    ticks: &AtomicU64,
    tick: &mut F,
) -> bool {
    let mut guard = lock(state);
    if token.is_cancelled() {
        return false;
    }
    tick(&mut *guard);
    ticks.fetch_add(1, Ordering::Relaxed);
    true
}
