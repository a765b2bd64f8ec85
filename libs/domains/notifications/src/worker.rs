//! Fixed-interval background task with an explicit start/stop handle.
//!
//! Stopping only prevents future ticks. A tick already running is allowed to
//! finish; [`PeriodicWorker::shutdown`] waits for it.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    running: Option<Running>,
    /// Stopped tasks that may still be finishing a tick.
    draining: Vec<JoinHandle<()>>,
}

pub struct PeriodicWorker {
    name: &'static str,
    state: Mutex<State>,
}

impl PeriodicWorker {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(State::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.lock().running.is_some()
    }

    /// Run `tick` every `period`, first after one full period.
    ///
    /// Returns `false` without doing anything when already running.
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut>(&self, period: Duration, tick: F) -> bool
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.lock();
        if state.running.is_some() {
            warn!(worker = self.name, "Worker already running");
            return false;
        }
        state.draining.retain(|handle| !handle.is_finished());

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let name = self.name;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        debug!(worker = name, "Worker tick");
                        tick().await;
                    }
                }
            }
            debug!(worker = name, "Worker loop exited");
        });

        state.running = Some(Running { shutdown, handle });
        info!(worker = self.name, period_ms = period.as_millis() as u64, "Worker started");
        true
    }

    /// Stop scheduling ticks. Returns `false` when not running.
    pub fn stop(&self) -> bool {
        let mut state = self.lock();
        let Some(running) = state.running.take() else {
            return false;
        };
        let _ = running.shutdown.send(true);
        state.draining.retain(|handle| !handle.is_finished());
        state.draining.push(running.handle);
        info!(worker = self.name, "Worker stopped");
        true
    }

    /// Stop and wait for any in-flight tick to finish.
    pub async fn shutdown(&self) {
        self.stop();
        let draining = std::mem::take(&mut self.lock().draining);
        for handle in draining {
            if let Err(e) = handle.await {
                warn!(worker = self.name, error = %e, "Worker task ended abnormally");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PeriodicWorker {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = state.running.take() {
            let _ = running.shutdown.send(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> impl Fn() -> futures::future::Ready<()> + Send + Sync + 'static {
        let counter = counter.clone();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_on_interval() {
        let worker = PeriodicWorker::new("test");
        let ticks = Arc::new(AtomicUsize::new(0));
        assert!(worker.start(Duration::from_secs(30), counting(&ticks)));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(75)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        worker.shutdown().await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop_are_idempotent() {
        let worker = PeriodicWorker::new("test");
        let ticks = Arc::new(AtomicUsize::new(0));
        assert!(!worker.stop());
        assert!(worker.start(Duration::from_secs(1), counting(&ticks)));
        assert!(!worker.start(Duration::from_secs(1), counting(&ticks)));
        assert!(worker.is_running());
        assert!(worker.stop());
        assert!(!worker.stop());
        assert!(!worker.is_running());
        worker.shutdown().await;

        assert!(worker.start(Duration::from_secs(1), counting(&ticks)));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        worker.shutdown().await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_cycles_drop_finished_tasks() {
        let worker = PeriodicWorker::new("cycling");
        let ticks = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            assert!(worker.start(Duration::from_secs(1), counting(&ticks)));
            assert!(worker.stop());
            // Let the stopped loop observe the signal and exit.
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(worker.lock().draining.len() <= 1);
        worker.shutdown().await;
        assert!(worker.lock().draining.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_tick_finishes_on_shutdown() {
        let worker = PeriodicWorker::new("slow");
        let finished = Arc::new(AtomicUsize::new(0));
        let done = finished.clone();
        worker.start(Duration::from_secs(1), move || {
            let done = done.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                done.fetch_add(1, Ordering::SeqCst);
            }
        });

        // Inside the first tick.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        worker.shutdown().await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
