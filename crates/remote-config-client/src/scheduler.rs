//! Fixed-interval poll driver.
//!
//! The scheduler owns a background task that runs the poll function, waits
//! for the interval and repeats. A new delay only starts once the previous
//! poll has resolved, so polls never overlap. Stopping cancels the pending
//! delay; a poll already in flight is allowed to finish.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type PollFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drives a poll function on a fixed interval.
pub struct Scheduler {
    interval: Duration,
    poll: PollFn,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    pub fn new<F, Fut>(interval: Duration, poll: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            interval,
            poll: Arc::new(move || poll().boxed()),
            running: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawns the poll loop; the first poll runs immediately.
    ///
    /// Returns `false` when already running or when called outside a tokio
    /// runtime.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running
            .as_ref()
            .is_some_and(|current| !current.handle.is_finished())
        {
            return false;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("remote-config: cannot start polling outside of a tokio runtime");
            return false;
        };

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(run_poll_loop(
            self.interval,
            Arc::clone(&self.poll),
            cancel.clone(),
        ));
        *running = Some(Running { cancel, handle });
        debug!(interval = ?self.interval, "remote-config: polling started");
        true
    }

    /// Prevents further polls. Returns `false` when not running.
    pub fn stop(&self) -> bool {
        let stopped = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match stopped {
            Some(running) => {
                running.cancel.cancel();
                debug!("remote-config: polling stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|running| !running.cancel.is_cancelled() && !running.handle.is_finished())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let running = self
            .running
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            running.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

async fn run_poll_loop(interval: Duration, poll: PollFn, cancel: CancellationToken) {
    while !cancel.is_cancelled() {
        poll().await;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = sleep(interval) => {}
        }
    }
}
