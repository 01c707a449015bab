//! Cancellable delayed work.
//!
//! A `DelayedWork` runs a synchronous job after a delay; the job returns
//! the delay before its next run, or `None` to end the chain. Runs are
//! strictly sequential: a slow job delays the next run rather than
//! overlapping it. `cancel_and_join` returns only once no run is in
//! flight or pending.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use coreplug_core::{HotplugError, HotplugResult};

struct WorkSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// A self-rescheduling job on a tokio runtime.
pub struct DelayedWork {
    name: &'static str,
    runtime: Handle,
    slot: Option<WorkSlot>,
}

impl DelayedWork {
    /// Allocate on the runtime the caller is running in.
    pub fn new(name: &'static str) -> HotplugResult<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            HotplugError::ResourceAllocation(format!("{name}: no async runtime: {e}"))
        })?;
        Ok(Self::with_handle(name, runtime))
    }

    pub fn with_handle(name: &'static str, runtime: Handle) -> Self {
        Self {
            name,
            runtime,
            slot: None,
        }
    }

    /// Run `job` after `delay`, then again after each delay it returns.
    ///
    /// A chain that is already scheduled is cancelled first.
    pub fn schedule<F>(&mut self, delay: Duration, job: F)
    where
        F: FnMut() -> Option<Duration> + Send + 'static,
    {
        if let Some(old) = self.slot.take() {
            warn!(work = self.name, "rescheduling pending work");
            let _ = old.shutdown_tx.send(true);
            old.handle.abort();
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = self
            .runtime
            .spawn(run_chain(self.name, delay, job, shutdown_rx));
        self.slot = Some(WorkSlot {
            handle,
            shutdown_tx,
        });
        debug!(work = self.name, delay_ms = delay.as_millis() as u64, "work scheduled");
    }

    /// Whether a run is pending or in flight.
    pub fn is_pending(&self) -> bool {
        self.slot
            .as_ref()
            .is_some_and(|s| !s.handle.is_finished())
    }

    /// Cancel the chain and wait until it has fully stopped.
    ///
    /// A run already in progress completes first; no run starts afterwards.
    pub async fn cancel_and_join(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        let _ = slot.shutdown_tx.send(true);
        if let Err(e) = slot.handle.await
            && e.is_panic()
        {
            warn!(work = self.name, "work panicked");
        }
        debug!(work = self.name, "work drained");
    }
}

impl Drop for DelayedWork {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
        }
    }
}

async fn run_chain<F>(
    name: &'static str,
    mut delay: Duration,
    mut job: F,
    mut shutdown: watch::Receiver<bool>,
) where
    F: FnMut() -> Option<Duration>,
{
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                debug!(work = name, "work cancelled");
                break;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        match job() {
            Some(next) => delay = next,
            None => {
                debug!(work = name, "work chain finished");
                break;
            }
        }
    }
}
