//! Periodic trust-list refresh
//!
//! One update runs synchronously at startup; afterwards a background thread
//! wakes on multiples of the interval since the Unix epoch. Failed periodic runs
//! are logged and retried at the next boundary.

use crate::configs::TrustConfig;
use crate::error::{PkiError, Result};
use crate::trust_list_syncer::{SyncOutcome, TrustListSyncer};
use chrono::Utc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

/// Runs trust-list updates once at startup and then on a fixed period
pub struct RefreshScheduler {
    syncer: Arc<TrustListSyncer>,
    config: TrustConfig,
    interval: Duration,
}

/// Owner of the background refresh thread
#[derive(Debug)]
pub struct SchedulerHandle {
    stop: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    pub fn new(syncer: Arc<TrustListSyncer>, config: TrustConfig, interval: Duration) -> Self {
        Self {
            syncer,
            config,
            interval,
        }
    }

    /// Interval taken from `refresh-interval-hours`
    pub fn from_config(syncer: Arc<TrustListSyncer>, config: TrustConfig) -> Self {
        let interval = Duration::from_secs(config.refresh_interval_hours.max(1) * 3600);
        Self::new(syncer, config, interval)
    }

    /// Run the startup update, then spawn the periodic loop. A failing startup
    /// update is returned and no thread is started.
    pub fn start(self) -> Result<(SyncOutcome, SchedulerHandle)> {
        let outcome = self.syncer.update(&self.config)?;
        let handle = self.spawn()?;
        Ok((outcome, handle))
    }

    /// Spawn the periodic loop without a startup update
    pub fn spawn(self) -> Result<SchedulerHandle> {
        if self.interval.is_zero() {
            return Err(PkiError::Config("Refresh interval must be positive".to_string()));
        }

        let interval = self.interval;
        let (stop, stopped) = mpsc::channel::<()>();
        let thread = thread::Builder::new()
            .name("trust-refresh".to_string())
            .spawn(move || loop {
                let wait = delay_until_next_boundary(interval, Utc::now().timestamp_millis());
                match stopped.recv_timeout(wait) {
                    Err(RecvTimeoutError::Timeout) => self.run_once(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        info!(interval_secs = interval.as_secs(), "Trust list refresh scheduled");
        Ok(SchedulerHandle {
            stop,
            thread: Some(thread),
        })
    }

    fn run_once(&self) {
        match self.syncer.update(&self.config) {
            Ok(SyncOutcome::Refreshed(reports)) => {
                info!(lists = reports.len(), "Scheduled trust list refresh completed")
            }
            Ok(SyncOutcome::Skipped { days_elapsed }) => {
                debug!(days_elapsed, "Scheduled trust list refresh skipped")
            }
            Err(e) => error!(error = %e, "Scheduled trust list refresh failed"),
        }
    }
}

impl SchedulerHandle {
    /// Stop the loop and wait for any in-flight update to finish
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        let _ = self.stop.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Trust list refresh thread panicked");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

/// Time left until the next multiple of `interval` since the Unix epoch
pub(crate) fn delay_until_next_boundary(interval: Duration, now_millis: i64) -> Duration {
    let period = (interval.as_millis() as u64).max(1);
    let now = now_millis.max(0) as u64;
    Duration::from_millis(period - now % period)
}
