//! Timer jobs backing the promotion engine.
//!
//! Every job is keyed by (tenant, kind) and the scheduler refuses to
//! register a second job under an occupied key. The engine persists
//! the job id before handing the key over, so a crash leaves a stale
//! record it can recognize on the next boot.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Datelike, Local, NaiveDateTime, NaiveTime};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use super::types::JobKind;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub tenant_id: String,
    pub kind: JobKind,
}

impl JobKey {
    pub fn new(tenant_id: &str, kind: JobKind) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            kind,
        }
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("a {1} job is already scheduled for tenant {0}")]
    DuplicateJob(String, JobKind),
}

struct JobEntry {
    id: String,
    handle: JoinHandle<()>,
}

pub struct JobScheduler {
    jobs: Arc<Mutex<HashMap<JobKey, JobEntry>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl JobScheduler {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            shutdown_tx,
        }
    }

    /// Run `tick` every `interval` until the job is removed or the
    /// scheduler shuts down. The first run happens after one full
    /// interval, never immediately.
    pub fn add_interval<F, Fut>(
        &self,
        key: JobKey,
        job_id: String,
        interval: Duration,
        tick: F,
    ) -> Result<(), SchedulerError>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(&key) {
            return Err(SchedulerError::DuplicateJob(key.tenant_id, key.kind));
        }
        debug!(
            "scheduling {} for tenant {} every {}s",
            key.kind,
            key.tenant_id,
            interval.as_secs()
        );
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(interval) => tick().await,
                }
            }
        });
        jobs.insert(key, JobEntry { id: job_id, handle });
        Ok(())
    }

    /// Run `task` once after `delay`. The job entry is dropped right
    /// before the task runs so the task may schedule a successor under
    /// the same key.
    pub fn add_once<F, Fut>(
        &self,
        key: JobKey,
        job_id: String,
        delay: Duration,
        task: F,
    ) -> Result<(), SchedulerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(&key) {
            return Err(SchedulerError::DuplicateJob(key.tenant_id, key.kind));
        }
        debug!(
            "scheduling one-shot {} for tenant {} in {}s",
            key.kind,
            key.tenant_id,
            delay.as_secs()
        );
        let jobs_ref = Arc::clone(&self.jobs);
        let entry_id = job_id.clone();
        let entry_key = key.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            {
                let mut jobs = jobs_ref.lock().unwrap();
                if jobs.get(&entry_key).map(|e| e.id == entry_id).unwrap_or(false) {
                    jobs.remove(&entry_key);
                }
            }
            task().await;
        });
        jobs.insert(key, JobEntry { id: job_id, handle });
        Ok(())
    }

    /// Run `task` every day at `at` local time, skipping days whose
    /// ISO weekday (1 = Monday) is not in `weekdays` when given.
    pub fn add_daily<F, Fut>(
        &self,
        key: JobKey,
        job_id: String,
        at: NaiveTime,
        weekdays: Option<Vec<u32>>,
        task: F,
    ) -> Result<(), SchedulerError>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(&key) {
            return Err(SchedulerError::DuplicateJob(key.tenant_id, key.kind));
        }
        debug!(
            "scheduling daily {} for tenant {} at {}",
            key.kind, key.tenant_id, at
        );
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                let delay =
                    duration_until_next(Local::now().naive_local(), at, weekdays.as_deref());
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(delay) => task().await,
                }
            }
        });
        jobs.insert(key, JobEntry { id: job_id, handle });
        Ok(())
    }

    /// Abort and forget the job under `key`. Returns whether a job was
    /// actually registered there.
    pub fn remove(&self, key: &JobKey) -> bool {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.remove(key) {
            Some(entry) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: &JobKey) -> bool {
        self.jobs.lock().unwrap().contains_key(key)
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    /// Tenants that currently hold a promotion cycle, meaning either a
    /// recurring job or the paired scheduled stop.
    pub fn running_tenants(&self) -> Vec<String> {
        let jobs = self.jobs.lock().unwrap();
        let mut tenants: Vec<String> = jobs
            .keys()
            .filter(|key| {
                matches!(
                    key.kind,
                    JobKind::RecurringPromotion | JobKind::ScheduledStop | JobKind::DelayedRerun
                )
            })
            .map(|key| key.tenant_id.clone())
            .collect();
        tenants.sort();
        tenants.dedup();
        tenants
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        let mut jobs = self.jobs.lock().unwrap();
        for (_, entry) in jobs.drain() {
            entry.handle.abort();
        }
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn duration_until_next(
    now: NaiveDateTime,
    at: NaiveTime,
    weekdays: Option<&[u32]>,
) -> Duration {
    let mut candidate = now.date();
    if now.time() >= at {
        candidate = candidate.succ_opt().unwrap_or(candidate);
    }
    for _ in 0..7 {
        let allowed = weekdays
            .map(|days| days.contains(&candidate.weekday().number_from_monday()))
            .unwrap_or(true);
        if allowed {
            break;
        }
        candidate = candidate.succ_opt().unwrap_or(candidate);
    }
    (candidate.and_time(at) - now)
        .to_std()
        .unwrap_or(Duration::ZERO)
}
