//! Promotion cycle orchestration.
//!
//! A cycle is started per tenant with a stop time for the same day.
//! The engine pairs a recurring promotion job with a scheduled stop,
//! runs the first tick immediately, and walks each tick through
//! extraction, candidate selection, and the upstream pipeline.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime};
use rand::Rng;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::extraction::ExtractionCoordinator;
use crate::ledger::TokenLedger;
use crate::metrics;
use crate::notify::Notifier;
use crate::pipeline::{Outcome, PromotionPipeline};
use crate::pool::{Account, AccountPool, Policy, Tenant, TenantStore};
use crate::selector::{CandidateSelector, Selection};
use crate::upstream::PromotionApi;

use super::config::{parse_clock_time, AutoStartConfig, EngineConfig};
use super::scheduler::{JobKey, JobScheduler};
use super::types::{CycleInfo, EngineError, EngineStatus, JobKind};

pub struct PromotionEngine {
    config: EngineConfig,
    store: Arc<dyn TenantStore>,
    ledger: Arc<dyn TokenLedger>,
    notifier: Arc<dyn Notifier>,
    pool: AccountPool,
    selector: CandidateSelector,
    pipeline: PromotionPipeline,
    extraction: ExtractionCoordinator,
    scheduler: JobScheduler,
    /// One tick at a time per tenant, whatever timer fired it.
    tick_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PromotionEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn TenantStore>,
        ledger: Arc<dyn TokenLedger>,
        api: Arc<dyn PromotionApi>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let pool = AccountPool::new(Arc::clone(&store), Arc::clone(&ledger));
        let selector = CandidateSelector::new(Arc::clone(&ledger));
        let pipeline = PromotionPipeline::new(Arc::clone(&api), Arc::clone(&ledger), pool.clone());
        let extraction =
            ExtractionCoordinator::new(Arc::clone(&api), Arc::clone(&ledger), pool.clone());
        Self {
            config,
            store,
            ledger,
            notifier,
            pool,
            selector,
            pipeline,
            extraction,
            scheduler: JobScheduler::new(),
            tick_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a promotion cycle running until `stop_time` (HH:MM, local,
    /// same day). Computes the per-account cap and tick interval from
    /// the tenant's daily cap, schedules the recurring and stop jobs,
    /// and runs the first tick before returning.
    pub async fn start(
        self: &Arc<Self>,
        tenant_id: &str,
        stop_time: &str,
    ) -> Result<CycleInfo, EngineError> {
        let tenant = self
            .store
            .get_tenant(tenant_id)?
            .ok_or_else(|| EngineError::TenantNotFound(tenant_id.to_string()))?;

        let running_key = JobKey::new(tenant_id, JobKind::RecurringPromotion);
        let stop_key = JobKey::new(tenant_id, JobKind::ScheduledStop);
        if self.scheduler.contains(&running_key) || self.scheduler.contains(&stop_key) {
            return Err(EngineError::SchedulingConflict(format!(
                "a promotion cycle is already running for tenant {tenant_id}"
            )));
        }
        if !tenant.active {
            return Err(EngineError::SchedulingConflict(format!(
                "tenant {tenant_id} is disabled"
            )));
        }
        let accounts = self.pool.active_accounts(tenant_id)?;
        if accounts.is_empty() {
            return Err(EngineError::SchedulingConflict(format!(
                "tenant {tenant_id} has no active accounts"
            )));
        }

        let stop_at = parse_clock_time(stop_time)
            .ok_or_else(|| EngineError::InvalidStopTime(stop_time.to_string()))?;
        let now = Local::now().naive_local();
        let remaining = minutes_until(now, stop_at);
        if remaining <= 0 {
            return Err(EngineError::SchedulingConflict(format!(
                "stop time {stop_time} has already passed today"
            )));
        }

        let per_account_cap = compute_per_account_cap(tenant.daily_cap, accounts.len());
        self.store.set_per_account_cap(tenant_id, per_account_cap)?;
        self.pool.reset_used(tenant_id)?;

        // Natural flow paces itself through delayed reruns instead of a
        // fixed interval.
        let interval_minutes = match tenant.policy {
            Policy::NaturalFlow => None,
            _ => Some(compute_interval_minutes(remaining as u64, tenant.daily_cap)),
        };

        let stop_job_id = Uuid::new_v4().to_string();
        self.store
            .record_job(tenant_id, JobKind::ScheduledStop.as_str(), &stop_job_id)?;
        let engine = Arc::clone(self);
        let tid = tenant_id.to_string();
        self.scheduler
            .add_daily(
                stop_key,
                stop_job_id,
                stop_at,
                self.config.weekdays.clone(),
                move || {
                    let engine = Arc::clone(&engine);
                    let tid = tid.clone();
                    async move {
                        // Detached so that removing this job does not
                        // abort the cleanup itself.
                        tokio::spawn(async move { engine.finish_cycle(&tid).await });
                    }
                },
            )
            .map_err(|e| EngineError::SchedulingConflict(e.to_string()))?;

        if let Some(minutes) = interval_minutes {
            let job_id = Uuid::new_v4().to_string();
            self.store
                .record_job(tenant_id, JobKind::RecurringPromotion.as_str(), &job_id)?;
            let engine = Arc::clone(self);
            let tid = tenant_id.to_string();
            self.scheduler
                .add_interval(
                    running_key,
                    job_id,
                    Duration::from_secs(minutes * 60),
                    move || {
                        let engine = Arc::clone(&engine);
                        let tid = tid.clone();
                        async move { engine.scheduled_tick(&tid).await }
                    },
                )
                .map_err(|e| EngineError::SchedulingConflict(e.to_string()))?;
        }

        info!(
            "promotion cycle started for tenant {} until {} (cap {}/account, interval {:?} min)",
            tenant_id, stop_time, per_account_cap, interval_minutes
        );
        self.notifier
            .notify(
                tenant_id,
                &format!(
                    "Promotion cycle started, running until {stop_time} with {} accounts.",
                    accounts.len()
                ),
            )
            .await;

        // First attempt happens right away rather than one interval in.
        self.scheduled_tick(tenant_id).await;

        Ok(CycleInfo {
            per_account_cap,
            interval_minutes,
        })
    }

    /// Tear down the tenant's cycle jobs and zero its usage counters.
    /// Returns whether any job was actually running.
    pub async fn stop(&self, tenant_id: &str) -> Result<bool, EngineError> {
        let was_running = self.remove_cycle_jobs(tenant_id)?;
        self.pool.reset_used(tenant_id)?;
        if was_running {
            info!("promotion cycle stopped for tenant {}", tenant_id);
            self.notifier
                .notify(tenant_id, "Promotion cycle stopped.")
                .await;
        }
        Ok(was_running)
    }

    async fn finish_cycle(&self, tenant_id: &str) {
        match self.remove_cycle_jobs(tenant_id) {
            Ok(_) => {
                if let Err(e) = self.pool.reset_used(tenant_id) {
                    error!("failed to reset usage for tenant {}: {}", tenant_id, e);
                }
                info!("stop time reached for tenant {}", tenant_id);
                self.notifier
                    .notify(tenant_id, "Stop time reached, promotion cycle finished.")
                    .await;
            }
            Err(e) => error!("failed to finish cycle for tenant {}: {}", tenant_id, e),
        }
    }

    fn remove_cycle_jobs(&self, tenant_id: &str) -> Result<bool, EngineError> {
        let mut was_running = false;
        for kind in [
            JobKind::RecurringPromotion,
            JobKind::ScheduledStop,
            JobKind::DelayedRerun,
        ] {
            if self.scheduler.remove(&JobKey::new(tenant_id, kind)) {
                was_running = true;
            }
            self.store.clear_job(tenant_id, kind.as_str())?;
        }
        Ok(was_running)
    }

    /// Drop every piece of promotion state for the tenant: running
    /// jobs, the token ledger, and account usage counters.
    pub async fn reset(&self, tenant_id: &str) -> Result<(), EngineError> {
        self.store
            .get_tenant(tenant_id)?
            .ok_or_else(|| EngineError::TenantNotFound(tenant_id.to_string()))?;
        self.remove_cycle_jobs(tenant_id)?;
        self.scheduler
            .remove(&JobKey::new(tenant_id, JobKind::AutoStart));
        self.store
            .clear_job(tenant_id, JobKind::AutoStart.as_str())?;
        self.ledger.clear(tenant_id)?;
        self.pool.reset_used(tenant_id)?;
        info!("promotion state reset for tenant {}", tenant_id);
        self.notifier
            .notify(tenant_id, "All promotion state cleared.")
            .await;
        Ok(())
    }

    /// Install the daily auto-start timer for a tenant. Requires
    /// `[engine.auto_start]` to be configured.
    pub fn enable_auto_start(self: &Arc<Self>, tenant_id: &str) -> Result<(), EngineError> {
        let auto = self
            .config
            .auto_start
            .clone()
            .ok_or_else(|| {
                EngineError::SchedulingConflict("auto start is not configured".to_string())
            })?;
        self.store
            .get_tenant(tenant_id)?
            .ok_or_else(|| EngineError::TenantNotFound(tenant_id.to_string()))?;
        let at = parse_clock_time(&auto.time)
            .ok_or_else(|| EngineError::InvalidStopTime(auto.time.clone()))?;

        let key = JobKey::new(tenant_id, JobKind::AutoStart);
        let job_id = Uuid::new_v4().to_string();
        self.store
            .record_job(tenant_id, JobKind::AutoStart.as_str(), &job_id)?;
        let engine = Arc::clone(self);
        let tid = tenant_id.to_string();
        self.scheduler
            .add_daily(key, job_id, at, self.config.weekdays.clone(), move || {
                let engine = Arc::clone(&engine);
                let tid = tid.clone();
                let auto = auto.clone();
                async move { engine.auto_start_tick(&tid, &auto).await }
            })
            .map_err(|e| EngineError::SchedulingConflict(e.to_string()))?;
        info!("auto start enabled for tenant {}", tenant_id);
        Ok(())
    }

    pub fn disable_auto_start(&self, tenant_id: &str) -> Result<bool, EngineError> {
        let removed = self
            .scheduler
            .remove(&JobKey::new(tenant_id, JobKind::AutoStart));
        self.store
            .clear_job(tenant_id, JobKind::AutoStart.as_str())?;
        Ok(removed)
    }

    async fn auto_start_tick(self: &Arc<Self>, tenant_id: &str, auto: &AutoStartConfig) {
        let today = Local::now().date_naive();
        let start_date = match NaiveDate::parse_from_str(&auto.start_date, "%Y-%m-%d") {
            Ok(date) => date,
            Err(e) => {
                warn!("invalid auto start date {}: {}", auto.start_date, e);
                return;
            }
        };
        let window_end = start_date + chrono::Duration::days(i64::from(auto.repeat_days));
        if today < start_date || today >= window_end {
            debug!(
                "auto start window closed for tenant {} ({} + {} days)",
                tenant_id, auto.start_date, auto.repeat_days
            );
            return;
        }
        if let Some(weekdays) = &self.config.weekdays {
            if !weekdays.contains(&today.weekday().number_from_monday()) {
                debug!("auto start skipped for tenant {}: inactive weekday", tenant_id);
                return;
            }
        }
        match self.start(tenant_id, &auto.stop_time).await {
            Ok(_) => {}
            Err(EngineError::SchedulingConflict(reason)) => {
                debug!("auto start skipped for tenant {}: {}", tenant_id, reason);
            }
            Err(e) => error!("auto start failed for tenant {}: {}", tenant_id, e),
        }
    }

    /// Timer-driven tick wrapper: any error is reported and swallowed
    /// so one bad run never kills the recurring job.
    async fn scheduled_tick(self: &Arc<Self>, tenant_id: &str) {
        if let Err(e) = self.run_tick(tenant_id).await {
            error!("promotion tick failed for tenant {}: {}", tenant_id, e);
            self.notifier
                .notify(tenant_id, &format!("Promotion run failed: {e}"))
                .await;
        }
    }

    /// Run one promotion attempt for the tenant.
    pub async fn run_tick(self: &Arc<Self>, tenant_id: &str) -> Result<Outcome, EngineError> {
        let lock = self.tick_lock(tenant_id);
        let _guard = lock.lock().await;
        self.tick_inner(tenant_id).await
    }

    fn tick_lock(&self, tenant_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.tick_locks.lock().unwrap();
        Arc::clone(
            locks
                .entry(tenant_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    async fn tick_inner(self: &Arc<Self>, tenant_id: &str) -> Result<Outcome, EngineError> {
        let tenant = self
            .store
            .get_tenant(tenant_id)?
            .ok_or_else(|| EngineError::TenantNotFound(tenant_id.to_string()))?;
        if !tenant.active {
            debug!("skipping tick for disabled tenant {}", tenant_id);
            return Ok(Outcome::NoCandidate {
                message: "tenant is disabled".to_string(),
            });
        }
        let accounts = self.pool.active_accounts(tenant_id)?;
        if accounts.is_empty() {
            self.notifier
                .notify(tenant_id, "No active accounts to promote with.")
                .await;
            return Ok(Outcome::NoCandidate {
                message: "no active accounts".to_string(),
            });
        }

        self.extraction.refill_if_needed(tenant_id, &accounts).await?;

        let eligible = self.pool.eligible(tenant_id, tenant.per_account_cap)?;
        let selection = if eligible.is_empty() {
            Selection::Empty
        } else {
            self.selector.select(&tenant, &eligible)?
        };

        let outcome = match selection {
            Selection::Empty => {
                metrics::PROMOTION_ATTEMPTS
                    .with_label_values(&["no_candidate"])
                    .inc();
                debug!("no promotion candidate for tenant {}", tenant_id);
                self.notifier
                    .notify(tenant_id, "Nothing to promote right now.")
                    .await;
                Outcome::NoCandidate {
                    message: "no eligible candidate".to_string(),
                }
            }
            Selection::One(account, token) => {
                let outcome = self.pipeline.promote(tenant_id, &account, &token.value).await?;
                self.apply_outcome(&tenant, &account, &outcome).await?;
                outcome
            }
            // Sequential: walk candidates in account order until one
            // promotion goes through.
            Selection::Ordered(candidates) => {
                let mut last = Outcome::NoCandidate {
                    message: "no eligible candidate".to_string(),
                };
                for (account, token) in candidates {
                    let outcome =
                        self.pipeline.promote(tenant_id, &account, &token.value).await?;
                    self.apply_outcome(&tenant, &account, &outcome).await?;
                    let succeeded = outcome.is_success();
                    last = outcome;
                    if succeeded {
                        break;
                    }
                }
                last
            }
        };

        Ok(outcome)
    }

    async fn apply_outcome(
        self: &Arc<Self>,
        tenant: &Tenant,
        account: &Account,
        outcome: &Outcome,
    ) -> Result<(), EngineError> {
        match outcome {
            Outcome::Success { token, account_id } => {
                self.notifier
                    .notify(
                        &tenant.id,
                        &format!("Promoted listing {token} through account {account_id}."),
                    )
                    .await;
                if tenant.policy == Policy::RoundRobin {
                    self.store
                        .set_last_round_robin(&tenant.id, Some(&account.id))?;
                }
                if tenant.policy == Policy::NaturalFlow {
                    self.schedule_rerun(&tenant.id).await;
                }
                if let Some(fresh) = self.extraction.auto_reset_if_drained(&tenant.id).await? {
                    self.notifier
                        .notify(
                            &tenant.id,
                            &format!(
                                "All candidates processed; ledger reset with {fresh} fresh candidates."
                            ),
                        )
                        .await;
                }
            }
            Outcome::Failed { token, step, detail } => {
                self.notifier
                    .notify(
                        &tenant.id,
                        &format!("Promotion of {token} failed at {step}: {detail}"),
                    )
                    .await;
            }
            Outcome::NoCandidate { .. } => {}
        }
        Ok(())
    }

    /// Natural flow: queue the next attempt a few minutes out, at a
    /// jittered delay so the cadence looks organic upstream.
    // Boxed return type: this future is part of a cycle (rerun ->
    // scheduled_tick -> ... -> rerun), so the compiler cannot prove
    // `Send` for the unboxed recursive type.
    fn schedule_rerun<'a>(
        self: &'a Arc<Self>,
        tenant_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
        let minutes: u64 = rand::rng().random_range(3..=15);
        let key = JobKey::new(tenant_id, JobKind::DelayedRerun);
        self.scheduler.remove(&key);
        let job_id = Uuid::new_v4().to_string();
        if let Err(e) = self
            .store
            .record_job(tenant_id, JobKind::DelayedRerun.as_str(), &job_id)
        {
            warn!("failed to record rerun job for tenant {}: {}", tenant_id, e);
            return;
        }
        let engine = Arc::clone(self);
        let tid = tenant_id.to_string();
        let result = self.scheduler.add_once(
            key,
            job_id,
            Duration::from_secs(minutes * 60),
            // Boxed: the rerun re-enters the tick path that creates
            // reruns, so the unboxed future type would be recursive.
            move || -> Pin<Box<dyn Future<Output = ()> + Send>> {
                Box::pin(async move {
                    if let Err(e) = engine
                        .store
                        .clear_job(&tid, JobKind::DelayedRerun.as_str())
                    {
                        warn!("failed to clear rerun job for tenant {}: {}", tid, e);
                    }
                    engine.scheduled_tick(&tid).await;
                })
            },
        );
        match result {
            Ok(()) => {
                info!(
                    "next natural flow attempt for tenant {} in {} minutes",
                    tenant_id, minutes
                );
                self.notifier
                    .notify(
                        tenant_id,
                        &format!("Next promotion attempt in {minutes} minutes."),
                    )
                    .await;
            }
            Err(e) => warn!("failed to schedule rerun for tenant {}: {}", tenant_id, e),
        }
        })
    }

    /// Clear job records left behind by a previous process. Timers live
    /// in memory, so any record present at boot is an orphan.
    pub fn recover_stale_jobs(&self) -> Result<usize, EngineError> {
        let jobs = self.store.list_jobs()?;
        for (tenant_id, kind, job_id) in &jobs {
            warn!(
                "clearing stale {} job {} for tenant {}",
                kind, job_id, tenant_id
            );
            self.store.clear_job(tenant_id, kind)?;
        }
        Ok(jobs.len())
    }

    pub fn is_running(&self, tenant_id: &str) -> bool {
        self.scheduler
            .running_tenants()
            .iter()
            .any(|t| t == tenant_id)
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            running_tenants: self.scheduler.running_tenants(),
            job_count: self.scheduler.job_count(),
        }
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

// Halfway values round to the even neighbor in both helpers, so a cap
// split of 2.5 lands on 2 rather than 3.
pub(crate) fn compute_per_account_cap(daily_cap: u32, accounts: usize) -> u32 {
    if accounts == 0 {
        return 0;
    }
    (f64::from(daily_cap) / accounts as f64).round_ties_even() as u32
}

pub(crate) fn compute_interval_minutes(remaining_minutes: u64, daily_cap: u32) -> u64 {
    let cap = u64::from(daily_cap.max(1));
    ((remaining_minutes as f64 / cap as f64).round_ties_even() as u64).max(1)
}

fn minutes_until(now: NaiveDateTime, stop: NaiveTime) -> i64 {
    (stop - now.time()).num_minutes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_per_account_cap_rounds() {
        assert_eq!(compute_per_account_cap(10, 2), 5);
        assert_eq!(compute_per_account_cap(10, 3), 3);
        assert_eq!(compute_per_account_cap(11, 3), 4);
        assert_eq!(compute_per_account_cap(10, 0), 0);
        // Ties go to even: 2.5 -> 2, 1.5 -> 2.
        assert_eq!(compute_per_account_cap(5, 2), 2);
        assert_eq!(compute_per_account_cap(3, 2), 2);
    }

    #[test]
    fn test_interval_from_remaining_time() {
        // 4 hours left, 10 promotions to spread out.
        assert_eq!(compute_interval_minutes(240, 10), 24);
        // Ties go to even: 22.5 -> 22, 24.5 -> 24.
        assert_eq!(compute_interval_minutes(90, 4), 22);
        assert_eq!(compute_interval_minutes(245, 10), 24);
        // Never below one minute.
        assert_eq!(compute_interval_minutes(5, 100), 1);
        assert_eq!(compute_interval_minutes(240, 0), 240);
    }

    #[test]
    fn test_minutes_until_stop() {
        let now = NaiveDate::from_ymd_opt(2026, 8, 24)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let stop = NaiveTime::from_hms_opt(14, 0, 0).unwrap();
        assert_eq!(minutes_until(now, stop), 240);
        let passed = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
        assert_eq!(minutes_until(now, passed), -30);
    }
}
