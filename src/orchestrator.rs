//! Tick orchestrator (C9): wires data-sync → classifier → notification
//! manager → task store → run tracker into the fixed six-step sequence
//! (§4.9), guaranteeing at most one tick executes at a time.
//!
//! A background loop alone would make overlap structurally impossible (one
//! spawned task, one iteration at a time), but a tick can also be requested
//! via the manual HTTP trigger concurrently with the scheduled loop, so a
//! `tokio::sync::Mutex<()>` with `try_lock` makes "at most one tick" an
//! invariant rather than an accident of scheduling.

use std::time::{Duration, Instant};

use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::business_time::BusinessHoursConfig;
use crate::classifier::{self, SlaThresholds};
use crate::db::models::opportunity::{Opportunity, RawOpportunity};
use crate::db::models::run::{RunStatus, RunSummary};
use crate::db::models::system_config::SystemConfigSnapshot;
use crate::db::repository::SystemConfigRepository;
use crate::error::AppResult;
use crate::notifications::advisor::DecisionAdvisor;
use crate::notifications::manager::NotificationManager;
use crate::notifications::webhook_sender::WebhookSender;
use crate::routing::GroupRoutingRegistry;
use crate::run_tracker::{self, RunStepScope};
use crate::sync::data_sync::DataSyncStrategy;
use crate::sync::opportunity_fetcher::OpportunityFetcher;

pub struct TickOrchestrator {
    pool: SqlitePool,
    fetcher: Box<dyn OpportunityFetcher>,
    sender: Box<dyn WebhookSender>,
    advisor: Box<dyn DecisionAdvisor>,
    escalation_webhook_url: String,
    tick_timeout: Duration,
    tick_guard: Mutex<()>,
}

impl TickOrchestrator {
    pub fn new(
        pool: SqlitePool,
        fetcher: Box<dyn OpportunityFetcher>,
        sender: Box<dyn WebhookSender>,
        advisor: Box<dyn DecisionAdvisor>,
        escalation_webhook_url: String,
        tick_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            fetcher,
            sender,
            advisor,
            escalation_webhook_url,
            tick_timeout,
            tick_guard: Mutex::new(()),
        }
    }

    /// Entry point for both the scheduler loop and the manual-trigger HTTP
    /// handler. Returns `None` immediately — never waits — if a tick is
    /// already running, per §4.9/§4.10: a trigger that finds the guard held
    /// is dropped, not queued.
    pub async fn try_run_tick(&self) -> Option<RunSummary> {
        match self.tick_guard.try_lock() {
            Ok(_permit) => Some(self.run_tick().await),
            Err(_) => None,
        }
    }

    /// Operator convenience (§4.3 `validateConsistency`), exposed outside the
    /// tick cycle: does not take the tick guard, since it never touches task
    /// or run state and is safe to call concurrently with a running tick.
    pub async fn check_consistency(&self) -> AppResult<crate::sync::ConsistencyReport> {
        let now = Utc::now().naive_utc();
        let config = SystemConfigRepository::load_snapshot(&self.pool)
            .await
            .unwrap_or_default();
        let business_hours = BusinessHoursConfig::from(&config);
        let thresholds = SlaThresholds::from(&config);
        let data_sync = DataSyncStrategy::new(&self.pool, self.fetcher.as_ref());
        data_sync
            .validate_consistency(now, &thresholds, &business_hours)
            .await
    }

    async fn run_tick(&self) -> RunSummary {
        let tick_started = Instant::now();
        let now = Utc::now().naive_utc();

        let run = match run_tracker::start_run(&self.pool, "{}").await {
            Ok(run) => run,
            Err(e) => {
                tracing::error!(error = %e, "failed to open run record, aborting tick");
                return RunSummary {
                    run_id: String::new(),
                    status: RunStatus::Failed,
                    opportunities_processed: 0,
                    notifications_sent: 0,
                    errors: vec![format!("failed to start run: {e}")],
                };
            }
        };
        let run_id = run.id.clone();
        let mut errors: Vec<String> = Vec::new();

        let config = match SystemConfigRepository::load_snapshot(&self.pool).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load system_config snapshot, using coded defaults");
                errors.push(format!("config: {e}"));
                SystemConfigSnapshot::default()
            }
        };

        let business_hours = BusinessHoursConfig::from(&config);
        let thresholds = SlaThresholds::from(&config);
        let routing = GroupRoutingRegistry::new(&self.pool, &self.escalation_webhook_url);
        let data_sync = DataSyncStrategy::new(&self.pool, self.fetcher.as_ref());
        let manager = NotificationManager::new(
            &self.pool,
            &routing,
            self.sender.as_ref(),
            self.advisor.as_ref(),
            &config,
        );

        // Step 1: fetchData
        let mut opportunities: Vec<Opportunity> = {
            let mut scope = RunStepScope::enter(self.pool.clone(), &run_id, "fetchData", None);
            match data_sync
                .get_opportunities(now, &thresholds, &business_hours)
                .await
            {
                Ok((opps, fetch_error)) => {
                    scope.set_output(format!("{{\"count\":{}}}", opps.len()));
                    if let Some(err) = &fetch_error {
                        scope.set_error(err.clone());
                        errors.push(format!("fetch: {err}"));
                    } else if let Err(e) = data_sync.refresh_cache(&opps).await {
                        // Only a successful live fetch triggers a cache refresh;
                        // a fallback read must never overwrite the cache it just read from.
                        tracing::warn!(error = %e, "cache refresh failed after successful fetch");
                        errors.push(format!("store: {e}"));
                    }
                    opps
                }
                Err(e) => {
                    scope.set_error(e.to_string());
                    errors.push(format!("fetch: {e}"));
                    Vec::new()
                }
            }
        };

        // Step 2: analyzeStatus — refresh every opportunity's SLA fields
        // against the current tick's `now`, regardless of whether step 1
        // served live or cached data (a cached row's `createTime` is still
        // the source of truth for elapsed business time).
        {
            let mut scope = RunStepScope::enter(self.pool.clone(), &run_id, "analyzeStatus", None);
            opportunities = opportunities
                .iter()
                .map(|o| {
                    let raw = RawOpportunity {
                        order_num: o.order_num.clone(),
                        customer_name: o.customer_name.clone(),
                        address: o.address.clone(),
                        supervisor_name: o.supervisor_name.clone(),
                        org_name: o.org_name.clone(),
                        create_time: o.create_time,
                        order_status: o.order_status,
                    };
                    classifier::classify(&raw, now, &thresholds, &business_hours)
                })
                .collect();

            let reminder_due = opportunities.iter().filter(|o| o.reminder_due_hit).count();
            let escalation_due = opportunities.iter().filter(|o| o.escalation_due_hit).count();
            scope.set_output(format!(
                "{{\"total\":{},\"reminderDue\":{},\"escalationDue\":{}}}",
                opportunities.len(),
                reminder_due,
                escalation_due
            ));
        }

        let mut notifications_sent: i64 = 0;

        // Step 3: decideToContinue — an empty working set skips straight to
        // step 6 rather than planning/executing against nothing.
        if opportunities.is_empty() {
            let _scope = RunStepScope::enter(
                self.pool.clone(),
                &run_id,
                "decideToContinue",
                Some("0 opportunities, skipping to recordResults".to_string()),
            );
        } else {
            {
                let _scope = RunStepScope::enter(
                    self.pool.clone(),
                    &run_id,
                    "decideToContinue",
                    Some(format!("{} opportunities, continuing", opportunities.len())),
                );
            }

            // Step 4: planNotifications
            {
                let mut scope =
                    RunStepScope::enter(self.pool.clone(), &run_id, "planNotifications", None);
                match manager.create_tasks(&opportunities, &run_id, now).await {
                    Ok(plan) => {
                        scope.set_output(format!(
                            "{{\"tasksCreated\":{}}}",
                            plan.tasks_created.len()
                        ));
                    }
                    Err(e) => {
                        // §7 PlanError: abort the plan phase, execute phase still
                        // runs against whatever pending tasks already exist.
                        scope.set_error(e.to_string());
                        errors.push(format!("plan: {e}"));
                    }
                }
            }

            // Step 5: sendNotifications
            {
                let mut scope =
                    RunStepScope::enter(self.pool.clone(), &run_id, "sendNotifications", None);
                match manager
                    .execute_pending(&data_sync, &opportunities, &run_id, now, &business_hours)
                    .await
                {
                    Ok(summary) => {
                        notifications_sent = summary.sent as i64;
                        scope.set_output(format!(
                            "{{\"sent\":{},\"failed\":{},\"skippedCooldown\":{}}}",
                            summary.sent, summary.failed, summary.skipped_cooldown
                        ));
                    }
                    Err(e) => {
                        scope.set_error(e.to_string());
                        errors.push(format!("send: {e}"));
                    }
                }
            }
        }

        // Step 6: recordResults. Typed, swallowed errors (FetchError,
        // PlanError, SendError, StoreError, ConfigError) are recorded but do
        // not themselves flip the run to `Failed` — §7 only promises that
        // for a tick that actually exceeds `tickTimeout`.
        let elapsed = tick_started.elapsed();
        let status = if elapsed >= self.tick_timeout {
            errors.push(format!(
                "tick exceeded tickTimeout of {}s (took {:.1}s)",
                self.tick_timeout.as_secs(),
                elapsed.as_secs_f64()
            ));
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };

        let opportunities_processed = opportunities.len() as i64;
        if let Err(e) = run_tracker::finish_run(
            &self.pool,
            &run_id,
            status,
            opportunities_processed,
            notifications_sent,
            &errors,
        )
        .await
        {
            tracing::error!(error = %e, run_id = %run_id, "failed to close run record");
        }

        tracing::info!(
            run_id = %run_id,
            status = ?status,
            opportunities_processed,
            notifications_sent,
            error_count = errors.len(),
            "tick complete"
        );

        RunSummary {
            run_id,
            status,
            opportunities_processed,
            notifications_sent,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    use crate::db::models::opportunity::OrderStatus;
    use crate::db::models::{NewNotificationTask, TaskStatus, TaskType};
    use crate::db::repository::NotificationTaskRepository;
    use crate::notifications::advisor::NoOpAdvisor;

    struct FakeFetcher {
        opportunities: StdMutex<Vec<RawOpportunity>>,
    }

    #[async_trait]
    impl OpportunityFetcher for FakeFetcher {
        async fn fetch(&self) -> Result<Vec<RawOpportunity>, crate::error::AppError> {
            Ok(self.opportunities.lock().unwrap().clone())
        }
    }

    struct FakeSender {
        succeed: bool,
        calls: Arc<StdMutex<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl WebhookSender for FakeSender {
        async fn send(&self, webhook_url: &str, text_body: &str) -> bool {
            self.calls
                .lock()
                .unwrap()
                .push((webhook_url.to_string(), text_body.to_string()));
            self.succeed
        }
    }

    async fn test_pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        // A 24/7 business-hours window makes `business_hours_between` degrade
        // to a plain wall-clock delta, so these scenarios don't depend on the
        // weekday/hour the test happens to run at.
        SystemConfigRepository::set(&pool, "work_start_hour", "0", None).await.unwrap();
        SystemConfigRepository::set(&pool, "work_end_hour", "24", None).await.unwrap();
        SystemConfigRepository::set(&pool, "work_days", "1,2,3,4,5,6,7", None).await.unwrap();
        SystemConfigRepository::set(&pool, "notification_cooldown", "120", None).await.unwrap();
        SystemConfigRepository::set(&pool, "sla_pending_reminder", "4", None).await.unwrap();
        SystemConfigRepository::set(&pool, "sla_pending_escalation", "8", None).await.unwrap();
        pool
    }

    fn raw_opportunity(order_num: &str, org: &str, elapsed_hours: i64) -> RawOpportunity {
        RawOpportunity {
            order_num: order_num.to_string(),
            customer_name: "Acme Facilities".to_string(),
            address: "1 Main St".to_string(),
            supervisor_name: "J. Doe".to_string(),
            org_name: org.to_string(),
            create_time: Utc::now().naive_utc() - ChronoDuration::hours(elapsed_hours),
            order_status: OrderStatus::PendingAppointment,
        }
    }

    fn new_orchestrator(
        pool: SqlitePool,
        opportunities: Vec<RawOpportunity>,
        sender_succeeds: bool,
    ) -> (TickOrchestrator, Arc<StdMutex<Vec<(String, String)>>>) {
        let calls = Arc::new(StdMutex::new(Vec::new()));
        let fetcher: Box<dyn OpportunityFetcher> = Box::new(FakeFetcher {
            opportunities: StdMutex::new(opportunities),
        });
        let sender: Box<dyn WebhookSender> = Box::new(FakeSender {
            succeed: sender_succeeds,
            calls: calls.clone(),
        });
        let advisor: Box<dyn DecisionAdvisor> = Box::new(NoOpAdvisor);
        let orchestrator = TickOrchestrator::new(
            pool,
            fetcher,
            sender,
            advisor,
            "https://escalation.example/webhook".to_string(),
            Duration::from_secs(300),
        );
        (orchestrator, calls)
    }

    #[tokio::test]
    async fn scenario_1_single_reminder_single_org() {
        let pool = test_pool().await;
        let (orchestrator, calls) =
            new_orchestrator(pool.clone(), vec![raw_opportunity("O1", "north", 5)], true);

        let summary = orchestrator.try_run_tick().await.expect("tick should run");
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.opportunities_processed, 1);
        assert_eq!(summary.notifications_sent, 1);
        assert_eq!(calls.lock().unwrap().len(), 1);

        let task = NotificationTaskRepository::find_latest_for_key(&pool, "O1", TaskType::Reminder)
            .await
            .unwrap()
            .expect("reminder task should exist");
        assert_eq!(task.status(), TaskStatus::Sent);
        assert_eq!(task.logical_order_id, "O1");
    }

    #[tokio::test]
    async fn scenario_2_escalation_aggregation() {
        let pool = test_pool().await;
        SystemConfigRepository::set(&pool, "notification_reminder_enabled", "false", None)
            .await
            .unwrap();

        let opportunities: Vec<RawOpportunity> =
            (0..6).map(|i| raw_opportunity(&format!("O{i}"), "south", 10)).collect();
        let (orchestrator, calls) = new_orchestrator(pool.clone(), opportunities, true);

        let summary = orchestrator.try_run_tick().await.expect("tick should run");
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.notifications_sent, 1);

        let recorded = calls.lock().unwrap();
        assert_eq!(recorded.len(), 1, "exactly one escalation message should be dispatched");
        let (webhook, body) = &recorded[0];
        assert_eq!(webhook, "https://escalation.example/webhook");
        assert!(body.contains("(6 overdue opportunities)"));
        assert!(body.contains("1 more"));

        let task =
            NotificationTaskRepository::find_latest_for_key(&pool, "ESCALATION_south", TaskType::Escalation)
                .await
                .unwrap()
                .expect("escalation task should exist");
        assert_eq!(task.status(), TaskStatus::Sent);
    }

    #[tokio::test]
    async fn scenario_3_legacy_per_order_escalation_cleanup() {
        let pool = test_pool().await;
        SystemConfigRepository::set(&pool, "notification_reminder_enabled", "false", None)
            .await
            .unwrap();

        let now = Utc::now().naive_utc();
        for i in 0..6 {
            NotificationTaskRepository::save(
                &pool,
                NewNotificationTask {
                    logical_order_id: format!("O{i}"),
                    org_name: "south".to_string(),
                    task_type: TaskType::Escalation,
                    due_time: now,
                    created_run_id: "seed".to_string(),
                    max_retry_count: 5,
                    cooldown_hours: 2.0,
                },
            )
            .await
            .unwrap();
        }

        let opportunities: Vec<RawOpportunity> =
            (0..6).map(|i| raw_opportunity(&format!("O{i}"), "south", 10)).collect();
        let (orchestrator, calls) = new_orchestrator(pool.clone(), opportunities, true);

        let summary = orchestrator.try_run_tick().await.expect("tick should run");
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(
            calls.lock().unwrap().len(),
            1,
            "exactly one escalation message despite six legacy rows"
        );

        for i in 0..6 {
            let legacy =
                NotificationTaskRepository::find_latest_for_key(&pool, &format!("O{i}"), TaskType::Escalation)
                    .await
                    .unwrap()
                    .expect("legacy row should still exist");
            assert_eq!(legacy.status(), TaskStatus::Sent, "legacy row retired without dispatch");
            assert!(legacy.sent_at.is_none(), "retirement must not stamp sent_at");
        }

        let canonical =
            NotificationTaskRepository::find_latest_for_key(&pool, "ESCALATION_south", TaskType::Escalation)
                .await
                .unwrap()
                .expect("canonical per-org row should exist");
        assert_eq!(canonical.status(), TaskStatus::Sent);
    }

    #[tokio::test]
    async fn scenario_4_cooldown_suppression() {
        let pool = test_pool().await;
        let opportunity = raw_opportunity("O1", "north", 5);

        let (first, first_calls) = new_orchestrator(pool.clone(), vec![opportunity.clone()], true);
        let first_summary = first.try_run_tick().await.expect("tick should run");
        assert_eq!(first_summary.notifications_sent, 1);
        assert_eq!(first_calls.lock().unwrap().len(), 1);

        let (second, second_calls) = new_orchestrator(pool.clone(), vec![opportunity], true);
        let second_summary = second.try_run_tick().await.expect("tick should run");
        assert_eq!(second_summary.notifications_sent, 0);
        assert_eq!(
            second_calls.lock().unwrap().len(),
            0,
            "cooldown must suppress the rerun entirely"
        );
    }

    #[tokio::test]
    async fn scenario_5_retry_cap() {
        let pool = test_pool().await;
        let now = Utc::now().naive_utc();

        let seeded = NotificationTaskRepository::save(
            &pool,
            NewNotificationTask {
                logical_order_id: "O1".to_string(),
                org_name: "north".to_string(),
                task_type: TaskType::Reminder,
                due_time: now,
                created_run_id: "seed".to_string(),
                max_retry_count: 5,
                cooldown_hours: 2.0,
            },
        )
        .await
        .unwrap();
        sqlx::query("UPDATE notification_tasks SET retry_count = 4 WHERE id = ?")
            .bind(&seeded.id)
            .execute(&pool)
            .await
            .unwrap();

        let opportunity = raw_opportunity("O1", "north", 5);
        let (orchestrator, calls) = new_orchestrator(pool.clone(), vec![opportunity], false);

        let summary = orchestrator.try_run_tick().await.expect("tick should run");
        assert_eq!(summary.notifications_sent, 0);
        assert_eq!(calls.lock().unwrap().len(), 1, "the fifth attempt is still made");

        let task = NotificationTaskRepository::find_latest_for_key(&pool, "O1", TaskType::Reminder)
            .await
            .unwrap()
            .expect("task should exist");
        assert_eq!(task.status(), TaskStatus::Failed);
        assert_eq!(task.retry_count, 5);
        assert_eq!(task.retry_count, task.max_retry_count);
    }

    #[tokio::test]
    async fn scenario_6_unmonitored_status_never_creates_tasks() {
        let pool = test_pool().await;
        let mut opportunity = raw_opportunity("O1", "north", 20);
        opportunity.order_status = OrderStatus::Other;
        let (orchestrator, calls) = new_orchestrator(pool.clone(), vec![opportunity], true);

        let summary = orchestrator.try_run_tick().await.expect("tick should run");
        assert_eq!(summary.opportunities_processed, 1);
        assert_eq!(summary.notifications_sent, 0);
        assert!(calls.lock().unwrap().is_empty());

        let task = NotificationTaskRepository::find_latest_for_key(&pool, "O1", TaskType::Reminder)
            .await
            .unwrap();
        assert!(task.is_none(), "an unmonitored opportunity must never produce a task");
    }

    #[tokio::test]
    async fn try_run_tick_is_single_flight() {
        let pool = test_pool().await;
        let (orchestrator, _calls) =
            new_orchestrator(pool, vec![raw_opportunity("O1", "north", 5)], true);

        let guard = orchestrator.tick_guard.try_lock().unwrap();
        let result = orchestrator.try_run_tick().await;
        assert!(result.is_none(), "a tick already in flight must not run a second one");
        drop(guard);
    }
}
