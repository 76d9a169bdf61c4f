//! Notification manager (C7): the core state machine. Runs twice per tick —
//! `create_tasks` (plan) then `execute_pending` (execute) — dispatching one
//! message per org per task type and applying the plan/execute-with-cooldown
//! lifecycle to each task.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::business_time::BusinessHoursConfig;
use crate::db::models::opportunity::Opportunity;
use crate::db::models::system_config::SystemConfigSnapshot;
use crate::db::models::{NewNotificationTask, NotificationTaskRow, TaskType};
use crate::db::repository::NotificationTaskRepository;
use crate::error::AppResult;
use crate::formatter;
use crate::notifications::advisor::DecisionAdvisor;
use crate::notifications::webhook_sender::WebhookSender;
use crate::routing::GroupRoutingRegistry;
use crate::sync::data_sync::DataSyncStrategy;

pub struct PlanSummary {
    pub tasks_created: Vec<NotificationTaskRow>,
}

#[derive(Debug, Default)]
pub struct ExecuteSummary {
    pub total_considered: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped_cooldown: usize,
}

pub struct NotificationManager<'a> {
    pool: &'a SqlitePool,
    routing: &'a GroupRoutingRegistry<'a>,
    sender: &'a dyn WebhookSender,
    advisor: &'a dyn DecisionAdvisor,
    config: &'a SystemConfigSnapshot,
}

impl<'a> NotificationManager<'a> {
    pub fn new(
        pool: &'a SqlitePool,
        routing: &'a GroupRoutingRegistry<'a>,
        sender: &'a dyn WebhookSender,
        advisor: &'a dyn DecisionAdvisor,
        config: &'a SystemConfigSnapshot,
    ) -> Self {
        Self {
            pool,
            routing,
            sender,
            advisor,
            config,
        }
    }

    /// Plan phase (§4.7.1): create new `Pending` tasks for opportunities that
    /// just crossed a threshold, then clean up legacy per-order escalation
    /// rows and create the single per-org escalation task if due. Never sends.
    pub async fn create_tasks(
        &self,
        opportunities: &[Opportunity],
        run_id: &str,
        now: NaiveDateTime,
    ) -> AppResult<PlanSummary> {
        let mut created = Vec::new();
        let mut created_keys: HashSet<(String, TaskType)> = HashSet::new();
        let mut escalation_orgs: HashSet<String> = HashSet::new();

        if self.config.notification_reminder_enabled {
            for o in opportunities {
                if !o.reminder_due_hit {
                    continue;
                }
                let key = (o.order_num.clone(), TaskType::Reminder);
                if created_keys.contains(&key) {
                    continue;
                }
                if self.should_create(&o.order_num, TaskType::Reminder, now).await? {
                    let task = NotificationTaskRepository::save(
                        self.pool,
                        NewNotificationTask {
                            logical_order_id: o.order_num.clone(),
                            org_name: o.org_name.clone(),
                            task_type: TaskType::Reminder,
                            due_time: now,
                            created_run_id: run_id.to_string(),
                            max_retry_count: self.config.agent_max_retries,
                            cooldown_hours: self.config.notification_cooldown_minutes as f64 / 60.0,
                        },
                    )
                    .await?;
                    created.push(task);
                }
                created_keys.insert(key);
            }
        }

        for o in opportunities.iter().filter(|o| o.escalation_level > 0) {
            escalation_orgs.insert(o.org_name.clone());
        }

        if self.config.notification_escalation_enabled {
            for org in &escalation_orgs {
                let escalation_logical_id = format!("ESCALATION_{org}");

                let stale = NotificationTaskRepository::find_open_escalation_tasks_for_org_excluding(
                    self.pool,
                    org,
                    &escalation_logical_id,
                )
                .await?;
                for task in stale {
                    warn!(task_id = %task.id, org_name = %org, "retiring stale per-order escalation task");
                    NotificationTaskRepository::retire_without_dispatch(self.pool, &task.id).await?;
                }

                if self
                    .should_create(&escalation_logical_id, TaskType::Escalation, now)
                    .await?
                {
                    let task = NotificationTaskRepository::save(
                        self.pool,
                        NewNotificationTask {
                            logical_order_id: escalation_logical_id,
                            org_name: org.clone(),
                            task_type: TaskType::Escalation,
                            due_time: now,
                            created_run_id: run_id.to_string(),
                            max_retry_count: self.config.agent_max_retries,
                            cooldown_hours: self.config.notification_cooldown_minutes as f64 / 60.0,
                        },
                    )
                    .await?;
                    created.push(task);
                }
            }
        }

        Ok(PlanSummary { tasks_created: created })
    }

    /// `(logicalOrderId, type)` has no pending task for this key **and** no
    /// task for this key with `lastSentAt` inside cooldown — the cooldown
    /// check uses the store's most recent row regardless of status (§4.7.3).
    async fn should_create(
        &self,
        logical_order_id: &str,
        task_type: TaskType,
        now: NaiveDateTime,
    ) -> AppResult<bool> {
        if NotificationTaskRepository::has_pending(self.pool, logical_order_id, task_type).await? {
            return Ok(false);
        }
        match NotificationTaskRepository::find_latest_for_key(self.pool, logical_order_id, task_type)
            .await?
        {
            Some(latest) if latest.in_cooldown(now) => Ok(false),
            _ => Ok(true),
        }
    }

    /// Execute phase (§4.7.2): send every due task, grouped by org, reminders
    /// then escalations, pacing calls with `webhookApiInterval`.
    pub async fn execute_pending(
        &self,
        data_sync: &DataSyncStrategy<'_>,
        working_set: &[Opportunity],
        run_id: &str,
        now: NaiveDateTime,
        business_hours: &BusinessHoursConfig,
    ) -> AppResult<ExecuteSummary> {
        let pending = NotificationTaskRepository::find_pending(self.pool).await?;
        let skipped_cooldown = pending.iter().filter(|t| t.in_cooldown(now)).count();
        let due: Vec<NotificationTaskRow> = pending
            .into_iter()
            .filter(|t| t.should_send_now(now))
            .collect();

        let mut summary = ExecuteSummary {
            total_considered: due.len(),
            skipped_cooldown,
            ..Default::default()
        };

        let mut by_org: HashMap<String, Vec<NotificationTaskRow>> = HashMap::new();
        for task in due {
            by_org.entry(task.org_name.clone()).or_default().push(task);
        }

        let work_hours_per_day = business_hours.work_hours_per_day();
        // Owned backing store for a refreshed working set (§4.7.2: "fetch via
        // C3 with forceRefresh=true if any reference is missing"). Declared
        // here, outside the loop, so `working_set_by_order`'s borrow can
        // safely outlive a single iteration's reminder block whether it
        // points at `working_set` or at a refresh triggered partway through.
        let mut refreshed_store: Vec<Opportunity> = Vec::new();
        let mut working_set_by_order: HashMap<&str, &Opportunity> =
            working_set.iter().map(|o| (o.order_num.as_str(), o)).collect();

        let mut first_call = true;

        for (org, tasks) in by_org {
            let reminder_tasks: Vec<_> = tasks
                .iter()
                .filter(|t| t.task_type() == TaskType::Reminder)
                .collect();
            let escalation_tasks: Vec<_> = tasks
                .iter()
                .filter(|t| t.task_type() == TaskType::Escalation)
                .collect();

            if !reminder_tasks.is_empty() {
                if !first_call {
                    tokio::time::sleep(std::time::Duration::from_secs(
                        self.config.webhook_api_interval_seconds,
                    ))
                    .await;
                }
                first_call = false;

                let missing = reminder_tasks
                    .iter()
                    .any(|t| !working_set_by_order.contains_key(t.logical_order_id.as_str()));

                if missing {
                    let thresholds = crate::classifier::SlaThresholds::from(self.config);
                    let (refreshed, _fetch_error) = data_sync
                        .get_opportunities(now, &thresholds, business_hours)
                        .await?;
                    refreshed_store = refreshed;
                    working_set_by_order =
                        refreshed_store.iter().map(|o| (o.order_num.as_str(), o)).collect();
                }

                let opportunities: Vec<Opportunity> = reminder_tasks
                    .iter()
                    .filter_map(|t| working_set_by_order.get(t.logical_order_id.as_str()))
                    .map(|o| (*o).clone())
                    .collect();

                let message = formatter::render_reminder_message(
                    &org,
                    &opportunities,
                    self.config.reminder_max_display_orders,
                    work_hours_per_day,
                );
                let final_message = self
                    .advisor
                    .maybe_rewrite(&org, &opportunities, &message)
                    .await
                    .unwrap_or(message);

                let webhook_url = self.routing.reminder_webhook_for_org(&org).await?;
                let ok = self.sender.send(&webhook_url, &final_message).await;

                for task in &reminder_tasks {
                    self.apply_send_result(task, ok, run_id, &final_message, &mut summary).await?;
                }
            }

            if !escalation_tasks.is_empty() {
                if !first_call {
                    tokio::time::sleep(std::time::Duration::from_secs(
                        self.config.webhook_api_interval_seconds,
                    ))
                    .await;
                }
                first_call = false;

                let mut escalating: Vec<Opportunity> = working_set_by_order
                    .values()
                    .filter(|o| o.org_name == org && o.escalation_level > 0)
                    .map(|o| (*o).clone())
                    .collect();
                escalating.sort_by(|a, b| a.order_num.cmp(&b.order_num));
                let total = escalating.len();

                let message = formatter::render_escalation_message(
                    &org,
                    &escalating,
                    total,
                    self.config.escalation_max_display_orders,
                    work_hours_per_day,
                );
                let final_message = self
                    .advisor
                    .maybe_rewrite(&org, &escalating, &message)
                    .await
                    .unwrap_or(message);

                let webhook_url = self.routing.escalation_webhook().to_string();
                let ok = self.sender.send(&webhook_url, &final_message).await;

                for task in &escalation_tasks {
                    self.apply_send_result(task, ok, run_id, &final_message, &mut summary).await?;
                }
            }
        }

        info!(
            considered = summary.total_considered,
            sent = summary.sent,
            failed = summary.failed,
            "execute phase complete"
        );

        Ok(summary)
    }

    async fn apply_send_result(
        &self,
        task: &NotificationTaskRow,
        ok: bool,
        run_id: &str,
        message: &str,
        summary: &mut ExecuteSummary,
    ) -> AppResult<()> {
        NotificationTaskRepository::update_message(self.pool, &task.id, message).await?;

        if ok {
            NotificationTaskRepository::mark_sent(self.pool, &task.id, run_id).await?;
            summary.sent += 1;
        } else {
            NotificationTaskRepository::mark_failed(self.pool, &task.id).await?;
            summary.failed += 1;
        }
        Ok(())
    }
}
