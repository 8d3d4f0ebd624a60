// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cron scheduler (§4.5): on each tick, fan out every schedule whose
//! `next_run_at` has passed into a new run, then advance its cursor. A
//! schedule that missed several firings while the daemon was down fires
//! exactly once on the next tick and recomputes `next_run_at` from "now",
//! not from the missed occurrences — catch-up never bursts (§8 invariant,
//! per the scenario S6).

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use wf_core::event::Event;
use wf_core::id::RunId;
use wf_core::model::TriggeredBy;
use wf_storage::repo::ScheduleRepository;
use wf_storage::state::MaterializedState;
use wf_storage::wal::Wal;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid cron expression {expr:?}: {source}")]
    BadCron {
        expr: String,
        #[source]
        source: cron::error::Error,
    },
    #[error("unknown timezone {0:?}")]
    BadTimezone(String),
    #[error("cron expression {0:?} produces no future occurrence")]
    NoUpcomingOccurrence(String),
}

/// Computes the next fire time strictly after `after`, in the schedule's
/// own timezone, projected back to UTC for storage.
pub fn next_run_at(cron_expression: &str, timezone: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, SchedulerError> {
    let schedule = cron::Schedule::from_str(cron_expression).map_err(|source| SchedulerError::BadCron {
        expr: cron_expression.to_string(),
        source,
    })?;
    let tz: chrono_tz::Tz = timezone
        .parse()
        .map_err(|_| SchedulerError::BadTimezone(timezone.to_string()))?;
    let after_in_tz = after.with_timezone(&tz);
    schedule
        .after(&after_in_tz)
        .next()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| SchedulerError::NoUpcomingOccurrence(cron_expression.to_string()))
}

/// One fan-out pass: every due schedule becomes a `RunCreated` +
/// `ScheduleAdvanced` pair, appended to the WAL and folded into `state` as
/// a unit so a crash between the two never leaves a schedule either
/// double-firing or stuck (§8 invariant 5, "monotonic run_number";
/// extended here to schedule fan-out atomicity).
pub fn fire_due_schedules(state: &Mutex<MaterializedState>, wal: &Wal, now_ms: u64) -> Vec<RunId> {
    let now = DateTime::from_timestamp_millis(now_ms as i64).unwrap_or_else(Utc::now);
    let due = {
        let guard = state.lock();
        ScheduleRepository::new(&guard)
            .due(now_ms, 100)
            .into_iter()
            .cloned()
            .collect::<Vec<_>>()
    };

    let mut fired = Vec::with_capacity(due.len());
    for schedule in due {
        let next = match next_run_at(&schedule.cron_expression, &schedule.timezone, now) {
            Ok(next) => next,
            Err(err) => {
                tracing::warn!(schedule_id = %schedule.id, error = %err, "skipping unschedulable cron entry");
                continue;
            }
        };

        let run_id = RunId::new();
        let mut guard = state.lock();
        let run_number = guard.next_run_number(schedule.tenant_id);
        let created = Event::RunCreated {
            run_id,
            tenant_id: schedule.tenant_id,
            project_id: schedule.project_id,
            project_version: schedule.project_version,
            run_number,
            start_step_id: schedule.start_step_id,
            input: schedule.input.clone(),
            triggered_by: TriggeredBy::Schedule,
            triggered_by_user: None,
            trigger_source: Some(schedule.id.to_string()),
            at_ms: now_ms,
        };
        let advanced = Event::ScheduleAdvanced {
            schedule_id: schedule.id,
            run_id,
            next_run_at: next,
            at_ms: now_ms,
        };
        for event in [&created, &advanced] {
            if let Ok(seq) = wal.append(event.clone()) {
                guard.apply_event(seq, event);
            }
        }
        drop(guard);
        fired.push(run_id);
    }
    fired
}

/// Runs `fire_due_schedules` forever on `interval`, until `shutdown` is
/// notified. Intended to be spawned as its own task.
pub async fn run_loop<C: wf_core::Clock>(
    state: Arc<Mutex<MaterializedState>>,
    wal: Arc<Wal>,
    clock: C,
    interval: Duration,
    shutdown: Arc<tokio::sync::Notify>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let fired = fire_due_schedules(&state, &wal, clock.epoch_ms());
                if !fired.is_empty() {
                    tracing::info!(count = fired.len(), "fired due schedules");
                }
            }
            _ = shutdown.notified() => {
                tracing::info!("scheduler loop shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_minute_cron_advances_by_sixty_seconds() {
        let after: DateTime<Utc> = "2026-01-01T00:00:00Z".parse().unwrap();
        let next = next_run_at("0 * * * * *", "UTC", after).unwrap();
        assert_eq!(next, after + chrono::Duration::minutes(1));
    }

    #[test]
    fn rejects_a_malformed_expression() {
        assert!(next_run_at("not a cron", "UTC", Utc::now()).is_err());
    }

    #[test]
    fn rejects_an_unknown_timezone() {
        assert!(next_run_at("0 * * * * *", "Nowhere/Imaginary", Utc::now()).is_err());
    }

    #[test]
    fn due_schedule_fires_exactly_once_per_tick_even_after_a_long_gap() {
        use wf_core::id::{ProjectId, ScheduleId, StepId, TenantId};
        use wf_core::model::{Schedule, ScheduleStatus};

        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::open(dir.path().join("wal.log"), 0).unwrap();
        let state = Mutex::new(MaterializedState::new());

        let schedule_id = ScheduleId::new();
        let now = Utc::now();
        state.lock().schedules.insert(
            schedule_id,
            Schedule {
                id: schedule_id,
                tenant_id: TenantId::new(),
                project_id: ProjectId::new(),
                project_version: 1,
                start_step_id: StepId::new(),
                cron_expression: "0 * * * * *".into(),
                timezone: "UTC".into(),
                input: serde_json::Value::Null,
                status: ScheduleStatus::Active,
                // Far in the past, simulating a daemon that was down for days.
                next_run_at: now - chrono::Duration::days(3),
                last_run_at: None,
                last_run_id: None,
                run_count: 0,
                created_at: now,
                updated_at: now,
            },
        );

        let fired = fire_due_schedules(&state, &wal, now.timestamp_millis() as u64);
        assert_eq!(fired.len(), 1);

        let guard = state.lock();
        let schedule = &guard.schedules[&schedule_id];
        assert_eq!(schedule.run_count, 1);
        assert!(schedule.next_run_at > now);
    }
}
