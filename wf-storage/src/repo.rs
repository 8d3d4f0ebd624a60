// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant-scoped read access over `MaterializedState` (§4.1). Every method
//! takes a `TenantFilter` and returns `ErrorKind::NotFound` rather than
//! `None` for a missing-or-foreign row, satisfying "`UPDATE`/read against
//! a tenant-scoped table without a filter is a bug."

use crate::state::MaterializedState;
use wf_core::error::ErrorKind;
use wf_core::id::{ProjectId, RunId, ScheduleId, StepRunId};
use wf_core::model::{Project, Run, Schedule, StepRun};
use wf_core::tenant::TenantFilter;

pub struct RunRepository<'a> {
    state: &'a MaterializedState,
}

impl<'a> RunRepository<'a> {
    pub fn new(state: &'a MaterializedState) -> Self {
        Self { state }
    }

    pub fn get(&self, filter: &TenantFilter, run_id: RunId) -> Result<&Run, ErrorKind> {
        let run = self
            .state
            .runs
            .get(&run_id)
            .ok_or_else(|| ErrorKind::not_found(format!("run {run_id}")))?;
        if filter.admits(Some(run.tenant_id), false) {
            Ok(run)
        } else {
            Err(ErrorKind::not_found(format!("run {run_id}")))
        }
    }

    pub fn step_runs_for(&self, filter: &TenantFilter, run_id: RunId) -> Result<Vec<&StepRun>, ErrorKind> {
        // Proves the run itself is visible before returning its children,
        // so a foreign run's step runs are never leaked as an empty list.
        self.get(filter, run_id)?;
        Ok(self
            .state
            .step_runs_by_run
            .get(&run_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.state.step_runs.get(id))
            .collect())
    }

    pub fn get_step_run(&self, filter: &TenantFilter, step_run_id: StepRunId) -> Result<&StepRun, ErrorKind> {
        let sr = self
            .state
            .step_runs
            .get(&step_run_id)
            .ok_or_else(|| ErrorKind::not_found(format!("step_run {step_run_id}")))?;
        if filter.admits(Some(sr.tenant_id), false) {
            Ok(sr)
        } else {
            Err(ErrorKind::not_found(format!("step_run {step_run_id}")))
        }
    }

    pub fn list_for_tenant(&self, filter: &TenantFilter) -> Vec<&Run> {
        self.state
            .runs
            .values()
            .filter(|r| filter.admits(Some(r.tenant_id), false))
            .collect()
    }
}

pub struct ProjectRepository<'a> {
    state: &'a MaterializedState,
}

impl<'a> ProjectRepository<'a> {
    pub fn new(state: &'a MaterializedState) -> Self {
        Self { state }
    }

    pub fn get(&self, filter: &TenantFilter, project_id: ProjectId) -> Result<&Project, ErrorKind> {
        let project = self
            .state
            .projects
            .get(&project_id)
            .ok_or_else(|| ErrorKind::not_found(format!("project {project_id}")))?;
        if filter.admits(project.tenant_id_option(), project.is_system) {
            Ok(project)
        } else {
            Err(ErrorKind::not_found(format!("project {project_id}")))
        }
    }
}

/// Small extension so a `Project`'s always-present `tenant_id` can be
/// treated uniformly with the `Option<TenantId>` shape `TenantFilter`
/// expects for system-row admission.
trait TenantIdOption {
    fn tenant_id_option(&self) -> Option<wf_core::id::TenantId>;
}

impl TenantIdOption for Project {
    fn tenant_id_option(&self) -> Option<wf_core::id::TenantId> {
        if self.is_system {
            None
        } else {
            Some(self.tenant_id)
        }
    }
}

pub struct ScheduleRepository<'a> {
    state: &'a MaterializedState,
}

impl<'a> ScheduleRepository<'a> {
    pub fn new(state: &'a MaterializedState) -> Self {
        Self { state }
    }

    pub fn get(&self, filter: &TenantFilter, schedule_id: ScheduleId) -> Result<&Schedule, ErrorKind> {
        let schedule = self
            .state
            .schedules
            .get(&schedule_id)
            .ok_or_else(|| ErrorKind::not_found(format!("schedule {schedule_id}")))?;
        if filter.admits(Some(schedule.tenant_id), false) {
            Ok(schedule)
        } else {
            Err(ErrorKind::not_found(format!("schedule {schedule_id}")))
        }
    }

    /// Schedules due to fire, ordered by `next_run_at` (§4.5).
    pub fn due(&self, now_ms: u64, limit: usize) -> Vec<&Schedule> {
        let now = chrono::DateTime::from_timestamp_millis(now_ms as i64).unwrap_or_else(chrono::Utc::now);
        let mut due: Vec<&Schedule> = self
            .state
            .schedules
            .values()
            .filter(|s| s.status == wf_core::model::ScheduleStatus::Active && s.next_run_at <= now)
            .collect();
        due.sort_by_key(|s| s.next_run_at);
        due.truncate(limit);
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_core::tenant::TenantScope;

    #[test]
    fn get_run_rejects_foreign_tenant() {
        let mut state = MaterializedState::new();
        let owner = wf_core::id::TenantId::new();
        let run_id = RunId::new();
        state.runs.insert(
            run_id,
            Run {
                id: run_id,
                tenant_id: owner,
                project_id: ProjectId::new(),
                project_version: 1,
                status: wf_core::model::RunStatus::Pending,
                input: serde_json::Value::Null,
                output: None,
                error: None,
                triggered_by: wf_core::model::TriggeredBy::Manual,
                triggered_by_user: None,
                run_number: 1,
                start_step_id: wf_core::id::StepId::new(),
                started_at: None,
                completed_at: None,
                created_at: chrono::Utc::now(),
                trigger_source: None,
                trigger_metadata: None,
                wait_correlation_token: None,
            },
        );
        let repo = RunRepository::new(&state);
        let other_scope = TenantScope::new(wf_core::id::TenantId::new()).unwrap();
        let filter = TenantFilter::scoped(other_scope);
        assert!(repo.get(&filter, run_id).is_err());
    }
}
