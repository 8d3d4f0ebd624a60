// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only queries over the materialized state. The operator socket is
//! privileged local traffic, so these read straight off `MaterializedState`
//! rather than through a `TenantFilter` — there is no per-connection
//! tenant to scope against.

use super::ListenCtx;
use wf_core::Clock;
use wf_wire::{Query, Response};

pub fn handle<C: Clock>(query: Query, ctx: &ListenCtx<C>) -> Response {
    let guard = ctx.state.lock();
    match query {
        Query::ListRuns { project_id, status } => {
            let runs = guard
                .runs
                .values()
                .filter(|r| project_id.map_or(true, |pid| r.project_id == pid))
                .filter(|r| status.as_deref().map_or(true, |s| r.status.to_string() == s))
                .cloned()
                .collect();
            Response::Runs { runs }
        }
        Query::GetRun { id } => Response::Run {
            run: guard.runs.get(&id).cloned().map(Box::new),
        },
        Query::ListStepRuns { run_id } => {
            let step_runs = guard
                .step_runs_by_run
                .get(&run_id)
                .into_iter()
                .flatten()
                .filter_map(|id| guard.step_runs.get(id))
                .cloned()
                .collect();
            Response::StepRuns { step_runs }
        }
        Query::ListProjects => Response::Projects {
            projects: guard.projects.values().cloned().collect(),
        },
        Query::GetProject { id } => Response::Project {
            project: guard.projects.get(&id).cloned().map(Box::new),
        },
        Query::ListSchedules { project_id } => {
            let schedules = guard
                .schedules
                .values()
                .filter(|s| project_id.map_or(true, |pid| s.project_id == pid))
                .cloned()
                .collect();
            Response::Schedules { schedules }
        }
        Query::GetSchedule { id } => Response::Schedule {
            schedule: guard.schedules.get(&id).cloned().map(Box::new),
        },
        Query::StatusOverview => {
            let tenants = guard
                .runs
                .values()
                .map(|r| r.tenant_id)
                .chain(guard.projects.values().map(|p| p.tenant_id))
                .collect::<std::collections::HashSet<_>>()
                .len();
            let active_runs = guard
                .runs
                .values()
                .filter(|r| matches!(r.status, wf_core::model::RunStatus::Running | wf_core::model::RunStatus::Waiting))
                .count();
            Response::StatusOverview {
                uptime_secs: ctx.start_time.elapsed().as_secs(),
                active_runs,
                tenants,
            }
        }
    }
}
