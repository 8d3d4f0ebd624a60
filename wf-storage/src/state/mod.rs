// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory materialized view folded from the write-ahead log.
//!
//! # Idempotency contract
//!
//! `apply_event` MUST be safe to call twice with the same event: a replay
//! after a crash re-delivers every unprocessed entry, and a tick may be
//! re-entered. Handlers enforce this by guarding on the current state
//! (e.g. "only transition `running -> completed` if not already
//! terminal") rather than by blindly incrementing or inserting. An
//! handler that assumes its event is novel is a bug.

pub mod projects;
pub mod runs;
pub mod schedules;

use std::collections::HashMap;
use wf_core::event::Event;
use wf_core::id::{
    AgentMemoryId, BlockDefinitionId, BlockGroupRunId, ProjectId, ProjectVersionId, RunId,
    ScheduleId, StepRunId, TenantId, WebhookId,
};
use wf_core::model::{
    AgentMemory, BlockDefinition, BlockGroupRun, Project, ProjectVersion, Run, Schedule, StepRun,
    Webhook,
};

#[derive(Debug, Default)]
pub struct MaterializedState {
    pub runs: HashMap<RunId, Run>,
    pub step_runs: HashMap<StepRunId, StepRun>,
    pub step_runs_by_run: HashMap<RunId, Vec<StepRunId>>,
    pub block_group_runs: HashMap<BlockGroupRunId, BlockGroupRun>,
    pub agent_memory: HashMap<(RunId, wf_core::id::StepId), Vec<AgentMemory>>,
    pub projects: HashMap<ProjectId, Project>,
    pub project_versions: HashMap<ProjectVersionId, ProjectVersion>,
    /// Block-definition catalog (§4.2), keyed by id. Populated by
    /// whoever seeds the daemon's catalog; outside the run event-sourcing
    /// stream, matching the teacher's own separation between an
    /// operator-managed template catalog and the job log proper.
    pub block_definitions: HashMap<BlockDefinitionId, BlockDefinition>,
    pub schedules: HashMap<ScheduleId, Schedule>,
    pub webhooks: HashMap<WebhookId, Webhook>,
    /// Monotonic run_number counter per tenant (§8 invariant 4).
    pub run_number_cursor: HashMap<TenantId, i64>,
    /// Last seq folded into this state, so a snapshot can be resumed.
    pub processed_seq: u64,
}

impl MaterializedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one event into the state. Idempotent: applying the same
    /// event twice is equivalent to applying it once.
    pub fn apply_event(&mut self, seq: u64, event: &Event) {
        match event {
            Event::RunCreated { .. }
            | Event::RunStarted { .. }
            | Event::RunWaiting { .. }
            | Event::RunResumed { .. }
            | Event::RunPaused { .. }
            | Event::RunCompleted { .. }
            | Event::RunFailed { .. }
            | Event::RunCancelled { .. }
            | Event::StepRunCreated { .. }
            | Event::StepRunStarted { .. }
            | Event::StepRunCompleted { .. }
            | Event::StepRunFailed { .. }
            | Event::StepRunSkipped { .. }
            | Event::StepRunCancelled { .. }
            | Event::BlockGroupRunCreated { .. }
            | Event::BlockGroupRunIterated { .. }
            | Event::BlockGroupRunCompleted { .. }
            | Event::AgentMemoryAppended { .. } => runs::apply(self, event),
            Event::ProjectPublished { .. } => projects::apply(self, event),
            Event::ScheduleAdvanced { .. } | Event::WebhookTriggered { .. } => {
                schedules::apply(self, event)
            }
            Event::Custom => {}
        }
        if seq > self.processed_seq {
            self.processed_seq = seq;
        }
    }

    pub fn next_run_number(&mut self, tenant_id: TenantId) -> i64 {
        let next = self.run_number_cursor.get(&tenant_id).copied().unwrap_or(0) + 1;
        self.run_number_cursor.insert(tenant_id, next);
        next
    }

    pub fn next_agent_sequence(&self, run_id: RunId, step_id: wf_core::id::StepId) -> u64 {
        self.agent_memory
            .get(&(run_id, step_id))
            .and_then(|entries| entries.iter().map(|e| e.sequence_number).max())
            .map(|max| max + 1)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wf_core::id::{ProjectId, StepId, TenantId};

    #[test]
    fn applying_run_created_twice_is_idempotent() {
        let mut state = MaterializedState::new();
        let event = Event::RunCreated {
            run_id: RunId::new(),
            tenant_id: TenantId::new(),
            project_id: ProjectId::new(),
            project_version: 1,
            run_number: 1,
            start_step_id: StepId::new(),
            input: serde_json::Value::Null,
            triggered_by: wf_core::model::TriggeredBy::Manual,
            triggered_by_user: None,
            trigger_source: None,
            at_ms: 1,
        };
        state.apply_event(1, &event);
        state.apply_event(1, &event);
        assert_eq!(state.runs.len(), 1);
    }
}
