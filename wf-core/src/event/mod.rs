// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Facts that happened, persisted to the write-ahead log and folded into
//! `MaterializedState`. An `Event` is never re-derived; applying the same
//! event twice must be a no-op (see `wf-storage::state`).

use crate::id::{
    AgentMemoryId, BlockGroupId, BlockGroupRunId, ProjectId, RunId, ScheduleId, StepId, StepRunId,
    TenantId, WebhookId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "run:created")]
    RunCreated {
        run_id: RunId,
        tenant_id: TenantId,
        project_id: ProjectId,
        project_version: i64,
        run_number: i64,
        start_step_id: StepId,
        input: Value,
        triggered_by: crate::model::TriggeredBy,
        #[serde(default)]
        triggered_by_user: Option<String>,
        #[serde(default)]
        trigger_source: Option<String>,
        at_ms: u64,
    },
    #[serde(rename = "run:started")]
    RunStarted { run_id: RunId, at_ms: u64 },
    #[serde(rename = "run:waiting")]
    RunWaiting {
        run_id: RunId,
        correlation_token: String,
        at_ms: u64,
    },
    #[serde(rename = "run:resumed")]
    RunResumed { run_id: RunId, payload: Value, at_ms: u64 },
    #[serde(rename = "run:paused")]
    RunPaused { run_id: RunId, at_ms: u64 },
    #[serde(rename = "run:completed")]
    RunCompleted {
        run_id: RunId,
        output: Value,
        at_ms: u64,
    },
    #[serde(rename = "run:failed")]
    RunFailed {
        run_id: RunId,
        error: String,
        at_ms: u64,
    },
    #[serde(rename = "run:cancelled")]
    RunCancelled { run_id: RunId, at_ms: u64 },

    #[serde(rename = "step_run:created")]
    StepRunCreated {
        step_run_id: StepRunId,
        run_id: RunId,
        step_id: StepId,
        step_name: String,
        attempt: u32,
        input: Value,
        at_ms: u64,
    },
    #[serde(rename = "step_run:started")]
    StepRunStarted { step_run_id: StepRunId, at_ms: u64 },
    #[serde(rename = "step_run:completed")]
    StepRunCompleted {
        step_run_id: StepRunId,
        output: Value,
        duration_ms: i64,
        at_ms: u64,
    },
    #[serde(rename = "step_run:failed")]
    StepRunFailed {
        step_run_id: StepRunId,
        error: String,
        error_code: String,
        at_ms: u64,
    },
    #[serde(rename = "step_run:skipped")]
    StepRunSkipped { step_run_id: StepRunId, at_ms: u64 },
    #[serde(rename = "step_run:cancelled")]
    StepRunCancelled { step_run_id: StepRunId, at_ms: u64 },

    #[serde(rename = "block_group_run:created")]
    BlockGroupRunCreated {
        block_group_run_id: BlockGroupRunId,
        block_group_id: BlockGroupId,
        run_id: RunId,
        at_ms: u64,
    },
    #[serde(rename = "block_group_run:iterated")]
    BlockGroupRunIterated {
        block_group_run_id: BlockGroupRunId,
        iteration_count: u32,
        at_ms: u64,
    },
    #[serde(rename = "block_group_run:completed")]
    BlockGroupRunCompleted {
        block_group_run_id: BlockGroupRunId,
        branch_taken: Option<String>,
        output: Value,
        at_ms: u64,
    },

    #[serde(rename = "agent_memory:appended")]
    AgentMemoryAppended {
        id: AgentMemoryId,
        run_id: RunId,
        step_id: StepId,
        role: String,
        content: String,
        sequence_number: u64,
        at_ms: u64,
    },

    #[serde(rename = "project:published")]
    ProjectPublished {
        project_version_id: crate::id::ProjectVersionId,
        project_id: ProjectId,
        tenant_id: TenantId,
        version: i64,
        name: String,
        description: Option<String>,
        variables: Value,
        steps: Vec<crate::model::project::Step>,
        edges: Vec<crate::model::project::Edge>,
        block_groups: Vec<crate::model::project::BlockGroup>,
        published_by: String,
        at_ms: u64,
    },

    #[serde(rename = "schedule:advanced")]
    ScheduleAdvanced {
        schedule_id: ScheduleId,
        run_id: RunId,
        next_run_at: DateTime<Utc>,
        at_ms: u64,
    },

    #[serde(rename = "webhook:triggered")]
    WebhookTriggered {
        webhook_id: WebhookId,
        run_id: RunId,
        at_ms: u64,
    },

    /// Forward-compatible catch-all so an older replayer does not choke on
    /// an event kind it does not yet know about.
    #[serde(other, skip_serializing)]
    Custom,
}

impl Event {
    pub fn at_ms(&self) -> Option<u64> {
        match self {
            Self::RunCreated { at_ms, .. }
            | Self::RunStarted { at_ms, .. }
            | Self::RunWaiting { at_ms, .. }
            | Self::RunResumed { at_ms, .. }
            | Self::RunPaused { at_ms, .. }
            | Self::RunCompleted { at_ms, .. }
            | Self::RunFailed { at_ms, .. }
            | Self::RunCancelled { at_ms, .. }
            | Self::StepRunCreated { at_ms, .. }
            | Self::StepRunStarted { at_ms, .. }
            | Self::StepRunCompleted { at_ms, .. }
            | Self::StepRunFailed { at_ms, .. }
            | Self::StepRunSkipped { at_ms, .. }
            | Self::StepRunCancelled { at_ms, .. }
            | Self::BlockGroupRunCreated { at_ms, .. }
            | Self::BlockGroupRunIterated { at_ms, .. }
            | Self::BlockGroupRunCompleted { at_ms, .. }
            | Self::AgentMemoryAppended { at_ms, .. }
            | Self::ProjectPublished { at_ms, .. }
            | Self::ScheduleAdvanced { at_ms, .. }
            | Self::WebhookTriggered { at_ms, .. } => Some(*at_ms),
            Self::Custom => None,
        }
    }

    pub fn run_id(&self) -> Option<RunId> {
        match self {
            Self::RunCreated { run_id, .. }
            | Self::RunStarted { run_id, .. }
            | Self::RunWaiting { run_id, .. }
            | Self::RunResumed { run_id, .. }
            | Self::RunPaused { run_id, .. }
            | Self::RunCompleted { run_id, .. }
            | Self::RunFailed { run_id, .. }
            | Self::RunCancelled { run_id, .. }
            | Self::StepRunCreated { run_id, .. }
            | Self::BlockGroupRunCreated { run_id, .. }
            | Self::AgentMemoryAppended { run_id, .. }
            | Self::ScheduleAdvanced { run_id, .. }
            | Self::WebhookTriggered { run_id, .. } => Some(*run_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_created_round_trips_through_json() {
        let event = Event::RunCreated {
            run_id: RunId::new(),
            tenant_id: TenantId::new(),
            project_id: ProjectId::new(),
            project_version: 1,
            run_number: 1,
            start_step_id: StepId::new(),
            input: Value::Null,
            triggered_by: crate::model::TriggeredBy::Manual,
            triggered_by_user: None,
            trigger_source: None,
            at_ms: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.run_id(), event.run_id());
    }

    #[test]
    fn unknown_event_kind_deserializes_to_custom() {
        let parsed: Event = serde_json::from_str(r#"{"type":"something:future"}"#).unwrap();
        assert!(matches!(parsed, Event::Custom));
    }
}
