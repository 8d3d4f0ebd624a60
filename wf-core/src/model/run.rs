// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run and StepRun: the execution-time records the engine drives. Shaped
//! after the teacher's `Job`/`StepRecord` pair — a run carries no
//! authoritative in-process state, only the durable fields the engine
//! reads back on every tick.

use crate::id::{AgentMemoryId, BlockGroupId, BlockGroupRunId, ProjectId, RunId, StepId, StepRunId, TenantId};
use crate::simple_display;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Waiting,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

simple_display! {
    enum RunStatus {
        Pending => "pending",
        Running => "running",
        Waiting => "waiting",
        Paused => "paused",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl RunStatus {
    /// Terminal states are absorbing (§4.3.1): no further transition is
    /// legal once reached.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggeredBy {
    Manual,
    Schedule,
    Webhook,
    Api,
    Agent,
    Test,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub project_version: i64,
    pub status: RunStatus,
    pub input: Value,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub triggered_by: TriggeredBy,
    pub triggered_by_user: Option<String>,
    /// Monotonically increasing per tenant, assigned by storage on insert.
    pub run_number: i64,
    pub start_step_id: StepId,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub trigger_source: Option<String>,
    pub trigger_metadata: Option<Value>,
    /// Correlation token for a `waiting` run, carrying the awaited
    /// payload's identity (§9 "async control flow").
    pub wait_correlation_token: Option<String>,
}

impl Run {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `started_at <= completed_at` invariant (§3).
    pub fn has_consistent_timestamps(&self) -> bool {
        match (self.started_at, self.completed_at) {
            (Some(s), Some(c)) => s <= c,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

simple_display! {
    enum StepRunStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Skipped => "skipped",
        Cancelled => "cancelled",
    }
}

impl StepRunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Skipped | Self::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRun {
    pub id: StepRunId,
    pub tenant_id: TenantId,
    pub run_id: RunId,
    pub step_id: StepId,
    pub step_name: String,
    pub status: StepRunStatus,
    /// `attempt = max(existing) + 1` for retries; `(run_id, step_id,
    /// attempt)` is unique.
    pub attempt: u32,
    pub input: Value,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl StepRun {
    pub fn new(tenant_id: TenantId, run_id: RunId, step_id: StepId, step_name: String, attempt: u32, input: Value, now: DateTime<Utc>) -> Self {
        Self {
            id: StepRunId::new(),
            tenant_id,
            run_id,
            step_id,
            step_name,
            status: StepRunStatus::Pending,
            attempt,
            input,
            output: None,
            error: None,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            created_at: now,
        }
    }
}

/// Parallel StepRun for block groups: tracks iteration count for loops and
/// the branch taken for conditions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockGroupRun {
    pub id: BlockGroupRunId,
    pub tenant_id: TenantId,
    pub run_id: RunId,
    pub block_group_id: BlockGroupId,
    pub status: StepRunStatus,
    pub iteration_count: u32,
    pub branch_taken: Option<String>,
    pub output: Option<Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMemory {
    pub id: AgentMemoryId,
    pub run_id: RunId,
    pub step_id: StepId,
    pub role: String,
    pub content: String,
    pub tool_calls: Option<Value>,
    pub tool_call_id: Option<String>,
    pub metadata: Option<Value>,
    /// `sequence_number = max+1` scoped to `(run_id, step_id)`; ordering is
    /// strict and contiguous (§8 invariant 6).
    pub sequence_number: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        pending = { RunStatus::Pending, false },
        running = { RunStatus::Running, false },
        waiting = { RunStatus::Waiting, false },
        paused = { RunStatus::Paused, false },
        completed = { RunStatus::Completed, true },
        failed = { RunStatus::Failed, true },
        cancelled = { RunStatus::Cancelled, true },
    )]
    fn run_status_terminality(status: RunStatus, expected: bool) {
        assert_eq!(status.is_terminal(), expected);
    }

    #[test]
    fn timestamp_invariant_holds_when_both_set() {
        let now = Utc::now();
        let mut run = sample_run(now);
        run.started_at = Some(now);
        run.completed_at = Some(now - chrono::Duration::seconds(1));
        assert!(!run.has_consistent_timestamps());
    }

    fn sample_run(now: DateTime<Utc>) -> Run {
        Run {
            id: RunId::new(),
            tenant_id: TenantId::new(),
            project_id: ProjectId::new(),
            project_version: 1,
            status: RunStatus::Running,
            input: Value::Null,
            output: None,
            error: None,
            triggered_by: TriggeredBy::Manual,
            triggered_by_user: None,
            run_number: 1,
            start_step_id: StepId::new(),
            started_at: None,
            completed_at: None,
            created_at: now,
            trigger_source: None,
            trigger_metadata: None,
            wait_correlation_token: None,
        }
    }
}
