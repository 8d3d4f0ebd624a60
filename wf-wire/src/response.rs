// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use wf_core::id::RunId;
use wf_core::model::{Project, Run, Schedule, StepRun};

/// Response from daemon to operator CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Ok,
    Pong,
    Hello { version: String },
    ShuttingDown,
    Error { message: String, code: String },

    Run { run: Option<Box<Run>> },
    Runs { runs: Vec<Run> },
    StepRuns { step_runs: Vec<StepRun> },

    Project { project: Option<Box<Project>> },
    Projects { projects: Vec<Project> },

    Schedule { schedule: Option<Box<Schedule>> },
    Schedules { schedules: Vec<Schedule> },

    RunTriggered { run_id: RunId },
    RunCancelled { run_id: RunId },
    RunResumed { run_id: RunId },
    ProjectPublished { project_id: wf_core::id::ProjectId, version: i64 },
    ScheduleUpdated { schedule_id: wf_core::id::ScheduleId },
    WebhookAccepted { run_id: RunId },

    StatusOverview {
        uptime_secs: u64,
        active_runs: usize,
        tenants: usize,
    },
}
