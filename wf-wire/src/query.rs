// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only query types the operator surface exposes over the daemon's
//! materialized state.

use serde::{Deserialize, Serialize};
use wf_core::id::{ProjectId, RunId, ScheduleId};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Query {
    ListRuns {
        #[serde(default)]
        project_id: Option<ProjectId>,
        #[serde(default)]
        status: Option<String>,
    },
    GetRun {
        id: RunId,
    },
    ListStepRuns {
        run_id: RunId,
    },
    ListProjects,
    GetProject {
        id: ProjectId,
    },
    ListSchedules {
        #[serde(default)]
        project_id: Option<ProjectId>,
    },
    GetSchedule {
        id: ScheduleId,
    },
    StatusOverview,
}
