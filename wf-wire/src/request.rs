// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Requests the operator CLI sends to the daemon: a read-only `Query`
//! plus the mutating commands (§4.6 manual/API trigger, §4.3 run
//! control, §4.7 publish, §4.5 schedule control).

use crate::Query;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wf_core::id::{ProjectId, RunId, ScheduleId, WebhookId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Ping,
    Hello {
        version: String,
    },
    Query(Query),
    TriggerRun {
        project_id: ProjectId,
        input: Value,
        #[serde(default)]
        triggered_by_user: Option<String>,
    },
    CancelRun {
        run_id: RunId,
    },
    ResumeRun {
        run_id: RunId,
        payload: Value,
    },
    PublishProject {
        project_id: ProjectId,
        published_by: String,
    },
    PauseSchedule {
        schedule_id: ScheduleId,
    },
    ResumeSchedule {
        schedule_id: ScheduleId,
    },
    TriggerWebhook {
        webhook_id: WebhookId,
        signature: String,
        body: Vec<u8>,
    },
    Shutdown,
}
