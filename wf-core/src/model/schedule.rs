// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Triggers that admit new runs outside of manual/API calls: cron
//! schedules and inbound webhooks.

use crate::id::{ProjectId, RunId, ScheduleId, StepId, TenantId, WebhookId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Paused,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub project_version: i64,
    pub start_step_id: StepId,
    pub cron_expression: String,
    pub timezone: String,
    pub input: Value,
    pub status: ScheduleStatus,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_run_id: Option<RunId>,
    pub run_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: WebhookId,
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub project_version: i64,
    /// HMAC signing secret; never serialized back out over the wire.
    #[serde(skip_serializing)]
    pub secret: String,
    /// JSONPath-based projection from the inbound request to the run
    /// input, keyed by target field.
    pub input_mapping: Value,
    pub enabled: bool,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub trigger_count: i64,
}
