// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Side effects the runtime must perform, kept strictly separate from
//! `Event` (facts that already happened). A tick computes a `Vec<Effect>`
//! and hands it to an executor; the executor's own completion is what
//! eventually produces the next `Event`.

use crate::id::{RunId, ScheduleId, StepId, StepRunId, WebhookId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Effect {
    /// Dispatch a step to its adapter (sandbox/http/llm/tool) with the
    /// snapshotted input context.
    DispatchStep {
        step_run_id: StepRunId,
        run_id: RunId,
        step_id: StepId,
        input: Value,
    },
    /// Schedule a retry tick after a backoff delay (§4.3.6).
    ScheduleRetry {
        run_id: RunId,
        step_id: StepId,
        #[serde(with = "duration_serde")]
        delay: Duration,
    },
    /// Re-tick a run immediately (used after an in-process state change
    /// that may have unblocked another step).
    RetickRun { run_id: RunId },
    /// Propagate a cancellation signal to any in-flight dispatch for the
    /// run (§5 "bounded time, default 2s").
    PropagateCancel { run_id: RunId },
    /// Fan out a due schedule into a new run (§4.5).
    FireSchedule { schedule_id: ScheduleId },
    /// Record a webhook trigger counter increment (§4.6).
    RecordWebhookTrigger { webhook_id: WebhookId },
    /// Emit a structured log line for observability; never load-bearing
    /// for correctness.
    Log { level: LogLevel, message: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl Effect {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DispatchStep { .. } => "dispatch_step",
            Self::ScheduleRetry { .. } => "schedule_retry",
            Self::RetickRun { .. } => "retick_run",
            Self::PropagateCancel { .. } => "propagate_cancel",
            Self::FireSchedule { .. } => "fire_schedule",
            Self::RecordWebhookTrigger { .. } => "record_webhook_trigger",
            Self::Log { .. } => "log",
        }
    }

    /// Loggable key/value pairs, used by the executor's tracing span.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::DispatchStep {
                step_run_id,
                run_id,
                step_id,
                ..
            } => vec![
                ("step_run_id", step_run_id.to_string()),
                ("run_id", run_id.to_string()),
                ("step_id", step_id.to_string()),
            ],
            Self::ScheduleRetry {
                run_id,
                step_id,
                delay,
            } => vec![
                ("run_id", run_id.to_string()),
                ("step_id", step_id.to_string()),
                ("delay_ms", delay.as_millis().to_string()),
            ],
            Self::RetickRun { run_id } | Self::PropagateCancel { run_id } => {
                vec![("run_id", run_id.to_string())]
            }
            Self::FireSchedule { schedule_id } => {
                vec![("schedule_id", schedule_id.to_string())]
            }
            Self::RecordWebhookTrigger { webhook_id } => {
                vec![("webhook_id", webhook_id.to_string())]
            }
            Self::Log { level, .. } => vec![("level", format!("{level:?}"))],
        }
    }

    pub fn verbose(&self) -> String {
        let fields = self
            .fields()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{} {}", self.name(), fields)
    }
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}
