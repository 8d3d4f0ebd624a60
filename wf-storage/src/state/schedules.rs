// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event handlers for schedule fan-out (§4.5) and webhook trigger
//! counters (§4.6).

use super::MaterializedState;
use wf_core::event::Event;

pub fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::ScheduleAdvanced {
            schedule_id,
            run_id,
            next_run_at,
            at_ms,
        } => {
            if let Some(schedule) = state.schedules.get_mut(schedule_id) {
                // Guard against replaying an already-advanced cursor: only
                // move forward, never rewind to a stale next_run_at.
                if *next_run_at > schedule.next_run_at || schedule.last_run_id != Some(*run_id) {
                    schedule.next_run_at = *next_run_at;
                    schedule.last_run_id = Some(*run_id);
                    schedule.last_run_at =
                        Some(chrono::DateTime::from_timestamp_millis(*at_ms as i64).unwrap_or_else(chrono::Utc::now));
                    schedule.run_count += 1;
                }
            }
        }
        Event::WebhookTriggered {
            webhook_id, at_ms, ..
        } => {
            if let Some(webhook) = state.webhooks.get_mut(webhook_id) {
                webhook.trigger_count += 1;
                webhook.last_triggered_at =
                    Some(chrono::DateTime::from_timestamp_millis(*at_ms as i64).unwrap_or_else(chrono::Utc::now));
            }
        }
        _ => {}
    }
}
