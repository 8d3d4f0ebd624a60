// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event handlers for runs, step runs, block-group runs, and agent
//! memory. Every handler is guard-by-status: it checks the current state
//! before mutating, so a duplicate delivery is a no-op rather than a
//! double-apply (§ idempotency contract in `state::mod`).

use super::MaterializedState;
use wf_core::event::Event;
use wf_core::model::{
    AgentMemory, BlockGroupRun, Run, RunStatus, StepRun, StepRunStatus, TriggeredBy,
};

pub fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::RunCreated {
            run_id,
            tenant_id,
            project_id,
            project_version,
            run_number,
            start_step_id,
            input,
            triggered_by,
            triggered_by_user,
            trigger_source,
            at_ms,
        } => {
            state.runs.entry(*run_id).or_insert_with(|| Run {
                id: *run_id,
                tenant_id: *tenant_id,
                project_id: *project_id,
                project_version: *project_version,
                status: RunStatus::Pending,
                input: input.clone(),
                output: None,
                error: None,
                triggered_by: *triggered_by,
                triggered_by_user: triggered_by_user.clone(),
                run_number: *run_number,
                start_step_id: *start_step_id,
                started_at: None,
                completed_at: None,
                created_at: millis_to_utc(*at_ms),
                trigger_source: trigger_source.clone(),
                trigger_metadata: None,
                wait_correlation_token: None,
            });
        }
        Event::RunStarted { run_id, at_ms } => {
            if let Some(run) = state.runs.get_mut(run_id) {
                if run.status == RunStatus::Pending {
                    run.status = RunStatus::Running;
                    run.started_at = Some(millis_to_utc(*at_ms));
                }
            }
        }
        Event::RunWaiting {
            run_id,
            correlation_token,
            ..
        } => {
            if let Some(run) = state.runs.get_mut(run_id) {
                if !run.is_terminal() {
                    run.status = RunStatus::Waiting;
                    run.wait_correlation_token = Some(correlation_token.clone());
                }
            }
        }
        Event::RunResumed { run_id, .. } => {
            if let Some(run) = state.runs.get_mut(run_id) {
                if run.status == RunStatus::Waiting {
                    run.status = RunStatus::Running;
                    run.wait_correlation_token = None;
                }
            }
        }
        Event::RunPaused { run_id, .. } => {
            if let Some(run) = state.runs.get_mut(run_id) {
                if run.status == RunStatus::Running {
                    run.status = RunStatus::Paused;
                }
            }
        }
        Event::RunCompleted {
            run_id,
            output,
            at_ms,
        } => {
            if let Some(run) = state.runs.get_mut(run_id) {
                if !run.is_terminal() {
                    run.status = RunStatus::Completed;
                    run.output = Some(output.clone());
                    run.completed_at = Some(millis_to_utc(*at_ms));
                }
            }
        }
        Event::RunFailed {
            run_id,
            error,
            at_ms,
        } => {
            if let Some(run) = state.runs.get_mut(run_id) {
                if !run.is_terminal() {
                    run.status = RunStatus::Failed;
                    run.error = Some(error.clone());
                    run.completed_at = Some(millis_to_utc(*at_ms));
                }
            }
        }
        Event::RunCancelled { run_id, at_ms } => {
            if let Some(run) = state.runs.get_mut(run_id) {
                if !run.is_terminal() {
                    run.status = RunStatus::Cancelled;
                    run.completed_at = Some(millis_to_utc(*at_ms));
                }
            }
        }
        Event::StepRunCreated {
            step_run_id,
            run_id,
            step_id,
            step_name,
            attempt,
            input,
            at_ms,
        } => {
            if !state.step_runs.contains_key(step_run_id) {
                let tenant_id = state
                    .runs
                    .get(run_id)
                    .map(|r| r.tenant_id)
                    .unwrap_or_default();
                let step_run = StepRun {
                    id: *step_run_id,
                    tenant_id,
                    run_id: *run_id,
                    step_id: *step_id,
                    step_name: step_name.clone(),
                    status: StepRunStatus::Pending,
                    attempt: *attempt,
                    input: input.clone(),
                    output: None,
                    error: None,
                    started_at: None,
                    completed_at: None,
                    duration_ms: None,
                    created_at: millis_to_utc(*at_ms),
                };
                state.step_runs.insert(*step_run_id, step_run);
                state
                    .step_runs_by_run
                    .entry(*run_id)
                    .or_default()
                    .push(*step_run_id);
            }
        }
        Event::StepRunStarted { step_run_id, at_ms } => {
            if let Some(sr) = state.step_runs.get_mut(step_run_id) {
                if sr.status == StepRunStatus::Pending {
                    sr.status = StepRunStatus::Running;
                    sr.started_at = Some(millis_to_utc(*at_ms));
                }
            }
        }
        Event::StepRunCompleted {
            step_run_id,
            output,
            duration_ms,
            at_ms,
        } => {
            if let Some(sr) = state.step_runs.get_mut(step_run_id) {
                if !sr.status.is_terminal() {
                    sr.status = StepRunStatus::Completed;
                    sr.output = Some(output.clone());
                    sr.duration_ms = Some(*duration_ms);
                    sr.completed_at = Some(millis_to_utc(*at_ms));
                }
            }
        }
        Event::StepRunFailed {
            step_run_id,
            error,
            at_ms,
            ..
        } => {
            if let Some(sr) = state.step_runs.get_mut(step_run_id) {
                if !sr.status.is_terminal() {
                    sr.status = StepRunStatus::Failed;
                    sr.error = Some(error.clone());
                    sr.completed_at = Some(millis_to_utc(*at_ms));
                }
            }
        }
        Event::StepRunSkipped { step_run_id, at_ms } => {
            if let Some(sr) = state.step_runs.get_mut(step_run_id) {
                if !sr.status.is_terminal() {
                    sr.status = StepRunStatus::Skipped;
                    sr.completed_at = Some(millis_to_utc(*at_ms));
                }
            }
        }
        Event::StepRunCancelled { step_run_id, at_ms } => {
            if let Some(sr) = state.step_runs.get_mut(step_run_id) {
                if !sr.status.is_terminal() {
                    sr.status = StepRunStatus::Cancelled;
                    sr.completed_at = Some(millis_to_utc(*at_ms));
                }
            }
        }
        Event::BlockGroupRunCreated {
            block_group_run_id,
            block_group_id,
            run_id,
            ..
        } => {
            state
                .block_group_runs
                .entry(*block_group_run_id)
                .or_insert_with(|| BlockGroupRun {
                    id: *block_group_run_id,
                    tenant_id: state
                        .runs
                        .get(run_id)
                        .map(|r| r.tenant_id)
                        .unwrap_or_default(),
                    run_id: *run_id,
                    block_group_id: *block_group_id,
                    status: StepRunStatus::Pending,
                    iteration_count: 0,
                    branch_taken: None,
                    output: None,
                    started_at: None,
                    completed_at: None,
                });
        }
        Event::BlockGroupRunIterated {
            block_group_run_id,
            iteration_count,
            ..
        } => {
            if let Some(bgr) = state.block_group_runs.get_mut(block_group_run_id) {
                if *iteration_count > bgr.iteration_count {
                    bgr.iteration_count = *iteration_count;
                }
            }
        }
        Event::BlockGroupRunCompleted {
            block_group_run_id,
            branch_taken,
            output,
            ..
        } => {
            if let Some(bgr) = state.block_group_runs.get_mut(block_group_run_id) {
                if !bgr.status.is_terminal() {
                    bgr.status = StepRunStatus::Completed;
                    bgr.branch_taken = branch_taken.clone();
                    bgr.output = Some(output.clone());
                }
            }
        }
        Event::AgentMemoryAppended {
            id,
            run_id,
            step_id,
            role,
            content,
            sequence_number,
            ..
        } => {
            let entries = state.agent_memory.entry((*run_id, *step_id)).or_default();
            let already_applied = entries.iter().any(|m| m.id == *id);
            if !already_applied {
                entries.push(AgentMemory {
                    id: *id,
                    run_id: *run_id,
                    step_id: *step_id,
                    role: role.clone(),
                    content: content.clone(),
                    tool_calls: None,
                    tool_call_id: None,
                    metadata: None,
                    sequence_number: *sequence_number,
                });
                entries.sort_by_key(|m| m.sequence_number);
            }
        }
        _ => {}
    }
}

fn millis_to_utc(ms: u64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp_millis(ms as i64).unwrap_or_else(chrono::Utc::now)
}
