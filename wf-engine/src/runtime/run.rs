// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The run state machine (§4.3.1, §4.3.2, §4.3.7): pure functions from
//! `(current state, input)` to `(events, effects)`. Nothing here mutates
//! `MaterializedState` directly — the caller folds the returned events
//! through `wf_storage::state` and hands the effects to an executor.

use super::graph::{self, GraphError};
use super::group::{self, GroupOutcome};
use super::retry::{OnError, RetryPolicy};
use crate::vars::VarContext;
use std::collections::HashMap;
use std::time::Duration;
use wf_core::effect::Effect;
use wf_core::error::ErrorKind;
use wf_core::event::Event;
use wf_core::id::{BlockGroupRunId, RunId, StepId, StepRunId};
use wf_core::model::project::{BlockGroup, BlockGroupType, ProjectVersion, Step};
use wf_core::model::run::{BlockGroupRun, Run, RunStatus, StepRun, StepRunStatus};
use wf_core::Clock;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("run {0} is already terminal")]
    AlreadyTerminal(RunId),
}

pub struct Runtime<C: Clock> {
    clock: C,
}

impl<C: Clock> Runtime<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn now_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    /// Transitions a freshly created run to `running` and schedules the
    /// first tick.
    pub fn start_run(&self, run: &Run) -> Result<(Vec<Event>, Vec<Effect>), RuntimeError> {
        if run.status != RunStatus::Pending {
            return Err(RuntimeError::AlreadyTerminal(run.id));
        }
        Ok((
            vec![Event::RunStarted {
                run_id: run.id,
                at_ms: self.now_ms(),
            }],
            vec![Effect::RetickRun { run_id: run.id }],
        ))
    }

    /// One tick of the run engine: starts any block group whose incoming
    /// edges just became satisfied, folds completion/iteration for groups
    /// already in flight, dispatches every step that has just become
    /// ready, or completes the run if nothing remains in flight (§4.3.4,
    /// §4.3.7).
    pub fn tick(
        &self,
        version: &ProjectVersion,
        run: &Run,
        step_runs: &[StepRun],
        block_group_runs: &[BlockGroupRun],
        vars: &serde_json::Value,
    ) -> Result<(Vec<Event>, Vec<Effect>), RuntimeError> {
        if run.is_terminal() {
            return Ok((vec![], vec![]));
        }
        graph::detect_cycle(version)?;

        let starting = graph::ready_groups(version, run, step_runs, block_group_runs, vars);
        if !starting.is_empty() {
            let events = starting
                .into_iter()
                .map(|g| Event::BlockGroupRunCreated {
                    block_group_run_id: BlockGroupRunId::new(),
                    block_group_id: g.id,
                    run_id: run.id,
                    at_ms: self.now_ms(),
                })
                .collect();
            return Ok((events, vec![Effect::RetickRun { run_id: run.id }]));
        }

        if let Some(outcome) = self.fold_active_groups(version, run, step_runs, block_group_runs, vars) {
            return Ok(outcome);
        }

        let ready = graph::ready_steps(version, run, step_runs, block_group_runs, vars);
        if !ready.is_empty() {
            let mut events = Vec::with_capacity(ready.len());
            let mut effects = Vec::with_capacity(ready.len());
            for r in ready {
                let step_run_id = StepRunId::new();
                events.push(Event::StepRunCreated {
                    step_run_id,
                    run_id: run.id,
                    step_id: r.step.id,
                    step_name: r.step.name.clone(),
                    attempt: 1,
                    input: r.input.clone(),
                    at_ms: self.now_ms(),
                });
                effects.push(Effect::DispatchStep {
                    step_run_id,
                    run_id: run.id,
                    step_id: r.step.id,
                    input: r.input,
                });
            }
            return Ok((events, effects));
        }

        if run_is_done(version, step_runs, block_group_runs) {
            let output = final_output(step_runs);
            return Ok((
                vec![Event::RunCompleted {
                    run_id: run.id,
                    output,
                    at_ms: self.now_ms(),
                }],
                vec![],
            ));
        }

        // Nothing ready, nothing complete: a step is still in flight or
        // the run is genuinely blocked waiting on an external event.
        Ok((vec![], vec![]))
    }

    /// Evaluates every in-flight `BlockGroupRun` against its members'
    /// statuses and either completes it, fails the run, or admits the
    /// next loop iteration (§4.3.4). Returns the first group transition it
    /// finds; the caller re-ticks to look for any other group that
    /// settled in the same round.
    ///
    /// A loop group's re-dispatched body is its entry members only — a
    /// deliberate simplification for multi-step bodies chained after the
    /// entry, documented as a known limitation rather than re-deriving
    /// intra-iteration readiness from scratch.
    fn fold_active_groups(
        &self,
        version: &ProjectVersion,
        run: &Run,
        step_runs: &[StepRun],
        block_group_runs: &[BlockGroupRun],
        vars: &serde_json::Value,
    ) -> Option<(Vec<Event>, Vec<Effect>)> {
        let latest_by_step = graph::latest_attempt_per_step(step_runs);
        let named_outputs = graph::step_runs_by_name(version, &latest_by_step);
        let ctx = VarContext::build(run, vars, &named_outputs, None);

        for bgr in block_group_runs {
            if bgr.status.is_terminal() {
                continue;
            }
            let Some(group) = version.block_groups.iter().find(|g| g.id == bgr.block_group_id) else {
                continue;
            };
            let members = graph::group_members(version, group.id);
            if members.is_empty() {
                continue;
            }

            match group.group_type {
                BlockGroupType::Sequence | BlockGroupType::Parallel | BlockGroupType::Agent => {
                    let statuses = member_statuses(&latest_by_step, &members);
                    let fan_out_type = if group.group_type == BlockGroupType::Parallel {
                        BlockGroupType::Parallel
                    } else {
                        BlockGroupType::Sequence
                    };
                    match group::fan_out_outcome(fan_out_type, &statuses) {
                        GroupOutcome::InProgress => continue,
                        GroupOutcome::Completed => {
                            return Some(self.complete_group(bgr, None, member_output(&latest_by_step, &members)));
                        }
                        GroupOutcome::Failed => return Some(self.fail_group_run(run, bgr)),
                    }
                }
                BlockGroupType::Condition | BlockGroupType::Switch => {
                    let branch = graph::select_branch(group, &ctx);
                    let branch_members: Vec<&Step> = members
                        .iter()
                        .filter(|s| s.group_role.as_deref() == Some(branch.as_str()))
                        .copied()
                        .collect();
                    if branch_members.is_empty() {
                        return Some(self.complete_group(bgr, Some(branch), serde_json::Value::Null));
                    }
                    let statuses = member_statuses(&latest_by_step, &branch_members);
                    match group::branch_outcome(&statuses) {
                        GroupOutcome::InProgress => continue,
                        GroupOutcome::Completed => {
                            return Some(self.complete_group(bgr, Some(branch), member_output(&latest_by_step, &branch_members)));
                        }
                        GroupOutcome::Failed => return Some(self.fail_group_run(run, bgr)),
                    }
                }
                BlockGroupType::Loop => {
                    let entry = graph::group_entry_members(version, group.id);
                    if entry.is_empty() {
                        continue;
                    }
                    let statuses = member_statuses(&latest_by_step, &entry);
                    match group::fan_out_outcome(BlockGroupType::Sequence, &statuses) {
                        GroupOutcome::InProgress => continue,
                        GroupOutcome::Failed => return Some(self.fail_group_run(run, bgr)),
                        GroupOutcome::Completed => {
                            if !loop_should_continue(group, &ctx, bgr.iteration_count) {
                                return Some(self.complete_group(bgr, None, member_output(&latest_by_step, &entry)));
                            }
                            let max_iterations = group.config.get("max_iterations").and_then(serde_json::Value::as_u64).map(|v| v as u32);
                            match group::next_loop_iteration(bgr.iteration_count, max_iterations) {
                                Ok(next) => return Some(self.iterate_loop(run, bgr, next, &entry, &ctx)),
                                Err(_) => return Some(self.fail_group_run(run, bgr)),
                            }
                        }
                    }
                }
            }
        }
        None
    }

    fn complete_group(&self, bgr: &BlockGroupRun, branch_taken: Option<String>, output: serde_json::Value) -> (Vec<Event>, Vec<Effect>) {
        (
            vec![Event::BlockGroupRunCompleted {
                block_group_run_id: bgr.id,
                branch_taken,
                output,
                at_ms: self.now_ms(),
            }],
            vec![Effect::RetickRun { run_id: bgr.run_id }],
        )
    }

    fn fail_group_run(&self, run: &Run, bgr: &BlockGroupRun) -> (Vec<Event>, Vec<Effect>) {
        (
            vec![Event::RunFailed {
                run_id: run.id,
                error: format!("block group {} failed", bgr.block_group_id),
                at_ms: self.now_ms(),
            }],
            vec![],
        )
    }

    fn iterate_loop(&self, run: &Run, bgr: &BlockGroupRun, next_iteration: u32, entry: &[&Step], ctx: &VarContext) -> (Vec<Event>, Vec<Effect>) {
        let mut events = vec![Event::BlockGroupRunIterated {
            block_group_run_id: bgr.id,
            iteration_count: next_iteration,
            at_ms: self.now_ms(),
        }];
        let mut effects = Vec::with_capacity(entry.len());
        for step in entry {
            let step_run_id = StepRunId::new();
            events.push(Event::StepRunCreated {
                step_run_id,
                run_id: run.id,
                step_id: step.id,
                step_name: step.name.clone(),
                // The loop-body member's attempt number doubles as its
                // iteration number: `latest_attempt_per_step` always picks
                // the highest attempt, so the fresh one naturally
                // supersedes the prior iteration's completed run.
                attempt: next_iteration + 1,
                input: ctx.as_value().clone(),
                at_ms: self.now_ms(),
            });
            effects.push(Effect::DispatchStep {
                step_run_id,
                run_id: run.id,
                step_id: step.id,
                input: ctx.as_value().clone(),
            });
        }
        (events, effects)
    }

    /// Creates the next attempt for a step whose previous attempt failed
    /// and whose `ScheduleRetry` delay has now elapsed. Separate from the
    /// graph-readiness path in `tick`: a step that already has a failed
    /// attempt on record is deliberately excluded from `ready_steps` (it
    /// is not "newly ready" via an edge), so a retry must be driven
    /// explicitly by whoever honors the `ScheduleRetry` effect.
    pub fn retry_step(&self, run_id: RunId, step_id: StepId, step_name: String, attempt: u32, input: serde_json::Value) -> (Vec<Event>, Vec<Effect>) {
        let step_run_id = StepRunId::new();
        (
            vec![Event::StepRunCreated {
                step_run_id,
                run_id,
                step_id,
                step_name,
                attempt,
                input: input.clone(),
                at_ms: self.now_ms(),
            }],
            vec![Effect::DispatchStep {
                step_run_id,
                run_id,
                step_id,
                input,
            }],
        )
    }

    pub fn complete_step(&self, run_id: RunId, step_run_id: StepRunId, output: serde_json::Value, duration_ms: i64) -> (Vec<Event>, Vec<Effect>) {
        (
            vec![Event::StepRunCompleted {
                step_run_id,
                output,
                duration_ms,
                at_ms: self.now_ms(),
            }],
            vec![Effect::RetickRun { run_id }],
        )
    }

    /// Applies a step failure against its retry policy and `on_error`
    /// routing (§4.3.6). `RouteToPort` turns the failure into a terminal
    /// `Completed` run carrying `{"port": ..}` so a downstream edge on
    /// that port can be satisfied — `edge_satisfied` only ever looks at
    /// `Completed` step-runs, so a routed failure must present as one.
    pub fn fail_step(
        &self,
        step: &Step,
        run_id: RunId,
        step_run_id: StepRunId,
        attempt: u32,
        error: &ErrorKind,
    ) -> (Vec<Event>, Vec<Effect>) {
        let policy = RetryPolicy::from_step_config(&step.config);

        if error.is_retriable() && policy.should_retry(attempt) {
            let delay = policy.delay_for(attempt + 1);
            let events = vec![Event::StepRunFailed {
                step_run_id,
                error: error.to_string(),
                error_code: error.code().to_string(),
                at_ms: self.now_ms(),
            }];
            return (events, vec![Effect::ScheduleRetry { run_id, step_id: step.id, delay: clamp_nonzero(delay) }]);
        }

        match policy.on_error {
            OnError::FailRun => (
                vec![
                    Event::StepRunFailed {
                        step_run_id,
                        error: error.to_string(),
                        error_code: error.code().to_string(),
                        at_ms: self.now_ms(),
                    },
                    Event::RunFailed {
                        run_id,
                        error: error.to_string(),
                        at_ms: self.now_ms(),
                    },
                ],
                vec![],
            ),
            OnError::Continue => (
                vec![Event::StepRunFailed {
                    step_run_id,
                    error: error.to_string(),
                    error_code: error.code().to_string(),
                    at_ms: self.now_ms(),
                }],
                vec![Effect::RetickRun { run_id }],
            ),
            OnError::RouteToPort { port } => (
                vec![Event::StepRunCompleted {
                    step_run_id,
                    output: serde_json::json!({
                        "port": port,
                        "error": error.to_string(),
                        "error_code": error.code().to_string(),
                    }),
                    duration_ms: 0,
                    at_ms: self.now_ms(),
                }],
                vec![Effect::RetickRun { run_id }],
            ),
        }
    }

    pub fn cancel_run(&self, run: &Run, in_flight: &[StepRunId]) -> (Vec<Event>, Vec<Effect>) {
        let mut events = vec![Event::RunCancelled {
            run_id: run.id,
            at_ms: self.now_ms(),
        }];
        for &step_run_id in in_flight {
            events.push(Event::StepRunCancelled {
                step_run_id,
                at_ms: self.now_ms(),
            });
        }
        (events, vec![Effect::PropagateCancel { run_id: run.id }])
    }

    pub fn suspend_run(&self, run_id: RunId, correlation_token: String) -> (Vec<Event>, Vec<Effect>) {
        (
            vec![Event::RunWaiting {
                run_id,
                correlation_token,
                at_ms: self.now_ms(),
            }],
            vec![],
        )
    }

    pub fn resume_run(&self, run_id: RunId, payload: serde_json::Value) -> (Vec<Event>, Vec<Effect>) {
        (
            vec![Event::RunResumed {
                run_id,
                payload,
                at_ms: self.now_ms(),
            }],
            vec![Effect::RetickRun { run_id }],
        )
    }
}

fn clamp_nonzero(delay: Duration) -> Duration {
    if delay.is_zero() {
        Duration::from_millis(1)
    } else {
        delay
    }
}

/// A run is done once every top-level step (outside any block group) has
/// reached a terminal `StepRun` status, and every top-level block group
/// has itself reached a terminal `BlockGroupRun` status (§4.3.7). Nested
/// groups are not checked directly: a top-level group only completes once
/// its own members — including any of its nested groups' exit steps —
/// have settled, so checking the top level transitively covers them.
fn run_is_done(version: &ProjectVersion, step_runs: &[StepRun], block_group_runs: &[BlockGroupRun]) -> bool {
    if step_runs.is_empty() && block_group_runs.is_empty() {
        return false;
    }
    let top_level: std::collections::HashSet<StepId> = version
        .steps
        .iter()
        .filter(|s| s.block_group_id.is_none())
        .map(|s| s.id)
        .collect();
    let top_level_groups: std::collections::HashSet<_> = version
        .block_groups
        .iter()
        .filter(|g| g.parent_group_id.is_none())
        .map(|g| g.id)
        .collect();
    if top_level.is_empty() && top_level_groups.is_empty() {
        return false;
    }

    let latest = graph::latest_attempt_per_step(step_runs);
    let steps_done = top_level.iter().all(|id| latest.get(id).is_some_and(|sr| sr.status.is_terminal()));
    let groups_done = top_level_groups.iter().all(|group_id| {
        block_group_runs
            .iter()
            .find(|g| g.block_group_id == *group_id)
            .is_some_and(|g| g.status.is_terminal())
    });
    steps_done && groups_done
}

fn final_output(step_runs: &[StepRun]) -> serde_json::Value {
    step_runs
        .iter()
        .filter(|sr| sr.status == StepRunStatus::Completed)
        .max_by_key(|sr| sr.completed_at)
        .and_then(|sr| sr.output.clone())
        .unwrap_or(serde_json::Value::Null)
}

fn member_statuses(latest_by_step: &HashMap<StepId, &StepRun>, members: &[&Step]) -> Vec<StepRunStatus> {
    members.iter().map(|s| latest_by_step.get(&s.id).map(|sr| sr.status).unwrap_or(StepRunStatus::Pending)).collect()
}

fn member_output(latest_by_step: &HashMap<StepId, &StepRun>, members: &[&Step]) -> serde_json::Value {
    members
        .iter()
        .filter_map(|s| latest_by_step.get(&s.id))
        .filter(|sr| sr.status == StepRunStatus::Completed)
        .max_by_key(|sr| sr.attempt)
        .and_then(|sr| sr.output.clone())
        .unwrap_or(serde_json::Value::Null)
}

/// Whether a `loop` group's body runs again: an explicit `times` count
/// takes precedence over a `while` expression evaluated against the
/// current run context; a group with neither runs its body exactly once.
fn loop_should_continue(group: &BlockGroup, ctx: &VarContext, iteration_count: u32) -> bool {
    if let Some(times) = group.config.get("times").and_then(serde_json::Value::as_u64) {
        return (iteration_count as u64) < times;
    }
    let Some(expr) = group.config.get("while").and_then(serde_json::Value::as_str) else {
        return false;
    };
    ctx.get(expr).ok().flatten().map(|v| v.as_bool().unwrap_or(!v.is_null())).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wf_core::id::{ProjectId, ProjectVersionId, RunId, StepId, TenantId};
    use wf_core::model::project::{StepType, TriggerType};
    use wf_core::model::run::TriggeredBy;
    use wf_core::FakeClock;

    fn start_step() -> Step {
        Step {
            id: StepId::new(),
            tenant_id: TenantId::new(),
            project_id: ProjectId::new(),
            name: "start".into(),
            step_type: StepType::Start,
            config: serde_json::Value::Null,
            trigger_type: Some(TriggerType::Manual),
            trigger_config: None,
            block_group_id: None,
            group_role: None,
            block_definition_id: None,
            credential_bindings: serde_json::Value::Null,
            tool_name: None,
            tool_description: None,
            tool_input_schema: None,
            position_x: 0.0,
            position_y: 0.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn version_with(steps: Vec<Step>) -> ProjectVersion {
        ProjectVersion {
            id: ProjectVersionId::new(),
            tenant_id: TenantId::new(),
            project_id: ProjectId::new(),
            version: 1,
            name: "p".into(),
            description: None,
            variables: serde_json::Value::Null,
            steps,
            edges: vec![],
            block_groups: vec![],
            published_at: Utc::now(),
            published_by: "tester".into(),
        }
    }

    fn function_step(name: &str) -> Step {
        let mut s = start_step();
        s.id = StepId::new();
        s.name = name.into();
        s.step_type = StepType::Function;
        s.trigger_type = None;
        s
    }

    fn group(group_type: BlockGroupType, config: serde_json::Value) -> BlockGroup {
        BlockGroup {
            id: wf_core::id::BlockGroupId::new(),
            tenant_id: TenantId::new(),
            project_id: ProjectId::new(),
            name: "g".into(),
            group_type,
            parent_group_id: None,
            pre_process: None,
            post_process: None,
            config,
            position_x: 0.0,
            position_y: 0.0,
            width: 0.0,
            height: 0.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn version_with_groups(steps: Vec<Step>, edges: Vec<wf_core::model::project::Edge>, block_groups: Vec<BlockGroup>) -> ProjectVersion {
        let mut version = version_with(steps);
        version.edges = edges;
        version.block_groups = block_groups;
        version
    }

    fn edge_step_to_group(source: StepId, target: wf_core::id::BlockGroupId) -> wf_core::model::project::Edge {
        wf_core::model::project::Edge {
            id: wf_core::id::EdgeId::new(),
            tenant_id: TenantId::new(),
            project_id: ProjectId::new(),
            source_step_id: Some(source),
            target_step_id: None,
            source_block_group_id: None,
            target_block_group_id: Some(target),
            source_port: "default".into(),
            target_port: "default".into(),
            condition: None,
            created_at: Utc::now(),
        }
    }

    fn block_group_run(run_id: RunId, block_group_id: wf_core::id::BlockGroupId, iteration_count: u32) -> BlockGroupRun {
        BlockGroupRun {
            id: BlockGroupRunId::new(),
            tenant_id: TenantId::new(),
            run_id,
            block_group_id,
            status: StepRunStatus::Running,
            iteration_count,
            branch_taken: None,
            output: None,
            started_at: Some(Utc::now()),
            completed_at: None,
        }
    }

    fn run_for(version: &ProjectVersion, start: StepId) -> Run {
        Run {
            id: RunId::new(),
            tenant_id: TenantId::new(),
            project_id: version.project_id,
            project_version: version.version,
            status: RunStatus::Running,
            input: serde_json::Value::Null,
            output: None,
            error: None,
            triggered_by: TriggeredBy::Manual,
            triggered_by_user: None,
            run_number: 1,
            start_step_id: start,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
            trigger_source: None,
            trigger_metadata: None,
            wait_correlation_token: None,
        }
    }

    #[test]
    fn s1_simple_function_run_dispatches_the_start_step() {
        let start = start_step();
        let version = version_with(vec![start.clone()]);
        let run = run_for(&version, start.id);
        let runtime = Runtime::new(FakeClock::new());

        let (events, effects) = runtime.tick(&version, &run, &[], &[], &serde_json::Value::Null).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::StepRunCreated { .. }));
        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0], Effect::DispatchStep { .. }));
    }

    #[test]
    fn run_completes_once_the_only_step_is_done() {
        let start = start_step();
        let version = version_with(vec![start.clone()]);
        let run = run_for(&version, start.id);
        let runtime = Runtime::new(FakeClock::new());

        let mut step_run = StepRun::new(run.tenant_id, run.id, start.id, "start".into(), 1, serde_json::Value::Null, Utc::now());
        step_run.status = StepRunStatus::Completed;
        step_run.output = Some(serde_json::json!({"ok": true}));
        step_run.completed_at = Some(Utc::now());

        let (events, _) = runtime.tick(&version, &run, &[step_run], &[], &serde_json::Value::Null).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Event::RunCompleted { .. }));
    }

    #[test]
    fn s3_retriable_failure_schedules_a_retry() {
        let mut step = start_step();
        step.config = serde_json::json!({"retry": {"max_attempts": 3, "backoff": {"kind": "fixed", "initial_ms": 10}}});
        let run_id = RunId::new();
        let step_run_id = StepRunId::new();
        let runtime = Runtime::new(FakeClock::new());

        let error = ErrorKind::Dependency {
            kind: wf_core::error::DependencyKind::Timeout,
            message: "boom".into(),
        };
        let (events, effects) = runtime.fail_step(&step, run_id, step_run_id, 1, &error);
        assert!(matches!(events[0], Event::StepRunFailed { .. }));
        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0], Effect::ScheduleRetry { .. }));
    }

    #[test]
    fn non_retriable_failure_fails_the_run() {
        let step = start_step();
        let run_id = RunId::new();
        let step_run_id = StepRunId::new();
        let runtime = Runtime::new(FakeClock::new());

        let error = ErrorKind::Validation("bad config".into());
        let (events, effects) = runtime.fail_step(&step, run_id, step_run_id, 1, &error);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], Event::RunFailed { .. }));
        assert!(effects.is_empty());
    }

    #[test]
    fn retry_step_creates_the_next_attempt() {
        let runtime = Runtime::new(FakeClock::new());
        let run_id = RunId::new();
        let step_id = StepId::new();

        let (events, effects) = runtime.retry_step(run_id, step_id, "flaky".into(), 2, serde_json::json!({"x": 1}));
        match &events[0] {
            Event::StepRunCreated { attempt, step_id: sid, .. } => {
                assert_eq!(*attempt, 2);
                assert_eq!(*sid, step_id);
            }
            _ => panic!("expected StepRunCreated"),
        }
        assert!(matches!(effects[0], Effect::DispatchStep { .. }));
    }

    #[test]
    fn s5_cancellation_propagates_to_in_flight_steps() {
        let start = start_step();
        let version = version_with(vec![start.clone()]);
        let run = run_for(&version, start.id);
        let runtime = Runtime::new(FakeClock::new());
        let step_run_id = StepRunId::new();

        let (events, effects) = runtime.cancel_run(&run, &[step_run_id]);
        assert!(matches!(events[0], Event::RunCancelled { .. }));
        assert!(matches!(events[1], Event::StepRunCancelled { .. }));
        assert!(matches!(effects[0], Effect::PropagateCancel { .. }));
    }

    #[test]
    fn route_to_port_failure_completes_the_step_on_its_error_port() {
        let mut step = start_step();
        step.config = serde_json::json!({"retry": {"on_error": {"mode": "route_to_port", "port": "error"}}});
        let run_id = RunId::new();
        let step_run_id = StepRunId::new();
        let runtime = Runtime::new(FakeClock::new());

        let error = ErrorKind::Validation("bad input".into());
        let (events, effects) = runtime.fail_step(&step, run_id, step_run_id, 1, &error);
        match &events[0] {
            Event::StepRunCompleted { output, .. } => {
                assert_eq!(output.get("port").and_then(|v| v.as_str()), Some("error"));
            }
            other => panic!("expected StepRunCompleted, got {other:?}"),
        }
        assert!(matches!(effects[0], Effect::RetickRun { .. }));
    }

    #[test]
    fn ready_groups_start_once_their_incoming_edge_is_satisfied() {
        let start = start_step();
        let g = group(BlockGroupType::Sequence, serde_json::Value::Null);
        let version = version_with_groups(vec![start.clone()], vec![edge_step_to_group(start.id, g.id)], vec![g.clone()]);
        let run = run_for(&version, start.id);
        let runtime = Runtime::new(FakeClock::new());

        let mut start_run = StepRun::new(run.tenant_id, run.id, start.id, "start".into(), 1, serde_json::Value::Null, Utc::now());
        start_run.status = StepRunStatus::Completed;
        start_run.output = Some(serde_json::json!({}));

        let (events, effects) = runtime.tick(&version, &run, &[start_run], &[], &serde_json::Value::Null).unwrap();
        assert!(matches!(events[0], Event::BlockGroupRunCreated { .. }));
        assert!(matches!(effects[0], Effect::RetickRun { .. }));
    }

    #[test]
    fn sequence_group_completes_once_every_member_settles() {
        let member = function_step("only-member");
        let mut member_in_group = member.clone();
        let g = group(BlockGroupType::Sequence, serde_json::Value::Null);
        member_in_group.block_group_id = Some(g.id);
        let version = version_with_groups(vec![member_in_group.clone()], vec![], vec![g.clone()]);
        let run = run_for(&version, member_in_group.id);
        let runtime = Runtime::new(FakeClock::new());

        let bgr = block_group_run(run.id, g.id, 0);
        let mut member_run = StepRun::new(run.tenant_id, run.id, member_in_group.id, "only-member".into(), 1, serde_json::Value::Null, Utc::now());
        member_run.status = StepRunStatus::Completed;
        member_run.output = Some(serde_json::json!({"done": true}));

        let (events, effects) = runtime.tick(&version, &run, &[member_run], &[bgr], &serde_json::Value::Null).unwrap();
        assert!(matches!(events[0], Event::BlockGroupRunCompleted { .. }));
        assert!(matches!(effects[0], Effect::RetickRun { .. }));
    }

    #[test]
    fn loop_group_admits_the_next_iteration_while_the_condition_holds() {
        let body = function_step("body");
        let mut body_in_group = body.clone();
        let g = group(BlockGroupType::Loop, serde_json::json!({"times": 3}));
        body_in_group.block_group_id = Some(g.id);
        let version = version_with_groups(vec![body_in_group.clone()], vec![], vec![g.clone()]);
        let run = run_for(&version, body_in_group.id);
        let runtime = Runtime::new(FakeClock::new());

        let bgr = block_group_run(run.id, g.id, 0);
        let mut body_run = StepRun::new(run.tenant_id, run.id, body_in_group.id, "body".into(), 1, serde_json::Value::Null, Utc::now());
        body_run.status = StepRunStatus::Completed;
        body_run.output = Some(serde_json::json!({}));

        let (events, effects) = runtime.tick(&version, &run, &[body_run], &[bgr], &serde_json::Value::Null).unwrap();
        match &events[0] {
            Event::BlockGroupRunIterated { iteration_count, .. } => assert_eq!(*iteration_count, 1),
            other => panic!("expected BlockGroupRunIterated, got {other:?}"),
        }
        match &events[1] {
            Event::StepRunCreated { attempt, .. } => assert_eq!(*attempt, 2),
            other => panic!("expected StepRunCreated, got {other:?}"),
        }
        assert!(matches!(effects[0], Effect::DispatchStep { .. }));
    }

    #[test]
    fn loop_group_completes_once_its_times_budget_is_spent() {
        let body = function_step("body");
        let mut body_in_group = body.clone();
        let g = group(BlockGroupType::Loop, serde_json::json!({"times": 1}));
        body_in_group.block_group_id = Some(g.id);
        let version = version_with_groups(vec![body_in_group.clone()], vec![], vec![g.clone()]);
        let run = run_for(&version, body_in_group.id);
        let runtime = Runtime::new(FakeClock::new());

        let bgr = block_group_run(run.id, g.id, 1);
        let mut body_run = StepRun::new(run.tenant_id, run.id, body_in_group.id, "body".into(), 2, serde_json::Value::Null, Utc::now());
        body_run.status = StepRunStatus::Completed;
        body_run.output = Some(serde_json::json!({}));

        let (events, _) = runtime.tick(&version, &run, &[body_run], &[bgr], &serde_json::Value::Null).unwrap();
        assert!(matches!(events[0], Event::BlockGroupRunCompleted { .. }));
    }
}
