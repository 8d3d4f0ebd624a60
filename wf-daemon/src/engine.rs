// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Drives a single run's tick loop to completion (or the next genuine
//! block), folding events through the WAL/state and honoring the effects
//! a tick produces by dispatching steps to `StepExecutor` and scheduling
//! retries. One `drive` call is spawned per run that needs attention;
//! a run with nothing left to do returns immediately rather than
//! polling, matching the teacher's event-driven (not poll-driven)
//! engine loop.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use wf_adapters::StepContext;
use wf_core::effect::Effect;
use wf_core::event::Event;
use wf_core::id::{AgentMemoryId, BlockDefinitionId, RunId, StepId, StepRunId};
use wf_core::error::ErrorKind;
use wf_core::model::block::BlockDefinition;
use wf_core::model::project::{ProjectVersion, Step, StepType};
use wf_core::model::run::{AgentMemory, BlockGroupRun, Run, StepRun};
use wf_core::Clock;
use wf_engine::runtime::group;
use wf_engine::{Runtime, StepExecutor};
use wf_storage::state::MaterializedState;
use wf_storage::wal::Wal;

pub struct Engine<C: Clock> {
    pub state: Arc<Mutex<MaterializedState>>,
    pub wal: Arc<Wal>,
    pub runtime: Runtime<C>,
    pub executor: Arc<StepExecutor>,
    pub clock: C,
    pub default_timeout: Duration,
}

impl<C: Clock> Engine<C> {
    pub fn new(state: Arc<Mutex<MaterializedState>>, wal: Arc<Wal>, clock: C, executor: Arc<StepExecutor>, default_timeout: Duration) -> Self {
        Self {
            state,
            wal,
            runtime: Runtime::new(clock.clone()),
            executor,
            clock,
            default_timeout,
        }
    }

    /// Drives `run_id` forward until a tick produces no more effects. Safe
    /// to call concurrently for the same run — at most one dispatch ever
    /// advances a given step run, since `tick` only creates a
    /// `StepRunCreated` for a step with no prior attempt, and subsequent
    /// ticks for the same run observe that attempt already on record.
    pub fn drive(self: &Arc<Self>, run_id: RunId) {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.drive_inner(run_id).await });
    }

    /// Drives `run_id` to quiescence on the caller's own task instead of
    /// spawning. `drive` is what production code should call; this is
    /// exposed for callers (tests, the listener's synchronous commands)
    /// that need to observe the run's state once the tick loop settles.
    pub async fn drive_inner(self: &Arc<Self>, run_id: RunId) {
        loop {
            let Some((version, run, step_runs, block_group_runs, vars)) = self.snapshot(run_id) else {
                return;
            };
            let (events, effects) = match self.runtime.tick(&version, &run, &step_runs, &block_group_runs, &vars) {
                Ok(result) => result,
                Err(err) => {
                    tracing::error!(%run_id, %err, "tick failed, run is stuck in its published graph");
                    return;
                }
            };
            self.append_and_apply(&events);

            if effects.is_empty() {
                return;
            }

            let mut should_retick = false;
            for effect in effects {
                match effect {
                    Effect::DispatchStep {
                        step_run_id,
                        run_id,
                        step_id,
                        input,
                    } => {
                        self.dispatch(&version, run_id, step_id, step_run_id, input).await;
                        should_retick = true;
                    }
                    Effect::RetickRun { .. } => should_retick = true,
                    Effect::ScheduleRetry { run_id, step_id, delay } => {
                        self.spawn_retry(run_id, step_id, delay);
                    }
                    Effect::PropagateCancel { .. } | Effect::FireSchedule { .. } | Effect::RecordWebhookTrigger { .. } => {}
                    Effect::Log { level, message } => log_effect(level, &message),
                }
            }
            if !should_retick {
                return;
            }
        }
    }

    fn snapshot(&self, run_id: RunId) -> Option<(ProjectVersion, Run, Vec<StepRun>, Vec<BlockGroupRun>, serde_json::Value)> {
        let guard = self.state.lock();
        let run = guard.runs.get(&run_id)?.clone();
        let version = guard
            .project_versions
            .values()
            .find(|v| v.project_id == run.project_id && v.version == run.project_version)?
            .clone();
        let step_runs = guard
            .step_runs_by_run
            .get(&run_id)
            .into_iter()
            .flatten()
            .filter_map(|id| guard.step_runs.get(id).cloned())
            .collect();
        let block_group_runs = guard.block_group_runs.values().filter(|g| g.run_id == run_id).cloned().collect();
        let vars = version_vars(&version);
        Some((version, run, step_runs, block_group_runs, vars))
    }

    fn append_and_apply(&self, events: &[Event]) {
        let mut guard = self.state.lock();
        for event in events {
            match self.wal.append(event.clone()) {
                Ok(seq) => guard.apply_event(seq, event),
                Err(err) => tracing::error!(%err, "failed to append event to wal"),
            }
        }
    }

    async fn dispatch(self: &Arc<Self>, version: &ProjectVersion, run_id: RunId, step_id: StepId, step_run_id: StepRunId, input: serde_json::Value) {
        let Some(step) = version.steps.iter().find(|s| s.id == step_id).cloned() else {
            tracing::error!(%step_id, "dispatched step not found in its own published version");
            return;
        };
        let attempt = {
            let guard = self.state.lock();
            guard.step_runs.get(&step_run_id).map(|sr| sr.attempt).unwrap_or(1)
        };

        let ctx = StepContext {
            config: step.config.clone(),
            input,
            credentials: serde_json::Value::Null,
            timeout: self.default_timeout,
        };

        let block_lookup = |id: &BlockDefinitionId| self.state.lock().block_definitions.get(id).cloned();
        let result = if step.step_type == StepType::Agent {
            self.dispatch_agent_step(version, &step, run_id, ctx, &block_lookup).await
        } else {
            self.executor.execute(&step, ctx, &block_lookup).await
        };
        let (events, effects) = match result {
            Ok(output) => {
                let duration_ms = 0;
                self.runtime.complete_step(run_id, step_run_id, output, duration_ms)
            }
            Err(err) => self.runtime.fail_step(&step, run_id, step_run_id, attempt, &err),
        };
        self.append_and_apply(&events);
        for effect in effects {
            if let Effect::RetickRun { run_id } = effect {
                // A completion/failure always wants another look at the
                // graph; defer that to the caller's own loop by re-ticking
                // immediately instead of spawning a second task.
                self.retick_now(run_id).await;
            }
        }
    }

    /// Drives an `agent` step's tool-call loop (§9 "agent turn"): each
    /// turn calls the configured LLM over the step's accumulated
    /// `agent_memory`, dispatches any `tool_calls` it returns as genuine
    /// child step-runs against the `tool` steps sharing its block group,
    /// and appends every turn to `agent_memory` with a strictly
    /// increasing `sequence_number`. Ends the moment a turn makes no
    /// tool call; fails with `AGENT_STALLED` once `max_iterations` turns
    /// pass without settling.
    async fn dispatch_agent_step(
        &self,
        version: &ProjectVersion,
        step: &Step,
        run_id: RunId,
        ctx: StepContext,
        block_lookup: &(dyn Fn(&BlockDefinitionId) -> Option<BlockDefinition> + Send + Sync),
    ) -> Result<serde_json::Value, ErrorKind> {
        let tool_steps: Vec<Step> = version
            .steps
            .iter()
            .filter(|s| s.step_type == StepType::Tool && step.block_group_id.is_some() && s.block_group_id == step.block_group_id)
            .cloned()
            .collect();

        if self.agent_memory(run_id, step.id).is_empty() {
            self.append_agent_memory(run_id, step.id, "user", content_to_text(&ctx.input));
        }

        let max_iterations = step.config.get("max_iterations").and_then(serde_json::Value::as_u64).map(|v| v as u32);
        let mut iteration: u32 = 0;

        loop {
            let mut config = step.config.clone();
            set_config_field(&mut config, "messages", self.agent_messages(run_id, step.id));
            let tools = tool_schema(&tool_steps);
            if !tools.is_empty() {
                set_config_field(&mut config, "tools", serde_json::Value::Array(tools));
            }

            let turn_ctx = StepContext {
                config,
                input: ctx.input.clone(),
                credentials: ctx.credentials.clone(),
                timeout: ctx.timeout,
            };
            let completion = self.executor.agent.dispatch(turn_ctx).await?;
            let content = completion.get("content").cloned().unwrap_or(serde_json::Value::Null);
            let tool_calls: Vec<serde_json::Value> = completion
                .get("tool_calls")
                .and_then(serde_json::Value::as_array)
                .cloned()
                .unwrap_or_default();

            self.append_agent_memory(run_id, step.id, "assistant", content_to_text(&content));

            if tool_calls.is_empty() {
                return Ok(content);
            }
            if let Err(err) = group::should_continue_agent_turn(iteration, max_iterations, true) {
                return Err(ErrorKind::Dependency {
                    kind: wf_core::error::DependencyKind::BadStatus,
                    message: err.to_string(),
                });
            }

            for call in &tool_calls {
                let name = call.get("name").and_then(serde_json::Value::as_str).unwrap_or_default();
                let arguments = call.get("arguments").cloned().unwrap_or(serde_json::Value::Null);

                let outcome = match tool_steps.iter().find(|t| t.tool_name.as_deref() == Some(name)) {
                    Some(tool_step) => self.dispatch_child_tool_step(tool_step, run_id, arguments, block_lookup).await,
                    None => Err(ErrorKind::Validation(format!("agent requested unknown tool '{name}'"))),
                };
                let content = match outcome {
                    Ok(output) => output.to_string(),
                    Err(err) => serde_json::json!({"error": err.to_string()}).to_string(),
                };
                self.append_agent_memory(run_id, step.id, "tool", content);
            }

            iteration += 1;
        }
    }

    /// Dispatches one agent tool call as its own child step-run: a real
    /// `StepRunCreated`/`StepRunCompleted`/`StepRunFailed` sequence
    /// against the matching `tool` step, keyed by its own next `attempt`
    /// the same way a retried top-level step would be.
    async fn dispatch_child_tool_step(
        &self,
        tool_step: &Step,
        run_id: RunId,
        arguments: serde_json::Value,
        block_lookup: &(dyn Fn(&BlockDefinitionId) -> Option<BlockDefinition> + Send + Sync),
    ) -> Result<serde_json::Value, ErrorKind> {
        let attempt = {
            let guard = self.state.lock();
            guard
                .step_runs_by_run
                .get(&run_id)
                .into_iter()
                .flatten()
                .filter_map(|id| guard.step_runs.get(id))
                .filter(|sr| sr.step_id == tool_step.id)
                .map(|sr| sr.attempt)
                .max()
                .unwrap_or(0)
                + 1
        };
        let step_run_id = StepRunId::new();
        let created = Event::StepRunCreated {
            step_run_id,
            run_id,
            step_id: tool_step.id,
            step_name: tool_step.name.clone(),
            attempt,
            input: arguments.clone(),
            at_ms: self.clock.epoch_ms(),
        };
        self.append_and_apply(std::slice::from_ref(&created));

        let tool_ctx = StepContext {
            config: tool_step.config.clone(),
            input: arguments,
            credentials: serde_json::Value::Null,
            timeout: self.default_timeout,
        };
        let result = self.executor.execute(tool_step, tool_ctx, block_lookup).await;
        let completion_event = match &result {
            Ok(output) => Event::StepRunCompleted {
                step_run_id,
                output: output.clone(),
                duration_ms: 0,
                at_ms: self.clock.epoch_ms(),
            },
            Err(err) => Event::StepRunFailed {
                step_run_id,
                error: err.to_string(),
                error_code: err.code().to_string(),
                at_ms: self.clock.epoch_ms(),
            },
        };
        self.append_and_apply(std::slice::from_ref(&completion_event));
        result
    }

    fn agent_memory(&self, run_id: RunId, step_id: StepId) -> Vec<AgentMemory> {
        self.state.lock().agent_memory.get(&(run_id, step_id)).cloned().unwrap_or_default()
    }

    fn agent_messages(&self, run_id: RunId, step_id: StepId) -> serde_json::Value {
        serde_json::Value::Array(
            self.agent_memory(run_id, step_id)
                .into_iter()
                .map(|m| serde_json::json!({"role": m.role, "content": m.content}))
                .collect(),
        )
    }

    fn append_agent_memory(&self, run_id: RunId, step_id: StepId, role: &str, content: String) {
        let sequence_number = self.state.lock().next_agent_sequence(run_id, step_id);
        let event = Event::AgentMemoryAppended {
            id: AgentMemoryId::new(),
            run_id,
            step_id,
            role: role.to_string(),
            content,
            sequence_number,
            at_ms: self.clock.epoch_ms(),
        };
        self.append_and_apply(std::slice::from_ref(&event));
    }

    async fn retick_now(self: &Arc<Self>, run_id: RunId) {
        // Boxed recursion avoided by re-entering the loop body directly.
        Box::pin(self.drive_inner(run_id)).await;
    }

    fn spawn_retry(self: &Arc<Self>, run_id: RunId, step_id: StepId, delay: Duration) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.fire_retry(run_id, step_id).await;
        });
    }

    async fn fire_retry(self: &Arc<Self>, run_id: RunId, step_id: StepId) {
        let Some((version, _run, step_runs, _block_group_runs, _vars)) = self.snapshot(run_id) else {
            return;
        };
        let Some(step) = version.steps.iter().find(|s: &&Step| s.id == step_id) else {
            return;
        };
        let Some(last) = step_runs.iter().filter(|sr| sr.step_id == step_id).max_by_key(|sr| sr.attempt) else {
            return;
        };
        let (events, _effects) = self.runtime.retry_step(run_id, step_id, step.name.clone(), last.attempt + 1, last.input.clone());
        self.append_and_apply(&events);
        self.drive_inner(run_id).await;
    }
}

fn version_vars(version: &ProjectVersion) -> serde_json::Value {
    version.variables.clone()
}

/// Renders a turn's content as plain text for `agent_memory.content`
/// (a bare string column): pass strings through as-is, serialize
/// anything else.
fn content_to_text(content: &serde_json::Value) -> String {
    content.as_str().map(str::to_string).unwrap_or_else(|| content.to_string())
}

fn set_config_field(config: &mut serde_json::Value, key: &str, value: serde_json::Value) {
    if !config.is_object() {
        *config = serde_json::Value::Object(Default::default());
    }
    config.as_object_mut().expect("just normalized to an object").insert(key.to_string(), value);
}

/// Builds the `tools` array an agent turn advertises to its LLM from the
/// `tool` steps sharing its block group.
fn tool_schema(tool_steps: &[Step]) -> Vec<serde_json::Value> {
    tool_steps
        .iter()
        .filter_map(|s| {
            let name = s.tool_name.clone()?;
            Some(serde_json::json!({
                "name": name,
                "description": s.tool_description.clone().unwrap_or_default(),
                "input_schema": s.tool_input_schema.clone().unwrap_or(serde_json::Value::Null),
            }))
        })
        .collect()
}

fn log_effect(level: wf_core::effect::LogLevel, message: &str) {
    match level {
        wf_core::effect::LogLevel::Info => tracing::info!("{message}"),
        wf_core::effect::LogLevel::Warn => tracing::warn!("{message}"),
        wf_core::effect::LogLevel::Error => tracing::error!("{message}"),
    }
}
