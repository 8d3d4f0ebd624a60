// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step executor (§4.4): routes a step to its behavior. `start`,
//! `switch`, `condition`, and `set-variables` execute in-process against
//! the snapshotted variable context; `block` resolves its inheritance
//! chain first (§4.2); everything else delegates to a registered
//! `wf_adapters::ExecAdapter`.

use crate::resolver::{self, ResolverCache};
use crate::vars::VarContext;
use serde_json::Value;
use std::sync::Arc;
use wf_adapters::{ExecAdapter, StepContext};
use wf_core::error::ErrorKind;
use wf_core::id::BlockDefinitionId;
use wf_core::model::block::BlockDefinition;
use wf_core::model::project::{Step, StepType};

/// Looks up a `BlockDefinition`'s full inheritance chain by id. Supplied
/// by the daemon, which owns the catalog; kept a bare closure type so
/// this crate never depends on `wf_storage::MaterializedState` directly.
pub type BlockLookup<'a> = &'a (dyn Fn(&BlockDefinitionId) -> Option<BlockDefinition> + Send + Sync);

pub struct StepExecutor {
    pub function: Arc<dyn ExecAdapter>,
    pub http: Arc<dyn ExecAdapter>,
    pub llm: Arc<dyn ExecAdapter>,
    pub llm_structured: Arc<dyn ExecAdapter>,
    pub tool: Arc<dyn ExecAdapter>,
    pub agent: Arc<dyn ExecAdapter>,
    pub resolver_cache: ResolverCache,
}

impl StepExecutor {
    pub async fn execute(&self, step: &Step, ctx: StepContext, block_lookup: BlockLookup<'_>) -> Result<Value, ErrorKind> {
        match step.step_type {
            StepType::Start => Ok(ctx.input),
            StepType::SetVariables => self.set_variables(step, ctx),
            StepType::Switch => self.switch(step, ctx),
            StepType::Condition => self.condition(step, ctx),
            StepType::Function => self.function.dispatch(ctx).await,
            StepType::Block => self.dispatch_block(step, ctx, block_lookup).await,
            StepType::Http => self.http.dispatch(ctx).await,
            StepType::Llm => self.llm.dispatch(ctx).await,
            StepType::LlmStructured => self.llm_structured.dispatch(ctx).await,
            StepType::Tool => self.tool.dispatch(ctx).await,
            StepType::Agent => self.agent.dispatch(ctx).await,
            StepType::Custom => Err(ErrorKind::Validation(format!(
                "step {} has no registered executor for its custom type",
                step.id
            ))),
        }
    }

    /// Resolves the step's `BlockDefinition` inheritance chain (cached by
    /// `(definition_id, version)`), validates `step.config` against the
    /// resolved schema, merges the resolved `config_defaults` under the
    /// step's own config, and dispatches through the same adapter a plain
    /// `function` step uses.
    async fn dispatch_block(&self, step: &Step, ctx: StepContext, block_lookup: BlockLookup<'_>) -> Result<Value, ErrorKind> {
        let definition_id = step
            .block_definition_id
            .ok_or_else(|| ErrorKind::Validation(format!("step {} has type block but no block_definition_id", step.id)))?;
        let definition = block_lookup(&definition_id)
            .ok_or_else(|| ErrorKind::NotFound(format!("block definition {definition_id} not found")))?;

        let resolved = match self.resolver_cache.get(&definition.id.to_string(), definition.version) {
            Some(cached) => cached,
            None => {
                let resolved = resolver::resolve(&definition, block_lookup).map_err(|e| ErrorKind::Validation(e.to_string()))?;
                self.resolver_cache.put(&definition.id.to_string(), definition.version, resolved.clone());
                resolved
            }
        };

        resolver::validate_config(&resolved, &step.config).map_err(|e| ErrorKind::Validation(e.to_string()))?;

        let mut config = resolved.config_defaults.clone();
        merge_config(&mut config, &step.config);

        let merged_ctx = StepContext {
            config,
            input: ctx.input,
            credentials: ctx.credentials,
            timeout: ctx.timeout,
        };
        self.function.dispatch(merged_ctx).await
    }

    fn set_variables(&self, step: &Step, ctx: StepContext) -> Result<Value, ErrorKind> {
        let assignments = step
            .config
            .get("assignments")
            .and_then(Value::as_object)
            .ok_or_else(|| ErrorKind::Validation("set-variables step requires config.assignments".into()))?;

        let path_ctx = path_context(&ctx.input);
        let mut resolved = serde_json::Map::new();
        for (key, expr) in assignments {
            let value = expr
                .as_str()
                .and_then(|e| path_ctx.get(e).ok().flatten())
                .unwrap_or_else(|| expr.clone());
            resolved.insert(key.clone(), value);
        }
        Ok(Value::Object(resolved))
    }

    fn switch(&self, step: &Step, ctx: StepContext) -> Result<Value, ErrorKind> {
        let cases = step
            .config
            .get("cases")
            .and_then(Value::as_array)
            .ok_or_else(|| ErrorKind::Validation("switch step requires config.cases".into()))?;
        let path_ctx = path_context(&ctx.input);

        for case in cases {
            let Some(port) = case.get("port").and_then(Value::as_str) else {
                continue;
            };
            let Some(expr) = case.get("when").and_then(Value::as_str) else {
                continue;
            };
            let truthy = path_ctx
                .get(expr)
                .ok()
                .flatten()
                .map(|v| v.as_bool().unwrap_or(!v.is_null()))
                .unwrap_or(false);
            if truthy {
                return Ok(serde_json::json!({ "port": port }));
            }
        }
        let default_port = step
            .config
            .get("default_port")
            .and_then(Value::as_str)
            .unwrap_or("default");
        Ok(serde_json::json!({ "port": default_port }))
    }

    fn condition(&self, step: &Step, ctx: StepContext) -> Result<Value, ErrorKind> {
        let expr = step
            .config
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| ErrorKind::Validation("condition step requires config.expression".into()))?;
        let path_ctx = path_context(&ctx.input);
        let truthy = path_ctx
            .get(expr)
            .ok()
            .flatten()
            .map(|v| v.as_bool().unwrap_or(!v.is_null()))
            .unwrap_or(false);
        let port = if truthy { "true" } else { "false" };
        Ok(serde_json::json!({ "port": port }))
    }
}

/// Wraps a bare step-input value in a `VarContext`-compatible shape so
/// `$.input`/`$.steps`/`$.vars` addressing still works when the executor
/// evaluates an in-process expression against it.
fn path_context(input: &Value) -> VarContext {
    VarContext::from_raw(serde_json::json!({ "input": input }))
}

/// Shallow-merges `overlay` on top of `base`, overlay wins on key
/// collision — the step's own config always takes precedence over its
/// resolved block's `config_defaults`.
fn merge_config(base: &mut Value, overlay: &Value) {
    let (Some(base_obj), Some(overlay_obj)) = (base.as_object_mut(), overlay.as_object()) else {
        if !overlay.is_null() {
            *base = overlay.clone();
        }
        return;
    };
    for (k, v) in overlay_obj {
        base_obj.insert(k.clone(), v.clone());
    }
}
