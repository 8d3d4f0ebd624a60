// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Variable and data context (§4.3.5). A fresh view is snapshotted for
//! every step dispatch: `run.input` under `$.input`, completed step
//! outputs under `$.steps.<name>.output`, project/draft variables under
//! `$.vars`, and (inside a block group) the group's own scope under
//! `$.group`.

use serde_json::{Map, Value};
use serde_json_path::JsonPath;
use wf_core::model::{Run, StepRun};

#[derive(Debug, Clone, Default)]
pub struct VarContext {
    root: Value,
}

impl VarContext {
    /// Wraps an already-shaped root value (used by the executor when
    /// evaluating an in-process expression against a single step's input
    /// rather than a full run snapshot).
    pub fn from_raw(root: Value) -> Self {
        Self { root }
    }

    pub fn build(run: &Run, vars: &Value, step_outputs: &[(&str, &StepRun)], group_scope: Option<&Value>) -> Self {
        let mut steps = Map::new();
        for (name, step_run) in step_outputs {
            let mut entry = Map::new();
            entry.insert("output".into(), step_run.output.clone().unwrap_or(Value::Null));
            entry.insert("status".into(), Value::String(step_run.status.to_string()));
            steps.insert((*name).to_string(), Value::Object(entry));
        }

        let mut root = Map::new();
        root.insert("input".into(), run.input.clone());
        root.insert("steps".into(), Value::Object(steps));
        root.insert("vars".into(), vars.clone());
        root.insert("group".into(), group_scope.cloned().unwrap_or(Value::Null));

        Self {
            root: Value::Object(root),
        }
    }

    /// Evaluates a JSONPath expression against the snapshot, returning the
    /// first match (§4.3.5 addressing is single-valued for step/variable
    /// references).
    pub fn get(&self, expression: &str) -> Result<Option<Value>, VarError> {
        let path = JsonPath::parse(expression).map_err(|e| VarError::InvalidPath(e.to_string()))?;
        Ok(path.query(&self.root).exactly_one().ok().cloned())
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Applies an `output_mapping` (JSONPath-per-field) against a raw
    /// response body, producing the shaped step output (§4.4 http/llm).
    pub fn map_output(
        body: &Value,
        mapping: &std::collections::BTreeMap<String, String>,
    ) -> Result<Value, VarError> {
        let mut out = Map::new();
        for (field, expression) in mapping {
            let path = JsonPath::parse(expression).map_err(|e| VarError::InvalidPath(e.to_string()))?;
            let value = path.query(body).exactly_one().ok().cloned().unwrap_or(Value::Null);
            out.insert(field.clone(), value);
        }
        Ok(Value::Object(out))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VarError {
    #[error("invalid JSONPath expression: {0}")]
    InvalidPath(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wf_core::id::{ProjectId, RunId, StepId, StepRunId, TenantId};
    use wf_core::model::{RunStatus, StepRunStatus, TriggeredBy};

    fn sample_run() -> Run {
        Run {
            id: RunId::new(),
            tenant_id: TenantId::new(),
            project_id: ProjectId::new(),
            project_version: 1,
            status: RunStatus::Running,
            input: serde_json::json!({"name": "ada"}),
            output: None,
            error: None,
            triggered_by: TriggeredBy::Manual,
            triggered_by_user: None,
            run_number: 1,
            start_step_id: StepId::new(),
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
            trigger_source: None,
            trigger_metadata: None,
            wait_correlation_token: None,
        }
    }

    #[test]
    fn resolves_step_output_by_name() {
        let run = sample_run();
        let mut step_run = StepRun::new(
            run.tenant_id,
            run.id,
            StepId::new(),
            "fetch".into(),
            1,
            Value::Null,
            Utc::now(),
        );
        step_run.status = StepRunStatus::Completed;
        step_run.output = Some(serde_json::json!({"id": 42}));

        let ctx = VarContext::build(&run, &Value::Null, &[("fetch", &step_run)], None);
        let resolved = ctx.get("$.steps.fetch.output.id").unwrap().unwrap();
        assert_eq!(resolved, serde_json::json!(42));
    }

    #[test]
    fn resolves_run_input() {
        let run = sample_run();
        let ctx = VarContext::build(&run, &Value::Null, &[], None);
        assert_eq!(ctx.get("$.input.name").unwrap().unwrap(), serde_json::json!("ada"));
    }

    #[test]
    fn output_mapping_projects_fields_by_path() {
        let body = serde_json::json!({"data": {"id": 7, "name": "x"}});
        let mut mapping = std::collections::BTreeMap::new();
        mapping.insert("id".to_string(), "$.data.id".to_string());
        let mapped = VarContext::map_output(&body, &mapping).unwrap();
        assert_eq!(mapped["id"], serde_json::json!(7));
    }
}
