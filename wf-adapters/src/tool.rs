// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adapter for `tool` steps: a generic lookup by `config.adapter_id`,
//! registered into a small in-process table (e.g. `mock` in tests).

use crate::exec::{ExecAdapter, StepContext};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use wf_core::error::ErrorKind;

pub struct ToolAdapter {
    registry: HashMap<String, Arc<dyn ExecAdapter>>,
}

impl ToolAdapter {
    pub fn new() -> Self {
        Self {
            registry: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter_id: impl Into<String>, adapter: Arc<dyn ExecAdapter>) {
        self.registry.insert(adapter_id.into(), adapter);
    }
}

impl Default for ToolAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecAdapter for ToolAdapter {
    async fn dispatch(&self, ctx: StepContext) -> Result<Value, ErrorKind> {
        let adapter_id = ctx
            .config
            .get("adapter_id")
            .and_then(Value::as_str)
            .ok_or_else(|| ErrorKind::Validation("tool step requires config.adapter_id".into()))?;
        let adapter = self
            .registry
            .get(adapter_id)
            .ok_or_else(|| ErrorKind::not_found(format!("tool adapter {adapter_id}")))?;
        adapter.dispatch(ctx).await
    }
}

/// A deterministic adapter used by tests and by `tool` steps configured
/// with `adapter_id: "mock"`.
pub struct MockAdapter {
    pub output: Value,
}

#[async_trait]
impl ExecAdapter for MockAdapter {
    async fn dispatch(&self, _ctx: StepContext) -> Result<Value, ErrorKind> {
        Ok(self.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn routes_to_the_registered_adapter() {
        let mut registry = ToolAdapter::new();
        registry.register(
            "mock",
            Arc::new(MockAdapter {
                output: serde_json::json!({"ok": true}),
            }),
        );
        let ctx = StepContext {
            config: serde_json::json!({"adapter_id": "mock"}),
            input: Value::Null,
            credentials: Value::Null,
            timeout: Duration::from_secs(1),
        };
        let output = registry.dispatch(ctx).await.unwrap();
        assert_eq!(output, serde_json::json!({"ok": true}));
    }

    #[tokio::test]
    async fn unknown_adapter_id_is_not_found() {
        let registry = ToolAdapter::new();
        let ctx = StepContext {
            config: serde_json::json!({"adapter_id": "missing"}),
            input: Value::Null,
            credentials: Value::Null,
            timeout: Duration::from_secs(1),
        };
        assert!(registry.dispatch(ctx).await.is_err());
    }
}
