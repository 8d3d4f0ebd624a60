// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adapter for `function` steps and user block `code` (§4.4, §6). The
//! sandbox itself is an external collaborator; this module only owns the
//! client contract and the error mapping (`SANDBOX_TIMEOUT`,
//! `SANDBOX_ERROR`).

use crate::exec::{with_timeout, ExecAdapter, StepContext};
use async_trait::async_trait;
use serde_json::Value;
use wf_core::error::ErrorKind;

#[async_trait]
pub trait SandboxClient: Send + Sync {
    async fn execute(&self, code: &str, input: Value, env: Value, memory_mb: u32) -> Result<Value, ErrorKind>;
}

pub struct SandboxAdapter<C: SandboxClient> {
    client: C,
}

impl<C: SandboxClient> SandboxAdapter<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: SandboxClient> ExecAdapter for SandboxAdapter<C> {
    async fn dispatch(&self, ctx: StepContext) -> Result<Value, ErrorKind> {
        let code = ctx
            .config
            .get("code")
            .and_then(Value::as_str)
            .ok_or_else(|| ErrorKind::Validation("function step requires config.code".into()))?;
        let memory_mb = ctx
            .config
            .get("memory_mb")
            .and_then(Value::as_u64)
            .unwrap_or(128) as u32;
        let env = serde_json::json!({
            "variables": ctx.input,
            "credentials": ctx.credentials,
        });
        with_timeout(ctx.timeout, self.client.execute(code, ctx.input.clone(), env, memory_mb)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct EchoSandbox;

    #[async_trait]
    impl SandboxClient for EchoSandbox {
        async fn execute(&self, _code: &str, input: Value, _env: Value, _memory_mb: u32) -> Result<Value, ErrorKind> {
            Ok(input)
        }
    }

    #[tokio::test]
    async fn dispatch_requires_code_in_config() {
        let adapter = SandboxAdapter::new(EchoSandbox);
        let ctx = StepContext {
            config: serde_json::json!({}),
            input: Value::Null,
            credentials: Value::Null,
            timeout: Duration::from_secs(1),
        };
        assert!(adapter.dispatch(ctx).await.is_err());
    }

    #[tokio::test]
    async fn dispatch_forwards_input_through_the_client() {
        let adapter = SandboxAdapter::new(EchoSandbox);
        let ctx = StepContext {
            config: serde_json::json!({"code": "return input"}),
            input: serde_json::json!({"msg": "hi"}),
            credentials: Value::Null,
            timeout: Duration::from_secs(1),
        };
        let output = adapter.dispatch(ctx).await.unwrap();
        assert_eq!(output, serde_json::json!({"msg": "hi"}));
    }
}
