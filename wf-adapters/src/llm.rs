// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adapter for `llm`/`llm-structured` steps (§4.4, §6). The structured
//! variant validates the response against the step's `response_schema`
//! (`STRUCTURED_OUTPUT_INVALID` on failure).

use crate::exec::{with_timeout, ExecAdapter, StepContext};
use async_trait::async_trait;
use serde_json::Value;
use wf_core::error::ErrorKind;

#[derive(Debug, Clone)]
pub struct LlmUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct LlmCompletion {
    pub content: Value,
    pub tool_calls: Option<Value>,
    pub usage: LlmUsage,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        provider: &str,
        model: &str,
        messages: Value,
        tools: Option<Value>,
        response_schema: Option<Value>,
    ) -> Result<LlmCompletion, ErrorKind>;
}

pub struct LlmAdapter<C: LlmClient> {
    client: C,
    structured: bool,
}

impl<C: LlmClient> LlmAdapter<C> {
    pub fn new(client: C, structured: bool) -> Self {
        Self { client, structured }
    }
}

#[async_trait]
impl<C: LlmClient> ExecAdapter for LlmAdapter<C> {
    async fn dispatch(&self, ctx: StepContext) -> Result<Value, ErrorKind> {
        let provider = ctx
            .config
            .get("provider")
            .and_then(Value::as_str)
            .unwrap_or("default");
        let model = ctx
            .config
            .get("model")
            .and_then(Value::as_str)
            .ok_or_else(|| ErrorKind::Validation("llm step requires config.model".into()))?;
        let messages = ctx
            .config
            .get("messages")
            .cloned()
            .unwrap_or_else(|| ctx.input.clone());
        let tools = ctx.config.get("tools").cloned();
        let schema = ctx.config.get("response_schema").cloned();

        let completion = with_timeout(
            ctx.timeout,
            self.client.complete(provider, model, messages, tools, schema.clone()),
        )
        .await?;

        if self.structured {
            if let Some(schema) = schema {
                let compiled = jsonschema::validator_for(&schema)
                    .map_err(|e| ErrorKind::Validation(e.to_string()))?;
                if let Err(first) = compiled.validate(&completion.content) {
                    return Err(ErrorKind::Dependency {
                        kind: wf_core::error::DependencyKind::BadStatus,
                        message: format!("STRUCTURED_OUTPUT_INVALID: {first}"),
                    });
                }
            }
        }

        Ok(serde_json::json!({
            "content": completion.content,
            "tool_calls": completion.tool_calls,
            "usage": {
                "input_tokens": completion.usage.input_tokens,
                "output_tokens": completion.usage.output_tokens,
            },
        }))
    }
}
