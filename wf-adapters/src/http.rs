// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adapter for `http` steps: builds a request from the resolved block's
//! merged `request` config plus the step input, performs it, and captures
//! status/headers/body (§4.4). Errors map to `HTTP_TIMEOUT`/`HTTP_STATUS`.
//!
//! `config.url`/`config.headers`/`config.body` may embed JSONPath
//! expressions (any string starting with `$.`) that are resolved against
//! `{"input": <step input>}` before the request goes out, the same
//! addressing `set-variables`/`switch`/`condition` steps use. A
//! `config.response.output_mapping` (JSONPath-per-field into the raw
//! response body) projects the response the same way §4.3.5 shapes a
//! variable context.

use crate::exec::{with_timeout, ExecAdapter, StepContext};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use serde_json_path::JsonPath;
use std::collections::BTreeMap;
use wf_core::error::{DependencyKind, ErrorKind};

pub struct HttpAdapter {
    client: Client,
}

impl HttpAdapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpAdapter {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

#[async_trait]
impl ExecAdapter for HttpAdapter {
    async fn dispatch(&self, ctx: StepContext) -> Result<Value, ErrorKind> {
        let path_ctx = serde_json::json!({ "input": ctx.input });

        let method = ctx
            .config
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_ascii_uppercase();
        let raw_url = ctx
            .config
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ErrorKind::Validation("http step requires config.url".into()))?;
        let url = resolve_str_template(raw_url, &path_ctx);

        let method: reqwest::Method = method
            .parse()
            .map_err(|_| ErrorKind::Validation(format!("unsupported http method {method}")))?;

        let mut builder = self.client.request(method, url);
        if let Some(headers) = ctx.config.get("headers").and_then(Value::as_object) {
            for (k, v) in headers {
                if let Some(v) = v.as_str() {
                    builder = builder.header(k, resolve_str_template(v, &path_ctx));
                }
            }
        }
        if let Some(body) = ctx.config.get("body") {
            builder = builder.json(&resolve_template(body, &path_ctx));
        }

        let request = builder.build().map_err(|e| ErrorKind::Validation(e.to_string()))?;
        let client = self.client.clone();
        let output_mapping: BTreeMap<String, String> = ctx
            .config
            .get("response")
            .and_then(|r| r.get("output_mapping"))
            .and_then(|m| serde_json::from_value(m.clone()).ok())
            .unwrap_or_default();

        with_timeout(ctx.timeout, async move {
            let response = client.execute(request).await.map_err(|e| {
                if e.is_timeout() {
                    ErrorKind::Dependency {
                        kind: DependencyKind::Timeout,
                        message: e.to_string(),
                    }
                } else {
                    ErrorKind::Dependency {
                        kind: DependencyKind::Unavailable,
                        message: e.to_string(),
                    }
                }
            })?;

            let status = response.status();
            let body: Value = response.json().await.unwrap_or(Value::Null);
            if !status.is_success() {
                return Err(ErrorKind::Dependency {
                    kind: DependencyKind::BadStatus,
                    message: format!("HTTP {status}"),
                });
            }
            let body = if output_mapping.is_empty() {
                body
            } else {
                map_output(&body, &output_mapping)
            };
            Ok(serde_json::json!({ "status": status.as_u16(), "body": body }))
        })
        .await
    }
}

/// Resolves a single config string: a JSONPath expression (anything
/// starting with `$.`) is evaluated against `ctx`, anything else passes
/// through literally. A path with no match, or that resolves to more
/// than one value, falls back to the raw string rather than failing the
/// request.
fn resolve_str_template(raw: &str, ctx: &Value) -> String {
    if !raw.starts_with("$.") {
        return raw.to_string();
    }
    let Ok(path) = JsonPath::parse(raw) else {
        return raw.to_string();
    };
    match path.query(ctx).exactly_one().ok() {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => raw.to_string(),
    }
}

/// Walks a JSON body recursively, resolving any embedded JSONPath-string
/// leaves the same way `resolve_str_template` does, so a templated
/// request body can reference `$.input...` at any depth.
fn resolve_template(value: &Value, ctx: &Value) -> Value {
    match value {
        Value::String(s) if s.starts_with("$.") => {
            let Ok(path) = JsonPath::parse(s) else {
                return value.clone();
            };
            path.query(ctx).exactly_one().ok().cloned().unwrap_or_else(|| value.clone())
        }
        Value::Object(obj) => Value::Object(obj.iter().map(|(k, v)| (k.clone(), resolve_template(v, ctx))).collect()),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_template(v, ctx)).collect()),
        other => other.clone(),
    }
}

/// Projects a raw response body through `output_mapping` (JSONPath per
/// output field), mirroring how a variable context shapes step output
/// (§4.3.5).
fn map_output(body: &Value, mapping: &BTreeMap<String, String>) -> Value {
    let mut out = serde_json::Map::new();
    for (field, expression) in mapping {
        let value = JsonPath::parse(expression)
            .ok()
            .and_then(|path| path.query(body).exactly_one().ok().cloned())
            .unwrap_or(Value::Null);
        out.insert(field.clone(), value);
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_get_when_method_is_omitted() {
        let ctx = StepContext {
            config: serde_json::json!({"url": "https://example.invalid"}),
            input: Value::Null,
            credentials: Value::Null,
            timeout: std::time::Duration::from_secs(1),
        };
        assert_eq!(
            ctx.config.get("method").and_then(Value::as_str).unwrap_or("GET"),
            "GET"
        );
    }

    #[tokio::test]
    async fn missing_url_is_a_validation_error() {
        let adapter = HttpAdapter::default();
        let ctx = StepContext {
            config: serde_json::json!({}),
            input: Value::Null,
            credentials: Value::Null,
            timeout: std::time::Duration::from_secs(1),
        };
        assert!(matches!(
            adapter.dispatch(ctx).await,
            Err(ErrorKind::Validation(_))
        ));
    }

    #[test]
    fn resolve_str_template_pulls_a_field_out_of_the_step_input() {
        let ctx = serde_json::json!({"input": {"id": "42"}});
        assert_eq!(resolve_str_template("$.input.id", &ctx), "42");
    }

    #[test]
    fn resolve_str_template_leaves_literal_strings_alone() {
        let ctx = serde_json::json!({"input": {"id": "42"}});
        assert_eq!(resolve_str_template("https://example.invalid", &ctx), "https://example.invalid");
    }

    #[test]
    fn resolve_template_walks_nested_body_fields() {
        let ctx = serde_json::json!({"input": {"name": "ada"}});
        let body = serde_json::json!({"user": {"name": "$.input.name"}, "tag": "fixed"});
        let resolved = resolve_template(&body, &ctx);
        assert_eq!(resolved["user"]["name"], "ada");
        assert_eq!(resolved["tag"], "fixed");
    }

    #[test]
    fn map_output_projects_fields_out_of_the_response_body() {
        let body = serde_json::json!({"data": {"id": 7, "name": "x"}});
        let mut mapping = BTreeMap::new();
        mapping.insert("id".to_string(), "$.data.id".to_string());
        let mapped = map_output(&body, &mapping);
        assert_eq!(mapped["id"], serde_json::json!(7));
    }
}
