// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Block-definition resolver (§4.2): walks a `BlockDefinition`'s
//! inheritance chain and produces the effective view an executor
//! consumes. Deterministic and pure over the chain snapshot handed to it,
//! so a caller may cache the result by `(definition_id, chain_version)`.

use indexmap::IndexSet;
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use wf_core::model::block::{BlockDefinition, RequestSpec, ResponseSpec, UiConfig, UiFieldGroup, MAX_INHERIT_DEPTH};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("CIRCULAR_INHERITANCE: block {0} revisits an ancestor already in its chain")]
    CircularInheritance(String),
    #[error("INHERITANCE_DEPTH_EXCEEDED: chain deeper than {MAX_INHERIT_DEPTH}")]
    InheritanceDepthExceeded,
    #[error("PARENT_NOT_FOUND: ancestor {0} referenced but absent")]
    ParentNotFound(String),
    #[error("BLOCK_NOT_INHERITABLE: root block {0} has no code")]
    BlockNotInheritable(String),
    #[error("CONFIG_SCHEMA_VIOLATION: {0}")]
    ConfigInvalid(String),
}

/// Validates a step's `config` against the resolved chain's merged
/// `config_schema` (§4.2 "resolved config_schema governs the step's
/// config"). A block with an empty schema admits any config.
pub fn validate_config(resolved: &ResolvedBlock, config: &Value) -> Result<(), ResolveError> {
    if resolved.config_schema == Value::Null
        || resolved
            .config_schema
            .get("properties")
            .is_some_and(|p| p.as_object().is_some_and(|o| o.is_empty()))
    {
        return Ok(());
    }
    let compiled = jsonschema::validator_for(&resolved.config_schema)
        .map_err(|e| ResolveError::ConfigInvalid(e.to_string()))?;
    compiled
        .validate(config)
        .map_err(|first| ResolveError::ConfigInvalid(first.to_string()))
}

#[derive(Debug, Clone)]
pub struct ResolvedBlock {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub category: String,
    pub code: Option<String>,
    pub required_credentials: Vec<String>,
    pub config_defaults: Value,
    pub config_schema: Value,
    pub ui_config: UiConfig,
    pub pre_process_chain: Vec<Value>,
    pub post_process_chain: Vec<Value>,
    pub request: Option<RequestSpec>,
    pub response: Option<ResponseSpec>,
    pub output_schema: Value,
    pub output_ports: Value,
}

/// Resolves `child` by walking parent references through `lookup`, a
/// lender for the chain snapshot (storage's responsibility, not the
/// resolver's — keeping this function pure).
pub fn resolve(
    child: &BlockDefinition,
    lookup: impl Fn(&wf_core::id::BlockDefinitionId) -> Option<BlockDefinition>,
) -> Result<ResolvedBlock, ResolveError> {
    if child.parent_block_id.is_none() {
        return Ok(ResolvedBlock {
            id: child.id.to_string(),
            slug: child.slug.clone(),
            name: child.name.clone(),
            category: child.category.clone(),
            code: child.code.clone(),
            required_credentials: child.required_credentials.clone(),
            config_defaults: child.config_defaults.clone(),
            config_schema: child.config_schema.clone(),
            ui_config: child.ui_config.clone(),
            pre_process_chain: child.pre_process.clone().into_iter().collect(),
            post_process_chain: child.post_process.clone().into_iter().collect(),
            request: child.request.clone(),
            response: child.response.clone(),
            output_schema: child.output_schema.clone(),
            output_ports: child.output_ports.clone(),
        });
    }

    // Walk child -> parent -> ... collecting ancestors, child first.
    let mut chain = vec![child.clone()];
    let mut visited: HashSet<String> = HashSet::from([child.id.to_string()]);
    let mut cursor = child.parent_block_id;

    while let Some(parent_id) = cursor {
        if chain.len() as u32 > MAX_INHERIT_DEPTH {
            return Err(ResolveError::InheritanceDepthExceeded);
        }
        if visited.contains(&parent_id.to_string()) {
            return Err(ResolveError::CircularInheritance(parent_id.to_string()));
        }
        let parent = lookup(&parent_id).ok_or_else(|| ResolveError::ParentNotFound(parent_id.to_string()))?;
        visited.insert(parent.id.to_string());
        cursor = parent.parent_block_id;
        chain.push(parent);
    }
    if chain.len() as u32 > MAX_INHERIT_DEPTH {
        return Err(ResolveError::InheritanceDepthExceeded);
    }

    let root = chain.last().expect("chain always has at least child");
    if !root.has_code() {
        return Err(ResolveError::BlockNotInheritable(root.id.to_string()));
    }

    // `chain` is child..root; reverse for root-to-child folds.
    let root_to_child: Vec<&BlockDefinition> = chain.iter().rev().collect();

    let mut required_credentials: IndexSet<String> = IndexSet::new();
    let mut config_defaults = serde_json::Map::new();
    let mut config_schema_properties = serde_json::Map::new();
    let mut config_schema_required: Vec<Value> = Vec::new();
    let mut ui_icon = None;
    let mut ui_color = None;
    let mut ui_groups: Vec<UiFieldGroup> = Vec::new();
    let mut request = RequestSpec::default();
    let mut response = ResponseSpec::default();
    let mut output_schema = Value::Null;
    let mut output_ports = Value::Null;

    for block in &root_to_child {
        // Union across the chain, root-to-child order, deduplicated.
        for cred in &block.required_credentials {
            required_credentials.insert(cred.clone());
        }
        merge_object_into(&mut config_defaults, &block.config_defaults);
        if let Some(props) = block.config_schema.get("properties").and_then(Value::as_object) {
            merge_object_into(&mut config_schema_properties, &Value::Object(props.clone()));
        }
        if let Some(required) = block.config_schema.get("required").and_then(Value::as_array) {
            for r in required {
                if !config_schema_required.contains(r) {
                    config_schema_required.push(r.clone());
                }
            }
        }
        if block.ui_config.icon.is_some() {
            ui_icon = block.ui_config.icon.clone();
        }
        if block.ui_config.color.is_some() {
            ui_color = block.ui_config.color.clone();
        }
        for group in &block.ui_config.groups {
            if !ui_groups.iter().any(|g| g.id == group.id) {
                ui_groups.push(group.clone());
            }
        }
        if let Some(req) = &block.request {
            merge_request(&mut request, req);
        }
        if let Some(resp) = &block.response {
            merge_response(&mut response, resp);
        }
        if !block.output_schema.is_null() {
            output_schema = block.output_schema.clone();
        }
        if !block.output_ports.is_null() {
            output_ports = block.output_ports.clone();
        }
    }

    // child's own output_schema/output_ports win if non-empty (§4.2:
    // "if empty on the child, inherited from nearest ancestor").
    if !child.output_schema.is_null() {
        output_schema = child.output_schema.clone();
    }
    if !child.output_ports.is_null() {
        output_ports = child.output_ports.clone();
    }

    let mut config_schema = serde_json::Map::new();
    config_schema.insert("properties".into(), Value::Object(config_schema_properties));
    config_schema.insert("required".into(), Value::Array(config_schema_required));

    Ok(ResolvedBlock {
        id: child.id.to_string(),
        slug: child.slug.clone(),
        name: child.name.clone(),
        category: child.category.clone(),
        code: root.code.clone(),
        required_credentials: required_credentials.into_iter().collect(),
        config_defaults: Value::Object(config_defaults),
        config_schema: Value::Object(config_schema),
        ui_config: UiConfig {
            icon: ui_icon,
            color: ui_color,
            groups: ui_groups,
            field_groups: child.ui_config.field_groups.clone(),
            field_overrides: child.ui_config.field_overrides.clone(),
        },
        pre_process_chain: chain.iter().filter_map(|b| b.pre_process.clone()).collect(),
        post_process_chain: root_to_child.iter().filter_map(|b| b.post_process.clone()).collect(),
        request: Some(request),
        response: Some(response),
        output_schema,
        output_ports,
    })
}

fn merge_object_into(target: &mut serde_json::Map<String, Value>, overlay: &Value) {
    if let Some(overlay) = overlay.as_object() {
        for (k, v) in overlay {
            target.insert(k.clone(), v.clone());
        }
    }
}

fn merge_request(target: &mut RequestSpec, overlay: &RequestSpec) {
    if let Some(method) = &overlay.method {
        target.method = Some(method.clone());
    }
    if let Some(url) = &overlay.url {
        target.url = Some(url.clone());
    }
    for (k, v) in &overlay.headers {
        target.headers.insert(k.clone(), v.clone());
    }
    for (k, v) in &overlay.query {
        target.query.insert(k.clone(), v.clone());
    }
    if let Some(body) = &overlay.body {
        target.body = Some(body.clone());
    }
}

fn merge_response(target: &mut ResponseSpec, overlay: &ResponseSpec) {
    if let Some(status) = &overlay.success_status {
        target.success_status = Some(status.clone());
    }
    for (k, v) in &overlay.output_mapping {
        target.output_mapping.insert(k.clone(), v.clone());
    }
}

/// Tenant-partitioned LRU cache keyed by `(definition_id, chain_version)`
/// (§5 "Block-definition resolver cache").
pub struct ResolverCache {
    inner: Mutex<LruCache<(String, i64), ResolvedBlock>>,
}

impl ResolverCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to at least 1"),
            )),
        }
    }

    pub fn get(&self, definition_id: &str, chain_version: i64) -> Option<ResolvedBlock> {
        self.inner
            .lock()
            .get(&(definition_id.to_string(), chain_version))
            .cloned()
    }

    pub fn put(&self, definition_id: &str, chain_version: i64, resolved: ResolvedBlock) {
        self.inner
            .lock()
            .put((definition_id.to_string(), chain_version), resolved);
    }
}
