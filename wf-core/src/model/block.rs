// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Block definitions: typed, inheritable step templates resolved by
//! `wf-engine::resolver` into the effective view an executor consumes.

use crate::id::{BlockDefinitionId, BlockVersionId, TenantId};
use crate::model::project::BlockGroupType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum inheritance-chain depth (§3 invariant, §4.2).
pub const MAX_INHERIT_DEPTH: u32 = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestSpec {
    pub method: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub headers: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub query: std::collections::BTreeMap<String, String>,
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseSpec {
    pub success_status: Option<Vec<u16>>,
    /// Each value is a JSONPath expression into the raw response body.
    #[serde(default)]
    pub output_mapping: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiConfig {
    pub icon: Option<String>,
    pub color: Option<String>,
    #[serde(default)]
    pub groups: Vec<UiFieldGroup>,
    #[serde(default)]
    pub field_groups: Value,
    #[serde(default)]
    pub field_overrides: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiFieldGroup {
    pub id: String,
    #[serde(flatten)]
    pub rest: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDefinition {
    pub id: BlockDefinitionId,
    /// `None` denotes a system block visible to every tenant.
    pub tenant_id: Option<TenantId>,
    pub slug: String,
    pub name: String,
    pub category: String,
    pub subcategory: Option<String>,
    pub icon: Option<String>,
    pub config_schema: Value,
    pub output_schema: Value,
    pub input_ports: Value,
    pub output_ports: Value,
    pub error_codes: Vec<String>,
    pub required_credentials: Vec<String>,
    pub is_public: bool,
    pub code: Option<String>,
    pub ui_config: UiConfig,
    pub is_system: bool,
    pub version: i64,
    pub parent_block_id: Option<BlockDefinitionId>,
    pub config_defaults: Value,
    pub pre_process: Option<Value>,
    pub post_process: Option<Value>,
    pub internal_steps: Value,
    pub group_kind: Option<BlockGroupType>,
    pub is_container: bool,
    pub request: Option<RequestSpec>,
    pub response: Option<ResponseSpec>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BlockDefinition {
    pub fn has_code(&self) -> bool {
        self.code.as_deref().is_some_and(|c| !c.is_empty())
    }
}

/// Immutable snapshot of a `BlockDefinition`'s executable fields, produced
/// on publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockVersion {
    pub id: BlockVersionId,
    pub block_definition_id: BlockDefinitionId,
    pub version: i64,
    pub code: Option<String>,
    pub config_schema: Value,
    pub output_schema: Value,
    pub request: Option<RequestSpec>,
    pub response: Option<ResponseSpec>,
    pub published_at: DateTime<Utc>,
}
