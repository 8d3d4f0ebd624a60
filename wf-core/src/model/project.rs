// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenants and the project graph: steps, edges, block groups.

use crate::id::{BlockDefinitionId, BlockGroupId, EdgeId, ProjectId, ProjectVersionId, StepId, TenantId};
use crate::simple_display;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    Active,
    Suspended,
    Inactive,
}

simple_display! {
    enum TenantStatus {
        Active => "active",
        Suspended => "suspended",
        Inactive => "inactive",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    Published,
    Archived,
}

simple_display! {
    enum ProjectStatus {
        Draft => "draft",
        Published => "published",
        Archived => "archived",
    }
}

/// A draft overlay snapshot (§4.7): applied in-memory over the persisted
/// graph by the resolver when `Project::draft` is non-null, and flushed
/// to the canonical tables on publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftOverlay {
    pub name: String,
    pub description: Option<String>,
    pub variables: Value,
    pub steps: Vec<Step>,
    pub edges: Vec<Edge>,
    pub block_groups: Vec<BlockGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub tenant_id: TenantId,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub version: i64,
    pub variables: Value,
    pub draft: Option<DraftOverlay>,
    pub created_by: String,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub is_system: bool,
    pub system_slug: Option<String>,
}

impl Project {
    pub fn has_draft(&self) -> bool {
        self.draft.is_some()
    }

    /// Invariant: a system project must never be hard/soft-deleted by a
    /// tenant-scoped operation.
    pub fn is_tenant_deletable(&self) -> bool {
        !self.is_system
    }
}

/// Immutable snapshot of a project's full definition, written on publish.
/// Runs bind to a `ProjectVersion`, never to the mutable `Project` row, so
/// a later publish cannot retroactively change an in-flight run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectVersion {
    pub id: ProjectVersionId,
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub version: i64,
    pub name: String,
    pub description: Option<String>,
    pub variables: Value,
    pub steps: Vec<Step>,
    pub edges: Vec<Edge>,
    pub block_groups: Vec<BlockGroup>,
    pub published_at: DateTime<Utc>,
    pub published_by: String,
}

/// Canonical step types (§3). User-defined types register via block
/// definitions and are carried as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepType {
    Start,
    Llm,
    #[serde(rename = "llm-structured")]
    LlmStructured,
    Function,
    Http,
    Switch,
    Condition,
    #[serde(rename = "set-variables")]
    SetVariables,
    Tool,
    Block,
    Agent,
    #[serde(other)]
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    Schedule,
    Webhook,
    AgentTool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub config: Value,
    pub trigger_type: Option<TriggerType>,
    pub trigger_config: Option<Value>,
    pub block_group_id: Option<BlockGroupId>,
    pub group_role: Option<String>,
    pub block_definition_id: Option<BlockDefinitionId>,
    pub credential_bindings: Value,
    pub tool_name: Option<String>,
    pub tool_description: Option<String>,
    pub tool_input_schema: Option<Value>,
    pub position_x: f64,
    pub position_y: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Step {
    /// A step with a non-null `trigger_type` is a start step (§3).
    pub fn is_start_step(&self) -> bool {
        self.trigger_type.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub source_step_id: Option<StepId>,
    pub target_step_id: Option<StepId>,
    pub source_block_group_id: Option<BlockGroupId>,
    pub target_block_group_id: Option<BlockGroupId>,
    pub source_port: String,
    pub target_port: String,
    pub condition: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl Edge {
    /// Either a step or a group endpoint must be set at each end, not both.
    pub fn has_valid_endpoints(&self) -> bool {
        let source_ok = self.source_step_id.is_some() ^ self.source_block_group_id.is_some();
        let target_ok = self.target_step_id.is_some() ^ self.target_block_group_id.is_some();
        source_ok && target_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockGroupType {
    Sequence,
    Parallel,
    Loop,
    Condition,
    Switch,
    Agent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockGroup {
    pub id: BlockGroupId,
    pub tenant_id: TenantId,
    pub project_id: ProjectId,
    pub name: String,
    pub group_type: BlockGroupType,
    pub parent_group_id: Option<BlockGroupId>,
    pub pre_process: Option<Value>,
    pub post_process: Option<Value>,
    pub config: Value,
    pub position_x: f64,
    pub position_y: f64,
    pub width: f64,
    pub height: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Maximum nesting depth for block groups (§3 invariant).
pub const MAX_GROUP_DEPTH: u32 = 8;
