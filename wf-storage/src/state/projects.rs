// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event handlers for project publish (§4.7, §8 invariant 10).

use super::MaterializedState;
use wf_core::event::Event;
use wf_core::model::project::ProjectVersion;
use wf_core::model::ProjectStatus;

pub fn apply(state: &mut MaterializedState, event: &Event) {
    if let Event::ProjectPublished {
        project_version_id,
        project_id,
        tenant_id,
        version,
        name,
        description,
        variables,
        steps,
        edges,
        block_groups,
        published_by,
        at_ms,
    } = event
    {
        let published_at = chrono::DateTime::from_timestamp_millis(*at_ms as i64).unwrap_or_else(chrono::Utc::now);

        // Idempotent: a replayed event for a version already on record
        // inserts nothing new and leaves the project row untouched.
        if state.project_versions.contains_key(project_version_id) {
            return;
        }

        if let Some(project) = state.projects.get_mut(project_id) {
            if project.version < *version {
                project.version = *version;
                project.status = ProjectStatus::Published;
                project.draft = None;
                project.published_at = Some(published_at);
            }
        }

        state.project_versions.insert(
            *project_version_id,
            ProjectVersion {
                id: *project_version_id,
                tenant_id: *tenant_id,
                project_id: *project_id,
                version: *version,
                name: name.clone(),
                description: description.clone(),
                variables: variables.clone(),
                steps: steps.clone(),
                edges: edges.clone(),
                block_groups: block_groups.clone(),
                published_at,
                published_by: published_by.clone(),
            },
        );
    }
}
