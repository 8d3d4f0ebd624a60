// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Publish a project's draft overlay into a new, immutable `ProjectVersion`
//! (§4.7). Flushing the draft is append-only: in-flight runs stay pinned
//! to whichever version they started on, so a publish never has to reason
//! about runs already executing against the prior graph.

use parking_lot::Mutex;
use wf_core::error::ErrorKind;
use wf_core::event::Event;
use wf_core::id::{ProjectId, ProjectVersionId};
use wf_storage::state::MaterializedState;
use wf_storage::wal::Wal;

/// Publishes `project_id`'s current draft. Requires a draft to be present
/// — publishing a project with no pending changes is a caller error, not
/// a silent no-op, since it would otherwise look like a successful
/// publish that produced no new version.
pub fn publish(
    state: &Mutex<MaterializedState>,
    wal: &Wal,
    project_id: ProjectId,
    published_by: String,
    now_ms: u64,
) -> Result<i64, ErrorKind> {
    let mut guard = state.lock();
    let project = guard
        .projects
        .get(&project_id)
        .ok_or_else(|| ErrorKind::not_found(format!("project {project_id}")))?;
    let draft = project
        .draft
        .clone()
        .ok_or_else(|| ErrorKind::Validation("project has no draft to publish".into()))?;
    let tenant_id = project.tenant_id;
    let version = project.version + 1;

    let event = Event::ProjectPublished {
        project_version_id: ProjectVersionId::new(),
        project_id,
        tenant_id,
        version,
        name: draft.name,
        description: draft.description,
        variables: draft.variables,
        steps: draft.steps,
        edges: draft.edges,
        block_groups: draft.block_groups,
        published_by,
        at_ms: now_ms,
    };
    let seq = wal.append(event.clone()).map_err(|e| ErrorKind::Infra(e.to_string()))?;
    guard.apply_event(seq, &event);
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wf_core::id::TenantId;
    use wf_core::model::project::DraftOverlay;
    use wf_core::model::{Project, ProjectStatus};

    fn seed_project(state: &mut MaterializedState, draft: Option<DraftOverlay>) -> ProjectId {
        let project_id = ProjectId::new();
        state.projects.insert(
            project_id,
            Project {
                id: project_id,
                tenant_id: TenantId::new(),
                name: "p".into(),
                description: None,
                status: ProjectStatus::Draft,
                version: 0,
                variables: serde_json::Value::Null,
                draft,
                created_by: "tester".into(),
                published_at: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
                deleted_at: None,
                is_system: false,
                system_slug: None,
            },
        );
        project_id
    }

    #[test]
    fn publishing_without_a_draft_is_rejected() {
        let mut state = MaterializedState::new();
        let project_id = seed_project(&mut state, None);
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::open(dir.path().join("wal.log"), 0).unwrap();
        let state = Mutex::new(state);

        let err = publish(&state, &wal, project_id, "tester".into(), 1).unwrap_err();
        assert!(matches!(err, ErrorKind::Validation(_)));
    }

    #[test]
    fn publishing_a_draft_creates_a_version_and_bumps_the_project() {
        let mut state = MaterializedState::new();
        let draft = DraftOverlay {
            name: "p".into(),
            description: None,
            variables: serde_json::Value::Null,
            steps: vec![],
            edges: vec![],
            block_groups: vec![],
        };
        let project_id = seed_project(&mut state, Some(draft));
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::open(dir.path().join("wal.log"), 0).unwrap();
        let state = Mutex::new(state);

        let version = publish(&state, &wal, project_id, "tester".into(), 1).unwrap();
        assert_eq!(version, 1);

        let guard = state.lock();
        let project = &guard.projects[&project_id];
        assert_eq!(project.version, 1);
        assert!(project.draft.is_none());
        assert_eq!(project.status, ProjectStatus::Published);
        assert!(guard.project_versions.values().any(|v| v.project_id == project_id && v.version == 1));
    }
}
