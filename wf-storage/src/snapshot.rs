// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic zstd-compressed checkpoints of `MaterializedState`, so startup
//! replays a snapshot plus only the WAL tail instead of the entire log.

use crate::state::MaterializedState;
use std::fs;
use std::path::{Path, PathBuf};
use wf_core::id::TenantId;
use wf_core::model::{AgentMemory, BlockGroupRun, Project, ProjectVersion, Run, Schedule, StepRun, Webhook};

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("io error on snapshot at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot codec error: {0}")]
    Codec(String),
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct SnapshotPayload {
    processed_seq: u64,
    runs: Vec<Run>,
    step_runs: Vec<StepRun>,
    block_group_runs: Vec<BlockGroupRun>,
    agent_memory: Vec<AgentMemory>,
    projects: Vec<Project>,
    project_versions: Vec<ProjectVersion>,
    schedules: Vec<Schedule>,
    webhooks: Vec<Webhook>,
    run_number_cursor: Vec<(TenantId, i64)>,
}

/// Checkpoints `state` to `path` as a zstd-compressed JSON payload.
pub fn write(state: &MaterializedState, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
    let path = path.as_ref();
    let payload = SnapshotPayload {
        processed_seq: state.processed_seq,
        runs: state.runs.values().cloned().collect(),
        step_runs: state.step_runs.values().cloned().collect(),
        block_group_runs: state.block_group_runs.values().cloned().collect(),
        agent_memory: state.agent_memory.values().flatten().cloned().collect(),
        projects: state.projects.values().cloned().collect(),
        project_versions: state.project_versions.values().cloned().collect(),
        schedules: state.schedules.values().cloned().collect(),
        webhooks: state.webhooks.values().cloned().collect(),
        run_number_cursor: state.run_number_cursor.iter().map(|(k, v)| (*k, *v)).collect(),
    };
    let json = serde_json::to_vec(&payload).map_err(|e| SnapshotError::Codec(e.to_string()))?;
    let compressed = zstd::encode_all(json.as_slice(), 3).map_err(|e| SnapshotError::Codec(e.to_string()))?;
    fs::write(path, compressed).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads a snapshot written by [`write`], rebuilding indexes. Returns
/// `Ok(None)` when no snapshot exists yet (first boot).
pub fn load(path: impl AsRef<Path>) -> Result<Option<MaterializedState>, SnapshotError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let compressed = fs::read(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let json = zstd::decode_all(compressed.as_slice()).map_err(|e| SnapshotError::Codec(e.to_string()))?;
    let payload: SnapshotPayload =
        serde_json::from_slice(&json).map_err(|e| SnapshotError::Codec(e.to_string()))?;

    let mut state = MaterializedState::new();
    state.processed_seq = payload.processed_seq;
    for run in payload.runs {
        state.runs.insert(run.id, run);
    }
    for sr in payload.step_runs {
        state.step_runs_by_run.entry(sr.run_id).or_default().push(sr.id);
        state.step_runs.insert(sr.id, sr);
    }
    for bgr in payload.block_group_runs {
        state.block_group_runs.insert(bgr.id, bgr);
    }
    for mem in payload.agent_memory {
        state.agent_memory.entry((mem.run_id, mem.step_id)).or_default().push(mem);
    }
    for p in payload.projects {
        state.projects.insert(p.id, p);
    }
    for pv in payload.project_versions {
        state.project_versions.insert(pv.id, pv);
    }
    for s in payload.schedules {
        state.schedules.insert(s.id, s);
    }
    for w in payload.webhooks {
        state.webhooks.insert(w.id, w);
    }
    for (tenant_id, count) in payload.run_number_cursor {
        state.run_number_cursor.insert(tenant_id, count);
    }
    Ok(Some(state))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_an_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.zst");
        let state = MaterializedState::new();
        write(&state, &path).unwrap();
        let loaded = load(&path).unwrap().unwrap();
        assert_eq!(loaded.processed_seq, 0);
    }

    #[test]
    fn missing_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path().join("absent.zst")).unwrap().is_none());
    }
}
