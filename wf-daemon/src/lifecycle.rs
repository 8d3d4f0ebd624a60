// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup recovery and shutdown checkpointing: load the last snapshot,
//! replay the WAL tail on top of it, bind the Unix socket last so a
//! failed recovery never leaves a stale listener behind.

use crate::config::Config;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::UnixListener;
use tracing::info;
use wf_storage::snapshot;
use wf_storage::state::MaterializedState;
use wf_storage::wal::{Wal, WalError};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wal error: {0}")]
    Wal(#[from] WalError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] snapshot::SnapshotError),
    #[error("failed to bind socket at {0}: {1}")]
    Bind(std::path::PathBuf, #[source] std::io::Error),
}

pub struct Recovered {
    pub state: Arc<Mutex<MaterializedState>>,
    pub wal: Arc<Wal>,
    pub listener: UnixListener,
}

/// Loads the snapshot (if any), opens the WAL, replays everything after
/// the snapshot's `processed_seq`, and binds the listening socket.
pub async fn startup(config: &Config) -> Result<Recovered, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;

    let (mut state, processed_seq) = match snapshot::load(config.snapshot_path())? {
        Some(state) => {
            let seq = state.processed_seq;
            info!(processed_seq = seq, runs = state.runs.len(), "loaded snapshot");
            (state, seq)
        }
        None => {
            info!("no snapshot found, starting from an empty materialized state");
            (MaterializedState::new(), 0)
        }
    };

    let wal = Wal::open(config.wal_path(), processed_seq)?;
    let tail = wal.unprocessed_since(processed_seq);
    let replayed = tail.len();
    for entry in &tail {
        state.apply_event(entry.seq, &entry.event);
    }
    if replayed > 0 {
        info!(replayed, "replayed wal tail on top of snapshot");
    }

    let socket_path = config.socket_path();
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let listener = UnixListener::bind(&socket_path).map_err(|e| LifecycleError::Bind(socket_path, e))?;

    Ok(Recovered {
        state: Arc::new(Mutex::new(state)),
        wal: Arc::new(wal),
        listener,
    })
}

/// Flushes the WAL and writes a fresh snapshot so the next startup's
/// replay is bounded to whatever was appended after this point.
pub fn checkpoint(config: &Config, state: &MaterializedState, wal: &Wal) -> Result<(), LifecycleError> {
    wal.flush()?;
    snapshot::write(state, config.snapshot_path())?;
    Ok(())
}
