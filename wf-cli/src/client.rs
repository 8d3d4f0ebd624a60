// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin client over the daemon's Unix-socket control protocol. One
//! connection per request, matching the daemon's own one-request-per-
//! connection handling.

use std::path::{Path, PathBuf};
use tokio::net::UnixStream;
use wf_core::model::{Project, Run, Schedule, StepRun};
use wf_wire::{read_message, write_message, ProtocolError, Query, Request, Response};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("could not connect to wfd at {path}: {source}")]
    Connect { path: PathBuf, #[source] source: std::io::Error },
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("daemon returned an error [{code}]: {message}")]
    Daemon { code: String, message: String },
    #[error("unexpected response from daemon: {0:?}")]
    UnexpectedResponse(Response),
}

pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    async fn send(&self, request: &Request) -> Result<Response, ClientError> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| ClientError::Connect {
                path: self.socket_path.clone(),
                source,
            })?;
        let payload = wf_wire::encode(request)?;
        write_message(&mut stream, &payload).await?;
        let bytes = read_message(&mut stream).await?;
        let response: Response = wf_wire::decode(&bytes)?;
        if let Response::Error { message, code } = response {
            return Err(ClientError::Daemon { code, message });
        }
        Ok(response)
    }

    fn reject<T>(other: Response) -> Result<T, ClientError> {
        Err(ClientError::UnexpectedResponse(other))
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        match self.send(&Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Self::reject(other),
        }
    }

    pub async fn status(&self) -> Result<(u64, usize, usize), ClientError> {
        match self.send(&Request::Query(Query::StatusOverview)).await? {
            Response::StatusOverview {
                uptime_secs,
                active_runs,
                tenants,
            } => Ok((uptime_secs, active_runs, tenants)),
            other => Self::reject(other),
        }
    }

    pub async fn list_runs(&self, project_id: Option<wf_core::id::ProjectId>, status: Option<String>) -> Result<Vec<Run>, ClientError> {
        match self.send(&Request::Query(Query::ListRuns { project_id, status })).await? {
            Response::Runs { runs } => Ok(runs),
            other => Self::reject(other),
        }
    }

    pub async fn get_run(&self, id: wf_core::id::RunId) -> Result<Option<Run>, ClientError> {
        match self.send(&Request::Query(Query::GetRun { id })).await? {
            Response::Run { run } => Ok(run.map(|b| *b)),
            other => Self::reject(other),
        }
    }

    pub async fn list_step_runs(&self, run_id: wf_core::id::RunId) -> Result<Vec<StepRun>, ClientError> {
        match self.send(&Request::Query(Query::ListStepRuns { run_id })).await? {
            Response::StepRuns { step_runs } => Ok(step_runs),
            other => Self::reject(other),
        }
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, ClientError> {
        match self.send(&Request::Query(Query::ListProjects)).await? {
            Response::Projects { projects } => Ok(projects),
            other => Self::reject(other),
        }
    }

    pub async fn get_project(&self, id: wf_core::id::ProjectId) -> Result<Option<Project>, ClientError> {
        match self.send(&Request::Query(Query::GetProject { id })).await? {
            Response::Project { project } => Ok(project.map(|b| *b)),
            other => Self::reject(other),
        }
    }

    pub async fn list_schedules(&self, project_id: Option<wf_core::id::ProjectId>) -> Result<Vec<Schedule>, ClientError> {
        match self.send(&Request::Query(Query::ListSchedules { project_id })).await? {
            Response::Schedules { schedules } => Ok(schedules),
            other => Self::reject(other),
        }
    }

    pub async fn trigger_run(
        &self,
        project_id: wf_core::id::ProjectId,
        input: serde_json::Value,
        triggered_by_user: Option<String>,
    ) -> Result<wf_core::id::RunId, ClientError> {
        match self
            .send(&Request::TriggerRun {
                project_id,
                input,
                triggered_by_user,
            })
            .await?
        {
            Response::RunTriggered { run_id } => Ok(run_id),
            other => Self::reject(other),
        }
    }

    pub async fn cancel_run(&self, run_id: wf_core::id::RunId) -> Result<(), ClientError> {
        match self.send(&Request::CancelRun { run_id }).await? {
            Response::RunCancelled { .. } => Ok(()),
            other => Self::reject(other),
        }
    }

    pub async fn resume_run(&self, run_id: wf_core::id::RunId, payload: serde_json::Value) -> Result<(), ClientError> {
        match self.send(&Request::ResumeRun { run_id, payload }).await? {
            Response::RunResumed { .. } => Ok(()),
            other => Self::reject(other),
        }
    }

    pub async fn publish_project(&self, project_id: wf_core::id::ProjectId, published_by: String) -> Result<i64, ClientError> {
        match self.send(&Request::PublishProject { project_id, published_by }).await? {
            Response::ProjectPublished { version, .. } => Ok(version),
            other => Self::reject(other),
        }
    }

    pub async fn pause_schedule(&self, schedule_id: wf_core::id::ScheduleId) -> Result<(), ClientError> {
        match self.send(&Request::PauseSchedule { schedule_id }).await? {
            Response::ScheduleUpdated { .. } => Ok(()),
            other => Self::reject(other),
        }
    }

    pub async fn resume_schedule(&self, schedule_id: wf_core::id::ScheduleId) -> Result<(), ClientError> {
        match self.send(&Request::ResumeSchedule { schedule_id }).await? {
            Response::ScheduleUpdated { .. } => Ok(()),
            other => Self::reject(other),
        }
    }

    pub async fn shutdown(&self) -> Result<(), ClientError> {
        match self.send(&Request::Shutdown).await? {
            Response::ShuttingDown | Response::Ok => Ok(()),
            other => Self::reject(other),
        }
    }
}

/// `WF_SOCKET` > `<state_dir>/daemon.sock` > `~/.local/state/wf/daemon.sock`,
/// the same precedence `wf-daemon::config` uses for the state directory.
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var("WF_SOCKET") {
        return PathBuf::from(path);
    }
    let state_dir = dirs::state_dir().map(|d| d.join("wf")).unwrap_or_else(|| fallback_state_dir());
    state_dir.join("daemon.sock")
}

fn fallback_state_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".local/state/wf"))
        .unwrap_or_else(|| Path::new(".wf").to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn wf_socket_env_var_wins() {
        std::env::set_var("WF_SOCKET", "/tmp/custom.sock");
        assert_eq!(default_socket_path(), PathBuf::from("/tmp/custom.sock"));
        std::env::remove_var("WF_SOCKET");
    }

    #[test]
    #[serial]
    fn default_socket_lives_under_a_wf_directory() {
        std::env::remove_var("WF_SOCKET");
        let path = default_socket_path();
        assert_eq!(path.file_name().unwrap(), "daemon.sock");
        assert!(path.parent().unwrap().ends_with("wf"));
    }
}
