// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for handling socket I/O.
//!
//! Accepts connections on the Unix socket and handles them one request at
//! a time without blocking the engine — each connection is a single
//! request/response round trip, spawned onto its own task. A connection
//! is trusted local-operator traffic (no auth handshake), mirroring the
//! teacher's treatment of its own Unix-socket transport.

mod query;

use crate::engine::Engine;
use crate::ingress;
use crate::publish;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UnixListener;
use tokio::sync::Notify;
use tracing::{debug, error, info};
use wf_core::model::TriggeredBy;
use wf_core::tenant::{TenantFilter, TenantScope};
use wf_core::Clock;
use wf_engine::Runtime;
use wf_storage::repo::ProjectRepository;
use wf_storage::state::MaterializedState;
use wf_storage::wal::Wal;
use wf_wire::{read_request, write_response, Request, Response};

/// Shared daemon context handed to every connection handler.
pub struct ListenCtx<C: Clock> {
    pub state: Arc<Mutex<MaterializedState>>,
    pub wal: Arc<Wal>,
    pub runtime: Runtime<C>,
    pub engine: Arc<Engine<C>>,
    pub start_time: Instant,
    pub shutdown: Arc<Notify>,
}

pub struct Listener<C: Clock> {
    unix: UnixListener,
    ctx: Arc<ListenCtx<C>>,
}

impl<C: Clock> Listener<C> {
    pub fn new(unix: UnixListener, ctx: Arc<ListenCtx<C>>) -> Self {
        Self { unix, ctx }
    }

    /// Accepts connections until `shutdown` fires, spawning one task per
    /// connection so a slow client never stalls another's request.
    pub async fn run(self) {
        loop {
            tokio::select! {
                result = self.unix.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            let ctx = Arc::clone(&self.ctx);
                            tokio::spawn(async move {
                                if let Err(err) = handle_connection(stream, &ctx).await {
                                    debug!(%err, "connection ended with an error");
                                }
                            });
                        }
                        Err(err) => error!(%err, "accept error"),
                    }
                }
                _ = self.ctx.shutdown.notified() => {
                    info!("listener shutting down");
                    break;
                }
            }
        }
    }
}

async fn handle_connection<C: Clock>(mut stream: tokio::net::UnixStream, ctx: &ListenCtx<C>) -> Result<(), wf_wire::ProtocolError> {
    let request = read_request(&mut stream).await?;
    let is_query = matches!(request, Request::Query(_));
    if is_query {
        debug!(?request, "received query");
    } else {
        info!(?request, "received request");
    }

    let response = handle_request(request, ctx).await;
    write_response(&mut stream, &response).await
}

/// Resolves a project's tenant directly from state, then builds the
/// matching scoped filter — the operator socket is privileged local
/// traffic, so it looks a project up to discover its tenant rather than
/// ever being handed one up front.
fn filter_for_project(state: &MaterializedState, project_id: wf_core::id::ProjectId) -> Result<TenantFilter, wf_core::error::ErrorKind> {
    let project = state
        .projects
        .get(&project_id)
        .ok_or_else(|| wf_core::error::ErrorKind::not_found(format!("project {project_id}")))?;
    let scope = TenantScope::new(project.tenant_id)
        .map_err(|e| wf_core::error::ErrorKind::Validation(e.to_string()))?;
    Ok(TenantFilter::including_system(scope))
}

async fn handle_request<C: Clock>(request: Request, ctx: &ListenCtx<C>) -> Response {
    match request {
        Request::Ping => Response::Pong,
        Request::Hello { version } => Response::Hello { version },
        Request::Query(q) => query::handle(q, ctx),

        Request::TriggerRun {
            project_id,
            input,
            triggered_by_user,
        } => {
            let result = {
                let guard = ctx.state.lock();
                let filter = match filter_for_project(&guard, project_id) {
                    Ok(f) => f,
                    Err(err) => return error_response(&err),
                };
                let project = match ProjectRepository::new(&guard).get(&filter, project_id) {
                    Ok(p) => p.clone(),
                    Err(err) => return error_response(&err),
                };
                let version = guard
                    .project_versions
                    .values()
                    .find(|v| v.project_id == project_id && v.version == project.version)
                    .cloned();
                (filter, version)
            };
            let (filter, version) = result;
            let Some(version) = version else {
                return error_response(&wf_core::error::ErrorKind::Conflict(
                    "project has no published version to run".into(),
                ));
            };
            let Some(start) = version.steps.iter().find(|s| s.step_type == wf_core::model::StepType::Start) else {
                return error_response(&wf_core::error::ErrorKind::Conflict(
                    "published version has no start step".into(),
                ));
            };
            match ingress::trigger_run(
                &ctx.state,
                &ctx.wal,
                &filter,
                project_id,
                version.version,
                start.id,
                input,
                TriggeredBy::Manual,
                triggered_by_user,
                ctx.runtime_now(),
            ) {
                Ok(run_id) => {
                    let run = { ctx.state.lock().runs.get(&run_id).cloned() };
                    if let Some(run) = run {
                        let (events, effects) = ctx.runtime.start_run(&run).unwrap_or_else(|_| (vec![], vec![]));
                        if !events.is_empty() {
                            let mut guard = ctx.state.lock();
                            for event in &events {
                                if let Ok(seq) = ctx.wal.append(event.clone()) {
                                    guard.apply_event(seq, event);
                                }
                            }
                            drop(guard);
                            if effects.iter().any(|e| matches!(e, wf_core::effect::Effect::RetickRun { .. })) {
                                ctx.engine.drive(run_id);
                            }
                        }
                    }
                    Response::RunTriggered { run_id }
                }
                Err(err) => error_response(&err),
            }
        }

        Request::CancelRun { run_id } => {
            let (events, in_flight_ok) = {
                let guard = ctx.state.lock();
                match guard.runs.get(&run_id) {
                    Some(run) => {
                        let in_flight: Vec<_> = guard
                            .step_runs_by_run
                            .get(&run_id)
                            .into_iter()
                            .flatten()
                            .filter_map(|id| guard.step_runs.get(id))
                            .filter(|sr| sr.status == wf_core::model::StepRunStatus::Running)
                            .map(|sr| sr.id)
                            .collect();
                        let (events, _effects) = ctx.runtime.cancel_run(run, &in_flight);
                        (events, true)
                    }
                    None => (vec![], false),
                }
            };
            if !in_flight_ok {
                return error_response(&wf_core::error::ErrorKind::not_found(format!("run {run_id}")));
            }
            let mut guard = ctx.state.lock();
            for event in &events {
                if let Ok(seq) = ctx.wal.append(event.clone()) {
                    guard.apply_event(seq, event);
                }
            }
            Response::RunCancelled { run_id }
        }

        Request::ResumeRun { run_id, payload } => {
            let (events, effects) = ctx.runtime.resume_run(run_id, payload);
            let mut guard = ctx.state.lock();
            for event in &events {
                if let Ok(seq) = ctx.wal.append(event.clone()) {
                    guard.apply_event(seq, event);
                }
            }
            drop(guard);
            if effects.iter().any(|e| matches!(e, wf_core::effect::Effect::RetickRun { .. })) {
                ctx.engine.drive(run_id);
            }
            Response::RunResumed { run_id }
        }

        Request::PublishProject { project_id, published_by } => {
            match publish::publish(&ctx.state, &ctx.wal, project_id, published_by, ctx.runtime_now()) {
                Ok(version) => Response::ProjectPublished { project_id, version },
                Err(err) => error_response(&err),
            }
        }

        Request::PauseSchedule { schedule_id } => set_schedule_status(ctx, schedule_id, wf_core::model::ScheduleStatus::Paused),
        Request::ResumeSchedule { schedule_id } => set_schedule_status(ctx, schedule_id, wf_core::model::ScheduleStatus::Active),

        Request::TriggerWebhook { webhook_id, signature, body } => {
            let webhook = { ctx.state.lock().webhooks.get(&webhook_id).cloned() };
            let Some(webhook) = webhook else {
                return error_response(&wf_core::error::ErrorKind::not_found(format!("webhook {webhook_id}")));
            };
            let version = {
                let guard = ctx.state.lock();
                guard
                    .project_versions
                    .values()
                    .find(|v| v.project_id == webhook.project_id && v.version == webhook.project_version)
                    .cloned()
            };
            let Some(start) = version.as_ref().and_then(|v| v.steps.iter().find(|s| s.step_type == wf_core::model::StepType::Start)) else {
                return error_response(&wf_core::error::ErrorKind::Conflict(
                    "webhook's target version has no start step".into(),
                ));
            };
            match ingress::trigger_webhook(
                &ctx.state,
                &ctx.wal,
                webhook_id,
                &webhook.secret,
                webhook.project_id,
                webhook.project_version,
                start.id,
                webhook.tenant_id,
                webhook.enabled,
                &signature,
                &body,
                ctx.runtime_now(),
            ) {
                Ok(run_id) => {
                    ctx.engine.drive(run_id);
                    Response::WebhookAccepted { run_id }
                }
                Err(ingress::IngressError::BadSignature) => {
                    error_response(&wf_core::error::ErrorKind::Auth("webhook signature mismatch".into()))
                }
                Err(ingress::IngressError::Disabled) => error_response(&wf_core::error::ErrorKind::Policy("webhook disabled".into())),
                Err(ingress::IngressError::BadBody(e)) => error_response(&wf_core::error::ErrorKind::Validation(e.to_string())),
                Err(ingress::IngressError::Domain(e)) => error_response(&e),
            }
        }

        Request::Shutdown => {
            ctx.shutdown.notify_waiters();
            Response::ShuttingDown
        }
    }
}

fn set_schedule_status<C: Clock>(ctx: &ListenCtx<C>, schedule_id: wf_core::id::ScheduleId, status: wf_core::model::ScheduleStatus) -> Response {
    let mut guard = ctx.state.lock();
    match guard.schedules.get_mut(&schedule_id) {
        Some(schedule) => {
            schedule.status = status;
            schedule.updated_at = chrono::Utc::now();
            Response::ScheduleUpdated { schedule_id }
        }
        None => error_response(&wf_core::error::ErrorKind::not_found(format!("schedule {schedule_id}"))),
    }
}

fn error_response(err: &wf_core::error::ErrorKind) -> Response {
    Response::Error {
        message: err.to_string(),
        code: err.code().to_string(),
    }
}

impl<C: Clock> ListenCtx<C> {
    fn runtime_now(&self) -> u64 {
        self.engine.clock.epoch_ms()
    }
}
