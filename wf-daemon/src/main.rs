// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wfd`: the workflow orchestration daemon. Loads persisted state,
//! drives in-flight runs, fires due schedules, and serves the operator
//! control protocol.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tracing::info;
use wf_adapters::{ExecAdapter, HttpAdapter, LlmAdapter, LlmClient, SandboxAdapter, SandboxClient, StepContext, ToolAdapter};
use wf_core::error::{DependencyKind, ErrorKind};
use wf_core::SystemClock;
use wf_daemon::config::Config;
use wf_daemon::engine::Engine;
use wf_daemon::listener::{ListenCtx, Listener};
use wf_daemon::{lifecycle, scheduler};
use wf_engine::{ResolverCache, Runtime, StepExecutor};

/// Stands in for the sandbox/LLM provider a real deployment wires up —
/// both are external collaborators out of this crate's scope (§6). Any
/// `function`, `llm`, or `agent` step dispatched before an operator
/// configures a real provider fails with a retriable dependency error
/// rather than panicking or silently succeeding.
struct Unconfigured(&'static str);

#[async_trait]
impl SandboxClient for Unconfigured {
    async fn execute(&self, _code: &str, _input: Value, _env: Value, _memory_mb: u32) -> Result<Value, ErrorKind> {
        Err(unconfigured(self.0))
    }
}

#[async_trait]
impl LlmClient for Unconfigured {
    async fn complete(
        &self,
        _provider: &str,
        _model: &str,
        _messages: Value,
        _tools: Option<Value>,
        _response_schema: Option<Value>,
    ) -> Result<wf_adapters::LlmCompletion, ErrorKind> {
        Err(unconfigured(self.0))
    }
}

struct UnconfiguredAgent;

#[async_trait]
impl ExecAdapter for UnconfiguredAgent {
    async fn dispatch(&self, _ctx: StepContext) -> Result<Value, ErrorKind> {
        Err(unconfigured("agent"))
    }
}

fn unconfigured(collaborator: &str) -> ErrorKind {
    ErrorKind::Dependency {
        kind: DependencyKind::Unavailable,
        message: format!("{collaborator} provider is not configured on this daemon"),
    }
}

fn build_executor() -> Arc<StepExecutor> {
    let sandbox = Arc::new(SandboxAdapter::new(Unconfigured("sandbox")));
    let llm = Arc::new(LlmAdapter::new(Unconfigured("llm"), false));
    let llm_structured = Arc::new(LlmAdapter::new(Unconfigured("llm"), true));
    let http = Arc::new(HttpAdapter::new(reqwest::Client::new()));
    let tool = Arc::new(ToolAdapter::new());

    Arc::new(StepExecutor {
        function: sandbox,
        http,
        llm,
        llm_structured,
        tool,
        agent: Arc::new(UnconfiguredAgent),
        resolver_cache: ResolverCache::new(256),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).json().init();

    let config_path = std::env::var("WF_CONFIG").unwrap_or_else(|_| "wfd.toml".into());
    let config = Config::load(&config_path)?;
    info!(state_dir = %config.state_dir.display(), "starting wfd");

    let recovered = lifecycle::startup(&config).await?;
    let shutdown = Arc::new(Notify::new());

    let engine = Arc::new(Engine::new(
        Arc::clone(&recovered.state),
        Arc::clone(&recovered.wal),
        SystemClock,
        build_executor(),
        config.default_step_timeout(),
    ));

    // Re-attach every run the daemon left in-flight across a restart —
    // nothing but a tick is needed, since `StepRunCreated` without a
    // matching completion is exactly what a crash mid-dispatch leaves
    // behind, and `tick` treats it like any other undispatched step.
    let resumable: Vec<_> = {
        let guard = recovered.state.lock();
        guard
            .runs
            .values()
            .filter(|r| matches!(r.status, wf_core::model::RunStatus::Running))
            .map(|r| r.id)
            .collect()
    };
    for run_id in resumable {
        engine.drive(run_id);
    }

    let scheduler_shutdown = Arc::clone(&shutdown);
    let scheduler_handle = tokio::spawn(scheduler::run_loop(
        Arc::clone(&recovered.state),
        Arc::clone(&recovered.wal),
        SystemClock,
        config.tick_interval(),
        scheduler_shutdown,
    ));

    let ctx = Arc::new(ListenCtx {
        state: Arc::clone(&recovered.state),
        wal: Arc::clone(&recovered.wal),
        runtime: Runtime::new(SystemClock),
        engine: Arc::clone(&engine),
        start_time: Instant::now(),
        shutdown: Arc::clone(&shutdown),
    });
    let listener = Listener::new(recovered.listener, ctx);
    let listener_handle = tokio::spawn(listener.run());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
        _ = shutdown.notified() => {
            info!("shutdown requested over the control socket");
        }
    }
    shutdown.notify_waiters();
    let _ = scheduler_handle.await;
    let _ = listener_handle.await;

    let guard = recovered.state.lock();
    lifecycle::checkpoint(&config, &guard, &recovered.wal)?;
    info!("checkpoint written, exiting");
    Ok(())
}
