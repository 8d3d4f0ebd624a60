// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wf`: operator CLI for the workflow orchestration daemon. Every
//! subcommand is a thin wrapper over one `DaemonClient` round trip,
//! printing the result as pretty JSON.

mod client;

use clap::{Parser, Subcommand};
use client::DaemonClient;
use wf_core::id::{ProjectId, RunId, ScheduleId};

#[derive(Parser)]
#[command(name = "wf", about = "Control the workflow orchestration daemon", version)]
struct Cli {
    /// Path to the daemon's control socket. Defaults to `WF_SOCKET`, then
    /// `<state_dir>/daemon.sock`.
    #[arg(long, global = true)]
    socket: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check whether the daemon is reachable.
    Ping,
    /// Print a tenant/run-count overview.
    Status,
    /// List runs, optionally filtered by project and/or status.
    Runs {
        #[arg(long)]
        project: Option<ProjectId>,
        #[arg(long)]
        status: Option<String>,
    },
    /// Show a single run.
    Run { id: RunId },
    /// List the step runs belonging to a run.
    Steps { run: RunId },
    /// List all projects visible to the daemon.
    Projects,
    /// Show a single project.
    Project { id: ProjectId },
    /// List schedules, optionally scoped to a project.
    Schedules {
        #[arg(long)]
        project: Option<ProjectId>,
    },
    /// Start a new run of a project's published version.
    Trigger {
        project: ProjectId,
        /// JSON input payload. Defaults to `{}`.
        #[arg(long, default_value = "{}")]
        input: String,
        #[arg(long)]
        user: Option<String>,
    },
    /// Cancel a run.
    Cancel { run: RunId },
    /// Resume a suspended run with a JSON payload.
    Resume {
        run: RunId,
        #[arg(long, default_value = "null")]
        payload: String,
    },
    /// Publish a project's draft as a new immutable version.
    Publish {
        project: ProjectId,
        #[arg(long)]
        by: String,
    },
    /// Pause a schedule.
    Pause { schedule: ScheduleId },
    /// Resume a paused schedule.
    Unpause { schedule: ScheduleId },
    /// Ask the daemon to shut down.
    Shutdown,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let socket = cli.socket.map(std::path::PathBuf::from).unwrap_or_else(client::default_socket_path);
    let daemon = DaemonClient::new(socket);

    match cli.command {
        Command::Ping => {
            daemon.ping().await?;
            println!("pong");
        }
        Command::Status => {
            let (uptime_secs, active_runs, tenants) = daemon.status().await?;
            print_json(&serde_json::json!({
                "uptime_secs": uptime_secs,
                "active_runs": active_runs,
                "tenants": tenants,
            }))?;
        }
        Command::Runs { project, status } => {
            print_json(&daemon.list_runs(project, status).await?)?;
        }
        Command::Run { id } => {
            print_json(&daemon.get_run(id).await?)?;
        }
        Command::Steps { run } => {
            print_json(&daemon.list_step_runs(run).await?)?;
        }
        Command::Projects => {
            print_json(&daemon.list_projects().await?)?;
        }
        Command::Project { id } => {
            print_json(&daemon.get_project(id).await?)?;
        }
        Command::Schedules { project } => {
            print_json(&daemon.list_schedules(project).await?)?;
        }
        Command::Trigger { project, input, user } => {
            let input: serde_json::Value = serde_json::from_str(&input)?;
            let run_id = daemon.trigger_run(project, input, user).await?;
            println!("{run_id}");
        }
        Command::Cancel { run } => {
            daemon.cancel_run(run).await?;
            println!("cancelled {run}");
        }
        Command::Resume { run, payload } => {
            let payload: serde_json::Value = serde_json::from_str(&payload)?;
            daemon.resume_run(run, payload).await?;
            println!("resumed {run}");
        }
        Command::Publish { project, by } => {
            let version = daemon.publish_project(project, by).await?;
            println!("published version {version}");
        }
        Command::Pause { schedule } => {
            daemon.pause_schedule(schedule).await?;
            println!("paused {schedule}");
        }
        Command::Unpause { schedule } => {
            daemon.resume_schedule(schedule).await?;
            println!("resumed {schedule}");
        }
        Command::Shutdown => {
            daemon.shutdown().await?;
            println!("shutdown requested");
        }
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
