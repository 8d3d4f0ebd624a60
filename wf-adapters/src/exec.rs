// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The adapter seam between the engine and every external collaborator a
//! step type dispatches to (§4.4, §6). One `ExecAdapter` per step-type
//! family, routed by `StepType` the way the teacher routes agent spawns by
//! transport (`coop`/`docker`/`k8s`).

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use wf_core::error::{DependencyKind, ErrorKind};

#[derive(Debug, Clone)]
pub struct StepContext {
    pub config: Value,
    pub input: Value,
    pub credentials: Value,
    pub timeout: Duration,
}

#[async_trait]
pub trait ExecAdapter: Send + Sync {
    async fn dispatch(&self, ctx: StepContext) -> Result<Value, ErrorKind>;
}

/// Wraps a future with `ctx.timeout`, mapping an elapsed deadline onto the
/// taxonomy's `Dependency { Timeout }` kind used throughout §4.4's
/// per-type error contract.
pub async fn with_timeout<F, T>(timeout: Duration, fut: F) -> Result<T, ErrorKind>
where
    F: std::future::Future<Output = Result<T, ErrorKind>>,
{
    tokio::time::timeout(timeout, fut).await.unwrap_or_else(|_| {
        Err(ErrorKind::Dependency {
            kind: DependencyKind::Timeout,
            message: format!("exceeded {timeout:?}"),
        })
    })
}
