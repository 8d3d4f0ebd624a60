// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The error-kind taxonomy shared by every crate in the workspace.
//!
//! Each crate defines its own leaf error type with `thiserror`, then maps
//! it onto [`ErrorKind`] at the boundary it crosses (engine → daemon →
//! wire). Propagation rules live with each kind's doc comment.

use thiserror::Error;

/// Dependency-failure sub-kind, distinguishing a collaborator timeout from
/// a hard unavailability from a non-2xx response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Timeout,
    Unavailable,
    BadStatus,
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Timeout => "TIMEOUT",
            Self::Unavailable => "UNAVAILABLE",
            Self::BadStatus => "BAD_STATUS",
        };
        write!(f, "{s}")
    }
}

/// Top-level error kind. Surfaces to the API boundary unchanged for
/// `Validation`/`Conflict`/`NotFound`/`TenantMismatch`; `Dependency` errors
/// are retried per the step's retry policy inside the engine; `Policy`
/// errors terminate a run without retry; `Infra` errors are retried at the
/// tick level without advancing the attempt counter.
#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("tenant mismatch: expected {expected}, got {actual}")]
    TenantMismatch { expected: String, actual: String },

    #[error("auth: {0}")]
    Auth(String),

    #[error("dependency [{kind}]: {message}")]
    Dependency {
        kind: DependencyKind,
        message: String,
    },

    #[error("policy: {0}")]
    Policy(String),

    #[error("infra: {0}")]
    Infra(String),

    #[error("cancelled")]
    Cancelled,
}

impl ErrorKind {
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound(entity.into())
    }

    pub fn tenant_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TenantMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Whether the engine should retry this error per the step's retry
    /// policy (as opposed to terminating the run outright).
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Dependency { .. } | Self::Infra(_)
        )
    }

    /// Code names used in `StepRun.error` and resolver abort paths, e.g.
    /// `CIRCULAR_INHERITANCE`, `SANDBOX_TIMEOUT`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::TenantMismatch { .. } => "TENANT_MISMATCH",
            Self::Auth(_) => "AUTH",
            Self::Dependency { .. } => "DEPENDENCY",
            Self::Policy(_) => "POLICY",
            Self::Infra(_) => "INFRA",
            Self::Cancelled => "CANCELLED",
        }
    }
}
