// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entry points that admit a new run into the engine (§4.6): a manual/API
//! trigger, a signed inbound webhook, and an agent-tool synchronous
//! sub-step invocation. Each produces a `RunCreated` event, appended to
//! the WAL and folded into `MaterializedState` before returning, so the
//! caller's next tick already sees the run.

use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use serde_json::Value;
use sha2::Sha256;
use wf_core::error::ErrorKind;
use wf_core::event::Event;
use wf_core::id::{ProjectId, RunId, WebhookId};
use wf_core::model::TriggeredBy;
use wf_core::tenant::TenantFilter;
use wf_storage::repo::ProjectRepository;
use wf_storage::state::MaterializedState;
use wf_storage::wal::Wal;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    #[error(transparent)]
    Domain(#[from] ErrorKind),
    #[error("webhook signature does not match")]
    BadSignature,
    #[error("webhook is disabled")]
    Disabled,
    #[error("webhook body is not valid json: {0}")]
    BadBody(#[from] serde_json::Error),
}

/// Constant-time HMAC-SHA256 verification of an inbound webhook body
/// against `webhook.secret` (§4.6). `signature` is the hex-encoded MAC, as
/// sent in the caller's signature header.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };
    mac.verify_slice(&expected).is_ok()
}

/// Triggers a run for a resolved start step — the manual/API entry point
/// (§4.6). Callers (the listener, the CLI's `run trigger` command) have
/// already resolved which `ProjectVersion`/start step to use; this
/// function only appends the event.
#[allow(clippy::too_many_arguments)]
pub fn trigger_run(
    state: &Mutex<MaterializedState>,
    wal: &Wal,
    filter: &TenantFilter,
    project_id: ProjectId,
    project_version: i64,
    start_step_id: wf_core::id::StepId,
    input: Value,
    triggered_by: TriggeredBy,
    triggered_by_user: Option<String>,
    now_ms: u64,
) -> Result<RunId, ErrorKind> {
    let mut guard = state.lock();
    let tenant_id = ProjectRepository::new(&guard).get(filter, project_id)?.tenant_id;
    let run_id = RunId::new();
    let run_number = guard.next_run_number(tenant_id);
    let event = Event::RunCreated {
        run_id,
        tenant_id,
        project_id,
        project_version,
        run_number,
        start_step_id,
        input,
        triggered_by,
        triggered_by_user,
        trigger_source: None,
        at_ms: now_ms,
    };
    let seq = wal.append(event.clone()).map_err(|e| ErrorKind::Infra(e.to_string()))?;
    guard.apply_event(seq, &event);
    Ok(run_id)
}

/// Verifies and admits an inbound webhook (§4.6). The caller supplies the
/// already-resolved start step, since the webhook row only carries a
/// `project_version`, not a step — the listener resolves the start step
/// from that version's steps before calling in.
#[allow(clippy::too_many_arguments)]
pub fn trigger_webhook(
    state: &Mutex<MaterializedState>,
    wal: &Wal,
    webhook_id: WebhookId,
    secret: &str,
    project_id: ProjectId,
    project_version: i64,
    start_step_id: wf_core::id::StepId,
    tenant_id: wf_core::id::TenantId,
    enabled: bool,
    signature_hex: &str,
    body: &[u8],
    now_ms: u64,
) -> Result<RunId, IngressError> {
    if !enabled {
        return Err(IngressError::Disabled);
    }
    if !verify_webhook_signature(secret, body, signature_hex) {
        return Err(IngressError::BadSignature);
    }
    let input: Value = serde_json::from_slice(body)?;

    let mut guard = state.lock();
    let run_id = RunId::new();
    let run_number = guard.next_run_number(tenant_id);
    let created = Event::RunCreated {
        run_id,
        tenant_id,
        project_id,
        project_version,
        run_number,
        start_step_id,
        input,
        triggered_by: TriggeredBy::Webhook,
        triggered_by_user: None,
        trigger_source: Some(webhook_id.to_string()),
        at_ms: now_ms,
    };
    let triggered = Event::WebhookTriggered {
        webhook_id,
        run_id,
        at_ms: now_ms,
    };
    for event in [&created, &triggered] {
        let seq = wal.append(event.clone()).map_err(|e| ErrorKind::Infra(e.to_string()))?;
        guard.apply_event(seq, event);
    }
    Ok(run_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_must_match_the_hmac_of_the_body() {
        let secret = "s3cr3t";
        let body = br#"{"hello":"world"}"#;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let good = hex::encode(mac.finalize().into_bytes());

        assert!(verify_webhook_signature(secret, body, &good));
        assert!(!verify_webhook_signature(secret, body, "deadbeef"));
    }
}
