// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Encrypted secret envelopes and the OAuth2 connection triple. Encryption
//! itself is an external collaborator (§6); this module only specifies the
//! persisted shape.

use crate::id::{CredentialId, OAuth2ConnectionId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialScope {
    Tenant,
    Project,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Active,
    Revoked,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: CredentialId,
    pub tenant_id: TenantId,
    pub credential_type: String,
    pub scope: CredentialScope,
    pub encrypted_data: Vec<u8>,
    pub encrypted_dek: Vec<u8>,
    pub data_nonce: Vec<u8>,
    pub dek_nonce: Vec<u8>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: CredentialStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A credential owned by the platform rather than a tenant (system
/// blocks' default provider keys, etc).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemCredential {
    pub id: CredentialId,
    pub credential_type: String,
    pub encrypted_data: Vec<u8>,
    pub encrypted_dek: Vec<u8>,
    pub data_nonce: Vec<u8>,
    pub dek_nonce: Vec<u8>,
    pub status: CredentialStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Provider {
    pub slug: String,
    pub name: String,
    pub authorize_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2App {
    pub id: CredentialId,
    pub tenant_id: TenantId,
    pub provider_slug: String,
    pub client_id: String,
    pub encrypted_client_secret: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Connection {
    pub id: OAuth2ConnectionId,
    pub tenant_id: TenantId,
    pub provider_slug: String,
    /// Correlation token for the pending authorize→callback round trip.
    pub state: String,
    pub code_verifier: String,
    pub access_token_encrypted: Option<Vec<u8>>,
    pub refresh_token_encrypted: Option<Vec<u8>>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
