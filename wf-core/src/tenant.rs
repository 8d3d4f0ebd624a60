// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tenant-isolation primitive. Every read and write to a tenant-scoped
//! table goes through a [`TenantScope`]; there is deliberately no code
//! path that queries a tenant-scoped repository without one.

use crate::id::TenantId;

/// A validated, non-nil tenant scope. Construction is the only place a
/// null-UUID tenant can be rejected, so once a `TenantScope` exists every
/// downstream query is guaranteed to carry a real tenant id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantScope {
    tenant_id: TenantId,
}

impl TenantScope {
    /// Refuses construction if `tenant_id` is the null UUID.
    pub fn new(tenant_id: TenantId) -> Result<Self, TenantScopeError> {
        if tenant_id.is_nil() {
            return Err(TenantScopeError::NilTenant);
        }
        Ok(Self { tenant_id })
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Equality helper used at every domain boundary: a handler receives a
    /// scope and an entity's own `tenant_id` and must prove they match
    /// before acting on the entity.
    pub fn ensure_match(&self, actual: TenantId) -> Result<(), TenantScopeError> {
        if self.tenant_id == actual {
            Ok(())
        } else {
            Err(TenantScopeError::Mismatch {
                expected: self.tenant_id,
                actual,
            })
        }
    }
}

/// A predicate applied when reading a row that may legitimately be a
/// system resource (`is_system = true`, null `tenant_id`), which is
/// admitted via an explicit `OR is_system` clause on read paths only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantFilter {
    scope: TenantScope,
    include_system: bool,
}

impl TenantFilter {
    pub fn scoped(scope: TenantScope) -> Self {
        Self {
            scope,
            include_system: false,
        }
    }

    /// Widens the filter to also admit system resources. Must never be
    /// used to gate a write.
    pub fn including_system(scope: TenantScope) -> Self {
        Self {
            scope,
            include_system: true,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.scope.tenant_id()
    }

    /// Whether a row is visible under this filter: it matches the scope's
    /// tenant, or it is a system row and the filter admits system rows.
    pub fn admits(&self, row_tenant_id: Option<TenantId>, row_is_system: bool) -> bool {
        match row_tenant_id {
            Some(tid) if tid == self.scope.tenant_id() => true,
            _ => self.include_system && row_is_system,
        }
    }

    /// Cross-table join guard: proves that `id` belongs to `table` under
    /// this filter's tenant before a caller is allowed to reference it.
    pub fn validate_access(
        &self,
        table: &str,
        row_tenant_id: Option<TenantId>,
        row_is_system: bool,
    ) -> Result<(), TenantScopeError> {
        if self.admits(row_tenant_id, row_is_system) {
            Ok(())
        } else {
            Err(TenantScopeError::AccessDenied {
                table: table.to_string(),
                tenant_id: self.scope.tenant_id(),
            })
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TenantScopeError {
    #[error("tenant scope cannot be constructed from the nil tenant id")]
    NilTenant,
    #[error("tenant mismatch: scope is {expected}, row belongs to {actual}")]
    Mismatch { expected: TenantId, actual: TenantId },
    #[error("tenant {tenant_id} may not access row in {table}")]
    AccessDenied { table: String, tenant_id: TenantId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_nil_tenant() {
        assert_eq!(
            TenantScope::new(TenantId::nil()).unwrap_err(),
            TenantScopeError::NilTenant
        );
    }

    #[test]
    fn ensure_match_detects_mismatch() {
        let scope = TenantScope::new(TenantId::new()).unwrap();
        let other = TenantId::new();
        assert!(scope.ensure_match(other).is_err());
        assert!(scope.ensure_match(scope.tenant_id()).is_ok());
    }

    #[test]
    fn system_rows_admitted_only_when_widened() {
        let scope = TenantScope::new(TenantId::new()).unwrap();
        let scoped = TenantFilter::scoped(scope);
        let widened = TenantFilter::including_system(scope);

        assert!(!scoped.admits(None, true));
        assert!(widened.admits(None, true));
        assert!(!widened.admits(None, false));
    }
}
