use thiserror::Error;

use foodtrust_core::{DomainError, OrganizationId};

use crate::{Permission, Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{role}' lacks permission '{permission}'")]
    Forbidden { role: Role, permission: Permission },

    #[error("forbidden: '{organization}' does not own this batch")]
    NotOwner { organization: OrganizationId },
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        DomainError::unauthorized(value.to_string())
    }
}

/// Default role → permission mapping.
///
/// Ownership-scoped permissions (update/transfer) are additionally checked against
/// the batch's current owner by the aggregate.
pub fn role_permissions(role: Role) -> &'static [Permission] {
    match role {
        Role::Farmer => &[
            Permission::BatchCreate,
            Permission::BatchUpdate,
            Permission::BatchTransfer,
        ],
        Role::Processor | Role::Distributor => &[
            Permission::BatchUpdate,
            Permission::BatchTransfer,
            Permission::SensorRecord,
        ],
        Role::Retailer => &[Permission::BatchUpdate, Permission::BatchTransfer],
        Role::Regulator => &[
            Permission::BatchUpdate,
            Permission::BatchTransfer,
            Permission::SensorRecord,
            Permission::RecallInitiate,
            Permission::ComplianceRead,
            Permission::BatchReadAny,
        ],
    }
}

/// Authorize a principal for a permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: Permission) -> Result<(), AuthzError> {
    if role_permissions(principal.role).contains(&required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            role: principal.role,
            permission: required,
        })
    }
}

/// Ownership check used for every batch mutation: the acting organization must
/// currently own the batch, unless the principal holds the regulator capability.
pub fn ensure_owner_or_regulator(
    principal: &Principal,
    current_owner: &OrganizationId,
) -> Result<(), AuthzError> {
    if principal.is_regulator() || &principal.organization == current_owner {
        Ok(())
    } else {
        Err(AuthzError::NotOwner {
            organization: principal.organization.clone(),
        })
    }
}
