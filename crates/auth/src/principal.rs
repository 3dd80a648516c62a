use serde::{Deserialize, Serialize};

use foodtrust_core::{ActorId, OrganizationId};

use crate::Role;

/// A verified principal, as supplied by the authentication collaborator.
///
/// The ledger trusts this triple completely and never re-derives identity; it only
/// checks roles and ownership against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub actor_id: ActorId,
    pub organization: OrganizationId,
    pub role: Role,
}

impl Principal {
    pub fn new(actor_id: ActorId, organization: OrganizationId, role: Role) -> Self {
        Self {
            actor_id,
            organization,
            role,
        }
    }

    pub fn is_regulator(&self) -> bool {
        self.role == Role::Regulator
    }
}
