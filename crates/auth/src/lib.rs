//! `foodtrust-auth`: authorization boundary (zero-trust).
//!
//! Identity is verified upstream; this crate only receives the verified
//! `(actor, organization, role)` triple and answers "may this principal do X".
//! It is decoupled from HTTP, tokens and storage.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, authorize, ensure_owner_or_regulator, role_permissions};
pub use permissions::Permission;
pub use principal::Principal;
pub use roles::Role;
