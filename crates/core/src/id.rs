//! Strongly-typed identifiers used across the domain.
//!
//! Identifiers are opaque strings. `BatchId` is the token a QR/identifier
//! collaborator encodes; the ledger only requires it to be non-empty and free of
//! whitespace.

use core::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

const MAX_ID_LEN: usize = 128;

/// Prefix of self-generated batch identifiers.
pub const BATCH_ID_PREFIX: &str = "BATCH_";

/// Identifier of a tracked batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BatchId(String);

/// Identifier of the principal that caused an event (e.g. a username).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActorId(String);

/// Organization that owns batches (e.g. "GreenValley").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrganizationId(String);

macro_rules! impl_string_newtype {
    ($t:ident, $name:literal, $allow_spaces:expr) => {
        impl $t {
            /// Validate and wrap a raw identifier.
            pub fn parse(raw: impl Into<String>) -> Result<Self, DomainError> {
                let raw = raw.into();
                if raw.trim().is_empty() {
                    return Err(DomainError::invalid_id(format!("{}: cannot be empty", $name)));
                }
                if raw.len() > MAX_ID_LEN {
                    return Err(DomainError::invalid_id(format!(
                        "{}: longer than {MAX_ID_LEN} bytes",
                        $name
                    )));
                }
                if !$allow_spaces && raw.chars().any(char::is_whitespace) {
                    return Err(DomainError::invalid_id(format!(
                        "{}: cannot contain whitespace",
                        $name
                    )));
                }
                Ok(Self(raw))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_string_newtype!(BatchId, "BatchId", false);
impl_string_newtype!(ActorId, "ActorId", false);
impl_string_newtype!(OrganizationId, "OrganizationId", true);

impl BatchId {
    /// Generate a fresh identifier: `BATCH_<unix millis>_<9 random hex chars>`.
    pub fn generate() -> Self {
        let millis = Utc::now().timestamp_millis();
        let random = Uuid::now_v7().simple().to_string();
        // The tail of a v7 UUID is random; the head is the timestamp.
        let suffix = &random[random.len() - 9..];
        Self(format!("{BATCH_ID_PREFIX}{millis}_{suffix}"))
    }

    /// Resolve a scanned QR payload into a batch identifier.
    ///
    /// Accepts a scan URL (`.../scan/<id>`) or a bare `BATCH_` token.
    pub fn from_scan_payload(payload: &str) -> Result<Self, DomainError> {
        let payload = payload.trim();
        if let Some((_, tail)) = payload.split_once("/scan/") {
            let id = tail.split(['?', '#', '/']).next().unwrap_or_default();
            return Self::parse(id);
        }
        if payload.starts_with(BATCH_ID_PREFIX) {
            return Self::parse(payload);
        }
        Err(DomainError::validation("qrData", "invalid QR code format"))
    }
}
