use serde::{Deserialize, Serialize};

use foodtrust_core::DomainError;

/// Supply-chain role of a principal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Farmer,
    Processor,
    Distributor,
    Retailer,
    Regulator,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Farmer => "farmer",
            Role::Processor => "processor",
            Role::Distributor => "distributor",
            Role::Retailer => "retailer",
            Role::Regulator => "regulator",
        }
    }

    /// Whether an organization acting in this role can own a batch.
    ///
    /// Regulators oversee batches but never hold them.
    pub fn can_own_batches(self) -> bool {
        !matches!(self, Role::Regulator)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "farmer" => Ok(Role::Farmer),
            "processor" => Ok(Role::Processor),
            "distributor" => Ok(Role::Distributor),
            "retailer" => Ok(Role::Retailer),
            "regulator" => Ok(Role::Regulator),
            other => Err(DomainError::validation("role", format!("unknown role '{other}'"))),
        }
    }
}
