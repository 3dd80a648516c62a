//! Batch value objects and the field sets carried by commands and events.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use foodtrust_core::{DomainError, DomainResult, ValueObject};

use crate::BatchStatus;

/// Unit of a batch quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantityUnit {
    #[default]
    Kg,
    Tons,
    Boxes,
    Crates,
    Units,
}

impl QuantityUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            QuantityUnit::Kg => "kg",
            QuantityUnit::Tons => "tons",
            QuantityUnit::Boxes => "boxes",
            QuantityUnit::Crates => "crates",
            QuantityUnit::Units => "units",
        }
    }
}

impl core::fmt::Display for QuantityUnit {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Amount of product in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub amount: f64,
    #[serde(default)]
    pub unit: QuantityUnit,
}

impl ValueObject for Quantity {}

impl Quantity {
    pub fn new(amount: f64, unit: QuantityUnit) -> Self {
        Self { amount, unit }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(DomainError::validation(
                "quantity.amount",
                format!("must be greater than 0 (got {})", self.amount),
            ));
        }
        Ok(())
    }
}

/// Where the batch was harvested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub farm_name: Option<String>,
}

impl ValueObject for FarmLocation {}

impl FarmLocation {
    pub fn validate(&self) -> DomainResult<()> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(DomainError::validation(
                "farmLocation.latitude",
                format!("must be within [-90, 90] (got {})", self.latitude),
            ));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(DomainError::validation(
                "farmLocation.longitude",
                format!("must be within [-180, 180] (got {})", self.longitude),
            ));
        }
        Ok(())
    }
}

/// Grade, certifications and lab results.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Quality {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default)]
    pub certifications: Vec<String>,
    /// Free-form lab output; stored as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_results: Option<serde_json::Value>,
}

impl ValueObject for Quality {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Packaging {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub package_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl ValueObject for Packaging {}

impl Packaging {
    pub fn validate(&self) -> DomainResult<()> {
        match self.weight {
            Some(w) if !w.is_finite() || w <= 0.0 => Err(DomainError::validation(
                "packaging.weight",
                format!("must be greater than 0 (got {w})"),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Processing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packaging: Option<Packaging>,
}

impl ValueObject for Processing {}

impl Processing {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(packaging) = &self.packaging {
            packaging.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Logistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distributor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_arrival: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_arrival: Option<DateTime<Utc>>,
}

impl ValueObject for Logistics {}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Retail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retailer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shelf_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl ValueObject for Retail {}

impl Retail {
    pub fn validate(&self) -> DomainResult<()> {
        match self.price {
            Some(p) if !p.is_finite() || p < 0.0 => Err(DomainError::validation(
                "retail.price",
                format!("must not be negative (got {p})"),
            )),
            _ => Ok(()),
        }
    }
}

/// Input for batch creation.
///
/// Required facts are optional here so a missing one is reported as a validation
/// error naming the field rather than a deserialization failure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewBatch {
    pub crop: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variety: Option<String>,
    #[serde(default)]
    pub harvest_date: Option<NaiveDate>,
    #[serde(default)]
    pub farm_location: Option<FarmLocation>,
    #[serde(default)]
    pub quantity: Option<Quantity>,
    #[serde(default)]
    pub quality: Option<Quality>,
}

/// Mutable facts an update may change. Each present section replaces the
/// current one wholesale.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BatchChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<BatchStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<Quality>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing: Option<Processing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logistics: Option<Logistics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retail: Option<Retail>,
}

impl BatchChanges {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.quantity.is_none()
            && self.quality.is_none()
            && self.processing.is_none()
            && self.logistics.is_none()
            && self.retail.is_none()
    }

    /// Content checks only; status reachability needs the current state.
    pub fn validate(&self) -> DomainResult<()> {
        if self.is_empty() {
            return Err(DomainError::validation("fields", "no fields to update"));
        }
        if let Some(quantity) = &self.quantity {
            quantity.validate()?;
        }
        if let Some(processing) = &self.processing {
            processing.validate()?;
        }
        if let Some(retail) = &self.retail {
            retail.validate()?;
        }
        Ok(())
    }
}

/// Section data attached to a lifecycle step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StepDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing: Option<Processing>,
    /// Merged into `processing.packaging`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packaging: Option<Packaging>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logistics: Option<Logistics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retail: Option<Retail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl StepDetails {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(processing) = &self.processing {
            processing.validate()?;
        }
        if let Some(packaging) = &self.packaging {
            packaging.validate()?;
        }
        if let Some(retail) = &self.retail {
            retail.validate()?;
        }
        Ok(())
    }
}
