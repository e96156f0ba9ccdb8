//! Core data models for vehicle tuning lookups
//!
//! This module contains the types shared by the remote catalog path and the
//! local fallback path: the lookup request, the resolved tuning figures and
//! the flat fallback vehicle row.

pub mod catalog;
pub mod fallback;
pub mod resolver;
pub mod service;

pub use catalog::{CatalogClient, CatalogError};
pub use fallback::{FallbackStore, StoreError};
pub use resolver::CascadingResolver;
pub use service::{Listing, LookupError, SourceError, TuningService, VehicleSource};

use serde::{Deserialize, Serialize};

/// Vehicle type used when a caller does not name one
pub const DEFAULT_VEHICLE_TYPE: &str = "car";

fn default_vehicle_type() -> String {
    DEFAULT_VEHICLE_TYPE.to_string()
}

/// A fully specified tuning lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleQuery {
    /// Vehicle category (e.g. "car"); only the fallback store partitions by it
    #[serde(default = "default_vehicle_type")]
    pub vehicle_type: String,
    /// Brand name, matched case-insensitively upstream
    pub brand: String,
    /// Model name, matched case-insensitively upstream
    pub model: String,
    /// Generation label, matched exactly against the upstream year name
    pub generation: String,
    /// Engine label, matched exactly against the stage parent name
    pub engine: String,
}

impl VehicleQuery {
    pub fn new(
        vehicle_type: impl Into<String>,
        brand: impl Into<String>,
        model: impl Into<String>,
        generation: impl Into<String>,
        engine: impl Into<String>,
    ) -> Self {
        Self {
            vehicle_type: vehicle_type.into(),
            brand: brand.into(),
            model: model.into(),
            generation: generation.into(),
            engine: engine.into(),
        }
    }
}

/// Resolved power and torque figures for one engine
///
/// Stage 1 figures are always present. Stage 2 figures are `None` when the
/// vehicle has no Stage 2 offering and are then left out of the JSON output
/// entirely, which is different from a Stage 2 that yields zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TuningData {
    /// Stock horsepower
    pub original_power: u32,
    /// Stock torque in Nm
    pub original_torque: u32,
    /// Horsepower after a Stage 1 remap
    pub stage1_power: u32,
    /// Torque in Nm after a Stage 1 remap
    pub stage1_torque: u32,
    /// Horsepower after a Stage 2 remap, if offered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage2_power: Option<u32>,
    /// Torque in Nm after a Stage 2 remap, if offered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage2_torque: Option<u32>,
}

/// A locally stored vehicle row used when the remote catalog fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackVehicle {
    pub brand: String,
    pub model: String,
    pub generation: String,
    pub engine: String,
    /// Free-text variant (e.g. "Quattro"); several variants may share an engine
    #[serde(default)]
    pub variant: String,
    #[serde(default = "default_vehicle_type")]
    pub vehicle_type: String,
    pub original_power: u32,
    pub original_torque: u32,
    pub stage1_power: u32,
    pub stage1_torque: u32,
    #[serde(default)]
    pub stage2_power: Option<u32>,
    #[serde(default)]
    pub stage2_torque: Option<u32>,
}

impl FallbackVehicle {
    /// The tuning figures carried by this row
    pub fn tuning_data(&self) -> TuningData {
        TuningData {
            original_power: self.original_power,
            original_torque: self.original_torque,
            stage1_power: self.stage1_power,
            stage1_torque: self.stage1_torque,
            stage2_power: self.stage2_power,
            stage2_torque: self.stage2_torque,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuning_data_omits_missing_stage2() {
        let data = TuningData {
            original_power: 150,
            original_torque: 320,
            stage1_power: 185,
            stage1_torque: 400,
            stage2_power: None,
            stage2_torque: None,
        };

        let json = serde_json::to_value(data).expect("Failed to serialize TuningData");

        assert_eq!(json["originalPower"], 150);
        assert_eq!(json["stage1Torque"], 400);
        assert!(json.get("stage2Power").is_none(), "Stage 2 should be omitted");
        assert!(json.get("stage2Torque").is_none(), "Stage 2 should be omitted");
    }

    #[test]
    fn test_tuning_data_keeps_zero_stage2() {
        let data = TuningData {
            original_power: 100,
            original_torque: 200,
            stage1_power: 120,
            stage1_torque: 240,
            stage2_power: Some(0),
            stage2_torque: Some(0),
        };

        let json = serde_json::to_value(data).unwrap();

        assert_eq!(json["stage2Power"], 0);
        assert_eq!(json["stage2Torque"], 0);
    }

    #[test]
    fn test_vehicle_query_defaults_vehicle_type() {
        let query: VehicleQuery = serde_json::from_str(
            r#"{"brand":"Audi","model":"A4","generation":"B9 (2015-2023)","engine":"2.0 TDI"}"#,
        )
        .expect("Failed to deserialize VehicleQuery");

        assert_eq!(query.vehicle_type, DEFAULT_VEHICLE_TYPE);
        assert_eq!(query.generation, "B9 (2015-2023)");
    }

    #[test]
    fn test_fallback_vehicle_tuning_data() {
        let vehicle: FallbackVehicle = serde_json::from_str(
            r#"{
                "brand": "BMW", "model": "320d", "generation": "G20", "engine": "2.0d",
                "originalPower": 190, "originalTorque": 400,
                "stage1Power": 230, "stage1Torque": 470,
                "stage2Power": 250
            }"#,
        )
        .unwrap();

        assert_eq!(vehicle.variant, "");
        assert_eq!(vehicle.vehicle_type, "car");

        let data = vehicle.tuning_data();
        assert_eq!(data.stage1_power, 230);
        assert_eq!(data.stage2_power, Some(250));
        assert_eq!(data.stage2_torque, None);
    }
}
