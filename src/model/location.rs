use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{EngineError, EngineResult};

/// A single GPS fix as reported by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LocationSample {
    #[schema(example = 12.9716)]
    pub latitude: f64,
    #[schema(example = 77.5946)]
    pub longitude: f64,
    /// reported uncertainty radius in meters
    #[schema(example = 15.0)]
    pub accuracy_meters: f64,
    #[schema(example = "2026-01-05T09:05:00", format = "date-time", value_type = String)]
    pub captured_at: NaiveDateTime,
}

impl LocationSample {
    pub fn new(latitude: f64, longitude: f64, accuracy_meters: f64, captured_at: NaiveDateTime) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_meters,
            captured_at,
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(EngineError::validation(format!(
                "latitude {} out of range [-90, 90]",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(EngineError::validation(format!(
                "longitude {} out of range [-180, 180]",
                self.longitude
            )));
        }
        if !self.accuracy_meters.is_finite() || self.accuracy_meters < 0.0 {
            return Err(EngineError::validation(
                "accuracy_meters must be a non-negative number",
            ));
        }
        Ok(())
    }
}

/// Office, client site, or any other place an employee is allowed to work from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct AuthorizedArea {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "Bangalore HQ")]
    pub name: String,
    #[schema(example = 12.9716)]
    pub center_lat: f64,
    #[schema(example = 77.5946)]
    pub center_lon: f64,
    #[schema(example = 100.0)]
    pub radius_meters: f64,
    pub is_active: bool,
}
