use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::LocationSample;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Online,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub status: DriverStatus,
    /// Optional geo-area filter; when set, only orders addressed to this
    /// district are visible to the driver.
    pub district: Option<String>,
    pub position: Option<LocationSample>,
}
