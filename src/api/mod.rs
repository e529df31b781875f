pub mod envelope;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::stage::{BackendStage, to_external};
use crate::models::location::LocationSample;
use crate::models::order::{Address, Customer, Order, OrderItem, PaymentMethod};

/// Order as the backend serialises it: the stage field carries the internal
/// vocabulary, which is collapsed onto the external six-stage enum here at
/// the wire boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderPayload {
    pub id: Uuid,
    pub number: String,
    pub stage: BackendStage,
    pub total: f64,
    pub delivery_fee: f64,
    pub payment_method: PaymentMethod,
    pub preferred_delivery_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub assigned_driver: Option<Uuid>,
    pub customer: Customer,
    pub address: Address,
    pub items: Vec<OrderItem>,
}

impl OrderPayload {
    pub fn into_order(self) -> Order {
        Order {
            id: self.id,
            number: self.number,
            stage: to_external(self.stage),
            total: self.total,
            delivery_fee: self.delivery_fee,
            payment_method: self.payment_method,
            preferred_delivery_at: self.preferred_delivery_at,
            created_at: self.created_at,
            delivered_at: self.delivered_at,
            assigned_driver: self.assigned_driver,
            customer: self.customer,
            address: self.address,
            items: self.items,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub phone: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Auth endpoints answer flat (not data-wrapped): success flag plus the
/// token pair on the happy path.
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogoutRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
pub struct AcceptRequest {
    pub driver_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct StageUpdateRequest {
    /// Absolute set: "stage is now X", never "advance by one". Resending an
    /// applied transition is a no-op.
    pub stage: BackendStage,
}

#[derive(Debug, Serialize)]
pub struct LocationUpdateRequest {
    pub driver_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: f64,
    pub heading_deg: Option<f64>,
    pub speed_mps: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

impl LocationUpdateRequest {
    pub fn new(driver_id: Uuid, sample: &LocationSample) -> Self {
        Self {
            driver_id,
            latitude: sample.latitude,
            longitude: sample.longitude,
            accuracy_m: sample.accuracy_m,
            heading_deg: sample.heading_deg,
            speed_mps: sample.speed_mps,
            captured_at: sample.captured_at,
        }
    }
}
