use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::stage::Stage;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Online,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Address {
    pub id: Uuid,
    pub district: String,
    pub street: String,
    pub building: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
}

/// Client-side view of an order. The server owns every field; local copies
/// are provisional and get replaced wholesale on the next poll.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Uuid,
    pub number: String,
    pub stage: Stage,
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

impl Order {
    /// Scheduled orders carry a preferred delivery time; immediate ones do
    /// not. Pure function of the order data.
    pub fn is_scheduled(&self) -> bool {
        self.preferred_delivery_at.is_some()
    }
}
