//! Core types for shipping plan orchestration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::TaskStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim()).map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteId(pub String);

impl QuoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for QuoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for QuoteId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Optimization preference chosen by the user; selects the ranking scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Preference {
    Fastest,
    Cheapest,
    #[default]
    Balanced,
    Green,
}

impl Preference {
    pub fn as_str(self) -> &'static str {
        match self {
            Preference::Fastest => "fastest",
            Preference::Cheapest => "cheapest",
            Preference::Balanced => "balanced",
            Preference::Green => "green",
        }
    }
}

impl std::str::FromStr for Preference {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "fastest" => Ok(Preference::Fastest),
            "cheapest" => Ok(Preference::Cheapest),
            "balanced" => Ok(Preference::Balanced),
            "green" => Ok(Preference::Green),
            other => Err(format!(
                "invalid preference '{other}'. valid values: fastest, cheapest, balanced, green"
            )),
        }
    }
}

impl std::fmt::Display for Preference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningRequest {
    pub quote_id: QuoteId,
    pub destination: String,
    pub preference: Preference,
}

impl PlanningRequest {
    pub fn new(
        quote_id: impl Into<String>,
        destination: impl Into<String>,
        preference: Preference,
    ) -> Self {
        Self {
            quote_id: QuoteId::new(quote_id),
            destination: destination.into(),
            preference,
        }
    }
}

/// One fully specified shipping choice produced by planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingOption {
    pub id: String,
    pub carrier: String,
    pub service: String,
    pub eta_days: u32,
    pub price_usd: f64,
    #[serde(default, rename = "co2kg", skip_serializing_if = "Option::is_none")]
    pub co2_kg: Option<f64>,
    pub origin: String,
    pub destination: String,
    pub weight_kg: f64,
    pub volume_m3: f64,
    pub route: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub status: TaskStatus,
    pub request: PlanningRequest,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: TaskId, request: PlanningRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: TaskStatus::Pending,
            request,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteItem {
    pub sku: String,
    pub description: String,
    pub quantity: u32,
    pub unit_price_usd: f64,
    pub unit_weight_kg: f64,
    pub unit_volume_m3: f64,
    #[serde(default)]
    pub hs_code: Option<String>,
}

impl QuoteItem {
    pub fn line_total_usd(&self) -> f64 {
        self.unit_price_usd * f64::from(self.quantity)
    }
}

/// A saved quote the planner ships from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub id: QuoteId,
    pub customer: String,
    pub origin: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub items: Vec<QuoteItem>,
}

impl Quote {
    pub fn total_weight_kg(&self) -> f64 {
        self.items
            .iter()
            .map(|item| item.unit_weight_kg * f64::from(item.quantity))
            .sum()
    }

    pub fn total_volume_m3(&self) -> f64 {
        self.items
            .iter()
            .map(|item| item.unit_volume_m3 * f64::from(item.quantity))
            .sum()
    }

    pub fn total_value_usd(&self) -> f64 {
        self.items.iter().map(QuoteItem::line_total_usd).sum()
    }
}

/// Physical shipment derived from a quote and a destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentProfile {
    pub quote_id: QuoteId,
    pub origin: String,
    pub destination: String,
    pub weight_kg: f64,
    pub volume_m3: f64,
    pub declared_value_usd: f64,
}

impl ShipmentProfile {
    pub fn from_quote(quote: &Quote, destination: &str) -> Self {
        Self {
            quote_id: quote.id.clone(),
            origin: quote.origin.clone(),
            destination: destination.trim().to_string(),
            weight_kg: quote.total_weight_kg(),
            volume_m3: quote.total_volume_m3(),
            declared_value_usd: quote.total_value_usd(),
        }
    }
}

fn default_currency() -> String {
    "USD".to_string()
}
