use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{lenient_f64, lenient_string, lenient_timestamp, lenient_u32, reference, Identified};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPlan {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub interval: String,
    #[serde(default)]
    pub features: Vec<String>,
}

impl Identified for SubscriptionPlan {
    fn id(&self) -> &str {
        &self.id
    }
}

fn default_currency() -> String {
    "usd".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    #[serde(default, deserialize_with = "reference")]
    pub plan: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub current_period_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
}

impl Identified for Subscription {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        matches!(self.status.as_str(), "active" | "trialing")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessStatus {
    #[serde(default)]
    pub has_access: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// What the payment sheet needs to collect a card
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub client_secret: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub payment_intent_id: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

/// A saved card
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub brand: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub last4: String,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub exp_month: u32,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub exp_year: u32,
    #[serde(default)]
    pub is_default: bool,
}

impl Identified for PaymentMethod {
    fn id(&self) -> &str {
        &self.id
    }
}
