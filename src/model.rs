use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::SchemaVariant;

/// Untyped payload exactly as the analysis service sent it.
pub type RawResponse = Value;

/// Canonical view of one analysis, independent of which backend release produced it.
///
/// Every block is optional because every backend variant omits some of them.
/// Once built the value is never mutated; share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub variant: SchemaVariant,
    pub listing: Option<Listing>,
    pub vehicle: Option<Vehicle>,
    pub valuation: Option<Valuation>,
    pub market: Option<Market>,
    pub demand: Option<Demand>,
    pub flags: Vec<Flag>,
    pub summary: Option<Summary>,
    pub images: Vec<Image>,
    /// Verbatim payload, kept for diagnostics display.
    pub raw: RawResponse,
}

impl AnalysisResult {
    pub fn empty(variant: SchemaVariant, raw: RawResponse) -> Self {
        Self {
            variant,
            listing: None,
            vehicle: None,
            valuation: None,
            market: None,
            demand: None,
            flags: Vec::new(),
            summary: None,
            images: Vec::new(),
            raw,
        }
    }

    /// Flags of one category, in their original order.
    pub fn flags_of(&self, category: FlagCategory) -> impl Iterator<Item = &Flag> {
        self.flags.iter().filter(move |f| f.category == category)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub platform: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
}

impl Listing {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub mileage_km: Option<f64>,
    pub power_kw: Option<f64>,
    pub fuel_type: Option<String>,
    pub transmission: Option<String>,
    pub color: Option<String>,
    pub body_type: Option<String>,
    pub vin: Option<String>,
    /// Free-form condition label ("gebraucht", "unfallwagen", ...).
    pub condition: Option<String>,
}

impl Vehicle {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Valuation {
    pub estimated_value_eur: Option<f64>,
    pub confidence_low_eur: Option<f64>,
    pub confidence_high_eur: Option<f64>,
    pub confidence_percent: Option<f64>,
    pub method: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    pub average_market_value_eur: Option<f64>,
    pub price_difference_eur: Option<f64>,
    pub comparables: Option<u32>,
    pub valuation_label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Demand {
    pub score: Option<f64>,
    pub level: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub recommendation: Option<String>,
    pub fair_value_eur: Option<f64>,
    pub deal_score: Option<f64>,
    pub flip_score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagCategory {
    /// Known defect of the model/engine family.
    Weakness,
    /// Warning raised by text analysis of the advertisement.
    RedFlag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flag {
    pub category: FlagCategory,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub url: String,
}
