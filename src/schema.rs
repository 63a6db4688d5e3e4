// Response shapes the analysis service has emitted over its releases.
// Detection walks an explicit priority list; the first rule that matches wins.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaVariant {
    /// `{listing, valuation, images?, text_analysis?}`
    Listing,
    /// `{summary, text_analysis?}`
    Summary,
    /// `{vehicle?, market?, demand?, weaknesses?}`
    Composite,
    /// `{details, estimated_value, ai_confidence?}`
    Flat,
    /// `{brand, model, condition?, estimated_price?, confidence?}`
    TextAnalysis,
}

impl SchemaVariant {
    /// Detection order, highest priority first.
    pub const PRIORITY: [SchemaVariant; 5] = [
        SchemaVariant::Listing,
        SchemaVariant::Summary,
        SchemaVariant::Composite,
        SchemaVariant::Flat,
        SchemaVariant::TextAnalysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVariant::Listing => "listing",
            SchemaVariant::Summary => "summary",
            SchemaVariant::Composite => "composite",
            SchemaVariant::Flat => "flat",
            SchemaVariant::TextAnalysis => "text_analysis",
        }
    }

    fn matches(&self, obj: &Map<String, Value>) -> bool {
        match self {
            SchemaVariant::Listing => present(obj, "listing") && present(obj, "valuation"),
            SchemaVariant::Summary => present(obj, "summary"),
            SchemaVariant::Composite => ["vehicle", "market", "demand", "weaknesses"]
                .iter()
                .any(|k| present(obj, k)),
            SchemaVariant::Flat => present(obj, "details") && present(obj, "estimated_value"),
            // The text backend always sends both keys, with `null` for whatever
            // it could not recognize.
            SchemaVariant::TextAnalysis => obj.contains_key("brand") && obj.contains_key("model"),
        }
    }
}

impl std::fmt::Display for SchemaVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key counts as present when it exists and is not `null`.
pub fn present(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).is_some_and(|v| !v.is_null())
}

/// Classify a top-level object. `None` means no known variant matches.
pub fn detect(obj: &Map<String, Value>) -> Option<SchemaVariant> {
    SchemaVariant::PRIORITY.into_iter().find(|v| v.matches(obj))
}

/// Result of looking at the outermost layer of a payload.
#[derive(Debug, PartialEq)]
pub enum Envelope<'a> {
    /// The payload itself is (or is meant to be) a variant body.
    Bare(&'a Map<String, Value>),
    /// `{ok|success: true, data: {...}}` or bare `{data: {...}}`.
    Wrapped(&'a Map<String, Value>),
    /// The service explicitly reported failure (`ok`/`success` is `false`).
    Rejected { message: Option<String> },
    /// Not a JSON object at all.
    NotAnObject,
}

/// Peel at most one envelope layer.
///
/// Only an object with a `data` key (possibly `null`) is an envelope, and never
/// one that already matches a variant.
pub fn open_envelope(raw: &Value) -> Envelope<'_> {
    let Some(obj) = raw.as_object() else {
        return Envelope::NotAnObject;
    };

    if detect(obj).is_some() || !obj.contains_key("data") {
        return Envelope::Bare(obj);
    }

    let failed = ["ok", "success"]
        .iter()
        .any(|k| obj.get(*k).and_then(Value::as_bool) == Some(false));
    if failed {
        let message = ["message", "detail", "error"]
            .iter()
            .filter_map(|k| obj.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string);
        return Envelope::Rejected { message };
    }

    match obj.get("data").and_then(Value::as_object) {
        Some(inner) => Envelope::Wrapped(inner),
        None => Envelope::Bare(obj),
    }
}
