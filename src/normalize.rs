// Maps any recognized service payload into an AnalysisResult. Pure: no logging,
// no I/O. A recognized shape never fails; missing or garbled fields end up absent.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

use crate::error::NormalizeError;
use crate::model::{
    AnalysisResult, Demand, Flag, FlagCategory, Image, Listing, Market, RawResponse, Summary,
    Valuation, Vehicle,
};
use crate::schema::{detect, open_envelope, Envelope, SchemaVariant};

type Object = Map<String, Value>;

static NUMBER_WITH_UNITS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:€|eur)?\s*(-?[\d][\d.,'\s]*)\s*(?:€|eur|euro|km|kw|ps|%)?$").unwrap()
});
static GROUPED_DOTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[1-9]\d{0,2}(?:\.\d{3})+$").unwrap());
static GROUPED_COMMAS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[1-9]\d{0,2}(?:,\d{3})+$").unwrap());
static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());

pub fn normalize(raw: &RawResponse) -> Result<AnalysisResult, NormalizeError> {
    let body = match open_envelope(raw) {
        Envelope::Bare(obj) | Envelope::Wrapped(obj) => obj,
        Envelope::Rejected { message } => {
            return Err(NormalizeError::Rejected {
                message,
                raw: raw.clone(),
            })
        }
        Envelope::NotAnObject => return Err(unknown(raw)),
    };

    let variant = detect(body).ok_or_else(|| unknown(raw))?;
    let mut result = AnalysisResult::empty(variant, raw.clone());

    match variant {
        SchemaVariant::Listing => map_listing_variant(body, &mut result),
        SchemaVariant::Summary => map_summary_variant(body, &mut result),
        SchemaVariant::Composite => map_composite_variant(body, &mut result),
        SchemaVariant::Flat => map_flat_variant(body, &mut result),
        SchemaVariant::TextAnalysis => map_text_variant(body, &mut result),
    }

    Ok(result)
}

fn unknown(raw: &RawResponse) -> NormalizeError {
    NormalizeError::UnknownShape { raw: raw.clone() }
}

// --- Variant mappers ---

fn map_listing_variant(body: &Object, out: &mut AnalysisResult) {
    let listing = object(body, "listing");
    out.listing = listing.map(read_listing);
    out.vehicle = object(body, "vehicle").map(read_vehicle);
    out.valuation = object(body, "valuation").map(read_valuation);
    out.summary = object(body, "summary").map(read_summary);

    out.images = read_images(body.get("images"));
    if out.images.is_empty() {
        out.images = read_images(listing.and_then(|l| l.get("images")));
    }

    out.flags = red_flags(body);
}

fn map_summary_variant(body: &Object, out: &mut AnalysisResult) {
    out.summary = object(body, "summary").map(read_summary);
    out.flags = red_flags(body);
}

fn map_composite_variant(body: &Object, out: &mut AnalysisResult) {
    if let Some(v) = object(body, "vehicle") {
        // v2 puts listing attributes in its vehicle block and has no make/model pair.
        let listing = read_listing(v);
        out.listing = (!listing.is_empty()).then_some(listing);
        out.vehicle = Some(read_vehicle(v));
    }

    out.market = object(body, "market").map(|m| Market {
        average_market_value_eur: number(m, &["average_market_value", "average_market_value_eur"]),
        price_difference_eur: number(m, &["price_difference", "price_difference_eur"]),
        comparables: m.get("comparables").and_then(count),
        valuation_label: text(m, &["valuation", "valuation_label"]),
    });

    out.demand = object(body, "demand").map(|d| Demand {
        score: number(d, &["score"]),
        level: text(d, &["demand_level", "level"]),
    });

    out.flags = string_list(body.get("weaknesses"))
        .into_iter()
        .map(|text| Flag {
            category: FlagCategory::Weakness,
            text,
        })
        .collect();
}

fn map_flat_variant(body: &Object, out: &mut AnalysisResult) {
    if let Some(details) = object(body, "details") {
        let mut listing = read_listing(details);
        listing.price = number(details, &["original_price", "price"]);
        out.listing = (!listing.is_empty()).then_some(listing);

        let vehicle = read_vehicle(details);
        out.vehicle = (!vehicle.is_empty()).then_some(vehicle);
    }

    out.valuation = Some(Valuation {
        estimated_value_eur: number(body, &["estimated_value"]),
        confidence_low_eur: number(body, &["conf_low_eur", "confidence_low_eur"]),
        confidence_high_eur: number(body, &["conf_high_eur", "confidence_high_eur"]),
        confidence_percent: number(body, &["ai_confidence"]),
        method: text(body, &["method"]),
        notes: notes(body.get("notes")),
    });
}

fn map_text_variant(body: &Object, out: &mut AnalysisResult) {
    out.vehicle = Some(Vehicle {
        make: text(body, &["brand"]),
        model: text(body, &["model"]),
        condition: text(body, &["condition"]),
        ..Vehicle::default()
    });

    out.valuation = Some(Valuation {
        estimated_value_eur: number(body, &["estimated_price", "estimated_value"]),
        confidence_percent: body.get("confidence").and_then(fraction_to_percent),
        method: Some("text".to_string()),
        ..Valuation::default()
    });
}

// --- Block readers shared by several variants ---

fn read_listing(obj: &Object) -> Listing {
    Listing {
        platform: text(obj, &["platform", "domain"]),
        title: text(obj, &["title"]),
        url: text(obj, &["url"]),
        description: text(obj, &["description"]),
        price: number(obj, &["price", "price_eur"]),
    }
}

fn read_vehicle(obj: &Object) -> Vehicle {
    let make = text(obj, &["make", "brand", "Marke"]);
    let mut model = text(obj, &["model", "Modell"]);
    if make.is_none() && model.is_none() {
        model = text(obj, &["title"]);
    }

    let year = integer(obj, &["year"]).or_else(|| {
        ["first_registration", "firstRegistration"]
            .iter()
            .filter_map(|k| obj.get(*k).and_then(Value::as_str))
            .find_map(year_from_text)
    });

    Vehicle {
        make,
        model,
        year: year.and_then(|y| i32::try_from(y).ok()),
        mileage_km: number(obj, &["mileage_km", "mileage", "mileageKm"]),
        power_kw: number(obj, &["power_kw", "powerKw", "power"]),
        fuel_type: text(obj, &["fuel_type", "fuelType", "fuel"]),
        transmission: text(obj, &["transmission", "gearbox"]),
        color: text(obj, &["color", "colour"]),
        body_type: text(obj, &["body_type", "bodyType"]),
        vin: text(obj, &["vin"]),
        condition: text(obj, &["condition"]),
    }
}

fn read_valuation(obj: &Object) -> Valuation {
    let confidence_percent = number(obj, &["confidence_percent", "ai_confidence"])
        .or_else(|| obj.get("confidence").and_then(fraction_to_percent));

    Valuation {
        estimated_value_eur: number(obj, &["estimated_value_eur", "estimated_value"]),
        confidence_low_eur: number(obj, &["confidence_low_eur", "conf_low_eur"]),
        confidence_high_eur: number(obj, &["confidence_high_eur", "conf_high_eur"]),
        confidence_percent,
        method: text(obj, &["method"]),
        notes: notes(obj.get("notes")),
    }
}

fn read_summary(obj: &Object) -> Summary {
    Summary {
        recommendation: text(obj, &["recommendation"]),
        fair_value_eur: number(obj, &["fair_value_eur", "fair_value"]),
        deal_score: number(obj, &["deal_score"]),
        flip_score: number(obj, &["flip_score"]),
    }
}

fn red_flags(body: &Object) -> Vec<Flag> {
    let list = object(body, "text_analysis").and_then(|t| t.get("red_flags"));
    string_list(list)
        .into_iter()
        .map(|text| Flag {
            category: FlagCategory::RedFlag,
            text,
        })
        .collect()
}

fn read_images(value: Option<&Value>) -> Vec<Image> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.as_str()),
            Value::Object(o) => o.get("url").and_then(Value::as_str),
            _ => None,
        })
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|url| Image {
            url: url.to_string(),
        })
        .collect()
}

// --- Field helpers ---

fn object<'a>(obj: &'a Object, key: &str) -> Option<&'a Object> {
    obj.get(key).and_then(Value::as_object)
}

/// First non-blank string among `keys`. Numbers are accepted and rendered
/// (a model of `320` is still a model name).
fn text(obj: &Object, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// First coercible number among `keys`.
fn number(obj: &Object, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| obj.get(*k).and_then(coerce_number))
}

fn integer(obj: &Object, keys: &[&str]) -> Option<i64> {
    number(obj, keys).and_then(as_integer)
}

fn as_integer(n: f64) -> Option<i64> {
    (n.fract() == 0.0 && n.abs() < i64::MAX as f64).then_some(n as i64)
}

/// Numeric coercion used for every price/mileage/score field.
///
/// JSON numbers pass through; strings such as `"12.000 €"`, `"50,000 km"` or
/// `"0.82"` are parsed. Everything else is `None`: never NaN, never 0.
pub fn coerce_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_numeric_str(s)?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn parse_numeric_str(s: &str) -> Option<f64> {
    let caps = NUMBER_WITH_UNITS.captures(s.trim())?;
    let digits: String = caps[1]
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'')
        .collect();

    let has_dot = digits.contains('.');
    let has_comma = digits.contains(',');
    let canonical = match (has_dot, has_comma) {
        // Whichever separator comes last is the decimal point.
        (true, true) => {
            let dot = digits.rfind('.')?;
            let comma = digits.rfind(',')?;
            if comma > dot {
                digits.replace('.', "").replace(',', ".")
            } else {
                digits.replace(',', "")
            }
        }
        (true, false) if GROUPED_DOTS.is_match(&digits) => digits.replace('.', ""),
        (false, true) if GROUPED_COMMAS.is_match(&digits) => digits.replace(',', ""),
        (false, true) => digits.replace(',', "."),
        _ => digits,
    };

    canonical.parse::<f64>().ok()
}

/// Confidence given as a 0..1 fraction becomes a percentage; values already
/// above 1 are taken as percentages.
fn fraction_to_percent(value: &Value) -> Option<f64> {
    let n = coerce_number(value)?;
    if (0.0..=1.0).contains(&n) {
        Some((n * 10_000.0).round() / 100.0)
    } else {
        Some(n)
    }
}

/// `comparables` is a count in v2; a list of comparables counts its entries.
fn count(value: &Value) -> Option<u32> {
    if let Some(items) = value.as_array() {
        return u32::try_from(items.len()).ok();
    }
    coerce_number(value)
        .and_then(as_integer)
        .and_then(|n| u32::try_from(n).ok())
}

fn year_from_text(s: &str) -> Option<i64> {
    YEAR.find(s).and_then(|m| m.as_str().parse().ok())
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn notes(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Array(_) => {
            let joined = string_list(value).join("; ");
            (!joined.is_empty()).then_some(joined)
        }
        _ => None,
    }
}
