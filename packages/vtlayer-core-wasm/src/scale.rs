// Domain and scale computation for visual channels.
//
// A domain is computed once per aggregate (never per feature) and a scale is
// a pure mapping closed over one domain and one output range.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::color::Rgba;
use crate::error::{Error, Result};
use crate::filter::{as_number, strict_eq};

pub const DEFAULT_DOMAIN: [f64; 2] = [0.0, 1.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleKind {
    Ordinal,
    Quantile,
    Quantize,
    Linear,
    Sqrt,
}

impl FromStr for ScaleKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ordinal" | "point" => Ok(ScaleKind::Ordinal),
            "quantile" => Ok(ScaleKind::Quantile),
            "quantize" => Ok(ScaleKind::Quantize),
            "linear" => Ok(ScaleKind::Linear),
            "sqrt" => Ok(ScaleKind::Sqrt),
            _ => Err(Error::UnsupportedScaleKind(s.to_string())),
        }
    }
}

impl fmt::Display for ScaleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScaleKind::Ordinal => "ordinal",
            ScaleKind::Quantile => "quantile",
            ScaleKind::Quantize => "quantize",
            ScaleKind::Linear => "linear",
            ScaleKind::Sqrt => "sqrt",
        };
        f.write_str(name)
    }
}

/// Value domain of one field over one dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum Domain {
    /// Empty or single-valued dataset; every input maps to the first output.
    Default,
    /// Distinct values in order of first occurrence.
    Ordinal(Vec<Value>),
    /// Every numeric value, sorted ascending.
    Quantile(Vec<f64>),
    Quantize { min: f64, max: f64 },
    Linear { min: f64, max: f64 },
    Sqrt { min: f64, max: f64 },
}

impl Domain {
    /// Numeric bounds, `[0, 1]` for the default domain.
    pub fn bounds(&self) -> Option<[f64; 2]> {
        match self {
            Domain::Default => Some(DEFAULT_DOMAIN),
            Domain::Ordinal(_) => None,
            Domain::Quantile(sorted) => Some([*sorted.first()?, *sorted.last()?]),
            Domain::Quantize { min, max }
            | Domain::Linear { min, max }
            | Domain::Sqrt { min, max } => Some([*min, *max]),
        }
    }

    /// The `buckets - 1` cut points splitting a quantile domain into
    /// equal-population buckets. Empty for other domains.
    pub fn quantile_thresholds(&self, buckets: usize) -> Vec<f64> {
        match self {
            Domain::Quantile(sorted) if buckets > 1 => (1..buckets)
                .map(|i| quantile_sorted(sorted, i as f64 / buckets as f64))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Domain::Ordinal(values) => Value::Array(values.clone()),
            Domain::Quantile(sorted) => serde_json::json!(sorted),
            other => serde_json::json!(other.bounds().unwrap_or(DEFAULT_DOMAIN)),
        }
    }
}

// Hashable form of a scalar that agrees with `strict_eq`: numbers by value
// (so 50 and 50.0 collide), everything else by its JSON text.
#[derive(PartialEq, Eq, Hash)]
enum ScalarKey {
    Number(u64),
    Other(String),
}

impl ScalarKey {
    fn of(value: &Value) -> Self {
        match value {
            // adding 0.0 folds -0.0 into 0.0
            Value::Number(n) => match n.as_f64() {
                Some(x) => ScalarKey::Number((x + 0.0).to_bits()),
                None => ScalarKey::Other(n.to_string()),
            },
            other => ScalarKey::Other(other.to_string()),
        }
    }
}

/// Derive the domain of `values` for a scale kind.
///
/// Null values are ignored. Numeric kinds also ignore values that cannot be
/// read as numbers.
pub fn compute_domain<'a, I>(values: I, kind: ScaleKind) -> Domain
where
    I: IntoIterator<Item = &'a Value>,
{
    let values = values.into_iter().filter(|v| !v.is_null());

    match kind {
        ScaleKind::Ordinal => {
            let mut seen: HashSet<ScalarKey> = HashSet::new();
            let mut distinct: Vec<Value> = Vec::new();
            for value in values {
                if seen.insert(ScalarKey::of(value)) {
                    distinct.push(value.clone());
                }
            }
            if distinct.len() < 2 {
                Domain::Default
            } else {
                Domain::Ordinal(distinct)
            }
        }
        ScaleKind::Quantile => {
            let mut sorted: Vec<f64> = values.filter_map(as_number).collect();
            sorted.sort_by(f64::total_cmp);
            match (sorted.first(), sorted.last()) {
                (Some(first), Some(last)) if first < last => Domain::Quantile(sorted),
                _ => Domain::Default,
            }
        }
        ScaleKind::Quantize | ScaleKind::Linear | ScaleKind::Sqrt => {
            let (min, max) = values
                .filter_map(as_number)
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
            if !(min < max) {
                return Domain::Default;
            }
            match kind {
                ScaleKind::Quantize => Domain::Quantize { min, max },
                ScaleKind::Sqrt => Domain::Sqrt { min, max },
                _ => Domain::Linear { min, max },
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputValue {
    Color(Rgba),
    Number(f64),
}

impl OutputValue {
    pub fn as_color(&self) -> Option<Rgba> {
        match self {
            OutputValue::Color(c) => Some(*c),
            OutputValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            OutputValue::Number(n) => Some(*n),
            OutputValue::Color(_) => None,
        }
    }

    fn lerp(self, other: OutputValue, t: f64) -> OutputValue {
        match (self, other) {
            (OutputValue::Color(a), OutputValue::Color(b)) => OutputValue::Color(a.lerp(b, t)),
            (OutputValue::Number(a), OutputValue::Number(b)) => OutputValue::Number(a + (b - a) * t),
            // mixed ranges do not interpolate
            (a, _) => a,
        }
    }
}

/// Pure mapping from a property value to an output value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scale {
    Constant(OutputValue),
    Ordinal {
        domain: Vec<Value>,
        range: Vec<OutputValue>,
    },
    Quantile {
        thresholds: Vec<f64>,
        range: Vec<OutputValue>,
    },
    Quantize {
        min: f64,
        max: f64,
        range: Vec<OutputValue>,
    },
    Linear {
        min: f64,
        max: f64,
        sqrt: bool,
        range: Vec<OutputValue>,
    },
}

/// Build a scale over `domain` mapping into `range`.
///
/// An empty range is a caller bug and fails with `EmptyOutputRange`.
pub fn build_scale(domain: &Domain, range: Vec<OutputValue>) -> Result<Scale> {
    let first = *range.first().ok_or(Error::EmptyOutputRange)?;
    if range.len() == 1 {
        return Ok(Scale::Constant(first));
    }

    let scale = match domain {
        Domain::Default => Scale::Constant(first),
        Domain::Ordinal(values) => Scale::Ordinal {
            domain: values.clone(),
            range,
        },
        Domain::Quantile(_) => Scale::Quantile {
            thresholds: domain.quantile_thresholds(range.len()),
            range,
        },
        Domain::Quantize { min, max } => Scale::Quantize {
            min: *min,
            max: *max,
            range,
        },
        Domain::Linear { min, max } => Scale::Linear {
            min: *min,
            max: *max,
            sqrt: false,
            range,
        },
        Domain::Sqrt { min, max } => Scale::Linear {
            min: *min,
            max: *max,
            sqrt: true,
            range,
        },
    };
    Ok(scale)
}

impl Scale {
    pub fn constant(value: OutputValue) -> Self {
        Scale::Constant(value)
    }

    /// Map a property value. `None` when the value falls outside what the
    /// scale can place (unseen category, non-numeric input).
    pub fn apply(&self, value: &Value) -> Option<OutputValue> {
        match self {
            Scale::Constant(output) => Some(*output),
            Scale::Ordinal { domain, range } => {
                let idx = domain.iter().position(|d| strict_eq(d, value))?;
                Some(range[idx % range.len()])
            }
            Scale::Quantile { thresholds, range } => {
                let x = as_number(value)?;
                Some(range[bisect_right(thresholds, x).min(range.len() - 1)])
            }
            Scale::Quantize { min, max, range } => {
                let x = as_number(value)?;
                let n = range.len();
                let bucket = ((x - min) / (max - min) * n as f64).floor();
                Some(range[bucket.clamp(0.0, (n - 1) as f64) as usize])
            }
            Scale::Linear {
                min,
                max,
                sqrt,
                range,
            } => {
                let x = as_number(value)?;
                let t = if *sqrt {
                    (signed_sqrt(x) - signed_sqrt(*min)) / (signed_sqrt(*max) - signed_sqrt(*min))
                } else {
                    (x - min) / (max - min)
                };
                Some(interpolate(range, t))
            }
        }
    }
}

fn signed_sqrt(x: f64) -> f64 {
    x.signum() * x.abs().sqrt()
}

// Piecewise interpolation across evenly spaced range stops.
fn interpolate(range: &[OutputValue], t: f64) -> OutputValue {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let last = range.len() - 1;
    let pos = t * last as f64;
    let idx = (pos.floor() as usize).min(last.saturating_sub(1));
    if last == 0 {
        return range[0];
    }
    range[idx].lerp(range[idx + 1], pos - idx as f64)
}

// Index of the first threshold strictly greater than x.
fn bisect_right(thresholds: &[f64], x: f64) -> usize {
    thresholds.partition_point(|t| t.partial_cmp(&x) != Some(Ordering::Greater))
}

// R-7 quantile of an ascending sequence.
fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (sorted[hi] - sorted[lo]) * (h - lo as f64)
}
