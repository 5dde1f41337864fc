//! Parsing of Kubernetes resource quantities into integral units.
//!
//! Pod specs express VRAM and TFLOPS as `Quantity` strings (`16Gi`, `100`,
//! `1.5T`). The scheduler works in plain integers (bytes, TFLOPS), so every
//! ingestion point funnels through [`parse_quantity`].

use crate::error::{Error, Result};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

const BINARY_SUFFIXES: &[(&str, u64)] = &[
    ("Ki", 1 << 10),
    ("Mi", 1 << 20),
    ("Gi", 1 << 30),
    ("Ti", 1 << 40),
    ("Pi", 1 << 50),
];

const DECIMAL_SUFFIXES: &[(&str, u64)] = &[
    ("k", 1_000),
    ("M", 1_000_000),
    ("G", 1_000_000_000),
    ("T", 1_000_000_000_000),
    ("P", 1_000_000_000_000_000),
];

/// Parse a quantity string into a non-negative integer count of base units.
///
/// Accepts plain integers, binary suffixes (`Ki`..`Pi`), decimal suffixes
/// (`k`..`P`), decimal mantissas (`1.5Gi`) and scientific notation (`1e3`).
/// Fractional results are truncated toward zero.
pub fn parse_quantity(value: &str) -> Result<u64> {
    let s = value.trim();
    if s.is_empty() {
        return Err(invalid(value, "empty string"));
    }
    if s.starts_with('-') {
        return Err(invalid(value, "negative quantity"));
    }

    let (mantissa, multiplier) = split_suffix(s);
    if mantissa.is_empty() {
        return Err(invalid(value, "missing numeric part"));
    }

    // Fast path: plain integer mantissa.
    if let Ok(n) = mantissa.parse::<u64>() {
        return n
            .checked_mul(multiplier)
            .ok_or_else(|| invalid(value, "overflows u64"));
    }

    // Decimal or scientific mantissa.
    let f: f64 = mantissa
        .parse()
        .map_err(|_| invalid(value, "not a number"))?;
    if !f.is_finite() || f < 0.0 {
        return Err(invalid(value, "not a finite non-negative number"));
    }
    let scaled = f * multiplier as f64;
    if scaled > u64::MAX as f64 {
        return Err(invalid(value, "overflows u64"));
    }
    Ok(scaled as u64)
}

/// Parse a `k8s_openapi` [`Quantity`].
pub fn parse_k8s_quantity(q: &Quantity) -> Result<u64> {
    parse_quantity(&q.0)
}

fn split_suffix(s: &str) -> (&str, u64) {
    for (suffix, mult) in BINARY_SUFFIXES {
        if let Some(mantissa) = s.strip_suffix(suffix) {
            return (mantissa, *mult);
        }
    }
    for (suffix, mult) in DECIMAL_SUFFIXES {
        if let Some(mantissa) = s.strip_suffix(suffix) {
            // `1e3` must not be treated as an exa-ish suffix; only strip a
            // decimal suffix when what remains still parses as a number.
            if mantissa.parse::<f64>().is_ok() {
                return (mantissa, *mult);
            }
        }
    }
    (s, 1)
}

fn invalid(value: &str, reason: &str) -> Error {
    Error::InvalidQuantity {
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
