//! Storage sanitization for consensus values.
//!
//! Persisted indicators live in a NUMERIC(15,6)-shaped column, so values are
//! rounded to six decimal places (half away from zero) and anything at or
//! beyond 1e9 in magnitude is rejected outright rather than clamped.

use std::collections::HashMap;

use indicator_core::FieldConsensus;
use rust_decimal::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};

pub const STORAGE_DECIMAL_PLACES: u32 = 6;
pub const STORAGE_MAX_ABS: f64 = 1_000_000_000.0;

/// Rounds to storage precision, rejecting non-finite and out-of-range
/// values. Applying it twice returns the same result.
pub fn sanitize_value(value: f64) -> Option<f64> {
    if !value.is_finite() {
        return None;
    }
    let rounded = Decimal::from_f64(value)?
        .round_dp_with_strategy(STORAGE_DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero);
    let out = rounded.to_f64()?;
    // The range gate runs after rounding so a value that rounds up to the
    // storage maximum is still rejected.
    if out.abs() >= STORAGE_MAX_ABS {
        return None;
    }
    Some(out)
}

/// Builds the persistable field map from per-field consensus outcomes.
/// Fields without a final value, or whose value fails sanitization, are
/// dropped with a warning.
pub fn sanitize_record_fields(fields: &HashMap<String, FieldConsensus>) -> HashMap<String, f64> {
    let mut sanitized = HashMap::new();
    for (field, fc) in fields {
        let Some(value) = fc.final_value else {
            continue;
        };
        match sanitize_value(value) {
            Some(v) => {
                sanitized.insert(field.clone(), v);
            }
            None => {
                tracing::warn!(field = %field, value, "Dropping unstorable consensus value");
            }
        }
    }
    sanitized
}
