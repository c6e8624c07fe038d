//! Maps raw scraped payloads onto canonical indicator readings.

pub mod catalog;
pub mod parse;
pub mod sanitize;

pub use catalog::*;
pub use parse::*;
pub use sanitize::*;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indicator_core::SourceReading;
use serde_json::Value;

/// Extracts one reading per canonical field a source exposed.
///
/// Alias lookup is case-insensitive. The first alias that parses to a finite
/// number wins; a zero on a field outside the zero allow-list is skipped as
/// if absent. When a field's alias keys exist but nothing usable parses, a
/// null reading is emitted so the audit trail shows the source covered the
/// field.
pub fn extract_readings(
    source: &str,
    raw: &HashMap<String, Value>,
    observed_at: DateTime<Utc>,
) -> Vec<SourceReading> {
    let normalized: HashMap<String, &Value> = raw
        .iter()
        .map(|(k, v)| (k.trim().to_lowercase(), v))
        .collect();

    let mut readings = Vec::new();
    for field in CATALOG {
        let mut saw_key = false;
        let mut value = None;
        for alias in field.aliases {
            let Some(candidate) = normalized.get(*alias) else {
                continue;
            };
            saw_key = true;
            let Some(parsed) = parse_numeric(candidate) else {
                continue;
            };
            if parsed == 0.0 && !field.zero_valid {
                tracing::debug!(
                    source = %source,
                    field = %field.id,
                    "Skipping zero reading on non-zero field"
                );
                continue;
            }
            value = Some(parsed);
            break;
        }
        if saw_key {
            readings.push(SourceReading {
                source: source.to_string(),
                field: field.id.to_string(),
                value,
                observed_at,
            });
        }
    }
    readings
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(entries: &[(&str, Value)]) -> HashMap<String, Value> {
        entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn reading<'a>(readings: &'a [SourceReading], field: &str) -> Option<&'a SourceReading> {
        readings.iter().find(|r| r.field == field)
    }

    #[test]
    fn maps_aliases_onto_canonical_ids() {
        let payload = raw(&[
            ("P/L", json!("8,54")),
            ("p_vp", json!(1.2)),
            ("dividend_yield", json!("5,46%")),
            ("volume", json!(123456)),
        ]);
        let readings = extract_readings("statusinvest", &payload, Utc::now());

        assert_eq!(readings.len(), 3);
        assert_eq!(reading(&readings, "pl").unwrap().value, Some(8.54));
        assert_eq!(reading(&readings, "pvp").unwrap().value, Some(1.2));
        assert_eq!(reading(&readings, "dy").unwrap().value, Some(5.46));
    }

    #[test]
    fn first_parseable_alias_wins() {
        let payload = raw(&[
            ("pl", json!("n/a")),
            ("preco_lucro", json!("9,10")),
        ]);
        let readings = extract_readings("fundamentus", &payload, Utc::now());
        assert_eq!(reading(&readings, "pl").unwrap().value, Some(9.10));
    }

    #[test]
    fn zero_outside_allow_list_is_skipped() {
        let payload = raw(&[
            ("pl", json!(0.0)),
            ("payout", json!(0.0)),
            ("net_debt_ebitda", json!("0,00")),
        ]);
        let readings = extract_readings("investidor10", &payload, Utc::now());

        // pl saw a key but only an unusable zero: null reading.
        assert_eq!(reading(&readings, "pl").unwrap().value, None);
        assert_eq!(reading(&readings, "payout").unwrap().value, Some(0.0));
        assert_eq!(reading(&readings, "net_debt_ebitda").unwrap().value, Some(0.0));
    }

    #[test]
    fn unknown_keys_produce_no_readings() {
        let payload = raw(&[("market_cap", json!(1e9)), ("beta", json!(1.1))]);
        let readings = extract_readings("tradingview", &payload, Utc::now());
        assert!(readings.is_empty());
    }

    #[test]
    fn unparseable_known_key_yields_null_reading() {
        let payload = raw(&[("roe", json!("--"))]);
        let readings = extract_readings("infomoney", &payload, Utc::now());
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].field, "roe");
        assert_eq!(readings[0].value, None);
    }
}
