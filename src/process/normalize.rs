//! Canonical field names, typed values and geo-points.

use crate::model::{AreaRecord, GeoPoint, Value};
use crate::process::{
    utils::{clean_str, is_blank, round4},
    RawTable,
};

/// Map a source header onto its canonical field name.
pub fn normalize_key(name: &str) -> String {
    let name = clean_str(name);
    match name {
        "Country_Region" | "Country/Region" => "country".into(),
        "iso2" => "country_iso2".into(),
        "iso3" => "country_iso3".into(),
        "code3" => "country_code".into(),
        "Admin2" => "city".into(),
        "Province_State" | "Province/State" => "state".into(),
        "Combined_Key" => "combined_name".into(),
        other => other.to_lowercase(),
    }
}

/// Integer, then float (4 decimals), else the cleaned text. Never fails.
pub fn normalize_value(raw: &str) -> Value {
    let cleaned = clean_str(raw);
    if let Ok(i) = cleaned.parse::<i64>() {
        return Value::Int(i);
    }
    match cleaned.parse::<f64>() {
        Ok(f) if f.is_finite() => Value::Float(round4(f)),
        _ => Value::Text(cleaned.to_string()),
    }
}

/// Move `lat`/`long` into a geo-point when both are non-zero.
///
/// Both fields are removed either way.
pub fn derive_geo(record: &mut AreaRecord) {
    let lat = record.remove("lat").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let long = record.remove("long").and_then(|v| v.as_f64()).unwrap_or(0.0);
    if lat != 0.0 && long != 0.0 {
        record.loc = Some(GeoPoint { long, lat });
    }
}

/// Normalize one raw row. Blank cells are left out of the record.
pub fn normalize_row<'a>(cells: impl IntoIterator<Item = (&'a str, &'a str)>) -> AreaRecord {
    let mut record = AreaRecord::default();
    for (key, raw) in cells {
        if is_blank(raw) {
            continue;
        }
        record.insert(normalize_key(key), normalize_value(raw));
    }
    derive_geo(&mut record);
    record
}

pub fn normalize_table(table: &RawTable) -> Vec<AreaRecord> {
    table.records().map(normalize_row).collect()
}
