// src/model.rs

use chrono::NaiveDate;
use indexmap::IndexMap;
use mongodb::bson::{self, doc, Bson, Document};
use serde::{Serialize, Serializer};
use std::{
    fmt,
    hash::{Hash, Hasher},
};

/// A typed cell value after normalization.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

// Floats compare by bit pattern so values can be used as hash keys.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&Value> for Bson {
    fn from(v: &Value) -> Self {
        match v {
            Value::Int(i) => Bson::Int64(*i),
            Value::Float(f) => Bson::Double(*f),
            Value::Text(s) => Bson::String(s.clone()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// GeoJSON point, stored as `{type: "Point", coordinates: [long, lat]}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub long: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn to_document(&self) -> Document {
        doc! { "type": "Point", "coordinates": [self.long, self.lat] }
    }
}

/// One normalized CSV row: canonical field name → value, in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AreaRecord {
    #[serde(flatten)]
    pub fields: IndexMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc: Option<GeoPoint>,
}

impl AreaRecord {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    /// Date-shaped columns (`M/D/YY`) in their original order.
    pub fn date_columns(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter().filter(|(k, _)| is_date_column(k))
    }

    /// Everything that is not a date column.
    pub fn identity_fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter().filter(|(k, _)| !is_date_column(k))
    }

    /// Compact JSON rendering used in diagnostics.
    pub fn describe(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

pub fn is_date_column(key: &str) -> bool {
    key.contains('/')
}

/// Composite key for global linkage. `country` is mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AreaKey {
    pub country: Value,
    pub state: Option<Value>,
}

impl AreaKey {
    pub fn of(record: &AreaRecord) -> Option<Self> {
        Some(Self {
            country: record.get("country")?.clone(),
            state: record.get("state").cloned(),
        })
    }
}

/// Unique area identifier for domestic linkage (`uid` column).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AreaId(pub Value);

impl AreaId {
    pub fn of(record: &AreaRecord) -> Option<Self> {
        record.get("uid").cloned().map(AreaId)
    }
}

/// Global linkage result for one area.
#[derive(Debug, Clone)]
pub struct GlobalGroup {
    pub confirmed: AreaRecord,
    pub deaths: Option<AreaRecord>,
    pub recovered: Option<AreaRecord>,
    pub lookup: AreaRecord,
}

/// Domestic (US) linkage result for one area.
#[derive(Debug, Clone)]
pub struct DomesticGroup {
    pub confirmed: AreaRecord,
    pub deaths: Option<AreaRecord>,
    pub lookup: AreaRecord,
}

/// One area on one day. This is the unit written to storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRecord {
    pub fields: IndexMap<String, Value>,
    pub loc: Option<GeoPoint>,
    pub date: NaiveDate,
    pub confirmed: Value,
    pub deaths: Option<Value>,
    pub recovered: Option<Value>,
}

impl ObservationRecord {
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        for (k, v) in &self.fields {
            doc.insert(k.clone(), Bson::from(v));
        }
        if let Some(loc) = &self.loc {
            doc.insert("loc", loc.to_document());
        }
        doc.insert("date", date_to_bson(self.date));
        doc.insert("confirmed", Bson::from(&self.confirmed));
        if let Some(d) = &self.deaths {
            doc.insert("deaths", Bson::from(d));
        }
        if let Some(r) = &self.recovered {
            doc.insert("recovered", Bson::from(r));
        }
        doc
    }
}

/// Midnight UTC of `date`.
pub fn date_to_bson(date: NaiveDate) -> Bson {
    let millis = date
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default();
    Bson::DateTime(bson::DateTime::from_millis(millis))
}

/// Both reshaped datasets; the union is derived on demand.
#[derive(Debug, Default)]
pub struct Observations {
    pub global: Vec<ObservationRecord>,
    pub domestic: Vec<ObservationRecord>,
}

impl Observations {
    pub fn combined(&self) -> impl Iterator<Item = &ObservationRecord> {
        self.global.iter().chain(self.domestic.iter())
    }

    pub fn len(&self) -> usize {
        self.global.len() + self.domestic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
