use mongodb::bson::{Bson, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Ascending,
    Sphere2d,
}

impl IndexKind {
    fn to_bson(self) -> Bson {
        match self {
            IndexKind::Ascending => Bson::Int32(1),
            IndexKind::Sphere2d => Bson::String("2dsphere".into()),
        }
    }
}

/// One secondary index: ordered key fields plus the sparse flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub keys: Vec<(String, IndexKind)>,
    pub sparse: bool,
}

impl IndexSpec {
    pub fn asc(fields: &[&str]) -> Self {
        Self {
            keys: fields
                .iter()
                .map(|f| (f.to_string(), IndexKind::Ascending))
                .collect(),
            sparse: false,
        }
    }

    pub fn geo(field: &str) -> Self {
        Self {
            keys: vec![(field.to_string(), IndexKind::Sphere2d)],
            sparse: false,
        }
    }

    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    pub fn keys_document(&self) -> Document {
        let mut doc = Document::new();
        for (field, kind) in &self.keys {
            doc.insert(field.clone(), kind.to_bson());
        }
        doc
    }
}

/// Common to every per-area observation collection.
fn observation_base() -> Vec<IndexSpec> {
    vec![
        IndexSpec::asc(&["country_iso3", "date"]).sparse(),
        IndexSpec::asc(&["uid", "date"]),
        IndexSpec::asc(&["date"]),
        IndexSpec::geo("loc").sparse(),
    ]
}

/// `global`: countries and provinces, no cities.
pub fn global_indexes() -> Vec<IndexSpec> {
    let mut specs = observation_base();
    specs.push(IndexSpec::asc(&["country", "date"]).sparse());
    specs.push(IndexSpec::asc(&["country", "state", "date"]).sparse());
    specs
}

/// `us_only` and `global_and_us`: down to the county.
pub fn city_level_indexes() -> Vec<IndexSpec> {
    let mut specs = global_indexes();
    specs.push(IndexSpec::asc(&["country", "state", "city", "date"]).sparse());
    specs
}

/// `countries_summary`, keyed on the pluralized set fields.
pub fn countries_summary_indexes() -> Vec<IndexSpec> {
    vec![
        IndexSpec::asc(&["date"]),
        IndexSpec::asc(&["country", "date"]),
        IndexSpec::asc(&["country", "states", "date"]).sparse(),
        IndexSpec::asc(&["uids", "date"]),
        IndexSpec::asc(&["country_iso3s", "date"]).sparse(),
    ]
}
