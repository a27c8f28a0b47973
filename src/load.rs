// src/load.rs
//
// Staged publish: every collection is built under its temporary name and only
// renamed onto the published name once all of them are complete.

use anyhow::{Context, Result};
use mongodb::bson::{self, Bson, Document};
use serde::Serialize;
use std::time::Instant;
use tracing::{info, instrument};

use crate::config::Collections;
use crate::error::PipelineError;
use crate::model::{ObservationRecord, Observations};
use crate::store::{
    indexes::{city_level_indexes, countries_summary_indexes, global_indexes},
    recipe::countries_summary_pipeline,
    DocumentStore, UnsetRule,
};

pub const METADATA_ID: &str = "metadata";

/// Summary of what the published collections contain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    #[serde(rename = "_id")]
    pub id: String,
    pub countries: Vec<Bson>,
    pub states: Vec<Bson>,
    pub states_us: Vec<Bson>,
    pub cities: Vec<Bson>,
    pub iso3s: Vec<Bson>,
    pub uids: Vec<Bson>,
    pub first_date: Bson,
    pub last_date: Bson,
}

impl Metadata {
    pub fn to_document(&self) -> Result<Document> {
        bson::to_document(self).context("serializing metadata")
    }
}

fn to_documents<'a>(records: impl Iterator<Item = &'a ObservationRecord>) -> Vec<Document> {
    records.map(ObservationRecord::to_document).collect()
}

/// Drop empty values (null, `""`, zero, `false`, empty array or document)
/// from a `distinct` result.
fn present(values: Vec<Bson>) -> Vec<Bson> {
    values
        .into_iter()
        .filter(|v| match v {
            Bson::Null => false,
            Bson::String(s) => !s.is_empty(),
            Bson::Int32(i) => *i != 0,
            Bson::Int64(i) => *i != 0,
            Bson::Double(f) => *f != 0.0,
            Bson::Boolean(b) => *b,
            Bson::Array(a) => !a.is_empty(),
            Bson::Document(d) => !d.is_empty(),
            _ => true,
        })
        .collect()
}

async fn insert<S: DocumentStore + ?Sized>(
    store: &S,
    name: &str,
    docs: Vec<Document>,
) -> Result<usize> {
    let start = Instant::now();
    let n = store.insert_many(name, docs).await?;
    info!(collection = name, inserted = n, elapsed = ?start.elapsed(), "inserted");
    Ok(n)
}

/// Load all observation sets and the country summary, then publish them.
#[instrument(level = "info", skip_all)]
pub async fn publish<S: DocumentStore + ?Sized>(
    store: &S,
    collections: &Collections,
    observations: &Observations,
) -> Result<Metadata> {
    let start = Instant::now();
    for target in collections.staged() {
        store.drop_collection(&target.temp_name()).await?;
    }
    info!(elapsed = ?start.elapsed(), "dropped leftover temp collections");

    let global_tmp = collections.global.temp_name();
    let us_tmp = collections.us_only.temp_name();
    let union_tmp = collections.global_and_us.temp_name();
    let countries_tmp = collections.countries_summary.temp_name();

    insert(store, &global_tmp, to_documents(observations.global.iter())).await?;
    insert(store, &us_tmp, to_documents(observations.domestic.iter())).await?;
    insert(store, &union_tmp, to_documents(observations.combined())).await?;

    // The national US row is still present in `global`; the summary is built
    // from it alone so the state-level US rows do not double count.
    let start = Instant::now();
    store
        .aggregate(&global_tmp, countries_summary_pipeline(&countries_tmp))
        .await?;
    info!(collection = %countries_tmp, elapsed = ?start.elapsed(), "built country summary");

    let start = Instant::now();
    store.create_indexes(&global_tmp, &global_indexes()).await?;
    store.create_indexes(&us_tmp, &city_level_indexes()).await?;
    store.create_indexes(&union_tmp, &city_level_indexes()).await?;
    store
        .create_indexes(&countries_tmp, &countries_summary_indexes())
        .await?;
    info!(elapsed = ?start.elapsed(), "created indexes");

    let start = Instant::now();
    let fixed = store
        .unset_fields(&union_tmp, &UnsetRule::us_double_count())
        .await?;
    info!(collection = %union_tmp, documents = fixed, elapsed = ?start.elapsed(), "removed US double count");

    // Nothing is renamed unless every staged collection exists.
    let mut missing = Vec::new();
    for target in collections.staged() {
        let temp = target.temp_name();
        if !store.exists(&temp).await? {
            missing.push(temp);
        }
    }
    if !missing.is_empty() {
        return Err(PipelineError::Storage(format!(
            "staged collections missing before publish: {}",
            missing.join(", ")
        ))
        .into());
    }

    let start = Instant::now();
    for target in collections.staged() {
        store
            .rename_collection(&target.temp_name(), &target.name)
            .await?;
    }
    info!(elapsed = ?start.elapsed(), "renamed collections");

    write_metadata(store, collections).await
}

/// Rebuild the single metadata document from the published collections.
pub async fn write_metadata<S: DocumentStore + ?Sized>(
    store: &S,
    collections: &Collections,
) -> Result<Metadata> {
    let start = Instant::now();
    let union = collections.global_and_us.name.as_str();
    let us = collections.us_only.name.as_str();

    let (first_date, last_date) = store
        .date_span(union, "date")
        .await?
        .unwrap_or((Bson::Null, Bson::Null));

    let metadata = Metadata {
        id: METADATA_ID.to_string(),
        countries: present(store.distinct(union, "country").await?),
        states: present(store.distinct(union, "state").await?),
        states_us: present(store.distinct(us, "state").await?),
        cities: present(store.distinct(union, "city").await?),
        iso3s: present(store.distinct(union, "country_iso3").await?),
        uids: present(store.distinct(union, "uid").await?),
        first_date,
        last_date,
    };
    store
        .replace_document(&collections.metadata, metadata.to_document()?)
        .await?;
    info!(elapsed = ?start.elapsed(), "created metadata");
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;
    use crate::store::{IndexSpec, MemoryStore};
    use chrono::NaiveDate;
    use indexmap::IndexMap;
    use mongodb::bson::doc;

    fn obs(country: &str, state: Option<&str>, day: u32, confirmed: i64) -> ObservationRecord {
        let mut fields = IndexMap::new();
        fields.insert("country".to_string(), Value::from(country));
        if let Some(s) = state {
            fields.insert("state".to_string(), Value::from(s));
        }
        ObservationRecord {
            fields,
            loc: None,
            date: NaiveDate::from_ymd_opt(2020, 1, day).unwrap(),
            confirmed: Value::Int(confirmed),
            deaths: Some(Value::Int(1)),
            recovered: None,
        }
    }

    fn sample() -> Observations {
        Observations {
            global: vec![obs("US", None, 22, 100), obs("France", None, 23, 5)],
            domestic: vec![obs("US", Some("Texas"), 22, 50), obs("US", Some("Ohio"), 24, 50)],
        }
    }

    #[tokio::test]
    async fn publish_runs_stages_in_order() -> Result<()> {
        let store = MemoryStore::new();
        publish(&store, &Collections::default(), &sample()).await?;

        let ops = store.ops();
        let pos = |op: &str| ops.iter().position(|o| o == op).unwrap();
        assert!(pos("drop global_temp") < pos("insert global_temp"));
        assert!(pos("insert global_and_us_temp") < pos("aggregate global_temp"));
        assert!(pos("aggregate global_temp") < pos("index countries_summary_temp"));
        assert!(pos("index global_and_us_temp") < pos("unset global_and_us_temp"));
        assert!(pos("unset global_and_us_temp") < pos("rename global_temp"));
        assert!(pos("rename countries_summary_temp") < pos("replace metadata"));
        Ok(())
    }

    #[tokio::test]
    async fn publish_replaces_previous_collections() -> Result<()> {
        let store = MemoryStore::new();
        store.put("global", vec![doc! { "stale": true }]);
        publish(&store, &Collections::default(), &sample()).await?;

        assert_eq!(
            store.collection_names(),
            vec!["countries_summary", "global", "global_and_us", "metadata", "us_only"]
        );
        let global = store.documents("global").unwrap();
        assert_eq!(global.len(), 2);
        assert!(global.iter().all(|d| !d.contains_key("stale")));
        assert_eq!(store.documents("global_and_us").unwrap().len(), 4);
        assert_eq!(store.indexes("us_only"), city_level_indexes());
        assert_eq!(store.indexes("countries_summary"), countries_summary_indexes());
        Ok(())
    }

    #[tokio::test]
    async fn double_count_fixed_only_in_union() -> Result<()> {
        let store = MemoryStore::new();
        publish(&store, &Collections::default(), &sample()).await?;

        let union = store.documents("global_and_us").unwrap();
        let national = union
            .iter()
            .find(|d| d.get_str("country").ok() == Some("US") && !d.contains_key("state"))
            .unwrap();
        assert!(!national.contains_key("confirmed"));
        assert!(!national.contains_key("deaths"));
        let texas = union
            .iter()
            .find(|d| d.get_str("state").ok() == Some("Texas"))
            .unwrap();
        assert_eq!(texas.get_i64("confirmed")?, 50);

        let global = store.documents("global").unwrap();
        assert_eq!(global[0].get_i64("confirmed")?, 100);
        Ok(())
    }

    #[tokio::test]
    async fn summary_is_built_from_global_into_temp() -> Result<()> {
        let store = MemoryStore::new();
        publish(&store, &Collections::default(), &sample()).await?;
        let pipelines = store.pipelines();
        assert_eq!(pipelines.len(), 1);
        assert_eq!(pipelines[0].0, "global_temp");
        assert_eq!(
            pipelines[0].1.last(),
            Some(&doc! { "$out": "countries_summary_temp" })
        );
        Ok(())
    }

    #[tokio::test]
    async fn metadata_lists_distinct_values_and_span() -> Result<()> {
        let store = MemoryStore::new();
        let meta = publish(&store, &Collections::default(), &sample()).await?;

        assert_eq!(meta.countries, vec![Bson::from("US"), Bson::from("France")]);
        assert_eq!(meta.states, vec![Bson::from("Texas"), Bson::from("Ohio")]);
        assert_eq!(meta.states_us, meta.states);
        assert!(meta.cities.is_empty());
        assert_eq!(
            meta.first_date,
            Bson::DateTime(bson::DateTime::from_millis(1_579_651_200_000))
        );
        assert_eq!(
            meta.last_date,
            Bson::DateTime(bson::DateTime::from_millis(1_579_824_000_000))
        );

        let stored = store.documents("metadata").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].get_str("_id")?, "metadata");
        Ok(())
    }

    #[tokio::test]
    async fn empty_domestic_set_still_publishes_every_collection() -> Result<()> {
        let store = MemoryStore::new();
        let observations = Observations {
            global: sample().global,
            domestic: Vec::new(),
        };
        publish(&store, &Collections::default(), &observations).await?;

        assert_eq!(store.documents("us_only"), Some(vec![]));
        assert_eq!(store.documents("global").unwrap().len(), 2);
        assert_eq!(store.documents("global_and_us").unwrap().len(), 2);
        assert!(store.collection_names().iter().all(|n| !n.ends_with("_temp")));
        Ok(())
    }

    /// Behaves like a driver that only creates a collection on first write.
    struct LazyCreateStore(MemoryStore);

    #[async_trait::async_trait]
    impl DocumentStore for LazyCreateStore {
        async fn drop_collection(&self, name: &str) -> Result<()> {
            self.0.drop_collection(name).await
        }
        async fn insert_many(&self, name: &str, docs: Vec<Document>) -> Result<usize> {
            if docs.is_empty() {
                return Ok(0);
            }
            self.0.insert_many(name, docs).await
        }
        async fn exists(&self, name: &str) -> Result<bool> {
            self.0.exists(name).await
        }
        async fn aggregate(&self, source: &str, pipeline: Vec<Document>) -> Result<()> {
            self.0.aggregate(source, pipeline).await
        }
        async fn create_indexes(&self, name: &str, specs: &[IndexSpec]) -> Result<()> {
            self.0.create_indexes(name, specs).await
        }
        async fn unset_fields(&self, name: &str, rule: &UnsetRule) -> Result<u64> {
            self.0.unset_fields(name, rule).await
        }
        async fn rename_collection(&self, from: &str, to: &str) -> Result<()> {
            self.0.rename_collection(from, to).await
        }
        async fn distinct(&self, name: &str, field: &str) -> Result<Vec<Bson>> {
            self.0.distinct(name, field).await
        }
        async fn date_span(&self, name: &str, field: &str) -> Result<Option<(Bson, Bson)>> {
            self.0.date_span(name, field).await
        }
        async fn replace_document(&self, name: &str, doc: Document) -> Result<()> {
            self.0.replace_document(name, doc).await
        }
    }

    #[tokio::test]
    async fn missing_staged_collection_aborts_before_any_rename() -> Result<()> {
        let inner = MemoryStore::new();
        inner.put("global", vec![doc! { "published": true }]);
        let store = LazyCreateStore(inner.clone());
        let observations = Observations {
            global: sample().global,
            domestic: Vec::new(),
        };

        let err = publish(&store, &Collections::default(), &observations)
            .await
            .unwrap_err();
        assert_eq!(crate::error::exit_code_of(&err), 4);
        assert!(err.to_string().contains("us_only_temp"));
        assert!(!inner.ops().iter().any(|op| op.starts_with("rename")));
        assert_eq!(inner.documents("global"), Some(vec![doc! { "published": true }]));
        Ok(())
    }

    #[test]
    fn present_filters_empty_values() {
        let values = vec![
            Bson::Null,
            Bson::from(""),
            Bson::from("A"),
            Bson::Int64(0),
            Bson::Int32(0),
            Bson::Double(0.0),
            Bson::Int64(840),
            Bson::Boolean(false),
        ];
        assert_eq!(present(values), vec![Bson::from("A"), Bson::Int64(840)]);
    }
}
