use anyhow::{bail, Result};
use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tracing::debug;

use super::{recipe::out_target, DocumentStore, IndexSpec, UnsetRule};

/// In-process store for development and tests.
///
/// Aggregation pipelines are not evaluated: the call is recorded and its
/// `$out` target is created empty. Index builds are recorded per collection.
#[derive(Default, Clone)]
pub struct MemoryStore {
    collections: Arc<Mutex<HashMap<String, Vec<Document>>>>,
    indexes: Arc<Mutex<HashMap<String, Vec<IndexSpec>>>>,
    pipelines: Arc<Mutex<Vec<(String, Vec<Document>)>>>,
    ops: Arc<Mutex<Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a collection directly.
    pub fn put(&self, name: &str, docs: Vec<Document>) {
        self.collections
            .lock()
            .unwrap()
            .insert(name.to_string(), docs);
    }

    pub fn documents(&self, name: &str) -> Option<Vec<Document>> {
        self.collections.lock().unwrap().get(name).cloned()
    }

    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn indexes(&self, name: &str) -> Vec<IndexSpec> {
        self.indexes
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn pipelines(&self) -> Vec<(String, Vec<Document>)> {
        self.pipelines.lock().unwrap().clone()
    }

    /// Operation log, e.g. `insert global_temp`, in call order.
    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    fn log(&self, op: &str, name: &str) {
        debug!(op, collection = name, "memory store");
        self.ops.lock().unwrap().push(format!("{} {}", op, name));
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.log("drop", name);
        self.collections.lock().unwrap().remove(name);
        self.indexes.lock().unwrap().remove(name);
        Ok(())
    }

    async fn insert_many(&self, name: &str, docs: Vec<Document>) -> Result<usize> {
        self.log("insert", name);
        let n = docs.len();
        self.collections
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .extend(docs);
        Ok(n)
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.lock().unwrap().contains_key(name))
    }

    async fn aggregate(&self, source: &str, pipeline: Vec<Document>) -> Result<()> {
        self.log("aggregate", source);
        if let Some(target) = out_target(&pipeline) {
            self.collections
                .lock()
                .unwrap()
                .insert(target.to_string(), Vec::new());
        }
        self.pipelines
            .lock()
            .unwrap()
            .push((source.to_string(), pipeline));
        Ok(())
    }

    async fn create_indexes(&self, name: &str, specs: &[IndexSpec]) -> Result<()> {
        self.log("index", name);
        self.indexes
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .extend(specs.iter().cloned());
        Ok(())
    }

    async fn unset_fields(&self, name: &str, rule: &UnsetRule) -> Result<u64> {
        self.log("unset", name);
        let mut colls = self.collections.lock().unwrap();
        let docs = colls.entry(name.to_string()).or_default();
        Ok(docs.iter_mut().map(|d| rule.apply(d)).filter(|changed| *changed).count() as u64)
    }

    async fn rename_collection(&self, from: &str, to: &str) -> Result<()> {
        self.log("rename", from);
        let mut colls = self.collections.lock().unwrap();
        let Some(docs) = colls.remove(from) else {
            bail!("source namespace {} does not exist", from);
        };
        colls.insert(to.to_string(), docs);
        drop(colls);

        let mut idx = self.indexes.lock().unwrap();
        let specs = idx.remove(from).unwrap_or_default();
        idx.insert(to.to_string(), specs);
        Ok(())
    }

    async fn distinct(&self, name: &str, field: &str) -> Result<Vec<Bson>> {
        let colls = self.collections.lock().unwrap();
        let mut seen: Vec<Bson> = Vec::new();
        for doc in colls.get(name).into_iter().flatten() {
            if let Some(v) = doc.get(field) {
                if !seen.contains(v) {
                    seen.push(v.clone());
                }
            }
        }
        Ok(seen)
    }

    async fn date_span(&self, name: &str, field: &str) -> Result<Option<(Bson, Bson)>> {
        let colls = self.collections.lock().unwrap();
        let mut dates: Vec<_> = colls
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|d| d.get_datetime(field).ok().copied())
            .collect();
        dates.sort();
        Ok(match (dates.first(), dates.last()) {
            (Some(first), Some(last)) => Some((Bson::DateTime(*first), Bson::DateTime(*last))),
            _ => None,
        })
    }

    async fn replace_document(&self, name: &str, doc: Document) -> Result<()> {
        self.log("replace", name);
        let id = doc.get("_id").cloned();
        let mut colls = self.collections.lock().unwrap();
        let docs = colls.entry(name.to_string()).or_default();
        docs.retain(|d| d.get("_id").cloned() != id);
        docs.push(doc);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, DateTime};

    #[tokio::test]
    async fn rename_replaces_target() -> Result<()> {
        let store = MemoryStore::new();
        store.put("global", vec![doc! { "old": true }]);
        store.insert_many("global_temp", vec![doc! { "new": true }]).await?;
        store.rename_collection("global_temp", "global").await?;
        assert_eq!(store.documents("global"), Some(vec![doc! { "new": true }]));
        assert!(store.documents("global_temp").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn empty_insert_still_creates_collection() -> Result<()> {
        let store = MemoryStore::new();
        assert_eq!(store.insert_many("us_only_temp", vec![]).await?, 0);
        assert!(store.exists("us_only_temp").await?);
        assert_eq!(store.documents("us_only_temp"), Some(vec![]));
        Ok(())
    }

    #[tokio::test]
    async fn rename_of_missing_collection_fails() {
        let store = MemoryStore::new();
        assert!(store.rename_collection("nope", "global").await.is_err());
    }

    #[tokio::test]
    async fn distinct_and_date_span() -> Result<()> {
        let store = MemoryStore::new();
        let d1 = DateTime::from_millis(1_579_651_200_000);
        let d2 = DateTime::from_millis(1_579_737_600_000);
        store.put(
            "c",
            vec![
                doc! { "country": "A", "date": d2 },
                doc! { "country": "B", "date": d1 },
                doc! { "country": "A", "date": d1 },
            ],
        );
        assert_eq!(
            store.distinct("c", "country").await?,
            vec![Bson::from("A"), Bson::from("B")]
        );
        assert_eq!(
            store.date_span("c", "date").await?,
            Some((Bson::DateTime(d1), Bson::DateTime(d2)))
        );
        assert_eq!(store.date_span("empty", "date").await?, None);
        Ok(())
    }
}
