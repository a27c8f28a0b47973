// src/store/mod.rs

use anyhow::Result;
use async_trait::async_trait;
use mongodb::bson::{Bson, Document};

pub mod indexes;
pub mod memory;
pub mod mongo;
pub mod recipe;

pub use indexes::{IndexKind, IndexSpec};
pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// The document-database operations the loader relies on.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Drop `name`; a missing collection is not an error.
    async fn drop_collection(&self, name: &str) -> Result<()>;

    /// Append `docs`. The collection exists afterwards even when `docs` is empty.
    async fn insert_many(&self, name: &str, docs: Vec<Document>) -> Result<usize>;

    async fn exists(&self, name: &str) -> Result<bool>;

    /// Run an aggregation over `source`. The pipeline writes its own output (`$out`).
    async fn aggregate(&self, source: &str, pipeline: Vec<Document>) -> Result<()>;

    async fn create_indexes(&self, name: &str, specs: &[IndexSpec]) -> Result<()>;

    /// Apply `rule` to every matching document, returning how many changed.
    async fn unset_fields(&self, name: &str, rule: &UnsetRule) -> Result<u64>;

    /// Rename `from` onto `to`, replacing any existing `to`.
    async fn rename_collection(&self, from: &str, to: &str) -> Result<()>;

    async fn distinct(&self, name: &str, field: &str) -> Result<Vec<Bson>>;

    /// Earliest and latest value of `field`, or `None` for an empty collection.
    async fn date_span(&self, name: &str, field: &str) -> Result<Option<(Bson, Bson)>>;

    /// Upsert `doc` by its `_id`.
    async fn replace_document(&self, name: &str, doc: Document) -> Result<()>;
}

/// "Where `field == equals` and `missing` is absent, remove `unset`."
#[derive(Debug, Clone, PartialEq)]
pub struct UnsetRule {
    pub field: String,
    pub equals: Bson,
    pub missing: String,
    pub unset: Vec<String>,
}

impl UnsetRule {
    /// National US rows repeat the sum of the state rows.
    pub fn us_double_count() -> Self {
        Self {
            field: "country".into(),
            equals: Bson::String("US".into()),
            missing: "state".into(),
            unset: vec!["deaths".into(), "confirmed".into()],
        }
    }

    pub fn filter(&self) -> Document {
        let mut exists = Document::new();
        exists.insert("$exists", false);
        let mut filter = Document::new();
        filter.insert(self.field.clone(), self.equals.clone());
        filter.insert(self.missing.clone(), exists);
        filter
    }

    pub fn update(&self) -> Document {
        let mut fields = Document::new();
        for f in &self.unset {
            fields.insert(f.clone(), "");
        }
        let mut update = Document::new();
        update.insert("$unset", fields);
        update
    }

    pub fn matches(&self, doc: &Document) -> bool {
        doc.get(&self.field) == Some(&self.equals) && !doc.contains_key(&self.missing)
    }

    /// In-process equivalent of `update_many(filter, update)` for one document.
    pub fn apply(&self, doc: &mut Document) -> bool {
        if !self.matches(doc) {
            return false;
        }
        let mut changed = false;
        for f in &self.unset {
            changed |= doc.remove(f).is_some();
        }
        changed
    }
}
