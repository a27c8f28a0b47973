use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    options::{IndexOptions, ReplaceOptions},
    Client, Collection, Database, IndexModel,
};
use tracing::debug;

use super::{DocumentStore, IndexSpec, UnsetRule};

/// MongoDB-backed store. One client per run.
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri)
            .await
            .context("connecting to MongoDB")?;
        let db = client.database(database);
        Ok(Self { client, db })
    }

    fn coll(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn drop_collection(&self, name: &str) -> Result<()> {
        self.coll(name)
            .drop(None)
            .await
            .with_context(|| format!("dropping {}", name))
    }

    async fn insert_many(&self, name: &str, docs: Vec<Document>) -> Result<usize> {
        if docs.is_empty() {
            self.db
                .create_collection(name, None)
                .await
                .with_context(|| format!("creating empty {}", name))?;
            return Ok(0);
        }
        let result = self
            .coll(name)
            .insert_many(docs, None)
            .await
            .with_context(|| format!("inserting into {}", name))?;
        Ok(result.inserted_ids.len())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let names = self
            .db
            .list_collection_names(doc! { "name": name })
            .await
            .with_context(|| format!("listing collections for {}", name))?;
        Ok(names.iter().any(|n| n == name))
    }

    async fn aggregate(&self, source: &str, pipeline: Vec<Document>) -> Result<()> {
        let mut cursor = self
            .coll(source)
            .aggregate(pipeline, None)
            .await
            .with_context(|| format!("aggregating {}", source))?;
        while cursor.try_next().await?.is_some() {}
        Ok(())
    }

    async fn create_indexes(&self, name: &str, specs: &[IndexSpec]) -> Result<()> {
        let models: Vec<IndexModel> = specs
            .iter()
            .map(|spec| {
                IndexModel::builder()
                    .keys(spec.keys_document())
                    .options(IndexOptions::builder().sparse(spec.sparse).build())
                    .build()
            })
            .collect();
        let created = self
            .coll(name)
            .create_indexes(models, None)
            .await
            .with_context(|| format!("creating indexes on {}", name))?;
        debug!(collection = name, indexes = ?created.index_names, "indexes created");
        Ok(())
    }

    async fn unset_fields(&self, name: &str, rule: &UnsetRule) -> Result<u64> {
        let result = self
            .coll(name)
            .update_many(rule.filter(), rule.update(), None)
            .await
            .with_context(|| format!("updating {}", name))?;
        Ok(result.modified_count)
    }

    async fn rename_collection(&self, from: &str, to: &str) -> Result<()> {
        let db = self.db.name();
        let cmd = doc! {
            "renameCollection": format!("{}.{}", db, from),
            "to": format!("{}.{}", db, to),
            "dropTarget": true,
        };
        self.client
            .database("admin")
            .run_command(cmd, None)
            .await
            .with_context(|| format!("renaming {} -> {}", from, to))?;
        Ok(())
    }

    async fn distinct(&self, name: &str, field: &str) -> Result<Vec<Bson>> {
        self.coll(name)
            .distinct(field, None, None)
            .await
            .with_context(|| format!("distinct {} on {}", field, name))
    }

    async fn date_span(&self, name: &str, field: &str) -> Result<Option<(Bson, Bson)>> {
        let path = format!("${}", field);
        let mut sort = Document::new();
        sort.insert(field, 1);
        let pipeline = vec![
            doc! { "$sort": sort },
            doc! {
                "$group": {
                    "_id": Bson::Null,
                    "first": { "$first": path.as_str() },
                    "last": { "$last": path.as_str() },
                }
            },
        ];
        let mut cursor = self
            .coll(name)
            .aggregate(pipeline, None)
            .await
            .with_context(|| format!("date span of {}", name))?;
        Ok(cursor.try_next().await?.and_then(|d| {
            let first = d.get("first")?.clone();
            let last = d.get("last")?.clone();
            Some((first, last))
        }))
    }

    async fn replace_document(&self, name: &str, doc: Document) -> Result<()> {
        let id = doc.get("_id").cloned().unwrap_or(Bson::Null);
        let opts = ReplaceOptions::builder().upsert(true).build();
        self.coll(name)
            .replace_one(doc! { "_id": id }, doc, opts)
            .await
            .with_context(|| format!("writing into {}", name))?;
        Ok(())
    }
}
