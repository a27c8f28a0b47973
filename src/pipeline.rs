// src/pipeline.rs
use anyhow::{Context, Result};
use std::{path::Path, time::Instant};
use tracing::{info, instrument};

use crate::config::{Config, InputPaths};
use crate::load::{publish, Metadata};
use crate::model::{AreaRecord, Observations};
use crate::process::{
    link::{link_all, Datasets},
    load_table,
    normalize::normalize_table,
    reshape::reshape,
};
use crate::store::{DocumentStore, MongoStore};

fn read(path: &Path) -> Result<Vec<AreaRecord>> {
    let table = load_table(path)?;
    Ok(normalize_table(&table))
}

/// Parse and normalize the six source tables.
pub fn read_datasets(inputs: &InputPaths) -> Result<Datasets> {
    let data = Datasets {
        lookup: read(&inputs.lookup)?,
        confirmed_global: read(&inputs.confirmed_global)?,
        deaths_global: read(&inputs.deaths_global)?,
        recovered_global: read(&inputs.recovered_global)?,
        confirmed_us: read(&inputs.confirmed_us)?,
        deaths_us: read(&inputs.deaths_us)?,
    };
    info!(
        lookup = data.lookup.len(),
        confirmed_global = data.confirmed_global.len(),
        confirmed_us = data.confirmed_us.len(),
        "read source tables"
    );
    Ok(data)
}

/// Read, link and reshape. Nothing touches storage here.
#[instrument(level = "info", skip_all)]
pub fn build_observations(inputs: &InputPaths) -> Result<Observations> {
    let start = Instant::now();
    let data = read_datasets(inputs)?;
    let linked = link_all(data)?;
    let observations = reshape(&linked)?;
    info!(
        documents = observations.len(),
        elapsed = ?start.elapsed(),
        "observations ready"
    );
    Ok(observations)
}

/// Whole run against an already opened store.
pub async fn run_with_store<S: DocumentStore + ?Sized>(
    config: &Config,
    store: &S,
) -> Result<Metadata> {
    let observations = build_observations(&config.inputs())?;
    publish(store, &config.collections, &observations).await
}

/// Whole run: all input is validated before the database is contacted.
pub async fn run(config: &Config) -> Result<Metadata> {
    let observations = build_observations(&config.inputs())?;
    let store = MongoStore::connect(&config.mongodb_uri, &config.database)
        .await
        .with_context(|| format!("opening database {}", config.database))?;
    info!(database = %config.database, "connected");
    publish(&store, &config.collections, &observations).await
}
