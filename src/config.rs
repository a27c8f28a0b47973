use std::{
    env,
    path::{Path, PathBuf},
};

use crate::error::PipelineError;

pub const DEFAULT_DB: &str = "covid19";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const TEMP_SUFFIX: &str = "_temp";

/// Runtime settings, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub mongodb_uri: String,
    pub database: String,
    pub data_dir: PathBuf,
    pub collections: Collections,
}

impl Config {
    /// `MONGODB_URI` is required; `COVID_DB` and `COVID_DATA_DIR` are optional.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, PipelineError> {
        let mongodb_uri = get("MONGODB_URI")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| PipelineError::Config("MONGODB_URI is not set".into()))?;
        Ok(Self {
            mongodb_uri,
            database: get("COVID_DB").unwrap_or_else(|| DEFAULT_DB.to_string()),
            data_dir: get("COVID_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            collections: Collections::default(),
        })
    }

    pub fn inputs(&self) -> InputPaths {
        InputPaths::under(&self.data_dir)
    }
}

/// A published collection and the suffix of its staging copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionTarget {
    pub name: String,
    pub temp_suffix: String,
}

impl CollectionTarget {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            temp_suffix: TEMP_SUFFIX.to_string(),
        }
    }

    pub fn temp_name(&self) -> String {
        format!("{}{}", self.name, self.temp_suffix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collections {
    pub global: CollectionTarget,
    pub us_only: CollectionTarget,
    pub global_and_us: CollectionTarget,
    pub countries_summary: CollectionTarget,
    pub metadata: String,
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            global: CollectionTarget::new("global"),
            us_only: CollectionTarget::new("us_only"),
            global_and_us: CollectionTarget::new("global_and_us"),
            countries_summary: CollectionTarget::new("countries_summary"),
            metadata: "metadata".to_string(),
        }
    }
}

impl Collections {
    /// Staged collections, in load order.
    pub fn staged(&self) -> [&CollectionTarget; 4] {
        [
            &self.global,
            &self.us_only,
            &self.global_and_us,
            &self.countries_summary,
        ]
    }
}

/// The six source tables, relative to the data directory.
#[derive(Debug, Clone)]
pub struct InputPaths {
    pub lookup: PathBuf,
    pub confirmed_global: PathBuf,
    pub deaths_global: PathBuf,
    pub recovered_global: PathBuf,
    pub confirmed_us: PathBuf,
    pub deaths_us: PathBuf,
}

impl InputPaths {
    pub fn under(data_dir: &Path) -> Self {
        let base = data_dir.join("csse_covid_19_data");
        let series = base.join("csse_covid_19_time_series");
        Self {
            lookup: base.join("UID_ISO_FIPS_LookUp_Table.csv"),
            confirmed_global: series.join("time_series_covid19_confirmed_global.csv"),
            deaths_global: series.join("time_series_covid19_deaths_global.csv"),
            recovered_global: series.join("time_series_covid19_recovered_global.csv"),
            confirmed_us: series.join("time_series_covid19_confirmed_US.csv"),
            deaths_us: series.join("time_series_covid19_deaths_US.csv"),
        }
    }
}
