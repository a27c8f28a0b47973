//! Record linkage between the time-series tables and the lookup table.
//!
//! Every source keeps its rows in a [`RecordPool`]; matching takes a row out of
//! its slot, so a row can be linked at most once and whatever is left in a pool
//! afterwards is observable. Per-key queues of row indices replace linear scans.

use std::{
    collections::{HashMap, VecDeque},
    hash::Hash,
    time::Instant,
};
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::model::{AreaId, AreaKey, AreaRecord, DomesticGroup, GlobalGroup, Value};

/// All six normalized inputs.
#[derive(Debug, Clone, Default)]
pub struct Datasets {
    pub lookup: Vec<AreaRecord>,
    pub confirmed_global: Vec<AreaRecord>,
    pub deaths_global: Vec<AreaRecord>,
    pub recovered_global: Vec<AreaRecord>,
    pub confirmed_us: Vec<AreaRecord>,
    pub deaths_us: Vec<AreaRecord>,
}

/// Fix known defects in the source data before linking:
/// - Canada's recovered counts sit on one row without a province; it becomes
///   the `Recovered` pseudo-province used by the confirmed table.
/// - US rows without a `uid` are corrupt and dropped.
pub fn fix_source_quirks(data: &mut Datasets) {
    for rec in data.recovered_global.iter_mut() {
        let is_canada = rec.get("country").and_then(Value::as_str) == Some("Canada");
        if is_canada && rec.get("state").is_none() {
            rec.insert("state", Value::from("Recovered"));
        }
    }

    for (name, rows) in [
        ("confirmed_us", &mut data.confirmed_us),
        ("deaths_us", &mut data.deaths_us),
    ] {
        let before = rows.len();
        rows.retain(|r| r.get("uid").is_some());
        let dropped = before - rows.len();
        if dropped > 0 {
            warn!(table = name, dropped, "dropped rows without uid");
        }
    }
}

/// Row storage with take-once semantics.
#[derive(Debug)]
pub struct RecordPool {
    slots: Vec<Option<AreaRecord>>,
}

impl RecordPool {
    pub fn new(records: Vec<AreaRecord>) -> Self {
        Self {
            slots: records.into_iter().map(Some).collect(),
        }
    }

    /// Build a key → row-indices index. Rows without a key are not indexed.
    pub fn index_by<K, F>(&self, key_fn: F) -> KeyIndex<K>
    where
        K: Eq + Hash,
        F: Fn(&AreaRecord) -> Option<K>,
    {
        let mut buckets: HashMap<K, VecDeque<usize>> = HashMap::new();
        for (idx, slot) in self.slots.iter().enumerate() {
            if let Some(key) = slot.as_ref().and_then(&key_fn) {
                buckets.entry(key).or_default().push_back(idx);
            }
        }
        KeyIndex { buckets }
    }

    /// Take the first unconsumed row filed under `key`.
    pub fn take<K: Eq + Hash>(&mut self, index: &mut KeyIndex<K>, key: &K) -> Option<AreaRecord> {
        let queue = index.buckets.get_mut(key)?;
        while let Some(idx) = queue.pop_front() {
            if let Some(rec) = self.slots[idx].take() {
                return Some(rec);
            }
        }
        None
    }

    pub fn remaining(&self) -> impl Iterator<Item = &AreaRecord> {
        self.slots.iter().flatten()
    }

    pub fn remaining_len(&self) -> usize {
        self.remaining().count()
    }
}

#[derive(Debug)]
pub struct KeyIndex<K> {
    buckets: HashMap<K, VecDeque<usize>>,
}

/// Output of a successful linkage run.
#[derive(Debug, Default)]
pub struct Linked {
    pub global: Vec<GlobalGroup>,
    pub domestic: Vec<DomesticGroup>,
}

pub struct Linker {
    lookup: RecordPool,
    lookup_by_area: KeyIndex<AreaKey>,
    lookup_by_id: KeyIndex<AreaId>,
    deaths_global: RecordPool,
    deaths_global_idx: KeyIndex<AreaKey>,
    recovered_global: RecordPool,
    recovered_global_idx: KeyIndex<AreaKey>,
    deaths_us: RecordPool,
    deaths_us_idx: KeyIndex<AreaId>,
}

impl Linker {
    pub fn new(
        lookup: Vec<AreaRecord>,
        deaths_global: Vec<AreaRecord>,
        recovered_global: Vec<AreaRecord>,
        deaths_us: Vec<AreaRecord>,
    ) -> Self {
        let lookup = RecordPool::new(lookup);
        let deaths_global = RecordPool::new(deaths_global);
        let recovered_global = RecordPool::new(recovered_global);
        let deaths_us = RecordPool::new(deaths_us);
        Self {
            lookup_by_area: lookup.index_by(AreaKey::of),
            lookup_by_id: lookup.index_by(AreaId::of),
            deaths_global_idx: deaths_global.index_by(AreaKey::of),
            recovered_global_idx: recovered_global.index_by(AreaKey::of),
            deaths_us_idx: deaths_us.index_by(AreaId::of),
            lookup,
            deaths_global,
            recovered_global,
            deaths_us,
        }
    }

    /// Match global confirmed rows by (country, state).
    pub fn link_global(
        &mut self,
        confirmed: Vec<AreaRecord>,
    ) -> Result<Vec<GlobalGroup>, PipelineError> {
        let mut errors = Vec::new();
        let mut groups = Vec::with_capacity(confirmed.len());

        for rec in confirmed {
            let key = AreaKey::of(&rec);
            let (deaths, recovered, lookup) = match &key {
                Some(k) => (
                    self.deaths_global.take(&mut self.deaths_global_idx, k),
                    self.recovered_global
                        .take(&mut self.recovered_global_idx, k),
                    self.lookup.take(&mut self.lookup_by_area, k),
                ),
                None => (None, None, None),
            };

            match lookup {
                Some(lookup) => groups.push(GlobalGroup {
                    confirmed: rec,
                    deaths,
                    recovered,
                    lookup,
                }),
                None => {
                    let country = rec
                        .get("country")
                        .map(Value::to_string)
                        .unwrap_or_else(|| "<no country>".into());
                    errors.push(format!(
                        "No lookup entry found for {} => {}",
                        country,
                        rec.describe()
                    ));
                }
            }
        }

        if !errors.is_empty() {
            for e in &errors {
                error!("{}", e);
            }
            return Err(PipelineError::GlobalLinkage(errors));
        }
        Ok(groups)
    }

    /// Match US confirmed rows by `uid`.
    pub fn link_domestic(
        &mut self,
        confirmed: Vec<AreaRecord>,
    ) -> Result<Vec<DomesticGroup>, PipelineError> {
        let mut errors = Vec::new();
        let mut groups = Vec::with_capacity(confirmed.len());

        for rec in confirmed {
            let id = AreaId::of(&rec);
            let (deaths, lookup) = match &id {
                Some(id) => (
                    self.deaths_us.take(&mut self.deaths_us_idx, id),
                    self.lookup.take(&mut self.lookup_by_id, id),
                ),
                None => (None, None),
            };

            match lookup {
                Some(lookup) => groups.push(DomesticGroup {
                    confirmed: rec,
                    deaths,
                    lookup,
                }),
                None => {
                    let name = rec
                        .get("combined_name")
                        .or_else(|| rec.get("uid"))
                        .map(Value::to_string)
                        .unwrap_or_else(|| "<unnamed>".into());
                    errors.push(format!("No UID found for {} => {}", name, rec.describe()));
                }
            }
        }

        if !errors.is_empty() {
            for e in &errors {
                error!("{}", e);
            }
            return Err(PipelineError::DomesticLinkage(errors));
        }
        Ok(groups)
    }

    /// Fail if any deaths or recovered row was never consumed.
    pub fn finish(self) -> Result<(), PipelineError> {
        let mut errors = Vec::new();
        for (label, pool) in [
            ("deaths", &self.deaths_global),
            ("recovered", &self.recovered_global),
            ("US deaths", &self.deaths_us),
        ] {
            for rec in pool.remaining() {
                errors.push(format!("{} not handled: {}", label, rec.describe()));
            }
        }
        if errors.is_empty() {
            info!(
                unused_lookup = self.lookup.remaining_len(),
                "all deaths/recovered rows linked"
            );
            return Ok(());
        }
        for e in &errors {
            error!("{}", e);
        }
        Err(PipelineError::Unresolved(errors))
    }
}

/// Fix-ups, global pass, domestic pass, then the leftover check.
pub fn link_all(mut data: Datasets) -> Result<Linked, PipelineError> {
    let start = Instant::now();
    fix_source_quirks(&mut data);

    let Datasets {
        lookup,
        confirmed_global,
        deaths_global,
        recovered_global,
        confirmed_us,
        deaths_us,
    } = data;

    let mut linker = Linker::new(lookup, deaths_global, recovered_global, deaths_us);
    let global = linker.link_global(confirmed_global)?;
    let domestic = linker.link_domestic(confirmed_us)?;
    linker.finish()?;

    info!(
        global = global.len(),
        domestic = domestic.len(),
        elapsed = ?start.elapsed(),
        "linked areas"
    );
    Ok(Linked { global, domestic })
}
