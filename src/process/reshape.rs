use indexmap::IndexMap;
use std::time::Instant;
use tracing::info;

use crate::error::PipelineError;
use crate::model::{AreaRecord, DomesticGroup, GlobalGroup, ObservationRecord, Observations, Value};
use crate::process::{date_parser::parse_column_date, link::Linked};

/// Expand one area's date columns into one observation per date.
///
/// `confirmed` drives the dates; `deaths` and `recovered` contribute values for
/// the same column when they have one.
pub fn expand_area(
    confirmed: &AreaRecord,
    deaths: Option<&AreaRecord>,
    recovered: Option<&AreaRecord>,
    lookup: &AreaRecord,
) -> Result<Vec<ObservationRecord>, PipelineError> {
    let identity: IndexMap<String, Value> = lookup
        .identity_fields()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    confirmed
        .date_columns()
        .map(|(column, value)| -> Result<ObservationRecord, PipelineError> {
            let date = parse_column_date(column).ok_or_else(|| PipelineError::Parse {
                file: "time series header".into(),
                message: format!("unparseable date column `{}`", column),
            })?;
            Ok(ObservationRecord {
                fields: identity.clone(),
                loc: lookup.loc,
                date,
                confirmed: value.clone(),
                deaths: deaths.and_then(|d| d.get(column)).cloned(),
                recovered: recovered.and_then(|r| r.get(column)).cloned(),
            })
        })
        .collect()
}

pub fn reshape_global(groups: &[GlobalGroup]) -> Result<Vec<ObservationRecord>, PipelineError> {
    let mut out = Vec::new();
    for g in groups {
        out.extend(expand_area(
            &g.confirmed,
            g.deaths.as_ref(),
            g.recovered.as_ref(),
            &g.lookup,
        )?);
    }
    Ok(out)
}

pub fn reshape_domestic(
    groups: &[DomesticGroup],
) -> Result<Vec<ObservationRecord>, PipelineError> {
    let mut out = Vec::new();
    for g in groups {
        out.extend(expand_area(&g.confirmed, g.deaths.as_ref(), None, &g.lookup)?);
    }
    Ok(out)
}

pub fn reshape(linked: &Linked) -> Result<Observations, PipelineError> {
    let start = Instant::now();
    let obs = Observations {
        global: reshape_global(&linked.global)?,
        domestic: reshape_domestic(&linked.domestic)?,
    };
    info!(
        global = obs.global.len(),
        domestic = obs.domestic.len(),
        elapsed = ?start.elapsed(),
        "generated observations"
    );
    Ok(obs)
}
