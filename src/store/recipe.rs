//! Country-level daily summary, run by the database's aggregation engine.
//!
//! Groups per-area observations by `(country, date)`:
//! - identity fields become sets (`uids`, `country_iso2s`, `country_iso3s`,
//!   `country_codes`, `combined_names`), dropped when null
//! - `population` is the first non-null value, dropped when no area has one
//! - `confirmed` and `deaths` are summed
//! - `recovered` is summed only when at least one area reports it
//! - `states` lists the areas' states, dropped when no area has one

use mongodb::bson::{doc, Bson, Document};

/// `$addToSet` groups: (output field, source field).
const SET_FIELDS: [(&str, &str); 5] = [
    ("uids", "uid"),
    ("country_iso2s", "country_iso2"),
    ("country_iso3s", "country_iso3"),
    ("country_codes", "country_code"),
    ("combined_names", "combined_name"),
];

/// Keep `$field` unless it is null.
fn unless_null(field: &str) -> Bson {
    let path = format!("${}", field);
    Bson::Document(doc! { "$cond": [ { "$eq": [ path.as_str(), Bson::Null ] }, "$$REMOVE", path.as_str() ] })
}

/// First non-null element of the array `$field`; missing when there is none.
fn first_non_null(field: &str) -> Bson {
    let path = format!("${}", field);
    Bson::Document(doc! {
        "$arrayElemAt": [
            { "$filter": { "input": path.as_str(), "cond": { "$ne": [ "$$this", Bson::Null ] } } },
            0
        ]
    })
}

/// Keep `then` unless `$field` is an empty array.
fn unless_empty(field: &str, then: Bson) -> Bson {
    let path = format!("${}", field);
    Bson::Document(doc! { "$cond": [ { "$eq": [ path.as_str(), [] ] }, "$$REMOVE", then ] })
}

pub fn group_stage() -> Document {
    let mut group = doc! { "_id": { "country": "$country", "date": "$date" } };
    for (out, src) in SET_FIELDS {
        group.insert(out, doc! { "$addToSet": format!("${}", src) });
    }
    group.insert("population", doc! { "$push": "$population" });
    group.insert("confirmed", doc! { "$sum": "$confirmed" });
    group.insert("deaths", doc! { "$sum": "$deaths" });
    group.insert("recovered", doc! { "$push": "$recovered" });
    group.insert("states", doc! { "$push": "$state" });
    doc! { "$group": group }
}

pub fn project_stage() -> Document {
    let mut project = doc! {
        "_id": 0,
        "country": "$_id.country",
        "date": "$_id.date",
        "uids": 1,
    };
    for (out, _) in SET_FIELDS.iter().skip(1) {
        project.insert(*out, unless_null(out));
    }
    project.insert("population", first_non_null("population"));
    project.insert("confirmed", 1);
    project.insert("deaths", 1);
    project.insert(
        "recovered",
        unless_empty("recovered", Bson::Document(doc! { "$sum": "$recovered" })),
    );
    project.insert("states", unless_empty("states", Bson::String("$states".into())));
    doc! { "$project": project }
}

/// Full pipeline, writing into `out_collection`.
pub fn countries_summary_pipeline(out_collection: &str) -> Vec<Document> {
    vec![
        group_stage(),
        project_stage(),
        doc! { "$out": out_collection },
    ]
}

/// The `$out` target of a pipeline, if it has one.
pub fn out_target(pipeline: &[Document]) -> Option<&str> {
    pipeline.last()?.get_str("$out").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_writes_to_target() {
        let p = countries_summary_pipeline("countries_summary_temp");
        assert_eq!(p.len(), 3);
        assert_eq!(out_target(&p), Some("countries_summary_temp"));
    }

    #[test]
    fn group_keys_and_accumulators() {
        let stage = group_stage();
        let group = stage.get_document("$group").unwrap();
        assert_eq!(
            group.get_document("_id").unwrap(),
            &doc! { "country": "$country", "date": "$date" }
        );
        assert_eq!(
            group.get_document("uids").unwrap(),
            &doc! { "$addToSet": "$uid" }
        );
        assert_eq!(
            group.get_document("confirmed").unwrap(),
            &doc! { "$sum": "$confirmed" }
        );
        assert_eq!(
            group.get_document("states").unwrap(),
            &doc! { "$push": "$state" }
        );
        assert_eq!(
            group.get_document("population").unwrap(),
            &doc! { "$push": "$population" }
        );
    }

    #[test]
    fn optional_outputs_are_removed_when_empty() {
        let stage = project_stage();
        let project = stage.get_document("$project").unwrap();
        assert_eq!(
            project.get_document("recovered").unwrap(),
            &doc! { "$cond": [ { "$eq": [ "$recovered", [] ] }, "$$REMOVE", { "$sum": "$recovered" } ] }
        );
        assert_eq!(
            project.get_document("states").unwrap(),
            &doc! { "$cond": [ { "$eq": [ "$states", [] ] }, "$$REMOVE", "$states" ] }
        );
        assert_eq!(
            project.get_document("population").unwrap(),
            &doc! {
                "$arrayElemAt": [
                    { "$filter": { "input": "$population", "cond": { "$ne": [ "$$this", Bson::Null ] } } },
                    0
                ]
            }
        );
        assert_eq!(project.get_i32("uids").unwrap(), 1);
    }
}
