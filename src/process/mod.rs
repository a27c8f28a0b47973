// src/process/mod.rs
use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::{fs, io::Cursor, path::Path};
use tracing::debug;

use crate::error::PipelineError;

pub mod date_parser;
pub mod link;
pub mod normalize;
pub mod raw_table;
pub mod reshape;
pub mod utils;

pub use raw_table::RawTable;

/// Read a header-first CSV file into memory.
///
/// A leading UTF-8 byte-order mark is dropped. Rows whose field count does not
/// match the header abort the load with [`PipelineError::Parse`].
#[tracing::instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_table<P: AsRef<Path>>(path: P) -> Result<RawTable> {
    let path = path.as_ref();
    let data =
        fs::read(path).with_context(|| format!("Failed to read CSV file: {:?}", path))?;
    let table = parse_table(&path.display().to_string(), &data)?;
    debug!(rows = table.len(), columns = table.headers.len(), "loaded table");
    Ok(table)
}

/// Parse an in-memory CSV buffer. `name` is only used in error messages.
pub fn parse_table(name: &str, data: &[u8]) -> Result<RawTable, PipelineError> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(Cursor::new(data));

    let parse_err = |message: String| PipelineError::Parse {
        file: name.to_string(),
        message,
    };

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| parse_err(format!("bad header row: {}", e)))?
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| parse_err(format!("record {}: {}", idx, e)))?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }

    Ok(RawTable { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_table_keeps_order() -> Result<()> {
        let content = "Province/State,Country/Region,Lat,Long,1/22/20,1/23/20\n\
                       ,Afghanistan,33.93911,67.709953,0,0\n\
                       Quebec,Canada,52.9399,-73.5491,1,2\n";
        let table = parse_table("global.csv", content.as_bytes())?;
        assert_eq!(
            table.headers,
            vec!["Province/State", "Country/Region", "Lat", "Long", "1/22/20", "1/23/20"]
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[1][0], "Quebec");
        Ok(())
    }

    #[test]
    fn test_quoted_commas_survive() -> Result<()> {
        let content = "Admin2,Combined_Key\nAutauga,\"Autauga, Alabama, US\"\n";
        let table = parse_table("us.csv", content.as_bytes())?;
        assert_eq!(table.rows[0][1], "Autauga, Alabama, US");
        Ok(())
    }

    #[test]
    fn test_bom_is_stripped() -> Result<()> {
        let mut tmp = NamedTempFile::new()?;
        tmp.write_all(b"\xEF\xBB\xBFUID,iso2\n4,AF\n")?;
        let table = load_table(tmp.path())?;
        assert_eq!(table.headers[0], "UID");
        Ok(())
    }

    #[test]
    fn test_ragged_row_is_fatal() {
        let content = "a,b,c\n1,2,3\n4,5\n";
        let err = parse_table("bad.csv", content.as_bytes()).unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_table("/nonexistent/definitely/missing.csv").is_err());
    }
}
