#[derive(Debug, Default)]
pub struct RawTable {
    /// Column names, from the header row of the CSV file.
    pub headers: Vec<String>,
    /// Each data row, as a Vec of Strings (one per header).
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Rows as `(column, cell)` pairs, in column order.
    pub fn records<'a>(&'a self) -> impl Iterator<Item = Vec<(&'a str, &'a str)>> + 'a {
        self.rows.iter().map(move |row| {
            self.headers
                .iter()
                .map(String::as_str)
                .zip(row.iter().map(String::as_str))
                .collect()
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
