// src/process/raw_table.rs

/// An untyped census export as downloaded: cleaned header names plus every
/// data row as strings. Rows are padded to the header width on load.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// Column names from the header row, after `clean_str`.
    pub headers: Vec<String>,
    /// Each data row, one `String` per header.
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Borrow one column top to bottom. `None` if the column is absent.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }

    /// Rewrite every cell of `name` in place. Returns `false` if the column is absent.
    pub fn map_column(&mut self, name: &str, f: impl Fn(&str) -> String) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        for row in &mut self.rows {
            row[idx] = f(&row[idx]);
        }
        true
    }

    /// Keep rows for which `keep` holds; returns how many were removed.
    pub fn retain_rows(&mut self, mut keep: impl FnMut(&[String]) -> bool) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| keep(row));
        before - self.rows.len()
    }
}
