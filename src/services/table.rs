//! Column-oriented in-memory table loaded from CSV or JSON workbooks.
//!
//! Cells are typed once at load time; rules and signatures read them by
//! column name and treat an absent column explicitly.

use crate::domain::errors::GuardError;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const NA_TOKENS: [&str; 8] = ["", "NA", "N/A", "NaN", "nan", "null", "NULL", "None"];

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    pub fn parse(field: &str) -> Cell {
        let trimmed = field.trim();
        if NA_TOKENS.contains(&trimmed) {
            return Cell::Null;
        }
        if let Ok(v) = trimmed.parse::<i64>() {
            return Cell::Int(v);
        }
        if let Ok(v) = trimmed.parse::<f64>() {
            return Cell::Float(v);
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Cell::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Cell::Bool(false);
        }
        Cell::Text(trimmed.to_owned())
    }

    fn from_json(value: &serde_json::Value) -> Cell {
        match value {
            serde_json::Value::Null => Cell::Null,
            serde_json::Value::Bool(b) => Cell::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Cell::Int(i),
                None => n.as_f64().map(Cell::Float).unwrap_or(Cell::Null),
            },
            serde_json::Value::String(s) => Cell::Text(s.clone()),
            other => Cell::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Null or whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(v) => Some(*v as f64),
            Cell::Float(v) => Some(*v),
            Cell::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Cell::Bool(b) => *b,
            Cell::Int(v) => *v != 0,
            Cell::Float(v) => *v != 0.0 && !v.is_nan(),
            _ => false,
        }
    }

    /// Stable text form used for keys, domains and hashing.
    pub fn canonical(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Bool(b) => b.to_string(),
            Cell::Int(v) => v.to_string(),
            Cell::Float(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => (*v as i64).to_string(),
            Cell::Float(v) => v.to_string(),
            Cell::Text(s) => s.clone(),
        }
    }

    pub fn matches_text(&self, wanted: &str) -> bool {
        !self.is_null() && self.canonical().trim().eq_ignore_ascii_case(wanted.trim())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    data: Vec<Vec<Cell>>,
    rows: usize,
}

impl Table {
    /// CSV by default; a `.json` workbook contributes its first sheet.
    pub fn load(path: &Path) -> Result<Table, GuardError> {
        if is_json(path) {
            let book = Table::load_json_workbook(path)?;
            return book
                .into_values()
                .next()
                .ok_or_else(|| GuardError::TableLoad {
                    path: path.to_path_buf(),
                    reason: "workbook has no sheets".to_string(),
                });
        }
        Table::load_csv(path)
    }

    pub fn load_csv(path: &Path) -> Result<Table, GuardError> {
        let raw = std::fs::read_to_string(path).map_err(|e| GuardError::TableLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Table::from_csv_str(&raw).map_err(|reason| GuardError::TableLoad {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn from_csv_str(input: &str) -> Result<Table, String> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(input.as_bytes());
        let headers = reader.headers().map_err(|e| e.to_string())?.clone();
        if headers.is_empty() {
            return Err("missing header row".to_string());
        }
        let names: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();
        let mut data: Vec<Vec<Cell>> = vec![Vec::new(); names.len()];
        let mut rows = 0;
        for record in reader.records() {
            let record = record.map_err(|e| e.to_string())?;
            for (idx, col) in data.iter_mut().enumerate() {
                col.push(Cell::parse(record.get(idx).unwrap_or_default()));
            }
            rows += 1;
        }
        Ok(Table::from_columns(names, data, rows))
    }

    /// `{ "<sheet>": [ {col: value, ...}, ... ], ... }`
    pub fn load_json_workbook(path: &Path) -> Result<BTreeMap<String, Table>, GuardError> {
        let err = |reason: String| GuardError::TableLoad {
            path: path.to_path_buf(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| err(e.to_string()))?;
        let value: serde_json::Value = serde_json::from_str(&raw).map_err(|e| err(e.to_string()))?;
        let sheets = value
            .as_object()
            .ok_or_else(|| err("workbook root is not an object".to_string()))?;
        let mut out = BTreeMap::new();
        for (name, rows) in sheets {
            let rows = rows
                .as_array()
                .ok_or_else(|| err(format!("sheet `{name}` is not an array of rows")))?;
            out.insert(name.clone(), Table::from_json_rows(rows));
        }
        Ok(out)
    }

    fn from_json_rows(rows: &[serde_json::Value]) -> Table {
        let mut names: Vec<String> = Vec::new();
        for row in rows {
            if let Some(obj) = row.as_object() {
                for key in obj.keys() {
                    if !names.contains(key) {
                        names.push(key.clone());
                    }
                }
            }
        }
        let mut data: Vec<Vec<Cell>> = vec![Vec::with_capacity(rows.len()); names.len()];
        for row in rows {
            for (idx, name) in names.iter().enumerate() {
                let cell = row.get(name).map(Cell::from_json).unwrap_or(Cell::Null);
                data[idx].push(cell);
            }
        }
        Table::from_columns(names, data, rows.len())
    }

    fn from_columns(names: Vec<String>, data: Vec<Vec<Cell>>, rows: usize) -> Table {
        let mut index = HashMap::new();
        for (idx, name) in names.iter().enumerate() {
            index.entry(name.clone()).or_insert(idx);
        }
        Table {
            columns: names,
            index,
            data,
            rows,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&[Cell]> {
        self.index.get(name).map(|&idx| self.data[idx].as_slice())
    }

    pub fn missing_columns<'a>(&self, wanted: impl IntoIterator<Item = &'a String>) -> Vec<String> {
        let mut missing: Vec<String> = wanted
            .into_iter()
            .filter(|c| !self.has_column(c))
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    /// Every non-null cell is a number.
    pub fn is_numeric_column(&self, name: &str) -> bool {
        self.column(name)
            .map(|cells| {
                let mut any = false;
                for cell in cells {
                    match cell {
                        Cell::Null => {}
                        Cell::Int(_) | Cell::Float(_) => any = true,
                        _ => return false,
                    }
                }
                any
            })
            .unwrap_or(false)
    }

    pub fn numeric_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| self.is_numeric_column(c))
            .map(|c| c.as_str())
            .collect()
    }

    pub fn non_finite_count(&self) -> usize {
        self.numeric_columns()
            .into_iter()
            .filter_map(|c| self.column(c))
            .flat_map(|cells| cells.iter())
            .filter(|cell| matches!(cell, Cell::Float(v) if !v.is_finite()))
            .count()
    }

    /// Sum over numeric columns with nulls counted as zero.
    pub fn numeric_sum(&self) -> f64 {
        self.numeric_columns()
            .into_iter()
            .filter_map(|c| self.column(c))
            .flat_map(|cells| cells.iter())
            .filter_map(Cell::as_f64)
            .sum()
    }

    pub fn row_key(&self, row: usize, columns: &[String]) -> Option<Vec<&Cell>> {
        columns
            .iter()
            .map(|c| self.column(c).map(|cells| &cells[row]))
            .collect()
    }
}

pub fn is_json(path: &Path) -> bool {
    extension_is(path, "json")
}

pub fn is_csv(path: &Path) -> bool {
    extension_is(path, "csv")
}

fn extension_is(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}
