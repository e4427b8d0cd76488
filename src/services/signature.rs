//! Deterministic fingerprints of tables and exports.
//!
//! Two signatures are equal exactly when the row count, the sorted column
//! set and every identity key's set of distinct values agree.

use crate::domain::config::IdentityKey;
use crate::domain::models::{
    ArtifactSignature, IdentityDigest, SheetSignature, TableSignature,
};
use crate::services::table::{self, Cell, Table};
use anyhow::Context;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// One identity cell, normalized so `12`, `12.0` and ` 12 ` hash alike.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum IdValue {
    Int(i64),
    Text(String),
}

impl IdValue {
    fn from_cell(cell: &Cell) -> Option<IdValue> {
        match cell {
            Cell::Null => None,
            Cell::Int(v) => Some(IdValue::Int(*v)),
            Cell::Bool(b) => Some(IdValue::Int(i64::from(*b))),
            Cell::Float(v) if v.is_nan() => None,
            Cell::Float(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => {
                Some(IdValue::Int(*v as i64))
            }
            Cell::Float(v) => Some(IdValue::Text(v.to_string())),
            Cell::Text(s) => {
                let s = s.trim();
                match s.parse::<i64>() {
                    Ok(v) => Some(IdValue::Int(v)),
                    Err(_) => Some(IdValue::Text(s.to_string())),
                }
            }
        }
    }

    fn render(&self) -> String {
        match self {
            IdValue::Int(v) => v.to_string(),
            IdValue::Text(s) => s.clone(),
        }
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn identity_digest(table: &Table, key: &IdentityKey) -> anyhow::Result<IdentityDigest> {
    let missing = table.missing_columns(&key.columns);
    if !missing.is_empty() {
        anyhow::bail!("identity key `{}` missing columns: {missing:?}", key.name);
    }
    let mut values: BTreeSet<Vec<IdValue>> = BTreeSet::new();
    for row in 0..table.row_count() {
        let Some(cells) = table.row_key(row, &key.columns) else {
            continue;
        };
        // Any null component drops the whole tuple.
        let tuple: Option<Vec<IdValue>> = cells.into_iter().map(IdValue::from_cell).collect();
        if let Some(tuple) = tuple {
            values.insert(tuple);
        }
    }
    // JSON nesting keeps tuple and value boundaries unambiguous.
    let rendered: Vec<Vec<String>> = values
        .iter()
        .map(|tuple| tuple.iter().map(IdValue::render).collect())
        .collect();
    let encoded = serde_json::to_vec(&rendered)?;
    Ok(IdentityDigest {
        unique_count: values.len(),
        hash: sha256_hex(&encoded),
    })
}

pub fn table_signature(table: &Table, keys: &[IdentityKey]) -> anyhow::Result<TableSignature> {
    let mut columns = table.column_names().to_vec();
    columns.sort();
    let mut identity = BTreeMap::new();
    for key in keys {
        identity.insert(key.name.clone(), identity_digest(table, key)?);
    }
    Ok(TableSignature {
        row_count: table.row_count(),
        columns,
        identity,
    })
}

fn sheet_signature(sheet: &Table) -> SheetSignature {
    SheetSignature {
        rows: sheet.row_count(),
        cols: sheet.column_count(),
        numeric_sum: sheet.numeric_sum(),
    }
}

/// CSV exports are a single sheet named after the file stem; JSON
/// workbooks contribute every sheet; anything else is hashed as bytes.
pub fn export_signature(path: &Path) -> anyhow::Result<ArtifactSignature> {
    if table::is_csv(path) {
        let sheet = Table::load_csv(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        return Ok(ArtifactSignature::Sheets {
            sheets: BTreeMap::from([(name, sheet_signature(&sheet))]),
        });
    }
    if table::is_json(path) {
        let book = Table::load_json_workbook(path)?;
        return Ok(ArtifactSignature::Sheets {
            sheets: book
                .iter()
                .map(|(name, sheet)| (name.clone(), sheet_signature(sheet)))
                .collect(),
        });
    }
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    Ok(ArtifactSignature::Binary {
        size_bytes: bytes.len() as u64,
        sha256: sha256_hex(&bytes),
    })
}
