// 📋 Raw Table - In-memory representation of one ledger export
// Canonical input for both pipelines: headers + string cells, nothing parsed yet

use serde::{Deserialize, Serialize};

// ============================================================================
// RECONCILE ERROR
// ============================================================================

/// Structural failures that abort a whole run.
///
/// Per-row parse failures never land here - they degrade to nulls and the
/// affected row is dropped or carried with nulls by the owning component.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileError {
    /// A required column is absent from an input table.
    /// Carries the exact business column names so the caller can surface
    /// them verbatim.
    MissingColumns {
        table: String,
        columns: Vec<String>,
    },
}

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileError::MissingColumns { table, columns } => {
                write!(
                    f,
                    "table '{}' is missing required columns: {}",
                    table,
                    columns.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for ReconcileError {}

// ============================================================================
// RAW TABLE
// ============================================================================

/// One raw ledger table, fully materialized in memory.
///
/// Column names are business-defined strings ("Fecha de Pago", "Placa", ...),
/// not identifiers. Lookup is case-insensitive and whitespace-trimmed to
/// tolerate heterogeneous spreadsheet exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        RawTable { columns, rows }
    }

    pub fn empty(columns: Vec<String>) -> Self {
        RawTable {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Find a column index by name (trimmed, case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let wanted = name.trim().to_lowercase();
        self.columns
            .iter()
            .position(|c| c.trim().to_lowercase() == wanted)
    }

    /// Resolve all required columns or fail naming every absent one.
    ///
    /// This runs before any row processing: a schema defect aborts the run
    /// with the full list of missing business column names.
    pub fn require_columns(
        &self,
        table_name: &str,
        names: &[&str],
    ) -> Result<Vec<usize>, ReconcileError> {
        let mut indices = Vec::with_capacity(names.len());
        let mut missing = Vec::new();

        for name in names {
            match self.column_index(name) {
                Some(idx) => indices.push(idx),
                None => missing.push(name.to_string()),
            }
        }

        if missing.is_empty() {
            Ok(indices)
        } else {
            Err(ReconcileError::MissingColumns {
                table: table_name.to_string(),
                columns: missing,
            })
        }
    }

    /// Cell accessor tolerant of ragged rows: out-of-range cells read as "".
    pub fn cell<'a>(&'a self, row: usize, col: usize) -> &'a str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|s| s.as_str())
            .unwrap_or("")
    }
}

// ============================================================================
// TESTS
// ============================================================================
