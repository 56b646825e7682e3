// 📂 Ingestion - CSV exports → RawTable
// Thin I/O collaborator around the core. Column-alias resolution happens
// here, once, so the core only ever sees canonical business column names.

use crate::table::RawTable;
use anyhow::{Context, Result};
use std::path::Path;

/// Alias map for one input kind: (canonical name, accepted variants).
/// Matching is trimmed and case-insensitive; a variant may also appear as a
/// substring of the export header ("Fecha de Pago (UTC-5)" still resolves).
pub type ColumnAliases<'a> = &'a [(&'a str, &'a [&'a str])];

pub const PAYMENT_ALIASES: ColumnAliases<'static> = &[
    ("Fecha de Pago", &["fecha pago", "fecha de transaccion"]),
    ("Id", &["id transaccion", "transaction id"]),
    ("Establecimiento", &["estacion", "comercio"]),
    ("Placa", &["placa vehiculo"]),
    ("Valor Servicio", &["vr servicio"]),
    ("Valor Pagado", &["vr pagado", "valor pago"]),
    ("Estado", &["estado transaccion"]),
];

pub const COMERCIO_ALIASES: ColumnAliases<'static> = &[
    ("Número de tarjeta", &["numero de tarjeta", "nro tarjeta"]),
    ("Tipo de tarjeta", &["tipo tarjeta"]),
    ("Tipo de movimiento", &["tipo movimiento", "movimiento"]),
    ("Fecha", &["fecha movimiento"]),
    ("Placa", &["placa vehiculo"]),
];

pub const GOPASS_ALIASES: ColumnAliases<'static> = &[
    ("Fecha de entrada", &["fecha entrada", "entrada"]),
    ("Fecha de salida", &["fecha salida", "salida"]),
    ("Transacción", &["transaccion", "id transaccion"]),
    ("Placa", &["placa vehiculo"]),
];

/// Read a CSV export as-is: headers become column names, every cell stays a
/// string. Parsing and validation belong to the core, not here.
pub fn load_table(path: &Path) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open CSV file {}", path.display()))?;

    let columns: Vec<String> = reader
        .headers()
        .context("failed to read CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("failed to read CSV record")?;
        rows.push(record.iter().map(|c| c.to_string()).collect());
    }

    Ok(RawTable::new(columns, rows))
}

/// Load a CSV and rewrite recognized headers to their canonical business
/// names. Unrecognized headers are kept untouched; absence of an expected
/// column is the core's call to make, not ingestion's.
pub fn load_table_with_aliases(path: &Path, aliases: ColumnAliases<'_>) -> Result<RawTable> {
    let mut table = load_table(path)?;
    resolve_aliases(&mut table, aliases);
    Ok(table)
}

fn resolve_aliases(table: &mut RawTable, aliases: ColumnAliases<'_>) {
    for column in &mut table.columns {
        let lowered = column.trim().to_lowercase();

        for (canonical, variants) in aliases {
            let exact = canonical.trim().to_lowercase() == lowered
                || variants.iter().any(|v| v.to_lowercase() == lowered);
            let substring = variants
                .iter()
                .any(|v| lowered.contains(&v.to_lowercase()));

            if exact || substring {
                *column = canonical.to_string();
                break;
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_columns(columns: &[&str]) -> RawTable {
        RawTable::empty(columns.iter().map(|c| c.to_string()).collect())
    }

    #[test]
    fn test_alias_exact_case_insensitive() {
        let mut table = table_with_columns(&["FECHA DE PAGO", "id", "Estado"]);
        resolve_aliases(&mut table, PAYMENT_ALIASES);

        assert_eq!(table.columns, vec!["Fecha de Pago", "Id", "Estado"]);
    }

    #[test]
    fn test_alias_substring_match() {
        let mut table = table_with_columns(&["Fecha Entrada (UTC-5)", "Transaccion", "Placa"]);
        resolve_aliases(&mut table, GOPASS_ALIASES);

        assert_eq!(
            table.columns,
            vec!["Fecha de entrada", "Transacción", "Placa"]
        );
    }

    #[test]
    fn test_unknown_columns_pass_through() {
        let mut table = table_with_columns(&["Columna Rara", "Placa"]);
        resolve_aliases(&mut table, COMERCIO_ALIASES);

        assert_eq!(table.columns, vec!["Columna Rara", "Placa"]);
    }
}
