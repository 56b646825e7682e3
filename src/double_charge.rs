// ⛽ Double-Charge Detector - Pipeline A (single payments ledger)
// Self-join detection: same establishment, plate and amounts, different
// transaction id, timestamps within a short window ⇒ both charges flagged.

use crate::table::RawTable;
use crate::timeparse::{parse_amount, parse_datetime};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

// ============================================================================
// DUPLICATE STATUS
// ============================================================================

/// Annotation carried by every record in the output. Serialized with the
/// business literals used in the downstream export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateStatus {
    #[serde(rename = "NORMAL")]
    Normal,
    #[serde(rename = "DOBLE COBRO")]
    DoubleCharge,
}

impl Default for DuplicateStatus {
    fn default() -> Self {
        DuplicateStatus::Normal
    }
}

// ============================================================================
// PAYMENT RECORD
// ============================================================================

/// One payment event after normalization. Unparseable amounts/timestamps
/// become None and the comparison predicates treat them as non-matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub timestamp: Option<NaiveDateTime>,
    pub id: String,
    pub establishment: String,
    pub plate: String,
    pub service_amount: Option<f64>,
    pub paid_amount: Option<f64>,
    pub status: String,
    #[serde(default)]
    pub novelty: DuplicateStatus,
}

// ============================================================================
// SUMMARY & REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoubleChargeSummary {
    /// Rows in the raw input, before filtering.
    pub total_raw: usize,
    /// Rows that survived the successful-and-paid filter.
    pub total_filtered: usize,
    pub double_charges: usize,
    pub normal: usize,
    /// double_charges as a percentage of total_filtered.
    pub percentage: f64,
    /// Sum of paid amounts across flagged records.
    pub double_charge_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoubleChargeReport {
    pub records: Vec<PaymentRecord>,
    pub summary: DoubleChargeSummary,
}

impl DoubleChargeReport {
    /// Only the flagged records (the "Solo_Dobles_Cobros" view).
    pub fn double_charges(&self) -> Vec<&PaymentRecord> {
        self.records
            .iter()
            .filter(|r| r.novelty == DuplicateStatus::DoubleCharge)
            .collect()
    }

    /// Establishments ranked by double-charge count, descending.
    /// Ties break alphabetically so re-runs rank identically.
    pub fn top_establishments(&self, n: usize) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for record in &self.records {
            if record.novelty == DuplicateStatus::DoubleCharge {
                *counts.entry(record.establishment.as_str()).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(name, count)| (name.to_string(), count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }
}

// ============================================================================
// DOUBLE-CHARGE DETECTOR
// ============================================================================

/// Expected business columns. Absent ones are synthesized as null rather
/// than rejected - exports from different consoles drift.
const COL_TIMESTAMP: &str = "Fecha de Pago";
const COL_ID: &str = "Id";
const COL_ESTABLISHMENT: &str = "Establecimiento";
const COL_PLATE: &str = "Placa";
const COL_SERVICE_AMOUNT: &str = "Valor Servicio";
const COL_PAID_AMOUNT: &str = "Valor Pagado";
const COL_STATUS: &str = "Estado";

/// Rows between progress callbacks.
const PROGRESS_STEP: usize = 500;

pub struct DoubleChargeDetector {
    /// Maximum seconds between two charges for them to pair (inclusive).
    pub time_window_secs: i64,

    /// Status literal that marks a settled payment.
    pub success_status: String,
}

impl DoubleChargeDetector {
    pub fn new() -> Self {
        DoubleChargeDetector {
            time_window_secs: 600,
            success_status: "Exitosa".to_string(),
        }
    }

    pub fn with_window(time_window_secs: i64) -> Self {
        DoubleChargeDetector {
            time_window_secs,
            ..Self::new()
        }
    }

    /// Full pipeline: normalize, scan, summarize.
    pub fn run(&self, table: &RawTable) -> DoubleChargeReport {
        self.run_with_progress(table, |_done, _total| {})
    }

    /// Same as [`run`](Self::run) but invokes `progress(done, total)` at
    /// coarse checkpoints during the scan. Reporting only; the callback
    /// never influences the result.
    pub fn run_with_progress<F>(&self, table: &RawTable, mut progress: F) -> DoubleChargeReport
    where
        F: FnMut(usize, usize),
    {
        let mut records = self.normalize(table);
        self.scan(&mut records, &mut progress);

        let total_filtered = records.len();
        let double_charges = records
            .iter()
            .filter(|r| r.novelty == DuplicateStatus::DoubleCharge)
            .count();
        let double_charge_value = records
            .iter()
            .filter(|r| r.novelty == DuplicateStatus::DoubleCharge)
            .filter_map(|r| r.paid_amount)
            .sum();
        let percentage = if total_filtered > 0 {
            double_charges as f64 / total_filtered as f64 * 100.0
        } else {
            0.0
        };

        DoubleChargeReport {
            summary: DoubleChargeSummary {
                total_raw: table.row_count(),
                total_filtered,
                double_charges,
                normal: total_filtered - double_charges,
                percentage,
                double_charge_value,
            },
            records,
        }
    }

    /// Record Normalizer: parse amounts and timestamps, synthesize absent
    /// columns as null, keep only settled rows with a positive paid amount.
    pub fn normalize(&self, table: &RawTable) -> Vec<PaymentRecord> {
        let col = |name: &str| table.column_index(name);
        let (c_ts, c_id, c_est, c_plate, c_svc, c_paid, c_status) = (
            col(COL_TIMESTAMP),
            col(COL_ID),
            col(COL_ESTABLISHMENT),
            col(COL_PLATE),
            col(COL_SERVICE_AMOUNT),
            col(COL_PAID_AMOUNT),
            col(COL_STATUS),
        );

        let read = |row: usize, c: Option<usize>| c.map(|c| table.cell(row, c)).unwrap_or("");

        let mut records = Vec::new();
        for row in 0..table.row_count() {
            let record = PaymentRecord {
                timestamp: parse_datetime(read(row, c_ts)),
                id: read(row, c_id).trim().to_string(),
                establishment: read(row, c_est).trim().to_string(),
                plate: read(row, c_plate).trim().to_string(),
                service_amount: parse_amount(read(row, c_svc)),
                paid_amount: parse_amount(read(row, c_paid)),
                status: read(row, c_status).trim().to_string(),
                novelty: DuplicateStatus::Normal,
            };

            let paid_positive = record.paid_amount.map(|v| v > 0.0).unwrap_or(false);
            let settled = record
                .status
                .eq_ignore_ascii_case(self.success_status.trim());
            if paid_positive && settled {
                records.push(record);
            }
        }

        records
    }

    /// Adjacent-Pair Scanner: stable sort into candidate order, then compare
    /// each record with its predecessor.
    ///
    /// After the sort every record that could match sits next to its peers
    /// (identical establishment + plate + amounts), so adjacent comparison
    /// finds all pairs. Known limitation carried over from the business
    /// rule: in a run of 3+ identical charges only consecutive pairs are
    /// compared, never all pairs within the window.
    fn scan<F>(&self, records: &mut [PaymentRecord], progress: &mut F)
    where
        F: FnMut(usize, usize),
    {
        records.sort_by(compare_for_scan);

        let total = records.len();
        for i in 1..total {
            if self.is_adjacent_duplicate(&records[i - 1], &records[i]) {
                // Idempotent OR: a record already flagged stays flagged.
                records[i - 1].novelty = DuplicateStatus::DoubleCharge;
                records[i].novelty = DuplicateStatus::DoubleCharge;
            }

            if i % PROGRESS_STEP == 0 || i == total - 1 {
                progress(i, total);
            }
        }
    }

    /// The six match predicates. A null on either side of any predicate
    /// makes that predicate false - never a panic, never an abort.
    fn is_adjacent_duplicate(&self, prev: &PaymentRecord, cur: &PaymentRecord) -> bool {
        let same_establishment = cur.establishment == prev.establishment;
        let same_plate = cur.plate == prev.plate;
        let same_service = match (cur.service_amount, prev.service_amount) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
        let same_paid = match (cur.paid_amount, prev.paid_amount) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        };
        let different_id = cur.id != prev.id;
        let within_window = match (cur.timestamp, prev.timestamp) {
            (Some(a), Some(b)) => (a - b).num_seconds().abs() <= self.time_window_secs,
            _ => false,
        };

        same_establishment
            && same_plate
            && same_service
            && same_paid
            && different_id
            && within_window
    }
}

impl Default for DoubleChargeDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Sort key: (establishment, plate, paid amount, timestamp), nulls last.
/// `sort_by` is stable, so ties keep input order and re-runs on identical
/// input reproduce the same output.
fn compare_for_scan(a: &PaymentRecord, b: &PaymentRecord) -> Ordering {
    a.establishment
        .cmp(&b.establishment)
        .then_with(|| a.plate.cmp(&b.plate))
        .then_with(|| cmp_opt(&a.paid_amount, &b.paid_amount, |x, y| x.total_cmp(y)))
        .then_with(|| cmp_opt(&a.timestamp, &b.timestamp, |x, y| x.cmp(y)))
}

/// Option comparison with None ordered after Some.
fn cmp_opt<T, F>(a: &Option<T>, b: &Option<T>, cmp: F) -> Ordering
where
    F: Fn(&T, &T) -> Ordering,
{
    match (a, b) {
        (Some(x), Some(y)) => cmp(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(id: &str, establishment: &str, plate: &str, paid: f64, ts: &str) -> PaymentRecord {
        PaymentRecord {
            timestamp: parse_datetime(ts),
            id: id.to_string(),
            establishment: establishment.to_string(),
            plate: plate.to_string(),
            service_amount: Some(paid),
            paid_amount: Some(paid),
            status: "Exitosa".to_string(),
            novelty: DuplicateStatus::Normal,
        }
    }

    fn payments_table(rows: Vec<Vec<&str>>) -> RawTable {
        RawTable::new(
            vec![
                "Fecha de Pago".to_string(),
                "Id".to_string(),
                "Establecimiento".to_string(),
                "Placa".to_string(),
                "Valor Servicio".to_string(),
                "Valor Pagado".to_string(),
                "Estado".to_string(),
            ],
            rows.into_iter()
                .map(|r| r.into_iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    fn scan(detector: &DoubleChargeDetector, records: &mut Vec<PaymentRecord>) {
        detector.scan(records.as_mut_slice(), &mut |_d, _t| {});
    }

    #[test]
    fn test_normalize_filters_status_and_amount() {
        let detector = DoubleChargeDetector::new();
        let table = payments_table(vec![
            vec!["15/09/2025 12:00:00", "T1", "E1", "ABC123", "10000", "10000", "Exitosa"],
            vec!["15/09/2025 12:05:00", "T2", "E1", "ABC123", "10000", "10000", "Rechazada"],
            vec!["15/09/2025 12:06:00", "T3", "E1", "ABC123", "0", "0", "Exitosa"],
            vec!["15/09/2025 12:07:00", "T4", "E1", "ABC123", "10000", "no-numeric", "Exitosa"],
        ]);

        let records = detector.normalize(&table);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "T1");
    }

    #[test]
    fn test_normalize_synthesizes_missing_columns() {
        let detector = DoubleChargeDetector::new();
        // No "Valor Servicio" column at all: rows survive the filter but the
        // amount reads as null.
        let table = RawTable::new(
            vec![
                "Fecha de Pago".to_string(),
                "Id".to_string(),
                "Establecimiento".to_string(),
                "Placa".to_string(),
                "Valor Pagado".to_string(),
                "Estado".to_string(),
            ],
            vec![vec![
                "15/09/2025 12:00:00".to_string(),
                "T1".to_string(),
                "E1".to_string(),
                "ABC123".to_string(),
                "10000".to_string(),
                "Exitosa".to_string(),
            ]],
        );

        let records = detector.normalize(&table);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].service_amount, None);
    }

    #[test]
    fn test_pair_within_window_marks_both() {
        let detector = DoubleChargeDetector::new();
        let mut records = vec![
            make_record("T1", "E1", "ABC123", 10000.0, "15/09/2025 12:00:00"),
            make_record("T2", "E1", "ABC123", 10000.0, "15/09/2025 12:05:00"),
        ];

        scan(&detector, &mut records);

        // Symmetry: both sides of the pair are flagged
        assert!(records
            .iter()
            .all(|r| r.novelty == DuplicateStatus::DoubleCharge));
    }

    #[test]
    fn test_window_boundary_inclusive() {
        let detector = DoubleChargeDetector::new();

        // Exactly 600 seconds apart → duplicate
        let mut at_limit = vec![
            make_record("T1", "E1", "ABC123", 10000.0, "15/09/2025 12:00:00"),
            make_record("T2", "E1", "ABC123", 10000.0, "15/09/2025 12:10:00"),
        ];
        scan(&detector, &mut at_limit);
        assert!(at_limit
            .iter()
            .all(|r| r.novelty == DuplicateStatus::DoubleCharge));

        // 601 seconds apart → not a duplicate
        let mut past_limit = vec![
            make_record("T1", "E1", "ABC123", 10000.0, "15/09/2025 12:00:00"),
            make_record("T2", "E1", "ABC123", 10000.0, "15/09/2025 12:10:01"),
        ];
        scan(&detector, &mut past_limit);
        assert!(past_limit
            .iter()
            .all(|r| r.novelty == DuplicateStatus::Normal));
    }

    #[test]
    fn test_same_id_never_pairs() {
        let detector = DoubleChargeDetector::new();
        let mut records = vec![
            make_record("T1", "E1", "ABC123", 10000.0, "15/09/2025 12:00:00"),
            make_record("T1", "E1", "ABC123", 10000.0, "15/09/2025 12:05:00"),
        ];

        scan(&detector, &mut records);
        assert!(records
            .iter()
            .all(|r| r.novelty == DuplicateStatus::Normal));
    }

    #[test]
    fn test_null_timestamp_is_not_a_match() {
        let detector = DoubleChargeDetector::new();
        let mut records = vec![
            make_record("T1", "E1", "ABC123", 10000.0, "garbage"),
            make_record("T2", "E1", "ABC123", 10000.0, "15/09/2025 12:05:00"),
        ];
        assert_eq!(records[0].timestamp, None);

        scan(&detector, &mut records);
        assert!(records
            .iter()
            .all(|r| r.novelty == DuplicateStatus::Normal));
    }

    #[test]
    fn test_null_service_amount_is_not_a_match() {
        let detector = DoubleChargeDetector::new();
        let mut records = vec![
            make_record("T1", "E1", "ABC123", 10000.0, "15/09/2025 12:00:00"),
            make_record("T2", "E1", "ABC123", 10000.0, "15/09/2025 12:05:00"),
        ];
        records[0].service_amount = None;
        records[1].service_amount = None;

        scan(&detector, &mut records);
        assert!(records
            .iter()
            .all(|r| r.novelty == DuplicateStatus::Normal));
    }

    #[test]
    fn test_scan_is_idempotent() {
        let detector = DoubleChargeDetector::new();
        let mut records = vec![
            make_record("T1", "E1", "ABC123", 10000.0, "15/09/2025 12:00:00"),
            make_record("T2", "E1", "ABC123", 10000.0, "15/09/2025 12:05:00"),
            make_record("T3", "E2", "XYZ789", 5000.0, "15/09/2025 13:00:00"),
        ];

        scan(&detector, &mut records);
        let first_pass: Vec<DuplicateStatus> = records.iter().map(|r| r.novelty).collect();

        scan(&detector, &mut records);
        let second_pass: Vec<DuplicateStatus> = records.iter().map(|r| r.novelty).collect();

        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn test_chain_of_three_compares_consecutive_pairs_only() {
        let detector = DoubleChargeDetector::new();
        // Three identical charges 9 minutes apart: (0,1) and (1,2) both pair,
        // (0,2) is 18 minutes apart and never compared anyway.
        let mut records = vec![
            make_record("T1", "E1", "ABC123", 10000.0, "15/09/2025 12:00:00"),
            make_record("T2", "E1", "ABC123", 10000.0, "15/09/2025 12:09:00"),
            make_record("T3", "E1", "ABC123", 10000.0, "15/09/2025 12:18:00"),
        ];

        scan(&detector, &mut records);
        assert!(records
            .iter()
            .all(|r| r.novelty == DuplicateStatus::DoubleCharge));
    }

    #[test]
    fn test_custom_window() {
        let detector = DoubleChargeDetector::with_window(60);
        let mut records = vec![
            make_record("T1", "E1", "ABC123", 10000.0, "15/09/2025 12:00:00"),
            make_record("T2", "E1", "ABC123", 10000.0, "15/09/2025 12:05:00"),
        ];

        scan(&detector, &mut records);
        assert!(records
            .iter()
            .all(|r| r.novelty == DuplicateStatus::Normal));
    }

    #[test]
    fn test_run_summary() {
        let detector = DoubleChargeDetector::new();
        let table = payments_table(vec![
            vec!["15/09/2025 12:00:00", "T1", "E1", "ABC123", "10000", "10000", "Exitosa"],
            vec!["15/09/2025 12:05:00", "T2", "E1", "ABC123", "10000", "10000", "Exitosa"],
            vec!["15/09/2025 14:00:00", "T3", "E2", "XYZ789", "5000", "5000", "Exitosa"],
            vec!["15/09/2025 14:05:00", "T4", "E2", "XYZ789", "5000", "5000", "Rechazada"],
        ]);

        let report = detector.run(&table);
        assert_eq!(report.summary.total_raw, 4);
        assert_eq!(report.summary.total_filtered, 3);
        assert_eq!(report.summary.double_charges, 2);
        assert_eq!(report.summary.normal, 1);
        assert!((report.summary.percentage - 66.666).abs() < 0.01);
        assert_eq!(report.summary.double_charge_value, 20000.0);
        assert_eq!(report.double_charges().len(), 2);
    }

    #[test]
    fn test_top_establishments_ranking() {
        let detector = DoubleChargeDetector::new();
        let table = payments_table(vec![
            vec!["15/09/2025 12:00:00", "T1", "E1", "ABC123", "10000", "10000", "Exitosa"],
            vec!["15/09/2025 12:05:00", "T2", "E1", "ABC123", "10000", "10000", "Exitosa"],
            vec!["15/09/2025 14:00:00", "T3", "E2", "XYZ789", "5000", "5000", "Exitosa"],
            vec!["15/09/2025 14:04:00", "T4", "E2", "XYZ789", "5000", "5000", "Exitosa"],
            vec!["15/09/2025 14:06:00", "T5", "E2", "XYZ789", "5000", "5000", "Exitosa"],
        ]);

        let report = detector.run(&table);
        let top = report.top_establishments(10);
        assert_eq!(top[0], ("E2".to_string(), 3));
        assert_eq!(top[1], ("E1".to_string(), 2));
    }

    #[test]
    fn test_empty_table_is_a_valid_terminal_state() {
        let detector = DoubleChargeDetector::new();
        let table = payments_table(vec![]);

        let report = detector.run(&table);
        assert_eq!(report.summary.total_raw, 0);
        assert_eq!(report.summary.double_charges, 0);
        assert_eq!(report.summary.percentage, 0.0);
    }

    #[test]
    fn test_progress_callback_fires() {
        let detector = DoubleChargeDetector::new();
        let table = payments_table(vec![
            vec!["15/09/2025 12:00:00", "T1", "E1", "ABC123", "10000", "10000", "Exitosa"],
            vec!["15/09/2025 12:05:00", "T2", "E1", "ABC123", "10000", "10000", "Exitosa"],
        ]);

        let mut calls = 0usize;
        let report = detector.run_with_progress(&table, |_done, _total| calls += 1);
        assert!(calls >= 1);
        assert_eq!(report.summary.double_charges, 2);
    }
}
