// ⚖️ Reconcile Engine - Pipeline B cross-ledger duplicate detection
// Two stages: a coarse hash join on the hourly session key plus a minute
// tolerance window produces possible duplicates; exact plate-key equality
// promotes them to confirmed duplicates.

use crate::sessions::{
    build_comercio_sessions, build_gopass_sessions, extract_validated_plates, ComercioSession,
    GopassSession, SessionConfig,
};
use crate::table::{RawTable, ReconcileError};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// PAIR TYPES
// ============================================================================

/// A cross-ledger pair that shares a session key and sits inside the
/// tolerance window on both ends. Diffs are signed minutes, Comercio minus
/// Gopass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PossibleDuplicate {
    pub card_id: String,
    pub transaction_id: String,
    pub comercio_entry: NaiveDateTime,
    pub comercio_exit: NaiveDateTime,
    pub gopass_entry: NaiveDateTime,
    pub gopass_exit: NaiveDateTime,
    pub session_key: String,
    pub gopass_plate: String,
    pub entry_diff_minutes: f64,
    pub exit_diff_minutes: f64,
}

/// A possible duplicate additionally verified by plate identity. Both
/// confirmation keys are reported downstream, so both are materialized even
/// though equality of the keys is equivalent to equality of the plates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmedDuplicate {
    pub pair: PossibleDuplicate,
    pub comercio_plate: String,
    pub gopass_plate: String,
    pub comercio_key: String,
    pub gopass_key: String,
}

// ============================================================================
// RECONCILE REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Identity of this run, for traceability of exported reports.
    pub run_id: String,
    pub reconciled_at: DateTime<Utc>,
    pub tolerance_minutes: u32,
    pub comercio_sessions: usize,
    pub gopass_sessions: usize,
    pub possible: Vec<PossibleDuplicate>,
    pub confirmed: Vec<ConfirmedDuplicate>,
}

impl ReconcileReport {
    pub fn summary(&self) -> String {
        format!(
            "Reconciliation {}: {} comercio sessions vs {} gopass sessions → {} possible, {} confirmed (tolerance ±{} min)",
            self.run_id,
            self.comercio_sessions,
            self.gopass_sessions,
            self.possible.len(),
            self.confirmed.len(),
            self.tolerance_minutes,
        )
    }
}

// ============================================================================
// RECONCILE ENGINE
// ============================================================================

pub struct ReconcileEngine {
    /// Maximum absolute minute difference on entry AND exit (closed
    /// interval). Default 5.
    pub tolerance_minutes: u32,

    /// Comercio builder configuration (card-type allow-list).
    pub session_config: SessionConfig,
}

impl ReconcileEngine {
    pub fn new() -> Self {
        ReconcileEngine {
            tolerance_minutes: 5,
            session_config: SessionConfig::new(),
        }
    }

    pub fn with_tolerance(tolerance_minutes: u32) -> Self {
        ReconcileEngine {
            tolerance_minutes,
            ..Self::new()
        }
    }

    /// One full reconciliation run over both raw ledgers. Stateless: every
    /// call builds its own tables and nothing survives the return.
    pub fn reconcile(
        &self,
        comercio: &RawTable,
        gopass: &RawTable,
    ) -> Result<ReconcileReport, ReconcileError> {
        let comercio_sessions = build_comercio_sessions(comercio, &self.session_config)?;
        let gopass_sessions = build_gopass_sessions(gopass)?;

        let possible = self.match_candidates(&comercio_sessions, &gopass_sessions);

        let plates = extract_validated_plates(comercio)?;
        let confirmed = self.confirm(&possible, &plates);

        Ok(ReconcileReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            reconciled_at: Utc::now(),
            tolerance_minutes: self.tolerance_minutes,
            comercio_sessions: comercio_sessions.len(),
            gopass_sessions: gopass_sessions.len(),
            possible,
            confirmed,
        })
    }

    /// Candidate Matcher: equi-join on the session key, then the tolerance
    /// window on both diffs.
    ///
    /// The join buckets Gopass sessions by key first, so the cost stays
    /// linear in the input sizes plus the (small) bucket products - never a
    /// full cross product. An empty join is the normal "no duplicates"
    /// terminal case.
    pub fn match_candidates(
        &self,
        comercio: &[ComercioSession],
        gopass: &[GopassSession],
    ) -> Vec<PossibleDuplicate> {
        let mut buckets: HashMap<&str, Vec<&GopassSession>> = HashMap::new();
        for session in gopass {
            buckets
                .entry(session.session_key.as_str())
                .or_default()
                .push(session);
        }

        let tolerance = self.tolerance_minutes as f64;
        let mut possible = Vec::new();

        for a in comercio {
            let Some(candidates) = buckets.get(a.session_key.as_str()) else {
                continue;
            };

            for b in candidates {
                let entry_diff = minutes_between(a.entry, b.entry);
                let exit_diff = minutes_between(a.exit, b.exit);

                if entry_diff.abs() <= tolerance && exit_diff.abs() <= tolerance {
                    possible.push(PossibleDuplicate {
                        card_id: a.card_id.clone(),
                        transaction_id: b.transaction_id.clone(),
                        comercio_entry: a.entry,
                        comercio_exit: a.exit,
                        gopass_entry: b.entry,
                        gopass_exit: b.exit,
                        session_key: a.session_key.clone(),
                        gopass_plate: b.plate.clone(),
                        entry_diff_minutes: entry_diff,
                        exit_diff_minutes: exit_diff,
                    });
                }
            }
        }

        possible
    }

    /// Plate Confirmer: join the candidate pairs with the validated plates
    /// of their Comercio session and confirm on exact confirmation-key
    /// equality.
    ///
    /// A card id with zero valid plates simply yields zero confirmations.
    pub fn confirm(
        &self,
        possible: &[PossibleDuplicate],
        plates: &HashMap<String, Vec<String>>,
    ) -> Vec<ConfirmedDuplicate> {
        let mut confirmed = Vec::new();

        for pair in possible {
            let Some(session_plates) = plates.get(&pair.card_id) else {
                continue;
            };

            let gopass_key = format!("{}|{}", pair.session_key, pair.gopass_plate);
            for plate in session_plates {
                let comercio_key = format!("{}|{}", pair.session_key, plate);
                if comercio_key == gopass_key {
                    confirmed.push(ConfirmedDuplicate {
                        pair: pair.clone(),
                        comercio_plate: plate.clone(),
                        gopass_plate: pair.gopass_plate.clone(),
                        comercio_key,
                        gopass_key: gopass_key.clone(),
                    });
                    break;
                }
            }
        }

        confirmed
    }
}

impl Default for ReconcileEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Signed minute difference, a − b, as a float.
fn minutes_between(a: NaiveDateTime, b: NaiveDateTime) -> f64 {
    (a - b).num_seconds() as f64 / 60.0
}

// ============================================================================
// TESTS
// ============================================================================
