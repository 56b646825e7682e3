// 🅿️ Session Builders - Pipeline B (two-ledger reconciliation)
// Ledger A ("Comercio") is a gate-access log of raw movement events;
// Ledger B ("Gopass") is the point-of-sale ledger, one row per transaction.
// Both sides collapse into (entry, exit) sessions sharing an hour-truncated
// join key.

use crate::table::{RawTable, ReconcileError};
use crate::timeparse::{parse_datetime, session_key};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ============================================================================
// COLUMN NAMES (business-defined)
// ============================================================================

pub const COMERCIO_CARD_ID: &str = "Número de tarjeta";
pub const COMERCIO_CARD_TYPE: &str = "Tipo de tarjeta";
pub const COMERCIO_MOVEMENT: &str = "Tipo de movimiento";
pub const COMERCIO_TIMESTAMP: &str = "Fecha";
pub const COMERCIO_PLATE: &str = "Placa";

pub const GOPASS_ENTRY: &str = "Fecha de entrada";
pub const GOPASS_EXIT: &str = "Fecha de salida";
pub const GOPASS_TRANSACTION: &str = "Transacción";
pub const GOPASS_PLATE: &str = "Placa";

// ============================================================================
// SESSION TYPES
// ============================================================================

/// One physical parking session reconstructed from Comercio movement rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComercioSession {
    pub card_id: String,
    pub entry: NaiveDateTime,
    pub exit: NaiveDateTime,
    pub session_key: String,
}

/// One Gopass transaction, already session-shaped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GopassSession {
    pub transaction_id: String,
    pub entry: NaiveDateTime,
    pub exit: NaiveDateTime,
    pub session_key: String,
    /// Reported plate, trimmed and uppercased.
    pub plate: String,
}

// ============================================================================
// SESSION CONFIG
// ============================================================================

/// Knobs for the Comercio builder. The card-type allow-list restricts the
/// movement log to the two vehicle-facing media; everything else (staff
/// cards, maintenance badges) is noise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub card_type_allowlist: Vec<String>,
}

impl SessionConfig {
    pub fn new() -> Self {
        SessionConfig {
            card_type_allowlist: vec!["Gopass".to_string(), "Ticket Gopass".to_string()],
        }
    }

    fn allows(&self, card_type: &str) -> bool {
        let trimmed = card_type.trim();
        self.card_type_allowlist
            .iter()
            .any(|allowed| allowed.trim().eq_ignore_ascii_case(trimmed))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// MOVEMENT NORMALIZATION
// ============================================================================

const MOVEMENT_ENTRY: &str = "Entrada";
const MOVEMENT_EXIT: &str = "Salida";
const MOVEMENT_TRANSACTION: &str = "Transacción";

/// Normalize a movement label. Recognized values collapse to the canonical
/// spelling; anything else passes through trimmed, not rejected.
fn normalize_movement(raw: &str) -> String {
    let trimmed = raw.trim();
    let lowered = trimmed.to_lowercase();
    match lowered.as_str() {
        "entrada" => MOVEMENT_ENTRY.to_string(),
        "salida" => MOVEMENT_EXIT.to_string(),
        "transacción" | "transaccion" => MOVEMENT_TRANSACTION.to_string(),
        _ => trimmed.to_string(),
    }
}

// ============================================================================
// LEDGER-A SESSION BUILDER
// ============================================================================

/// Collapse raw Comercio movement rows into one session per card id.
///
/// entry = earliest Entrada, exit = latest Salida. A card id missing either
/// side yields no session - policy, not a defect: an unpaired scan cannot
/// anchor the tolerance window on both ends.
pub fn build_comercio_sessions(
    table: &RawTable,
    config: &SessionConfig,
) -> Result<Vec<ComercioSession>, ReconcileError> {
    let idx = table.require_columns(
        "comercio",
        &[
            COMERCIO_CARD_ID,
            COMERCIO_CARD_TYPE,
            COMERCIO_MOVEMENT,
            COMERCIO_TIMESTAMP,
            COMERCIO_PLATE,
        ],
    )?;
    let (c_id, c_type, c_move, c_ts) = (idx[0], idx[1], idx[2], idx[3]);

    // card id → (earliest Entrada, latest Salida)
    let mut grouped: HashMap<String, (Option<NaiveDateTime>, Option<NaiveDateTime>)> =
        HashMap::new();

    for row in 0..table.row_count() {
        if !config.allows(table.cell(row, c_type)) {
            continue;
        }

        let timestamp = match parse_datetime(table.cell(row, c_ts)) {
            Some(ts) => ts,
            None => continue,
        };

        let card_id = table.cell(row, c_id).trim().to_string();
        let movement = normalize_movement(table.cell(row, c_move));

        let slot = grouped.entry(card_id).or_insert((None, None));
        match movement.as_str() {
            MOVEMENT_ENTRY => {
                slot.0 = Some(slot.0.map_or(timestamp, |cur| cur.min(timestamp)));
            }
            MOVEMENT_EXIT => {
                slot.1 = Some(slot.1.map_or(timestamp, |cur| cur.max(timestamp)));
            }
            _ => {}
        }
    }

    let mut sessions: Vec<ComercioSession> = grouped
        .into_iter()
        .filter_map(|(card_id, (entry, exit))| match (entry, exit) {
            (Some(entry), Some(exit)) => Some(ComercioSession {
                session_key: session_key(entry, exit),
                card_id,
                entry,
                exit,
            }),
            _ => None,
        })
        .collect();

    // HashMap iteration order is arbitrary; fix it for reproducible runs.
    sessions.sort_by(|a, b| a.card_id.cmp(&b.card_id));
    Ok(sessions)
}

// ============================================================================
// LEDGER-B SESSION NORMALIZER
// ============================================================================

/// One output session per Gopass row with both timestamps parseable.
pub fn build_gopass_sessions(table: &RawTable) -> Result<Vec<GopassSession>, ReconcileError> {
    let idx = table.require_columns(
        "gopass",
        &[GOPASS_ENTRY, GOPASS_EXIT, GOPASS_TRANSACTION, GOPASS_PLATE],
    )?;
    let (c_entry, c_exit, c_tx, c_plate) = (idx[0], idx[1], idx[2], idx[3]);

    let mut sessions = Vec::new();
    for row in 0..table.row_count() {
        let entry = parse_datetime(table.cell(row, c_entry));
        let exit = parse_datetime(table.cell(row, c_exit));

        // Either timestamp unparseable → the row is dropped, not an error.
        let (entry, exit) = match (entry, exit) {
            (Some(entry), Some(exit)) => (entry, exit),
            _ => continue,
        };

        sessions.push(GopassSession {
            transaction_id: table.cell(row, c_tx).trim().to_string(),
            session_key: session_key(entry, exit),
            entry,
            exit,
            plate: table.cell(row, c_plate).trim().to_uppercase(),
        });
    }

    Ok(sessions)
}

// ============================================================================
// PLATE VALIDATION
// ============================================================================

/// Normalize and validate a plate: exactly 3 letters followed by 3 digits
/// after trimming and uppercasing. Returns the normalized plate or None.
pub fn validate_plate(raw: &str) -> Option<String> {
    let normalized = raw.trim().to_uppercase();
    let bytes = normalized.as_bytes();
    if bytes.len() != 6 {
        return None;
    }
    let letters_ok = bytes[..3].iter().all(|b| b.is_ascii_uppercase());
    let digits_ok = bytes[3..].iter().all(|b| b.is_ascii_digit());
    if letters_ok && digits_ok {
        Some(normalized)
    } else {
        None
    }
}

/// Distinct (card id, validated plate) pairs from the raw Comercio rows.
///
/// An empty result (no valid plate anywhere) is informational: it means
/// zero confirmations downstream, never an error.
pub fn extract_validated_plates(
    table: &RawTable,
) -> Result<HashMap<String, Vec<String>>, ReconcileError> {
    let idx = table.require_columns("comercio", &[COMERCIO_CARD_ID, COMERCIO_PLATE])?;
    let (c_id, c_plate) = (idx[0], idx[1]);

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut plates: HashMap<String, Vec<String>> = HashMap::new();

    for row in 0..table.row_count() {
        let plate = match validate_plate(table.cell(row, c_plate)) {
            Some(plate) => plate,
            None => continue,
        };
        let card_id = table.cell(row, c_id).trim().to_string();

        if seen.insert((card_id.clone(), plate.clone())) {
            plates.entry(card_id).or_default().push(plate);
        }
    }

    Ok(plates)
}

// ============================================================================
// TESTS
// ============================================================================
