// GoPass Charge Validator - Core Library
// Two detection pipelines over in-memory ledger tables:
//   A) self-join double-charge detection on a single payments ledger
//   B) two-ledger parking-session reconciliation (Comercio vs Gopass)

pub mod table;
pub mod timeparse;
pub mod double_charge;
pub mod sessions;
pub mod reconcile;
pub mod ingest;

// Re-export commonly used types
pub use table::{RawTable, ReconcileError};
pub use timeparse::{parse_amount, parse_datetime, session_key};
pub use double_charge::{
    DoubleChargeDetector, DoubleChargeReport, DoubleChargeSummary, DuplicateStatus, PaymentRecord,
};
pub use sessions::{
    build_comercio_sessions, build_gopass_sessions, extract_validated_plates, validate_plate,
    ComercioSession, GopassSession, SessionConfig,
};
pub use reconcile::{ConfirmedDuplicate, PossibleDuplicate, ReconcileEngine, ReconcileReport};
pub use ingest::{
    load_table, load_table_with_aliases, COMERCIO_ALIASES, GOPASS_ALIASES, PAYMENT_ALIASES,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
