// 🕐 Tolerant Parsing - localized timestamps and money amounts
// Ledger exports arrive with day-first dates, Spanish AM/PM markers
// ("a. m." / "p. m." with irregular spacing and punctuation) and
// Colombian-formatted amounts. Everything here degrades to None instead
// of erroring; the owning component decides whether the row survives.

use chrono::{NaiveDate, NaiveDateTime};

// ============================================================================
// TIMESTAMP PARSING
// ============================================================================

/// Parse a ledger date-time string, day-first.
///
/// Accepts, among others:
/// - "1/09/2025 12:03:53 a. m."  (localized marker, arbitrary dots/spaces)
/// - "15/09/2025 21:04:00"
/// - "15-09-2025 21:04"
/// - "2025-09-15 21:04:00"       (ISO fallback)
/// - "15/09/2025"                (date only, midnight)
///
/// Returns None for anything unparseable.
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (canonical, meridiem) = split_meridiem(trimmed);

    if let Some(mer) = meridiem {
        let with_marker = format!("{} {}", canonical, mer);
        const TWELVE_HOUR: [&str; 4] = [
            "%d/%m/%Y %I:%M:%S %p",
            "%d/%m/%Y %I:%M %p",
            "%d-%m-%Y %I:%M:%S %p",
            "%d-%m-%Y %I:%M %p",
        ];
        for fmt in TWELVE_HOUR {
            if let Ok(dt) = NaiveDateTime::parse_from_str(&with_marker, fmt) {
                return Some(dt);
            }
        }
        return None;
    }

    const TWENTY_FOUR_HOUR: [&str; 7] = [
        "%d/%m/%Y %H:%M:%S",
        "%d/%m/%Y %H:%M",
        "%d-%m-%Y %H:%M:%S",
        "%d-%m-%Y %H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
    ];
    for fmt in TWENTY_FOUR_HOUR {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&canonical, fmt) {
            return Some(dt);
        }
    }

    // Date only → midnight
    const DATE_ONLY: [&str; 3] = ["%d/%m/%Y", "%d-%m-%Y", "%Y-%m-%d"];
    for fmt in DATE_ONLY {
        if let Ok(d) = NaiveDate::parse_from_str(&canonical, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    None
}

/// Strip a trailing localized AM/PM marker and return the remainder plus
/// the normalized marker ("AM"/"PM") if one was present.
///
/// "a. m.", "a.m.", "A. M", "p m" all collapse to the same marker once dots
/// are treated as whitespace.
fn split_meridiem(raw: &str) -> (String, Option<&'static str>) {
    let spaced = raw.replace('.', " ");
    let tokens: Vec<&str> = spaced.split_whitespace().collect();

    // The marker is the last one or two tokens: "am" / "pm" / "a m" / "p m".
    for take in [2usize, 1] {
        if tokens.len() > take {
            let tail: String = tokens[tokens.len() - take..].concat().to_lowercase();
            let marker = match tail.as_str() {
                "am" => Some("AM"),
                "pm" => Some("PM"),
                _ => None,
            };
            if let Some(marker) = marker {
                return (tokens[..tokens.len() - take].join(" "), Some(marker));
            }
        }
    }

    (tokens.join(" "), None)
}

// ============================================================================
// SESSION KEY
// ============================================================================

/// Hour-truncated join key: "2025-09-15 21|2025-09-15 23".
///
/// Two sessions share a key iff their entries fall in the same clock hour
/// AND their exits fall in the same clock hour. Coarse pre-filter only; the
/// tolerance window does the fine-grained work afterwards.
pub fn session_key(entry: NaiveDateTime, exit: NaiveDateTime) -> String {
    format!(
        "{}|{}",
        entry.format("%Y-%m-%d %H"),
        exit.format("%Y-%m-%d %H")
    )
}

// ============================================================================
// AMOUNT PARSING
// ============================================================================

/// Parse a money amount. Tolerates "$", grouping separators and decimal
/// comma ("$ 10.000,50" → 10000.50). Unparseable → None.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let mut s: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '$')
        .collect();
    if s.is_empty() {
        return None;
    }

    let has_dot = s.contains('.');
    let has_comma = s.contains(',');

    if has_dot && has_comma {
        // Whichever separator appears last is the decimal one.
        let last_dot = s.rfind('.').unwrap_or(0);
        let last_comma = s.rfind(',').unwrap_or(0);
        if last_comma > last_dot {
            s = s.replace('.', "").replace(',', ".");
        } else {
            s = s.replace(',', "");
        }
    } else if has_comma {
        let digits_after = s.rfind(',').map(|i| s.len() - i - 1).unwrap_or(0);
        if s.matches(',').count() == 1 && digits_after <= 2 {
            s = s.replace(',', ".");
        } else {
            s = s.replace(',', "");
        }
    } else if has_dot && s.matches('.').count() > 1 {
        s = s.replace('.', "");
    }

    s.parse::<f64>().ok()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_parse_localized_am_marker() {
        let parsed = parse_datetime("1/09/2025 12:03:53 a. m.").unwrap();
        assert_eq!(parsed, dt(2025, 9, 1, 0, 3, 53));
    }

    #[test]
    fn test_parse_localized_pm_marker_variants() {
        for raw in [
            "15/09/2025 9:30:00 p. m.",
            "15/09/2025 9:30:00 p.m.",
            "15/09/2025 9:30:00 P. M",
            "15/09/2025 9:30:00 pm",
        ] {
            let parsed = parse_datetime(raw).unwrap();
            assert_eq!(parsed, dt(2025, 9, 15, 21, 30, 0), "failed for {:?}", raw);
        }
    }

    #[test]
    fn test_parse_twelve_noon_pm() {
        let parsed = parse_datetime("15/09/2025 12:15:00 p. m.").unwrap();
        assert_eq!(parsed.hour(), 12);
    }

    #[test]
    fn test_parse_day_first() {
        // 5 September, never 9 May
        let parsed = parse_datetime("05/09/2025 13:00:00").unwrap();
        assert_eq!(parsed, dt(2025, 9, 5, 13, 0, 0));
    }

    #[test]
    fn test_parse_iso_fallback_and_date_only() {
        assert_eq!(
            parse_datetime("2025-09-15 21:04:00").unwrap(),
            dt(2025, 9, 15, 21, 4, 0)
        );
        assert_eq!(
            parse_datetime("15/09/2025").unwrap(),
            dt(2025, 9, 15, 0, 0, 0)
        );
    }

    #[test]
    fn test_parse_garbage_is_none() {
        assert_eq!(parse_datetime(""), None);
        assert_eq!(parse_datetime("   "), None);
        assert_eq!(parse_datetime("not a date"), None);
        assert_eq!(parse_datetime("32/13/2025 10:00:00"), None);
    }

    #[test]
    fn test_session_key_format() {
        let key = session_key(dt(2025, 9, 15, 21, 0, 0), dt(2025, 9, 15, 23, 30, 0));
        assert_eq!(key, "2025-09-15 21|2025-09-15 23");
    }

    #[test]
    fn test_session_key_hour_boundary() {
        // 20:58 vs 21:02: different clock hours → different keys
        let exit = dt(2025, 9, 15, 23, 0, 0);
        let a = session_key(dt(2025, 9, 15, 20, 58, 0), exit);
        let b = session_key(dt(2025, 9, 15, 21, 2, 0), exit);
        assert_ne!(a, b);

        // 21:01 vs 21:04: same clock hour → same key
        let c = session_key(dt(2025, 9, 15, 21, 1, 0), exit);
        let d = session_key(dt(2025, 9, 15, 21, 4, 0), exit);
        assert_eq!(c, d);
    }

    #[test]
    fn test_parse_amount_plain() {
        assert_eq!(parse_amount("10000"), Some(10000.0));
        assert_eq!(parse_amount("10000.50"), Some(10000.50));
        assert_eq!(parse_amount("-250"), Some(-250.0));
    }

    #[test]
    fn test_parse_amount_colombian_formats() {
        assert_eq!(parse_amount("$ 10.000,50"), Some(10000.50));
        assert_eq!(parse_amount("1.234.567"), Some(1234567.0));
        assert_eq!(parse_amount("1,234,567.89"), Some(1234567.89));
        assert_eq!(parse_amount("12,5"), Some(12.5));
    }

    #[test]
    fn test_parse_amount_garbage_is_none() {
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("N/A"), None);
        assert_eq!(parse_amount("$"), None);
    }
}
