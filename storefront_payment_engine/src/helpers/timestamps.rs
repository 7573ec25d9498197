use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

// Epochs beyond this are treated as milliseconds. Corresponds to 2033-05-18; no second-resolution storefront
// timestamp will exceed it before the heat death of this codebase.
const EPOCH_MILLIS_CUTOVER: i64 = 2_000_000_000;

/// Parse a single heterogeneous timestamp value: an RFC 3339 string, or a unix epoch in seconds or milliseconds.
pub fn parse_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim()).ok().map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(parse_epoch),
        _ => None,
    }
}

/// Parse a unix epoch that may be in seconds or milliseconds.
pub fn parse_epoch(epoch: i64) -> Option<DateTime<Utc>> {
    if epoch <= 0 {
        return None;
    }
    if epoch > EPOCH_MILLIS_CUTOVER {
        Utc.timestamp_millis_opt(epoch).single()
    } else {
        Utc.timestamp_opt(epoch, 0).single()
    }
}

/// Choose the canonical "placed at" instant: the earliest candidate that is present, or `now` when none are.
pub fn select_placed_at(candidates: &[Option<DateTime<Utc>>], now: DateTime<Utc>) -> DateTime<Utc> {
    candidates.iter().flatten().min().copied().unwrap_or(now)
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn earliest_candidate_wins() {
        let t1 = Utc.with_ymd_and_hms(2024, 5, 4, 12, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 5, 4, 11, 30, 0).unwrap();
        let t3 = Utc.with_ymd_and_hms(2024, 5, 4, 13, 0, 0).unwrap();
        // created_at = t1, verified_at = t2, updated_at = t3, with t2 < t1 < t3
        let placed = select_placed_at(&[None, Some(t1), Some(t2), Some(t3)], Utc::now());
        assert_eq!(placed, t2);
    }

    #[test]
    fn falls_back_to_now_when_nothing_parses() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        assert_eq!(select_placed_at(&[None, None], now), now);
        assert_eq!(select_placed_at(&[], now), now);
    }

    #[test]
    fn parses_rfc3339_strings() {
        let t = parse_instant(&json!("2024-05-04T11:30:00Z")).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2024, 5, 4, 11, 30, 0).unwrap());
        assert!(parse_instant(&json!("last tuesday")).is_none());
    }

    #[test]
    fn parses_second_and_millisecond_epochs() {
        let secs = parse_instant(&json!(1_714_822_200)).unwrap();
        let millis = parse_instant(&json!(1_714_822_200_000i64)).unwrap();
        assert_eq!(secs, millis);
        assert!(parse_instant(&json!(0)).is_none());
        assert!(parse_instant(&json!(-5)).is_none());
    }
}
