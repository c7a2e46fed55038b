use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};

/// Parse the webapp's `X-Timezone-Offset` header.
///
/// The value follows JavaScript's `getTimezoneOffset`: minutes *behind* UTC,
/// so `-120` means UTC+2. Unparseable or out-of-range values mean UTC.
pub fn offset_from_header(value: Option<&str>) -> FixedOffset {
    let minutes = value
        .and_then(|v| v.trim().parse::<i32>().ok())
        .unwrap_or(0);
    minutes
        .checked_mul(-60)
        .and_then(FixedOffset::east_opt)
        .unwrap_or_else(utc)
}

fn utc() -> FixedOffset {
    Utc.fix()
}

/// Whether the daily reminder should be posted.
///
/// True when at least an hour has passed since the last post and the
/// calendar day, seen in the user's offset, has changed.
pub fn reminder_due(now_ms: i64, last_post_ms: i64, offset: FixedOffset) -> bool {
    let (Some(now), Some(last)) = (to_local(now_ms, offset), to_local(last_post_ms, offset)) else {
        return false;
    };
    now.signed_duration_since(last) >= Duration::hours(1) && now.date_naive() != last.date_naive()
}

fn to_local(ms: i64, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    DateTime::<Utc>::from_timestamp(ms.div_euclid(1000), 0).map(|t| t.with_timezone(&offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ms(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn same_day_is_not_due() {
        let last = ms(2024, 3, 1, 8, 0);
        let now = ms(2024, 3, 1, 18, 0);
        assert!(!reminder_due(now, last, utc()));
    }

    #[test]
    fn next_day_after_an_hour_is_due() {
        let last = ms(2024, 3, 1, 8, 0);
        let now = ms(2024, 3, 2, 8, 0);
        assert!(reminder_due(now, last, utc()));
    }

    #[test]
    fn day_change_within_an_hour_is_not_due() {
        let last = ms(2024, 3, 1, 23, 30);
        let now = ms(2024, 3, 2, 0, 10);
        assert!(!reminder_due(now, last, utc()));
    }

    #[test]
    fn offset_moves_the_day_boundary() {
        // 20:00 and 23:30 UTC are the same UTC day but different days in UTC+2.
        let last = ms(2024, 3, 1, 20, 0);
        let now = ms(2024, 3, 1, 23, 30);
        assert!(!reminder_due(now, last, utc()));
        assert!(reminder_due(now, last, offset_from_header(Some("-120"))));
    }

    #[test]
    fn header_parsing() {
        assert_eq!(offset_from_header(Some("-120")).local_minus_utc(), 7200);
        assert_eq!(offset_from_header(Some("300")).local_minus_utc(), -18000);
        assert_eq!(offset_from_header(Some("bogus")).local_minus_utc(), 0);
        assert_eq!(offset_from_header(None).local_minus_utc(), 0);
        assert_eq!(offset_from_header(Some("100000")).local_minus_utc(), 0);
    }
}
