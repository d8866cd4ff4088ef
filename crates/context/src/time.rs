use chrono::{DateTime, Duration, Utc};

/// Derives the `[THIS_MOMENT]` local-time string per spec §4.4: parse
/// `timestamp_utc`, add `-timezone_offset` minutes — JavaScript's
/// `getTimezoneOffset` convention, where minutes *west* of UTC are
/// positive, so the sign is reversed when applying it to a UTC instant.
/// Formats as `YYYY-MM-DD HH:MM:SS±HH:MM`.
pub fn derive_local_time(timestamp_utc: DateTime<Utc>, timezone_offset_minutes: i64) -> String {
    let local_naive = timestamp_utc.naive_utc() - Duration::minutes(timezone_offset_minutes);
    let display_offset = -timezone_offset_minutes;
    let sign = if display_offset < 0 { '-' } else { '+' };
    let abs = display_offset.unsigned_abs();
    let hh = abs / 60;
    let mm = abs % 60;
    format!(
        "{} {}{:02}:{:02}",
        local_naive.format("%Y-%m-%d %H:%M:%S"),
        sign,
        hh,
        mm
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn eastern_offset_shifts_back_five_hours() {
        // US Eastern: getTimezoneOffset() == 300 (5h west of UTC).
        let utc = Utc.with_ymd_and_hms(2026, 7, 30, 12, 0, 0).unwrap();
        let result = derive_local_time(utc, 300);
        assert_eq!(result, "2026-07-30 07:00:00-05:00");
    }

    #[test]
    fn negative_offset_shifts_forward() {
        // Getting ahead of UTC (e.g. UTC+2) -> getTimezoneOffset() == -120.
        let utc = Utc.with_ymd_and_hms(2026, 7, 30, 12, 0, 0).unwrap();
        let result = derive_local_time(utc, -120);
        assert_eq!(result, "2026-07-30 14:00:00+02:00");
    }

    #[test]
    fn zero_offset_is_utc() {
        let utc = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let result = derive_local_time(utc, 0);
        assert_eq!(result, "2026-01-01 00:00:00+00:00");
    }
}
