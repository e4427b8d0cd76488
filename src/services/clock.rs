use chrono::{DateTime, SecondsFormat, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_unix_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

pub fn system_time_ms(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn utc(unix_ms: u64) -> DateTime<Utc> {
    i64::try_from(unix_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_default()
}

pub fn iso_utc(unix_ms: u64) -> String {
    utc(unix_ms).to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Directory-safe run id, `YYYYMMDD_HHMMSS`.
pub fn timestamp_id(unix_ms: u64) -> String {
    utc(unix_ms).format("%Y%m%d_%H%M%S").to_string()
}

pub fn elapsed_secs(start_ms: u64, end_ms: u64) -> f64 {
    end_ms.saturating_sub(start_ms) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_known_instant() {
        // 2024-02-29T13:45:07.250Z
        let ms = 1_709_214_307_250;
        assert_eq!(iso_utc(ms), "2024-02-29T13:45:07.250Z");
        assert_eq!(timestamp_id(ms), "20240229_134507");
    }

    #[test]
    fn epoch_is_1970() {
        assert_eq!(iso_utc(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(elapsed_secs(1_000, 2_500), 1.5);
    }

    #[test]
    fn now_is_after_2020() {
        assert!(now_unix_ms() > 1_577_836_800_000);
    }
}
