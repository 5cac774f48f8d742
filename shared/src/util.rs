use chrono::{Local, SecondsFormat, TimeZone, Utc};

/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current UTC time as an RFC 3339 / ISO-8601 string with millisecond precision
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Render epoch millis in local time for status displays
///
/// Returns `None` for timestamps chrono cannot represent.
pub fn format_local_millis(millis: i64) -> Option<String> {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format("%d/%m/%Y %H:%M:%S").to_string())
}
