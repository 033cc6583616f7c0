use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, Offset, TimeZone, Utc};

pub const MINUTE_MS: i64 = 60 * 1000;
pub const HOUR_MS: i64 = 60 * MINUTE_MS;
pub const DAY_MS: i64 = 24 * HOUR_MS;

/// 进程启动时的本地时区偏移(分钟)
pub fn local_offset_minutes() -> i32 {
    Local::now().offset().fix().local_minus_utc() / 60
}

/// 分钟偏移 -> FixedOffset，非法值回退到 UTC
pub fn fixed_offset(offset_minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(offset_minutes * 60).unwrap_or_else(|| Utc.fix())
}

fn to_offset_datetime(timestamp_ms: i64, offset: FixedOffset) -> DateTime<FixedOffset> {
    let utc = DateTime::<Utc>::from_timestamp_millis(timestamp_ms).unwrap_or_default();
    utc.with_timezone(&offset)
}

/// 时间戳所在的交易日(按给定时区的自然日)
pub fn trading_day(timestamp_ms: i64, offset: FixedOffset) -> NaiveDate {
    to_offset_datetime(timestamp_ms, offset).date_naive()
}

/// 距离下一个本地零点的毫秒数(至少 1ms)
pub fn ms_until_next_midnight(timestamp_ms: i64, offset: FixedOffset) -> i64 {
    let day = trading_day(timestamp_ms, offset);
    let next_day = day + Duration::days(1);
    let midnight = next_day
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| offset.from_local_datetime(&naive).single())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(timestamp_ms + DAY_MS);
    (midnight - timestamp_ms).max(1)
}

/// 时间戳所在交易日零点的毫秒时间戳
pub fn start_of_day_ms(timestamp_ms: i64, offset: FixedOffset) -> i64 {
    timestamp_ms + ms_until_next_midnight(timestamp_ms, offset) - DAY_MS
}

/// YYYY-MM-DD
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
