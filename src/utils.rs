/// Utility functions for timestamps and formatting
use log::warn;
use time::{format_description, OffsetDateTime, UtcOffset};

const TIMESTAMP_FORMAT: &str =
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]";

/// Format a timestamp as ISO-8601 local time with millisecond precision
///
/// The offset itself is not printed, e.g. `2024-03-05T14:07:09.250`.
/// Falls back to default string representation if formatting fails.
pub fn format_timestamp(dt: &OffsetDateTime) -> String {
    match format_description::parse(TIMESTAMP_FORMAT) {
        Ok(format) => dt.format(&format).unwrap_or_else(|_| dt.to_string()),
        Err(_) => dt.to_string(),
    }
}

/// Read the system's local UTC offset
///
/// Must be called while the process is still single-threaded, the `time`
/// crate refuses to read the offset otherwise. Falls back to UTC.
pub fn local_offset() -> UtcOffset {
    offset_or_utc(UtcOffset::current_local_offset())
}

fn offset_or_utc<E: std::fmt::Display>(result: Result<UtcOffset, E>) -> UtcOffset {
    match result {
        Ok(offset) => offset,
        Err(e) => {
            warn!("Could not determine local UTC offset, timestamps will be UTC: {}", e);
            UtcOffset::UTC
        }
    }
}

/// Current wall-clock time shifted to the given offset
pub fn now_at(offset: UtcOffset) -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(offset)
}
