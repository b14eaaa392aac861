use chrono::Utc;

/// Returns the current UNIX timestamp in milliseconds.
///
/// Used to stamp blocks and quorum certificates.
pub fn current_time_millis() -> i64 {
    Utc::now().timestamp_millis()
}
