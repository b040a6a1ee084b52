/// All timestamps exchanged with the desktop client are UTC epoch milliseconds.
pub type EpochMillis = i64;

/// Current UTC time as epoch milliseconds.
pub fn now_millis() -> EpochMillis {
    chrono::Utc::now().timestamp_millis()
}
