/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Returns the elapsed milliseconds between `since_unix_ms` and `now_unix_ms`.
///
/// A zero `since_unix_ms` means "never recorded" and yields `None`.
pub fn elapsed_since_unix_ms(since_unix_ms: u64, now_unix_ms: u64) -> Option<u64> {
    if since_unix_ms == 0 {
        return None;
    }
    Some(now_unix_ms.saturating_sub(since_unix_ms))
}
