//! Shared utilities for the store library.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get the current time in milliseconds since UNIX epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

static NAME_SEQ: AtomicU64 = AtomicU64::new(1);

/// Generate a unique diagnostic name for a store that was not given one.
pub fn generated_name(prefix: &str) -> String {
    let n = NAME_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", prefix, n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_is_positive() {
        assert!(now_ms() > 0);
    }

    #[test]
    fn test_generated_names_are_unique() {
        let a = generated_name("store");
        let b = generated_name("store");
        assert_ne!(a, b);
        assert!(a.starts_with("store-"));
    }
}
