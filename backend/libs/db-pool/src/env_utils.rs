//! Environment variable parsing utilities
//!
//! Safe, ergonomic parsing with sensible defaults so callers never need
//! `unwrap()` on configuration values.

use std::str::FromStr;
use std::time::Duration;

/// Parse an environment variable with a default fallback.
///
/// Missing and malformed values both yield `default`.
pub fn parse_env_with_default<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parse an environment variable, returning `None` if missing or invalid.
pub fn parse_env_optional<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Read a whole number of seconds into a `Duration`, falling back to `default`.
pub fn parse_env_secs(key: &str, default: Duration) -> Duration {
    parse_env_optional::<u64>(key)
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn test_parse_env_with_default_falls_back_on_garbage() {
        std::env::set_var("DB_POOL_TEST_NUMBER", "not-a-number");
        assert_eq!(parse_env_with_default("DB_POOL_TEST_NUMBER", 7u32), 7);

        std::env::set_var("DB_POOL_TEST_NUMBER", " 42 ");
        assert_eq!(parse_env_with_default("DB_POOL_TEST_NUMBER", 7u32), 42);

        std::env::remove_var("DB_POOL_TEST_NUMBER");
        assert_eq!(parse_env_with_default("DB_POOL_TEST_NUMBER", 7u32), 7);
    }

    #[test]
    #[serial_test::serial]
    fn test_parse_env_secs() {
        std::env::set_var("DB_POOL_TEST_SECS", "90");
        assert_eq!(
            parse_env_secs("DB_POOL_TEST_SECS", Duration::from_secs(5)),
            Duration::from_secs(90)
        );
        std::env::remove_var("DB_POOL_TEST_SECS");
        assert_eq!(
            parse_env_secs("DB_POOL_TEST_SECS", Duration::from_secs(5)),
            Duration::from_secs(5)
        );
    }
}
