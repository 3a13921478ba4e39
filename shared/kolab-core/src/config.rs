//! Environment configuration helpers

use crate::error::{KolabError, Result};
use std::env;

/// Parse an optional numeric environment variable, falling back to `default`
/// when unset and failing on garbage.
pub fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| KolabError::Config(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parse_default_when_unset() {
        let value: u32 = env_parse("KOLAB_TEST_SURELY_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_env_parse_rejects_garbage() {
        env::set_var("KOLAB_TEST_GARBAGE_PORT", "eighty");
        let result: Result<u16> = env_parse("KOLAB_TEST_GARBAGE_PORT", 80);
        assert!(matches!(result, Err(KolabError::Config(_))));
        env::remove_var("KOLAB_TEST_GARBAGE_PORT");
    }
}
