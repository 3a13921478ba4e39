//! Error fingerprints
//!
//! A fingerprint identifies "the same" error for de-duplication. It covers
//! message, page URL and user agent only; stack traces are deliberately left
//! out, so distinct bugs sharing those three collapse into one.

/// Characters of `message|url|user_agent` fed to the hash.
pub const MAX_FINGERPRINT_INPUT: usize = 512;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 16 hex chars, stable across processes and platforms.
pub fn fingerprint(message: &str, url: &str, user_agent: &str) -> String {
    let joined = format!("{}|{}|{}", message, url, user_agent);
    let bounded: String = joined.chars().take(MAX_FINGERPRINT_INPUT).collect();

    let hash = bounded.bytes().fold(FNV_OFFSET, |acc, byte| {
        (acc ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    });
    format!("{:016x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_inputs_same_fingerprint() {
        let a = fingerprint("Network timeout", "https://x/a", "UA1");
        let b = fingerprint("Network timeout", "https://x/a", "UA1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_each_field_changes_fingerprint() {
        let base = fingerprint("Network timeout", "https://x/a", "UA1");
        assert_ne!(base, fingerprint("Network timeout!", "https://x/a", "UA1"));
        assert_ne!(base, fingerprint("Network timeout", "https://x/b", "UA1"));
        assert_ne!(base, fingerprint("Network timeout", "https://x/a", "UA2"));
    }

    #[test]
    fn test_known_vector() {
        // FNV-1a 64 of "||"
        assert_eq!(fingerprint("", "", ""), "08e34c07b581a8a5");
    }

    #[test]
    fn test_input_beyond_bound_is_ignored() {
        let long = "x".repeat(MAX_FINGERPRINT_INPUT);
        assert_eq!(
            fingerprint(&long, "https://x/a", "UA1"),
            fingerprint(&long, "https://x/b", "UA2")
        );
    }
}
