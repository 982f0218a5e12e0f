//! Password encoding checks
//!
//! Configuration values that hold passwords carry their encoding algorithm
//! as a braced prefix, e.g. `{xor}...` or `{aes}...`. Values without a
//! prefix are stored in plain text.

/// Outcome of checking a password value against a runtime version
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordState {
    /// Encoded with an algorithm the runtime supports
    Ok,
    /// No algorithm prefix, the value is stored as plain text
    PlainText,
    /// AES encoding on an 8.5.0.x runtime, which cannot decode it
    NotSupportAes,
    /// A braced prefix naming no known algorithm
    UnknownAlgorithm,
}

/// Check a password value's encoding against `runtime_version`
/// (e.g. "8.5.5.9").
pub fn validate_password(value: &str, runtime_version: &str) -> PasswordState {
    let Some(algorithm) = algorithm_prefix(value) else {
        return PasswordState::PlainText;
    };
    match algorithm {
        "xor" | "hash" => PasswordState::Ok,
        "aes" => {
            // AES support arrived after 8.5.0
            if runtime_version.starts_with("8.5.0") {
                PasswordState::NotSupportAes
            } else {
                PasswordState::Ok
            }
        }
        _ => PasswordState::UnknownAlgorithm,
    }
}

fn algorithm_prefix(value: &str) -> Option<&str> {
    let rest = value.strip_prefix('{')?;
    let end = rest.find('}')?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_algorithms_pass() {
        assert_eq!(validate_password("{xor}Lz4sLCgwLTs=", "8.5.5.9"), PasswordState::Ok);
        assert_eq!(validate_password("{hash}deadbeef", "8.5.0.1"), PasswordState::Ok);
    }

    #[test]
    fn aes_depends_on_runtime() {
        assert_eq!(
            validate_password("{aes}abc", "8.5.0.1"),
            PasswordState::NotSupportAes
        );
        assert_eq!(validate_password("{aes}abc", "8.5.5.9"), PasswordState::Ok);
        assert_eq!(validate_password("{aes}abc", "24.0.0.1"), PasswordState::Ok);
    }

    #[test]
    fn unprefixed_is_plain_text() {
        assert_eq!(
            validate_password("hunter2", "8.5.5.9"),
            PasswordState::PlainText
        );
        // An unterminated brace is not an algorithm prefix
        assert_eq!(
            validate_password("{oops", "8.5.5.9"),
            PasswordState::PlainText
        );
    }

    #[test]
    fn unknown_prefix_is_flagged() {
        assert_eq!(
            validate_password("{rot13}abc", "8.5.5.9"),
            PasswordState::UnknownAlgorithm
        );
    }
}
