/// Which comparison the validator performs for an enabled handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinningMode {
    /// Byte-compare the leaf certificate against the bundled reference.
    Certificate,
    /// Hash the leaf's public key and compare against the reference pin.
    PublicKey,
}

/// Pinning switches, fixed per validator instance.
///
/// `enabled = false` does not bypass pinning: every handshake is rejected.
/// Turning the feature off must never downgrade to "trust everything".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinningConfig {
    pub enabled: bool,
    pub mode: PinningMode,
}

impl Default for PinningConfig {
    fn default() -> Self {
        PinningConfig {
            enabled: true,
            mode: PinningMode::Certificate,
        }
    }
}

impl PinningConfig {
    /// Read the switches from `ENABLE_SSL_PINNING` and `CERTIFICATE_PINNING`.
    /// Both default to "true"; any other value than the literal string
    /// "true" turns the flag off.
    pub fn from_env() -> Self {
        let enabled = env_flag("ENABLE_SSL_PINNING", true);
        let certificate = env_flag("CERTIFICATE_PINNING", true);

        PinningConfig {
            enabled,
            mode: if certificate {
                PinningMode::Certificate
            } else {
                PinningMode::PublicKey
            },
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => value == "true",
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_certificate_pinning_enabled() {
        let config = PinningConfig::default();
        assert!(config.enabled);
        assert_eq!(config.mode, PinningMode::Certificate);
    }

    #[test]
    fn env_flag_falls_back_to_default_when_unset() {
        assert!(env_flag("TRUSTPIN_TEST_FLAG_UNSET", true));
        assert!(!env_flag("TRUSTPIN_TEST_FLAG_UNSET", false));
    }

    #[test]
    fn env_flag_only_accepts_literal_true() {
        std::env::set_var("TRUSTPIN_TEST_FLAG_SET", "1");
        assert!(!env_flag("TRUSTPIN_TEST_FLAG_SET", true));

        std::env::set_var("TRUSTPIN_TEST_FLAG_SET", "true");
        assert!(env_flag("TRUSTPIN_TEST_FLAG_SET", false));
        std::env::remove_var("TRUSTPIN_TEST_FLAG_SET");
    }
}
