use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use x509_parser::der_parser::asn1_rs::Oid;
use x509_parser::oid_registry::OID_PKCS1_RSAENCRYPTION;
use x509_parser::prelude::*;

use crate::config::{PinningConfig, PinningMode};
use crate::trust::TrustStore;

/// DER prefix turning a 2048-bit RSA PKCS#1 public key into its full
/// SubjectPublicKeyInfo encoding: the SEQUENCE header, the rsaEncryption
/// AlgorithmIdentifier, and the BIT STRING header.
const RSA_2048_SPKI_PREFIX: [u8; 24] = [
    0x30, 0x82, 0x01, 0x22, 0x30, 0x0d, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86,
    0xf7, 0x0d, 0x01, 0x01, 0x01, 0x05, 0x00, 0x03, 0x82, 0x01, 0x0f, 0x00,
];

/// PKCS#1 RSAPublicKey length for a 2048-bit modulus with a 3-byte exponent.
/// The prefix above encodes exactly this payload size.
const RSA_2048_PKCS1_LEN: usize = 270;

/// The certificates a server offered during one handshake, leaf first,
/// together with the transport's chain-of-trust verdict (path building,
/// expiry, hostname). Borrowed: the chain only lives for one evaluation.
#[derive(Debug)]
pub struct ServerTrustChain<'a> {
    certs: Vec<&'a [u8]>,
    platform_trust: bool,
}

impl<'a> ServerTrustChain<'a> {
    pub fn new(certs: Vec<&'a [u8]>, platform_trust: bool) -> Self {
        ServerTrustChain {
            certs,
            platform_trust,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// The end-entity certificate, when the server offered anything at all.
    pub fn leaf(&self) -> Option<&'a [u8]> {
        self.certs.first().copied()
    }

    pub fn platform_trust(&self) -> bool {
        self.platform_trust
    }
}

/// Outcome of evaluating one handshake. Produced exactly once per handshake
/// and consumed immediately by the TLS layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinningDecision {
    Accept,
    Reject(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Pinning is switched off entirely; the validator fails closed.
    PinningDisabled,
    /// The server offered no trust material.
    EmptyChain,
    /// Chain-of-trust evaluation failed for the offered chain.
    UntrustedChain,
    /// The leaf certificate differs from the bundled reference.
    CertificateMismatch,
    /// The leaf certificate could not be parsed.
    LeafUnparseable,
    /// The leaf's key is not one of the pinnable (algorithm, size) shapes.
    UnsupportedKey,
    /// The leaf's public-key hash differs from the reference pin.
    KeyMismatch,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            RejectReason::PinningDisabled => "ssl pinning disabled",
            RejectReason::EmptyChain => "empty server trust chain",
            RejectReason::UntrustedChain => "server chain failed trust evaluation",
            RejectReason::CertificateMismatch => "certificate does not match pinned certificate",
            RejectReason::LeafUnparseable => "leaf certificate unparseable",
            RejectReason::UnsupportedKey => "leaf public key shape not pinnable",
            RejectReason::KeyMismatch => "public key hash does not match pin",
        };
        f.write_str(msg)
    }
}

/// Decides trust for one handshake against the bundled reference material.
///
/// Pure computation over the offered chain: no I/O, no mutation, safe to
/// share across concurrent handshakes.
#[derive(Debug)]
pub struct PinningValidator {
    store: Arc<TrustStore>,
    config: PinningConfig,
}

impl PinningValidator {
    pub fn new(store: Arc<TrustStore>, config: PinningConfig) -> Self {
        PinningValidator { store, config }
    }

    pub fn mode(&self) -> PinningMode {
        self.config.mode
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Evaluate one offered chain. Accept is only returned when the
    /// configured comparison strictly succeeded.
    pub fn evaluate(&self, chain: &ServerTrustChain<'_>) -> PinningDecision {
        if !self.config.enabled {
            tracing::warn!("⚠️  SSL pinning is disabled, rejecting handshake (fail closed)");
            return PinningDecision::Reject(RejectReason::PinningDisabled);
        }

        let Some(leaf) = chain.leaf() else {
            tracing::error!("server offered an empty trust chain");
            return PinningDecision::Reject(RejectReason::EmptyChain);
        };

        let decision = match self.config.mode {
            PinningMode::Certificate => self.evaluate_certificate(chain, leaf),
            PinningMode::PublicKey => self.evaluate_public_key(leaf),
        };

        match decision {
            PinningDecision::Accept => tracing::info!("🔒 pinning check passed"),
            PinningDecision::Reject(reason) => tracing::error!("❌ pinning check failed: {reason}"),
        }
        decision
    }

    fn evaluate_certificate(&self, chain: &ServerTrustChain<'_>, leaf: &[u8]) -> PinningDecision {
        let matches = leaf == self.store.certificate();

        // Both conditions are required: an expired or wrongly-named chain is
        // rejected even when the bytes match, and a trusted chain is
        // rejected unless the leaf is byte-identical to the reference.
        if matches && chain.platform_trust() {
            PinningDecision::Accept
        } else if !matches {
            PinningDecision::Reject(RejectReason::CertificateMismatch)
        } else {
            PinningDecision::Reject(RejectReason::UntrustedChain)
        }
    }

    fn evaluate_public_key(&self, leaf: &[u8]) -> PinningDecision {
        let Ok((_, cert)) = X509Certificate::from_der(leaf) else {
            return PinningDecision::Reject(RejectReason::LeafUnparseable);
        };

        let spki = cert.public_key();
        let key: &[u8] = &spki.subject_public_key.data;

        let Some(prefix) = spki_prefix(&spki.algorithm.algorithm, key.len()) else {
            tracing::error!(
                "leaf key not pinnable (oid {}, {} key bytes)",
                spki.algorithm.algorithm,
                key.len()
            );
            return PinningDecision::Reject(RejectReason::UnsupportedKey);
        };

        let mut hasher = Sha256::new();
        hasher.update(prefix);
        hasher.update(key);
        let server_pin = BASE64_STANDARD.encode(hasher.finalize());
        tracing::debug!("server public key pin: {server_pin}");

        if server_pin == self.store.public_key_pin() {
            PinningDecision::Accept
        } else {
            PinningDecision::Reject(RejectReason::KeyMismatch)
        }
    }
}

/// Lookup of the SubjectPublicKeyInfo prefix by (key algorithm, key length).
/// Only the RSA-2048 entry is populated; any other shape is not pinnable and
/// must be rejected rather than hashed with the wrong prefix.
fn spki_prefix(algorithm: &Oid<'_>, key_len: usize) -> Option<&'static [u8]> {
    if *algorithm == OID_PKCS1_RSAENCRYPTION && key_len == RSA_2048_PKCS1_LEN {
        return Some(&RSA_2048_SPKI_PREFIX);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::REFERENCE_PUBLIC_KEY_PIN;

    const PINNED: &[u8] = include_bytes!("../testdata/pinned.cer");
    const OTHER: &[u8] = include_bytes!("../testdata/other.cer");
    const EC: &[u8] = include_bytes!("../testdata/ec.cer");

    fn validator(enabled: bool, mode: PinningMode) -> PinningValidator {
        let store = Arc::new(TrustStore::from_der(PINNED.to_vec(), REFERENCE_PUBLIC_KEY_PIN));
        PinningValidator::new(store, PinningConfig { enabled, mode })
    }

    fn chain<'a>(certs: Vec<&'a [u8]>, platform_trust: bool) -> ServerTrustChain<'a> {
        ServerTrustChain::new(certs, platform_trust)
    }

    #[test]
    fn certificate_mode_accepts_exact_match_on_trusted_chain() {
        let v = validator(true, PinningMode::Certificate);
        assert_eq!(v.evaluate(&chain(vec![PINNED], true)), PinningDecision::Accept);
    }

    #[test]
    fn certificate_mode_ignores_intermediates() {
        let v = validator(true, PinningMode::Certificate);
        assert_eq!(v.evaluate(&chain(vec![PINNED, OTHER], true)), PinningDecision::Accept);
    }

    #[test]
    fn certificate_mode_rejects_different_certificate() {
        let v = validator(true, PinningMode::Certificate);
        assert_eq!(
            v.evaluate(&chain(vec![OTHER], true)),
            PinningDecision::Reject(RejectReason::CertificateMismatch)
        );
    }

    #[test]
    fn certificate_mode_rejects_single_byte_difference() {
        let mut tampered = PINNED.to_vec();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;

        let v = validator(true, PinningMode::Certificate);
        assert_eq!(
            v.evaluate(&chain(vec![tampered.as_slice()], true)),
            PinningDecision::Reject(RejectReason::CertificateMismatch)
        );
    }

    #[test]
    fn certificate_mode_rejects_matching_leaf_on_untrusted_chain() {
        let v = validator(true, PinningMode::Certificate);
        assert_eq!(
            v.evaluate(&chain(vec![PINNED], false)),
            PinningDecision::Reject(RejectReason::UntrustedChain)
        );
    }

    #[test]
    fn public_key_mode_accepts_reference_key() {
        // The stored pin was computed independently (openssl) over the
        // leaf's SubjectPublicKeyInfo, so this exercises the full prefix
        // reconstruction and hashing path.
        let v = validator(true, PinningMode::PublicKey);
        assert_eq!(v.evaluate(&chain(vec![PINNED], false)), PinningDecision::Accept);
    }

    #[test]
    fn public_key_mode_rejects_different_key() {
        let v = validator(true, PinningMode::PublicKey);
        assert_eq!(
            v.evaluate(&chain(vec![OTHER], false)),
            PinningDecision::Reject(RejectReason::KeyMismatch)
        );
    }

    #[test]
    fn public_key_mode_rejects_non_rsa_2048_key() {
        let v = validator(true, PinningMode::PublicKey);
        assert_eq!(
            v.evaluate(&chain(vec![EC], false)),
            PinningDecision::Reject(RejectReason::UnsupportedKey)
        );
    }

    #[test]
    fn public_key_mode_rejects_unparseable_leaf() {
        let garbage: &[u8] = b"not a certificate";
        let v = validator(true, PinningMode::PublicKey);
        assert_eq!(
            v.evaluate(&chain(vec![garbage], false)),
            PinningDecision::Reject(RejectReason::LeafUnparseable)
        );
    }

    #[test]
    fn disabled_pinning_fails_closed_in_both_modes() {
        for mode in [PinningMode::Certificate, PinningMode::PublicKey] {
            let v = validator(false, mode);
            assert_eq!(
                v.evaluate(&chain(vec![PINNED], true)),
                PinningDecision::Reject(RejectReason::PinningDisabled)
            );
        }
    }

    #[test]
    fn empty_chain_rejects_in_both_modes() {
        for mode in [PinningMode::Certificate, PinningMode::PublicKey] {
            let v = validator(true, mode);
            assert_eq!(
                v.evaluate(&chain(Vec::new(), true)),
                PinningDecision::Reject(RejectReason::EmptyChain)
            );
        }
    }
}
