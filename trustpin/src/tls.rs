use std::sync::{Arc, OnceLock};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::config::{PinningConfig, PinningMode};
use crate::error::TrustError;
use crate::trust::TrustStore;
use crate::validator::{PinningDecision, PinningValidator, ServerTrustChain};

static CRYPTO_PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();

/// rustls 0.23 needs a process-level CryptoProvider when several providers
/// are linked in. Install ring once, before any config is built.
fn ensure_crypto_provider() {
    CRYPTO_PROVIDER_INSTALLED.get_or_init(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Certificate verifier that delegates every handshake trust decision to the
/// pinning validator. One evaluation per handshake; a reject terminates the
/// connection attempt as a handshake error.
#[derive(Debug)]
pub struct PinnedServerCertVerifier {
    validator: PinningValidator,
    chain_verifier: Option<Arc<WebPkiServerVerifier>>,
    provider: Arc<CryptoProvider>,
}

impl PinnedServerCertVerifier {
    pub fn new(store: Arc<TrustStore>, config: PinningConfig) -> Result<Self, TrustError> {
        ensure_crypto_provider();
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        // Certificate mode also requires the offered chain to evaluate as
        // trusted. The reference certificate is the only root: a pinned
        // self-signed certificate chains to itself, and expiry/hostname are
        // still enforced. Key mode never consults this verdict.
        let chain_verifier = if config.enabled && config.mode == PinningMode::Certificate {
            let mut roots = RootCertStore::empty();
            roots
                .add(store.certificate_der().clone())
                .map_err(|e| TrustError::BadAsset(format!("reference certificate rejected: {e}")))?;
            let verifier = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
                .build()
                .map_err(|e| TrustError::BadAsset(e.to_string()))?;
            Some(verifier)
        } else {
            None
        };

        Ok(PinnedServerCertVerifier {
            validator: PinningValidator::new(store, config),
            chain_verifier,
            provider,
        })
    }
}

impl ServerCertVerifier for PinnedServerCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let platform_trust = match &self.chain_verifier {
            Some(verifier) => verifier
                .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
                .is_ok(),
            None => false,
        };

        let mut certs: Vec<&[u8]> = Vec::with_capacity(1 + intermediates.len());
        certs.push(end_entity.as_ref());
        certs.extend(intermediates.iter().map(|c| c.as_ref()));
        let chain = ServerTrustChain::new(certs, platform_trust);

        match self.validator.evaluate(&chain) {
            PinningDecision::Accept => Ok(ServerCertVerified::assertion()),
            PinningDecision::Reject(reason) => {
                Err(rustls::Error::General(format!("pinning rejected handshake: {reason}")))
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Client TLS config with the pinning verifier installed. The root store is
/// empty on purpose: trust comes from the pin, not from a CA bundle.
pub fn pinned_client_config(
    store: Arc<TrustStore>,
    config: PinningConfig,
) -> Result<Arc<ClientConfig>, TrustError> {
    ensure_crypto_provider();

    tracing::info!("🔒 SSL pinning mode: {:?} (enabled: {})", config.mode, config.enabled);
    tracing::info!("📌 pinned certificate: {} bytes", store.certificate().len());

    let verifier = Arc::new(PinnedServerCertVerifier::new(store, config)?);

    let mut client_config = ClientConfig::builder()
        .with_root_certificates(RootCertStore::empty())
        .with_no_client_auth();
    client_config
        .dangerous()
        .set_certificate_verifier(verifier);

    Ok(Arc::new(client_config))
}
