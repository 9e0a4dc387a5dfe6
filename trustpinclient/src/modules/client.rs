use std::sync::Arc;

use reqwest::ClientBuilder;

/// Build an HTTP client whose TLS handshakes go through the pinning
/// verifier baked into `tls`. Each call constructs a fresh client, so no
/// connection or session state is shared between requests.
pub fn pinned_client(tls: Arc<rustls::ClientConfig>) -> reqwest::Result<reqwest::Client> {
    ClientBuilder::new()
        .use_preconfigured_tls((*tls).clone())
        .gzip(true)
        .build()
}
