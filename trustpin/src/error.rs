use thiserror::Error;

/// Errors raised while loading or assembling the pinned trust material.
///
/// `AssetMissing` is a fatal configuration error: without the reference
/// certificate the pinning feature cannot operate, and there is no safe
/// fallback. Callers are expected to abort startup, not to continue with an
/// unpinned client.
#[derive(Debug, Error)]
pub enum TrustError {
    #[error("reference certificate asset not found: {path}")]
    AssetMissing { path: String },

    #[error("reference certificate asset is unusable: {0}")]
    BadAsset(String),
}
