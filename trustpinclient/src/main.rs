mod modules {
    pub mod client;
    pub mod endpoint;
    pub mod executor;
    pub mod models;
}

use std::collections::BTreeMap;
use std::sync::Arc;

use modules::endpoint::ApiEndpoint;
use modules::executor::{NetworkError, RequestExecutor};
use modules::models::UserListResponse;
use trustpin::config::PinningConfig;
use trustpin::trust::TrustStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut _guard = None;

    if std::env::var("CLIENT_LOG").unwrap_or_default() == "true" {
        let file_appender = tracing_appender::rolling::RollingFileAppender::new(
            tracing_appender::rolling::Rotation::DAILY,
            "./logs",
            "trustpin-client.log"
        );
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::fmt()
            .with_writer(tracing_subscriber::fmt::writer::MakeWriterExt::and(non_blocking, std::io::stdout))
            .with_target(false)
            .with_env_filter("info")
            .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new("%Y-%m-%dT%H:%M:%S".to_string()))
            .init();

        _guard = Some(guard);
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stdout)
            .with_target(false)
            .with_env_filter("info")
            .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new("%Y-%m-%dT%H:%M:%S".to_string()))
            .init();
    }

    tracing::info!("Starting pinned API client\n");

    let pinning = PinningConfig::from_env();
    let cert_path =
        std::env::var("PINNED_CERT").unwrap_or_else(|_| "certs/certificate.cer".to_string());
    let base_url =
        std::env::var("API_BASE_URL").unwrap_or_else(|_| "https://reqres.in/api/".to_string());

    // A missing reference certificate is fatal: there is no unpinned mode.
    let store = match TrustStore::load(&cert_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!("❌ {e}");
            return Err(e.into());
        }
    };

    let executor = RequestExecutor::new(base_url, store, pinning)?;

    tracing::info!("Test 1: Fetching user list...");
    match executor.execute::<UserListResponse>(&ApiEndpoint::Users).await {
        Ok(users) => {
            tracing::info!("✅ Request successful");
            for user in users.data.unwrap_or_default() {
                tracing::info!(
                    "  {} {}",
                    user.first_name.unwrap_or_default(),
                    user.last_name.unwrap_or_default()
                );
            }
        }
        Err(NetworkError::ConnectionRejected(detail)) => {
            tracing::error!("❌ Connection rejected: {detail}");
            tracing::warn!("This is expected if:");
            tracing::warn!("   - The server certificate does not match the pin");
            tracing::warn!("   - A proxy (Burp/mitmproxy) is intercepting");
            tracing::warn!("   - SSL pinning is disabled (fail closed)\n");
            return Err(NetworkError::ConnectionRejected(detail).into());
        }
        Err(e) => {
            tracing::error!("❌ Request failed: {e}");
            return Err(e.into());
        }
    }

    tracing::info!("Test 2: Fetching users with an id parameter...");
    let mut params = BTreeMap::new();
    params.insert("id".to_string(), "2".to_string());
    let raw: serde_json::Value = executor
        .execute(&ApiEndpoint::UsersWithId { params })
        .await?;
    tracing::info!("✅ Response: {raw}\n");

    tracing::info!("✅ All requests completed");
    Ok(())
}
