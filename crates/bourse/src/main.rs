use bourse::{BourseError, BourseServer, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), BourseError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;
    let server = BourseServer::builder().config(config).build().await?;
    tracing::info!(addr = %server.local_addr()?, "bourse listening");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
}
