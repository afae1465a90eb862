use anyhow::Context;

use famreport_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    famreport_observability::init();

    let config = ApiConfig::from_env()?;
    if config.crm.api_key.is_none() {
        tracing::warn!("VIRTUOUS_API_KEY not set; CRM calls will fail");
    }

    let app = famreport_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
