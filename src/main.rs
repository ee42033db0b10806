use tempchat::{auth::Credentials, config::Config, db::Db, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tempchat=info")))
        .init();

    let db = Db::connect(&config.database_url, config.db_max_connections, config.storage_timeout).await?;
    let state = AppState::new(db, Credentials::new(config.bcrypt_cost));
    let app = tempchat::app(state, &config)?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
