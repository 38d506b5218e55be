use backend::db;
use backend::monitor::runtime::RuntimeDeps;
use backend::server::config::ServerConfig;
use backend::server::supervisor::Supervisor;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .compact()
        .init();

    let config = ServerConfig::from_env()?;
    let pool = db::connect(&config.database_url).await?;
    tracing::info!("Migrations applied. Store is ready.");

    let supervisor = Supervisor::new(RuntimeDeps::new(pool.clone(), &config));
    let started = supervisor.start_all().await?;
    tracing::info!(monitors = started, "Pulsewatch is monitoring.");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down.");
    supervisor.shutdown();
    pool.close().await;
    Ok(())
}
