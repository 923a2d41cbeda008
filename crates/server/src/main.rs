#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_dir = std::env::var("IMS_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    let config = ims_server::load_config(&config_dir);
    ims_observability::init(&config.logging);

    let app = ims_server::bootstrap(config)?;
    tracing::info!("press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    tokio::task::spawn_blocking(move || app.shutdown()).await?;
    Ok(())
}
