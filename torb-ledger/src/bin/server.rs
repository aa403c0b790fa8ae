//! Torb box office HTTP server binary

use actix_web::{middleware::Logger, web, App, HttpServer};
use std::sync::Arc;
use torb_ledger::{api, storage::MySqlStore, BoxOffice, Config, Metrics};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting Torb box office");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        "Configuration loaded"
    );

    // Open store and load ledgers
    let store = Arc::new(MySqlStore::connect(&config.database).await?);
    let metrics = Metrics::new()?;
    let office = Arc::new(BoxOffice::open(&config, store, metrics).await?);

    // Start HTTP server
    tracing::info!("Starting HTTP server on {}", config.http_listen_addr);
    let data = web::Data::new(office.clone());
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(Logger::default())
            .configure(api::configure_routes)
    })
    .bind(&config.http_listen_addr)?
    .run()
    .await?;

    office.shutdown().await?;
    tracing::info!("Torb box office stopped");
    Ok(())
}
