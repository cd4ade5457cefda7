use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use redpacket_engine::{
    config::Config, handlers, metrics, Allocator, PgStore, RedPacketService,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid configuration")?;

    info!(
        "Starting Red Packet Engine on {}:{}",
        config.server.host, config.server.port
    );

    let store = PgStore::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    store.migrate().await.context("Failed to run migrations")?;

    metrics::register_metrics(&metrics::REGISTRY).context("Failed to register metrics")?;

    let service = Arc::new(RedPacketService::new(
        Arc::new(store),
        Allocator::from_entropy(),
        config.packet.clone(),
    ));

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .app_data(web::Data::new(service.clone()))
            .configure(handlers::configure_routes::<PgStore>)
    })
    .workers(config.server.workers)
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await?;

    Ok(())
}
