use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{error, info, LevelFilter};
use mealmind::classifier::OnnxClassifier;
use mealmind::config::Config;
use mealmind::server;
use mealmind::state::{AppState, ClassifierState, Domain};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_max_level(tracing_level(config.log_level))
        .init();

    // Both models must load before the socket is bound; a server that can
    // only answer one domain is not started.
    let food = load_classifier(Domain::Food, &config.food_model, config.intra_threads)?;
    let fruit = load_classifier(Domain::Fruit, &config.fruit_model, config.intra_threads)?;
    info!("Models loaded. Normalization: {:?}", config.normalization);

    let state = AppState { food, fruit, normalization: config.normalization };
    let app = server::router(state, config.body_limit);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Unable to bind {}", config.bind))?;
    info!("Listening on http://{}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn load_classifier(domain: Domain, path: &Path, intra_threads: usize) -> anyhow::Result<ClassifierState> {
    info!("Loading {} model from {:?}...", domain.name(), path);
    let now = std::time::Instant::now();
    let classifier = OnnxClassifier::load(path, domain.labels(), intra_threads)
        .with_context(|| format!("Unable to load the {} model", domain.name()))?;
    info!("Loading the {} model took {:?}", domain.name(), now.elapsed());

    Ok(ClassifierState::new(domain, Arc::new(classifier), path))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for shutdown signal: {:?}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

fn tracing_level(level: LevelFilter) -> tracing_subscriber::filter::LevelFilter {
    match level {
        LevelFilter::Off => tracing_subscriber::filter::LevelFilter::OFF,
        LevelFilter::Error => tracing_subscriber::filter::LevelFilter::ERROR,
        LevelFilter::Warn => tracing_subscriber::filter::LevelFilter::WARN,
        LevelFilter::Info => tracing_subscriber::filter::LevelFilter::INFO,
        LevelFilter::Debug => tracing_subscriber::filter::LevelFilter::DEBUG,
        LevelFilter::Trace => tracing_subscriber::filter::LevelFilter::TRACE,
    }
}
