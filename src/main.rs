use anyhow::Context;
use gateway_orchestrator::api::{self, AppState};
use gateway_orchestrator::config::Config;
use gateway_orchestrator::payments::providers::{GatewayRegistry, MockGateway};
use gateway_orchestrator::payments::rate_limit::RateLimiter;
use gateway_orchestrator::payments::service::PaymentService;
use gateway_orchestrator::quotes::QuoteEngine;
use gateway_orchestrator::webhooks::engine::WebhookEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;

    tracing::info!("Starting payment gateway orchestrator");
    tracing::info!("Environment: {}", config.server.environment);
    tracing::info!("Payment gateway: {}", config.gateway.tag);

    // Only the in-memory adapter ships with this binary; other tags fail selection
    let registry = GatewayRegistry::new()
        .register(Arc::new(MockGateway::new(config.gateway.mock.clone())));
    let gateway = registry
        .select(&config.gateway.tag)
        .context("failed to select payment gateway")?;

    let service = Arc::new(
        PaymentService::new(
            gateway.clone(),
            RateLimiter::new(config.rate_limit.clone()),
            config.payments.clone(),
        )
        .with_quote_engine(QuoteEngine::new(config.quotes.validity_secs)),
    );
    tracing::info!(
        "Conversion quotes valid for {}s",
        service.quote_engine().validity().num_seconds()
    );
    let engine = Arc::new(
        WebhookEngine::new(service)
            .with_signature_verification(config.webhook.verify_signatures),
    );
    if !config.webhook.verify_signatures {
        tracing::warn!("Webhook signature verification is disabled");
    }

    let state = AppState::new(engine, config.server.environment.as_str())
        .with_ack_unknown_events(config.webhook.ack_unknown_events);
    let app = api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("HOST and PORT must form a valid socket address")?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    gateway.close().await?;
    tracing::info!("Payment gateway closed");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
