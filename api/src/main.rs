mod config;
mod cookie_storage;
mod geolocation;
mod openapi;
mod request_logging;
mod resolver;
mod state;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::AppConfig;
use linkpage_common::{ContentCatalog, Region};
use openapi::create_combined_api;
use poem::{
    handler,
    listener::TcpListener,
    middleware::{CookieJarManager, Cors},
    web::Redirect,
    Endpoint, EndpointExt, Route, Server,
};
use poem_openapi::OpenApiService;
use request_logging::RequestLogging;
use state::AppState;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "linkpage-server")]
#[command(about = "Region-aware link page API server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve,
    /// Load and validate the card catalog and profile, then print a per-region summary
    CheckContent,
}

#[handler]
fn index() -> Redirect {
    Redirect::temporary("/api/v1/swagger")
}

fn build_app(state: Arc<AppState>) -> impl Endpoint {
    let api_service = OpenApiService::new(
        create_combined_api(),
        "Link Page API",
        env!("CARGO_PKG_VERSION"),
    )
    .server("/api/v1");
    let swagger_ui = api_service.swagger_ui();
    let spec = api_service.spec_endpoint();

    Route::new()
        .at("/", poem::get(index))
        .at("/api/v1/openapi.json", spec)
        .nest("/api/v1/swagger", swagger_ui)
        .nest("/api/v1", api_service)
        .data(state)
        .with(CookieJarManager::new())
        .with(Cors::new())
        .with(RequestLogging)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env file if it exists
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve => serve_command().await,
        Commands::CheckContent => check_content_command(),
    }
}

async fn serve_command() -> Result<()> {
    let config = AppConfig::from_env();
    let addr = format!("0.0.0.0:{}", config.port);
    let state = Arc::new(AppState::load(config).context("Failed to load application state")?);

    tracing::info!("Starting link page API server on {}", addr);

    Server::new(TcpListener::bind(&addr))
        .run(build_app(state))
        .await
        .context("Server error")
}

fn check_content_command() -> Result<()> {
    let config = AppConfig::from_env();
    let catalog = state::load_catalog(&config).context("Card catalog failed validation")?;
    let profile = state::load_profile(&config).context("Profile failed validation")?;

    println!(
        "Profile: {} ({} social links)",
        profile.name,
        profile.social_links.len()
    );
    println!("Cards: {}", catalog.len());
    for line in content_summary(&catalog) {
        println!("{}", line);
    }
    Ok(())
}

/// One line per region: name, card count and card ids in display order.
fn content_summary(catalog: &ContentCatalog) -> Vec<String> {
    Region::all()
        .into_iter()
        .map(|region| {
            let cards = catalog.cards_for_region(region);
            if cards.is_empty() {
                return format!(
                    "{} {}: no cards",
                    region.flag(),
                    region.display_name()
                );
            }
            let ids: Vec<&str> = cards.iter().map(|card| card.id.as_str()).collect();
            format!(
                "{} {}: {} cards [{}]",
                region.flag(),
                region.display_name(),
                cards.len(),
                ids.join(", ")
            )
        })
        .collect()
}
