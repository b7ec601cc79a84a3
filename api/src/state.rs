use crate::config::AppConfig;
use crate::geolocation;
use crate::resolver::RegionResolver;
use anyhow::{Context, Result};
use linkpage_common::{ContentCatalog, Profile};
use std::sync::Arc;

/// Read-only state shared by all request handlers.
#[derive(Debug)]
pub struct AppState {
    pub config: AppConfig,
    pub catalog: Arc<ContentCatalog>,
    pub profile: Profile,
    pub resolver: RegionResolver,
}

impl AppState {
    pub fn load(config: AppConfig) -> Result<Self> {
        let catalog = load_catalog(&config)?;
        let profile = load_profile(&config)?;
        let geo = geolocation::from_config(&config.geolocation)
            .context("Failed to set up geolocation client")?;

        tracing::info!(
            cards = catalog.len(),
            geolocation = geo.as_ref().map(|g| g.name()).unwrap_or("disabled"),
            environment = %config.environment,
            "Application state loaded"
        );

        let resolver = RegionResolver::new(geo, config.geolocation.timeout, config.is_development());
        Ok(Self {
            config,
            catalog: Arc::new(catalog),
            profile,
            resolver,
        })
    }
}

pub fn load_catalog(config: &AppConfig) -> Result<ContentCatalog> {
    match &config.cards_file {
        Some(path) => {
            tracing::info!("Loading card catalog from {}", path.display());
            ContentCatalog::load_from_file(path)
        }
        None => ContentCatalog::bundled(),
    }
}

pub fn load_profile(config: &AppConfig) -> Result<Profile> {
    match &config.profile_file {
        Some(path) => {
            tracing::info!("Loading profile from {}", path.display());
            Profile::load_from_file(path)
        }
        None => Profile::bundled(),
    }
}
