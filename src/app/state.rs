//! Application state shared across routes

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::game::catalog::{CatalogError, StaticCatalog};
use crate::game::MatchRegistry;
use crate::lobby::Lobby;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Arc<StaticCatalog>,
    pub lobby: Arc<Lobby>,
    pub match_registry: Arc<MatchRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, CatalogError> {
        let config = Arc::new(config);

        // Load the card catalog
        let catalog = match &config.card_catalog_path {
            Some(path) => {
                let catalog = StaticCatalog::from_json_file(path)?;
                info!(path = %path.display(), cards = catalog.cards().len(), "Loaded card catalog");
                catalog
            }
            None => StaticCatalog::default(),
        };
        let catalog = Arc::new(catalog);

        // Initialize match registry
        let match_registry = Arc::new(MatchRegistry::new());

        // Initialize lobby (Arc for sharing across cloned AppState)
        let lobby = Arc::new(Lobby::new(
            match_registry.clone(),
            config.rules.clone(),
            catalog.clone(),
        ));

        Ok(Self {
            config,
            catalog,
            lobby,
            match_registry,
        })
    }
}
