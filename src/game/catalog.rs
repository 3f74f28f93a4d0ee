//! Card catalog - read-only table from card index to effect

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Index of a card in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardIndex(pub u16);

impl std::fmt::Display for CardIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a card does when resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    /// Hurts both players
    DamageBoth,
    /// Hurts the opponent
    DamageEnemy,
    /// Hurts the player who played it
    DamageSelf,
    /// Cancels incoming damage, never healing
    Evade,
    /// Restores health
    Heal,
}

/// Effect descriptor returned by a catalog lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardEffect {
    pub effect: EffectKind,
    pub magnitude: i32,
}

impl CardEffect {
    pub const fn new(effect: EffectKind, magnitude: i32) -> Self {
        Self { effect, magnitude }
    }
}

/// A catalog entry with its display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDefinition {
    pub name: String,
    #[serde(flatten)]
    pub effect: CardEffect,
}

/// Read-only card lookup consumed by the resolver
pub trait CardCatalog: Send + Sync {
    /// Look up a card's effect
    fn lookup(&self, index: CardIndex) -> Result<CardEffect, CatalogError>;

    /// Number of cards; valid indices are `0..len()`
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, index: CardIndex) -> bool {
        (index.0 as usize) < self.len()
    }
}

/// Catalog errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Unknown card index {0}")]
    UnknownCard(CardIndex),

    #[error("Card {name:?} has negative magnitude {magnitude}")]
    NegativeMagnitude { name: String, magnitude: i32 },

    #[error("Catalog has {0} cards, more than an index can address")]
    TooLarge(usize),

    #[error("Catalog is empty")]
    Empty,

    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// In-memory catalog backed by a vector of definitions
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    cards: Vec<CardDefinition>,
}

impl StaticCatalog {
    /// Build a catalog, rejecting negative magnitudes
    pub fn new(cards: Vec<CardDefinition>) -> Result<Self, CatalogError> {
        if cards.is_empty() {
            return Err(CatalogError::Empty);
        }
        if cards.len() > u16::MAX as usize {
            return Err(CatalogError::TooLarge(cards.len()));
        }
        if let Some(bad) = cards.iter().find(|c| c.effect.magnitude < 0) {
            return Err(CatalogError::NegativeMagnitude {
                name: bad.name.clone(),
                magnitude: bad.effect.magnitude,
            });
        }
        Ok(Self { cards })
    }

    /// Load a JSON array of card definitions
    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let cards: Vec<CardDefinition> = serde_json::from_str(raw)?;
        Self::new(cards)
    }

    pub fn cards(&self) -> &[CardDefinition] {
        &self.cards
    }
}

impl Default for StaticCatalog {
    /// The built-in duel deck
    fn default() -> Self {
        let card = |name: &str, effect, magnitude| CardDefinition {
            name: name.to_string(),
            effect: CardEffect::new(effect, magnitude),
        };

        Self {
            cards: vec![
                card("Shoot", EffectKind::DamageEnemy, 2),
                card("Aimed Shot", EffectKind::DamageEnemy, 3),
                card("Dodge", EffectKind::Evade, 2),
                card("Roll", EffectKind::Evade, 3),
                card("Bandage", EffectKind::Heal, 1),
                card("Medkit", EffectKind::Heal, 3),
                card("Dynamite", EffectKind::DamageBoth, 2),
                card("Misfire", EffectKind::DamageSelf, 1),
            ],
        }
    }
}

impl CardCatalog for StaticCatalog {
    fn lookup(&self, index: CardIndex) -> Result<CardEffect, CatalogError> {
        self.cards
            .get(index.0 as usize)
            .map(|c| c.effect)
            .ok_or(CatalogError::UnknownCard(index))
    }

    fn len(&self) -> usize {
        self.cards.len()
    }
}
