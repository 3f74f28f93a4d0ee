//! Player records held by a match

use serde::{Deserialize, Serialize};

use super::catalog::{CardCatalog, CardIndex};

/// Seat of a player in a match, 0 or 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerSlot(u8);

impl PlayerSlot {
    pub const FIRST: PlayerSlot = PlayerSlot(0);
    pub const SECOND: PlayerSlot = PlayerSlot(1);
    pub const BOTH: [PlayerSlot; 2] = [Self::FIRST, Self::SECOND];

    pub fn new(raw: u8) -> Option<Self> {
        (raw < 2).then_some(Self(raw))
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn opponent(self) -> Self {
        Self(1 - self.0)
    }
}

impl std::fmt::Display for PlayerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome classification shown to both clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibleState {
    #[default]
    Idle,
    Bleeding,
    Healing,
    Dead,
    Shooting,
    Dodge,
}

/// One position of a round's card sequence; `None` is "no card"
pub type CardSlot = Option<CardIndex>;

/// Why a card submission was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("expected {expected} cards, got {got}")]
    WrongCount { expected: usize, got: usize },

    #[error("card index {0} is not in the catalog")]
    UnknownIndex(i64),
}

/// Validate wire card indices; negative values are the "no card" sentinel
pub fn parse_selection(
    raw: &[i32],
    expected: usize,
    catalog: &dyn CardCatalog,
) -> Result<Vec<CardSlot>, SelectionError> {
    if raw.len() != expected {
        return Err(SelectionError::WrongCount {
            expected,
            got: raw.len(),
        });
    }

    raw.iter()
        .map(|&value| {
            if value < 0 {
                return Ok(None);
            }
            u16::try_from(value)
                .ok()
                .map(CardIndex)
                .filter(|index| catalog.contains(*index))
                .map(Some)
                .ok_or(SelectionError::UnknownIndex(value as i64))
        })
        .collect()
}

/// Wire form of a selection, sentinel as -1
pub fn selection_to_wire(cards: &[CardSlot]) -> Vec<i32> {
    cards
        .iter()
        .map(|slot| slot.map(|i| i32::from(i.0)).unwrap_or(-1))
        .collect()
}

/// Authoritative player record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub slot: PlayerSlot,
    pub health: i32,
    pub max_health: i32,
    pub selected_cards: Vec<CardSlot>,
    pub ready: bool,
    pub visible_state: VisibleState,

    // Round bookkeeping
    pub submitted: bool,
    pub did_fire: bool,
    pub connected: bool,
}

impl Player {
    pub fn new(slot: PlayerSlot, max_health: i32, cards_per_round: usize) -> Self {
        Self {
            slot,
            health: max_health,
            max_health,
            selected_cards: vec![None; cards_per_round],
            ready: false,
            visible_state: VisibleState::Idle,
            submitted: false,
            did_fire: false,
            connected: true,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    /// Restore full health at the start of a match
    pub fn reset_for_match(&mut self) {
        self.health = self.max_health;
        self.visible_state = VisibleState::Idle;
        self.clear_selection();
    }

    /// Reset per-round input before card selection opens
    pub fn reset_for_round(&mut self) {
        self.ready = false;
        self.did_fire = false;
        self.clear_selection();
    }

    pub fn clear_selection(&mut self) {
        self.selected_cards.iter_mut().for_each(|slot| *slot = None);
        self.submitted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::catalog::StaticCatalog;

    #[test]
    fn slot_opponent_is_other_seat() {
        assert_eq!(PlayerSlot::FIRST.opponent(), PlayerSlot::SECOND);
        assert_eq!(PlayerSlot::SECOND.opponent(), PlayerSlot::FIRST);
        assert!(PlayerSlot::new(2).is_none());
    }

    #[test]
    fn negative_entries_are_sentinels() {
        let catalog = StaticCatalog::default();
        let parsed = parse_selection(&[-1, 0, -7], 3, &catalog).unwrap();
        assert_eq!(parsed, vec![None, Some(CardIndex(0)), None]);
        assert_eq!(selection_to_wire(&parsed), vec![-1, 0, -1]);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let catalog = StaticCatalog::default();
        let past_end = catalog.len() as i32;
        assert_eq!(
            parse_selection(&[0, past_end, 1], 3, &catalog),
            Err(SelectionError::UnknownIndex(past_end as i64))
        );
    }

    #[test]
    fn wrong_length_is_rejected() {
        let catalog = StaticCatalog::default();
        assert_eq!(
            parse_selection(&[0, 1], 3, &catalog),
            Err(SelectionError::WrongCount { expected: 3, got: 2 })
        );
    }

    #[test]
    fn round_reset_keeps_health() {
        let mut player = Player::new(PlayerSlot::FIRST, 7, 3);
        player.health = 4;
        player.ready = true;
        player.did_fire = true;
        player.submitted = true;
        player.selected_cards[1] = Some(CardIndex(2));

        player.reset_for_round();

        assert_eq!(player.health, 4);
        assert!(!player.ready && !player.did_fire && !player.submitted);
        assert!(player.selected_cards.iter().all(Option::is_none));
    }
}
