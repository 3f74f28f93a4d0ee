//! Game rules, round resolution and the per-match loop

pub mod catalog;
pub mod combat;
pub mod r#match;
pub mod player;
pub mod round;
pub mod snapshot;

pub use catalog::{CardCatalog, StaticCatalog};
pub use player::PlayerSlot;
pub use r#match::{GameMatch, MatchHandle, MatchRegistry, MatchStatus};
pub use round::{RoundError, RoundStateMachine};

use crate::util::time::unix_millis;
use crate::ws::protocol::ClientMsg;

/// Player input received from WebSocket
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub slot: PlayerSlot,
    pub msg: ClientMsg,
    pub received_at: u64,
}

impl PlayerInput {
    pub fn new(slot: PlayerSlot, msg: ClientMsg) -> Self {
        Self {
            slot,
            msg,
            received_at: unix_millis(),
        }
    }
}
