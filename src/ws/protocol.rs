//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::player::{PlayerSlot, VisibleState};

/// Phase of the shared round clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for an opponent (session layer only)
    Connecting,
    /// Both seated, waiting for ready to begin a match
    Start,
    /// Pre-round countdown, waiting for ready
    Timer,
    /// Card selection, bounded by the round deadline
    Round,
    /// Clients play back the outcome, waiting for ready
    Animation,
    /// Match decided
    Finish,
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Ready for the current phase's barrier
    Ready,

    /// Card sequence for the active round
    SubmitCards {
        /// Catalog indices, negative means "no card"
        cards: Vec<i32>,
    },

    /// Decisive action that lets the round resolve early
    Fire,

    /// Ping for latency measurement
    Ping {
        /// Client timestamp
        t: u64,
    },

    /// Leave current match
    Leave,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome {
        connection_id: Uuid,
        server_time: u64,
    },

    /// Seated alone, waiting for an opponent
    Waiting,

    /// Seated in a match
    MatchJoined {
        match_id: Uuid,
        slot: PlayerSlot,
        max_health: i32,
        cards_per_round: usize,
        round_duration_ms: u64,
    },

    /// Current phase (sent on entry and as a heartbeat)
    Phase {
        phase: Phase,
        /// Rounds started so far
        round_number: u32,
    },

    /// Fresh match state
    InitPlayerState {
        health: i32,
        opponent_health: i32,
    },

    /// Prepare for input
    TimerStarted,

    /// Card selection is open
    RoundStarted {
        round_number: u32,
        duration_ms: u64,
    },

    /// A player's presentation action
    PlayerAction {
        slot: PlayerSlot,
        state: VisibleState,
    },

    /// Submission stored for this round
    CardsAccepted,

    /// Submission discarded, previous selection kept
    CardsRejected {
        reason: String,
    },

    /// Round result from one player's perspective
    Outcome {
        for_slot: PlayerSlot,
        self_health: i32,
        self_state: VisibleState,
        opponent_cards: Vec<i32>,
        opponent_health: i32,
        opponent_state: VisibleState,
        /// Player whose action closed the round early
        shooter: Option<PlayerSlot>,
    },

    /// Match decided
    Finish {
        /// Winning slot, -1 for a draw
        winner: i8,
        final_health: [i32; 2],
    },

    /// Match torn down
    Aborted {
        reason: String,
    },

    /// Error message
    Error {
        code: String,
        message: String,
    },

    /// Pong response
    Pong {
        /// Echo back client timestamp
        t: u64,
    },
}

/// Who an outbound message is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Both,
    Player(PlayerSlot),
}

/// Outbound message with its addressee
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub to: Recipient,
    pub msg: ServerMsg,
}

impl Envelope {
    pub fn both(msg: ServerMsg) -> Self {
        Self {
            to: Recipient::Both,
            msg,
        }
    }

    pub fn to(slot: PlayerSlot, msg: ServerMsg) -> Self {
        Self {
            to: Recipient::Player(slot),
            msg,
        }
    }

    pub fn is_for(&self, slot: PlayerSlot) -> bool {
        match self.to {
            Recipient::Both => true,
            Recipient::Player(target) => target == slot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_type_tag() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"type":"submit_cards","cards":[0,-1,3]}"#).unwrap();
        assert_eq!(
            msg,
            ClientMsg::SubmitCards {
                cards: vec![0, -1, 3]
            }
        );

        let ready: ClientMsg = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert_eq!(ready, ClientMsg::Ready);
    }

    #[test]
    fn finish_serializes_draw_as_minus_one() {
        let json = serde_json::to_value(ServerMsg::Finish {
            winner: -1,
            final_health: [0, 0],
        })
        .unwrap();
        assert_eq!(json["type"], "finish");
        assert_eq!(json["winner"], -1);
    }

    #[test]
    fn phase_and_slot_wire_forms() {
        let json = serde_json::to_value(ServerMsg::PlayerAction {
            slot: PlayerSlot::SECOND,
            state: VisibleState::Shooting,
        })
        .unwrap();
        assert_eq!(json["slot"], 1);
        assert_eq!(json["state"], "shooting");

        let phase = serde_json::to_value(Phase::Animation).unwrap();
        assert_eq!(phase, "animation");
    }

    #[test]
    fn envelope_routing() {
        let private = Envelope::to(PlayerSlot::FIRST, ServerMsg::CardsAccepted);
        assert!(private.is_for(PlayerSlot::FIRST));
        assert!(!private.is_for(PlayerSlot::SECOND));
        assert!(Envelope::both(ServerMsg::TimerStarted).is_for(PlayerSlot::SECOND));
    }
}
