//! Outbound projections of match state

use crate::ws::protocol::{Envelope, ServerMsg};

use super::combat::Resolution;
use super::player::{selection_to_wire, Player, PlayerSlot};
use super::round::RoundContext;

/// Paces the phase heartbeat sent between phase changes
pub struct PhaseHeartbeat {
    /// Tick counter since last heartbeat
    ticks_since_heartbeat: u32,
    /// Heartbeat interval in ticks
    interval: u32,
}

impl PhaseHeartbeat {
    pub fn new(interval: u32) -> Self {
        Self {
            ticks_since_heartbeat: 0,
            interval: interval.max(1),
        }
    }

    /// Check if it's time to send a heartbeat
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_heartbeat += 1;
        if self.ticks_since_heartbeat >= self.interval {
            self.ticks_since_heartbeat = 0;
            true
        } else {
            false
        }
    }

    /// Restart the interval (a phase entry was just broadcast)
    pub fn reset(&mut self) {
        self.ticks_since_heartbeat = 0;
    }
}

/// Current phase as seen by both clients. Read-only.
pub fn phase_update(ctx: &RoundContext) -> Envelope {
    Envelope::both(ServerMsg::Phase {
        phase: ctx.phase,
        round_number: ctx.round_number,
    })
}

/// Fresh health for each player at match start
pub fn init_states(players: &[Player; 2]) -> Vec<Envelope> {
    PlayerSlot::BOTH
        .iter()
        .map(|&slot| {
            let me = &players[slot.index()];
            let opponent = &players[slot.opponent().index()];
            Envelope::to(
                slot,
                ServerMsg::InitPlayerState {
                    health: me.health,
                    opponent_health: opponent.health,
                },
            )
        })
        .collect()
}

/// One outcome per player, each from that player's perspective
pub fn outcomes(
    players: &[Player; 2],
    resolution: &Resolution,
    shooter: Option<PlayerSlot>,
) -> Vec<Envelope> {
    PlayerSlot::BOTH
        .iter()
        .map(|&slot| {
            let me = slot.index();
            let them = slot.opponent().index();
            Envelope::to(
                slot,
                ServerMsg::Outcome {
                    for_slot: slot,
                    self_health: resolution.health[me],
                    self_state: resolution.visible[me],
                    opponent_cards: selection_to_wire(&players[them].selected_cards),
                    opponent_health: resolution.health[them],
                    opponent_state: resolution.visible[them],
                    shooter,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::catalog::CardIndex;
    use crate::game::combat::ActionAccumulator;
    use crate::game::player::VisibleState;

    #[test]
    fn heartbeat_fires_every_interval() {
        let mut heartbeat = PhaseHeartbeat::new(3);
        let fired: Vec<bool> = (0..6).map(|_| heartbeat.should_send()).collect();
        assert_eq!(fired, vec![false, false, true, false, false, true]);

        heartbeat.should_send();
        heartbeat.reset();
        assert!(!heartbeat.should_send());
    }

    #[test]
    fn outcome_is_per_perspective() {
        let mut players = [
            Player::new(PlayerSlot::FIRST, 7, 2),
            Player::new(PlayerSlot::SECOND, 7, 2),
        ];
        players[0].selected_cards = vec![Some(CardIndex(3)), None];
        players[1].selected_cards = vec![None, Some(CardIndex(1))];
        let resolution = Resolution {
            health: [5, 7],
            visible: [VisibleState::Bleeding, VisibleState::Idle],
            tally: [ActionAccumulator::default(); 2],
        };

        let out = outcomes(&players, &resolution, Some(PlayerSlot::SECOND));

        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0],
            Envelope::to(
                PlayerSlot::FIRST,
                ServerMsg::Outcome {
                    for_slot: PlayerSlot::FIRST,
                    self_health: 5,
                    self_state: VisibleState::Bleeding,
                    opponent_cards: vec![-1, 1],
                    opponent_health: 7,
                    opponent_state: VisibleState::Idle,
                    shooter: Some(PlayerSlot::SECOND),
                }
            )
        );
        match &out[1].msg {
            ServerMsg::Outcome {
                opponent_cards,
                self_health,
                ..
            } => {
                assert_eq!(opponent_cards, &vec![3, -1]);
                assert_eq!(*self_health, 7);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }
}
