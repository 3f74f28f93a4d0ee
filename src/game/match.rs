//! Match handle, registry and authoritative tick loop

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::MatchRules;
use crate::ws::protocol::{ClientMsg, Envelope, Phase, ServerMsg};

use super::catalog::CardCatalog;
use super::player::PlayerSlot;
use super::round::{RoundError, RoundStateMachine};
use super::snapshot::PhaseHeartbeat;
use super::PlayerInput;

/// Read-only view of a running match for the HTTP layer
#[derive(Debug, Clone, Serialize)]
pub struct MatchStatus {
    pub match_id: Uuid,
    pub phase: Phase,
    pub round_number: u32,
    pub health: [i32; 2],
    pub connected: [bool; 2],
    pub created_at: DateTime<Utc>,
}

/// Handle to a running match
#[derive(Clone)]
pub struct MatchHandle {
    pub id: Uuid,
    pub input_tx: mpsc::Sender<PlayerInput>,
    pub outbound_tx: broadcast::Sender<Envelope>,
    status: Arc<RwLock<MatchStatus>>,
}

impl MatchHandle {
    pub fn status(&self) -> MatchStatus {
        self.status.read().clone()
    }

    pub fn connected_players(&self) -> usize {
        self.status.read().connected.iter().filter(|c| **c).count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.outbound_tx.subscribe()
    }
}

/// Registry of all active matches
pub struct MatchRegistry {
    matches: DashMap<Uuid, MatchHandle>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.get(id).map(|m| m.value().clone())
    }

    pub fn insert(&self, handle: MatchHandle) {
        self.matches.insert(handle.id, handle);
    }

    pub fn remove(&self, id: &Uuid) -> Option<MatchHandle> {
        self.matches.remove(id).map(|(_, h)| h)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn total_players(&self) -> usize {
        self.matches
            .iter()
            .map(|m| m.value().connected_players())
            .sum()
    }

    /// Status of every match, oldest first
    pub fn statuses(&self) -> Vec<MatchStatus> {
        let mut all: Vec<MatchStatus> = self.matches.iter().map(|m| m.value().status()).collect();
        all.sort_by_key(|s| s.created_at);
        all
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative game match
pub struct GameMatch {
    id: Uuid,
    machine: RoundStateMachine,
    input_rx: mpsc::Receiver<PlayerInput>,
    outbound_tx: broadcast::Sender<Envelope>,
    heartbeat: PhaseHeartbeat,
    status: Arc<RwLock<MatchStatus>>,
    /// Set when a finished match returns to `Start`
    rematch_since: Option<Instant>,
}

impl GameMatch {
    /// Create a new match with both slots filled
    pub fn new(id: Uuid, rules: MatchRules, catalog: Arc<dyn CardCatalog>) -> (Self, MatchHandle) {
        let (input_tx, input_rx) = mpsc::channel(256);
        let (outbound_tx, _) = broadcast::channel(64);
        let heartbeat = PhaseHeartbeat::new(rules.phase_heartbeat_ticks);
        let machine = RoundStateMachine::new(rules, catalog);

        let ctx = machine.context();
        let status = Arc::new(RwLock::new(MatchStatus {
            match_id: id,
            phase: ctx.phase,
            round_number: ctx.round_number,
            health: [ctx.players[0].health, ctx.players[1].health],
            connected: [true, true],
            created_at: Utc::now(),
        }));

        let handle = MatchHandle {
            id,
            input_tx,
            outbound_tx: outbound_tx.clone(),
            status: status.clone(),
        };

        let game_match = Self {
            id,
            machine,
            input_rx,
            outbound_tx,
            heartbeat,
            status,
            rematch_since: None,
        };

        (game_match, handle)
    }

    /// Run the authoritative tick loop until the match closes.
    /// Returns the reason it closed.
    pub async fn run(mut self) -> &'static str {
        info!(match_id = %self.id, "Match started");

        let mut tick_interval = interval(self.machine.rules().tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.publish(vec![self.machine.phase_update()]);

        let reason = loop {
            tick_interval.tick().await;

            // Drain input queue
            self.process_inputs();

            let now = Instant::now();
            let before = self.machine.phase();
            match self.machine.tick(now) {
                Ok(out) if !out.is_empty() => {
                    self.heartbeat.reset();
                    self.publish(out);
                }
                Ok(_) => {
                    if self.heartbeat.should_send() {
                        self.publish(vec![self.machine.phase_update()]);
                    }
                }
                Err(e) => {
                    error!(match_id = %self.id, error = %e, "Aborting match");
                    break "corrupt_state";
                }
            }

            self.update_status();

            if let Some(reason) = self.machine.teardown_reason() {
                break reason;
            }
            if self.rematch_expired(before, now) {
                break "rematch_timeout";
            }
        };

        info!(match_id = %self.id, reason, "Match closing");
        self.publish(vec![Envelope::both(ServerMsg::Aborted {
            reason: reason.to_string(),
        })]);
        reason
    }

    /// Process all pending inputs from players
    fn process_inputs(&mut self) {
        while let Ok(input) = self.input_rx.try_recv() {
            self.handle_input(input);
        }
    }

    fn handle_input(&mut self, input: PlayerInput) {
        let slot = input.slot;
        let result = match input.msg {
            ClientMsg::Ready => self.machine.set_ready(slot).map(|_| Vec::new()),
            ClientMsg::SubmitCards { cards } => self.machine.submit_cards(slot, &cards),
            ClientMsg::Fire => self.machine.fire(slot),
            ClientMsg::Ping { t } => Ok(vec![Envelope::to(slot, ServerMsg::Pong { t })]),
            ClientMsg::Leave => {
                self.machine.player_disconnected(slot);
                Ok(Vec::new())
            }
        };

        match result {
            Ok(out) => self.publish(out),
            Err(e) => self.reject(slot, e),
        }
    }

    /// Per-event errors never end the match
    fn reject(&self, slot: PlayerSlot, err: RoundError) {
        match err {
            RoundError::InvalidCardIndex { .. } | RoundError::WrongCardCount { .. } => {
                warn!(match_id = %self.id, error = %err, "Discarding card submission");
                self.publish(vec![Envelope::to(
                    slot,
                    ServerMsg::CardsRejected {
                        reason: err.to_string(),
                    },
                )]);
            }
            RoundError::OutOfPhaseEvent { .. } | RoundError::StalePlayer { .. } => {
                debug!(match_id = %self.id, error = %err, "Ignoring event");
            }
            RoundError::MatchCorruptState(_) => {
                error!(match_id = %self.id, error = %err, "Unexpected corrupt state from event");
            }
        }
    }

    fn publish(&self, envelopes: Vec<Envelope>) {
        for envelope in envelopes {
            // No receivers is fine: both clients may be gone
            let _ = self.outbound_tx.send(envelope);
        }
    }

    fn update_status(&self) {
        let ctx = self.machine.context();
        let mut status = self.status.write();
        status.phase = ctx.phase;
        status.round_number = ctx.round_number;
        status.health = [ctx.players[0].health, ctx.players[1].health];
        status.connected = [ctx.players[0].connected, ctx.players[1].connected];
    }

    fn rematch_expired(&mut self, before: Phase, now: Instant) -> bool {
        match (before, self.machine.phase()) {
            (Phase::Finish, Phase::Start) => self.rematch_since = Some(now),
            (_, Phase::Start) => {}
            _ => self.rematch_since = None,
        }
        self.rematch_since
            .is_some_and(|since| now.duration_since(since) >= self.machine.rules().rematch_grace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::catalog::StaticCatalog;

    fn new_match() -> (GameMatch, MatchHandle) {
        GameMatch::new(
            Uuid::new_v4(),
            MatchRules::default(),
            Arc::new(StaticCatalog::default()),
        )
    }

    #[test]
    fn registry_tracks_handles() {
        let registry = MatchRegistry::new();
        let (_m1, h1) = new_match();
        let (_m2, h2) = new_match();
        registry.insert(h1.clone());
        registry.insert(h2.clone());

        assert_eq!(registry.active_matches(), 2);
        assert_eq!(registry.total_players(), 4);
        assert_eq!(registry.statuses().len(), 2);

        registry.remove(&h1.id);
        assert!(registry.get(&h1.id).is_none());
        assert!(registry.get(&h2.id).is_some());
    }

    #[test]
    fn bad_submission_is_rejected_to_sender_only() {
        let (mut game, handle) = new_match();
        let mut rx = handle.subscribe();
        for _ in 0..2 {
            for slot in PlayerSlot::BOTH {
                game.handle_input(PlayerInput::new(slot, ClientMsg::Ready));
            }
            game.machine.tick(Instant::now()).unwrap();
        }
        assert_eq!(game.machine.phase(), Phase::Round);

        game.handle_input(PlayerInput::new(
            PlayerSlot::SECOND,
            ClientMsg::SubmitCards { cards: vec![0, 999, -1] },
        ));

        let envelope = rx.try_recv().unwrap();
        assert!(envelope.is_for(PlayerSlot::SECOND));
        assert!(!envelope.is_for(PlayerSlot::FIRST));
        assert!(matches!(envelope.msg, ServerMsg::CardsRejected { .. }));
    }

    #[test]
    fn status_reflects_disconnect() {
        let (mut game, handle) = new_match();
        game.handle_input(PlayerInput::new(PlayerSlot::FIRST, ClientMsg::Leave));
        game.update_status();

        assert_eq!(handle.status().connected, [false, true]);
        assert_eq!(handle.connected_players(), 1);
        assert_eq!(game.machine.teardown_reason(), Some("opponent_disconnected"));
    }

    #[test]
    fn rematch_window_opens_after_finish() {
        let (mut game, _handle) = new_match();
        let now = Instant::now();
        let grace = game.machine.rules().rematch_grace;

        // Fresh match sitting in Start has no deadline
        assert!(!game.rematch_expired(Phase::Start, now + grace * 2));

        game.rematch_since = None;
        assert!(!game.rematch_expired(Phase::Finish, now));
        assert_eq!(game.rematch_since, Some(now));
        assert!(!game.rematch_expired(Phase::Start, now + grace / 2));
        assert!(game.rematch_expired(Phase::Start, now + grace));
    }
}
