//! Round state machine - the shared phase clock and round resolution
//!
//! One machine per match. All mutation happens through [`RoundStateMachine::tick`]
//! and the inbound event methods, called from the match's own task.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::MatchRules;
use crate::util::time::duration_millis;
use crate::ws::protocol::{Envelope, Phase, ServerMsg};

use super::catalog::CardCatalog;
use super::combat::CombatResolver;
use super::player::{parse_selection, Player, PlayerSlot, SelectionError, VisibleState};
use super::snapshot;

/// Round-level errors. Only `MatchCorruptState` is fatal to a match.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoundError {
    #[error("slot {slot} submitted unknown card index {index}")]
    InvalidCardIndex { slot: PlayerSlot, index: i64 },

    #[error("slot {slot} submitted {got} cards, expected {expected}")]
    WrongCardCount {
        slot: PlayerSlot,
        expected: usize,
        got: usize,
    },

    #[error("{event} from slot {slot} ignored during {phase:?}")]
    OutOfPhaseEvent {
        slot: PlayerSlot,
        event: &'static str,
        phase: Phase,
    },

    #[error("slot {slot} has no submission at the round deadline")]
    StalePlayer { slot: PlayerSlot },

    #[error("match state corrupt: {0}")]
    MatchCorruptState(String),
}

impl RoundError {
    fn from_selection(slot: PlayerSlot, err: SelectionError) -> Self {
        match err {
            SelectionError::WrongCount { expected, got } => Self::WrongCardCount {
                slot,
                expected,
                got,
            },
            SelectionError::UnknownIndex(index) => Self::InvalidCardIndex { slot, index },
        }
    }
}

/// Result of a finished match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Player(PlayerSlot),
    Draw,
}

impl Winner {
    /// The single surviving player, or a draw
    pub fn from_players(players: &[Player; 2]) -> Self {
        match (players[0].is_alive(), players[1].is_alive()) {
            (true, false) => Winner::Player(PlayerSlot::FIRST),
            (false, true) => Winner::Player(PlayerSlot::SECOND),
            _ => Winner::Draw,
        }
    }

    /// Wire form: slot index, -1 for a draw
    pub fn wire(self) -> i8 {
        match self {
            Winner::Player(slot) => slot.index() as i8,
            Winner::Draw => -1,
        }
    }
}

/// Per-match round state
#[derive(Debug, Clone, PartialEq)]
pub struct RoundContext {
    pub phase: Phase,
    /// Rounds started so far
    pub round_number: u32,
    /// Only set during `Round`
    pub phase_deadline: Option<Instant>,
    pub round_started_at: Option<Instant>,
    pub players: [Player; 2],
    /// First player to fire this round
    pub shooter: Option<PlayerSlot>,
}

impl RoundContext {
    fn new(rules: &MatchRules) -> Self {
        Self {
            phase: Phase::Start,
            round_number: 0,
            phase_deadline: None,
            round_started_at: None,
            players: PlayerSlot::BOTH
                .map(|slot| Player::new(slot, rules.max_health, rules.cards_per_round)),
            shooter: None,
        }
    }

    pub fn player(&self, slot: PlayerSlot) -> &Player {
        &self.players[slot.index()]
    }

    fn player_mut(&mut self, slot: PlayerSlot) -> &mut Player {
        &mut self.players[slot.index()]
    }

    pub fn both_ready(&self) -> bool {
        self.players.iter().all(|p| p.ready)
    }

    pub fn deadline_elapsed(&self, now: Instant) -> bool {
        self.phase_deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Both submitted and someone fired
    pub fn early_resolve_ready(&self) -> bool {
        self.shooter.is_some() && self.players.iter().all(|p| p.submitted)
    }

    fn clear_ready(&mut self) {
        self.players.iter_mut().for_each(|p| p.ready = false);
    }
}

type Guard = fn(&RoundContext, Instant) -> bool;
type Apply = fn(&mut RoundStateMachine, Instant) -> Result<Vec<Envelope>, RoundError>;

/// One row of the transition table
#[derive(Clone, Copy)]
pub struct TransitionRule {
    pub from: Phase,
    pub guard: Guard,
    pub apply: Apply,
}

fn both_ready(ctx: &RoundContext, _now: Instant) -> bool {
    ctx.both_ready()
}

fn round_over(ctx: &RoundContext, now: Instant) -> bool {
    ctx.deadline_elapsed(now) || ctx.early_resolve_ready()
}

fn always(_ctx: &RoundContext, _now: Instant) -> bool {
    true
}

/// Every transition the machine can take. `Connecting` has no row.
pub static TRANSITIONS: [TransitionRule; 5] = [
    TransitionRule {
        from: Phase::Start,
        guard: both_ready,
        apply: RoundStateMachine::begin_match,
    },
    TransitionRule {
        from: Phase::Timer,
        guard: both_ready,
        apply: RoundStateMachine::start_round,
    },
    TransitionRule {
        from: Phase::Round,
        guard: round_over,
        apply: RoundStateMachine::finish_round,
    },
    TransitionRule {
        from: Phase::Animation,
        guard: both_ready,
        apply: RoundStateMachine::resume_timer,
    },
    TransitionRule {
        from: Phase::Finish,
        guard: always,
        apply: RoundStateMachine::announce_winner,
    },
];

pub fn transition_rule(phase: Phase) -> Option<&'static TransitionRule> {
    TRANSITIONS.iter().find(|rule| rule.from == phase)
}

/// Authoritative phase clock for one match
pub struct RoundStateMachine {
    ctx: RoundContext,
    rules: MatchRules,
    catalog: Arc<dyn CardCatalog>,
}

impl RoundStateMachine {
    /// Both slots are filled; the machine starts in `Start`
    pub fn new(rules: MatchRules, catalog: Arc<dyn CardCatalog>) -> Self {
        Self {
            ctx: RoundContext::new(&rules),
            rules,
            catalog,
        }
    }

    pub fn context(&self) -> &RoundContext {
        &self.ctx
    }

    pub fn phase(&self) -> Phase {
        self.ctx.phase
    }

    pub fn rules(&self) -> &MatchRules {
        &self.rules
    }

    /// Current phase broadcast; does not touch state
    pub fn phase_update(&self) -> Envelope {
        snapshot::phase_update(&self.ctx)
    }

    /// Advance at most one transition
    pub fn tick(&mut self, now: Instant) -> Result<Vec<Envelope>, RoundError> {
        let Some(rule) = transition_rule(self.ctx.phase) else {
            return Ok(Vec::new());
        };
        if !(rule.guard)(&self.ctx, now) {
            return Ok(Vec::new());
        }

        let from = self.ctx.phase;
        let out = (rule.apply)(self, now)?;
        debug!(from = ?from, to = ?self.ctx.phase, round = self.ctx.round_number, "Phase transition");
        Ok(out)
    }

    // ------------------------------------------------------------------
    // Inbound events
    // ------------------------------------------------------------------

    /// Mark a player ready for the current barrier
    pub fn set_ready(&mut self, slot: PlayerSlot) -> Result<(), RoundError> {
        let phase = self.ctx.phase;
        let out_of_phase = RoundError::OutOfPhaseEvent {
            slot,
            event: "ready",
            phase,
        };
        if !matches!(phase, Phase::Start | Phase::Timer | Phase::Animation) {
            return Err(out_of_phase);
        }

        let player = self.ctx.player_mut(slot);
        if player.ready || !player.connected {
            return Err(out_of_phase);
        }
        player.ready = true;
        Ok(())
    }

    /// Store a player's card sequence for the active round
    pub fn submit_cards(&mut self, slot: PlayerSlot, raw: &[i32]) -> Result<Vec<Envelope>, RoundError> {
        if self.ctx.phase != Phase::Round || !self.ctx.player(slot).connected {
            return Err(RoundError::OutOfPhaseEvent {
                slot,
                event: "submit_cards",
                phase: self.ctx.phase,
            });
        }

        let cards = parse_selection(raw, self.rules.cards_per_round, self.catalog.as_ref())
            .map_err(|e| RoundError::from_selection(slot, e))?;

        let player = self.ctx.player_mut(slot);
        player.selected_cards = cards;
        player.submitted = true;

        Ok(vec![Envelope::to(slot, ServerMsg::CardsAccepted)])
    }

    /// Early-resolve trigger, once per player per round
    pub fn fire(&mut self, slot: PlayerSlot) -> Result<Vec<Envelope>, RoundError> {
        let phase = self.ctx.phase;
        let player = self.ctx.player_mut(slot);
        if phase != Phase::Round || player.did_fire || !player.connected {
            return Err(RoundError::OutOfPhaseEvent {
                slot,
                event: "fire",
                phase,
            });
        }
        player.did_fire = true;
        self.ctx.shooter.get_or_insert(slot);

        Ok(vec![Envelope::both(ServerMsg::PlayerAction {
            slot,
            state: VisibleState::Shooting,
        })])
    }

    /// Permanent departure; a round in progress still runs to its deadline
    pub fn player_disconnected(&mut self, slot: PlayerSlot) {
        let in_round = self.ctx.phase == Phase::Round;
        let player = self.ctx.player_mut(slot);
        if !player.connected {
            return;
        }
        player.connected = false;
        player.ready = false;
        if in_round {
            player.clear_selection();
            if self.ctx.shooter == Some(slot) {
                self.ctx.shooter = None;
            }
        }
        info!(slot = %slot, phase = ?self.ctx.phase, "Player disconnected");
    }

    /// Why the match should close now, if it should
    pub fn teardown_reason(&self) -> Option<&'static str> {
        let gone = self.ctx.players.iter().filter(|p| !p.connected).count();
        if gone == 0 || matches!(self.ctx.phase, Phase::Round | Phase::Finish) {
            return None;
        }
        Some(if gone == 2 {
            "players_disconnected"
        } else {
            "opponent_disconnected"
        })
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Start -> Timer
    fn begin_match(&mut self, _now: Instant) -> Result<Vec<Envelope>, RoundError> {
        self.ctx.players.iter_mut().for_each(Player::reset_for_match);
        let mut out = snapshot::init_states(&self.ctx.players);
        info!(round = self.ctx.round_number, "Match starting");
        out.extend(self.enter_timer());
        Ok(out)
    }

    /// Animation -> Timer
    fn resume_timer(&mut self, _now: Instant) -> Result<Vec<Envelope>, RoundError> {
        Ok(self.enter_timer())
    }

    fn enter_timer(&mut self) -> Vec<Envelope> {
        self.ctx.phase = Phase::Timer;
        self.ctx.clear_ready();
        vec![
            Envelope::both(ServerMsg::TimerStarted),
            snapshot::phase_update(&self.ctx),
        ]
    }

    /// Timer -> Round
    fn start_round(&mut self, now: Instant) -> Result<Vec<Envelope>, RoundError> {
        let deadline = now.checked_add(self.rules.round_duration).ok_or_else(|| {
            RoundError::MatchCorruptState(format!(
                "round duration {:?} overflows the clock",
                self.rules.round_duration
            ))
        })?;

        self.ctx.phase = Phase::Round;
        self.ctx.round_started_at = Some(now);
        self.ctx.phase_deadline = Some(deadline);
        self.ctx.shooter = None;
        self.ctx.players.iter_mut().for_each(Player::reset_for_round);

        let started = Envelope::both(ServerMsg::RoundStarted {
            round_number: self.ctx.round_number,
            duration_ms: duration_millis(self.rules.round_duration),
        });
        self.ctx.round_number += 1;

        Ok(vec![started, snapshot::phase_update(&self.ctx)])
    }

    /// Round -> Animation, or Round -> Finish when someone died
    fn finish_round(&mut self, now: Instant) -> Result<Vec<Envelope>, RoundError> {
        let early = !self.ctx.deadline_elapsed(now);
        for player in &self.ctx.players {
            if !player.submitted {
                let stale = RoundError::StalePlayer { slot: player.slot };
                warn!(error = %stale, "Resolving with no cards");
            }
        }

        let [p0, p1] = &self.ctx.players;
        let resolution = CombatResolver::resolve(
            self.catalog.as_ref(),
            [&p0.selected_cards, &p1.selected_cards],
            [p0.health, p1.health],
            self.rules.max_health,
        )
        .map_err(|e| RoundError::MatchCorruptState(e.to_string()))?;

        if let Some(bad) = resolution
            .health
            .iter()
            .find(|h| !(0..=self.rules.max_health).contains(*h))
        {
            return Err(RoundError::MatchCorruptState(format!(
                "health {bad} outside [0, {}]",
                self.rules.max_health
            )));
        }

        for (player, (&health, &visible)) in self
            .ctx
            .players
            .iter_mut()
            .zip(resolution.health.iter().zip(resolution.visible.iter()))
        {
            player.health = health;
            player.visible_state = if player.is_alive() {
                visible
            } else {
                VisibleState::Dead
            };
        }

        self.ctx.phase_deadline = None;
        self.ctx.clear_ready();

        info!(
            round = self.ctx.round_number,
            early,
            health_0 = resolution.health[0],
            health_1 = resolution.health[1],
            "Round resolved"
        );

        let mut out = Vec::new();
        if self.ctx.players.iter().all(Player::is_alive) {
            self.ctx.phase = Phase::Animation;
            out.extend(snapshot::outcomes(
                &self.ctx.players,
                &resolution,
                self.ctx.shooter,
            ));
        } else {
            self.ctx.phase = Phase::Finish;
        }
        out.push(snapshot::phase_update(&self.ctx));
        Ok(out)
    }

    /// Finish -> Start
    fn announce_winner(&mut self, _now: Instant) -> Result<Vec<Envelope>, RoundError> {
        let winner = Winner::from_players(&self.ctx.players);
        info!(winner = winner.wire(), "Match finished");

        let finish = Envelope::both(ServerMsg::Finish {
            winner: winner.wire(),
            final_health: [self.ctx.players[0].health, self.ctx.players[1].health],
        });
        self.ctx.clear_ready();
        self.ctx.phase = Phase::Start;

        Ok(vec![finish, snapshot::phase_update(&self.ctx)])
    }
}
