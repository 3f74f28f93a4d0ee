//! Lobby - seats connections two at a time into new matches

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::MatchRules;
use crate::game::{CardCatalog, GameMatch, MatchRegistry, PlayerInput, PlayerSlot};
use crate::ws::protocol::{ClientMsg, Envelope};

/// A connection's seat in a running match
#[derive(Debug)]
pub struct PlayerLink {
    pub match_id: Uuid,
    pub slot: PlayerSlot,
    /// Inbound queue of the match loop
    pub input_tx: mpsc::Sender<PlayerInput>,
    /// Match broadcasts; filter with `Envelope::is_for`
    pub outbound_rx: broadcast::Receiver<Envelope>,
}

/// Connection waiting for an opponent
struct WaitingConnection {
    connection_id: Uuid,
    link_tx: oneshot::Sender<PlayerLink>,
    queued_at: Instant,
}

/// Pairs connections into matches in arrival order
pub struct Lobby {
    waiting: Mutex<VecDeque<WaitingConnection>>,
    registry: Arc<MatchRegistry>,
    rules: MatchRules,
    catalog: Arc<dyn CardCatalog>,
}

impl Lobby {
    pub fn new(registry: Arc<MatchRegistry>, rules: MatchRules, catalog: Arc<dyn CardCatalog>) -> Self {
        Self {
            waiting: Mutex::new(VecDeque::new()),
            registry,
            rules,
            catalog,
        }
    }

    /// Seat a connection. The receiver resolves once an opponent is found;
    /// the earlier arrival gets slot 0.
    pub async fn join(&self, connection_id: Uuid) -> oneshot::Receiver<PlayerLink> {
        let (link_tx, link_rx) = oneshot::channel();
        let newcomer = WaitingConnection {
            connection_id,
            link_tx,
            queued_at: Instant::now(),
        };

        let mut waiting = self.waiting.lock().await;
        waiting.retain(|w| !w.link_tx.is_closed());

        match waiting.pop_front() {
            Some(opponent) => {
                drop(waiting); // Release lock for match creation
                self.create_match([opponent, newcomer]);
            }
            None => {
                waiting.push_back(newcomer);
                info!(connection_id = %connection_id, "Connection waiting for opponent");
            }
        }

        link_rx
    }

    /// Drop a connection that left before being seated
    pub async fn leave(&self, connection_id: Uuid) {
        let mut waiting = self.waiting.lock().await;
        waiting.retain(|w| w.connection_id != connection_id);
    }

    /// Connections waiting for an opponent
    pub async fn waiting_count(&self) -> usize {
        self.waiting.lock().await.len()
    }

    /// Create a match for two seated connections
    fn create_match(&self, seats: [WaitingConnection; 2]) -> Uuid {
        let match_id = Uuid::new_v4();
        let (game_match, handle) = GameMatch::new(match_id, self.rules.clone(), self.catalog.clone());

        // Subscribe before the loop starts so the first phase broadcast is seen
        let links = PlayerSlot::BOTH.map(|slot| PlayerLink {
            match_id,
            slot,
            input_tx: handle.input_tx.clone(),
            outbound_rx: handle.subscribe(),
        });

        self.registry.insert(handle.clone());

        info!(
            match_id = %match_id,
            slot_0 = %seats[0].connection_id,
            slot_1 = %seats[1].connection_id,
            waited_ms = seats[0].queued_at.elapsed().as_millis() as u64,
            "Created new match"
        );

        // Spawn match task
        let registry = self.registry.clone();
        tokio::spawn(async move {
            let reason = game_match.run().await;
            registry.remove(&match_id);
            info!(match_id = %match_id, reason, "Match removed from registry");
        });

        for (seat, link) in seats.into_iter().zip(links) {
            if let Err(link) = seat.link_tx.send(link) {
                // Connection closed while being seated
                warn!(match_id = %match_id, slot = %link.slot, "Seat abandoned before match start");
                let _ = handle
                    .input_tx
                    .try_send(PlayerInput::new(link.slot, ClientMsg::Leave));
            }
        }

        match_id
    }
}
