use crate::common::ConnectionId;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Two arrivals, in arrival order.
#[derive(Debug)]
pub struct Pairing<C> {
    pub first: (ConnectionId, C),
    pub second: (ConnectionId, C),
}

struct Lobby<C> {
    next_id: u64,
    waiting: Vec<(ConnectionId, C)>,
}

/// Queues solitary arrivals and hands them out two at a time.
///
/// The lock is only ever held for one check-and-maybe-pair step, never
/// across a blocking accept. Outside those steps at most one connection is
/// waiting.
pub struct Matchmaker<C> {
    lobby: Mutex<Lobby<C>>,
}

impl<C> Default for Matchmaker<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Matchmaker<C> {
    pub fn new() -> Self {
        Self {
            lobby: Mutex::new(Lobby {
                next_id: 0,
                waiting: Vec::new(),
            }),
        }
    }

    fn lobby(&self) -> MutexGuard<'_, Lobby<C>> {
        // A panic elsewhere cannot leave the queue half-updated.
        self.lobby.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Hands out the next identifier. Identifiers strictly increase.
    pub fn register(&self) -> ConnectionId {
        let mut lobby = self.lobby();
        lobby.next_id += 1;
        ConnectionId(lobby.next_id)
    }

    /// Queues an arrival; the second arrival drains the queue into a pairing.
    pub fn admit(&self, id: ConnectionId, connection: C) -> Option<Pairing<C>> {
        let mut lobby = self.lobby();
        lobby.waiting.push((id, connection));
        if lobby.waiting.len() < 2 {
            debug!(%id, "waiting for an opponent");
            return None;
        }
        let mut drained = lobby.waiting.drain(..);
        let (first, second) = (drained.next()?, drained.next()?);
        info!(first = %first.0, second = %second.0, "paired");
        Some(Pairing { first, second })
    }

    /// Removes a connection that left before being paired.
    pub fn withdraw(&self, id: ConnectionId) -> Option<C> {
        let mut lobby = self.lobby();
        let index = lobby.waiting.iter().position(|(waiting, _)| *waiting == id)?;
        debug!(%id, "left the queue");
        Some(lobby.waiting.remove(index).1)
    }

    pub fn waiting(&self) -> usize {
        self.lobby().waiting.len()
    }
}
