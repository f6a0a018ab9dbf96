//! ConnectionRegistry: the set of live connections and their per-connection state.
//!
//! The registry is the one place that knows which connections exist.  Each
//! entry tracks:
//!
//! - The source address (for the per-address connection cap).
//! - The bot [`SessionId`] generated at admission.
//! - The timestamp of the last accepted message (for the rate limit).
//! - The [`Recipient`] used by the hub to write to the connection.
//!
//! # Lifecycle
//!
//! ```text
//! reserve(addr)  ──►  Reservation  ──register()──►  Registration  ──drop──►  gone
//!      │                   │
//!  at capacity        drop (handshake failed)
//!      ▼                   ▼
//!    refused         pending slot released
//! ```
//!
//! Both guards release their slot in `Drop`, so a connection task that exits
//! for any reason (normal close, error, panic) is always removed.
//!
//! # Locking
//!
//! All state sits behind one `std::sync::Mutex`.  No method holds the lock
//! across an `.await`; the hub takes a [`snapshot`](ConnectionRegistry::snapshot)
//! and writes to recipients after releasing it.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use relay_core::{ConnectionId, SessionId};
use thiserror::Error;
use tracing::debug;

use super::recipient::Recipient;

/// Error type for registry mutations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection {0} is already registered")]
    DuplicateHandle(ConnectionId),
}

/// Outcome of the rate-limit check-and-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Message accepted; the timestamp was advanced to `now`.
    Accepted,
    /// Too soon after the last accepted message.  Timestamp unchanged.
    TooSoon { retry_after: Duration },
    /// The connection is not (or no longer) registered.
    Unknown,
}

/// Per-connection state held by the registry.
struct ConnectionEntry {
    addr: IpAddr,
    session: SessionId,
    recipient: Arc<dyn Recipient>,
    last_accepted: Option<Instant>,
}

#[derive(Debug, Default, Clone, Copy)]
struct AddressSlots {
    /// Registered connections.
    active: usize,
    /// Admitted connections still completing the WebSocket handshake.
    pending: usize,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    addresses: HashMap<IpAddr, AddressSlots>,
}

impl RegistryState {
    fn insert(
        &mut self,
        id: ConnectionId,
        addr: IpAddr,
        session: SessionId,
        recipient: Arc<dyn Recipient>,
    ) -> Result<(), RegistryError> {
        if self.connections.contains_key(&id) {
            return Err(RegistryError::DuplicateHandle(id));
        }
        self.connections.insert(
            id,
            ConnectionEntry {
                addr,
                session,
                recipient,
                last_accepted: None,
            },
        );
        self.addresses.entry(addr).or_default().active += 1;
        Ok(())
    }

    fn release_pending(&mut self, addr: IpAddr) {
        if let Some(slots) = self.addresses.get_mut(&addr) {
            slots.pending = slots.pending.saturating_sub(1);
        }
        self.prune(addr);
    }

    fn prune(&mut self, addr: IpAddr) {
        if let Some(slots) = self.addresses.get(&addr) {
            if slots.active == 0 && slots.pending == 0 {
                self.addresses.remove(&addr);
            }
        }
    }
}

/// In-memory registry of live connections.
///
/// Shared as `Arc<ConnectionRegistry>` between the accept loop, every
/// connection task and the hub.
#[derive(Default)]
pub struct ConnectionRegistry {
    state: Mutex<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // A panic while holding the lock cannot leave the maps half-updated
        // (every mutation is a single insert/remove), so keep serving.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a connection.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateHandle`] if `id` is already present.
    pub fn register(
        &self,
        id: ConnectionId,
        addr: IpAddr,
        session: SessionId,
        recipient: Arc<dyn Recipient>,
    ) -> Result<(), RegistryError> {
        self.lock().insert(id, addr, session, recipient)
    }

    /// Removes a connection.  Returns `false` if it was not present.
    ///
    /// Idempotent, so both the hub (after a failed write) and the
    /// connection's own cleanup may call it.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let mut state = self.lock();
        let Some(entry) = state.connections.remove(&id) else {
            return false;
        };
        if let Some(slots) = state.addresses.get_mut(&entry.addr) {
            slots.active = slots.active.saturating_sub(1);
        }
        state.prune(entry.addr);
        debug!(
            conn = %id,
            addr = %entry.addr,
            session = %entry.session,
            "connection unregistered"
        );
        true
    }

    /// Returns a consistent copy of every registered recipient.
    ///
    /// The copy is taken under the lock, so callers may iterate it while
    /// other tasks register and unregister.
    pub fn snapshot(&self) -> Vec<(ConnectionId, Arc<dyn Recipient>)> {
        self.lock()
            .connections
            .iter()
            .map(|(id, entry)| (*id, Arc::clone(&entry.recipient)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().connections.contains_key(&id)
    }

    /// Number of registered connections from `addr`.
    #[cfg(test)]
    pub fn active_from(&self, addr: IpAddr) -> usize {
        self.lock().addresses.get(&addr).map_or(0, |s| s.active)
    }

    #[cfg(test)]
    pub fn session_of(&self, id: ConnectionId) -> Option<SessionId> {
        self.lock().connections.get(&id).map(|e| e.session.clone())
    }

    /// Rate-limit check-and-set.
    ///
    /// Reads and, on acceptance, advances the last-accepted timestamp in one
    /// critical section, so two near-simultaneous messages can never both pass.
    /// A message exactly `min_interval` after the previous one is accepted.
    pub fn try_accept_message(
        &self,
        id: ConnectionId,
        now: Instant,
        min_interval: Duration,
    ) -> RateDecision {
        let mut state = self.lock();
        let Some(entry) = state.connections.get_mut(&id) else {
            return RateDecision::Unknown;
        };
        if let Some(last) = entry.last_accepted {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < min_interval {
                return RateDecision::TooSoon {
                    retry_after: min_interval - elapsed,
                };
            }
        }
        entry.last_accepted = Some(now);
        RateDecision::Accepted
    }

    /// Reserves an admission slot for `addr` if fewer than `limit`
    /// connections from it are registered or pending.
    ///
    /// Returns `None` when the address is at capacity.
    pub fn reserve(self: &Arc<Self>, addr: IpAddr, limit: usize) -> Option<Reservation> {
        let mut state = self.lock();
        let slots = state.addresses.entry(addr).or_default();
        if slots.active + slots.pending >= limit {
            state.prune(addr);
            return None;
        }
        slots.pending += 1;
        Some(Reservation {
            registry: Arc::clone(self),
            addr,
            armed: true,
        })
    }

    fn promote(
        &self,
        id: ConnectionId,
        addr: IpAddr,
        session: SessionId,
        recipient: Arc<dyn Recipient>,
    ) -> Result<(), RegistryError> {
        let mut state = self.lock();
        state.insert(id, addr, session, recipient)?;
        state.release_pending(addr);
        Ok(())
    }
}

/// An admitted connection that has not finished its handshake yet.
///
/// Dropping it without calling [`register`](Reservation::register) gives the
/// slot back.
pub struct Reservation {
    registry: Arc<ConnectionRegistry>,
    addr: IpAddr,
    armed: bool,
}

impl Reservation {
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Turns the reservation into a registered connection.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateHandle`] if `id` is already present;
    /// the reserved slot is released in that case.
    pub fn register(
        mut self,
        id: ConnectionId,
        session: SessionId,
        recipient: Arc<dyn Recipient>,
    ) -> Result<Registration, RegistryError> {
        self.registry.promote(id, self.addr, session, recipient)?;
        self.armed = false;
        Ok(Registration {
            registry: Arc::clone(&self.registry),
            id,
        })
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            self.registry.lock().release_pending(self.addr);
        }
    }
}

/// A registered connection.  Unregisters itself when dropped.
pub struct Registration {
    registry: Arc<ConnectionRegistry>,
    id: ConnectionId,
}

impl Registration {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
