//! IngressGuard: admission and per-message traffic limits.
//!
//! | Check                 | When                    | On violation                               |
//! |-----------------------|-------------------------|--------------------------------------------|
//! | Client address        | WebSocket upgrade       | HTTP 400, nothing registered               |
//! | Per-address cap       | WebSocket upgrade       | HTTP 429, nothing registered               |
//! | Frame size            | every frame (transport) | connection closed (see `ws_server`)        |
//! | Rate limit            | every chat message      | warning to sender, message dropped         |
//! | Character limit       | every chat message      | warning to sender, message dropped         |
//!
//! Warnings go to the sender only; no other connection learns about them.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use relay_core::protocol::messages::{too_long_warning, RATE_LIMIT_WARNING_TEXT};
use relay_core::{ChatMessage, ConnectionId};
use thiserror::Error;

use super::registry::{ConnectionRegistry, RateDecision, Reservation};
use crate::domain::IngressLimits;

/// Reasons a connection is refused before it is registered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    /// The client address could not be determined or parsed.
    #[error("invalid client address: {0:?}")]
    InvalidClientAddress(String),

    /// The address already holds the maximum number of connections.
    #[error("too many connections from {addr} (limit {limit})")]
    TooManyConnections { addr: IpAddr, limit: usize },
}

/// Reasons a single inbound message is dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngressError {
    #[error("rate limit exceeded; retry in {retry_after:?}")]
    RateLimitExceeded { retry_after: Duration },

    #[error("message has {chars} characters (limit {limit})")]
    MessageTooLarge { chars: usize, limit: usize },

    /// The connection was removed from the registry (e.g. by the hub after a
    /// failed write) while its task was still reading.
    #[error("connection {0} is not registered")]
    NotRegistered(ConnectionId),
}

impl IngressError {
    /// Text of the advisory reply for the sender, if the connection should
    /// stay open.
    pub fn warning(&self) -> Option<String> {
        match self {
            IngressError::RateLimitExceeded { .. } => Some(RATE_LIMIT_WARNING_TEXT.to_string()),
            IngressError::MessageTooLarge { limit, .. } => Some(too_long_warning(*limit)),
            IngressError::NotRegistered(_) => None,
        }
    }
}

/// Applies the ingress limits against the shared registry.
pub struct IngressGuard {
    registry: Arc<ConnectionRegistry>,
    limits: IngressLimits,
    trust_forwarded_for: bool,
}

impl IngressGuard {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        limits: IngressLimits,
        trust_forwarded_for: bool,
    ) -> Self {
        Self {
            registry,
            limits,
            trust_forwarded_for,
        }
    }

    /// Determines the address the per-address cap applies to.
    ///
    /// Uses the TCP peer address unless forwarded headers are trusted, in
    /// which case the first (client-most) `X-Forwarded-For` entry wins.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::InvalidClientAddress`] if the trusted header
    /// is present but its first entry is neither an IP nor an `IP:port`.
    pub fn resolve_client_addr(
        &self,
        peer: SocketAddr,
        forwarded_for: Option<&str>,
    ) -> Result<IpAddr, AdmissionError> {
        let header = match forwarded_for {
            Some(h) if self.trust_forwarded_for => h,
            _ => return Ok(peer.ip()),
        };
        let first = header.split(',').next().unwrap_or_default().trim();
        first
            .parse::<IpAddr>()
            .or_else(|_| first.parse::<SocketAddr>().map(|s| s.ip()))
            .map_err(|_| AdmissionError::InvalidClientAddress(first.to_string()))
    }

    /// Admits a new connection from `addr` if it is under the cap.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::TooManyConnections`] when `addr` already has
    /// `max_connections_per_address` live or pending connections.
    pub fn admit(&self, addr: IpAddr) -> Result<Reservation, AdmissionError> {
        let limit = self.limits.max_connections_per_address;
        self.registry
            .reserve(addr, limit)
            .ok_or(AdmissionError::TooManyConnections { addr, limit })
    }

    /// Validates one inbound message against the rate and length limits.
    ///
    /// # Errors
    ///
    /// See [`IngressError`].
    pub fn check_message(&self, conn: ConnectionId, msg: &ChatMessage) -> Result<(), IngressError> {
        self.check_message_at(conn, msg, Instant::now())
    }

    /// [`check_message`](Self::check_message) with an explicit clock reading.
    pub fn check_message_at(
        &self,
        conn: ConnectionId,
        msg: &ChatMessage,
        now: Instant,
    ) -> Result<(), IngressError> {
        match self
            .registry
            .try_accept_message(conn, now, self.limits.min_message_interval)
        {
            RateDecision::Accepted => {}
            RateDecision::TooSoon { retry_after } => {
                return Err(IngressError::RateLimitExceeded { retry_after })
            }
            RateDecision::Unknown => return Err(IngressError::NotRegistered(conn)),
        }

        let chars = msg.char_count();
        let limit = self.limits.max_message_chars;
        if chars > limit {
            return Err(IngressError::MessageTooLarge { chars, limit });
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::recording::RecordingRecipient;
    use relay_core::SessionId;

    fn guard_with(limits: IngressLimits, trust: bool) -> (IngressGuard, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        (IngressGuard::new(Arc::clone(&registry), limits, trust), registry)
    }

    fn registered(registry: &ConnectionRegistry) -> ConnectionId {
        let id = ConnectionId::new();
        registry
            .register(
                id,
                "10.0.0.1".parse().unwrap(),
                SessionId::generate(),
                RecordingRecipient::new(),
            )
            .unwrap();
        id
    }

    fn peer() -> SocketAddr {
        "192.168.1.20:50123".parse().unwrap()
    }

    // ── Address resolution ────────────────────────────────────────────────────

    #[test]
    fn test_resolve_uses_peer_address_by_default() {
        let (guard, _) = guard_with(IngressLimits::default(), false);
        let ip = guard.resolve_client_addr(peer(), Some("1.2.3.4")).unwrap();
        assert_eq!(ip, peer().ip(), "untrusted header must be ignored");
    }

    #[test]
    fn test_resolve_uses_first_forwarded_entry_when_trusted() {
        let (guard, _) = guard_with(IngressLimits::default(), true);
        let ip = guard
            .resolve_client_addr(peer(), Some(" 203.0.113.7 , 10.0.0.1"))
            .unwrap();
        assert_eq!(ip, "203.0.113.7".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_resolve_accepts_forwarded_entry_with_port() {
        let (guard, _) = guard_with(IngressLimits::default(), true);
        let ip = guard
            .resolve_client_addr(peer(), Some("[2001:db8::1]:443"))
            .unwrap();
        assert_eq!(ip, "2001:db8::1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_resolve_rejects_garbage_forwarded_entry() {
        let (guard, _) = guard_with(IngressLimits::default(), true);
        let result = guard.resolve_client_addr(peer(), Some("not-an-ip"));
        assert_eq!(
            result,
            Err(AdmissionError::InvalidClientAddress("not-an-ip".to_string()))
        );
    }

    #[test]
    fn test_resolve_trusted_without_header_falls_back_to_peer() {
        let (guard, _) = guard_with(IngressLimits::default(), true);
        assert_eq!(guard.resolve_client_addr(peer(), None).unwrap(), peer().ip());
    }

    // ── Admission cap ─────────────────────────────────────────────────────────

    #[test]
    fn test_ninth_connection_from_same_address_is_refused() {
        let (guard, registry) = guard_with(IngressLimits::default(), false);
        let addr: IpAddr = "10.0.0.1".parse().unwrap();

        let registrations: Vec<_> = (0..8)
            .map(|_| {
                guard
                    .admit(addr)
                    .unwrap()
                    .register(ConnectionId::new(), SessionId::generate(), RecordingRecipient::new())
                    .unwrap()
            })
            .collect();

        let ninth = guard.admit(addr);

        assert!(matches!(
            ninth,
            Err(AdmissionError::TooManyConnections { limit: 8, .. })
        ));
        assert_eq!(registry.active_from(addr), 8, "existing connections untouched");
        assert_eq!(registrations.len(), 8);
    }

    #[test]
    fn test_cap_is_per_address() {
        let limits = IngressLimits {
            max_connections_per_address: 1,
            ..IngressLimits::default()
        };
        let (guard, _) = guard_with(limits, false);
        let _a = guard.admit("10.0.0.1".parse().unwrap()).unwrap();
        assert!(guard.admit("10.0.0.2".parse().unwrap()).is_ok());
    }

    // ── Per-message checks ────────────────────────────────────────────────────

    #[test]
    fn test_immediate_second_message_is_rate_limited() {
        let (guard, registry) = guard_with(IngressLimits::default(), false);
        let id = registered(&registry);
        let msg = ChatMessage::new("A", "hi");
        let t0 = Instant::now();

        assert!(guard.check_message_at(id, &msg, t0).is_ok());
        let second = guard.check_message_at(id, &msg, t0 + Duration::from_millis(1));

        assert!(matches!(second, Err(IngressError::RateLimitExceeded { .. })));
    }

    #[test]
    fn test_message_after_interval_is_accepted() {
        let (guard, registry) = guard_with(IngressLimits::default(), false);
        let id = registered(&registry);
        let msg = ChatMessage::new("A", "hi");
        let t0 = Instant::now();

        assert!(guard.check_message_at(id, &msg, t0).is_ok());
        assert!(guard
            .check_message_at(id, &msg, t0 + Duration::from_millis(100))
            .is_ok());
    }

    #[test]
    fn test_message_over_char_limit_is_rejected() {
        let (guard, registry) = guard_with(IngressLimits::default(), false);
        let id = registered(&registry);
        let msg = ChatMessage::new("A", "x".repeat(501));

        let result = guard.check_message(id, &msg);

        assert_eq!(
            result,
            Err(IngressError::MessageTooLarge {
                chars: 501,
                limit: 500
            })
        );
    }

    #[test]
    fn test_message_at_char_limit_is_accepted() {
        let (guard, registry) = guard_with(IngressLimits::default(), false);
        let id = registered(&registry);
        // 500 two-byte characters: 1000 bytes, still 500 characters.
        let msg = ChatMessage::new("A", "é".repeat(500));
        assert!(guard.check_message(id, &msg).is_ok());
    }

    #[test]
    fn test_unregistered_connection_is_reported() {
        let (guard, _) = guard_with(IngressLimits::default(), false);
        let id = ConnectionId::new();
        let result = guard.check_message(id, &ChatMessage::new("A", "hi"));
        assert_eq!(result, Err(IngressError::NotRegistered(id)));
    }

    #[test]
    fn test_warnings_match_reply_texts() {
        let rate = IngressError::RateLimitExceeded {
            retry_after: Duration::from_millis(10),
        };
        let long = IngressError::MessageTooLarge {
            chars: 600,
            limit: 500,
        };
        assert_eq!(
            rate.warning().as_deref(),
            Some("You are sending messages too quickly. Please slow down.")
        );
        assert_eq!(
            long.warning().as_deref(),
            Some("Message is too long. Limit to 500 characters.")
        );
        assert_eq!(IngressError::NotRegistered(ConnectionId::new()).warning(), None);
    }
}
