//! Application layer: the relay's use cases.
//!
//! Nothing in here touches a socket.  Outbound delivery goes through the
//! [`Recipient`] trait and the bot backend through [`NluClient`], so every
//! module can be unit-tested with in-memory doubles.

pub mod bot_router;
pub mod hub;
pub mod ingress;
pub mod nlu;
pub mod recipient;
pub mod registry;

#[cfg(test)]
pub(crate) mod recording;

pub use bot_router::{BotRouter, RouteOutcome};
pub use hub::{BroadcastHub, FanOutReport, HubError, HubHandle};
pub use ingress::{AdmissionError, IngressError, IngressGuard};
pub use nlu::{BackendError, NluClient};
pub use recipient::{deliver_within, DeliveryError, Recipient};
pub use registry::{ConnectionRegistry, RateDecision, Registration, RegistryError, Reservation};
