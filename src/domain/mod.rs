//! Domain layer: session identity, claims, events and the live registry.
//!
//! This module contains the server-side model shared by the session layer
//! and the fan-out machinery: identifiers, claims, the push events routed
//! to sessions and their filters, the in-process event bus and the
//! registry of live sessions.

pub mod claims;
pub mod event_bus;
pub mod push_event;
pub mod push_filter;
pub mod session_id;
pub mod session_registry;

pub use claims::{Claims, ClaimsExtractor, OpaqueTokenClaims};
pub use event_bus::EventBus;
pub use push_event::PushEvent;
pub use push_filter::PushFilter;
pub use session_id::SessionId;
pub use session_registry::SessionRegistry;
