//! Service layer: event fan-out orchestration.
//!
//! [`Fanout`] routes published events either onto the local
//! [`super::domain::EventBus`] or through the store backplane, and
//! [`deliver_events`] drains the bus into the session registry.

pub mod fanout;

pub use fanout::{Fanout, PublishHandler, deliver_events};
