//! Session layer: per-connection state, lifecycle and receive loop.
//!
//! A [`Session`] is created from an [`UpgradeRequest`], owns its
//! [`Transport`] once the upgrade completes, and notifies its registry
//! through an [`UnregisterFn`] when it stops. A [`PushSessionHandler`]
//! lets the application hook into that lifecycle.

pub mod lifecycle;
pub mod push_session;
pub mod transport;
pub mod upgrade;

pub use lifecycle::{PushSessionHandler, init_session};
pub use push_session::{CloseReason, MessageHandler, Session, UnregisterFn};
pub use transport::{Frame, Transport, WsTransport};
pub use upgrade::{Parameters, TOKEN_PARAMETER, TlsInfo, UpgradeRequest};
