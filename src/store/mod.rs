//! Backing store: connection descriptor, mode-aware client, fan-out
//! backplane.
//!
//! The store may run standalone, behind sentinels, or as a cluster. Only
//! [`StoreDescriptor`] knows which; everything above it talks to a
//! [`StoreClient`].

pub mod backplane;
pub mod client;
pub mod descriptor;

pub use backplane::Backplane;
pub use client::{DEFAULT_STORE_TIMEOUT, StoreClient, StoreMode};
pub use descriptor::{HaTopology, StoreDescriptor};
