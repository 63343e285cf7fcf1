//! The hub: single owner of the live client registry
//!
//! This module provides:
//! - Client identity generation
//! - The registry of connections and their channel subscriptions
//! - The serialized event loop performing register/unregister,
//!   subscription changes and fan-out
//! - A cloneable handle for producers and status readers

mod broker;
mod identity;
mod registry;

pub use broker::{Hub, HubError, HubEvent, HubHandle, Subscription};
pub use identity::ClientId;
pub use registry::{
    ClientInfo, Connection, DeliveryFailure, HubSnapshot, Recipient, Registry,
};
