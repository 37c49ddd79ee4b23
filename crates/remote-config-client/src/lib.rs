//! Client-side Remote Configuration for long-running processes.
//!
//! The crate polls the Datadog Agent for configuration changes, reconciles
//! them against what is currently applied, and tells the owning product
//! handlers what to apply, modify or unapply. Every request reports back the
//! acknowledgement state of each config so the backend knows what landed.
//!
//! [`RemoteConfigManager`] is the I/O-free engine; [`RemoteConfigClient`]
//! wraps it with an HTTP transport and a fixed-interval scheduler.

pub mod capabilities;
pub mod client;
pub mod config;
pub mod config_path;
pub mod manager;
pub mod protocol;
pub mod scheduler;
pub mod status;
pub mod targets;
pub mod transport;

pub use capabilities::{Capabilities, Capability};
pub use client::RemoteConfigClient;
pub use config::ClientConfig;
pub use config_path::{parse_config_path, ConfigPathInfo, ConfigPathSource};
pub use manager::{
    Ack, Action, AppliedConfig, AppliedConfigTable, ApplyStatus, BatchHandlerId, ClientIdentity,
    ConfigDescriptor, HandlerError, HandlerResult, ParseError, PollOutcome, ProductHandler,
    RemoteConfigManager, SubscriptionChange, UpdateTransaction,
};
pub use protocol::{
    ApplyState, ClientGetConfigsRequest, ClientGetConfigsResponse, ClientState, ConfigState,
};
pub use scheduler::Scheduler;
pub use status::{RemoteConfigStatus, StatusSnapshot};
pub use transport::{HttpTransport, Transport, TransportError, TransportResponse};
