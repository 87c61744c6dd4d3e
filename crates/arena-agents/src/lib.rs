//! Runtime wiring for the synthetic arena: environment configuration,
//! HTTP completion backends, and persona rosters.

pub mod config;
pub mod providers;
pub mod roster;

pub use config::{ArenaConfig, GatewayConfig};
pub use providers::{build_gateway, build_router, BackendKind, ProviderRouter};
pub use roster::{load_roster, parse_roster, seed_store, RosterError};
