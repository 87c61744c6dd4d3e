//! Event stream for arena observers
//!
//! 1. **Event Types** (`types.rs`): conversation, turn, match and
//!    reputation events.
//!
//! 2. **Event Bus** (`bus.rs`): Tokio broadcast-based pub/sub with
//!    optional filtering by conversation and event type.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   Engines    │────▶│  Event Bus   │────▶│  Subscribers │
//! │  (publish)   │     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventFilter, FilteredReceiver, SharedEventBus};
pub use types::{preview, ArenaEvent, DropReason};
