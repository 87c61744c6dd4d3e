//! Synthetic Arena orchestration core
//!
//! This library decides, without human intervention, which LLM-backed
//! persona speaks next in an open-ended conversation, and runs bounded,
//! judged matches between personas.
//!
//! # Components
//!
//! - [`gateway`]: uniform completion interface, per-call timeout, stub fallback
//! - [`state`]: persona, transcript, conversation, tournament and match stores
//! - [`debate`]: autonomous turn-taking driven by a delayed task queue
//! - [`arena`]: round-based matches with a judge verdict
//! - [`reputation`]: score ledger credited by judged matches
//! - [`events`]: broadcast stream for observers
//!
//! # Usage
//!
//! ```ignore
//! use coordination::{DebateConfig, DebateEngine, MemoryStore, StubGateway};
//!
//! let store = MemoryStore::new().shared();
//! let engine = DebateEngine::new(store, Arc::new(StubGateway::new()), DebateConfig::default())
//!     .shared();
//! let driver = engine.spawn_driver(shutdown.clone());
//! engine.create_conversation(Some("Is freedom an illusion?"), vec![]).await?;
//! ```

pub mod arena;
pub mod debate;
pub mod error;
pub mod events;
pub mod gateway;
pub mod random;
pub mod reputation;
pub mod sanitize;
pub mod state;

pub use arena::{Challenge, JudgeConfig, JudgeVerdict, MatchConfig, MatchEngine};
pub use debate::{
    ConversationView, DebateConfig, DebateEngine, ScheduledTask, TaskKind, Target, TurnOutcome,
    TurnScheduler,
};
pub use error::{EngineError, EngineResult};
pub use events::{ArenaEvent, DropReason, EventBus, EventFilter, SharedEventBus};
pub use gateway::{
    ChatMessage, ChatRole, CompletionGateway, CompletionRequest, CompletionResponse, GatewayError,
    GatewayResult, ResilienceConfig, ResilientGateway, SharedGateway, StubGateway,
};
pub use random::{RandomSource, SeededRandom, SystemRandom};
pub use reputation::{ReputationLedger, ReputationRecord, SharedReputationLedger};
pub use state::{
    ArenaSnapshot, ArenaStore, Conversation, Match, MatchResult, MatchStatus, MemoryStore, Persona,
    PersonaStatus, Sender, SharedArenaStore, StoreError, Tournament, Utterance,
};
