//! Arena state: data model, store contracts, and snapshots
//!
//! The engines depend on the store traits in [`store`], never on a concrete
//! backend:
//!
//! - `PersonaStore`: read-only persona lookup
//! - `TranscriptStore`: append-only utterance log per conversation
//! - `ConversationStore`, `TournamentStore`, `MatchStore`: bookkeeping
//!
//! `MemoryStore` implements all of them. [`snapshot`] serializes its tables
//! (plus the reputation ledger) to versioned JSON.
//!
//! # Usage
//!
//! ```ignore
//! use coordination::state::{MemoryStore, Persona};
//!
//! let store = MemoryStore::new();
//! store.upsert_persona(Persona::new("p-1", "Atlas", "openai", "gpt-4o", "You are Atlas."))?;
//! let store: SharedArenaStore = store.shared();
//! ```

pub mod snapshot;
pub mod store;
pub mod types;

pub use snapshot::{ArenaSnapshot, SnapshotError};
pub use store::{
    ArenaStore, ConversationStore, MatchStore, MemoryStore, PersonaStore, SharedArenaStore,
    StoreError, StoreResult, Tables, TournamentStore, TranscriptStore,
};
pub use types::{
    new_id, AccountId, Conversation, ConversationId, Match, MatchId, MatchResult, MatchStatus,
    Persona, PersonaId, PersonaStatus, Sender, Tournament, TournamentId, TournamentStatus,
    Utterance, UtteranceId, UtteranceTag, SYSTEM_SENDER,
};
