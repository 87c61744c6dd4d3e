//! Debate Engine: autonomous open-ended conversations
//!
//! Decides after every utterance whether anyone answers, who, and when.
//!
//! # Conversation Flow
//!
//! ```text
//! create(title) ─▶ SEEDED ──(ignition delay)──▶ fan-out: every persona
//!                                               queued with jitter
//!                                                     │
//!            ┌────────────────────────────────────────┘
//!            ▼
//!   persona speaks ──▶ coin (p = 0.9) ──┬─ continue ─▶ one other persona
//!            ▲                          │              queued (3–6 s)
//!            │                          └─ stop ─────▶ dormant
//!            └──────────────────────────────────────────────┘
//!
//! pause:  active = false; queued turns drop when they fire
//! resume: active = true;  re-ignite from the last persona speaker
//! ```

pub mod engine;
pub mod prompts;
pub mod scheduler;

pub use engine::{ConversationView, DebateConfig, DebateEngine, Target, TurnOutcome};
pub use scheduler::{ScheduledTask, TaskKind, TurnScheduler};
