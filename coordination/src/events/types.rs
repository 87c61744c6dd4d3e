//! Event types published by the debate and match engines
//!
//! Observers (UI push, logs, tests) subscribe to these instead of polling
//! the stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{ConversationId, MatchId, PersonaId, Sender, UtteranceId};

/// Why a scheduled turn was dropped without speaking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Conversation was paused while the turn waited
    Paused,
    /// Conversation no longer exists
    ConversationMissing,
    /// Responder persona no longer exists
    PersonaMissing,
    /// Responder persona was suspended
    PersonaSuspended,
    /// Completion call failed; the branch ends here
    GatewayFailed,
    /// Reply was empty after cleanup
    EmptyReply,
    /// A store read or write failed
    StoreFailed,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::Paused => write!(f, "paused"),
            DropReason::ConversationMissing => write!(f, "conversation_missing"),
            DropReason::PersonaMissing => write!(f, "persona_missing"),
            DropReason::PersonaSuspended => write!(f, "persona_suspended"),
            DropReason::GatewayFailed => write!(f, "gateway_failed"),
            DropReason::EmptyReply => write!(f, "empty_reply"),
            DropReason::StoreFailed => write!(f, "store_failed"),
        }
    }
}

/// All arena events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArenaEvent {
    /// A new conversation was created
    ConversationCreated {
        conversation_id: ConversationId,
        title: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// An utterance was appended to a conversation
    UtteranceAppended {
        conversation_id: ConversationId,
        utterance_id: UtteranceId,
        sender: Sender,
        content_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// A persona was scheduled to respond
    TurnScheduled {
        conversation_id: ConversationId,
        responder_id: PersonaId,
        delay_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A scheduled turn ended without an utterance
    TurnDropped {
        conversation_id: ConversationId,
        responder_id: PersonaId,
        reason: DropReason,
        timestamp: DateTime<Utc>,
    },

    /// Simulation was paused or resumed
    SimulationToggled {
        conversation_id: ConversationId,
        active: bool,
        timestamp: DateTime<Utc>,
    },

    /// A match reached `finished`
    MatchFinished {
        match_id: MatchId,
        winner_id: PersonaId,
        judge_fallback: bool,
        timestamp: DateTime<Utc>,
    },

    /// Reputation was credited to a persona
    ReputationChanged {
        entity_id: PersonaId,
        change: f64,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl ArenaEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ArenaEvent::ConversationCreated { timestamp, .. } => *timestamp,
            ArenaEvent::UtteranceAppended { timestamp, .. } => *timestamp,
            ArenaEvent::TurnScheduled { timestamp, .. } => *timestamp,
            ArenaEvent::TurnDropped { timestamp, .. } => *timestamp,
            ArenaEvent::SimulationToggled { timestamp, .. } => *timestamp,
            ArenaEvent::MatchFinished { timestamp, .. } => *timestamp,
            ArenaEvent::ReputationChanged { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            ArenaEvent::ConversationCreated { .. } => "conversation_created",
            ArenaEvent::UtteranceAppended { .. } => "utterance_appended",
            ArenaEvent::TurnScheduled { .. } => "turn_scheduled",
            ArenaEvent::TurnDropped { .. } => "turn_dropped",
            ArenaEvent::SimulationToggled { .. } => "simulation_toggled",
            ArenaEvent::MatchFinished { .. } => "match_finished",
            ArenaEvent::ReputationChanged { .. } => "reputation_changed",
        }
    }

    /// Get the conversation ID if this event is conversation-scoped
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            ArenaEvent::ConversationCreated {
                conversation_id, ..
            }
            | ArenaEvent::UtteranceAppended {
                conversation_id, ..
            }
            | ArenaEvent::TurnScheduled {
                conversation_id, ..
            }
            | ArenaEvent::TurnDropped {
                conversation_id, ..
            }
            | ArenaEvent::SimulationToggled {
                conversation_id, ..
            } => Some(conversation_id),
            _ => None,
        }
    }

    /// Get the match ID if this event is match-scoped
    pub fn match_id(&self) -> Option<&str> {
        match self {
            ArenaEvent::MatchFinished { match_id, .. } => Some(match_id),
            _ => None,
        }
    }
}

/// Shorten content for event payloads.
pub fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        let cut: String = content.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}
