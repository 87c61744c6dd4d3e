//! Core data types for conversations, personas, and matches.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a persona (synthetic entity)
pub type PersonaId = String;

/// Identifier of a human account owning personas
pub type AccountId = String;

/// Identifier of a conversation thread
pub type ConversationId = String;

/// Identifier of a single utterance
pub type UtteranceId = String;

/// Identifier of a tournament
pub type TournamentId = String;

/// Identifier of a match
pub type MatchId = String;

/// Reserved sender id for topic injection.
pub const SYSTEM_SENDER: &str = "SYSTEM";

/// Generate a fresh random identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// ============================================================================
// Personas
// ============================================================================

/// Whether a persona may take part in conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaStatus {
    #[default]
    Active,
    Suspended,
}

impl std::fmt::Display for PersonaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Suspended => write!(f, "suspended"),
        }
    }
}

/// An LLM-backed character with a name, backend, and behaviour prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: PersonaId,
    /// Account that owns this persona
    #[serde(default)]
    pub owner_id: AccountId,
    /// Display name, used to attribute multi-party history
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Backend provider tag (e.g. "openai", "deepseek")
    pub provider: String,
    /// Model identifier passed to the backend
    pub model: String,
    /// Natural-language prompt defining behaviour
    pub system_prompt: String,
    /// Creativity parameter (0.0 - 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub status: PersonaStatus,
}

fn default_temperature() -> f32 {
    0.7
}

impl Persona {
    /// Create an active persona with default temperature and no owner.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: String::new(),
            name: name.into(),
            description: String::new(),
            provider: provider.into(),
            model: model.into(),
            system_prompt: system_prompt.into(),
            temperature: default_temperature(),
            max_tokens: None,
            status: PersonaStatus::Active,
        }
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = owner_id.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_status(mut self, status: PersonaStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == PersonaStatus::Active
    }
}

// ============================================================================
// Conversations and utterances
// ============================================================================

/// Who produced an utterance.
///
/// `System` is the reserved topic-injection sentinel. Everything else is a
/// participant id, which usually names a persona but may also be an external
/// actor (a human injecting a message).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Sender {
    System,
    Participant(String),
}

impl Sender {
    pub fn participant(id: impl Into<String>) -> Self {
        Self::Participant(id.into())
    }

    /// Interpret a raw sender id, mapping the reserved sentinel to `System`.
    pub fn parse(raw: &str) -> Self {
        if raw == SYSTEM_SENDER {
            Self::System
        } else {
            Self::Participant(raw.to_string())
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Self::System)
    }

    /// Raw id of this sender (`SYSTEM` for the sentinel).
    pub fn id(&self) -> &str {
        match self {
            Self::System => SYSTEM_SENDER,
            Self::Participant(id) => id,
        }
    }

    /// Whether this sender is the given persona.
    pub fn is(&self, persona_id: &str) -> bool {
        matches!(self, Self::Participant(id) if id == persona_id)
    }
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// Classification tag attached to special utterances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtteranceTag {
    /// Topic framing injected when a conversation is seeded
    SystemInjection,
}

/// One atomic speech act inside a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub id: UtteranceId,
    pub conversation_id: ConversationId,
    pub sender: Sender,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<UtteranceTag>,
    /// Position within the conversation, starting at 1
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

impl Utterance {
    pub fn is_system_injection(&self) -> bool {
        self.tag == Some(UtteranceTag::SystemInjection)
    }
}

/// An open-ended conversation thread among personas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Ordered roster; empty means every eligible persona may speak
    #[serde(default)]
    pub participants: Vec<PersonaId>,
    /// Whether the engine may schedule further turns
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new, active conversation.
    pub fn new(title: Option<String>, participants: Vec<PersonaId>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            title,
            participants,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// Tournaments and matches
// ============================================================================

/// Tournament lifecycle tag. Not enforced as a state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    #[default]
    Draft,
    Open,
    Running,
    Finished,
}

/// A competitive event grouping matches under one challenge category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub title: String,
    /// Category tag that selects the challenge pool
    #[serde(rename = "type")]
    pub kind: String,
    pub status: TournamentStatus,
    #[serde(default)]
    pub match_ids: Vec<MatchId>,
    pub created_at: DateTime<Utc>,
}

impl Tournament {
    pub fn new(title: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            kind: kind.into(),
            status: TournamentStatus::Draft,
            match_ids: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// Match lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    #[default]
    Pending,
    Running,
    Finished,
}

impl MatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(self) -> &'static [MatchStatus] {
        match self {
            Self::Pending => &[Self::Running],
            Self::Running => &[Self::Finished],
            Self::Finished => &[],
        }
    }

    pub fn can_transition_to(self, next: MatchStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

/// Final outcome of a match, written exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Challenge prompt all participants answered
    pub challenge: String,
    /// Tournament category the challenge came from
    #[serde(rename = "type")]
    pub kind: String,
    /// Full accumulated transcript
    pub transcript: String,
    /// Last answer of each participant
    pub answers: BTreeMap<PersonaId, String>,
    pub winner_id: PersonaId,
    pub scores: BTreeMap<PersonaId, f64>,
    pub judge_reason: String,
    /// Whether the verdict came from the fallback path
    #[serde(default)]
    pub judge_fallback: bool,
    pub rounds: u32,
}

/// A bounded, roster-frozen exchange inside a tournament.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub tournament_id: TournamentId,
    /// Roster snapshotted at creation
    pub participants: Vec<PersonaId>,
    pub status: MatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<MatchResult>,
    pub created_at: DateTime<Utc>,
}

impl Match {
    pub fn new(tournament_id: impl Into<String>, participants: Vec<PersonaId>) -> Self {
        Self {
            id: new_id(),
            tournament_id: tournament_id.into(),
            participants,
            status: MatchStatus::Pending,
            result: None,
            created_at: Utc::now(),
        }
    }
}
