//! Store contracts and the in-memory backing store.
//!
//! The engines only see the traits below. `MemoryStore` implements all of
//! them over one set of tables guarded by a single lock, so an append and
//! the conversation's `updated_at` bump land together.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::*;

/// Error type for state store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid status transition for match {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: MatchStatus,
        to: MatchStatus,
    },

    #[error("Lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: &str) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for state store operations
pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// Contracts
// ============================================================================

/// Read-only lookup of persona configuration.
#[async_trait]
pub trait PersonaStore: Send + Sync {
    async fn get(&self, id: &str) -> StoreResult<Option<Persona>>;

    /// Personas eligible for turn selection. Suspended personas are excluded.
    async fn list_active(&self) -> StoreResult<Vec<Persona>>;

    async fn list_owned_by(&self, owner_id: &str) -> StoreResult<Vec<Persona>>;
}

/// Append-only ordered log of utterances per conversation.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn append(
        &self,
        conversation_id: &str,
        sender: Sender,
        content: &str,
        tag: Option<UtteranceTag>,
    ) -> StoreResult<Utterance>;

    /// The last `limit` utterances, in chronological order.
    async fn recent(&self, conversation_id: &str, limit: usize) -> StoreResult<Vec<Utterance>>;

    async fn latest(&self, conversation_id: &str) -> StoreResult<Option<Utterance>>;

    async fn all(&self, conversation_id: &str) -> StoreResult<Vec<Utterance>>;
}

/// Conversation persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn insert_conversation(&self, conversation: Conversation) -> StoreResult<()>;

    async fn get_conversation(&self, id: &str) -> StoreResult<Option<Conversation>>;

    /// All conversations, most recently modified first.
    async fn list_conversations(&self) -> StoreResult<Vec<Conversation>>;

    /// Set the `active` flag, returning the updated conversation.
    async fn set_active(&self, id: &str, active: bool) -> StoreResult<Conversation>;
}

/// Tournament persistence.
#[async_trait]
pub trait TournamentStore: Send + Sync {
    async fn insert_tournament(&self, tournament: Tournament) -> StoreResult<()>;

    async fn get_tournament(&self, id: &str) -> StoreResult<Option<Tournament>>;

    async fn list_tournaments(&self) -> StoreResult<Vec<Tournament>>;
}

/// Match persistence.
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Insert a match and attach it to its tournament's match list.
    async fn insert_match(&self, m: Match) -> StoreResult<()>;

    async fn get_match(&self, id: &str) -> StoreResult<Option<Match>>;

    async fn list_matches(&self, tournament_id: &str) -> StoreResult<Vec<Match>>;

    /// Move a pending match to `running`.
    async fn mark_running(&self, id: &str) -> StoreResult<Match>;

    /// Write the result and move to `finished` in one step.
    async fn finish_match(&self, id: &str, result: MatchResult) -> StoreResult<Match>;
}

/// Every store contract the engines need, as one shareable handle.
pub trait ArenaStore:
    PersonaStore + TranscriptStore + ConversationStore + TournamentStore + MatchStore
{
}

impl<T> ArenaStore for T where
    T: PersonaStore + TranscriptStore + ConversationStore + TournamentStore + MatchStore
{
}

/// Shared reference to a full store
pub type SharedArenaStore = Arc<dyn ArenaStore>;

// ============================================================================
// In-memory implementation
// ============================================================================

/// Raw tables held by `MemoryStore`; also the snapshot payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tables {
    pub personas: BTreeMap<PersonaId, Persona>,
    pub conversations: HashMap<ConversationId, Conversation>,
    pub utterances: HashMap<ConversationId, Vec<Utterance>>,
    pub tournaments: HashMap<TournamentId, Tournament>,
    pub matches: HashMap<MatchId, Match>,
}

/// In-memory store implementing every contract.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from previously captured tables.
    pub fn from_tables(tables: Tables) -> Self {
        Self {
            tables: RwLock::new(tables),
        }
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Copy of the current tables.
    pub fn tables(&self) -> StoreResult<Tables> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(tables.clone())
    }

    /// Insert or replace a persona.
    pub fn upsert_persona(&self, persona: Persona) -> StoreResult<()> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        tables.personas.insert(persona.id.clone(), persona);
        Ok(())
    }

    pub fn set_persona_status(&self, id: &str, status: PersonaStatus) -> StoreResult<Persona> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        let persona = tables
            .personas
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("persona", id))?;
        persona.status = status;
        Ok(persona.clone())
    }

    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> StoreResult<R> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&tables))
    }

    fn write<R>(&self, f: impl FnOnce(&mut Tables) -> StoreResult<R>) -> StoreResult<R> {
        let mut tables = self.tables.write().map_err(|_| StoreError::LockPoisoned)?;
        f(&mut tables)
    }

    fn transition(
        tables: &mut Tables,
        id: &str,
        to: MatchStatus,
        result: Option<MatchResult>,
    ) -> StoreResult<Match> {
        let m = tables
            .matches
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("match", id))?;
        if !m.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                from: m.status,
                to,
            });
        }
        m.status = to;
        if result.is_some() {
            m.result = result;
        }
        Ok(m.clone())
    }
}

/// Timestamp for the next utterance, never earlier than the previous one.
fn monotonic_now(previous: Option<&Utterance>) -> DateTime<Utc> {
    let now = Utc::now();
    match previous {
        Some(last) if last.created_at > now => last.created_at,
        _ => now,
    }
}

#[async_trait]
impl PersonaStore for MemoryStore {
    async fn get(&self, id: &str) -> StoreResult<Option<Persona>> {
        self.read(|t| t.personas.get(id).cloned())
    }

    async fn list_active(&self) -> StoreResult<Vec<Persona>> {
        self.read(|t| t.personas.values().filter(|p| p.is_active()).cloned().collect())
    }

    async fn list_owned_by(&self, owner_id: &str) -> StoreResult<Vec<Persona>> {
        self.read(|t| {
            t.personas
                .values()
                .filter(|p| p.owner_id == owner_id)
                .cloned()
                .collect()
        })
    }
}

#[async_trait]
impl TranscriptStore for MemoryStore {
    async fn append(
        &self,
        conversation_id: &str,
        sender: Sender,
        content: &str,
        tag: Option<UtteranceTag>,
    ) -> StoreResult<Utterance> {
        self.write(|t| {
            let conversation = t
                .conversations
                .get_mut(conversation_id)
                .ok_or_else(|| StoreError::not_found("conversation", conversation_id))?;

            let log = t.utterances.entry(conversation_id.to_string()).or_default();
            let utterance = Utterance {
                id: new_id(),
                conversation_id: conversation_id.to_string(),
                sender,
                content: content.to_string(),
                tag,
                sequence: log.len() as u64 + 1,
                created_at: monotonic_now(log.last()),
            };
            conversation.updated_at = utterance.created_at;
            log.push(utterance.clone());
            Ok(utterance)
        })
    }

    async fn recent(&self, conversation_id: &str, limit: usize) -> StoreResult<Vec<Utterance>> {
        self.read(|t| {
            t.utterances
                .get(conversation_id)
                .map(|log| log[log.len().saturating_sub(limit)..].to_vec())
                .unwrap_or_default()
        })
    }

    async fn latest(&self, conversation_id: &str) -> StoreResult<Option<Utterance>> {
        self.read(|t| {
            t.utterances
                .get(conversation_id)
                .and_then(|log| log.last().cloned())
        })
    }

    async fn all(&self, conversation_id: &str) -> StoreResult<Vec<Utterance>> {
        self.read(|t| t.utterances.get(conversation_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn insert_conversation(&self, conversation: Conversation) -> StoreResult<()> {
        self.write(|t| {
            t.conversations
                .insert(conversation.id.clone(), conversation);
            Ok(())
        })
    }

    async fn get_conversation(&self, id: &str) -> StoreResult<Option<Conversation>> {
        self.read(|t| t.conversations.get(id).cloned())
    }

    async fn list_conversations(&self) -> StoreResult<Vec<Conversation>> {
        self.read(|t| {
            let mut all: Vec<Conversation> = t.conversations.values().cloned().collect();
            all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            all
        })
    }

    async fn set_active(&self, id: &str, active: bool) -> StoreResult<Conversation> {
        self.write(|t| {
            let conversation = t
                .conversations
                .get_mut(id)
                .ok_or_else(|| StoreError::not_found("conversation", id))?;
            if conversation.active != active {
                conversation.active = active;
                conversation.updated_at = Utc::now();
            }
            Ok(conversation.clone())
        })
    }
}

#[async_trait]
impl TournamentStore for MemoryStore {
    async fn insert_tournament(&self, tournament: Tournament) -> StoreResult<()> {
        self.write(|t| {
            t.tournaments.insert(tournament.id.clone(), tournament);
            Ok(())
        })
    }

    async fn get_tournament(&self, id: &str) -> StoreResult<Option<Tournament>> {
        self.read(|t| t.tournaments.get(id).cloned())
    }

    async fn list_tournaments(&self) -> StoreResult<Vec<Tournament>> {
        self.read(|t| {
            let mut all: Vec<Tournament> = t.tournaments.values().cloned().collect();
            all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            all
        })
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn insert_match(&self, m: Match) -> StoreResult<()> {
        self.write(|t| {
            let tournament = t
                .tournaments
                .get_mut(&m.tournament_id)
                .ok_or_else(|| StoreError::not_found("tournament", &m.tournament_id))?;
            tournament.match_ids.push(m.id.clone());
            t.matches.insert(m.id.clone(), m);
            Ok(())
        })
    }

    async fn get_match(&self, id: &str) -> StoreResult<Option<Match>> {
        self.read(|t| t.matches.get(id).cloned())
    }

    async fn list_matches(&self, tournament_id: &str) -> StoreResult<Vec<Match>> {
        self.read(|t| {
            t.tournaments
                .get(tournament_id)
                .map(|tournament| {
                    tournament
                        .match_ids
                        .iter()
                        .filter_map(|id| t.matches.get(id).cloned())
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    async fn mark_running(&self, id: &str) -> StoreResult<Match> {
        self.write(|t| Self::transition(t, id, MatchStatus::Running, None))
    }

    async fn finish_match(&self, id: &str, result: MatchResult) -> StoreResult<Match> {
        self.write(|t| Self::transition(t, id, MatchStatus::Finished, Some(result)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persona(id: &str) -> Persona {
        Persona::new(id, format!("Name {id}"), "openai", "gpt-4o", "prompt")
    }

    async fn store_with_conversation() -> (MemoryStore, ConversationId) {
        let store = MemoryStore::new();
        let conversation = Conversation::new(Some("topic".to_string()), vec![]);
        let id = conversation.id.clone();
        store.insert_conversation(conversation).await.unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_append_assigns_monotonic_sequence() {
        let (store, cid) = store_with_conversation().await;

        let a = store.append(&cid, Sender::System, "seed", Some(UtteranceTag::SystemInjection)).await.unwrap();
        let b = store.append(&cid, Sender::participant("p-1"), "one", None).await.unwrap();
        let c = store.append(&cid, Sender::participant("p-2"), "two", None).await.unwrap();

        assert_eq!((a.sequence, b.sequence, c.sequence), (1, 2, 3));
        assert!(a.created_at <= b.created_at && b.created_at <= c.created_at);
        assert!(a.is_system_injection());
    }

    #[tokio::test]
    async fn test_append_unknown_conversation_fails() {
        let store = MemoryStore::new();
        let err = store.append("missing", Sender::System, "x", None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_recent_returns_last_window_chronologically() {
        let (store, cid) = store_with_conversation().await;
        for i in 0..20 {
            store.append(&cid, Sender::participant("p-1"), &format!("m{i}"), None).await.unwrap();
        }

        let window = store.recent(&cid, 5).await.unwrap();
        let contents: Vec<&str> = window.iter().map(|u| u.content.as_str()).collect();
        assert_eq!(contents, vec!["m15", "m16", "m17", "m18", "m19"]);

        let all = store.recent(&cid, 100).await.unwrap();
        assert_eq!(all.len(), 20);
        assert_eq!(store.latest(&cid).await.unwrap().unwrap().content, "m19");
        assert!(store.recent("missing", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_active_excludes_suspended() {
        let store = MemoryStore::new();
        store.upsert_persona(persona("a")).unwrap();
        store.upsert_persona(persona("b").with_owner("acct-1")).unwrap();
        store.set_persona_status("a", PersonaStatus::Suspended).unwrap();

        let active = store.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "b");

        let owned = store.list_owned_by("acct-1").await.unwrap();
        assert_eq!(owned.len(), 1);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_conversations_most_recent_first() {
        let store = MemoryStore::new();
        let first = Conversation::new(Some("first".into()), vec![]);
        let second = Conversation::new(Some("second".into()), vec![]);
        let first_id = first.id.clone();
        store.insert_conversation(first).await.unwrap();
        store.insert_conversation(second).await.unwrap();

        // Appending to the older conversation moves it to the front.
        store.append(&first_id, Sender::System, "bump", None).await.unwrap();

        let listed = store.list_conversations().await.unwrap();
        assert_eq!(listed[0].id, first_id);
    }

    #[tokio::test]
    async fn test_match_lifecycle_enforced() {
        let store = MemoryStore::new();
        let tournament = Tournament::new("Cup", "humor");
        let tid = tournament.id.clone();
        store.insert_tournament(tournament).await.unwrap();

        let m = Match::new(&tid, vec!["a".into(), "b".into()]);
        let mid = m.id.clone();
        store.insert_match(m).await.unwrap();
        assert_eq!(store.get_tournament(&tid).await.unwrap().unwrap().match_ids, vec![mid.clone()]);

        let result = MatchResult {
            challenge: "c".into(),
            kind: "humor".into(),
            transcript: String::new(),
            answers: BTreeMap::new(),
            winner_id: "a".into(),
            scores: BTreeMap::new(),
            judge_reason: "r".into(),
            judge_fallback: false,
            rounds: 1,
        };

        // Cannot finish before running.
        let err = store.finish_match(&mid, result.clone()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        store.mark_running(&mid).await.unwrap();
        let finished = store.finish_match(&mid, result.clone()).await.unwrap();
        assert_eq!(finished.status, MatchStatus::Finished);
        assert_eq!(finished.result.as_ref().unwrap().winner_id, "a");

        // Result is written exactly once.
        assert!(store.finish_match(&mid, result).await.is_err());
        assert_eq!(store.list_matches(&tid).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_match_requires_tournament() {
        let store = MemoryStore::new();
        let err = store
            .insert_match(Match::new("missing", vec!["a".into(), "b".into()]))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
