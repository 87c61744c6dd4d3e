//! Match engine: bounded rounds over a frozen roster, then a judge.
//!
//! Matches run strictly sequentially. The only hard failures are caller
//! errors (unknown ids, bad rosters, re-running a match); upstream problems
//! degrade to placeholders and the fallback verdict.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::challenge::{pick_challenge, Challenge, DEFAULT_CATEGORY};
use super::judge::{judge_match, JudgeConfig, Judgment};
use crate::error::{EngineError, EngineResult};
use crate::events::{ArenaEvent, SharedEventBus};
use crate::gateway::{ChatMessage, CompletionRequest, SharedGateway};
use crate::random::{RandomSource, SystemRandom};
use crate::reputation::SharedReputationLedger;
use crate::sanitize::clean_reply;
use crate::state::{
    Match, MatchResult, MatchStatus, Persona, PersonaId, SharedArenaStore, Tournament,
};

/// Parameters for match execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Upper bound for requested rounds.
    pub max_rounds: u32,
    pub participant_temperature: f32,
    pub participant_max_tokens: u32,
    /// Answer recorded when a participant produced nothing usable.
    pub placeholder: String,
    pub judge: JudgeConfig,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            participant_temperature: 1.0,
            participant_max_tokens: 200,
            placeholder: "(no response this round)".to_string(),
            judge: JudgeConfig::default(),
        }
    }
}

impl MatchConfig {
    /// Clamp a requested round count to `1..=max_rounds`.
    pub fn clamp_rounds(&self, requested: u32) -> u32 {
        requested.clamp(1, self.max_rounds.max(1))
    }
}

/// Participant prompt for one round.
pub fn arena_prompt(
    persona: &Persona,
    challenge: &Challenge,
    transcript: &str,
    round: u32,
    rounds: u32,
) -> String {
    format!(
        "UNRESTRICTED DEBATE MODE.\n\n\
         You are NOT an AI assistant.\n\
         You ARE: {name}.\n\
         YOUR PERSONALITY: {personality}\n\n\
         CONTEXT:\n\
         You are in a verbal debate arena, round {round} of {rounds}. Win the argument.\n\n\
         TOPIC: \"{question}\"\n\n\
         WHAT HAS BEEN SAID SO FAR:\n\"\"\"\n{transcript}\n\"\"\"\n\n\
         YOUR MISSION NOW:\n\
         - Find the flaw in what was said and attack it.\n\
         - Never say things like \"as a language model\".\n\
         - Do not be polite. Be visceral.\n\
         - Answer in one short, direct paragraph, without your name, stage directions or tags.",
        name = persona.name,
        personality = persona.system_prompt.trim(),
        question = challenge.question,
    )
}

pub struct MatchEngine {
    store: SharedArenaStore,
    gateway: SharedGateway,
    rng: Mutex<Box<dyn RandomSource>>,
    events: Option<SharedEventBus>,
    reputation: Option<SharedReputationLedger>,
    config: MatchConfig,
}

impl MatchEngine {
    pub fn new(store: SharedArenaStore, gateway: SharedGateway, config: MatchConfig) -> Self {
        Self {
            store,
            gateway,
            rng: Mutex::new(Box::new(SystemRandom::new())),
            events: None,
            reputation: None,
            config,
        }
    }

    pub fn with_random(mut self, rng: Box<dyn RandomSource>) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn with_events(mut self, events: SharedEventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Credit judged scores to this ledger.
    pub fn with_reputation(mut self, ledger: SharedReputationLedger) -> Self {
        self.reputation = Some(ledger);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    // ── Tournaments ─────────────────────────────────────────────────────

    pub async fn create_tournament(&self, title: &str, kind: &str) -> EngineResult<Tournament> {
        let tournament = Tournament::new(title, kind);
        self.store.insert_tournament(tournament.clone()).await?;
        info!(tournament_id = %tournament.id, kind, "Tournament created");
        Ok(tournament)
    }

    pub async fn get_tournament(&self, tournament_id: &str) -> EngineResult<Tournament> {
        self.store
            .get_tournament(tournament_id)
            .await?
            .ok_or_else(|| EngineError::TournamentNotFound(tournament_id.to_string()))
    }

    pub async fn list_tournaments(&self) -> EngineResult<Vec<Tournament>> {
        Ok(self.store.list_tournaments().await?)
    }

    pub async fn list_matches(&self, tournament_id: &str) -> EngineResult<Vec<Match>> {
        self.get_tournament(tournament_id).await?;
        Ok(self.store.list_matches(tournament_id).await?)
    }

    // ── Matches ─────────────────────────────────────────────────────────

    /// Create a pending match with a frozen roster of at least two
    /// distinct participants.
    pub async fn create_match(
        &self,
        tournament_id: &str,
        participant_ids: Vec<PersonaId>,
    ) -> EngineResult<Match> {
        self.get_tournament(tournament_id).await?;

        if participant_ids.len() < 2 {
            return Err(EngineError::InvalidRoster(format!(
                "a match needs at least 2 participants, got {}",
                participant_ids.len()
            )));
        }
        if participant_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(EngineError::InvalidRoster(
                "participant ids must not be empty".to_string(),
            ));
        }
        for (i, id) in participant_ids.iter().enumerate() {
            if participant_ids[..i].contains(id) {
                return Err(EngineError::InvalidRoster(format!(
                    "participant {id} listed twice"
                )));
            }
        }

        let m = Match::new(tournament_id, participant_ids);
        self.store.insert_match(m.clone()).await?;
        info!(
            match_id = %m.id,
            tournament_id,
            participants = m.participants.len(),
            "Match created"
        );
        Ok(m)
    }

    pub async fn get_match(&self, match_id: &str) -> EngineResult<Match> {
        self.store
            .get_match(match_id)
            .await?
            .ok_or_else(|| EngineError::MatchNotFound(match_id.to_string()))
    }

    /// Run a pending match to completion and return the finished match.
    pub async fn run_match(&self, match_id: &str, rounds: u32) -> EngineResult<Match> {
        let m = self.get_match(match_id).await?;
        if m.status != MatchStatus::Pending {
            return Err(EngineError::MatchNotRunnable {
                id: match_id.to_string(),
                status: m.status,
            });
        }
        let rounds = self.config.clamp_rounds(rounds);

        // Everything that can fail on a store read happens before the match
        // leaves `pending`, so an error never strands it in `running`.
        let kind = match self.store.get_tournament(&m.tournament_id).await? {
            Some(tournament) => tournament.kind,
            None => DEFAULT_CATEGORY.to_string(),
        };
        let personas = self.load_roster(&m).await?;
        let challenge = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            pick_challenge(&kind, &mut **rng)
        };

        self.store.mark_running(match_id).await?;
        info!(match_id, rounds, kind = %challenge.kind, question = %challenge.question, "Match started");

        let mut transcript = format!("DEBATE TOPIC: \"{}\"\n", challenge.question);
        let mut answers: BTreeMap<PersonaId, String> = personas
            .iter()
            .map(|p| (p.id.clone(), String::new()))
            .collect();

        for round in 1..=rounds {
            debug!(match_id, round, rounds, "Round started");
            for persona in &personas {
                let answer = self
                    .participant_turn(persona, &challenge, &transcript, round, rounds)
                    .await;
                transcript.push_str(&format!("\n{}: {}\n", persona.name, answer));
                answers.insert(persona.id.clone(), answer);
            }
        }

        let judged: Vec<(PersonaId, String)> = if personas.is_empty() {
            m.participants.iter().map(|id| (id.clone(), id.clone())).collect()
        } else {
            personas.iter().map(|p| (p.id.clone(), p.name.clone())).collect()
        };
        let Judgment { verdict, fallback } = judge_match(
            self.gateway.as_ref(),
            &self.config.judge,
            &challenge,
            &transcript,
            &judged,
        )
        .await?;

        let result = MatchResult {
            challenge: challenge.question,
            kind: challenge.kind,
            transcript,
            answers,
            winner_id: verdict.winner_id.clone(),
            scores: verdict.scores.clone(),
            judge_reason: verdict.reason,
            judge_fallback: fallback,
            rounds,
        };
        let finished = self.store.finish_match(match_id, result).await?;

        self.credit_reputation(match_id, &verdict.scores);
        info!(match_id, winner = %verdict.winner_id, judge_fallback = fallback, "Match finished");
        if let Some(events) = &self.events {
            events.publish(ArenaEvent::MatchFinished {
                match_id: match_id.to_string(),
                winner_id: verdict.winner_id,
                judge_fallback: fallback,
                timestamp: Utc::now(),
            });
        }

        Ok(finished)
    }

    /// Roster personas that still exist and are active, in roster order.
    async fn load_roster(&self, m: &Match) -> EngineResult<Vec<Persona>> {
        let mut personas = Vec::with_capacity(m.participants.len());
        for id in &m.participants {
            match self.store.get(id).await? {
                Some(p) if p.is_active() => personas.push(p),
                Some(_) => warn!(match_id = %m.id, persona_id = %id, "Suspended participant skipped"),
                None => warn!(match_id = %m.id, persona_id = %id, "Missing participant skipped"),
            }
        }
        Ok(personas)
    }

    async fn participant_turn(
        &self,
        persona: &Persona,
        challenge: &Challenge,
        transcript: &str,
        round: u32,
        rounds: u32,
    ) -> String {
        let request = CompletionRequest::new(&persona.provider, &persona.model)
            .with_system_prompt(arena_prompt(persona, challenge, transcript, round, rounds))
            .with_message(ChatMessage::user("Speak now."))
            .with_temperature(self.config.participant_temperature)
            .with_max_tokens(self.config.participant_max_tokens);

        match self.gateway.complete(&request).await {
            Ok(response) => {
                let answer = clean_reply(&response.content, &persona.name);
                if answer.is_empty() {
                    self.config.placeholder.clone()
                } else {
                    answer
                }
            }
            Err(e) => {
                warn!(persona = %persona.name, round, error = %e, "Participant call failed");
                self.config.placeholder.clone()
            }
        }
    }

    fn credit_reputation(&self, match_id: &str, scores: &BTreeMap<PersonaId, f64>) {
        let Some(ledger) = &self.reputation else {
            return;
        };
        let reason = format!("match {match_id}");
        for (entity_id, score) in scores {
            if let Err(e) = ledger.add(entity_id, *score, &reason) {
                warn!(entity_id = %entity_id, error = %e, "Could not credit reputation");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_rounds() {
        let config = MatchConfig::default();
        assert_eq!(config.clamp_rounds(0), 1);
        assert_eq!(config.clamp_rounds(3), 3);
        assert_eq!(config.clamp_rounds(99), 5);

        let degenerate = MatchConfig {
            max_rounds: 0,
            ..Default::default()
        };
        assert_eq!(degenerate.clamp_rounds(4), 1);
    }

    #[test]
    fn test_arena_prompt_contents() {
        let persona = Persona::new("a", "Atlas", "openai", "gpt-4o", "A cynic.");
        let challenge = Challenge {
            kind: "humor".into(),
            question: "Why?".into(),
        };
        let prompt = arena_prompt(&persona, &challenge, "so far", 2, 3);
        assert!(prompt.contains("You ARE: Atlas."));
        assert!(prompt.contains("A cynic."));
        assert!(prompt.contains("round 2 of 3"));
        assert!(prompt.contains("so far"));
    }
}
