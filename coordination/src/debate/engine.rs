//! Debate engine: autonomous turn-taking for open-ended conversations.
//!
//! Every decision about who speaks next ends in a task on the
//! [`TurnScheduler`]; nothing recurses. A driver spawned with
//! [`DebateEngine::spawn_driver`] executes tasks as they come due.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::prompts;
use super::scheduler::{ScheduledTask, TaskKind, TurnScheduler};
use crate::error::{EngineError, EngineResult};
use crate::events::{preview, ArenaEvent, DropReason, SharedEventBus};
use crate::gateway::{CompletionRequest, SharedGateway};
use crate::random::{RandomSource, SystemRandom};
use crate::sanitize::clean_reply;
use crate::state::{
    Conversation, Persona, PersonaId, SharedArenaStore, Sender, Utterance, UtteranceTag,
};

/// Timing and selection parameters for the debate engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateConfig {
    /// Delay between seeding a conversation and the first fan-out.
    pub ignition_delay_ms: u64,
    /// Per-persona delay window for the fan-out after a `SYSTEM` utterance.
    pub response_jitter_min_ms: u64,
    pub response_jitter_max_ms: u64,
    /// Delay window before a chain-reaction reply.
    pub thinking_min_ms: u64,
    pub thinking_max_ms: u64,
    /// Chance that a persona answers after each utterance.
    pub continue_probability: f64,
    /// Number of most recent utterances sent as context.
    pub context_window: usize,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            ignition_delay_ms: 1_000,
            response_jitter_min_ms: 1_000,
            response_jitter_max_ms: 6_000,
            thinking_min_ms: 3_000,
            thinking_max_ms: 6_000,
            continue_probability: 0.9,
            context_window: 15,
        }
    }
}

/// Who an injected message is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Target {
    /// Everyone; triggers a chain reaction
    #[default]
    Broadcast,
    /// A single persona. Stored, but no turn is scheduled.
    Direct(PersonaId),
}

impl Target {
    pub fn parse(raw: &str) -> Self {
        if raw.is_empty() || raw.eq_ignore_ascii_case("broadcast") {
            Self::Broadcast
        } else {
            Self::Direct(raw.to_string())
        }
    }
}

/// A conversation together with its full transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationView {
    pub conversation: Conversation,
    pub utterances: Vec<Utterance>,
}

/// What happened when a scheduled task ran.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// A selection decision ran and queued these tasks (possibly none)
    Ignited(Vec<ScheduledTask>),
    /// A persona spoke; `next` holds the follow-up it triggered
    Spoke {
        utterance: Utterance,
        next: Vec<ScheduledTask>,
    },
    /// The turn ended without an utterance
    Dropped(DropReason),
}

pub struct DebateEngine {
    store: SharedArenaStore,
    gateway: SharedGateway,
    scheduler: Arc<TurnScheduler>,
    rng: Mutex<Box<dyn RandomSource>>,
    events: Option<SharedEventBus>,
    config: DebateConfig,
}

impl DebateEngine {
    pub fn new(store: SharedArenaStore, gateway: SharedGateway, config: DebateConfig) -> Self {
        Self {
            store,
            gateway,
            scheduler: Arc::new(TurnScheduler::new()),
            rng: Mutex::new(Box::new(SystemRandom::new())),
            events: None,
            config,
        }
    }

    /// Replace the random source (e.g. with a seeded one for tests).
    pub fn with_random(mut self, rng: Box<dyn RandomSource>) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn with_events(mut self, events: SharedEventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn scheduler(&self) -> &Arc<TurnScheduler> {
        &self.scheduler
    }

    pub fn config(&self) -> &DebateConfig {
        &self.config
    }

    // ── Inbound operations ──────────────────────────────────────────────

    /// Create a conversation. A non-empty title seeds the topic and queues
    /// the ignition; without one the conversation waits for an injection.
    pub async fn create_conversation(
        &self,
        title: Option<&str>,
        participant_ids: Vec<PersonaId>,
    ) -> EngineResult<Conversation> {
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from);
        let conversation = Conversation::new(title.clone(), participant_ids);
        let conversation_id = conversation.id.clone();
        self.store.insert_conversation(conversation).await?;

        self.emit(ArenaEvent::ConversationCreated {
            conversation_id: conversation_id.clone(),
            title: title.clone(),
            timestamp: Utc::now(),
        });

        if let Some(title) = &title {
            let seed = self
                .store
                .append(
                    &conversation_id,
                    Sender::System,
                    &prompts::seed_text(title),
                    Some(UtteranceTag::SystemInjection),
                )
                .await?;
            self.emit_appended(&seed);
            self.scheduler.schedule(
                &conversation_id,
                TaskKind::Ignite {
                    last_speaker: Sender::System,
                },
                Duration::from_millis(self.config.ignition_delay_ms),
            );
        }

        info!(
            conversation_id = %conversation_id,
            seeded = title.is_some(),
            "Conversation created"
        );

        self.store
            .get_conversation(&conversation_id)
            .await?
            .ok_or(EngineError::ConversationNotFound(conversation_id))
    }

    /// Append an external participant's message. Broadcasts run the
    /// chain reaction with the injector as last speaker.
    pub async fn inject_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        content: &str,
        target: Target,
    ) -> EngineResult<Utterance> {
        self.require_conversation(conversation_id).await?;

        let sender = Sender::parse(sender_id);
        let tag = sender.is_system().then_some(UtteranceTag::SystemInjection);
        let utterance = self
            .store
            .append(conversation_id, sender.clone(), content, tag)
            .await?;
        self.emit_appended(&utterance);

        match target {
            Target::Broadcast => {
                self.ignite(conversation_id, &sender).await;
            }
            Target::Direct(recipient) => {
                debug!(
                    conversation_id,
                    recipient = %recipient,
                    "Direct message stored, no turn scheduled"
                );
            }
        }

        Ok(utterance)
    }

    /// Pause or resume. Setting the current value is a no-op.
    pub async fn toggle_simulation(
        &self,
        conversation_id: &str,
        active: bool,
    ) -> EngineResult<Conversation> {
        let current = self.require_conversation(conversation_id).await?;
        if current.active == active {
            debug!(conversation_id, active, "Simulation already in requested state");
            return Ok(current);
        }

        let updated = self.store.set_active(conversation_id, active).await?;
        let status = if active { "resumed" } else { "paused" };
        info!(conversation_id, status, "Simulation toggled");
        self.emit(ArenaEvent::SimulationToggled {
            conversation_id: conversation_id.to_string(),
            active,
            timestamp: Utc::now(),
        });

        if active {
            let last_speaker = self.last_persona_speaker(conversation_id).await?;
            self.ignite(conversation_id, &last_speaker).await;
        }

        Ok(updated)
    }

    pub async fn get_conversation(&self, conversation_id: &str) -> EngineResult<ConversationView> {
        let conversation = self.require_conversation(conversation_id).await?;
        let utterances = self.store.all(conversation_id).await?;
        Ok(ConversationView {
            conversation,
            utterances,
        })
    }

    /// All conversations, most recently modified first.
    pub async fn list_conversations(&self) -> EngineResult<Vec<Conversation>> {
        Ok(self.store.list_conversations().await?)
    }

    // ── Turn selection ──────────────────────────────────────────────────

    /// Decide who speaks next after `last_speaker` and queue those turns.
    ///
    /// After `SYSTEM`, every eligible persona is queued with its own jitter.
    /// After anyone else, at most one persona other than the last speaker is
    /// queued, subject to the continue probability.
    pub async fn ignite(&self, conversation_id: &str, last_speaker: &Sender) -> Vec<ScheduledTask> {
        let conversation = match self.store.get_conversation(conversation_id).await {
            Ok(Some(conversation)) => conversation,
            Ok(None) => {
                debug!(conversation_id, "Conversation gone, nothing scheduled");
                return Vec::new();
            }
            Err(e) => {
                warn!(conversation_id, error = %e, "Could not load conversation for ignition");
                return Vec::new();
            }
        };
        if !conversation.active {
            debug!(conversation_id, "Simulation paused, nothing scheduled");
            return Vec::new();
        }

        let eligible = match self.eligible_personas(&conversation).await {
            Ok(eligible) => eligible,
            Err(e) => {
                warn!(conversation_id, error = %e, "Could not list personas for ignition");
                return Vec::new();
            }
        };

        let plan: Vec<(PersonaId, u64)> = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            match last_speaker {
                Sender::System => {
                    info!(
                        conversation_id,
                        personas = eligible.len(),
                        "Topic injected, waking every persona"
                    );
                    eligible
                        .iter()
                        .map(|p| {
                            let delay = rng.gen_range_u64(
                                self.config.response_jitter_min_ms,
                                self.config.response_jitter_max_ms,
                            );
                            (p.id.clone(), delay)
                        })
                        .collect()
                }
                Sender::Participant(last) => {
                    if rng.next_f64() >= self.config.continue_probability {
                        debug!(conversation_id, last_speaker = %last, "Nobody answers, conversation dormant");
                        Vec::new()
                    } else {
                        let candidates: Vec<&Persona> =
                            eligible.iter().filter(|p| p.id != *last).collect();
                        match rng.pick_index(candidates.len()) {
                            Some(i) => {
                                let delay = rng.gen_range_u64(
                                    self.config.thinking_min_ms,
                                    self.config.thinking_max_ms,
                                );
                                debug!(
                                    conversation_id,
                                    responder = %candidates[i].name,
                                    last_speaker = %last,
                                    "Persona decided to respond"
                                );
                                vec![(candidates[i].id.clone(), delay)]
                            }
                            None => Vec::new(),
                        }
                    }
                }
            }
        };

        plan.into_iter()
            .map(|(responder_id, delay_ms)| {
                self.schedule_response(conversation_id, responder_id, delay_ms)
            })
            .collect()
    }

    fn schedule_response(
        &self,
        conversation_id: &str,
        responder_id: PersonaId,
        delay_ms: u64,
    ) -> ScheduledTask {
        self.emit(ArenaEvent::TurnScheduled {
            conversation_id: conversation_id.to_string(),
            responder_id: responder_id.clone(),
            delay_ms,
            timestamp: Utc::now(),
        });
        self.scheduler.schedule(
            conversation_id,
            TaskKind::Respond { responder_id },
            Duration::from_millis(delay_ms),
        )
    }

    /// Active personas, restricted to the roster when one was given.
    async fn eligible_personas(&self, conversation: &Conversation) -> EngineResult<Vec<Persona>> {
        let active = self.store.list_active().await?;
        if conversation.participants.is_empty() {
            return Ok(active);
        }
        Ok(active
            .into_iter()
            .filter(|p| conversation.participants.contains(&p.id))
            .collect())
    }

    // ── Task execution ──────────────────────────────────────────────────

    pub async fn execute_task(&self, task: ScheduledTask) -> TurnOutcome {
        match task.kind {
            TaskKind::Ignite { last_speaker } => {
                TurnOutcome::Ignited(self.ignite(&task.conversation_id, &last_speaker).await)
            }
            TaskKind::Respond { responder_id } => {
                self.execute_turn(&task.conversation_id, &responder_id).await
            }
        }
    }

    /// Have one persona speak, then run the chain reaction.
    pub async fn execute_turn(&self, conversation_id: &str, responder_id: &str) -> TurnOutcome {
        // The conversation may have been paused while this turn waited.
        match self.store.get_conversation(conversation_id).await {
            Ok(Some(c)) if c.active => {}
            Ok(Some(_)) => return self.drop_turn(conversation_id, responder_id, DropReason::Paused),
            Ok(None) => {
                return self.drop_turn(conversation_id, responder_id, DropReason::ConversationMissing)
            }
            Err(e) => {
                warn!(conversation_id, error = %e, "Could not load conversation for turn");
                return self.drop_turn(conversation_id, responder_id, DropReason::StoreFailed);
            }
        }

        let persona = match self.store.get(responder_id).await {
            Ok(Some(p)) if p.is_active() => p,
            Ok(Some(_)) => {
                return self.drop_turn(conversation_id, responder_id, DropReason::PersonaSuspended)
            }
            Ok(None) => {
                return self.drop_turn(conversation_id, responder_id, DropReason::PersonaMissing)
            }
            Err(e) => {
                warn!(responder_id, error = %e, "Could not load persona for turn");
                return self.drop_turn(conversation_id, responder_id, DropReason::StoreFailed);
            }
        };

        let request = match self.build_request(conversation_id, &persona).await {
            Ok(request) => request,
            Err(e) => {
                warn!(conversation_id, error = %e, "Could not build turn context");
                return self.drop_turn(conversation_id, responder_id, DropReason::StoreFailed);
            }
        };

        let response = match self.gateway.complete(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    conversation_id,
                    responder = %persona.name,
                    error = %e,
                    "Completion failed, ending this branch"
                );
                return self.drop_turn(conversation_id, responder_id, DropReason::GatewayFailed);
            }
        };

        let reply = clean_reply(&response.content, &persona.name);
        if reply.is_empty() {
            return self.drop_turn(conversation_id, responder_id, DropReason::EmptyReply);
        }

        let utterance = match self
            .store
            .append(conversation_id, Sender::participant(&persona.id), &reply, None)
            .await
        {
            Ok(utterance) => utterance,
            Err(e) => {
                warn!(conversation_id, error = %e, "Could not store reply");
                return self.drop_turn(conversation_id, responder_id, DropReason::StoreFailed);
            }
        };
        self.emit_appended(&utterance);
        info!(
            conversation_id,
            responder = %persona.name,
            sequence = utterance.sequence,
            degraded = response.degraded,
            latency_ms = response.latency_ms,
            "Persona spoke"
        );

        let next = self.ignite(conversation_id, &utterance.sender).await;
        TurnOutcome::Spoke { utterance, next }
    }

    async fn build_request(
        &self,
        conversation_id: &str,
        persona: &Persona,
    ) -> EngineResult<CompletionRequest> {
        let history = self
            .store
            .recent(conversation_id, self.config.context_window)
            .await?;

        let mut names: HashMap<String, String> = HashMap::new();
        for utterance in &history {
            if let Sender::Participant(id) = &utterance.sender {
                if id != &persona.id && !names.contains_key(id) {
                    if let Some(other) = self.store.get(id).await? {
                        names.insert(id.clone(), other.name);
                    }
                }
            }
        }

        let mut request = CompletionRequest::new(&persona.provider, &persona.model)
            .with_system_prompt(prompts::debate_system_prompt(persona))
            .with_messages(prompts::context_messages(&history, &persona.id, &names))
            .with_temperature(persona.temperature);
        if let Some(max_tokens) = persona.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        Ok(request)
    }

    fn drop_turn(&self, conversation_id: &str, responder_id: &str, reason: DropReason) -> TurnOutcome {
        debug!(conversation_id, responder_id, reason = %reason, "Turn dropped");
        self.emit(ArenaEvent::TurnDropped {
            conversation_id: conversation_id.to_string(),
            responder_id: responder_id.to_string(),
            reason,
            timestamp: Utc::now(),
        });
        TurnOutcome::Dropped(reason)
    }

    // ── Driver ──────────────────────────────────────────────────────────

    /// Run due tasks until `shutdown` is cancelled. Each task is spawned on
    /// its own so a slow completion never delays other conversations.
    pub fn spawn_driver(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            info!("Debate driver started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    due = engine.scheduler.next_due() => {
                        for task in due {
                            let worker = Arc::clone(&engine);
                            tokio::spawn(async move {
                                worker.execute_task(task).await;
                            });
                        }
                    }
                }
            }
            info!(pending = engine.scheduler.len(), "Debate driver stopped");
        })
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    async fn require_conversation(&self, conversation_id: &str) -> EngineResult<Conversation> {
        self.store
            .get_conversation(conversation_id)
            .await?
            .ok_or_else(|| EngineError::ConversationNotFound(conversation_id.to_string()))
    }

    /// Most recent non-`SYSTEM` sender, or `SYSTEM` when nobody has spoken.
    async fn last_persona_speaker(&self, conversation_id: &str) -> EngineResult<Sender> {
        let transcript = self.store.all(conversation_id).await?;
        Ok(transcript
            .iter()
            .rev()
            .find(|u| !u.sender.is_system())
            .map(|u| u.sender.clone())
            .unwrap_or(Sender::System))
    }

    fn emit(&self, event: ArenaEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }

    fn emit_appended(&self, utterance: &Utterance) {
        self.emit(ArenaEvent::UtteranceAppended {
            conversation_id: utterance.conversation_id.clone(),
            utterance_id: utterance.id.clone(),
            sender: utterance.sender.clone(),
            content_preview: preview(&utterance.content, 80),
            timestamp: utterance.created_at,
        });
    }
}
