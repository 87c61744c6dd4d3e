//! Debate engine integration tests with a scripted gateway and seeded RNG.
//!
//! Covers: seeding, fan-out, chain reaction, pause/resume, the pre-turn
//! activity check, pausing mid-call, persona filtering, concurrent fan-out
//! context, and the background driver.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use coordination::debate::{DebateConfig, DebateEngine, TaskKind, Target, TurnOutcome};
use coordination::events::{ArenaEvent, DropReason, EventBus, EventFilter};
use coordination::gateway::{CompletionGateway, CompletionRequest, CompletionResponse, GatewayResult};
use coordination::random::SeededRandom;
use coordination::state::{
    MemoryStore, Persona, PersonaStatus, Sender, TranscriptStore, UtteranceTag,
};
use tokio_util::sync::CancellationToken;

/// Replies with a numbered line and counts calls.
#[derive(Default)]
struct ScriptedGateway {
    calls: AtomicUsize,
}

#[async_trait]
impl CompletionGateway for ScriptedGateway {
    async fn complete(&self, request: &CompletionRequest) -> GatewayResult<CompletionResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CompletionResponse {
            content: format!("Argument {n} from {}", request.model),
            model: request.model.clone(),
            served_by: "scripted".to_string(),
            degraded: false,
            latency_ms: 0,
        })
    }
}

/// Sleeps before answering and records how much context each call carried.
struct SlowGateway {
    latency: Duration,
    context_sizes: Mutex<Vec<usize>>,
}

impl SlowGateway {
    fn new(latency: Duration) -> Self {
        Self {
            latency,
            context_sizes: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CompletionGateway for SlowGateway {
    async fn complete(&self, request: &CompletionRequest) -> GatewayResult<CompletionResponse> {
        self.context_sizes.lock().unwrap().push(request.messages.len());
        tokio::time::sleep(self.latency).await;
        Ok(CompletionResponse {
            content: format!("Considered reply from {}", request.model),
            model: request.model.clone(),
            served_by: "slow".to_string(),
            degraded: false,
            latency_ms: self.latency.as_millis() as u64,
        })
    }
}

fn roster(ids: &[&str]) -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    for id in ids {
        store
            .upsert_persona(Persona::new(
                *id,
                format!("Persona {id}"),
                "openai",
                format!("model-{id}"),
                format!("You are persona {id}."),
            ))
            .unwrap();
    }
    store.shared()
}

fn config(continue_probability: f64) -> DebateConfig {
    DebateConfig {
        continue_probability,
        ..Default::default()
    }
}

fn engine(
    store: &Arc<MemoryStore>,
    gateway: &Arc<ScriptedGateway>,
    config: DebateConfig,
    seed: u64,
) -> DebateEngine {
    DebateEngine::new(store.clone(), gateway.clone(), config)
        .with_random(Box::new(SeededRandom::new(seed)))
}

fn responders(tasks: &[coordination::debate::ScheduledTask]) -> Vec<String> {
    tasks
        .iter()
        .filter_map(|t| t.responder_id().map(String::from))
        .collect()
}

// ── Seeding and ignition ───────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_seed_then_fan_out_to_every_persona() {
    let store = roster(&["a", "b", "c"]);
    let gateway = Arc::new(ScriptedGateway::default());
    let engine = engine(&store, &gateway, config(0.9), 11);

    let conversation = engine
        .create_conversation(Some("Is freedom an illusion?"), vec![])
        .await
        .unwrap();
    assert!(conversation.active);

    // Exactly one SYSTEM utterance, tagged as the seed.
    let transcript = store.all(&conversation.id).await.unwrap();
    assert_eq!(transcript.len(), 1);
    assert!(transcript[0].sender.is_system());
    assert_eq!(transcript[0].tag, Some(UtteranceTag::SystemInjection));
    assert!(transcript[0].content.contains("Is freedom an illusion?"));

    // One ignition task, one second out.
    let pending = engine.scheduler().drain();
    assert_eq!(pending.len(), 1);
    assert_eq!(
        pending[0].kind,
        TaskKind::Ignite {
            last_speaker: Sender::System
        }
    );

    let scheduled = match engine.execute_task(pending[0].clone()).await {
        TurnOutcome::Ignited(tasks) => tasks,
        other => panic!("unexpected outcome: {other:?}"),
    };
    let ids: HashSet<String> = responders(&scheduled).into_iter().collect();
    assert_eq!(scheduled.len(), 3);
    assert_eq!(ids, HashSet::from(["a".into(), "b".into(), "c".into()]));
    assert!(!ids.contains("SYSTEM"));

    let now = tokio::time::Instant::now();
    for task in &scheduled {
        let delay = task.fire_at - now;
        assert!(delay >= Duration::from_millis(1_000) && delay <= Duration::from_millis(6_000));
    }
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_persona_turn_appends_after_seed() {
    let store = roster(&["a", "b"]);
    let gateway = Arc::new(ScriptedGateway::default());
    let engine = engine(&store, &gateway, config(0.0), 5);

    let conversation = engine.create_conversation(Some("Topic"), vec![]).await.unwrap();
    engine.scheduler().drain();

    let outcome = engine.execute_turn(&conversation.id, "a").await;
    let TurnOutcome::Spoke { utterance, next } = outcome else {
        panic!("turn should speak");
    };
    assert_eq!(utterance.sequence, 2);
    assert!(utterance.sender.is("a"));
    assert_eq!(utterance.content, "Argument 1 from model-a");
    // Probability zero: nobody answers.
    assert!(next.is_empty());

    let transcript = store.all(&conversation.id).await.unwrap();
    assert!(transcript[0].sender.is_system());
    assert_eq!(transcript.iter().filter(|u| u.sender.is_system()).count(), 1);
}

// ── Chain reaction ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_chain_reaction_never_picks_last_speaker() {
    let store = roster(&["a", "b", "c"]);
    let gateway = Arc::new(ScriptedGateway::default());

    for seed in 0..40 {
        let engine = engine(&store, &gateway, config(1.0), seed);
        let conversation = engine.create_conversation(None, vec![]).await.unwrap();

        let last = ["a", "b", "c"][(seed % 3) as usize];
        engine
            .inject_message(&conversation.id, last, "opening", Target::Broadcast)
            .await
            .unwrap();

        let pending = engine.scheduler().pending_for(&conversation.id);
        assert_eq!(pending.len(), 1, "seed {seed}");
        let responder = pending[0].responder_id().unwrap();
        assert_ne!(responder, last, "seed {seed}");
        assert_ne!(responder, "SYSTEM");

        let delay = pending[0].fire_at - tokio::time::Instant::now();
        assert!(delay >= Duration::from_millis(3_000) && delay <= Duration::from_millis(6_000));
    }
}

#[tokio::test(start_paused = true)]
async fn test_lone_persona_has_nobody_to_answer() {
    let store = roster(&["a"]);
    let gateway = Arc::new(ScriptedGateway::default());
    let engine = engine(&store, &gateway, config(1.0), 3);

    let conversation = engine.create_conversation(None, vec![]).await.unwrap();
    engine
        .inject_message(&conversation.id, "a", "monologue", Target::Broadcast)
        .await
        .unwrap();
    assert!(engine.scheduler().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_direct_target_is_stored_but_inert() {
    let store = roster(&["a", "b"]);
    let gateway = Arc::new(ScriptedGateway::default());
    let engine = engine(&store, &gateway, config(1.0), 3);

    let conversation = engine.create_conversation(None, vec![]).await.unwrap();
    engine
        .inject_message(&conversation.id, "human-1", "psst", Target::Direct("a".into()))
        .await
        .unwrap();

    assert!(engine.scheduler().is_empty());
    assert_eq!(store.all(&conversation.id).await.unwrap().len(), 1);
}

// ── Pause and resume ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_pause_is_idempotent() {
    let store = roster(&["a", "b"]);
    let gateway = Arc::new(ScriptedGateway::default());
    let bus = EventBus::new().shared();
    let mut events = bus.subscribe();
    let engine = engine(&store, &gateway, config(1.0), 1).with_events(bus);

    let conversation = engine.create_conversation(None, vec![]).await.unwrap();
    let first = engine.toggle_simulation(&conversation.id, false).await.unwrap();
    let second = engine.toggle_simulation(&conversation.id, false).await.unwrap();
    assert!(!first.active && !second.active);
    assert_eq!(first.updated_at, second.updated_at);

    // Resuming an active conversation schedules nothing either.
    let other = engine.create_conversation(None, vec![]).await.unwrap();
    engine.toggle_simulation(&other.id, true).await.unwrap();
    assert!(engine.scheduler().is_empty());

    let mut toggles = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ArenaEvent::SimulationToggled { .. }) {
            toggles += 1;
        }
    }
    assert_eq!(toggles, 1);
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_on_paused_conversation_waits_for_resume() {
    let store = roster(&["a", "b", "c"]);
    let gateway = Arc::new(ScriptedGateway::default());
    let engine = engine(&store, &gateway, config(1.0), 9);

    let conversation = engine.create_conversation(None, vec![]).await.unwrap();
    engine.toggle_simulation(&conversation.id, false).await.unwrap();

    engine
        .inject_message(&conversation.id, "b", "anyone?", Target::Broadcast)
        .await
        .unwrap();
    assert_eq!(store.all(&conversation.id).await.unwrap().len(), 1);
    assert!(engine.scheduler().is_empty());

    engine.toggle_simulation(&conversation.id, true).await.unwrap();
    let pending = engine.scheduler().pending();
    assert_eq!(pending.len(), 1);
    assert_ne!(pending[0].responder_id(), Some("b"));
}

#[tokio::test(start_paused = true)]
async fn test_resume_keys_off_last_persona_speaker() {
    let store = roster(&["a", "b", "c"]);
    let gateway = Arc::new(ScriptedGateway::default());
    let engine = engine(&store, &gateway, config(1.0), 21);

    let conversation = engine.create_conversation(Some("Topic"), vec![]).await.unwrap();
    engine.scheduler().drain();
    engine
        .inject_message(&conversation.id, "c", "last word", Target::Direct("a".into()))
        .await
        .unwrap();
    // A later SYSTEM note must not count as the last speaker.
    engine
        .inject_message(&conversation.id, "SYSTEM", "reminder", Target::Direct("a".into()))
        .await
        .unwrap();

    engine.toggle_simulation(&conversation.id, false).await.unwrap();
    engine.toggle_simulation(&conversation.id, true).await.unwrap();

    let pending = engine.scheduler().drain();
    assert_eq!(pending.len(), 1);
    assert_ne!(pending[0].responder_id(), Some("c"));
}

#[tokio::test(start_paused = true)]
async fn test_resume_without_persona_speaker_fans_out() {
    let store = roster(&["a", "b", "c"]);
    let gateway = Arc::new(ScriptedGateway::default());
    let engine = engine(&store, &gateway, config(1.0), 4);

    let conversation = engine.create_conversation(Some("Topic"), vec![]).await.unwrap();
    engine.scheduler().drain();

    engine.toggle_simulation(&conversation.id, false).await.unwrap();
    engine.toggle_simulation(&conversation.id, true).await.unwrap();

    assert_eq!(engine.scheduler().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_turn_dropped_when_paused_before_firing() {
    let store = roster(&["a", "b"]);
    let gateway = Arc::new(ScriptedGateway::default());
    let engine = engine(&store, &gateway, config(1.0), 2);

    let conversation = engine.create_conversation(Some("Topic"), vec![]).await.unwrap();
    let ignition = engine.scheduler().drain().remove(0);
    engine.execute_task(ignition).await;
    let turns = engine.scheduler().drain();
    assert_eq!(turns.len(), 2);

    engine.toggle_simulation(&conversation.id, false).await.unwrap();
    for task in turns {
        let outcome = engine.execute_task(task).await;
        assert!(matches!(outcome, TurnOutcome::Dropped(DropReason::Paused)));
    }
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.all(&conversation.id).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pause_during_call_lets_reply_land_without_successor() {
    let store = roster(&["a", "b"]);
    let gateway = Arc::new(SlowGateway::new(Duration::from_secs(5)));
    let engine = DebateEngine::new(store.clone(), gateway.clone(), config(1.0))
        .with_random(Box::new(SeededRandom::new(7)))
        .shared();

    let conversation = engine.create_conversation(Some("Topic"), vec![]).await.unwrap();
    engine.scheduler().drain();

    let turn = {
        let engine = Arc::clone(&engine);
        let id = conversation.id.clone();
        tokio::spawn(async move { engine.execute_turn(&id, "a").await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(gateway.context_sizes.lock().unwrap().len(), 1);
    engine.toggle_simulation(&conversation.id, false).await.unwrap();

    let TurnOutcome::Spoke { utterance, next } = turn.await.unwrap() else {
        panic!("in-flight reply should still be stored");
    };
    assert!(utterance.sender.is("a"));
    assert!(next.is_empty());
    assert!(engine.scheduler().is_empty());
    assert_eq!(store.all(&conversation.id).await.unwrap().len(), 2);
}

// ── Eligibility ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_suspended_personas_never_selected() {
    let store = roster(&["a", "b", "c"]);
    store.set_persona_status("b", PersonaStatus::Suspended).unwrap();
    let gateway = Arc::new(ScriptedGateway::default());
    let engine = engine(&store, &gateway, config(1.0), 6);

    let conversation = engine.create_conversation(Some("Topic"), vec![]).await.unwrap();
    let ignition = engine.scheduler().drain().remove(0);
    let TurnOutcome::Ignited(tasks) = engine.execute_task(ignition).await else {
        panic!("expected ignition");
    };
    let ids: HashSet<String> = responders(&tasks).into_iter().collect();
    assert_eq!(ids, HashSet::from(["a".into(), "c".into()]));

    for seed in 0..20 {
        let engine = self::engine(&store, &gateway, config(1.0), seed);
        engine
            .inject_message(&conversation.id, "a", "go", Target::Broadcast)
            .await
            .unwrap();
        let pending = engine.scheduler().drain();
        assert_eq!(responders(&pending), vec!["c".to_string()]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_roster_restricts_selection() {
    let store = roster(&["a", "b", "c", "d"]);
    let gateway = Arc::new(ScriptedGateway::default());
    let engine = engine(&store, &gateway, config(1.0), 8);

    let conversation = engine
        .create_conversation(Some("Topic"), vec!["b".into(), "d".into()])
        .await
        .unwrap();
    let ignition = engine.scheduler().drain().remove(0);
    let TurnOutcome::Ignited(tasks) = engine.execute_task(ignition).await else {
        panic!("expected ignition");
    };
    let ids: HashSet<String> = responders(&tasks).into_iter().collect();
    assert_eq!(ids, HashSet::from(["b".into(), "d".into()]));
}

// ── Driver ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_driver_runs_seeded_conversation() {
    let store = roster(&["a", "b", "c"]);
    let gateway = Arc::new(ScriptedGateway::default());
    let engine = engine(&store, &gateway, config(0.0), 13).shared();

    let shutdown = CancellationToken::new();
    let driver = engine.spawn_driver(shutdown.clone());

    let conversation = engine.create_conversation(Some("Topic"), vec![]).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    shutdown.cancel();
    driver.await.unwrap();

    let view = engine.get_conversation(&conversation.id).await.unwrap();
    assert_eq!(view.utterances.len(), 4);
    assert!(view.utterances[0].sender.is_system());
    let speakers: HashSet<&str> = view.utterances[1..].iter().map(|u| u.sender.id()).collect();
    assert_eq!(speakers, HashSet::from(["a", "b", "c"]));
    let sequences: Vec<u64> = view.utterances.iter().map(|u| u.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);

    let listed = engine.list_conversations().await.unwrap();
    assert_eq!(listed[0].id, conversation.id);
}

#[tokio::test(start_paused = true)]
async fn test_fan_out_turns_see_partial_context() {
    let store = roster(&["a", "b", "c"]);
    let gateway = Arc::new(SlowGateway::new(Duration::from_millis(1_500)));
    let engine = DebateEngine::new(store.clone(), gateway.clone(), config(0.0))
        .with_random(Box::new(SeededRandom::new(29)))
        .shared();

    let shutdown = CancellationToken::new();
    let driver = engine.spawn_driver(shutdown.clone());
    let conversation = engine.create_conversation(Some("Topic"), vec![]).await.unwrap();
    tokio::time::sleep(Duration::from_secs(12)).await;
    shutdown.cancel();
    driver.await.unwrap();

    // Each turn sees the seed plus whatever siblings already landed; the
    // exact interleaving depends on the jitter and is not asserted.
    let sizes = gateway.context_sizes.lock().unwrap().clone();
    assert_eq!(sizes.len(), 3);
    assert!(sizes.iter().all(|n| (1..=3).contains(n)), "sizes {sizes:?}");
    assert!(sizes.contains(&1));
    assert_eq!(store.all(&conversation.id).await.unwrap().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_filtered_subscription_follows_one_conversation() {
    let store = roster(&["a", "b"]);
    let gateway = Arc::new(ScriptedGateway::default());
    let bus = EventBus::new().shared();
    let engine = engine(&store, &gateway, config(0.0), 1).with_events(bus.clone());

    let watched = engine.create_conversation(None, vec![]).await.unwrap();
    let other = engine.create_conversation(None, vec![]).await.unwrap();
    let mut events = bus.subscribe_filtered(
        EventFilter::new()
            .conversation(&watched.id)
            .types(vec!["utterance_appended"]),
    );

    engine
        .inject_message(&other.id, "a", "elsewhere", Target::Broadcast)
        .await
        .unwrap();
    engine
        .inject_message(&watched.id, "b", "here", Target::Broadcast)
        .await
        .unwrap();

    match events.recv().await.unwrap() {
        ArenaEvent::UtteranceAppended {
            conversation_id,
            content_preview,
            ..
        } => {
            assert_eq!(conversation_id, watched.id);
            assert_eq!(content_preview, "here");
        }
        unexpected => panic!("unexpected event: {unexpected:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_event_stream_reports_seed_and_schedule() {
    let store = roster(&["a", "b"]);
    let gateway = Arc::new(ScriptedGateway::default());
    let bus = EventBus::new().shared();
    let mut events = bus.subscribe();
    let engine = engine(&store, &gateway, config(0.9), 1).with_events(bus);

    let conversation = engine.create_conversation(Some("Topic"), vec![]).await.unwrap();
    let ignition = engine.scheduler().drain().remove(0);
    engine.execute_task(ignition).await;

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.conversation_id(), Some(conversation.id.as_str()));
        kinds.push(event.event_type());
    }
    assert_eq!(
        kinds,
        vec![
            "conversation_created",
            "utterance_appended",
            "turn_scheduled",
            "turn_scheduled"
        ]
    );
}
