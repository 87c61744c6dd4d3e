//! Deferred turn queue.
//!
//! Every future speaking turn is an explicit task with a fire time. The
//! queue is a min-heap keyed by `(fire_at, id)`, so tasks due at the same
//! instant run in insertion order. A driver awaits [`TurnScheduler::next_due`]
//! and spawns whatever comes back.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::state::{ConversationId, PersonaId, Sender};

/// What a task does when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    /// Run the turn-selection decision with this last speaker
    Ignite { last_speaker: Sender },
    /// Have one persona produce a reply
    Respond { responder_id: PersonaId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    /// Insertion sequence, unique per scheduler
    pub id: u64,
    pub conversation_id: ConversationId,
    pub fire_at: Instant,
    pub kind: TaskKind,
}

impl ScheduledTask {
    pub fn responder_id(&self) -> Option<&str> {
        match &self.kind {
            TaskKind::Respond { responder_id } => Some(responder_id),
            TaskKind::Ignite { .. } => None,
        }
    }
}

#[derive(Debug)]
struct QueuedTask(ScheduledTask);

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.0.fire_at, self.0.id).cmp(&(other.0.fire_at, other.0.id))
    }
}

/// Priority queue of pending turns.
#[derive(Debug, Default)]
pub struct TurnScheduler {
    queue: Mutex<BinaryHeap<Reverse<QueuedTask>>>,
    next_id: AtomicU64,
    notify: Notify,
}

impl TurnScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BinaryHeap<Reverse<QueuedTask>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a task to fire after `delay`.
    pub fn schedule(
        &self,
        conversation_id: &str,
        kind: TaskKind,
        delay: Duration,
    ) -> ScheduledTask {
        let task = ScheduledTask {
            id: self.next_id.fetch_add(1, AtomicOrdering::Relaxed),
            conversation_id: conversation_id.to_string(),
            fire_at: Instant::now() + delay,
            kind,
        };
        debug!(
            conversation_id,
            task_id = task.id,
            delay_ms = delay.as_millis() as u64,
            "Task scheduled"
        );
        self.lock().push(Reverse(QueuedTask(task.clone())));
        self.notify.notify_one();
        task
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Pending tasks in firing order, without removing them.
    pub fn pending(&self) -> Vec<ScheduledTask> {
        let mut tasks: Vec<ScheduledTask> = self.lock().iter().map(|r| r.0 .0.clone()).collect();
        tasks.sort_by_key(|t| (t.fire_at, t.id));
        tasks
    }

    /// Pending tasks for one conversation, in firing order.
    pub fn pending_for(&self, conversation_id: &str) -> Vec<ScheduledTask> {
        self.pending()
            .into_iter()
            .filter(|t| t.conversation_id == conversation_id)
            .collect()
    }

    /// Remove and return every pending task in firing order.
    pub fn drain(&self) -> Vec<ScheduledTask> {
        let mut queue = self.lock();
        let mut out = Vec::with_capacity(queue.len());
        while let Some(Reverse(QueuedTask(task))) = queue.pop() {
            out.push(task);
        }
        out
    }

    /// Remove and return tasks whose fire time is at or before `now`.
    pub fn pop_due(&self, now: Instant) -> Vec<ScheduledTask> {
        let mut queue = self.lock();
        let mut due = Vec::new();
        while queue.peek().is_some_and(|Reverse(QueuedTask(t))| t.fire_at <= now) {
            if let Some(Reverse(QueuedTask(task))) = queue.pop() {
                due.push(task);
            }
        }
        due
    }

    fn earliest(&self) -> Option<Instant> {
        self.lock().peek().map(|Reverse(QueuedTask(t))| t.fire_at)
    }

    /// Wait until at least one task is due and return all due tasks.
    pub async fn next_due(&self) -> Vec<ScheduledTask> {
        loop {
            let due = self.pop_due(Instant::now());
            if !due.is_empty() {
                return due;
            }

            match self.earliest() {
                Some(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {}
                        _ = self.notify.notified() => {}
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }
}
