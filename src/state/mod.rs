//! Per-sender conversation state
//!
//! Responsible for storing the conversation mode and the mode-toggle flag.
//! Currently in-memory; the trait lets a persistent backend replace it.

use crate::models::{ConversationState, Mode, Sender};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Held while a sender's state is read and transitioned.
pub type SenderGuard = OwnedMutexGuard<()>;

/// Trait for conversation state persistence
#[async_trait::async_trait]
pub trait StateStore: Send + Sync {
    /// Idle when the sender has no state yet.
    async fn get(&self, sender: &Sender) -> Result<ConversationState>;
    async fn set(&self, sender: &Sender, state: ConversationState) -> Result<()>;
    /// Back to Idle. The toggle flag is a setting, not conversation, and survives.
    async fn clear(&self, sender: &Sender) -> Result<()>;
    /// Restarts the expiry clock of a live flow. Expired flows stay expired.
    async fn touch(&self, sender: &Sender) -> Result<()>;
    /// Serializes all work for one sender. Other senders are never blocked.
    async fn lock(&self, sender: &Sender) -> SenderGuard;
}

#[derive(Debug, Clone)]
struct Entry {
    state: ConversationState,
    touched_at: Instant,
}

/// In-memory state store
pub struct InMemoryStateStore {
    entries: Arc<RwLock<HashMap<Sender, Entry>>>,
    locks: Arc<RwLock<HashMap<Sender, Arc<Mutex<()>>>>>,
    /// Multi-turn flows older than this fall back to Idle.
    ttl: Option<Duration>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            locks: Arc::new(RwLock::new(HashMap::new())),
            ttl: None,
        }
    }

    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            ..Self::new()
        }
    }

    fn expired(&self, entry: &Entry, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => entry.state.mode != Mode::Idle && now.duration_since(entry.touched_at) > ttl,
            None => false,
        }
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, sender: &Sender) -> Result<ConversationState> {
        let entries = self.entries.read().await;

        let Some(entry) = entries.get(sender) else {
            return Ok(ConversationState::default());
        };

        let mut state = entry.state.clone();
        if self.expired(entry, Instant::now()) {
            tracing::debug!(sender = %sender, "Conversation expired, treating as idle");
            state.mode = Mode::Idle;
        }

        Ok(state)
    }

    async fn set(&self, sender: &Sender, state: ConversationState) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            sender.clone(),
            Entry {
                state,
                touched_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn clear(&self, sender: &Sender) -> Result<()> {
        let mut entries = self.entries.write().await;

        let drop_entry = match entries.get_mut(sender) {
            Some(entry) => {
                entry.state.mode = Mode::Idle;
                entry.touched_at = Instant::now();
                entry.state.toggle.is_none()
            }
            None => false,
        };

        if drop_entry {
            entries.remove(sender);
        }

        Ok(())
    }

    async fn touch(&self, sender: &Sender) -> Result<()> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();

        if let Some(entry) = entries.get_mut(sender) {
            if !self.expired(entry, now) {
                entry.touched_at = now;
            }
        }
        Ok(())
    }

    async fn lock(&self, sender: &Sender) -> SenderGuard {
        let cell = {
            let locks = self.locks.read().await;
            locks.get(sender).cloned()
        };

        let cell = match cell {
            Some(cell) => cell,
            None => {
                let mut locks = self.locks.write().await;
                locks
                    .entry(sender.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone()
            }
        };

        cell.lock_owned().await
    }
}
